//! Output configuration file format and operations.

use cascada_core::{AudioFormat, DeviceClass, DeviceConfig, SampleFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

/// Which driver backs the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// The platform audio host.
    #[default]
    Cpal,
    /// Render to a WAV file.
    Wav,
    /// In-memory simulated hardware.
    Mock,
}

impl DriverKind {
    /// Lowercase name, as used in configuration files.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cpal => "cpal",
            Self::Wav => "wav",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DriverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpal" => Ok(Self::Cpal),
            "wav" => Ok(Self::Wav),
            "mock" => Ok(Self::Mock),
            other => Err(format!("unknown driver '{other}' (expected cpal, wav or mock)")),
        }
    }
}

/// Native buffering model the driver is opened through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// PCM device: mapped ring or blocking writes.
    #[default]
    Pcm,
    /// Voice library: fixed queue of buffer slots.
    Voice,
}

impl ModelKind {
    /// Lowercase name, as used in configuration files.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pcm => "pcm",
            Self::Voice => "voice",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pcm" => Ok(Self::Pcm),
            "voice" => Ok(Self::Voice),
            other => Err(format!("unknown model '{other}' (expected pcm or voice)")),
        }
    }
}

/// Output configuration stored as TOML.
///
/// Every field has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Driver backing the device.
    pub driver: DriverKind,
    /// Buffering model to open the driver through.
    pub model: ModelKind,
    /// Sample encoding.
    #[serde(with = "by_name")]
    pub sample_format: SampleFormat,
    /// Interleaved channel count.
    pub channels: u16,
    /// Requested frame rate; the hardware may adjust it.
    pub frame_rate: u32,
    /// Frames per chunk.
    pub frames_per_chunk: usize,
    /// Chunks the hardware buffer holds.
    pub buffer_count: usize,
    /// Requested device class.
    #[serde(with = "by_name")]
    pub class: DeviceClass,
    /// Output file for the wav driver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wav_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        let format = AudioFormat::default();
        Self {
            driver: DriverKind::default(),
            model: ModelKind::default(),
            sample_format: format.sample_format,
            channels: format.channels,
            frame_rate: format.frame_rate,
            frames_per_chunk: DeviceConfig::DEFAULT_FRAMES_PER_CHUNK,
            buffer_count: DeviceConfig::DEFAULT_BUFFER_COUNT,
            class: DeviceClass::default(),
            wav_path: None,
        }
    }
}

impl OutputConfig {
    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
            }
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The requested PCM format.
    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.sample_format, self.channels, self.frame_rate)
    }

    /// Reject values no device can be opened with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.device_config().validate()?;
        match (self.driver, self.model) {
            (DriverKind::Wav, ModelKind::Voice) => Err(ConfigError::Unsupported {
                driver: self.driver,
                model: self.model,
            }),
            (DriverKind::Wav, ModelKind::Pcm) if self.wav_path.is_none() => {
                Err(ConfigError::MissingWavPath)
            }
            _ => Ok(()),
        }
    }

    /// Validate and convert into the parameters for `Device::open`.
    pub fn to_device_config(&self) -> Result<DeviceConfig, ConfigError> {
        self.validate()?;
        Ok(self.device_config())
    }

    fn device_config(&self) -> DeviceConfig {
        DeviceConfig::new(self.format())
            .with_class(self.class)
            .with_frames_per_chunk(self.frames_per_chunk)
            .with_buffer_count(self.buffer_count)
    }
}

/// Serde adapter for core types that round-trip through their short name.
mod by_name {
    use serde::{Deserialize, Deserializer, Serializer, de};
    use std::fmt::Display;
    use std::str::FromStr;

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: Display,
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}
