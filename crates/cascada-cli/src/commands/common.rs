//! Shared CLI helpers used across multiple commands.

use anyhow::Context;
use cascada_config::{ConfigError, DriverKind, ModelKind, OutputConfig, default_config_path};
use cascada_core::{AudioFormat, Device, DeviceClass, SampleFormat};
use cascada_io::{CpalPcm, CpalVoice, MockPcm, MockVoice, WavSink};
use clap::Args;
use std::path::PathBuf;

/// Output selection shared by `tone` and `probe`.
///
/// Flags override values loaded from `--config` (or the default config
/// file, when it exists).
#[derive(Args, Debug, Default)]
pub struct OutputArgs {
    /// Output configuration file (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Driver: cpal, wav or mock
    #[arg(long)]
    driver: Option<DriverKind>,

    /// Buffering model: pcm or voice
    #[arg(long)]
    model: Option<ModelKind>,

    /// Device class: push-async, push-sync or callback
    #[arg(long)]
    class: Option<DeviceClass>,

    /// Sample format: u8, s16, s32 or f32
    #[arg(long)]
    format: Option<SampleFormat>,

    /// Channel count
    #[arg(long)]
    channels: Option<u16>,

    /// Frame rate in Hz
    #[arg(long)]
    rate: Option<u32>,

    /// Frames per chunk
    #[arg(long, value_name = "FRAMES")]
    chunk: Option<usize>,

    /// Hardware buffer count
    #[arg(long)]
    buffers: Option<usize>,

    /// Render to this WAV file (implies --driver wav)
    #[arg(short, long, value_name = "FILE.wav")]
    output: Option<PathBuf>,
}

impl OutputArgs {
    /// Merge the configuration file with command-line overrides.
    pub fn resolve(&self) -> anyhow::Result<OutputConfig> {
        let base = match &self.config {
            Some(path) => OutputConfig::load(path)?,
            None => load_default()?,
        };
        let config = self.apply(base);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, mut config: OutputConfig) -> OutputConfig {
        if let Some(path) = &self.output {
            config.wav_path = Some(path.clone());
            config.driver = DriverKind::Wav;
        }
        if let Some(driver) = self.driver {
            config.driver = driver;
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(class) = self.class {
            config.class = class;
        }
        if let Some(format) = self.format {
            config.sample_format = format;
        }
        if let Some(channels) = self.channels {
            config.channels = channels;
        }
        if let Some(rate) = self.rate {
            config.frame_rate = rate;
        }
        if let Some(chunk) = self.chunk {
            config.frames_per_chunk = chunk;
        }
        if let Some(buffers) = self.buffers {
            config.buffer_count = buffers;
        }
        config
    }
}

/// The default config file, or built-in defaults when there is none.
pub fn load_default() -> Result<OutputConfig, ConfigError> {
    let path = default_config_path();
    if path.exists() {
        tracing::debug!(path = %path.display(), "loading default output config");
        OutputConfig::load(&path)
    } else {
        Ok(OutputConfig::default())
    }
}

/// Open the device described by `config`.
pub fn open_device(config: &OutputConfig) -> anyhow::Result<Device> {
    let device_config = config.to_device_config()?;

    let opened = match (config.driver, config.model) {
        (DriverKind::Cpal, ModelKind::Pcm) => Device::open(&mut CpalPcm::new(), &device_config),
        (DriverKind::Cpal, ModelKind::Voice) => {
            Device::open(&mut CpalVoice::new(), &device_config)
        }
        (DriverKind::Wav, _) => {
            let path = config.wav_path.as_ref().ok_or(ConfigError::MissingWavPath)?;
            Device::open(&mut WavSink::new(path), &device_config)
        }
        (DriverKind::Mock, ModelKind::Pcm) => {
            let capacity = device_config.frames_per_chunk * device_config.buffer_count;
            let mut driver = MockPcm::new(capacity).free_running().without_recording();
            Device::open(&mut driver, &device_config)
        }
        (DriverKind::Mock, ModelKind::Voice) => {
            Device::open(&mut MockVoice::new().free_running(), &device_config)
        }
    };

    opened.with_context(|| {
        format!(
            "failed to open {} output ({} model, {})",
            config.driver,
            config.model,
            config.format()
        )
    })
}

/// Phase-continuous sine generator writing any sample format.
pub struct Sine {
    phase: f64,
    step: f64,
    amplitude: f64,
}

impl Sine {
    /// Create a generator for `freq` Hz at `format.frame_rate`.
    pub fn new(freq: f64, amplitude: f64, format: AudioFormat) -> Self {
        Self {
            phase: 0.0,
            step: std::f64::consts::TAU * freq / f64::from(format.frame_rate),
            amplitude: amplitude.clamp(0.0, 1.0),
        }
    }

    /// Fill one interleaved chunk, writing the same value to every channel.
    pub fn fill(&mut self, chunk: &mut [u8], format: AudioFormat) {
        let sample_size = format.sample_size();
        for frame in chunk.chunks_exact_mut(format.frame_size()) {
            let value = self.amplitude * self.phase.sin();
            self.phase = (self.phase + self.step) % std::f64::consts::TAU;
            for sample in frame.chunks_exact_mut(sample_size) {
                encode(format.sample_format, value, sample);
            }
        }
    }
}

/// Encode a sample in [-1, 1] as native-endian bytes.
fn encode(format: SampleFormat, value: f64, out: &mut [u8]) {
    match format {
        SampleFormat::U8 => out[0] = (value * 127.0 + 128.0).round() as u8,
        SampleFormat::S16 => {
            out.copy_from_slice(&((value * f64::from(i16::MAX)) as i16).to_ne_bytes());
        }
        SampleFormat::S32 => {
            out.copy_from_slice(&((value * f64::from(i32::MAX)) as i32).to_ne_bytes());
        }
        SampleFormat::F32 => out.copy_from_slice(&(value as f32).to_ne_bytes()),
    }
}
