//! Integration tests for cascada-config.

use cascada_config::{ConfigError, DriverKind, ModelKind, OutputConfig};
use cascada_core::{DeviceClass, SampleFormat};
use tempfile::TempDir;

#[test]
fn save_then_load_preserves_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("output.toml");

    let config = OutputConfig {
        driver: DriverKind::Mock,
        model: ModelKind::Voice,
        sample_format: SampleFormat::U8,
        channels: 1,
        frame_rate: 22050,
        frames_per_chunk: 128,
        buffer_count: 6,
        class: DeviceClass::PushAsync,
        wav_path: None,
    };
    config.save(&path).unwrap();

    assert_eq!(OutputConfig::load(&path).unwrap(), config);
}

#[test]
fn save_creates_parent_directories() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("output.toml");

    OutputConfig::default().save(&path).unwrap();

    assert!(path.exists());
}

#[test]
fn load_missing_file_reports_path() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    let err = OutputConfig::load(&path).unwrap_err();

    assert!(matches!(err, ConfigError::ReadFile { path: ref p, .. } if *p == path));
}

#[test]
fn partial_file_fills_in_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("output.toml");
    std::fs::write(&path, "driver = \"wav\"\nwav_path = \"tone.wav\"\nchannels = 1\n").unwrap();

    let config = OutputConfig::load(&path).unwrap();
    let device = config.to_device_config().unwrap();

    assert_eq!(device.format.channels, 1);
    assert_eq!(device.format.frame_rate, 48000);
    assert_eq!(device.format.sample_format, SampleFormat::S16);
    assert_eq!(device.class, DeviceClass::PushSync);
}

#[test]
fn invalid_file_is_rejected_on_conversion() {
    let config = OutputConfig::from_toml("frames_per_chunk = 0").unwrap();

    assert!(matches!(
        config.to_device_config(),
        Err(ConfigError::Invalid(cascada_core::Error::InvalidConfig(_)))
    ));
}
