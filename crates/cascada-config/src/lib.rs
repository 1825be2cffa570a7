//! Output configuration for cascada devices.
//!
//! An [`OutputConfig`] names the driver, the native buffering model and the
//! requested PCM parameters, and converts into a
//! [`DeviceConfig`](cascada_core::DeviceConfig) for `Device::open`.
//!
//! # TOML Format
//!
//! ```toml
//! driver = "cpal"
//! model = "pcm"
//! sample_format = "s16"
//! channels = 2
//! frame_rate = 48000
//! frames_per_chunk = 256
//! buffer_count = 4
//! class = "push-sync"
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use cascada_config::{OutputConfig, paths};
//!
//! let config = OutputConfig::load(paths::default_config_path()).unwrap_or_default();
//! let device_config = config.to_device_config().unwrap();
//! ```

mod error;
mod output;

/// Platform-specific configuration paths.
pub mod paths;

pub use error::ConfigError;
pub use output::{DriverKind, ModelKind, OutputConfig};
pub use paths::{default_config_path, user_config_dir};
