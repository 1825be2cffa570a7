//! Cascada Core - device contract for push-based PCM output
//!
//! This crate defines the uniform streaming contract an audio engine uses to
//! emit PCM frames, independent of the native buffering model of the output
//! hardware. Backends that realize it live in `cascada-io`.
//!
//! # Core Abstractions
//!
//! - [`AudioFormat`] / [`SampleFormat`] - interleaved PCM format descriptor
//! - [`DeviceConfig`] / [`DeviceClass`] - what `open()` is asked for
//! - [`Device`] - the open device: `check`, `get_buffer`, `queue`, `close`
//! - [`ChunkGuard`] - one claimed chunk of a mapped ring, committed exactly once
//! - [`OutputDriver`] / [`OutputBackend`] - seams for native APIs
//! - [`Error`] / [`ErrorKind`] - the cross-backend error taxonomy
//!
//! # Buffering Models
//!
//! | model | `check()` counts | `get_buffer()` | `queue()` |
//! |---|---|---|---|
//! | [`BufferModel::MappedRing`] | whole chunks | claims hardware memory | commits the claim |
//! | [`BufferModel::BlockingWrite`] | whole chunks | unavailable | blocks until written |
//! | [`BufferModel::BufferQueue`] | empty slots | unavailable | uploads into next slot |
//!
//! # Example
//!
//! ```rust,ignore
//! use cascada_core::{AudioFormat, Device, DeviceConfig, SampleFormat};
//!
//! let config = DeviceConfig::new(AudioFormat::new(SampleFormat::S16, 2, 48000))
//!     .with_frames_per_chunk(256);
//! let mut device = Device::open(&mut driver, &config)?;
//!
//! for _ in 0..device.check()? {
//!     let mut chunk = device.get_buffer()?;
//!     render(chunk.bytes_mut());
//!     chunk.queue()?;
//! }
//! device.close();
//! ```
//!
//! # Design Principles
//!
//! - **Single producer**: every operation takes `&mut self`; no internal locking
//! - **No retries**: runtime faults are returned typed, retry policy is the caller's
//! - **Infallible teardown**: `close()` and drop never report failure
//! - **Allocation-free hot path**: `check`/`get_buffer`/`queue` never allocate

pub mod backend;
pub mod device;
pub mod error;
pub mod format;
pub mod region;

pub use backend::{BufferModel, DeviceState, Negotiated, OutputBackend, OutputDriver};
pub use device::{Device, DeviceClass, DeviceConfig};
pub use error::{Error, ErrorKind, Result};
pub use format::{AudioFormat, SampleFormat};
pub use region::{ChunkGuard, MappedRing, Unavailable};
