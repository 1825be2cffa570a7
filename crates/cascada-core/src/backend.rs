//! Pluggable output backend abstraction.
//!
//! This module defines the two seams between the engine-facing
//! [`Device`](crate::Device) and native audio APIs:
//!
//! - [`OutputDriver`]: a connection to one native API that can negotiate a
//!   [`DeviceConfig`] against the default output device.
//! - [`OutputBackend`]: the per-device operation set {check, get_buffer,
//!   queue, close} for one of the three buffering models.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │     Engine (decoder / mixer)     │
//! └──────────────┬───────────────────┘
//!                │ Device::{open, check, get_buffer, queue, close}
//!                ▼
//! ┌──────────────────────────────────┐
//! │   Box<dyn OutputBackend>         │
//! └──────┬───────────┬───────────┬───┘
//!        ▼           ▼           ▼
//! ┌───────────┐ ┌───────────┐ ┌───────────┐
//! │ mapped    │ │ blocking  │ │ buffer    │
//! │ ring      │ │ write     │ │ queue     │
//! └───────────┘ └───────────┘ └───────────┘
//! ```
//!
//! ## Object Safety
//!
//! Both traits are object-safe. Drivers are selected at runtime (hardware,
//! file sink, test mock) while the set of backends is fixed; a driver decides
//! which backend it builds during [`OutputDriver::open`] and hands it back
//! type-erased, keeping native handle types out of application code.

use crate::region::{ChunkGuard, Unavailable};
use crate::{AudioFormat, DeviceClass, DeviceConfig, Result};
use std::fmt;

/// Native buffering model behind a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferModel {
    /// Zero-copy writes into a memory-mapped hardware ring.
    MappedRing,
    /// Synchronous whole-chunk writes into a driver-owned buffer.
    BlockingWrite,
    /// N hardware buffer slots cycled through one playback voice.
    BufferQueue,
}

impl BufferModel {
    /// Short lowercase name for logs and CLI output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::MappedRing => "mapped-ring",
            Self::BlockingWrite => "blocking-write",
            Self::BufferQueue => "buffer-queue",
        }
    }
}

impl fmt::Display for BufferModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle state of an open device.
///
/// A closed device no longer exists, so there is no `Closed` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    /// Hardware parameters are negotiated; playback has not started.
    Prepared,
    /// The hardware is consuming frames.
    Running,
}

/// Per-device operation set of one buffering model.
///
/// Implementations own all native resources of the device. They are built by
/// an [`OutputDriver`] and only ever reached through
/// [`Device`](crate::Device), which validates chunk sizes before dispatching
/// to [`queue`](Self::queue).
///
/// No method is safe for concurrent use; the `&mut self` receivers make the
/// single-producer contract a compile-time property.
pub trait OutputBackend {
    /// Which buffering model this backend implements.
    fn model(&self) -> BufferModel;

    /// Current lifecycle state.
    fn state(&self) -> DeviceState;

    /// Non-blocking capacity query.
    ///
    /// Ring and blocking backends return whole chunks writable without
    /// blocking; queue backends return empty buffer slots.
    fn check(&mut self) -> Result<usize>;

    /// Claim one chunk of the hardware ring for zero-copy writing.
    ///
    /// Only mapped-ring backends support this; the default reports
    /// [`Unavailable::NotMapped`].
    fn get_buffer(&mut self) -> std::result::Result<ChunkGuard<'_>, Unavailable> {
        Err(Unavailable::NotMapped)
    }

    /// Hand one caller-owned chunk of exactly `frames_per_chunk` frames to the
    /// hardware.
    fn queue(&mut self, chunk: &[u8]) -> Result<()>;

    /// Release every native resource. Never fails from the caller's
    /// perspective; teardown errors are logged and swallowed.
    fn close(self: Box<Self>);
}

/// Result of a successful negotiation.
pub struct Negotiated {
    /// The format the hardware actually accepted.
    pub format: AudioFormat,
    /// The device class after any coercion or fallback.
    pub class: DeviceClass,
    /// The backend owning the native resources.
    pub backend: Box<dyn OutputBackend>,
}

impl fmt::Debug for Negotiated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Negotiated")
            .field("format", &self.format)
            .field("class", &self.class)
            .field("model", &self.backend.model())
            .finish_non_exhaustive()
    }
}

/// Connection to one native audio API.
///
/// ## Implementing a Custom Driver
///
/// ```rust,ignore
/// use cascada_core::{DeviceConfig, Negotiated, OutputDriver, Result};
///
/// struct MyDriver { /* ... */ }
///
/// impl OutputDriver for MyDriver {
///     fn name(&self) -> &'static str { "my-driver" }
///
///     fn open(&mut self, config: &DeviceConfig) -> Result<Negotiated> {
///         // Negotiate hardware parameters, build a backend
///         todo!()
///     }
/// }
/// ```
pub trait OutputDriver {
    /// Human-readable name of this driver (e.g. "cpal-pcm", "wav", "mock-voice").
    fn name(&self) -> &'static str;

    /// Negotiate `config` against the default output device.
    ///
    /// On error every native resource acquired during negotiation must have
    /// been released before returning.
    fn open(&mut self, config: &DeviceConfig) -> Result<Negotiated>;
}
