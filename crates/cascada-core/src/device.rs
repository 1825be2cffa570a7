//! The engine-facing output device.
//!
//! [`Device`] is the only type an audio engine talks to. It owns the
//! negotiated format and a type-erased [`OutputBackend`], validates every
//! queued chunk against the negotiated chunk size, and releases the backend
//! exactly once, either through [`Device::close`] or on drop.
//!
//! ## Service Tick
//!
//! ```rust,ignore
//! let mut device = Device::open(&mut driver, &config)?;
//! loop {
//!     // check() + as many get_buffer()/queue() rounds as capacity allows
//!     device.service(|chunk| mixer.render(chunk))?;
//!     wait_for_next_tick();
//! }
//! ```

use crate::backend::{BufferModel, DeviceState, OutputBackend, OutputDriver};
use crate::region::{ChunkGuard, Unavailable};
use crate::{AudioFormat, Error, Result};
use std::fmt;
use std::str::FromStr;

/// How the engine intends to drive the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceClass {
    /// Non-blocking pushes; prefers the zero-copy mapped ring.
    PushAsync,
    /// Pushes that may block until the driver accepts the chunk.
    #[default]
    PushSync,
    /// The hardware pulls frames through a callback. No backend implements
    /// this natively; it is coerced to [`PushSync`](Self::PushSync) on open.
    Callback,
}

impl DeviceClass {
    /// The class the device will actually run as.
    pub const fn coerced(self) -> Self {
        match self {
            Self::Callback => Self::PushSync,
            other => other,
        }
    }

    /// Short lowercase name, as used in configuration files.
    pub const fn name(self) -> &'static str {
        match self {
            Self::PushAsync => "push-async",
            Self::PushSync => "push-sync",
            Self::Callback => "callback",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "push-async" | "async" => Ok(Self::PushAsync),
            "push-sync" | "sync" => Ok(Self::PushSync),
            "callback" => Ok(Self::Callback),
            _ => Err(Error::InvalidConfig("unknown device class")),
        }
    }
}

/// Parameters requested from `open()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Requested format; the frame rate may be adjusted by the hardware.
    pub format: AudioFormat,
    /// Requested device class.
    pub class: DeviceClass,
    /// Frames moved by one `get_buffer()`/`queue()` round.
    pub frames_per_chunk: usize,
    /// Hardware buffer slots (queue backend only).
    pub buffer_count: usize,
}

impl DeviceConfig {
    /// Default chunk size in frames.
    pub const DEFAULT_FRAMES_PER_CHUNK: usize = 256;
    /// Default number of queue slots.
    pub const DEFAULT_BUFFER_COUNT: usize = 4;

    /// Create a push-sync configuration with default chunking.
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            class: DeviceClass::default(),
            frames_per_chunk: Self::DEFAULT_FRAMES_PER_CHUNK,
            buffer_count: Self::DEFAULT_BUFFER_COUNT,
        }
    }

    /// Set the device class.
    pub fn with_class(mut self, class: DeviceClass) -> Self {
        self.class = class;
        self
    }

    /// Set the chunk size in frames.
    pub fn with_frames_per_chunk(mut self, frames: usize) -> Self {
        self.frames_per_chunk = frames;
        self
    }

    /// Set the number of queue slots.
    pub fn with_buffer_count(mut self, count: usize) -> Self {
        self.buffer_count = count;
        self
    }

    /// Size of one chunk in bytes.
    pub fn chunk_bytes(&self) -> usize {
        self.format.bytes_for(self.frames_per_chunk)
    }

    /// Reject configurations no backend can honor.
    pub fn validate(&self) -> Result<()> {
        if self.format.channels == 0 {
            return Err(Error::InvalidConfig("channel count must be non-zero"));
        }
        if self.format.frame_rate == 0 {
            return Err(Error::InvalidConfig("frame rate must be non-zero"));
        }
        if self.frames_per_chunk == 0 {
            return Err(Error::InvalidConfig("frames per chunk must be non-zero"));
        }
        if self.buffer_count == 0 {
            return Err(Error::InvalidConfig("buffer count must be non-zero"));
        }
        let ring_bytes = self
            .frames_per_chunk
            .checked_mul(self.buffer_count)
            .and_then(|frames| frames.checked_mul(self.format.frame_size()));
        if ring_bytes.is_none() {
            return Err(Error::InvalidConfig("ring size overflows"));
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new(AudioFormat::default())
    }
}

/// An open output device.
///
/// Created by [`Device::open`]; released by [`Device::close`] or on drop.
/// Every native resource is owned by exactly one `Device`.
pub struct Device {
    format: AudioFormat,
    class: DeviceClass,
    model: BufferModel,
    frames_per_chunk: usize,
    buffer_count: usize,
    driver: &'static str,
    backend: Option<Box<dyn OutputBackend>>,
    scratch: Vec<u8>,
}

impl Device {
    /// Negotiate `config` with `driver` and open the default output device.
    ///
    /// A requested [`DeviceClass::Callback`] is coerced to
    /// [`DeviceClass::PushSync`] before the driver sees it. On error no
    /// native resource remains claimed.
    pub fn open<D: OutputDriver + ?Sized>(driver: &mut D, config: &DeviceConfig) -> Result<Self> {
        config.validate()?;

        let mut requested = *config;
        requested.class = config.class.coerced();
        if requested.class != config.class {
            tracing::debug!(
                from = %config.class,
                to = %requested.class,
                "device class coerced"
            );
        }

        let negotiated = driver.open(&requested)?;
        let model = negotiated.backend.model();

        if negotiated.format.frame_rate != config.format.frame_rate {
            tracing::info!(
                requested = config.format.frame_rate,
                actual = negotiated.format.frame_rate,
                "frame rate adjusted by hardware"
            );
        }
        tracing::info!(
            driver = driver.name(),
            format = %negotiated.format,
            class = %negotiated.class,
            model = %model,
            frames_per_chunk = config.frames_per_chunk,
            buffer_count = config.buffer_count,
            "output device opened"
        );

        Ok(Self {
            format: negotiated.format,
            class: negotiated.class,
            model,
            frames_per_chunk: config.frames_per_chunk,
            buffer_count: config.buffer_count,
            driver: driver.name(),
            backend: Some(negotiated.backend),
            scratch: Vec::new(),
        })
    }

    /// The negotiated format.
    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// The class the device runs as.
    pub fn class(&self) -> DeviceClass {
        self.class
    }

    /// The buffering model of the selected backend.
    pub fn model(&self) -> BufferModel {
        self.model
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DeviceState {
        self.backend
            .as_deref()
            .map_or(DeviceState::Prepared, |backend| backend.state())
    }

    /// Frames per chunk.
    pub fn frames_per_chunk(&self) -> usize {
        self.frames_per_chunk
    }

    /// Number of queue slots requested at open.
    pub fn buffer_count(&self) -> usize {
        self.buffer_count
    }

    /// Bytes in one chunk of the negotiated format.
    pub fn chunk_bytes(&self) -> usize {
        self.format.bytes_for(self.frames_per_chunk)
    }

    /// Name of the driver that opened this device.
    pub fn driver_name(&self) -> &'static str {
        self.driver
    }

    fn backend_mut(&mut self) -> Result<&mut (dyn OutputBackend + 'static)> {
        self.backend.as_deref_mut().ok_or(Error::BadState)
    }

    /// Capacity currently writable without blocking: whole chunks for ring
    /// and blocking backends, empty slots for queue backends.
    ///
    /// On ring backends this also refreshes the driver's availability cache
    /// and must precede [`get_buffer`](Self::get_buffer).
    pub fn check(&mut self) -> Result<usize> {
        self.backend_mut()?.check()
    }

    /// Claim one chunk of hardware memory (mapped-ring devices only).
    pub fn get_buffer(&mut self) -> std::result::Result<ChunkGuard<'_>, Unavailable> {
        match self.backend.as_deref_mut() {
            Some(backend) => backend.get_buffer(),
            None => Err(Unavailable::NotMapped),
        }
    }

    /// Write one caller-owned chunk of exactly
    /// [`chunk_bytes`](Self::chunk_bytes) bytes.
    ///
    /// Only the blocking-write model may block here.
    pub fn queue(&mut self, chunk: &[u8]) -> Result<()> {
        let expected = self.chunk_bytes();
        if chunk.len() != expected {
            return Err(Error::ChunkSize {
                expected,
                actual: chunk.len(),
            });
        }
        self.backend_mut()?.queue(chunk)
    }

    /// Run one service tick: query capacity, then fill and queue every
    /// available chunk. Returns the number of chunks queued.
    ///
    /// Mapped rings are filled in place; other models are filled through a
    /// scratch chunk owned by the device, allocated on first use.
    pub fn service<F>(&mut self, mut fill: F) -> Result<usize>
    where
        F: FnMut(&mut [u8]),
    {
        let available = self.check()?;

        for queued in 0..available {
            if self.model == BufferModel::MappedRing {
                let mut chunk = self.get_buffer()?;
                fill(chunk.bytes_mut());
                chunk.queue()?;
            } else {
                let mut scratch = std::mem::take(&mut self.scratch);
                scratch.resize(self.chunk_bytes(), 0);
                fill(&mut scratch);
                let result = self.queue(&scratch);
                self.scratch = scratch;
                if let Err(err) = result {
                    tracing::debug!(queued, error = %err, "service tick interrupted");
                    return Err(err);
                }
            }
        }

        Ok(available)
    }

    /// Release every native resource.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(backend) = self.backend.take() {
            backend.close();
            tracing::info!(driver = self.driver, model = %self.model, "output device closed");
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("driver", &self.driver)
            .field("format", &self.format)
            .field("class", &self.class)
            .field("model", &self.model)
            .field("frames_per_chunk", &self.frames_per_chunk)
            .field("buffer_count", &self.buffer_count)
            .finish_non_exhaustive()
    }
}
