//! Voice driver seam shaped after OpenAL's streaming API.
//!
//! A [`VoiceDriver`] opens a device with a current context. The resulting
//! [`Voice`] owns generated buffers and one playback source; filled buffers
//! are queued on the source and handed back once played. The buffer-queue
//! backend in [`crate::queue`] cycles a fixed set of buffers through that
//! source.

use crate::queue::QueueBackend;
use cascada_core::{AudioFormat, DeviceConfig, Negotiated, Result, SampleFormat};
use thiserror::Error;

/// Error state reported by a voice driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum VoiceError {
    /// No output device or context could be opened.
    #[error("no device")]
    NoDevice,
    /// A buffer or source id that does not exist.
    #[error("invalid name")]
    InvalidName,
    /// A format or parameter the driver does not know.
    #[error("invalid enum")]
    InvalidEnum,
    /// A value outside the accepted range.
    #[error("invalid value")]
    InvalidValue,
    /// A call not allowed in the current state.
    #[error("invalid operation")]
    InvalidOperation,
    /// The driver could not allocate.
    #[error("out of memory")]
    OutOfMemory,
}

impl VoiceError {
    /// Numeric code in the OpenAL error space.
    pub const fn code(self) -> i32 {
        match self {
            Self::InvalidName => 0xA001,
            Self::InvalidEnum => 0xA002,
            Self::InvalidValue => 0xA003,
            Self::InvalidOperation => 0xA004,
            Self::OutOfMemory => 0xA005,
            Self::NoDevice => -1,
        }
    }

    /// Static description, suitable for allocation-free error values.
    pub const fn description(self) -> &'static str {
        match self {
            Self::NoDevice => "no device",
            Self::InvalidName => "invalid name",
            Self::InvalidEnum => "invalid enum",
            Self::InvalidValue => "invalid value",
            Self::InvalidOperation => "invalid operation",
            Self::OutOfMemory => "out of memory",
        }
    }
}

/// Sample layout of one voice buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceFormat {
    /// One channel of unsigned 8-bit samples.
    Mono8,
    /// Two channels of unsigned 8-bit samples.
    Stereo8,
    /// One channel of signed 16-bit samples.
    Mono16,
    /// Two channels of signed 16-bit samples.
    Stereo16,
    /// One channel of 32-bit float samples.
    MonoFloat32,
    /// Two channels of 32-bit float samples.
    StereoFloat32,
}

impl VoiceFormat {
    /// Map an interleaved PCM format onto a voice buffer format.
    ///
    /// Only mono and stereo are representable. 32-bit float is available only
    /// when the driver advertises it.
    pub fn for_format(format: &AudioFormat, float: bool) -> Option<Self> {
        match (format.sample_format, format.channels) {
            (SampleFormat::U8, 1) => Some(Self::Mono8),
            (SampleFormat::U8, 2) => Some(Self::Stereo8),
            (SampleFormat::S16, 1) => Some(Self::Mono16),
            (SampleFormat::S16, 2) => Some(Self::Stereo16),
            (SampleFormat::F32, 1) if float => Some(Self::MonoFloat32),
            (SampleFormat::F32, 2) if float => Some(Self::StereoFloat32),
            _ => None,
        }
    }

    /// Interleaved channel count.
    pub const fn channels(self) -> u16 {
        match self {
            Self::Mono8 | Self::Mono16 | Self::MonoFloat32 => 1,
            Self::Stereo8 | Self::Stereo16 | Self::StereoFloat32 => 2,
        }
    }

    /// Encoding of each sample.
    pub const fn sample_format(self) -> SampleFormat {
        match self {
            Self::Mono8 | Self::Stereo8 => SampleFormat::U8,
            Self::Mono16 | Self::Stereo16 => SampleFormat::S16,
            Self::MonoFloat32 | Self::StereoFloat32 => SampleFormat::F32,
        }
    }
}

/// Handle of a generated voice buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Handle of a generated playback source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SourceId(pub u32);

/// Playback state of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceState {
    /// Never played.
    Initial,
    /// Playing queued buffers.
    Playing,
    /// Paused by the application.
    Paused,
    /// Ran out of queued buffers, or was stopped.
    Stopped,
}

/// An open device with a current context.
pub trait Voice {
    /// Place the listener at the origin, facing forward.
    fn set_listener_origin(&mut self) -> std::result::Result<(), VoiceError>;

    /// Generate one buffer per element of `out`. Either all are generated or none.
    fn gen_buffers(&mut self, out: &mut [BufferId]) -> std::result::Result<(), VoiceError>;
    /// Delete buffers; unknown ids are ignored.
    fn delete_buffers(&mut self, buffers: &[BufferId]);

    /// Generate the playback source.
    fn gen_source(&mut self) -> std::result::Result<SourceId, VoiceError>;
    /// Stop and delete `source`.
    fn delete_source(&mut self, source: SourceId);

    /// Upload interleaved frames into `buffer`.
    fn buffer_data(
        &mut self,
        buffer: BufferId,
        format: VoiceFormat,
        data: &[u8],
        frame_rate: u32,
    ) -> std::result::Result<(), VoiceError>;

    /// Append a filled buffer to the source's queue.
    fn queue_buffer(&mut self, source: SourceId, buffer: BufferId) -> std::result::Result<(), VoiceError>;

    /// Take back the oldest processed buffer.
    fn unqueue_buffer(&mut self, source: SourceId) -> std::result::Result<BufferId, VoiceError>;

    /// Buffers played to completion and not yet unqueued.
    fn buffers_processed(&mut self, source: SourceId) -> std::result::Result<usize, VoiceError>;

    /// Current playback state of `source`.
    fn source_state(&mut self, source: SourceId) -> std::result::Result<SourceState, VoiceError>;
    /// Start or resume playback of `source`.
    fn play(&mut self, source: SourceId) -> std::result::Result<(), VoiceError>;

    /// Destroy the context and close the device.
    fn close(self);
}

/// Connection to a voice device family.
pub trait VoiceDriver {
    /// Open device handle.
    type Voice: Voice + 'static;

    /// Whether buffers may hold 32-bit float samples.
    fn supports_float(&self) -> bool {
        false
    }

    /// Open the default device and make a context for `format` at
    /// `frame_rate` current.
    ///
    /// On error the driver has released whatever it acquired.
    fn open_voice(
        &mut self,
        format: VoiceFormat,
        frame_rate: u32,
    ) -> std::result::Result<Self::Voice, VoiceError>;
}

/// Open a buffer-queue device for `config`.
///
/// The voice backend has no mapped ring, so every class is served by the
/// same queue of `buffer_count` slots.
pub fn open_voice<D: VoiceDriver + ?Sized>(driver: &mut D, config: &DeviceConfig) -> Result<Negotiated> {
    QueueBackend::open(driver, config)
}
