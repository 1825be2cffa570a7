//! PCM driver seam shaped after ALSA's hardware-parameter API.
//!
//! A [`PcmDriver`] opens handles to the default playback device. A [`Pcm`]
//! handle is negotiated step by step (access, format, channels, buffer size,
//! rate) and then driven either through a memory-mapped ring
//! ([`crate::mmap`]) or through blocking interleaved writes
//! ([`crate::blocking`]). [`open_pcm`] picks between the two from the
//! requested [`DeviceClass`].
//!
//! Driver calls report failures as [`Errno`] values; the backends translate
//! them into [`cascada_core::Error`].

use crate::blocking::BlockingBackend;
use crate::mmap::MmapBackend;
use cascada_core::{AudioFormat, DeviceClass, DeviceConfig, Error, Negotiated, Result, SampleFormat};
use std::fmt;

/// Errno-style code reported by a PCM driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(pub i32);

impl Errno {
    /// Interrupted call.
    pub const EINTR: Self = Self(4);
    /// I/O error.
    pub const EIO: Self = Self(5);
    /// Resource temporarily unavailable (non-blocking handle is full).
    pub const EAGAIN: Self = Self(11);
    /// Out of memory.
    pub const ENOMEM: Self = Self(12);
    /// No such device.
    pub const ENODEV: Self = Self(19);
    /// Invalid argument.
    pub const EINVAL: Self = Self(22);
    /// Broken pipe: the stream underran.
    pub const EPIPE: Self = Self(32);
    /// File descriptor in bad state: writing is not allowed now.
    pub const EBADFD: Self = Self(77);
    /// Stream is suspended.
    pub const ESTRPIPE: Self = Self(86);

    /// The negative code native PCM libraries return.
    pub fn code(self) -> i32 {
        -self.0
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errno {}", self.0)
    }
}

impl std::error::Error for Errno {}

/// Transfer method requested during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Interleaved frames written in place through a mapped ring.
    MmapInterleaved,
    /// Interleaved frames copied in by blocking writes.
    RwInterleaved,
}

/// State of a PCM handle as the driver reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcmState {
    /// Opened, no parameters installed.
    Open,
    /// Parameters installed but not prepared.
    Setup,
    /// Ready to start.
    Prepared,
    /// Playing.
    Running,
    /// Underrun; needs recovery before more frames are accepted.
    Xrun,
    /// Playing out what is queued before stopping.
    Draining,
    /// Paused by the application.
    Paused,
    /// Suspended by power management.
    Suspended,
    /// The device went away.
    Disconnected,
}

impl PcmState {
    /// Lowercase state name, as ALSA prints it.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Setup => "setup",
            Self::Prepared => "prepared",
            Self::Running => "running",
            Self::Xrun => "xrun",
            Self::Draining => "draining",
            Self::Paused => "paused",
            Self::Suspended => "suspended",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Location of a claimed ring region, as returned by [`Pcm::mmap_begin`].
///
/// `first` and `step` are in bits, like ALSA channel areas. For densely
/// interleaved frames `first` is 0 and `step` is one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelArea {
    /// Frame offset of the region inside the ring.
    pub offset: usize,
    /// Contiguous frames available from `offset`.
    pub frames: usize,
    /// Bit offset of the first sample.
    pub first: u32,
    /// Bit distance between consecutive frames.
    pub step: u32,
}

/// One open PCM playback handle.
pub trait Pcm {
    /// Select the transfer method.
    fn set_access(&mut self, access: Access) -> std::result::Result<(), Errno>;
    /// Select the sample encoding.
    fn set_format(&mut self, format: SampleFormat) -> std::result::Result<(), Errno>;
    /// Select the interleaved channel count.
    fn set_channels(&mut self, channels: u16) -> std::result::Result<(), Errno>;

    /// Request a ring of `frames` frames; returns the size granted.
    fn set_buffer_size(&mut self, frames: usize) -> std::result::Result<usize, Errno>;

    /// Request a frame rate; returns the nearest rate the hardware accepts.
    fn set_rate_near(&mut self, rate: u32) -> std::result::Result<u32, Errno>;

    /// Install the negotiated parameters. Moves the handle to `Prepared`.
    fn apply_hw_params(&mut self) -> std::result::Result<(), Errno>;

    /// Current handle state.
    fn state(&self) -> PcmState;
    /// Start playback of the queued frames.
    fn start(&mut self) -> std::result::Result<(), Errno>;

    /// Frames writable without blocking.
    fn avail(&mut self) -> std::result::Result<usize, Errno>;

    /// Claim up to `frames` contiguous frames of the mapped ring.
    fn mmap_begin(&mut self, frames: usize) -> std::result::Result<ChannelArea, Errno>;

    /// The whole mapped ring, or `None` if nothing is mapped.
    fn mmap_bytes(&mut self) -> Option<&mut [u8]>;

    /// Commit `frames` frames of the claim at `offset`; returns frames committed.
    /// Committing zero frames releases the claim.
    fn mmap_commit(&mut self, offset: usize, frames: usize) -> std::result::Result<usize, Errno>;

    /// Write `frames` interleaved frames from `data`; returns frames written.
    fn writei(&mut self, data: &[u8], frames: usize) -> std::result::Result<usize, Errno>;

    /// Let queued frames finish playing.
    fn drain(&mut self);

    /// Release the handle.
    fn close(self);
}

/// Connection to a PCM device family.
pub trait PcmDriver {
    /// Open playback handle.
    type Pcm: Pcm + 'static;

    /// Open the default playback device.
    fn open_pcm(&mut self, nonblocking: bool) -> std::result::Result<Self::Pcm, Errno>;
}

pub(crate) const OPEN: &str = "pcm_open";
pub(crate) const SET_ACCESS: &str = "hw_params_set_access";
const SET_FORMAT: &str = "hw_params_set_format";
const SET_CHANNELS: &str = "hw_params_set_channels";
const SET_BUFFER_SIZE: &str = "hw_params_set_buffer_size";
const SET_RATE_NEAR: &str = "hw_params_set_rate_near";
const APPLY: &str = "hw_params";

fn failed(call: &'static str) -> impl Fn(Errno) -> Error {
    move |errno| {
        tracing::warn!(call, code = errno.code(), "pcm negotiation failed");
        Error::driver(call, errno.code())
    }
}

/// Negotiate hardware parameters for `access`; returns the accepted format.
///
/// The ring holds `buffer_count` chunks.
pub(crate) fn negotiate<P: Pcm>(
    pcm: &mut P,
    access: Access,
    config: &DeviceConfig,
) -> Result<AudioFormat> {
    pcm.set_access(access).map_err(failed(SET_ACCESS))?;
    pcm.set_format(config.format.sample_format)
        .map_err(failed(SET_FORMAT))?;
    pcm.set_channels(config.format.channels)
        .map_err(failed(SET_CHANNELS))?;

    let requested = config.frames_per_chunk * config.buffer_count;
    let granted = pcm
        .set_buffer_size(requested)
        .map_err(failed(SET_BUFFER_SIZE))?;
    if granted != requested {
        tracing::debug!(requested, granted, "ring size adjusted");
    }

    let frame_rate = pcm
        .set_rate_near(config.format.frame_rate)
        .map_err(failed(SET_RATE_NEAR))?;
    pcm.apply_hw_params().map_err(failed(APPLY))?;

    Ok(AudioFormat {
        frame_rate,
        ..config.format
    })
}

/// Open a PCM device for `config`.
///
/// [`DeviceClass::PushAsync`] asks for a non-blocking handle with mapped
/// access. If the driver rejects mapped access the handle is closed,
/// reopened blocking and negotiated for read/write access instead; the
/// result then reports [`DeviceClass::PushSync`]. Every other class goes
/// straight to blocking writes.
pub fn open_pcm<D: PcmDriver + ?Sized>(driver: &mut D, config: &DeviceConfig) -> Result<Negotiated> {
    if config.class != DeviceClass::PushAsync {
        return BlockingBackend::open(driver, config);
    }

    match MmapBackend::open(driver, config) {
        Err(Error::Driver {
            call: SET_ACCESS,
            code,
        }) => {
            tracing::warn!(code, "mapped access rejected, falling back to blocking writes");
            BlockingBackend::open(driver, &config.with_class(DeviceClass::PushSync))
        }
        opened => opened,
    }
}

/// Release a handle whose negotiation failed.
pub(crate) fn discard<P: Pcm>(mut pcm: P) {
    pcm.drain();
    pcm.close();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_code_is_negative() {
        assert_eq!(Errno::EPIPE.code(), -32);
        assert_eq!(Errno::EBADFD.code(), -77);
        assert_eq!(Errno::ESTRPIPE.to_string(), "errno 86");
    }

    #[test]
    fn state_names() {
        assert_eq!(PcmState::Prepared.name(), "prepared");
        assert_eq!(PcmState::Xrun.name(), "xrun");
    }
}
