//! Error taxonomy shared by every output backend.
//!
//! Each backend maps its native fault codes onto [`Error`]. Callers that only
//! care about the coarse category (retry, reopen, give up) match on
//! [`Error::kind`] instead of individual variants.
//!
//! All runtime variants are allocation-free so they can be produced on the
//! audio thread.

use crate::region::Unavailable;
use thiserror::Error;

/// Coarse error category, stable across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request asked for something the hardware cannot provide.
    MisParam,
    /// An allocation failed.
    SysMem,
    /// A native driver call failed while setting up or committing.
    SysLib,
    /// Runtime underrun or short commit. The stream can continue.
    SysRun,
    /// Uncategorized fault: suspend state, short write, buffer shape mismatch.
    Generic,
    /// Contract violation reachable only through caller misuse.
    Internal,
}

impl ErrorKind {
    /// Whether the caller may keep using the device after this error.
    ///
    /// Setup errors are terminal for the `open()` call that produced them and
    /// internal errors indicate a caller bug, so neither is recoverable.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::SysRun | Self::Generic)
    }
}

/// Errors reported by the device contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The requested sample format / channel layout is not supported.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A configuration value is out of range (zero channels, zero chunk, ...).
    #[error("invalid device configuration: {0}")]
    InvalidConfig(&'static str),

    /// Backend state could not be allocated.
    #[error("out of memory")]
    OutOfMemory,

    /// A native driver call failed.
    #[error("driver call '{call}' failed with code {code}")]
    Driver {
        /// Name of the failing driver call.
        call: &'static str,
        /// Native error code (negative errno for PCM drivers).
        code: i32,
    },

    /// The ring accepted only part of a committed chunk.
    #[error("short commit: {committed}/{requested} frames")]
    ShortCommit {
        /// Frames actually committed.
        committed: usize,
        /// Frames in one chunk.
        requested: usize,
    },

    /// The hardware ran out of audio before new data arrived.
    #[error("buffer underrun")]
    Underrun,

    /// The device is suspended and waits for application recovery.
    #[error("device suspended, awaiting recovery")]
    Suspended,

    /// A blocking write accepted fewer frames than requested.
    #[error("short write: {written}/{requested} frames")]
    ShortWrite {
        /// Frames the driver accepted.
        written: usize,
        /// Frames in one chunk.
        requested: usize,
    },

    /// The driver returned an error code while reporting available frames.
    #[error("unable to query available frames (code {0})")]
    Avail(i32),

    /// A queued chunk does not hold exactly one chunk of frames.
    #[error("chunk of {actual} bytes does not match the {expected}-byte chunk size")]
    ChunkSize {
        /// `frames_per_chunk * frame_size`.
        expected: usize,
        /// Length of the slice passed to `queue()`.
        actual: usize,
    },

    /// The ring did not reach the prepared state after priming.
    #[error("device not prepared after priming (state: {0})")]
    NotPrepared(&'static str),

    /// The mapped ring could not hand out a chunk.
    #[error("ring region unavailable: {0}")]
    Unavailable(#[from] Unavailable),

    /// A voice driver call failed.
    #[error("voice call '{call}' failed: {reason}")]
    Voice {
        /// Name of the failing voice call.
        call: &'static str,
        /// Driver error description.
        reason: &'static str,
    },

    /// The driver reports a state in which writing is forbidden.
    #[error("device is not in a writable state")]
    BadState,

    /// `queue()` was called with no empty buffer slot.
    #[error("no empty buffer slot; call check() before queue()")]
    QueueFull,
}

impl Error {
    /// The coarse category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFormat(_) | Self::InvalidConfig(_) => ErrorKind::MisParam,
            Self::OutOfMemory => ErrorKind::SysMem,
            Self::Driver { .. } => ErrorKind::SysLib,
            Self::ShortCommit { .. } | Self::Underrun => ErrorKind::SysRun,
            Self::Suspended
            | Self::ShortWrite { .. }
            | Self::Avail(_)
            | Self::ChunkSize { .. }
            | Self::NotPrepared(_)
            | Self::Unavailable(_)
            | Self::Voice { .. } => ErrorKind::Generic,
            Self::BadState | Self::QueueFull => ErrorKind::Internal,
        }
    }

    /// Create a driver error for a failed native call.
    pub fn driver(call: &'static str, code: i32) -> Self {
        Self::Driver { call, code }
    }
}

/// Convenience result type for device operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            Error::UnsupportedFormat("S24".into()).kind(),
            ErrorKind::MisParam
        );
        assert_eq!(Error::OutOfMemory.kind(), ErrorKind::SysMem);
        assert_eq!(Error::driver("hw_params", -22).kind(), ErrorKind::SysLib);
        assert_eq!(
            Error::ShortCommit {
                committed: 10,
                requested: 256
            }
            .kind(),
            ErrorKind::SysRun
        );
        assert_eq!(Error::Underrun.kind(), ErrorKind::SysRun);
        assert_eq!(Error::Suspended.kind(), ErrorKind::Generic);
        assert_eq!(Error::Avail(-5).kind(), ErrorKind::Generic);
        assert_eq!(Error::BadState.kind(), ErrorKind::Internal);
        assert_eq!(Error::QueueFull.kind(), ErrorKind::Internal);
    }

    #[test]
    fn recoverable_kinds() {
        assert!(ErrorKind::SysRun.is_recoverable());
        assert!(ErrorKind::Generic.is_recoverable());
        assert!(!ErrorKind::SysLib.is_recoverable());
        assert!(!ErrorKind::Internal.is_recoverable());
        assert!(!ErrorKind::MisParam.is_recoverable());
    }

    #[test]
    fn display_includes_counts() {
        let msg = Error::ShortWrite {
            written: 100,
            requested: 256,
        }
        .to_string();
        assert!(msg.contains("100/256"), "got: {msg}");

        let msg = Error::driver("snd_pcm_start", -77).to_string();
        assert!(msg.contains("snd_pcm_start"), "got: {msg}");
        assert!(msg.contains("-77"), "got: {msg}");
    }

    #[test]
    fn unavailable_converts_to_generic() {
        let err: Error = Unavailable::NullMapping.into();
        assert_eq!(err.kind(), ErrorKind::Generic);
    }
}
