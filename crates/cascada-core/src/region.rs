//! Scoped access to one chunk of a memory-mapped hardware ring.
//!
//! A successful `get_buffer()` returns a [`ChunkGuard`] that mutably borrows
//! the device. The guard is the only way to reach the claimed bytes, and it
//! is consumed by [`ChunkGuard::queue`], which commits the chunk. A guard
//! dropped without being queued commits zero frames instead, releasing the
//! claim. Either way exactly one commit follows every claim, and the region
//! cannot be touched after it has been handed back to the hardware.
//!
//! ```rust,ignore
//! let available = device.check()?;
//! for _ in 0..available {
//!     let mut chunk = device.get_buffer()?;
//!     mixer.render(chunk.bytes_mut());
//!     chunk.queue()?;
//! }
//! ```

use crate::Result;
use thiserror::Error;

/// Why a ring region could not be handed out.
///
/// Returned by `get_buffer()` in place of a chunk. The claim has already been
/// released with a zero-length commit when this value is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Unavailable {
    /// The backend does not expose a mapped ring.
    #[error("backend has no mapped ring")]
    NotMapped,

    /// The driver refused to begin a mapped transfer.
    #[error("ring claim failed with code {0}")]
    Claim(i32),

    /// Fewer contiguous frames than one chunk are available.
    #[error("only {available} of {requested} contiguous frames available")]
    ShortRegion {
        /// Contiguous frames the driver offered.
        available: usize,
        /// Frames in one chunk.
        requested: usize,
    },

    /// The channel area does not start or advance on a byte boundary.
    #[error("area not byte aligned (first {first} bits, step {step} bits)")]
    Misaligned {
        /// Bit offset of the first sample.
        first: u32,
        /// Bit distance between consecutive frames.
        step: u32,
    },

    /// The channel area is not laid out as densely interleaved frames.
    #[error("area step of {step} bits is not one {expected}-bit frame")]
    Stride {
        /// Bit distance between consecutive frames.
        step: u32,
        /// Bits in one interleaved frame.
        expected: u32,
    },

    /// The driver reported an area without backing memory.
    #[error("ring is not mapped")]
    NullMapping,
}

/// A ring with one claimed, not yet committed region.
///
/// Implemented by backends that hand out [`ChunkGuard`]s. The methods are
/// only called by the guard, which guarantees that exactly one of
/// [`commit_region`](Self::commit_region) or
/// [`release_region`](Self::release_region) runs per claim.
pub trait MappedRing {
    /// Bytes of the currently claimed region.
    fn region_mut(&mut self) -> &mut [u8];

    /// Commit the whole claimed region to the hardware.
    fn commit_region(&mut self) -> Result<()>;

    /// Give the claimed region back without committing any frames.
    fn release_region(&mut self);
}

/// Writable view of one chunk inside hardware memory.
///
/// Must be consumed by [`queue`](Self::queue) to commit the chunk. Dropping
/// the guard instead releases the claim without playing anything.
#[must_use = "a claimed chunk is released without playing unless it is queued"]
pub struct ChunkGuard<'a> {
    ring: &'a mut dyn MappedRing,
    frames: usize,
    pending: bool,
}

impl<'a> ChunkGuard<'a> {
    /// Wrap a ring whose region for `frames` frames has just been claimed.
    pub fn new(ring: &'a mut dyn MappedRing, frames: usize) -> Self {
        Self {
            ring,
            frames,
            pending: true,
        }
    }

    /// Number of frames in the region.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// The claimed bytes, `frames * frame_size` long.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.ring.region_mut()
    }

    /// Commit the chunk to the hardware.
    pub fn queue(mut self) -> Result<()> {
        self.pending = false;
        self.ring.commit_region()
    }
}

impl Drop for ChunkGuard<'_> {
    fn drop(&mut self) {
        if self.pending {
            self.ring.release_region();
        }
    }
}

impl std::fmt::Debug for ChunkGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkGuard")
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}
