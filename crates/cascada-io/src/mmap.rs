//! Memory-mapped ring backend.
//!
//! The device exposes its hardware ring directly. `get_buffer()` claims one
//! chunk of it with `mmap_begin`, the caller renders into the claimed bytes,
//! and `queue()` commits them with `mmap_commit`. At open one chunk of
//! silence is committed before the stream is started so the hardware never
//! begins on an empty ring.

use crate::pcm::{self, Access, ChannelArea, Errno, Pcm, PcmDriver, PcmState};
use cascada_core::{
    AudioFormat, BufferModel, ChunkGuard, DeviceClass, DeviceConfig, DeviceState, Error,
    MappedRing, Negotiated, OutputBackend, Result, Unavailable,
};
use std::ops::Range;

const AVAIL: &str = "pcm_avail_update";
const MMAP_BEGIN: &str = "pcm_mmap_begin";
const MMAP_COMMIT: &str = "pcm_mmap_commit";
const START: &str = "pcm_start";

pub(crate) struct MmapBackend<P> {
    pcm: P,
    format: AudioFormat,
    frames_per_chunk: usize,
    /// Ring offset of the current claim.
    offset: usize,
    /// Byte range of the current claim inside the mapped ring.
    region: Range<usize>,
    state: DeviceState,
}

impl<P: Pcm + 'static> MmapBackend<P> {
    pub(crate) fn open<D>(driver: &mut D, config: &DeviceConfig) -> Result<Negotiated>
    where
        D: PcmDriver<Pcm = P> + ?Sized,
    {
        let mut pcm = driver
            .open_pcm(true)
            .map_err(|errno| Error::driver(pcm::OPEN, errno.code()))?;

        let format = match Self::prepare(&mut pcm, config) {
            Ok(format) => format,
            Err(err) => {
                pcm::discard(pcm);
                return Err(err);
            }
        };

        Ok(Negotiated {
            format,
            class: DeviceClass::PushAsync,
            backend: Box::new(Self {
                pcm,
                format,
                frames_per_chunk: config.frames_per_chunk,
                offset: 0,
                region: 0..0,
                state: DeviceState::Running,
            }),
        })
    }

    /// Negotiate, prime one chunk of silence and start the stream.
    fn prepare(pcm: &mut P, config: &DeviceConfig) -> Result<AudioFormat> {
        let format = pcm::negotiate(pcm, Access::MmapInterleaved, config)?;

        pcm.avail()
            .map_err(|errno| Error::driver(AVAIL, errno.code()))?;
        let area = pcm
            .mmap_begin(config.frames_per_chunk)
            .map_err(|errno| Error::driver(MMAP_BEGIN, errno.code()))?;

        let start = area.first as usize / 8 + format.bytes_for(area.offset);
        let end = start + format.bytes_for(area.frames);
        if let Some(bytes) = pcm.mmap_bytes().and_then(|ring| ring.get_mut(start..end)) {
            bytes.fill(format.sample_format.silence());
        }
        pcm.mmap_commit(area.offset, area.frames)
            .map_err(|errno| Error::driver(MMAP_COMMIT, errno.code()))?;
        tracing::debug!(frames = area.frames, "ring primed with silence");

        let state = pcm.state();
        if state != PcmState::Prepared {
            tracing::error!(state = state.name(), "ring not prepared after priming");
            return Err(Error::NotPrepared(state.name()));
        }
        pcm.start()
            .map_err(|errno| Error::driver(START, errno.code()))?;

        Ok(format)
    }

    /// Validate a claimed area and locate its bytes in the mapped ring.
    fn locate(&mut self, area: &ChannelArea) -> std::result::Result<Range<usize>, Unavailable> {
        let requested = self.frames_per_chunk;
        if area.frames < requested {
            tracing::warn!(available = area.frames, requested, "short ring region");
            return Err(Unavailable::ShortRegion {
                available: area.frames,
                requested,
            });
        }
        if area.first % 8 != 0 || area.step % 8 != 0 {
            tracing::error!(first = area.first, step = area.step, "ring area not byte aligned");
            return Err(Unavailable::Misaligned {
                first: area.first,
                step: area.step,
            });
        }
        let frame_bits = u32::try_from(self.format.frame_size() * 8).unwrap_or(u32::MAX);
        if area.step != frame_bits {
            tracing::error!(step = area.step, expected = frame_bits, "ring area not interleaved");
            return Err(Unavailable::Stride {
                step: area.step,
                expected: frame_bits,
            });
        }

        let start = area.first as usize / 8 + self.format.bytes_for(area.offset);
        let end = start + self.format.bytes_for(requested);
        let Some(ring) = self.pcm.mmap_bytes() else {
            tracing::error!("ring claimed but not mapped");
            return Err(Unavailable::NullMapping);
        };
        if end > ring.len() {
            tracing::error!(end, mapped = ring.len(), "ring region exceeds mapping");
            return Err(Unavailable::NullMapping);
        }
        Ok(start..end)
    }
}

impl<P: Pcm> MappedRing for MmapBackend<P> {
    fn region_mut(&mut self) -> &mut [u8] {
        let region = self.region.clone();
        self.pcm
            .mmap_bytes()
            .and_then(|ring| ring.get_mut(region))
            .unwrap_or_default()
    }

    fn commit_region(&mut self) -> Result<()> {
        let requested = self.frames_per_chunk;
        match self.pcm.mmap_commit(self.offset, requested) {
            Ok(committed) if committed == requested => Ok(()),
            Ok(committed) if committed > requested => {
                tracing::warn!(committed, requested, "ring commit reported more than requested");
                Err(Error::driver(MMAP_COMMIT, Errno::EINVAL.code()))
            }
            Ok(committed) => {
                tracing::warn!(committed, requested, "short ring commit");
                Err(Error::ShortCommit {
                    committed,
                    requested,
                })
            }
            Err(errno) => {
                tracing::warn!(code = errno.code(), "ring commit failed");
                Err(Error::driver(MMAP_COMMIT, errno.code()))
            }
        }
    }

    fn release_region(&mut self) {
        match self.pcm.mmap_commit(self.offset, 0) {
            Ok(0) => {}
            Ok(committed) => tracing::warn!(committed, "releasing empty claim committed frames"),
            Err(errno) => tracing::warn!(code = errno.code(), "releasing empty claim failed"),
        }
    }
}

impl<P: Pcm + 'static> OutputBackend for MmapBackend<P> {
    fn model(&self) -> BufferModel {
        BufferModel::MappedRing
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn check(&mut self) -> Result<usize> {
        let avail = self.pcm.avail().map_err(|errno| {
            tracing::warn!(code = errno.code(), "available frame query failed");
            Error::Avail(errno.code())
        })?;
        Ok(avail / self.frames_per_chunk)
    }

    fn get_buffer(&mut self) -> std::result::Result<ChunkGuard<'_>, Unavailable> {
        let area = self
            .pcm
            .mmap_begin(self.frames_per_chunk)
            .map_err(|errno| Unavailable::Claim(errno.code()))?;
        self.offset = area.offset;

        match self.locate(&area) {
            Ok(region) => {
                self.region = region;
                let frames = self.frames_per_chunk;
                Ok(ChunkGuard::new(self, frames))
            }
            Err(reason) => {
                self.release_region();
                Err(reason)
            }
        }
    }

    fn queue(&mut self, chunk: &[u8]) -> Result<()> {
        let mut guard = self.get_buffer()?;
        let region = guard.bytes_mut();
        if region.len() != chunk.len() {
            return Err(Error::ChunkSize {
                expected: region.len(),
                actual: chunk.len(),
            });
        }
        region.copy_from_slice(chunk);
        guard.queue()
    }

    fn close(self: Box<Self>) {
        pcm::discard(self.pcm);
    }
}
