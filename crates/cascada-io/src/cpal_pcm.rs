//! PCM driver for the default cpal output device.
//!
//! The hardware ring is an rtrb byte ring drained by the cpal callback.
//! Blocking writes push straight into it. Mapped access is served from a
//! shadow of the ring with the same frame geometry: `mmap_begin` hands out
//! regions of the shadow and `mmap_commit` copies committed frames into the
//! rtrb ring, so callers see wrap-around exactly where the hardware would.
//!
//! ```text
//!  engine ──writei / mmap_commit──► rtrb::Producer ═══► rtrb::Consumer ──► cpal callback
//!                                      (ring of buffer_count chunks)
//! ```

use crate::host::{self, StreamFlags};
use crate::pcm::{self, Access, ChannelArea, Errno, Pcm, PcmDriver, PcmState};
use cascada_core::{DeviceConfig, Negotiated, OutputDriver, Result, SampleFormat};
use cpal::traits::StreamTrait;
use rtrb::{Consumer, Producer, RingBuffer};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// PCM driver for the default cpal output device.
#[derive(Debug, Default)]
pub struct CpalPcm;

impl CpalPcm {
    /// Create a driver for the default output device.
    pub fn new() -> Self {
        Self
    }
}

impl PcmDriver for CpalPcm {
    type Pcm = CpalPcmHandle;

    fn open_pcm(&mut self, nonblocking: bool) -> std::result::Result<CpalPcmHandle, Errno> {
        let device = host::output_device().ok_or(Errno::ENODEV)?;
        Ok(CpalPcmHandle {
            device,
            nonblocking,
            access: Access::RwInterleaved,
            sample_format: SampleFormat::S16,
            channels: 0,
            buffer_frames: 0,
            frame_rate: 0,
            state: PcmState::Open,
            stream: None,
            ring: None,
            flags: Arc::default(),
        })
    }
}

impl OutputDriver for CpalPcm {
    fn name(&self) -> &'static str {
        "cpal-pcm"
    }

    fn open(&mut self, config: &DeviceConfig) -> Result<Negotiated> {
        pcm::open_pcm(self, config)
    }
}

/// Engine side of the byte ring, plus the shadow served to mapped access.
struct HostRing {
    producer: Producer<u8>,
    /// Empty unless the handle was negotiated for mapped access.
    shadow: Vec<u8>,
    frame_size: usize,
    buffer_frames: usize,
    /// Frames committed through the mapped path.
    appl: usize,
}

impl HostRing {
    /// Ring of `buffer_frames` frames and the consumer the callback drains.
    fn new(buffer_frames: usize, frame_size: usize, mapped: bool) -> (Self, Consumer<u8>) {
        let bytes = buffer_frames * frame_size;
        let (producer, consumer) = RingBuffer::<u8>::new(bytes);
        let ring = Self {
            producer,
            shadow: if mapped { vec![0; bytes] } else { Vec::new() },
            frame_size,
            buffer_frames,
            appl: 0,
        };
        (ring, consumer)
    }

    fn free_frames(&self) -> usize {
        self.producer.slots() / self.frame_size.max(1)
    }

    /// Offset and contiguous length of the next mapped claim of up to `frames`.
    fn claim(&self, frames: usize) -> (usize, usize) {
        let offset = self.appl % self.buffer_frames;
        let frames = frames
            .min(self.buffer_frames - offset)
            .min(self.free_frames());
        (offset, frames)
    }

    fn shadow_mut(&mut self) -> Option<&mut [u8]> {
        if self.shadow.is_empty() {
            None
        } else {
            Some(&mut self.shadow)
        }
    }

    /// Copy up to `frames` committed shadow frames at `offset` into the ring.
    fn commit(&mut self, offset: usize, frames: usize) -> std::result::Result<usize, Errno> {
        let committed = frames.min(self.free_frames());
        if committed == 0 {
            return Ok(0);
        }
        let start = offset * self.frame_size;
        let region = self
            .shadow
            .get(start..start + committed * self.frame_size)
            .ok_or(Errno::EINVAL)?;
        push(&mut self.producer, region)?;
        self.appl += committed;
        Ok(committed)
    }

    fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), Errno> {
        push(&mut self.producer, bytes)
    }
}

/// Copy `bytes` into the ring; the caller has checked for space.
fn push(producer: &mut Producer<u8>, bytes: &[u8]) -> std::result::Result<(), Errno> {
    let mut chunk = producer.write_chunk(bytes.len()).map_err(|_| Errno::EAGAIN)?;
    let (first, second) = chunk.as_mut_slices();
    let split = first.len();
    first.copy_from_slice(&bytes[..split]);
    second.copy_from_slice(&bytes[split..]);
    chunk.commit_all();
    Ok(())
}

/// Callback side: move queued bytes into `out` and pad with silence.
/// Returns `true` when the ring ran dry before `out` was full.
fn drain_into(consumer: &mut Consumer<u8>, out: &mut [u8], silence: u8) -> bool {
    let readable = consumer.slots().min(out.len());
    if let Ok(chunk) = consumer.read_chunk(readable) {
        let (first, second) = chunk.as_slices();
        out[..first.len()].copy_from_slice(first);
        out[first.len()..readable].copy_from_slice(second);
        chunk.commit_all();
    }
    out[readable..].fill(silence);
    readable < out.len()
}

/// Open PCM handle on a cpal output device.
pub struct CpalPcmHandle {
    device: cpal::Device,
    nonblocking: bool,
    access: Access,
    sample_format: SampleFormat,
    channels: u16,
    buffer_frames: usize,
    frame_rate: u32,
    state: PcmState,
    stream: Option<cpal::Stream>,
    ring: Option<HostRing>,
    flags: Arc<StreamFlags>,
}

impl CpalPcmHandle {
    fn frame_size(&self) -> usize {
        self.sample_format.sample_size() * usize::from(self.channels)
    }

    fn free_frames(&self) -> usize {
        self.ring.as_ref().map_or(0, HostRing::free_frames)
    }

    fn ring_duration(&self) -> Duration {
        Duration::from_secs_f64(self.buffer_frames as f64 / f64::from(self.frame_rate.max(1)))
    }
}

impl Pcm for CpalPcmHandle {
    fn set_access(&mut self, access: Access) -> std::result::Result<(), Errno> {
        self.access = access;
        Ok(())
    }

    fn set_format(&mut self, format: SampleFormat) -> std::result::Result<(), Errno> {
        self.sample_format = format;
        Ok(())
    }

    fn set_channels(&mut self, channels: u16) -> std::result::Result<(), Errno> {
        if !host::supports(&self.device, self.sample_format, channels) {
            tracing::debug!(format = %self.sample_format, channels, "layout not supported by device");
            return Err(Errno::EINVAL);
        }
        self.channels = channels;
        Ok(())
    }

    fn set_buffer_size(&mut self, frames: usize) -> std::result::Result<usize, Errno> {
        self.buffer_frames = frames;
        Ok(frames)
    }

    fn set_rate_near(&mut self, rate: u32) -> std::result::Result<u32, Errno> {
        let chosen = host::nearest_rate(&self.device, self.sample_format, self.channels, rate)
            .ok_or(Errno::EINVAL)?;
        self.frame_rate = chosen;
        Ok(chosen)
    }

    fn apply_hw_params(&mut self) -> std::result::Result<(), Errno> {
        let ring_bytes = self
            .buffer_frames
            .checked_mul(self.frame_size())
            .ok_or(Errno::EINVAL)?;
        if ring_bytes == 0 {
            return Err(Errno::EINVAL);
        }
        let mapped = self.access == Access::MmapInterleaved;
        let (ring, mut consumer) = HostRing::new(self.buffer_frames, self.frame_size(), mapped);

        let silence = self.sample_format.silence();
        let flags = Arc::clone(&self.flags);
        let period = u32::try_from(self.buffer_frames / 4).unwrap_or(u32::MAX).max(1);
        let stream = host::build_stream(
            &self.device,
            self.sample_format,
            self.channels,
            self.frame_rate,
            period,
            &self.flags,
            move |out| {
                if drain_into(&mut consumer, out, silence) && flags.primed.load(Ordering::Acquire) {
                    flags.xrun.store(true, Ordering::Release);
                }
            },
        )
        .map_err(|err| {
            tracing::warn!(%err, "failed to build output stream");
            Errno::EIO
        })?;
        if let Err(err) = stream.pause() {
            tracing::debug!(%err, "stream cannot be paused before start");
        }

        self.ring = Some(ring);
        self.stream = Some(stream);
        self.state = PcmState::Prepared;
        Ok(())
    }

    fn state(&self) -> PcmState {
        if self.flags.failed() {
            PcmState::Disconnected
        } else {
            self.state
        }
    }

    fn start(&mut self) -> std::result::Result<(), Errno> {
        let stream = self.stream.as_ref().ok_or(Errno::EBADFD)?;
        stream.play().map_err(|err| {
            tracing::warn!(%err, "failed to start output stream");
            Errno::EIO
        })?;
        self.state = PcmState::Running;
        Ok(())
    }

    fn avail(&mut self) -> std::result::Result<usize, Errno> {
        if self.flags.failed() {
            return Err(Errno::ENODEV);
        }
        Ok(self.free_frames())
    }

    fn mmap_begin(&mut self, frames: usize) -> std::result::Result<ChannelArea, Errno> {
        if self.access != Access::MmapInterleaved {
            return Err(Errno::EBADFD);
        }
        let ring = self.ring.as_ref().ok_or(Errno::EBADFD)?;
        let step = u32::try_from(self.frame_size() * 8).map_err(|_| Errno::EINVAL)?;
        let (offset, frames) = ring.claim(frames);
        Ok(ChannelArea {
            offset,
            frames,
            first: 0,
            step,
        })
    }

    fn mmap_bytes(&mut self) -> Option<&mut [u8]> {
        self.ring.as_mut().and_then(HostRing::shadow_mut)
    }

    fn mmap_commit(&mut self, offset: usize, frames: usize) -> std::result::Result<usize, Errno> {
        let ring = self.ring.as_mut().ok_or(Errno::EBADFD)?;
        let committed = ring.commit(offset, frames)?;
        if committed > 0 {
            self.flags.primed.store(true, Ordering::Release);
        }
        Ok(committed)
    }

    fn writei(&mut self, data: &[u8], frames: usize) -> std::result::Result<usize, Errno> {
        if self.access != Access::RwInterleaved {
            return Err(Errno::EBADFD);
        }
        if self.flags.failed() {
            return Err(Errno::ENODEV);
        }
        if self.flags.take_xrun() {
            return Err(Errno::EPIPE);
        }

        let bytes = data.get(..frames * self.frame_size()).ok_or(Errno::EINVAL)?;
        let poll = self.ring_duration() / 8;
        while self.free_frames() < frames {
            if self.nonblocking {
                return Err(Errno::EAGAIN);
            }
            if self.flags.failed() {
                return Err(Errno::ENODEV);
            }
            std::thread::sleep(poll);
        }
        self.ring.as_mut().ok_or(Errno::EBADFD)?.write(bytes)?;
        self.flags.primed.store(true, Ordering::Release);

        if self.state == PcmState::Prepared {
            self.start()?;
        }
        Ok(frames)
    }

    fn drain(&mut self) {
        if self.state != PcmState::Running {
            return;
        }
        let capacity = self.buffer_frames;
        let deadline = Instant::now() + self.ring_duration() * 2;
        while self.free_frames() < capacity && !self.flags.failed() && Instant::now() < deadline {
            std::thread::sleep(self.ring_duration() / 8);
        }
        self.state = PcmState::Setup;
    }

    fn close(self) {
        if let Some(Err(err)) = self.stream.as_ref().map(StreamTrait::pause) {
            tracing::debug!(%err, "stream did not pause on close");
        }
        tracing::debug!("cpal pcm closed");
    }
}
