//! PCM driver that renders into a WAV file.
//!
//! [`WavSink`] speaks the read/write half of the PCM seam: every chunk
//! handed to `writei` is appended to the file via hound. The file never
//! fills up, so `avail` always reports the whole ring and output never
//! backpressures. Mapped access is refused, which makes a push-async open
//! fall back to blocking writes.

use crate::pcm::{self, Access, ChannelArea, Errno, Pcm, PcmDriver, PcmState};
use cascada_core::{DeviceConfig, Negotiated, OutputDriver, Result, SampleFormat};
use hound::WavWriter;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// PCM driver writing to a WAV file.
#[derive(Debug, Clone)]
pub struct WavSink {
    path: PathBuf,
}

impl WavSink {
    /// A sink creating (or truncating) `path` when a device is opened.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// File the sink renders to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PcmDriver for WavSink {
    type Pcm = WavPcm;

    fn open_pcm(&mut self, _nonblocking: bool) -> std::result::Result<WavPcm, Errno> {
        Ok(WavPcm {
            path: self.path.clone(),
            sample_format: SampleFormat::S16,
            channels: 0,
            buffer_frames: 0,
            frame_rate: 0,
            state: PcmState::Open,
            writer: None,
            frames_written: 0,
        })
    }
}

impl OutputDriver for WavSink {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn open(&mut self, config: &DeviceConfig) -> Result<Negotiated> {
        pcm::open_pcm(self, config)
    }
}

/// hound spec for an interleaved PCM layout.
fn wav_spec(format: SampleFormat, channels: u16, frame_rate: u32) -> hound::WavSpec {
    let (bits_per_sample, sample_format) = match format {
        SampleFormat::U8 => (8, hound::SampleFormat::Int),
        SampleFormat::S16 => (16, hound::SampleFormat::Int),
        SampleFormat::S32 => (32, hound::SampleFormat::Int),
        SampleFormat::F32 => (32, hound::SampleFormat::Float),
    };
    hound::WavSpec {
        channels,
        sample_rate: frame_rate,
        bits_per_sample,
        sample_format,
    }
}

/// Open WAV output.
pub struct WavPcm {
    path: PathBuf,
    sample_format: SampleFormat,
    channels: u16,
    buffer_frames: usize,
    frame_rate: u32,
    state: PcmState,
    writer: Option<WavWriter<BufWriter<File>>>,
    frames_written: u64,
}

impl WavPcm {
    fn write_samples(&mut self, bytes: &[u8]) -> std::result::Result<(), hound::Error> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        match self.sample_format {
            // hound stores 8-bit WAV as unsigned and takes signed samples
            SampleFormat::U8 => {
                for &byte in bytes {
                    writer.write_sample((byte ^ 0x80) as i8)?;
                }
            }
            SampleFormat::S16 => {
                for sample in bytes.chunks_exact(2) {
                    writer.write_sample(i16::from_ne_bytes([sample[0], sample[1]]))?;
                }
            }
            SampleFormat::S32 => {
                for sample in bytes.chunks_exact(4) {
                    writer.write_sample(i32::from_ne_bytes([sample[0], sample[1], sample[2], sample[3]]))?;
                }
            }
            SampleFormat::F32 => {
                for sample in bytes.chunks_exact(4) {
                    writer.write_sample(f32::from_ne_bytes([sample[0], sample[1], sample[2], sample[3]]))?;
                }
            }
        }
        Ok(())
    }
}

impl Pcm for WavPcm {
    fn set_access(&mut self, access: Access) -> std::result::Result<(), Errno> {
        match access {
            Access::RwInterleaved => Ok(()),
            Access::MmapInterleaved => Err(Errno::EINVAL),
        }
    }

    fn set_format(&mut self, format: SampleFormat) -> std::result::Result<(), Errno> {
        self.sample_format = format;
        Ok(())
    }

    fn set_channels(&mut self, channels: u16) -> std::result::Result<(), Errno> {
        if channels == 0 {
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
        self.frame_rate = rate;
        Ok(rate)
    }

    fn apply_hw_params(&mut self) -> std::result::Result<(), Errno> {
        let spec = wav_spec(self.sample_format, self.channels, self.frame_rate);
        let writer = WavWriter::create(&self.path, spec).map_err(|err| {
            tracing::warn!(path = %self.path.display(), %err, "failed to create wav file");
            Errno::EIO
        })?;
        self.writer = Some(writer);
        self.state = PcmState::Prepared;
        Ok(())
    }

    fn state(&self) -> PcmState {
        self.state
    }

    fn start(&mut self) -> std::result::Result<(), Errno> {
        self.state = PcmState::Running;
        Ok(())
    }

    fn avail(&mut self) -> std::result::Result<usize, Errno> {
        Ok(self.buffer_frames)
    }

    fn mmap_begin(&mut self, _frames: usize) -> std::result::Result<ChannelArea, Errno> {
        Err(Errno::EBADFD)
    }

    fn mmap_bytes(&mut self) -> Option<&mut [u8]> {
        None
    }

    fn mmap_commit(&mut self, _offset: usize, _frames: usize) -> std::result::Result<usize, Errno> {
        Err(Errno::EBADFD)
    }

    fn writei(&mut self, data: &[u8], frames: usize) -> std::result::Result<usize, Errno> {
        if self.writer.is_none() {
            return Err(Errno::EBADFD);
        }
        let frame_size = self.sample_format.sample_size() * usize::from(self.channels);
        let bytes = data.get(..frames * frame_size).ok_or(Errno::EINVAL)?;
        self.write_samples(bytes).map_err(|err| {
            tracing::warn!(%err, "wav write failed");
            Errno::EIO
        })?;
        self.frames_written += frames as u64;
        self.state = PcmState::Running;
        Ok(frames)
    }

    fn drain(&mut self) {
        if let Some(Err(err)) = self.writer.as_mut().map(WavWriter::flush) {
            tracing::warn!(%err, "wav flush failed");
        }
    }

    fn close(self) {
        let Some(writer) = self.writer else {
            return;
        };
        match writer.finalize() {
            Ok(()) => tracing::info!(
                path = %self.path.display(),
                frames = self.frames_written,
                "wav file written"
            ),
            Err(err) => tracing::warn!(path = %self.path.display(), %err, "failed to finalize wav file"),
        }
    }
}
