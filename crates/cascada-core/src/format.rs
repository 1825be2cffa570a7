//! PCM format descriptor.
//!
//! [`AudioFormat`] is a plain value type: the caller builds one, `open()`
//! negotiates it against the hardware, and the [`Device`](crate::Device)
//! reports the negotiated result (the frame rate may have been moved to the
//! nearest rate the hardware supports).

use crate::Error;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Sample encoding of one channel of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SampleFormat {
    /// Unsigned 8-bit, silence at 0x80.
    U8,
    /// Signed 16-bit, native endian.
    #[default]
    S16,
    /// Signed 32-bit, native endian.
    S32,
    /// IEEE 754 single precision, native endian.
    F32,
}

impl SampleFormat {
    /// Every supported sample format.
    pub const ALL: [Self; 4] = [Self::U8, Self::S16, Self::S32, Self::F32];

    /// Size of one sample in bytes.
    pub const fn sample_size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
        }
    }

    /// Byte value that encodes silence in every byte of a sample.
    pub const fn silence(self) -> u8 {
        match self {
            Self::U8 => 0x80,
            Self::S16 | Self::S32 | Self::F32 => 0,
        }
    }

    /// Short lowercase name, as used in configuration files.
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::S16 => "s16",
            Self::S32 => "s32",
            Self::F32 => "f32",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "u8" => Ok(Self::U8),
            "s16" | "i16" => Ok(Self::S16),
            "s32" | "i32" => Ok(Self::S32),
            "f32" | "float" => Ok(Self::F32),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Interleaved PCM format: sample encoding, channel count and frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    /// Encoding of each sample.
    pub sample_format: SampleFormat,
    /// Number of interleaved channels per frame.
    pub channels: u16,
    /// Frames per second.
    pub frame_rate: u32,
}

impl AudioFormat {
    /// Create a format descriptor.
    pub const fn new(sample_format: SampleFormat, channels: u16, frame_rate: u32) -> Self {
        Self {
            sample_format,
            channels,
            frame_rate,
        }
    }

    /// Size of one sample in bytes.
    pub const fn sample_size(&self) -> usize {
        self.sample_format.sample_size()
    }

    /// Size of one interleaved frame in bytes.
    pub const fn frame_size(&self) -> usize {
        self.sample_format.sample_size() * self.channels as usize
    }

    /// Number of bytes occupied by `frames` frames.
    pub const fn bytes_for(&self, frames: usize) -> usize {
        frames * self.frame_size()
    }

    /// Number of whole frames contained in `bytes` bytes.
    pub const fn frames_in(&self, bytes: usize) -> usize {
        match self.frame_size() {
            0 => 0,
            size => bytes / size,
        }
    }

    /// Playback duration of `frames` frames.
    pub fn duration_of(&self, frames: usize) -> Duration {
        if self.frame_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / f64::from(self.frame_rate))
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::new(SampleFormat::S16, 2, 48000)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}ch {} Hz",
            self.sample_format, self.channels, self.frame_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_sizes() {
        assert_eq!(SampleFormat::U8.sample_size(), 1);
        assert_eq!(SampleFormat::S16.sample_size(), 2);
        assert_eq!(SampleFormat::S32.sample_size(), 4);
        assert_eq!(SampleFormat::F32.sample_size(), 4);
    }

    #[test]
    fn frame_size_is_sample_size_times_channels() {
        let format = AudioFormat::new(SampleFormat::S16, 2, 48000);
        assert_eq!(format.frame_size(), 4);
        assert_eq!(format.bytes_for(256), 1024);

        let format = AudioFormat::new(SampleFormat::F32, 6, 96000);
        assert_eq!(format.frame_size(), 24);
    }

    #[test]
    fn frames_in_ignores_partial_frames() {
        let format = AudioFormat::new(SampleFormat::S16, 2, 48000);
        assert_eq!(format.frames_in(1023), 255);
        assert_eq!(format.frames_in(3), 0);
    }

    #[test]
    fn zero_channel_format_has_no_frames() {
        let format = AudioFormat::new(SampleFormat::S16, 0, 48000);
        assert_eq!(format.frames_in(1024), 0);
    }

    #[test]
    fn duration_of_one_second() {
        let format = AudioFormat::new(SampleFormat::S16, 2, 48000);
        assert_eq!(format.duration_of(48000), Duration::from_secs(1));
        assert_eq!(format.duration_of(24000), Duration::from_millis(500));
    }

    #[test]
    fn silence_bytes() {
        assert_eq!(SampleFormat::U8.silence(), 0x80);
        assert_eq!(SampleFormat::F32.silence(), 0);
    }

    #[test]
    fn parse_sample_format() {
        assert_eq!("S16".parse::<SampleFormat>().unwrap(), SampleFormat::S16);
        assert_eq!("float".parse::<SampleFormat>().unwrap(), SampleFormat::F32);
        assert!("s24".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn display() {
        let format = AudioFormat::new(SampleFormat::S32, 1, 44100);
        assert_eq!(format.to_string(), "s32 1ch 44100 Hz");
    }
}
