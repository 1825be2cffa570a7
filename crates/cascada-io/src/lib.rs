//! Cascada I/O - output backends and drivers
//!
//! Realizes the [`cascada_core`] device contract on top of three native
//! buffering models and ships the drivers that feed them:
//!
//! | driver | seam | backends |
//! |---|---|---|
//! | [`CpalPcm`] | [`PcmDriver`] | mapped ring, blocking write |
//! | [`WavSink`] | [`PcmDriver`] | blocking write |
//! | [`MockPcm`] | [`PcmDriver`] | mapped ring, blocking write |
//! | [`CpalVoice`] | [`VoiceDriver`] | buffer queue |
//! | [`MockVoice`] | [`VoiceDriver`] | buffer queue |
//!
//! Every driver implements [`OutputDriver`](cascada_core::OutputDriver), so
//! any of them can be passed to [`Device::open`](cascada_core::Device::open).
//! New native APIs plug in by implementing one of the two seams and
//! delegating `open` to [`open_pcm`] or [`open_voice`].
//!
//! # Example
//!
//! ```rust,ignore
//! use cascada_core::{AudioFormat, Device, DeviceConfig, SampleFormat};
//! use cascada_io::WavSink;
//!
//! let config = DeviceConfig::new(AudioFormat::new(SampleFormat::S16, 2, 48000));
//! let mut device = Device::open(&mut WavSink::new("out.wav"), &config)?;
//! device.service(|chunk| chunk.fill(0))?;
//! device.close();
//! ```

mod blocking;
pub mod cpal_pcm;
pub mod cpal_voice;
mod host;
mod mmap;
pub mod mock;
pub mod pcm;
mod queue;
pub mod voice;
pub mod wav;

pub use cascada_core::{Error, Result};
pub use cpal_pcm::CpalPcm;
pub use cpal_voice::CpalVoice;
pub use mock::{Ledger, MockPcm, MockVoice};
pub use pcm::{Access, ChannelArea, Errno, Pcm, PcmDriver, PcmState, open_pcm};
pub use voice::{
    BufferId, SourceId, SourceState, Voice, VoiceDriver, VoiceError, VoiceFormat, open_voice,
};
pub use wav::WavSink;
