//! Blocking interleaved-write backend.
//!
//! `queue()` hands exactly one chunk to `writei` and blocks until the driver
//! has accepted it. The driver starts playback by itself once data arrives.

use crate::pcm::{self, Access, Errno, Pcm, PcmDriver};
use cascada_core::{
    BufferModel, DeviceConfig, DeviceState, Error, Negotiated, OutputBackend, Result,
};

pub(crate) struct BlockingBackend<P> {
    pcm: P,
    frames_per_chunk: usize,
    state: DeviceState,
}

impl<P: Pcm + 'static> BlockingBackend<P> {
    pub(crate) fn open<D>(driver: &mut D, config: &DeviceConfig) -> Result<Negotiated>
    where
        D: PcmDriver<Pcm = P> + ?Sized,
    {
        let mut pcm = driver
            .open_pcm(false)
            .map_err(|errno| Error::driver(pcm::OPEN, errno.code()))?;

        let format = match pcm::negotiate(&mut pcm, Access::RwInterleaved, config) {
            Ok(format) => format,
            Err(err) => {
                pcm::discard(pcm);
                return Err(err);
            }
        };

        Ok(Negotiated {
            format,
            class: config.class,
            backend: Box::new(Self {
                pcm,
                frames_per_chunk: config.frames_per_chunk,
                state: DeviceState::Prepared,
            }),
        })
    }
}

impl<P: Pcm + 'static> OutputBackend for BlockingBackend<P> {
    fn model(&self) -> BufferModel {
        BufferModel::BlockingWrite
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

    fn queue(&mut self, chunk: &[u8]) -> Result<()> {
        let requested = self.frames_per_chunk;
        match self.pcm.writei(chunk, requested) {
            Ok(written) if written == requested => {
                self.state = DeviceState::Running;
                Ok(())
            }
            Ok(written) => {
                tracing::warn!(written, requested, "short write");
                Err(Error::ShortWrite { written, requested })
            }
            Err(Errno::EBADFD) => Err(Error::BadState),
            Err(Errno::EPIPE) => Err(Error::Underrun),
            Err(Errno::ESTRPIPE) => Err(Error::Suspended),
            Err(errno) => {
                tracing::warn!(code = errno.code(), "write failed");
                Err(Error::ShortWrite {
                    written: 0,
                    requested,
                })
            }
        }
    }

    fn close(self: Box<Self>) {
        pcm::discard(self.pcm);
    }
}
