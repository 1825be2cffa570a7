//! Multi-buffer queue backend.
//!
//! A fixed ring of `buffer_count` voice buffers cycles through one source.
//! `next_buffer` is the slot the next `queue()` uploads into and
//! `empty_buffers` counts slots that are free for writing. The slots from
//! `next_buffer` onward (mod N) are the empty ones; the remaining slots are
//! queued on the source, oldest first at `next_buffer + empty_buffers`.
//!
//! ```text
//!   slot:   0     1     2     3
//!         [ q ] [ q ] [ e ] [ e ]      next_buffer = 2, empty_buffers = 2
//!                       ^ next upload   oldest queued = (2 + 2) % 4 = 0
//! ```

use crate::voice::{BufferId, SourceId, SourceState, Voice, VoiceDriver, VoiceError, VoiceFormat};
use cascada_core::{
    BufferModel, DeviceConfig, DeviceState, Error, Negotiated, OutputBackend, Result,
};

pub(crate) struct QueueBackend<V: Voice> {
    voice: V,
    source: SourceId,
    buffers: Vec<BufferId>,
    format: VoiceFormat,
    frame_rate: u32,
    next_buffer: usize,
    empty_buffers: usize,
    state: DeviceState,
}

fn setup(call: &'static str) -> impl Fn(VoiceError) -> Error {
    move |err| {
        tracing::warn!(call, error = err.description(), "voice setup failed");
        match err {
            VoiceError::OutOfMemory => Error::OutOfMemory,
            other => Error::driver(call, other.code()),
        }
    }
}

fn runtime(call: &'static str) -> impl Fn(VoiceError) -> Error {
    move |err| Error::Voice {
        call,
        reason: err.description(),
    }
}

impl<V: Voice + 'static> QueueBackend<V> {
    pub(crate) fn open<D>(driver: &mut D, config: &DeviceConfig) -> Result<Negotiated>
    where
        D: VoiceDriver<Voice = V> + ?Sized,
    {
        let format = VoiceFormat::for_format(&config.format, driver.supports_float())
            .ok_or_else(|| Error::UnsupportedFormat(config.format.to_string()))?;

        let count = config.buffer_count;
        let mut buffers = Vec::new();
        buffers
            .try_reserve_exact(count)
            .map_err(|_| Error::OutOfMemory)?;
        buffers.resize(count, BufferId::default());

        let frame_rate = config.format.frame_rate;
        let mut voice = driver
            .open_voice(format, frame_rate)
            .map_err(setup("open_voice"))?;

        if let Err(err) = voice.set_listener_origin() {
            voice.close();
            return Err(setup("listener")(err));
        }
        if let Err(err) = voice.gen_buffers(&mut buffers) {
            voice.close();
            return Err(setup("gen_buffers")(err));
        }
        let source = match voice.gen_source() {
            Ok(source) => source,
            Err(err) => {
                voice.delete_buffers(&buffers);
                voice.close();
                return Err(setup("gen_source")(err));
            }
        };
        tracing::debug!(buffers = count, "voice buffers generated");

        Ok(Negotiated {
            format: config.format,
            class: config.class,
            backend: Box::new(Self {
                voice,
                source,
                buffers,
                format,
                frame_rate,
                next_buffer: 0,
                empty_buffers: count,
                state: DeviceState::Prepared,
            }),
        })
    }

    fn queued(&self) -> usize {
        self.buffers.len() - self.empty_buffers
    }
}

impl<V: Voice + 'static> OutputBackend for QueueBackend<V> {
    fn model(&self) -> BufferModel {
        BufferModel::BufferQueue
    }

    fn state(&self) -> DeviceState {
        self.state
    }

    fn check(&mut self) -> Result<usize> {
        let processed = self
            .voice
            .buffers_processed(self.source)
            .map_err(runtime("buffers_processed"))?;

        let queued = self.queued();
        if processed > queued {
            tracing::warn!(processed, queued, "more buffers processed than queued");
        }

        for _ in 0..processed.min(queued) {
            let slot = (self.next_buffer + self.empty_buffers) % self.buffers.len();
            let buffer = self
                .voice
                .unqueue_buffer(self.source)
                .map_err(runtime("unqueue_buffer"))?;
            if buffer != self.buffers[slot] {
                tracing::warn!(slot, expected = self.buffers[slot].0, got = buffer.0, "buffer unqueued out of order");
            }
            self.empty_buffers += 1;
        }
        if processed > 0 {
            tracing::trace!(reclaimed = processed.min(queued), empty = self.empty_buffers, "buffers reclaimed");
        }

        Ok(self.empty_buffers)
    }

    fn queue(&mut self, chunk: &[u8]) -> Result<()> {
        if self.empty_buffers == 0 {
            return Err(Error::QueueFull);
        }

        let buffer = self.buffers[self.next_buffer];
        self.voice
            .buffer_data(buffer, self.format, chunk, self.frame_rate)
            .map_err(runtime("buffer_data"))?;
        self.voice
            .queue_buffer(self.source, buffer)
            .map_err(runtime("queue_buffer"))?;

        self.next_buffer = (self.next_buffer + 1) % self.buffers.len();
        self.empty_buffers -= 1;

        let state = self
            .voice
            .source_state(self.source)
            .map_err(runtime("source_state"))?;
        if state != SourceState::Playing {
            self.voice.play(self.source).map_err(runtime("play"))?;
            if self.state == DeviceState::Prepared {
                tracing::debug!("voice started");
            }
            self.state = DeviceState::Running;
        }
        Ok(())
    }

    fn close(self: Box<Self>) {
        let Self {
            mut voice,
            source,
            buffers,
            ..
        } = *self;
        voice.delete_source(source);
        voice.delete_buffers(&buffers);
        voice.close();
    }
}
