//! Voice driver for the default cpal output device.
//!
//! Queued buffers travel to the cpal callback over a bounded crossbeam
//! channel and come back over a second one once played, so buffer memory is
//! allocated on the engine thread and reused for the life of the voice. The
//! source stops by itself when the callback runs out of queued buffers.

use crate::host::{self, StreamFlags};
use crate::voice::{
    self, BufferId, SourceId, SourceState, Voice, VoiceDriver, VoiceError, VoiceFormat,
};
use cascada_core::{DeviceConfig, Negotiated, OutputDriver, Result};
use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Most buffers that can be in flight to the callback at once.
const MAX_QUEUED: usize = 256;

/// Voice driver for the default cpal output device.
#[derive(Debug, Default)]
pub struct CpalVoice;

impl CpalVoice {
    /// Create a driver for the default output device.
    pub fn new() -> Self {
        Self
    }
}

/// One buffer in flight between the engine and the callback.
struct Slot {
    id: BufferId,
    data: Vec<u8>,
}

enum SlotState {
    Free(Vec<u8>),
    Queued,
    Deleted,
}

/// Engine-side buffer bookkeeping.
///
/// Buffer storage is owned here while a slot is free and travels to the
/// callback inside a [`Slot`] while it is queued. At most [`MAX_QUEUED`]
/// buffers exist, so the return channel can always take every slot back.
#[derive(Default)]
struct SlotTable {
    /// Indexed by buffer id - 1.
    slots: Vec<SlotState>,
    /// Played slots waiting for `unqueue_buffer`, oldest first.
    processed: VecDeque<Slot>,
}

impl SlotTable {
    fn r#gen(&mut self, out: &mut [BufferId]) -> std::result::Result<(), VoiceError> {
        if self.slots.len() + out.len() > MAX_QUEUED {
            tracing::warn!(
                requested = out.len(),
                existing = self.slots.len(),
                max = MAX_QUEUED,
                "too many voice buffers"
            );
            return Err(VoiceError::InvalidValue);
        }
        self.slots
            .try_reserve(out.len())
            .map_err(|_| VoiceError::OutOfMemory)?;
        for id in out.iter_mut() {
            self.slots.push(SlotState::Free(Vec::new()));
            *id = BufferId(u32::try_from(self.slots.len()).map_err(|_| VoiceError::OutOfMemory)?);
        }
        Ok(())
    }

    fn get_mut(&mut self, buffer: BufferId) -> std::result::Result<&mut SlotState, VoiceError> {
        let index = usize::try_from(buffer.0)
            .ok()
            .and_then(|id| id.checked_sub(1))
            .ok_or(VoiceError::InvalidName)?;
        match self.slots.get_mut(index) {
            Some(SlotState::Deleted) | None => Err(VoiceError::InvalidName),
            Some(slot) => Ok(slot),
        }
    }

    fn delete(&mut self, buffers: &[BufferId]) {
        for &buffer in buffers {
            if let Ok(slot) = self.get_mut(buffer) {
                *slot = SlotState::Deleted;
            }
        }
    }

    fn upload(&mut self, buffer: BufferId, data: &[u8]) -> std::result::Result<(), VoiceError> {
        match self.get_mut(buffer)? {
            SlotState::Free(storage) => {
                storage.clear();
                storage.extend_from_slice(data);
                Ok(())
            }
            _ => Err(VoiceError::InvalidOperation),
        }
    }

    /// Hand a free buffer to the callback. On a full or closed channel the
    /// storage returns to the table and the buffer stays free.
    fn enqueue(&mut self, buffer: BufferId, to_callback: &Sender<Slot>) -> std::result::Result<(), VoiceError> {
        let slot = self.get_mut(buffer)?;
        let SlotState::Free(data) = std::mem::replace(slot, SlotState::Queued) else {
            return Err(VoiceError::InvalidOperation);
        };
        match to_callback.try_send(Slot { id: buffer, data }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(Slot { data, .. }) | TrySendError::Disconnected(Slot { data, .. })) => {
                if let Ok(slot) = self.get_mut(buffer) {
                    *slot = SlotState::Free(data);
                }
                Err(VoiceError::InvalidOperation)
            }
        }
    }

    /// Collect slots the callback finished; returns how many await unqueueing.
    fn collect(&mut self, from_callback: &Receiver<Slot>) -> usize {
        self.processed.extend(from_callback.try_iter());
        self.processed.len()
    }

    fn unqueue(&mut self) -> std::result::Result<BufferId, VoiceError> {
        let Slot { id, data } = self.processed.pop_front().ok_or(VoiceError::InvalidValue)?;
        if let Ok(slot) = self.get_mut(id) {
            *slot = SlotState::Free(data);
        }
        Ok(id)
    }
}

/// Callback-side playback of queued slots.
struct Playback {
    queued: Receiver<Slot>,
    played: Sender<Slot>,
    playing: Arc<AtomicBool>,
    current: Option<(Slot, usize)>,
    /// Finished slots the return channel did not take yet.
    returning: VecDeque<Slot>,
    silence: u8,
}

impl Playback {
    fn new(queued: Receiver<Slot>, played: Sender<Slot>, playing: Arc<AtomicBool>, silence: u8) -> Self {
        Self {
            queued,
            played,
            playing,
            current: None,
            returning: VecDeque::with_capacity(MAX_QUEUED),
            silence,
        }
    }

    /// Fill `out` from the queued slots, stopping the source when they run out.
    fn render(&mut self, out: &mut [u8]) {
        self.flush_returning();

        let mut written = 0;
        while written < out.len() && self.playing.load(Ordering::Acquire) {
            let Some((slot, pos)) = self.current.as_mut() else {
                match self.queued.try_recv() {
                    Ok(next) => self.current = Some((next, 0)),
                    Err(_) => self.playing.store(false, Ordering::Release),
                }
                continue;
            };
            let n = (slot.data.len() - *pos).min(out.len() - written);
            out[written..written + n].copy_from_slice(&slot.data[*pos..*pos + n]);
            *pos += n;
            written += n;
            if *pos == slot.data.len() {
                if let Some((done, _)) = self.current.take() {
                    self.give_back(done);
                }
            }
        }
        out[written..].fill(self.silence);
    }

    fn give_back(&mut self, slot: Slot) {
        match self.played.try_send(slot) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(slot)) => self.returning.push_back(slot),
        }
    }

    fn flush_returning(&mut self) {
        while let Some(slot) = self.returning.pop_front() {
            if let Err(TrySendError::Full(slot)) = self.played.try_send(slot) {
                self.returning.push_front(slot);
                break;
            }
        }
    }
}

impl VoiceDriver for CpalVoice {
    type Voice = CpalVoiceHandle;

    fn supports_float(&self) -> bool {
        true
    }

    fn open_voice(
        &mut self,
        format: VoiceFormat,
        frame_rate: u32,
    ) -> std::result::Result<CpalVoiceHandle, VoiceError> {
        let device = host::output_device().ok_or(VoiceError::NoDevice)?;
        let sample_format = format.sample_format();
        let channels = format.channels();
        if !host::supports(&device, sample_format, channels) {
            return Err(VoiceError::InvalidEnum);
        }
        if host::nearest_rate(&device, sample_format, channels, frame_rate) != Some(frame_rate) {
            return Err(VoiceError::InvalidValue);
        }

        let (to_callback, queued) = bounded::<Slot>(MAX_QUEUED);
        let (played, from_callback) = bounded::<Slot>(MAX_QUEUED);
        let flags = Arc::new(StreamFlags::default());
        let playing = Arc::new(AtomicBool::new(false));

        let mut playback = Playback::new(queued, played, Arc::clone(&playing), sample_format.silence());
        let period = (frame_rate / 100).max(1);

        let stream = host::build_stream(
            &device,
            sample_format,
            channels,
            frame_rate,
            period,
            &flags,
            move |out| playback.render(out),
        )
        .map_err(|err| {
            tracing::warn!(%err, "failed to build voice stream");
            VoiceError::InvalidOperation
        })?;

        Ok(CpalVoiceHandle {
            stream,
            format,
            frame_rate,
            table: SlotTable::default(),
            source: None,
            to_callback,
            from_callback,
            started: false,
            playing,
            flags,
        })
    }
}

impl OutputDriver for CpalVoice {
    fn name(&self) -> &'static str {
        "cpal-voice"
    }

    fn open(&mut self, config: &DeviceConfig) -> Result<Negotiated> {
        voice::open_voice(self, config)
    }
}

/// Open voice on a cpal output device.
pub struct CpalVoiceHandle {
    stream: cpal::Stream,
    format: VoiceFormat,
    frame_rate: u32,
    table: SlotTable,
    source: Option<SourceId>,
    to_callback: Sender<Slot>,
    from_callback: Receiver<Slot>,
    started: bool,
    playing: Arc<AtomicBool>,
    flags: Arc<StreamFlags>,
}

impl CpalVoiceHandle {
    fn check_source(&self, source: SourceId) -> std::result::Result<(), VoiceError> {
        if self.source == Some(source) {
            Ok(())
        } else {
            Err(VoiceError::InvalidName)
        }
    }
}

impl Voice for CpalVoiceHandle {
    fn set_listener_origin(&mut self) -> std::result::Result<(), VoiceError> {
        Ok(())
    }

    fn gen_buffers(&mut self, out: &mut [BufferId]) -> std::result::Result<(), VoiceError> {
        self.table.r#gen(out)
    }

    fn delete_buffers(&mut self, buffers: &[BufferId]) {
        self.table.delete(buffers);
    }

    fn gen_source(&mut self) -> std::result::Result<SourceId, VoiceError> {
        if self.source.is_some() {
            return Err(VoiceError::InvalidOperation);
        }
        let source = SourceId(1);
        self.source = Some(source);
        Ok(source)
    }

    fn delete_source(&mut self, source: SourceId) {
        if self.source == Some(source) {
            self.playing.store(false, Ordering::Release);
            self.source = None;
        }
    }

    fn buffer_data(
        &mut self,
        buffer: BufferId,
        format: VoiceFormat,
        data: &[u8],
        frame_rate: u32,
    ) -> std::result::Result<(), VoiceError> {
        if format != self.format || frame_rate != self.frame_rate {
            return Err(VoiceError::InvalidValue);
        }
        self.table.upload(buffer, data)
    }

    fn queue_buffer(&mut self, source: SourceId, buffer: BufferId) -> std::result::Result<(), VoiceError> {
        self.check_source(source)?;
        self.table.enqueue(buffer, &self.to_callback)
    }

    fn unqueue_buffer(&mut self, source: SourceId) -> std::result::Result<BufferId, VoiceError> {
        self.check_source(source)?;
        self.table.unqueue()
    }

    fn buffers_processed(&mut self, source: SourceId) -> std::result::Result<usize, VoiceError> {
        self.check_source(source)?;
        Ok(self.table.collect(&self.from_callback))
    }

    fn source_state(&mut self, source: SourceId) -> std::result::Result<SourceState, VoiceError> {
        self.check_source(source)?;
        if self.flags.failed() {
            return Err(VoiceError::InvalidOperation);
        }
        Ok(if !self.started {
            SourceState::Initial
        } else if self.playing.load(Ordering::Acquire) {
            SourceState::Playing
        } else {
            SourceState::Stopped
        })
    }

    fn play(&mut self, source: SourceId) -> std::result::Result<(), VoiceError> {
        self.check_source(source)?;
        self.playing.store(true, Ordering::Release);
        if !self.started {
            self.stream.play().map_err(|err| {
                tracing::warn!(%err, "failed to start voice stream");
                VoiceError::InvalidOperation
            })?;
            self.started = true;
        }
        Ok(())
    }

    fn close(self) {
        if let Err(err) = self.stream.pause() {
            tracing::debug!(%err, "voice stream did not pause on close");
        }
        tracing::debug!("cpal voice closed");
    }
}
