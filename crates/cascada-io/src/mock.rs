//! Deterministic drivers with resource accounting and fault injection.
//!
//! [`MockPcm`] and [`MockVoice`] behave like well-mannered hardware: rings
//! fill when written and drain only when told to ([`PcmProbe::consume`],
//! [`VoiceProbe::play_through`]), or instantly in free-running mode. Every
//! native resource they hand out is counted in a shared [`Ledger`], so tests
//! can assert that failed opens and closes leave nothing behind.
//!
//! ```rust,ignore
//! let mut driver = MockPcm::new(1024);
//! let probe = driver.probe();
//! let mut device = Device::open(&mut driver, &config)?;
//! device.queue(&chunk)?;
//! probe.consume(256);
//! device.close();
//! assert!(driver.ledger().is_balanced());
//! ```

use crate::pcm::{self, Access, ChannelArea, Errno, Pcm, PcmDriver, PcmState};
use crate::voice::{
    self, BufferId, SourceId, SourceState, Voice, VoiceDriver, VoiceError, VoiceFormat,
};
use cascada_core::{DeviceConfig, Negotiated, OutputDriver, Result, SampleFormat};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Native resources currently held.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Open PCM handles.
    pub pcm_handles: usize,
    /// Open voice devices.
    pub devices: usize,
    /// Live voice contexts.
    pub contexts: usize,
    /// Live voice buffers.
    pub buffers: usize,
    /// Live voice sources.
    pub sources: usize,
    /// Releases of resources that were not held.
    pub double_releases: usize,
}

impl Counts {
    /// Total resources still claimed.
    pub fn claimed(&self) -> usize {
        self.pcm_handles + self.devices + self.contexts + self.buffers + self.sources
    }
}

/// Shared resource ledger.
#[derive(Debug, Clone, Default)]
pub struct Ledger(Rc<RefCell<Counts>>);

impl Ledger {
    /// Snapshot of the current counts.
    pub fn counts(&self) -> Counts {
        *self.0.borrow()
    }

    /// Nothing claimed and nothing released twice.
    pub fn is_balanced(&self) -> bool {
        let counts = self.counts();
        counts.claimed() == 0 && counts.double_releases == 0
    }

    fn claim(&self, pick: fn(&mut Counts) -> &mut usize, n: usize) {
        *pick(&mut self.0.borrow_mut()) += n;
    }

    fn release(&self, pick: fn(&mut Counts) -> &mut usize) {
        let mut counts = self.0.borrow_mut();
        let held = pick(&mut counts);
        match held.checked_sub(1) {
            Some(n) => *held = n,
            None => counts.double_releases += 1,
        }
    }

    fn double_release(&self) {
        self.0.borrow_mut().double_releases += 1;
    }
}

// ---------------------------------------------------------------------------
// PCM
// ---------------------------------------------------------------------------

/// PCM driver calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PcmStep {
    /// `PcmDriver::open_pcm`.
    Open,
    /// `Pcm::set_access`.
    SetAccess,
    /// `Pcm::set_format`.
    SetFormat,
    /// `Pcm::set_channels`.
    SetChannels,
    /// `Pcm::set_buffer_size`.
    SetBufferSize,
    /// `Pcm::set_rate_near`.
    SetRateNear,
    /// `Pcm::apply_hw_params`.
    ApplyHwParams,
    /// `Pcm::avail`.
    Avail,
    /// `Pcm::mmap_begin`.
    MmapBegin,
    /// `Pcm::mmap_commit`.
    MmapCommit,
    /// `Pcm::start`.
    Start,
}

impl PcmStep {
    /// Every step, in the order a mapped-ring open performs them.
    pub const ALL: [Self; 11] = [
        Self::Open,
        Self::SetAccess,
        Self::SetFormat,
        Self::SetChannels,
        Self::SetBufferSize,
        Self::SetRateNear,
        Self::ApplyHwParams,
        Self::Avail,
        Self::MmapBegin,
        Self::MmapCommit,
        Self::Start,
    ];
}

/// Shape faults for areas returned by `mmap_begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AreaFault {
    /// Offer at most this many contiguous frames.
    Short(usize),
    /// Start the area mid-byte.
    Misaligned,
    /// Report a step of two frames.
    Stride,
    /// Claim succeeds but nothing is mapped.
    Unmapped,
    /// The claim itself fails.
    Claim(Errno),
}

#[derive(Debug)]
struct PcmSim {
    opens: Vec<bool>,
    closes: usize,
    access: Option<Access>,
    sample_format: SampleFormat,
    channels: u16,
    buffer_frames: usize,
    rate: u32,
    state: PcmState,
    queued: usize,
    appl: usize,
    claimed: bool,
    overlapping_claims: usize,
    commits: usize,
    releases: usize,
    writes: usize,
    recording: bool,
    played: Vec<u8>,
    area_fault: Option<AreaFault>,
    avail_fault: Option<Errno>,
    commit_results: VecDeque<std::result::Result<usize, Errno>>,
    write_results: VecDeque<std::result::Result<usize, Errno>>,
}

impl PcmSim {
    fn new() -> Self {
        Self {
            opens: Vec::new(),
            closes: 0,
            access: None,
            sample_format: SampleFormat::S16,
            channels: 0,
            buffer_frames: 0,
            rate: 0,
            state: PcmState::Open,
            queued: 0,
            appl: 0,
            claimed: false,
            overlapping_claims: 0,
            commits: 0,
            releases: 0,
            writes: 0,
            recording: true,
            played: Vec::new(),
            area_fault: None,
            avail_fault: None,
            commit_results: VecDeque::new(),
            write_results: VecDeque::new(),
        }
    }

    fn frame_size(&self) -> usize {
        self.sample_format.sample_size() * usize::from(self.channels)
    }

    fn free(&self) -> usize {
        self.buffer_frames - self.queued
    }
}

/// Mock PCM driver.
#[derive(Debug)]
pub struct MockPcm {
    ledger: Ledger,
    sim: Rc<RefCell<PcmSim>>,
    capacity: usize,
    rates: Vec<u32>,
    fail_at: Option<(PcmStep, Errno)>,
    reject_mmap: bool,
    never_prepared: bool,
    free_running: bool,
}

impl MockPcm {
    /// A device whose ring holds at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            ledger: Ledger::default(),
            sim: Rc::new(RefCell::new(PcmSim::new())),
            capacity,
            rates: Vec::new(),
            fail_at: None,
            reject_mmap: false,
            never_prepared: false,
            free_running: false,
        }
    }

    /// Share `ledger` with other mock drivers.
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Make `step` fail with `errno`.
    pub fn fail_at(mut self, step: PcmStep, errno: Errno) -> Self {
        self.fail_at = Some((step, errno));
        self
    }

    /// Only accept a fixed set of frame rates; `set_rate_near` picks the closest.
    pub fn with_rates(mut self, rates: &[u32]) -> Self {
        self.rates = rates.to_vec();
        self
    }

    /// Refuse mapped access, like a plugin device without mmap support.
    pub fn reject_mmap(mut self) -> Self {
        self.reject_mmap = true;
        self
    }

    /// Stay in `Setup` after hardware parameters are applied.
    pub fn never_prepared(mut self) -> Self {
        self.never_prepared = true;
        self
    }

    /// Consume everything queued whenever availability is queried.
    pub fn free_running(mut self) -> Self {
        self.free_running = true;
        self
    }

    /// Drop accepted audio instead of keeping it for [`PcmProbe::played`].
    pub fn without_recording(self) -> Self {
        self.sim.borrow_mut().recording = false;
        self
    }

    /// Ledger shared with every handle this driver opens.
    pub fn ledger(&self) -> Ledger {
        self.ledger.clone()
    }

    /// Inspect and steer the device behind handles opened from this driver.
    pub fn probe(&self) -> PcmProbe {
        PcmProbe(Rc::clone(&self.sim))
    }
}

impl PcmDriver for MockPcm {
    type Pcm = MockPcmHandle;

    fn open_pcm(&mut self, nonblocking: bool) -> std::result::Result<MockPcmHandle, Errno> {
        {
            let mut sim = self.sim.borrow_mut();
            sim.opens.push(nonblocking);
            if let Some((PcmStep::Open, errno)) = self.fail_at {
                return Err(errno);
            }
            sim.access = None;
            sim.state = PcmState::Open;
            sim.queued = 0;
            sim.appl = 0;
            sim.claimed = false;
        }
        self.ledger.claim(|c| &mut c.pcm_handles, 1);

        Ok(MockPcmHandle {
            sim: Rc::clone(&self.sim),
            ledger: self.ledger.clone(),
            ring: Vec::new(),
            capacity: self.capacity,
            rates: self.rates.clone(),
            fail_at: self.fail_at,
            reject_mmap: self.reject_mmap,
            never_prepared: self.never_prepared,
            free_running: self.free_running,
            nonblocking,
        })
    }
}

impl OutputDriver for MockPcm {
    fn name(&self) -> &'static str {
        "mock-pcm"
    }

    fn open(&mut self, config: &DeviceConfig) -> Result<Negotiated> {
        pcm::open_pcm(self, config)
    }
}

/// Handle to the shared state of a [`MockPcm`] device.
#[derive(Debug, Clone)]
pub struct PcmProbe(Rc<RefCell<PcmSim>>);

impl PcmProbe {
    /// Let the hardware play `frames` queued frames.
    pub fn consume(&self, frames: usize) {
        let mut sim = self.0.borrow_mut();
        sim.queued -= frames.min(sim.queued);
    }

    /// Frames queued and not yet played.
    pub fn queued(&self) -> usize {
        self.0.borrow().queued
    }

    /// Result of the next non-empty `mmap_commit`.
    pub fn script_commit(&self, result: std::result::Result<usize, Errno>) {
        self.0.borrow_mut().commit_results.push_back(result);
    }

    /// Result of the next `writei`.
    pub fn script_write(&self, result: std::result::Result<usize, Errno>) {
        self.0.borrow_mut().write_results.push_back(result);
    }

    /// Make the next claims return an unusable region, or clear the fault.
    pub fn set_area_fault(&self, fault: Option<AreaFault>) {
        self.0.borrow_mut().area_fault = fault;
    }

    /// Make `avail` fail with `errno`, or clear the fault.
    pub fn fail_avail(&self, errno: Option<Errno>) {
        self.0.borrow_mut().avail_fault = errno;
    }

    /// Every byte accepted by commits and writes, in order.
    pub fn played(&self) -> Vec<u8> {
        self.0.borrow().played.clone()
    }

    /// Blocking flag of every `open_pcm` call.
    pub fn opens(&self) -> Vec<bool> {
        self.0.borrow().opens.clone()
    }

    /// PCM handles closed so far.
    pub fn closes(&self) -> usize {
        self.0.borrow().closes
    }

    /// Non-empty commits accepted.
    pub fn commits(&self) -> usize {
        self.0.borrow().commits
    }

    /// Empty commits that released a claim.
    pub fn releases(&self) -> usize {
        self.0.borrow().releases
    }

    /// Blocking writes accepted.
    pub fn writes(&self) -> usize {
        self.0.borrow().writes
    }

    /// Claims begun while a previous claim was still open.
    pub fn overlapping_claims(&self) -> usize {
        self.0.borrow().overlapping_claims
    }

    /// Transfer method the handle negotiated.
    pub fn access(&self) -> Option<Access> {
        self.0.borrow().access
    }

    /// Current simulated handle state.
    pub fn state(&self) -> PcmState {
        self.0.borrow().state
    }

    /// Ring size granted at negotiation.
    pub fn buffer_frames(&self) -> usize {
        self.0.borrow().buffer_frames
    }
}

/// PCM handle opened by [`MockPcm`].
#[derive(Debug)]
pub struct MockPcmHandle {
    sim: Rc<RefCell<PcmSim>>,
    ledger: Ledger,
    ring: Vec<u8>,
    capacity: usize,
    rates: Vec<u32>,
    fail_at: Option<(PcmStep, Errno)>,
    reject_mmap: bool,
    never_prepared: bool,
    free_running: bool,
    nonblocking: bool,
}

impl MockPcmHandle {
    fn step(&self, step: PcmStep) -> std::result::Result<(), Errno> {
        match self.fail_at {
            Some((failing, errno)) if failing == step => Err(errno),
            _ => Ok(()),
        }
    }
}

impl Pcm for MockPcmHandle {
    fn set_access(&mut self, access: Access) -> std::result::Result<(), Errno> {
        self.step(PcmStep::SetAccess)?;
        if self.reject_mmap && access == Access::MmapInterleaved {
            return Err(Errno::EINVAL);
        }
        self.sim.borrow_mut().access = Some(access);
        Ok(())
    }

    fn set_format(&mut self, format: SampleFormat) -> std::result::Result<(), Errno> {
        self.step(PcmStep::SetFormat)?;
        self.sim.borrow_mut().sample_format = format;
        Ok(())
    }

    fn set_channels(&mut self, channels: u16) -> std::result::Result<(), Errno> {
        self.step(PcmStep::SetChannels)?;
        if channels == 0 {
            return Err(Errno::EINVAL);
        }
        self.sim.borrow_mut().channels = channels;
        Ok(())
    }

    fn set_buffer_size(&mut self, frames: usize) -> std::result::Result<usize, Errno> {
        self.step(PcmStep::SetBufferSize)?;
        let granted = frames.min(self.capacity);
        if granted == 0 {
            return Err(Errno::EINVAL);
        }
        self.sim.borrow_mut().buffer_frames = granted;
        Ok(granted)
    }

    fn set_rate_near(&mut self, rate: u32) -> std::result::Result<u32, Errno> {
        self.step(PcmStep::SetRateNear)?;
        let chosen = self
            .rates
            .iter()
            .copied()
            .min_by_key(|candidate| candidate.abs_diff(rate))
            .unwrap_or(rate);
        self.sim.borrow_mut().rate = chosen;
        Ok(chosen)
    }

    fn apply_hw_params(&mut self) -> std::result::Result<(), Errno> {
        self.step(PcmStep::ApplyHwParams)?;
        let mut sim = self.sim.borrow_mut();
        self.ring = vec![0; sim.buffer_frames * sim.frame_size()];
        sim.state = if self.never_prepared {
            PcmState::Setup
        } else {
            PcmState::Prepared
        };
        Ok(())
    }

    fn state(&self) -> PcmState {
        self.sim.borrow().state
    }

    fn start(&mut self) -> std::result::Result<(), Errno> {
        self.step(PcmStep::Start)?;
        let mut sim = self.sim.borrow_mut();
        if sim.state != PcmState::Prepared {
            return Err(Errno::EBADFD);
        }
        sim.state = PcmState::Running;
        Ok(())
    }

    fn avail(&mut self) -> std::result::Result<usize, Errno> {
        self.step(PcmStep::Avail)?;
        let mut sim = self.sim.borrow_mut();
        if let Some(errno) = sim.avail_fault {
            return Err(errno);
        }
        if self.free_running {
            sim.queued = 0;
        }
        Ok(sim.free())
    }

    fn mmap_begin(&mut self, frames: usize) -> std::result::Result<ChannelArea, Errno> {
        self.step(PcmStep::MmapBegin)?;
        let mut sim = self.sim.borrow_mut();
        if sim.access != Some(Access::MmapInterleaved) || sim.buffer_frames == 0 {
            return Err(Errno::EBADFD);
        }
        if let Some(AreaFault::Claim(errno)) = sim.area_fault {
            return Err(errno);
        }
        if sim.claimed {
            sim.overlapping_claims += 1;
        }
        sim.claimed = true;

        let offset = sim.appl % sim.buffer_frames;
        let frame_bits = u32::try_from(sim.frame_size() * 8).unwrap_or(u32::MAX);
        let mut area = ChannelArea {
            offset,
            frames: (sim.buffer_frames - offset).min(sim.free()).min(frames),
            first: 0,
            step: frame_bits,
        };
        match sim.area_fault {
            Some(AreaFault::Short(limit)) => area.frames = area.frames.min(limit),
            Some(AreaFault::Misaligned) => area.first = 4,
            Some(AreaFault::Stride) => area.step = frame_bits * 2,
            _ => {}
        }
        Ok(area)
    }

    fn mmap_bytes(&mut self) -> Option<&mut [u8]> {
        let unmapped = self.sim.borrow().area_fault == Some(AreaFault::Unmapped);
        if unmapped || self.ring.is_empty() {
            None
        } else {
            Some(&mut self.ring)
        }
    }

    fn mmap_commit(&mut self, offset: usize, frames: usize) -> std::result::Result<usize, Errno> {
        self.step(PcmStep::MmapCommit)?;
        let mut sim = self.sim.borrow_mut();
        sim.claimed = false;
        if frames == 0 {
            sim.releases += 1;
            return Ok(0);
        }

        let result = sim.commit_results.pop_front().unwrap_or(Ok(frames));
        if let Ok(committed) = result {
            let committed = committed.min(frames);
            let frame_size = sim.frame_size();
            let start = offset * frame_size;
            if sim.recording {
                if let Some(bytes) = self.ring.get(start..start + committed * frame_size) {
                    sim.played.extend_from_slice(bytes);
                }
            }
            sim.queued += committed;
            sim.appl += committed;
            sim.commits += 1;
        }
        result
    }

    fn writei(&mut self, data: &[u8], frames: usize) -> std::result::Result<usize, Errno> {
        let mut sim = self.sim.borrow_mut();
        if sim.access != Some(Access::RwInterleaved)
            || !matches!(sim.state, PcmState::Prepared | PcmState::Running)
        {
            return Err(Errno::EBADFD);
        }

        let result = match sim.write_results.pop_front() {
            Some(scripted) => scripted,
            None if frames > sim.free() => Err(Errno::EAGAIN),
            None => Ok(frames),
        };
        if let Ok(written) = result {
            let written = written.min(frames);
            let bytes = (written * sim.frame_size()).min(data.len());
            if sim.recording {
                sim.played.extend_from_slice(&data[..bytes]);
            }
            sim.queued += written;
            sim.writes += 1;
            sim.state = PcmState::Running;
        }
        if self.nonblocking && result == Err(Errno::EAGAIN) {
            tracing::trace!("non-blocking write would block");
        }
        result
    }

    fn drain(&mut self) {
        let mut sim = self.sim.borrow_mut();
        sim.queued = 0;
        sim.state = PcmState::Setup;
    }

    fn close(self) {
        self.sim.borrow_mut().closes += 1;
        self.ledger.release(|c| &mut c.pcm_handles);
    }
}

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

/// Voice setup calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceStep {
    /// Opening the device.
    OpenDevice,
    /// Creating the context.
    CreateContext,
    /// Making the context current.
    MakeCurrent,
    /// `Voice::set_listener_origin`.
    Listener,
    /// `Voice::gen_buffers`.
    GenBuffers,
    /// `Voice::gen_source`.
    GenSource,
}

impl VoiceStep {
    /// Every step, in the order an open performs them.
    pub const ALL: [Self; 6] = [
        Self::OpenDevice,
        Self::CreateContext,
        Self::MakeCurrent,
        Self::Listener,
        Self::GenBuffers,
        Self::GenSource,
    ];
}

/// Voice runtime calls that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoiceCall {
    /// `Voice::buffer_data`.
    BufferData,
    /// `Voice::queue_buffer`.
    QueueBuffer,
    /// `Voice::unqueue_buffer`.
    UnqueueBuffer,
    /// `Voice::buffers_processed`.
    BuffersProcessed,
    /// `Voice::source_state`.
    SourceState,
    /// `Voice::play`.
    Play,
}

#[derive(Debug, Default)]
struct VoiceSim {
    opens: Vec<(VoiceFormat, u32)>,
    next_id: u32,
    live_buffers: Vec<BufferId>,
    source: Option<SourceId>,
    queued: VecDeque<BufferId>,
    processed: usize,
    processed_report: Option<usize>,
    started: bool,
    playing: bool,
    play_calls: usize,
    uploads: Vec<BufferId>,
    uploaded_bytes: usize,
    fail_next: Option<(VoiceCall, VoiceError)>,
}

impl VoiceSim {
    fn call(&mut self, call: VoiceCall) -> std::result::Result<(), VoiceError> {
        match self.fail_next {
            Some((failing, err)) if failing == call => {
                self.fail_next = None;
                Err(err)
            }
            _ => Ok(()),
        }
    }

    fn mark_processed(&mut self, buffers: usize) {
        self.processed = (self.processed + buffers).min(self.queued.len());
        if self.processed == self.queued.len() {
            self.playing = false;
        }
    }
}

/// Mock voice driver.
#[derive(Debug)]
pub struct MockVoice {
    ledger: Ledger,
    sim: Rc<RefCell<VoiceSim>>,
    fail_at: Option<(VoiceStep, VoiceError)>,
    float: bool,
    free_running: bool,
}

impl MockVoice {
    /// A voice driver with its own ledger.
    pub fn new() -> Self {
        Self {
            ledger: Ledger::default(),
            sim: Rc::default(),
            fail_at: None,
            float: false,
            free_running: false,
        }
    }

    /// Share `ledger` with other drivers.
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Make setup `step` fail with `err`.
    pub fn fail_at(mut self, step: VoiceStep, err: VoiceError) -> Self {
        self.fail_at = Some((step, err));
        self
    }

    /// Advertise 32-bit float buffers.
    pub fn with_float(mut self) -> Self {
        self.float = true;
        self
    }

    /// Report every queued buffer as processed on each poll.
    pub fn free_running(mut self) -> Self {
        self.free_running = true;
        self
    }

    /// Ledger shared with every voice this driver opens.
    pub fn ledger(&self) -> Ledger {
        self.ledger.clone()
    }

    /// Handle for inspecting and steering the simulated voice.
    pub fn probe(&self) -> VoiceProbe {
        VoiceProbe(Rc::clone(&self.sim))
    }

    fn step(&self, step: VoiceStep) -> std::result::Result<(), VoiceError> {
        match self.fail_at {
            Some((failing, err)) if failing == step => Err(err),
            _ => Ok(()),
        }
    }
}

impl Default for MockVoice {
    fn default() -> Self {
        Self::new()
    }
}

impl VoiceDriver for MockVoice {
    type Voice = MockVoiceHandle;

    fn supports_float(&self) -> bool {
        self.float
    }

    fn open_voice(
        &mut self,
        format: VoiceFormat,
        frame_rate: u32,
    ) -> std::result::Result<MockVoiceHandle, VoiceError> {
        self.sim.borrow_mut().opens.push((format, frame_rate));

        self.step(VoiceStep::OpenDevice)?;
        self.ledger.claim(|c| &mut c.devices, 1);

        if let Err(err) = self.step(VoiceStep::CreateContext) {
            self.ledger.release(|c| &mut c.devices);
            return Err(err);
        }
        self.ledger.claim(|c| &mut c.contexts, 1);

        if let Err(err) = self.step(VoiceStep::MakeCurrent) {
            self.ledger.release(|c| &mut c.contexts);
            self.ledger.release(|c| &mut c.devices);
            return Err(err);
        }

        {
            let mut sim = self.sim.borrow_mut();
            sim.queued.clear();
            sim.processed = 0;
            sim.started = false;
            sim.playing = false;
            sim.source = None;
        }

        Ok(MockVoiceHandle {
            sim: Rc::clone(&self.sim),
            ledger: self.ledger.clone(),
            format,
            fail_at: self.fail_at,
            free_running: self.free_running,
        })
    }
}

impl OutputDriver for MockVoice {
    fn name(&self) -> &'static str {
        "mock-voice"
    }

    fn open(&mut self, config: &DeviceConfig) -> Result<Negotiated> {
        voice::open_voice(self, config)
    }
}

/// Handle to the shared state of a [`MockVoice`] device.
#[derive(Debug, Clone)]
pub struct VoiceProbe(Rc<RefCell<VoiceSim>>);

impl VoiceProbe {
    /// Let the source finish the `buffers` oldest queued buffers. The source
    /// stops once nothing queued is left unplayed.
    pub fn play_through(&self, buffers: usize) {
        self.0.borrow_mut().mark_processed(buffers);
    }

    /// Make the next processed-count poll report `count` regardless of state.
    pub fn report_processed(&self, count: usize) {
        self.0.borrow_mut().processed_report = Some(count);
    }

    /// Make the next `call` fail with `err`.
    pub fn fail_next(&self, call: VoiceCall, err: VoiceError) {
        self.0.borrow_mut().fail_next = Some((call, err));
    }

    /// Buffers queued on the source, processed ones included.
    pub fn queued(&self) -> usize {
        self.0.borrow().queued.len()
    }

    /// Calls to `play`.
    pub fn play_calls(&self) -> usize {
        self.0.borrow().play_calls
    }

    /// Whether the source is playing.
    pub fn is_playing(&self) -> bool {
        self.0.borrow().playing
    }

    /// Buffer ids in upload order.
    pub fn uploads(&self) -> Vec<BufferId> {
        self.0.borrow().uploads.clone()
    }

    /// Total bytes uploaded into buffers.
    pub fn uploaded_bytes(&self) -> usize {
        self.0.borrow().uploaded_bytes
    }

    /// Format and frame rate of every open.
    pub fn opens(&self) -> Vec<(VoiceFormat, u32)> {
        self.0.borrow().opens.clone()
    }
}

/// Voice opened by [`MockVoice`].
#[derive(Debug)]
pub struct MockVoiceHandle {
    sim: Rc<RefCell<VoiceSim>>,
    ledger: Ledger,
    format: VoiceFormat,
    fail_at: Option<(VoiceStep, VoiceError)>,
    free_running: bool,
}

impl MockVoiceHandle {
    fn step(&self, step: VoiceStep) -> std::result::Result<(), VoiceError> {
        match self.fail_at {
            Some((failing, err)) if failing == step => Err(err),
            _ => Ok(()),
        }
    }

    fn check_source(&self, source: SourceId) -> std::result::Result<(), VoiceError> {
        if self.sim.borrow().source == Some(source) {
            Ok(())
        } else {
            Err(VoiceError::InvalidName)
        }
    }
}

impl Voice for MockVoiceHandle {
    fn set_listener_origin(&mut self) -> std::result::Result<(), VoiceError> {
        self.step(VoiceStep::Listener)
    }

    fn gen_buffers(&mut self, out: &mut [BufferId]) -> std::result::Result<(), VoiceError> {
        self.step(VoiceStep::GenBuffers)?;
        let mut sim = self.sim.borrow_mut();
        for slot in out.iter_mut() {
            sim.next_id += 1;
            *slot = BufferId(sim.next_id);
            sim.live_buffers.push(*slot);
        }
        self.ledger.claim(|c| &mut c.buffers, out.len());
        Ok(())
    }

    fn delete_buffers(&mut self, buffers: &[BufferId]) {
        let mut sim = self.sim.borrow_mut();
        for buffer in buffers {
            match sim.live_buffers.iter().position(|live| live == buffer) {
                Some(index) => {
                    sim.live_buffers.swap_remove(index);
                    self.ledger.release(|c| &mut c.buffers);
                }
                None => self.ledger.double_release(),
            }
        }
    }

    fn gen_source(&mut self) -> std::result::Result<SourceId, VoiceError> {
        self.step(VoiceStep::GenSource)?;
        let mut sim = self.sim.borrow_mut();
        if sim.source.is_some() {
            return Err(VoiceError::InvalidOperation);
        }
        let source = SourceId(1);
        sim.source = Some(source);
        self.ledger.claim(|c| &mut c.sources, 1);
        Ok(source)
    }

    fn delete_source(&mut self, source: SourceId) {
        let mut sim = self.sim.borrow_mut();
        if sim.source == Some(source) {
            sim.source = None;
            sim.queued.clear();
            sim.processed = 0;
            self.ledger.release(|c| &mut c.sources);
        } else {
            self.ledger.double_release();
        }
    }

    fn buffer_data(
        &mut self,
        buffer: BufferId,
        format: VoiceFormat,
        data: &[u8],
        _frame_rate: u32,
    ) -> std::result::Result<(), VoiceError> {
        let mut sim = self.sim.borrow_mut();
        sim.call(VoiceCall::BufferData)?;
        if !sim.live_buffers.contains(&buffer) {
            return Err(VoiceError::InvalidName);
        }
        let frame_size = format.sample_format().sample_size() * usize::from(format.channels());
        if format != self.format || data.len() % frame_size != 0 {
            return Err(VoiceError::InvalidValue);
        }
        sim.uploads.push(buffer);
        sim.uploaded_bytes += data.len();
        Ok(())
    }

    fn queue_buffer(&mut self, source: SourceId, buffer: BufferId) -> std::result::Result<(), VoiceError> {
        self.check_source(source)?;
        let mut sim = self.sim.borrow_mut();
        sim.call(VoiceCall::QueueBuffer)?;
        sim.queued.push_back(buffer);
        Ok(())
    }

    fn unqueue_buffer(&mut self, source: SourceId) -> std::result::Result<BufferId, VoiceError> {
        self.check_source(source)?;
        let mut sim = self.sim.borrow_mut();
        sim.call(VoiceCall::UnqueueBuffer)?;
        if sim.processed == 0 {
            return Err(VoiceError::InvalidValue);
        }
        sim.processed -= 1;
        sim.queued.pop_front().ok_or(VoiceError::InvalidValue)
    }

    fn buffers_processed(&mut self, source: SourceId) -> std::result::Result<usize, VoiceError> {
        self.check_source(source)?;
        let mut sim = self.sim.borrow_mut();
        sim.call(VoiceCall::BuffersProcessed)?;
        if self.free_running {
            let queued = sim.queued.len();
            sim.mark_processed(queued);
        }
        Ok(sim.processed_report.take().unwrap_or(sim.processed))
    }

    fn source_state(&mut self, source: SourceId) -> std::result::Result<SourceState, VoiceError> {
        self.check_source(source)?;
        let mut sim = self.sim.borrow_mut();
        sim.call(VoiceCall::SourceState)?;
        Ok(match (sim.started, sim.playing) {
            (false, _) => SourceState::Initial,
            (true, true) => SourceState::Playing,
            (true, false) => SourceState::Stopped,
        })
    }

    fn play(&mut self, source: SourceId) -> std::result::Result<(), VoiceError> {
        self.check_source(source)?;
        let mut sim = self.sim.borrow_mut();
        sim.call(VoiceCall::Play)?;
        sim.started = true;
        sim.playing = sim.processed < sim.queued.len();
        sim.play_calls += 1;
        Ok(())
    }

    fn close(self) {
        self.ledger.release(|c| &mut c.contexts);
        self.ledger.release(|c| &mut c.devices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_detects_double_release() {
        let ledger = Ledger::default();
        ledger.claim(|c| &mut c.buffers, 2);
        ledger.release(|c| &mut c.buffers);
        ledger.release(|c| &mut c.buffers);
        assert!(ledger.is_balanced());

        ledger.release(|c| &mut c.buffers);
        assert_eq!(ledger.counts().double_releases, 1);
        assert!(!ledger.is_balanced());
    }

    #[test]
    fn rate_near_picks_closest_supported() {
        let mut driver = MockPcm::new(1024).with_rates(&[44100, 48000, 96000]);
        let mut pcm = driver.open_pcm(false).unwrap();
        assert_eq!(pcm.set_rate_near(47000).unwrap(), 48000);
        assert_eq!(pcm.set_rate_near(22050).unwrap(), 44100);
        pcm.close();
        assert!(driver.ledger().is_balanced());
    }

    #[test]
    fn buffer_size_clamped_to_capacity() {
        let mut driver = MockPcm::new(512);
        let mut pcm = driver.open_pcm(false).unwrap();
        assert_eq!(pcm.set_buffer_size(4096).unwrap(), 512);
        pcm.close();
    }

    #[test]
    fn voice_open_failure_releases_partial_setup() {
        for step in [VoiceStep::OpenDevice, VoiceStep::CreateContext, VoiceStep::MakeCurrent] {
            let mut driver = MockVoice::new().fail_at(step, VoiceError::InvalidValue);
            assert!(driver.open_voice(VoiceFormat::Stereo16, 48000).is_err());
            assert!(driver.ledger().is_balanced(), "{step:?}");
        }
    }
}
