//! Integration tests for the cascada-core device contract.
//!
//! A small in-memory driver stands in for hardware so the dispatch, chunk
//! validation and teardown rules of [`Device`] can be checked in isolation.

use cascada_core::{
    AudioFormat, BufferModel, ChunkGuard, Device, DeviceClass, DeviceConfig, DeviceState, Error,
    ErrorKind, MappedRing, Negotiated, OutputBackend, OutputDriver, Result, SampleFormat,
    Unavailable,
};
use std::cell::RefCell;
use std::rc::Rc;

// ---------------------------------------------------------------------------
// In-memory driver
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Log {
    opened: usize,
    closed: usize,
    commits: usize,
    releases: usize,
    written: Vec<u8>,
    seen_class: Option<DeviceClass>,
}

struct MemoryBackend {
    log: Rc<RefCell<Log>>,
    model: BufferModel,
    chunks_free: usize,
    region: Vec<u8>,
}

impl MappedRing for MemoryBackend {
    fn region_mut(&mut self) -> &mut [u8] {
        &mut self.region
    }

    fn commit_region(&mut self) -> Result<()> {
        let mut log = self.log.borrow_mut();
        log.commits += 1;
        log.written.extend_from_slice(&self.region);
        self.chunks_free -= 1;
        Ok(())
    }

    fn release_region(&mut self) {
        self.log.borrow_mut().releases += 1;
    }
}

impl OutputBackend for MemoryBackend {
    fn model(&self) -> BufferModel {
        self.model
    }

    fn state(&self) -> DeviceState {
        DeviceState::Running
    }

    fn check(&mut self) -> Result<usize> {
        Ok(self.chunks_free)
    }

    fn get_buffer(&mut self) -> std::result::Result<ChunkGuard<'_>, Unavailable> {
        if self.model != BufferModel::MappedRing {
            return Err(Unavailable::NotMapped);
        }
        let frames = self.region.len() / 4;
        Ok(ChunkGuard::new(self, frames))
    }

    fn queue(&mut self, chunk: &[u8]) -> Result<()> {
        self.log.borrow_mut().written.extend_from_slice(chunk);
        self.chunks_free -= 1;
        Ok(())
    }

    fn close(self: Box<Self>) {
        self.log.borrow_mut().closed += 1;
    }
}

struct MemoryDriver {
    log: Rc<RefCell<Log>>,
    model: BufferModel,
    chunks_free: usize,
    adjusted_rate: Option<u32>,
}

impl MemoryDriver {
    fn new(model: BufferModel) -> Self {
        Self {
            log: Rc::default(),
            model,
            chunks_free: 4,
            adjusted_rate: None,
        }
    }
}

impl OutputDriver for MemoryDriver {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn open(&mut self, config: &DeviceConfig) -> Result<Negotiated> {
        let mut log = self.log.borrow_mut();
        log.opened += 1;
        log.seen_class = Some(config.class);

        let mut format = config.format;
        if let Some(rate) = self.adjusted_rate {
            format.frame_rate = rate;
        }

        Ok(Negotiated {
            format,
            class: config.class,
            backend: Box::new(MemoryBackend {
                log: Rc::clone(&self.log),
                model: self.model,
                chunks_free: self.chunks_free,
                region: vec![0; config.chunk_bytes()],
            }),
        })
    }
}

fn stereo_16(frames_per_chunk: usize) -> DeviceConfig {
    DeviceConfig::new(AudioFormat::new(SampleFormat::S16, 2, 48000))
        .with_frames_per_chunk(frames_per_chunk)
}

// ---------------------------------------------------------------------------
// open()
// ---------------------------------------------------------------------------

#[test]
fn open_rejects_invalid_config_before_driver() {
    let mut driver = MemoryDriver::new(BufferModel::BlockingWrite);
    let err = Device::open(&mut driver, &stereo_16(0)).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::MisParam);
    assert_eq!(driver.log.borrow().opened, 0);
}

#[test]
fn open_coerces_callback_class() {
    let mut driver = MemoryDriver::new(BufferModel::BlockingWrite);
    let config = stereo_16(256).with_class(DeviceClass::Callback);
    let device = Device::open(&mut driver, &config).unwrap();

    assert_eq!(device.class(), DeviceClass::PushSync);
    assert_eq!(driver.log.borrow().seen_class, Some(DeviceClass::PushSync));
}

#[test]
fn open_reports_negotiated_rate() {
    let mut driver = MemoryDriver::new(BufferModel::BlockingWrite);
    driver.adjusted_rate = Some(44100);
    let device = Device::open(&mut driver, &stereo_16(256)).unwrap();

    assert_eq!(device.format().frame_rate, 44100);
    assert_eq!(device.chunk_bytes(), 1024);
    assert_eq!(device.driver_name(), "memory");
}

// ---------------------------------------------------------------------------
// queue() / service()
// ---------------------------------------------------------------------------

#[test]
fn queue_rejects_wrong_chunk_size() {
    let mut driver = MemoryDriver::new(BufferModel::BlockingWrite);
    let mut device = Device::open(&mut driver, &stereo_16(256)).unwrap();

    let err = device.queue(&[0u8; 1000]).unwrap_err();
    assert_eq!(
        err,
        Error::ChunkSize {
            expected: 1024,
            actual: 1000
        }
    );
    assert_eq!(err.kind(), ErrorKind::Generic);
    assert!(driver.log.borrow().written.is_empty());
}

#[test]
fn get_buffer_unavailable_on_blocking_model() {
    let mut driver = MemoryDriver::new(BufferModel::BlockingWrite);
    let mut device = Device::open(&mut driver, &stereo_16(256)).unwrap();

    assert_eq!(device.get_buffer().unwrap_err(), Unavailable::NotMapped);
}

#[test]
fn service_fills_mapped_ring_in_place() {
    let mut driver = MemoryDriver::new(BufferModel::MappedRing);
    let mut device = Device::open(&mut driver, &stereo_16(64)).unwrap();

    let queued = device.service(|chunk| chunk.fill(0x11)).unwrap();

    assert_eq!(queued, 4);
    let log = driver.log.borrow();
    assert_eq!(log.commits, 4);
    assert_eq!(log.releases, 0);
    assert_eq!(log.written.len(), 4 * 256);
    assert!(log.written.iter().all(|&b| b == 0x11));
}

#[test]
fn service_fills_scratch_for_owned_chunk_models() {
    let mut driver = MemoryDriver::new(BufferModel::BufferQueue);
    let mut device = Device::open(&mut driver, &stereo_16(32)).unwrap();

    let mut calls = 0;
    let queued = device
        .service(|chunk| {
            calls += 1;
            chunk.fill(calls);
        })
        .unwrap();

    assert_eq!(queued, 4);
    let log = driver.log.borrow();
    assert_eq!(log.written.len(), 4 * 128);
    assert_eq!(log.written[0], 1);
    assert_eq!(log.written[3 * 128], 4);
}

#[test]
fn dropped_guard_releases_claim() {
    let mut driver = MemoryDriver::new(BufferModel::MappedRing);
    let mut device = Device::open(&mut driver, &stereo_16(64)).unwrap();

    device.check().unwrap();
    {
        let _chunk = device.get_buffer().unwrap();
    }
    assert_eq!(device.check().unwrap(), 4);

    let log = driver.log.borrow();
    assert_eq!(log.commits, 0);
    assert_eq!(log.releases, 1);
}

// ---------------------------------------------------------------------------
// close()
// ---------------------------------------------------------------------------

#[test]
fn close_releases_backend_once() {
    let mut driver = MemoryDriver::new(BufferModel::BlockingWrite);
    let device = Device::open(&mut driver, &stereo_16(256)).unwrap();
    device.close();

    assert_eq!(driver.log.borrow().closed, 1);
}

#[test]
fn drop_closes_device() {
    let mut driver = MemoryDriver::new(BufferModel::BufferQueue);
    {
        let _device = Device::open(&mut driver, &stereo_16(256)).unwrap();
    }
    assert_eq!(driver.log.borrow().closed, 1);
}

#[test]
fn reopen_builds_fresh_state() {
    let mut driver = MemoryDriver::new(BufferModel::BlockingWrite);

    let mut device = Device::open(&mut driver, &stereo_16(256)).unwrap();
    device.queue(&[0u8; 1024]).unwrap();
    assert_eq!(device.check().unwrap(), 3);
    device.close();

    let mut device = Device::open(&mut driver, &stereo_16(256)).unwrap();
    assert_eq!(device.check().unwrap(), 4);
    device.close();

    let log = driver.log.borrow();
    assert_eq!(log.opened, 2);
    assert_eq!(log.closed, 2);
}
