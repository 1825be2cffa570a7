//! Property-based tests for backend bookkeeping under arbitrary call sequences.

use cascada_core::{AudioFormat, Device, DeviceClass, DeviceConfig, Error, SampleFormat};
use cascada_io::{MockPcm, MockVoice};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum QueueOp {
    Queue,
    Play(usize),
    Check,
    /// Finish everything queued, then report `n` extra processed buffers.
    Overreport(usize),
}

fn queue_op() -> impl Strategy<Value = QueueOp> {
    prop_oneof![
        3 => Just(QueueOp::Queue),
        2 => (0usize..6).prop_map(QueueOp::Play),
        2 => Just(QueueOp::Check),
        1 => (1usize..6).prop_map(QueueOp::Overreport),
    ]
}

#[derive(Debug, Clone)]
enum RingOp {
    Service,
    Consume(usize),
    Claim { commit: bool },
}

fn ring_op() -> impl Strategy<Value = RingOp> {
    prop_oneof![
        Just(RingOp::Service),
        (0usize..2048).prop_map(RingOp::Consume),
        any::<bool>().prop_map(|commit| RingOp::Claim { commit }),
    ]
}

fn config(buffer_count: usize) -> DeviceConfig {
    DeviceConfig::new(AudioFormat::new(SampleFormat::S16, 2, 48000))
        .with_frames_per_chunk(64)
        .with_buffer_count(buffer_count)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// The empty slot count stays within [0, buffer_count] and matches a
    /// simple model of the voice for every call sequence.
    #[test]
    fn empty_slots_stay_in_bounds(
        buffer_count in 1usize..=8,
        ops in prop::collection::vec(queue_op(), 0..64),
    ) {
        let mut driver = MockVoice::new();
        let probe = driver.probe();
        let mut device = Device::open(&mut driver, &config(buffer_count)).unwrap();
        let chunk = vec![0u8; device.chunk_bytes()];

        let mut empty = buffer_count;
        let mut processed = 0usize;

        for op in ops {
            match op {
                QueueOp::Queue => {
                    let result = device.queue(&chunk);
                    if empty == 0 {
                        prop_assert_eq!(result, Err(Error::QueueFull));
                    } else {
                        prop_assert!(result.is_ok());
                        empty -= 1;
                    }
                }
                QueueOp::Play(n) => {
                    probe.play_through(n);
                    processed = (processed + n).min(buffer_count - empty);
                }
                QueueOp::Check => {
                    empty += processed;
                    processed = 0;
                    prop_assert_eq!(device.check().unwrap(), empty);
                }
                QueueOp::Overreport(extra) => {
                    let queued = buffer_count - empty;
                    probe.play_through(queued);
                    probe.report_processed(queued + extra);
                    empty = buffer_count;
                    processed = 0;
                    prop_assert_eq!(device.check().unwrap(), empty);
                }
            }
            prop_assert!(empty <= buffer_count);
        }

        device.close();
        prop_assert!(driver.ledger().is_balanced());
    }

    /// Every claim is followed by exactly one commit or release, and check()
    /// never reports more chunks than the ring holds.
    #[test]
    fn ring_claims_never_overlap(
        buffer_count in 2usize..=8,
        ops in prop::collection::vec(ring_op(), 0..48),
    ) {
        let mut driver = MockPcm::new(1 << 14);
        let probe = driver.probe();
        let config = config(buffer_count).with_class(DeviceClass::PushAsync);
        let mut device = Device::open(&mut driver, &config).unwrap();

        for op in ops {
            match op {
                RingOp::Service => {
                    device.service(|region| region.fill(0x7F)).unwrap();
                }
                RingOp::Consume(frames) => probe.consume(frames),
                RingOp::Claim { commit } => {
                    if device.check().unwrap() == 0 {
                        continue;
                    }
                    let region = device.get_buffer().unwrap();
                    if commit {
                        region.queue().unwrap();
                    }
                }
            }
            prop_assert!(device.check().unwrap() <= buffer_count);
            prop_assert_eq!(probe.overlapping_claims(), 0);
        }

        prop_assert_eq!(probe.played().len(), probe.commits() * device.chunk_bytes());
        device.close();
        prop_assert!(driver.ledger().is_balanced());
    }
}
