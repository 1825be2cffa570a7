//! Criterion benchmarks for the cascada-io hot path
//!
//! Run with: cargo bench -p cascada-io

use cascada_core::{AudioFormat, Device, DeviceClass, DeviceConfig, SampleFormat};
use cascada_io::{MockPcm, MockVoice};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

const CHUNK_SIZES: [usize; 4] = [64, 256, 1024, 4096];

fn config(frames_per_chunk: usize, class: DeviceClass) -> DeviceConfig {
    DeviceConfig::new(AudioFormat::new(SampleFormat::S16, 2, 48000))
        .with_frames_per_chunk(frames_per_chunk)
        .with_class(class)
}

fn bench_mapped_ring(c: &mut Criterion) {
    let mut group = c.benchmark_group("MappedRing");

    for &frames in &CHUNK_SIZES {
        let mut driver = MockPcm::new(frames * 4).free_running().without_recording();
        let mut device = Device::open(&mut driver, &config(frames, DeviceClass::PushAsync))
            .expect("mock ring opens");

        group.bench_with_input(BenchmarkId::from_parameter(frames), &frames, |b, _| {
            b.iter(|| {
                let queued = device
                    .service(|region| region.fill(black_box(0x40)))
                    .expect("service");
                black_box(queued)
            })
        });
    }

    group.finish();
}

fn bench_blocking_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("BlockingWrite");

    for &frames in &CHUNK_SIZES {
        let mut driver = MockPcm::new(frames * 4).free_running().without_recording();
        let mut device = Device::open(&mut driver, &config(frames, DeviceClass::PushSync))
            .expect("mock pcm opens");
        let chunk = vec![0x40u8; device.chunk_bytes()];

        group.bench_with_input(BenchmarkId::from_parameter(frames), &frames, |b, _| {
            b.iter(|| {
                device.check().expect("check");
                device.queue(black_box(&chunk)).expect("queue");
            })
        });
    }

    group.finish();
}

fn bench_buffer_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("BufferQueue");

    for &frames in &CHUNK_SIZES {
        let mut driver = MockVoice::new().free_running();
        let mut device = Device::open(&mut driver, &config(frames, DeviceClass::PushSync))
            .expect("mock voice opens");
        let chunk = vec![0x40u8; device.chunk_bytes()];

        group.bench_with_input(BenchmarkId::from_parameter(frames), &frames, |b, _| {
            b.iter(|| {
                let empty = device.check().expect("check");
                for _ in 0..empty {
                    device.queue(black_box(&chunk)).expect("queue");
                }
                black_box(empty)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_mapped_ring, bench_blocking_write, bench_buffer_queue);
criterion_main!(benches);
