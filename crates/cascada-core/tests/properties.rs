//! Property-based tests for cascada-core format arithmetic and config validation.

use cascada_core::{AudioFormat, DeviceClass, DeviceConfig, ErrorKind, SampleFormat};
use proptest::prelude::*;

fn sample_format() -> impl Strategy<Value = SampleFormat> {
    prop::sample::select(SampleFormat::ALL.to_vec())
}

fn device_class() -> impl Strategy<Value = DeviceClass> {
    prop::sample::select(vec![
        DeviceClass::PushAsync,
        DeviceClass::PushSync,
        DeviceClass::Callback,
    ])
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// frames_in() counts whole frames only: the remainder is always smaller
    /// than one frame.
    #[test]
    fn frames_in_never_counts_partial_frames(
        sample_format in sample_format(),
        channels in 1u16..=8,
        bytes in 0usize..1 << 20,
    ) {
        let format = AudioFormat::new(sample_format, channels, 48000);
        let frames = format.frames_in(bytes);
        let used = format.bytes_for(frames);

        prop_assert!(used <= bytes);
        prop_assert!(bytes - used < format.frame_size());
    }

    /// Any config with non-zero sizes validates; coercion never yields Callback.
    #[test]
    fn non_zero_configs_validate(
        sample_format in sample_format(),
        channels in 1u16..=8,
        frame_rate in 1u32..=384_000,
        frames_per_chunk in 1usize..=8192,
        buffer_count in 1usize..=64,
        class in device_class(),
    ) {
        let config = DeviceConfig::new(AudioFormat::new(sample_format, channels, frame_rate))
            .with_class(class)
            .with_frames_per_chunk(frames_per_chunk)
            .with_buffer_count(buffer_count);

        prop_assert!(config.validate().is_ok());
        prop_assert_eq!(config.chunk_bytes(), frames_per_chunk * sample_format.sample_size() * channels as usize);
        prop_assert_ne!(config.class.coerced(), DeviceClass::Callback);
    }

    /// A zero chunk size is always a parameter error, whatever else is set.
    #[test]
    fn zero_chunk_is_mis_param(
        sample_format in sample_format(),
        channels in 0u16..=8,
        buffer_count in 0usize..=8,
    ) {
        let config = DeviceConfig::new(AudioFormat::new(sample_format, channels, 48000))
            .with_frames_per_chunk(0)
            .with_buffer_count(buffer_count);

        let err = config.validate().unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::MisParam);
    }
}
