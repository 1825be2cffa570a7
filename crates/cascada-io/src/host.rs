//! Shared cpal plumbing for the hardware drivers.

use cascada_core::SampleFormat;
use cpal::traits::{DeviceTrait, HostTrait};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Default output device of the default host.
pub(crate) fn output_device() -> Option<cpal::Device> {
    let host = cpal::default_host();
    let device = host.default_output_device();
    if let Some(device) = &device {
        tracing::debug!(
            host = host.id().name(),
            device = device_name(device).as_deref().unwrap_or("unknown"),
            "default output device"
        );
    }
    device
}

/// Device name via `description()` (cpal 0.17+).
pub(crate) fn device_name(device: &cpal::Device) -> Option<String> {
    device.description().ok().map(|d| d.name().to_string())
}

pub(crate) fn cpal_format(format: SampleFormat) -> cpal::SampleFormat {
    match format {
        SampleFormat::U8 => cpal::SampleFormat::U8,
        SampleFormat::S16 => cpal::SampleFormat::I16,
        SampleFormat::S32 => cpal::SampleFormat::I32,
        SampleFormat::F32 => cpal::SampleFormat::F32,
    }
}

/// Whether the device has any output config with this sample layout.
pub(crate) fn supports(device: &cpal::Device, format: SampleFormat, channels: u16) -> bool {
    let wanted = cpal_format(format);
    device
        .supported_output_configs()
        .map(|mut configs| {
            configs.any(|range| range.sample_format() == wanted && range.channels() == channels)
        })
        .unwrap_or(false)
}

/// The supported frame rate closest to `rate` for this sample layout.
pub(crate) fn nearest_rate(
    device: &cpal::Device,
    format: SampleFormat,
    channels: u16,
    rate: u32,
) -> Option<u32> {
    let wanted = cpal_format(format);
    let configs = device.supported_output_configs().ok()?;
    configs
        .filter(|range| range.sample_format() == wanted && range.channels() == channels)
        .map(|range| rate.clamp(range.min_sample_rate(), range.max_sample_rate()))
        .min_by_key(|candidate| candidate.abs_diff(rate))
}

/// Flags raised by the audio callback thread.
#[derive(Debug, Default)]
pub(crate) struct StreamFlags {
    /// The stream reported an error; the device is gone or unusable.
    pub failed: AtomicBool,
    /// The callback ran out of queued audio after playback had begun.
    pub xrun: AtomicBool,
    /// Audio has been queued at least once.
    pub primed: AtomicBool,
}

impl StreamFlags {
    pub(crate) fn failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Clear and return the underrun flag.
    pub(crate) fn take_xrun(&self) -> bool {
        self.xrun.swap(false, Ordering::AcqRel)
    }
}

/// Build a paused raw output stream that asks `fill` for every period.
pub(crate) fn build_stream<F>(
    device: &cpal::Device,
    format: SampleFormat,
    channels: u16,
    frame_rate: u32,
    period_frames: u32,
    flags: &Arc<StreamFlags>,
    mut fill: F,
) -> std::result::Result<cpal::Stream, cpal::BuildStreamError>
where
    F: FnMut(&mut [u8]) + Send + 'static,
{
    let config = cpal::StreamConfig {
        channels,
        sample_rate: frame_rate,
        buffer_size: cpal::BufferSize::Fixed(period_frames),
    };
    let flags = Arc::clone(flags);

    let stream = device.build_output_stream_raw(
        &config,
        cpal_format(format),
        move |data: &mut cpal::Data, _: &cpal::OutputCallbackInfo| fill(data.bytes_mut()),
        move |err| {
            tracing::error!(%err, "output stream error");
            flags.failed.store(true, Ordering::Release);
        },
        None,
    )?;

    tracing::info!(
        channels,
        sample_rate = frame_rate,
        period_frames,
        format = %format,
        "output stream built"
    );
    Ok(stream)
}
