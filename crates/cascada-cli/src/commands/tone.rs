//! Sine tone playback through any output backend.

use super::common::{OutputArgs, Sine, open_device};
use clap::Args;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[derive(Args)]
pub struct ToneArgs {
    #[command(flatten)]
    output: OutputArgs,

    /// Tone frequency in Hz
    #[arg(long, default_value = "440")]
    freq: f64,

    /// Duration in seconds
    #[arg(long, default_value = "2.0")]
    seconds: f64,

    /// Peak amplitude (0.0 - 1.0)
    #[arg(long, default_value = "0.5")]
    amplitude: f64,
}

pub fn run(args: ToneArgs) -> anyhow::Result<()> {
    if !(args.seconds.is_finite() && args.seconds > 0.0) {
        anyhow::bail!("--seconds must be positive, got {}", args.seconds);
    }

    let config = args.output.resolve()?;
    let mut device = open_device(&config)?;
    let format = device.format();
    let chunk_frames = device.frames_per_chunk();

    println!("Playing {:.1} Hz for {:.1}s", args.freq, args.seconds);
    println!("  Driver: {} ({} model)", device.driver_name(), device.model());
    println!("  Format: {}", format);
    println!("  Class:  {}", device.class());
    if let Some(path) = &config.wav_path {
        println!("  Output: {}", path.display());
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        println!("\nStopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    let total_frames = (args.seconds * f64::from(format.frame_rate)).ceil() as usize;
    // Poll at half a chunk when the device has no room
    let idle = format.duration_of(chunk_frames) / 2;
    let mut sine = Sine::new(args.freq, args.amplitude, format);
    let mut written = 0;

    while running.load(Ordering::SeqCst) && written < total_frames {
        match device.service(|chunk| sine.fill(chunk, format)) {
            Ok(0) => std::thread::sleep(idle.max(Duration::from_millis(1))),
            Ok(chunks) => written += chunks * chunk_frames,
            Err(err) if err.kind().is_recoverable() => {
                tracing::warn!(error = %err, kind = ?err.kind(), "service tick failed, continuing");
            }
            Err(err) => {
                device.close();
                return Err(err.into());
            }
        }
    }

    println!(
        "Wrote {} frames ({:.2}s)",
        written,
        format.duration_of(written).as_secs_f64()
    );
    device.close();
    Ok(())
}
