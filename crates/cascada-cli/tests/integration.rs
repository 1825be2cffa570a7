//! Integration tests for the `cascada` binary.

use std::process::Command;
use tempfile::TempDir;

/// Helper to get the path to the `cascada` binary built by cargo.
fn cascada_bin() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_cascada"));
    // Keep the user's default config out of the way
    command.env("XDG_CONFIG_HOME", env!("CARGO_TARGET_TMPDIR"));
    command.env("RUST_LOG", "warn");
    command
}

#[test]
fn tone_renders_wav_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tone.wav");

    let output = cascada_bin()
        .args(["tone", "--rate", "8000", "--channels", "1", "--chunk", "100"])
        .args(["--buffers", "4", "--seconds", "0.1", "--output"])
        .arg(&path)
        .output()
        .expect("failed to run cascada tone");

    assert!(
        output.status.success(),
        "cascada tone failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, 8000);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.duration(), 800);

    let samples: Vec<i16> = reader.into_samples().map(Result::unwrap).collect();
    assert_eq!(samples[0], 0);
    assert!(samples.iter().any(|&s| s > 10000));
}

#[test]
fn tone_renders_float_wav() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tone.wav");

    let output = cascada_bin()
        .args(["tone", "--format", "f32", "--rate", "8000", "--chunk", "80"])
        .args(["--seconds", "0.04", "--output"])
        .arg(&path)
        .output()
        .expect("failed to run cascada tone");
    assert!(output.status.success());

    let reader = hound::WavReader::open(&path).unwrap();
    assert_eq!(reader.spec().sample_format, hound::SampleFormat::Float);
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.duration(), 320);
}

#[test]
fn tone_plays_through_mock_voice() {
    let output = cascada_bin()
        .args(["tone", "--driver", "mock", "--model", "voice", "--seconds", "0.05"])
        .output()
        .expect("failed to run cascada tone");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mock-voice"), "got: {stdout}");
    assert!(stdout.contains("buffer-queue"), "got: {stdout}");
}

#[test]
fn probe_reports_negotiated_ring() {
    let output = cascada_bin()
        .args(["probe", "--driver", "mock", "--class", "push-async"])
        .output()
        .expect("failed to run cascada probe");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("mapped-ring"), "got: {stdout}");
    assert!(stdout.contains("Running"), "got: {stdout}");
}

#[test]
fn probe_coerces_callback_class() {
    let output = cascada_bin()
        .args(["probe", "--driver", "mock", "--class", "callback"])
        .output()
        .expect("failed to run cascada probe");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Class:      push-sync"), "got: {stdout}");
    assert!(stdout.contains("blocking-write"), "got: {stdout}");
}

#[test]
fn wav_driver_without_path_fails() {
    let output = cascada_bin()
        .args(["probe", "--driver", "wav"])
        .output()
        .expect("failed to run cascada probe");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("wav_path"));
}

#[test]
fn zero_chunk_is_rejected() {
    let output = cascada_bin()
        .args(["probe", "--driver", "mock", "--chunk", "0"])
        .output()
        .expect("failed to run cascada probe");

    assert!(!output.status.success());
}

#[test]
fn oversized_ring_is_rejected() {
    for command in ["probe", "tone"] {
        let output = cascada_bin()
            .args([command, "--driver", "mock", "--chunk", "9223372036854775807"])
            .output()
            .expect("failed to run cascada");

        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(!output.status.success());
        assert!(stderr.contains("ring size overflows"), "{command}: {stderr}");
    }
}

#[test]
fn config_init_then_show() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conf").join("output.toml");

    let init = cascada_bin()
        .args(["config", "init"])
        .arg(&path)
        .output()
        .expect("failed to run cascada config init");
    assert!(init.status.success());
    assert!(path.exists());

    let again = cascada_bin()
        .args(["config", "init"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(!again.status.success(), "init must not overwrite without --force");

    let show = cascada_bin()
        .args(["config", "show"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(show.status.success());
    let stdout = String::from_utf8_lossy(&show.stdout);
    assert!(stdout.contains("frame_rate = 48000"), "got: {stdout}");
    assert!(stdout.contains(r#"class = "push-sync""#), "got: {stdout}");
}

#[test]
fn tone_uses_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("output.toml");
    let wav = dir.path().join("from-config.wav");
    std::fs::write(
        &config,
        format!(
            "driver = \"wav\"\nchannels = 1\nframe_rate = 8000\nframes_per_chunk = 200\nbuffer_count = 2\nwav_path = {:?}\n",
            wav.display().to_string()
        ),
    )
    .unwrap();

    let output = cascada_bin()
        .args(["tone", "--seconds", "0.05", "--config"])
        .arg(&config)
        .output()
        .expect("failed to run cascada tone");

    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let reader = hound::WavReader::open(&wav).unwrap();
    assert_eq!(reader.duration(), 400);
}
