use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use subgloss::decoding::{probe_media, FfmpegInput, TrimRange};
use subgloss::driver::{render_video, OverlaySession};
use subgloss::encoding::FfmpegMode;
use subgloss::overlay_config::OverlayConfig;
use subgloss::subtitle::parse_srt;
use subgloss::text::FixedAdvancePainter;
use tempfile::tempdir;

const SONG: &str = "1\n00:00:00,000 --> 00:00:01,000\n(yue)你好(en)Hello\n\n";

fn command_available(name: &str, version_arg: &str) -> bool {
    Command::new(name)
        .arg(version_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn ffmpeg_available() -> bool {
    command_available("ffmpeg", "-version") && command_available("ffprobe", "-version")
}

/// Two seconds of 320x240 test pattern at 10 fps with a sine tone.
fn write_test_clip(path: &Path) {
    let status = Command::new("ffmpeg")
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-y",
            "-f",
            "lavfi",
            "-i",
            "testsrc=size=320x240:rate=10:duration=2",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=440:duration=2",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
            "-shortest",
        ])
        .arg(path)
        .status()
        .expect("ffmpeg should run");
    assert!(status.success(), "test clip should encode");
}

#[test]
fn trimmed_decode_yields_timestamped_samples() {
    if !ffmpeg_available() {
        eprintln!("skipping trimmed_decode_yields_timestamped_samples: ffmpeg not installed");
        return;
    }
    let dir = tempdir().expect("tempdir should create");
    let clip = dir.path().join("clip.mp4");
    write_test_clip(&clip);

    let probe = probe_media(&clip).expect("probe should succeed");
    assert_eq!((probe.width, probe.height), (320, 240));
    assert!(probe.has_audio);

    let trim = TrimRange {
        start: Some(0.5),
        end: Some(1.5),
    };
    let mut input = FfmpegInput::spawn(&clip, &probe, trim).expect("decoder should spawn");
    let mut timestamps = Vec::new();
    while let Some(frame) = input.read_frame() {
        assert_eq!(frame.rgba.len(), 320 * 240 * 4);
        timestamps.push(frame.timestamp);
    }
    input.finish().expect("decoder should exit cleanly");
    assert!((9..=11).contains(&timestamps.len()), "got {} frames", timestamps.len());
    assert_eq!(timestamps[0], 0.0);
    assert!((timestamps[1] - 0.1).abs() < 1e-9);
}

#[test]
fn export_writes_portrait_mp4_with_audio() {
    if !ffmpeg_available() {
        eprintln!("skipping export_writes_portrait_mp4_with_audio: ffmpeg not installed");
        return;
    }
    let dir = tempdir().expect("tempdir should create");
    let clip = dir.path().join("clip.mp4");
    let output = dir.path().join("out.mp4");
    write_test_clip(&clip);

    let session = OverlaySession::new(OverlayConfig::default(), parse_srt(SONG));
    let summary = render_video(
        &session,
        FixedAdvancePainter::default(),
        &clip,
        &output,
        FfmpegMode::System,
    )
    .expect("export should succeed");
    assert_eq!((summary.width, summary.height), (1080, 1920));
    assert!(summary.frames >= 19);

    let exported = probe_media(&output).expect("output should probe");
    assert_eq!((exported.width, exported.height), (1080, 1920));
    assert!(exported.has_audio);
}

#[test]
fn failed_export_leaves_no_partial_output() {
    if !ffmpeg_available() {
        eprintln!("skipping failed_export_leaves_no_partial_output: ffmpeg not installed");
        return;
    }
    let dir = tempdir().expect("tempdir should create");
    let not_video = dir.path().join("notes.mp4");
    fs::write(&not_video, "not a video").expect("file should write");
    let output = dir.path().join("out.mp4");

    let session = OverlaySession::new(OverlayConfig::default(), parse_srt(SONG));
    let error = render_video(
        &session,
        FixedAdvancePainter::default(),
        &not_video,
        &output,
        FfmpegMode::System,
    )
    .expect_err("export should fail");
    let coded = subgloss::error_codes::find_coded_error(&error).expect("coded error");
    assert_eq!(coded.code, "FFPROBE_FAILED");
    assert!(!output.exists());
}
