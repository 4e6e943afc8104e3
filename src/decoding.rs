use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::compositor::VideoFrame;
use crate::encoding::read_stderr_tail;
use crate::error_codes::CodedError;

/// What the export needs to know about a source video.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaProbe {
    pub width: u32,
    pub height: u32,
    /// Frame rate as ffmpeg spells it, e.g. `30000/1001`.
    pub frame_rate: String,
    pub fps: f64,
    pub duration: Option<f64>,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

pub fn probe_media(input_path: &Path) -> Result<MediaProbe> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(input_path)
        .output()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!(CodedError::media(
                    "FFPROBE_NOT_FOUND",
                    "ffprobe executable not found. Install ffmpeg to export video.",
                ))
            } else {
                anyhow!("failed to spawn ffprobe: {error}")
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        return Err(anyhow!(CodedError::media(
            "FFPROBE_FAILED",
            format!("ffprobe could not read {}", input_path.display()),
        )
        .with_details(json!({ "status": output.status.code(), "stderr": stderr }))));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_json(&stdout)
        .with_context(|| format!("failed to interpret ffprobe output for {}", input_path.display()))
}

pub fn parse_probe_json(raw: &str) -> Result<MediaProbe> {
    let probe: ProbeOutput = serde_json::from_str(raw).context("ffprobe output is not valid json")?;
    let video = probe
        .streams
        .iter()
        .find(|stream| stream.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| anyhow!(CodedError::media("NO_VIDEO_STREAM", "input has no video stream")))?;
    let (width, height) = match (video.width, video.height) {
        (Some(width), Some(height)) if width > 0 && height > 0 => (width, height),
        _ => return Err(anyhow!("video stream has no dimensions")),
    };

    let frame_rate = [video.avg_frame_rate.as_deref(), video.r_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .find(|rate| parse_frame_rate(rate).is_some())
        .unwrap_or("30")
        .to_owned();
    let fps = parse_frame_rate(&frame_rate).unwrap_or(30.0);

    let duration = probe
        .format
        .and_then(|format| format.duration)
        .and_then(|duration| duration.parse::<f64>().ok());
    let has_audio = probe
        .streams
        .iter()
        .any(|stream| stream.codec_type.as_deref() == Some("audio"));

    Ok(MediaProbe {
        width,
        height,
        frame_rate,
        fps,
        duration,
        has_audio,
    })
}

/// `30000/1001`, `25/1` or `24`. Zero and unparsable rates are `None`.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let value = match raw.split_once('/') {
        Some((numerator, denominator)) => {
            let numerator = numerator.trim().parse::<f64>().ok()?;
            let denominator = denominator.trim().parse::<f64>().ok()?;
            if denominator == 0.0 {
                return None;
            }
            numerator / denominator
        }
        None => raw.trim().parse::<f64>().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Seconds of source to keep. The decoder seeks to `start` and stops at `end`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrimRange {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl TrimRange {
    pub fn input_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let start = self.start.unwrap_or(0.0);
        if start > 0.0 {
            args.push("-ss".to_owned());
            args.push(format!("{start:.3}"));
        }
        if let Some(end) = self.end {
            args.push("-t".to_owned());
            args.push(format!("{:.3}", (end - start).max(0.0)));
        }
        args
    }
}

pub fn decode_args(input_path: &Path, width: u32, height: u32, trim: TrimRange) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
    ];
    args.extend(trim.input_args());
    args.extend([
        "-i".to_owned(),
        input_path.to_string_lossy().into_owned(),
        "-an".to_owned(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        "rgba".to_owned(),
        "-s".to_owned(),
        format!("{width}x{height}"),
        "-sws_flags".to_owned(),
        "area".to_owned(),
        "-".to_owned(),
    ]);
    args
}

/// Child ffmpeg decoding to raw RGBA at a fixed size. Frames arrive through
/// a bounded channel fed by a reader thread.
pub struct FfmpegInput {
    receiver: mpsc::Receiver<Vec<u8>>,
    worker: Option<JoinHandle<Result<()>>>,
    child: Child,
    stderr: Option<ChildStderr>,
    input_path: PathBuf,
    width: u32,
    height: u32,
    fps: f64,
    frames_read: u64,
}

impl FfmpegInput {
    pub fn spawn(input_path: &Path, probe: &MediaProbe, trim: TrimRange) -> Result<Self> {
        let (width, height) = (probe.width, probe.height);
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);
        let args = decode_args(input_path, width, height, trim);
        debug!(args = %args.join(" "), "spawning ffmpeg decoder");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    anyhow!(CodedError::media(
                        "FFMPEG_NOT_FOUND",
                        "ffmpeg executable not found. Install ffmpeg to export video.",
                    ))
                } else {
                    anyhow!("failed to spawn ffmpeg decoder: {error}")
                }
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture ffmpeg stdout"))?;
        let stderr = child.stderr.take();
        let frame_size = width as usize * height as usize * 4;

        let worker = thread::Builder::new()
            .name("subgloss-ffmpeg-decoder".to_owned())
            .spawn(move || {
                loop {
                    let mut buffer = vec![0u8; frame_size];
                    match stdout.read_exact(&mut buffer) {
                        Ok(()) => {
                            if sender.send(buffer).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                        Err(e) => return Err(anyhow!("failed to read from ffmpeg: {e}")),
                    }
                }
                Ok(())
            })
            .context("failed to spawn ffmpeg reader thread")?;

        Ok(Self {
            receiver,
            worker: Some(worker),
            child,
            stderr,
            input_path: input_path.to_path_buf(),
            width,
            height,
            fps: probe.fps,
            frames_read: 0,
        })
    }

    /// Next sample, timestamped from the start of the trimmed stream.
    pub fn read_frame(&mut self) -> Option<VideoFrame> {
        let rgba = self.receiver.recv().ok()?;
        let timestamp = self.frames_read as f64 / self.fps;
        self.frames_read += 1;
        Some(VideoFrame {
            rgba,
            width: self.width,
            height: self.height,
            timestamp,
        })
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Waits for ffmpeg to exit after the last frame and reports failures.
    pub fn finish(mut self) -> Result<()> {
        let reader_result = match self.worker.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(anyhow!("ffmpeg reader thread panicked"))),
            None => Ok(()),
        };
        let status = self.child.wait().context("failed waiting for ffmpeg decoder")?;
        let stderr_tail = read_stderr_tail(&mut self.stderr)?;
        reader_result?;
        if !status.success() {
            return Err(anyhow!(CodedError::media(
                "FFMPEG_DECODE_FAILED",
                format!("ffmpeg failed decoding {}", self.input_path.display()),
            )
            .with_details(json!({ "status": status.code(), "stderr_tail": stderr_tail }))));
        }
        Ok(())
    }

    /// Stops decoding early.
    pub fn abort(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        drop(self.receiver);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

/// One decoded sample at `time` seconds into the source, at native size.
pub fn extract_still(input_path: &Path, probe: &MediaProbe, time: f64) -> Result<VideoFrame> {
    let trim = TrimRange {
        start: Some(time.max(0.0)),
        end: None,
    };
    let mut args = decode_args(input_path, probe.width, probe.height, trim);
    let output_at = args.len() - 1;
    args.insert(output_at, "1".to_owned());
    args.insert(output_at, "-frames:v".to_owned());
    debug!(args = %args.join(" "), "grabbing still");

    let output = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .output()
        .map_err(|error| {
            if error.kind() == ErrorKind::NotFound {
                anyhow!(CodedError::media(
                    "FFMPEG_NOT_FOUND",
                    "ffmpeg executable not found. Install ffmpeg to read video stills.",
                ))
            } else {
                anyhow!("failed to spawn ffmpeg: {error}")
            }
        })?;

    let frame_size = probe.width as usize * probe.height as usize * 4;
    if !output.status.success() || output.stdout.len() < frame_size {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
        return Err(anyhow!(CodedError::media(
            "FFMPEG_DECODE_FAILED",
            format!("no frame at {time:.3}s in {}", input_path.display()),
        )
        .with_details(json!({ "status": output.status.code(), "stderr_tail": stderr }))));
    }

    let mut rgba = output.stdout;
    rgba.truncate(frame_size);
    Ok(VideoFrame {
        rgba,
        width: probe.width,
        height: probe.height,
        timestamp: time,
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{decode_args, parse_frame_rate, parse_probe_json, TrimRange};

    #[test]
    fn frame_rates_parse_as_ratios() {
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn probe_json_picks_video_stream() {
        let raw = r#"{
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1280, "height": 720,
                 "avg_frame_rate": "0/0", "r_frame_rate": "24000/1001"}
            ],
            "format": {"duration": "12.5"}
        }"#;
        let probe = parse_probe_json(raw).unwrap();
        assert_eq!((probe.width, probe.height), (1280, 720));
        assert_eq!(probe.frame_rate, "24000/1001");
        assert_eq!(probe.duration, Some(12.5));
        assert!(probe.has_audio);
    }

    #[test]
    fn probe_without_video_is_media_error() {
        let error = parse_probe_json(r#"{"streams": [{"codec_type": "audio"}]}"#).unwrap_err();
        let coded = crate::error_codes::find_coded_error(&error).unwrap();
        assert_eq!(coded.code, "NO_VIDEO_STREAM");
    }

    #[test]
    fn trim_seeks_before_input_and_limits_duration() {
        let trim = TrimRange {
            start: Some(1.5),
            end: Some(4.0),
        };
        let args = decode_args(Path::new("in.mp4"), 640, 360, trim);
        let input_at = args.iter().position(|arg| arg == "-i").unwrap();
        assert_eq!(&args[input_at - 4..input_at], ["-ss", "1.500", "-t", "2.500"]);
        assert!(args.contains(&"640x360".to_owned()));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }

    #[test]
    fn untrimmed_decode_has_no_seek() {
        let args = decode_args(Path::new("in.mp4"), 2, 2, TrimRange::default());
        assert!(!args.contains(&"-ss".to_owned()));
        assert!(!args.contains(&"-t".to_owned()));
    }
}
