use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::json;
use tracing::debug;

use crate::decoding::TrimRange;
use crate::error_codes::CodedError;

/// Output stream description for the H.264 writer.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: String,
    /// Source whose audio is muxed in, trimmed like the video.
    pub audio_source: Option<PathBuf>,
    pub trim: TrimRange,
}

pub struct FfmpegPipe {
    sender: Option<mpsc::SyncSender<Vec<u8>>>,
    worker: Option<JoinHandle<Result<()>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfmpegMode {
    Auto,
    System,
    Sidecar,
}

impl FfmpegMode {
    pub fn from_keyword(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "system" => Ok(Self::System),
            "sidecar" => Ok(Self::Sidecar),
            _ => Err(anyhow!(CodedError::usage(
                "INVALID_FFMPEG_MODE",
                format!("invalid ffmpeg mode '{value}'"),
            )
            .with_details(json!({ "provided": value, "allowed": ["auto", "system", "sidecar"] })))),
        }
    }
}

trait VideoEncoderBackend: Send {
    fn mode_label(&self) -> &'static str;
    fn run(self: Box<Self>, receiver: mpsc::Receiver<Vec<u8>>) -> Result<()>;
}

struct SystemFfmpegBackend {
    settings: EncodeSettings,
    output_path: PathBuf,
}

#[cfg(feature = "sidecar_ffmpeg")]
struct SidecarFfmpegBackend {
    settings: EncodeSettings,
    output_path: PathBuf,
}

impl FfmpegPipe {
    pub fn spawn(settings: &EncodeSettings, output_path: &Path) -> Result<Self> {
        Self::spawn_with_mode(settings, output_path, FfmpegMode::Auto)
    }

    pub fn spawn_with_mode(
        settings: &EncodeSettings,
        output_path: &Path,
        mode: FfmpegMode,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Vec<u8>>(4);
        let backend = select_backend(mode, settings.clone(), output_path.to_path_buf())?;
        let worker_name = format!("subgloss-ffmpeg-encoder-{}", backend.mode_label());

        let worker = thread::Builder::new()
            .name(worker_name)
            .spawn(move || backend.run(receiver))
            .context("failed to spawn ffmpeg writer thread")?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn write_frame(&self, rgba_frame: Vec<u8>) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| anyhow!("encoder has already been finalized"))?;
        sender
            .send(rgba_frame)
            .map_err(|_| anyhow!("ffmpeg encoder stopped accepting frames"))
    }

    /// Closes the frame stream and waits for ffmpeg. When a write failed
    /// because ffmpeg exited, this returns ffmpeg's own error.
    pub fn finish(mut self) -> Result<()> {
        drop(self.sender.take());

        let handle = self
            .worker
            .take()
            .ok_or_else(|| anyhow!("ffmpeg worker thread missing"))?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow!("ffmpeg worker thread panicked")),
        }
    }
}

fn select_backend(
    mode: FfmpegMode,
    settings: EncodeSettings,
    output_path: PathBuf,
) -> Result<Box<dyn VideoEncoderBackend>> {
    match mode {
        FfmpegMode::Auto | FfmpegMode::System => Ok(Box::new(SystemFfmpegBackend {
            settings,
            output_path,
        })),
        FfmpegMode::Sidecar => {
            #[cfg(feature = "sidecar_ffmpeg")]
            {
                Ok(Box::new(SidecarFfmpegBackend {
                    settings,
                    output_path,
                }))
            }
            #[cfg(not(feature = "sidecar_ffmpeg"))]
            {
                let _ = (settings, output_path);
                Err(anyhow!(CodedError::usage(
                    "SIDECAR_UNAVAILABLE",
                    "ffmpeg sidecar mode requested but subgloss was built without `sidecar_ffmpeg`. Rebuild with `--features sidecar_ffmpeg`.",
                )))
            }
        }
    }
}

impl VideoEncoderBackend for SystemFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "system"
    }

    fn run(self: Box<Self>, receiver: mpsc::Receiver<Vec<u8>>) -> Result<()> {
        run_ffmpeg_process(
            Path::new("ffmpeg"),
            receiver,
            &self.settings,
            &self.output_path,
            self.mode_label(),
        )
    }
}

#[cfg(feature = "sidecar_ffmpeg")]
impl VideoEncoderBackend for SidecarFfmpegBackend {
    fn mode_label(&self) -> &'static str {
        "sidecar"
    }

    fn run(self: Box<Self>, receiver: mpsc::Receiver<Vec<u8>>) -> Result<()> {
        let path = ffmpeg_sidecar::paths::ffmpeg_path();
        if !path.exists() {
            ffmpeg_sidecar::download::auto_download()
                .context("failed to auto-download ffmpeg sidecar binary")?;
        }
        run_ffmpeg_process(
            &path,
            receiver,
            &self.settings,
            &self.output_path,
            self.mode_label(),
        )
    }
}

fn run_ffmpeg_process(
    ffmpeg_path: &Path,
    receiver: mpsc::Receiver<Vec<u8>>,
    settings: &EncodeSettings,
    output_path: &Path,
    mode_label: &str,
) -> Result<()> {
    let path_str = output_path.to_string_lossy();
    if path_str.chars().any(|c| c.is_control()) {
        bail!("output path contains control characters");
    }

    let args = ffmpeg_args(settings, output_path);
    debug!(mode = mode_label, args = %args.join(" "), "spawning ffmpeg encoder");
    let mut command = Command::new(ffmpeg_path);
    command
        .args(args.iter().map(String::as_str))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    let mut child = command.spawn().map_err(|error| {
        if error.kind() == ErrorKind::NotFound {
            anyhow!(CodedError::media(
                "FFMPEG_NOT_FOUND",
                format!(
                    "ffmpeg executable not found (mode={mode_label}, resolved_path={}). Install ffmpeg or use sidecar mode with `--features sidecar_ffmpeg`.",
                    ffmpeg_path.display()
                ),
            ))
        } else {
            anyhow!(
                "failed to spawn ffmpeg process (mode={mode_label}, resolved_path={}): {error}",
                ffmpeg_path.display()
            )
        }
    })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("failed to capture ffmpeg stdin"))?;
    let mut stderr_pipe = child.stderr.take();

    let mut write_error = None;
    while let Ok(frame) = receiver.recv() {
        if let Err(error) = stdin.write_all(&frame) {
            write_error = Some(error);
            break;
        }
    }
    drop(receiver);
    if write_error.is_none() {
        if let Err(error) = stdin.flush() {
            write_error = Some(error);
        }
    }
    drop(stdin);

    let status = child.wait().context("failed waiting for ffmpeg process")?;
    let stderr_tail = read_stderr_tail(&mut stderr_pipe)?;
    if !status.success() {
        return Err(anyhow!(CodedError::media(
            "FFMPEG_ENCODE_FAILED",
            format!("ffmpeg failed with status {status} (mode={mode_label})"),
        )
        .with_details(json!({
            "status": status.code(),
            "args": args,
            "stderr_tail": stderr_tail,
        }))));
    }
    if let Some(error) = write_error {
        return Err(anyhow!("failed to write frame to ffmpeg stdin: {error}"));
    }

    Ok(())
}

pub fn ffmpeg_args(settings: &EncodeSettings, output_path: &Path) -> Vec<String> {
    let mut args = ffmpeg_rawvideo_input_args(
        &format!("{}x{}", settings.width, settings.height),
        &settings.frame_rate,
    );
    match &settings.audio_source {
        Some(source) => {
            args.extend(settings.trim.input_args());
            args.extend([
                "-i".to_owned(),
                source.to_string_lossy().into_owned(),
                "-map".to_owned(),
                "0:v:0".to_owned(),
                "-map".to_owned(),
                "1:a:0?".to_owned(),
                "-c:a".to_owned(),
                "aac".to_owned(),
                "-b:a".to_owned(),
                "192k".to_owned(),
                "-shortest".to_owned(),
            ]);
        }
        None => args.push("-an".to_owned()),
    }
    args.extend(ffmpeg_h264_output_args());
    args.extend(ffmpeg_container_output_args(output_path));

    args.push(output_path.to_string_lossy().into_owned());
    args
}

pub fn ffmpeg_rawvideo_input_args(size: &str, frame_rate: &str) -> Vec<String> {
    vec![
        "-hide_banner".to_owned(),
        "-loglevel".to_owned(),
        "error".to_owned(),
        "-y".to_owned(),
        "-f".to_owned(),
        "rawvideo".to_owned(),
        "-pix_fmt".to_owned(),
        "rgba".to_owned(),
        "-s:v".to_owned(),
        size.to_owned(),
        "-r".to_owned(),
        frame_rate.to_owned(),
        "-i".to_owned(),
        "-".to_owned(),
    ]
}

pub fn ffmpeg_h264_output_args() -> Vec<String> {
    [
        "-c:v", "libx264", "-preset", "medium", "-crf", "18", "-pix_fmt", "yuv420p",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

pub fn ffmpeg_container_output_args(output_path: &Path) -> Vec<String> {
    let ext = output_path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if matches!(ext.as_str(), "mov" | "mp4" | "m4v") {
        vec!["-movflags".to_owned(), "+faststart".to_owned()]
    } else {
        Vec::new()
    }
}

pub(crate) fn read_stderr_tail(stderr: &mut Option<std::process::ChildStderr>) -> Result<String> {
    let Some(mut pipe) = stderr.take() else {
        return Ok(String::new());
    };
    let mut buf = Vec::new();
    pipe.read_to_end(&mut buf)
        .context("failed reading ffmpeg stderr")?;
    let text = String::from_utf8_lossy(&buf).to_string();
    Ok(last_n_chars(&text, 500))
}

fn last_n_chars(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars().collect::<Vec<_>>();
    if chars.len() > max_chars {
        chars = chars[chars.len().saturating_sub(max_chars)..].to_vec();
    }
    chars.into_iter().collect::<String>().trim().to_owned()
}
