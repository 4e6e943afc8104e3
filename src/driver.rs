use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tiny_skia::Pixmap;
use tracing::{debug, info, warn};

use crate::background::BackgroundImages;
use crate::compositor::{compose_frame, demultiplied_rgba, new_surface, FrameContext, VideoFrame};
use crate::decoding::{probe_media, FfmpegInput, TrimRange};
use crate::dictionary::CustomTransliterations;
use crate::encoding::{EncodeSettings, FfmpegMode, FfmpegPipe};
use crate::overlay_config::OverlayConfig;
use crate::romanization::RomanizationEngine;
use crate::subtitle::{subtitle_at_time, SubtitleSegment};
use crate::text::TextPainter;

pub const PREVIEW_TICK: Duration = Duration::from_millis(100);

/// The editing session's state that every draw reads: subtitles, live
/// config, romanization tables and the background image cache. One owner
/// mutates it between draws.
#[derive(Debug, Clone, Default)]
pub struct OverlaySession {
    pub config: OverlayConfig,
    pub segments: Vec<SubtitleSegment>,
    pub engine: RomanizationEngine,
    pub custom: CustomTransliterations,
    pub images: BackgroundImages,
}

impl OverlaySession {
    pub fn new(config: OverlayConfig, segments: Vec<SubtitleSegment>) -> Self {
        Self {
            config,
            segments,
            ..Self::default()
        }
    }

    pub fn context(&self) -> FrameContext<'_> {
        FrameContext {
            config: &self.config,
            engine: &self.engine,
            custom: &self.custom,
            images: &self.images,
        }
    }

    /// Segment shown at `playback_time` once the lyric offset is applied.
    pub fn segment_at_playback(&self, playback_time: f64) -> Option<&SubtitleSegment> {
        subtitle_at_time(&self.segments, playback_time + self.config.lyric_offset)
    }

    /// Back to a fresh session's overlay settings. Subtitles stay.
    pub fn reset_config(&mut self) {
        self.config = OverlayConfig::default();
    }
}

/// Wall-clock playback position in seconds.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    anchor: Instant,
    anchor_time: f64,
    is_playing: bool,
}

impl PlaybackClock {
    pub fn new(start_time: f64, paused: bool) -> Self {
        Self {
            anchor: Instant::now(),
            anchor_time: start_time.max(0.0),
            is_playing: !paused,
        }
    }

    pub fn current_time(&self) -> f64 {
        if self.is_playing {
            self.anchor_time + self.anchor.elapsed().as_secs_f64()
        } else {
            self.anchor_time
        }
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn toggle_play_pause(&mut self) {
        self.anchor_time = self.current_time();
        self.anchor = Instant::now();
        self.is_playing = !self.is_playing;
    }

    pub fn seek_to(&mut self, time: f64) {
        self.anchor_time = time.max(0.0);
        self.anchor = Instant::now();
    }

    /// Fires every step of `script` whose trigger time has been reached.
    /// Each step fires at most once. Returns whether the clock changed.
    pub fn apply(&mut self, script: &mut ScrubScript) -> bool {
        let mut changed = false;
        if let Some((at, to)) = script.seek {
            if self.current_time() >= at {
                script.seek = None;
                self.seek_to(to);
                info!(at, to, "preview seek");
                changed = true;
            }
        }
        if let Some(at) = script.pause_at {
            if self.is_playing && self.current_time() >= at {
                script.pause_at = None;
                self.toggle_play_pause();
                info!(time = self.current_time(), "preview paused");
                changed = true;
            }
        }
        changed
    }
}

/// Scripted transport changes for an unattended preview: jump from one
/// playback time to another, and freeze the clock once it reaches a time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrubScript {
    /// `(at, to)`: when playback reaches `at`, continue from `to`.
    pub seek: Option<(f64, f64)>,
    pub pause_at: Option<f64>,
}

/// Live canvas: overlay drawn at the current playback time, no video.
pub struct LivePreview<P: TextPainter> {
    canvas: Pixmap,
    painter: P,
}

impl<P: TextPainter> LivePreview<P> {
    pub fn new(config: &OverlayConfig, painter: P) -> Result<Self> {
        let (width, height) = config.output_dimensions();
        Ok(Self {
            canvas: new_surface(width, height)?,
            painter,
        })
    }

    /// Redraws for `playback_time` (a tick or a scrub). Returns whether a
    /// segment was active.
    pub fn draw_at(&mut self, session: &OverlaySession, playback_time: f64) -> Result<bool> {
        let (width, height) = session.config.output_dimensions();
        if (self.canvas.width(), self.canvas.height()) != (width, height) {
            self.canvas = new_surface(width, height)?;
        }
        let segment = session.segment_at_playback(playback_time);
        compose_frame(
            &mut self.canvas,
            None,
            segment,
            &session.context(),
            &mut self.painter,
        )?;
        Ok(segment.is_some())
    }

    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }
}

/// Repeating timer for the live preview. The callback runs on the ticker
/// thread every `period` until it breaks, `stop` is called, or the ticker
/// is dropped.
pub struct PreviewTicker {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PreviewTicker {
    pub fn start<F>(period: Duration, mut on_tick: F) -> Result<Self>
    where
        F: FnMut(u64) -> ControlFlow<()> + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("subgloss-preview-ticker".to_owned())
            .spawn(move || {
                debug!(period_ms = period.as_millis() as u64, "preview ticker started");
                let mut tick = 0_u64;
                loop {
                    if on_tick(tick).is_break() {
                        break;
                    }
                    tick += 1;
                    match stop_rx.recv_timeout(period) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!(ticks = tick, "preview ticker stopped");
            })
            .context("failed to spawn preview ticker thread")?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancels the pending tick and waits for the thread.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("preview ticker thread panicked");
            }
        }
    }

    /// Blocks until the callback breaks out of the loop.
    pub fn wait(mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("preview ticker thread panicked")),
            None => Ok(()),
        }
    }
}

impl Drop for PreviewTicker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Watches one file and reports when it changed on disk.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    changes: Receiver<()>,
}

impl FileWatcher {
    pub fn new(path: &Path) -> Result<Self> {
        let target = canonical_path(path);
        let watched = target.clone();
        let (change_tx, changes) = mpsc::channel::<()>();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    if should_reload(&event) && event_targets_path(&event, &watched) {
                        let _ = change_tx.send(());
                    }
                }
                Err(error) => warn!(error = %error, "file watcher error"),
            }
        })
        .context("failed to create file watcher")?;
        let watch_root = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        watcher
            .watch(&watch_root, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", watch_root.display()))?;
        Ok(Self {
            _watcher: watcher,
            changes,
        })
    }

    /// True when at least one change arrived since the last call.
    pub fn take_change(&self) -> bool {
        let mut changed = false;
        while self.changes.try_recv().is_ok() {
            changed = true;
        }
        changed
    }
}

fn should_reload(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Any
    )
}

fn event_targets_path(event: &Event, target: &Path) -> bool {
    if event.paths.is_empty() {
        return true;
    }
    event.paths.iter().any(|path| {
        path == target
            || fs::canonicalize(path)
                .map(|resolved| resolved == target)
                .unwrap_or(false)
    })
}

fn canonical_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Lazily allocated offscreen surface reused across samples.
#[derive(Debug)]
pub struct SurfaceFactory {
    width: u32,
    height: u32,
    surface: Option<Pixmap>,
}

impl SurfaceFactory {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            surface: None,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get_or_create(&mut self) -> Result<&mut Pixmap> {
        let surface = match self.surface.take() {
            Some(surface) => surface,
            None => new_surface(self.width, self.height)?,
        };
        Ok(self.surface.insert(surface))
    }
}

/// Per-sample drawing callback for export. Output depends only on the
/// sample, the session config and the subtitles.
pub struct ExportDriver<'s, P: TextPainter> {
    session: &'s OverlaySession,
    surfaces: SurfaceFactory,
    painter: P,
}

impl<'s, P: TextPainter> ExportDriver<'s, P> {
    pub fn new(session: &'s OverlaySession, painter: P) -> Self {
        let (width, height) = session.config.output_dimensions();
        Self {
            session,
            surfaces: SurfaceFactory::new(width, height),
            painter,
        }
    }

    /// Source timeline position for a decoded sample, lyric offset included.
    pub fn sample_time(&self, sample_timestamp: f64) -> f64 {
        sample_timestamp + self.session.config.trim_start() + self.session.config.lyric_offset
    }

    pub fn process_sample(&mut self, sample: &VideoFrame) -> Result<&Pixmap> {
        let time = self.sample_time(sample.timestamp);
        let segment = subtitle_at_time(&self.session.segments, time);
        let sample_pixmap = sample.to_pixmap()?;
        let context = self.session.context();
        let surface = self.surfaces.get_or_create()?;
        compose_frame(surface, Some(&sample_pixmap), segment, &context, &mut self.painter)?;
        Ok(surface)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub output: PathBuf,
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub frame_rate: String,
}

/// Burns the overlay into `input` and writes an H.264 MP4 to `output`. On
/// failure the partial output is removed.
pub fn render_video<P: TextPainter>(
    session: &OverlaySession,
    painter: P,
    input: &Path,
    output: &Path,
    mode: FfmpegMode,
) -> Result<ExportSummary> {
    let result = run_export(session, painter, input, output, mode);
    if result.is_err() && output.exists() {
        match fs::remove_file(output) {
            Ok(()) => info!(output = %output.display(), "removed partial export"),
            Err(error) => warn!(output = %output.display(), error = %error, "failed to remove partial export"),
        }
    }
    result
}

fn run_export<P: TextPainter>(
    session: &OverlaySession,
    painter: P,
    input: &Path,
    output: &Path,
    mode: FfmpegMode,
) -> Result<ExportSummary> {
    let probe = probe_media(input)?;
    let trim = TrimRange {
        start: session.config.trim_start,
        end: session.config.trim_end,
    };
    session.images.preload_config(&session.config);

    let mut driver = ExportDriver::new(session, painter);
    let (width, height) = driver.surfaces.dimensions();
    let settings = EncodeSettings {
        width,
        height,
        frame_rate: probe.frame_rate.clone(),
        audio_source: probe.has_audio.then(|| input.to_path_buf()),
        trim,
    };
    info!(
        input = %input.display(),
        output = %output.display(),
        source = %format!("{}x{}", probe.width, probe.height),
        target = %format!("{width}x{height}"),
        fps = probe.fps,
        "export started"
    );

    let mut decoder = FfmpegInput::spawn(input, &probe, trim)?;
    let encoder = match FfmpegPipe::spawn_with_mode(&settings, output, mode) {
        Ok(encoder) => encoder,
        Err(error) => {
            decoder.abort();
            return Err(error);
        }
    };

    let progress_every = probe.fps.round().max(1.0) as u64;
    let mut frames = 0_u64;
    while let Some(sample) = decoder.read_frame() {
        let written = driver
            .process_sample(&sample)
            .map(demultiplied_rgba)
            .and_then(|rgba| encoder.write_frame(rgba));
        if let Err(error) = written {
            decoder.abort();
            return Err(match encoder.finish() {
                Err(encoder_error) => encoder_error.context(format!("export failed at frame {frames}")),
                Ok(()) => error.context(format!("export failed at frame {frames}")),
            });
        }
        frames += 1;
        if frames % progress_every == 0 {
            info!(frames, seconds = sample.timestamp, "export progress");
        }
    }

    let decoded = decoder.finish();
    let encoded = encoder.finish();
    decoded.context("video decode failed")?;
    encoded.context("video encode failed")?;
    if frames == 0 {
        return Err(anyhow!("no video frames decoded from {}", input.display()));
    }

    info!(frames, output = %output.display(), "export finished");
    Ok(ExportSummary {
        output: output.to_path_buf(),
        frames,
        width,
        height,
        frame_rate: probe.frame_rate,
    })
}
