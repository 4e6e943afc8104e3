use std::collections::BTreeSet;
use std::fs;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use subgloss::alignment::align;
use subgloss::captions::{
    captions_to_segments, convert_captions_to_srt, convert_srt_to_captions, parse_multilingual_text,
    remove_language, shift_captions, CaptionLanguage, CaptionSegment,
};
use subgloss::compositor::{compose_frame, frame_digest, new_surface, save_png};
use subgloss::decoding::{extract_still, probe_media};
use subgloss::dictionary::{CustomTransliterations, JyutpingDictionary};
use subgloss::driver::{
    render_video, FileWatcher, LivePreview, OverlaySession, PlaybackClock, PreviewTicker, ScrubScript,
    PREVIEW_TICK,
};
use subgloss::encoding::FfmpegMode;
use subgloss::error_codes::{envelope_for, find_coded_error, CodedErrorKind};
use subgloss::overlay_config::{BackgroundMode, OverlayConfig};
use subgloss::romanization::{RomanizationEngine, RomanizationMode};
use subgloss::subtitle::{parse_srt, SubtitleSegment};
use subgloss::text::FontPainter;
use subgloss::timecode::format_timecode;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("SUBGLOSS_GIT_HASH"), ")");

#[derive(Debug, Parser)]
#[command(name = "subgloss", version = VERSION)]
#[command(about = "Burn romanized karaoke grids and English glosses into subtitled video")]
struct Cli {
    /// Print failures as a JSON error envelope on stdout.
    #[arg(long, global = true)]
    json_errors: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Parse a subtitle file and summarise it.
    Check {
        subtitles: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Romanize a line and show how labels align to characters.
    Romanize {
        text: String,
        #[arg(long, default_value = "jyutping")]
        mode: String,
        /// JSON map of character to candidate readings.
        #[arg(long)]
        custom: Option<PathBuf>,
        /// Jyutping table (TSV, JSON or Unihan readings) merged over the bundled one.
        #[arg(long)]
        dictionary: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// SRT to captions JSON, or captions JSON (`.json` input) back to SRT.
    Convert {
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        /// Seconds added to every timecode, clamped at zero.
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        shift: f64,
        /// Caption track to remove (language code, repeatable). A caption
        /// keeps its last track.
        #[arg(long = "drop", value_name = "CODE")]
        drop: Vec<String>,
    },
    /// Composite a single frame to PNG.
    Frame {
        subtitles: PathBuf,
        #[arg(long, default_value_t = 0.0)]
        time: f64,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        /// Draw over the video still at `--time`.
        #[arg(long)]
        video: Option<PathBuf>,
        #[command(flatten)]
        overlay: OverlayArgs,
    },
    /// Export an H.264 MP4 with the overlay burned in.
    Render {
        subtitles: PathBuf,
        input: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        /// ffmpeg backend: auto, system or sidecar.
        #[arg(long, default_value = "auto")]
        ffmpeg: String,
        #[command(flatten)]
        overlay: OverlayArgs,
    },
    /// Redraw the live overlay every tick and write it to a PNG.
    Preview {
        subtitles: PathBuf,
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
        #[arg(long, default_value_t = 0.0)]
        start: f64,
        /// Wall-clock seconds to keep redrawing.
        #[arg(long, default_value_t = 5.0)]
        duration: f64,
        /// Reload the subtitle file when it changes on disk.
        #[arg(long)]
        watch: bool,
        #[command(flatten)]
        transport: TransportArgs,
        #[command(flatten)]
        overlay: OverlayArgs,
    },
}

#[derive(Debug, Args)]
struct OverlayArgs {
    /// YAML overlay config.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    vertical_position: Option<f32>,
    #[arg(long = "size")]
    size_multiplier: Option<f32>,
    /// Lyric offset in seconds.
    #[arg(long = "offset", allow_hyphen_values = true)]
    lyric_offset: Option<f64>,
    #[arg(long)]
    landscape: bool,
    #[arg(long)]
    font: Option<PathBuf>,
    #[arg(long)]
    romanization: Option<String>,
    /// Jyutping table merged over the bundled one.
    #[arg(long)]
    dictionary: Option<PathBuf>,
    #[arg(long)]
    background: Option<String>,
    #[arg(long)]
    trim_start: Option<f64>,
    #[arg(long)]
    trim_end: Option<f64>,
}

#[derive(Debug, Args)]
struct TransportArgs {
    /// Hold the clock at `--start` instead of playing.
    #[arg(long)]
    paused: bool,
    /// Freeze playback once it reaches this time.
    #[arg(long)]
    pause_at: Option<f64>,
    /// Playback time that triggers the `--seek-to` jump.
    #[arg(long, requires = "seek_to")]
    seek_at: Option<f64>,
    #[arg(long, requires = "seek_at")]
    seek_to: Option<f64>,
}

impl TransportArgs {
    fn script(&self) -> ScrubScript {
        ScrubScript {
            seek: self.seek_at.zip(self.seek_to),
            pause_at: self.pause_at,
        }
    }
}

impl OverlayArgs {
    fn resolve(&self) -> Result<OverlayConfig> {
        let mut config = match &self.config {
            Some(path) => OverlayConfig::load(path)?,
            None => OverlayConfig::default(),
        };
        if let Some(value) = self.vertical_position {
            config.vertical_position = value;
        }
        if let Some(value) = self.size_multiplier {
            config.size_multiplier = value;
        }
        if let Some(value) = self.lyric_offset {
            config.lyric_offset = value;
        }
        if self.landscape {
            config.landscape_mode = true;
        }
        if let Some(font) = &self.font {
            config.font_path = Some(font.clone());
        }
        if let Some(mode) = &self.romanization {
            config.romanization = RomanizationMode::from_keyword(mode)?;
        }
        if let Some(path) = &self.dictionary {
            config.jyutping_dictionary = Some(path.clone());
        }
        if let Some(mode) = &self.background {
            config.background_mode = BackgroundMode::from_keyword(mode)?;
        }
        if self.trim_start.is_some() {
            config.trim_start = self.trim_start;
        }
        if self.trim_end.is_some() {
            config.trim_end = self.trim_end;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let json_errors = cli.json_errors;

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => report_error(&error, json_errors),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("SUBGLOSS_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn report_error(error: &anyhow::Error, json_errors: bool) -> ExitCode {
    if json_errors {
        match serde_json::to_string_pretty(&envelope_for(error)) {
            Ok(envelope) => println!("{envelope}"),
            Err(_) => eprintln!("error: {error:#}"),
        }
    } else {
        eprintln!("error: {error:#}");
    }
    match find_coded_error(error).map(|coded| coded.kind) {
        Some(CodedErrorKind::Usage) => ExitCode::from(2),
        Some(CodedErrorKind::Media) => ExitCode::from(3),
        None => ExitCode::FAILURE,
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Check { subtitles, json } => run_check(&subtitles, json),
        Commands::Romanize {
            text,
            mode,
            custom,
            dictionary,
            json,
        } => run_romanize(&text, &mode, custom.as_deref(), dictionary.as_deref(), json),
        Commands::Convert {
            input,
            output,
            shift,
            drop,
        } => run_convert(&input, output.as_deref(), shift, &drop),
        Commands::Frame {
            subtitles,
            time,
            output,
            video,
            overlay,
        } => run_frame(&subtitles, time, &output, video.as_deref(), &overlay),
        Commands::Render {
            subtitles,
            input,
            output,
            ffmpeg,
            overlay,
        } => run_render(&subtitles, &input, &output, &ffmpeg, &overlay),
        Commands::Preview {
            subtitles,
            output,
            start,
            duration,
            watch,
            transport,
            overlay,
        } => run_preview(
            &subtitles,
            &output,
            start,
            duration,
            watch,
            &transport,
            &overlay,
        ),
    }
}

fn is_captions_json(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"))
}

fn load_captions_json(path: &Path) -> Result<Vec<CaptionSegment>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse captions json {}", path.display()))
}

/// SRT, or captions JSON when the file ends in `.json`.
fn load_segments(path: &Path) -> Result<Vec<SubtitleSegment>> {
    if is_captions_json(path) {
        return Ok(captions_to_segments(&load_captions_json(path)?));
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_srt(&contents))
}

/// Bundled jyutping table, with `extra` merged over it when given.
fn romanization_engine(extra: Option<&Path>) -> Result<RomanizationEngine> {
    let mut dictionary = JyutpingDictionary::bundled();
    if let Some(path) = extra {
        let loaded = JyutpingDictionary::load(path)?;
        info!(path = %path.display(), entries = loaded.len(), "jyutping dictionary merged");
        dictionary.merge(loaded);
    }
    Ok(RomanizationEngine::new(dictionary))
}

fn build_session(subtitles: &Path, config: OverlayConfig) -> Result<OverlaySession> {
    let segments = load_segments(subtitles)?;
    let mut session = OverlaySession::new(config, segments);
    if let Some(path) = session.config.custom_transliterations.clone() {
        session.custom = CustomTransliterations::load(&path)?;
    }
    if let Some(path) = session.config.jyutping_dictionary.clone() {
        session.engine = romanization_engine(Some(&path))?;
    }
    Ok(session)
}

fn run_check(subtitles: &Path, json: bool) -> Result<()> {
    let segments = load_segments(subtitles)?;
    let languages: BTreeSet<&'static str> = segments
        .iter()
        .flat_map(|segment| parse_multilingual_text(&segment.raw_text))
        .filter_map(|(language, text)| text.map(|_| language.code()))
        .collect();
    let first_start = segments.iter().find_map(|segment| segment.start_time);
    let last_end = segments.iter().rev().find_map(|segment| segment.end_time);

    if json {
        let summary = json!({
            "path": subtitles.display().to_string(),
            "segments": segments.len(),
            "start": first_start,
            "end": last_end,
            "languages": languages,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let span = match (first_start, last_end) {
        (Some(start), Some(end)) => format!("{} --> {}", format_timecode(start), format_timecode(end)),
        _ => "untimed".to_owned(),
    };
    println!(
        "OK: {} ({} segments, {})",
        subtitles.display(),
        segments.len(),
        span
    );
    let languages: Vec<&str> = languages.into_iter().collect();
    println!("Languages: {}", languages.join(", "));
    Ok(())
}

fn run_romanize(
    text: &str,
    mode: &str,
    custom: Option<&Path>,
    dictionary: Option<&Path>,
    json: bool,
) -> Result<()> {
    let mode = RomanizationMode::from_keyword(mode)?;
    let custom = match custom {
        Some(path) => CustomTransliterations::load(path)?,
        None => CustomTransliterations::default(),
    };
    let engine = romanization_engine(dictionary)?;
    let romanized = engine.transliterate(text, mode, &custom);
    let units = align(&romanized, text);

    if json {
        let report = json!({
            "mode": mode,
            "labels": romanized.labels(),
            "units": units,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", romanized.to_label_string());
    for unit in &units {
        println!("{}\t{}", unit.label, unit.display_text);
    }
    Ok(())
}

fn drop_languages(captions: &mut [CaptionSegment], languages: &[CaptionLanguage]) {
    for (index, caption) in captions.iter_mut().enumerate() {
        for &language in languages {
            if caption.text.get(language).is_some() && !remove_language(caption, language) {
                warn!(
                    caption = index + 1,
                    language = language.code(),
                    "kept the caption's only track"
                );
            }
        }
    }
}

fn run_convert(input: &Path, output: Option<&Path>, shift: f64, drop: &[String]) -> Result<()> {
    let languages = drop
        .iter()
        .map(|code| CaptionLanguage::from_code(code))
        .collect::<Result<Vec<_>>>()?;
    let rendered = if is_captions_json(input) {
        let mut captions = shift_captions(&load_captions_json(input)?, shift);
        drop_languages(&mut captions, &languages);
        convert_captions_to_srt(&captions)
    } else {
        let contents =
            fs::read_to_string(input).with_context(|| format!("failed to read {}", input.display()))?;
        let mut captions = shift_captions(&convert_srt_to_captions(&contents), shift);
        drop_languages(&mut captions, &languages);
        let mut json = serde_json::to_string_pretty(&captions)?;
        json.push('\n');
        json
    };

    match output {
        Some(path) => {
            fs::write(path, rendered).with_context(|| format!("failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

fn run_frame(
    subtitles: &Path,
    time: f64,
    output: &Path,
    video: Option<&Path>,
    overlay: &OverlayArgs,
) -> Result<()> {
    let session = build_session(subtitles, overlay.resolve()?)?;
    let mut painter = FontPainter::discover(session.config.font_path.as_deref())?;
    session.images.preload_config(&session.config);

    let still = match video {
        Some(video) => {
            let probe = probe_media(video)?;
            Some(extract_still(video, &probe, time)?.to_pixmap()?)
        }
        None => None,
    };

    let (width, height) = session.config.output_dimensions();
    let mut surface = new_surface(width, height)?;
    let segment = session.segment_at_playback(time);
    compose_frame(
        &mut surface,
        still.as_ref(),
        segment,
        &session.context(),
        &mut painter,
    )?;
    save_png(&surface, output)?;

    println!("Wrote {} ({}x{})", output.display(), width, height);
    println!("sha256: {}", frame_digest(&surface));
    Ok(())
}

fn run_render(
    subtitles: &Path,
    input: &Path,
    output: &Path,
    ffmpeg: &str,
    overlay: &OverlayArgs,
) -> Result<()> {
    let mode = FfmpegMode::from_keyword(ffmpeg)?;
    let session = build_session(subtitles, overlay.resolve()?)?;
    let painter = FontPainter::discover(session.config.font_path.as_deref())?;

    let summary = render_video(&session, painter, input, output, mode)
        .with_context(|| format!("failed to export {}", output.display()))?;
    println!(
        "Wrote {} ({} frames, {}x{} @ {} fps)",
        summary.output.display(),
        summary.frames,
        summary.width,
        summary.height,
        summary.frame_rate
    );
    Ok(())
}

fn run_preview(
    subtitles: &Path,
    output: &Path,
    start: f64,
    duration: f64,
    watch: bool,
    transport: &TransportArgs,
    overlay: &OverlayArgs,
) -> Result<()> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(anyhow!("--duration must be > 0, got {duration}"));
    }
    let mut session = build_session(subtitles, overlay.resolve()?)?;
    let painter = FontPainter::discover(session.config.font_path.as_deref())?;
    let mut preview = LivePreview::new(&session.config, painter)?;
    let watcher = if watch {
        Some(FileWatcher::new(subtitles)?)
    } else {
        None
    };

    let mut clock = PlaybackClock::new(start, transport.paused);
    let mut script = transport.script();
    let started = Instant::now();
    let subtitles = subtitles.to_path_buf();
    let written = output.to_path_buf();
    let output = output.to_path_buf();
    let (failure_tx, failure_rx) = mpsc::channel::<anyhow::Error>();

    let ticker = PreviewTicker::start(PREVIEW_TICK, move |tick| {
        if watcher.as_ref().is_some_and(FileWatcher::take_change) {
            match load_segments(&subtitles) {
                Ok(segments) => {
                    info!(segments = segments.len(), "subtitles reloaded");
                    session.segments = segments;
                }
                Err(error) => error!(error = %format!("{error:#}"), "subtitle reload failed"),
            }
        }

        clock.apply(&mut script);
        let now = clock.current_time();
        let drawn = preview
            .draw_at(&session, now)
            .and_then(|active| save_png(preview.canvas(), &output).map(|()| active));
        match drawn {
            Ok(active) => debug!(
                tick,
                time = now,
                playing = clock.is_playing(),
                active,
                "preview frame"
            ),
            Err(error) => {
                let _ = failure_tx.send(error);
                return ControlFlow::Break(());
            }
        }

        if started.elapsed().as_secs_f64() >= duration {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })?;
    ticker.wait()?;

    if let Ok(error) = failure_rx.try_recv() {
        return Err(error.context("preview failed"));
    }
    println!("Wrote {}", written.display());
    Ok(())
}
