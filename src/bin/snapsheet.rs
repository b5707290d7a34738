use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;
use serde_json::json;
use snapsheet::{
    CancellationToken, Compositor, ContactSheet, DEFAULT_EXTENSION, DEFAULT_SUFFIX, DurationMode,
    FfmpegLogLevel, FfmpegSource, FrameFiles, FrameGeometry, MediaSource, ProgressInfo, RunReport,
    SessionEvent, Session, SnapOptions, SnapshotListener, Strategy, StrategyMode, StreamKind,
    conversion::format_timestamp, duration::scan_statistics, output_path, run_bound, run_each,
};

const CLI_AFTER_HELP: &str = "Examples:\n  snapsheet sheet input.mp4 --columns 4 --rows 5 --timestamps\n  snapsheet sheet *.mkv --out-dir sheets --step 0:01:00 --progress\n  snapsheet bind part1.mp4 part2.mp4 --out whole.jpg\n  snapsheet frames input.mp4 --count 12 --out frames\n  snapsheet info input.mp4 --json\n  snapsheet completions zsh > _snapsheet";

#[derive(Debug, Parser)]
#[command(
    name = "snapsheet",
    version,
    about = "Contact sheets and thumbnails from video files",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging.
    #[arg(long, global = true)]
    verbose: bool,

    /// Only show errors.
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Show a progress bar.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

/// Shot selection shared by the capturing subcommands.
#[derive(Debug, Args, Clone)]
struct ShotArgs {
    /// Time between shots (seconds or [HH:]MM:SS); with --rows 0 the rows
    /// follow from it.
    #[arg(long)]
    step: Option<String>,

    /// Take one shot per keyframe instead of evenly spaced shots.
    #[arg(long, conflicts_with = "step")]
    rip: bool,

    /// Stop a keyframe rip after this many shots.
    #[arg(long, requires = "rip")]
    limit: Option<u64>,

    /// Start of the range to take shots from.
    #[arg(long)]
    from: Option<String>,

    /// End of the range to take shots from.
    #[arg(long)]
    to: Option<String>,

    /// Include a shot at the very start of the range.
    #[arg(long)]
    first: bool,

    /// Include a shot at the very end of the range.
    #[arg(long)]
    last: bool,

    /// Decode up to the exact target instead of the nearest keyframe.
    #[arg(long)]
    accurate: bool,

    /// Burn the media time into each shot.
    #[arg(long)]
    timestamps: bool,

    /// Acquisition strategy (auto, skim, scan, two-pass, safe, keyframe-rip).
    #[arg(long, default_value = "auto")]
    strategy: String,

    /// How to find the duration (auto, header, full, tail).
    #[arg(long, default_value = "auto")]
    duration: String,

    /// Video stream index to use instead of the best one.
    #[arg(long)]
    stream: Option<usize>,

    /// Thumbnail width.
    #[arg(long)]
    width: Option<u32>,

    /// Thumbnail height.
    #[arg(long)]
    height: Option<u32>,

    /// Thumbnail scale in percent when no dimension is given.
    #[arg(long, default_value_t = 50)]
    scale: u32,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Make one contact sheet per input file.
    #[command(
        about = "Make contact sheets",
        after_help = "Examples:\n  snapsheet sheet input.mp4\n  snapsheet sheet input.mp4 --columns 3 --rows 0 --step 30 --timestamps"
    )]
    Sheet {
        /// Input media files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Grid columns.
        #[arg(long, short, default_value_t = 4)]
        columns: u32,
        /// Grid rows; 0 derives them from --step.
        #[arg(long, short, default_value_t = 4)]
        rows: u32,
        /// Directory for the sheets; defaults to each input's directory.
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Suffix appended to each input's file stem.
        #[arg(long, default_value = DEFAULT_SUFFIX)]
        suffix: String,
        /// Output image extension.
        #[arg(long, default_value = DEFAULT_EXTENSION)]
        ext: String,
        /// Pixels between shots.
        #[arg(long, default_value_t = 4)]
        gap: i32,
        #[command(flatten)]
        shots: ShotArgs,
    },

    /// Bind several files into one contact sheet.
    #[command(
        about = "Bind files into one sheet",
        after_help = "Examples:\n  snapsheet bind cd1.avi cd2.avi --out movie.jpg --columns 5 --rows 6"
    )]
    Bind {
        /// Input media files, in playback order.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Output image path.
        #[arg(long)]
        out: PathBuf,
        /// Grid columns.
        #[arg(long, short, default_value_t = 4)]
        columns: u32,
        /// Grid rows; 0 derives them from --step.
        #[arg(long, short, default_value_t = 4)]
        rows: u32,
        /// Pixels between shots.
        #[arg(long, default_value_t = 4)]
        gap: i32,
        #[command(flatten)]
        shots: ShotArgs,
    },

    /// Save each shot to its own file.
    #[command(
        about = "Save shots as separate files",
        after_help = "Examples:\n  snapsheet frames input.mp4 --count 12 --out frames --ext png"
    )]
    Frames {
        /// Input media file.
        input: PathBuf,
        /// Output directory.
        #[arg(long)]
        out: PathBuf,
        /// Number of shots; 0 derives it from --step.
        #[arg(long, default_value_t = 16)]
        count: u32,
        /// Output image extension.
        #[arg(long, default_value = DEFAULT_EXTENSION)]
        ext: String,
        #[command(flatten)]
        shots: ShotArgs,
    },

    /// Print stream information and the resolved duration.
    #[command(
        about = "Print media information",
        visible_alias = "probe",
        after_help = "Examples:\n  snapsheet info input.mp4\n  snapsheet info input.mp4 --json"
    )]
    Info {
        /// Input media file.
        input: PathBuf,
        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
        /// How to find the duration (auto, header, full, tail).
        #[arg(long, default_value = "auto")]
        duration: String,
    },

    /// Read every packet and print per-stream statistics.
    #[command(about = "Print packet statistics")]
    Stats {
        /// Input media file.
        input: PathBuf,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(Duration::from_secs_f64(seconds.max(0.0)));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::from_secs_f64(total_seconds.max(0.0)))
}

fn parse_millis(value: &str) -> Result<i64, Box<dyn std::error::Error>> {
    Ok(parse_timecode(value)?.as_millis() as i64)
}

fn parse_strategy(value: &str) -> Option<StrategyMode> {
    let strategy = match value.to_ascii_lowercase().as_str() {
        "auto" => return Some(StrategyMode::Auto),
        "skim" | "seek" => Strategy::Skim,
        "scan" => Strategy::Scan,
        "two-pass" | "twopass" => Strategy::TwoPass,
        "safe" | "slow" => Strategy::Safe,
        "keyframe-rip" | "rip" => Strategy::KeyframeRip,
        _ => return None,
    };
    Some(StrategyMode::Force(strategy))
}

fn parse_duration_mode(value: &str) -> Option<DurationMode> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Some(DurationMode::Auto),
        "header" => Some(DurationMode::Header),
        "full" | "full-scan" => Some(DurationMode::FullScan),
        "tail" | "tail-scan" => Some(DurationMode::TailScan),
        _ => None,
    }
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn snap_options(
    global: &GlobalOptions,
    shots: &ShotArgs,
    token: &CancellationToken,
) -> Result<SnapOptions, Box<dyn std::error::Error>> {
    let strategy = parse_strategy(&shots.strategy)
        .ok_or(format!("unsupported --strategy: {}", shots.strategy))?;
    let duration = parse_duration_mode(&shots.duration)
        .ok_or(format!("unsupported --duration: {}", shots.duration))?;
    let from = shots.from.as_deref().map(parse_millis).transpose()?;
    let to = shots.to.as_deref().map(parse_millis).transpose()?;
    if let (Some(from), Some(to)) = (from, to)
        && to <= from
    {
        return Err("--to must be after --from".into());
    }

    let mut options = SnapOptions::new()
        .with_range(from.unwrap_or(0), to)
        .with_first_frame(shots.first)
        .with_last_frame(shots.last)
        .with_accurate(shots.accurate)
        .with_timestamps(shots.timestamps)
        .with_strategy(strategy)
        .with_duration_mode(duration)
        .with_geometry(FrameGeometry {
            width: shots.width,
            height: shots.height,
            scale_percent: shots.scale,
        })
        .with_cancellation(token.clone());

    if shots.rip {
        options = options.with_time_step(-1);
    } else if let Some(step) = &shots.step {
        let step = parse_millis(step)?;
        if step == 0 {
            return Err("--step must be greater than 0".into());
        }
        options = options.with_time_step(step);
    }
    if let Some(limit) = shots.limit {
        options = options.with_keyframe_limit(limit);
    }
    if let Some(stream) = shots.stream {
        options = options.with_stream_index(stream);
    }
    if global.progress {
        options = options.with_listener(Arc::new(TerminalProgress::new()?));
    }
    Ok(options)
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let filter = if global.quiet {
        LevelFilter::Error
    } else if global.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .format_timestamp(None)
        .init();

    let ffmpeg_level = match &global.log_level {
        Some(level) => level.parse::<FfmpegLogLevel>()?,
        None => FfmpegLogLevel::quieter_than(filter),
    };
    snapsheet::set_ffmpeg_log_level(ffmpeg_level);
    Ok(())
}

fn install_interrupt_handler() -> Result<CancellationToken, Box<dyn std::error::Error>> {
    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        handler_token.cancel();
        eprintln!("\n{}", "interrupted, finishing up...".yellow());
    })?;
    Ok(token)
}

/// Shows a progress bar per file and prints session events above it.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::hidden();
        let style =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl SnapshotListener for TerminalProgress {
    fn on_begin(&self, label: &str, planned: Option<u64>) {
        self.bar.reset();
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_length(planned.unwrap_or(0));
        self.bar.set_message(label.to_string());
    }

    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_position(info.current);
        if let Some(millis) = info.last_timestamp_ms {
            self.bar.set_message(format_timestamp(millis, false));
        }
    }

    fn on_end(&self, label: &str, taken: u64) {
        self.bar
            .finish_with_message(format!("{label}: {taken} shots"));
    }

    fn on_event(&self, event: &SessionEvent) {
        let line = match event {
            SessionEvent::FileSkipped { path, error } => {
                format!("{} {}: {error}", "skipped".red().bold(), path.display())
            }
            SessionEvent::PartialResult { taken, planned } => format!(
                "{} only {taken} of {planned} shots could be taken",
                "partial".yellow().bold()
            ),
            SessionEvent::StrategyDemoted { from, to } => format!(
                "{} seeking is unreliable, switched from {from} to {to}",
                "notice".yellow().bold()
            ),
            SessionEvent::DurationResolved { millis, method } => format!(
                "{} {} ({method})",
                "duration".cyan().bold(),
                format_timestamp(*millis, true)
            ),
            SessionEvent::SeekabilityDetected(seekability) => {
                format!("{} {seekability}", "seeking".cyan().bold())
            }
            _ => return,
        };
        self.bar.println(line);
    }
}

fn print_report(report: &RunReport, output: &Path) {
    let status = if report.cancelled {
        "cancelled".yellow().bold()
    } else if report.partial {
        "partial".yellow().bold()
    } else {
        "saved".green().bold()
    };
    println!(
        "{status} {} ({}/{} shots, {}, {} via {})",
        output.display(),
        report.taken,
        report.planned,
        report.strategy,
        format_timestamp(report.duration.millis, false),
        report.duration.method
    );
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Sheet {
            inputs,
            columns,
            rows,
            out_dir,
            suffix,
            ext,
            gap,
            shots,
        } => {
            let token = install_interrupt_handler()?;
            let options = snap_options(&cli.global, &shots, &token)?.with_grid(columns, rows);
            if let Some(dir) = &out_dir {
                std::fs::create_dir_all(dir)?;
            }
            let outputs: Vec<PathBuf> = inputs
                .iter()
                .map(|input| output_path(input, out_dir.as_deref(), &suffix, &ext))
                .collect();
            for output in &outputs {
                ensure_writable_path(output, cli.global.overwrite)?;
            }

            let report = run_each(
                &inputs,
                &options,
                |path, options| Session::open(path, options),
                |path| {
                    let output = output_path(path, out_dir.as_deref(), &suffix, &ext);
                    Ok(Box::new(ContactSheet::new(output).with_gap(gap)) as Box<dyn Compositor>)
                },
            )?;
            for run in &report.runs {
                let input = Path::new(&run.label);
                print_report(run, &output_path(input, out_dir.as_deref(), &suffix, &ext));
            }
            for skipped in &report.skipped {
                eprintln!(
                    "{} {}: {}",
                    "skipped".red().bold(),
                    skipped.path.display(),
                    skipped.error
                );
            }
            if report.runs.is_empty() {
                return Err("no input could be processed".into());
            }
        }
        Commands::Bind {
            inputs,
            out,
            columns,
            rows,
            gap,
            shots,
        } => {
            ensure_writable_path(&out, cli.global.overwrite)?;
            let token = install_interrupt_handler()?;
            let options = snap_options(&cli.global, &shots, &token)?.with_grid(columns, rows);
            let label = out.display().to_string();
            let mut sheet = ContactSheet::new(&out).with_gap(gap);

            let report = run_bound(
                &inputs,
                &options,
                &label,
                |path, options| Session::open(path, options),
                &mut sheet,
            )?;
            for part in &report.parts {
                println!(
                    "{} {} at {}: {}/{} shots with {}",
                    "bound".cyan().bold(),
                    part.path.display(),
                    format_timestamp(part.offset_ms, false),
                    part.acquisition.taken,
                    part.acquisition.planned,
                    part.acquisition.strategy
                );
            }
            println!(
                "{} {} ({}/{} shots, {})",
                "saved".green().bold(),
                out.display(),
                report.taken,
                report.planned,
                format_timestamp(report.duration_ms, false)
            );
        }
        Commands::Frames {
            input,
            out,
            count,
            ext,
            shots,
        } => {
            if out.exists() && !cli.global.overwrite {
                return Err(format!(
                    "output directory already exists: {} (use --overwrite)",
                    out.display()
                )
                .into());
            }
            let token = install_interrupt_handler()?;
            let options = snap_options(&cli.global, &shots, &token)?.with_separate(count);
            let stem = input
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "frame".to_string());
            let mut files = FrameFiles::new(&out, stem).with_extension(ext);

            let mut session = Session::open(&input, &options)?;
            let report = session.run(&mut files)?;
            session.close();
            if cli.global.verbose {
                for path in files.written() {
                    println!("{}", path.display());
                }
            }
            print_report(&report, &out);
        }
        Commands::Info {
            input,
            json,
            duration,
        } => {
            let mode = parse_duration_mode(&duration)
                .ok_or(format!("unsupported --duration: {duration}"))?;
            let options = SnapOptions::new()
                .with_duration_mode(mode)
                .with_strategy(StrategyMode::Force(Strategy::Scan));
            let session = Session::open(&input, &options)?;
            let container = session.source().container();
            let stream = session.stream();
            let estimate = session.duration();

            if json {
                let streams: Vec<_> = container
                    .streams
                    .iter()
                    .map(|stream| {
                        json!({
                            "index": stream.index,
                            "kind": format!("{:?}", stream.kind).to_ascii_lowercase(),
                            "codec": stream.codec,
                            "width": stream.width,
                            "height": stream.height,
                            "frame_rate": stream.frame_rate,
                            "frame_count": stream.frame_count,
                        })
                    })
                    .collect();
                let payload = json!({
                    "format": container.format,
                    "file_size": container.file_size,
                    "bit_rate": container.bit_rate,
                    "video_stream": stream.index,
                    "duration_ms": estimate.millis,
                    "duration_method": estimate.method.to_string(),
                    "header_duration_ms": estimate.header_ms,
                    "bitrate_estimate_ms": estimate.bitrate_estimate_ms,
                    "streams": streams,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Format: {}", container.format);
                println!(
                    "Duration: {} ({})",
                    format_timestamp(estimate.millis, true),
                    estimate.method
                );
                if let Some(header) = estimate.header_ms
                    && header != estimate.millis
                {
                    println!("Header duration: {}", format_timestamp(header, true));
                }
                for info in &container.streams {
                    let marker = if info.index == stream.index { "*" } else { " " };
                    match info.kind {
                        StreamKind::Video => println!(
                            "{marker}#{} Video: {}x{} @ {:.2} fps [{}]",
                            info.index,
                            info.width,
                            info.height,
                            info.frame_rate.unwrap_or(0.0),
                            info.codec
                        ),
                        kind => println!("{marker}#{} {kind:?}", info.index),
                    }
                }
            }
            session.close();
        }
        Commands::Stats { input } => {
            let mut source = FfmpegSource::open(&input)?;
            let stream = source
                .container()
                .select_video(None)
                .cloned()
                .ok_or("no video stream found")?;
            let statistics = scan_statistics(&mut source, &stream)?;
            println!(
                "{} packets in {} streams",
                statistics.total_packets(),
                statistics.streams.len()
            );
            for figures in &statistics.streams {
                let span = figures
                    .span
                    .and_then(|span| source.container().stream(figures.index).map(|s| (span, s)))
                    .map(|(span, info)| format_timestamp(info.time_base.to_millis(span), true))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "#{}: {} packets, {} keyframes, {} bytes, {} rewinds, span {span}",
                    figures.index,
                    figures.packets,
                    figures.keyframes,
                    figures.bytes,
                    figures.rewinds
                );
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "snapsheet", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
