use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{bail, Context};
use sysinfo::System;

use line_call::{
    AppResult, AudioAlert, Config, Event, EventBus, FanOutAlert, FrameSource,
    ImageSequenceSource, LineCallPipeline, LogAlert, PipelineRuntime, ReplayWindow,
};

const LOG_TARGET_STARTUP: &str = "line_call::startup";

const USAGE: &str = "\
Usage:
  line-call <frames-dir> [--fps N] [--config PATH] [--pace] [--save-replays DIR] [--no-audio]
  line-call --check-config [--config PATH]

Options:
  --fps N              Frame rate of the image sequence (default 30)
  --config PATH        Read settings from PATH instead of the user config
  --pace               Release frames at the capture rate through the live worker
  --save-replays DIR   Write each OUT replay window as PNG files
  --no-audio           Log OUT calls without playing a tone
  --check-config       Print the effective configuration and exit";

#[derive(Debug, Default)]
struct CliArgs {
    frames_dir: Option<PathBuf>,
    fps: Option<f64>,
    config: Option<PathBuf>,
    pace: bool,
    save_replays: Option<PathBuf>,
    no_audio: bool,
    check_config: bool,
    help: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> AppResult<CliArgs> {
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--fps" => {
                let value = args.next().context("--fps needs a value")?;
                parsed.fps = Some(
                    value
                        .parse()
                        .with_context(|| format!("invalid --fps value: {value}"))?,
                );
            }
            "--config" => parsed.config = Some(args.next().context("--config needs a path")?.into()),
            "--save-replays" => {
                parsed.save_replays = Some(args.next().context("--save-replays needs a path")?.into())
            }
            "--pace" => parsed.pace = true,
            "--no-audio" => parsed.no_audio = true,
            "--check-config" => parsed.check_config = true,
            "-h" | "--help" => parsed.help = true,
            flag if flag.starts_with("--") => bail!("unknown option: {flag}"),
            other if parsed.frames_dir.is_none() => parsed.frames_dir = Some(PathBuf::from(other)),
            other => bail!("unexpected argument: {other}"),
        }
    }

    Ok(parsed)
}

fn initialize_tracing() {
    use tracing_appender::rolling;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = Config::app_dir()
        .map(|dir| dir.join("logs"))
        .unwrap_or_else(|_| PathBuf::from("logs"));

    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory: {}", e);
    }

    let file_appender = rolling::daily(&log_dir, "line-call.log");

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_names(true)
        .with_line_number(true);

    // Calls are the program's output, so the console layer is always on
    let console_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(cfg!(debug_assertions))
        .with_target(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!("Log directory: {}", log_dir.display());
}

fn log_runtime_environment() {
    let mut system = System::new();
    system.refresh_cpu();
    system.refresh_memory();

    let version = env!("CARGO_PKG_VERSION");
    let os_name = System::long_os_version()
        .or_else(System::name)
        .unwrap_or_else(|| "Unknown OS".to_string());
    let kernel = System::kernel_version().unwrap_or_else(|| "Unknown Kernel".to_string());
    let architecture = std::env::consts::ARCH;

    tracing::info!(target: LOG_TARGET_STARTUP, "Starting line-call v{} on ({})", version, architecture);
    tracing::info!(target: LOG_TARGET_STARTUP, "Operating System: {} (kernel {})", os_name, kernel);
    tracing::info!(
        target: LOG_TARGET_STARTUP,
        "CPU: {} logical cores, rayon pool {} threads",
        system.cpus().len(),
        rayon::current_num_threads()
    );
    tracing::debug!(
        target: LOG_TARGET_STARTUP,
        "Memory: {} MiB total",
        system.total_memory() / (1024 * 1024)
    );
}

fn build_alert(config: &Config, no_audio: bool) -> FanOutAlert {
    let alert = FanOutAlert::new().with(LogAlert);
    if no_audio {
        return alert;
    }

    match AudioAlert::new(config.tone.clone()) {
        Ok(audio) => alert.with(audio),
        Err(e) => {
            tracing::warn!("Audio alert unavailable, OUT calls are logged only: {}", e);
            alert
        }
    }
}

fn save_replay(dir: &Path, call_index: usize, replay: &ReplayWindow) -> AppResult<usize> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create replay directory {}", dir.display()))?;

    for (frame_index, snapshot) in replay.iter().enumerate() {
        let path = dir.join(format!("out_{:03}_{:04}.png", call_index, frame_index));
        snapshot
            .image
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    Ok(replay.len())
}

/// Drains pipeline events on its own thread; returns the number of replays written
fn spawn_event_listener(
    bus: &EventBus,
    replay_dir: Option<PathBuf>,
) -> AppResult<thread::JoinHandle<usize>> {
    let (events, _) = bus.subscribe();

    let handle = thread::Builder::new()
        .name("line-call-events".to_string())
        .spawn(move || {
            let mut saved = 0;
            for event in events.iter() {
                tracing::debug!("{}", event.description());
                match event {
                    Event::OutCalled { replay, .. } => {
                        if let Some(dir) = &replay_dir {
                            match save_replay(dir, saved, &replay) {
                                Ok(count) => {
                                    tracing::info!("Saved {} replay frames to {}", count, dir.display());
                                    saved += 1;
                                }
                                Err(e) => tracing::error!("{:#}", e),
                            }
                        }
                    }
                    Event::Shutdown => break,
                    _ => {}
                }
            }
            saved
        })
        .context("Failed to start event listener")?;

    Ok(handle)
}

fn main() -> AppResult<()> {
    let args = parse_args(std::env::args().skip(1))?;
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    initialize_tracing();
    log_runtime_environment();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    }
    .validated();

    if args.check_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let Some(frames_dir) = args.frames_dir else {
        eprintln!("{USAGE}");
        bail!("missing <frames-dir>");
    };

    let mut source = ImageSequenceSource::open(&frames_dir, args.fps.unwrap_or(30.0))?
        .paced(args.pace);

    let bus = EventBus::new();
    let listener = spawn_event_listener(&bus, args.save_replays.clone())?;
    let mut pipeline = LineCallPipeline::new(&config, Box::new(build_alert(&config, args.no_audio)))
        .with_event_bus(bus.clone());

    if args.pace {
        // Live emulation: the worker drops frames it cannot keep up with
        let (feeder, handle) = PipelineRuntime::spawn(pipeline, config.runtime.clone())?;
        while let Some(frame) = source.next_frame() {
            if let Err(e) = feeder.offer(frame) {
                tracing::warn!("Stopped feeding frames: {}", e);
                break;
            }
        }
        drop(feeder);

        let summary = handle.join()?;
        tracing::info!(
            "Done: {} frames processed, {} dropped, {} OUT calls",
            summary.frames_processed,
            summary.frames_dropped,
            summary.out_calls
        );
    } else {
        // Offline: every frame, in order, on this thread
        let mut processed = 0u64;
        let mut out_calls = 0u64;
        while let Some(frame) = source.next_frame() {
            let outcome = pipeline.process_frame(&frame);
            processed += 1;
            if outcome.out_alert.is_some() {
                out_calls += 1;
            }
        }
        pipeline.flush_status();
        bus.publish(Event::Shutdown);
        tracing::info!(
            "Done: {} frames processed, {} OUT calls, final call {}",
            processed,
            out_calls,
            pipeline.call_state()
        );
    }

    if source.skipped() > 0 {
        tracing::warn!("{} files could not be decoded", source.skipped());
    }

    let saved = listener
        .join()
        .map_err(|_| anyhow::anyhow!("Event listener panicked"))?;
    if saved > 0 {
        tracing::info!("{} replays written", saved);
    }

    Ok(())
}
