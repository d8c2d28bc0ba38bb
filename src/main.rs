use mixa::cli::Args;
use mixa::config::{self, Settings};
use mixa::core::event_bus::{EventBus, Notifier, downcast_event};
use mixa::core::mixer_events::{NotifyEvent, SessionLoadedEvent, SourceFailedEvent};
use mixa::entities::{DefaultStreams, FrameBuffer};
use mixa::mixer::{FrameGrabber, Mixer};

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound on the wait for background jobs after the last frame.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Reports the output once every `every` frames.
#[derive(Debug)]
struct OutputProbe {
    notifier: Notifier,
    frames: u64,
    every: u64,
}

impl FrameGrabber for OutputProbe {
    fn grab(&mut self, frame: &FrameBuffer, dt: f32) {
        self.frames += 1;
        if self.frames % self.every == 0 {
            let res = frame.resolution();
            self.notifier.emit(NotifyEvent {
                level: log::Level::Debug,
                message: format!("{} frames at {}x{} (last {:.1} ms)", self.frames, res.x, res.y, dt),
            });
        }
    }
}

fn init_logging(args: &Args, path_config: &config::PathConfig) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path_opt) = &args.log_file {
        let log_path = log_path_opt
            .as_ref()
            .cloned()
            .unwrap_or_else(|| config::data_file(config::paths::LOG_FILE, path_config));

        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };

        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

/// Print what the mixer reported since the last call.
fn drain_events(bus: &EventBus) {
    for event in bus.poll() {
        if let Some(note) = downcast_event::<NotifyEvent>(&event) {
            match note.level {
                log::Level::Error | log::Level::Warn => eprintln!("{}", note.message),
                log::Level::Info => println!("{}", note.message),
                _ => debug!("{}", note.message),
            }
        } else if let Some(loaded) = downcast_event::<SessionLoadedEvent>(&event) {
            debug!("Session swapped in: {:?} ({} sources)", loaded.filename, loaded.sources);
        } else if let Some(failed) = downcast_event::<SourceFailedEvent>(&event) {
            debug!("Source '{}' failed (recreated: {})", failed.name, failed.recreated);
        }
    }
}

fn busy(mixer: &Mixer) -> bool {
    mixer.is_loading()
        || mixer.is_importing()
        || mixer.is_saving()
        || mixer.swap_pending()
        || mixer.pending_candidates() > 0
        || mixer.pending_session_files() > 0
}

/// Keep updating until no background job is left.
fn settle(mixer: &mut Mixer, frame_time: Duration) {
    let start = Instant::now();
    while busy(mixer) {
        if start.elapsed() > SETTLE_TIMEOUT {
            warn!("Background jobs still running after {:?}", SETTLE_TIMEOUT);
            break;
        }
        mixer.update();
        drain_events(mixer.events());
        thread::sleep(frame_time);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let path_config = config::PathConfig::from_env_and_cli(args.config_dir.clone());
    if let Err(e) = config::ensure_dirs(&path_config) {
        eprintln!("Warning: Failed to create application directories: {}", e);
    }
    init_logging(&args, &path_config)?;

    info!("Mixa v{} starting...", env!("CARGO_PKG_VERSION"));
    debug!("Command-line args: {:?}", args);

    let settings_path = config::config_file(config::paths::SETTINGS_FILE, &path_config);
    info!("Config path: {}", settings_path.display());
    let settings = Settings::load_or_default(&settings_path);

    let mut mixer = Mixer::new(settings, Arc::new(DefaultStreams));
    let fps = args.fps.max(1.0);
    let frame_time = Duration::from_secs_f32(1.0 / fps);
    let notifier = mixer.events().notifier();
    mixer.add_grabber(Box::new(OutputProbe {
        notifier,
        frames: 0,
        every: fps.round().max(1.0) as u64,
    }));

    if let Some(path) = &args.session {
        info!("Input session: {}", path.display());
        mixer.open(path.clone());
    }
    for path in &args.imports {
        if let Some(source) = mixer.create_source_file(path) {
            mixer.add_source(source);
        }
    }

    for _ in 0..args.frames {
        let start = Instant::now();
        mixer.update();
        drain_events(mixer.events());
        if let Some(rest) = frame_time.checked_sub(start.elapsed()) {
            thread::sleep(rest);
        }
    }
    settle(&mut mixer, frame_time);

    if let Some(path) = &args.save {
        mixer.saveas(path.clone()).context("Failed to save session")?;
        settle(&mut mixer, frame_time);
    }

    info!(
        "Done: {} source(s), {:.1} fps, {} undo step(s)",
        mixer.count_sources(),
        mixer.fps(),
        mixer.history().len()
    );
    if let Err(e) = mixer.settings().save(&settings_path) {
        warn!("Settings not saved: {:#}", e);
    }
    Ok(())
}
