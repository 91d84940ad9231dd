//! Asimov - gesture-driven follow robot controller.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info, warn};

use asimov::actuator::ActuatorKind;
use asimov::config::AsimovConfig;
use asimov::events::{EventBus, RobotEvent};
use asimov::ipc::{ControlContext, ControlServer};
use asimov::mode::{mode_cell, Mode};
use asimov::pipeline::Pipeline;
use asimov::sensor::{spawn_sensor, ReplaySource};

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Control socket poll interval.
const CONTROL_POLL: Duration = Duration::from_millis(20);

#[derive(Parser, Debug)]
#[command(name = "asimov", about = "Gesture-driven person-following robot controller")]
struct Cli {
    /// Config file (s-expression plist)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Initial drive mode: none, follow, avoid, drinking, or center
    #[arg(long, default_value = "none")]
    mode: String,

    /// Actuator: console, or create:<serial-device>
    #[arg(long, default_value = "console")]
    actuator: String,

    /// Replay skeleton frames from a file instead of waiting for a sensor
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Restart the replay from the top when it ends
    #[arg(long)]
    loop_replay: bool,

    /// Control socket path (default: $XDG_RUNTIME_DIR/asimov.sock)
    #[arg(long)]
    control_socket: Option<PathBuf>,

    /// Run without a control socket
    #[arg(long)]
    no_control: bool,

    /// Exit after N seconds
    #[arg(long)]
    exit_after: Option<u64>,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("asimov {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "asimov=info".into()),
        )
        .init();

    info!("asimov v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli) {
        error!("fatal: {:#}", e);
        return Err(e);
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => AsimovConfig::load(path)?,
        None => AsimovConfig::default(),
    };
    debug!("config: {}", config.to_sexp());

    let initial = Mode::parse(&cli.mode).with_context(|| {
        format!("unknown mode: {}. Use: none, follow, avoid, drinking, or center", cli.mode)
    })?;
    let actuator_kind = ActuatorKind::parse(&cli.actuator).with_context(|| {
        format!("unknown actuator: {}. Use: console or create:<path>", cli.actuator)
    })?;
    let actuator = actuator_kind.open()?;

    let (mode_writer, mode_reader) = mode_cell(initial);
    let bus = Arc::new(EventBus::new());
    let events = bus.subscribe();
    let shutdown = Arc::new(AtomicBool::new(false));

    let (frame_tx, frame_rx) = mpsc::channel();
    let pipeline = Pipeline::new(&config, mode_reader, actuator, Arc::clone(&bus));
    let status = pipeline.status_board();
    let pipeline = pipeline.spawn(frame_rx)?;

    let control = if cli.no_control {
        drop(mode_writer);
        None
    } else {
        let path = cli
            .control_socket
            .clone()
            .unwrap_or_else(ControlServer::default_socket_path);
        let ctx = ControlContext {
            mode: mode_writer,
            bus: Arc::clone(&bus),
            config_sexp: config.to_sexp(),
            status,
        };
        let server = ControlServer::bind(&path, ctx)?;
        Some(server.spawn(Arc::clone(&shutdown), CONTROL_POLL)?)
    };

    // Without a replay the channel stays open until shutdown.
    let (sensor, idle_tx) = match &cli.replay {
        Some(path) => {
            let source = ReplaySource::load(path, config.frame_interval())?.looping(cli.loop_replay);
            let handle = spawn_sensor(
                Box::new(source),
                config.frame_interval(),
                frame_tx,
                Arc::clone(&shutdown),
            )?;
            (Some(handle), None)
        }
        None => {
            info!("No skeleton source; waiting for shutdown");
            (None, Some(frame_tx))
        }
    };

    install_signal_handlers();

    let start_time = Instant::now();
    let exit_duration = cli.exit_after.map(Duration::from_secs);
    info!("Running in mode {}", initial);

    loop {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received, exiting");
            break;
        }
        if let Some(dur) = exit_duration {
            if start_time.elapsed() >= dur {
                info!("Exit timer fired after {}s", dur.as_secs());
                break;
            }
        }
        if pipeline.is_finished() {
            info!("Skeleton stream finished");
            break;
        }

        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(RobotEvent::Gesture(g)) => info!("Gesture recognized: {}", g.gesture),
            Ok(RobotEvent::ModeChanged { from, to }) => info!("Mode changed: {} -> {}", from, to),
            Ok(event) => debug!("{}", event.to_sexp()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    shutdown.store(true, Ordering::SeqCst);
    drop(idle_tx);
    if let Some(handle) = sensor {
        if handle.join().is_err() {
            warn!("sensor thread panicked");
        }
    }
    match pipeline.join() {
        Ok(stats) => debug!("pipeline stats: {:?}", stats),
        Err(_) => warn!("pipeline thread panicked"),
    }
    if let Some(handle) = control {
        if handle.join().is_err() {
            warn!("control thread panicked");
        }
    }

    info!("asimov shut down");
    Ok(())
}
