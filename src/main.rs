use color_eyre::{eyre::eyre, Result};
use opencockpit::config::ConsoleConfig;
use opencockpit::controller::ControllerHandle;
use opencockpit::display::TracingDisplay;
use opencockpit::network::spawn_transport;
use opencockpit::scheduler::RenderScheduler;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    setup()?;

    let config = setup_config()?;
    let cancel = CancellationToken::new();

    // Input sources
    info!("Initializing input sources");
    let mut controller = ControllerHandle::spawn(&config.device, cancel.clone())
        .map_err(|e| eyre!("Failed to spawn input sources: {}", e))?;

    // Vehicle link
    let link = spawn_transport(config.network.clone(), cancel.clone());

    let scheduler = RenderScheduler::create(
        &config,
        link.commands,
        Box::new(TracingDisplay::new()),
        Instant::now(),
    );

    // Link status for whoever sits outside the core (video layer, status line)
    let mut health = scheduler.context().channel.subscribe_health();
    let health_cancel = cancel.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = health_cancel.cancelled() => break,
                changed = health.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = *health.borrow_and_update();
                    match current.latency {
                        Some(sample) => info!(
                            "Link {:?}, RTT {:.0}ms ({})",
                            current.state, sample.rtt_ms, sample.band
                        ),
                        None => info!("Link {:?}", current.state),
                    }
                }
            }
        }
    });

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                signal_cancel.cancel();
            }
            Err(e) => warn!("Unable to listen for Ctrl-C: {}", e),
        }
    });

    scheduler
        .start(Instant::now())
        .run(
            &mut controller,
            link.events,
            config.scheduler.tick_period(),
            cancel.clone(),
        )
        .await;

    cancel.cancel();
    if let Err(e) = link.task.await {
        warn!("Transport task ended abnormally: {}", e);
    }
    controller.join();
    info!("Console stopped");

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    // stdout belongs to the raw-mode terminal
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}

fn setup_config() -> Result<ConsoleConfig> {
    let explicit = std::env::args_os().nth(1).map(PathBuf::from);
    let path = ConsoleConfig::resolve_path(explicit)?;
    debug!("Using config file {}", path.display());

    // Make sure the operator has a file to edit
    ConsoleConfig::ensure_default(&path)?;

    ConsoleConfig::load(&path).map_err(|e| eyre!("Failed to load configuration: {}", e))
}
