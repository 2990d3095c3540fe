//! Motion Server process entry point: loads configuration, builds the
//! `Controller` singleton over a simulated primitives backend, binds the
//! TCP listener, and runs the Session Manager until `SIGINT`/`SIGTERM`.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use motion_common::config::load_config;
use motion_server::controller::Controller;
use motion_server::primitives::SimulatedPrimitives;
use motion_supervisor::session;

#[derive(Parser, Debug)]
#[command(name = "motion_supervisor")]
#[command(about = "Motion server TCP bridge: session manager, connection reader, process entry point")]
struct Args {
    /// Path to the server's TOML configuration file.
    #[arg(short, long, default_value = "motion_server.toml")]
    config: PathBuf,

    /// Enable verbose (debug) logging.
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

fn setup_tracing(args: &Args) {
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::from_default_env().add_directive(level.into());
    if args.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    setup_tracing(&args);

    info!("motion_supervisor v{} starting", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args.config)?;
    info!(
        "configuration loaded: {} group(s), listening on {}",
        config.groups.len(),
        config.server.listen_address
    );

    // TODO: swap in a real HalDriver-backed MotionPrimitives once controller
    // vendor integration lands; simulated primitives serve development and CI.
    let primitives = Arc::new(SimulatedPrimitives::new(config.groups.len()));
    let controller = Arc::new(Controller::new(&config, primitives));

    let listener = TcpListener::bind(&config.server.listen_address).await?;
    info!("listening on {}", config.server.listen_address);

    let shutdown = shutdown_signal();
    session::run(Arc::clone(&controller), listener, shutdown).await;

    info!("stopping motion on every group before exit");
    controller.stop_motion.store(true, Ordering::SeqCst);
    let groups = controller.groups.lock().unwrap();
    for group in groups.iter() {
        group.queue.clear();
    }
    drop(groups);

    info!("motion_supervisor shutdown complete");
    Ok(())
}

/// Waits for `SIGINT` (Ctrl+C) or `SIGTERM`, matching the teacher's
/// `tokio::select!`-based supervisor shutdown pattern.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!(error = %e, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
