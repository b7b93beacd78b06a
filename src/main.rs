//! confd sidecar entry point.

use clap::Parser;
use log::{error, info};
use tokio::sync::watch;

mod config;
mod detector;
mod discovery;
mod dispatch;
mod error;
mod poll;
mod render;
mod script;
mod types;

use config::{Args, Config};
use discovery::HttpDiscovery;
use dispatch::{Action, Dispatcher};
use poll::{run_poll_loop, PollSettings};
use render::Renderer;
use script::ScriptInvoker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stdout)
        .init();

    // Load configuration
    let args = Args::parse();
    let cfg = match Config::load(&args) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{:#}, exiting.", e);
            std::process::exit(1);
        }
    };
    info!("The confd is started with config: {:?}", cfg);

    let discovery = HttpDiscovery::new(cfg.discover_url.clone(), cfg.fetch_timeout())?;

    let action = if cfg.renders_template() {
        Action::Render(Renderer::new(
            cfg.template.clone(),
            cfg.out.clone(),
            cfg.reload_command.clone(),
        ))
    } else {
        Action::Script(ScriptInvoker::new(cfg.shell.clone()))
    };

    let settings = PollSettings {
        interval: cfg.interval(),
        script_fail_fast: cfg.script_fail_fast,
    };

    // Poll loop
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut poll_handle = tokio::spawn(run_poll_loop(
        discovery,
        Dispatcher::new(action),
        settings,
        shutdown_rx,
    ));

    // Graceful Shutdown
    tokio::select! {
        signal = wait_for_signal() => {
            info!("Received a signal {}, exiting gracefully...", signal);
        }
        finished = &mut poll_handle => {
            match finished {
                Ok(Ok(())) => info!("Poll loop ended unexpectedly"),
                Ok(Err(e)) => error!("Poll loop stopped: {}", e),
                Err(e) => error!("Poll loop panicked: {}", e),
            }
            std::process::exit(1);
        }
    }

    // Let the in-flight cycle, if any, finish.
    let _ = shutdown_tx.send(true);
    match poll_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Poll loop stopped with error: {}", e),
        Err(e) => error!("Poll loop panicked: {}", e),
    }

    info!("See you next time!");
    Ok(())
}

/// Resolves with the name of the first SIGINT or SIGTERM received.
async fn wait_for_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
