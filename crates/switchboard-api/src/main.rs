//! Switchboard CLI and HTTP host.
//!
//! Binary name: `swb`
//!
//! Parses CLI arguments, wires the session manager to SQLite and the
//! delivery hub, then lists stored sessions or serves the HTTP API.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use tracing::{info, warn};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need logging or app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "swb", &mut std::io::stdout());
        return Ok(());
    }

    switchboard_observe::tracing_setup::init_tracing(cli.default_filter(), cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let state = AppState::init().await?;

    let result = match cli.command {
        Commands::Serve { port, host } => serve(state.clone(), &host, port).await,
        Commands::Sessions => cli::sessions::list_sessions(&state, cli.json).await,
        Commands::Completions { .. } => Ok(()),
    };

    state.db_pool.close().await;
    switchboard_observe::tracing_setup::shutdown_tracing();
    result
}

/// Bind first, then reconnect stored sessions in the background.
async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!(
        "  {} Switchboard API listening on {}",
        console::style("⚡").bold(),
        console::style(format!("http://{addr}")).cyan()
    );
    println!("  {}", console::style("Press Ctrl+C to stop").dim());

    let manager = state.manager.clone();
    let sweeper = manager.start_sweeper();

    let boot = {
        let manager = manager.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.boot_reconnect_all().await {
                warn!(error = %e, "could not list stored sessions for reconnection");
            }
        })
    };

    let router = http::router::build_router(state);
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    boot.abort();
    manager.shutdown().await;
    if let Err(e) = sweeper.await {
        if !e.is_cancelled() {
            warn!(error = %e, "verification sweeper panicked");
        }
    }
    info!("server stopped");
    println!("\n  Server stopped.");

    served.map_err(Into::into)
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
