use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use wincoin_node::{bootstrap, serve, AppState, Args, NodeConfig};

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut config = NodeConfig::try_from(Args::parse())?;
    let listener = TcpListener::bind(config.listen).await?;
    let local = listener.local_addr()?;
    if config.advertise.port == 0 {
        config.advertise.port = local.port();
    }

    let peers = config.resolve_peers().await?;
    let state = AppState::new(&config, peers)?;
    info!(
        "wincoin-node listening on http://{local}, advertised as {}",
        config.advertise
    );
    let server = tokio::spawn(serve(listener, state.clone(), shutdown_signal()));

    if let Err(e) = bootstrap::run(&state, config.mode, config.difficulty).await {
        error!("bootstrap failed: {e}");
        std::process::exit(e.exit_code());
    }

    server.await??;
    Ok(())
}
