//! HTTP node: serves the ledger endpoints, talks to peers over `reqwest`
//! and wires mining into the shared chain.

pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod peers_file;
pub mod routes;
pub mod state;
pub mod transport;

pub use config::{Args, Bootstrap, NodeConfig};
pub use state::AppState;

use std::{future::Future, net::SocketAddr};
use tokio::net::TcpListener;

/// Serves `state` on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = routes::router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}
