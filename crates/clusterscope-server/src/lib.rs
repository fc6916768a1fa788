//! HTTP API for clusterscope
//!
//! Serves the cached node and pod snapshots, one-shot pod log tails, and live
//! namespace log streams as NDJSON or plain text.

mod error;
mod live;
mod query;
mod routes;
mod state;

pub use error::ApiError;
pub use query::{StreamFormat, StreamQuery};
pub use routes::router;
pub use state::{AppState, LogTail};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serve the API on `listener` until `shutdown` fires, then drain open
/// connections
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}
