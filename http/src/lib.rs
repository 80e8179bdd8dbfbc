#[macro_use]
extern crate tracing;

pub mod error;
pub mod router;

use eyre::{
    Context as _,
    Result,
};
pub use router::{
    create_router,
    AppState,
};
use std::{
    future::Future,
    net::SocketAddr,
};
use tokio::net::TcpListener;

/// Serves the exporter endpoints until `shutdown` resolves.
pub async fn serve(
    listen_address: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(listen_address)
        .await
        .wrap_err_with(|| format!("Failed to listen on {listen_address}"))?;
    info!("listening on http://{}", listener.local_addr()?);

    axum::serve(listener, create_router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .wrap_err("HTTP server failed")
}
