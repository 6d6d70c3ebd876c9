//! Serving with a bounded graceful shutdown

use axum::Router;
use std::future::{Future, IntoFuture};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Serve `app` until `signal` resolves, then give in-flight requests up to
/// `grace` to finish before returning.
pub async fn serve<S>(listener: TcpListener, app: Router, signal: S, grace: Duration) -> anyhow::Result<()>
where
    S: Future<Output = ()> + Send + 'static,
{
    let (signalled_tx, signalled_rx) = oneshot::channel();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            signal.await;
            let _ = signalled_tx.send(());
        })
        .into_future();

    let deadline = async move {
        if signalled_rx.await.is_ok() {
            info!("Waiting up to {:?} for connections to close", grace);
            tokio::time::sleep(grace).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        served = server => {
            served?;
            info!("Server shut down gracefully");
        },
        _ = deadline => {
            warn!("Connections still open after {:?}, shutting down", grace);
        },
    }

    Ok(())
}
