//! Miscellaneous helper utilities.

use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::errors::Result;

/// Initialize `tracing` subscriber with env-based filter.
///
/// If `RUST_LOG` is not set, defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Resolves on Ctrl+C and flips `tx` so every loop holding a receiver stops
/// before its next iteration.
pub async fn shutdown_signal(tx: watch::Sender<bool>) {
    shutdown_on(tokio::signal::ctrl_c(), tx).await
}

/// Flips `tx` once `signal` fires. If the signal cannot be installed the
/// sender is kept alive, so receivers keep running instead of seeing a closed
/// channel.
async fn shutdown_on<F>(signal: F, tx: watch::Sender<bool>)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "[INIT] ctrl-c handler unavailable, running until killed");
        std::future::pending::<()>().await;
    }
    info!("[INIT] shutdown requested");
    tx.send_replace(true);
}

/// (days since epoch, hour of day) in UTC.
pub fn utc_day_hour(now: SystemTime) -> (u64, u32) {
    let secs = now.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
    (secs / 86_400, ((secs % 86_400) / 3_600) as u32)
}

const KEEPALIVE_RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 2\r\nconnection: close\r\n\r\nOK";

/// Binds the keep-alive listener. Every connection gets `200 OK`.
pub async fn bind_keepalive(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "[INIT] keep-alive listener up");
    Ok(listener)
}

/// Serves keep-alive probes until shutdown.
pub async fn serve_keepalive(listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((mut stream, peer)) => {
                    tokio::spawn(async move {
                        let mut buf = [0u8; 1024];
                        let _ = stream.read(&mut buf).await;
                        if let Err(e) = stream.write_all(KEEPALIVE_RESPONSE).await {
                            debug!(%peer, error = %e, "keep-alive write failed");
                        }
                        let _ = stream.shutdown().await;
                    });
                }
                Err(e) => warn!(error = %e, "keep-alive accept failed"),
            },
        }
    }
}
