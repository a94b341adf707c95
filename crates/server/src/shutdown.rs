use std::time::Duration;

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns the process-wide cancellation token. SIGTERM or Ctrl+C cancels it;
/// the HTTP server drains in-flight requests once it fires.
#[derive(Debug, Default)]
pub struct ShutdownGuard {
    token: CancellationToken,
}

impl ShutdownGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a background task that listens for OS signals and triggers cancellation.
    pub fn spawn_signal_listener(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            let ctrl_c = async {
                if let Err(e) = signal::ctrl_c().await {
                    tracing::warn!(error = %e, "failed to listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            };

            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to register SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("received Ctrl+C, initiating shutdown"),
                _ = terminate => tracing::info!("received SIGTERM, initiating shutdown"),
                _ = token.cancelled() => return,
            }
            token.cancel();
        });
    }
}

/// Wait up to `grace` for a background task. A task still running after that is
/// aborted; both that and a failed task yield `None`.
pub async fn join_within<T>(mut task: JoinHandle<T>, grace: Duration) -> Option<T> {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "background task failed before shutdown");
            None
        }
        Err(_) => {
            task.abort();
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "background task still running at shutdown, aborted"
            );
            None
        }
    }
}
