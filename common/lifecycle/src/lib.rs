//! Cooperative shutdown for the three binaries. A single `CancellationToken` is threaded
//! through every suspension point (bus poll, store call, producer publish) per the request-scoped
//! context object the design calls for; trapping SIGINT/SIGTERM cancels it so in-flight work
//! observes the cancellation cause instead of being killed mid-write.
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// How long a binary gives in-flight work to wind down after shutdown begins before it exits
/// forcibly regardless of what is still running.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(3);

#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    token: CancellationToken,
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// A clone of the token, for handing to a consumer/producer/store call that accepts one.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested, either by a trapped signal or `cancel`.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Spawns a task that waits for SIGINT or SIGTERM and cancels the token. Call once per
    /// process at startup.
    pub fn trap_signals(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            token.cancel();
        });
    }

    /// Runs `fut` to completion, but once shutdown has been requested gives it only
    /// `SHUTDOWN_GRACE_PERIOD` to wind down before logging and exiting the process forcibly.
    pub async fn run_until_shutdown<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = fut => {}
            _ = self.force_exit_after_grace_period() => {}
        }
    }

    async fn force_exit_after_grace_period(&self) {
        self.cancelled().await;
        tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
        tracing::warn!("shutdown grace period elapsed without in-flight work finishing, exiting");
        std::process::exit(1);
    }
}

async fn wait_for_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT"),
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        tracing::info!("received ctrl-c");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_resolves_cancelled_future() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_cancelled());
        shutdown.cancel();
        shutdown.cancelled().await;
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn token_clone_observes_cancellation() {
        let shutdown = Shutdown::new();
        let token = shutdown.token();
        assert!(!token.is_cancelled());
        shutdown.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn run_until_shutdown_returns_once_future_completes() {
        let shutdown = Shutdown::new();
        // Never cancelled, so only the `fut` branch of the select can resolve.
        shutdown.run_until_shutdown(async {}).await;
    }
}
