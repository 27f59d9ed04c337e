//! Graceful shutdown on SIGTERM/SIGINT.

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Bridges unix termination signals into a [`CancellationToken`].
///
/// The server and in-flight polling loops observe the token; once it
/// fires, axum stops accepting connections and drains what is running.
pub struct Shutdown {
    _tracker: TaskTracker,
    token: CancellationToken,
}

impl Shutdown {
    /// Registers the signal handlers. Fails when the process cannot
    /// install them (e.g. not on a unix runtime).
    pub fn try_new() -> Result<Self, std::io::Error> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let token = CancellationToken::new();
        let fired = token.clone();
        let tracker = TaskTracker::new();
        tracker.spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => fired.cancel(),
                _ = sigint.recv() => fired.cancel(),
            }
        });
        tracker.close();
        Ok(Shutdown {
            _tracker: tracker,
            token,
        })
    }

    /// A token clone for handing to subsystems.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
