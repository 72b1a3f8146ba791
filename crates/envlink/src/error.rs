//! Error types for the environment bridge.

/// Errors that can occur when submitting work or tearing down.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Proxy has been released")]
    ProxyReleased,

    #[error("Bridge is not open yet")]
    NotOpen,

    #[error("Bridge is closed")]
    BridgeClosed,

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Worker thread panicked")]
    WorkerPanic,

    #[error("Failed to spawn thread: {0}")]
    SpawnFailed(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Abort on a lifecycle protocol violation.
///
/// A violation (deinit before init, double init, detaching a proxy that
/// other threads still hold) means a caller bug already corrupted the
/// lifecycle invariants. No local recovery is safe at that point, so these
/// panic instead of returning an [`Error`].
#[track_caller]
pub(crate) fn protocol_violation(msg: &str) -> ! {
    tracing::error!("protocol violation: {}", msg);
    panic!("protocol violation: {}", msg);
}
