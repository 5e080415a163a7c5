use thiserror::Error;

/// Failure classes for outbound venue calls.
///
/// `Auth` is never auto-retried, `Business` is surfaced verbatim to the
/// caller, `Transient` is retried naturally by the reconciliation poller on
/// its next tick, and `NotFound` is the ambiguous "order id unknown to the
/// venue" outcome whose handling is a configured policy (see reconcile).
#[derive(Debug, Clone, Error)]
pub enum VenueError {
    #[error("venue auth rejected: {0}")]
    Auth(String),

    #[error("order not found: {0}")]
    NotFound(String),

    #[error("venue rejected request: {0}")]
    Business(String),

    #[error("transient venue failure: {0}")]
    Transient(String),
}

/// Operator-facing operation failures.
#[derive(Debug, Clone, Error)]
pub enum OpError {
    #[error("{0}")]
    Validation(String),

    #[error("unknown trade: {0}")]
    UnknownTrade(String),

    #[error(transparent)]
    Venue(#[from] VenueError),

    #[error("storage failure: {0}")]
    Storage(String),
}
