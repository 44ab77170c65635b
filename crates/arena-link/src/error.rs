use thiserror::Error;

/// Recoverable command-level failure. Reported to the operator; the
/// requested transition simply does not happen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{action} failed: device answered {response:?}")]
    Rejected { action: &'static str, response: String },
    #[error("{action} failed: no response")]
    NoResponse { action: &'static str },
}
