//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("unknown event type: {0}")]
    UnknownEvent(String),

    #[error("no timer runtime available: {0}")]
    Runtime(String),
}
