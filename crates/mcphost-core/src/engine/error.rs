//! Engine error types

use thiserror::Error;

use crate::providers::ProviderError;

use super::events::SinkError;

/// Errors that end a turn without a `done` event
#[derive(Error, Debug)]
pub enum EngineError {
    /// The model provider failed
    #[error("model provider error: {0}")]
    Provider(#[source] ProviderError),

    /// The caller cancelled the turn
    #[error("turn cancelled")]
    Cancelled,

    /// The event sink failed and the engine is configured to abort on that
    #[error("event delivery failed: {0}")]
    SinkClosed(#[source] SinkError),
}

impl From<ProviderError> for EngineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Cancelled => EngineError::Cancelled,
            other => EngineError::Provider(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
