//! Error handling
//!
//! Every failure a session can hit maps to one stable wire code. None of them
//! closes the connection.

use thiserror::Error;

use crate::auth::AuthError;
use crate::classifier::ClassifyError;
use crate::protocol::{codes, ProtocolError, ServerMessage, Stage};
use crate::signal::{DecodeError, EmptySignalError};
use crate::store::StoreError;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("{0}; stored zero feature vector")]
    EmptySignal(#[from] EmptySignalError),

    #[error("classification failed: {0}")]
    Classify(#[from] ClassifyError),

    #[error("failed to store sample: {0}")]
    Store(StoreError),

    #[error("failed to fetch channels: {0}")]
    ChannelFetch(StoreError),
}

impl SessionError {
    /// Stable code sent as `error`
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Protocol(e) => e.code(),
            SessionError::Auth(_) => codes::UNAUTHORIZED,
            SessionError::Decode(_)
            | SessionError::EmptySignal(_)
            | SessionError::Classify(_)
            | SessionError::Store(_) => codes::DATA_SUBMISSION_FAILED,
            SessionError::ChannelFetch(_) => codes::CHANNEL_FETCH_FAILED,
        }
    }

    /// Pipeline stage for `data_submission_failed`
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SessionError::Decode(_) => Some(Stage::Decode),
            SessionError::EmptySignal(_) => Some(Stage::Extract),
            SessionError::Classify(_) => Some(Stage::Classify),
            SessionError::Store(_) => Some(Stage::Store),
            _ => None,
        }
    }

    /// Error response for the caller; logs at a level matching severity
    pub fn to_message(&self) -> ServerMessage {
        match self {
            SessionError::Store(_) | SessionError::ChannelFetch(_) => {
                tracing::error!("Session error: {}", self);
            }
            SessionError::Classify(ClassifyError::ModelNotReady) => {
                tracing::error!("Session error: {}", self);
            }
            _ => tracing::warn!("Session error: {}", self),
        }

        ServerMessage::error(self.code(), self.stage(), self.to_string())
    }
}
