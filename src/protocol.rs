//! Wire protocol
//!
//! Every frame is a JSON text message. Requests carry an `action` field;
//! responses are either a success body or `{error, stage?, message?}` with a
//! stable error code.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use validator::Validate;

// ============================================================================
// ERROR CODES
// ============================================================================

pub mod codes {
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const INVALID_MESSAGE: &str = "invalid_message";
    pub const UNKNOWN_ACTION: &str = "Unknown action";
    pub const NO_PAYLOAD: &str = "no_payload";
    pub const MISSING_CLIENT_ID: &str = "missing_client_id";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const DATA_SUBMISSION_FAILED: &str = "data_submission_failed";
    pub const CHANNEL_FETCH_FAILED: &str = "channel_fetch_failed";
    pub const SERVER_ERROR: &str = "server_error";
}

// ============================================================================
// REQUESTS
// ============================================================================

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DataRequest {
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_client_id")]
    #[validate(length(min = 1, max = 128))]
    pub client_id: String,

    #[serde(default = "default_channel_id")]
    #[validate(length(min = 1, max = 128))]
    pub channel_id: String,

    #[serde(default)]
    pub payload: Option<String>,

    #[serde(default = "default_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ListChannelsRequest {
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub client_id: Option<String>,
}

fn default_client_id() -> String {
    "unknown".to_string()
}

fn default_channel_id() -> String {
    "default".to_string()
}

fn default_format() -> String {
    "float".to_string()
}

/// A parsed request frame
#[derive(Debug, Clone)]
pub enum ClientMessage {
    Data(DataRequest),
    ListChannels(ListChannelsRequest),
}

impl ClientMessage {
    pub const DATA: &'static str = "data";
    pub const LIST_CHANNELS: &'static str = "list_channels";

    /// Parse a text frame. Field validation happens after authentication,
    /// see [`DataRequest::validate`].
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match action.as_str() {
            Self::DATA => serde_json::from_value(value)
                .map(ClientMessage::Data)
                .map_err(|e| ProtocolError::InvalidRequest(e.to_string())),
            Self::LIST_CHANNELS => serde_json::from_value(value)
                .map(ClientMessage::ListChannels)
                .map_err(|e| ProtocolError::InvalidRequest(e.to_string())),
            _ => Err(ProtocolError::UnknownAction(action)),
        }
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            ClientMessage::Data(r) => r.token.as_deref(),
            ClientMessage::ListChannels(r) => r.token.as_deref(),
        }
    }

    pub fn action(&self) -> &'static str {
        match self {
            ClientMessage::Data(_) => Self::DATA,
            ClientMessage::ListChannels(_) => Self::LIST_CHANNELS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("message is not valid JSON: {0}")]
    Malformed(serde_json::Error),

    #[error("only text frames are accepted")]
    NonTextFrame,

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("No payload provided")]
    NoPayload,

    #[error("No client_id provided")]
    MissingClientId,
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Malformed(_) | ProtocolError::NonTextFrame => codes::INVALID_MESSAGE,
            ProtocolError::UnknownAction(_) => codes::UNKNOWN_ACTION,
            ProtocolError::InvalidRequest(_) => codes::INVALID_REQUEST,
            ProtocolError::NoPayload => codes::NO_PAYLOAD,
            ProtocolError::MissingClientId => codes::MISSING_CLIENT_ID,
        }
    }
}

impl From<validator::ValidationErrors> for ProtocolError {
    fn from(err: validator::ValidationErrors) -> Self {
        ProtocolError::InvalidRequest(err.to_string())
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

/// Pipeline stage a `data_submission_failed` error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Decode,
    Extract,
    Classify,
    Store,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Success {
        status: String,
        classification: i64,
    },
    Channels {
        channels: Vec<String>,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stage: Option<Stage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ServerMessage {
    pub fn success(classification: i64) -> Self {
        ServerMessage::Success {
            status: "success".to_string(),
            classification,
        }
    }

    pub fn channels(channels: impl IntoIterator<Item = String>) -> Self {
        ServerMessage::Channels {
            channels: channels.into_iter().collect(),
        }
    }

    pub fn error(code: &str, stage: Option<Stage>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            error: code.to_string(),
            stage,
            message: Some(message.into()),
        }
    }

    /// Error code, if this is an error response
    pub fn error_code(&self) -> Option<&str> {
        match self {
            ServerMessage::Error { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!("Failed to serialize response: {}", e);
            format!(r#"{{"error":"{}"}}"#, codes::SERVER_ERROR)
        })
    }
}
