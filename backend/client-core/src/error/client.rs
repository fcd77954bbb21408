use crate::error::codec::CodecError;
use crate::error::transport::TransportError;

use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

/// Failures returned by session and request operations.
///
/// None of these are raised for programmer errors; callers are expected to
/// branch on them. [`ClientError::Rejected`] is the only variant that means the
/// runtime actually answered.
#[derive(Debug, ThisError)]
pub enum ClientError {
    #[error("Not Connected Error: {message} {location}")]
    NotConnected {
        message: String,
        location: ErrorLocation,
    },

    #[error("Timeout Error: {message} {location}")]
    Timeout {
        message: String,
        location: ErrorLocation,
    },

    #[error("Transport Error: {message} {location}")]
    Transport {
        message: String,
        location: ErrorLocation,
    },

    #[error("Decode Error: {message} {location}")]
    Decode {
        message: String,
        location: ErrorLocation,
    },

    #[error("Encode Error: {message} {location}")]
    Encode {
        message: String,
        location: ErrorLocation,
    },

    #[error("Rejected Error: {message} (code {error_code}) {location}")]
    Rejected {
        error_code: i32,
        message: String,
        location: ErrorLocation,
    },

    #[error("Subscription Error: {message} {location}")]
    Subscription {
        message: String,
        location: ErrorLocation,
    },
}

impl ClientError {
    #[track_caller]
    pub(crate) fn not_connected() -> Self {
        ClientError::NotConnected {
            message: "client is not connected to the runtime".to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub(crate) fn timeout(message: impl Into<String>) -> Self {
        ClientError::Timeout {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub(crate) fn decode(message: impl Into<String>) -> Self {
        ClientError::Decode {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// True when the runtime was never reached or never answered.
    pub fn is_no_answer(&self) -> bool {
        matches!(
            self,
            ClientError::NotConnected { .. }
                | ClientError::Timeout { .. }
                | ClientError::Transport { .. }
        )
    }
}

impl From<TransportError> for ClientError {
    #[track_caller]
    fn from(error: TransportError) -> Self {
        ClientError::Transport {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<CodecError> for ClientError {
    #[track_caller]
    fn from(error: CodecError) -> Self {
        let location = ErrorLocation::from(Location::caller());
        match error {
            CodecError::Encode { message, .. } => ClientError::Encode { message, location },
            CodecError::Decode { message, .. } => ClientError::Decode { message, location },
        }
    }
}
