use common::ErrorLocation;

use std::panic::Location;

use thiserror::Error as ThisError;

/// Failure reported by a subscription handler.
///
/// The dispatcher logs it and moves on to the next handler.
#[derive(Debug, ThisError)]
#[error("Handler Error: {message} {location}")]
pub struct HandlerError {
    pub message: String,
    pub location: ErrorLocation,
}

impl HandlerError {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
