use common::ErrorLocation;

use thiserror::Error;

/// Errors that stop the console shell.
///
/// Everything below startup is logged and survived; only these reach `main`.
#[derive(Debug, Error)]
pub enum ReyerError {
    /// Error from this App
    #[error("Reyer Error: {message} {location}")]
    Reyer {
        message: String,
        location: ErrorLocation,
    },

    /// Error from client-core operations (config, client construction)
    #[error("Core Error: {message} {location}")]
    Core {
        message: String,
        location: ErrorLocation,
    },
}
