pub mod client;
pub mod codec;
pub mod config;
pub mod handler;
pub mod storage;
pub mod transport;

pub use client::ClientError;
pub use codec::CodecError;
pub use config::ConfigError;
pub use handler::HandlerError;
pub use storage::StorageError;
pub use transport::TransportError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
