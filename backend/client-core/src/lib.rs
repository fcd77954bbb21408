//! Control client for the reyer runtime.
//!
//! The runtime exposes a request/reply endpoint for commands and queries and a
//! publish/subscribe endpoint for log lines and protocol events. [`ReyerClient`]
//! talks to both:
//!
//! ```no_run
//! use client_core::{ClientConfig, ReyerClient};
//!
//! # async fn run() -> Result<(), client_core::error::CoreError> {
//! let client = ReyerClient::new(ClientConfig::default())?;
//! client.register_on_connected(|| log::info!("runtime is up"));
//! client.connect();
//!
//! client
//!     .subscribe_protocol_events(|event| {
//!         log::info!("{:?} {}", event.event, event.data);
//!         Ok(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod protocol;
pub mod storage;
pub mod transport;

#[cfg(test)]
mod tests;

pub use client::{ConnectionState, ReyerClient};
pub use config::ClientConfig;

pub const DEFAULT_REQUEST_SOCKET_PATH: &str = "/tmp/reyer-rep.sock";
pub const DEFAULT_PUBLISH_SOCKET_PATH: &str = "/tmp/reyer-pub.sock";
pub const DEFAULT_REQUEST_ADDRESS: &str =
    const_format::concatcp!(transport::IPC_SCHEME, DEFAULT_REQUEST_SOCKET_PATH);
pub const DEFAULT_PUBLISH_ADDRESS: &str =
    const_format::concatcp!(transport::IPC_SCHEME, DEFAULT_PUBLISH_SOCKET_PATH);
