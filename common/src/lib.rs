//! Shared building blocks for the reyer control client.
//!
//! This crate holds the pieces every other crate in the workspace leans on
//! but that carry no IPC or runtime semantics of their own.
//!
//! ## Architecture
//!
//! - **common** (this crate): Error location tracking
//! - **client-core**: Runtime IPC client, codec, storage and tracking
//! - **reyer**: Console shell wiring everything together

pub mod error;

pub use error::error_location::ErrorLocation;
