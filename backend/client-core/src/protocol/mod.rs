//! Client-side view of protocol runs, rebuilt from `PROTOCOL` broadcasts.

mod tracker;

pub use tracker::{Controls, ProtocolTracker, RunPhase, RunRecord};
