use super::wire_enum;

use serde::{Deserialize, Serialize};

/// Reply envelope for every request.
///
/// `payload` is only meaningful when `success` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default)]
    pub error_code: i32,
    #[serde(default)]
    pub error_message: String,
    #[serde(default)]
    pub payload: String,
}

impl Response {
    pub fn ok(payload: impl Into<String>) -> Self {
        Self {
            success: true,
            error_code: 0,
            error_message: String::new(),
            payload: payload.into(),
        }
    }

    pub fn rejected(error_code: i32, error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_code,
            error_message: error_message.into(),
            payload: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub timestamp: u64,
}

wire_enum! {
    /// Coarse state of the runtime, answered for `ResourceCode::RuntimeState`.
    pub enum RuntimeState: u8 {
        Default = 0,
        Standby = 1,
        Running = 2,
        Saving = 3,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorInfo {
    pub index: i32,
    pub width_px: i32,
    pub height_px: i32,
    pub width_mm: i32,
    pub height_mm: i32,
    pub refresh_rate: i32,
    pub name: String,
}

/// A plugin the runtime can load, with its configuration schema (JSON Schema text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub configuration_schema: String,
    #[serde(default)]
    pub default_configuration: String,
}
