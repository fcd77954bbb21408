//! Typed envelopes exchanged with the runtime and their JSON codec.
//!
//! Requests travel as plain JSON objects: the runtime picks the request kind
//! from the field set, so [`Request`] serialises untagged. Replies to every
//! request share the [`Response`] envelope, whose `payload` is itself a JSON
//! document whose shape depends on the request kind. Broadcasts arrive as
//! [`BroadcastMessage`] with a topic-dependent JSON payload.
//!
//! Enumerations travel as integers. Enumerations that are part of a typed
//! shape are range checked while decoding, so an unknown value is a decode
//! failure rather than a silently defaulted field.

mod broadcast;
mod request;
mod response;

pub use broadcast::{BroadcastMessage, BroadcastTopic, ProtocolEvent, ProtocolEventMessage};
pub use request::{
    Command, CommandRequest, GraphicsSettings, GraphicsSettingsRequest, PipelineConfigRequest,
    Ping, ProtocolRequest, Request, ResourceCode, ResourceRequest, TaskInfo,
};
pub use response::{MonitorInfo, PluginInfo, Pong, Response, RuntimeState};

use crate::error::codec::CodecError;

use common::ErrorLocation;

use std::panic::Location;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Serialise a message to its wire bytes.
///
/// Field order follows declaration order, so the output is deterministic.
#[track_caller]
pub fn encode<T: Serialize + ?Sized>(message: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(message).map_err(|e| CodecError::Encode {
        message: e.to_string(),
        location: ErrorLocation::from(Location::caller()),
    })
}

/// Decode wire bytes into the expected shape.
///
/// Missing required fields, mistyped fields and out-of-range enumerations all
/// fail with [`CodecError::Decode`].
#[track_caller]
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
        message: format!("{}: {e}", std::any::type_name::<T>()),
        location: ErrorLocation::from(Location::caller()),
    })
}

/// Decode a JSON document carried inside a string field (`Response.payload`,
/// `BroadcastMessage.payload`).
#[track_caller]
pub fn decode_str<T: DeserializeOwned>(payload: &str) -> Result<T, CodecError> {
    decode(payload.as_bytes())
}

/// Integer-backed enumeration as it appears on the wire.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident: $repr:ty {
            $($(#[$variant_meta:meta])* $variant:ident = $value:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($(#[$variant_meta])* $variant = $value),+
        }

        impl From<$name> for $repr {
            fn from(value: $name) -> Self {
                value as $repr
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = $crate::error::codec::CodecError;

            #[track_caller]
            fn try_from(raw: $repr) -> Result<Self, Self::Error> {
                match raw {
                    $($value => Ok($name::$variant),)+
                    other => Err($crate::error::codec::CodecError::decode(format!(
                        "{} is not a valid {}",
                        other,
                        stringify!($name)
                    ))),
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serde::Serialize::serialize(&<$repr>::from(*self), serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = <$repr as serde::Deserialize>::deserialize(deserializer)?;
                $name::try_from(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

pub(crate) use wire_enum;
