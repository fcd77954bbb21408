use crate::error::transport::TransportError;

use common::ErrorLocation;

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const IPC_SCHEME: &str = "ipc://";

/// An `ipc://` endpoint, backed by a Unix domain socket path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcAddress {
    path: PathBuf,
}

impl IpcAddress {
    #[track_caller]
    pub fn parse(address: &str) -> Result<Self, TransportError> {
        let path = address
            .strip_prefix(IPC_SCHEME)
            .ok_or_else(|| TransportError::Address {
                message: format!("'{address}' does not use the {IPC_SCHEME} scheme"),
                location: ErrorLocation::from(Location::caller()),
            })?;

        if path.is_empty() {
            return Err(TransportError::Address {
                message: format!("'{address}' has an empty socket path"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(Self {
            path: PathBuf::from(path),
        })
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FromStr for IpcAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for IpcAddress {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        write!(formatter, "{IPC_SCHEME}{}", self.path.display())
    }
}
