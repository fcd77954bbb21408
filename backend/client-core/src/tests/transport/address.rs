use crate::error::TransportError;
use crate::transport::IpcAddress;

use std::path::Path;

#[test]
fn given_ipc_address_when_parsed_then_path_is_socket_file() {
    let address = IpcAddress::parse("ipc:///tmp/reyer-rep.sock").expect("parse");

    assert_eq!(address.path(), Path::new("/tmp/reyer-rep.sock"));
    assert_eq!(address.to_string(), "ipc:///tmp/reyer-rep.sock");
}

/// **VALUE**: Only `ipc://` endpoints are accepted.
///
/// **WHY THIS MATTERS**: The runtime only binds Unix domain sockets. A `tcp://`
/// address would otherwise surface much later as a confusing dial failure.
///
/// **BUG THIS CATCHES**: Stripping any scheme instead of exactly `ipc://`.
#[test]
fn given_other_scheme_when_parsed_then_returns_address_error() {
    let result = IpcAddress::parse("tcp://127.0.0.1:5555");

    assert!(matches!(result, Err(TransportError::Address { .. })));
}

#[test]
fn given_empty_path_when_parsed_then_returns_address_error() {
    let result: Result<IpcAddress, _> = "ipc://".parse();

    assert!(matches!(result, Err(TransportError::Address { .. })));
}
