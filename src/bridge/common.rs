#![forbid(unsafe_code)]

use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Module name the host framework resolves through the registry
pub const MODULE_NAME: &str = "ReactNativeUdpSockets";

/// Maximum datagram size accepted from the OS socket
pub const MAX_DATAGRAM_SIZE: usize = 65536;

/// Caller-assigned identifier naming one logical open socket
pub type ClientId = u32;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("no udp socket for id {0}")]
    SocketNotFound(ClientId),
    #[error("udp socket {0} already exists")]
    SocketExists(ClientId),
    #[error("udp socket {0} is not bound")]
    SocketNotBound(ClientId),
    #[error("udp socket {0} is already bound")]
    AlreadyBound(ClientId),
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] std::net::AddrParseError),
    #[error("network error: {0}")]
    Network(#[from] std::io::Error),
}

/// Options accepted when a socket is created. The `type` field ("udp4" or
/// "udp6") is advisory; the bind address decides the family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketOptions {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Options accepted at bind time, in the host's camelCase form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BindOptions {
    pub reuse_port: bool,
    pub debug: bool,
}

/// Address a socket ended up bound to, echoed back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundAddress {
    pub address: String,
    pub port: u16,
}

/// Per-socket traffic counters
#[derive(Debug, Default, Clone)]
pub struct SocketStats {
    pub datagrams_sent: u64,
    pub bytes_sent: u64,
    pub datagrams_received: u64,
    pub bytes_received: u64,
    pub recv_errors: u64,
    pub last_activity_ms: u64,
}

/// Get current monotonic time in milliseconds
pub fn current_millis() -> u64 {
    lazy_static::lazy_static! {
        static ref START_TIME: Instant = Instant::now();
    }
    START_TIME.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            BridgeError::SocketNotFound(3).to_string(),
            "no udp socket for id 3"
        );
        assert_eq!(
            BridgeError::SocketExists(9).to_string(),
            "udp socket 9 already exists"
        );
        assert_eq!(
            BridgeError::SocketNotBound(1).to_string(),
            "udp socket 1 is not bound"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err: BridgeError = io_err.into();
        assert!(matches!(err, BridgeError::Network(_)));
        assert_eq!(err.to_string(), "network error: in use");
    }

    #[test]
    fn test_error_from_addr_parse() {
        let parse_err = "not-an-ip".parse::<std::net::IpAddr>().unwrap_err();
        let err: BridgeError = parse_err.into();
        assert!(matches!(err, BridgeError::InvalidAddress(_)));
    }

    #[test]
    fn test_bind_options_camel_case() {
        let options: BindOptions =
            serde_json::from_str(r#"{"reusePort": true, "debug": false}"#).unwrap();
        assert!(options.reuse_port);
        assert!(!options.debug);

        // Missing fields fall back to defaults.
        let options: BindOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, BindOptions::default());
    }

    #[test]
    fn test_socket_options_type_field() {
        let options: SocketOptions = serde_json::from_str(r#"{"type": "udp4"}"#).unwrap();
        assert_eq!(options.kind.as_deref(), Some("udp4"));
        let options: SocketOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.kind, None);
    }

    #[test]
    fn test_current_millis_monotonic() {
        let t1 = current_millis();
        let t2 = current_millis();
        assert!(t2 >= t1);
    }
}
