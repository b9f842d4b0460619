//! Error types shared by the registry, connection and transport layers.

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The local UDP socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// An encryption key was requested before one was negotiated.
    #[error("key has not been set")]
    KeyNotSet,

    /// The stored encryption key text is corrupt.
    #[error("could not decode key: {0}")]
    KeyDecode(String),

    /// A peer's public key text is malformed.
    #[error("invalid public key: {0}")]
    Decode(String),

    /// Address extraction was given an address from another transport.
    #[error("expected {expected} address, got {found}")]
    AddressType {
        expected: &'static str,
        found: &'static str,
    },

    /// The socket owning the send queue has been closed.
    #[error("connection closed")]
    Closed,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("naming error: {0}")]
    Naming(String),

    #[error("storage error: {0}")]
    Storage(#[from] io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Bind { .. } => "bind",
            Self::KeyNotSet => "key_not_set",
            Self::KeyDecode(_) => "key_decode",
            Self::Decode(_) => "decode",
            Self::AddressType { .. } => "address_type",
            Self::Closed => "closed",
            Self::InvalidAddress(_) => "invalid_address",
            Self::Naming(_) => "naming",
            Self::Storage(_) => "storage",
            Self::Json(_) => "json",
        }
    }

    /// Whether the caller can recover by renegotiating or re-requesting.
    ///
    /// `KeyNotSet` clears after a key exchange and `Decode` after fetching a
    /// fresh public key from the peer. `KeyDecode` and `AddressType` are bugs.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::KeyNotSet | Self::Decode(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(Error::KeyNotSet.code(), "key_not_set");
        assert_eq!(Error::KeyDecode("bad".into()).code(), "key_decode");
        assert_eq!(
            Error::AddressType {
                expected: "udp",
                found: "tcp"
            }
            .code(),
            "address_type"
        );
    }

    #[test]
    fn key_errors_are_distinguishable() {
        assert!(Error::KeyNotSet.is_retryable());
        assert!(!Error::KeyDecode("corrupt".into()).is_retryable());
        assert!(Error::Decode("short".into()).is_retryable());
        assert!(!Error::Closed.is_retryable());
    }

    #[test]
    fn bind_error_message() {
        let err = Error::Bind {
            addr: "127.0.0.1:9".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind 127.0.0.1:9: in use");
    }
}
