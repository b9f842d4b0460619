//! Peer-connection core for a UDP overlay network.
//!
//! Peers carry identity and public key material ([`peer`]). Each reachable
//! address gets a [`conn::Conn`] that queues outbound bytes onto a socket
//! shared through [`socket::UdpMux`] and holds the negotiated encryption key.

pub mod config;
pub mod conn;
pub mod error;
pub mod key;
pub mod naming;
pub mod peer;
pub mod socket;
pub mod transport;

pub use config::MuxConfig;
pub use conn::{Conn, Payload, PeerConns, UdpConn};
pub use error::{Error, Result};
pub use key::SecretKey;
pub use naming::{ServiceEntry, ServiceRecord};
pub use peer::{Endpoint, Peer, Peers};
pub use socket::{Datagram, UdpMux};
pub use transport::{gen_port, TransportAddr, Udp};
