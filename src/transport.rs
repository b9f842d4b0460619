use std::fmt;
use std::net::{IpAddr, SocketAddr};

use rand::Rng;
use tokio::net::UdpSocket;

use crate::error::{Error, Result};

/// Lower bound of the range `gen_port` draws from.
pub const EPHEMERAL_PORT_MIN: u16 = 10_000;
/// Exclusive upper bound of the range `gen_port` draws from.
pub const EPHEMERAL_PORT_MAX: u16 = 65_535;

/// A transport-level address tagged with the network it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportAddr {
    Udp(SocketAddr),
    Tcp(SocketAddr),
}

impl TransportAddr {
    pub fn network(&self) -> &'static str {
        match self {
            Self::Udp(_) => Udp::NAME,
            Self::Tcp(_) => "tcp",
        }
    }
}

impl fmt::Display for TransportAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp(addr) | Self::Tcp(addr) => write!(f, "{addr}"),
        }
    }
}

/// Stateless UDP binding and address helpers.
#[derive(Debug, Clone, Copy, Default)]
pub struct Udp;

impl Udp {
    pub const NAME: &'static str = "udp";

    pub fn new() -> Self {
        Self
    }

    /// Bind a UDP socket. No retry; a failure here is fatal to the caller's startup.
    pub async fn listen(&self, addr: SocketAddr) -> Result<UdpSocket> {
        UdpSocket::bind(addr)
            .await
            .map_err(|source| Error::Bind { addr, source })
    }

    pub fn ip(&self, address: &TransportAddr) -> Result<IpAddr> {
        Ok(self.socket_addr(address)?.ip())
    }

    pub fn port(&self, address: &TransportAddr) -> Result<u16> {
        Ok(self.socket_addr(address)?.port())
    }

    fn socket_addr(&self, address: &TransportAddr) -> Result<SocketAddr> {
        match address {
            TransportAddr::Udp(addr) => Ok(*addr),
            other => Err(Error::AddressType {
                expected: Self::NAME,
                found: other.network(),
            }),
        }
    }
}

impl fmt::Display for Udp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(Self::NAME)
    }
}

/// Random listening port as `":<port>"`.
///
/// Not collision-free: a bind with the result may still fail and the caller
/// decides whether to draw again.
pub fn gen_port() -> String {
    let port = rand::thread_rng().gen_range(EPHEMERAL_PORT_MIN..EPHEMERAL_PORT_MAX);
    format!(":{port}")
}
