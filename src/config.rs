//! Socket multiplexer configuration.

use std::net::SocketAddr;

use serde::Deserialize;

use crate::error::Result;

/// Default bind address: every interface, OS-chosen port.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:0";

/// Default capacity of the shared outbound queue.
pub const DEFAULT_SEND_QUEUE_CAPACITY: usize = 1024;

/// Default capacity of the inbound datagram queue.
pub const DEFAULT_RECV_QUEUE_CAPACITY: usize = 1024;

/// Largest UDP payload over IPv4.
pub const DEFAULT_MAX_DATAGRAM_SIZE: usize = 65_507;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Local address to bind the socket to.
    pub bind_addr: SocketAddr,

    /// Payloads that may wait for the writer before `send` starts waiting.
    pub send_queue_capacity: usize,

    /// Datagrams buffered for the consumer before new ones are dropped.
    pub recv_queue_capacity: usize,

    /// Receive buffer size; longer datagrams are truncated by the OS.
    pub max_datagram_size: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            send_queue_capacity: DEFAULT_SEND_QUEUE_CAPACITY,
            recv_queue_capacity: DEFAULT_RECV_QUEUE_CAPACITY,
            max_datagram_size: DEFAULT_MAX_DATAGRAM_SIZE,
        }
    }
}

impl MuxConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_send_queue_capacity(mut self, capacity: usize) -> Self {
        self.send_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_recv_queue_capacity(mut self, capacity: usize) -> Self {
        self.recv_queue_capacity = capacity.max(1);
        self
    }

    pub fn with_max_datagram_size(mut self, size: usize) -> Self {
        self.max_datagram_size = size;
        self
    }
}
