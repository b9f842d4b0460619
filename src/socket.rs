//! Owner of one bound UDP socket and the tasks that drive it.
//!
//! All connections multiplexed on the socket push into one bounded queue; a
//! single writer task drains it in FIFO order.
//!
//! A separate reader task only tags each inbound datagram with its source
//! address and hands it to the receiver returned by [`UdpMux::bind`]. It does
//! not look up connections or peers. Routing a [`Datagram`] to its connection
//! (for example through [`PeerConns::get`] keyed by `from`) is the consumer's
//! job. When the reader stops, that receiver yields `None`.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::MuxConfig;
use crate::conn::{Conn, Payload, PeerConns, UdpConn};
use crate::error::{Error, Result};
use crate::peer::Peer;
use crate::transport::{gen_port, TransportAddr, Udp};

/// An inbound datagram and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub bytes: Vec<u8>,
    pub from: SocketAddr,
}

#[derive(Debug)]
pub struct UdpMux {
    local_addr: SocketAddr,
    send: mpsc::Sender<Payload>,
    cancel: CancellationToken,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl UdpMux {
    /// Bind `config.bind_addr` and start the writer and reader tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn bind(config: MuxConfig) -> Result<(Self, mpsc::Receiver<Datagram>)> {
        let socket = Arc::new(Udp::new().listen(config.bind_addr).await?);
        let local_addr = socket.local_addr().map_err(|source| Error::Bind {
            addr: config.bind_addr,
            source,
        })?;

        let (send_tx, send_rx) = mpsc::channel(config.send_queue_capacity.max(1));
        let (recv_tx, recv_rx) = mpsc::channel(config.recv_queue_capacity.max(1));
        let cancel = CancellationToken::new();

        let writer = tokio::spawn(write_loop(socket.clone(), send_rx, cancel.clone()));
        let reader = tokio::spawn(read_loop(
            socket,
            recv_tx,
            config.max_datagram_size.max(1),
            cancel.clone(),
        ));

        info!("UDP socket listening on {}", local_addr);

        let mux = Self {
            local_addr,
            send: send_tx,
            cancel,
            writer: Some(writer),
            reader: Some(reader),
        };
        Ok((mux, recv_rx))
    }

    /// Bind on `ip` with a random port from [`gen_port`], drawing a new port
    /// after each bind failure, up to `attempts` tries in total.
    ///
    /// `attempts` must be at least 1; zero is rejected with
    /// [`Error::InvalidAddress`] without touching the network.
    pub async fn bind_ephemeral(
        ip: IpAddr,
        attempts: usize,
        config: MuxConfig,
    ) -> Result<(Self, mpsc::Receiver<Datagram>)> {
        if attempts == 0 {
            return Err(Error::InvalidAddress(format!(
                "{ip}: bind attempts must be at least 1"
            )));
        }
        let mut attempt = 1;
        loop {
            let port = gen_port();
            let port: u16 = port
                .trim_start_matches(':')
                .parse()
                .map_err(|_| Error::InvalidAddress(port.clone()))?;
            let config = MuxConfig {
                bind_addr: SocketAddr::new(ip, port),
                ..config.clone()
            };

            match Self::bind(config).await {
                Err(err @ Error::Bind { .. }) if attempt < attempts => {
                    debug!("Bind attempt {} failed: {}", attempt, err);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A new connection to `addr` sharing this socket's send queue.
    pub fn conn(&self, addr: SocketAddr) -> UdpConn {
        debug!("New UDP connection to {}", addr);
        UdpConn::new(self.send.clone(), addr)
    }

    /// The live connection to `addr` in `conns`, created if absent.
    pub fn connect(&self, conns: &mut PeerConns, addr: SocketAddr) -> Arc<dyn Conn> {
        conns.get_or_insert_with(TransportAddr::Udp(addr), || {
            Arc::new(self.conn(addr)) as Arc<dyn Conn>
        })
    }

    /// Resolve the peer's endpoint and return its live connection.
    pub fn connect_peer(&self, conns: &mut PeerConns, peer: &mut Peer) -> Result<Arc<dyn Conn>> {
        let addr = peer.resolve()?;
        Ok(self.connect(conns, addr))
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop both tasks. Queued payloads not yet written are dropped and every
    /// connection's `send` fails with [`Error::Closed`] from here on.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        for handle in [self.writer.take(), self.reader.take()].into_iter().flatten() {
            if let Err(e) = handle.await {
                warn!("UDP task ended abnormally: {}", e);
            }
        }
        info!("UDP socket {} closed", self.local_addr);
    }
}

impl Drop for UdpMux {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn write_loop(
    socket: Arc<UdpSocket>,
    mut queue: mpsc::Receiver<Payload>,
    cancel: CancellationToken,
) {
    loop {
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            payload = queue.recv() => match payload {
                Some(payload) => payload,
                None => break,
            },
        };

        if let Err(e) = socket.send_to(&payload.bytes, payload.addr).await {
            warn!("Failed to send {} bytes to {}: {}", payload.bytes.len(), payload.addr, e);
        }
    }
    // closing fails every pending and later send
    queue.close();
}

async fn read_loop(
    socket: Arc<UdpSocket>,
    inbound: mpsc::Sender<Datagram>,
    buffer_size: usize,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; buffer_size];
    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => received,
        };

        match received {
            Ok((len, from)) => {
                let datagram = Datagram {
                    bytes: buf[..len].to_vec(),
                    from,
                };
                match inbound.try_send(datagram) {
                    Ok(()) => {}
                    Err(TrySendError::Full(d)) => {
                        warn!("Inbound queue full, dropping {} bytes from {}", d.bytes.len(), d.from);
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("Inbound consumer gone, stopping reader");
                        break;
                    }
                }
            }
            // ICMP unreachable from an earlier send surfaces here on some platforms
            Err(e) if is_transient(&e) => warn!("Failed to receive datagram: {}", e),
            Err(e) => {
                error!("UDP socket read failed, stopping reader: {}", e);
                break;
            }
        }
    }
}

/// Errors tied to one datagram or one earlier send; the socket stays usable.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    )
}
