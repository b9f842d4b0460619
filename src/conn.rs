//! The uniform connection capability handed to protocol code.

use std::collections::hash_map::{self, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::key::{decode_key, SecretKey};
use crate::transport::TransportAddr;

/// Outbound bytes plus the address they go to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub addr: SocketAddr,
}

/// A connection to a remote peer, independent of the wire transport.
#[async_trait]
pub trait Conn: Send + Sync {
    /// Queue bytes for the peer. Waits while the queue is full and fails with
    /// [`Error::Closed`] once the owning socket has shut down.
    async fn send(&self, bytes: Vec<u8>) -> Result<()>;

    fn protocol(&self) -> &'static str;

    fn addr(&self) -> TransportAddr;

    /// [`Error::KeyNotSet`] before any key was stored, [`Error::KeyDecode`]
    /// if the stored key is corrupt.
    fn encrypt_key(&self) -> Result<SecretKey>;

    fn set_encrypt_key(&self, key: &SecretKey);
}

/// UDP connection: a handle onto the socket's shared send queue.
pub struct UdpConn {
    send: mpsc::Sender<Payload>,
    addr: SocketAddr,
    secret: RwLock<Option<Zeroizing<String>>>,
}

impl UdpConn {
    pub fn new(send: mpsc::Sender<Payload>, addr: SocketAddr) -> Self {
        Self {
            send,
            addr,
            secret: RwLock::new(None),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        self.addr
    }

    #[cfg(test)]
    fn set_raw_secret(&self, text: &str) {
        *self.secret.write().unwrap_or_else(|e| e.into_inner()) = Some(Zeroizing::new(text.into()));
    }
}

impl std::fmt::Debug for UdpConn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpConn").field("addr", &self.addr).finish_non_exhaustive()
    }
}

#[async_trait]
impl Conn for UdpConn {
    async fn send(&self, bytes: Vec<u8>) -> Result<()> {
        let payload = Payload {
            bytes,
            addr: self.addr,
        };
        self.send.send(payload).await.map_err(|_| Error::Closed)
    }

    fn protocol(&self) -> &'static str {
        "UDP"
    }

    fn addr(&self) -> TransportAddr {
        TransportAddr::Udp(self.addr)
    }

    fn encrypt_key(&self) -> Result<SecretKey> {
        // a poisoned lock still holds a whole key: writes are a single assignment
        let secret = self.secret.read().unwrap_or_else(|e| e.into_inner());
        match secret.as_ref() {
            None => Err(Error::KeyNotSet),
            Some(text) => decode_key(text).map_err(Error::KeyDecode),
        }
    }

    fn set_encrypt_key(&self, key: &SecretKey) {
        let text = Zeroizing::new(key.to_text());
        *self.secret.write().unwrap_or_else(|e| e.into_inner()) = Some(text);
    }
}

/// Live connections keyed by remote address; at most one per address.
///
/// Like [`crate::peer::Peers`] this carries no lock of its own.
#[derive(Default)]
pub struct PeerConns(HashMap<String, Arc<dyn Conn>>);

impl PeerConns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, addr: &TransportAddr) -> Option<Arc<dyn Conn>> {
        self.0.get(&addr.to_string()).cloned()
    }

    /// Return the live connection for `addr`, building one only if none exists.
    pub fn get_or_insert_with<F>(&mut self, addr: TransportAddr, make: F) -> Arc<dyn Conn>
    where
        F: FnOnce() -> Arc<dyn Conn>,
    {
        self.0.entry(addr.to_string()).or_insert_with(make).clone()
    }

    /// Bind a new connection under its own address, replacing any previous one.
    pub fn insert(&mut self, conn: Arc<dyn Conn>) -> Option<Arc<dyn Conn>> {
        self.0.insert(conn.addr().to_string(), conn)
    }

    pub fn remove(&mut self, addr: &TransportAddr) -> Option<Arc<dyn Conn>> {
        self.0.remove(&addr.to_string())
    }

    pub fn contains(&self, addr: &TransportAddr) -> bool {
        self.0.contains_key(&addr.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> hash_map::Values<'_, String, Arc<dyn Conn>> {
        self.0.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(capacity: usize) -> (UdpConn, mpsc::Receiver<Payload>) {
        let (tx, rx) = mpsc::channel(capacity);
        (UdpConn::new(tx, "10.0.0.2:4567".parse().unwrap()), rx)
    }

    #[test]
    fn metadata() {
        let (c, _rx) = conn(1);
        assert_eq!(c.protocol(), "UDP");
        assert_eq!(c.addr(), TransportAddr::Udp("10.0.0.2:4567".parse().unwrap()));
    }

    #[test]
    fn key_not_set_on_fresh_conn() {
        let (c, _rx) = conn(1);
        assert!(matches!(c.encrypt_key(), Err(Error::KeyNotSet)));
    }

    #[test]
    fn set_then_get_key() {
        let (c, _rx) = conn(1);
        let key = SecretKey::from_bytes([42u8; 32]);
        c.set_encrypt_key(&key);
        assert_eq!(c.encrypt_key().unwrap(), key);
    }

    #[test]
    fn set_key_idempotent_and_overwrites() {
        let (c, _rx) = conn(1);
        let first = SecretKey::from_bytes([1u8; 32]);
        c.set_encrypt_key(&first);
        c.set_encrypt_key(&first);
        assert_eq!(c.encrypt_key().unwrap(), first);

        let mut bytes = [0xffu8; 32];
        bytes[0] = 0;
        let second = SecretKey::from_bytes(bytes);
        c.set_encrypt_key(&second);
        assert_eq!(c.encrypt_key().unwrap().as_bytes(), &bytes);
    }

    #[test]
    fn concurrent_readers_never_see_a_torn_key() {
        let (c, _rx) = conn(1);
        let a = SecretKey::from_bytes([0x00u8; 32]);
        let b = SecretKey::from_bytes([0xffu8; 32]);
        c.set_encrypt_key(&a);

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..2_000 {
                    c.set_encrypt_key(if i % 2 == 0 { &b } else { &a });
                }
            });
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..2_000 {
                        let key = c.encrypt_key().unwrap();
                        assert!(key == a || key == b, "read a mixed key");
                    }
                });
            }
        });
    }

    #[test]
    fn corrupt_key_is_distinct_from_unset() {
        let (c, _rx) = conn(1);
        c.set_raw_secret("!!corrupt!!");
        assert!(matches!(c.encrypt_key(), Err(Error::KeyDecode(_))));
    }

    #[test]
    fn conn_key_interoperates_with_peer_key_text() {
        let (c, _rx) = conn(1);
        let key = SecretKey::from_bytes([8u8; 32]);
        let mut peer = crate::peer::Peer::new("p", crate::peer::Endpoint::default());
        peer.set_public_key(&key);
        c.set_raw_secret(&peer.public_key);
        assert_eq!(c.encrypt_key().unwrap(), key);
    }

    #[tokio::test]
    async fn send_preserves_order() {
        let (c, mut rx) = conn(8);
        c.send(b"A".to_vec()).await.unwrap();
        c.send(b"B".to_vec()).await.unwrap();
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.bytes, b"A");
        assert_eq!(second.bytes, b"B");
        assert_eq!(first.addr, c.socket_addr());
    }

    #[tokio::test]
    async fn send_waits_for_capacity() {
        let (c, mut rx) = conn(1);
        c.send(b"first".to_vec()).await.unwrap();

        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            c.send(b"second".to_vec()),
        )
        .await;
        assert!(blocked.is_err(), "send should wait while the queue is full");

        assert_eq!(rx.recv().await.unwrap().bytes, b"first");
        c.send(b"third".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().bytes, b"third");
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (c, rx) = conn(1);
        drop(rx);
        assert!(matches!(c.send(b"x".to_vec()).await, Err(Error::Closed)));
    }

    #[test]
    fn peer_conns_one_per_address() {
        let (tx, _rx) = mpsc::channel(1);
        let addr: SocketAddr = "10.0.0.2:4567".parse().unwrap();
        let mut conns = PeerConns::new();

        let first = conns.get_or_insert_with(TransportAddr::Udp(addr), || {
            Arc::new(UdpConn::new(tx.clone(), addr)) as Arc<dyn Conn>
        });
        first.set_encrypt_key(&SecretKey::from_bytes([6u8; 32]));

        let again = conns.get_or_insert_with(TransportAddr::Udp(addr), || {
            Arc::new(UdpConn::new(tx.clone(), addr)) as Arc<dyn Conn>
        });
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(conns.len(), 1);

        let replaced = conns.insert(Arc::new(UdpConn::new(tx.clone(), addr)));
        assert!(replaced.is_some());
        assert!(matches!(
            conns.get(&TransportAddr::Udp(addr)).unwrap().encrypt_key(),
            Err(Error::KeyNotSet)
        ));

        assert!(conns.remove(&TransportAddr::Udp(addr)).is_some());
        assert!(conns.is_empty());
    }
}
