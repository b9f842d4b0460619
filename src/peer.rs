use std::collections::hash_map::{self, HashMap};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::key::{decode_key, SecretKey};

/// Where a peer can currently be reached.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .ip
            .parse()
            .map_err(|_| Error::InvalidAddress(self.ip.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Peer {
    id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(default)]
    endpoint: Endpoint,
    /// Base64 text of the peer's public key; empty while unknown.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub public_key: String,
    #[serde(skip)]
    private_key: Option<SecretKey>,
    #[serde(skip)]
    addr: Option<SocketAddr>,
}

impl Peer {
    pub fn new(id: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            id: id.into(),
            username: String::new(),
            endpoint,
            public_key: String::new(),
            private_key: None,
            addr: None,
        }
    }

    /// New peer with a random v4 UUID as its id.
    pub fn generate(endpoint: Endpoint) -> Self {
        Self::new(uuid::Uuid::new_v4().to_string(), endpoint)
    }

    /// Describe this host: first non-loopback local IP, hostname as username.
    pub fn local(port: u16) -> Result<Self> {
        let ip = local_ip_address::local_ip().map_err(|e| Error::InvalidAddress(e.to_string()))?;
        let username = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self::generate(Endpoint::new(ip.to_string(), port)).with_username(username))
    }

    /// Fixed for the record's lifetime; `Peers` is keyed by it.
    ///
    /// There is no setter, so a stored record cannot be renamed in place:
    ///
    /// ```compile_fail
    /// let mut peers = peerwire::Peers::new();
    /// peers.insert(peerwire::Peer::new("bob", peerwire::Endpoint::default()));
    /// peers.get_mut("bob").unwrap().id = "alice".to_string();
    /// ```
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Replace the endpoint after an address migration. The resolved address
    /// is rebuilt on the next `resolve`.
    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        if self.endpoint != endpoint {
            self.endpoint = endpoint;
            self.addr = None;
        }
    }

    pub fn resolve(&mut self) -> Result<SocketAddr> {
        if let Some(addr) = self.addr {
            return Ok(addr);
        }
        let addr = self.endpoint.socket_addr()?;
        self.addr = Some(addr);
        Ok(addr)
    }

    pub fn resolved_addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn public_key(&self) -> Result<SecretKey> {
        decode_key(&self.public_key).map_err(Error::Decode)
    }

    /// Last write wins; there is no separate rotation step.
    pub fn set_public_key(&mut self, key: &SecretKey) {
        self.public_key = key.to_text();
    }

    pub fn private_key(&self) -> Option<&SecretKey> {
        self.private_key.as_ref()
    }

    pub fn set_private_key(&mut self, key: SecretKey) {
        self.private_key = Some(key);
    }
}

/// Known peers keyed by id.
///
/// No internal locking; callers that share it across tasks wrap it themselves.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Peers(HashMap<String, Peer>);

// Re-keyed by each record's own id: the map keys on the wire are not trusted.
impl<'de> Deserialize<'de> for Peers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = HashMap::<String, Peer>::deserialize(deserializer)?;
        Ok(map.into_values().collect())
    }
}

impl FromIterator<Peer> for Peers {
    /// Later records replace earlier ones with the same id.
    fn from_iter<I: IntoIterator<Item = Peer>>(iter: I) -> Self {
        let mut peers = Self::new();
        for peer in iter {
            peers.insert(peer);
        }
        peers
    }
}

impl Peers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by id, returning the previous record.
    pub fn insert(&mut self, peer: Peer) -> Option<Peer> {
        self.0.insert(peer.id.clone(), peer)
    }

    pub fn get(&self, id: &str) -> Option<&Peer> {
        self.0.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Peer> {
        self.0.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Peer> {
        self.0.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> hash_map::Values<'_, String, Peer> {
        self.0.values()
    }

    /// Read a peer list written by `save`. A missing file is an empty list.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::new());
        }
        let content = fs::read_to_string(path)?;
        let peers: Self = serde_json::from_str(&content)?;
        tracing::info!("Loaded {} peers from {}", peers.len(), path.display());
        Ok(peers)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        tracing::debug!("Saved {} peers to {}", self.len(), path.display());
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Peers {
    type Item = &'a Peer;
    type IntoIter = hash_map::Values<'a, String, Peer>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
