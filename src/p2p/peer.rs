//! Peer identity as seen by the rate limiter.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::{FloodgateError, Result};

/// Address reported for peers without a known IP.
pub const UNKNOWN_ADDRESS: &str = "<nil>";

/// Length in bytes of a [`NodeId`].
pub const NODE_ID_LEN: usize = 32;

/// Fixed-width protocol identifier of a peer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId([u8; NODE_ID_LEN]);

impl NodeId {
    /// Create a node id from raw bytes.
    pub const fn new(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Build a node id from a prefix, zero-padding the rest.
    ///
    /// Prefixes longer than [`NODE_ID_LEN`] are truncated.
    pub fn from_prefix(prefix: &[u8]) -> Self {
        let mut bytes = [0u8; NODE_ID_LEN];
        let len = prefix.len().min(NODE_ID_LEN);
        bytes[..len].copy_from_slice(&prefix[..len]);
        Self(bytes)
    }

    /// Raw bytes of this id.
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.0
    }

    /// Lower-case hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for NodeId {
    type Err = FloodgateError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let mut bytes = [0u8; NODE_ID_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| FloodgateError::InvalidNodeId(format!("{}: {}", s, e)))?;
        Ok(Self(bytes))
    }
}

impl From<[u8; NODE_ID_LEN]> for NodeId {
    fn from(bytes: [u8; NODE_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_hex())
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A remote endpoint whose inbound messages are rate limited.
pub trait Peer: Send + Sync {
    /// Network address of the peer, or [`UNKNOWN_ADDRESS`].
    fn address(&self) -> String;

    /// Protocol-level identity of the peer.
    fn id(&self) -> NodeId;
}

/// Plain peer description for hosts that already resolved both values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub id: NodeId,
    pub address: String,
}

impl PeerInfo {
    /// Create a peer with an explicit address string.
    pub fn new(id: NodeId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }

    /// Create a peer from an optional socket address.
    ///
    /// Only the IP is kept; peers behind one host share an address quota
    /// regardless of source port.
    pub fn from_socket_addr(id: NodeId, addr: Option<SocketAddr>) -> Self {
        let address = match addr {
            Some(addr) => addr.ip().to_string(),
            None => UNKNOWN_ADDRESS.to_string(),
        };
        Self { id, address }
    }
}

impl Peer for PeerInfo {
    fn address(&self) -> String {
        self.address.clone()
    }

    fn id(&self) -> NodeId {
        self.id
    }
}

impl<P: Peer + ?Sized> Peer for std::sync::Arc<P> {
    fn address(&self) -> String {
        (**self).address()
    }

    fn id(&self) -> NodeId {
        (**self).id()
    }
}
