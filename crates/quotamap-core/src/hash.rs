//! Content digests of plain container graphs.
//!
//! Two graphs get the same digest when they have the same shape, the same
//! entries in the same key order and the same sharing. Used to show that dry
//! runs and rejected writes leave a graph untouched.

use serde::Serialize;

use crate::error::Result;
use crate::plain::PlainGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }
}

impl std::fmt::Display for Hash256 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

pub fn hash_bytes(bytes: &[u8]) -> Hash256 {
    Hash256(*blake3::hash(bytes).as_bytes())
}

/// Digest of any serializable value, via its JSON encoding.
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256> {
    Ok(hash_bytes(&serde_json::to_vec(v)?))
}

/// Digest of a graph snapshot. Table numbering is part of the input, so
/// snapshots must come from the same deterministic walk.
pub fn digest_graph(graph: &PlainGraph) -> Result<Hash256> {
    hash_serde(graph)
}
