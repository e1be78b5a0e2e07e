/// Data model — spec.md §3.
///
/// `File` is the user-visible manifest; `Shard`/`ShardRef` describe one of
/// its `D+P` erasure-coded pieces; `PeerEntry` and `Token` are the in-memory
/// records held by the membership table and token table respectively.
use serde::{Deserialize, Serialize};

/// One of the `D+P` erasure-coded pieces of a File, as recorded in its
/// manifest. Order is significant and matches the codec's shard index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardRef {
    pub hash: String,
    pub base_name: String,
    /// Empty when placement could not find a live peer for this slot
    /// (spec.md §4.4 partial-placement tolerance).
    pub server: String,
}

/// The File document, indexed under type `file` keyed by `hash`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDoc {
    pub hash: String,
    pub name: String,
    pub size: u64,
    pub created_at: i64,
    pub shards: Vec<ShardRef>,
}

/// The Shard document, indexed under type `shard` keyed by the shard's own
/// hash, as stored by the storage node that holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardDoc {
    pub hash: String,
    pub base_name: String,
    pub server: String,
    pub size: u64,
    pub created_at: i64,
}

/// In-memory peer record held by the membership table (C4).
#[derive(Debug, Clone, Copy)]
pub struct PeerEntry {
    pub last_seen_nanos: i64,
}

/// Current time as nanoseconds since the Unix epoch, matching the wire
/// format's 19-digit nanosecond timestamp (spec.md §4.6).
pub fn now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_nanos() as i64
}
