// ===================================================================================================
// objmesh - Erasure-Coded Distributed Object Storage
// ===================================================================================================
//
// A small distributed object-storage system: files are split into D data +
// P parity shards (Reed-Solomon), shards are spread across a dynamic fleet
// of storage nodes, and a frontend role reconstructs files on demand. Nodes
// discover each other through heartbeats on a publish/subscribe bus.
//
// ===== CORE =====
pub mod codec; // Erasure-coding split/verify/reconstruct/join engine (C1)
pub mod hashio; // Streaming content hash, tee-copy, atomic move (C2)
pub mod index; // Typed document index over sled (C3)
pub mod bus; // Publish/subscribe bus interface + in-process default (C4 collaborator)
pub mod membership; // Heartbeat publisher/consumer and peer membership table (C4)
pub mod singleflight; // Admission gate / de-dup by content hash
pub mod token; // Short-TTL one-shot shard read tokens (C7)
pub mod retry; // Pass-based fixed-interval retry helper
pub mod storage_service; // Storage node HTTP handlers (C5)
pub mod frontend_service; // Frontend HTTP handlers (C6)
pub mod router; // Request routers for both roles (C8)

// ===== DATA MODEL =====
pub mod model;

// ===== AMBIENT STACK =====
pub mod cli; // clap-derived command line interface
pub mod config; // Node configuration, loaded from TOML + env overrides
pub mod error; // Hand-rolled error enum and result alias
pub mod logging; // tracing/tracing-subscriber setup and logging helpers
pub mod response; // {code, msg} wire envelope

// ===== CONVENIENCE RE-EXPORTS =====
pub use config::Config;
pub use error::{ObjError, ObjResult};
