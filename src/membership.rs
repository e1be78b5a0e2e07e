/// Heartbeat & membership (C4) — spec.md §4.6.
///
/// Each node publishes `<19-digit-nanosecond-timestamp><comma><listen-addr>`
/// to its own role's topic every `HB_INTERVAL`, and consumes the opposite
/// role's topic to maintain a peer→last-seen map with TTL eviction plus a
/// periodic sweep. The wire format and publish-failure backoff are ported
/// from `original_source/tools/heartbeat.go`; the consumer's parse and
/// per-message eviction are ported from `original_source/api/apiserv.go` /
/// `data/dataserv.go`.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::bus::{Bus, BusSubscription};
use crate::error::{ObjError, ObjResult};
use crate::logging::log_membership_event;
use crate::model::{now_nanos, PeerEntry};

/// Byte offset of the separator in the heartbeat wire message; the
/// timestamp occupies `[0, TIMESTAMP_LEN)` and the address starts at
/// `TIMESTAMP_LEN + 1` (spec.md §4.6, resolved against the Go source in
/// SPEC_FULL.md §4.6: the separator is a single ASCII comma).
const TIMESTAMP_LEN: usize = 19;
const SEPARATOR: u8 = b',';

/// Live-set of peers of one role, with staleness eviction and rotating-
/// pointer selection (spec.md §4.4, §9).
pub struct Membership {
    peers: RwLock<HashMap<String, PeerEntry>>,
    peer_ttl: Duration,
    last_used: Mutex<Option<String>>,
}

impl Membership {
    pub fn new(peer_ttl: Duration) -> Self {
        Self {
            peers: RwLock::new(HashMap::new()),
            peer_ttl,
            last_used: Mutex::new(None),
        }
    }

    fn ttl_nanos(&self) -> i64 {
        self.peer_ttl.as_nanos() as i64
    }

    pub async fn record(&self, addr: String, last_seen_nanos: i64) {
        let now = now_nanos();
        if now - last_seen_nanos > self.ttl_nanos() {
            self.evict(&addr).await;
            return;
        }
        let mut peers = self.peers.write().await;
        let is_new = !peers.contains_key(&addr);
        peers.insert(addr.clone(), PeerEntry { last_seen_nanos });
        if is_new {
            log_membership_event("peer joined", &addr);
        }
    }

    pub async fn evict(&self, addr: &str) {
        let mut peers = self.peers.write().await;
        if peers.remove(addr).is_some() {
            log_membership_event("peer evicted (stale heartbeat)", addr);
        }
    }

    /// Peers whose most recent heartbeat is younger than `PEER_TTL`.
    pub async fn live_peers(&self) -> Vec<String> {
        let now = now_nanos();
        let ttl = self.ttl_nanos();
        let peers = self.peers.read().await;
        let mut live: Vec<String> = peers
            .iter()
            .filter(|(_, e)| now - e.last_seen_nanos <= ttl)
            .map(|(addr, _)| addr.clone())
            .collect();
        live.sort();
        live
    }

    /// Removes all entries older than `PEER_TTL`. Runs every
    /// `SWEEP_INTERVAL` (spec.md §4.6).
    pub async fn sweep(&self) {
        let now = now_nanos();
        let ttl = self.ttl_nanos();
        let mut peers = self.peers.write().await;
        peers.retain(|_, e| now - e.last_seen_nanos <= ttl);
    }

    /// Rotating pointer: tries not to repeat the last peer used while at
    /// least one other peer is live (spec.md §4.4/§9, ported from
    /// `original_source/api/client.go`'s `getOneServer`).
    pub async fn select_peer(&self) -> ObjResult<String> {
        let live = self.live_peers().await;
        if live.is_empty() {
            return Err(ObjError::NoLivePeer);
        }
        let mut last = self.last_used.lock().unwrap();
        let chosen = if live.len() > 1 {
            live.iter()
                .find(|p| last.as_deref() != Some(p.as_str()))
                .cloned()
                .unwrap_or_else(|| live[0].clone())
        } else {
            live[0].clone()
        };
        *last = Some(chosen.clone());
        Ok(chosen)
    }
}

/// Publishes this node's heartbeat on `topic` every `interval`, halving the
/// interval and incrementing a failure counter on publish errors; emits a
/// warning once the counter reaches `warn_count` (spec.md §4.6).
pub struct HeartbeatPublisher {
    bus: Arc<dyn Bus>,
    topic: &'static str,
    addr: String,
    interval: Duration,
    warn_count: u32,
}

impl HeartbeatPublisher {
    pub fn new(bus: Arc<dyn Bus>, topic: &'static str, addr: String, interval: Duration, warn_count: u32) -> Self {
        Self {
            bus,
            topic,
            addr,
            interval,
            warn_count,
        }
    }

    fn message(&self) -> Vec<u8> {
        let mut msg = format!("{:019}", now_nanos()).into_bytes();
        msg.push(SEPARATOR);
        msg.extend_from_slice(self.addr.as_bytes());
        msg
    }

    pub async fn run(&self) {
        let mut fail_count: u32 = 0;
        loop {
            match self.bus.publish(self.topic, self.message()).await {
                Ok(()) => {
                    fail_count = 0;
                    tokio::time::sleep(self.interval).await;
                }
                Err(e) => {
                    fail_count += 1;
                    if fail_count >= self.warn_count {
                        warn!("heartbeat publish failed {} times: {}", fail_count, e);
                    }
                    tokio::time::sleep(self.interval / 2).await;
                }
            }
        }
    }
}

/// Parses a heartbeat message into `(timestamp_nanos, peer_addr)`.
pub fn parse_heartbeat(msg: &[u8]) -> ObjResult<(i64, String)> {
    if msg.len() <= TIMESTAMP_LEN || msg[TIMESTAMP_LEN] != SEPARATOR {
        return Err(ObjError::InvalidInput("malformed heartbeat message".into()));
    }
    let ts_str = std::str::from_utf8(&msg[..TIMESTAMP_LEN])
        .map_err(|e| ObjError::InvalidInput(e.to_string()))?;
    let timestamp = ts_str
        .parse::<i64>()
        .map_err(|e| ObjError::InvalidInput(e.to_string()))?;
    let addr = std::str::from_utf8(&msg[TIMESTAMP_LEN + 1..])
        .map_err(|e| ObjError::InvalidInput(e.to_string()))?
        .to_string();
    Ok((timestamp, addr))
}

/// Consumes the opposite role's heartbeat topic, updating `membership`.
pub async fn run_consumer(membership: Arc<Membership>, mut subscription: BusSubscription) {
    while let Some(msg) = subscription.recv().await {
        match parse_heartbeat(&msg) {
            Ok((timestamp, addr)) => membership.record(addr, timestamp).await,
            Err(e) => warn!("dropping malformed heartbeat: {}", e),
        }
    }
}

/// Background sweep, every `SWEEP_INTERVAL` (spec.md §4.6).
pub async fn run_sweeper(membership: Arc<Membership>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        membership.sweep().await;
    }
}

pub fn channel_name(role: &str, addr: &str) -> String {
    let sanitized: String = addr.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    format!("{}_{}", role, sanitized)
}

pub fn log_startup(addr: &str) {
    info!("membership tracking started for {}", addr);
}
