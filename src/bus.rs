/// Publish/subscribe bus (out-of-scope collaborator, spec.md §1/§6).
///
/// Spec.md treats the bus as an external message queue and only specifies
/// its interface: two topics (`HBApiServers`, `HBDataServers`), publish by
/// topic, and per-subscriber channels named `<ROLE>_<addr-with-no-punctuation>`.
/// `original_source/tools/heartbeat.go` backs this with a real NSQ broker;
/// no message-queue client crate appears anywhere in the example pack, so
/// two implementations are provided behind the same small `Bus` trait:
///
/// - `InProcessBus`, over `tokio::sync::broadcast` — a single process can
///   run both roles sharing one instance; used by the test harness.
/// - `FileBus`, a shared-directory transport — the CLI's two roles
///   (`objmesh frontend` / `objmesh storage`, cli.rs) run as separate OS
///   processes, so an in-process channel can never carry a heartbeat
///   between them. `FileBus` is the default the CLI wires up in
///   `main.rs`: each publish atomically (write-temp, then rename)
///   overwrites a per-publisher file under `<base_dir>/bus/<topic>/`, and
///   each subscription polls that directory on an interval derived from
///   `HB_INTERVAL`. This needs only a filesystem shared between the two
///   processes (already assumed by spec.md §6's persisted layout), not a
///   running broker.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::error::{ObjError, ObjResult};

pub const HB_API_SERVERS: &str = "HBApiServers";
pub const HB_DATA_SERVERS: &str = "HBDataServers";

const CHANNEL_CAPACITY: usize = 1024;

/// Byte offset of the heartbeat wire format's separator (spec.md §4.6),
/// duplicated from `membership.rs` rather than imported to keep the bus
/// transport independent of the message payload it carries.
const TIMESTAMP_LEN: usize = 19;

#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> ObjResult<()>;

    /// `channel` names this subscriber's own queue (spec.md §4.6); the
    /// in-process implementation doesn't need it since every `subscribe`
    /// call gets an independent broadcast receiver, but it's part of the
    /// interface so a real bus client can honor it.
    fn subscribe(&self, topic: &str, channel: &str) -> BusSubscription;
}

enum SubscriptionInner {
    Broadcast(broadcast::Receiver<Vec<u8>>),
    Polled(mpsc::UnboundedReceiver<Vec<u8>>),
}

pub struct BusSubscription {
    inner: SubscriptionInner,
}

impl BusSubscription {
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        match &mut self.inner {
            SubscriptionInner::Broadcast(receiver) => loop {
                match receiver.recv().await {
                    Ok(msg) => return Some(msg),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
            SubscriptionInner::Polled(receiver) => receiver.recv().await,
        }
    }
}

pub struct InProcessBus {
    topics: Mutex<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl InProcessBus {
    pub fn new() -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        let mut topics = self.topics.lock().unwrap();
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for InProcessBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> ObjResult<()> {
        // No receivers yet is not a publish failure; the heartbeat
        // publisher's failure counter is about transport errors, which an
        // in-process channel send cannot produce.
        let _ = self.sender(topic).send(payload);
        Ok(())
    }

    fn subscribe(&self, topic: &str, _channel: &str) -> BusSubscription {
        BusSubscription {
            inner: SubscriptionInner::Broadcast(self.sender(topic).subscribe()),
        }
    }
}

/// Cross-process bus over a shared directory tree. Each topic is a
/// subdirectory of `root`; each publisher owns one file in it, named after
/// the address embedded in its own heartbeat payload, so a node's latest
/// heartbeat overwrites its previous one instead of accumulating. Stale
/// files belonging to a node that stopped publishing are harmless: the
/// consumer still feeds their (increasingly old) timestamp through
/// `Membership::record`, which evicts on staleness exactly as a live
/// subscription would (spec.md §4.6).
pub struct FileBus {
    root: PathBuf,
    poll_interval: Duration,
}

impl FileBus {
    pub fn new(root: PathBuf, poll_interval: Duration) -> Self {
        Self { root, poll_interval }
    }

    fn topic_dir(&self, topic: &str) -> PathBuf {
        self.root.join(topic)
    }
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// Extracts the publisher's identity from a heartbeat payload so its file
/// can be addressed by publisher rather than by message.
fn publisher_key(payload: &[u8]) -> String {
    if payload.len() > TIMESTAMP_LEN {
        sanitize(&String::from_utf8_lossy(&payload[TIMESTAMP_LEN + 1..]))
    } else {
        sanitize(&String::from_utf8_lossy(payload))
    }
}

#[async_trait]
impl Bus for FileBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> ObjResult<()> {
        let dir = self.topic_dir(topic);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| ObjError::Generic(format!("bus publish: {}", e)))?;

        let key = publisher_key(&payload);
        let dest = dir.join(format!("{}.hb", key));
        let tmp = dir.join(format!("{}.hb.tmp", key));
        tokio::fs::write(&tmp, &payload)
            .await
            .map_err(|e| ObjError::Generic(format!("bus publish: {}", e)))?;
        tokio::fs::rename(&tmp, &dest)
            .await
            .map_err(|e| ObjError::Generic(format!("bus publish: {}", e)))?;
        Ok(())
    }

    fn subscribe(&self, topic: &str, _channel: &str) -> BusSubscription {
        let dir = self.topic_dir(topic);
        let poll_interval = self.poll_interval;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                ticker.tick().await;
                let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
                    continue;
                };
                while let Ok(Some(entry)) = entries.next_entry().await {
                    let path = entry.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("hb") {
                        continue;
                    }
                    if let Ok(bytes) = tokio::fs::read(&path).await {
                        if tx.send(bytes).is_err() {
                            return;
                        }
                    }
                }
            }
        });

        BusSubscription {
            inner: SubscriptionInner::Polled(rx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn in_process_publish_subscribe_round_trips() {
        let bus = InProcessBus::new();
        let mut sub = bus.subscribe(HB_API_SERVERS, "DATA_test");
        bus.publish(HB_API_SERVERS, b"hello".to_vec()).await.unwrap();
        assert_eq!(sub.recv().await, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn file_bus_publish_subscribe_round_trips() {
        let dir = tempdir().unwrap();
        let bus = FileBus::new(dir.path().to_path_buf(), Duration::from_millis(20));
        let mut sub = bus.subscribe(HB_DATA_SERVERS, "API_test");

        let msg = format!("{:019},127.0.0.1:9100", 1_700_000_000_000_000_000i64).into_bytes();
        bus.publish(HB_DATA_SERVERS, msg.clone()).await.unwrap();

        let received = sub.recv().await.unwrap();
        assert_eq!(received, msg);
    }

    #[tokio::test]
    async fn file_bus_overwrites_by_publisher_not_by_message() {
        let dir = tempdir().unwrap();
        let bus = FileBus::new(dir.path().to_path_buf(), Duration::from_millis(500));

        let first = format!("{:019},10.0.0.1:9000", 1i64).into_bytes();
        let second = format!("{:019},10.0.0.1:9000", 2i64).into_bytes();
        bus.publish(HB_API_SERVERS, first).await.unwrap();
        bus.publish(HB_API_SERVERS, second).await.unwrap();

        let mut files = tokio::fs::read_dir(dir.path().join(HB_API_SERVERS)).await.unwrap();
        let mut count = 0;
        while files.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }
}
