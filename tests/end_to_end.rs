//! Cross-component scenarios exercising the full frontend/storage HTTP
//! round trip, matching the S1-S6 scenario shapes. Storage nodes and the
//! frontend are real `axum` servers bound to ephemeral localhost ports;
//! membership is seeded directly (bypassing the heartbeat bus) so peer
//! liveness is deterministic for the assertions below.

use std::sync::Arc;
use std::time::Duration;

use objmesh::codec::Codec;
use objmesh::frontend_service::FrontendState;
use objmesh::index::Index;
use objmesh::membership::Membership;
use objmesh::router;
use objmesh::storage_service::StorageState;
use tempfile::tempdir;

const DATA_SHARDS: usize = 4;
const PARITY_SHARDS: usize = 2;

struct StorageNode {
    addr: String,
    handle: tokio::task::JoinHandle<()>,
}

async fn spawn_storage_node(root: &std::path::Path, idx: usize) -> StorageNode {
    let node_dir = root.join(format!("storage-{}", idx));
    let tmp_dir = node_dir.join("tmp");
    tokio::fs::create_dir_all(&tmp_dir).await.unwrap();
    let index = Index::open(&node_dir.join("index")).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    let state = StorageState::new(addr.clone(), node_dir, tmp_dir, index);
    let app = router::storage_router(state, Duration::from_secs(10));

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    StorageNode { addr, handle }
}

struct Harness {
    root: tempfile::TempDir,
    storage_nodes: Vec<StorageNode>,
    membership: Arc<Membership>,
    frontend_addr: String,
    index: Index,
}

async fn spawn_harness(n_storage: usize) -> Harness {
    let root = tempdir().unwrap();

    let mut storage_nodes = Vec::new();
    for i in 0..n_storage {
        storage_nodes.push(spawn_storage_node(root.path(), i).await);
    }

    let membership = Arc::new(Membership::new(Duration::from_secs(60)));
    let now = objmesh::model::now_nanos();
    for node in &storage_nodes {
        membership.record(node.addr.clone(), now).await;
    }

    let frontend_dir = root.path().join("frontend");
    let tmp_dir = frontend_dir.join("tmp");
    tokio::fs::create_dir_all(&tmp_dir).await.unwrap();
    let index = Index::open(&frontend_dir.join("index")).unwrap();
    let codec = Arc::new(Codec::new(DATA_SHARDS, PARITY_SHARDS).unwrap());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let frontend_addr = listener.local_addr().unwrap().to_string();

    let state = FrontendState::new(
        frontend_addr.clone(),
        frontend_dir,
        tmp_dir,
        index.clone(),
        membership.clone(),
        codec,
    );
    let app = router::frontend_router(state, Duration::from_secs(10));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Harness {
        root,
        storage_nodes,
        membership,
        frontend_addr,
        index,
    }
}

fn random_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

async fn put_file(client: &reqwest::Client, frontend_addr: &str, hash: &str, bytes: Vec<u8>) -> reqwest::Response {
    let form = reqwest::multipart::Form::new()
        .text("md5", hash.to_string())
        .part("uploadfile", reqwest::multipart::Part::bytes(bytes).file_name("input.bin"));
    client
        .put(format!("http://{}/file", frontend_addr))
        .multipart(form)
        .send()
        .await
        .unwrap()
}

async fn wait_for_manifest(index: &Index, hash: &str, timeout: Duration) -> bool {
    let start = tokio::time::Instant::now();
    loop {
        if index.exists(objmesh::index::TYPE_FILE, hash).unwrap() {
            return true;
        }
        if start.elapsed() > timeout {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// S1: PUT succeeds, and within a couple seconds the manifest carries
/// D+P ShardRefs.
#[tokio::test]
async fn s1_put_produces_full_manifest() {
    let harness = spawn_harness(6).await;
    let client = reqwest::Client::new();

    let data = random_bytes(256 * 1024);
    let hash = objmesh::hashio::hash_bytes(&data);

    let resp = put_file(&client, &harness.frontend_addr, &hash, data).await;
    assert!(resp.status().is_success());

    assert!(wait_for_manifest(&harness.index, &hash, Duration::from_secs(5)).await);

    let doc: objmesh::model::FileDoc = harness.index.get(objmesh::index::TYPE_FILE, &hash).unwrap().unwrap();
    assert_eq!(doc.shards.len(), DATA_SHARDS + PARITY_SHARDS);
    assert!(doc.shards.iter().all(|s| !s.server.is_empty()));
}

/// S2: after S1, killing up to P storage nodes still allows exact
/// reconstruction on GET.
#[tokio::test]
async fn s2_survives_p_node_loss() {
    let mut harness = spawn_harness(6).await;
    let client = reqwest::Client::new();

    let data = random_bytes(300 * 1024);
    let hash = objmesh::hashio::hash_bytes(&data);
    let resp = put_file(&client, &harness.frontend_addr, &hash, data.clone()).await;
    assert!(resp.status().is_success());
    assert!(wait_for_manifest(&harness.index, &hash, Duration::from_secs(5)).await);

    for node in harness.storage_nodes.drain(0..PARITY_SHARDS) {
        node.handle.abort();
    }

    let resp = client
        .get(format!("http://{}/file?md5={}", harness.frontend_addr, hash))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    let body = resp.bytes().await.unwrap();
    assert_eq!(body.as_ref(), data.as_slice());
}

/// S3: losing more than P storage nodes makes the file unrecoverable.
#[tokio::test]
async fn s3_insufficient_shards_after_losing_too_many_nodes() {
    let mut harness = spawn_harness(6).await;
    let client = reqwest::Client::new();

    let data = random_bytes(200 * 1024);
    let hash = objmesh::hashio::hash_bytes(&data);
    let resp = put_file(&client, &harness.frontend_addr, &hash, data).await;
    assert!(resp.status().is_success());
    assert!(wait_for_manifest(&harness.index, &hash, Duration::from_secs(5)).await);

    for node in harness.storage_nodes.drain(0..PARITY_SHARDS + 1) {
        node.handle.abort();
    }

    let resp = client
        .get(format!("http://{}/file?md5={}", harness.frontend_addr, hash))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 500);
    let body: objmesh::response::Envelope = resp.json().await.unwrap();
    assert_eq!(body.code, 500);
}

/// S4: a second concurrent PUT of the same hash is rejected while the
/// first is still in flight, leaving exactly one manifest.
#[tokio::test]
async fn s4_concurrent_put_of_same_hash_is_rejected() {
    let harness = spawn_harness(6).await;
    let client = reqwest::Client::new();

    let data = random_bytes(512 * 1024);
    let hash = objmesh::hashio::hash_bytes(&data);

    let (first, second) = tokio::join!(
        put_file(&client, &harness.frontend_addr, &hash, data.clone()),
        put_file(&client, &harness.frontend_addr, &hash, data.clone()),
    );

    let first_code: objmesh::response::Envelope = first.json().await.unwrap();
    let second_code: objmesh::response::Envelope = second.json().await.unwrap();

    // Exactly one of the two admissions should have been rejected as a
    // duplicate in-flight operation.
    assert!(first_code.code == 500 || second_code.code == 500);
    assert!(wait_for_manifest(&harness.index, &hash, Duration::from_secs(5)).await);
}

/// S5: PUT then DELETE then DELETE again both succeed; GET afterward 404s.
#[tokio::test]
async fn s5_delete_is_idempotent_and_get_then_404s() {
    let harness = spawn_harness(6).await;
    let client = reqwest::Client::new();

    let data = random_bytes(128 * 1024);
    let hash = objmesh::hashio::hash_bytes(&data);
    let resp = put_file(&client, &harness.frontend_addr, &hash, data).await;
    assert!(resp.status().is_success());
    assert!(wait_for_manifest(&harness.index, &hash, Duration::from_secs(5)).await);

    let delete_once = client
        .delete(format!("http://{}/file", harness.frontend_addr))
        .form(&[("md5", hash.as_str())])
        .send()
        .await
        .unwrap();
    assert!(delete_once.status().is_success());

    let delete_twice = client
        .delete(format!("http://{}/file", harness.frontend_addr))
        .form(&[("md5", hash.as_str())])
        .send()
        .await
        .unwrap();
    assert!(delete_twice.status().is_success());

    let get_after = client
        .get(format!("http://{}/file?md5={}", harness.frontend_addr, hash))
        .send()
        .await
        .unwrap();
    assert_eq!(get_after.status().as_u16(), 404);
}

/// S6: membership TTL governs peer selection once heartbeats stop.
#[tokio::test]
async fn s6_stale_peer_is_not_selected() {
    let membership = Membership::new(Duration::from_millis(50));
    let now = objmesh::model::now_nanos();
    membership.record("dead:1".to_string(), now).await;
    membership.record("alive:2".to_string(), now).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    membership.record("alive:2".to_string(), objmesh::model::now_nanos()).await;
    membership.sweep().await;

    let live = membership.live_peers().await;
    assert_eq!(live, vec!["alive:2".to_string()]);
}
