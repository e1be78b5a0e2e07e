/// Frontend service (C6) — spec.md §4.3, §4.4, §4.5.
///
/// PUT/GET/DELETE/checkfile over HTTP, with the admission gate, split,
/// asynchronous shard fan-out, download/repair, and delete passes. Handler
/// shape ported from the teacher's `api_server.rs` upload/download handlers;
/// peer selection and retry topology ported from
/// `original_source/api/core.go` and `api/client.go`.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::codec::Codec;
use crate::error::{ObjError, ObjResult};
use crate::hashio;
use crate::index::{Index, TYPE_FILE};
use crate::logging::{log_error_with_context, log_file_operation, log_placement_event};
use crate::membership::Membership;
use crate::model::{now_nanos, FileDoc, ShardRef};
use crate::response;
use crate::retry::retry_passes;
use crate::singleflight::AdmissionGate;

/// Upload attempt passes per shard (spec.md §4.4/§4.5).
pub const FAIL_ATTEMPTS: usize = 5;
/// Sleep between passes.
pub const PASS_INTERVAL: Duration = Duration::from_secs(1);
/// Per-attempt HTTP timeout for a single shard operation.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct FrontendState {
    pub listen_addr: String,
    pub work_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub index: Index,
    pub gate: AdmissionGate,
    pub membership: Arc<Membership>,
    pub codec: Arc<Codec>,
    pub http: reqwest::Client,
}

impl FrontendState {
    pub fn new(
        listen_addr: String,
        work_dir: PathBuf,
        tmp_dir: PathBuf,
        index: Index,
        membership: Arc<Membership>,
        codec: Arc<Codec>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .expect("reqwest client builds with static config");
        Self {
            listen_addr,
            work_dir,
            tmp_dir,
            index,
            gate: AdmissionGate::new(),
            membership,
            codec,
            http,
        }
    }
}

fn validate_hash(hash: &str) -> ObjResult<()> {
    if hash.len() != 32 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ObjError::InvalidInput("invalid md5".to_string()));
    }
    Ok(())
}

fn shard_dir(work_dir: &Path, hash: &str) -> PathBuf {
    work_dir.join(hash)
}

// ---------------------------------------------------------------------
// PUT /file
// ---------------------------------------------------------------------

pub async fn put_file(State(state): State<FrontendState>, mut multipart: Multipart) -> Response {
    match put_file_inner(state, &mut multipart).await {
        Ok(()) => response::ok("accepted"),
        Err(e) => {
            log_error_with_context("put_file", &e);
            e.into_response()
        }
    }
}

async fn put_file_inner(state: FrontendState, multipart: &mut Multipart) -> ObjResult<()> {
    let mut declared_hash = None;
    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ObjError::InvalidInput(e.to_string()))?
    {
        match field.name().unwrap_or("") {
            "md5" => declared_hash = Some(field.text().await.map_err(|e| ObjError::InvalidInput(e.to_string()))?),
            "uploadfile" => {
                file_bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ObjError::InvalidInput(e.to_string()))?
                        .to_vec(),
                )
            }
            _ => {}
        }
    }

    let declared_hash = declared_hash.ok_or_else(|| ObjError::InvalidInput("missing md5".to_string()))?;
    let file_bytes = file_bytes.ok_or_else(|| ObjError::InvalidInput("missing uploadfile".to_string()))?;
    validate_hash(&declared_hash)?;

    if state.index.exists(TYPE_FILE, &declared_hash)? {
        return Err(ObjError::DuplicateInFlight(declared_hash));
    }

    let guard = state.gate.admit(&declared_hash)?;

    let computed = hashio::hash_bytes(&file_bytes);
    if computed != declared_hash {
        return Err(ObjError::HashMismatch);
    }

    tokio::fs::create_dir_all(&state.tmp_dir).await?;
    let tmp_path = state.tmp_dir.join(format!("upload_{}", uuid::Uuid::new_v4()));
    {
        let mut f = tokio::fs::File::create(&tmp_path).await?;
        f.write_all(&file_bytes).await?;
        f.flush().await?;
    }

    let shard_dir_path = shard_dir(&state.work_dir, &declared_hash);
    let split_result = state.codec.split(&tmp_path, &shard_dir_path, &declared_hash);
    let _ = tokio::fs::remove_file(&tmp_path).await;
    let shard_paths = split_result?;

    let original_size = file_bytes.len() as u64;
    let data_shards = state.codec.data_shards;

    // The response only guarantees admission and split (spec.md §4.3); the
    // fan-out and manifest write run in the background, holding `guard`
    // until they settle so a second concurrent PUT is still rejected.
    tokio::spawn(async move {
        let _guard = guard;
        let base_names: Vec<String> = (0..shard_paths.len())
            .map(|i| format!("{}.{}", declared_hash, i))
            .collect();
        let shard_refs = fan_out_shards(&state, shard_paths, base_names.clone()).await;

        let succeeded = shard_refs.iter().filter(|s| !s.server.is_empty()).count();
        if succeeded < data_shards {
            log_placement_event(
                &declared_hash,
                &format!("only {} of {} shards placed", succeeded, base_names.len()),
            );
            return;
        }

        let doc = FileDoc {
            hash: declared_hash.clone(),
            name: declared_hash.clone(),
            size: original_size,
            created_at: now_nanos(),
            shards: shard_refs,
        };
        match state.index.put(TYPE_FILE, &declared_hash, &doc) {
            Ok(()) => log_file_operation("put", &declared_hash, "manifest written"),
            Err(e) => warn!("failed to write manifest for file {}: {}", declared_hash, e),
        }
    });

    Ok(())
}

/// Places every shard onto a live peer, retrying up to `FAIL_ATTEMPTS`
/// passes with rotating peer selection (spec.md §4.4). Returns one
/// `ShardRef` per input shard in index order; a slot whose placement never
/// succeeded carries an empty `server`.
async fn fan_out_shards(state: &FrontendState, shard_paths: Vec<PathBuf>, base_names: Vec<String>) -> Vec<ShardRef> {
    let total = shard_paths.len();
    let results: Mutex<Vec<Option<ShardRef>>> = Mutex::new(vec![None; total]);
    let mut pending: Vec<usize> = (0..total).collect();

    for pass in 0..FAIL_ATTEMPTS {
        if pending.is_empty() {
            break;
        }
        let mut still_pending = Vec::with_capacity(pending.len());
        for idx in pending {
            match place_one_shard(state, &shard_paths[idx], &base_names[idx]).await {
                Ok(shard_ref) => {
                    results.lock().unwrap()[idx] = Some(shard_ref);
                }
                Err(e) => {
                    warn!("shard placement pass {} failed for index {}: {}", pass + 1, idx, e);
                    still_pending.push(idx);
                }
            }
        }
        pending = still_pending;
        if !pending.is_empty() && pass + 1 < FAIL_ATTEMPTS {
            tokio::time::sleep(PASS_INTERVAL).await;
        }
    }

    let mut results = results.into_inner().unwrap();
    (0..total)
        .map(|i| {
            results[i].take().unwrap_or_else(|| ShardRef {
                hash: String::new(),
                base_name: base_names[i].clone(),
                server: String::new(),
            })
        })
        .collect()
}

async fn place_one_shard(state: &FrontendState, path: &Path, base_name: &str) -> ObjResult<ShardRef> {
    let peer = state.membership.select_peer().await?;
    let hash = hashio::hash_file(path)?;
    upload_shard(&state.http, &peer, base_name, &hash, path).await?;
    Ok(ShardRef {
        hash,
        base_name: base_name.to_string(),
        server: peer,
    })
}

async fn upload_shard(client: &reqwest::Client, peer: &str, base_name: &str, hash: &str, path: &Path) -> ObjResult<()> {
    let bytes = tokio::fs::read(path).await?;
    let form = reqwest::multipart::Form::new()
        .text("md5", hash.to_string())
        .text("path", base_name.to_string())
        .part("uploadfile", reqwest::multipart::Part::bytes(bytes).file_name(base_name.to_string()));

    let resp = client
        .put(format!("http://{}/shard", peer))
        .multipart(form)
        .send()
        .await
        .map_err(|e| ObjError::StorageBackend(e.to_string()))?;

    if resp.status().is_success() {
        Ok(())
    } else {
        Err(ObjError::StorageBackend(format!("peer {} returned {}", peer, resp.status())))
    }
}

// ---------------------------------------------------------------------
// GET /file
// ---------------------------------------------------------------------

#[derive(Deserialize)]
pub struct FileQuery {
    md5: String,
}

pub async fn get_file(State(state): State<FrontendState>, Query(query): Query<FileQuery>) -> Response {
    match get_file_inner(state, query).await {
        Ok(bytes) => bytes.into_response(),
        Err(e) => {
            log_error_with_context("get_file", &e);
            e.into_response()
        }
    }
}

async fn get_file_inner(state: FrontendState, query: FileQuery) -> ObjResult<Vec<u8>> {
    validate_hash(&query.md5)?;
    let doc: FileDoc = state
        .index
        .get(TYPE_FILE, &query.md5)?
        .ok_or_else(|| ObjError::NotFound(format!("file {}", query.md5)))?;

    let dir = shard_dir(&state.work_dir, &query.md5);
    tokio::fs::create_dir_all(&dir).await?;

    let missing: Vec<ShardRef> = {
        let mut missing = Vec::new();
        for shard in &doc.shards {
            if shard.server.is_empty() {
                continue;
            }
            let local_path = dir.join(&shard.base_name);
            let has_local = tokio::fs::metadata(&local_path)
                .await
                .map(|m| m.len() > 0)
                .unwrap_or(false);
            if !has_local {
                missing.push(shard.clone());
            }
        }
        missing
    };

    let dir_for_download = dir.clone();
    let state_for_download = state.clone();
    let failures = retry_passes(missing, FAIL_ATTEMPTS, PASS_INTERVAL, move |shard: ShardRef| {
        let state = state_for_download.clone();
        let dir = dir_for_download.clone();
        async move { download_one_shard(&state, &shard, &dir).await }
    })
    .await;

    if !failures.is_empty() {
        warn!("{} shard(s) could not be downloaded for file {}", failures.len(), query.md5);
    }

    let present = {
        let mut count = 0;
        for i in 0..state.codec.total_shards() {
            let path = dir.join(format!("{}.{}", query.md5, i));
            if tokio::fs::metadata(&path).await.map(|m| m.len() > 0).unwrap_or(false) {
                count += 1;
            }
        }
        count
    };
    if present < state.codec.data_shards {
        return Err(ObjError::InsufficientShards);
    }

    let mut out = Vec::new();
    state.codec.generate_file(&dir, &query.md5, doc.size, &mut out)?;
    Ok(out)
}

async fn download_one_shard(state: &FrontendState, shard: &ShardRef, dir: &Path) -> ObjResult<()> {
    let check_url = format!("http://{}/checkshard?md5={}", shard.server, shard.hash);
    let resp: response::Envelope = state
        .http
        .get(&check_url)
        .send()
        .await
        .map_err(|e| ObjError::StorageBackend(e.to_string()))?
        .json()
        .await
        .map_err(|e| ObjError::StorageBackend(e.to_string()))?;

    if resp.code != 302 {
        return Err(ObjError::StorageBackend(format!("checkshard failed with code {}", resp.code)));
    }
    let token = resp
        .msg
        .as_str()
        .ok_or_else(|| ObjError::StorageBackend("checkshard returned no token".to_string()))?
        .to_string();

    let shard_url = format!("http://{}/shard?token={}", shard.server, token);
    let bytes = state
        .http
        .get(&shard_url)
        .send()
        .await
        .map_err(|e| ObjError::StorageBackend(e.to_string()))?
        .bytes()
        .await
        .map_err(|e| ObjError::StorageBackend(e.to_string()))?;

    tokio::fs::write(dir.join(&shard.base_name), &bytes).await?;
    Ok(())
}

// ---------------------------------------------------------------------
// DELETE /file
// ---------------------------------------------------------------------

#[derive(Deserialize)]
pub struct DeleteFileForm {
    md5: String,
}

pub async fn delete_file(State(state): State<FrontendState>, axum::Form(form): axum::Form<DeleteFileForm>) -> Response {
    match delete_file_inner(state, form).await {
        Ok(()) => response::ok("success"),
        Err(e) => {
            log_error_with_context("delete_file", &e);
            e.into_response()
        }
    }
}

async fn delete_file_inner(state: FrontendState, form: DeleteFileForm) -> ObjResult<()> {
    validate_hash(&form.md5)?;
    let Some(doc): Option<FileDoc> = state.index.get(TYPE_FILE, &form.md5)? else {
        // Idempotent: deleting a manifest that's already gone is a success.
        return Ok(());
    };

    let placed: Vec<ShardRef> = doc.shards.iter().filter(|s| !s.server.is_empty()).cloned().collect();
    let state_for_delete = state.clone();
    let failures = retry_passes(placed, FAIL_ATTEMPTS, PASS_INTERVAL, move |shard: ShardRef| {
        let state = state_for_delete.clone();
        async move { delete_one_shard(&state, &shard).await }
    })
    .await;

    if !failures.is_empty() {
        warn!("{} shard(s) could not be deleted for file {}; manifest retained", failures.len(), form.md5);
        return Err(ObjError::StorageBackend("partial shard delete failure".to_string()));
    }

    state.index.delete(TYPE_FILE, &form.md5)?;
    let materialized = shard_dir(&state.work_dir, &form.md5);
    if materialized.exists() {
        let _ = tokio::fs::remove_dir_all(&materialized).await;
    }
    Ok(())
}

async fn delete_one_shard(state: &FrontendState, shard: &ShardRef) -> ObjResult<()> {
    let resp = state
        .http
        .delete(format!("http://{}/shard", shard.server))
        .form(&[("md5", shard.hash.as_str()), ("path", shard.base_name.as_str())])
        .send()
        .await
        .map_err(|e| ObjError::StorageBackend(e.to_string()))?;

    if resp.status().is_success() {
        Ok(())
    } else {
        Err(ObjError::StorageBackend(format!("peer {} returned {}", shard.server, resp.status())))
    }
}

// ---------------------------------------------------------------------
// GET /checkfile
// ---------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CheckFileQuery {
    md5: String,
}

pub async fn check_file(State(state): State<FrontendState>, Query(query): Query<CheckFileQuery>) -> Response {
    match check_file_inner(state, query).await {
        Ok(doc) => response::ok_json(doc),
        Err(e) => {
            log_error_with_context("check_file", &e);
            e.into_response()
        }
    }
}

async fn check_file_inner(state: FrontendState, query: CheckFileQuery) -> ObjResult<FileDoc> {
    validate_hash(&query.md5)?;
    state
        .index
        .get(TYPE_FILE, &query.md5)?
        .ok_or_else(|| ObjError::NotFound(format!("file {}", query.md5)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_hash() {
        assert!(matches!(validate_hash("short"), Err(ObjError::InvalidInput(_))));
    }

    #[test]
    fn shard_dir_is_scoped_per_hash() {
        let work = PathBuf::from("/work");
        let hash = "a".repeat(32);
        assert_eq!(shard_dir(&work, &hash), work.join(&hash));
    }
}
