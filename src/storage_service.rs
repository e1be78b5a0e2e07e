/// Storage node service (C5) — spec.md §4.2.
///
/// Handlers for shard PUT/DELETE/GET and checkshard, ported from the
/// teacher's `api_server.rs` multipart-upload/download handler shape
/// (`upload_file`/`download_file`) and grounded in semantics on
/// `original_source/data/core.go` / `data/dataserv.go`.
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::error::{ObjError, ObjResult};
use crate::hashio;
use crate::index::{Index, TYPE_SHARD};
use crate::logging::{log_error_with_context, log_shard_operation};
use crate::model::{now_nanos, ShardDoc};
use crate::response;
use crate::singleflight::AdmissionGate;
use crate::token::TokenTable;

/// Token lifetime for a minted shard-read credential (spec.md §4.7).
pub const TOKEN_TTL: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct StorageState {
    pub listen_addr: String,
    pub node_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub index: Index,
    pub gate: AdmissionGate,
    pub tokens: Arc<TokenTable>,
}

impl StorageState {
    pub fn new(listen_addr: String, node_dir: PathBuf, tmp_dir: PathBuf, index: Index) -> Self {
        Self {
            listen_addr,
            node_dir,
            tmp_dir,
            index,
            gate: AdmissionGate::new(),
            tokens: Arc::new(TokenTable::new(TOKEN_TTL)),
        }
    }
}

fn validate_hash(hash: &str) -> ObjResult<()> {
    if hash.len() != 32 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ObjError::InvalidInput("invalid md5".to_string()));
    }
    Ok(())
}

/// `PUT /shard` — form fields `md5`, `path`, `uploadfile`.
pub async fn put_shard(State(state): State<StorageState>, mut multipart: Multipart) -> Response {
    match put_shard_inner(state, &mut multipart).await {
        Ok(()) => response::ok("success"),
        Err(e) => {
            log_error_with_context("put_shard", &e);
            e.into_response()
        }
    }
}

async fn put_shard_inner(state: StorageState, multipart: &mut Multipart) -> ObjResult<()> {
    let mut declared_hash = None;
    let mut path = None;
    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ObjError::InvalidInput(e.to_string()))?
    {
        match field.name().unwrap_or("") {
            "md5" => declared_hash = Some(field.text().await.map_err(|e| ObjError::InvalidInput(e.to_string()))?),
            "path" => path = Some(field.text().await.map_err(|e| ObjError::InvalidInput(e.to_string()))?),
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
    let path = path.ok_or_else(|| ObjError::InvalidInput("missing path".to_string()))?;
    let file_bytes = file_bytes.ok_or_else(|| ObjError::InvalidInput("missing uploadfile".to_string()))?;

    validate_hash(&declared_hash)?;
    let _guard = state.gate.admit(&declared_hash)?;

    tokio::fs::create_dir_all(&state.tmp_dir).await?;
    let tmp_path = state.tmp_dir.join(&path);
    if let Some(parent) = tmp_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let cleanup = |p: PathBuf| async move {
        let _ = tokio::fs::remove_file(&p).await;
    };

    let computed_hash = {
        let mut f = tokio::fs::File::create(&tmp_path).await?;
        f.write_all(&file_bytes).await?;
        f.flush().await?;
        hashio::hash_bytes(&file_bytes)
    };

    if computed_hash != declared_hash {
        cleanup(tmp_path).await;
        return Err(ObjError::HashMismatch);
    }

    let doc = ShardDoc {
        hash: declared_hash.clone(),
        base_name: path.clone(),
        server: state.listen_addr.clone(),
        size: file_bytes.len() as u64,
        created_at: now_nanos(),
    };

    if let Err(e) = state.index.put(TYPE_SHARD, &declared_hash, &doc) {
        cleanup(tmp_path).await;
        return Err(e);
    }

    let dest_path = state.node_dir.join(&path);
    if let Err(e) = hashio::atomic_move(&tmp_path, &dest_path) {
        cleanup(tmp_path).await;
        return Err(e);
    }

    log_shard_operation("put", &declared_hash, &format!("stored at {:?}", dest_path));
    Ok(())
}

#[derive(Deserialize)]
pub struct DeleteShardForm {
    md5: String,
    path: String,
}

/// `DELETE /shard` — idempotent regardless of whether the document or file
/// existed (spec.md §4.2).
pub async fn delete_shard(State(state): State<StorageState>, axum::Form(form): axum::Form<DeleteShardForm>) -> Response {
    match delete_shard_inner(state, form).await {
        Ok(()) => response::ok("success"),
        Err(e) => {
            log_error_with_context("delete_shard", &e);
            e.into_response()
        }
    }
}

async fn delete_shard_inner(state: StorageState, form: DeleteShardForm) -> ObjResult<()> {
    validate_hash(&form.md5)?;
    state.index.delete(TYPE_SHARD, &form.md5)?;
    let file_path = state.node_dir.join(&form.path);
    match tokio::fs::remove_file(&file_path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[derive(Deserialize)]
pub struct CheckShardQuery {
    md5: String,
}

/// `GET /checkshard?md5=…` — mints a one-shot token on hit (spec.md §4.2).
pub async fn check_shard(State(state): State<StorageState>, Query(query): Query<CheckShardQuery>) -> Response {
    match check_shard_inner(state, query).await {
        Ok(token) => response::envelope(302, token),
        Err(e) => {
            log_error_with_context("check_shard", &e);
            e.into_response()
        }
    }
}

async fn check_shard_inner(state: StorageState, query: CheckShardQuery) -> ObjResult<String> {
    validate_hash(&query.md5)?;
    let doc: ShardDoc = state
        .index
        .get(TYPE_SHARD, &query.md5)?
        .ok_or_else(|| ObjError::NotFound(format!("shard {}", query.md5)))?;

    let file_path = state.node_dir.join(&doc.base_name);
    let on_disk = hashio::hash_file(&file_path)?;
    if on_disk != doc.hash {
        return Err(ObjError::StorageBackend("shard hash mismatch on disk".to_string()));
    }

    Ok(state.tokens.issue(file_path))
}

#[derive(Deserialize)]
pub struct GetShardQuery {
    token: String,
}

/// `GET /shard?token=…` — streams the shard body and consumes the token.
pub async fn get_shard(State(state): State<StorageState>, Query(query): Query<GetShardQuery>) -> Response {
    let Some(path) = state.tokens.take(&query.token) else {
        return ObjError::NotFound("token".to_string()).into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => bytes.into_response(),
        Err(e) => {
            let err = ObjError::Io(e.to_string());
            log_error_with_context("get_shard", &err);
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_hash() {
        assert!(matches!(validate_hash("abc"), Err(ObjError::InvalidInput(_))));
    }

    #[test]
    fn rejects_non_hex_hash() {
        let bogus = "g".repeat(32);
        assert!(matches!(validate_hash(&bogus), Err(ObjError::InvalidInput(_))));
    }

    #[test]
    fn accepts_well_formed_hash() {
        let ok = "a".repeat(32);
        assert!(validate_hash(&ok).is_ok());
    }
}
