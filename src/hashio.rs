/// Hash/stream utility (C2) — spec.md §4's "Hash/stream utility" row.
///
/// A 128-bit streaming content digest (32 hex characters, matching the wire
/// protocol's `md5` parameter name per spec.md §9 — any 128-bit hex digest
/// satisfies the interface, so this truncates the teacher's `blake3` digest
/// to its first 16 bytes rather than reaching for an actual MD5
/// implementation), a tee-copy that hashes while writing, and an atomic
/// file move that falls back to copy-then-delete across devices — ported
/// from `original_source/tools/tools.go`'s `Storage`, `MD5AndStorage`, and
/// `MoveFile`.
use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::ObjResult;

const BUF_SIZE: usize = 64 * 1024;

/// Hex-encoded 128-bit digest of `data`.
pub fn hash_bytes(data: &[u8]) -> String {
    let full = blake3::hash(data);
    hex::encode(&full.as_bytes()[..16])
}

/// Streams `reader` into `writer`, returning the 128-bit hex digest of the
/// bytes that passed through. Used both to hash an upload while spooling it
/// to a temp file, and to re-hash a shard already on disk.
pub fn tee_hash_copy(mut reader: impl Read, mut writer: impl Write) -> ObjResult<String> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        hasher.update(&buf[..n]);
    }
    let full = hasher.finalize();
    Ok(hex::encode(&full.as_bytes()[..16]))
}

/// Hashes a file already on disk without rewriting it.
pub fn hash_file(path: &Path) -> ObjResult<String> {
    let f = fs::File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let mut reader = io::BufReader::with_capacity(BUF_SIZE, f);
    let mut buf = [0u8; BUF_SIZE];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let full = hasher.finalize();
    Ok(hex::encode(&full.as_bytes()[..16]))
}

/// Moves `src` to `dest`, renaming when possible and falling back to
/// copy-then-delete when they live on different devices.
pub fn atomic_move(src: &Path, dest: &Path) -> ObjResult<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dest)?;
            fs::remove_file(src)?;
            Ok(())
        }
    }
}
