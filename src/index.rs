/// Metadata index adapter (C3) — spec.md §4's "Metadata index adapter" row.
///
/// A typed document store keyed by `(type, id)`, backed by `sled` — the same
/// embedded key-value store the teacher uses for its DHT record cache
/// (`persistent_dht.rs`). Spec.md §1 treats the index's backing store as an
/// external collaborator; this is the minimal concrete adapter behind that
/// boundary, storing each document as a serde-json blob under a
/// `"<type>:<id>"` key (matching spec.md §6's "Documents are keyed by
/// `(type, id)`").
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

use crate::error::ObjResult;

pub const TYPE_FILE: &str = "file";
pub const TYPE_SHARD: &str = "shard";
#[allow(dead_code)] // reserved, unused by the core per spec.md §6
pub const TYPE_USER: &str = "user";

#[derive(Clone)]
pub struct Index {
    db: sled::Db,
}

fn doc_key(doc_type: &str, id: &str) -> String {
    format!("{}:{}", doc_type, id)
}

impl Index {
    pub fn open(path: &Path) -> ObjResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    pub fn put<T: Serialize>(&self, doc_type: &str, id: &str, doc: &T) -> ObjResult<()> {
        let bytes = serde_json::to_vec(doc)?;
        self.db.insert(doc_key(doc_type, id), bytes)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, doc_type: &str, id: &str) -> ObjResult<Option<T>> {
        match self.db.get(doc_key(doc_type, id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn exists(&self, doc_type: &str, id: &str) -> ObjResult<bool> {
        Ok(self.db.contains_key(doc_key(doc_type, id))?)
    }

    /// Idempotent: returns Ok whether or not the document existed.
    pub fn delete(&self, doc_type: &str, id: &str) -> ObjResult<()> {
        self.db.remove(doc_key(doc_type, id))?;
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Doc {
        value: u32,
    }

    #[test]
    fn hash_uniqueness_across_types() {
        let dir = tempdir().unwrap();
        let index = Index::open(&dir.path().join("db")).unwrap();

        index.put(TYPE_FILE, "abc", &Doc { value: 1 }).unwrap();
        index.put(TYPE_SHARD, "abc", &Doc { value: 2 }).unwrap();

        let file: Doc = index.get(TYPE_FILE, "abc").unwrap().unwrap();
        let shard: Doc = index.get(TYPE_SHARD, "abc").unwrap().unwrap();
        assert_eq!(file.value, 1);
        assert_eq!(shard.value, 2);
    }

    #[test]
    fn delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let index = Index::open(&dir.path().join("db")).unwrap();
        index.put(TYPE_SHARD, "x", &Doc { value: 7 }).unwrap();

        index.delete(TYPE_SHARD, "x").unwrap();
        index.delete(TYPE_SHARD, "x").unwrap();
        assert!(!index.exists(TYPE_SHARD, "x").unwrap());
    }
}
