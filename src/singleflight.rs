/// Admission gate / single-flight dedup — spec.md §4.5's "in-flight write
/// admission" rule.
///
/// Guards against two concurrent uploads of the same content hash racing
/// each other into the shard directories. A hash is admitted once; any
/// second caller is rejected immediately rather than queued, matching
/// spec.md §3's *No duplicate concurrent writes* invariant. Release happens
/// on every exit path via an RAII guard, mirroring the admission-map
/// patterns used throughout `original_source/api/apiserv.go` (`fileMap`).
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::error::{ObjError, ObjResult};

#[derive(Clone, Default)]
pub struct AdmissionGate {
    inflight: Arc<Mutex<HashSet<String>>>,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits `key`, returning a guard that releases it on drop. Errors with
    /// `DuplicateInFlight` if `key` is already admitted.
    pub fn admit(&self, key: &str) -> ObjResult<AdmissionGuard> {
        let mut inflight = self.inflight.lock().unwrap();
        if !inflight.insert(key.to_string()) {
            return Err(ObjError::DuplicateInFlight(key.to_string()));
        }
        Ok(AdmissionGuard {
            inflight: self.inflight.clone(),
            key: key.to_string(),
        })
    }

    #[cfg(test)]
    fn is_admitted(&self, key: &str) -> bool {
        self.inflight.lock().unwrap().contains(key)
    }
}

/// Releases its key from the admission set when dropped, regardless of
/// which exit path (success, error, early return) drops it.
pub struct AdmissionGuard {
    inflight: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for AdmissionGuard {
    fn drop(&mut self) {
        self.inflight.lock().unwrap().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_admit_is_rejected_while_first_holds() {
        let gate = AdmissionGate::new();
        let guard = gate.admit("abc").unwrap();
        assert!(matches!(gate.admit("abc"), Err(ObjError::DuplicateInFlight(_))));
        drop(guard);
        assert!(gate.admit("abc").is_ok());
    }

    #[test]
    fn guard_releases_on_early_return() {
        let gate = AdmissionGate::new();
        fn scoped(gate: &AdmissionGate) -> ObjResult<()> {
            let _guard = gate.admit("xyz")?;
            Err(ObjError::Generic("simulated failure".into()))
        }
        assert!(scoped(&gate).is_err());
        assert!(!gate.is_admitted("xyz"));
    }

    #[test]
    fn distinct_keys_do_not_collide() {
        let gate = AdmissionGate::new();
        let _g1 = gate.admit("a").unwrap();
        let _g2 = gate.admit("b").unwrap();
        assert!(gate.is_admitted("a"));
        assert!(gate.is_admitted("b"));
    }
}
