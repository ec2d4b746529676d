//! Persistence contract and the in-memory reference store.
//!
//! The registry never talks to a database directly; it runs against the
//! [`PoolStore`] trait and the surrounding application injects whatever
//! backend it has. [`MemoryStore`] is the reference implementation used by
//! the CLI and the tests, with [`RegistrySnapshot`] as its JSON-friendly
//! import/export image.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::types::{AddressAssignment, AddressPool};

/// Failures surfaced by a store implementation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    #[error("Assignment not found: {0}")]
    AssignmentNotFound(String),

    #[error("Pool {pool_id} changed underneath the write (expected version {expected})")]
    VersionConflict { pool_id: String, expected: u64 },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Storage contract the registry runs against.
///
/// Write methods are version-guarded: an update whose `pool.version` does
/// not match the stored version must be rejected with
/// [`StoreError::VersionConflict`] and must leave the store untouched. On
/// success the store bumps the persisted version, so every committed write
/// moves the token forward exactly once.
pub trait PoolStore: Send + Sync {
    /// All pools, in ascending `start_ip` order
    fn load_pools(&self) -> Result<Vec<AddressPool>, StoreError>;

    /// One pool by id
    fn load_pool(&self, pool_id: &str) -> Result<AddressPool, StoreError>;

    /// Insert a new pool, or update an existing one under the version guard
    fn save_pool(&self, pool: &AddressPool) -> Result<(), StoreError>;

    /// The active assignments of one pool, in ascending address order
    fn load_active_assignments(&self, pool_id: &str)
        -> Result<Vec<AddressAssignment>, StoreError>;

    /// One assignment by id, active or not
    fn load_assignment(&self, assignment_id: &str) -> Result<AddressAssignment, StoreError>;

    /// Insert or update an assignment record on its own.
    ///
    /// For writes that also move pool counters, use
    /// [`commit_pool_and_assignment`](Self::commit_pool_and_assignment)
    /// instead; a lone `save_assignment` is for record corrections.
    fn save_assignment(&self, assignment: &AddressAssignment) -> Result<(), StoreError>;

    /// Persist a pool update and one assignment as a single atomic unit:
    /// both land or neither does, guarded by `pool.version`. Allocation and
    /// release both commit through here.
    fn commit_pool_and_assignment(
        &self,
        pool: &AddressPool,
        assignment: &AddressAssignment,
    ) -> Result<(), StoreError>;
}

/// Serialized image of a store: every pool and every assignment record.
///
/// The `wanpool` CLI round-trips this as JSON between invocations and
/// `pool-auditor` audits it offline.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub pools: Vec<AddressPool>,
    pub assignments: Vec<AddressAssignment>,
}

/// Mutex-guarded in-memory store for single-process deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    pools: HashMap<String, AddressPool>,
    assignments: HashMap<String, AddressAssignment>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot, keeping record versions as they are
    pub fn from_snapshot(snapshot: RegistrySnapshot) -> Self {
        let mut inner = MemoryStoreInner::default();
        for pool in snapshot.pools {
            inner.pools.insert(pool.id.clone(), pool);
        }
        for assignment in snapshot.assignments {
            inner.assignments.insert(assignment.id.clone(), assignment);
        }
        MemoryStore {
            inner: Mutex::new(inner),
        }
    }

    /// Export every record. Pools come out in ascending start order and
    /// assignments in id order so consecutive snapshots diff cleanly.
    pub fn snapshot(&self) -> Result<RegistrySnapshot, StoreError> {
        let inner = self.guard()?;
        let mut pools: Vec<AddressPool> = inner.pools.values().cloned().collect();
        pools.sort_by_key(|pool| u32::from(pool.start_ip));
        let mut assignments: Vec<AddressAssignment> =
            inner.assignments.values().cloned().collect();
        assignments.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(RegistrySnapshot { pools, assignments })
    }

    fn guard(&self) -> Result<MutexGuard<'_, MemoryStoreInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("Store mutex poisoned".to_string()))
    }
}

impl MemoryStoreInner {
    /// Version check shared by both write paths. Unknown ids are inserts
    /// and always pass; known ids must present the stored version.
    fn check_pool_version(&self, pool: &AddressPool) -> Result<(), StoreError> {
        match self.pools.get(&pool.id) {
            Some(existing) if existing.version != pool.version => {
                Err(StoreError::VersionConflict {
                    pool_id: pool.id.clone(),
                    expected: existing.version,
                })
            }
            _ => Ok(()),
        }
    }

    fn store_pool(&mut self, pool: &AddressPool) {
        let mut stored = pool.clone();
        stored.version = pool.version + 1;
        self.pools.insert(stored.id.clone(), stored);
    }
}

impl PoolStore for MemoryStore {
    fn load_pools(&self) -> Result<Vec<AddressPool>, StoreError> {
        let inner = self.guard()?;
        let mut pools: Vec<AddressPool> = inner.pools.values().cloned().collect();
        pools.sort_by_key(|pool| u32::from(pool.start_ip));
        Ok(pools)
    }

    fn load_pool(&self, pool_id: &str) -> Result<AddressPool, StoreError> {
        let inner = self.guard()?;
        inner
            .pools
            .get(pool_id)
            .cloned()
            .ok_or_else(|| StoreError::PoolNotFound(pool_id.to_string()))
    }

    fn save_pool(&self, pool: &AddressPool) -> Result<(), StoreError> {
        let mut inner = self.guard()?;
        inner.check_pool_version(pool)?;
        inner.store_pool(pool);
        Ok(())
    }

    fn load_active_assignments(
        &self,
        pool_id: &str,
    ) -> Result<Vec<AddressAssignment>, StoreError> {
        let inner = self.guard()?;
        if !inner.pools.contains_key(pool_id) {
            return Err(StoreError::PoolNotFound(pool_id.to_string()));
        }
        let mut active: Vec<AddressAssignment> = inner
            .assignments
            .values()
            .filter(|a| a.pool_id == pool_id && a.is_active)
            .cloned()
            .collect();
        active.sort_by_key(|a| u32::from(a.assigned_ip));
        Ok(active)
    }

    fn load_assignment(&self, assignment_id: &str) -> Result<AddressAssignment, StoreError> {
        let inner = self.guard()?;
        inner
            .assignments
            .get(assignment_id)
            .cloned()
            .ok_or_else(|| StoreError::AssignmentNotFound(assignment_id.to_string()))
    }

    fn save_assignment(&self, assignment: &AddressAssignment) -> Result<(), StoreError> {
        let mut inner = self.guard()?;
        inner
            .assignments
            .insert(assignment.id.clone(), assignment.clone());
        Ok(())
    }

    fn commit_pool_and_assignment(
        &self,
        pool: &AddressPool,
        assignment: &AddressAssignment,
    ) -> Result<(), StoreError> {
        // One guard for the whole unit keeps the two writes atomic.
        let mut inner = self.guard()?;
        inner.check_pool_version(pool)?;
        inner.store_pool(pool);
        inner
            .assignments
            .insert(assignment.id.clone(), assignment.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::types::CustomerClass;
    use chrono::Utc;
    use std::net::Ipv4Addr;

    fn addr(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn pool(id: &str, start: &str, end: &str) -> AddressPool {
        AddressPool::new(
            id,
            "east",
            CustomerClass::Residential,
            addr(start),
            addr(end),
            24,
            None,
        )
        .unwrap()
    }

    fn assignment(id: &str, pool_id: &str, ip: &str, active: bool) -> AddressAssignment {
        AddressAssignment {
            id: id.to_string(),
            pool_id: pool_id.to_string(),
            account_id: "acct-7".to_string(),
            assigned_ip: addr(ip),
            assigned_gateway: addr("10.0.0.1"),
            is_active: active,
            assigned_at: Utc::now(),
            deactivated_at: None,
        }
    }

    #[test]
    fn test_save_and_load_pool_bumps_version() {
        let store = MemoryStore::new();
        let p = pool("p1", "10.0.0.0", "10.0.0.255");
        store.save_pool(&p).unwrap();

        let loaded = store.load_pool("p1").unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.start_ip, p.start_ip);
    }

    #[test]
    fn test_load_missing_pool() {
        let store = MemoryStore::new();
        assert_eq!(
            store.load_pool("nope").unwrap_err(),
            StoreError::PoolNotFound("nope".to_string())
        );
    }

    #[test]
    fn test_stale_version_is_rejected() {
        let store = MemoryStore::new();
        let p = pool("p1", "10.0.0.0", "10.0.0.255");
        store.save_pool(&p).unwrap();

        // a writer holding the pre-save record (version 0) must lose
        let err = store.save_pool(&p).unwrap_err();
        assert_eq!(
            err,
            StoreError::VersionConflict {
                pool_id: "p1".to_string(),
                expected: 1,
            }
        );
    }

    #[test]
    fn test_commit_is_rejected_as_a_unit_on_conflict() {
        let store = MemoryStore::new();
        let p = pool("p1", "10.0.0.0", "10.0.0.255");
        store.save_pool(&p).unwrap();

        let stale = p.clone(); // version 0, store holds 1
        let a = assignment("a1", "p1", "10.0.0.1", true);
        assert!(store.commit_pool_and_assignment(&stale, &a).is_err());
        // the assignment half must not have landed
        assert!(store.load_assignment("a1").is_err());
    }

    #[test]
    fn test_pools_come_back_in_start_order() {
        let store = MemoryStore::new();
        store.save_pool(&pool("high", "10.0.2.0", "10.0.2.255")).unwrap();
        store.save_pool(&pool("low", "10.0.0.0", "10.0.0.255")).unwrap();
        store.save_pool(&pool("mid", "10.0.1.0", "10.0.1.255")).unwrap();

        let ids: Vec<String> = store
            .load_pools()
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec!["low", "mid", "high"]);
    }

    #[test]
    fn test_active_assignments_filters_and_sorts() {
        let store = MemoryStore::new();
        store.save_pool(&pool("p1", "10.0.0.0", "10.0.0.255")).unwrap();
        store.save_pool(&pool("p2", "10.0.1.0", "10.0.1.255")).unwrap();

        store.save_assignment(&assignment("a3", "p1", "10.0.0.9", true)).unwrap();
        store.save_assignment(&assignment("a1", "p1", "10.0.0.2", true)).unwrap();
        store.save_assignment(&assignment("a2", "p1", "10.0.0.5", false)).unwrap();
        store.save_assignment(&assignment("b1", "p2", "10.0.1.2", true)).unwrap();

        let active = store.load_active_assignments("p1").unwrap();
        let ips: Vec<Ipv4Addr> = active.iter().map(|a| a.assigned_ip).collect();
        assert_eq!(ips, vec![addr("10.0.0.2"), addr("10.0.0.9")]);
    }

    #[test]
    fn test_active_assignments_for_unknown_pool() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.load_active_assignments("ghost"),
            Err(StoreError::PoolNotFound(_))
        ));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let store = MemoryStore::new();
        store.save_pool(&pool("p1", "10.0.0.0", "10.0.0.255")).unwrap();
        store.save_assignment(&assignment("a1", "p1", "10.0.0.2", true)).unwrap();

        let snapshot = store.snapshot().unwrap();
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: RegistrySnapshot = serde_json::from_str(&json).unwrap();
        let restored = MemoryStore::from_snapshot(parsed);

        assert_eq!(restored.load_pool("p1").unwrap().version, 1);
        assert_eq!(
            restored.load_assignment("a1").unwrap().assigned_ip,
            addr("10.0.0.2")
        );
    }
}
