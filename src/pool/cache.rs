//! Read-through pool cache.
//!
//! An explicit decorator over any [`PoolStore`], in place of hidden
//! process-wide lookup tables: the full pool list is cached on first read
//! and thrown away on every write that goes through this handle, so a
//! reader behind the cache never sees a pool set older than the last local
//! write. Point reads (`load_pool`) pass straight through: they feed the
//! version-guarded write path and must always see the backend's truth.

use std::sync::{Arc, Mutex};

use super::store::{PoolStore, StoreError};
use super::types::{AddressAssignment, AddressPool};

pub struct CachedPoolStore {
    backend: Arc<dyn PoolStore>,
    pools: Mutex<Option<Vec<AddressPool>>>,
}

impl CachedPoolStore {
    pub fn new(backend: Arc<dyn PoolStore>) -> Self {
        CachedPoolStore {
            backend,
            pools: Mutex::new(None),
        }
    }

    fn invalidate(&self) -> Result<(), StoreError> {
        let mut cached = self
            .pools
            .lock()
            .map_err(|_| StoreError::Backend("Pool cache mutex poisoned".to_string()))?;
        *cached = None;
        Ok(())
    }
}

impl PoolStore for CachedPoolStore {
    fn load_pools(&self) -> Result<Vec<AddressPool>, StoreError> {
        let mut cached = self
            .pools
            .lock()
            .map_err(|_| StoreError::Backend("Pool cache mutex poisoned".to_string()))?;
        if let Some(pools) = cached.as_ref() {
            log::debug!("Serving {} pools from cache", pools.len());
            return Ok(pools.clone());
        }
        let pools = self.backend.load_pools()?;
        *cached = Some(pools.clone());
        Ok(pools)
    }

    fn load_pool(&self, pool_id: &str) -> Result<AddressPool, StoreError> {
        self.backend.load_pool(pool_id)
    }

    fn save_pool(&self, pool: &AddressPool) -> Result<(), StoreError> {
        self.backend.save_pool(pool)?;
        self.invalidate()
    }

    fn load_active_assignments(
        &self,
        pool_id: &str,
    ) -> Result<Vec<AddressAssignment>, StoreError> {
        self.backend.load_active_assignments(pool_id)
    }

    fn load_assignment(&self, assignment_id: &str) -> Result<AddressAssignment, StoreError> {
        self.backend.load_assignment(assignment_id)
    }

    fn save_assignment(&self, assignment: &AddressAssignment) -> Result<(), StoreError> {
        self.backend.save_assignment(assignment)?;
        self.invalidate()
    }

    fn commit_pool_and_assignment(
        &self,
        pool: &AddressPool,
        assignment: &AddressAssignment,
    ) -> Result<(), StoreError> {
        self.backend.commit_pool_and_assignment(pool, assignment)?;
        self.invalidate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::store::MemoryStore;
    use crate::pool::types::CustomerClass;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend double that counts how often the pool list is actually read
    struct CountingStore {
        inner: MemoryStore,
        list_loads: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            CountingStore {
                inner: MemoryStore::new(),
                list_loads: AtomicUsize::new(0),
            }
        }
    }

    impl PoolStore for CountingStore {
        fn load_pools(&self) -> Result<Vec<AddressPool>, StoreError> {
            self.list_loads.fetch_add(1, Ordering::SeqCst);
            self.inner.load_pools()
        }
        fn load_pool(&self, pool_id: &str) -> Result<AddressPool, StoreError> {
            self.inner.load_pool(pool_id)
        }
        fn save_pool(&self, pool: &AddressPool) -> Result<(), StoreError> {
            self.inner.save_pool(pool)
        }
        fn load_active_assignments(
            &self,
            pool_id: &str,
        ) -> Result<Vec<AddressAssignment>, StoreError> {
            self.inner.load_active_assignments(pool_id)
        }
        fn load_assignment(&self, assignment_id: &str) -> Result<AddressAssignment, StoreError> {
            self.inner.load_assignment(assignment_id)
        }
        fn save_assignment(&self, assignment: &AddressAssignment) -> Result<(), StoreError> {
            self.inner.save_assignment(assignment)
        }
        fn commit_pool_and_assignment(
            &self,
            pool: &AddressPool,
            assignment: &AddressAssignment,
        ) -> Result<(), StoreError> {
            self.inner.commit_pool_and_assignment(pool, assignment)
        }
    }

    fn pool(id: &str, start: &str, end: &str) -> AddressPool {
        AddressPool::new(
            id,
            "east",
            CustomerClass::Residential,
            start.parse().unwrap(),
            end.parse().unwrap(),
            24,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_second_list_read_is_served_from_cache() {
        let backend = Arc::new(CountingStore::new());
        backend.save_pool(&pool("p1", "10.0.0.0", "10.0.0.255")).unwrap();
        let cached = CachedPoolStore::new(backend.clone());

        assert_eq!(cached.load_pools().unwrap().len(), 1);
        assert_eq!(cached.load_pools().unwrap().len(), 1);
        assert_eq!(backend.list_loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_save_pool_invalidates() {
        let backend = Arc::new(CountingStore::new());
        backend.save_pool(&pool("p1", "10.0.0.0", "10.0.0.255")).unwrap();
        let cached = CachedPoolStore::new(backend.clone());

        assert_eq!(cached.load_pools().unwrap().len(), 1);
        cached.save_pool(&pool("p2", "10.0.1.0", "10.0.1.255")).unwrap();

        // the write is visible on the next read, which hits the backend
        assert_eq!(cached.load_pools().unwrap().len(), 2);
        assert_eq!(backend.list_loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_commit_invalidates() {
        let backend = Arc::new(CountingStore::new());
        backend.save_pool(&pool("p1", "10.0.0.0", "10.0.0.255")).unwrap();
        let cached = CachedPoolStore::new(backend.clone());

        let mut updated = cached.load_pools().unwrap().remove(0);
        assert_eq!(backend.list_loads.load(Ordering::SeqCst), 1);

        updated.used_addresses += 1;
        updated.available_addresses -= 1;
        let assignment = AddressAssignment {
            id: "a1".to_string(),
            pool_id: "p1".to_string(),
            account_id: "acct".to_string(),
            assigned_ip: "10.0.0.1".parse().unwrap(),
            assigned_gateway: "10.0.0.1".parse().unwrap(),
            is_active: true,
            assigned_at: chrono::Utc::now(),
            deactivated_at: None,
        };
        cached.commit_pool_and_assignment(&updated, &assignment).unwrap();

        let reloaded = cached.load_pools().unwrap();
        assert_eq!(reloaded[0].used_addresses, 1);
        assert_eq!(backend.list_loads.load(Ordering::SeqCst), 2);
    }
}
