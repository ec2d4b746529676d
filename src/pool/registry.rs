//! Pool registry and allocator.
//!
//! The registry owns the authoritative mapping from address ranges to
//! regions and customer classes, and hands out individual addresses exactly
//! once. It holds no state of its own: every read and write goes through
//! the injected [`PoolStore`], and every mutation commits through the
//! store's version-guarded atomic unit. Version conflicts are retried a
//! bounded number of times with jittered backoff before surfacing to the
//! caller as [`PoolError::ConcurrentModification`].

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;

use crate::addr::{parse_dotted_quad, AddrError};

use super::gateway::{GatewayPolicy, StandardGatewayPolicy};
use super::store::{PoolStore, StoreError};
use super::types::{
    AddressAssignment, AddressPool, CustomerClass, PoolStatistics, PoolValidationError,
};

/// Engine-level failures. Everything is surfaced as a value; nothing in the
/// library panics or retries beyond the configured budget.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error(transparent)]
    Addr(#[from] AddrError),

    #[error(transparent)]
    Validation(#[from] PoolValidationError),

    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    #[error("Pool {0} has no free addresses")]
    PoolExhausted(String),

    #[error("Assignment not found: {0}")]
    AssignmentNotFound(String),

    #[error("Pool {candidate} overlaps active pool {existing}")]
    OverlappingPool { candidate: String, existing: String },

    #[error("Pool {0} kept changing underneath the operation; retries exhausted")]
    ConcurrentModification(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<StoreError> for PoolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::PoolNotFound(id) => PoolError::PoolNotFound(id),
            StoreError::AssignmentNotFound(id) => PoolError::AssignmentNotFound(id),
            StoreError::VersionConflict { pool_id, .. } => {
                PoolError::ConcurrentModification(pool_id)
            }
            StoreError::Backend(msg) => PoolError::Storage(msg),
        }
    }
}

/// Retry discipline for version-conflict loops.
///
/// Contention on a popular pool is expected and self-resolving, so the
/// registry absorbs a few conflicts internally before giving up.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Attempts per operation, first try included
    pub max_attempts: u32,
    /// Sleep before the second attempt; doubles per retry, with jitter
    pub initial_backoff: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(25),
        }
    }
}

/// The allocation and lookup front over a [`PoolStore`].
pub struct PoolRegistry {
    store: Arc<dyn PoolStore>,
    gateway_policy: Arc<dyn GatewayPolicy>,
    retry: RetrySettings,
}

impl PoolRegistry {
    /// Registry with the stock gateway offsets and default retry budget
    pub fn new(store: Arc<dyn PoolStore>) -> Self {
        Self::with_policy(store, Arc::new(StandardGatewayPolicy))
    }

    pub fn with_policy(store: Arc<dyn PoolStore>, gateway_policy: Arc<dyn GatewayPolicy>) -> Self {
        PoolRegistry {
            store,
            gateway_policy,
            retry: RetrySettings::default(),
        }
    }

    pub fn with_retry_settings(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    /// Register a pool, refusing any overlap with an already active pool.
    ///
    /// The check runs across all regions and classes, which is what keeps
    /// [`find_pool_for_address`](Self::find_pool_for_address) unambiguous:
    /// with no overlaps, at most one pool can ever contain an address.
    pub fn activate_pool(&self, pool: AddressPool) -> Result<(), PoolError> {
        pool.validate()?;
        let existing = self.store.load_pools()?;
        for other in &existing {
            if other.id != pool.id && pool.overlaps(other) {
                return Err(PoolError::OverlappingPool {
                    candidate: pool.id,
                    existing: other.id.clone(),
                });
            }
        }
        self.store.save_pool(&pool)?;
        log::info!(
            "Activated pool {} for region {} ({}): {} - {}, {} addresses",
            pool.id,
            pool.region_id,
            pool.customer_class,
            pool.start_ip,
            pool.end_ip,
            pool.total_addresses
        );
        Ok(())
    }

    /// Find the pool whose range contains an address.
    ///
    /// Pools are scanned in ascending start order and the first match wins;
    /// activation refuses overlaps, so the match is unique. `None` means the
    /// address is real but unmanaged, which is not an error.
    pub fn find_pool_for_address(&self, ip: &str) -> Result<Option<AddressPool>, PoolError> {
        let addr = parse_dotted_quad(ip)?;
        Ok(self.find_pool_containing(addr)?)
    }

    pub(crate) fn find_pool_containing(
        &self,
        addr: Ipv4Addr,
    ) -> Result<Option<AddressPool>, StoreError> {
        let pools = self.store.load_pools()?;
        Ok(pools.into_iter().find(|pool| pool.contains(addr)))
    }

    /// Allocate the lowest free address in a pool to an account.
    ///
    /// Each attempt re-reads the pool and its active assignments, picks the
    /// candidate, and commits counters plus the new assignment as one
    /// version-guarded unit. Two racing callers can both pick the same
    /// address, but only one commit lands; the loser retries against the
    /// fresh state and takes the next address up.
    pub fn allocate_next(
        &self,
        pool_id: &str,
        account_id: &str,
    ) -> Result<AddressAssignment, PoolError> {
        self.retrying("Allocation", || self.try_allocate(pool_id, account_id))
    }

    fn try_allocate(
        &self,
        pool_id: &str,
        account_id: &str,
    ) -> Result<AddressAssignment, PoolError> {
        let pool = self.store.load_pool(pool_id)?;
        if pool.available_addresses == 0 {
            return Err(PoolError::PoolExhausted(pool.id));
        }

        let active = self.store.load_active_assignments(pool_id)?;
        let taken: HashSet<u32> = active.iter().map(|a| u32::from(a.assigned_ip)).collect();

        let start = u32::from(pool.start_ip);
        let end = u32::from(pool.end_ip);
        let next_free = (start..=end).find(|candidate| !taken.contains(candidate));
        let next_free = match next_free {
            Some(value) => value,
            None => {
                // Counters promised headroom but the range is fully taken.
                // Trust the records over the counters and report exhaustion.
                log::warn!(
                    "Pool {} counters show {} available but every address is assigned",
                    pool.id,
                    pool.available_addresses
                );
                return Err(PoolError::PoolExhausted(pool.id));
            }
        };

        let assigned_ip = Ipv4Addr::from(next_free);
        let assigned_gateway = self
            .gateway_policy
            .derive_gateway(assigned_ip, pool.customer_class);

        let assignment = AddressAssignment {
            id: new_assignment_id(),
            pool_id: pool.id.clone(),
            account_id: account_id.to_string(),
            assigned_ip,
            assigned_gateway,
            is_active: true,
            assigned_at: Utc::now(),
            deactivated_at: None,
        };

        let mut updated = pool;
        updated.used_addresses += 1;
        updated.available_addresses -= 1;
        self.store
            .commit_pool_and_assignment(&updated, &assignment)?;

        log::info!(
            "Assigned {} from pool {} to account {} (gateway {})",
            assignment.assigned_ip,
            assignment.pool_id,
            assignment.account_id,
            assignment.assigned_gateway
        );
        Ok(assignment)
    }

    /// Release an assignment, returning one unit of capacity to its pool.
    ///
    /// Releasing an assignment that is already inactive is a no-op, so
    /// deprovisioning flows can be replayed safely.
    pub fn release_assignment(&self, assignment_id: &str) -> Result<(), PoolError> {
        self.retrying("Release", || self.try_release(assignment_id))
    }

    fn try_release(&self, assignment_id: &str) -> Result<(), PoolError> {
        let mut assignment = self.store.load_assignment(assignment_id)?;
        if !assignment.is_active {
            log::debug!("Assignment {} already inactive; nothing to release", assignment.id);
            return Ok(());
        }

        let pool = self.store.load_pool(&assignment.pool_id)?;
        let used = pool.used_addresses.checked_sub(1).ok_or_else(|| {
            PoolError::Storage(format!(
                "Pool {} has an active assignment but zero used addresses",
                pool.id
            ))
        })?;

        assignment.is_active = false;
        assignment.deactivated_at = Some(Utc::now());

        let mut updated = pool;
        updated.used_addresses = used;
        updated.available_addresses += 1;
        self.store
            .commit_pool_and_assignment(&updated, &assignment)?;

        log::info!(
            "Released {} back to pool {} (assignment {})",
            assignment.assigned_ip,
            assignment.pool_id,
            assignment.id
        );
        Ok(())
    }

    /// Derive the gateway an address would receive under the registry's
    /// policy, without allocating anything.
    pub fn derive_gateway(&self, ip: Ipv4Addr, class: CustomerClass) -> Ipv4Addr {
        self.gateway_policy.derive_gateway(ip, class)
    }

    /// Aggregate usage across every pool, recomputed from the store
    pub fn statistics(&self) -> Result<PoolStatistics, PoolError> {
        let pools = self.store.load_pools()?;
        let mut stats = PoolStatistics {
            total_pools: pools.len(),
            total_addresses: 0,
            used_addresses: 0,
            available_addresses: 0,
            pools_per_region: Default::default(),
        };
        for pool in &pools {
            stats.total_addresses += pool.total_addresses;
            stats.used_addresses += pool.used_addresses;
            stats.available_addresses += pool.available_addresses;
            *stats
                .pools_per_region
                .entry(pool.region_id.clone())
                .or_insert(0) += 1;
        }
        Ok(stats)
    }

    /// Run an operation, absorbing version conflicts up to the attempt
    /// budget. Only [`PoolError::ConcurrentModification`] is retried; every
    /// other error returns immediately.
    fn retrying<T>(
        &self,
        op_name: &str,
        mut op: impl FnMut() -> Result<T, PoolError>,
    ) -> Result<T, PoolError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(PoolError::ConcurrentModification(pool_id)) if attempt < max_attempts => {
                    log::debug!(
                        "{} hit a version conflict on pool {} (attempt {}/{}); backing off",
                        op_name,
                        pool_id,
                        attempt,
                        max_attempts
                    );
                    std::thread::sleep(jittered(backoff));
                    backoff = backoff.saturating_mul(2);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Spread a backoff to 50-150% of its nominal value so retrying callers
/// that collided once do not collide again in lockstep.
fn jittered(base: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    base.mul_f64(rng.gen_range(0.5..1.5))
}

/// Random assignment id; unique across processes without coordinating
/// through the store.
fn new_assignment_id() -> String {
    let mut rng = rand::thread_rng();
    format!("asg-{:016x}", rng.gen::<u64>())
}
