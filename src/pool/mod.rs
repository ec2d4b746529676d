//! Address-pool registry: data model, persistence contract, allocation.
//!
//! The module splits along the seams an operator deployment swaps at:
//! `types` is the persisted data model, `store` the persistence contract
//! with the in-memory reference implementation, `cache` the read-through
//! decorator, `gateway` the provisioning policy, and `registry` the
//! allocation front that ties them together.

pub mod cache;
pub mod gateway;
pub mod registry;
pub mod store;
pub mod types;

pub use cache::CachedPoolStore;
pub use gateway::{GatewayPolicy, StandardGatewayPolicy};
pub use registry::{PoolError, PoolRegistry, RetrySettings};
pub use store::{MemoryStore, PoolStore, RegistrySnapshot, StoreError};
pub use types::{
    AddressAssignment, AddressPool, CustomerClass, PoolStatistics, PoolValidationError,
};
