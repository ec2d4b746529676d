//! # WanPool - IPv4 address-space management for regional ISP provisioning
//!
//! This library provides the address-management engine behind a regional
//! ISP's provisioning system: CIDR arithmetic plus allocation, lookup, and
//! accounting of address pools scoped to regions and customer classes.
//!
//! ## Overview
//!
//! Support tooling asks the engine what network an address sits in and
//! which pool owns it; provisioning flows ask it to hand out the next free
//! address in a pool and to release addresses when customers churn. The
//! engine keeps pool counters, per-assignment gateways, and range
//! bookkeeping consistent under concurrent callers without owning any
//! storage of its own.
//!
//! ## Key Features
//!
//! - **Strict address handling**: dotted-quad validation with no
//!   leading-zero tolerance, all range math over unsigned 32-bit values
//! - **Pool registry**: contiguous per-region, per-class ranges with
//!   overlap refusal at activation
//! - **Lowest-free allocation**: deterministic assignment order with
//!   exhaustion reported as a value, never a panic
//! - **Optimistic concurrency**: version-guarded commits with bounded,
//!   jittered retries on conflict
//! - **Injected persistence**: any `PoolStore` backend; an in-memory
//!   reference store with JSON snapshots ships in the box
//! - **Router guidance**: per-region, per-interface recommendation tables
//!   embedded in analysis reports
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `addr`: pure IPv4 arithmetic (parsing, masks, subnet math)
//! - `pool`: the data model, persistence contract, cache decorator,
//!   gateway policy, and the allocating registry
//! - `recommend`: region directory and router recommendation tables
//! - `analyze`: the read-only analysis front and free-text IP extraction
//! - `config`: YAML operator configuration and validation
//! - `audit`: offline invariant checks and report writers for snapshots
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wanpool::analyze::AnalysisEngine;
//! use wanpool::pool::{MemoryStore, PoolRegistry};
//!
//! let registry = PoolRegistry::new(Arc::new(MemoryStore::new()));
//! let engine = AnalysisEngine::with_defaults(registry);
//!
//! let report = engine.analyze_address("197.156.64.10", Some(24), None)?;
//! println!(
//!     "network {} broadcast {}",
//!     report.network.network_address, report.network.broadcast_address
//! );
//! # Ok::<(), wanpool::pool::PoolError>(())
//! ```
//!
//! ## Configuration Format
//!
//! Operator configuration uses YAML:
//!
//! ```yaml
//! registry:
//!   max_allocation_attempts: 3
//!   retry_backoff: 25ms
//!
//! regions:
//!   - id: east
//!     name: "Eastern Region"
//!     default_interface: pppoe
//!
//! pools:
//!   - id: east-res-1
//!     region: east
//!     class: residential
//!     start_ip: 10.129.0.1
//!     end_ip: 10.129.47.255
//!     prefix_length: 20
//! ```
//!
//! ## Error Handling
//!
//! Library errors are typed `thiserror` enums surfaced as values; nothing
//! in the library panics on bad input. The binaries translate them through
//! `color_eyre` for reporting.

pub mod addr;
pub mod analyze;
pub mod audit;
pub mod config;
pub mod pool;
pub mod recommend;
