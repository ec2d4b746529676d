//! Operator configuration: allocator settings, regions, pool seeds.
//!
//! A single YAML file describes the retry discipline, the region
//! directory, and the pools to activate on startup. Everything is
//! validated before any of it touches a store, and pool seeds still go
//! through `PoolRegistry::activate_pool` afterwards so overlap refusal
//! applies to operator data exactly as it does to runtime calls.

use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use color_eyre::Result;
use log::info;
use serde::{Deserialize, Serialize};

use crate::addr::parse_dotted_quad;
use crate::pool::{AddressPool, CustomerClass, RetrySettings};
use crate::recommend::{RegionDirectory, RegionInfo};

/// Configuration problems reported before anything runs
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid registry settings: {0}")]
    InvalidRegistry(String),

    #[error("Invalid region definition: {0}")]
    InvalidRegion(String),

    #[error("Invalid pool definition: {0}")]
    InvalidPool(String),
}

/// Top-level operator configuration
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Region directory; the built-in regions apply when omitted
    #[serde(default)]
    pub regions: Vec<RegionConfig>,
    /// Pools activated at startup
    #[serde(default)]
    pub pools: Vec<PoolConfig>,
}

/// Allocator retry knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Attempts per allocate/release before a conflict surfaces
    #[serde(default = "default_max_attempts")]
    pub max_allocation_attempts: u32,
    /// Sleep before the second attempt, e.g. "25ms"; doubles per retry
    #[serde(with = "humantime_serde", default = "default_retry_backoff")]
    pub retry_backoff: Duration,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(25)
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            max_allocation_attempts: default_max_attempts(),
            retry_backoff: default_retry_backoff(),
        }
    }
}

impl RegistryConfig {
    pub fn retry_settings(&self) -> RetrySettings {
        RetrySettings {
            max_attempts: self.max_allocation_attempts,
            initial_backoff: self.retry_backoff,
        }
    }
}

/// One region entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    pub id: String,
    pub name: String,
    #[serde(default = "default_interface")]
    pub default_interface: String,
}

fn default_interface() -> String {
    "pppoe".to_string()
}

impl RegionConfig {
    fn to_info(&self) -> RegionInfo {
        RegionInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            default_interface: self.default_interface.clone(),
        }
    }
}

/// One pool seed, addresses as dotted-quad strings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub id: String,
    pub region: String,
    pub class: CustomerClass,
    pub start_ip: String,
    pub end_ip: String,
    pub prefix_length: u8,
    /// Display gateway; the first usable address stands in when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(default)]
    pub gateway: Option<String>,
}

impl PoolConfig {
    /// Materialize the pool record this seed describes
    pub fn to_pool(&self) -> Result<AddressPool, ValidationError> {
        let bad = |msg: String| ValidationError::InvalidPool(format!("Pool {}: {}", self.id, msg));
        let start = parse_dotted_quad(&self.start_ip).map_err(|e| bad(e.to_string()))?;
        let end = parse_dotted_quad(&self.end_ip).map_err(|e| bad(e.to_string()))?;
        let gateway = match &self.gateway {
            Some(text) => Some(parse_dotted_quad(text).map_err(|e| bad(e.to_string()))?),
            None => None,
        };
        AddressPool::new(
            self.id.clone(),
            self.region.clone(),
            self.class,
            start,
            end,
            self.prefix_length,
            gateway,
        )
        .map_err(|e| ValidationError::InvalidPool(e.to_string()))
    }
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.registry.max_allocation_attempts == 0 {
            return Err(ValidationError::InvalidRegistry(
                "max_allocation_attempts must be at least 1".to_string(),
            ));
        }

        let mut region_ids = HashSet::new();
        for region in &self.regions {
            if region.id.is_empty() || region.name.is_empty() {
                return Err(ValidationError::InvalidRegion(
                    "Region id and name cannot be empty".to_string(),
                ));
            }
            if !region_ids.insert(region.id.as_str()) {
                return Err(ValidationError::InvalidRegion(format!(
                    "Duplicate region id: {}",
                    region.id
                )));
            }
        }

        // pools may reference the built-in regions when none are configured
        let builtin = RegionDirectory::builtin();
        let region_known = |id: &str| {
            if self.regions.is_empty() {
                builtin.get(id).is_some()
            } else {
                region_ids.contains(id)
            }
        };

        let mut pool_ids = HashSet::new();
        for pool in &self.pools {
            if pool.id.is_empty() {
                return Err(ValidationError::InvalidPool(
                    "Pool id cannot be empty".to_string(),
                ));
            }
            if !pool_ids.insert(pool.id.as_str()) {
                return Err(ValidationError::InvalidPool(format!(
                    "Duplicate pool id: {}",
                    pool.id
                )));
            }
            if !region_known(&pool.region) {
                return Err(ValidationError::InvalidPool(format!(
                    "Pool {} references unknown region {}",
                    pool.id, pool.region
                )));
            }
            // to_pool re-runs the range and prefix checks on real types
            pool.to_pool()?;
        }

        Ok(())
    }

    /// Region directory described by this config (built-ins when empty)
    pub fn region_directory(&self) -> RegionDirectory {
        if self.regions.is_empty() {
            RegionDirectory::builtin()
        } else {
            RegionDirectory::from_regions(self.regions.iter().map(RegionConfig::to_info).collect())
        }
    }

    /// Pool records ready for activation, in file order
    pub fn build_pools(&self) -> Result<Vec<AddressPool>, ValidationError> {
        self.pools.iter().map(PoolConfig::to_pool).collect()
    }
}

/// Load and validate configuration from a YAML file
pub fn load_config(config_path: &Path) -> Result<Config> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)?;
    let config: Config = serde_yaml::from_reader(file)?;
    config.validate()?;

    Ok(config)
}
