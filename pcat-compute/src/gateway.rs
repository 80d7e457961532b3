//! The single chokepoint through which catalogs force lazy arrays.

use std::sync::Mutex;

use arrow::array::ArrayRef;
use pcat_result::{Error, Result};

use crate::cache::{ArrayCache, CacheConfig, CacheStats};
use crate::engine::ComputeEngine;
use crate::lazy::LazyArray;

/// Results of one forcing call.
///
/// A call with a single handle yields [`Forced::One`] instead of a one-element
/// sequence.
#[derive(Clone, Debug, PartialEq)]
pub enum Forced {
    One(ArrayRef),
    Many(Vec<ArrayRef>),
}

impl Forced {
    fn from_vec(mut arrays: Vec<ArrayRef>) -> Self {
        if arrays.len() == 1 {
            Forced::One(arrays.remove(0))
        } else {
            Forced::Many(arrays)
        }
    }

    pub fn into_one(self) -> Result<ArrayRef> {
        match self {
            Forced::One(array) => Ok(array),
            Forced::Many(arrays) => Err(Error::InvalidArgumentError(format!(
                "expected a single forced array, got {}",
                arrays.len()
            ))),
        }
    }

    pub fn into_vec(self) -> Vec<ArrayRef> {
        match self {
            Forced::One(array) => vec![array],
            Forced::Many(arrays) => arrays,
        }
    }
}

/// Compute engine plus the optional cache region owned by one catalog lineage.
///
/// The cache exists exactly while caching is enabled. A forcing call holds the
/// cache for the whole batch.
#[derive(Debug)]
pub struct ComputeGateway {
    engine: ComputeEngine,
    cache_config: CacheConfig,
    cache: Mutex<Option<ArrayCache>>,
}

impl ComputeGateway {
    pub fn new(engine: ComputeEngine, cache_config: CacheConfig, use_cache: bool) -> Self {
        let gateway = Self {
            engine,
            cache_config,
            cache: Mutex::new(None),
        };
        gateway.set_use_cache(use_cache);
        gateway
    }

    pub fn engine(&self) -> &ComputeEngine {
        &self.engine
    }

    pub fn cache_config(&self) -> CacheConfig {
        self.cache_config
    }

    pub fn use_cache(&self) -> bool {
        self.cache
            .lock()
            .expect("ComputeGateway cache lock poisoned")
            .is_some()
    }

    /// Enabling creates the cache if it does not exist yet; disabling drops it.
    pub fn set_use_cache(&self, enabled: bool) {
        let mut cache = self
            .cache
            .lock()
            .expect("ComputeGateway cache lock poisoned");
        match (enabled, cache.is_some()) {
            (true, false) => {
                tracing::debug!(capacity_bytes = self.cache_config.capacity_bytes, "enabling array cache");
                *cache = Some(ArrayCache::new(self.cache_config));
            }
            (false, true) => {
                tracing::debug!("dropping array cache");
                *cache = None;
            }
            _ => {}
        }
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache
            .lock()
            .expect("ComputeGateway cache lock poisoned")
            .as_ref()
            .map(ArrayCache::stats)
    }

    /// Force every handle together, one result per handle in input order.
    pub fn force(&self, arrays: &[LazyArray]) -> Result<Vec<ArrayRef>> {
        let mut cache = self
            .cache
            .lock()
            .expect("ComputeGateway cache lock poisoned");
        match cache.as_mut() {
            Some(region) => self.engine.force_cached(arrays, region),
            None => self.engine.force(arrays),
        }
    }

    pub fn force_one(&self, array: &LazyArray) -> Result<ArrayRef> {
        let mut out = self.force(std::slice::from_ref(array))?;
        out.pop()
            .ok_or_else(|| Error::Internal("forcing one array produced no result".into()))
    }

    /// [`ComputeGateway::force`], unwrapping single results.
    pub fn compute(&self, arrays: &[LazyArray]) -> Result<Forced> {
        Ok(Forced::from_vec(self.force(arrays)?))
    }
}
