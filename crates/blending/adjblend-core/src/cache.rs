//! Bounded cache of analysis results keyed by content fingerprints.
//!
//! A key is `(curve fingerprint, config fingerprint)`, so editing either input
//! simply misses; eviction only costs a recomputation.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::analysis::{analyze, MotionAnalysis};
use crate::config::AnalysisConfig;
use crate::curve::{Curve, Fingerprint};
use crate::error::AdjustError;
use crate::mask::{build_masks, Masks};

type CacheKey = (Fingerprint, Fingerprint);

/// A cached analysis with the masks built from it.
#[derive(Clone, Debug, PartialEq)]
pub struct Analyzed {
    pub curve: Fingerprint,
    pub config: Fingerprint,
    pub analysis: MotionAnalysis,
    pub masks: Masks,
}

/// Snapshot of cache occupancy and effectiveness.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheInfo {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

struct Inner {
    entries: LruCache<CacheKey, Arc<Analyzed>>,
    hits: u64,
    misses: u64,
}

/// Thread-safe LRU of [`Analyzed`] results.
pub struct AnalysisCache {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for AnalysisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisCache").field("info", &self.info()).finish()
    }
}

fn capacity_of(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)
}

impl AnalysisCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity_of(capacity)),
                hits: 0,
                misses: 0,
            }),
        }
    }

    // Computation happens outside the lock, so a panic can't leave the map torn.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached analysis for `(curve, config)`, computing it on a miss.
    ///
    /// The boolean is `true` on a cache hit. Errors are never cached.
    pub fn get_or_compute(
        &self,
        curve: &Curve,
        config: &AnalysisConfig,
    ) -> Result<(Arc<Analyzed>, bool), AdjustError> {
        let key = (curve.fingerprint(), config.fingerprint());
        {
            let mut inner = self.lock();
            if let Some(hit) = inner.entries.get(&key).cloned() {
                inner.hits += 1;
                log::debug!("analysis cache hit: curve={} config={}", key.0, key.1);
                return Ok((hit, true));
            }
            inner.misses += 1;
        }

        log::debug!("analysis cache miss: curve={} config={}", key.0, key.1);
        let analysis = analyze(curve, config)?;
        let masks = build_masks(&analysis, config)?;
        let entry = Arc::new(Analyzed {
            curve: key.0,
            config: key.1,
            analysis,
            masks,
        });
        self.lock().entries.put(key, Arc::clone(&entry));
        Ok((entry, false))
    }

    /// Drop every entry derived from `curve`, whatever its configuration.
    /// Returns how many entries were removed.
    pub fn invalidate_curve(&self, curve: Fingerprint) -> usize {
        let mut inner = self.lock();
        let stale: Vec<CacheKey> = inner
            .entries
            .iter()
            .filter(|(k, _)| k.0 == curve)
            .map(|(k, _)| *k)
            .collect();
        for key in &stale {
            inner.entries.pop(key);
        }
        stale.len()
    }

    /// Drop all entries and reset statistics.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
    }

    /// Change the bound; shrinking evicts least recently used entries.
    pub fn resize(&self, capacity: usize) {
        self.lock().entries.resize(capacity_of(capacity));
    }

    pub fn info(&self) -> CacheInfo {
        let inner = self.lock();
        CacheInfo {
            entries: inner.entries.len(),
            capacity: inner.entries.cap().get(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lookup_hits() {
        let cache = AnalysisCache::new(4);
        let curve = Curve::from_frames(&[0.0, 1.0, 2.0, 2.0]).unwrap();
        let cfg = AnalysisConfig::default();
        let (a, hit) = cache.get_or_compute(&curve, &cfg).unwrap();
        assert!(!hit);
        let (b, hit) = cache.get_or_compute(&curve, &cfg).unwrap();
        assert!(hit);
        assert!(Arc::ptr_eq(&a, &b));
        let info = cache.info();
        assert_eq!((info.entries, info.hits, info.misses), (1, 1, 1));
    }

    #[test]
    fn config_edit_misses() {
        let cache = AnalysisCache::new(4);
        let curve = Curve::from_frames(&[0.0, 1.0, 2.0]).unwrap();
        cache.get_or_compute(&curve, &AnalysisConfig::default()).unwrap();
        let edited = AnalysisConfig {
            merge_gap: 7.0,
            ..Default::default()
        };
        let (_, hit) = cache.get_or_compute(&curve, &edited).unwrap();
        assert!(!hit);
        assert_eq!(cache.info().entries, 2);
        assert_eq!(cache.invalidate_curve(curve.fingerprint()), 2);
        assert_eq!(cache.info().entries, 0);
    }

    #[test]
    fn bounded_by_capacity() {
        let cache = AnalysisCache::new(2);
        let cfg = AnalysisConfig::default();
        for k in 0..5 {
            let curve = Curve::from_frames(&[0.0, k as f32, 0.0]).unwrap();
            cache.get_or_compute(&curve, &cfg).unwrap();
        }
        assert_eq!(cache.info().entries, 2);
        cache.resize(1);
        assert_eq!(cache.info().entries, 1);
        cache.clear();
        assert_eq!(cache.info(), CacheInfo { entries: 0, capacity: 1, hits: 0, misses: 0 });
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = AnalysisCache::new(2);
        let curve = Curve::from_frames(&[0.0, 1.0, 2.0]).unwrap();
        let bad = AnalysisConfig {
            contact_falloff: 0.0,
            ..Default::default()
        };
        assert!(cache.get_or_compute(&curve, &bad).is_err());
        assert_eq!(cache.info().entries, 0);
    }
}
