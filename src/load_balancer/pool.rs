//! Backend registry: maps backend URLs to the shared `Backend` instances
//! that carry health and connection-count state across requests and
//! config reloads.

use std::sync::Arc;

use dashmap::DashMap;

use crate::load_balancer::backend::Backend;

/// Registry of all known backends, keyed by their configured URL.
///
/// Kept separate from the routing table so a backend referenced by more
/// than one route shares the same health state and connection counter, and
/// so a reload that keeps a backend's URL unchanged doesn't reset its
/// health history.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: DashMap<String, Arc<Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the existing `Backend` for `url`, creating and registering
    /// one if this is the first time it's been seen. Returns `None` if the
    /// URL can't be parsed (config validation should already prevent this).
    pub fn get_or_insert(&self, url: &str, weight: u32) -> Option<Arc<Backend>> {
        if let Some(existing) = self.backends.get(url) {
            return Some(existing.clone());
        }
        let backend = Arc::new(Backend::new(url, weight)?);
        self.backends.insert(url.to_string(), backend.clone());
        Some(backend)
    }

    pub fn get(&self, url: &str) -> Option<Arc<Backend>> {
        self.backends.get(url).map(|b| b.clone())
    }

    /// Resolve a route's backend URL list to live `Backend` handles,
    /// registering any URL not already known.
    pub fn resolve_many(&self, urls: &[String], weights: &std::collections::HashMap<String, u32>) -> Vec<Arc<Backend>> {
        urls.iter()
            .filter_map(|url| {
                let weight = weights.get(url).copied().unwrap_or(1);
                self.get_or_insert(url, weight)
            })
            .collect()
    }

    /// Drop registry entries for URLs no longer referenced by any route,
    /// so a reload that removes a backend eventually stops reporting it.
    pub fn retain_only(&self, live_urls: &std::collections::HashSet<String>) {
        self.backends.retain(|url, _| live_urls.contains(url));
    }

    pub fn all(&self) -> Vec<Arc<Backend>> {
        self.backends.iter().map(|entry| entry.value().clone()).collect()
    }
}
