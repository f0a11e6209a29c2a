//! Route lookup and dispatch.
//!
//! The compiled routing table is an immutable snapshot published behind an
//! `ArcSwap`, so a config reload is a single atomic publication: readers
//! either see the whole old table or the whole new one, never a partial mix.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::ProxyConfig;
use crate::load_balancer::backend::Backend;
use crate::load_balancer::pool::BackendRegistry;
use crate::load_balancer::Selector;
use crate::routing::matcher::{longest_prefix_match, normalize_host};

/// A backend resolved for one request, with the untried siblings from the
/// same route kept around as retry alternates.
pub struct ResolvedRoute {
    pub backend: Arc<Backend>,
    pub alternates: Vec<Arc<Backend>>,
    pub route_key: String,
}

struct RouteEntry {
    /// `file://...` backends are served by the static handler directly and
    /// never go through the load balancer or backend registry.
    backends: Vec<Arc<Backend>>,
    file_backend: Option<String>,
}

struct Snapshot {
    domain_routes: HashMap<String, RouteEntry>,
    path_routes: Vec<(String, RouteEntry)>,
    selector: Selector,
}

pub struct Router {
    snapshot: ArcSwap<Snapshot>,
    registry: Arc<BackendRegistry>,
}

impl Router {
    pub fn new(config: &ProxyConfig, registry: Arc<BackendRegistry>) -> Self {
        let snapshot = build_snapshot(config, &registry);
        Self { snapshot: ArcSwap::from_pointee(snapshot), registry }
    }

    /// Rebuild the routing table from a new config and atomically publish
    /// it. Backends no longer referenced by any route are dropped from the
    /// registry so their health state doesn't linger forever.
    pub fn update(&self, config: &ProxyConfig) {
        let snapshot = build_snapshot(config, &self.registry);

        let mut live_urls = std::collections::HashSet::new();
        for entry in snapshot.domain_routes.values() {
            live_urls.extend(entry.backends.iter().map(|b| b.url.clone()));
        }
        for (_, entry) in &snapshot.path_routes {
            live_urls.extend(entry.backends.iter().map(|b| b.url.clone()));
        }
        self.registry.retain_only(&live_urls);

        self.snapshot.store(Arc::new(snapshot));
    }

    /// Resolve a request to a backend. `host` takes precedence over path
    /// routing per the configured precedence rule.
    pub fn resolve(&self, host: Option<&str>, path: &str, client_ip: IpAddr) -> Option<ResolvedRoute> {
        let snapshot = self.snapshot.load();

        let entry = host
            .map(normalize_host)
            .and_then(|h| snapshot.domain_routes.get(&h))
            .map(|entry| ("host", entry))
            .or_else(|| {
                let prefixes = snapshot.path_routes.iter().map(|(prefix, _)| prefix.as_str());
                let matched = longest_prefix_match(path, prefixes)?;
                snapshot
                    .path_routes
                    .iter()
                    .find(|(prefix, _)| prefix == matched)
                    .map(|(prefix, entry)| (prefix.as_str(), entry))
            })?;

        let (route_key, entry) = entry;

        // File-backend routes are resolved via `resolve_file_root` instead;
        // callers check that first, so an empty backend list here means
        // there's nothing left to load-balance across.
        if entry.file_backend.is_some() || entry.backends.is_empty() {
            return None;
        }

        let selected = snapshot.selector.select(route_key, &entry.backends, client_ip)?;
        let alternates: Vec<Arc<Backend>> = entry
            .backends
            .iter()
            .filter(|b| !Arc::ptr_eq(b, &selected))
            .cloned()
            .collect();

        Some(ResolvedRoute { backend: selected, alternates, route_key: route_key.to_string() })
    }

    /// Return the `file://` root for a route, if `path` (or `host`) maps to
    /// a file-backend route. Checked separately from `resolve` because a
    /// static route never goes through the load balancer.
    pub fn resolve_file_root(&self, host: Option<&str>, path: &str) -> Option<String> {
        let snapshot = self.snapshot.load();

        if let Some(host) = host {
            if let Some(entry) = snapshot.domain_routes.get(&normalize_host(host)) {
                if let Some(root) = &entry.file_backend {
                    return Some(root.clone());
                }
            }
        }

        let prefixes = snapshot.path_routes.iter().map(|(prefix, _)| prefix.as_str());
        let matched = longest_prefix_match(path, prefixes)?;
        snapshot
            .path_routes
            .iter()
            .find(|(prefix, _)| prefix == matched)
            .and_then(|(_, entry)| entry.file_backend.clone())
    }
}

fn build_snapshot(config: &ProxyConfig, registry: &BackendRegistry) -> Snapshot {
    let domain_routes = config
        .domain_routes
        .iter()
        .map(|(host, backends)| (normalize_host(host), build_entry(backends, registry, &config.backend_weights)))
        .collect();

    let path_routes = config
        .path_routes
        .iter()
        .map(|route| {
            (
                route.prefix.clone(),
                build_entry(&route.backends, registry, &config.backend_weights),
            )
        })
        .collect();

    Snapshot { domain_routes, path_routes, selector: Selector::new(config.load_balancer_strategy) }
}

fn build_entry(urls: &[String], registry: &BackendRegistry, weights: &HashMap<String, u32>) -> RouteEntry {
    if urls.len() == 1 && urls[0].starts_with("file://") {
        return RouteEntry { backends: Vec::new(), file_backend: Some(urls[0].trim_start_matches("file://").to_string()) };
    }
    RouteEntry { backends: registry.resolve_many(urls, weights), file_backend: None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PathRoute;

    fn config_with(path_routes: Vec<PathRoute>, domain_routes: HashMap<String, Vec<String>>) -> ProxyConfig {
        ProxyConfig { path_routes, domain_routes, ..Default::default() }
    }

    #[test]
    fn resolves_longest_path_prefix() {
        let registry = Arc::new(BackendRegistry::new());
        let config = config_with(
            vec![
                PathRoute { prefix: "/".to_string(), backends: vec!["http://127.0.0.1:9001".to_string()] },
                PathRoute { prefix: "/api".to_string(), backends: vec!["http://127.0.0.1:9002".to_string()] },
            ],
            HashMap::new(),
        );
        let router = Router::new(&config, registry);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        let resolved = router.resolve(None, "/api/users", ip).unwrap();
        assert_eq!(resolved.backend.port, 9002);

        let resolved = router.resolve(None, "/other", ip).unwrap();
        assert_eq!(resolved.backend.port, 9001);
    }

    #[test]
    fn domain_route_takes_precedence_over_path_route() {
        let registry = Arc::new(BackendRegistry::new());
        let mut domains = HashMap::new();
        domains.insert("example.com".to_string(), vec!["http://127.0.0.1:9003".to_string()]);
        let config = config_with(
            vec![PathRoute { prefix: "/".to_string(), backends: vec!["http://127.0.0.1:9001".to_string()] }],
            domains,
        );
        let router = Router::new(&config, registry);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();

        let resolved = router.resolve(Some("example.com:8080"), "/", ip).unwrap();
        assert_eq!(resolved.backend.port, 9003);
    }

    #[test]
    fn no_match_returns_none() {
        let registry = Arc::new(BackendRegistry::new());
        let config = config_with(
            vec![PathRoute { prefix: "/api".to_string(), backends: vec!["http://127.0.0.1:9001".to_string()] }],
            HashMap::new(),
        );
        let router = Router::new(&config, registry);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(router.resolve(None, "/other", ip).is_none());
    }

    #[test]
    fn reload_updates_resolution() {
        let registry = Arc::new(BackendRegistry::new());
        let config = config_with(
            vec![PathRoute { prefix: "/".to_string(), backends: vec!["http://127.0.0.1:9001".to_string()] }],
            HashMap::new(),
        );
        let router = Router::new(&config, registry);
        let new_config = config_with(
            vec![PathRoute { prefix: "/".to_string(), backends: vec!["http://127.0.0.1:9009".to_string()] }],
            HashMap::new(),
        );
        router.update(&new_config);
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let resolved = router.resolve(None, "/", ip).unwrap();
        assert_eq!(resolved.backend.port, 9009);
    }
}
