//! Configuration validation logic.

use std::collections::HashSet;

use url::Url;

use crate::config::schema::ProxyConfig;

/// Error type for configuration validation failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError(pub String);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate a `ProxyConfig` for semantic correctness.
///
/// Runs after deserialization and before any config is allowed to replace
/// the live snapshot; a config that fails here is logged and discarded by
/// the caller, never swapped in.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.path_routes.is_empty() && config.domain_routes.is_empty() {
        errors.push(ValidationError(
            "config has no path_routes and no domain_routes".to_string(),
        ));
    }

    for route in &config.path_routes {
        validate_path(&route.prefix, &mut errors);
        validate_backends(&route.prefix, &route.backends, &mut errors);
    }

    for (host, backends) in &config.domain_routes {
        validate_backends(host, backends, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_path(prefix: &str, errors: &mut Vec<ValidationError>) {
    if prefix.trim().is_empty() {
        errors.push(ValidationError("route path is blank".to_string()));
        return;
    }
    if !prefix.starts_with('/') {
        errors.push(ValidationError(format!(
            "route path '{}' must start with '/'",
            prefix
        )));
    }
    if prefix.len() > 2048 {
        errors.push(ValidationError(format!(
            "route path '{}' exceeds 2048 characters",
            prefix
        )));
    }
    if prefix.contains("..") {
        errors.push(ValidationError(format!(
            "route path '{}' must not contain '..'",
            prefix
        )));
    }
    if prefix.contains("//") {
        errors.push(ValidationError(format!(
            "route path '{}' must not contain '//'",
            prefix
        )));
    }
    if prefix.contains('\0') {
        errors.push(ValidationError(format!(
            "route path '{}' must not contain a null byte",
            prefix
        )));
    }
}

fn validate_backends(route_label: &str, backends: &[String], errors: &mut Vec<ValidationError>) {
    if backends.is_empty() {
        errors.push(ValidationError(format!(
            "route '{}' has no backends",
            route_label
        )));
        return;
    }
    if backends.len() > 100 {
        errors.push(ValidationError(format!(
            "route '{}' has more than 100 backends",
            route_label
        )));
    }

    let mut seen = HashSet::new();
    for backend in backends {
        if !seen.insert(backend.as_str()) {
            errors.push(ValidationError(format!(
                "route '{}' lists backend '{}' more than once",
                route_label, backend
            )));
        }
        validate_backend_url(route_label, backend, errors);
    }
}

fn validate_backend_url(route_label: &str, backend: &str, errors: &mut Vec<ValidationError>) {
    if let Some(path) = backend.strip_prefix("file://") {
        let p = std::path::Path::new(path);
        if !p.exists() {
            errors.push(ValidationError(format!(
                "route '{}': file backend '{}' does not exist",
                route_label, backend
            )));
        } else if p.is_file() {
            // single-file route, always readable if it exists
        } else if !p.is_dir() {
            errors.push(ValidationError(format!(
                "route '{}': file backend '{}' is neither a file nor a directory",
                route_label, backend
            )));
        } else if std::fs::read_dir(p).is_err() {
            errors.push(ValidationError(format!(
                "route '{}': file backend '{}' is not readable",
                route_label, backend
            )));
        }
        return;
    }

    let url = match Url::parse(backend) {
        Ok(u) => u,
        Err(_) => {
            errors.push(ValidationError(format!(
                "route '{}': backend '{}' is not a parseable URI",
                route_label, backend
            )));
            return;
        }
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        errors.push(ValidationError(format!(
            "route '{}': backend '{}' has unsupported scheme '{}'",
            route_label,
            backend,
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        errors.push(ValidationError(format!(
            "route '{}': backend '{}' is missing a host",
            route_label, backend
        )));
    }

    // url::Url's port_or_known_default already constrains the port to u16;
    // an explicitly out-of-range port fails at parse time above.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{PathRoute, ProxyConfig};

    #[test]
    fn test_valid_config() {
        let mut config = ProxyConfig::default();
        config.path_routes.push(PathRoute {
            prefix: "/".to_string(),
            backends: vec!["http://127.0.0.1:9000".to_string()],
        });

        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_empty_routes() {
        let config = ProxyConfig::default();
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("no path_routes")));
    }

    #[test]
    fn test_path_traversal_rejected() {
        let mut config = ProxyConfig::default();
        config.path_routes.push(PathRoute {
            prefix: "/api/../secret".to_string(),
            backends: vec!["http://127.0.0.1:9000".to_string()],
        });
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("'..'")));
    }

    #[test]
    fn test_empty_backend_list_rejected() {
        let mut config = ProxyConfig::default();
        config.path_routes.push(PathRoute {
            prefix: "/api".to_string(),
            backends: vec![],
        });
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("no backends")));
    }

    #[test]
    fn test_duplicate_backend_rejected() {
        let mut config = ProxyConfig::default();
        config.path_routes.push(PathRoute {
            prefix: "/api".to_string(),
            backends: vec![
                "http://127.0.0.1:9000".to_string(),
                "http://127.0.0.1:9000".to_string(),
            ],
        });
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("more than once")));
    }

    #[test]
    fn test_bad_scheme_rejected() {
        let mut config = ProxyConfig::default();
        config.path_routes.push(PathRoute {
            prefix: "/api".to_string(),
            backends: vec!["ftp://127.0.0.1:9000".to_string()],
        });
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("unsupported scheme")));
    }

    #[test]
    fn test_missing_file_backend_rejected() {
        let mut config = ProxyConfig::default();
        config.path_routes.push(PathRoute {
            prefix: "/static".to_string(),
            backends: vec!["file:///does/not/exist/anywhere".to_string()],
        });
        let errs = validate_config(&config).unwrap_err();
        assert!(errs.iter().any(|e| e.0.contains("does not exist")));
    }
}
