//! Admin authentication: Bearer API key, Basic auth, or a CIDR whitelist.
//!
//! Any one of the three configured methods is sufficient. When the admin
//! block is enabled but none of the three is configured, requests are
//! allowed through (local/dev use); see DESIGN.md.

use std::net::IpAddr;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::schema::AdminConfig;
use crate::error::ProxyError;
use crate::http1::Request;

pub fn authenticate(request: &Request, client_ip: IpAddr, config: &AdminConfig) -> Result<(), ProxyError> {
    if ip_whitelisted(client_ip, &config.ip_whitelist) {
        return Ok(());
    }

    let auth_header = request.headers.get("authorization");

    if !config.api_key.is_empty() {
        if let Some(token) = auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
            if bearer_matches(token, &config.api_key) {
                return Ok(());
            }
        }
    }

    if !config.basic_auth.is_empty() {
        if let Some(encoded) = auth_header.and_then(|h| h.strip_prefix("Basic ")) {
            if basic_matches(encoded, config) {
                return Ok(());
            }
        }
    }

    let any_method_configured = !config.api_key.is_empty() || !config.basic_auth.is_empty() || !config.ip_whitelist.is_empty();
    if !any_method_configured {
        return Ok(());
    }

    Err(ProxyError::Unauthorized)
}

fn bearer_matches(token: &str, expected: &str) -> bool {
    token.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn basic_matches(encoded: &str, config: &AdminConfig) -> bool {
    let decoded = match base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded) {
        Ok(d) => d,
        Err(_) => return false,
    };
    let text = match std::str::from_utf8(&decoded) {
        Ok(t) => t,
        Err(_) => return false,
    };
    let Some((user, pass)) = text.split_once(':') else {
        return false;
    };

    config.basic_auth.iter().any(|entry| {
        if entry.username != user {
            return false;
        }
        let mut hasher = Sha256::new();
        hasher.update(entry.salt.as_bytes());
        hasher.update(pass.as_bytes());
        let computed = hex::encode(hasher.finalize());
        computed.as_bytes().ct_eq(entry.password_hash.as_bytes()).into()
    })
}

fn ip_whitelisted(client_ip: IpAddr, whitelist: &[String]) -> bool {
    whitelist.iter().any(|cidr| match cidr.parse::<ipnet::IpNet>() {
        Ok(net) => net.contains(&client_ip),
        Err(_) => cidr.parse::<IpAddr>().map(|ip| ip == client_ip).unwrap_or(false),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::BasicAuthEntry;
    use crate::http1::{HeaderList, Request};

    fn base_config() -> AdminConfig {
        AdminConfig { enabled: true, api_key: String::new(), basic_auth: Vec::new(), ip_whitelist: Vec::new() }
    }

    fn request_with_auth(value: Option<&str>) -> Request {
        let mut headers = HeaderList::new();
        if let Some(v) = value {
            headers.push("Authorization", v);
        }
        Request {
            method: "GET".to_string(),
            path: "/admin/health".to_string(),
            query: None,
            version: "HTTP/1.1".to_string(),
            headers,
            header_length: 0,
            body_length: 0,
            chunked: false,
            host: None,
        }
    }

    #[test]
    fn no_auth_configured_allows() {
        let config = base_config();
        let req = request_with_auth(None);
        assert!(authenticate(&req, "10.0.0.1".parse().unwrap(), &config).is_ok());
    }

    #[test]
    fn bearer_token_must_match() {
        let config = AdminConfig { api_key: "secret123".to_string(), ..base_config() };
        let ip = "10.0.0.1".parse().unwrap();
        assert!(authenticate(&request_with_auth(Some("Bearer secret123")), ip, &config).is_ok());
        assert!(authenticate(&request_with_auth(Some("Bearer wrong")), ip, &config).is_err());
        assert!(authenticate(&request_with_auth(None), ip, &config).is_err());
    }

    #[test]
    fn basic_auth_checks_salted_hash() {
        let mut hasher = Sha256::new();
        hasher.update(b"pepper");
        hasher.update(b"hunter2");
        let hash = hex::encode(hasher.finalize());
        let config = AdminConfig {
            basic_auth: vec![BasicAuthEntry { username: "admin".to_string(), salt: "pepper".to_string(), password_hash: hash }],
            ..base_config()
        };
        let ip = "10.0.0.1".parse().unwrap();
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "admin:hunter2");
        assert!(authenticate(&request_with_auth(Some(&format!("Basic {encoded}"))), ip, &config).is_ok());
        let bad = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, "admin:wrong");
        assert!(authenticate(&request_with_auth(Some(&format!("Basic {bad}"))), ip, &config).is_err());
    }

    #[test]
    fn cidr_whitelist_bypasses_other_methods() {
        let config = AdminConfig { api_key: "secret".to_string(), ip_whitelist: vec!["10.0.0.0/8".to_string()], ..base_config() };
        assert!(authenticate(&request_with_auth(None), "10.1.2.3".parse().unwrap(), &config).is_ok());
        assert!(authenticate(&request_with_auth(None), "192.168.1.1".parse().unwrap(), &config).is_err());
    }
}
