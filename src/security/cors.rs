//! CORS policy evaluation.
//!
//! A `CorsDecision` is computed once per request (the config snapshot plus
//! the request's `Origin` header) and then threaded through every response
//! path — success, static file, proxy error — so the same headers are
//! applied consistently everywhere, including error responses.

use crate::config::schema::CorsConfig;

/// The set of CORS headers to append to a response, already resolved
/// against an allowlist match. Constructing one implies the match
/// succeeded; callers hold an `Option<CorsDecision>` and simply skip
/// appending when it's `None`.
#[derive(Debug, Clone)]
pub struct CorsDecision {
    allow_origin: String,
    allow_methods: String,
    allow_headers: String,
    allow_credentials: bool,
    max_age_secs: Option<u64>,
}

impl CorsDecision {
    /// Evaluate `config` against a request's `Origin` header. Returns
    /// `None` when CORS is disabled, no `Origin` header was present, or
    /// the origin does not match the allowlist.
    ///
    /// `preflight` controls whether `Access-Control-Max-Age` is included;
    /// it only makes sense on an `OPTIONS` preflight response.
    pub fn evaluate(config: &CorsConfig, origin: Option<&str>, preflight: bool) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let origin = origin?;

        let wildcard = config.allowed_origins.iter().any(|o| o == "*");
        let exact_match = config.allowed_origins.iter().any(|o| o == origin);
        if !wildcard && !exact_match {
            return None;
        }

        // A wildcard origin is only honored verbatim when credentials are
        // not allowed; browsers reject `*` alongside
        // `Access-Control-Allow-Credentials: true`.
        let allow_origin = if wildcard && !config.allow_credentials {
            "*".to_string()
        } else {
            origin.to_string()
        };

        Some(Self {
            allow_origin,
            allow_methods: config.allowed_methods.join(", "),
            allow_headers: config.allowed_headers.join(", "),
            allow_credentials: config.allow_credentials,
            max_age_secs: preflight.then_some(config.max_age_secs),
        })
    }

    /// Append this decision's headers to an outgoing header list.
    pub fn append_headers(&self, headers: &mut Vec<String>) {
        headers.push(format!("Access-Control-Allow-Origin: {}", self.allow_origin));
        headers.push(format!(
            "Access-Control-Allow-Methods: {}",
            self.allow_methods
        ));
        headers.push(format!(
            "Access-Control-Allow-Headers: {}",
            self.allow_headers
        ));
        if self.allow_credentials {
            headers.push("Access-Control-Allow-Credentials: true".to_string());
        }
        headers.push("Vary: Origin".to_string());
        if let Some(max_age) = self.max_age_secs {
            headers.push(format!("Access-Control-Max-Age: {}", max_age));
        }
    }

    /// Whether a request is a CORS preflight: `OPTIONS` with both `Origin`
    /// and `Access-Control-Request-Method` present.
    pub fn is_preflight_request(
        method: &str,
        origin: Option<&str>,
        request_method_header: Option<&str>,
    ) -> bool {
        method.eq_ignore_ascii_case("OPTIONS") && origin.is_some() && request_method_header.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(origins: &[&str], credentials: bool) -> CorsConfig {
        CorsConfig {
            enabled: true,
            allowed_origins: origins.iter().map(|s| s.to_string()).collect(),
            allowed_methods: vec!["GET".to_string(), "POST".to_string()],
            allowed_headers: vec!["Content-Type".to_string()],
            allow_credentials: credentials,
            max_age_secs: 600,
        }
    }

    #[test]
    fn disabled_config_yields_no_decision() {
        let mut c = config(&["https://example.com"], false);
        c.enabled = false;
        assert!(CorsDecision::evaluate(&c, Some("https://example.com"), false).is_none());
    }

    #[test]
    fn no_origin_header_yields_no_decision() {
        let c = config(&["https://example.com"], false);
        assert!(CorsDecision::evaluate(&c, None, false).is_none());
    }

    #[test]
    fn mismatched_origin_yields_no_decision() {
        let c = config(&["https://example.com"], false);
        assert!(CorsDecision::evaluate(&c, Some("https://evil.example"), false).is_none());
    }

    #[test]
    fn matched_origin_echoes_it() {
        let c = config(&["https://example.com"], false);
        let d = CorsDecision::evaluate(&c, Some("https://example.com"), false).unwrap();
        let mut headers = Vec::new();
        d.append_headers(&mut headers);
        assert!(headers.contains(&"Access-Control-Allow-Origin: https://example.com".to_string()));
        assert!(headers.contains(&"Vary: Origin".to_string()));
    }

    #[test]
    fn wildcard_without_credentials_stays_wildcard() {
        let c = config(&["*"], false);
        let d = CorsDecision::evaluate(&c, Some("https://anything.example"), false).unwrap();
        let mut headers = Vec::new();
        d.append_headers(&mut headers);
        assert!(headers.contains(&"Access-Control-Allow-Origin: *".to_string()));
    }

    #[test]
    fn wildcard_with_credentials_echoes_origin_instead() {
        let c = config(&["*"], true);
        let d = CorsDecision::evaluate(&c, Some("https://anything.example"), false).unwrap();
        let mut headers = Vec::new();
        d.append_headers(&mut headers);
        assert!(headers.contains(
            &"Access-Control-Allow-Origin: https://anything.example".to_string()
        ));
        assert!(headers.contains(&"Access-Control-Allow-Credentials: true".to_string()));
    }

    #[test]
    fn preflight_includes_max_age() {
        let c = config(&["https://example.com"], false);
        let d = CorsDecision::evaluate(&c, Some("https://example.com"), true).unwrap();
        let mut headers = Vec::new();
        d.append_headers(&mut headers);
        assert!(headers.contains(&"Access-Control-Max-Age: 600".to_string()));
    }

    #[test]
    fn non_preflight_omits_max_age() {
        let c = config(&["https://example.com"], false);
        let d = CorsDecision::evaluate(&c, Some("https://example.com"), false).unwrap();
        let mut headers = Vec::new();
        d.append_headers(&mut headers);
        assert!(!headers.iter().any(|h| h.starts_with("Access-Control-Max-Age")));
    }

    #[test]
    fn detects_preflight_request() {
        assert!(CorsDecision::is_preflight_request(
            "OPTIONS",
            Some("https://example.com"),
            Some("POST")
        ));
        assert!(!CorsDecision::is_preflight_request("GET", Some("https://example.com"), None));
        assert!(!CorsDecision::is_preflight_request("OPTIONS", None, Some("POST")));
    }
}
