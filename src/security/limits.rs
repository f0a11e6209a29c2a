//! Request size limits, enforced before or during parsing so an
//! oversized request never reaches routing or backend dispatch.

use crate::config::schema::LimitsConfig;
use crate::error::ProxyError;

/// Maximum length the request line (`METHOD SP target SP version`) itself
/// may have, independent of the header block limit.
const MAX_REQUEST_LINE_BYTES: usize = 8 * 1024;

/// Checked before headers have been fully parsed: the raw header block, as
/// read so far, must not exceed the configured limit.
pub fn check_header_bytes(header_bytes: usize, config: &LimitsConfig) -> Result<(), ProxyError> {
    if header_bytes > config.max_header_bytes {
        Err(ProxyError::HeaderFieldsTooLarge)
    } else {
        Ok(())
    }
}

pub fn check_request_line_bytes(len: usize) -> Result<(), ProxyError> {
    if len > MAX_REQUEST_LINE_BYTES {
        Err(ProxyError::BadRequest)
    } else {
        Ok(())
    }
}

/// Checked against the `Content-Length` (or accumulated chunked body size)
/// before the body is relayed to a backend.
pub fn check_body_bytes(body_bytes: u64, config: &LimitsConfig) -> Result<(), ProxyError> {
    if body_bytes > config.max_body_bytes as u64 {
        Err(ProxyError::PayloadTooLarge)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LimitsConfig {
        LimitsConfig { max_header_bytes: 100, max_body_bytes: 1000 }
    }

    #[test]
    fn rejects_oversized_headers() {
        assert!(check_header_bytes(101, &config()).is_err());
        assert!(check_header_bytes(100, &config()).is_ok());
    }

    #[test]
    fn rejects_oversized_body() {
        assert!(check_body_bytes(1001, &config()).is_err());
        assert!(check_body_bytes(1000, &config()).is_ok());
    }
}
