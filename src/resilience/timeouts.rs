//! Timeout enforcement for backend calls.
//!
//! Every external call has a deadline: connect, full request/response, and
//! idle-between-bytes. A timed-out operation surfaces as
//! [`crate::error::ProxyError::GatewayTimeout`].

use std::future::Future;
use std::time::Duration;

use crate::error::ProxyError;

/// Run `fut` with a deadline, mapping expiry to `ProxyError::GatewayTimeout`.
pub async fn with_timeout<T, F>(duration: Duration, fut: F) -> Result<T, ProxyError>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ProxyError::Io(e)),
        Err(_) => Err(ProxyError::GatewayTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn propagates_success() {
        let result = with_timeout(Duration::from_millis(50), async { Ok::<_, std::io::Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn maps_expiry_to_gateway_timeout() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok::<_, std::io::Error>(())
        })
        .await;
        assert!(matches!(result, Err(ProxyError::GatewayTimeout)));
    }
}
