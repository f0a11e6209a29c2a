//! WebSocket upgrade handling: a pure byte-level relay.
//!
//! No frame parsing or reassembly happens here — after the handshake, bytes
//! flow in both directions verbatim until either side closes. RFC 6455
//! framing is the client's and backend's concern, not the proxy's.

use base64::Engine;
use sha1::{Digest, Sha1};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::ProxyError;
use crate::http1::{self, HeaderList, Request};
use crate::net::connection::ClientConnection;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

/// Handle a validated WebSocket upgrade request: connect to the backend,
/// forward the handshake, relay the handshake response, then relay raw
/// bytes in both directions until either side hits EOF.
pub async fn proxy_upgrade(
    client: &mut ClientConnection,
    request: &Request,
    raw_head: &[u8],
    backend_host: &str,
    backend_port: u16,
    request_id: &str,
) -> Result<(), ProxyError> {
    let client_key = request.headers.get("sec-websocket-key").ok_or(ProxyError::BadRequest)?;
    let accept_key = compute_accept_key(client_key);

    let mut backend = TcpStream::connect((backend_host, backend_port)).await?;

    let mut forwarded_headers = request.headers.clone();
    forwarded_headers.remove("host");
    forwarded_headers.push("Host", format!("{backend_host}:{backend_port}"));
    forwarded_headers.remove("x-request-id");
    forwarded_headers.push("X-Request-Id", request_id.to_string());
    let upgrade_request = render_request_head(request, &forwarded_headers);
    backend.write_all(upgrade_request.as_bytes()).await?;
    backend.flush().await?;

    // Handshake response is read and discarded; the client gets our own
    // freshly computed 101 rather than relaying the backend's verbatim.
    let mut handshake_buf = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    loop {
        if http1::find_header_end(&handshake_buf).is_some() {
            break;
        }
        let n = backend.read(&mut chunk).await?;
        if n == 0 {
            return Err(ProxyError::BadGateway("backend closed during websocket handshake".to_string()));
        }
        handshake_buf.extend_from_slice(&chunk[..n]);
    }

    let response = format!(
        "HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Accept: {accept_key}\r\nX-Request-Id: {request_id}\r\n\r\n"
    );
    client.write_all(response.as_bytes()).await?;
    client.flush().await?;

    // Anything already buffered past the request's own header block (e.g.
    // pipelined frames) must be forwarded before relaying live.
    if raw_head.len() > request.header_length {
        backend.write_all(&raw_head[request.header_length..]).await?;
    }

    relay_bidirectional(client, &mut backend).await;
    Ok(())
}

fn render_request_head(request: &Request, headers: &HeaderList) -> String {
    let mut out = format!("{} {} {}\r\n", request.method, request.target(), request.version);
    for (name, value) in headers.iter() {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out
}

async fn relay_bidirectional(client: &mut ClientConnection, backend: &mut TcpStream) {
    let (mut client_read, mut client_write) = tokio::io::split(&mut *client);
    let (mut backend_read, mut backend_write) = backend.split();

    let client_to_backend = async {
        let mut buf = [0u8; 64 * 1024];
        loop {
            match client_read.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if backend_write.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = backend_write.shutdown().await;
    };

    let backend_to_client = async {
        let mut buf = [0u8; 64 * 1024];
        loop {
            match backend_read.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if client_write.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = client_write.shutdown().await;
    };

    tokio::join!(client_to_backend, backend_to_client);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_known_accept_key() {
        // RFC 6455 section 1.3 worked example.
        let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }
}
