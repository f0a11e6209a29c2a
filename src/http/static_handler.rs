//! Static file serving: directory listings, conditional requests, range
//! requests, and on-the-fly gzip for compressible content types.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_compression::tokio::bufread::GzipEncoder;
use tokio::io::{AsyncWriteExt, BufReader};

use crate::error::ProxyError;
use crate::http1::{self, Request};
use crate::net::connection::ClientConnection;

/// Content types eligible for on-the-fly gzip (§4.9's "fixed compressible
/// set"); anything else is sent as-is even when the client accepts gzip.
const COMPRESSIBLE: &[&str] = &[
    "text/html",
    "text/plain",
    "text/css",
    "application/javascript",
    "text/javascript",
    "application/json",
    "application/xml",
    "text/xml",
    "image/svg+xml",
];

pub struct StaticOutcome {
    pub status: u16,
    pub bytes_sent: u64,
}

/// Serve `request` out of `root` (already stripped of its `file://`
/// prefix). `error_pages` maps a status code to a file to serve instead of
/// the default generated error HTML. `request_id` is echoed back as
/// `X-Request-Id` on every response this function writes.
pub async fn serve(
    client: &mut ClientConnection,
    root: &str,
    request: &Request,
    error_pages: &HashMap<u16, String>,
    request_id: &str,
) -> Result<StaticOutcome, ProxyError> {
    if request.path.contains("..") {
        return write_error(client, 403, "Forbidden", error_pages, request_id).await;
    }

    let root_path = Path::new(root);
    let root_meta = match tokio::fs::metadata(root_path).await {
        Ok(m) => m,
        Err(_) => return write_error(client, 404, "Not Found", error_pages, request_id).await,
    };

    let target = if root_meta.is_file() {
        root_path.to_path_buf()
    } else {
        let relative = request.path.trim_start_matches('/');
        let joined = root_path.join(relative);
        match resolve_under_root(root_path, &joined).await {
            Some(path) => path,
            None => return write_error(client, 403, "Forbidden", error_pages, request_id).await,
        }
    };

    let metadata = match tokio::fs::metadata(&target).await {
        Ok(m) => m,
        Err(_) => return write_error(client, 404, "Not Found", error_pages, request_id).await,
    };

    if metadata.is_dir() {
        let index = target.join("index.html");
        if tokio::fs::metadata(&index).await.map(|m| m.is_file()).unwrap_or(false) {
            return serve_file(client, &index, request, request_id).await;
        }
        return serve_directory_listing(client, root_path, &target, &request.path, request_id).await;
    }

    serve_file(client, &target, request, request_id).await
}

/// Join `root` and `joined`, rejecting the result if it escapes `root`.
async fn resolve_under_root(root: &Path, joined: &Path) -> Option<PathBuf> {
    let canonical_root = tokio::fs::canonicalize(root).await.ok()?;
    match tokio::fs::canonicalize(joined).await {
        Ok(canonical) => canonical.starts_with(&canonical_root).then_some(canonical),
        // Path may not exist yet (e.g. a 404); fall back to a lexical check
        // against the un-canonicalized root so a missing file still 404s
        // instead of silently 403ing.
        Err(_) => joined.starts_with(root).then(|| joined.to_path_buf()),
    }
}

async fn serve_directory_listing(
    client: &mut ClientConnection,
    root: &Path,
    dir: &Path,
    request_path: &str,
    request_id: &str,
) -> Result<StaticOutcome, ProxyError> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        entries.push((name, is_dir));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut body = String::new();
    body.push_str("<!DOCTYPE html><html><head><title>Index of ");
    body.push_str(request_path);
    body.push_str("</title></head><body><h1>Index of ");
    body.push_str(request_path);
    body.push_str("</h1><ul>");
    if dir != root {
        body.push_str("<li><a href=\"../\">../</a></li>");
    }
    for (name, is_dir) in entries {
        let suffix = if is_dir { "/" } else { "" };
        body.push_str(&format!("<li><a href=\"{name}{suffix}\">{name}{suffix}</a></li>"));
    }
    body.push_str("</ul></body></html>");

    write_response(client, 200, "text/html; charset=utf-8", body.into_bytes(), request_id).await
}

async fn serve_file(
    client: &mut ClientConnection,
    path: &Path,
    request: &Request,
    request_id: &str,
) -> Result<StaticOutcome, ProxyError> {
    let metadata = tokio::fs::metadata(path).await?;
    let size = metadata.len();
    let modified = metadata.modified().unwrap_or(UNIX_EPOCH);
    let modified_ms = modified.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    let etag = format!("\"{:x}-{:x}\"", modified_ms, size);
    let last_modified = httpdate::fmt_http_date(modified);

    if let Some(if_none_match) = request.headers.get("if-none-match") {
        if matches_etag(if_none_match, &etag) {
            return write_not_modified(client, &etag, &last_modified, request_id).await;
        }
    } else if let Some(if_modified_since) = request.headers.get("if-modified-since") {
        if let Ok(client_date) = httpdate::parse_http_date(if_modified_since) {
            let tolerance = std::time::Duration::from_secs(1);
            if modified <= client_date + tolerance {
                return write_not_modified(client, &etag, &last_modified, request_id).await;
            }
        }
    }

    let content_type = mime_guess::from_path(path).first_or_octet_stream().to_string();

    if let Some(range_header) = request.headers.get("range") {
        return serve_range(client, path, size, range_header, &content_type, &etag, &last_modified, request_id).await;
    }

    let accepts_gzip = request.headers.get("accept-encoding").map(|v| v.contains("gzip")).unwrap_or(false);
    if accepts_gzip && COMPRESSIBLE.contains(&content_type.as_str()) {
        return serve_gzip(client, path, &content_type, &etag, &last_modified, request_id).await;
    }

    let file = tokio::fs::File::open(path).await?;
    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {size}\r\nETag: {etag}\r\nLast-Modified: {last_modified}\r\nAccept-Ranges: bytes\r\nX-Request-Id: {request_id}\r\n\r\n"
    );
    client.write_all(head.as_bytes()).await?;

    let mut bytes_sent = head.len() as u64;
    bytes_sent += copy_file(client, file).await?;
    client.flush().await?;
    Ok(StaticOutcome { status: 200, bytes_sent })
}

async fn copy_file(client: &mut ClientConnection, mut file: tokio::fs::File) -> Result<u64, ProxyError> {
    if let Some(socket) = client.raw_socket() {
        return Ok(tokio::io::copy(&mut file, socket).await?);
    }
    Ok(tokio::io::copy(&mut file, client).await?)
}

async fn serve_gzip(
    client: &mut ClientConnection,
    path: &Path,
    content_type: &str,
    etag: &str,
    last_modified: &str,
    request_id: &str,
) -> Result<StaticOutcome, ProxyError> {
    let file = tokio::fs::File::open(path).await?;
    let mut encoder = GzipEncoder::new(BufReader::new(file));

    let head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Encoding: gzip\r\nTransfer-Encoding: chunked\r\nETag: {etag}\r\nLast-Modified: {last_modified}\r\nVary: Accept-Encoding\r\nX-Request-Id: {request_id}\r\n\r\n"
    );
    client.write_all(head.as_bytes()).await?;
    http1::write_chunked_from_reader(&mut encoder, client).await?;
    Ok(StaticOutcome { status: 200, bytes_sent: 0 })
}

async fn serve_range(
    client: &mut ClientConnection,
    path: &Path,
    size: u64,
    range_header: &str,
    content_type: &str,
    etag: &str,
    last_modified: &str,
    request_id: &str,
) -> Result<StaticOutcome, ProxyError> {
    let (start, end) = match parse_range(range_header, size) {
        Some(range) => range,
        None => {
            let head = format!("HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{size}\r\nContent-Length: 0\r\nX-Request-Id: {request_id}\r\n\r\n");
            client.write_all(head.as_bytes()).await?;
            client.flush().await?;
            return Ok(StaticOutcome { status: 416, bytes_sent: head.len() as u64 });
        }
    };

    let length = end - start + 1;
    let head = format!(
        "HTTP/1.1 206 Partial Content\r\nContent-Type: {content_type}\r\nContent-Range: bytes {start}-{end}/{size}\r\nContent-Length: {length}\r\nETag: {etag}\r\nLast-Modified: {last_modified}\r\nAccept-Ranges: bytes\r\nX-Request-Id: {request_id}\r\n\r\n"
    );
    client.write_all(head.as_bytes()).await?;

    let mut file = tokio::fs::File::open(path).await?;
    tokio::io::AsyncSeekExt::seek(&mut file, std::io::SeekFrom::Start(start)).await?;
    let mut remaining = length;
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let to_read = remaining.min(buf.len() as u64) as usize;
        let n = tokio::io::AsyncReadExt::read(&mut file, &mut buf[..to_read]).await?;
        if n == 0 {
            break;
        }
        client.write_all(&buf[..n]).await?;
        remaining -= n as u64;
    }
    client.flush().await?;

    Ok(StaticOutcome { status: 206, bytes_sent: head.len() as u64 + length })
}

/// Parse `bytes=start-end|start-|-suffix`, validating `0 <= start <= end < size`.
fn parse_range(header: &str, size: u64) -> Option<(u64, u64)> {
    let spec = header.strip_prefix("bytes=")?;
    let (start_str, end_str) = spec.split_once('-')?;

    let (start, end) = if start_str.is_empty() {
        let suffix: u64 = end_str.parse().ok()?;
        if suffix == 0 || suffix > size {
            (0, size.saturating_sub(1))
        } else {
            (size - suffix, size - 1)
        }
    } else if end_str.is_empty() {
        (start_str.parse().ok()?, size.saturating_sub(1))
    } else {
        (start_str.parse().ok()?, end_str.parse().ok()?)
    };

    if size == 0 || start > end || end >= size {
        return None;
    }
    Some((start, end))
}

fn matches_etag(if_none_match: &str, etag: &str) -> bool {
    if if_none_match.trim() == "*" {
        return true;
    }
    if_none_match.split(',').any(|candidate| candidate.trim() == etag)
}

async fn write_not_modified(
    client: &mut ClientConnection,
    etag: &str,
    last_modified: &str,
    request_id: &str,
) -> Result<StaticOutcome, ProxyError> {
    let head = format!("HTTP/1.1 304 Not Modified\r\nETag: {etag}\r\nLast-Modified: {last_modified}\r\nContent-Length: 0\r\nX-Request-Id: {request_id}\r\n\r\n");
    client.write_all(head.as_bytes()).await?;
    client.flush().await?;
    Ok(StaticOutcome { status: 304, bytes_sent: head.len() as u64 })
}

async fn write_error(
    client: &mut ClientConnection,
    status: u16,
    reason: &str,
    error_pages: &HashMap<u16, String>,
    request_id: &str,
) -> Result<StaticOutcome, ProxyError> {
    if let Some(page_path) = error_pages.get(&status) {
        if let Ok(body) = tokio::fs::read(page_path).await {
            let head = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nX-Request-Id: {request_id}\r\n\r\n",
                body.len()
            );
            client.write_all(head.as_bytes()).await?;
            client.write_all(&body).await?;
            client.flush().await?;
            return Ok(StaticOutcome { status, bytes_sent: head.len() as u64 + body.len() as u64 });
        }
    }

    let body = format!(
        "<!DOCTYPE html><html><head><title>{status} {reason}</title></head><body><h1>{status} {reason}</h1></body></html>"
    );
    write_response(client, status, "text/html; charset=utf-8", body.into_bytes(), request_id).await
}

async fn write_response(
    client: &mut ClientConnection,
    status: u16,
    content_type: &str,
    body: Vec<u8>,
    request_id: &str,
) -> Result<StaticOutcome, ProxyError> {
    let reason = crate::error::reason_phrase(status);
    let head = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nX-Request-Id: {request_id}\r\n\r\n",
        body.len()
    );
    client.write_all(head.as_bytes()).await?;
    client.write_all(&body).await?;
    client.flush().await?;
    Ok(StaticOutcome { status, bytes_sent: head.len() as u64 + body.len() as u64 })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_range() {
        assert_eq!(parse_range("bytes=0-99", 200), Some((0, 99)));
    }

    #[test]
    fn parses_open_ended_range() {
        assert_eq!(parse_range("bytes=100-", 200), Some((100, 199)));
    }

    #[test]
    fn parses_suffix_range() {
        assert_eq!(parse_range("bytes=-50", 200), Some((150, 199)));
    }

    #[test]
    fn rejects_out_of_bounds_range() {
        assert_eq!(parse_range("bytes=150-300", 200), None);
        assert_eq!(parse_range("bytes=100-50", 200), None);
    }

    #[test]
    fn etag_matching() {
        assert!(matches_etag("\"abc\"", "\"abc\""));
        assert!(matches_etag("*", "\"abc\""));
        assert!(matches_etag("\"xyz\", \"abc\"", "\"abc\""));
        assert!(!matches_etag("\"xyz\"", "\"abc\""));
    }
}
