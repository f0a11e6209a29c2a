//! Hand-rolled HTTP/1.1 framing shared by the inbound client-facing parser
//! and the outbound backend response path.
//!
//! This intentionally does not depend on any HTTP framework: the proxy's
//! dispatch loop needs byte-exact control over header forwarding, chunked
//! relay, and raw-socket fallback, which a higher-level framework would
//! hide behind its own request/response types.

use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};

use crate::error::ProxyError;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// An ordered header list. Lookups are case-insensitive; the original
/// casing supplied at construction time is preserved so it can be
/// forwarded unchanged.
#[derive(Debug, Clone, Default)]
pub struct HeaderList(Vec<(String, String)>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// True if `name`'s value contains `token` as one of its comma-separated
    /// entries, compared case-insensitively (used for `Connection: upgrade`
    /// and `Transfer-Encoding: chunked`).
    pub fn contains_token(&self, name: &str, token: &str) -> bool {
        self.get(name)
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
            .unwrap_or(false)
    }

    pub fn remove(&mut self, name: &str) {
        self.0.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Remove every header whose name starts with `prefix`, case-insensitive.
    pub fn remove_prefixed(&mut self, prefix: &str) {
        self.0
            .retain(|(k, _)| !k.len().ge(&prefix.len()) || !k[..prefix.len()].eq_ignore_ascii_case(prefix));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A parsed request line and headers, excluding the body.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub version: String,
    pub headers: HeaderList,
    /// Byte length of the header block including the terminating CRLFCRLF.
    pub header_length: usize,
    /// From Content-Length; 0 if absent, invalid, or chunked.
    pub body_length: u64,
    pub chunked: bool,
    pub host: Option<String>,
}

impl Request {
    pub fn target(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    pub fn is_websocket_upgrade(&self) -> bool {
        self.headers.contains_token("connection", "upgrade")
            && self
                .headers
                .get("upgrade")
                .map(|v| v.eq_ignore_ascii_case("websocket"))
                .unwrap_or(false)
    }
}

/// A parsed backend response status line and headers, excluding the body.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: String,
    pub status: u16,
    pub reason: String,
    pub headers: HeaderList,
    pub header_length: usize,
}

/// Find the end of the header block (`\r\n\r\n`), returning the offset of
/// the first byte of the body within `buf`.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == HEADER_TERMINATOR).map(|i| i + 4)
}

fn parse_header_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Result<HeaderList, ()> {
    let mut headers = HeaderList::new();
    for line in lines {
        let (name, value) = line.split_once(':').ok_or(())?;
        headers.push(name.trim(), value.trim());
    }
    Ok(headers)
}

/// Parse a request line + headers from `buf`. `buf` MUST already contain a
/// full header block (see [`find_header_end`]).
pub fn parse_request_head(buf: &[u8]) -> Result<Request, ProxyError> {
    let header_length = find_header_end(buf).ok_or(ProxyError::BadRequest)?;
    let head = std::str::from_utf8(&buf[..header_length]).map_err(|_| ProxyError::BadRequest)?;
    let head = &head[..head.len() - HEADER_TERMINATOR.len()];

    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or(ProxyError::BadRequest)?;
    let mut tokens = request_line.split(' ');
    let method = tokens.next().ok_or(ProxyError::BadRequest)?.to_string();
    let raw_target = tokens.next().ok_or(ProxyError::BadRequest)?.to_string();
    let version = tokens.next().ok_or(ProxyError::BadRequest)?.to_string();
    if tokens.next().is_some() || method.is_empty() || raw_target.is_empty() {
        return Err(ProxyError::BadRequest);
    }

    let (path, query) = match raw_target.split_once('?') {
        Some((p, q)) => (p.to_string(), Some(q.to_string())),
        None => (raw_target, None),
    };

    let headers = parse_header_lines(lines).map_err(|_| ProxyError::BadRequest)?;
    let chunked = headers.contains_token("transfer-encoding", "chunked");
    let body_length = if chunked {
        0
    } else {
        headers
            .get("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0)
    };
    let host = headers.get("host").map(|h| h.to_string());

    Ok(Request {
        method,
        path,
        query,
        version,
        headers,
        header_length,
        body_length,
        chunked,
        host,
    })
}

/// Parse a status line + headers from a backend's response head.
pub fn parse_response_head(buf: &[u8]) -> Result<ResponseHead, ProxyError> {
    let bad = |msg: &str| ProxyError::BadGateway(msg.to_string());
    let header_length = find_header_end(buf).ok_or_else(|| bad("missing header terminator"))?;
    let head = std::str::from_utf8(&buf[..header_length]).map_err(|_| bad("non-UTF-8 response head"))?;
    let head = &head[..head.len() - HEADER_TERMINATOR.len()];

    let mut lines = head.split("\r\n");
    let status_line = lines.next().ok_or_else(|| bad("missing status line"))?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().ok_or_else(|| bad("malformed status line"))?.to_string();
    let status: u16 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| bad("malformed status code"))?;
    let reason = parts.next().unwrap_or("").to_string();

    let headers = parse_header_lines(lines).map_err(|_| bad("malformed response headers"))?;

    Ok(ResponseHead {
        version,
        status,
        reason,
        headers,
        header_length,
    })
}

async fn read_line<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        reader.read_exact(&mut byte).await?;
        line.push(byte[0]);
        if line.len() >= 2 && &line[line.len() - 2..] == b"\r\n" {
            return Ok(line);
        }
        if line.len() > 64 * 1024 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "chunk metadata line too long",
            ));
        }
    }
}

/// Relay a `Transfer-Encoding: chunked` body byte-for-byte (chunk-size
/// line, chunk data, CRLF, ... zero-size chunk, optional trailers, final
/// CRLF) from `reader` to `writer`.
pub async fn relay_chunked_body<R, W>(reader: &mut R, writer: &mut W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let size_line = read_line(reader).await?;
        writer.write_all(&size_line).await?;

        let size_str = String::from_utf8_lossy(&size_line);
        let size_str = size_str.trim_end_matches("\r\n");
        let size_str = size_str.split(';').next().unwrap_or("0").trim();
        let size = usize::from_str_radix(size_str, 16)
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "bad chunk size"))?;

        if size == 0 {
            loop {
                let trailer_line = read_line(reader).await?;
                writer.write_all(&trailer_line).await?;
                if trailer_line == b"\r\n" {
                    break;
                }
            }
            break;
        }

        let mut data = vec![0u8; size + 2];
        reader.read_exact(&mut data).await?;
        writer.write_all(&data).await?;
    }
    writer.flush().await?;
    Ok(())
}

/// Stream `reader` to `writer` as a chunked-encoded body, without knowing
/// the total length up front. Used for on-the-fly gzip compression where
/// the compressed size can't be precomputed.
pub async fn write_chunked_from_reader<R, W>(reader: &mut R, writer: &mut W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(format!("{:x}\r\n", n).as_bytes()).await?;
        writer.write_all(&buf[..n]).await?;
        writer.write_all(b"\r\n").await?;
    }
    writer.write_all(b"0\r\n\r\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Relay exactly `len` bytes from `reader` to `writer`.
pub async fn relay_fixed_body<R, W>(reader: &mut R, writer: &mut W, len: u64) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut remaining = len;
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let to_read = remaining.min(buf.len() as u64) as usize;
        reader.read_exact(&mut buf[..to_read]).await?;
        writer.write_all(&buf[..to_read]).await?;
        remaining -= to_read as u64;
    }
    writer.flush().await?;
    Ok(())
}

/// Wraps an already-buffered prefix (bytes read past a header block before
/// the caller knew how much body there'd be) in front of a live reader, so
/// relay helpers can treat "already read" and "still on the wire" the same
/// way.
pub struct PrefixedReader<'a, R> {
    prefix: &'a [u8],
    pos: usize,
    inner: R,
}

impl<'a, R> PrefixedReader<'a, R> {
    pub fn new(prefix: &'a [u8], inner: R) -> Self {
        Self { prefix, pos: 0, inner }
    }
}

impl<'a, R: AsyncRead + Unpin> AsyncRead for PrefixedReader<'a, R> {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        if this.pos < this.prefix.len() {
            let remaining = &this.prefix[this.pos..];
            let n = remaining.len().min(buf.remaining());
            buf.put_slice(&remaining[..n]);
            this.pos += n;
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}
