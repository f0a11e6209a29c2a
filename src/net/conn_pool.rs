//! Bounded per-(host, port) connection pool to backends.
//!
//! Acquire pops a still-open idle connection if one exists, else opens a
//! fresh one. Release enqueues the connection if the pool has room and the
//! peer hasn't closed it, else drops it (closing the socket).

use std::collections::VecDeque;

use dashmap::DashMap;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

const DEFAULT_MAX_IDLE: usize = 10;

pub struct ConnectionPool {
    pools: DashMap<String, Mutex<VecDeque<TcpStream>>>,
    max_idle: usize,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            pools: DashMap::new(),
            max_idle,
        }
    }

    /// Acquire a connection to `host:port`, reusing an idle one if possible.
    pub async fn acquire(&self, host: &str, port: u16) -> std::io::Result<TcpStream> {
        let key = format!("{host}:{port}");
        if let Some(entry) = self.pools.get(&key) {
            let mut queue = entry.lock().await;
            while let Some(conn) = queue.pop_front() {
                if still_open(&conn) {
                    return Ok(conn);
                }
            }
        }
        TcpStream::connect((host, port)).await
    }

    /// Return a connection to the pool for reuse, or drop it if the pool is
    /// full or the connection is no longer open.
    pub async fn release(&self, host: &str, port: u16, conn: TcpStream) {
        if !still_open(&conn) {
            return;
        }
        let key = format!("{host}:{port}");
        let entry = self
            .pools
            .entry(key)
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut queue = entry.lock().await;
        if queue.len() < self.max_idle {
            queue.push_back(conn);
        }
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort liveness check: a non-blocking read that returns `Ok(0)`
/// means the peer sent EOF and the connection is dead; `WouldBlock` means
/// no data is pending but the socket is still open.
fn still_open(conn: &TcpStream) -> bool {
    let mut probe = [0u8; 1];
    match conn.try_read(&mut probe) {
        Ok(0) => false,
        Ok(_) => true,
        Err(e) => e.kind() == std::io::ErrorKind::WouldBlock,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn reuses_released_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let pool = ConnectionPool::new();
        let conn = pool.acquire("127.0.0.1", addr.port()).await.unwrap();
        pool.release("127.0.0.1", addr.port(), conn).await;

        let key = format!("127.0.0.1:{}", addr.port());
        assert_eq!(pool.pools.get(&key).unwrap().lock().await.len(), 1);

        let _reused = pool.acquire("127.0.0.1", addr.port()).await.unwrap();
        assert_eq!(pool.pools.get(&key).unwrap().lock().await.len(), 0);
    }

    #[tokio::test]
    async fn drops_connections_beyond_max_idle() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let _ = listener.accept().await;
            }
        });

        let pool = ConnectionPool::with_max_idle(1);
        let c1 = pool.acquire("127.0.0.1", addr.port()).await.unwrap();
        let c2 = pool.acquire("127.0.0.1", addr.port()).await.unwrap();
        pool.release("127.0.0.1", addr.port(), c1).await;
        pool.release("127.0.0.1", addr.port(), c2).await;

        let key = format!("127.0.0.1:{}", addr.port());
        assert_eq!(pool.pools.get(&key).unwrap().lock().await.len(), 1);
    }
}
