use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use tracing::warn;

/// `Title -> Link set` memoization, shared across concurrent requests.
///
/// Implementations must never fail the caller: a backend outage degrades to
/// cache-miss on `get` and a silent drop on `put`.
#[async_trait]
pub trait LinkCache: Send + Sync {
    async fn get(&self, title: &str) -> Option<Vec<String>>;
    async fn put(&self, title: &str, links: Vec<String>);
}

/// Process-wide in-memory cache. Non-blocking `get`, lock-free `put` under
/// concurrent readers and writers (backed by a sharded concurrent map rather
/// than a single mutex around a `HashMap`).
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Vec<String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

#[async_trait]
impl LinkCache for MemoryCache {
    async fn get(&self, title: &str) -> Option<Vec<String>> {
        self.entries.get(title).map(|v| v.clone())
    }

    async fn put(&self, title: &str, links: Vec<String>) {
        self.entries.insert(title.to_string(), links);
    }
}

/// Redis-backed cache. Values are JSON-encoded arrays of Title strings,
/// keyed by Title verbatim (§6). Host is fixed to `localhost`; port comes
/// from configuration.
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(port: u16) -> anyhow::Result<Self> {
        let client = redis::Client::open(format!("redis://localhost:{port}"))?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl LinkCache for RedisCache {
    async fn get(&self, title: &str) -> Option<Vec<String>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = match redis::cmd("GET")
            .arg(title)
            .query_async(&mut conn)
            .await
        {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, title, "redis get failed; treating as cache miss");
                return None;
            }
        };
        let raw = raw?;
        match serde_json::from_str(&raw) {
            Ok(links) => Some(links),
            Err(err) => {
                warn!(%err, title, "redis value failed to decode; treating as cache miss");
                None
            }
        }
    }

    async fn put(&self, title: &str, links: Vec<String>) {
        let mut conn = self.conn.clone();
        let encoded = match serde_json::to_string(&links) {
            Ok(s) => s,
            Err(err) => {
                warn!(%err, title, "failed to encode links for cache write; dropping");
                return;
            }
        };
        let result: redis::RedisResult<()> = redis::cmd("SET")
            .arg(title)
            .arg(encoded)
            .query_async(&mut conn)
            .await;
        if let Err(err) = result {
            warn!(%err, title, "redis put failed; dropping write");
        }
    }
}
