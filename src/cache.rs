use redis::{AsyncCommands, aio::ConnectionManager};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use utoipa::ToSchema;
use uuid::Uuid;

/// Named TTL buckets bounding cached-response lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    Short,
    Medium,
    Long,
    VeryLong,
    Daily,
}

impl CacheTier {
    pub fn secs(self) -> u64 {
        match self {
            CacheTier::Short => 300,
            CacheTier::Medium => 1800,
            CacheTier::Long => 3600,
            CacheTier::VeryLong => 21600,
            CacheTier::Daily => 86400,
        }
    }
}

/// Best-effort cache facade over Redis. Every operation swallows backend
/// errors: a failed read is a miss, a failed write is a no-op. The manager
/// runs disabled when no connection could be established at startup, so the
/// API keeps serving from the database.
#[derive(Clone)]
pub struct CacheManager {
    conn: Option<ConnectionManager>,
    prefix: String,
}

impl CacheManager {
    pub async fn connect(redis_url: &str, prefix: &str) -> Self {
        let conn = match redis::Client::open(redis_url) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(conn) => Some(conn),
                Err(err) => {
                    tracing::warn!(error = %err, "redis unavailable, cache disabled");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "invalid redis url, cache disabled");
                None
            }
        };
        Self {
            conn,
            prefix: prefix.to_string(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            conn: None,
            prefix: "shop".to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone()?;
        let full = self.full_key(key);
        match conn.get::<_, Option<String>>(&full).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::debug!(key = %full, error = %err, "cache entry undecodable, dropping");
                    self.delete(key).await;
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                tracing::debug!(key = %full, error = %err, "cache get skipped");
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, tier: CacheTier) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        let full = self.full_key(key);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(key = %full, error = %err, "cache set skipped: unserializable");
                return false;
            }
        };
        match conn.set_ex::<_, _, ()>(&full, raw, tier.secs()).await {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(key = %full, error = %err, "cache set skipped");
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        let Some(mut conn) = self.conn.clone() else {
            return false;
        };
        let full = self.full_key(key);
        match conn.del::<_, ()>(&full).await {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(key = %full, error = %err, "cache delete skipped");
                false
            }
        }
    }

    /// Delete all keys matching `pattern` (SCAN + DEL). Returns the number
    /// of keys removed.
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        let Some(mut conn) = self.conn.clone() else {
            return 0;
        };
        let full = self.full_key(pattern);
        let mut removed: u64 = 0;
        let mut cursor: u64 = 0;
        loop {
            let scanned: Result<(u64, Vec<String>), _> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&full)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await;
            let (next, keys) = match scanned {
                Ok(page) => page,
                Err(err) => {
                    tracing::debug!(pattern = %full, error = %err, "cache pattern delete skipped");
                    return removed;
                }
            };
            if !keys.is_empty() {
                match conn.del::<_, u64>(keys).await {
                    Ok(n) => removed += n,
                    Err(err) => {
                        tracing::debug!(pattern = %full, error = %err, "cache del batch failed");
                    }
                }
            }
            cursor = next;
            if cursor == 0 {
                break;
            }
        }
        removed
    }

    /// Invalidate every key under a group prefix, e.g. `products`.
    pub async fn invalidate_group(&self, group: &str) -> u64 {
        self.delete_pattern(&format!("{}:*", group)).await
    }

    /// Snapshot of backend health: key count under our prefix plus the
    /// server-wide counters from INFO. Zeroed when the cache is disabled.
    pub async fn stats(&self) -> CacheStats {
        let Some(mut conn) = self.conn.clone() else {
            return CacheStats::default();
        };
        let mut stats = CacheStats {
            enabled: true,
            ..CacheStats::default()
        };

        let pattern = self.full_key("*");
        let mut cursor: u64 = 0;
        loop {
            let scanned: Result<(u64, Vec<String>), _> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await;
            match scanned {
                Ok((next, keys)) => {
                    stats.total_keys += keys.len() as u64;
                    cursor = next;
                    if cursor == 0 {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, "cache key scan failed");
                    break;
                }
            }
        }

        let info: Result<String, _> = redis::cmd("INFO").query_async(&mut conn).await;
        match info {
            Ok(info) => {
                for line in info.lines() {
                    let Some((field, value)) = line.split_once(':') else {
                        continue;
                    };
                    let value = value.trim();
                    match field {
                        "connected_clients" => {
                            stats.connected_clients = value.parse().unwrap_or(0)
                        }
                        "used_memory_human" => stats.used_memory_human = value.to_string(),
                        "keyspace_hits" => stats.keyspace_hits = value.parse().unwrap_or(0),
                        "keyspace_misses" => stats.keyspace_misses = value.parse().unwrap_or(0),
                        _ => {}
                    }
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "cache INFO failed");
            }
        }

        let lookups = stats.keyspace_hits + stats.keyspace_misses;
        if lookups > 0 {
            stats.hit_rate =
                (stats.keyspace_hits as f64 / lookups as f64 * 10_000.0).round() / 100.0;
        }
        stats
    }
}

/// Backend counters exposed on the admin cache-stats endpoint.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct CacheStats {
    pub enabled: bool,
    pub total_keys: u64,
    pub connected_clients: u64,
    pub used_memory_human: String,
    pub keyspace_hits: u64,
    pub keyspace_misses: u64,
    /// Percentage of lookups served from cache, two decimal places.
    pub hit_rate: f64,
}

/// Standardized cache key builders, colon-joined under a per-entity group
/// so that `invalidate_group` can clear them wholesale.
pub mod keys {
    use super::*;

    pub fn product_detail(id: Uuid) -> String {
        format!("product:detail:{}", id)
    }

    pub fn product_list(query_fingerprint: &str) -> String {
        format!("products:list:{}", query_fingerprint)
    }

    pub fn category_list() -> String {
        "categories:list".to_string()
    }

    pub fn user_orders(user_id: Uuid, query_fingerprint: &str) -> String {
        format!("user:{}:orders:{}", user_id, query_fingerprint)
    }

    pub fn order_detail(user_id: Uuid, order_id: Uuid) -> String {
        format!("order:{}:user_{}", order_id, user_id)
    }

    pub fn order_stats() -> String {
        "stats:orders".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_match_configured_ttls() {
        assert_eq!(CacheTier::Short.secs(), 300);
        assert_eq!(CacheTier::Medium.secs(), 1800);
        assert_eq!(CacheTier::Long.secs(), 3600);
        assert_eq!(CacheTier::VeryLong.secs(), 21600);
        assert_eq!(CacheTier::Daily.secs(), 86400);
    }

    #[test]
    fn key_builders_are_deterministic_and_grouped() {
        let user = Uuid::nil();
        let order = Uuid::nil();
        assert_eq!(
            keys::user_orders(user, "page_2:per_20:status_pending:sort_DESC"),
            format!("user:{}:orders:page_2:per_20:status_pending:sort_DESC", user)
        );
        assert!(keys::order_detail(user, order).starts_with(&format!("order:{}", order)));
        assert!(keys::product_detail(order).starts_with("product:"));
        assert!(keys::product_list("abc").starts_with("products:"));
        assert_eq!(keys::order_stats(), "stats:orders");
    }

    #[tokio::test]
    async fn disabled_manager_is_a_silent_noop() {
        let cache = CacheManager::disabled();
        assert!(!cache.is_enabled());
        assert_eq!(cache.get::<String>("k").await, None);
        assert!(!cache.set("k", &"v", CacheTier::Short).await);
        assert!(!cache.delete("k").await);
        assert_eq!(cache.delete_pattern("k:*").await, 0);

        let stats = cache.stats().await;
        assert!(!stats.enabled);
        assert_eq!(stats.total_keys, 0);
        assert_eq!(stats.hit_rate, 0.0);
    }
}
