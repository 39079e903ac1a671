use crate::errors::{AppError, AppResult};
use crate::redaction::mask_connection_url;
use redis::Commands;
use std::collections::BTreeMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// Key-value namespace holding JSON-encoded CRM records.
///
/// `keys` supports `*` (everything), `<prefix>*` and exact keys; no other glob
/// syntax is interpreted.
pub trait KeyValueStore: Send + Sync {
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn keys(&self, pattern: &str) -> AppResult<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Redis,
    Memory,
}

impl BackendKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Redis => "Connected",
            Self::Memory => "Fallback (in-memory)",
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AppError::Internal("memory store lock poisoned".to_string()))?;
        Ok(entries
            .keys()
            .filter(|key| matches_pattern(key, pattern))
            .cloned()
            .collect())
    }
}

fn matches_pattern(key: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

/// Translates a store pattern into a Redis `KEYS` glob: only a trailing `*`
/// stays a wildcard, everything else is matched literally.
fn redis_glob(pattern: &str) -> String {
    let (literal, wildcard) = match pattern.strip_suffix('*') {
        Some(prefix) => (prefix, true),
        None => (pattern, false),
    };
    let mut glob = String::with_capacity(pattern.len() + 4);
    for ch in literal.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            glob.push('\\');
        }
        glob.push(ch);
    }
    if wildcard {
        glob.push('*');
    }
    glob
}

pub struct RedisStore {
    conn: Mutex<redis::Connection>,
}

impl RedisStore {
    /// Opens a connection and pings it so an unreachable server is reported here
    /// rather than on the first read.
    pub fn connect(url: &str, timeout: Duration) -> AppResult<Self> {
        let client = redis::Client::open(url).map_err(|error| AppError::Config(error.to_string()))?;
        let mut conn = client.get_connection_with_timeout(timeout)?;
        conn.set_read_timeout(Some(timeout))?;
        conn.set_write_timeout(Some(timeout))?;
        redis::cmd("PING").query::<String>(&mut conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>) -> AppResult<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("redis connection mutex poisoned".to_string()))?;
        f(&mut conn).map_err(AppError::from)
    }
}

impl KeyValueStore for RedisStore {
    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.with_conn(|conn| conn.set::<_, _, ()>(key, value))
    }

    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let raw: Option<Vec<u8>> = self.with_conn(|conn| conn.get(key))?;
        raw.map(|bytes| {
            String::from_utf8(bytes).map_err(|_| AppError::Storage(format!("value under {} is not UTF-8", key)))
        })
        .transpose()
    }

    fn keys(&self, pattern: &str) -> AppResult<Vec<String>> {
        let glob = redis_glob(pattern);
        let mut keys: Vec<String> = self.with_conn(|conn| conn.keys(glob))?;
        keys.sort();
        Ok(keys)
    }
}

/// The store selected for this process plus the notices produced while choosing it.
pub struct StorageHandle {
    pub store: Box<dyn KeyValueStore>,
    pub kind: BackendKind,
    pub notices: Vec<String>,
}

impl StorageHandle {
    pub fn memory() -> Self {
        Self {
            store: Box::new(MemoryStore::new()),
            kind: BackendKind::Memory,
            notices: Vec::new(),
        }
    }
}

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

/// Resolves the configured URL and password into a connection URL.
///
/// Returns the URL and, when nothing was configured, a notice explaining the
/// default that was used.
pub fn resolve_redis_url(url: Option<&str>, password: Option<&str>) -> (String, Option<String>) {
    let password = password.map(str::trim).filter(|value| !value.is_empty());
    let Some(url) = url.map(str::trim).filter(|value| !value.is_empty()) else {
        return (
            DEFAULT_REDIS_URL.to_string(),
            Some(format!("REDIS_URL is not configured; using {}", DEFAULT_REDIS_URL)),
        );
    };

    let scheme = ["redis://", "rediss://"]
        .into_iter()
        .find(|scheme| url.starts_with(scheme));
    let Some(scheme) = scheme else {
        let resolved = match password {
            Some(password) => format!("redis://:{}@{}", password, url),
            None => format!("redis://{}", url),
        };
        return (resolved, None);
    };

    let rest = &url[scheme.len()..];
    let authority = rest.split('/').next().unwrap_or(rest);
    match password {
        Some(password) if !authority.contains('@') => (format!("{}:{}@{}", scheme, password, rest), None),
        _ => (url.to_string(), None),
    }
}

/// Picks the networked backend when it answers, the in-memory one otherwise.
pub fn connect_with_fallback(url: Option<&str>, password: Option<&str>, timeout: Duration) -> StorageHandle {
    let (resolved, default_notice) = resolve_redis_url(url, password);
    let mut notices: Vec<String> = default_notice.into_iter().collect();
    let masked = mask_connection_url(&resolved);

    match RedisStore::connect(&resolved, timeout) {
        Ok(store) => {
            tracing::info!(url = %masked, "connected to redis");
            StorageHandle {
                store: Box::new(store),
                kind: BackendKind::Redis,
                notices,
            }
        }
        Err(error) => {
            tracing::warn!(url = %masked, error = %error, "redis unavailable, using in-memory storage");
            notices.push(format!(
                "Could not connect to Redis at {} ({}); using temporary in-memory storage",
                masked, error
            ));
            StorageHandle {
                store: Box::new(MemoryStore::new()),
                kind: BackendKind::Memory,
                notices,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_pattern_returns_exactly_prefixed_keys() {
        let store = MemoryStore::new();
        for key in ["interaction:b", "other:x", "interaction:a", "interactions", "interaction:c"] {
            store.set(key, "{}").expect("set");
        }

        let mut keys = store.keys("interaction:*").expect("keys");
        keys.sort();
        assert_eq!(keys, vec!["interaction:a", "interaction:b", "interaction:c"]);
        assert_eq!(store.keys("*").expect("all").len(), 5);
        assert_eq!(store.keys("other:x").expect("exact"), vec!["other:x"]);
    }

    #[test]
    fn set_overwrites_and_get_misses_return_none() {
        let store = MemoryStore::new();
        store.set("interaction:1", "first").expect("set");
        store.set("interaction:1", "second").expect("overwrite");
        assert_eq!(store.get("interaction:1").expect("get").as_deref(), Some("second"));
        assert_eq!(store.get("interaction:2").expect("get"), None);
    }

    #[test]
    fn redis_url_resolution_follows_configured_shape() {
        let (url, notice) = resolve_redis_url(None, None);
        assert_eq!(url, DEFAULT_REDIS_URL);
        assert!(notice.is_some());

        let (url, _) = resolve_redis_url(Some("cache.example.com:15559"), Some("s3cret"));
        assert_eq!(url, "redis://:s3cret@cache.example.com:15559");

        let (url, _) = resolve_redis_url(Some("cache.example.com:15559"), Some(""));
        assert_eq!(url, "redis://cache.example.com:15559");

        let (url, _) = resolve_redis_url(Some("rediss://cache.example.com:6380/0"), Some("pw"));
        assert_eq!(url, "rediss://:pw@cache.example.com:6380/0");

        let (url, _) = resolve_redis_url(Some("redis://user:pw@cache:6379"), Some("other"));
        assert_eq!(url, "redis://user:pw@cache:6379");
    }

    #[test]
    fn redis_globs_escape_everything_but_the_trailing_star() {
        assert_eq!(redis_glob("interaction:*"), "interaction:*");
        assert_eq!(redis_glob("*"), "*");
        assert_eq!(redis_glob("a?b[1]*"), "a\\?b\\[1\\]*");
        assert_eq!(redis_glob("back\\slash"), "back\\\\slash");
        assert_eq!(redis_glob("x*y"), "x\\*y");
    }

    #[test]
    fn tls_urls_are_accepted_by_the_client() {
        let (url, _) = resolve_redis_url(Some("rediss://cache.example.com:6380/0"), Some("pw"));
        assert!(redis::Client::open(url.as_str()).is_ok());
    }

    #[test]
    fn unreachable_redis_falls_back_to_memory_with_notice() {
        let handle = connect_with_fallback(Some("redis://127.0.0.1:1"), Some("pw"), Duration::from_millis(200));
        assert_eq!(handle.kind, BackendKind::Memory);
        assert!(handle.notices.iter().any(|notice| notice.contains("in-memory")));
        assert!(handle.notices.iter().all(|notice| !notice.contains("pw@")));

        handle.store.set("interaction:1", "{}").expect("fallback set");
        assert_eq!(handle.store.keys("interaction:*").expect("keys").len(), 1);
    }
}
