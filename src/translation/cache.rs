use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Source of the current time, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub original_content: String,
    pub translated_content: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// `{user}:{chapter}:{sha256(content)}`. Any change to the content yields a
/// different key.
pub fn derive_cache_key(user_id: &str, chapter_id: &str, content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("{}:{}:{}", user_id, chapter_id, hex::encode(digest))
}

/// TTL-bound translation cache. A single lock guards the whole key space.
pub struct TranslationCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    default_ttl_hours: i64,
}

impl TranslationCache {
    pub fn new(default_ttl_hours: i64) -> Self {
        Self::with_clock(default_ttl_hours, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl_hours: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            default_ttl_hours,
        }
    }

    pub fn default_ttl_hours(&self) -> i64 {
        self.default_ttl_hours
    }

    /// Cached translation, if present and unexpired. Expired entries are
    /// removed on the way out.
    pub async fn get(&self, user_id: &str, chapter_id: &str, content: &str) -> Option<String> {
        let key = derive_cache_key(user_id, chapter_id, content);
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;

        match entries.get(&key) {
            Some(entry) if entry.is_valid_at(now) => Some(entry.translated_content.clone()),
            Some(_) => {
                entries.remove(&key);
                tracing::debug!("Evicted expired translation {}", key);
                None
            }
            None => None,
        }
    }

    /// Stores a translation, replacing any entry under the same key. Returns
    /// the expiry time.
    pub async fn set(
        &self,
        user_id: &str,
        chapter_id: &str,
        original_content: &str,
        translated_content: &str,
        ttl_hours: Option<i64>,
    ) -> DateTime<Utc> {
        let key = derive_cache_key(user_id, chapter_id, original_content);
        let now = self.clock.now();
        let ttl = chrono::Duration::hours(ttl_hours.unwrap_or(self.default_ttl_hours));
        let expires_at = now + ttl;

        self.entries.lock().await.insert(
            key,
            CacheEntry {
                original_content: original_content.to_string(),
                translated_content: translated_content.to_string(),
                created_at: now,
                expires_at,
            },
        );
        expires_at
    }

    pub async fn invalidate(&self, user_id: &str, chapter_id: &str, content: &str) -> bool {
        let key = derive_cache_key(user_id, chapter_id, content);
        self.entries.lock().await.remove(&key).is_some()
    }

    /// Removes every expired entry and returns how many were dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid_at(now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Spawns the periodic sweep. The task runs until the runtime shuts down
    /// or the handle is aborted.
    pub fn start_cleanup(cache: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let removed = cache.cleanup_expired().await;
                if removed > 0 {
                    tracing::info!("Cache sweep removed {} expired translations", removed);
                }
            }
        })
    }
}
