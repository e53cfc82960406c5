use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use super::states::FilterState;

pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 60;
const DEFAULT_SHARDS: usize = 16;

/// Keyed store of per-conversation filter state.
///
/// Turns for one conversation are sequential; the last `set` wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, conversation_id: &str) -> Option<FilterState>;
    async fn set(&self, conversation_id: &str, state: FilterState);
    /// Returns whether an entry was removed.
    async fn delete(&self, conversation_id: &str) -> bool;
    /// Drops entries idle for longer than the store's TTL and returns how
    /// many were removed.
    async fn evict_expired(&self, now: DateTime<Utc>) -> usize;
    async fn len(&self) -> usize;
}

/// Process-local store. Entries are spread over independently locked
/// shards so unrelated conversations do not contend on one lock.
pub struct InMemorySessionStore {
    shards: Vec<RwLock<HashMap<String, FilterState>>>,
    ttl: Duration,
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::with_ttl_secs(DEFAULT_SESSION_TTL_SECS)
    }
}

impl InMemorySessionStore {
    pub fn with_ttl_secs(ttl_secs: u64) -> Self {
        Self::with_shards(ttl_secs, DEFAULT_SHARDS)
    }

    pub fn with_shards(ttl_secs: u64, shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1)).map(|_| RwLock::new(HashMap::new())).collect();
        let ttl_secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000);
        let ttl = Duration::seconds(ttl_secs);
        Self { shards, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn shard(&self, conversation_id: &str) -> &RwLock<HashMap<String, FilterState>> {
        let mut hasher = DefaultHasher::new();
        conversation_id.hash(&mut hasher);
        let index = (hasher.finish() % self.shards.len() as u64) as usize;
        &self.shards[index]
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, conversation_id: &str) -> Option<FilterState> {
        let sessions = self.shard(conversation_id).read().await;
        sessions.get(conversation_id).cloned()
    }

    async fn set(&self, conversation_id: &str, state: FilterState) {
        let mut sessions = self.shard(conversation_id).write().await;
        sessions.insert(conversation_id.to_owned(), state);
    }

    async fn delete(&self, conversation_id: &str) -> bool {
        let mut sessions = self.shard(conversation_id).write().await;
        sessions.remove(conversation_id).is_some()
    }

    async fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        for shard in &self.shards {
            let mut sessions = shard.write().await;
            let before = sessions.len();
            sessions.retain(|_, state| !state.is_expired(now, self.ttl));
            evicted += before - sessions.len();
        }
        if evicted > 0 {
            tracing::debug!(
                event_name = "flow.session.evicted",
                evicted,
                "expired conversation sessions removed"
            );
        }
        evicted
    }

    async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        total
    }
}
