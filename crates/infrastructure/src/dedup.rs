//! 内存去重存储
//!
//! 指纹 -> 任务 id 的条件插入映射。并发首次提交的竞争由
//! compare-and-set 语义解决：败者拿到胜者的任务 id，按缓存命中
//! 处理，不需要额外的锁。条目超过保留窗口后过期；过期只影响
//! 之后的去重命中，不影响仍在运行的任务。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use corretor_core::{CorretorResult, DedupConfig};
use corretor_domain::{ContentFingerprint, DedupStore, RegisterOutcome};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct DedupEntry {
    job_id: Uuid,
    registered_at: DateTime<Utc>,
}

pub struct InMemoryDedupStore {
    entries: Mutex<HashMap<ContentFingerprint, DedupEntry>>,
    retention: chrono::Duration,
}

impl InMemoryDedupStore {
    pub fn new(config: &DedupConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            retention: chrono::Duration::seconds(config.retention_seconds as i64),
        }
    }

    fn is_live(&self, entry: &DedupEntry, now: DateTime<Utc>) -> bool {
        now - entry.registered_at < self.retention
    }
}

#[async_trait]
impl DedupStore for InMemoryDedupStore {
    async fn lookup(&self, fingerprint: &ContentFingerprint) -> CorretorResult<Option<Uuid>> {
        let now = Utc::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(fingerprint)
            .filter(|entry| self.is_live(entry, now))
            .map(|entry| entry.job_id))
    }

    async fn register(
        &self,
        fingerprint: &ContentFingerprint,
        job_id: Uuid,
    ) -> CorretorResult<RegisterOutcome> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        if let Some(existing) = entries.get(fingerprint) {
            if self.is_live(existing, now) {
                debug!(
                    "fingerprint {} already registered to job {}",
                    fingerprint, existing.job_id
                );
                return Ok(RegisterOutcome::Exists(existing.job_id));
            }
        }
        entries.insert(
            fingerprint.clone(),
            DedupEntry {
                job_id,
                registered_at: now,
            },
        );
        Ok(RegisterOutcome::Registered)
    }

    async fn purge_expired(&self) -> CorretorResult<usize> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| self.is_live(entry, now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!("purged {} expired dedup entries", purged);
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(text: &str) -> ContentFingerprint {
        ContentFingerprint::of_text(text)
    }

    #[tokio::test]
    async fn test_register_then_lookup() {
        let store = InMemoryDedupStore::new(&DedupConfig::default());
        let fp = fingerprint("o gato correu");
        let job_id = Uuid::new_v4();

        assert_eq!(store.lookup(&fp).await.unwrap(), None);
        assert_eq!(
            store.register(&fp, job_id).await.unwrap(),
            RegisterOutcome::Registered
        );
        assert_eq!(store.lookup(&fp).await.unwrap(), Some(job_id));
    }

    #[tokio::test]
    async fn test_register_race_loser_gets_winner_id() {
        let store = InMemoryDedupStore::new(&DedupConfig::default());
        let fp = fingerprint("o gato correu");
        let winner = Uuid::new_v4();
        let loser = Uuid::new_v4();

        store.register(&fp, winner).await.unwrap();
        assert_eq!(
            store.register(&fp, loser).await.unwrap(),
            RegisterOutcome::Exists(winner)
        );
        // 原注册不被覆盖
        assert_eq!(store.lookup(&fp).await.unwrap(), Some(winner));
    }

    #[tokio::test]
    async fn test_expired_entry_misses_and_purges() {
        let config = DedupConfig {
            retention_seconds: 0,
            ..DedupConfig::default()
        };
        let store = InMemoryDedupStore::new(&config);
        let fp = fingerprint("o gato correu");
        let job_id = Uuid::new_v4();

        store.register(&fp, job_id).await.unwrap();
        // 窗口为零：条目立即过期
        assert_eq!(store.lookup(&fp).await.unwrap(), None);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        // 过期后可重新注册
        assert_eq!(
            store.register(&fp, Uuid::new_v4()).await.unwrap(),
            RegisterOutcome::Registered
        );
    }

    #[tokio::test]
    async fn test_different_texts_do_not_collide() {
        let store = InMemoryDedupStore::new(&DedupConfig::default());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.register(&fingerprint("texto um"), a).await.unwrap();
        store.register(&fingerprint("texto dois"), b).await.unwrap();
        assert_eq!(store.lookup(&fingerprint("texto um")).await.unwrap(), Some(a));
        assert_eq!(store.lookup(&fingerprint("texto dois")).await.unwrap(), Some(b));
    }
}
