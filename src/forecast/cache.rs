use crate::errors::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// 保存済みのキャッシュ行
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key_hash: String,
    pub key_raw: String,
    pub payload: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub building_id: Option<i64>,
    pub client_id: Option<String>,
}

/// upsert 用の行。created_at は保存側が決める
#[derive(Debug, Clone, PartialEq)]
pub struct NewCacheEntry {
    pub key_hash: String,
    pub key_raw: String,
    pub payload: String,
    pub expires_at: NaiveDateTime,
    pub building_id: Option<i64>,
    pub client_id: Option<String>,
}

/// 予測結果のキャッシュ
///
/// 書き込みは常にキー単位の upsert のみ（読んでから書く操作はしない）。
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `expires_at > now` の行のペイロードだけを返す
    async fn lookup(&self, key_hash: &str, now: NaiveDateTime) -> Result<Option<String>>;

    /// 挿入、またはキー衝突時に可変項目をすべて置き換える
    async fn upsert(&self, entry: NewCacheEntry) -> Result<()>;

    /// `expires_at < now` の行を削除して件数を返す
    async fn evict_expired(&self, now: NaiveDateTime) -> Result<usize>;
}

/// プロセス内のキャッシュ（DB を使わない構成とテスト用）
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// 期限に関係なく行を取り出す
    pub async fn get_entry(&self, key_hash: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(key_hash).cloned()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn lookup(&self, key_hash: &str, now: NaiveDateTime) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key_hash)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.payload.clone()))
    }

    async fn upsert(&self, entry: NewCacheEntry) -> Result<()> {
        let now = chrono::Utc::now().naive_utc();
        let mut entries = self.entries.write().await;
        let created_at = entries
            .get(&entry.key_hash)
            .map(|existing| existing.created_at)
            .unwrap_or(now);
        entries.insert(
            entry.key_hash.clone(),
            CacheEntry {
                key_hash: entry.key_hash,
                key_raw: entry.key_raw,
                payload: entry.payload,
                created_at,
                expires_at: entry.expires_at,
                building_id: entry.building_id,
                client_id: entry.client_id,
            },
        );
        Ok(())
    }

    async fn evict_expired(&self, now: NaiveDateTime) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at >= now);
        Ok(before - entries.len())
    }
}
