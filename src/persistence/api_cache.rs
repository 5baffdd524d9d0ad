use super::connection_pool;
use super::schema::api_cache;
use crate::errors::Result;
use crate::forecast::cache::{CacheEntry, CacheStore, NewCacheEntry};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel::upsert::excluded;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = api_cache)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct DbCacheEntry {
    #[allow(dead_code)]
    pub id: i64,
    pub cache_key_hash: String,
    pub cache_key_raw: String,
    pub payload_json: String,
    pub created_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub building_id: Option<i64>,
    pub client_ip: Option<String>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = api_cache)]
struct NewDbCacheEntry {
    pub cache_key_hash: String,
    pub cache_key_raw: String,
    pub payload_json: String,
    pub expires_at: NaiveDateTime,
    pub building_id: Option<i64>,
    pub client_ip: Option<String>,
}

impl From<NewCacheEntry> for NewDbCacheEntry {
    fn from(entry: NewCacheEntry) -> Self {
        Self {
            cache_key_hash: entry.key_hash,
            cache_key_raw: entry.key_raw,
            payload_json: entry.payload,
            expires_at: entry.expires_at,
            building_id: entry.building_id,
            client_ip: entry.client_id,
        }
    }
}

impl From<DbCacheEntry> for CacheEntry {
    fn from(row: DbCacheEntry) -> Self {
        Self {
            key_hash: row.cache_key_hash,
            key_raw: row.cache_key_raw,
            payload: row.payload_json,
            created_at: row.created_at,
            expires_at: row.expires_at,
            building_id: row.building_id,
            client_id: row.client_ip,
        }
    }
}

/// `api_cache` テーブルによるキャッシュ
///
/// `cache_key_hash` の一意制約に対する `ON CONFLICT DO UPDATE` で、
/// 同じキーの同時書き込みも 1 行に収束する。
#[derive(Debug, Clone, Default)]
pub struct PgCacheStore;

impl PgCacheStore {
    pub fn new() -> Self {
        Self
    }

    /// 期限に関係なく行を取得する（監査・テスト用）
    pub async fn get_entry(&self, key_hash: &str) -> Result<Option<CacheEntry>> {
        let key_hash = key_hash.to_string();
        let conn = connection_pool::get().await?;
        let row = conn
            .interact(move |conn| {
                api_cache::table
                    .filter(api_cache::cache_key_hash.eq(&key_hash))
                    .select(DbCacheEntry::as_select())
                    .first(conn)
                    .optional()
            })
            .await??;
        Ok(row.map(CacheEntry::from))
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn lookup(&self, key_hash: &str, now: NaiveDateTime) -> Result<Option<String>> {
        let key_hash = key_hash.to_string();
        let conn = connection_pool::get().await?;
        let payload = conn
            .interact(move |conn| {
                api_cache::table
                    .filter(api_cache::cache_key_hash.eq(&key_hash))
                    .filter(api_cache::expires_at.gt(now))
                    .select(api_cache::payload_json)
                    .first::<String>(conn)
                    .optional()
            })
            .await??;
        Ok(payload)
    }

    async fn upsert(&self, entry: NewCacheEntry) -> Result<()> {
        let row = NewDbCacheEntry::from(entry);
        let conn = connection_pool::get().await?;
        conn.interact(move |conn| {
            diesel::insert_into(api_cache::table)
                .values(&row)
                .on_conflict(api_cache::cache_key_hash)
                .do_update()
                .set((
                    api_cache::cache_key_raw.eq(excluded(api_cache::cache_key_raw)),
                    api_cache::payload_json.eq(excluded(api_cache::payload_json)),
                    api_cache::expires_at.eq(excluded(api_cache::expires_at)),
                    api_cache::building_id.eq(excluded(api_cache::building_id)),
                    api_cache::client_ip.eq(excluded(api_cache::client_ip)),
                ))
                .execute(conn)
        })
        .await??;
        Ok(())
    }

    async fn evict_expired(&self, now: NaiveDateTime) -> Result<usize> {
        let conn = connection_pool::get().await?;
        let deleted = conn
            .interact(move |conn| {
                diesel::delete(api_cache::table.filter(api_cache::expires_at.lt(now))).execute(conn)
            })
            .await??;
        Ok(deleted)
    }
}
