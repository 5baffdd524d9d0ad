use super::NormalizedRequest;
use sha2::{Digest, Sha256};

/// キー文字列の書式バージョン。書式を変えたら必ず上げること
const KEY_VERSION: &str = "v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    /// 人が読める導出元の文字列（監査・デバッグ用）
    pub raw: String,
    /// `raw` の SHA-256 (小文字 16 進、64 文字)
    pub hash: String,
}

/// 正規化済みリクエストからキャッシュキーを導出する
///
/// 予測結果に影響する項目を固定順で連結する。項目の追加・表現の変更はここに反映しないと
/// 別の結果が同じキーで返ることになる。
pub fn derive(request: &NormalizedRequest) -> CacheKey {
    let raw = raw_key(request);
    let hash = sha256_hex(&raw);
    CacheKey { raw, hash }
}

fn raw_key(request: &NormalizedRequest) -> String {
    let building = request
        .building_id()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "none".to_string());
    let built_year = request
        .built_year()
        .map(|y| y.to_string())
        .unwrap_or_else(|| "na".to_string());
    let floor_area = request
        .floor_area()
        .map(|a| format!("{:.2}", a))
        .unwrap_or_else(|| "na".to_string());

    format!(
        "{};buildingId={};from={};to={};scenario={};builtYear={};use={};floorArea={};pnu={}",
        KEY_VERSION,
        building,
        request.from_year(),
        request.to_year(),
        request.scenario(),
        built_year,
        request.use_type().unwrap_or("na"),
        floor_area,
        request.parcel_id().unwrap_or("na"),
    )
}

pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
