use super::bridge::PredictRequest;

pub const DEFAULT_BUILDING_TYPE: &str = "office";

/// 現状は大田のみ対応
pub const FIXED_REGION: &str = "daejeon";

const TYPE_KEYWORDS: &[(&str, &[&str])] = &[
    ("factory", &["factory", "공장"]),
    ("hospital", &["hospital", "병원"]),
    ("school", &["school", "학교"]),
    ("office", &["office", "사무", "업무"]),
];

/// 建物用途をキーワードで標準値に寄せる。判定できなければ office
pub fn normalize_type(raw: Option<&str>) -> &'static str {
    let Some(raw) = raw else {
        return DEFAULT_BUILDING_TYPE;
    };
    let s = raw.trim().to_lowercase();
    TYPE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| s.contains(k)))
        .map(|(name, _)| *name)
        .unwrap_or(DEFAULT_BUILDING_TYPE)
}

pub fn normalize_region(_raw: Option<&str>) -> &'static str {
    FIXED_REGION
}

impl PredictRequest {
    /// type / region を正規化した新しいリクエストを返す（何度適用しても同じ）
    pub fn normalized(&self) -> PredictRequest {
        PredictRequest {
            building_type: Some(normalize_type(self.building_type.as_deref()).to_string()),
            region: Some(normalize_region(self.region.as_deref()).to_string()),
            ..self.clone()
        }
    }
}
