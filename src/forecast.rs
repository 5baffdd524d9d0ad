pub mod cache;
pub mod cache_key;
pub mod compute;
pub mod score;

use crate::config;
use crate::errors::{Error, Result};
use crate::logging::*;
use cache::{CacheStore, NewCacheEntry};
use chrono::{Datelike, NaiveDateTime, Utc};
use compute::{ForecastComputer, Projection};
use score::{Recommendation, building_age};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_FROM_YEAR: i32 = 2024;
pub const DEFAULT_TO_YEAR: i32 = 2030;
pub const DEFAULT_SCENARIO: &str = "default";

/// from == to の場合に広げる年数（from ~ from+6 の7年間）
pub const SINGLE_YEAR_EXTENSION: i32 = 6;

/// 受け付ける年の範囲と、一度に計算する最大年数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearWindow {
    pub min_year: i32,
    pub max_year: i32,
    pub max_span: i32,
}

impl Default for YearWindow {
    fn default() -> Self {
        Self {
            min_year: 1900,
            max_year: 2100,
            max_span: 100,
        }
    }
}

impl YearWindow {
    pub fn from_config() -> Self {
        let default = Self::default();
        Self {
            min_year: config::get_or("FORECAST_MIN_YEAR", default.min_year),
            max_year: config::get_or("FORECAST_MAX_YEAR", default.max_year),
            max_span: config::get_or("FORECAST_MAX_SPAN", default.max_span),
        }
    }

    fn check_year(&self, year: i32) -> Result<()> {
        if year < self.min_year || year > self.max_year {
            return Err(Error::Validation(format!(
                "year out of range: {} (supported: {} ~ {})",
                year, self.min_year, self.max_year
            )));
        }
        Ok(())
    }

    fn check_span(&self, from_year: i32, to_year: i32) -> Result<()> {
        let span = i64::from(to_year) - i64::from(from_year) + 1;
        if span > i64::from(self.max_span) {
            return Err(Error::Validation(format!(
                "year range too long: {} years (max: {})",
                span, self.max_span
            )));
        }
        Ok(())
    }
}

/// 呼び出し側から渡される予測リクエスト（未正規化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastRequest {
    pub building_id: Option<i64>,
    pub from_year: i32,
    pub to_year: i32,
    pub scenario: Option<String>,
    pub built_year: Option<i32>,
    #[serde(rename = "use")]
    pub use_type: Option<String>,
    pub floor_area: Option<f64>,
    #[serde(rename = "pnu")]
    pub parcel_id: Option<String>,
}

impl Default for ForecastRequest {
    fn default() -> Self {
        Self {
            building_id: None,
            from_year: DEFAULT_FROM_YEAR,
            to_year: DEFAULT_TO_YEAR,
            scenario: None,
            built_year: None,
            use_type: None,
            floor_area: None,
            parcel_id: None,
        }
    }
}

/// 正規化済みのリクエスト
///
/// `ForecastRequest::normalize` からのみ生成され、`from_year <= to_year` が保証される。
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRequest {
    building_id: Option<i64>,
    from_year: i32,
    to_year: i32,
    scenario: String,
    built_year: Option<i32>,
    use_type: Option<String>,
    floor_area: Option<f64>,
    parcel_id: Option<String>,
}

/// 年範囲の補正: to < from なら入れ替え、同じなら7年間に拡張
pub fn normalize_range(from_year: i32, to_year: i32) -> (i32, i32) {
    let (from, to) = if to_year < from_year {
        (to_year, from_year)
    } else {
        (from_year, to_year)
    };
    if from == to {
        (from, from.saturating_add(SINGLE_YEAR_EXTENSION))
    } else {
        (from, to)
    }
}

fn clean_text(value: Option<&str>) -> Option<String> {
    value
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

impl ForecastRequest {
    pub fn for_building(building_id: i64, from_year: i32, to_year: i32) -> Self {
        Self {
            building_id: Some(building_id),
            from_year,
            to_year,
            ..Default::default()
        }
    }

    /// 新しい正規化済みの値を作る（self は変更しない）
    ///
    /// buildingId が無い場合は builtYear(正) か pnu のどちらかが必要。
    pub fn normalize(&self) -> Result<NormalizedRequest> {
        self.normalize_within(&YearWindow::from_config())
    }

    /// 年は `window` の範囲内、年数は `max_span` 以下でなければならない
    pub fn normalize_within(&self, window: &YearWindow) -> Result<NormalizedRequest> {
        window.check_year(self.from_year)?;
        window.check_year(self.to_year)?;
        let (from_year, to_year) = normalize_range(self.from_year, self.to_year);
        window.check_span(from_year, to_year)?;
        let built_year = self.built_year.filter(|y| *y > 0);
        let parcel_id = self
            .parcel_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        if self.building_id.is_none() && built_year.is_none() && parcel_id.is_none() {
            return Err(Error::Validation(
                "buildingId, builtYear or pnu is required".to_string(),
            ));
        }

        Ok(NormalizedRequest {
            building_id: self.building_id,
            from_year,
            to_year,
            scenario: clean_text(self.scenario.as_deref())
                .unwrap_or_else(|| DEFAULT_SCENARIO.to_string()),
            built_year,
            use_type: clean_text(self.use_type.as_deref()),
            floor_area: self.floor_area.filter(|a| a.is_finite() && *a > 0.0),
            parcel_id,
        })
    }
}

impl NormalizedRequest {
    pub fn building_id(&self) -> Option<i64> {
        self.building_id
    }

    pub fn from_year(&self) -> i32 {
        self.from_year
    }

    pub fn to_year(&self) -> i32 {
        self.to_year
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn built_year(&self) -> Option<i32> {
        self.built_year
    }

    pub fn use_type(&self) -> Option<&str> {
        self.use_type.as_deref()
    }

    pub fn floor_area(&self) -> Option<f64> {
        self.floor_area
    }

    pub fn parcel_id(&self) -> Option<&str> {
        self.parcel_id.as_deref()
    }

    pub fn years(&self) -> usize {
        (i64::from(self.to_year) - i64::from(self.from_year) + 1).max(0) as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub from_year: i32,
    pub to_year: i32,
    pub currency: String,
    pub tariff_escalation_pct: f64,
    pub co2_factor_kg_per_kwh: f64,
}

/// 年毎の before / after / saving 系列（同じ長さ）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    pub before: Vec<i64>,
    pub after: Vec<i64>,
    pub saving: Vec<i64>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.after.len()
    }

    pub fn is_empty(&self) -> bool {
        self.after.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpi {
    pub saving_kwh_yr: i64,
    pub saving_cost_yr: i64,
    pub saving_pct: f64,
    /// `None` は回収不能（年間の節減額が 0）
    pub payback_years: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub score: i32,
    pub label: Recommendation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResult {
    pub building_id: Option<i64>,
    pub meta: Meta,
    pub series: Series,
    pub cost: Series,
    pub co2: Series,
    pub kpi: Kpi,
    pub status: Status,
}

impl ForecastResult {
    pub fn assemble(building_id: Option<i64>, projection: Projection, status: Status) -> Self {
        Self {
            building_id,
            meta: projection.meta,
            series: projection.energy,
            cost: projection.cost,
            co2: projection.co2,
            kpi: projection.kpi,
            status,
        }
    }
}

/// キャッシュ → 計算 → 判定 → 保存 をまとめるサービス
pub struct ForecastService {
    store: Arc<dyn CacheStore>,
    computer: ForecastComputer,
    ttl: chrono::Duration,
}

impl ForecastService {
    pub fn new(
        store: Arc<dyn CacheStore>,
        computer: ForecastComputer,
        ttl: std::time::Duration,
    ) -> Self {
        let ttl =
            chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(10));
        Self {
            store,
            computer,
            ttl,
        }
    }

    pub async fn forecast(&self, request: &ForecastRequest) -> Result<ForecastResult> {
        self.forecast_at(request, None, Utc::now().naive_utc()).await
    }

    /// 予測を返す
    ///
    /// キャッシュの読み出し失敗・パース失敗・書き込み失敗はすべて再計算にフォールバックし、
    /// 呼び出し側には伝えない。
    pub async fn forecast_at(
        &self,
        request: &ForecastRequest,
        client_id: Option<&str>,
        now: NaiveDateTime,
    ) -> Result<ForecastResult> {
        let request = request.normalize()?;
        let key = cache_key::derive(&request);
        let log = DEFAULT.new(o!(
            "function" => "forecast",
            "key_hash" => key.hash.clone(),
        ));

        match self.store.lookup(&key.hash, now).await {
            Ok(Some(payload)) => match serde_json::from_str::<ForecastResult>(&payload) {
                Ok(cached) => {
                    debug!(log, "cache hit");
                    return Ok(cached);
                }
                Err(err) => warn!(log, "cached payload unreadable, recomputing"; "error" => %err),
            },
            Ok(None) => debug!(log, "cache miss"; "key_raw" => &key.raw),
            Err(err) => warn!(log, "cache lookup failed, recomputing"; "error" => %err),
        }

        let result = self.compute(&request, now)?;

        match serde_json::to_string(&result) {
            Ok(payload) => {
                let entry = NewCacheEntry {
                    key_hash: key.hash,
                    key_raw: key.raw,
                    payload,
                    expires_at: now + self.ttl,
                    building_id: request.building_id(),
                    client_id: client_id.map(str::to_string),
                };
                if let Err(err) = self.store.upsert(entry).await {
                    warn!(log, "cache write failed"; "error" => %err);
                }
            }
            Err(err) => warn!(log, "failed to serialize forecast"; "error" => %err),
        }

        Ok(result)
    }

    fn compute(&self, request: &NormalizedRequest, now: NaiveDateTime) -> Result<ForecastResult> {
        let projection = self.computer.compute(request)?;
        let age = building_age(request.built_year(), now.year());
        let status = score::score(
            projection.kpi.saving_pct,
            projection.kpi.payback_years.unwrap_or(f64::INFINITY),
            age,
        );
        Ok(ForecastResult::assemble(
            request.building_id(),
            projection,
            status,
        ))
    }
}
