use super::{Kpi, Meta, NormalizedRequest, Series};
use crate::config;
use crate::errors::{Error, Result};

/// 改修費・単価などの前提値
#[derive(Debug, Clone, PartialEq)]
pub struct Assumptions {
    /// 電力単価（通貨/kWh）
    pub unit_price: i64,
    /// 改修の投資額。回収年数の分子
    pub retrofit_cost: i64,
    /// CO2 排出係数（kg/kWh）
    pub co2_factor: f64,
    pub currency: String,
    pub escalation_pct: f64,
}

impl Default for Assumptions {
    fn default() -> Self {
        Self {
            unit_price: 150,
            retrofit_cost: 90_000_000,
            co2_factor: 0.428,
            currency: "KRW".to_string(),
            escalation_pct: 3.0,
        }
    }
}

impl Assumptions {
    pub fn from_config() -> Self {
        let default = Self::default();
        Self {
            unit_price: config::get_or("FORECAST_UNIT_PRICE", default.unit_price),
            retrofit_cost: config::get_or("FORECAST_RETROFIT_COST", default.retrofit_cost),
            co2_factor: config::get_or("FORECAST_CO2_FACTOR", default.co2_factor),
            currency: config::get("FORECAST_CURRENCY").unwrap_or(default.currency),
            escalation_pct: config::get_or("FORECAST_ESCALATION_PCT", default.escalation_pct),
        }
    }
}

/// 減衰率による系列生成
#[derive(Debug, Clone, PartialEq)]
pub struct ParametricModel {
    pub base_kwh: f64,
    pub after_decay_rate: f64,
    pub start_saving_kwh: f64,
    pub saving_decay_rate: f64,
}

impl Default for ParametricModel {
    fn default() -> Self {
        Self {
            base_kwh: 2_150_000.0,
            after_decay_rate: 0.06,
            start_saving_kwh: 360_000.0,
            saving_decay_rate: 0.08,
        }
    }
}

/// 固定の年別テーブル（2024〜2030）
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalTable {
    pub first_year: i32,
    pub after_kwh: Vec<i64>,
    pub saving_kwh: Vec<i64>,
    pub cost_after: Vec<i64>,
    pub cost_saving: Vec<i64>,
    pub co2_after: Vec<i64>,
    pub co2_saving: Vec<i64>,
}

impl HistoricalTable {
    pub fn builtin() -> Self {
        Self {
            first_year: 2024,
            after_kwh: vec![
                2_150_000, 1_980_000, 1_840_000, 1_720_000, 1_620_000, 1_540_000, 1_480_000,
            ],
            saving_kwh: vec![350_000, 420_000, 460_000, 500_000, 530_000, 570_000, 620_000],
            cost_after: vec![
                253_000_000,
                250_000_000,
                247_000_000,
                244_000_000,
                241_000_000,
                238_000_000,
                235_000_000,
            ],
            cost_saving: vec![
                41_000_000, 34_000_000, 32_000_000, 30_000_000, 28_000_000, 26_000_000,
                24_000_000,
            ],
            co2_after: vec![897_000, 878_000, 860_000, 842_000, 824_000, 806_000, 790_000],
            co2_saving: vec![152_000, 139_000, 130_000, 120_000, 112_000, 100_000, 95_000],
        }
    }

    pub fn last_year(&self) -> i32 {
        self.first_year + self.after_kwh.len() as i32 - 1
    }

    /// 要求範囲をテーブルの範囲に切り詰める。重ならなければエラー
    fn clamp(&self, from_year: i32, to_year: i32) -> Result<(i32, i32)> {
        let from = from_year.max(self.first_year);
        let to = to_year.min(self.last_year());
        if from > to {
            return Err(Error::Validation(format!(
                "unsupported year range: {} ~ {} (supported: {} ~ {})",
                from_year,
                to_year,
                self.first_year,
                self.last_year()
            )));
        }
        Ok((from, to))
    }

    fn slice(&self, values: &[i64], from: i32, to: i32) -> Vec<i64> {
        let start = (from - self.first_year) as usize;
        let end = (to - self.first_year) as usize;
        values[start..=end].to_vec()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForecastModel {
    Parametric(ParametricModel),
    Table(HistoricalTable),
}

impl ForecastModel {
    pub fn from_config() -> Self {
        match config::get("FORECAST_MODEL").as_deref() {
            Ok("table") => ForecastModel::Table(HistoricalTable::builtin()),
            _ => {
                let default = ParametricModel::default();
                ForecastModel::Parametric(ParametricModel {
                    base_kwh: config::get_or("FORECAST_BASE_KWH", default.base_kwh),
                    after_decay_rate: config::get_or(
                        "FORECAST_AFTER_DECAY_RATE",
                        default.after_decay_rate,
                    ),
                    start_saving_kwh: config::get_or(
                        "FORECAST_START_SAVING_KWH",
                        default.start_saving_kwh,
                    ),
                    saving_decay_rate: config::get_or(
                        "FORECAST_SAVING_DECAY_RATE",
                        default.saving_decay_rate,
                    ),
                })
            }
        }
    }
}

/// 計算結果（判定ラベルを除く）
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub meta: Meta,
    pub energy: Series,
    pub cost: Series,
    pub co2: Series,
    pub kpi: Kpi,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastComputer {
    model: ForecastModel,
    assumptions: Assumptions,
}

impl Default for ForecastComputer {
    fn default() -> Self {
        Self::new(
            ForecastModel::Parametric(ParametricModel::default()),
            Assumptions::default(),
        )
    }
}

impl ForecastComputer {
    pub fn new(model: ForecastModel, assumptions: Assumptions) -> Self {
        Self { model, assumptions }
    }

    pub fn from_config() -> Self {
        Self::new(ForecastModel::from_config(), Assumptions::from_config())
    }

    pub fn assumptions(&self) -> &Assumptions {
        &self.assumptions
    }

    /// 正規化済みの範囲から年別系列と代表 KPI を計算する（副作用なし）
    pub fn compute(&self, request: &NormalizedRequest) -> Result<Projection> {
        match &self.model {
            ForecastModel::Parametric(model) => {
                Ok(self.parametric(model, request.from_year(), request.to_year()))
            }
            ForecastModel::Table(table) => {
                self.from_table(table, request.from_year(), request.to_year())
            }
        }
    }

    fn parametric(&self, model: &ParametricModel, from_year: i32, to_year: i32) -> Projection {
        let len = (i64::from(to_year) - i64::from(from_year) + 1).max(1) as usize;
        let decay = |start: f64, rate: f64, i: usize| -> i64 {
            (start * (1.0 - rate).powi(i as i32)).round().max(0.0) as i64
        };

        let after: Vec<i64> = (0..len)
            .map(|i| decay(model.base_kwh, model.after_decay_rate, i))
            .collect();
        let saving: Vec<i64> = (0..len)
            .map(|i| decay(model.start_saving_kwh, model.saving_decay_rate, i))
            .collect();

        let energy = with_before(after, saving);
        let cost = self.to_cost(&energy);
        let co2 = self.to_co2(&energy);
        self.project(from_year, to_year, energy, cost, co2)
    }

    fn from_table(&self, table: &HistoricalTable, from_year: i32, to_year: i32) -> Result<Projection> {
        let (from, to) = table.clamp(from_year, to_year)?;
        let energy = with_before(
            table.slice(&table.after_kwh, from, to),
            table.slice(&table.saving_kwh, from, to),
        );
        let cost = with_before(
            table.slice(&table.cost_after, from, to),
            table.slice(&table.cost_saving, from, to),
        );
        let co2 = with_before(
            table.slice(&table.co2_after, from, to),
            table.slice(&table.co2_saving, from, to),
        );
        Ok(self.project(from, to, energy, cost, co2))
    }

    fn to_cost(&self, energy: &Series) -> Series {
        let price = self.assumptions.unit_price;
        let scale = |values: &[i64]| -> Vec<i64> { values.iter().map(|kwh| kwh * price).collect() };
        Series {
            before: scale(&energy.before),
            after: scale(&energy.after),
            saving: scale(&energy.saving),
        }
    }

    fn to_co2(&self, energy: &Series) -> Series {
        let factor = self.assumptions.co2_factor;
        let scale = |values: &[i64]| -> Vec<i64> {
            values
                .iter()
                .map(|kwh| (*kwh as f64 * factor).round() as i64)
                .collect()
        };
        Series {
            before: scale(&energy.before),
            after: scale(&energy.after),
            saving: scale(&energy.saving),
        }
    }

    fn project(
        &self,
        from_year: i32,
        to_year: i32,
        energy: Series,
        cost: Series,
        co2: Series,
    ) -> Projection {
        let kpi = representative_kpi(&energy, &cost, self.assumptions.retrofit_cost);
        Projection {
            meta: Meta {
                from_year,
                to_year,
                currency: self.assumptions.currency.clone(),
                tariff_escalation_pct: self.assumptions.escalation_pct,
                co2_factor_kg_per_kwh: self.assumptions.co2_factor,
            },
            energy,
            cost,
            co2,
            kpi,
        }
    }
}

/// before = after + saving
fn with_before(after: Vec<i64>, saving: Vec<i64>) -> Series {
    let before = after.iter().zip(&saving).map(|(a, s)| a + s).collect();
    Series {
        before,
        after,
        saving,
    }
}

/// 範囲の最終年を代表値とする
fn representative_kpi(energy: &Series, cost: &Series, retrofit_cost: i64) -> Kpi {
    let saving_kwh = energy.saving.last().copied().unwrap_or(0);
    let after_kwh = energy.after.last().copied().unwrap_or(0);
    let saving_cost = cost.saving.last().copied().unwrap_or(0);

    let denominator = saving_kwh + after_kwh;
    let saving_pct = if denominator > 0 {
        round_to(100.0 * saving_kwh as f64 / denominator as f64, 1)
    } else {
        0.0
    };
    let payback_years = if saving_cost > 0 {
        Some(round_to(retrofit_cost as f64 / saving_cost as f64, 2))
    } else {
        None
    };

    Kpi {
        saving_kwh_yr: saving_kwh,
        saving_cost_yr: saving_cost,
        saving_pct,
        payback_years,
    }
}

fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}
