use super::Status;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 節減率(%)がこれ未満なら即不採用
const MIN_SAVING_PCT: f64 = 5.0;
/// 回収年数がこれを超えたら即不採用
const MAX_PAYBACK_YEARS: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    #[serde(alias = "recommend")]
    Recommend,
    #[serde(alias = "conditional")]
    Conditional,
    #[serde(alias = "not_recommend", alias = "not-recommend")]
    NotRecommend,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Recommendation::Recommend => "RECOMMEND",
            Recommendation::Conditional => "CONDITIONAL",
            Recommendation::NotRecommend => "NOT_RECOMMEND",
        };
        write!(f, "{s}")
    }
}

impl Recommendation {
    fn from_score(score: i32) -> Self {
        if score >= 4 {
            Recommendation::Recommend
        } else if score >= 2 {
            Recommendation::Conditional
        } else {
            Recommendation::NotRecommend
        }
    }
}

/// KPI と築年数から推奨度を判定する
///
/// 節減率が低すぎるか回収が長すぎる場合は他の条件に関わらず `NOT_RECOMMEND`（score 0）。
/// NaN はどの比較も偽になるので、ガードに掛ける。
pub fn score(saving_pct: f64, payback_years: f64, age: Option<i32>) -> Status {
    let guarded = saving_pct.is_nan()
        || payback_years.is_nan()
        || saving_pct < MIN_SAVING_PCT
        || payback_years > MAX_PAYBACK_YEARS;
    if guarded {
        return Status {
            score: 0,
            label: Recommendation::NotRecommend,
        };
    }

    let mut score = 0;
    score += if saving_pct >= 15.0 {
        2
    } else if saving_pct >= 10.0 {
        1
    } else {
        0
    };
    score += if payback_years <= 5.0 {
        2
    } else if payback_years <= 8.0 {
        1
    } else {
        0
    };
    score += match age {
        None => 1,
        Some(age) if age >= 25 => 2,
        Some(age) if age >= 10 => 1,
        Some(_) => 0,
    };

    Status {
        score,
        label: Recommendation::from_score(score),
    }
}

/// 竣工年から築年数を求める。未来の年や不明な場合は `None`
pub fn building_age(built_year: Option<i32>, current_year: i32) -> Option<i32> {
    built_year
        .filter(|year| *year > 0 && *year <= current_year)
        .map(|year| current_year - year)
}
