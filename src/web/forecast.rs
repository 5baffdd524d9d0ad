use super::AppState;
use crate::errors::Result;
use crate::forecast::{DEFAULT_FROM_YEAR, DEFAULT_TO_YEAR, ForecastRequest, ForecastResult};
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForecastQuery {
    from: Option<i32>,
    to: Option<i32>,
    scenario: Option<String>,
    built_year: Option<i32>,
    #[serde(rename = "use")]
    use_type: Option<String>,
    floor_area: Option<f64>,
    pnu: Option<String>,
}

impl ForecastQuery {
    fn into_request(self, building_id: Option<i64>) -> ForecastRequest {
        ForecastRequest {
            building_id,
            from_year: self.from.unwrap_or(DEFAULT_FROM_YEAR),
            to_year: self.to.unwrap_or(DEFAULT_TO_YEAR),
            scenario: self.scenario,
            built_year: self.built_year,
            use_type: self.use_type,
            floor_area: self.floor_area,
            parcel_id: self.pnu,
        }
    }
}

pub fn add_route(app: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    app.route("/api/forecast", get(forecast_by_attributes))
        .route("/api/forecast/{id}", get(forecast_by_building))
}

async fn forecast_by_building(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(id): Path<i64>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<ForecastResult>> {
    let request = query.into_request(Some(id));
    respond(&state, &request, addr).await
}

async fn forecast_by_attributes(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<ForecastResult>> {
    let request = query.into_request(None);
    respond(&state, &request, addr).await
}

async fn respond(
    state: &AppState,
    request: &ForecastRequest,
    addr: SocketAddr,
) -> Result<Json<ForecastResult>> {
    let client_ip = addr.ip().to_string();
    let result = state
        .forecast
        .forecast_at(request, Some(&client_ip), Utc::now().naive_utc())
        .await?;
    Ok(Json(result))
}
