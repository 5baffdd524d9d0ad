//! 予測サービスとの HTTP 連携テスト（モックサーバー使用）

use super::*;
use mockito::Matcher;

fn bridge(server: &mockito::ServerGuard) -> HttpPredictionBridge {
    HttpPredictionBridge::new(&server.url(), Duration::from_secs(5)).unwrap()
}

#[test]
fn test_variant_parse() {
    assert_eq!("a".parse::<Variant>().unwrap(), Variant::A);
    assert_eq!(" B ".parse::<Variant>().unwrap(), Variant::B);
    assert_eq!("C".parse::<Variant>().unwrap(), Variant::C);
    assert!(matches!("D".parse::<Variant>(), Err(Error::Validation(_))));
    assert_eq!(Variant::default(), Variant::C);
}

#[test]
fn test_upstream_state_parse() {
    assert_eq!(UpstreamState::parse("READY"), UpstreamState::Ready);
    assert_eq!(UpstreamState::parse("ready"), UpstreamState::Ready);
    assert_eq!(UpstreamState::parse("FAILED"), UpstreamState::Failed);
    assert_eq!(UpstreamState::parse("RUNNING"), UpstreamState::Running);
    assert_eq!(UpstreamState::parse("QUEUED"), UpstreamState::Running);
}

#[test]
fn test_base_url_trailing_slash() {
    let bridge = HttpPredictionBridge::new("http://ml:8000/", Duration::from_secs(1)).unwrap();
    assert_eq!(bridge.base_url(), "http://ml:8000");
}

#[tokio::test]
async fn test_start_train_success() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/train")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("mode".into(), "full".into()),
            Matcher::UrlEncoded("k".into(), "5".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jobId":"job-123"}"#)
        .create_async()
        .await;

    let params = TrainParams {
        mode: Some("full".to_string()),
        k: Some(5),
    };
    let job_id = bridge(&server).start_train(&params).await.unwrap();
    assert_eq!(job_id, "job-123");
}

#[tokio::test]
async fn test_start_train_http_error_is_downstream() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/train")
        .with_status(503)
        .with_body("busy")
        .create_async()
        .await;

    let err = bridge(&server)
        .start_train(&TrainParams::default())
        .await
        .unwrap_err();
    assert_eq!(err, Error::downstream(Some(503), "busy"));
}

#[tokio::test]
async fn test_start_train_empty_job_id() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/train")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jobId":""}"#)
        .create_async()
        .await;

    let err = bridge(&server)
        .start_train(&TrainParams::default())
        .await
        .unwrap_err();
    assert!(err.is_downstream());
}

#[tokio::test]
async fn test_train_status() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/train/status/job-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"jobId":"job-1","state":"FAILED","progress":40,"log":"oom"}"#)
        .create_async()
        .await;

    let status = bridge(&server).train_status("job-1").await.unwrap();
    assert_eq!(status.job_id, "job-1");
    assert_eq!(status.upstream_state(), UpstreamState::Failed);
    assert_eq!(status.progress, Some(40.0));
    assert_eq!(status.detail(), Some("oom"));
}

#[tokio::test]
async fn test_train_status_accepts_status_field() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/train/status/job-2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"job_id":"job-2","status":"READY","message":"done"}"#)
        .create_async()
        .await;

    let status = bridge(&server).train_status("job-2").await.unwrap();
    assert_eq!(status.job_id, "job-2");
    assert_eq!(status.upstream_state(), UpstreamState::Ready);
    assert_eq!(status.detail(), Some("done"));
}

#[tokio::test]
async fn test_train_status_invalid_body() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/train/status/job-3")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("<html>")
        .create_async()
        .await;

    let err = bridge(&server).train_status("job-3").await.unwrap_err();
    match err {
        Error::Downstream { status, body } => {
            assert_eq!(status, Some(200));
            assert!(body.contains("train status"), "{body}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_reload_model() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/admin/reload-model")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"message":"reloaded"}"#)
        .expect(1)
        .create_async()
        .await;

    let body = bridge(&server).reload_model().await.unwrap();
    assert_eq!(body["message"], "reloaded");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_predict() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/predict")
        .match_query(Matcher::UrlEncoded("variant".into(), "B".into()))
        .match_body(Matcher::PartialJson(serde_json::json!({
            "type": "school",
            "region": "daejeon",
            "builtYear": 1999,
            "floorAreaM2": 3000.0,
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"savingKwhYr":1000.0,"savingCostYr":150000.0,"savingPct":12.5,"paybackYears":6.1,"label":"CONDITIONAL"}"#,
        )
        .create_async()
        .await;

    let request = PredictRequest {
        building_type: Some("school".to_string()),
        region: Some("daejeon".to_string()),
        built_year: Some(1999),
        floor_area_m2: Some(3000.0),
        ..Default::default()
    };
    let response = bridge(&server).predict(Variant::B, &request).await.unwrap();
    assert_eq!(response.saving_pct, Some(12.5));
    assert_eq!(response.label, Some(Recommendation::Conditional));
}

#[tokio::test]
async fn test_predict_bad_gateway() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/predict")
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("model not loaded")
        .create_async()
        .await;

    let err = bridge(&server)
        .predict(Variant::C, &PredictRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err, Error::downstream(Some(500), "model not loaded"));
}

#[tokio::test]
async fn test_model_status() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/model/status")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"loaded":true,"weights":{"A":0.2,"B":0.3,"C":0.5}}"#)
        .create_async()
        .await;

    let status = bridge(&server).model_status().await.unwrap();
    assert_eq!(status["loaded"], true);
}

#[tokio::test]
async fn test_connection_refused_is_downstream_without_status() {
    // 使われていないポート
    let bridge = HttpPredictionBridge::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let err = bridge.model_status().await.unwrap_err();
    match err {
        Error::Downstream { status, .. } => assert_eq!(status, None),
        other => panic!("unexpected error: {other:?}"),
    }
}
