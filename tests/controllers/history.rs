use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use kotatsu_sync::model::HistoryPackage;
use serde_json::json;

use crate::{AppStateTest, fake_history, fake_manga};

fn push_request(token: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/resource/history")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn should_be_unauthorized_without_token() {
    let test_state = AppStateTest::new(true).await;

    let request = Request::builder()
        .uri("/resource/history")
        .body(Body::empty())
        .unwrap();
    let response = test_state.generate_response(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/resource/history")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"history":[]}"#))
        .unwrap();
    let response = test_state.generate_response(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    test_state.cleanup().await;
}

#[tokio::test]
async fn should_be_bad_request_when_json_is_malformed() {
    let test_state = AppStateTest::new(true).await;
    let (_, token) = test_state.generate_jwt_with_user().await;

    let response = test_state
        .generate_response(push_request(&token, Body::from(r#"{"history": [}"#)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(test_state.count("history").await, 0);

    test_state.cleanup().await;
}

#[tokio::test]
async fn should_be_bad_request_when_embedded_manga_does_not_match() {
    let test_state = AppStateTest::new(true).await;
    let (_, token) = test_state.generate_jwt_with_user().await;

    let mut history = fake_history(fake_manga(10, &[]), 100, 1);
    history.manga_id = 11;
    let body = serde_json::to_vec(&json!({ "history": [history] })).unwrap();

    let response = test_state
        .generate_response(push_request(&token, Body::from(body)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(test_state.count("manga").await, 0);
    assert_eq!(test_state.count("history").await, 0);

    test_state.cleanup().await;
}

#[tokio::test]
async fn should_return_merged_snapshot_on_push_and_pull() {
    let test_state = AppStateTest::new(true).await;
    let (_, token) = test_state.generate_jwt_with_user().await;
    test_state.clock.set(5_000);

    let history = fake_history(fake_manga(42, &[1, 2]), 100, 3);
    let body = serde_json::to_vec(&json!({ "history": [history.clone()] })).unwrap();

    let response = test_state
        .generate_response(push_request(&token, Body::from(body)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response_body = response.into_body().collect().await.unwrap().to_bytes();
    let pushed: HistoryPackage = serde_json::from_slice(&response_body).unwrap();
    assert_eq!(pushed.timestamp, Some(5_000));
    assert_eq!(pushed.history, vec![history]);

    let request = Request::builder()
        .uri("/resource/history")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = test_state.generate_response(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response_body = response.into_body().collect().await.unwrap().to_bytes();
    let pulled: HistoryPackage = serde_json::from_slice(&response_body).unwrap();
    assert_eq!(pulled, pushed);

    test_state.cleanup().await;
}

#[tokio::test]
async fn pull_without_pushes_returns_empty_package() {
    let test_state = AppStateTest::new(true).await;
    let (_, token) = test_state.generate_jwt_with_user().await;

    let request = Request::builder()
        .uri("/resource/history")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = test_state.generate_response(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response_body = response.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&response_body).unwrap();
    assert_eq!(value, json!({ "history": [], "timestamp": null }));

    test_state.cleanup().await;
}
