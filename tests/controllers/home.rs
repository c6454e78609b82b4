use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;

use crate::AppStateTest;

#[tokio::test]
async fn home_page_should_return_ok_and_alive() {
    let test_state = AppStateTest::new(false).await;

    let request = Request::builder().uri("/").body(Body::empty()).unwrap();
    let response = test_state.generate_response(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"Alive");

    test_state.cleanup().await;
}
