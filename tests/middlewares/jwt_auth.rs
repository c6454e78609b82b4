use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use kotatsu_sync::auth::encode_jwt;

use crate::AppStateTest;

async fn me_status(test_state: &AppStateTest, authorization: Option<String>) -> StatusCode {
    let mut request = Request::builder().uri("/me");
    if let Some(authorization) = authorization {
        request = request.header(header::AUTHORIZATION, authorization);
    }

    test_state
        .generate_response(request.body(Body::empty()).unwrap())
        .await
        .status()
}

#[tokio::test]
async fn should_throw_error_when_request_does_not_contain_header_authorization() {
    let test_state = AppStateTest::new(true).await;

    assert_eq!(me_status(&test_state, None).await, StatusCode::UNAUTHORIZED);

    test_state.cleanup().await;
}

#[tokio::test]
async fn should_throw_error_when_auth_header_is_malformed() {
    let test_state = AppStateTest::new(true).await;
    let (_, token) = test_state.generate_jwt_with_user().await;

    for authorization in [
        "random-string".to_string(),
        "not-bearer random-string".to_string(),
        format!("Basic {}", token),
        format!("Bearer {} extra", token),
        "Bearer".to_string(),
    ] {
        assert_eq!(
            me_status(&test_state, Some(authorization)).await,
            StatusCode::UNAUTHORIZED
        );
    }

    test_state.cleanup().await;
}

#[tokio::test]
async fn should_throw_error_when_jwt_token_is_invalid() {
    let test_state = AppStateTest::new(true).await;

    let status = me_status(&test_state, Some("bearer random-string".to_string())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    test_state.cleanup().await;
}

#[tokio::test]
async fn should_throw_error_when_token_is_signed_with_another_secret() {
    let test_state = AppStateTest::new(true).await;
    let user = test_state.generate_user().await;

    let mut jwt = test_state.app_state.config.jwt.clone();
    jwt.secret = "another-secret".to_string().into();
    let token = encode_jwt(user.id, &jwt).unwrap();

    let status = me_status(&test_state, Some(format!("Bearer {}", token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    test_state.cleanup().await;
}

#[tokio::test]
async fn should_throw_error_when_user_is_missing() {
    let test_state = AppStateTest::new(true).await;

    let token = encode_jwt(1000, &test_state.app_state.config.jwt).unwrap();

    let status = me_status(&test_state, Some(format!("bearer {}", token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    test_state.cleanup().await;
}

#[tokio::test]
async fn should_accept_scheme_in_any_case() {
    let test_state = AppStateTest::new(true).await;
    let (_, token) = test_state.generate_jwt_with_user().await;

    for scheme in ["Bearer", "bearer", "BEARER"] {
        let status = me_status(&test_state, Some(format!("{} {}", scheme, token))).await;
        assert_eq!(status, StatusCode::OK);
    }

    test_state.cleanup().await;
}
