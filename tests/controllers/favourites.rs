use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use kotatsu_sync::model::FavouritesPackage;
use serde_json::json;

use crate::{AppStateTest, fake_category, fake_favourite, fake_manga};

fn push_request(token: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/resource/favourites")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn should_be_unauthorized_without_token() {
    let test_state = AppStateTest::new(true).await;

    let request = Request::builder()
        .uri("/resource/favourites")
        .body(Body::empty())
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
        .generate_response(push_request(&token, Body::from("favourites")))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    test_state.cleanup().await;
}

#[tokio::test]
async fn untitled_category_does_not_block_the_push() {
    let test_state = AppStateTest::new(true).await;
    let (_, token) = test_state.generate_jwt_with_user().await;

    let mut untitled = fake_category(2, 10);
    untitled.title = String::new();
    let body = serde_json::to_vec(&json!({
        "favourite_categories": [fake_category(1, 10), untitled],
        "favourites": [fake_favourite(fake_manga(3, &[]), 1, 10)],
    }))
    .unwrap();

    let response = test_state
        .generate_response(push_request(&token, Body::from(body)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response_body = response.into_body().collect().await.unwrap().to_bytes();
    let pushed: FavouritesPackage = serde_json::from_slice(&response_body).unwrap();
    assert_eq!(pushed.categories.len(), 2);
    assert_eq!(pushed.categories[1].title, "");
    assert_eq!(pushed.favourites.len(), 1);
    assert_eq!(test_state.count("favourites").await, 1);

    test_state.cleanup().await;
}

#[tokio::test]
async fn should_be_bad_request_when_embedded_manga_does_not_match() {
    let test_state = AppStateTest::new(true).await;
    let (_, token) = test_state.generate_jwt_with_user().await;

    let mut favourite = fake_favourite(fake_manga(3, &[]), 1, 10);
    favourite.manga_id = 4;
    let body = serde_json::to_vec(&json!({
        "favourite_categories": [fake_category(1, 10)],
        "favourites": [favourite],
    }))
    .unwrap();

    let response = test_state
        .generate_response(push_request(&token, Body::from(body)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(test_state.count("categories").await, 0);
    assert_eq!(test_state.count("favourites").await, 0);

    test_state.cleanup().await;
}

#[tokio::test]
async fn should_accept_client_field_names() {
    let test_state = AppStateTest::new(true).await;
    let (_, token) = test_state.generate_jwt_with_user().await;
    test_state.clock.set(7_000);

    let body = json!({
        "categories": [{
            "id": 4,
            "created_at": 10,
            "sort_key": 2,
            "title": "Reading",
            "order": "NEWEST",
            "track": 1,
            "show_in_lib": 0,
        }],
        "favourites": [{
            "manga_id": 8,
            "category_id": 4,
            "sort_key": 0,
            "pinned": 0,
            "created_at": 10,
            "deleted_at": 0,
        }],
    });

    let response = test_state
        .generate_response(push_request(
            &token,
            Body::from(serde_json::to_vec(&body).unwrap()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response_body = response.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&response_body).unwrap();

    assert_eq!(value["timestamp"], 7_000);
    assert_eq!(value["favourite_categories"][0]["category_id"], 4);
    assert_eq!(value["favourite_categories"][0]["track"], true);
    assert_eq!(value["favourite_categories"][0]["show_in_lib"], false);
    assert_eq!(value["favourites"][0]["manga_id"], 8);
    assert_eq!(value["favourites"][0]["manga"]["manga_id"], 8);

    test_state.cleanup().await;
}

#[tokio::test]
async fn should_return_merged_snapshot_on_push_and_pull() {
    let test_state = AppStateTest::new(true).await;
    let (_, token) = test_state.generate_jwt_with_user().await;

    let package = FavouritesPackage {
        categories: vec![fake_category(1, 10), fake_category(2, 20)],
        favourites: vec![
            fake_favourite(fake_manga(5, &[3]), 1, 10),
            fake_favourite(fake_manga(6, &[]), 2, 20),
        ],
        timestamp: None,
    };

    let response = test_state
        .generate_response(push_request(
            &token,
            Body::from(serde_json::to_vec(&package).unwrap()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response_body = response.into_body().collect().await.unwrap().to_bytes();
    let pushed: FavouritesPackage = serde_json::from_slice(&response_body).unwrap();
    assert_eq!(pushed.categories, package.categories);
    assert_eq!(pushed.favourites, package.favourites);
    assert_eq!(pushed.timestamp, Some(1_000));

    let request = Request::builder()
        .uri("/resource/favourites")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = test_state.generate_response(request).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response_body = response.into_body().collect().await.unwrap().to_bytes();
    let pulled: FavouritesPackage = serde_json::from_slice(&response_body).unwrap();
    assert_eq!(pulled, pushed);

    test_state.cleanup().await;
}
