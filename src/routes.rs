use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{DefaultBodyLimit, MatchedPath},
    http::{HeaderName, Request, header},
    middleware,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{
    controllers::{auth, home, me, resources},
    middlewares::jwt_auth_middleware,
    state::SharedAppState,
};

const REQUEST_ID_HEADER: &str = "x-request-id";

// Full snapshots of a large library run to tens of megabytes.
const SNAPSHOT_BODY_LIMIT: usize = 52_428_800;

fn header_str<'a>(request: &'a Request<Body>, name: impl header::AsHeaderName) -> &'a str {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

pub fn init_router(state: SharedAppState) -> Router {
    let app = Router::new()
        .route("/", get(home::index))
        .route("/auth", post(auth::store))
        .route("/register", post(auth::register));

    let resources_favourites_route = Router::new()
        .route("/", post(resources::favourites::store))
        .layer(DefaultBodyLimit::max(SNAPSHOT_BODY_LIMIT))
        .route("/", get(resources::favourites::index))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            jwt_auth_middleware,
        ));

    let resources_history_route = Router::new()
        .route("/", post(resources::history::store))
        .layer(DefaultBodyLimit::max(SNAPSHOT_BODY_LIMIT))
        .route("/", get(resources::history::index))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            jwt_auth_middleware,
        ));

    let me_route = Router::new()
        .route("/", get(me::index))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            jwt_auth_middleware,
        ));

    let x_request_id_header = HeaderName::from_static(REQUEST_ID_HEADER);
    let request_id_middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(
            x_request_id_header.clone(),
            MakeRequestUuid,
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = header_str(request, REQUEST_ID_HEADER);
                let user_agent = header_str(request, header::USER_AGENT);

                let matched_path = request
                    .extensions()
                    .get::<MatchedPath>()
                    .map(MatchedPath::as_str);

                tracing::info_span!(
                    "http_request",
                    request_id,
                    method = ?request.method(),
                    uri = ?request.uri(),
                    path = matched_path,
                    version = ?request.version(),
                    user_agent,
                )
            }),
        )
        .layer(PropagateRequestIdLayer::new(x_request_id_header));

    app.nest("/me", me_route)
        .nest("/resource/favourites", resources_favourites_route)
        .nest("/resource/history", resources_history_route)
        .layer(CompressionLayer::new())
        .layer(request_id_middleware)
        .with_state(state)
}
