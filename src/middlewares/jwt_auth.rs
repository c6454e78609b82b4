use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    auth::{decode_jwt, error::AuthError},
    db::user::get_user_by_id_optional,
    error::Error,
    state::SharedAppState,
};

fn bearer_token(req: &Request) -> Option<&str> {
    let header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;

    let mut parts = header.split_whitespace();
    let (scheme, token) = (parts.next()?, parts.next()?);
    if !scheme.eq_ignore_ascii_case("bearer") || parts.next().is_some() {
        return None;
    }

    Some(token)
}

#[tracing::instrument(name = "[MIDDLEWARE] jwt auth", skip_all)]
pub async fn jwt_auth_middleware(
    State(app_state): State<SharedAppState>,
    mut req: Request,
    next: Next,
) -> Result<Response<Body>, Error> {
    let token = bearer_token(&req).ok_or(Error::Auth(AuthError::Unauthenticated))?;

    let token_data = decode_jwt(token, &app_state.config.jwt)
        .map_err(|_| Error::Auth(AuthError::Unauthenticated))?;

    let user = get_user_by_id_optional(&app_state.pool, token_data.claims.user_id)
        .await?
        .map(Arc::new)
        .ok_or(Error::Auth(AuthError::Unauthenticated))?;

    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
