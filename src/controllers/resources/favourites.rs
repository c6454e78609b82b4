use std::sync::Arc;

use axum::{Extension, Json, extract::State};

use crate::{
    error::Error,
    model::{FavouritesPackage, User},
    state::SharedAppState,
};

#[tracing::instrument(name = "[GET] resource favourites", skip_all, fields(user_id = user.id))]
pub async fn index(
    Extension(user): Extension<Arc<User>>,
    State(app_state): State<SharedAppState>,
) -> Result<Json<FavouritesPackage>, Error> {
    let result = app_state.sync.pull_favourites(user.id).await?;

    Ok(Json(result))
}

#[tracing::instrument(name = "[POST] resource favourites", skip_all, fields(user_id = user.id))]
pub async fn store(
    Extension(user): Extension<Arc<User>>,
    State(app_state): State<SharedAppState>,
    Json(package): Json<FavouritesPackage>,
) -> Result<Json<FavouritesPackage>, Error> {
    let result = app_state.sync.push_favourites(user.id, package).await?;

    Ok(Json(result))
}
