use std::sync::Arc;

use axum::{Extension, Json, extract::State};

use crate::{
    error::Error,
    model::{HistoryPackage, User},
    state::SharedAppState,
};

#[tracing::instrument(name = "[GET] resource history", skip_all, fields(user_id = user.id))]
pub async fn index(
    Extension(user): Extension<Arc<User>>,
    State(app_state): State<SharedAppState>,
) -> Result<Json<HistoryPackage>, Error> {
    let result = app_state.sync.pull_history(user.id).await?;

    Ok(Json(result))
}

#[tracing::instrument(name = "[POST] resource history", skip_all, fields(user_id = user.id))]
pub async fn store(
    Extension(user): Extension<Arc<User>>,
    State(app_state): State<SharedAppState>,
    Json(package): Json<HistoryPackage>,
) -> Result<Json<HistoryPackage>, Error> {
    let result = app_state.sync.push_history(user.id, package).await?;

    Ok(Json(result))
}
