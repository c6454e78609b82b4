//! Placeholder rows for references that arrive before the data they point to.

use crate::{
    db::{
        SyncTransaction,
        dialect::{Dialect, OnConflict},
    },
    model::{Category, Manga},
};

use super::merge::{bind_category, bind_manga, category_upsert, manga_upsert};

#[derive(Debug, Clone)]
pub(super) struct GuardStatements {
    manga_placeholder: String,
    category_placeholder: String,
}

impl GuardStatements {
    pub(super) fn render(dialect: &dyn Dialect) -> Self {
        GuardStatements {
            manga_placeholder: dialect.render_upsert(&manga_upsert(OnConflict::Ignore)),
            category_placeholder: dialect.render_upsert(&category_upsert(OnConflict::Ignore)),
        }
    }
}

/// Makes sure manga `manga_id` exists.
pub(super) async fn ensure_manga(
    tx: &mut SyncTransaction,
    statements: &GuardStatements,
    manga_id: i64,
) -> Result<(), sqlx::Error> {
    // Manga rows are shared between users; reading first keeps an existing
    // row free of write locks.
    let exists = sqlx::query("SELECT 1 FROM manga WHERE id = ? LIMIT 1")
        .bind(manga_id)
        .fetch_optional(&mut **tx)
        .await?
        .is_some();
    if exists {
        return Ok(());
    }

    bind_manga(
        sqlx::query(&statements.manga_placeholder),
        &Manga::placeholder(manga_id),
    )
    .execute(&mut **tx)
    .await?;

    tracing::info!(manga_id, "Inserted placeholder manga");

    Ok(())
}

/// Makes sure category `category_id` exists for the user.
pub(super) async fn ensure_category(
    tx: &mut SyncTransaction,
    statements: &GuardStatements,
    user_id: i64,
    category_id: i64,
) -> Result<(), sqlx::Error> {
    let exists = sqlx::query("SELECT 1 FROM categories WHERE id = ? AND user_id = ? LIMIT 1")
        .bind(category_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .is_some();
    if exists {
        return Ok(());
    }

    bind_category(
        sqlx::query(&statements.category_placeholder),
        user_id,
        &Category::placeholder(category_id),
    )
    .execute(&mut **tx)
    .await?;

    tracing::info!(category_id, user_id, "Inserted placeholder category");

    Ok(())
}
