use std::collections::{BTreeSet, HashMap};

use sqlx::AnyPool;

use crate::{
    db::{manga::get_manga_by_ids, user::get_sync_timestamp},
    model::{
        Category, Favourite, FavouritesPackage, History, HistoryPackage, Manga, ResourceKind,
    },
};

#[derive(sqlx::FromRow)]
struct HistoryRow {
    manga_id: i64,
    created_at: i64,
    updated_at: i64,
    chapter_id: i64,
    page: i32,
    scroll: f64,
    percent: f64,
    chapters: i32,
    deleted_at: i64,
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    created_at: i64,
    sort_key: i32,
    title: String,
    order: String,
    track: i64,
    show_in_lib: i64,
    deleted_at: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct FavouriteRow {
    manga_id: i64,
    category_id: i64,
    sort_key: i32,
    pinned: i64,
    created_at: i64,
    deleted_at: i64,
}

async fn load_manga(
    pool: &AnyPool,
    manga_ids: impl Iterator<Item = i64>,
) -> Result<HashMap<i64, Manga>, sqlx::Error> {
    let ids: Vec<i64> = manga_ids.collect::<BTreeSet<_>>().into_iter().collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    get_manga_by_ids(pool, &ids).await
}

#[tracing::instrument(name = "read history snapshot", skip(pool))]
pub(super) async fn read_history(
    pool: &AnyPool,
    user_id: i64,
) -> Result<HistoryPackage, sqlx::Error> {
    let rows = sqlx::query_as::<_, HistoryRow>(
        r#"
        SELECT
            manga_id, created_at, updated_at,
            chapter_id, page, scroll,
            percent, chapters, deleted_at
        FROM
            history
        WHERE
            user_id = ?
        ORDER BY
            manga_id
    "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let manga = load_manga(pool, rows.iter().map(|row| row.manga_id)).await?;

    let history = rows
        .into_iter()
        .map(|row| History {
            manga: manga.get(&row.manga_id).cloned(),
            manga_id: row.manga_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            chapter_id: row.chapter_id,
            page: row.page,
            scroll: row.scroll,
            percent: row.percent,
            chapters: row.chapters,
            deleted_at: row.deleted_at,
        })
        .collect();

    let timestamp = get_sync_timestamp(pool, user_id, ResourceKind::History).await?;

    Ok(HistoryPackage { history, timestamp })
}

#[tracing::instrument(name = "read favourites snapshot", skip(pool))]
pub(super) async fn read_favourites(
    pool: &AnyPool,
    user_id: i64,
) -> Result<FavouritesPackage, sqlx::Error> {
    let categories = sqlx::query_as::<_, CategoryRow>(
        r#"
        SELECT
            id, created_at, sort_key, title, `order`, track, show_in_lib, deleted_at
        FROM
            categories
        WHERE
            user_id = ?
        ORDER BY
            id
    "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|row| Category {
        category_id: row.id,
        created_at: row.created_at,
        sort_key: row.sort_key,
        title: row.title,
        order: row.order,
        track: row.track != 0,
        show_in_lib: row.show_in_lib != 0,
        deleted_at: row.deleted_at,
    })
    .collect();

    let rows = sqlx::query_as::<_, FavouriteRow>(
        r#"
        SELECT
            manga_id, category_id, sort_key, pinned, created_at, deleted_at
        FROM
            favourites
        WHERE
            user_id = ?
        ORDER BY
            manga_id, category_id
    "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let manga = load_manga(pool, rows.iter().map(|row| row.manga_id)).await?;

    let favourites = rows
        .into_iter()
        .map(|row| Favourite {
            manga: manga.get(&row.manga_id).cloned(),
            manga_id: row.manga_id,
            category_id: row.category_id,
            sort_key: row.sort_key,
            pinned: row.pinned != 0,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        })
        .collect();

    let timestamp = get_sync_timestamp(pool, user_id, ResourceKind::Favourites).await?;

    Ok(FavouritesPackage {
        categories,
        favourites,
        timestamp,
    })
}
