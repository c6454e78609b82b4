//! Last-write-wins rules per entity and the row writers that apply them.

use sqlx::{Any, any::AnyArguments, query::Query};

use crate::{
    db::{
        SyncTransaction,
        dialect::{Dialect, OnConflict, Upsert, WinCondition, incoming, stored},
    },
    model::{Category, Favourite, History, Manga, Tag},
};

type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

const TITLE_LENGTH: usize = 512;
const URL_LENGTH: usize = 1024;
const ENUM_LENGTH: usize = 32;
const AUTHOR_LENGTH: usize = 255;
const SOURCE_LENGTH: usize = 64;
const TAG_TITLE_LENGTH: usize = 128;
const TAG_KEY_LENGTH: usize = 255;
const CATEGORY_TITLE_LENGTH: usize = 255;

const MANGA_COLUMNS: &[&str] = &[
    "title",
    "alt_title",
    "url",
    "public_url",
    "rating",
    "content_rating",
    "cover_url",
    "large_cover_url",
    "state",
    "author",
    "source",
    "nsfw",
];
const CATEGORY_COLUMNS: &[&str] = &[
    "sort_key",
    "title",
    "order",
    "track",
    "show_in_lib",
    "deleted_at",
    "created_at",
];

pub(super) fn manga_upsert(on_conflict: OnConflict) -> Upsert {
    Upsert {
        table: "manga",
        keys: &["id"],
        columns: MANGA_COLUMNS,
        on_conflict,
    }
}

pub(super) fn category_upsert(on_conflict: OnConflict) -> Upsert {
    Upsert {
        table: "categories",
        keys: &["id", "user_id"],
        columns: CATEGORY_COLUMNS,
        on_conflict,
    }
}

fn tag_upsert() -> Upsert {
    Upsert {
        table: "tags",
        keys: &["id"],
        columns: &["title", "key", "source", "pinned"],
        on_conflict: OnConflict::Update(WinCondition::Always),
    }
}

fn manga_tag_link() -> Upsert {
    Upsert {
        table: "manga_tags",
        keys: &["manga_id", "tag_id"],
        columns: &[],
        on_conflict: OnConflict::Ignore,
    }
}

/// Progress moves as one unit; the newer or equal update wins.
pub(super) fn history_wins() -> WinCondition {
    incoming("updated_at").ge(stored("updated_at"))
}

/// Newer creation wins; on equal creation the larger tombstone wins, ties
/// included, so a deletion is never undone by a re-push of the same row.
pub(super) fn category_wins() -> WinCondition {
    incoming("created_at").gt(stored("created_at")).or(incoming("created_at")
        .eq(stored("created_at"))
        .and(incoming("deleted_at").or_zero().ge(stored("deleted_at").or_zero())))
}

/// Like categories, but only a strictly larger tombstone wins a tie.
pub(super) fn favourite_wins() -> WinCondition {
    incoming("created_at").gt(stored("created_at")).or(incoming("created_at")
        .eq(stored("created_at"))
        .and(incoming("deleted_at").gt(stored("deleted_at"))))
}

/// Upsert statements rendered once for the active backend.
#[derive(Debug, Clone)]
pub(super) struct MergeStatements {
    manga: String,
    tag: String,
    manga_tag: String,
    category: String,
    favourite: String,
    history: String,
}

impl MergeStatements {
    pub(super) fn render(dialect: &dyn Dialect) -> Self {
        let favourite = Upsert {
            table: "favourites",
            keys: &["manga_id", "category_id", "user_id"],
            columns: &["sort_key", "pinned", "deleted_at", "created_at"],
            on_conflict: OnConflict::Update(favourite_wins()),
        };
        let history = Upsert {
            table: "history",
            keys: &["user_id", "manga_id"],
            columns: &[
                "created_at",
                "chapter_id",
                "page",
                "scroll",
                "percent",
                "chapters",
                "deleted_at",
                "updated_at",
            ],
            on_conflict: OnConflict::Update(history_wins()),
        };

        MergeStatements {
            manga: dialect.render_upsert(&manga_upsert(OnConflict::Update(WinCondition::Always))),
            tag: dialect.render_upsert(&tag_upsert()),
            manga_tag: dialect.render_upsert(&manga_tag_link()),
            category: dialect.render_upsert(&category_upsert(OnConflict::Update(category_wins()))),
            favourite: dialect.render_upsert(&favourite),
            history: dialect.render_upsert(&history),
        }
    }
}

/// Truncates to at most `max_chars` characters, the column's length.
pub(super) fn clip(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((index, _)) => value[..index].to_string(),
        None => value.to_string(),
    }
}

fn clip_optional(value: Option<&str>, max_chars: usize) -> Option<String> {
    value.map(|value| clip(value, max_chars))
}

pub(super) fn bind_manga<'q>(query: AnyQuery<'q>, manga: &Manga) -> AnyQuery<'q> {
    query
        .bind(manga.manga_id)
        .bind(clip(&manga.title, TITLE_LENGTH))
        .bind(clip_optional(manga.alt_title.as_deref(), TITLE_LENGTH))
        .bind(clip(&manga.url, URL_LENGTH))
        .bind(clip(&manga.public_url, URL_LENGTH))
        .bind(manga.rating)
        .bind(clip_optional(manga.content_rating.as_deref(), ENUM_LENGTH))
        .bind(clip(&manga.cover_url, URL_LENGTH))
        .bind(clip_optional(manga.large_cover_url.as_deref(), URL_LENGTH))
        .bind(clip_optional(manga.state.as_deref(), ENUM_LENGTH))
        .bind(clip_optional(manga.author.as_deref(), AUTHOR_LENGTH))
        .bind(clip(&manga.source, SOURCE_LENGTH))
        .bind(manga.is_nsfw())
}

pub(super) fn bind_category<'q>(
    query: AnyQuery<'q>,
    user_id: i64,
    category: &Category,
) -> AnyQuery<'q> {
    query
        .bind(category.category_id)
        .bind(user_id)
        .bind(category.sort_key)
        .bind(clip(&category.title, CATEGORY_TITLE_LENGTH))
        .bind(clip(&category.order, ENUM_LENGTH))
        .bind(category.track)
        .bind(category.show_in_lib)
        .bind(category.deleted_at)
        .bind(category.created_at)
}

/// Manga metadata is overwritten unconditionally.
pub(super) async fn merge_manga(
    tx: &mut SyncTransaction,
    statements: &MergeStatements,
    manga: &Manga,
) -> Result<(), sqlx::Error> {
    bind_manga(sqlx::query(&statements.manga), manga)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

pub(super) async fn merge_tag(
    tx: &mut SyncTransaction,
    statements: &MergeStatements,
    tag: &Tag,
) -> Result<(), sqlx::Error> {
    sqlx::query(&statements.tag)
        .bind(tag.tag_id)
        .bind(clip(&tag.title, TAG_TITLE_LENGTH))
        .bind(clip(&tag.key, TAG_KEY_LENGTH))
        .bind(clip(&tag.source, SOURCE_LENGTH))
        .bind(tag.pinned)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

/// Links are only ever added.
pub(super) async fn link_manga_tag(
    tx: &mut SyncTransaction,
    statements: &MergeStatements,
    manga_id: i64,
    tag_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(&statements.manga_tag)
        .bind(manga_id)
        .bind(tag_id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

pub(super) async fn merge_category(
    tx: &mut SyncTransaction,
    statements: &MergeStatements,
    user_id: i64,
    category: &Category,
) -> Result<(), sqlx::Error> {
    bind_category(sqlx::query(&statements.category), user_id, category)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

pub(super) async fn merge_favourite(
    tx: &mut SyncTransaction,
    statements: &MergeStatements,
    user_id: i64,
    favourite: &Favourite,
) -> Result<(), sqlx::Error> {
    sqlx::query(&statements.favourite)
        .bind(favourite.manga_id)
        .bind(favourite.category_id)
        .bind(user_id)
        .bind(favourite.sort_key)
        .bind(favourite.pinned)
        .bind(favourite.deleted_at)
        .bind(favourite.created_at)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

pub(super) async fn merge_history(
    tx: &mut SyncTransaction,
    statements: &MergeStatements,
    user_id: i64,
    history: &History,
) -> Result<(), sqlx::Error> {
    sqlx::query(&statements.history)
        .bind(user_id)
        .bind(history.manga_id)
        .bind(history.created_at)
        .bind(history.chapter_id)
        .bind(history.page)
        .bind(history.scroll)
        .bind(history.percent)
        .bind(history.chapters)
        .bind(history.deleted_at)
        .bind(history.updated_at)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
