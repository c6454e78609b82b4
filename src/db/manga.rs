use std::collections::HashMap;

use futures::TryStreamExt;
use sqlx::{Any, AnyPool, QueryBuilder};

use crate::model::{Manga, Tag};

const CHUNK_SIZE: usize = 500;

#[derive(sqlx::FromRow)]
struct MangaRow {
    id: i64,
    title: String,
    alt_title: Option<String>,
    url: String,
    public_url: String,
    rating: f64,
    content_rating: Option<String>,
    cover_url: String,
    large_cover_url: Option<String>,
    state: Option<String>,
    author: Option<String>,
    source: String,
    nsfw: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct MangaTagRow {
    manga_id: i64,
    id: i64,
    title: String,
    key: String,
    source: String,
    pinned: Option<i64>,
}

impl MangaRow {
    fn into_manga(self, tags: Vec<Tag>) -> Manga {
        Manga {
            manga_id: self.id,
            title: self.title,
            alt_title: self.alt_title,
            url: self.url,
            public_url: self.public_url,
            rating: self.rating,
            nsfw: self.nsfw.map(|flag| flag != 0),
            content_rating: self.content_rating,
            cover_url: self.cover_url,
            large_cover_url: self.large_cover_url,
            state: self.state,
            author: self.author,
            source: self.source,
            tags,
        }
    }
}

/// Loads the manga rows among `ids` that exist, each with its tags ordered by id.
#[tracing::instrument(name = "get manga by ids", skip_all, fields(count = ids.len()))]
pub async fn get_manga_by_ids(
    pool: &AnyPool,
    ids: &[i64],
) -> Result<HashMap<i64, Manga>, sqlx::Error> {
    let mut tags_by_manga: HashMap<i64, Vec<Tag>> = HashMap::new();
    let mut manga = HashMap::with_capacity(ids.len());

    for chunk in ids.chunks(CHUNK_SIZE) {
        let mut tag_query_builder: QueryBuilder<Any> = QueryBuilder::new(
            r#"
            SELECT
                manga_tags.manga_id, tags.id, tags.title, tags.`key`, tags.source, tags.pinned
            FROM
                manga_tags
            INNER JOIN
                tags ON manga_tags.tag_id = tags.id
            WHERE
                manga_tags.manga_id IN (
        "#,
        );
        let mut separated = tag_query_builder.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(") ORDER BY manga_tags.manga_id, tags.id");

        let mut tag_stream = tag_query_builder
            .build_query_as::<MangaTagRow>()
            .fetch(pool);
        while let Some(row) = tag_stream.try_next().await? {
            tags_by_manga.entry(row.manga_id).or_default().push(Tag {
                tag_id: row.id,
                title: row.title,
                key: row.key,
                source: row.source,
                pinned: row.pinned.map(|flag| flag != 0),
            });
        }
        drop(tag_stream);

        let mut manga_query_builder: QueryBuilder<Any> = QueryBuilder::new(
            r#"
            SELECT
                id, title, alt_title,
                url, public_url, rating,
                content_rating, cover_url, large_cover_url,
                state, author, source, nsfw
            FROM
                manga
            WHERE
                id IN (
        "#,
        );
        let mut separated = manga_query_builder.separated(", ");
        for id in chunk {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows = manga_query_builder
            .build_query_as::<MangaRow>()
            .fetch_all(pool)
            .await?;
        for row in rows {
            let tags = tags_by_manga.remove(&row.id).unwrap_or_default();
            manga.insert(row.id, row.into_manga(tags));
        }
    }

    Ok(manga)
}
