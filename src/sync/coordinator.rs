use std::collections::{BTreeMap, BTreeSet};

use crate::{
    db::{SyncTransaction, error::DatabaseError, user::touch_sync_timestamp},
    model::{
        Category, Favourite, FavouritesPackage, History, HistoryPackage, Manga, ResourceKind, Tag,
    },
};

use super::{SyncEngine, guard, merge};

/// Rows of one push in write order. Every list is sorted by key so concurrent
/// transactions lock overlapping rows in the same order.
#[derive(Debug, Default)]
pub(super) struct MergeBatch<'a> {
    tags: Vec<&'a Tag>,
    manga: Vec<&'a Manga>,
    manga_tags: Vec<(i64, i64)>,
    categories: Vec<&'a Category>,
    favourites: Vec<&'a Favourite>,
    history: Vec<&'a History>,
}

impl<'a> MergeBatch<'a> {
    pub(super) fn from_history(package: &'a HistoryPackage) -> Self {
        let mut history: Vec<&History> = package.history.iter().collect();
        history.sort_by_key(|item| item.manga_id);

        let mut batch = MergeBatch {
            history,
            ..Default::default()
        };
        batch.collect_manga(package.history.iter().filter_map(|item| item.manga.as_ref()));

        batch
    }

    pub(super) fn from_favourites(package: &'a FavouritesPackage) -> Self {
        let mut categories: Vec<&Category> = package.categories.iter().collect();
        categories.sort_by_key(|category| category.category_id);

        let mut favourites: Vec<&Favourite> = package.favourites.iter().collect();
        favourites.sort_by_key(|favourite| (favourite.manga_id, favourite.category_id));

        let mut batch = MergeBatch {
            categories,
            favourites,
            ..Default::default()
        };
        batch.collect_manga(
            package
                .favourites
                .iter()
                .filter_map(|item| item.manga.as_ref()),
        );

        batch
    }

    /// Later copies of the same manga or tag replace earlier ones.
    fn collect_manga(&mut self, items: impl Iterator<Item = &'a Manga>) {
        let mut manga_by_id = BTreeMap::new();
        let mut tags_by_id = BTreeMap::new();
        let mut links = BTreeSet::new();

        for manga in items {
            for tag in &manga.tags {
                tags_by_id.insert(tag.tag_id, tag);
                links.insert((manga.manga_id, tag.tag_id));
            }
            manga_by_id.insert(manga.manga_id, manga);
        }

        self.tags = tags_by_id.into_values().collect();
        self.manga = manga_by_id.into_values().collect();
        self.manga_tags = links.into_iter().collect();
    }
}

impl SyncEngine {
    /// Runs `batch` in one transaction, replaying it on transient failures as
    /// far as the backend's retry policy allows.
    #[tracing::instrument(
        name = "commit sync batch",
        skip(self, kind, batch),
        fields(kind = %kind, backend = self.dialect.backend().as_str())
    )]
    pub(super) async fn commit(
        &self,
        user_id: i64,
        kind: ResourceKind,
        batch: &MergeBatch<'_>,
    ) -> Result<(), DatabaseError> {
        let policy = self.dialect.retry_policy();
        let mut attempt = 1;

        loop {
            match self.attempt(user_id, kind, batch).await {
                Ok(()) => {
                    tracing::info!(attempt, "Sync batch committed");
                    return Ok(());
                }
                Err(error) if attempt < policy.max_attempts && self.dialect.is_transient(&error) => {
                    let backoff = policy.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        err.msg = %error,
                        "Transient failure, retrying sync batch"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::error!(attempt, err.msg = %error, err.details = ?error, "Sync batch failed");
                    return Err(DatabaseError::DatabaseError(error));
                }
            }
        }
    }

    async fn attempt(
        &self,
        user_id: i64,
        kind: ResourceKind,
        batch: &MergeBatch<'_>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        match self.apply(&mut tx, user_id, kind, batch).await {
            Ok(()) => tx.commit().await,
            Err(error) => {
                if let Err(rollback_error) = tx.rollback().await {
                    tracing::warn!(err.msg = %rollback_error, "Rollback failed");
                }
                Err(error)
            }
        }
    }

    async fn apply(
        &self,
        tx: &mut SyncTransaction,
        user_id: i64,
        kind: ResourceKind,
        batch: &MergeBatch<'_>,
    ) -> Result<(), sqlx::Error> {
        // First statement is a write: takes the SQLite write lock up front and
        // the user's row lock on MySQL.
        touch_sync_timestamp(tx, user_id, kind, self.clock.now_millis()).await?;

        for tag in &batch.tags {
            merge::merge_tag(tx, &self.merge_statements, tag).await?;
        }
        for manga in &batch.manga {
            merge::merge_manga(tx, &self.merge_statements, manga).await?;
        }
        for (manga_id, tag_id) in &batch.manga_tags {
            merge::link_manga_tag(tx, &self.merge_statements, *manga_id, *tag_id).await?;
        }

        for category in &batch.categories {
            merge::merge_category(tx, &self.merge_statements, user_id, category).await?;
        }

        for favourite in &batch.favourites {
            tracing::debug!(
                manga_id = favourite.manga_id,
                category_id = favourite.category_id,
                has_manga = favourite.manga.is_some(),
                "Merging favourite"
            );
            if favourite.manga.is_none() {
                guard::ensure_manga(tx, &self.guard_statements, favourite.manga_id).await?;
            }
            guard::ensure_category(tx, &self.guard_statements, user_id, favourite.category_id)
                .await?;
            merge::merge_favourite(tx, &self.merge_statements, user_id, favourite).await?;
        }

        for history in &batch.history {
            tracing::debug!(
                manga_id = history.manga_id,
                updated_at = history.updated_at,
                has_manga = history.manga.is_some(),
                "Merging history"
            );
            if history.manga.is_none() {
                guard::ensure_manga(tx, &self.guard_statements, history.manga_id).await?;
            }
            merge::merge_history(tx, &self.merge_statements, user_id, history).await?;
        }

        Ok(())
    }
}
