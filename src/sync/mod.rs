//! Merge of client snapshots into the shared per-user record.
//!
//! A push validates the package, writes every row inside one transaction
//! under last-write-wins rules, raises the user's sync timestamp for the
//! resource class, commits (retrying where the backend allows) and answers
//! with a fresh read of the merged state. A pull is only that read.

use std::sync::Arc;

use sqlx::AnyPool;
use validator::Validate;

use crate::{
    db::{dialect::Dialect, error::DatabaseError},
    error::Error,
    model::{FavouritesPackage, HistoryPackage, ResourceKind},
};

use coordinator::MergeBatch;
use guard::GuardStatements;
use merge::MergeStatements;

pub mod clock;
mod coordinator;
mod guard;
mod merge;
mod snapshot;
mod validate;

pub use clock::{Clock, SystemClock};

#[derive(Debug)]
pub struct SyncEngine {
    pool: AnyPool,
    dialect: Arc<dyn Dialect>,
    clock: Arc<dyn Clock>,
    merge_statements: MergeStatements,
    guard_statements: GuardStatements,
}

impl SyncEngine {
    pub fn new(pool: AnyPool, dialect: Arc<dyn Dialect>, clock: Arc<dyn Clock>) -> Self {
        let merge_statements = MergeStatements::render(dialect.as_ref());
        let guard_statements = GuardStatements::render(dialect.as_ref());

        SyncEngine {
            pool,
            dialect,
            clock,
            merge_statements,
            guard_statements,
        }
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    #[tracing::instrument(
        name = "push history",
        skip(self, package),
        fields(items = package.history.len())
    )]
    pub async fn push_history(
        &self,
        user_id: i64,
        package: HistoryPackage,
    ) -> Result<HistoryPackage, Error> {
        package.validate().map_err(Error::Validation)?;

        let batch = MergeBatch::from_history(&package);
        self.commit(user_id, ResourceKind::History, &batch).await?;

        self.pull_history(user_id).await
    }

    #[tracing::instrument(
        name = "push favourites",
        skip(self, package),
        fields(
            categories = package.categories.len(),
            favourites = package.favourites.len()
        )
    )]
    pub async fn push_favourites(
        &self,
        user_id: i64,
        package: FavouritesPackage,
    ) -> Result<FavouritesPackage, Error> {
        package.validate().map_err(Error::Validation)?;

        let batch = MergeBatch::from_favourites(&package);
        self.commit(user_id, ResourceKind::Favourites, &batch).await?;

        self.pull_favourites(user_id).await
    }

    #[tracing::instrument(name = "pull history", skip(self))]
    pub async fn pull_history(&self, user_id: i64) -> Result<HistoryPackage, Error> {
        let package = snapshot::read_history(&self.pool, user_id)
            .await
            .map_err(DatabaseError::DatabaseError)?;

        Ok(package)
    }

    #[tracing::instrument(name = "pull favourites", skip(self))]
    pub async fn pull_favourites(&self, user_id: i64) -> Result<FavouritesPackage, Error> {
        let package = snapshot::read_favourites(&self.pool, user_id)
            .await
            .map_err(DatabaseError::DatabaseError)?;

        Ok(package)
    }
}
