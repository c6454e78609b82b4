use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use kotatsu_sync::{
    db::{
        dialect::{Backend, Dialect, RetryPolicy, SqliteDialect, Upsert},
        error::DatabaseError,
    },
    error::Error,
    model::HistoryPackage,
    sync::{Clock, SyncEngine},
};
use tokio::sync::Notify;

use crate::{AppStateTest, fake_history, fake_manga};

/// SQLite statements with a configurable retry policy that treats every
/// database error as transient.
#[derive(Debug)]
struct RetryingSqlite {
    inner: SqliteDialect,
    policy: RetryPolicy,
    transient_failures: AtomicU32,
    failed: Notify,
}

impl RetryingSqlite {
    fn new(max_attempts: u32, backoff_step: Duration) -> Self {
        RetryingSqlite {
            inner: SqliteDialect {
                busy_timeout: Duration::ZERO,
            },
            policy: RetryPolicy {
                max_attempts,
                backoff_step,
            },
            transient_failures: AtomicU32::new(0),
            failed: Notify::new(),
        }
    }

    fn transient_failures(&self) -> u32 {
        self.transient_failures.load(Ordering::SeqCst)
    }
}

impl Dialect for RetryingSqlite {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn render_upsert(&self, upsert: &Upsert) -> String {
        self.inner.render_upsert(upsert)
    }

    fn retry_policy(&self) -> RetryPolicy {
        self.policy
    }

    fn is_transient(&self, error: &sqlx::Error) -> bool {
        let transient = matches!(error, sqlx::Error::Database(_));
        if transient {
            self.transient_failures.fetch_add(1, Ordering::SeqCst);
            self.failed.notify_one();
        }
        transient
    }

    fn session_statements(&self) -> Vec<String> {
        self.inner.session_statements()
    }
}

/// Read once per transaction attempt.
#[derive(Debug, Default)]
struct CountingClock(AtomicU32);

impl CountingClock {
    fn calls(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

impl Clock for CountingClock {
    fn now_millis(&self) -> i64 {
        1_000 + i64::from(self.0.fetch_add(1, Ordering::SeqCst))
    }
}

fn history_package(manga_id: i64) -> HistoryPackage {
    HistoryPackage {
        history: vec![fake_history(fake_manga(manga_id, &[1]), 100, 1)],
        timestamp: None,
    }
}

async fn deleted_user_id(test_state: &AppStateTest) -> i64 {
    let user_id = test_state.generate_user().await.id;
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(&test_state.app_state.pool)
        .await
        .unwrap();

    user_id
}

#[tokio::test]
async fn transient_failures_are_retried_up_to_the_attempt_limit() {
    let test_state = AppStateTest::new(true).await;
    let dialect = Arc::new(RetryingSqlite::new(3, Duration::from_millis(1)));
    let clock = Arc::new(CountingClock::default());
    let engine = SyncEngine::new(
        test_state.app_state.pool.clone(),
        dialect.clone(),
        clock.clone(),
    );

    // History rows of a user that no longer exists break the users foreign key.
    let user_id = deleted_user_id(&test_state).await;

    let error = engine
        .push_history(user_id, history_package(1))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        Error::Database(DatabaseError::DatabaseError(sqlx::Error::Database(_)))
    ));
    assert!(!error.is_bad_input());
    assert_eq!(clock.calls(), 3);
    assert_eq!(dialect.transient_failures(), 2);
    assert_eq!(test_state.count("manga").await, 0);
    assert_eq!(test_state.count("tags").await, 0);
    assert_eq!(test_state.count("history").await, 0);

    test_state.cleanup().await;
}

#[tokio::test]
async fn sqlite_dialect_makes_a_single_attempt() {
    let test_state = AppStateTest::new(true).await;
    let clock = Arc::new(CountingClock::default());
    let engine = SyncEngine::new(
        test_state.app_state.pool.clone(),
        Arc::new(SqliteDialect {
            busy_timeout: Duration::from_secs(5),
        }),
        clock.clone(),
    );

    let user_id = deleted_user_id(&test_state).await;

    let error = engine
        .push_history(user_id, history_package(1))
        .await
        .unwrap_err();

    assert!(matches!(error, Error::Database(_)));
    assert_eq!(clock.calls(), 1);
    assert_eq!(test_state.count("manga").await, 0);

    test_state.cleanup().await;
}

#[tokio::test]
async fn push_succeeds_after_a_transient_lock_failure() {
    // No busy wait: a locked database fails the statement at once.
    let test_state = AppStateTest::new_with_busy_timeout(true, 0).await;
    let user_id = test_state.generate_user().await.id;
    let pool = test_state.app_state.pool.clone();

    // Two pooled connections, so neither side connects while the other holds
    // the write lock.
    {
        let _first = pool.acquire().await.unwrap();
        let _second = pool.acquire().await.unwrap();
    }

    let dialect = Arc::new(RetryingSqlite::new(3, Duration::from_millis(200)));
    let clock = Arc::new(CountingClock::default());
    let engine = SyncEngine::new(pool.clone(), dialect.clone(), clock.clone());

    let mut blocker = pool.begin().await.unwrap();
    sqlx::query("UPDATE users SET nickname = ? WHERE id = ?")
        .bind("writer")
        .bind(user_id)
        .execute(&mut *blocker)
        .await
        .unwrap();

    let notifier = Arc::clone(&dialect);
    let (result, ()) = tokio::join!(engine.push_history(user_id, history_package(7)), async move {
        notifier.failed.notified().await;
        blocker.commit().await.unwrap();
    });

    let pushed = result.unwrap();
    assert_eq!(pushed.history.len(), 1);
    assert_eq!(pushed.history[0].manga_id, 7);
    assert_eq!(clock.calls(), 2);
    assert_eq!(dialect.transient_failures(), 1);
    assert_eq!(pushed.timestamp, Some(1_001));

    test_state.cleanup().await;
}
