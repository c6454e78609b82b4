//! One "insert or conditionally overwrite" operation rendered for each
//! supported SQL backend.
//!
//! An [`Upsert`] describes the row shape and the condition under which the
//! incoming row replaces the stored one. A [`Dialect`] turns it into the
//! backend's native statement and also owns the backend's retry policy.

use std::{sync::Arc, time::Duration};

use sqlx::mysql::MySqlDatabaseError;

use super::error::DatabaseError;

/// MySQL server errors that abort a transaction but leave it safe to replay:
/// 1213 deadlock, 1205 lock wait timeout.
const MYSQL_TRANSIENT_ERRORS: [u16; 2] = [1213, 1205];
const SERIALIZATION_FAILURE: &str = "40001";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    MySql,
}

impl Backend {
    pub fn from_url(url: &str) -> Result<Self, DatabaseError> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme.to_ascii_lowercase())
            .ok_or(DatabaseError::UnsupportedBackend)?;

        match scheme.as_str() {
            "sqlite" => Ok(Backend::Sqlite),
            "mysql" | "mariadb" => Ok(Backend::MySql),
            _ => Err(DatabaseError::UnsupportedBackend),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Sqlite => "sqlite",
            Backend::MySql => "mysql",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Incoming,
    Stored,
}

/// A column of either the incoming or the stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    side: Side,
    column: &'static str,
    zero_if_null: bool,
}

pub fn incoming(column: &'static str) -> Operand {
    Operand {
        side: Side::Incoming,
        column,
        zero_if_null: false,
    }
}

pub fn stored(column: &'static str) -> Operand {
    Operand {
        side: Side::Stored,
        column,
        zero_if_null: false,
    }
}

impl Operand {
    /// Compares NULL as 0.
    pub fn or_zero(mut self) -> Self {
        self.zero_if_null = true;
        self
    }

    pub fn gt(self, rhs: Operand) -> WinCondition {
        WinCondition::Compare(self, Comparison::Gt, rhs)
    }

    pub fn ge(self, rhs: Operand) -> WinCondition {
        WinCondition::Compare(self, Comparison::Ge, rhs)
    }

    pub fn eq(self, rhs: Operand) -> WinCondition {
        WinCondition::Compare(self, Comparison::Eq, rhs)
    }

    fn render(&self, column: impl Fn(Side, &str) -> String) -> String {
        let expression = column(self.side, self.column);
        if self.zero_if_null {
            format!("COALESCE({}, 0)", expression)
        } else {
            expression
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Ge,
    Eq,
}

impl Comparison {
    fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "=",
        }
    }
}

/// When the incoming row replaces the stored one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinCondition {
    Always,
    Compare(Operand, Comparison, Operand),
    And(Box<WinCondition>, Box<WinCondition>),
    Or(Box<WinCondition>, Box<WinCondition>),
}

impl WinCondition {
    pub fn and(self, other: WinCondition) -> Self {
        WinCondition::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: WinCondition) -> Self {
        WinCondition::Or(Box::new(self), Box::new(other))
    }

    /// Columns of the stored row the condition reads.
    pub fn stored_columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::new();
        self.collect_stored(&mut columns);
        columns
    }

    fn collect_stored(&self, columns: &mut Vec<&'static str>) {
        match self {
            WinCondition::Always => {}
            WinCondition::Compare(lhs, _, rhs) => {
                for operand in [lhs, rhs] {
                    if operand.side == Side::Stored && !columns.contains(&operand.column) {
                        columns.push(operand.column);
                    }
                }
            }
            WinCondition::And(lhs, rhs) | WinCondition::Or(lhs, rhs) => {
                lhs.collect_stored(columns);
                rhs.collect_stored(columns);
            }
        }
    }

    fn render(&self, column: &impl Fn(Side, &str) -> String) -> String {
        match self {
            WinCondition::Always => "1 = 1".to_string(),
            WinCondition::Compare(lhs, comparison, rhs) => format!(
                "{} {} {}",
                lhs.render(column),
                comparison.as_sql(),
                rhs.render(column)
            ),
            WinCondition::And(lhs, rhs) => {
                format!("({} AND {})", lhs.render(column), rhs.render(column))
            }
            WinCondition::Or(lhs, rhs) => {
                format!("({} OR {})", lhs.render(column), rhs.render(column))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnConflict {
    /// Keep the stored row as is.
    Ignore,
    /// Overwrite every non-key column when the condition holds.
    Update(WinCondition),
}

/// Row shape of an upsert. Values are bound in `keys` order followed by
/// `columns` order.
#[derive(Debug, Clone)]
pub struct Upsert {
    pub table: &'static str,
    pub keys: &'static [&'static str],
    pub columns: &'static [&'static str],
    pub on_conflict: OnConflict,
}

impl Upsert {
    fn insert_clause(&self) -> String {
        let names = self
            .keys
            .iter()
            .chain(self.columns.iter())
            .map(|name| quote(name))
            .collect::<Vec<_>>();
        let placeholders = vec!["?"; names.len()].join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(self.table),
            names.join(", "),
            placeholders
        )
    }
}

fn quote(identifier: &str) -> String {
    format!("`{}`", identifier)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }
}

pub trait Dialect: Send + Sync + std::fmt::Debug {
    fn backend(&self) -> Backend;

    fn render_upsert(&self, upsert: &Upsert) -> String;

    fn retry_policy(&self) -> RetryPolicy;

    /// Whether the failed transaction may be replayed from the start.
    fn is_transient(&self, error: &sqlx::Error) -> bool;

    /// Statements run on every new pooled connection.
    fn session_statements(&self) -> Vec<String>;
}

pub fn dialect_for(backend: Backend, busy_timeout: Duration) -> Arc<dyn Dialect> {
    match backend {
        Backend::Sqlite => Arc::new(SqliteDialect { busy_timeout }),
        Backend::MySql => Arc::new(MySqlDialect),
    }
}

/// Single writer, so lock conflicts wait on the busy timeout and are never
/// retried.
#[derive(Debug, Clone)]
pub struct SqliteDialect {
    pub busy_timeout: Duration,
}

impl Dialect for SqliteDialect {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    fn render_upsert(&self, upsert: &Upsert) -> String {
        let conflict_target = upsert
            .keys
            .iter()
            .map(|key| quote(key))
            .collect::<Vec<_>>()
            .join(", ");

        let condition = match &upsert.on_conflict {
            OnConflict::Update(condition) if !upsert.columns.is_empty() => condition,
            _ => {
                return format!(
                    "{} ON CONFLICT ({}) DO NOTHING",
                    upsert.insert_clause(),
                    conflict_target
                );
            }
        };

        let assignments = upsert
            .columns
            .iter()
            .map(|column| format!("{} = excluded.{}", quote(column), quote(column)))
            .collect::<Vec<_>>()
            .join(", ");

        let mut statement = format!(
            "{} ON CONFLICT ({}) DO UPDATE SET {}",
            upsert.insert_clause(),
            conflict_target,
            assignments
        );

        if *condition != WinCondition::Always {
            let column = |side: Side, name: &str| match side {
                Side::Incoming => format!("excluded.{}", quote(name)),
                Side::Stored => format!("{}.{}", quote(upsert.table), quote(name)),
            };
            statement.push_str(" WHERE ");
            statement.push_str(&condition.render(&column));
        }

        statement
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            backoff_step: Duration::ZERO,
        }
    }

    fn is_transient(&self, _error: &sqlx::Error) -> bool {
        false
    }

    fn session_statements(&self) -> Vec<String> {
        vec![
            format!("PRAGMA busy_timeout = {}", self.busy_timeout.as_millis()),
            "PRAGMA foreign_keys = ON".to_string(),
            "PRAGMA journal_mode = WAL".to_string(),
            "PRAGMA synchronous = NORMAL".to_string(),
            "PRAGMA cache_size = -20000".to_string(),
            "PRAGMA temp_store = MEMORY".to_string(),
        ]
    }
}

/// `ON DUPLICATE KEY UPDATE` has no row-level WHERE, so the condition guards
/// every assignment. Assignments see the columns already updated earlier in
/// the same statement, so columns the condition reads are assigned last, in
/// declared order.
#[derive(Debug, Clone)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn backend(&self) -> Backend {
        Backend::MySql
    }

    fn render_upsert(&self, upsert: &Upsert) -> String {
        let condition = match &upsert.on_conflict {
            OnConflict::Update(condition) if !upsert.columns.is_empty() => condition,
            _ => {
                let key = quote(upsert.keys[0]);
                return format!(
                    "{} ON DUPLICATE KEY UPDATE {} = {}",
                    upsert.insert_clause(),
                    key,
                    key
                );
            }
        };

        let read_by_condition = condition.stored_columns();
        let (decisive, plain): (Vec<&'static str>, Vec<&'static str>) = upsert
            .columns
            .iter()
            .copied()
            .partition(|column| read_by_condition.contains(column));

        let column = |side: Side, name: &str| match side {
            Side::Incoming => format!("VALUES({})", quote(name)),
            Side::Stored => quote(name),
        };
        let guard = condition.render(&column);

        let assignments = plain
            .iter()
            .chain(decisive.iter())
            .map(|name| {
                let name = quote(name);
                if *condition == WinCondition::Always {
                    format!("{} = VALUES({})", name, name)
                } else {
                    format!("{} = IF({}, VALUES({}), {})", name, guard, name, name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "{} ON DUPLICATE KEY UPDATE {}",
            upsert.insert_clause(),
            assignments
        )
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_step: Duration::from_millis(50),
        }
    }

    fn is_transient(&self, error: &sqlx::Error) -> bool {
        let sqlx::Error::Database(database_error) = error else {
            return false;
        };

        if let Some(mysql_error) = database_error.try_downcast_ref::<MySqlDatabaseError>() {
            if MYSQL_TRANSIENT_ERRORS.contains(&mysql_error.number()) {
                return true;
            }
        }

        database_error
            .code()
            .is_some_and(|code| code == SERIALIZATION_FAILURE)
    }

    fn session_statements(&self) -> Vec<String> {
        Vec::new()
    }
}
