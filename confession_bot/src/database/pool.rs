//! The one place that knows there are two database backends.
//!
//! Queries everywhere else are written once, in SQLite flavor with `?`
//! placeholders, and handed to [`DbPool`] together with a `Vec<Arg>`.
//! For PostgreSQL the placeholders get rewritten to `$1..$n` before
//! dispatch; rows come back wrapped in a backend-erasing [`DbRow`].
//!
//! DDL is the exception: where the dialects genuinely diverge the
//! migrations carry per-backend SQL, see the migrations module.

use std::{pin::Pin, str::FromStr};

use chrono::{DateTime, Utc};
pub use sqlx::Error;
use sqlx::{
    migrate::MigrateDatabase,
    postgres::{PgArguments, PgPoolOptions, PgRow},
    query::Query,
    sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Postgres, Row, Sqlite,
};
use tokio_stream::Stream;

/// Which SQL dialect the pool speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    Postgres,
}

/// A connection pool to either backend, picked by URL scheme.
pub enum DbPool {
    Sqlite(sqlx::Pool<Sqlite>),
    Postgres(sqlx::Pool<Postgres>),
}

/// A bind argument for a query.
///
/// Everything integer-ish travels as `i64`: SQLite's INTEGER is 64-bit
/// anyway, and the PostgreSQL schema uses BIGINT throughout so decoding
/// never has to guess column widths.
#[derive(Debug, Clone)]
pub enum Arg {
    I64(Option<i64>),
    Bool(bool),
    Text(Option<String>),
    DateTime(Option<DateTime<Utc>>),
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::I64(Some(value))
    }
}
impl From<Option<i64>> for Arg {
    fn from(value: Option<i64>) -> Self {
        Arg::I64(value)
    }
}
impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::I64(Some(value.into()))
    }
}
impl From<u8> for Arg {
    fn from(value: u8) -> Self {
        Arg::I64(Some(value.into()))
    }
}
impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::I64(Some(value.into()))
    }
}
impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}
impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Text(Some(value.to_string()))
    }
}
impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Text(Some(value))
    }
}
impl From<Option<String>> for Arg {
    fn from(value: Option<String>) -> Self {
        Arg::Text(value)
    }
}
impl From<Option<&str>> for Arg {
    fn from(value: Option<&str>) -> Self {
        Arg::Text(value.map(str::to_string))
    }
}
impl From<DateTime<Utc>> for Arg {
    fn from(value: DateTime<Utc>) -> Self {
        Arg::DateTime(Some(value))
    }
}
impl From<Option<DateTime<Utc>>> for Arg {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        Arg::DateTime(value)
    }
}

/// Build a `Vec<Arg>` out of anything with a `From` impl above.
macro_rules! args {
    ($($x:expr),* $(,)?) => {
        vec![$(crate::database::pool::Arg::from($x)),*]
    };
}
pub(crate) use args;

/// A row from either backend. Columns are read by index; callers know
/// their own SELECT lists.
pub enum DbRow {
    Sqlite(SqliteRow),
    Postgres(PgRow),
}

impl DbRow {
    pub fn i64(&self, idx: usize) -> i64 {
        match self {
            DbRow::Sqlite(row) => row.get(idx),
            DbRow::Postgres(row) => row.get(idx),
        }
    }

    pub fn opt_i64(&self, idx: usize) -> Option<i64> {
        match self {
            DbRow::Sqlite(row) => row.get(idx),
            DbRow::Postgres(row) => row.get(idx),
        }
    }

    pub fn bool(&self, idx: usize) -> bool {
        match self {
            DbRow::Sqlite(row) => row.get(idx),
            DbRow::Postgres(row) => row.get(idx),
        }
    }

    pub fn text(&self, idx: usize) -> String {
        match self {
            DbRow::Sqlite(row) => row.get(idx),
            DbRow::Postgres(row) => row.get(idx),
        }
    }

    pub fn opt_text(&self, idx: usize) -> Option<String> {
        match self {
            DbRow::Sqlite(row) => row.get(idx),
            DbRow::Postgres(row) => row.get(idx),
        }
    }

    pub fn datetime(&self, idx: usize) -> DateTime<Utc> {
        match self {
            DbRow::Sqlite(row) => row.get(idx),
            DbRow::Postgres(row) => row.get(idx),
        }
    }

    pub fn opt_datetime(&self, idx: usize) -> Option<DateTime<Utc>> {
        match self {
            DbRow::Sqlite(row) => row.get(idx),
            DbRow::Postgres(row) => row.get(idx),
        }
    }
}

/// Rewrite `?` placeholders into `$1..$n` for PostgreSQL.
///
/// Question marks inside single-quoted string literals are left alone.
/// The `''` escape toggles the literal flag twice, which nets out right.
pub fn adapt_placeholders(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut n: u32 = 0;
    let mut in_literal = false;
    for c in sql.chars() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                out.push(c);
            }
            '?' if !in_literal => {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            }
            _ => out.push(c),
        }
    }
    out
}

fn bind_sqlite<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    arg: Arg,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match arg {
        Arg::I64(x) => query.bind(x),
        Arg::Bool(x) => query.bind(x),
        Arg::Text(x) => query.bind(x),
        Arg::DateTime(x) => query.bind(x),
    }
}

fn bind_pg<'q>(
    query: Query<'q, Postgres, PgArguments>,
    arg: Arg,
) -> Query<'q, Postgres, PgArguments> {
    match arg {
        Arg::I64(x) => query.bind(x),
        Arg::Bool(x) => query.bind(x),
        Arg::Text(x) => query.bind(x),
        Arg::DateTime(x) => query.bind(x),
    }
}

impl DbPool {
    /// Connect to `url`, creating the database if it's SQLite and the
    /// file isn't there yet.
    pub async fn connect(url: &str) -> Result<DbPool, Error> {
        if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            let pool = PgPoolOptions::new().max_connections(32).connect(url).await?;
            return Ok(DbPool::Postgres(pool));
        }

        let in_memory = url.contains(":memory:");
        if !in_memory && !Sqlite::database_exists(url).await.unwrap_or(false) {
            Sqlite::create_database(url).await?;
        }

        // Every pooled connection to `:memory:` would get its own empty
        // database, so those get exactly one connection.
        let max_connections = if in_memory { 1 } else { 32 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(
                SqliteConnectOptions::from_str(url)?
                    .pragma("cache_size", "-32768")
                    .foreign_keys(true)
                    .busy_timeout(std::time::Duration::from_secs(600)),
            )
            .await?;
        Ok(DbPool::Sqlite(pool))
    }

    pub fn backend(&self) -> Backend {
        match self {
            DbPool::Sqlite(_) => Backend::Sqlite,
            DbPool::Postgres(_) => Backend::Postgres,
        }
    }

    /// Run a statement, returning how many rows it touched.
    pub async fn execute(&self, sql: &str, arguments: Vec<Arg>) -> Result<u64, Error> {
        match self {
            DbPool::Sqlite(pool) => {
                let mut query = sqlx::query(sql);
                for arg in arguments {
                    query = bind_sqlite(query, arg);
                }
                Ok(query.execute(pool).await?.rows_affected())
            }
            DbPool::Postgres(pool) => {
                let sql = adapt_placeholders(sql);
                let mut query = sqlx::query(&sql);
                for arg in arguments {
                    query = bind_pg(query, arg);
                }
                Ok(query.execute(pool).await?.rows_affected())
            }
        }
    }

    pub async fn fetch_optional(
        &self,
        sql: &str,
        arguments: Vec<Arg>,
    ) -> Result<Option<DbRow>, Error> {
        match self {
            DbPool::Sqlite(pool) => {
                let mut query = sqlx::query(sql);
                for arg in arguments {
                    query = bind_sqlite(query, arg);
                }
                Ok(query.fetch_optional(pool).await?.map(DbRow::Sqlite))
            }
            DbPool::Postgres(pool) => {
                let sql = adapt_placeholders(sql);
                let mut query = sqlx::query(&sql);
                for arg in arguments {
                    query = bind_pg(query, arg);
                }
                Ok(query.fetch_optional(pool).await?.map(DbRow::Postgres))
            }
        }
    }

    pub async fn fetch_one(&self, sql: &str, arguments: Vec<Arg>) -> Result<DbRow, Error> {
        self.fetch_optional(sql, arguments)
            .await?
            .ok_or(Error::RowNotFound)
    }

    pub async fn fetch_all(&self, sql: &str, arguments: Vec<Arg>) -> Result<Vec<DbRow>, Error> {
        match self {
            DbPool::Sqlite(pool) => {
                let mut query = sqlx::query(sql);
                for arg in arguments {
                    query = bind_sqlite(query, arg);
                }
                Ok(query
                    .fetch_all(pool)
                    .await?
                    .into_iter()
                    .map(DbRow::Sqlite)
                    .collect())
            }
            DbPool::Postgres(pool) => {
                let sql = adapt_placeholders(sql);
                let mut query = sqlx::query(&sql);
                for arg in arguments {
                    query = bind_pg(query, arg);
                }
                Ok(query
                    .fetch_all(pool)
                    .await?
                    .into_iter()
                    .map(DbRow::Postgres)
                    .collect())
            }
        }
    }

    /// Stream rows of a placeholder-free query. Used for exports, where
    /// slurping the whole table into memory would be rude.
    pub fn fetch_stream<'a>(
        &'a self,
        sql: &'a str,
    ) -> Pin<Box<dyn Stream<Item = Result<DbRow, Error>> + Send + 'a>> {
        // No placeholders means the SQL needs no adaptation.
        debug_assert!(!sql.contains('?'));
        match self {
            DbPool::Sqlite(pool) => Box::pin(sqlx::query(sql).map(DbRow::Sqlite).fetch(pool)),
            DbPool::Postgres(pool) => Box::pin(sqlx::query(sql).map(DbRow::Postgres).fetch(pool)),
        }
    }

    /// Run every statement in one transaction, committing only if all
    /// of them succeed. Placeholder adaptation applies here too.
    pub async fn execute_transaction(&self, statements: &[(String, Vec<Arg>)]) -> Result<(), Error> {
        match self {
            DbPool::Sqlite(pool) => {
                let mut tx = pool.begin().await?;
                for (sql, arguments) in statements {
                    let mut query = sqlx::query(sql);
                    for arg in arguments {
                        query = bind_sqlite(query, arg.clone());
                    }
                    query.execute(&mut *tx).await?;
                }
                tx.commit().await?;
            }
            DbPool::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                for (sql, arguments) in statements {
                    let sql = adapt_placeholders(sql);
                    let mut query = sqlx::query(&sql);
                    for arg in arguments {
                        query = bind_pg(query, arg.clone());
                    }
                    query.execute(&mut *tx).await?;
                }
                tx.commit().await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_get_numbered() {
        assert_eq!(
            adapt_placeholders("SELECT * FROM posts WHERE postid=? AND status=?;"),
            "SELECT * FROM posts WHERE postid=$1 AND status=$2;"
        );
    }

    #[test]
    fn placeholders_in_literals_are_left_alone() {
        assert_eq!(
            adapt_placeholders("UPDATE posts SET text='what?' WHERE postid=?;"),
            "UPDATE posts SET text='what?' WHERE postid=$1;"
        );
        // Escaped quote inside a literal.
        assert_eq!(
            adapt_placeholders("SELECT 'it''s a ?' WHERE 1=?;"),
            "SELECT 'it''s a ?' WHERE 1=$1;"
        );
    }

    #[test]
    fn no_placeholders_no_changes() {
        let sql = "SELECT COUNT(*) FROM users;";
        assert_eq!(adapt_placeholders(sql), sql);
    }

    #[test]
    fn ten_plus_placeholders_number_correctly() {
        let sql = "INSERT INTO t VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?);";
        let adapted = adapt_placeholders(sql);
        assert!(adapted.ends_with("$10, $11);"));
    }
}
