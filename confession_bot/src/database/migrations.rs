//! Versioned schema migrations with a persisted ledger.
//!
//! Every schema change the bot has ever made lives in [`MIGRATIONS`],
//! in order. Which of them already ran is recorded in the
//! `schema_migrations` table, so each step runs at most once per
//! database no matter how many times the bot restarts. A step and its
//! ledger entry commit in one transaction; a crash mid-migration leaves
//! the database on the previous version, not halfway.

use chrono::Utc;

use super::pool::{args, Arg, Backend, DbPool, Error};

/// A single versioned schema change.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    sql: MigrationSql,
}

enum MigrationSql {
    /// The same statements work on both backends.
    Same(&'static str),
    /// The dialects diverge (column types, AUTOINCREMENT vs BIGSERIAL,
    /// STRICT, and so on).
    PerBackend {
        sqlite: &'static str,
        postgres: &'static str,
    },
}

impl Migration {
    /// Statements to run, in order. Split on `;` — fine as long as no
    /// DDL here ever puts a semicolon inside a string literal.
    fn statements(&self, backend: Backend) -> impl Iterator<Item = &'static str> {
        let sql = match (&self.sql, backend) {
            (MigrationSql::Same(sql), _) => sql,
            (MigrationSql::PerBackend { sqlite, .. }, Backend::Sqlite) => sqlite,
            (MigrationSql::PerBackend { postgres, .. }, Backend::Postgres) => postgres,
        };
        sql.split(';').map(str::trim).filter(|x| !x.is_empty())
    }
}

/// Every schema change, oldest first. Append-only: editing or reordering
/// entries that have shipped breaks the ledger's whole point.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        sql: MigrationSql::PerBackend {
            sqlite: "
                CREATE TABLE users (
                    userid INTEGER PRIMARY KEY NOT NULL,
                    banned INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                ) STRICT;",
            postgres: "
                CREATE TABLE users (
                    userid BIGINT PRIMARY KEY,
                    banned BOOLEAN NOT NULL DEFAULT FALSE,
                    created_at TIMESTAMPTZ NOT NULL
                );",
        },
    },
    Migration {
        version: 2,
        name: "create_posts",
        sql: MigrationSql::PerBackend {
            sqlite: "
                CREATE TABLE posts (
                    postid INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                    userid INTEGER NOT NULL REFERENCES users(userid),
                    kind INTEGER NOT NULL,
                    text TEXT NULL,
                    file_id TEXT NULL,
                    status INTEGER NOT NULL DEFAULT 0,
                    channel_message_id INTEGER NULL,
                    review_chat_id INTEGER NULL,
                    review_message_id INTEGER NULL,
                    created_at TEXT NOT NULL,
                    decided_at TEXT NULL
                ) STRICT;
                CREATE INDEX posts_status ON posts(status);
                CREATE INDEX posts_userid_created ON posts(userid, created_at);
                CREATE INDEX posts_channel_message ON posts(channel_message_id);",
            postgres: "
                CREATE TABLE posts (
                    postid BIGSERIAL PRIMARY KEY,
                    userid BIGINT NOT NULL REFERENCES users(userid),
                    kind BIGINT NOT NULL,
                    text TEXT NULL,
                    file_id TEXT NULL,
                    status BIGINT NOT NULL DEFAULT 0,
                    channel_message_id BIGINT NULL,
                    review_chat_id BIGINT NULL,
                    review_message_id BIGINT NULL,
                    created_at TIMESTAMPTZ NOT NULL,
                    decided_at TIMESTAMPTZ NULL
                );
                CREATE INDEX posts_status ON posts(status);
                CREATE INDEX posts_userid_created ON posts(userid, created_at);
                CREATE INDEX posts_channel_message ON posts(channel_message_id);",
        },
    },
    Migration {
        version: 3,
        name: "create_comments",
        sql: MigrationSql::PerBackend {
            sqlite: "
                CREATE TABLE comments (
                    commentid INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                    postid INTEGER NOT NULL REFERENCES posts(postid) ON DELETE CASCADE,
                    userid INTEGER NOT NULL,
                    text TEXT NOT NULL,
                    created_at TEXT NOT NULL
                ) STRICT;
                CREATE INDEX comments_postid ON comments(postid);",
            postgres: "
                CREATE TABLE comments (
                    commentid BIGSERIAL PRIMARY KEY,
                    postid BIGINT NOT NULL REFERENCES posts(postid) ON DELETE CASCADE,
                    userid BIGINT NOT NULL,
                    text TEXT NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL
                );
                CREATE INDEX comments_postid ON comments(postid);",
        },
    },
    Migration {
        version: 4,
        name: "create_reactions",
        sql: MigrationSql::PerBackend {
            sqlite: "
                CREATE TABLE reactions (
                    postid INTEGER NOT NULL REFERENCES posts(postid) ON DELETE CASCADE,
                    userid INTEGER NOT NULL,
                    kind INTEGER NOT NULL,
                    PRIMARY KEY (postid, userid)
                ) STRICT;",
            postgres: "
                CREATE TABLE reactions (
                    postid BIGINT NOT NULL REFERENCES posts(postid) ON DELETE CASCADE,
                    userid BIGINT NOT NULL,
                    kind BIGINT NOT NULL,
                    PRIMARY KEY (postid, userid)
                );",
        },
    },
    Migration {
        version: 5,
        name: "create_reports",
        sql: MigrationSql::PerBackend {
            sqlite: "
                CREATE TABLE reports (
                    reportid INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
                    postid INTEGER NOT NULL REFERENCES posts(postid) ON DELETE CASCADE,
                    userid INTEGER NOT NULL,
                    reason TEXT NULL,
                    status INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                ) STRICT;
                CREATE INDEX reports_status ON reports(status);",
            postgres: "
                CREATE TABLE reports (
                    reportid BIGSERIAL PRIMARY KEY,
                    postid BIGINT NOT NULL REFERENCES posts(postid) ON DELETE CASCADE,
                    userid BIGINT NOT NULL,
                    reason TEXT NULL,
                    status BIGINT NOT NULL DEFAULT 0,
                    created_at TIMESTAMPTZ NOT NULL
                );
                CREATE INDEX reports_status ON reports(status);",
        },
    },
    Migration {
        version: 6,
        name: "add_user_notify",
        sql: MigrationSql::PerBackend {
            sqlite: "ALTER TABLE users ADD COLUMN notify INTEGER NOT NULL DEFAULT 1;",
            postgres: "ALTER TABLE users ADD COLUMN notify BOOLEAN NOT NULL DEFAULT TRUE;",
        },
    },
];

fn ledger_ddl(backend: Backend) -> &'static str {
    match backend {
        Backend::Sqlite => {
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            ) STRICT;"
        }
        Backend::Postgres => {
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL
            );"
        }
    }
}

/// Bring the database up to date. Returns how many steps actually ran;
/// running this again right away is a no-op.
pub async fn run_migrations(pool: &DbPool) -> Result<u32, Error> {
    apply(pool, MIGRATIONS).await
}

async fn apply(pool: &DbPool, migrations: &[Migration]) -> Result<u32, Error> {
    for window in migrations.windows(2) {
        if window[1].version <= window[0].version {
            return Err(Error::Protocol(format!(
                "migration versions not strictly ascending: {} then {}",
                window[0].version, window[1].version
            )));
        }
    }

    pool.execute(ledger_ddl(pool.backend()), vec![]).await?;

    let applied: Vec<i64> = pool
        .fetch_all("SELECT version FROM schema_migrations ORDER BY version;", vec![])
        .await?
        .iter()
        .map(|row| row.i64(0))
        .collect();
    let newest_applied = applied.last().copied().unwrap_or(0);

    let mut ran = 0;
    for migration in migrations {
        if applied.contains(&migration.version) {
            continue;
        }
        // A new migration that sorts before one already in the ledger
        // means the list was rewritten under us. Refuse to guess.
        if migration.version < newest_applied {
            return Err(Error::Protocol(format!(
                "migration {} ({}) appeared behind already-applied version {}",
                migration.version, migration.name, newest_applied
            )));
        }

        let mut statements: Vec<(String, Vec<Arg>)> = migration
            .statements(pool.backend())
            .map(|sql| (sql.to_string(), Vec::new()))
            .collect();
        statements.push((
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)"
                .to_string(),
            args![migration.version, migration.name, Utc::now()],
        ));

        pool.execute_transaction(&statements).await?;
        log::info!(
            "Applied migration {} ({})",
            migration.version,
            migration.name
        );
        ran += 1;
    }

    Ok(ran)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> DbPool {
        DbPool::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn migrations_run_once_and_only_once() {
        let pool = memory_pool().await;
        let ran = run_migrations(&pool).await.unwrap();
        assert_eq!(ran as usize, MIGRATIONS.len());

        // Second run is a no-op.
        let ran = run_migrations(&pool).await.unwrap();
        assert_eq!(ran, 0);
    }

    #[tokio::test]
    async fn ledger_records_every_version() {
        let pool = memory_pool().await;
        run_migrations(&pool).await.unwrap();

        let rows = pool
            .fetch_all(
                "SELECT version, name FROM schema_migrations ORDER BY version;",
                vec![],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), MIGRATIONS.len());
        for (row, migration) in rows.iter().zip(MIGRATIONS) {
            assert_eq!(row.i64(0), migration.version);
            assert_eq!(row.text(1), migration.name);
        }
    }

    #[tokio::test]
    async fn new_migrations_get_picked_up_later() {
        let pool = memory_pool().await;

        let first = &MIGRATIONS[..2];
        assert_eq!(apply(&pool, first).await.unwrap(), 2);

        // The "upgraded binary" ships the full list; only the tail runs.
        let ran = apply(&pool, MIGRATIONS).await.unwrap();
        assert_eq!(ran as usize, MIGRATIONS.len() - 2);
    }

    #[tokio::test]
    async fn rewritten_history_is_refused() {
        let pool = memory_pool().await;

        let gappy = [
            Migration {
                version: 1,
                name: "create_users",
                sql: MigrationSql::Same("CREATE TABLE users (userid INTEGER PRIMARY KEY);"),
            },
            Migration {
                version: 3,
                name: "create_extra",
                sql: MigrationSql::Same("CREATE TABLE extra (id INTEGER PRIMARY KEY);"),
            },
        ];
        apply(&pool, &gappy).await.unwrap();

        // Now someone inserts version 2 behind the ledger's back.
        let rewritten = [
            Migration {
                version: 1,
                name: "create_users",
                sql: MigrationSql::Same("CREATE TABLE users (userid INTEGER PRIMARY KEY);"),
            },
            Migration {
                version: 2,
                name: "sneaky",
                sql: MigrationSql::Same("CREATE TABLE sneaky (id INTEGER PRIMARY KEY);"),
            },
            Migration {
                version: 3,
                name: "create_extra",
                sql: MigrationSql::Same("CREATE TABLE extra (id INTEGER PRIMARY KEY);"),
            },
        ];
        let result = apply(&pool, &rewritten).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn non_ascending_list_is_refused() {
        let pool = memory_pool().await;
        let bad = [
            Migration {
                version: 2,
                name: "b",
                sql: MigrationSql::Same("CREATE TABLE b (id INTEGER PRIMARY KEY);"),
            },
            Migration {
                version: 2,
                name: "b_again",
                sql: MigrationSql::Same("CREATE TABLE c (id INTEGER PRIMARY KEY);"),
            },
        ];
        let result = apply(&pool, &bad).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn failed_migration_leaves_no_ledger_entry() {
        let pool = memory_pool().await;
        let broken = [Migration {
            version: 1,
            name: "broken",
            sql: MigrationSql::Same("CREATE TABLE ok (id INTEGER PRIMARY KEY); THIS IS NOT SQL;"),
        }];
        assert!(apply(&pool, &broken).await.is_err());

        let rows = pool
            .fetch_all("SELECT version FROM schema_migrations;", vec![])
            .await
            .unwrap();
        assert!(rows.is_empty());

        // And the partial table from the same transaction is gone too.
        let result = pool.fetch_all("SELECT * FROM ok;", vec![]).await;
        assert!(result.is_err());
    }
}
