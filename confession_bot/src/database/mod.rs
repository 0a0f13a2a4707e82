//! The data layer. Everything the bot persists goes through [`Database`];
//! handlers never see SQL or backend differences.

mod migrations;
mod pool;

mod comments;
mod export;
mod posts;
mod reactions;
mod reports;
mod stats;
mod users;

use std::sync::{atomic::AtomicBool, Arc};

pub use comments::Comment;
pub use posts::Post;
pub use sqlx::Error;
pub use stats::Stats;

use pool::DbPool;
pub(crate) use pool::args;

static WAS_CONSTRUCTED: AtomicBool = AtomicBool::new(false);

pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Connect to the configured database and bring its schema up to
    /// date. Production constructor; there is only ever one database.
    pub async fn new(db_url: &str) -> Result<Arc<Database>, Error> {
        assert!(
            !WAS_CONSTRUCTED.swap(true, std::sync::atomic::Ordering::SeqCst),
            "Second database was constructed. This is not allowed."
        );
        Ok(Arc::new(Self::connect(db_url).await?))
    }

    async fn connect(db_url: &str) -> Result<Database, Error> {
        let pool = DbPool::connect(db_url).await?;
        let ran = migrations::run_migrations(&pool).await?;
        if ran > 0 {
            log::info!("Ran {} schema migration(s).", ran);
        }
        Ok(Database { pool })
    }
}

#[cfg(test)]
pub(crate) async fn test_database() -> Database {
    Database::connect("sqlite::memory:").await.unwrap()
}
