//! `SQLite` catalog store for discovered model files.
//!
//! The store is single-writer: every mutating operation takes a store-level
//! lock, readers go straight to the pool.

use core::str::FromStr;
use core::time::Duration;
use std::path::Path;
use std::sync::Arc;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tokio::sync::Mutex;

mod catalog;
mod enrichment;

pub use enrichment::{AppliedEnrichment, EnrichmentWrite};

/// How long a connection waits on a locked database file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(60);

/// Handle to the model catalog. Cheap to clone; clones share the pool and write lock.
#[derive(Debug, Clone)]
pub struct Catalog {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl Catalog {
    /// Opens (creating if missing) the catalog at the given `SQLite` URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the database cannot be opened.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?;
        Self::connect_with(options).await
    }

    /// Opens (creating if missing) the catalog stored in the given file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        Self::connect_with(SqliteConnectOptions::new().filename(path)).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self, sqlx::Error> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Runs all pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if running migrations fails.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    /// Underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
