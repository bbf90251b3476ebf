pub mod models;
pub mod repo;
pub mod schema;
pub mod writer;

use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, info};

pub use repo::Repository;
pub use writer::PersistenceWriter;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ошибка базы данных: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("{0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("не удалось применить миграцию {index}: {source}")]
    Migration { index: usize, source: sqlx::Error },
    #[error("неподдерживаемая схема URL базы данных: {0}")]
    UnsupportedUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

impl Dialect {
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else {
            let scheme = url.split(':').next().unwrap_or_default();
            Err(StoreError::UnsupportedUrl(scheme.to_string()))
        }
    }
}

/// Connection pool shared by the CRUD server and the agent's persistence writer.
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: AnyPool,
    dialect: Dialect,
}

impl DbPool {
    /// Connects and applies migrations.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();
        let dialect = Dialect::from_url(url)?;

        // every connection to sqlite::memory: is a separate database
        let in_memory = url.contains(":memory:");
        let mut options = AnyPoolOptions::new().max_connections(if in_memory {
            1
        } else {
            max_connections.max(1)
        });
        if in_memory {
            options = options.idle_timeout(None).max_lifetime(None);
        }

        let pool = options.connect(url).await?;
        let db = Self { pool, dialect };
        db.migrate().await?;
        info!(dialect = ?dialect, "подключение к базе данных установлено");
        Ok(db)
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:", 1).await
    }

    pub fn inner(&self) -> &AnyPool {
        &self.pool
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for (index, statement) in schema::migrations(self.dialect).iter().enumerate() {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|source| StoreError::Migration { index, source })?;
        }
        debug!("миграции применены");
        Ok(())
    }
}

pub fn now_rfc3339() -> String {
    humantime::format_rfc3339_seconds(SystemTime::now()).to_string()
}
