use crate::store::{DbPool, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, FromRow, Row};
use std::marker::PhantomData;

/// A column value bound to a parameterized statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: Value,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Value::Int(v) => query.bind(v),
        Value::Real(v) => query.bind(v),
        Value::Text(v) => query.bind(v),
    }
}

/// Maps a row type onto one table: a generated integer key plus writable columns.
pub trait Entity:
    Serialize + DeserializeOwned + for<'r> FromRow<'r, AnyRow> + Clone + Send + Sync + Unpin + 'static
{
    const TABLE: &'static str;
    const KEY: &'static str;
    /// Writable columns, in the order [`Entity::values`] returns them.
    const COLUMNS: &'static [&'static str];
    /// Columns written on insert but never overwritten by update.
    const KEEP_ON_UPDATE: &'static [&'static str] = &[];
    /// Human name used in "not found" messages.
    const LABEL: &'static str;

    fn key(&self) -> i64;
    fn set_key(&mut self, key: i64);
    fn values(&self) -> Vec<Value>;

    fn validate(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn before_insert(&mut self, _now: &str) {}

    fn before_update(&mut self, _now: &str) {}
}

/// Entity that belongs to a parent row, e.g. a disk snapshot to its computer.
pub trait ChildEntity: Entity {
    const PARENT_COLUMN: &'static str;
}

pub(crate) fn flag(row: &AnyRow, column: &str) -> Result<bool, sqlx::Error> {
    Ok(row.try_get::<i64, _>(column)? != 0)
}

pub(crate) fn require_text(value: &str, field: &str) -> Result<(), StoreError> {
    if value.trim().is_empty() {
        return Err(StoreError::Validation(format!("{field} is required")));
    }
    Ok(())
}

pub(crate) fn require_id(value: i64, field: &str) -> Result<(), StoreError> {
    if value <= 0 {
        return Err(StoreError::Validation(format!("{field} must be a positive id")));
    }
    Ok(())
}

pub struct Repository<E> {
    db: DbPool,
    _entity: PhantomData<E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            _entity: PhantomData,
        }
    }

    pub(crate) fn pool(&self) -> &DbPool {
        &self.db
    }

    fn select_sql() -> String {
        format!(
            "SELECT {}, {} FROM {}",
            E::KEY,
            E::COLUMNS.join(", "),
            E::TABLE
        )
    }

    pub async fn list(&self) -> Result<Vec<E>, StoreError> {
        let sql = format!("{} ORDER BY {}", Self::select_sql(), E::KEY);
        let rows = sqlx::query_as::<_, E>(&sql)
            .fetch_all(self.db.inner())
            .await?;
        Ok(rows)
    }

    /// Rows ordered by a known column; unknown columns are a validation error.
    pub async fn list_ordered(&self, column: &str, descending: bool) -> Result<Vec<E>, StoreError> {
        if column != E::KEY && !E::COLUMNS.contains(&column) {
            return Err(StoreError::Validation(format!(
                "unknown sort column '{column}'"
            )));
        }
        let direction = if descending { "DESC" } else { "ASC" };
        let sql = format!(
            "{} ORDER BY {column} {direction}, {key} {direction}",
            Self::select_sql(),
            key = E::KEY
        );
        let rows = sqlx::query_as::<_, E>(&sql)
            .fetch_all(self.db.inner())
            .await?;
        Ok(rows)
    }

    pub async fn get(&self, key: i64) -> Result<E, StoreError> {
        let sql = format!("{} WHERE {} = $1", Self::select_sql(), E::KEY);
        sqlx::query_as::<_, E>(&sql)
            .bind(key)
            .fetch_optional(self.db.inner())
            .await?
            .ok_or(StoreError::NotFound(E::LABEL))
    }

    /// Inserts the entity and returns it with the generated key.
    pub async fn create(&self, mut entity: E) -> Result<E, StoreError> {
        entity.before_insert(&crate::store::now_rfc3339());
        entity.validate()?;

        let placeholders: Vec<String> = (1..=E::COLUMNS.len()).map(|i| format!("${i}")).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            E::TABLE,
            E::COLUMNS.join(", "),
            placeholders.join(", "),
            E::KEY
        );
        let query = entity
            .values()
            .into_iter()
            .fold(sqlx::query(&sql), bind_value);
        let row = query.fetch_one(self.db.inner()).await?;
        entity.set_key(row.try_get::<i64, _>(0)?);
        Ok(entity)
    }

    /// Overwrites every updatable column of the row with the entity's key.
    pub async fn update(&self, mut entity: E) -> Result<E, StoreError> {
        entity.before_update(&crate::store::now_rfc3339());
        entity.validate()?;

        let updates: Vec<(&str, Value)> = E::COLUMNS
            .iter()
            .copied()
            .zip(entity.values())
            .filter(|(column, _)| !E::KEEP_ON_UPDATE.contains(column))
            .collect();
        let assignments: Vec<String> = updates
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{column} = ${}", i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ${}",
            E::TABLE,
            assignments.join(", "),
            E::KEY,
            updates.len() + 1
        );
        let query = updates
            .into_iter()
            .map(|(_, value)| value)
            .fold(sqlx::query(&sql), bind_value)
            .bind(entity.key());
        let result = query.execute(self.db.inner()).await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(E::LABEL));
        }
        Ok(entity)
    }

    pub async fn delete(&self, key: i64) -> Result<(), StoreError> {
        let sql = format!("DELETE FROM {} WHERE {} = $1", E::TABLE, E::KEY);
        let result = sqlx::query(&sql)
            .bind(key)
            .execute(self.db.inner())
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(E::LABEL));
        }
        Ok(())
    }
}

impl<E: ChildEntity> Repository<E> {
    pub async fn list_by_parent(&self, parent: i64) -> Result<Vec<E>, StoreError> {
        let sql = format!(
            "{} WHERE {} = $1 ORDER BY {}",
            Self::select_sql(),
            E::PARENT_COLUMN,
            E::KEY
        );
        let rows = sqlx::query_as::<_, E>(&sql)
            .bind(parent)
            .fetch_all(self.db.inner())
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{Computer, Disk, Ticket, TicketStatus};

    async fn db() -> DbPool {
        DbPool::in_memory().await.expect("база в памяти")
    }

    fn computer(host: &str) -> Computer {
        Computer {
            host_name: host.to_string(),
            user_name: "anna".to_string(),
            os_name: "linux".to_string(),
            os_version: "22.04".to_string(),
            process_count: 312,
            ..Computer::default()
        }
    }

    #[tokio::test]
    async fn create_then_get_returns_same_row() {
        let repo = Repository::<Computer>::new(db().await);
        let created = repo.create(computer("ws-01")).await.unwrap();
        assert!(created.computer_id > 0);

        let fetched = repo.get(created.computer_id).await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn missing_row_is_not_found() {
        let repo = Repository::<Computer>::new(db().await);
        let err = repo.get(999_999).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("Computer")));
        assert!(matches!(
            repo.delete(999_999).await,
            Err(StoreError::NotFound(_))
        ));
        let mut ghost = computer("ghost");
        ghost.computer_id = 999_999;
        assert!(matches!(repo.update(ghost).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_and_delete() {
        let repo = Repository::<Computer>::new(db().await);
        let mut created = repo.create(computer("ws-01")).await.unwrap();
        created.os_version = "24.04".to_string();
        repo.update(created.clone()).await.unwrap();
        assert_eq!(repo.get(created.computer_id).await.unwrap().os_version, "24.04");

        repo.delete(created.computer_id).await.unwrap();
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn validation_rejects_empty_host() {
        let repo = Repository::<Computer>::new(db().await);
        let err = repo.create(computer("  ")).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(repo.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn children_are_listed_by_parent() {
        let pool = db().await;
        let computers = Repository::<Computer>::new(pool.clone());
        let a = computers.create(computer("a")).await.unwrap();
        let b = computers.create(computer("b")).await.unwrap();

        let disks = Repository::<Disk>::new(pool);
        for (owner, letter) in [(a.computer_id, "/"), (b.computer_id, "/home"), (a.computer_id, "/boot")] {
            disks
                .create(Disk {
                    computer_id: owner,
                    drive_letter: letter.to_string(),
                    total_space_gb: 100.0,
                    ..Disk::default()
                })
                .await
                .unwrap();
        }

        let of_a = disks.list_by_parent(a.computer_id).await.unwrap();
        assert_eq!(of_a.len(), 2);
        assert!(of_a.iter().all(|d| d.computer_id == a.computer_id));
        assert!(of_a.iter().all(|d| !d.timestamp.is_empty()));
    }

    #[tokio::test]
    async fn ordered_listing_checks_column() {
        let repo = Repository::<Ticket>::new(db().await);
        for title in ["b", "a", "c"] {
            repo.create(Ticket {
                title: title.to_string(),
                status: TicketStatus::New,
                ..Ticket::default()
            })
            .await
            .unwrap();
        }
        let titles: Vec<String> = repo
            .list_ordered("title", true)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, vec!["c", "b", "a"]);

        let err = repo.list_ordered("title; DROP TABLE tickets", false).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
