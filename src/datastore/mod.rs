//! Generic entity CRUD over a shared store driver.
//!
//! [`Datastore`] is generic over [`Entity`] only; it never assumes anything
//! about a record beyond its integer identity and its serde representation.
//! Every failure leaves this layer as exactly one [`ApiError`].

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::{connect_with_retry, ensure_database_exists, PgStore};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::ApiError;
use crate::validation::ValidationRule;

/// A stored row: column name to value.
pub type Row = Map<String, Value>;

/// Column-equality constraints, all of which must hold.
pub type Filters = [(String, Value)];

/// Column holding the identity of every stored record.
pub const ID_COLUMN: &str = "id";

/// Set once, when a timestamped record is stored.
pub const CREATED_AT_COLUMN: &str = "created_at";

/// Refreshed on every store and update of a timestamped record.
pub const UPDATED_AT_COLUMN: &str = "updated_at";

/// A record that can be identified by its unique integer id.
pub trait Identifiable {
    /// `None` until the record has been stored.
    fn id(&self) -> Option<i64>;
    fn set_id(&mut self, id: i64);
}

/// A record type the datastore can persist.
pub trait Entity: Identifiable + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Store table.
    const TABLE: &'static str;
    /// JSON:API resource type.
    const TYPE: &'static str;
    /// Whether the datastore maintains `created_at` and `updated_at`.
    const TIMESTAMPS: bool = false;

    fn validation_rules() -> Vec<(&'static str, ValidationRule)> {
        Vec::new()
    }
}

/// Bare identity, for operations that only read the id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordId(pub i64);

impl Identifiable for RecordId {
    fn id(&self) -> Option<i64> {
        Some(self.0)
    }

    fn set_id(&mut self, id: i64) {
        self.0 = id;
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("database: {0}")]
    Db(sqlx::Error),
    #[error("row encoding: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("{0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Db(other),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => {
                ApiError::not_found("The requested resource was not found in the datastore.")
            }
            other => ApiError::database(other),
        }
    }
}

/// Storage backend. Implementations must be safe for concurrent use without
/// caller-side locking; each call is a self-contained unit of work.
#[async_trait]
pub trait StoreDriver: Send + Sync {
    async fn count(&self, table: &str, filters: &Filters) -> Result<u64, StoreError>;

    /// Rows ordered by id, optionally windowed.
    async fn select(
        &self,
        table: &str,
        filters: &Filters,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<Row>, StoreError>;

    /// Fails with [`StoreError::NotFound`] when no row has this id.
    async fn select_by_id(&self, table: &str, id: i64) -> Result<Row, StoreError>;

    /// Insert a row without id; returns the stored row including its new id.
    async fn insert(&self, table: &str, row: Row) -> Result<Row, StoreError>;

    /// Overwrite the given columns of row `id`; returns affected rows.
    async fn update(&self, table: &str, id: i64, row: Row) -> Result<u64, StoreError>;

    /// Returns affected rows.
    async fn delete(&self, table: &str, id: i64) -> Result<u64, StoreError>;
}

/// Handle to the process-wide store, cheap to clone and shared by all requests.
#[derive(Clone)]
pub struct Datastore {
    driver: Arc<dyn StoreDriver>,
}

impl Datastore {
    pub fn new(driver: Arc<dyn StoreDriver>) -> Self {
        Datastore { driver }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub async fn count_entities<E: Entity>(&self, filters: &Filters) -> Result<u64, ApiError> {
        self.driver
            .count(E::TABLE, filters)
            .await
            .map_err(ApiError::database)
    }

    pub async fn fetch_entities<E: Entity>(&self, filters: &Filters) -> Result<Vec<E>, ApiError> {
        let rows = self
            .driver
            .select(E::TABLE, filters, None, None)
            .await
            .map_err(ApiError::database)?;
        rows.into_iter().map(from_row).collect()
    }

    pub async fn fetch_paged_entities<E: Entity>(
        &self,
        limit: u64,
        offset: u64,
        filters: &Filters,
    ) -> Result<Vec<E>, ApiError> {
        let rows = self
            .driver
            .select(E::TABLE, filters, Some(limit), Some(offset))
            .await
            .map_err(ApiError::database)?;
        rows.into_iter().map(from_row).collect()
    }

    /// Not-found is reported only for a missing row; any other store failure
    /// (timeouts included) is a database error.
    pub async fn fetch_entity<E: Entity>(&self, id: i64) -> Result<E, ApiError> {
        let row = self.driver.select_by_id(E::TABLE, id).await?;
        from_row(row)
    }

    /// Insert a new entity and assign its identity. An entity that already
    /// carries an id is a create with a client-supplied id and is rejected.
    /// Timestamped entities get both stamps set to now.
    pub async fn store_entity<E: Entity>(&self, entity: &mut E) -> Result<(), ApiError> {
        if entity.id().is_some() {
            return Err(ApiError::DUPLICATE_ENTRY);
        }
        let mut row = to_row(entity)?;
        if E::TIMESTAMPS {
            let now = now_stamp();
            row.insert(CREATED_AT_COLUMN.to_owned(), now.clone());
            row.insert(UPDATED_AT_COLUMN.to_owned(), now);
        }
        let stored = self
            .driver
            .insert(E::TABLE, row)
            .await
            .map_err(ApiError::database)?;
        let id = stored
            .get(ID_COLUMN)
            .and_then(Value::as_i64)
            .ok_or_else(|| ApiError::database("store did not assign an identity"))?;
        *entity = from_row(stored)?;
        entity.set_id(id);
        Ok(())
    }

    /// Write every non-null field of `entity` to the stored record with the
    /// same id. Zero matched rows means the record does not exist. The
    /// creation stamp of a timestamped entity is never overwritten.
    pub async fn update_entity<E: Entity>(&self, entity: &E) -> Result<(), ApiError> {
        let id = entity.id().ok_or_else(|| ApiError::not_found("The entity has no identity."))?;
        let mut row = to_row(entity)?;
        row.retain(|_, v| !v.is_null());
        if E::TIMESTAMPS {
            row.remove(CREATED_AT_COLUMN);
            row.insert(UPDATED_AT_COLUMN.to_owned(), now_stamp());
        }
        let affected = self
            .driver
            .update(E::TABLE, id, row)
            .await
            .map_err(ApiError::database)?;
        if affected == 0 {
            return Err(not_found());
        }
        Ok(())
    }

    /// Delete the stored `E` with the identity of `record`.
    ///
    /// The existence count and the delete are separate statements; two
    /// concurrent deletes may both see the row. The delete's own affected-row
    /// count decides the loser, which gets not-found like any other missing row.
    pub async fn delete_entity<E: Entity, R: Identifiable + ?Sized>(&self, record: &R) -> Result<(), ApiError> {
        let id = record.id().ok_or_else(not_found)?;
        let by_id = [(ID_COLUMN.to_owned(), Value::from(id))];
        let count = self
            .driver
            .count(E::TABLE, &by_id)
            .await
            .map_err(ApiError::database)?;
        if count == 0 {
            return Err(not_found());
        }
        let affected = self
            .driver
            .delete(E::TABLE, id)
            .await
            .map_err(ApiError::database)?;
        if affected == 0 {
            return Err(not_found());
        }
        Ok(())
    }
}

fn not_found() -> ApiError {
    ApiError::not_found("The requested resource was not found in the datastore.")
}

fn now_stamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn to_row<E: Entity>(entity: &E) -> Result<Row, ApiError> {
    match serde_json::to_value(entity).map_err(ApiError::database)? {
        Value::Object(mut row) => {
            row.remove(ID_COLUMN);
            Ok(row)
        }
        _ => Err(ApiError::database(format!("{} does not serialize to a row", E::TYPE))),
    }
}

fn from_row<E: Entity>(row: Row) -> Result<E, ApiError> {
    serde_json::from_value(Value::Object(row)).map_err(ApiError::database)
}
