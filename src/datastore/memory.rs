//! Process-local store for development and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use super::{Filters, Row, StoreDriver, StoreError, ID_COLUMN};

#[derive(Default)]
struct Table {
    last_id: i64,
    rows: BTreeMap<i64, Row>,
}

/// Tables keyed by name, each with its own id sequence starting at 1.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Table>>, StoreError> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Table>>, StoreError> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".into()))
    }
}

fn matches(row: &Row, filters: &Filters) -> bool {
    filters.iter().all(|(col, val)| row.get(col) == Some(val))
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

#[async_trait]
impl StoreDriver for MemoryStore {
    async fn count(&self, table: &str, filters: &Filters) -> Result<u64, StoreError> {
        let tables = self.read()?;
        let count = tables
            .get(table)
            .map(|t| t.rows.values().filter(|row| matches(row, filters)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn select(
        &self,
        table: &str,
        filters: &Filters,
        limit: Option<u64>,
        offset: Option<u64>,
    ) -> Result<Vec<Row>, StoreError> {
        let tables = self.read()?;
        let Some(t) = tables.get(table) else {
            return Ok(Vec::new());
        };
        Ok(t.rows
            .values()
            .filter(|row| matches(row, filters))
            .skip(offset.map_or(0, to_usize))
            .take(limit.map_or(usize::MAX, to_usize))
            .cloned()
            .collect())
    }

    async fn select_by_id(&self, table: &str, id: i64) -> Result<Row, StoreError> {
        let tables = self.read()?;
        tables
            .get(table)
            .and_then(|t| t.rows.get(&id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, table: &str, mut row: Row) -> Result<Row, StoreError> {
        let mut tables = self.write()?;
        let t = tables.entry(table.to_owned()).or_default();
        t.last_id += 1;
        let id = t.last_id;
        row.insert(ID_COLUMN.to_owned(), Value::from(id));
        t.rows.insert(id, row.clone());
        tracing::debug!(table, id, "memory insert");
        Ok(row)
    }

    async fn update(&self, table: &str, id: i64, row: Row) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let Some(existing) = tables.get_mut(table).and_then(|t| t.rows.get_mut(&id)) else {
            return Ok(0);
        };
        for (col, val) in row {
            if col != ID_COLUMN {
                existing.insert(col, val);
            }
        }
        Ok(1)
    }

    async fn delete(&self, table: &str, id: i64) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let removed = tables.get_mut(table).and_then(|t| t.rows.remove(&id));
        Ok(u64::from(removed.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn tables_have_independent_sequences() {
        let store = MemoryStore::new();
        let a = store.insert("a", row(json!({"x": 1}))).await.unwrap();
        let b = store.insert("b", row(json!({"x": 2}))).await.unwrap();
        assert_eq!(a["id"], 1);
        assert_eq!(b["id"], 1);
    }

    #[tokio::test]
    async fn ids_are_not_reused_after_delete() {
        let store = MemoryStore::new();
        store.insert("t", Row::new()).await.unwrap();
        assert_eq!(store.delete("t", 1).await.unwrap(), 1);
        assert_eq!(store.delete("t", 1).await.unwrap(), 0);
        let next = store.insert("t", Row::new()).await.unwrap();
        assert_eq!(next["id"], 2);
    }

    #[tokio::test]
    async fn select_by_missing_id_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.select_by_id("t", 1).await, Err(StoreError::NotFound)));
    }

    #[tokio::test]
    async fn update_keeps_identity_column() {
        let store = MemoryStore::new();
        store.insert("t", row(json!({"x": 1}))).await.unwrap();
        let affected = store.update("t", 1, row(json!({"id": 9, "x": 2}))).await.unwrap();
        assert_eq!(affected, 1);
        let stored = store.select_by_id("t", 1).await.unwrap();
        assert_eq!(stored["id"], 1);
        assert_eq!(stored["x"], 2);
        assert_eq!(store.update("t", 2, Row::new()).await.unwrap(), 0);
    }
}
