//! Builds parameterized COUNT, SELECT, INSERT, UPDATE, DELETE for one table.
//! Identifiers are quoted; values are always bound parameters.

use serde_json::Value;

use crate::datastore::{Filters, Row, CREATED_AT_COLUMN, ID_COLUMN, UPDATED_AT_COLUMN};

/// Quote identifier for PostgreSQL.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Parameters travel as text or JSON scalars; the stamp columns are cast to
/// `timestamptz` on the server.
fn placeholder(column: &str, n: usize) -> String {
    if column == CREATED_AT_COLUMN || column == UPDATED_AT_COLUMN {
        format!("${}::timestamptz", n)
    } else {
        format!("${}", n)
    }
}

/// `schema.table` or `table`, each part quoted.
fn qualified_table(table: &str) -> String {
    table.split('.').map(quoted).collect::<Vec<_>>().join(".")
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }

    fn where_clause(&mut self, filters: &Filters) -> String {
        let parts: Vec<String> = filters
            .iter()
            .map(|(col, val)| {
                let n = self.push_param(val.clone());
                format!("{} = {}", quoted(col), placeholder(col, n))
            })
            .collect();
        if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        }
    }
}

pub fn select_count(table: &str, filters: &Filters) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = q.where_clause(filters);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", qualified_table(table), where_clause);
    q
}

/// SELECT with optional filters (exact match per column), ORDER BY id, optional LIMIT/OFFSET.
pub fn select_list(table: &str, filters: &Filters, limit: Option<u64>, offset: Option<u64>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = q.where_clause(filters);
    let limit_clause = limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT * FROM {}{} ORDER BY {}{}{}",
        qualified_table(table),
        where_clause,
        quoted(ID_COLUMN),
        limit_clause,
        offset_clause
    );
    q
}

pub fn select_by_id(table: &str, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(Value::from(id));
    q.sql = format!(
        "SELECT * FROM {} WHERE {} = ${}",
        qualified_table(table),
        quoted(ID_COLUMN),
        n
    );
    q
}

/// INSERT the row's non-null columns; the id is left to the table default.
pub fn insert(table: &str, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for (name, val) in row {
        if name == ID_COLUMN || val.is_null() {
            continue;
        }
        let n = q.push_param(val.clone());
        cols.push(quoted(name));
        placeholders.push(placeholder(name, n));
    }
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING *", qualified_table(table))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING *",
            qualified_table(table),
            cols.join(", "),
            placeholders.join(", ")
        )
    };
    q
}

/// UPDATE by id: SET the row's columns except the id. An empty row still
/// matches the target so the affected-row count reports existence.
pub fn update(table: &str, id: i64, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for (name, val) in row {
        if name == ID_COLUMN {
            continue;
        }
        let n = q.push_param(val.clone());
        sets.push(format!("{} = {}", quoted(name), placeholder(name, n)));
    }
    if sets.is_empty() {
        sets.push(format!("{0} = {0}", quoted(ID_COLUMN)));
    }
    let n = q.push_param(Value::from(id));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ${}",
        qualified_table(table),
        sets.join(", "),
        quoted(ID_COLUMN),
        n
    );
    q
}

pub fn delete(table: &str, id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    let n = q.push_param(Value::from(id));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = ${}",
        qualified_table(table),
        quoted(ID_COLUMN),
        n
    );
    q
}
