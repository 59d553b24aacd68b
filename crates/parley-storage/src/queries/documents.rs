// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Document CRUD and filtered lookups.

use parley_core::types::{DocumentFilter, FieldCondition};
use parley_core::ParleyError;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde_json::Value;

use crate::database::{map_tr_err, Database};

/// Field names usable in filters and bounded pushes.
fn check_field(field: &str) -> Result<(), ParleyError> {
    if !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        Err(ParleyError::storage(format!("invalid document field name `{field}`")))
    }
}

fn json_err(e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(e))
}

fn parse_body(body: String) -> Result<Value, rusqlite::Error> {
    serde_json::from_str(&body).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Compiles a filter into a WHERE fragment (after `collection = ?1`) and its parameters.
fn compile_filter(filter: &DocumentFilter) -> Result<(String, Vec<SqlValue>), ParleyError> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    for condition in &filter.conditions {
        match condition {
            FieldCondition::Eq(field, expected) => {
                check_field(field)?;
                let path = format!("$.{field}");
                match expected {
                    Value::Null => {
                        values.push(SqlValue::Text(path));
                        clauses.push(format!("json_extract(body, ?{}) IS NULL", values.len() + 1));
                    }
                    Value::String(s) => {
                        values.push(SqlValue::Text(path));
                        values.push(SqlValue::Text(s.clone()));
                        clauses.push(format!(
                            "json_extract(body, ?{}) = ?{}",
                            values.len(),
                            values.len() + 1
                        ));
                    }
                    Value::Bool(b) => {
                        values.push(SqlValue::Text(path));
                        values.push(SqlValue::Integer(i64::from(*b)));
                        clauses.push(format!(
                            "json_extract(body, ?{}) = ?{}",
                            values.len(),
                            values.len() + 1
                        ));
                    }
                    Value::Number(n) => {
                        values.push(SqlValue::Text(path));
                        values.push(match n.as_i64() {
                            Some(i) => SqlValue::Integer(i),
                            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
                        });
                        clauses.push(format!(
                            "json_extract(body, ?{}) = ?{}",
                            values.len(),
                            values.len() + 1
                        ));
                    }
                    Value::Array(_) | Value::Object(_) => {
                        return Err(ParleyError::storage(format!(
                            "cannot filter on structured value for `{field}`"
                        )));
                    }
                }
            }
            FieldCondition::Contains(field, needle) => {
                check_field(field)?;
                values.push(SqlValue::Text(format!("$.{field}")));
                values.push(SqlValue::Text(needle.clone()));
                clauses.push(format!(
                    "EXISTS (SELECT 1 FROM json_each(body, ?{}) WHERE json_each.value = ?{})",
                    values.len(),
                    values.len() + 1
                ));
            }
        }
    }

    let sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" AND {}", clauses.join(" AND "))
    };
    Ok((sql, values))
}

/// Inserts a new document.
pub async fn insert(db: &Database, collection: &str, id: &str, doc: &Value) -> Result<(), ParleyError> {
    let body = serde_json::to_string(doc)?;
    let (collection, id) = (collection.to_string(), id.to_string());
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
                params![collection, id, body],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetches one document by id.
pub async fn find_by_id(db: &Database, collection: &str, id: &str) -> Result<Option<Value>, ParleyError> {
    let (collection, id) = (collection.to_string(), id.to_string());
    db.connection()
        .call(move |conn| -> Result<Option<Value>, rusqlite::Error> {
            let body: Option<String> = conn
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()?;
            body.map(parse_body).transpose()
        })
        .await
        .map_err(map_tr_err)
}

/// Returns documents matching `filter` in insertion order, up to `limit`.
pub async fn find(
    db: &Database,
    collection: &str,
    filter: &DocumentFilter,
    limit: Option<usize>,
) -> Result<Vec<Value>, ParleyError> {
    let (where_sql, mut values) = compile_filter(filter)?;
    let limit_sql = match limit {
        Some(n) => format!(" LIMIT {n}"),
        None => String::new(),
    };
    let sql = format!(
        "SELECT body FROM documents WHERE collection = ?1{where_sql} ORDER BY rowid{limit_sql}"
    );
    values.insert(0, SqlValue::Text(collection.to_string()));

    db.connection()
        .call(move |conn| -> Result<Vec<Value>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
                row.get::<_, String>(0)
            })?;
            let mut docs = Vec::new();
            for body in rows {
                docs.push(parse_body(body?)?);
            }
            Ok(docs)
        })
        .await
        .map_err(map_tr_err)
}

/// Replaces a document body. Returns false if it does not exist.
pub async fn update(db: &Database, collection: &str, id: &str, doc: &Value) -> Result<bool, ParleyError> {
    let body = serde_json::to_string(doc)?;
    let (collection, id) = (collection.to_string(), id.to_string());
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE documents
                 SET body = ?3, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE collection = ?1 AND id = ?2",
                params![collection, id, body],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Appends to an array field inside one transaction, keeping the newest `cap` items.
pub async fn push_bounded(
    db: &Database,
    collection: &str,
    id: &str,
    field: &str,
    item: &Value,
    cap: usize,
) -> Result<bool, ParleyError> {
    check_field(field)?;
    let (collection, id, field, item) = (
        collection.to_string(),
        id.to_string(),
        field.to_string(),
        item.clone(),
    );
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let body: Option<String> = tx
                .query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(body) = body else {
                return Ok(false);
            };

            let mut doc = parse_body(body)?;
            append_capped(&mut doc, &field, item, cap);
            let body = serde_json::to_string(&doc).map_err(json_err)?;
            tx.execute(
                "UPDATE documents
                 SET body = ?3, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE collection = ?1 AND id = ?2",
                params![collection, id, body],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes a document. Returns false if it did not exist.
pub async fn delete(db: &Database, collection: &str, id: &str) -> Result<bool, ParleyError> {
    let (collection, id) = (collection.to_string(), id.to_string());
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Pushes `item` onto the array at `doc[field]` (created if missing or not
/// an array) and drops the oldest entries beyond `cap`.
pub(crate) fn append_capped(doc: &mut Value, field: &str, item: Value, cap: usize) {
    let Some(obj) = doc.as_object_mut() else {
        return;
    };
    let entry = obj
        .entry(field.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !entry.is_array() {
        *entry = Value::Array(Vec::new());
    }
    if let Value::Array(items) = entry {
        items.push(item);
        if items.len() > cap {
            let excess = items.len() - cap;
            items.drain(..excess);
        }
    }
}
