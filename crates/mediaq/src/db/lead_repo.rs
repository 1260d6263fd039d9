//! Lead repository. A lead owns a JSON array of attachments; the worker
//! only ever patches single entries of that array in place.

use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, OptionalExtension};
use serde_json::Value;

use super::{Database, DatabaseError};
use crate::submit::attachment::ProcessingAttachment;

/// Result of patching one attachment entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    LeadNotFound,
    AttachmentNotFound,
}

/// Inserts an empty lead. Existing leads are left untouched.
pub fn insert_lead(db: &Database, lead_id: &str) -> Result<(), DatabaseError> {
    let now = Utc::now().to_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT OR IGNORE INTO leads (id, attachments, created_at, updated_at)
             VALUES (?1, '[]', ?2, ?2)",
            params![lead_id, now],
        )?;
        Ok(())
    })
}

/// Appends an attachment to a lead. Returns false if the lead does not exist.
pub fn append_attachment(
    db: &Database,
    lead_id: &str,
    attachment: &ProcessingAttachment,
) -> Result<bool, DatabaseError> {
    let json = serde_json::to_string(attachment)?;
    let now = Utc::now().to_rfc3339();
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE leads SET attachments = json_insert(attachments, '$[#]', json(?2)),
             updated_at = ?3 WHERE id = ?1",
            params![lead_id, json, now],
        )?;
        Ok(changed > 0)
    })
}

/// Raw JSON text of a lead's attachment list.
pub fn attachments_json(db: &Database, lead_id: &str) -> Result<Option<String>, DatabaseError> {
    db.with_conn(|conn| {
        let json = conn
            .query_row(
                "SELECT attachments FROM leads WHERE id = ?1",
                params![lead_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(json)
    })
}

/// Decoded attachment list of a lead, `None` if the lead does not exist.
pub fn find_attachments(
    db: &Database,
    lead_id: &str,
) -> Result<Option<Vec<ProcessingAttachment>>, DatabaseError> {
    match attachments_json(db, lead_id)? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Overwrites `fields` of the attachment with id `attachment_id`.
///
/// Runs as one immediate transaction and rewrites only the matching array
/// element via `json_set`, so other attachments and lead columns stay as
/// they are even with concurrent writers.
pub fn update_attachment(
    db: &Database,
    lead_id: &str,
    attachment_id: &str,
    fields: &[(&str, Value)],
) -> Result<UpdateOutcome, DatabaseError> {
    let now = Utc::now().to_rfc3339();
    db.immediate(|tx| {
        let exists: Option<i64> = tx
            .query_row("SELECT 1 FROM leads WHERE id = ?1", params![lead_id], |r| {
                r.get(0)
            })
            .optional()?;
        if exists.is_none() {
            return Ok(UpdateOutcome::LeadNotFound);
        }

        let index: Option<i64> = tx
            .query_row(
                "SELECT CAST(je.key AS INTEGER) FROM leads, json_each(leads.attachments) AS je
                 WHERE leads.id = ?1 AND json_extract(je.value, '$.id') = ?2
                 LIMIT 1",
                params![lead_id, attachment_id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(index) = index else {
            return Ok(UpdateOutcome::AttachmentNotFound);
        };

        if fields.is_empty() {
            return Ok(UpdateOutcome::Updated);
        }

        let mut set_args = Vec::with_capacity(fields.len());
        let mut values: Vec<SqlValue> = Vec::with_capacity(fields.len() + 2);
        for (key, value) in fields {
            if !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(DatabaseError::InvalidField(key.to_string()));
            }
            let (placeholder, sql_value) = bind_json(value)?;
            set_args.push(format!("'$[{}].{}', {}", index, key, placeholder));
            values.push(sql_value);
        }
        values.push(SqlValue::Text(now));
        values.push(SqlValue::Text(lead_id.to_string()));

        let sql = format!(
            "UPDATE leads SET attachments = json_set(attachments, {}), updated_at = ? WHERE id = ?",
            set_args.join(", ")
        );
        tx.execute(&sql, rusqlite::params_from_iter(values))?;

        Ok(UpdateOutcome::Updated)
    })
}

/// Maps a JSON value to a bind parameter. Scalars bind directly; everything
/// else is passed as JSON text through `json()` so it is stored as a value,
/// not a string.
fn bind_json(value: &Value) -> Result<(&'static str, SqlValue), DatabaseError> {
    Ok(match value {
        Value::Null => ("?", SqlValue::Null),
        Value::String(s) => ("?", SqlValue::Text(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ("?", SqlValue::Integer(i)),
            None => ("?", SqlValue::Real(n.as_f64().unwrap_or_default())),
        },
        other => ("json(?)", SqlValue::Text(serde_json::to_string(other)?)),
    })
}
