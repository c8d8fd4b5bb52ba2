//! Bitemporal JSON records shared by aspects and metadata.
//!
//! A record is never updated in place: replacing it closes its validity
//! window (`valid_to`, `retracter`) and inserts a successor in the same
//! transaction.

use crate::{
    db::timestamp,
    errors::{ServiceError, ServiceResult},
    models::common::{Paging, validate_uri, validate_uuid},
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

const RECORD_COLUMNS: &str =
    "id, entity, schema, content, content_type, policy, valid_from, valid_to, asserter, retracter";

#[derive(Debug, Clone, FromRow)]
pub struct RecordRow {
    pub id: String,
    pub entity: String,
    pub schema: String,
    pub content: String,
    pub content_type: String,
    pub policy: Option<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub asserter: String,
    pub retracter: Option<String>,
}

impl RecordRow {
    pub fn content_json(&self) -> ServiceResult<Value> {
        Ok(serde_json::from_str(&self.content)?)
    }
}

/// Values for a new record.
#[derive(Debug, Clone)]
pub struct NewRecord<'a> {
    pub entity: &'a str,
    pub schema: &'a str,
    pub content: &'a Value,
    pub content_type: &'a str,
    pub policy: Option<&'a str>,
}

/// Filters of a list query; `order_by` must already be a known column.
#[derive(Debug, Clone)]
pub struct RecordQuery<'a> {
    pub entity: Option<&'a str>,
    pub schema: Option<&'a str>,
    pub json_path: Option<&'a str>,
    pub at_time: DateTime<Utc>,
    pub order_by: &'static str,
    pub desc: bool,
    pub paging: Paging,
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    db: SqlitePool,
    table: &'static str,
    kind: &'static str,
    path_flag: &'static str,
}

impl RecordStore {
    /// `kind` names records in error messages ("aspect", "record") and
    /// `path_flag` is the query parameter carrying [`RecordQuery::json_path`].
    pub fn new(
        db: SqlitePool,
        table: &'static str,
        kind: &'static str,
        path_flag: &'static str,
    ) -> Self {
        Self {
            db,
            table,
            kind,
            path_flag,
        }
    }

    fn not_found(&self, id: &str) -> ServiceError {
        ServiceError::not_found(id, format!("{} `{}` not found", self.kind, id))
    }

    fn check_id(&self, id: &str) -> ServiceResult<()> {
        validate_uuid("id", id)
            .map(|_| ())
            .map_err(|_| {
                ServiceError::bad_request(format!("`{}` is not a valid {} id", id, self.kind))
            })
    }

    pub async fn get(&self, id: &str) -> ServiceResult<RecordRow> {
        self.check_id(id)?;
        sqlx::query_as::<_, RecordRow>(&format!(
            "SELECT {} FROM {} WHERE id = ?",
            RECORD_COLUMNS, self.table
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| self.not_found(id))
    }

    pub async fn insert(&self, rec: NewRecord<'_>, asserter: &str) -> ServiceResult<String> {
        validate_new(&rec)?;
        let mut tx = self.db.begin().await?;
        let id = self.insert_tx(&mut tx, &rec, asserter, Utc::now()).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Close every active record for (entity, schema) and insert `rec`.
    ///
    /// With `max_active`, more active records than that is a `bad-request`.
    pub async fn replace_active(
        &self,
        rec: NewRecord<'_>,
        who: &str,
        max_active: Option<usize>,
    ) -> ServiceResult<String> {
        validate_new(&rec)?;
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let active: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT id FROM {} WHERE entity = ? AND schema = ? AND valid_to IS NULL",
            self.table
        ))
        .bind(rec.entity)
        .bind(rec.schema)
        .fetch_all(&mut *tx)
        .await?;

        if let Some(max) = max_active {
            if active.len() > max {
                return Err(ServiceError::bad_request(format!(
                    "{} active {}s for entity `{}` and schema `{}`; update them individually",
                    active.len(),
                    self.kind,
                    rec.entity,
                    rec.schema
                )));
            }
        }

        for id in &active {
            self.close_tx(&mut tx, id, who, now).await?;
        }
        let id = self.insert_tx(&mut tx, &rec, who, now).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Close record `id` and insert `rec` as its successor.
    pub async fn replace_record(
        &self,
        id: &str,
        rec: NewRecord<'_>,
        who: &str,
    ) -> ServiceResult<String> {
        self.check_id(id)?;
        validate_new(&rec)?;
        let now = Utc::now();
        let mut tx = self.db.begin().await?;
        if !self.close_tx(&mut tx, id, who, now).await? {
            return Err(self.not_found(id));
        }
        let new_id = self.insert_tx(&mut tx, &rec, who, now).await?;
        tx.commit().await?;
        Ok(new_id)
    }

    /// Close the validity window of an active record.
    pub async fn retract(&self, id: &str, who: &str) -> ServiceResult<()> {
        self.check_id(id)?;
        let mut tx = self.db.begin().await?;
        if !self.close_tx(&mut tx, id, who, Utc::now()).await? {
            return Err(self.not_found(id));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Rows valid at `q.at_time`; fetches one row beyond the page to detect more.
    pub async fn list(&self, q: &RecordQuery<'_>) -> ServiceResult<(Vec<RecordRow>, bool)> {
        let at = timestamp(&q.at_time);
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {} FROM {} WHERE valid_from <= ",
            RECORD_COLUMNS, self.table
        ));
        builder.push_bind(at.clone());
        builder.push(" AND (valid_to IS NULL OR valid_to > ");
        builder.push_bind(at);
        builder.push(")");

        if let Some(entity) = q.entity {
            builder.push(" AND entity = ");
            builder.push_bind(entity.to_string());
        }
        if let Some(schema) = q.schema {
            if let Some(prefix) = schema.strip_suffix('%') {
                builder.push(" AND schema LIKE ");
                builder.push_bind(format!("{}%", escape_like(prefix)));
                builder.push(" ESCAPE '\\'");
            } else {
                builder.push(" AND schema = ");
                builder.push_bind(schema.to_string());
            }
        }
        if let Some(path) = q.json_path {
            parse_json_path(self.path_flag, path)?;
            // json_type is NULL only for a missing path, unlike a JSON null value
            builder.push(" AND json_type(content, ");
            builder.push_bind(path.to_string());
            builder.push(") IS NOT NULL");
        }

        builder.push(format!(
            " ORDER BY {} {}, id ASC LIMIT ",
            q.order_by,
            if q.desc { "DESC" } else { "ASC" }
        ));
        builder.push_bind(q.paging.limit + 1);
        builder.push(" OFFSET ");
        builder.push_bind(q.paging.offset);

        let mut rows: Vec<RecordRow> = builder.build_query_as().fetch_all(&self.db).await?;
        let has_more = rows.len() as i64 > q.paging.limit;
        rows.truncate(q.paging.limit as usize);
        Ok((rows, has_more))
    }

    async fn insert_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        rec: &NewRecord<'_>,
        asserter: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(&format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?, NULL)",
            self.table, RECORD_COLUMNS
        ))
        .bind(&id)
        .bind(rec.entity)
        .bind(rec.schema)
        .bind(serde_json::to_string(rec.content)?)
        .bind(rec.content_type)
        .bind(rec.policy)
        .bind(timestamp(&now))
        .bind(asserter)
        .execute(&mut **tx)
        .await?;
        tracing::debug!(table = self.table, id = %id, entity = rec.entity, "record asserted");
        Ok(id)
    }

    async fn close_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        id: &str,
        who: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<bool> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET valid_to = ?, retracter = ? WHERE id = ? AND valid_to IS NULL",
            self.table
        ))
        .bind(timestamp(&now))
        .bind(who)
        .bind(id)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

fn validate_new(rec: &NewRecord<'_>) -> ServiceResult<()> {
    validate_uri("entity", rec.entity)?;
    validate_uri("schema", rec.schema)?;
    if !rec.content.is_object() {
        return Err(ServiceError::bad_request("content must be a JSON object"));
    }
    Ok(())
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parse `$.a.b[0].c` into segments. Only member and index access is supported.
pub fn parse_json_path(name: &str, path: &str) -> ServiceResult<Vec<PathSegment>> {
    let invalid = || {
        ServiceError::invalid_parameter(name, Some(path), "must look like `$.field[0].sub`")
    };
    let mut rest = path.strip_prefix('$').ok_or_else(invalid)?;
    let mut segments = Vec::new();
    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix('.') {
            let end = after.find(['.', '[']).unwrap_or(after.len());
            let key = &after[..end];
            if key.is_empty()
                || !key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                return Err(invalid());
            }
            segments.push(PathSegment::Key(key.to_string()));
            rest = &after[end..];
        } else if let Some(after) = rest.strip_prefix('[') {
            let end = after.find(']').ok_or_else(invalid)?;
            let index = after[..end].parse::<usize>().map_err(|_| invalid())?;
            segments.push(PathSegment::Index(index));
            rest = &after[end + 1..];
        } else {
            return Err(invalid());
        }
    }
    Ok(segments)
}

/// Resolve parsed segments against a JSON value.
pub fn lookup<'v>(value: &'v Value, segments: &[PathSegment]) -> Option<&'v Value> {
    segments.iter().try_fold(value, |current, seg| match seg {
        PathSegment::Key(k) => current.get(k.as_str()),
        PathSegment::Index(i) => current.get(*i),
    })
}
