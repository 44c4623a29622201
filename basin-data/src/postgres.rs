//! The relational storage adapter: documents stored as a JSONB column per
//! collection table (`id text primary key, data jsonb`), with the query
//! AST translated into a parameterized `WHERE`/`ORDER BY`/`LIMIT`/`OFFSET`
//! clause over `data->>'field'` extraction and per-operand type casting.

use serde_json::Value;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use basin_query::{Comparison, Document, Filter, Query, SortDirection};

use crate::adapter::{apply_projection, StorageAdapter};
use crate::error::DataError;
use crate::identifier::{is_valid_identifier, validate};

pub struct PostgresAdapter {
    pool: PgPool,
}

impl PostgresAdapter {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table for a collection if it doesn't already
    /// exist. Called by the admin API when a collection is created.
    pub async fn ensure_table(&self, collection: &str) -> Result<(), DataError> {
        let table = validate(collection).map_err(|e| DataError::Validation(e.to_string()))?;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (id text PRIMARY KEY, data jsonb NOT NULL)"
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }
}

/// Infer the JSONB extraction cast for a comparison operand, matching
/// Postgres's own type rules for `->>` (always text) so comparisons against
/// numbers and booleans behave as the client expects.
fn infer_cast(value: &Value) -> &'static str {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => "::bigint",
        Value::Number(_) => "::double precision",
        Value::Bool(_) => "::boolean",
        _ => "",
    }
}

/// Build the `data->>'field'` extraction, rejecting any field name that
/// isn't a bare identifier — field names come straight from client-
/// supplied filters (spec.md §4.4 allows undeclared field names), so this
/// is the only thing standing between a query string and a SQL injection
/// into the WHERE/ORDER BY clause.
fn field_expr(field: &str, cast: &'static str) -> Result<String, DataError> {
    if !is_valid_identifier(field) {
        return Err(DataError::Validation(format!("invalid field name `{field}`")));
    }
    Ok(format!("data->>'{field}'{cast}"))
}

fn push_comparison(
    qb: &mut QueryBuilder<'_, Postgres>,
    field: &str,
    comparison: &Comparison,
) -> Result<(), DataError> {
    match comparison {
        Comparison::Eq(v) => {
            qb.push(field_expr(field, infer_cast(v))?).push(" = ").push_bind(json_scalar(v));
        }
        Comparison::Ne(v) => {
            qb.push(field_expr(field, infer_cast(v))?).push(" <> ").push_bind(json_scalar(v));
        }
        Comparison::Gt(v) => {
            qb.push(field_expr(field, infer_cast(v))?).push(" > ").push_bind(json_scalar(v));
        }
        Comparison::Gte(v) => {
            qb.push(field_expr(field, infer_cast(v))?).push(" >= ").push_bind(json_scalar(v));
        }
        Comparison::Lt(v) => {
            qb.push(field_expr(field, infer_cast(v))?).push(" < ").push_bind(json_scalar(v));
        }
        Comparison::Lte(v) => {
            qb.push(field_expr(field, infer_cast(v))?).push(" <= ").push_bind(json_scalar(v));
        }
        Comparison::In(values) => {
            qb.push(field_expr(field, "")?).push(" IN (");
            let mut sep = qb.separated(", ");
            for v in values {
                sep.push_bind(json_scalar(v));
            }
            qb.push(")");
        }
        Comparison::Nin(values) => {
            qb.push(field_expr(field, "")?).push(" NOT IN (");
            let mut sep = qb.separated(", ");
            for v in values {
                sep.push_bind(json_scalar(v));
            }
            qb.push(")");
        }
        Comparison::Regex { pattern, options } => {
            let op = if options.as_deref() == Some("i") { " ~* " } else { " ~ " };
            qb.push(field_expr(field, "")?).push(op).push_bind(pattern.clone());
        }
    }
    Ok(())
}

/// Comparisons always compare against the text extraction's logical value;
/// booleans and numbers are stringified so the bound parameter's Rust type
/// matches the cast expression on the left-hand side.
fn json_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) -> Result<(), DataError> {
    match filter {
        Filter::MatchAll => {
            qb.push("TRUE");
        }
        Filter::Field { field, comparison } => push_comparison(qb, field, comparison)?,
        Filter::And(clauses) => push_combinator(qb, clauses, " AND ")?,
        Filter::Or(clauses) => push_combinator(qb, clauses, " OR ")?,
        Filter::Nor(clauses) => {
            qb.push("NOT (");
            push_combinator(qb, clauses, " OR ")?;
            qb.push(")");
        }
    }
    Ok(())
}

fn push_combinator(
    qb: &mut QueryBuilder<'_, Postgres>,
    clauses: &[Filter],
    joiner: &str,
) -> Result<(), DataError> {
    if clauses.is_empty() {
        qb.push("TRUE");
        return Ok(());
    }
    qb.push("(");
    for (i, clause) in clauses.iter().enumerate() {
        if i > 0 {
            qb.push(joiner);
        }
        push_filter(qb, clause)?;
    }
    qb.push(")");
    Ok(())
}

fn row_to_document(row: &sqlx::postgres::PgRow) -> Result<Document, DataError> {
    let value: Value = row.try_get("data").map_err(|e| DataError::Backend(e.to_string()))?;
    value.as_object().cloned().ok_or_else(|| DataError::Backend("row data was not a JSON object".to_string()))
}

#[async_trait::async_trait]
impl StorageAdapter for PostgresAdapter {
    async fn insert(&self, collection: &str, mut doc: Document) -> Result<Document, DataError> {
        let table = validate(collection).map_err(|e| DataError::Validation(e.to_string()))?;
        let id = match doc.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                doc.insert("id".to_string(), Value::String(id.clone()));
                id
            }
        };
        let sql = format!("INSERT INTO \"{table}\" (id, data) VALUES ($1, $2)");
        sqlx::query(&sql)
            .bind(&id)
            .bind(Value::Object(doc.clone()))
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    DataError::Conflict(format!("id `{id}` already exists"))
                }
                other => DataError::Backend(other.to_string()),
            })?;
        Ok(doc)
    }

    async fn update(&self, collection: &str, id: &str, patch: Document) -> Result<Document, DataError> {
        let table = validate(collection).map_err(|e| DataError::Validation(e.to_string()))?;
        let existing = self.find_one(collection, id).await?;
        let Some(mut current) = existing else {
            return Err(DataError::NotFound(format!("no document `{id}` in `{collection}`")));
        };
        for (key, value) in patch {
            current.insert(key, value);
        }
        let sql = format!("UPDATE \"{table}\" SET data = $2 WHERE id = $1");
        sqlx::query(&sql)
            .bind(id)
            .bind(Value::Object(current.clone()))
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::Backend(e.to_string()))?;
        Ok(current)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, DataError> {
        let table = validate(collection).map_err(|e| DataError::Validation(e.to_string()))?;
        let sql = format!("DELETE FROM \"{table}\" WHERE id = $1");
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DataError::Backend(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_one(&self, collection: &str, id: &str) -> Result<Option<Document>, DataError> {
        let table = validate(collection).map_err(|e| DataError::Validation(e.to_string()))?;
        let sql = format!("SELECT data FROM \"{table}\" WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DataError::Backend(e.to_string()))?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, DataError> {
        let table = validate(collection).map_err(|e| DataError::Validation(e.to_string()))?;
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT data FROM \"{table}\" WHERE "));
        push_filter(&mut qb, &query.filter)?;

        if !query.sort.is_empty() {
            qb.push(" ORDER BY ");
            for (i, (field, direction)) in query.sort.iter().enumerate() {
                if !is_valid_identifier(field) {
                    return Err(DataError::Validation(format!("invalid field name `{field}`")));
                }
                if i > 0 {
                    qb.push(", ");
                }
                let dir = match direction {
                    SortDirection::Ascending => "ASC",
                    SortDirection::Descending => "DESC",
                };
                qb.push(format!("data->>'{field}' {dir}"));
            }
        }
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(skip) = query.skip {
            qb.push(" OFFSET ").push_bind(skip as i64);
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DataError::Backend(e.to_string()))?;
        let mut docs = rows.iter().map(row_to_document).collect::<Result<Vec<_>, _>>()?;
        for doc in &mut docs {
            apply_projection(doc, &query.fields);
        }
        Ok(docs)
    }

    async fn count(&self, collection: &str, query: &Query) -> Result<u64, DataError> {
        let table = validate(collection).map_err(|e| DataError::Validation(e.to_string()))?;
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT COUNT(*) AS n FROM \"{table}\" WHERE "));
        push_filter(&mut qb, &query.filter)?;
        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DataError::Backend(e.to_string()))?;
        let n: i64 = row.try_get("n").map_err(|e| DataError::Backend(e.to_string()))?;
        Ok(n as u64)
    }

    async fn rename_collection(&self, from: &str, to: &str) -> Result<(), DataError> {
        let from = validate(from).map_err(|e| DataError::Validation(e.to_string()))?;
        let to = validate(to).map_err(|e| DataError::Validation(e.to_string()))?;
        let sql = format!("ALTER TABLE \"{from}\" RENAME TO \"{to}\"");
        sqlx::query(&sql).execute(&self.pool).await.map_err(|e| DataError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<(), DataError> {
        let table = validate(collection).map_err(|e| DataError::Validation(e.to_string()))?;
        let sql = format!("DROP TABLE IF EXISTS \"{table}\"");
        sqlx::query(&sql).execute(&self.pool).await.map_err(|e| DataError::Backend(e.to_string()))?;
        Ok(())
    }
}
