use basin_core::AppError;

/// Storage-adapter error classes (spec §4.5). Only `Backend` surfaces to
/// clients as 500 — the others carry precise meaning the Collection
/// Resource acts on.
#[derive(Debug)]
pub enum DataError {
    NotFound(String),
    Conflict(String),
    Validation(String),
    Backend(String),
}

impl std::fmt::Display for DataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataError::NotFound(msg) => write!(f, "not found: {msg}"),
            DataError::Conflict(msg) => write!(f, "conflict: {msg}"),
            DataError::Validation(msg) => write!(f, "validation: {msg}"),
            DataError::Backend(msg) => write!(f, "backend error: {msg}"),
        }
    }
}

impl std::error::Error for DataError {}

impl From<DataError> for AppError {
    fn from(err: DataError) -> Self {
        match err {
            DataError::NotFound(msg) => AppError::NotFound(msg),
            DataError::Conflict(msg) => AppError::Backend(msg),
            DataError::Validation(msg) => {
                let mut errors = std::collections::BTreeMap::new();
                errors.insert("_".to_string(), msg);
                AppError::Validation(errors)
            }
            DataError::Backend(msg) => AppError::Backend(msg),
        }
    }
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DataError::NotFound("row not found".to_string()),
            other => DataError::Backend(other.to_string()),
        }
    }
}
