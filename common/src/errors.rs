// Error handling framework

use thiserror::Error;

/// Validation errors raised while building records from field mappings
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Invalid field value for {field}: {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate key violation: {0}")]
    DuplicateKey(String),

    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("Not-null violation: {0}")]
    NotNullViolation(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Validation failed: {0}")]
    Validation(ValidationError),
}

impl DatabaseError {
    /// Whether the error comes from a violated schema constraint
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DatabaseError::DuplicateKey(_)
                | DatabaseError::ForeignKeyViolation(_)
                | DatabaseError::NotNullViolation(_)
        )
    }
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                // Check for specific database error codes
                if let Some(code) = db_err.code() {
                    match code.as_ref() {
                        "23505" => DatabaseError::DuplicateKey(db_err.message().to_string()),
                        "23503" => DatabaseError::ForeignKeyViolation(db_err.message().to_string()),
                        "23502" => DatabaseError::NotNullViolation(db_err.message().to_string()),
                        _ => DatabaseError::QueryFailed(db_err.message().to_string()),
                    }
                } else {
                    DatabaseError::QueryFailed(db_err.message().to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DatabaseError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DatabaseError::MigrationFailed(err.to_string())
    }
}

impl From<ValidationError> for DatabaseError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::MissingField(field) => {
                DatabaseError::NotNullViolation(format!("missing value for column {}", field))
            }
            other => DatabaseError::Validation(other),
        }
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        ValidationError::InvalidJson(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DatabaseError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    #[test]
    fn test_missing_field_maps_to_not_null_violation() {
        let err: DatabaseError = ValidationError::MissingField("widget_id".to_string()).into();
        assert!(matches!(err, DatabaseError::NotNullViolation(_)));
        assert!(err.is_constraint_violation());
        assert!(err.to_string().contains("widget_id"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::InvalidFieldValue {
            field: "sort_index".to_string(),
            reason: "must be positive".to_string(),
        };
        assert!(err.to_string().contains("sort_index"));
    }

    #[test]
    fn test_invalid_field_value_maps_to_validation() {
        let err: DatabaseError = ValidationError::InvalidFieldValue {
            field: "parent_document_id".to_string(),
            reason: "a document cannot be its own parent".to_string(),
        }
        .into();
        assert!(matches!(
            err,
            DatabaseError::Validation(ValidationError::InvalidFieldValue { .. })
        ));
        assert!(!err.is_constraint_violation());
    }

    #[test]
    fn test_not_found_is_not_constraint_violation() {
        assert!(!DatabaseError::NotFound("x".into()).is_constraint_violation());
    }
}
