//! Error taxonomy for instrumented queries.

use sea_orm::DbErr;

/// Outcome error of a query passing through the middleware chain.
///
/// Layers never translate or wrap these values: whatever the base operation
/// returns is what the caller of the chain receives.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The driver does not implement this path. Callers are expected to fall
    /// back to the generic (un-instrumented) code path.
    #[error("driver: skip fast-path; continue as if unimplemented")]
    Skip,

    /// Operational failure reported by the underlying driver.
    #[error(transparent)]
    Db(#[from] DbErr),

    /// The call was abandoned (panic or dropped future) before the delegate
    /// returned. Only ever observed by telemetry finalizers.
    #[error("query interrupted before completion")]
    Interrupted,
}

impl QueryError {
    /// Returns `true` for the fall-back sentinel.
    pub fn is_skip(&self) -> bool {
        matches!(self, QueryError::Skip)
    }

    /// Status label used by metrics and spans.
    pub fn status(&self) -> &'static str {
        match self {
            QueryError::Skip => "SKIP",
            QueryError::Db(_) | QueryError::Interrupted => "ERROR",
        }
    }
}

impl From<QueryError> for DbErr {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::Db(err) => err,
            other => DbErr::Custom(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_is_distinguishable() {
        assert!(QueryError::Skip.is_skip());
        assert!(!QueryError::Interrupted.is_skip());
        assert_eq!(QueryError::Skip.status(), "SKIP");
        assert_eq!(QueryError::Interrupted.status(), "ERROR");
    }

    #[test]
    fn test_db_error_round_trips_unchanged() {
        let err = QueryError::from(DbErr::Custom("boom".to_string()));
        assert_eq!(err.status(), "ERROR");
        match DbErr::from(err) {
            DbErr::Custom(msg) => assert_eq!(msg, "boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
