use crate::querier::QueryError;
use crate::store::StoreError;

#[derive(Debug)]
pub enum RuleError {
    Validation(String),
    Parse(serde_json::Error),
    Query(QueryError),
    DuplicateLabels(String),
    Store(StoreError),
    TaskExists(String),
    TaskNotFound(String),
    RuleNotFound(String),
}

impl std::fmt::Display for RuleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "validation: {msg}"),
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::Query(e) => write!(f, "{e}"),
            Self::DuplicateLabels(labels) => {
                write!(f, "vector contains metrics with the same labelset after applying alert labels: {labels}")
            }
            Self::Store(e) => write!(f, "{e}"),
            Self::TaskExists(name) => write!(f, "task {name} already exists"),
            Self::TaskNotFound(name) => write!(f, "task {name} not found"),
            Self::RuleNotFound(id) => write!(f, "rule {id} not found"),
        }
    }
}

impl std::error::Error for RuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Query(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RuleError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e)
    }
}

impl From<QueryError> for RuleError {
    fn from(e: QueryError) -> Self {
        Self::Query(e)
    }
}

impl From<StoreError> for RuleError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_variants() {
        assert_eq!(
            RuleError::Validation("condition is required".into()).to_string(),
            "validation: condition is required"
        );
        assert_eq!(RuleError::TaskNotFound("r1-groupname".into()).to_string(), "task r1-groupname not found");
        assert!(RuleError::DuplicateLabels("{a=\"1\"}".into())
            .to_string()
            .contains("same labelset"));
    }

    #[test]
    fn query_error_converts() {
        let err: RuleError = QueryError("timeout".into()).into();
        assert!(matches!(err, RuleError::Query(_)));
        assert_eq!(err.to_string(), "query: timeout");
    }
}
