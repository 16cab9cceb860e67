use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Integrity error: blob {blob_id} expected hash {expected}, fetched content hashes to {actual}")]
    Integrity {
        blob_id: String,
        expected: String,
        actual: String,
    },

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// True for the expected "no such record" outcome, as opposed to a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// True for failures surfaced by the transport collaborator.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Shape("mean has 2 elements, expected 3".to_string());
        assert_eq!(err.to_string(), "Shape error: mean has 2 elements, expected 3");

        let err = Error::Integrity {
            blob_id: "b".to_string(),
            expected: "aa".to_string(),
            actual: "bb".to_string(),
        };
        assert!(err.to_string().contains("expected hash aa"));
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::NotFound("x".into()).is_not_found());
        assert!(!Error::NotFound("x".into()).is_transport());
        assert!(Error::Connection("refused".into()).is_transport());
        assert!(Error::Auth("expired".into()).is_transport());
    }
}
