use thiserror::Error;

/// Failures raised while reading a SARIF document or building its model.
#[derive(Debug, Error)]
pub(crate) enum SarifError {
    #[error("invalid JSON at line {line}, column {column}: {message}")]
    InvalidJson {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("not a SARIF log: missing $schema")]
    MissingSchema,

    #[error("unsupported SARIF version {0}; expected 2.1.0")]
    UnsupportedVersion(String),

    #[error("SARIF structure error at {path}: {source}")]
    Deserialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("result {index} of run {run} has neither a location nor message text")]
    UnrepresentableResult { run: u32, index: usize },
}

impl From<serde_path_to_error::Error<serde_json::Error>> for SarifError {
    fn from(err: serde_path_to_error::Error<serde_json::Error>) -> Self {
        let path = err.path().to_string();
        SarifError::Deserialize {
            path,
            source: err.into_inner(),
        }
    }
}
