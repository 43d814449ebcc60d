use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("No relation found for area \"{name}\"; pass --relation-id to supply one manually")]
    AreaNotFound { name: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} responded with status {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Malformed {context} response: {source}")]
    MalformedResponse {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize {context}: {source}")]
    Serialize {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid JSON document {}: {source}", path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl TransitError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransitError>;
