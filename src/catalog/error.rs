use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Not authenticated; call authenticate() before requesting collections")]
    NotAuthenticated,

    #[error("Credentials rejected: {0}")]
    InvalidCredentials(String),

    #[error("Unknown collection '{0}'")]
    UnknownCollection(String),

    #[error("Failed to read snapshot directory")]
    Walk(#[from] walkdir::Error),

    #[error("I/O error reading scene file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed scene file {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid scene '{scene}': {reason}")]
    InvalidScene { scene: String, reason: String },
}
