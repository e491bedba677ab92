use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SnapshotError {
    #[error("missing config file {}", .0.display())]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {}", .0.display())]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("no `{field}` configured for service `{service}`")]
    MissingCredential { service: String, field: String },

    #[error("invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("repository unreachable: {0}")]
    StoreUnreachable(String),

    #[error("authentication failed for user {0}")]
    AuthenticationFailed(String),

    #[error("user {user} may not modify collection {collection}")]
    PermissionDenied { user: String, collection: String },

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("corrupt repository file {path}: {message}")]
    StoreCorrupt { path: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("feed request failed: {0}")]
    FeedHttp(String),

    #[error("feed for {collection} returned malformed JSON: {message}")]
    MalformedPayload { collection: String, message: String },

    #[error("invalid qualified name: {0}")]
    InvalidQualifiedName(String),

    #[error("undeclared namespace prefix `{0}`")]
    UnknownPrefix(String),
}
