//! Error types for auth-core

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Result type alias for credential store operations
pub type Result<T> = std::result::Result<T, AuthError>;

/// Credential store error types
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("invalid project name '{0}'")]
    InvalidProjectName(String),

    #[error("cannot find configurations: {0}")]
    ConfigDirUnavailable(String),

    #[error("configuration for project '{name}' not found")]
    ConfigurationNotFound {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open configuration file for project '{name}': {source}")]
    ReadConfiguration {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read configuration for project '{name}': {source}")]
    DecodeError {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot create target directory for project '{name}': {source}")]
    CreateDirectory {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot open configuration file for project '{name}': {source}")]
    OpenFile {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot serialize configuration for project '{name}': {source}")]
    SerializeConfiguration {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot persist configuration for project '{name}': {source}")]
    SyncConfiguration {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot remove configuration for project '{name}': {source}")]
    RemoveConfiguration {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("missing api key")]
    MissingApiKey,

    #[error("project token expired: {}", .0.to_rfc3339_opts(SecondsFormat::Secs, true))]
    ExpiredToken(DateTime<Utc>),

    #[error("nil token")]
    NilToken,

    #[error("token with alias '{0}' not found")]
    AliasNotFound(String),

    #[error("api key cannot be used as a header value: {0}")]
    InvalidHeaderValue(String),
}

impl AuthError {
    /// True for the validation failures of a single token
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AuthError::MissingApiKey | AuthError::ExpiredToken(_) | AuthError::NilToken
        )
    }

    /// True when a load failed because no file exists for the project
    pub fn is_not_found(&self) -> bool {
        matches!(self, AuthError::ConfigurationNotFound { .. })
    }
}
