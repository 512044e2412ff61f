use std::path::PathBuf;
use thiserror::Error;
use warp::http::StatusCode;

use crate::types::ErrorBody;

/// Failure of a record store backend or of record (de)serialization.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("key already exists: {0}")]
    KeyExists(String),

    #[error("store lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Everything a request handler can fail with. Nothing escapes the handler;
/// each variant becomes a status code and an error envelope.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("Record with ID {0} not found.")]
    NotFound(String),

    #[error("store failure while {action}: {source}")]
    Store {
        action: StoreAction,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoreAction {
    Storing,
    Retrieving,
}

impl std::fmt::Display for StoreAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreAction::Storing => write!(f, "storing"),
            StoreAction::Retrieving => write!(f, "retrieving"),
        }
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFields(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            ApiError::MissingFields(_) => ErrorBody::message("Invalid Data", self.to_string()),
            ApiError::NotFound(_) => ErrorBody::message("Not Found", self.to_string()),
            ApiError::Store {
                action: StoreAction::Storing,
                ..
            } => ErrorBody::details(
                "Internal Server Error",
                "Failed to store data in the record store.",
            ),
            ApiError::Store {
                action: StoreAction::Retrieving,
                source,
            } => ErrorBody::details(
                "Internal Server Error",
                format!(
                    "Failed to retrieve data from the record store. Error: {}",
                    source
                ),
            ),
        }
    }
}
