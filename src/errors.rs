//! Crate-wide error taxonomy (spec §7).
//!
//! Every component boundary returns one of these variants so the daemon's
//! HTTP layer and a future CLI front-end can both render them: structured
//! for `--json`, human-formatted otherwise. Retries happen inside the layer
//! closest to the cause; this type only carries the outcome.

use axum::http::StatusCode;
use axum_thiserror::ErrorStatus;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used by callers that want to branch on kind
/// without matching every variant (e.g. choosing a CLI exit code).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    User,
    Environment,
    MetadataCorrupt,
    Resolver,
    Transaction,
    Internal,
}

#[derive(Error, Debug, ErrorStatus)]
pub enum Error {
    #[error("{0}")]
    #[status(StatusCode::BAD_REQUEST)]
    User(String),

    #[error("environment error: {0}")]
    #[status(StatusCode::SERVICE_UNAVAILABLE)]
    Environment(String),

    #[error("metadata corrupt in media {media} at offset {offset}: {message}")]
    #[status(StatusCode::UNPROCESSABLE_ENTITY)]
    MetadataCorrupt { media: String, offset: u64, message: String },

    #[error("resolver error: {0}")]
    #[status(StatusCode::CONFLICT)]
    Resolver(String),

    #[error("transaction failed: {0}")]
    #[status(StatusCode::INTERNAL_SERVER_ERROR)]
    Transaction(String),

    #[error("internal error: {0}")]
    #[status(StatusCode::INTERNAL_SERVER_ERROR)]
    Internal(String),

    #[error("not found")]
    #[status(StatusCode::NOT_FOUND)]
    NotFound,

    #[error("database error: {0}")]
    #[status(StatusCode::INTERNAL_SERVER_ERROR)]
    Db(#[from] sqlx::Error),

    #[error("network error: {0}")]
    #[status(StatusCode::SERVICE_UNAVAILABLE)]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    #[status(StatusCode::INTERNAL_SERVER_ERROR)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::User(_) | Self::NotFound => ErrorKind::User,
            Self::Environment(_) | Self::Http(_) => ErrorKind::Environment,
            Self::MetadataCorrupt { .. } => ErrorKind::MetadataCorrupt,
            Self::Resolver(_) => ErrorKind::Resolver,
            Self::Transaction(_) => ErrorKind::Transaction,
            Self::Internal(_) | Self::Db(_) | Self::Io(_) => ErrorKind::Internal,
        }
    }

    pub fn metadata_corrupt(media: impl Into<String>, offset: u64, message: impl Into<String>) -> Self {
        Self::MetadataCorrupt { media: media.into(), offset, message: message.into() }
    }
}
