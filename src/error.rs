use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single upstream request. Always retryable.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(String),
    #[error("http {status}: {body}")]
    Status { status: u16, body: String },
    #[error("throttled by upstream (http 429)")]
    Throttled,
    #[error("invalid upstream payload: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Http(err.to_string())
    }
}

/// Retries for one entity ran out.
#[derive(Debug, Error)]
#[error("upstream exhausted for entity {entity_id} after {attempts} attempts: {last_error}")]
pub struct UpstreamExhausted {
    pub entity_id: u32,
    pub attempts: u32,
    pub last_error: TransportError,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("no usable stats rows")]
    EmptyAggregateRow,
}

#[derive(Debug, Error)]
pub enum CachePersistError {
    #[error("write cache {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CacheLoadError {
    #[error("cache not found at {0}")]
    NotFound(PathBuf),
    #[error("read cache {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse cache {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Negative outcomes surfaced by the query service.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no players available, try again later")]
    NoPlayersAvailable,
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Upstream(#[from] UpstreamExhausted),
    #[error("roster unavailable: {0}")]
    Roster(String),
}
