//! Typed errors for the failures callers branch on.
//!
//! Everything else is fatal and travels as `anyhow::Error`.

use std::path::PathBuf;

use thiserror::Error;

/// A fetch that did not produce a body. Always recoverable: the resource is
/// left uncached and the next run retries it.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("GET {url} timed out")]
    Timeout { url: String },

    #[error("GET {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("GET {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_owned(),
            }
        } else {
            Self::Request {
                url: url.to_owned(),
                source: err,
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("item snapshot not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("read item snapshot {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse item snapshot {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
