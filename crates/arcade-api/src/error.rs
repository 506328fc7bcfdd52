use thiserror::Error;

use crate::types::VersionParseError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to build API client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("invalid API address {url}: {details}")]
    InvalidUrl { url: String, details: String },

    #[error("API credentials cannot be sent as a header")]
    InvalidCredentials,

    #[error("{operation} request failed: {source}")]
    Request {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{operation} failed with HTTP {status}{body_snippet}")]
    HttpStatus {
        operation: &'static str,
        status: reqwest::StatusCode,
        body_snippet: String,
    },

    #[error("failed to parse {operation} response: {source}")]
    Parse {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("remote reported an invalid launcher version: {0}")]
    InvalidVersion(#[from] VersionParseError),
}

impl ApiError {
    pub(crate) fn request(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Request { operation, source }
    }

    pub(crate) fn parse(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Parse { operation, source }
    }

    /// Whether the failure looks like missing connectivity rather than a
    /// misbehaving service.
    #[must_use]
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Request { source, .. } => source.is_connect() || source.is_timeout(),
            _ => false,
        }
    }
}
