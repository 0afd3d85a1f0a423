use std::fmt::Display;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure to pull a table out of a portal page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("anchor {anchor:?} not present in page")]
    NotFound { anchor: String },
    #[error("table anchored on {anchor:?} has unexpected layout: {detail}")]
    Malformed { anchor: String, detail: String },
}

impl ExtractError {
    pub(crate) fn not_found(anchor: &str) -> Self {
        ExtractError::NotFound {
            anchor: anchor.to_owned(),
        }
    }

    pub(crate) fn malformed(anchor: &str, detail: impl Into<String>) -> Self {
        ExtractError::Malformed {
            anchor: anchor.to_owned(),
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CardError {
    /// The portal answered, but not with the page we expected. For an
    /// unknown card it serves a different page rather than an error status.
    #[error("card not found: {0}")]
    NotFound(String),
    #[error("portal unavailable at {endpoint}")]
    UpstreamUnavailable {
        endpoint: String,
        #[source]
        source: BoxError,
    },
    #[error("malformed portal response: {0}")]
    MalformedResponse(String),
}

impl CardError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CardError::NotFound(_))
    }

    pub fn upstream(endpoint: impl Display, source: impl Into<BoxError>) -> Self {
        CardError::UpstreamUnavailable {
            endpoint: endpoint.to_string(),
            source: source.into(),
        }
    }
}

impl From<ExtractError> for CardError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::NotFound { .. } => CardError::NotFound(err.to_string()),
            ExtractError::Malformed { .. } => CardError::MalformedResponse(err.to_string()),
        }
    }
}
