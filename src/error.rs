//! Error taxonomy for the lookup engine.

use thiserror::Error;

use crate::lookup::{MatchResult, NutritionFacts};

/// Failures of candidate scoring.
#[derive(Debug, Clone, Error)]
pub enum MatchError {
    #[error("invalid request: product name is empty")]
    InvalidRequest,

    #[error("no candidates to match against")]
    NotFound,

    /// A best candidate exists but scored under the threshold.
    #[error("match confidence {:.1} below threshold {:.1}", .best.score, .threshold)]
    LowConfidence { best: MatchResult, threshold: f64 },
}

/// Failures of the external food database client.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("no foods found")]
    NotFound,

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error("invalid client configuration: {0}")]
    Config(String),
}

/// Failures of a cache backend. A miss is `Ok(None)`, never an error.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache value serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by [`crate::lookup::service::NutritionService`].
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no matching product found")]
    NotFound,

    /// Data is present but should be verified manually. Never cached.
    #[error("low confidence match ({:.1} < {:.1})", .facts.confidence, .threshold)]
    LowConfidence {
        facts: Box<NutritionFacts>,
        threshold: f64,
    },

    #[error("external food database unavailable: {0}")]
    ExternalService(#[source] SearchError),

    #[error("lookup cancelled")]
    Cancelled,
}

impl LookupError {
    /// Facts carried alongside the error, if any.
    pub fn facts(&self) -> Option<&NutritionFacts> {
        match self {
            LookupError::LowConfidence { facts, .. } => Some(facts),
            _ => None,
        }
    }

    pub fn into_facts(self) -> Option<NutritionFacts> {
        match self {
            LookupError::LowConfidence { facts, .. } => Some(*facts),
            _ => None,
        }
    }
}

impl From<SearchError> for LookupError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::NotFound => LookupError::NotFound,
            SearchError::Cancelled => LookupError::Cancelled,
            other => LookupError::ExternalService(other),
        }
    }
}

/// Failures while assembling the engine from configuration.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error("failed to build food database client: {0}")]
    Client(#[from] SearchError),

    #[error("failed to open cache: {0}")]
    Cache(#[from] CacheError),
}
