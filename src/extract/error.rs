//! Error types for payload extraction.

use std::fmt;

use thiserror::Error;

/// Why an embedded payload could not be extracted from a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionFailure {
    /// No marked script block was found.
    Missing,
    /// More than one marked script block was found.
    Ambiguous,
    /// The block was found but its text is not valid JSON.
    Malformed,
}

impl fmt::Display for ExtractionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Missing => "missing",
            Self::Ambiguous => "ambiguous",
            Self::Malformed => "malformed",
        };
        write!(f, "{label}")
    }
}

/// Errors raised while locating and decoding an embedded JSON payload.
#[derive(Debug, Error)]
#[error("{reason} payload for component '{component}': {detail}")]
pub struct ExtractionError {
    /// Classification of the failure.
    pub reason: ExtractionFailure,
    /// Component name the extractor was looking for.
    pub component: String,
    /// Human-readable context.
    pub detail: String,
}

impl ExtractionError {
    /// No candidate block in the page.
    #[must_use]
    pub fn missing(component: &str) -> Self {
        Self {
            reason: ExtractionFailure::Missing,
            component: component.to_string(),
            detail: "no matching script block".to_string(),
        }
    }

    /// Several candidate blocks in the page.
    #[must_use]
    pub fn ambiguous(component: &str, count: usize) -> Self {
        Self {
            reason: ExtractionFailure::Ambiguous,
            component: component.to_string(),
            detail: format!("found {count} script blocks, expected 1"),
        }
    }

    /// The block text failed to decode.
    #[must_use]
    pub fn malformed(component: &str, source: &serde_json::Error) -> Self {
        Self {
            reason: ExtractionFailure::Malformed,
            component: component.to_string(),
            detail: source.to_string(),
        }
    }
}
