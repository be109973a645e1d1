//! Errors that abort a whole run.

use std::path::PathBuf;

use thiserror::Error;

use crate::download::FetchError;

/// Failures that leave no work to enumerate.
///
/// Everything scoped to a single product or asset is recorded as an
/// [`Issue`](super::Issue) instead.
#[derive(Debug, Error)]
pub enum RunError {
    /// The library page could not be fetched.
    #[error("library page unavailable: {source}")]
    LibraryUnavailable {
        /// Underlying fetch failure.
        #[source]
        source: FetchError,
    },

    /// The library page was fetched but its payload could not be read.
    #[error("library page unreadable: {detail}")]
    LibraryUnreadable {
        /// What went wrong.
        detail: String,
    },

    /// The output root could not be created.
    #[error("cannot create output directory {path}: {source}")]
    OutputDir {
        /// Output root.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    /// Creates a `LibraryUnreadable` error from any displayable cause.
    pub fn unreadable(detail: impl ToString) -> Self {
        Self::LibraryUnreadable {
            detail: detail.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_error_display() {
        let error = RunError::unreadable("missing payload for component 'LibraryPage'");
        assert_eq!(
            error.to_string(),
            "library page unreadable: missing payload for component 'LibraryPage'"
        );

        let error = RunError::LibraryUnavailable {
            source: FetchError::http_status("https://app.gumroad.com/library", 502),
        };
        assert!(error.to_string().contains("502"));
    }
}
