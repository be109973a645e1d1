//! Outcome counters and follow-up items of a run.

use std::fmt;

/// Category of a recorded issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// A library entry, cover or content item was rejected by the mapper.
    Mapping,
    /// A product page could not be fetched or read.
    ProductPage,
    /// An asset is hosted outside the source service.
    OutOfScope,
    /// No legal path could be built for an asset.
    Layout,
    /// An asset download failed.
    Download,
    /// A metadata file or directory could not be written.
    Write,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Mapping => "mapping",
            Self::ProductPage => "product-page",
            Self::OutOfScope => "out-of-scope",
            Self::Layout => "layout",
            Self::Download => "download",
            Self::Write => "write",
        };
        write!(f, "{label}")
    }
}

/// Something the user may want to follow up by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Creator display name, when known.
    pub creator: Option<String>,
    /// Product display name, when known.
    pub product: Option<String>,
    /// Asset id, when the issue concerns a single asset.
    pub asset_id: Option<String>,
    /// Category.
    pub kind: IssueKind,
    /// Human-readable details (error message, URL).
    pub detail: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if let Some(creator) = &self.creator {
            write!(f, " {creator}")?;
        }
        if let Some(product) = &self.product {
            write!(f, " / {product}")?;
        }
        if let Some(asset_id) = &self.asset_id {
            write!(f, " / {asset_id}")?;
        }
        write!(f, ": {}", self.detail)
    }
}

/// Totals of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Products whose page was read and reconciled.
    pub products_processed: usize,
    /// Products skipped because their page failed.
    pub products_failed: usize,
    /// Assets downloaded (new or replaced).
    pub files_downloaded: usize,
    /// Assets whose local copy was current.
    pub files_skipped: usize,
    /// Assets whose download failed.
    pub files_failed: usize,
    /// Bytes written by downloads.
    pub bytes_downloaded: u64,
    /// Bytes of local copies left untouched.
    pub bytes_skipped: u64,
    /// Assets excluded as out of scope.
    pub out_of_scope: usize,
    /// Entities rejected by the mapper.
    pub mapping_failures: usize,
    /// Follow-up items in the order they occurred.
    pub issues: Vec<Issue>,
}

impl RunSummary {
    /// Returns true if nothing needs manual follow-up.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub(crate) fn record(&mut self, issue: Issue) {
        self.issues.push(issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display_includes_context() {
        let issue = Issue {
            creator: Some("Acme".to_string()),
            product: Some("Brushes".to_string()),
            asset_id: Some("7".to_string()),
            kind: IssueKind::OutOfScope,
            detail: "hosted on dropbox.com".to_string(),
        };
        assert_eq!(issue.to_string(), "[out-of-scope] Acme / Brushes / 7: hosted on dropbox.com");
    }

    #[test]
    fn test_issue_display_without_context() {
        let issue = Issue {
            creator: None,
            product: None,
            asset_id: None,
            kind: IssueKind::Mapping,
            detail: "product #3 is missing 'name'".to_string(),
        };
        assert_eq!(issue.to_string(), "[mapping]: product #3 is missing 'name'");
    }

    #[test]
    fn test_summary_is_clean() {
        let mut summary = RunSummary::default();
        assert!(summary.is_clean());
        summary.record(Issue {
            creator: None,
            product: None,
            asset_id: None,
            kind: IssueKind::Write,
            detail: "disk full".to_string(),
        });
        assert!(!summary.is_clean());
    }
}
