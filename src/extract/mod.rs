//! Locating and decoding the JSON payload embedded in source pages.
//!
//! Library and product pages are server-rendered by a React-on-Rails
//! renderer which embeds the page state as a JSON document inside
//! `<script class="js-react-on-rails-component" data-component-name="...">`.
//! This module only finds and decodes that block; turning it into typed
//! entities is the job of [`crate::model`].
//!
//! # Example
//!
//! ```
//! use mirror_core::extract::{EmbeddedJsonExtractor, Extractor};
//!
//! let html = r#"<html><body>
//! <script class="js-react-on-rails-component" data-component-name="LibraryPage">{"results":[]}</script>
//! </body></html>"#;
//! let document = EmbeddedJsonExtractor::library_page().extract(html).unwrap();
//! assert!(document.value["results"].is_array());
//! ```

mod error;

use scraper::{Html, Selector};
use serde_json::Value;
use tracing::debug;

pub use error::{ExtractionError, ExtractionFailure};

/// Marker class carried by every embedded payload block.
const PAYLOAD_SCRIPT_SELECTOR: &str = "script.js-react-on-rails-component";

/// Component name of the library listing payload.
pub const LIBRARY_COMPONENT: &str = "LibraryPage";

/// Component name of a product download page payload.
pub const PRODUCT_COMPONENT: &str = "DownloadPageWithContent";

/// A decoded payload together with the exact text it was decoded from.
#[derive(Debug, Clone)]
pub struct RawDocument {
    /// Script block contents exactly as embedded in the page.
    pub raw_text: String,
    /// Decoded generic tree. Key order follows the source text.
    pub value: Value,
}

impl RawDocument {
    /// Pretty-printed rendition of the payload (non-ASCII kept as-is).
    ///
    /// # Errors
    ///
    /// Returns an error only if serialization of the in-memory tree fails.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.value)
    }
}

/// Capability to pull a payload out of one page shape.
pub trait Extractor {
    /// Extracts the single embedded payload from `html`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError`] when the block is missing, appears more
    /// than once, or does not contain valid JSON.
    fn extract(&self, html: &str) -> Result<RawDocument, ExtractionError>;
}

/// Extractor for `js-react-on-rails-component` script blocks of one component.
#[derive(Debug, Clone)]
pub struct EmbeddedJsonExtractor {
    component: &'static str,
}

impl EmbeddedJsonExtractor {
    /// Creates an extractor for the given `data-component-name`.
    #[must_use]
    pub const fn new(component: &'static str) -> Self {
        Self { component }
    }

    /// Extractor for the library page.
    #[must_use]
    pub const fn library_page() -> Self {
        Self::new(LIBRARY_COMPONENT)
    }

    /// Extractor for a product download page.
    #[must_use]
    pub const fn product_page() -> Self {
        Self::new(PRODUCT_COMPONENT)
    }

    /// Component name this extractor matches.
    #[must_use]
    pub fn component(&self) -> &'static str {
        self.component
    }
}

impl Extractor for EmbeddedJsonExtractor {
    fn extract(&self, html: &str) -> Result<RawDocument, ExtractionError> {
        let selector = Selector::parse(PAYLOAD_SCRIPT_SELECTOR)
            .map_err(|_| ExtractionError::missing(self.component))?;
        let document = Html::parse_document(html);

        let mut blocks: Vec<String> = document
            .select(&selector)
            .filter(|element| element.value().attr("data-component-name") == Some(self.component))
            .map(|element| element.text().collect::<String>())
            .collect();

        debug!(component = self.component, blocks = blocks.len(), "scanned page for payload");

        if blocks.len() > 1 {
            return Err(ExtractionError::ambiguous(self.component, blocks.len()));
        }
        let Some(raw_text) = blocks.pop() else {
            return Err(ExtractionError::missing(self.component));
        };

        let value = serde_json::from_str(raw_text.trim())
            .map_err(|e| ExtractionError::malformed(self.component, &e))?;

        Ok(RawDocument { raw_text, value })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn page(blocks: &[(&str, &str)]) -> String {
        let mut html = String::from("<!DOCTYPE html><html><head><title>t</title></head><body>");
        html.push_str("<div id=\"app\">noise</div>");
        for (component, body) in blocks {
            html.push_str(&format!(
                "<script type=\"application/json\" class=\"js-react-on-rails-component\" data-component-name=\"{component}\">{body}</script>"
            ));
        }
        html.push_str("</body></html>");
        html
    }

    #[test]
    fn test_extract_returns_decoded_tree_and_raw_text() {
        let body = r#"{"results":[{"product":{"name":"Brushes"}}]}"#;
        let html = page(&[(LIBRARY_COMPONENT, body)]);

        let document = EmbeddedJsonExtractor::library_page().extract(&html).unwrap();

        assert_eq!(document.raw_text, body);
        assert_eq!(document.value["results"][0]["product"]["name"], "Brushes");
    }

    #[test]
    fn test_extract_ignores_blocks_for_other_components() {
        let html = page(&[
            ("NavigationBar", r#"{"nav":true}"#),
            (PRODUCT_COMPONENT, r#"{"content":{"content_items":[]}}"#),
        ]);

        let document = EmbeddedJsonExtractor::product_page().extract(&html).unwrap();
        assert!(document.value["content"]["content_items"].is_array());
    }

    #[test]
    fn test_extract_missing_block() {
        let html = page(&[("NavigationBar", "{}")]);
        let error = EmbeddedJsonExtractor::library_page().extract(&html).unwrap_err();
        assert_eq!(error.reason, ExtractionFailure::Missing);
    }

    #[test]
    fn test_extract_ambiguous_blocks() {
        let html = page(&[(LIBRARY_COMPONENT, "{}"), (LIBRARY_COMPONENT, "{}")]);
        let error = EmbeddedJsonExtractor::library_page().extract(&html).unwrap_err();
        assert_eq!(error.reason, ExtractionFailure::Ambiguous);
    }

    #[test]
    fn test_extract_malformed_json() {
        let html = page(&[(LIBRARY_COMPONENT, r#"{"results": [}"#)]);
        let error = EmbeddedJsonExtractor::library_page().extract(&html).unwrap_err();
        assert_eq!(error.reason, ExtractionFailure::Malformed);
    }

    #[test]
    fn test_extract_block_position_does_not_matter() {
        let html = format!(
            "<html><head><script class=\"js-react-on-rails-component\" data-component-name=\"{LIBRARY_COMPONENT}\">{{\"results\":[]}}</script></head><body><p>later</p></body></html>"
        );
        assert!(EmbeddedJsonExtractor::library_page().extract(&html).is_ok());
    }

    #[test]
    fn test_pretty_json_preserves_key_order() {
        let html = page(&[(PRODUCT_COMPONENT, r#"{"zeta":1,"alpha":2}"#)]);
        let document = EmbeddedJsonExtractor::product_page().extract(&html).unwrap();
        let pretty = document.to_pretty_json().unwrap();
        assert!(pretty.find("zeta").unwrap() < pretty.find("alpha").unwrap());
    }
}
