//! Error types for entity mapping.

use thiserror::Error;

/// Errors produced while turning a decoded payload into typed entities.
///
/// Entity-level variants (`MissingField`, `InvalidShape`) describe a single
/// rejected entity and never abort a run. `MissingRoot` means the document as
/// a whole has no usable structure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// The document does not contain the top-level collection we map from.
    #[error("document has no usable '{field}' section")]
    MissingRoot {
        /// Dotted path of the missing section.
        field: &'static str,
    },

    /// A required field is absent or empty on one entity.
    #[error("{entity} #{index} ({label}) is missing required field '{field}'")]
    MissingField {
        /// Entity kind ("product", "file", "cover").
        entity: &'static str,
        /// Position of the entity in its source list.
        index: usize,
        /// Best available human label for the entity.
        label: String,
        /// Name of the missing field.
        field: &'static str,
    },

    /// An entity has fields of the wrong type.
    #[error("{entity} #{index} has an unexpected shape: {detail}")]
    InvalidShape {
        /// Entity kind.
        entity: &'static str,
        /// Position of the entity in its source list.
        index: usize,
        /// Decoder message.
        detail: String,
    },
}

impl MappingError {
    /// Creates a `MissingField` error.
    #[must_use]
    pub fn missing_field(
        entity: &'static str,
        index: usize,
        label: impl Into<String>,
        field: &'static str,
    ) -> Self {
        Self::MissingField {
            entity,
            index,
            label: label.into(),
            field,
        }
    }

    /// Creates an `InvalidShape` error from a decoder failure.
    #[must_use]
    pub fn invalid_shape(entity: &'static str, index: usize, source: &serde_json::Error) -> Self {
        Self::InvalidShape {
            entity,
            index,
            detail: source.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_display() {
        let error = MappingError::missing_field("file", 3, "model.fbx", "file_size");
        let msg = error.to_string();
        assert!(msg.contains("file #3"), "Expected entity position in: {msg}");
        assert!(msg.contains("model.fbx"), "Expected label in: {msg}");
        assert!(msg.contains("file_size"), "Expected field in: {msg}");
    }

    #[test]
    fn test_missing_root_display() {
        let error = MappingError::MissingRoot { field: "results" };
        assert_eq!(error.to_string(), "document has no usable 'results' section");
    }
}
