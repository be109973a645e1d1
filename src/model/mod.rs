//! Typed entities for a user's library and the mapping that produces them.
//!
//! Only the fields the mirror acts on (ids, names, sizes, URLs) are typed.
//! Everything else on a library entry is kept verbatim in
//! [`Product::metadata`] because its shape changes without notice.

mod error;
mod mapper;

use std::fmt;

use serde_json::Value;
use url::Url;

pub use error::MappingError;
pub use mapper::{EntityMapper, Mapped, ProductPage, SourceSite, THUMBNAIL_ASSET_ID};

/// The seller of a product.
///
/// `id` is the durable key; `name` may change between runs and is only used
/// for the human-facing directory name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Creator {
    /// Stable creator id.
    pub id: String,
    /// Display name (or `[id <id>]` when the payload has none).
    pub name: String,
    /// Creator storefront, when known.
    pub profile_url: Option<String>,
}

/// A purchased product as listed on the library page.
#[derive(Debug, Clone)]
pub struct Product {
    /// Stable product id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Owning creator.
    pub creator: Creator,
    /// URL of the product's download page.
    pub page_url: String,
    /// Cover images and thumbnail declared on the library page.
    pub images: Vec<Asset>,
    /// The library entry exactly as received.
    pub metadata: Value,
}

/// Whether an asset is a downloadable file or a store image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// Content the user bought.
    File,
    /// Cover image or thumbnail.
    Image,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// Whether the mirror is allowed to fetch an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetScope {
    /// Hosted by the source service.
    InScope,
    /// Hosted elsewhere or only reachable through an external link.
    OutOfScope {
        /// Why the asset is excluded.
        reason: String,
    },
}

/// A downloadable file or image belonging to one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// Unique id within the service. The only reliable key within a product.
    pub id: String,
    /// File or image.
    pub kind: AssetKind,
    /// Declared file name including extension. Not unique within a product.
    pub file_name: String,
    /// Size declared by the payload. Images never declare one.
    pub declared_size: Option<u64>,
    /// Content URL, absolute.
    pub url: Option<Url>,
    /// Fetch eligibility.
    pub scope: AssetScope,
}

impl Asset {
    /// Returns true if the asset may be handed to the reconciliation engine.
    #[must_use]
    pub fn is_in_scope(&self) -> bool {
        matches!(self.scope, AssetScope::InScope) && self.url.is_some()
    }
}
