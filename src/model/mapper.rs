//! Conversion from decoded payloads to typed entities.
//!
//! Each library entry, cover and content item is decoded on its own so one
//! malformed entity is rejected (and reported) without affecting its
//! siblings.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

use super::{Asset, AssetKind, AssetScope, Creator, MappingError, Product};
use crate::extract::RawDocument;

/// Fixed asset id given to a product's library thumbnail.
pub const THUMBNAIL_ASSET_ID: &str = "thumbnail";

/// Where relative download links point and which hosts count as the source.
#[derive(Debug, Clone)]
pub struct SourceSite {
    download_base: Url,
    domain: String,
}

impl SourceSite {
    /// Creates a site description.
    ///
    /// `domain` matches itself and any of its sub-domains.
    #[must_use]
    pub fn new(download_base: Url, domain: impl Into<String>) -> Self {
        Self {
            download_base,
            domain: domain.into().trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    /// Base URL relative download links are joined onto.
    #[must_use]
    pub fn download_base(&self) -> &Url {
        &self.download_base
    }

    /// Returns true if `url` is hosted by the source service.
    #[must_use]
    pub fn is_source_url(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| {
            let host = host.to_ascii_lowercase();
            host == self.domain || host.ends_with(&format!(".{}", self.domain))
        })
    }

    /// Resolves a possibly relative link against the download base.
    #[must_use]
    pub fn resolve(&self, raw: &str) -> Option<Url> {
        self.download_base.join(raw.trim()).ok()
    }

    fn scope_for(&self, url: &Url) -> AssetScope {
        if self.is_source_url(url) {
            AssetScope::InScope
        } else {
            AssetScope::OutOfScope {
                reason: format!(
                    "hosted on {}",
                    url.host_str().unwrap_or("an unknown host")
                ),
            }
        }
    }
}

/// Entities that mapped successfully plus the ones that were rejected.
#[derive(Debug, Clone)]
pub struct Mapped<T> {
    /// Successfully mapped entities in source order.
    pub items: Vec<T>,
    /// One entry per rejected entity.
    pub rejected: Vec<MappingError>,
}

/// A product download page.
#[derive(Debug, Clone)]
pub struct ProductPage {
    /// Product name as shown on the download page.
    pub product_name: Option<String>,
    /// Public store page of the product.
    pub store_url: Option<String>,
    /// Purchase timestamp, verbatim.
    pub purchased_at: Option<String>,
    /// Downloadable files, in page order. Includes out-of-scope entries.
    pub files: Mapped<Asset>,
    /// Number of non-file content items that were ignored.
    pub skipped_non_files: usize,
}

/// Maps decoded library and product payloads to entities.
#[derive(Debug, Clone)]
pub struct EntityMapper {
    site: SourceSite,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl RawId {
    fn into_string(self) -> Option<String> {
        match self {
            Self::Text(text) => {
                let text = text.trim().to_string();
                (!text.is_empty()).then_some(text)
            }
            Self::Number(number) => Some(number.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawLibraryEntry {
    product: RawLibraryProduct,
    purchase: RawPurchase,
}

#[derive(Debug, Deserialize)]
struct RawLibraryProduct {
    id: Option<RawId>,
    permalink: Option<String>,
    name: Option<String>,
    creator_id: Option<RawId>,
    creator: Option<RawCreator>,
    thumbnail_url: Option<String>,
    covers: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct RawCreator {
    name: Option<String>,
    profile_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPurchase {
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawCover {
    id: Option<RawId>,
    original_url: Option<String>,
    url: Option<String>,
    filetype: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPagePurchase {
    product_name: Option<String>,
    product_long_url: Option<String>,
    created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawContentItem {
    id: Option<RawId>,
    #[serde(rename = "type")]
    kind: Option<String>,
    file_name: Option<String>,
    extension: Option<String>,
    file_size: Option<u64>,
    download_url: Option<String>,
    external_link_url: Option<String>,
}

impl EntityMapper {
    /// Creates a mapper for the given source site.
    #[must_use]
    pub fn new(site: SourceSite) -> Self {
        Self { site }
    }

    /// Returns the site this mapper resolves URLs against.
    #[must_use]
    pub fn site(&self) -> &SourceSite {
        &self.site
    }

    /// Maps the library payload into products.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::MissingRoot`] if the payload has no `results`
    /// array. Individual bad entries are returned in [`Mapped::rejected`].
    pub fn map_library(&self, document: &RawDocument) -> Result<Mapped<Product>, MappingError> {
        let results = document
            .value
            .get("results")
            .and_then(Value::as_array)
            .ok_or(MappingError::MissingRoot { field: "results" })?;

        let mut mapped = Mapped {
            items: Vec::with_capacity(results.len()),
            rejected: Vec::new(),
        };

        for (index, entry) in results.iter().enumerate() {
            match self.map_library_entry(index, entry) {
                Ok(product) => {
                    debug!(product = %product.name, creator = %product.creator.name, "found product");
                    mapped.items.push(product);
                }
                Err(error) => {
                    let product = entry.pointer("/product/name").and_then(Value::as_str);
                    let creator = entry.pointer("/product/creator/name").and_then(Value::as_str);
                    warn!(
                        creator = %creator.unwrap_or("unknown"),
                        product = %product.unwrap_or("unknown"),
                        error = %error,
                        "skipping library entry"
                    );
                    mapped.rejected.push(error);
                }
            }
        }
        Ok(mapped)
    }

    fn map_library_entry(&self, index: usize, entry: &Value) -> Result<Product, MappingError> {
        let raw = RawLibraryEntry::deserialize(entry)
            .map_err(|e| MappingError::invalid_shape("product", index, &e))?;
        let product = raw.product;

        let name = non_empty(product.name)
            .ok_or_else(|| MappingError::missing_field("product", index, "unnamed", "name"))?;
        let id = product
            .id
            .and_then(RawId::into_string)
            .or_else(|| non_empty(product.permalink))
            .ok_or_else(|| MappingError::missing_field("product", index, &name, "id"))?;
        let page_url = non_empty(raw.purchase.download_url).ok_or_else(|| {
            MappingError::missing_field("product", index, &name, "purchase.download_url")
        })?;
        let creator_id = product
            .creator_id
            .and_then(RawId::into_string)
            .ok_or_else(|| MappingError::missing_field("product", index, &name, "creator_id"))?;

        let (creator_name, profile_url) = match product.creator {
            Some(creator) => (non_empty(creator.name), non_empty(creator.profile_url)),
            None => (None, None),
        };
        let creator_name = creator_name.unwrap_or_else(|| {
            warn!(creator_id = %creator_id, product = %name, "creator has no name");
            format!("[id {creator_id}]")
        });

        let mut images = Vec::new();
        if let Some(thumbnail) = non_empty(product.thumbnail_url) {
            match self.thumbnail_asset(&thumbnail) {
                Some(asset) => images.push(asset),
                None => warn!(
                    creator = %creator_name,
                    product = %name,
                    url = %thumbnail,
                    "unusable thumbnail URL"
                ),
            }
        }
        match product.covers {
            Some(covers) => {
                for (cover_index, cover) in covers.iter().enumerate() {
                    match self.cover_asset(cover_index, cover) {
                        Ok(asset) => images.push(asset),
                        Err(error) => warn!(
                            creator = %creator_name,
                            product = %name,
                            error = %error,
                            "skipping cover"
                        ),
                    }
                }
            }
            None => debug!(product = %name, "no covers block"),
        }

        Ok(Product {
            id,
            name,
            creator: Creator {
                id: creator_id,
                name: creator_name,
                profile_url,
            },
            page_url,
            images,
            metadata: entry.clone(),
        })
    }

    fn thumbnail_asset(&self, raw_url: &str) -> Option<Asset> {
        let url = self.site.resolve(raw_url)?;
        let file_name = match extension_from_url(&url) {
            Some(extension) => format!("{THUMBNAIL_ASSET_ID}{extension}"),
            None => THUMBNAIL_ASSET_ID.to_string(),
        };
        Some(Asset {
            id: THUMBNAIL_ASSET_ID.to_string(),
            kind: AssetKind::Image,
            file_name,
            declared_size: None,
            scope: self.site.scope_for(&url),
            url: Some(url),
        })
    }

    fn cover_asset(&self, index: usize, cover: &Value) -> Result<Asset, MappingError> {
        let raw = RawCover::deserialize(cover)
            .map_err(|e| MappingError::invalid_shape("cover", index, &e))?;
        let id = raw
            .id
            .and_then(RawId::into_string)
            .ok_or_else(|| MappingError::missing_field("cover", index, "cover", "id"))?;
        let raw_url = non_empty(raw.original_url)
            .or_else(|| non_empty(raw.url))
            .ok_or_else(|| MappingError::missing_field("cover", index, &id, "original_url"))?;
        let url = self
            .site
            .resolve(&raw_url)
            .ok_or_else(|| MappingError::missing_field("cover", index, &id, "original_url"))?;

        let extension = non_empty(raw.filetype)
            .map(|filetype| format!(".{}", filetype.trim_start_matches('.')))
            .or_else(|| extension_from_url(&url));
        let file_name = format!("{id}{}", extension.unwrap_or_default());

        Ok(Asset {
            scope: self.site.scope_for(&url),
            id,
            kind: AssetKind::Image,
            file_name,
            declared_size: None,
            url: Some(url),
        })
    }

    /// Maps a product download page payload.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::MissingRoot`] if the payload has no
    /// `content.content_items` array.
    pub fn map_product_page(&self, document: &RawDocument) -> Result<ProductPage, MappingError> {
        let items = document
            .value
            .get("content")
            .and_then(|content| content.get("content_items"))
            .and_then(Value::as_array)
            .ok_or(MappingError::MissingRoot {
                field: "content.content_items",
            })?;

        let purchase = document
            .value
            .get("purchase")
            .and_then(|purchase| RawPagePurchase::deserialize(purchase).ok())
            .unwrap_or_default();

        let mut files = Mapped {
            items: Vec::with_capacity(items.len()),
            rejected: Vec::new(),
        };
        let mut skipped_non_files = 0;

        for (index, item) in items.iter().enumerate() {
            match self.map_content_item(index, item) {
                Ok(Some(asset)) => files.items.push(asset),
                Ok(None) => skipped_non_files += 1,
                Err(error) => {
                    debug!(error = %error, "rejected content item");
                    files.rejected.push(error);
                }
            }
        }

        Ok(ProductPage {
            product_name: non_empty(purchase.product_name),
            store_url: non_empty(purchase.product_long_url),
            purchased_at: non_empty(purchase.created_at),
            files,
            skipped_non_files,
        })
    }

    fn map_content_item(&self, index: usize, item: &Value) -> Result<Option<Asset>, MappingError> {
        let raw = RawContentItem::deserialize(item)
            .map_err(|e| MappingError::invalid_shape("file", index, &e))?;

        let file_name = non_empty(raw.file_name);
        let label = file_name.clone().unwrap_or_else(|| "unnamed".to_string());

        if let Some(kind) = raw.kind.as_deref()
            && kind != "file"
        {
            info!(file = %label, kind, "skipping non-file content");
            return Ok(None);
        }

        let id = raw
            .id
            .and_then(RawId::into_string)
            .ok_or_else(|| MappingError::missing_field("file", index, &label, "id"))?;
        let file_name =
            file_name.ok_or_else(|| MappingError::missing_field("file", index, &id, "file_name"))?;
        let size = raw
            .file_size
            .ok_or_else(|| MappingError::missing_field("file", index, &label, "file_size"))?;
        let file_name = with_extension(file_name, non_empty(raw.extension).as_deref());
        let external = non_empty(raw.external_link_url);

        let (url, scope) = match (non_empty(raw.download_url), external) {
            (Some(download), external) => {
                if let Some(external) = external {
                    warn!(file = %file_name, external = %external, "file also has an external link to check");
                }
                let url = self.site.resolve(&download).ok_or_else(|| {
                    MappingError::missing_field("file", index, &file_name, "download_url")
                })?;
                let scope = self.site.scope_for(&url);
                (Some(url), scope)
            }
            (None, Some(external)) => {
                let url = Url::parse(&external).ok();
                let scope = AssetScope::OutOfScope {
                    reason: format!("external link {external}"),
                };
                (url, scope)
            }
            (None, None) => {
                return Err(MappingError::missing_field(
                    "file",
                    index,
                    &file_name,
                    "download_url",
                ));
            }
        };

        Ok(Some(Asset {
            id,
            kind: AssetKind::File,
            file_name,
            declared_size: Some(size),
            url,
            scope,
        }))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn with_extension(file_name: String, extension: Option<&str>) -> String {
    let Some(extension) = extension.map(|e| e.trim_start_matches('.')) else {
        return file_name;
    };
    if extension.is_empty()
        || file_name
            .to_lowercase()
            .ends_with(&format!(".{}", extension.to_lowercase()))
    {
        return file_name;
    }
    format!("{file_name}.{extension}")
}

/// Extension of the URL's last path segment including the dot, lowercased.
fn extension_from_url(url: &Url) -> Option<String> {
    let last_segment = url.path_segments()?.next_back()?;
    let decoded = urlencoding::decode(last_segment).ok()?;
    let dot_index = decoded.rfind('.')?;
    let ext = &decoded[dot_index..];
    if ext.len() <= 1 || ext.len() > 12 {
        return None;
    }
    Some(ext.to_lowercase())
}
