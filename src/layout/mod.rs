//! Stable, collision-safe on-disk layout of the mirror.
//!
//! ```text
//! OUTPUT_DIR/
//!   library.html
//!   library.json
//!   <creator>/<product>/
//!       .product-id
//!       product.json
//!       product.pretty.json
//!       <product>.url
//!       <product>.html
//!       <asset id>/<asset file name>
//! ```
//!
//! Every path here is a pure function of entity ids and names, so the local
//! state inspector finds the same files on every run. The asset id directory
//! is what keeps two assets with the same display name apart.

mod sanitize;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::{Asset, Product};

pub use sanitize::{MAX_SEGMENT_BYTES, sanitize_segment};

use sanitize::truncate_on_char_boundary;

/// Raw library page, overwritten each run.
pub const LIBRARY_HTML: &str = "library.html";
/// Pretty-printed library payload, overwritten each run.
pub const LIBRARY_JSON: &str = "library.json";
/// Product payload exactly as embedded in the page.
pub const PRODUCT_JSON: &str = "product.json";
/// Pretty-printed product payload.
pub const PRODUCT_PRETTY_JSON: &str = "product.pretty.json";
/// Id of the product that owns a product directory.
pub const PRODUCT_ID_FILE: &str = ".product-id";
/// Version-control ignore file written once to the output root.
pub const GITIGNORE: &str = ".gitignore";
/// Suffix of in-progress downloads.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Errors raised when no legal path can be built from a name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// The name has no characters that survive sanitization.
    #[error("'{name}' cannot be represented as a path segment")]
    Unrepresentable {
        /// Original name.
        name: String,
    },
}

impl LayoutError {
    /// Creates an `Unrepresentable` error.
    #[must_use]
    pub fn unrepresentable(name: &str) -> Self {
        Self::Unrepresentable {
            name: name.to_string(),
        }
    }
}

/// Resolves `<creator>/<product>/<asset id>/<asset file name>`.
///
/// An asset file name that cannot be sanitized falls back to an id-based
/// name; creator and product names have no fallback here.
///
/// # Errors
///
/// Returns [`LayoutError`] if the creator name, product name or asset id
/// cannot be turned into a path segment.
pub fn resolve(creator_name: &str, product_name: &str, asset: &Asset) -> Result<PathBuf, LayoutError> {
    let mut path = PathBuf::from(sanitize_segment(creator_name)?);
    path.push(sanitize_segment(product_name)?);
    path.push(asset_relative_path(asset)?);
    Ok(path)
}

/// Resolves `<asset id>/<asset file name>` relative to a product directory.
///
/// # Errors
///
/// Returns [`LayoutError`] if the asset id cannot be turned into a path segment.
pub fn asset_relative_path(asset: &Asset) -> Result<PathBuf, LayoutError> {
    let dir = sanitize_segment(&asset.id)?;
    let file_name = asset_file_name(asset, &dir);
    Ok(PathBuf::from(dir).join(file_name))
}

fn asset_file_name(asset: &Asset, id_segment: &str) -> String {
    sanitize_segment(&asset.file_name).unwrap_or_else(|_| {
        let extension = Path::new(&asset.file_name)
            .extension()
            .and_then(|ext| sanitize_segment(&ext.to_string_lossy()).ok());
        match extension {
            Some(extension) => format!("{id_segment}.{extension}"),
            None => id_segment.to_string(),
        }
    })
}

/// Appends ` [<suffix>]`, shortening `label` so the result stays within
/// [`MAX_SEGMENT_BYTES`].
fn with_suffix(mut label: String, suffix: &str) -> String {
    let tail = format!(" [{suffix}]");
    truncate_on_char_boundary(&mut label, MAX_SEGMENT_BYTES.saturating_sub(tail.len()));
    let label = label.trim_end_matches(['.', ' ']);
    format!("{label}{tail}")
}

/// Product id recorded in `product_dir`, if any.
#[must_use]
pub fn read_owner(product_dir: &Path) -> Option<String> {
    let id = fs::read_to_string(product_dir.join(PRODUCT_ID_FILE)).ok()?;
    let id = id.trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Directory and metadata file names of one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductLayout {
    /// `<creator>/<product>` relative to the output root.
    pub dir: PathBuf,
    /// Sanitized product segment, reused for the shortcut and snapshot names.
    pub label: String,
}

impl ProductLayout {
    /// Path of the ownership marker.
    #[must_use]
    pub fn id_marker(&self) -> PathBuf {
        self.dir.join(PRODUCT_ID_FILE)
    }

    /// Path of the raw product payload.
    #[must_use]
    pub fn raw_json(&self) -> PathBuf {
        self.dir.join(PRODUCT_JSON)
    }

    /// Path of the formatted product payload.
    #[must_use]
    pub fn pretty_json(&self) -> PathBuf {
        self.dir.join(PRODUCT_PRETTY_JSON)
    }

    /// Path of the `.url` shortcut to the store page.
    #[must_use]
    pub fn shortcut(&self) -> PathBuf {
        self.dir.join(format!("{}.url", self.label))
    }

    /// Path of the store page snapshot.
    #[must_use]
    pub fn store_snapshot(&self) -> PathBuf {
        self.dir.join(format!("{}.html", self.label))
    }

    /// Path of an asset's local copy.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] if the asset id cannot be used as a directory.
    pub fn asset_path(&self, asset: &Asset) -> Result<PathBuf, LayoutError> {
        Ok(self.dir.join(asset_relative_path(asset)?))
    }
}

/// Product directories for a whole library, with collisions resolved.
#[derive(Debug, Clone, Default)]
pub struct LayoutPlan {
    products: HashMap<String, ProductLayout>,
}

impl LayoutPlan {
    /// Assigns a directory to every distinct product id, honouring the
    /// ownership markers already present under `root`.
    #[must_use]
    pub fn for_products(products: &[Product], root: &Path) -> Self {
        Self::with_owners(products, |dir| read_owner(&root.join(dir)))
    }

    /// Assigns a directory to every distinct product id.
    ///
    /// Creator and product names that cannot be sanitized fall back to their
    /// ids. Distinct products whose directories compare equal
    /// case-insensitively form a group. `owner_of` reports the product id
    /// recorded in an existing directory:
    ///
    /// - the member that already owns its plain directory keeps it;
    /// - if the plain directory belongs to a product outside the group, every
    ///   member is suffixed;
    /// - otherwise the smallest id takes the plain name.
    ///
    /// Suffixed members get ` [<id>]`. A product's directory therefore only
    /// moves when its own name changes.
    #[must_use]
    pub fn with_owners(
        products: &[Product],
        owner_of: impl Fn(&Path) -> Option<String>,
    ) -> Self {
        let mut groups: HashMap<String, Vec<(String, String, String)>> = HashMap::new();
        for product in products {
            let creator = sanitize_segment(&product.creator.name)
                .or_else(|_| sanitize_segment(&product.creator.id))
                .unwrap_or_else(|_| "unknown-creator".to_string());
            let label = sanitize_segment(&product.name)
                .or_else(|_| sanitize_segment(&product.id))
                .unwrap_or_else(|_| "unknown-product".to_string());
            let key = format!("{}/{}", creator.to_lowercase(), label.to_lowercase());
            let group = groups.entry(key).or_default();
            if !group.iter().any(|(id, _, _)| *id == product.id) {
                group.push((product.id.clone(), creator, label));
            }
        }

        let mut plan = HashMap::new();
        for mut group in groups.into_values() {
            group.sort_by(|a, b| a.0.cmp(&b.0));
            let owners: Vec<Option<String>> = group
                .iter()
                .map(|(_, creator, label)| owner_of(&Path::new(creator).join(label)))
                .collect();
            let plain = group
                .iter()
                .zip(&owners)
                .position(|((id, _, _), owner)| owner.as_deref() == Some(id.as_str()))
                .or_else(|| {
                    let taken = owners
                        .iter()
                        .flatten()
                        .any(|owner| !group.iter().any(|(id, _, _)| id == owner));
                    (!taken).then_some(0)
                });

            for (position, (id, creator, label)) in group.into_iter().enumerate() {
                let label = if plain == Some(position) {
                    label
                } else {
                    let suffix = sanitize_segment(&id).unwrap_or_else(|_| position.to_string());
                    with_suffix(label, &suffix)
                };
                let dir = PathBuf::from(creator).join(&label);
                plan.insert(id, ProductLayout { dir, label });
            }
        }
        Self { products: plan }
    }

    /// Layout of a product id, if the product was part of the plan.
    #[must_use]
    pub fn product(&self, product_id: &str) -> Option<&ProductLayout> {
        self.products.get(product_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::model::{AssetKind, AssetScope, Creator};

    fn asset(id: &str, name: &str) -> Asset {
        Asset {
            id: id.to_string(),
            kind: AssetKind::File,
            file_name: name.to_string(),
            declared_size: Some(1),
            url: None,
            scope: AssetScope::InScope,
        }
    }

    fn product(id: &str, name: &str, creator: &str) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            creator: Creator {
                id: format!("c-{creator}"),
                name: creator.to_string(),
                profile_url: None,
            },
            page_url: String::new(),
            images: Vec::new(),
            metadata: Value::Null,
        }
    }

    fn no_owner(_: &Path) -> Option<String> {
        None
    }

    #[test]
    fn test_resolve_builds_id_indexed_path() {
        let path = resolve("Acme", "P1", &asset("7", "model.fbx")).unwrap();
        assert_eq!(path, PathBuf::from("Acme").join("P1").join("7").join("model.fbx"));
    }

    #[test]
    fn test_resolve_same_name_distinct_ids_do_not_collide() {
        let a = resolve("Acme", "P1", &asset("7", "tex.png")).unwrap();
        let b = resolve("Acme", "P1", &asset("9", "tex.png")).unwrap();
        assert_ne!(a, b);
        assert!(a.ends_with(Path::new("7").join("tex.png")));
        assert!(b.ends_with(Path::new("9").join("tex.png")));
    }

    #[test]
    fn test_resolve_is_stable() {
        let first = resolve("Ac/me", "Pack: One", &asset("7", "a?.zip")).unwrap();
        let second = resolve("Ac/me", "Pack: One", &asset("7", "a?.zip")).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, PathBuf::from("Ac_me").join("Pack_ One").join("7").join("a_.zip"));
    }

    #[test]
    fn test_resolve_unusable_file_name_falls_back_to_id() {
        let path = asset_relative_path(&asset("7", "...")).unwrap();
        assert_eq!(path, PathBuf::from("7").join("7"));
    }

    #[test]
    fn test_resolve_unusable_creator_is_error() {
        assert!(matches!(
            resolve("..", "P1", &asset("7", "a.zip")),
            Err(LayoutError::Unrepresentable { .. })
        ));
    }

    #[test]
    fn test_product_layout_metadata_paths() {
        let plan = LayoutPlan::with_owners(&[product("P1", "Brush Pack", "Acme")], no_owner);
        let layout = plan.product("P1").unwrap();
        assert_eq!(layout.dir, PathBuf::from("Acme").join("Brush Pack"));
        assert_eq!(layout.shortcut(), layout.dir.join("Brush Pack.url"));
        assert_eq!(layout.store_snapshot(), layout.dir.join("Brush Pack.html"));
        assert_eq!(layout.raw_json(), layout.dir.join(PRODUCT_JSON));
    }

    #[test]
    fn test_plan_repeated_purchase_shares_directory() {
        let plan = LayoutPlan::with_owners(
            &[
                product("P1", "Brush Pack", "Acme"),
                product("P1", "Brush Pack", "Acme"),
            ],
            no_owner,
        );
        assert_eq!(plan.product("P1").unwrap().label, "Brush Pack");
    }

    #[test]
    fn test_plan_disambiguates_colliding_products() {
        let plan = LayoutPlan::with_owners(
            &[
                product("zz", "Brush Pack", "Acme"),
                product("aa", "brush pack", "Acme"),
            ],
            no_owner,
        );
        assert_eq!(plan.product("aa").unwrap().label, "brush pack");
        assert_eq!(plan.product("zz").unwrap().label, "Brush Pack [zz]");
    }

    #[test]
    fn test_plan_falls_back_to_ids_for_unusable_names() {
        let plan = LayoutPlan::with_owners(&[product("P9", "???", "..")], no_owner);
        let layout = plan.product("P9").unwrap();
        // creator id "c-.." loses its trailing dots
        assert_eq!(layout.dir, PathBuf::from("c-").join("___"));
    }

    #[test]
    fn test_resolve_hidden_file_name_stays_visible() {
        let path = asset_relative_path(&asset("7", ".env.sample")).unwrap();
        assert_eq!(path, PathBuf::from("7").join("_env.sample"));
    }

    #[test]
    fn test_plan_keeps_owned_directory_when_colliding_product_arrives() {
        let temp = tempfile::TempDir::new().unwrap();
        let first = LayoutPlan::for_products(&[product("m", "Brush Pack", "Acme")], temp.path());
        let owned = first.product("m").unwrap().clone();
        assert_eq!(owned.dir, PathBuf::from("Acme").join("Brush Pack"));
        fs::create_dir_all(temp.path().join(&owned.dir)).unwrap();
        fs::write(temp.path().join(owned.id_marker()), "m\n").unwrap();

        let second = LayoutPlan::for_products(
            &[product("m", "Brush Pack", "Acme"), product("b", "brush pack", "Acme")],
            temp.path(),
        );

        assert_eq!(second.product("m").unwrap(), &owned);
        assert_eq!(second.product("b").unwrap().label, "brush pack [b]");
    }

    #[test]
    fn test_plan_does_not_take_directory_owned_by_other_product() {
        let taken = Path::new("Acme").join("Brush Pack");
        let owner = |dir: &Path| (dir == taken.as_path()).then(|| "old".to_string());
        let plan = LayoutPlan::with_owners(&[product("new", "Brush Pack", "Acme")], owner);
        assert_eq!(plan.product("new").unwrap().label, "Brush Pack [new]");
    }

    #[test]
    fn test_plan_suffix_stays_within_segment_limit() {
        let long = "ブ".repeat(100);
        let plan = LayoutPlan::with_owners(
            &[product("aa", &long, "Acme"), product("zz", &long, "Acme")],
            no_owner,
        );
        let suffixed = &plan.product("zz").unwrap().label;
        assert!(suffixed.len() <= MAX_SEGMENT_BYTES);
        assert!(suffixed.ends_with(" [zz]"));
    }
}
