//! Sequences one mirror run.
//!
//! ```text
//! Start -> FetchLibrary -> MapProducts
//!       -> for each product: FetchProductPage -> MapAssets -> Reconcile
//!            -> for each decision: Skip | Fetch
//!            -> WriteMetadata
//!       -> Done
//! ```
//!
//! Only a library page that cannot be fetched or read aborts the run. Every
//! narrower failure is logged, counted in the [`RunSummary`] and recorded as
//! an [`Issue`], and the run moves on. Work is strictly sequential: each
//! fetch and write completes before the next decision is made.

mod error;
mod summary;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::download::{FetchError, Fetcher};
use crate::extract::{EmbeddedJsonExtractor, Extractor, RawDocument};
use crate::layout::{GITIGNORE, LIBRARY_HTML, LIBRARY_JSON, LayoutPlan, ProductLayout};
use crate::local;
use crate::model::{AssetScope, EntityMapper, Product, ProductPage};
use crate::reconcile::{self, Decision, DecisionKind};

pub use error::RunError;
pub use summary::{Issue, IssueKind, RunSummary};

/// Contents of the `.gitignore` written to a fresh output root.
pub const DEFAULT_GITIGNORE: &str = "# in-progress downloads\n*.part\n";

/// Per-run options.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Root of the mirror.
    pub output_dir: PathBuf,
    /// Library page URL.
    pub library_url: String,
    /// Write `product.pretty.json`.
    pub pretty_json: bool,
    /// Save a snapshot of each product's store page.
    pub snapshot_store_pages: bool,
}

/// Drives a run against a [`Fetcher`].
pub struct RunOrchestrator {
    fetcher: Arc<dyn Fetcher>,
    mapper: EntityMapper,
    options: RunOptions,
    library_extractor: Box<dyn Extractor + Send + Sync>,
    product_extractor: Box<dyn Extractor + Send + Sync>,
}

/// Names used in log events and issues for one product.
struct ProductContext<'a> {
    product: &'a Product,
    layout: &'a ProductLayout,
    dir: PathBuf,
}

impl ProductContext<'_> {
    fn issue(&self, asset_id: Option<&str>, kind: IssueKind, detail: impl ToString) -> Issue {
        Issue {
            creator: Some(self.product.creator.name.clone()),
            product: Some(self.product.name.clone()),
            asset_id: asset_id.map(str::to_string),
            kind,
            detail: detail.to_string(),
        }
    }
}

impl RunOrchestrator {
    /// Creates an orchestrator using the embedded JSON extractors.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, mapper: EntityMapper, options: RunOptions) -> Self {
        Self {
            fetcher,
            mapper,
            options,
            library_extractor: Box::new(EmbeddedJsonExtractor::library_page()),
            product_extractor: Box::new(EmbeddedJsonExtractor::product_page()),
        }
    }

    /// Replaces the extractors, for sources that embed their payload differently.
    #[must_use]
    pub fn with_extractors(
        mut self,
        library: Box<dyn Extractor + Send + Sync>,
        product: Box<dyn Extractor + Send + Sync>,
    ) -> Self {
        self.library_extractor = library;
        self.product_extractor = product;
        self
    }

    /// Runs the mirror once.
    ///
    /// # Errors
    ///
    /// Returns [`RunError`] if the output root cannot be created or the
    /// library page cannot be fetched, extracted or mapped.
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let root = &self.options.output_dir;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| RunError::OutputDir {
                path: root.clone(),
                source,
            })?;

        let mut summary = RunSummary::default();

        info!(url = %self.options.library_url, "fetching library");
        let page = self
            .fetcher
            .fetch(&self.options.library_url)
            .await
            .map_err(|source| RunError::LibraryUnavailable { source })?;
        self.write_root_file(&root.join(LIBRARY_HTML), &page.bytes, &mut summary)
            .await;

        let document = self
            .library_extractor
            .extract(&page.text())
            .map_err(RunError::unreadable)?;
        match document.to_pretty_json() {
            Ok(pretty) => {
                self.write_root_file(&root.join(LIBRARY_JSON), pretty.as_bytes(), &mut summary)
                    .await;
            }
            Err(error) => warn!(error = %error, "cannot format library payload"),
        }
        self.ensure_gitignore(&mut summary).await;

        let mapped = self
            .mapper
            .map_library(&document)
            .map_err(RunError::unreadable)?;
        for rejected in mapped.rejected {
            summary.mapping_failures += 1;
            summary.record(Issue {
                creator: None,
                product: None,
                asset_id: None,
                kind: IssueKind::Mapping,
                detail: rejected.to_string(),
            });
        }

        let products = unique_products(mapped.items);
        info!(products = products.len(), "library mapped");

        let plan = LayoutPlan::for_products(&products, root);
        for product in &products {
            let Some(layout) = plan.product(&product.id) else {
                continue;
            };
            let context = ProductContext {
                product,
                layout,
                dir: root.join(&layout.dir),
            };
            self.process_product(&context, &mut summary).await;
        }

        info!(
            processed = summary.products_processed,
            failed = summary.products_failed,
            downloaded = summary.files_downloaded,
            skipped = summary.files_skipped,
            download_failures = summary.files_failed,
            bytes_downloaded = summary.bytes_downloaded,
            out_of_scope = summary.out_of_scope,
            issues = summary.issues.len(),
            "run complete"
        );
        Ok(summary)
    }

    async fn process_product(&self, context: &ProductContext<'_>, summary: &mut RunSummary) {
        let product = context.product;
        info!(creator = %product.creator.name, product = %product.name, "processing product");

        let (document, page) = match self.load_product_page(product).await {
            Ok(loaded) => loaded,
            Err(detail) => {
                warn!(
                    creator = %product.creator.name,
                    product = %product.name,
                    error = %detail,
                    "product page failed; keeping existing files"
                );
                summary.products_failed += 1;
                summary.record(context.issue(None, IssueKind::ProductPage, detail));
                return;
            }
        };

        for rejected in &page.files.rejected {
            warn!(
                creator = %product.creator.name,
                product = %product.name,
                error = %rejected,
                "skipping content item"
            );
            summary.mapping_failures += 1;
            summary.record(context.issue(None, IssueKind::Mapping, rejected));
        }
        if let Some(page_name) = &page.product_name
            && page_name != &product.name
        {
            warn!(
                library_name = %product.name,
                page_name = %page_name,
                "product name differs between library and product page"
            );
        }

        let local_state = match local::inspect(&context.dir) {
            Ok(state) => state,
            Err(error) => {
                warn!(error = %error, "cannot inspect product directory");
                summary.products_failed += 1;
                summary.record(context.issue(None, IssueKind::Write, &error));
                return;
            }
        };

        let assets = page.files.items.iter().chain(product.images.iter());
        let mut candidates = Vec::new();
        for asset in assets {
            if asset.is_in_scope() {
                candidates.push(asset.clone());
            } else {
                let reason = match &asset.scope {
                    AssetScope::OutOfScope { reason } => reason.clone(),
                    AssetScope::InScope => "no download URL".to_string(),
                };
                info!(
                    creator = %product.creator.name,
                    product = %product.name,
                    asset_id = %asset.id,
                    decision = "out-of-scope",
                    reason = %reason,
                    "asset excluded"
                );
                summary.out_of_scope += 1;
                let detail = match &asset.url {
                    Some(url) => format!("{} ({reason}): {url}", asset.file_name),
                    None => format!("{} ({reason})", asset.file_name),
                };
                summary.record(context.issue(Some(&asset.id), IssueKind::OutOfScope, detail));
            }
        }

        for decision in reconcile::decide(&candidates, &local_state) {
            info!(
                creator = %product.creator.name,
                product = %product.name,
                asset_id = %decision.asset.id,
                decision = %decision.kind,
                reason = %decision.reason,
                "decision"
            );
            match decision.kind {
                DecisionKind::Skip => {
                    summary.files_skipped += 1;
                    if let Some(local) = &decision.local {
                        summary.bytes_skipped += local.size;
                        let expected = context.layout.asset_path(&decision.asset).ok();
                        let expected_name = expected
                            .as_deref()
                            .and_then(Path::file_name)
                            .map(|name| name.to_string_lossy());
                        if expected_name.is_some_and(|name| name != local.file_name.as_str()) {
                            info!(
                                asset_id = %decision.asset.id,
                                local_name = %local.file_name,
                                remote_name = %decision.asset.file_name,
                                "asset renamed upstream; keeping local copy"
                            );
                        }
                    }
                }
                DecisionKind::FetchNew | DecisionKind::FetchReplace => {
                    self.fetch_asset(context, &decision, summary).await;
                }
            }
        }

        self.write_product_metadata(context, &document, &page, summary)
            .await;
        summary.products_processed += 1;
    }

    async fn load_product_page(
        &self,
        product: &Product,
    ) -> Result<(RawDocument, ProductPage), String> {
        let url = self
            .mapper
            .site()
            .resolve(&product.page_url)
            .ok_or_else(|| format!("invalid product page URL {}", product.page_url))?;
        let page = self
            .fetcher
            .fetch(url.as_str())
            .await
            .map_err(|e| e.to_string())?;
        let document = self
            .product_extractor
            .extract(&page.text())
            .map_err(|e| e.to_string())?;
        let mapped = self
            .mapper
            .map_product_page(&document)
            .map_err(|e| e.to_string())?;
        debug!(
            files = mapped.files.items.len(),
            skipped_non_files = mapped.skipped_non_files,
            "product page mapped"
        );
        Ok((document, mapped))
    }

    async fn fetch_asset(
        &self,
        context: &ProductContext<'_>,
        decision: &Decision,
        summary: &mut RunSummary,
    ) {
        let asset = &decision.asset;
        let Some(url) = &asset.url else {
            return;
        };
        let destination = match context.layout.asset_path(asset) {
            Ok(relative) => self.options.output_dir.join(relative),
            Err(error) => {
                warn!(asset_id = %asset.id, error = %error, "no legal path for asset");
                summary.files_failed += 1;
                summary.record(context.issue(Some(&asset.id), IssueKind::Layout, error));
                return;
            }
        };

        match self.fetcher.download_to_file(url.as_str(), &destination).await {
            Ok(downloaded) => {
                summary.files_downloaded += 1;
                summary.bytes_downloaded += downloaded.bytes_written;
                if let Some(declared) = asset.declared_size
                    && declared != downloaded.bytes_written
                {
                    warn!(
                        asset_id = %asset.id,
                        declared,
                        received = downloaded.bytes_written,
                        "downloaded size differs from declared size"
                    );
                }
                if let Some(stale) = &decision.local
                    && stale.path != destination
                {
                    remove_stale_copy(&stale.path).await;
                }
            }
            Err(error) => {
                warn!(
                    creator = %context.product.creator.name,
                    product = %context.product.name,
                    asset_id = %asset.id,
                    error = %error,
                    "download failed"
                );
                summary.files_failed += 1;
                summary.record(context.issue(Some(&asset.id), IssueKind::Download, &error));
            }
        }
    }

    async fn write_product_metadata(
        &self,
        context: &ProductContext<'_>,
        document: &RawDocument,
        page: &ProductPage,
        summary: &mut RunSummary,
    ) {
        let root = &self.options.output_dir;
        let layout = context.layout;
        if let Err(error) = tokio::fs::create_dir_all(&context.dir).await {
            summary.record(context.issue(None, IssueKind::Write, error));
            return;
        }

        let mut files: Vec<(PathBuf, Vec<u8>)> = vec![
            (layout.id_marker(), format!("{}\n", context.product.id).into_bytes()),
            (layout.raw_json(), document.raw_text.clone().into_bytes()),
        ];
        if self.options.pretty_json {
            match document.to_pretty_json() {
                Ok(pretty) => files.push((layout.pretty_json(), pretty.into_bytes())),
                Err(error) => warn!(error = %error, "cannot format product payload"),
            }
        }
        if let Some(store_url) = &page.store_url {
            let shortcut = format!("[InternetShortcut]\nURL={store_url}\n");
            files.push((layout.shortcut(), shortcut.into_bytes()));
            if self.options.snapshot_store_pages
                && let Some(snapshot) = self.fetch_store_page(store_url).await
            {
                files.push((layout.store_snapshot(), snapshot));
            }
        }

        for (relative, contents) in files {
            let path = root.join(relative);
            if let Err(error) = tokio::fs::write(&path, &contents).await {
                warn!(path = %path.display(), error = %error, "cannot write metadata file");
                summary.record(context.issue(
                    None,
                    IssueKind::Write,
                    format!("{}: {error}", path.display()),
                ));
            }
        }
    }

    async fn fetch_store_page(&self, store_url: &str) -> Option<Vec<u8>> {
        match self.fetcher.fetch(store_url).await {
            Ok(page) => Some(page.bytes),
            Err(FetchError::HttpStatus { status: 404, .. }) => {
                info!(url = %store_url, "store page no longer exists");
                None
            }
            Err(error) => {
                warn!(url = %store_url, error = %error, "cannot snapshot store page");
                None
            }
        }
    }

    async fn write_root_file(&self, path: &Path, contents: &[u8], summary: &mut RunSummary) {
        if let Err(error) = tokio::fs::write(path, contents).await {
            warn!(path = %path.display(), error = %error, "cannot write file");
            summary.record(Issue {
                creator: None,
                product: None,
                asset_id: None,
                kind: IssueKind::Write,
                detail: format!("{}: {error}", path.display()),
            });
        }
    }

    async fn ensure_gitignore(&self, summary: &mut RunSummary) {
        let path = self.options.output_dir.join(GITIGNORE);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = %path.display(), "keeping existing .gitignore");
            return;
        }
        self.write_root_file(&path, DEFAULT_GITIGNORE.as_bytes(), summary)
            .await;
    }
}

/// Drops repeated purchases of the same product, keeping the first.
fn unique_products(products: Vec<Product>) -> Vec<Product> {
    let mut seen = HashSet::new();
    products
        .into_iter()
        .filter(|product| {
            let first = seen.insert(product.id.clone());
            if !first {
                debug!(product = %product.name, id = %product.id, "repeated purchase");
            }
            first
        })
        .collect()
}

async fn remove_stale_copy(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(path = %path.display(), "removed copy stored under the previous name"),
        Err(error) => warn!(path = %path.display(), error = %error, "cannot remove stale copy"),
    }
}
