//! Mirror Core Library
//!
//! Incrementally mirrors a Gumroad purchase library into a local directory
//! tree. Every run re-derives what to do from the remote pages and the files
//! already on disk; the directory tree itself is the only state.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`extract`] - Locates the JSON payload embedded in library and product pages
//! - [`model`] - Typed creators, products and assets mapped from payloads
//! - [`local`] - Reports the local copies already present for a product
//! - [`reconcile`] - Skip / fetch-new / fetch-replace decisions per asset
//! - [`layout`] - Stable, collision-safe paths for everything written
//! - [`download`] - HTTP collaborator with session cookies and retries
//! - [`orchestrator`] - Sequences a run and collects its summary
//! - [`config`] - Config file, environment and defaults

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod extract;
pub mod layout;
pub mod local;
pub mod model;
pub mod orchestrator;
pub mod reconcile;
#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, FileConfig, Settings, load_config};
pub use download::{ClientSettings, FetchError, Fetcher, HttpClient, RetryPolicy};
pub use extract::{EmbeddedJsonExtractor, ExtractionError, Extractor, RawDocument};
pub use layout::{LayoutError, LayoutPlan, resolve};
pub use local::{LocalCopy, LocalState, inspect};
pub use model::{Asset, AssetKind, AssetScope, Creator, EntityMapper, MappingError, Product};
pub use orchestrator::{Issue, IssueKind, RunError, RunOptions, RunOrchestrator, RunSummary};
pub use reconcile::{Decision, DecisionKind, decide};
