//! HTTP collaborator: page fetches and streamed asset downloads.
//!
//! The rest of the crate only sees the [`Fetcher`] trait, so the run
//! orchestrator can be driven by the real [`HttpClient`] or by a test double.
//!
//! # Example
//!
//! ```no_run
//! use mirror_core::download::{ClientSettings, Fetcher, HttpClient};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new(ClientSettings::default())?;
//! let page = client.fetch("https://app.gumroad.com/library").await?;
//! println!("{} bytes", page.bytes.len());
//! client
//!     .download_to_file("https://app.gumroad.com/r/abc", Path::new("./out/model.fbx"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
mod retry;

use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use client::{ClientSettings, HttpClient, SessionCookies, partial_path};
pub use constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
pub use error::FetchError;
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};

/// A fully read response body.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL the body was finally served from, after redirects.
    pub final_url: String,
    /// Response body.
    pub bytes: Vec<u8>,
    /// `Content-Length` announced by the server, when present.
    pub content_length: Option<u64>,
}

impl FetchedPage {
    /// Body decoded as UTF-8, with invalid sequences replaced.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Result of a completed download.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    /// Final path of the file.
    pub path: PathBuf,
    /// Number of bytes written.
    pub bytes_written: u64,
    /// `Content-Length` announced by the server, when present.
    pub content_length: Option<u64>,
}

/// Source of remote bytes.
///
/// Implementations must be safe to share across tasks.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches a URL into memory.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on network failure or a non-success status.
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;

    /// Downloads a URL to `destination`, replacing any existing file only once
    /// the body has been received completely.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on network failure, a non-success status, or a
    /// write failure. The existing file at `destination` is left untouched.
    async fn download_to_file(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<DownloadedFile, FetchError>;
}
