//! `reqwest`-backed [`Fetcher`] with session cookies and retries.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::cookie::Jar;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use super::{DownloadedFile, FetchError, FetchedPage, Fetcher};
use crate::layout::PARTIAL_SUFFIX;
use crate::user_agent;

/// Name of the session cookie issued after login.
pub const APP_SESSION_COOKIE: &str = "_gumroad_app_session";
/// Name of the browser identifier cookie.
pub const GUID_COOKIE: &str = "_gumroad_guid";

/// Cookie values copied from a logged-in browser session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionCookies {
    /// Value of `_gumroad_app_session`.
    pub app_session: Option<String>,
    /// Value of `_gumroad_guid`.
    pub guid: Option<String>,
}

impl SessionCookies {
    fn pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            (APP_SESSION_COOKIE, self.app_session.as_deref()),
            (GUID_COOKIE, self.guid.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|value| (name, value)))
    }
}

/// Settings for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Maximum time between two reads of a response body.
    pub read_timeout: Duration,
    /// User-Agent override. `None` sends the tool's own User-Agent.
    pub user_agent: Option<String>,
    /// Session cookies.
    pub cookies: SessionCookies,
    /// Origins the session cookies are sent to.
    pub cookie_urls: Vec<Url>,
    /// Retry behaviour for transient failures.
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            user_agent: None,
            cookies: SessionCookies::default(),
            cookie_urls: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }
}

/// HTTP client used for every request of a run.
///
/// Create it once; the underlying connection pool and cookie jar are shared
/// by all clones.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Builds a client from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the TLS backend or proxy settings
    /// cannot be initialised.
    #[instrument(level = "debug", skip(settings), fields(cookies = settings.cookie_urls.len()))]
    pub fn new(settings: ClientSettings) -> Result<Self, FetchError> {
        let jar = Arc::new(Jar::default());
        for url in &settings.cookie_urls {
            for (name, value) in settings.cookies.pairs() {
                jar.add_cookie_str(&format!("{name}={value}; Path=/"), url);
            }
        }
        if settings.cookies.app_session.is_none() {
            debug!("no session cookie configured; only public pages will load");
        }

        let user_agent = settings
            .user_agent
            .clone()
            .unwrap_or_else(user_agent::default_user_agent);
        let client = Client::builder()
            .connect_timeout(settings.connect_timeout)
            .read_timeout(settings.read_timeout)
            .gzip(true)
            .user_agent(user_agent)
            .cookie_provider(jar)
            .build()
            .map_err(|source| FetchError::Client { source })?;

        Ok(Self {
            client,
            retry: settings.retry,
        })
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    async fn with_retries<T, F, Fut>(&self, url: &str, mut operation: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => match self.retry.should_retry(classify_error(&error), attempt) {
                    RetryDecision::Retry {
                        delay,
                        attempt: next,
                    } => {
                        warn!(
                            url,
                            attempt,
                            delay_ms = delay.as_millis(),
                            error = %error,
                            "request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt = next;
                    }
                    RetryDecision::DoNotRetry { reason } => {
                        debug!(url, attempt, %reason, "not retrying");
                        return Err(error);
                    }
                },
            }
        }
    }

    async fn send(&self, url: &str) -> Result<reqwest::Response, FetchError> {
        Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status().as_u16();
        if matches!(status, 401 | 403) {
            return Err(FetchError::auth_required(url, status));
        }
        if !response.status().is_success() {
            return Err(FetchError::http_status(url, status));
        }
        if is_login_redirect(url, response.url()) {
            return Err(FetchError::auth_required(url, status));
        }
        Ok(response)
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let response = self.send(url).await?;
        let final_url = response.url().to_string();
        let content_length = response.content_length();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(url, e))?;
        Ok(FetchedPage {
            final_url,
            bytes: bytes.to_vec(),
            content_length,
        })
    }

    async fn download_once(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<DownloadedFile, FetchError> {
        let response = self.send(url).await?;
        let content_length = response.content_length();

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FetchError::io(parent, e))?;
        }
        let partial = partial_path(destination);
        let mut file = File::create(&partial)
            .await
            .map_err(|e| FetchError::io(partial.clone(), e))?;

        let streamed = stream_to_file(&mut file, response, url, &partial).await;
        drop(file);
        let bytes_written = match streamed {
            Ok(bytes_written) => bytes_written,
            Err(error) => {
                debug!(path = %partial.display(), "removing partial file after error");
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(error);
            }
        };

        if let Err(error) = tokio::fs::rename(&partial, destination).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(FetchError::io(destination, error));
        }

        info!(path = %destination.display(), bytes = bytes_written, "download complete");
        Ok(DownloadedFile {
            path: destination.to_path_buf(),
            bytes_written,
            content_length,
        })
    }
}

#[async_trait]
impl Fetcher for HttpClient {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        self.with_retries(url, move || self.fetch_once(url)).await
    }

    #[instrument(skip(self), fields(url = %url, destination = %destination.display()))]
    async fn download_to_file(
        &self,
        url: &str,
        destination: &Path,
    ) -> Result<DownloadedFile, FetchError> {
        self.with_retries(url, move || self.download_once(url, destination))
            .await
    }
}

/// Temporary path a download streams into before it replaces `destination`.
///
/// The file name starts with a dot so the local state inspector never
/// mistakes an interrupted download for a complete copy.
#[must_use]
pub fn partial_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map_or_else(|| "download".into(), |name| name.to_string_lossy());
    destination.with_file_name(format!(".{name}{PARTIAL_SUFFIX}"))
}

async fn stream_to_file(
    file: &mut File,
    response: reqwest::Response,
    url: &str,
    file_path: &Path,
) -> Result<u64, FetchError> {
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| transport_error(url, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::io(file_path, e))?;
        bytes_written += chunk.len() as u64;
    }

    writer
        .flush()
        .await
        .map_err(|e| FetchError::io(file_path, e))?;
    Ok(bytes_written)
}

fn transport_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(url)
    } else {
        FetchError::network(url, error)
    }
}

/// Expired sessions are answered with a redirect to the login form.
fn is_login_redirect(requested: &str, served: &Url) -> bool {
    served.path().starts_with("/login") && !requested.contains("/login")
}
