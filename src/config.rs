//! Configuration loading.
//!
//! Values are layered, later layers winning:
//! 1. built-in defaults
//! 2. `config.toml` (explicit `--config` path, or the default location)
//! 3. `GUMROAD_APP_SESSION` / `GUMROAD_GUID` environment variables
//! 4. command-line overrides applied by the binary
//!
//! Everything is validated before the first request is made.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::download::{
    CONNECT_TIMEOUT_SECS, ClientSettings, DEFAULT_MAX_RETRIES, READ_TIMEOUT_SECS, RetryPolicy,
    SessionCookies,
};
use crate::model::SourceSite;
use crate::orchestrator::RunOptions;

/// Directory name under the user config home.
pub const CONFIG_DIR_NAME: &str = "gumroad-mirror";
/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Library page listing every purchase.
pub const DEFAULT_LIBRARY_URL: &str = "https://app.gumroad.com/library";
/// Base that relative download links are joined onto.
pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://app.gumroad.com";
/// Hosts at or below this domain are mirrored.
pub const DEFAULT_SOURCE_DOMAIN: &str = "gumroad.com";

/// Environment variable overriding `app_session`.
pub const APP_SESSION_ENV: &str = "GUMROAD_APP_SESSION";
/// Environment variable overriding `guid`.
pub const GUID_ENV: &str = "GUMROAD_GUID";

const MAX_RETRIES_LIMIT: u32 = 10;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("cannot read config file {path}: {source}")]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its accepted range or format.
    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    InvalidValue {
        /// Key name.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Accepted values.
        expected: &'static str,
    },

    /// No output directory was given in the file or on the command line.
    #[error("no output directory configured; set `output_dir` in the config file or pass --output-dir")]
    MissingOutputDir,
}

impl ConfigError {
    fn invalid(field: &'static str, value: impl ToString, expected: &'static str) -> Self {
        Self::InvalidValue {
            field,
            value: value.to_string(),
            expected,
        }
    }
}

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Root of the mirror.
    pub output_dir: Option<PathBuf>,
    /// Library page URL.
    pub library_url: Option<String>,
    /// Base URL for relative download links.
    pub download_base_url: Option<String>,
    /// Domain whose hosts are considered in scope.
    pub source_domain: Option<String>,
    /// `_gumroad_app_session` cookie value.
    pub app_session: Option<String>,
    /// `_gumroad_guid` cookie value.
    pub guid: Option<String>,
    /// User-Agent override.
    pub user_agent: Option<String>,
    /// Connect timeout in seconds (1..=3600).
    pub connect_timeout_secs: Option<u64>,
    /// Read timeout in seconds (1..=3600).
    pub read_timeout_secs: Option<u64>,
    /// Retries after the first attempt for transient failures (0..=10).
    pub max_retries: Option<u32>,
    /// Write `product.pretty.json` next to `product.json`.
    pub pretty_json: Option<bool>,
    /// Save a snapshot of each product's store page.
    pub snapshot_store_pages: Option<bool>,
}

impl FileConfig {
    /// Parses TOML text. `path` is only used for error messages.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or unknown keys.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text, path)
    }

    /// Replaces cookie values with the ones found through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(app_session) = non_empty(APP_SESSION_ENV) {
            self.app_session = Some(app_session);
        }
        if let Some(guid) = non_empty(GUID_ENV) {
            self.guid = Some(guid);
        }
    }

    /// Validates ranges of numeric keys.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        if let Some(max_retries) = self.max_retries
            && max_retries > MAX_RETRIES_LIMIT
        {
            return Err(ConfigError::invalid("max_retries", max_retries, "range 0..=10"));
        }
        Ok(())
    }
}

fn validate_timeout_secs(field: &'static str, value: Option<u64>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        return Err(ConfigError::invalid(field, value, "range 1..=3600"));
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/gumroad-mirror/config.toml`
/// 2. `$HOME/.config/gumroad-mirror/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// A config file together with where it came from.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Path that was read, if any file was found.
    pub path: Option<PathBuf>,
    /// Parsed values (defaults when no file was found).
    pub config: FileConfig,
}

/// Loads the config file.
///
/// An explicit path must exist. The default location is optional.
/// Environment overrides are applied to the result.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file cannot be read or parsed.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => resolve_default_config_path().filter(|path| path.is_file()),
    };

    let mut config = match &path {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    config.apply_env_overrides(|name| env::var(name).ok());
    Ok(LoadedConfig { path, config })
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of the mirror.
    pub output_dir: PathBuf,
    /// Library page URL.
    pub library_url: Url,
    /// Base URL for relative download links.
    pub download_base_url: Url,
    /// Domain whose hosts are considered in scope.
    pub source_domain: String,
    /// Session cookies.
    pub cookies: SessionCookies,
    /// User-Agent override.
    pub user_agent: Option<String>,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Read timeout.
    pub read_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Write `product.pretty.json`.
    pub pretty_json: bool,
    /// Save store page snapshots.
    pub snapshot_store_pages: bool,
}

impl Settings {
    /// Merges a file config with an optional command-line output directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value is invalid or no output directory
    /// is known.
    pub fn resolve(file: FileConfig, output_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        file.validate()?;

        let output_dir = output_dir
            .or(file.output_dir)
            .filter(|dir| !dir.as_os_str().is_empty())
            .ok_or(ConfigError::MissingOutputDir)?;
        let library_url = parse_url(
            "library_url",
            file.library_url.as_deref().unwrap_or(DEFAULT_LIBRARY_URL),
        )?;
        let download_base_url = parse_url(
            "download_base_url",
            file.download_base_url
                .as_deref()
                .unwrap_or(DEFAULT_DOWNLOAD_BASE_URL),
        )?;
        let source_domain = file
            .source_domain
            .map_or_else(|| DEFAULT_SOURCE_DOMAIN.to_string(), |d| d.trim().to_lowercase());
        if source_domain.is_empty() || source_domain.contains(['/', ':']) {
            return Err(ConfigError::invalid(
                "source_domain",
                source_domain,
                "a bare host name such as gumroad.com",
            ));
        }

        Ok(Self {
            output_dir,
            library_url,
            download_base_url,
            source_domain,
            cookies: SessionCookies {
                app_session: file.app_session,
                guid: file.guid,
            },
            user_agent: file.user_agent,
            connect_timeout: Duration::from_secs(
                file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
            ),
            read_timeout: Duration::from_secs(file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS)),
            max_retries: file.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            pretty_json: file.pretty_json.unwrap_or(true),
            snapshot_store_pages: file.snapshot_store_pages.unwrap_or(true),
        })
    }

    /// HTTP client settings. Cookies are sent to the library and download hosts.
    #[must_use]
    pub fn client_settings(&self) -> ClientSettings {
        let mut cookie_urls = vec![self.library_url.clone()];
        if self.download_base_url.origin() != self.library_url.origin() {
            cookie_urls.push(self.download_base_url.clone());
        }
        ClientSettings {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            user_agent: self.user_agent.clone(),
            cookies: self.cookies.clone(),
            cookie_urls,
            retry: RetryPolicy::with_max_retries(self.max_retries),
        }
    }

    /// Site description used by the entity mapper.
    #[must_use]
    pub fn source_site(&self) -> SourceSite {
        SourceSite::new(self.download_base_url.clone(), self.source_domain.clone())
    }

    /// Options for the run orchestrator.
    #[must_use]
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            output_dir: self.output_dir.clone(),
            library_url: self.library_url.to_string(),
            pretty_json: self.pretty_json,
            snapshot_store_pages: self.snapshot_store_pages,
        }
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(url),
        _ => Err(ConfigError::invalid(field, value, "an absolute http(s) URL")),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<FileConfig, ConfigError> {
        FileConfig::parse(text, Path::new("config.toml"))
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse(
            r#"
            output_dir = "/data/gumroad"
            library_url = "https://app.gumroad.com/library"
            app_session = "abc"
            guid = "def"
            connect_timeout_secs = 10
            read_timeout_secs = 600
            max_retries = 2
            pretty_json = false
            snapshot_store_pages = false
            "#,
        )
        .unwrap();

        assert_eq!(config.output_dir, Some(PathBuf::from("/data/gumroad")));
        assert_eq!(config.app_session.as_deref(), Some("abc"));
        assert_eq!(config.max_retries, Some(2));
        assert_eq!(config.pretty_json, Some(false));
    }

    #[test]
    fn test_parse_rejects_unknown_key() {
        let result = parse("concurrency = 4\n");
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let config = FileConfig {
            read_timeout_secs: Some(0),
            ..FileConfig::default()
        };
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("read_timeout_secs"), "{error}");

        let config = FileConfig {
            max_retries: Some(11),
            ..FileConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field: "max_retries", .. })
        ));
    }

    #[test]
    fn test_env_overrides_replace_cookies() {
        let mut config = FileConfig {
            app_session: Some("from-file".to_string()),
            guid: Some("guid-file".to_string()),
            ..FileConfig::default()
        };
        config.apply_env_overrides(|name| match name {
            APP_SESSION_ENV => Some("from-env".to_string()),
            GUID_ENV => Some("  ".to_string()),
            _ => None,
        });

        assert_eq!(config.app_session.as_deref(), Some("from-env"));
        assert_eq!(config.guid.as_deref(), Some("guid-file"));
    }

    #[test]
    fn test_settings_defaults() {
        let file = FileConfig {
            output_dir: Some(PathBuf::from("/mirror")),
            ..FileConfig::default()
        };
        let settings = Settings::resolve(file, None).unwrap();

        assert_eq!(settings.library_url.as_str(), DEFAULT_LIBRARY_URL);
        assert_eq!(settings.source_domain, "gumroad.com");
        assert_eq!(settings.read_timeout, Duration::from_secs(READ_TIMEOUT_SECS));
        assert_eq!(settings.max_retries, DEFAULT_MAX_RETRIES);
        assert!(settings.pretty_json);
        assert!(settings.snapshot_store_pages);
        assert_eq!(settings.client_settings().cookie_urls.len(), 1);
    }

    #[test]
    fn test_settings_cli_output_dir_wins() {
        let file = FileConfig {
            output_dir: Some(PathBuf::from("/from-file")),
            ..FileConfig::default()
        };
        let settings = Settings::resolve(file, Some(PathBuf::from("/from-cli"))).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("/from-cli"));
    }

    #[test]
    fn test_settings_requires_output_dir() {
        let result = Settings::resolve(FileConfig::default(), None);
        assert!(matches!(result, Err(ConfigError::MissingOutputDir)));
    }

    #[test]
    fn test_settings_rejects_bad_url_and_domain() {
        let file = FileConfig {
            output_dir: Some(PathBuf::from("/mirror")),
            library_url: Some("ftp://example.com/library".to_string()),
            ..FileConfig::default()
        };
        assert!(matches!(
            Settings::resolve(file, None),
            Err(ConfigError::InvalidValue { field: "library_url", .. })
        ));

        let file = FileConfig {
            output_dir: Some(PathBuf::from("/mirror")),
            source_domain: Some("https://gumroad.com".to_string()),
            ..FileConfig::default()
        };
        assert!(matches!(
            Settings::resolve(file, None),
            Err(ConfigError::InvalidValue { field: "source_domain", .. })
        ));
    }

    #[test]
    fn test_load_config_explicit_missing_file_is_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let result = load_config(Some(&temp.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_config_explicit_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "output_dir = \"out\"\nmax_retries = 0\n").unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.path, Some(path));
        assert_eq!(loaded.config.output_dir, Some(PathBuf::from("out")));
        assert_eq!(loaded.config.max_retries, Some(0));
    }
}
