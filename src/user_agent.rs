//! User-Agent string sent with every request unless the config overrides it.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/gumroad-mirror";

/// Default User-Agent identifying the tool and its version.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("gumroad-mirror/{version} (library-backup; +{PROJECT_UA_URL})")
}
