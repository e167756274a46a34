//! Classifier and statfile option parsing.
//!
//! Options arrive from the host configuration as loosely-typed JSON values
//! and are deserialized once at load time. Anything not recognized here is
//! ignored; anything malformed disables the statfile's backend (and only that
//! backend).

use serde::Deserialize;

use super::error::ConfigError;

/// Object-name pattern used when per-user statistics are disabled.
pub const DEFAULT_OBJECT_PATTERN: &str = "%s%l";
/// Object-name pattern used when per-user statistics are enabled.
pub const DEFAULT_USERS_OBJECT_PATTERN: &str = "%s%l%r";
/// Cap on tracked per-user counter groups.
pub const DEFAULT_MAX_USERS: u32 = 1000;

fn default_max_users() -> u32 {
    DEFAULT_MAX_USERS
}

/// The `per_user` option accepts either a plain switch or the name of an
/// external user-extraction hook.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PerUserOpt {
    Enabled(bool),
    Hook(String),
}

/// Per-classifier backend options.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierOpts {
    #[serde(alias = "users_enabled")]
    pub per_user: Option<PerUserOpt>,
    /// Explicit object-name pattern; a per-user-dependent default applies
    /// when absent.
    pub prefix: Option<String>,
    #[serde(default)]
    pub store_tokens: bool,
    #[serde(default)]
    pub signatures: bool,
    /// Counter expiry in seconds; zero means "never".
    #[serde(default, alias = "expire")]
    pub expiry: u64,
    #[serde(default = "default_max_users")]
    pub max_users: u32,
}

impl Default for ClassifierOpts {
    fn default() -> Self {
        Self {
            per_user: None,
            prefix: None,
            store_tokens: false,
            signatures: false,
            expiry: 0,
            max_users: DEFAULT_MAX_USERS,
        }
    }
}

impl ClassifierOpts {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value.clone())?)
    }
}

/// Per-statfile options: one statfile per class within a classifier.
#[derive(Debug, Clone, Deserialize)]
pub struct StatfileOpts {
    /// Symbol reported by the classifier for this statfile.
    pub symbol: String,
    /// Optional label interpolated into object names via `%l`.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub is_spam: bool,
}

impl StatfileOpts {
    pub fn from_value(value: &serde_json::Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value.clone())?)
    }
}
