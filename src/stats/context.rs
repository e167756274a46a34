//! Immutable per-statfile backend context.
//!
//! Built once at configuration load, shared read-only by every concurrent
//! request, dropped on teardown or reload (which releases the store
//! capability and any retained hook). Nothing here is mutated after
//! [`BackendContext::init`] returns.

use std::sync::Arc;

use crate::task::{Task, UserExtractor, resolve_stat_user};

use super::config::{
    ClassifierOpts, DEFAULT_OBJECT_PATTERN, DEFAULT_USERS_OBJECT_PATTERN, PerUserOpt, StatfileOpts,
};
use super::error::{ConfigError, ExpansionError};
use super::pattern::{ExpandSources, expand_object};
use super::store::{RemoteStore, StoreInit};

pub struct BackendContext {
    pattern: String,
    per_user: bool,
    user_hook: Option<Arc<dyn UserExtractor>>,
    store_tokens: bool,
    signatures: bool,
    expiry: u64,
    max_users: u32,
    stcf: Arc<StatfileOpts>,
    store: Arc<dyn RemoteStore>,
}

impl BackendContext {
    /// Build the backend for one statfile from raw host configuration.
    ///
    /// A failure here disables this statfile's backend only; sibling
    /// statfiles and other backends are unaffected.
    pub fn init(
        store_init: &dyn StoreInit,
        classifier_opts: &serde_json::Value,
        statfile_opts: &serde_json::Value,
    ) -> Result<Arc<Self>, ConfigError> {
        let classifier = ClassifierOpts::from_value(classifier_opts)?;
        let stcf = Arc::new(StatfileOpts::from_value(statfile_opts)?);

        Self::from_opts(store_init, classifier, stcf)
    }

    /// Same as [`BackendContext::init`] but for already-parsed options.
    pub fn from_opts(
        store_init: &dyn StoreInit,
        classifier: ClassifierOpts,
        stcf: Arc<StatfileOpts>,
    ) -> Result<Arc<Self>, ConfigError> {
        let (per_user, user_hook) = match &classifier.per_user {
            None => (false, None),
            Some(PerUserOpt::Enabled(enabled)) => (*enabled, None),
            Some(PerUserOpt::Hook(source)) => match store_init.user_extractor(source) {
                Ok(hook) => (true, Some(hook)),
                Err(err) => {
                    // Per-user stays off without a working hook.
                    log::error!(
                        "cannot set up user extraction hook for {}: {}",
                        stcf.symbol,
                        err
                    );
                    (false, None)
                }
            },
        };

        let pattern = match &classifier.prefix {
            Some(prefix) => prefix.clone(),
            None if per_user => DEFAULT_USERS_OBJECT_PATTERN.to_string(),
            None => DEFAULT_OBJECT_PATTERN.to_string(),
        };

        let store =
            store_init
                .init_classifier(&classifier, &stcf)
                .map_err(|source| ConfigError::StoreInit {
                    symbol: stcf.symbol.clone(),
                    source,
                })?;

        log::debug!(
            "initialized stat backend for {}: pattern {:?}, per_user {}",
            stcf.symbol,
            pattern,
            per_user
        );

        Ok(Arc::new(Self {
            pattern,
            per_user,
            user_hook,
            store_tokens: classifier.store_tokens,
            signatures: classifier.signatures,
            expiry: classifier.expiry,
            max_users: classifier.max_users,
            stcf,
            store,
        }))
    }

    /// Expand the configured object-name pattern for this request.
    ///
    /// Resolves (and caches) the per-user string first when per-user mode is
    /// on, then runs both expansion passes against the same sources.
    pub fn expand_object_name(&self, task: &Task) -> Result<String, ExpansionError> {
        let stat_user = if self.per_user {
            resolve_stat_user(task, self.user_hook.as_ref())
        } else {
            None
        };

        let src = ExpandSources {
            auth_user: task.auth_user(),
            recipient: stat_user
                .as_deref()
                .map(String::as_str)
                .or_else(|| task.principal_recipient()),
            label: self.stcf.label.as_deref(),
        };

        expand_object(&self.pattern, &src).ok_or(ExpansionError {
            symbol: self.stcf.symbol.clone(),
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn per_user(&self) -> bool {
        self.per_user
    }

    pub fn store_tokens(&self) -> bool {
        self.store_tokens
    }

    pub fn signatures(&self) -> bool {
        self.signatures
    }

    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    pub fn max_users(&self) -> u32 {
        self.max_users
    }

    /// Statfile this backend was built for.
    pub fn statfile(&self) -> &Arc<StatfileOpts> {
        &self.stcf
    }

    pub(crate) fn store(&self) -> &Arc<dyn RemoteStore> {
        &self.store
    }

    /// This backend keeps incremental learned counters server-side.
    pub fn is_incrementing(&self) -> bool {
        true
    }
}
