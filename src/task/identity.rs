//! Identity resolution for object-name expansion.
//!
//! Per-user statistics need a stable "who is this message for" string. By
//! default that is the principal recipient; deployments with more exotic
//! routing can plug in a [`UserExtractor`] hook instead. Whatever the source,
//! the resolved string is cached in the task arena under [`STAT_USER_KEY`] so
//! it is computed at most once per request and stays available to downstream
//! consumers.

use std::sync::Arc;
use thiserror::Error;

use super::Task;

/// Arena key holding the per-user string resolved for this request.
pub const STAT_USER_KEY: &str = "stat_user";

/// Errors raised by an external user-extraction hook.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("user extraction hook failed: {0}")]
    Extraction(String),
}

/// Pluggable per-request user extraction.
///
/// Implementations are supplied by the host when the classifier's per-user
/// option names a hook instead of a plain boolean.
pub trait UserExtractor: Send + Sync {
    fn extract(&self, task: &Task) -> Result<String, HookError>;
}

/// Resolve and cache the per-user string for `task`.
///
/// The hook takes precedence when present; a hook failure is logged and
/// degrades to "no user string" rather than failing the request. Without a
/// hook the principal recipient is used. Only successful resolutions are
/// cached.
pub fn resolve_stat_user(
    task: &Task,
    hook: Option<&Arc<dyn UserExtractor>>,
) -> Option<Arc<String>> {
    if let Some(cached) = task.arena().get::<String>(STAT_USER_KEY) {
        return Some(cached);
    }

    let resolved = match hook {
        Some(hook) => match hook.extract(task) {
            Ok(user) => Some(user),
            Err(err) => {
                log::warn!("user extraction hook failed: {}", err);
                None
            }
        },
        None => task.principal_recipient().map(str::to_string),
    };

    resolved.map(|user| {
        let user = Arc::new(user);
        task.arena().set(STAT_USER_KEY, user.clone());
        user
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedUser(&'static str);

    impl UserExtractor for FixedUser {
        fn extract(&self, _task: &Task) -> Result<String, HookError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingHook;

    impl UserExtractor for FailingHook {
        fn extract(&self, _task: &Task) -> Result<String, HookError> {
            Err(HookError::Extraction("script blew up".to_string()))
        }
    }

    #[test]
    fn defaults_to_principal_recipient() {
        let task = Task::new().with_envelope_rcpt("alice@example.com");

        let user = resolve_stat_user(&task, None);
        assert_eq!(user.as_deref().map(String::as_str), Some("alice@example.com"));

        // Cached for downstream consumers.
        let cached = task.arena().get::<String>(STAT_USER_KEY);
        assert_eq!(cached.as_deref().map(String::as_str), Some("alice@example.com"));
    }

    #[test]
    fn hook_takes_precedence_over_recipient() {
        let task = Task::new().with_envelope_rcpt("alice@example.com");
        let hook: Arc<dyn UserExtractor> = Arc::new(FixedUser("team-inbox"));

        let user = resolve_stat_user(&task, Some(&hook));
        assert_eq!(user.as_deref().map(String::as_str), Some("team-inbox"));
    }

    #[test]
    fn hook_failure_degrades_to_no_user() {
        let task = Task::new().with_envelope_rcpt("alice@example.com");
        let hook: Arc<dyn UserExtractor> = Arc::new(FailingHook);

        assert!(resolve_stat_user(&task, Some(&hook)).is_none());
        assert!(task.arena().get::<String>(STAT_USER_KEY).is_none());
    }

    #[test]
    fn resolution_happens_once_per_request() {
        let task = Task::new();
        task.arena().set(STAT_USER_KEY, Arc::new("cached@example.com".to_string()));

        let user = resolve_stat_user(&task, None);
        assert_eq!(user.as_deref().map(String::as_str), Some("cached@example.com"));
    }
}
