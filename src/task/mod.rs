//! Per-message request model consumed by the statistics backend.
//!
//! A [`Task`] carries the message attributes the backend reads (authenticated
//! user, recipients) plus the request-scoped [`Arena`] that owns all state
//! created on its behalf. Dropping the task at the end of the request releases
//! everything in one go.

pub mod arena;
pub mod identity;

pub use arena::Arena;
pub use identity::{HookError, STAT_USER_KEY, UserExtractor, resolve_stat_user};

/// One message being checked or learned.
#[derive(Default)]
pub struct Task {
    auth_user: Option<String>,
    envelope_rcpts: Vec<String>,
    header_rcpts: Vec<String>,
    arena: Arena,
}

impl Task {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth_user(mut self, user: impl Into<String>) -> Self {
        self.auth_user = Some(user.into());
        self
    }

    pub fn with_envelope_rcpt(mut self, rcpt: impl Into<String>) -> Self {
        self.envelope_rcpts.push(rcpt.into());
        self
    }

    pub fn with_header_rcpt(mut self, rcpt: impl Into<String>) -> Self {
        self.header_rcpts.push(rcpt.into());
        self
    }

    /// SMTP-authenticated user, when the connection had one.
    pub fn auth_user(&self) -> Option<&str> {
        self.auth_user.as_deref()
    }

    /// Default recipient resolution: the first envelope recipient, falling
    /// back to the first header (To/Cc) recipient.
    pub fn principal_recipient(&self) -> Option<&str> {
        self.envelope_rcpts
            .first()
            .or_else(|| self.header_rcpts.first())
            .map(String::as_str)
    }

    /// Request-scoped storage owned by this task.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }
}
