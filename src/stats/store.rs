//! Remote counter-store capability.
//!
//! The backend never talks to a concrete transport; it is handed a
//! [`RemoteStore`] per statfile at init time and submits serialized token
//! payloads through it. A classify call answers for *both* classes at once,
//! which is what makes the one-call-per-object-name invariant worth having.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use super::config::{ClassifierOpts, StatfileOpts};

/// Errors surfaced by the remote store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote call failed: {0}")]
    Call(String),
    /// The store answered but refused the request (negative/false result).
    #[error("remote store rejected the request: {0}")]
    Rejected(String),
    #[error("store initialization failed: {0}")]
    Init(String),
}

/// One outbound classify or learn call.
#[derive(Debug, Clone)]
pub struct StatCall {
    /// Fully expanded object name addressing the counter group.
    pub object_name: String,
    /// Identifier of the caller's token sequence, echoed back by the store.
    pub token_set_id: u32,
    /// Class flag of the issuing runtime.
    pub is_spam: bool,
    /// Serialized token payload (see [`super::codec`]).
    pub payload: Vec<u8>,
}

/// Successful classify reply: learned counts and per-token values for both
/// classes, indices addressing the submitted token sequence.
#[derive(Debug, Clone, Default)]
pub struct ClassifyReply {
    pub learned_ham: u64,
    pub learned_spam: u64,
    pub ham: Vec<(usize, f64)>,
    pub spam: Vec<(usize, f64)>,
}

/// Abstract remote counter store, one instance per statfile backend.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch counters for both classes of `call.object_name`.
    async fn classify(&self, call: StatCall) -> Result<ClassifyReply, StoreError>;

    /// Update counters for `call.object_name` with the submitted tokens.
    async fn learn(&self, call: StatCall) -> Result<(), StoreError>;
}

/// Factory producing the classify/learn capability for one statfile.
///
/// Models the external initialization procedure: it sees the full classifier
/// and statfile options and may fail, which disables only that statfile.
pub trait StoreInit: Send + Sync {
    fn init_classifier(
        &self,
        classifier: &ClassifierOpts,
        statfile: &StatfileOpts,
    ) -> Result<Arc<dyn RemoteStore>, StoreError>;

    /// Compile the user-extraction hook named by the `per_user` option.
    ///
    /// Factories without scripting support keep the default, which makes a
    /// hook-valued option degrade to per-user off at init time.
    fn user_extractor(
        &self,
        source: &str,
    ) -> Result<Arc<dyn crate::task::UserExtractor>, StoreError> {
        Err(StoreError::Init(format!(
            "user extraction hooks are not supported by this store: {source:?}"
        )))
    }
}
