//! Statistics backend core: object-name expansion, token codec, per-request
//! dedup coordinator, and the remote counter-store boundary.

pub mod codec;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod pattern;
pub mod runtime;
pub mod store;

pub use config::{ClassifierOpts, PerUserOpt, StatfileOpts};
pub use context::BackendContext;
pub use coordinator::{
    create_runtime, finalize, finalize_learn, get_stat, learn_tokens, submit_tokens,
};
pub use error::{BackendError, ConfigError, ExpansionError};
pub use pattern::SERVICE_MARKER;
pub use runtime::{ClassId, ResultSet, Runtime, StatSnapshot, Token, TokenSet};
pub use store::{ClassifyReply, RemoteStore, StatCall, StoreError, StoreInit};
