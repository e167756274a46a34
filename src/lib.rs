//! Remote counter-store backend for a spam/ham statistical classifier.
//!
//! Each message check needs, for an object name derived from message
//! attributes, the token counters of both classes. This crate provides the
//! pieces that make those lookups correct and cheap: the object-name pattern
//! expansion engine, the token wire codec, the per-request cache that
//! guarantees exactly one remote call per object name, and the merger that
//! writes returned values back into the caller's token sequence. The remote
//! store itself is an injected capability; see [`stats::RemoteStore`].

pub mod stats;
pub mod task;

pub use stats::{BackendContext, BackendError, ClassId, Runtime, Token, TokenSet};
pub use task::Task;

#[cfg_attr(not(test), allow(dead_code))]
pub mod test_support {
    use env_logger::Env;
    use std::sync::Once;

    static LOGGER: Once = Once::new();

    /// Install the process-wide test logger; later calls are no-ops.
    pub fn init_logger() {
        LOGGER.call_once(|| {
            env_logger::Builder::from_env(Env::default().default_filter_or("info"))
                .is_test(true)
                .init();
        });
    }
}
