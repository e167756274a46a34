//! Per-request runtime state for one (object name, class) counter group.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use super::config::StatfileOpts;
use super::context::BackendContext;

/// Message class a statfile accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassId {
    Ham,
    Spam,
}

impl ClassId {
    pub fn from_is_spam(is_spam: bool) -> Self {
        if is_spam { ClassId::Spam } else { ClassId::Ham }
    }

    pub fn opposite(self) -> Self {
        match self {
            ClassId::Ham => ClassId::Spam,
            ClassId::Spam => ClassId::Ham,
        }
    }

    pub fn is_spam(self) -> bool {
        matches!(self, ClassId::Spam)
    }

    /// Slot position inside [`Token::values`].
    pub fn index(self) -> usize {
        match self {
            ClassId::Ham => 0,
            ClassId::Spam => 1,
        }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassId::Ham => write!(f, "ham"),
            ClassId::Spam => write!(f, "spam"),
        }
    }
}

/// One feature extracted from a message: a 64-bit content identifier plus one
/// value slot per class, filled in from store replies.
#[derive(Debug, Clone)]
pub struct Token {
    pub data: u64,
    pub values: [f64; 2],
}

impl Token {
    pub fn new(data: u64) -> Self {
        Self {
            data,
            values: [0.0; 2],
        }
    }

    pub fn value(&self, class: ClassId) -> f64 {
        self.values[class.index()]
    }
}

/// Ordered (token index, value) pairs from one completed store call.
pub type ResultSet = Vec<(usize, f64)>;

/// Caller-owned token sequence, shared with the active runtime for the
/// duration of the remote call.
pub type TokenSet = Arc<Mutex<Vec<Token>>>;

/// Aggregate backend statistics.
///
/// Extension point: the extraction pass that fills this does not exist yet,
/// see [`super::coordinator::get_stat`].
#[derive(Debug, Clone, Default)]
pub struct StatSnapshot {
    pub total_learns: u64,
    pub users: u32,
}

struct RuntimeState {
    stcf: Arc<StatfileOpts>,
    learned: u64,
    results: Option<ResultSet>,
    tokens: Option<TokenSet>,
    token_set_id: u32,
}

/// Request-scoped handle coordinating one (object name, class) counter group.
///
/// At most one exists per (object name, class) per request; of a same-name
/// pair exactly one is *active* and issues the remote call, the other is
/// populated as a side effect of the active one's completion. Runtimes are
/// owned by the request arena and dropped with it.
pub struct Runtime {
    object_name: String,
    class: ClassId,
    active: bool,
    ctx: Arc<BackendContext>,
    state: Mutex<RuntimeState>,
}

impl Runtime {
    pub(crate) fn new(
        ctx: Arc<BackendContext>,
        stcf: Arc<StatfileOpts>,
        class: ClassId,
        object_name: String,
        active: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            object_name,
            class,
            active,
            ctx,
            state: Mutex::new(RuntimeState {
                stcf,
                learned: 0,
                results: None,
                tokens: None,
                token_set_id: 0,
            }),
        })
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Whether this runtime issues the remote call for its object name.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub(crate) fn context(&self) -> &Arc<BackendContext> {
        &self.ctx
    }

    /// Statfile configuration currently bound to this runtime.
    pub fn statfile(&self) -> Arc<StatfileOpts> {
        self.state.lock().stcf.clone()
    }

    /// Rebind the statfile configuration to the currently requesting caller.
    /// Required whenever a cached runtime is reused.
    pub(crate) fn rebind_statfile(&self, stcf: Arc<StatfileOpts>) {
        self.state.lock().stcf = stcf;
    }

    /// Retain the caller's token sequence for completion-time merging.
    pub(crate) fn attach_tokens(&self, tokens: TokenSet, token_set_id: u32) {
        let mut state = self.state.lock();
        state.tokens = Some(tokens);
        state.token_set_id = token_set_id;
    }

    /// Token sequence retained by [`Runtime::attach_tokens`], when a call has
    /// been issued for this runtime.
    pub fn attached_tokens(&self) -> Option<TokenSet> {
        self.state.lock().tokens.clone()
    }

    pub fn token_set_id(&self) -> u32 {
        self.state.lock().token_set_id
    }

    /// Install the learned count and result set from a completed call.
    pub(crate) fn install_results(&self, learned: u64, results: ResultSet) {
        let mut state = self.state.lock();
        state.learned = learned;
        state.results = Some(results);
    }

    pub fn has_results(&self) -> bool {
        self.state.lock().results.is_some()
    }

    /// Write this runtime's result set into `tokens`, one value per (index,
    /// class) pair.
    ///
    /// A no-op returning `false` when no call has completed for this object
    /// name. An index past the end of the sequence is a store-side defect:
    /// logged and skipped, the remaining pairs still apply.
    pub fn merge_into(&self, tokens: &TokenSet) -> bool {
        let state = self.state.lock();
        let Some(results) = state.results.as_ref() else {
            return false;
        };

        let mut tokens = tokens.lock();
        let len = tokens.len();

        for &(idx, value) in results {
            match tokens.get_mut(idx) {
                Some(tok) => tok.values[self.class.index()] = value,
                None => {
                    log::error!(
                        "result index {} out of bounds for {} ({}): token set has {} entries",
                        idx,
                        self.object_name,
                        self.class,
                        len
                    );
                }
            }
        }

        true
    }

    /// Learned-message count reported by the last completed call.
    pub fn learns(&self) -> u64 {
        self.state.lock().learned
    }

    /// Total learned count for this statfile. The store reports a single
    /// counter per (object name, class), so this reads the same as
    /// [`Runtime::learns`]; both accessors exist because callers ask the two
    /// questions in different places.
    pub fn total_learns(&self) -> u64 {
        self.state.lock().learned
    }

    /// Learned count as seen after one more learn of this class.
    pub fn inc_learns(&self) -> u64 {
        self.state.lock().learned + 1
    }

    /// Learned count as seen after one unlearn of this class.
    pub fn dec_learns(&self) -> u64 {
        self.state.lock().learned.saturating_sub(1)
    }
}
