//! Per-request runtime cache and deduplication coordinator.
//!
//! Every check needs the counters of *both* classes for one object name, and
//! several symbols may resolve to the same name. The coordinator keeps a
//! per-request table mapping each expanded object name to a two-slot
//! {ham, spam} record, so exactly one remote call goes out per distinct name
//! no matter how many statfiles reference it: the first runtime created for a
//! name is the active caller, its opposite-class sibling is materialized
//! passive and filled from the same reply.
//!
//! The table lives in the task arena, so every runtime is released with the
//! request regardless of whether its call ever completed.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::task::Task;

use super::codec;
use super::config::StatfileOpts;
use super::context::BackendContext;
use super::error::BackendError;
use super::runtime::{ClassId, Runtime, StatSnapshot, TokenSet};
use super::store::{ClassifyReply, StatCall};

const RUNTIME_TABLE_KEY: &str = "stat_runtime_table";

#[derive(Default)]
struct ClassPair {
    ham: Option<Arc<Runtime>>,
    spam: Option<Arc<Runtime>>,
}

impl ClassPair {
    fn get(&self, class: ClassId) -> Option<Arc<Runtime>> {
        match class {
            ClassId::Ham => self.ham.clone(),
            ClassId::Spam => self.spam.clone(),
        }
    }

    fn slot_mut(&mut self, class: ClassId) -> &mut Option<Arc<Runtime>> {
        match class {
            ClassId::Ham => &mut self.ham,
            ClassId::Spam => &mut self.spam,
        }
    }
}

#[derive(Default)]
struct RuntimeTable {
    pairs: Mutex<HashMap<String, ClassPair>>,
}

fn runtime_table(task: &Task) -> Arc<RuntimeTable> {
    task.arena()
        .get_or_insert_with(RUNTIME_TABLE_KEY, RuntimeTable::default)
}

/// Resolve the runtime for `(task, class)` under `ctx`'s object pattern.
///
/// Classification reuses a cached runtime when one exists for the expanded
/// name (rebinding it to the caller's statfile), and guarantees the
/// opposite-class sibling exists so the pair rides on one remote call.
/// Learning always creates a fresh active runtime and never pairs.
pub fn create_runtime(
    task: &Task,
    stcf: Arc<StatfileOpts>,
    class: ClassId,
    learn: bool,
    ctx: &Arc<BackendContext>,
) -> Result<Arc<Runtime>, BackendError> {
    let object_name = ctx.expand_object_name(task).map_err(|err| {
        log::error!(
            "expansion for {} failed: {}",
            if learn { "learning" } else { "classifying" },
            err
        );
        err
    })?;

    let table = runtime_table(task);
    let mut pairs = table.pairs.lock();

    if !learn {
        if let Some(existing) = pairs.get(&object_name).and_then(|pair| pair.get(class)) {
            log::debug!("reusing runtime for {} ({})", object_name, class);
            existing.rebind_statfile(stcf);
            return Ok(existing);
        }
    }

    let rt = Runtime::new(ctx.clone(), stcf.clone(), class, object_name.clone(), true);
    let pair = pairs.entry(object_name.clone()).or_default();
    *pair.slot_mut(class) = Some(rt.clone());

    if !learn {
        let opposite = class.opposite();
        if pair.get(opposite).is_none() {
            log::debug!("registering passive {} runtime for {}", opposite, object_name);
            let sibling = Runtime::new(ctx.clone(), stcf, opposite, object_name, false);
            *pair.slot_mut(opposite) = Some(sibling);
        }
    }

    Ok(rt)
}

/// Serialize `tokens` and issue the classify call for `rt`.
///
/// Passive runtimes return `true` without touching the store: their data
/// arrives with the sibling's reply. Returns `false` when there is nothing to
/// send or the store call failed; in the failure case neither runtime's
/// results are populated and later merges are no-ops.
pub async fn submit_tokens(
    task: &Task,
    tokens: &TokenSet,
    token_set_id: u32,
    rt: &Arc<Runtime>,
) -> Result<bool, BackendError> {
    if tokens.lock().is_empty() {
        return Ok(false);
    }

    if !rt.is_active() {
        log::debug!(
            "skipping remote call for {} ({}): sibling already queried",
            rt.object_name(),
            rt.class()
        );
        return Ok(true);
    }

    let payload = {
        let guard = tokens.lock();
        codec::serialize_tokens(&guard)
    };
    rt.attach_tokens(tokens.clone(), token_set_id);

    let call = StatCall {
        object_name: rt.object_name().to_string(),
        token_set_id,
        is_spam: rt.class().is_spam(),
        payload,
    };

    match rt.context().store().classify(call).await {
        Ok(reply) => complete_classify(task, rt, tokens, reply),
        Err(err) => {
            log::error!(
                "cannot classify {} for {}: {}",
                rt.object_name(),
                rt.statfile().symbol,
                err
            );
            Ok(false)
        }
    }
}

/// Route a successful classify reply to both runtimes of the pair and merge
/// their values into the caller's tokens.
fn complete_classify(
    task: &Task,
    rt: &Arc<Runtime>,
    tokens: &TokenSet,
    reply: ClassifyReply,
) -> Result<bool, BackendError> {
    let sibling_class = rt.class().opposite();
    let table = runtime_table(task);
    let sibling = {
        let pairs = table.pairs.lock();
        pairs
            .get(rt.object_name())
            .and_then(|pair| pair.get(sibling_class))
    };

    let Some(sibling) = sibling else {
        // Pairing guarantees the sibling for classification, so reaching this
        // point means a reply arrived for an unpaired runtime.
        log::error!(
            "internal error: no {} runtime registered for {}",
            sibling_class,
            rt.object_name()
        );
        return Err(BackendError::ProtocolInvariant {
            object: rt.object_name().to_string(),
            class: sibling_class,
        });
    };

    let (own_learned, own_results, sib_learned, sib_results) = match rt.class() {
        ClassId::Spam => (reply.learned_spam, reply.spam, reply.learned_ham, reply.ham),
        ClassId::Ham => (reply.learned_ham, reply.ham, reply.learned_spam, reply.spam),
    };

    rt.install_results(own_learned, own_results);
    sibling.install_results(sib_learned, sib_results);

    rt.merge_into(tokens);
    sibling.merge_into(tokens);

    Ok(true)
}

/// Post-classification hook; nothing left to do, merging happened at
/// completion.
pub fn finalize(_task: &Task, _rt: &Arc<Runtime>) -> bool {
    true
}

/// Submit tokens on the learn path.
///
/// Extension point: validates its inputs and reports "not handled" until the
/// learn submission lands.
pub async fn learn_tokens(
    _task: &Task,
    tokens: &TokenSet,
    token_set_id: u32,
    rt: &Arc<Runtime>,
) -> Result<bool, BackendError> {
    if tokens.lock().is_empty() {
        return Ok(false);
    }

    rt.attach_tokens(tokens.clone(), token_set_id);

    // TODO: issue the learn procedure and route the updated counts back
    Ok(false)
}

/// Post-learn hook, kept for interface parity with [`finalize`].
pub fn finalize_learn(_task: &Task, _rt: &Arc<Runtime>) -> bool {
    true
}

/// Aggregate statistics for the backend behind `rt`.
///
/// Extension point: no extraction pass exists yet, so this always answers
/// `None`.
pub fn get_stat(_rt: &Arc<Runtime>) -> Option<StatSnapshot> {
    // TODO: query the store for learned totals and the tracked-user count
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::runtime::Token;
    use crate::stats::store::StoreError;
    use crate::stats::store::tests::{MockStore, backend_fixture_with};
    use std::sync::atomic::Ordering;

    fn token_set(n: usize) -> TokenSet {
        Arc::new(Mutex::new((0..n as u64).map(Token::new).collect()))
    }

    fn spam_ham_backends(
        store: &Arc<MockStore>,
    ) -> (
        (Arc<BackendContext>, Arc<StatfileOpts>),
        (Arc<BackendContext>, Arc<StatfileOpts>),
    ) {
        (
            backend_fixture_with(true, store.clone()),
            backend_fixture_with(false, store.clone()),
        )
    }

    #[test]
    fn create_twice_returns_the_same_runtime() {
        let store = Arc::new(MockStore::default());
        let ((ctx, stcf), _) = spam_ham_backends(&store);
        let task = Task::new();

        let first = create_runtime(&task, stcf.clone(), ClassId::Spam, false, &ctx).unwrap();
        let second = create_runtime(&task, stcf, ClassId::Spam, false, &ctx).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn classification_registers_a_passive_sibling() {
        let store = Arc::new(MockStore::default());
        let ((ctx, stcf), _) = spam_ham_backends(&store);
        let task = Task::new();

        let spam_rt = create_runtime(&task, stcf, ClassId::Spam, false, &ctx).unwrap();
        assert!(spam_rt.is_active());

        let table = runtime_table(&task);
        let pairs = table.pairs.lock();
        let pair = pairs.get("RSBAYES").expect("pair registered");

        let ham_rt = pair.get(ClassId::Ham).expect("passive sibling");
        assert!(!ham_rt.is_active());
        assert_eq!(ham_rt.object_name(), spam_rt.object_name());
    }

    #[test]
    fn reuse_rebinds_the_statfile() {
        let store = Arc::new(MockStore::default());
        let ((spam_ctx, spam_stcf), _) = spam_ham_backends(&store);
        let task = Task::new();

        create_runtime(&task, spam_stcf.clone(), ClassId::Spam, false, &spam_ctx).unwrap();

        let alt = Arc::new(StatfileOpts {
            symbol: "BAYES_SPAM_SHADOW".to_string(),
            ..(*spam_stcf).clone()
        });
        let reused = create_runtime(&task, alt, ClassId::Spam, false, &spam_ctx).unwrap();

        assert_eq!(reused.statfile().symbol, "BAYES_SPAM_SHADOW");
    }

    #[test]
    fn learn_path_does_not_pair() {
        let store = Arc::new(MockStore::default());
        let ((ctx, stcf), _) = spam_ham_backends(&store);
        let task = Task::new();

        create_runtime(&task, stcf, ClassId::Spam, true, &ctx).unwrap();

        let table = runtime_table(&task);
        let pairs = table.pairs.lock();
        assert!(pairs.get("RSBAYES").unwrap().get(ClassId::Ham).is_none());
    }

    #[test]
    fn expansion_failure_registers_nothing() {
        let store = Arc::new(MockStore::default());
        let stcf = Arc::new(StatfileOpts {
            symbol: "BAYES_SPAM".to_string(),
            label: None,
            is_spam: true,
        });
        let classifier = crate::stats::config::ClassifierOpts {
            prefix: Some("%r".to_string()),
            ..Default::default()
        };
        let ctx = BackendContext::from_opts(
            &crate::stats::store::tests::MockInit(store),
            classifier,
            stcf.clone(),
        )
        .unwrap();

        let task = Task::new();
        let result = create_runtime(&task, stcf, ClassId::Spam, false, &ctx);

        assert!(matches!(result, Err(BackendError::Expansion(_))));
        assert!(runtime_table(&task).pairs.lock().is_empty());
    }

    #[tokio::test]
    async fn one_remote_call_per_object_name() {
        let store = Arc::new(MockStore::default());
        let ((spam_ctx, spam_stcf), (ham_ctx, ham_stcf)) = spam_ham_backends(&store);
        let task = Task::new();
        let tokens = token_set(4);

        let spam_rt =
            create_runtime(&task, spam_stcf, ClassId::Spam, false, &spam_ctx).unwrap();
        let ham_rt = create_runtime(&task, ham_stcf, ClassId::Ham, false, &ham_ctx).unwrap();

        assert!(submit_tokens(&task, &tokens, 0, &spam_rt).await.unwrap());
        assert!(submit_tokens(&task, &tokens, 1, &ham_rt).await.unwrap());

        assert_eq!(store.classify_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reply_is_routed_to_both_classes() {
        let store = Arc::new(MockStore::default());
        *store.reply.lock() = Some(ClassifyReply {
            learned_ham: 11,
            learned_spam: 29,
            ham: vec![(0, 0.25)],
            spam: vec![(2, 0.7), (3, 1.3)],
        });

        let ((spam_ctx, spam_stcf), _) = spam_ham_backends(&store);
        let task = Task::new();
        let tokens = token_set(4);

        let spam_rt =
            create_runtime(&task, spam_stcf, ClassId::Spam, false, &spam_ctx).unwrap();
        assert!(submit_tokens(&task, &tokens, 7, &spam_rt).await.unwrap());

        let table = runtime_table(&task);
        let ham_rt = table
            .pairs
            .lock()
            .get("RSBAYES")
            .unwrap()
            .get(ClassId::Ham)
            .unwrap();

        assert_eq!(spam_rt.learns(), 29);
        assert_eq!(ham_rt.learns(), 11);

        let tokens = tokens.lock();
        assert_eq!(tokens[2].value(ClassId::Spam), 0.7);
        assert_eq!(tokens[3].value(ClassId::Spam), 1.3);
        assert_eq!(tokens[0].value(ClassId::Ham), 0.25);
        assert_eq!(tokens[0].value(ClassId::Spam), 0.0);

        let call = store.last_call.lock().take().unwrap();
        assert_eq!(call.object_name, "RSBAYES");
        assert_eq!(call.token_set_id, 7);
        assert!(call.is_spam);
        assert_eq!(call.payload.len(), 5 + 9 * 4);
    }

    #[tokio::test]
    async fn store_failure_leaves_results_unset() {
        let store = Arc::new(MockStore::default());
        *store.fail_with.lock() = Some(StoreError::Call("connection refused".to_string()));

        let ((ctx, stcf), _) = spam_ham_backends(&store);
        let task = Task::new();
        let tokens = token_set(3);

        let rt = create_runtime(&task, stcf, ClassId::Spam, false, &ctx).unwrap();
        assert!(!submit_tokens(&task, &tokens, 0, &rt).await.unwrap());

        assert!(!rt.has_results());
        assert!(!rt.merge_into(&tokens));
        assert!(tokens.lock().iter().all(|t| t.values == [0.0, 0.0]));
    }

    #[tokio::test]
    async fn missing_sibling_is_a_protocol_violation() {
        let store = Arc::new(MockStore::default());
        let ((ctx, stcf), _) = spam_ham_backends(&store);
        let task = Task::new();
        let tokens = token_set(2);

        // Learn-path runtimes are unpaired; a classify reply for one means the
        // caller mixed up its paths.
        let rt = create_runtime(&task, stcf, ClassId::Spam, true, &ctx).unwrap();
        let result = submit_tokens(&task, &tokens, 0, &rt).await;

        assert!(matches!(
            result,
            Err(BackendError::ProtocolInvariant { ref object, class })
                if object.as_str() == "RSBAYES" && class == ClassId::Ham
        ));
        assert!(!rt.has_results());
        assert!(!rt.merge_into(&tokens));
    }

    #[tokio::test]
    async fn empty_token_set_is_rejected() {
        let store = Arc::new(MockStore::default());
        let ((ctx, stcf), _) = spam_ham_backends(&store);
        let task = Task::new();
        let tokens = token_set(0);

        let rt = create_runtime(&task, stcf, ClassId::Spam, false, &ctx).unwrap();
        assert!(!submit_tokens(&task, &tokens, 0, &rt).await.unwrap());
        assert_eq!(store.classify_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn learn_submission_is_not_handled_yet() {
        let store = Arc::new(MockStore::default());
        let ((ctx, stcf), _) = spam_ham_backends(&store);
        let task = Task::new();
        let tokens = token_set(2);

        let rt = create_runtime(&task, stcf, ClassId::Spam, true, &ctx).unwrap();
        assert!(!learn_tokens(&task, &tokens, 0, &rt).await.unwrap());
        assert!(finalize_learn(&task, &rt));
        assert!(get_stat(&rt).is_none());
    }
}
