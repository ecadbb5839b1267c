//! Per-method processing context (spec §4.5 "a per-method processing
//! context supplying unique-name generation").

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use dexcomp_ir::IRCode;
use dexcomp_pool::{DexMethod, ItemPool};

use crate::lens::{identity_lens, GraphLens};

/// Where a pass reports a fact about the method it just finished
/// processing, for the wave scheduler to apply once the whole wave is
/// done rather than mutating the class graph mid-wave (spec §5 "delayed
/// feedback propagation" — passes run concurrently within a wave, so
/// nothing may write into the graph until every worker has returned).
pub trait FeedbackSink: Send + Sync {
    fn record_never_returns_normally(&self, method: DexMethod);
    fn record_inline_candidate(&self, method: DexMethod);
}

/// The default sink for contexts built outside a wave (tests, tools
/// that run a single pass in isolation) — reported facts are simply
/// dropped.
pub struct NullFeedbackSink;

impl FeedbackSink for NullFeedbackSink {
    fn record_never_returns_normally(&self, _method: DexMethod) {}
    fn record_inline_candidate(&self, _method: DexMethod) {}
}

/// State threaded through one method's pipeline run. Cheap to construct
/// per method; the cancellation flag and synthetic-name counter are
/// shared across every method of a wave so synthesized names never
/// collide (spec §5 "synthetic-items collection").
pub struct MethodProcessingContext {
    /// Checked between passes (spec §5 "cooperative...checked between
    /// passes and between waves").
    cancelled: Arc<AtomicBool>,
    synthetic_name_counter: Arc<AtomicU32>,
    /// Pinned methods skip the type-check-failure degradation (spec §4.3
    /// "Pinned methods do not receive this degradation").
    pub pinned: bool,
    /// The current reference-rewriting lens (spec §4.6), updated as
    /// earlier waves retarget methods, fields or types. The lens-rewrite
    /// pass is what actually applies this to a method's IR.
    pub lens: Arc<dyn GraphLens>,
    /// The run's single interned-item pool (see `ItemPool`'s own doc
    /// comment: "every compilation run owns one `ItemPool` and threads it
    /// explicitly into every pass that needs to intern something").
    pub pool: Arc<ItemPool>,
    /// Final IR bodies of methods the wave scheduler has already
    /// finished processing, keyed by method reference — the source
    /// [crate::passes::inlining::Inlining] splices from. Bottom-up wave
    /// ordering guarantees a callee lands here before any caller in a
    /// later wave is processed.
    pub compiled_bodies: Arc<DashMap<DexMethod, IRCode>>,
    /// Methods synthesized while processing this wave (companion-class
    /// interface methods, lambda classes, bridges) — spec §4.4's
    /// `eventConsumer`, collected here instead of threaded as a callback
    /// since every desugaring in the collection shares one sink. The
    /// wave scheduler drains this into the next wave's work queue.
    pub synthesized: Arc<DashMap<DexMethod, IRCode>>,
    /// Where `record_never_returns_normally`/`record_inline_candidate`
    /// facts go (spec §5). Defaults to [NullFeedbackSink]; the wave
    /// scheduler overrides it with its own buffer via `with_feedback`.
    pub feedback: Arc<dyn FeedbackSink>,
}

impl MethodProcessingContext {
    pub fn new(
        cancelled: Arc<AtomicBool>,
        synthetic_name_counter: Arc<AtomicU32>,
        pinned: bool,
        pool: Arc<ItemPool>,
        compiled_bodies: Arc<DashMap<DexMethod, IRCode>>,
        synthesized: Arc<DashMap<DexMethod, IRCode>>,
    ) -> Self {
        MethodProcessingContext {
            cancelled,
            synthetic_name_counter,
            pinned,
            lens: identity_lens(),
            pool,
            compiled_bodies,
            synthesized,
            feedback: Arc::new(NullFeedbackSink),
        }
    }

    pub fn with_lens(mut self, lens: Arc<dyn GraphLens>) -> Self {
        self.lens = lens;
        self
    }

    pub fn with_feedback(mut self, feedback: Arc<dyn FeedbackSink>) -> Self {
        self.feedback = feedback;
        self
    }

    #[cfg(test)]
    pub fn for_test(pinned: bool) -> Self {
        MethodProcessingContext::new(
            Arc::new(AtomicBool::new(false)),
            Arc::new(AtomicU32::new(0)),
            pinned,
            Arc::new(ItemPool::new()),
            Arc::new(DashMap::new()),
            Arc::new(DashMap::new()),
        )
    }

    /// A fresh, process-unique synthetic name fragment, e.g. for a
    /// companion class or an inlined-and-renamed local.
    pub fn fresh_synthetic_name(&self, prefix: &str) -> String {
        let n = self.synthetic_name_counter.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}${n}")
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_names_are_unique_and_ordered() {
        let ctx = MethodProcessingContext::for_test(false);
        assert_eq!(ctx.fresh_synthetic_name("I$-CC"), "I$-CC$0");
        assert_eq!(ctx.fresh_synthetic_name("I$-CC"), "I$-CC$1");
    }

    #[test]
    fn cancellation_is_observed_through_the_shared_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let ctx = MethodProcessingContext::new(
            flag.clone(),
            Arc::new(AtomicU32::new(0)),
            false,
            Arc::new(ItemPool::new()),
            Arc::new(DashMap::new()),
            Arc::new(DashMap::new()),
        );
        assert!(!ctx.is_cancelled());
        flag.store(true, Ordering::Relaxed);
        assert!(ctx.is_cancelled());
    }
}
