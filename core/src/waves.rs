//! The wave scheduler (spec §4.5): partitions program methods into
//! bottom-up waves, processes each wave's methods in parallel through
//! `dexcomp-opt`'s pipeline, and drains the delayed-feedback buffer and
//! wave-done callbacks between waves.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use dexcomp_dex::ClassGraph;
use dexcomp_ir::IRCode;
use dexcomp_opt::context::FeedbackSink;
use dexcomp_opt::{MethodProcessingContext, OptError, Pass};
use dexcomp_pool::{DexMethod, ItemPool};

use crate::callgraph::CallGraph;
use crate::executor::Executor;
use crate::timing::Timing;

/// Partitions `graph`'s methods into leaves-first waves (spec §4.5
/// "Contract"): a wave consists of every method with no remaining
/// un-waved callee; those methods are then removed and the process
/// repeats. Cycles must already be broken (see [CallGraph::break_cycles])
/// or this never terminates.
pub fn partition_waves(graph: &CallGraph) -> Vec<Vec<DexMethod>> {
    let mut remaining: HashSet<DexMethod> = graph.methods().cloned().collect();
    let mut waves = Vec::new();

    while !remaining.is_empty() {
        let wave: Vec<DexMethod> = remaining
            .iter()
            .filter(|m| graph.callees(m).all(|callee| !remaining.contains(callee)))
            .cloned()
            .collect();
        debug_assert!(!wave.is_empty(), "call graph has an un-broken cycle");
        if wave.is_empty() {
            // Defensive fallback so a caller who forgot to break cycles
            // degrades to one giant final wave instead of looping
            // forever; `debug_assert!` above is the real signal.
            waves.push(remaining.iter().cloned().collect());
            break;
        }
        for m in &wave {
            remaining.remove(m);
        }
        waves.push(wave);
    }
    waves
}

/// A post-wave action (spec §4.5 "Post-wave actions"): runs
/// single-threaded on the driver thread after a wave's workers have all
/// joined and the feedback buffer has drained.
pub type WaveDoneAction = Box<dyn FnMut(&WaveScheduler) + Send>;

/// Per-key pending optimization-info update, recorded during a wave and
/// only made visible between waves (spec §5 "delayed feedback buffer").
#[derive(Clone)]
enum FeedbackUpdate {
    NeverReturnsNormally(DexMethod),
    InlineCandidate(DexMethod),
}

/// The delayed feedback buffer itself, shared (via `Arc`) with every
/// [MethodProcessingContext] of a wave so passes running on worker
/// threads can report facts without taking a lock on the scheduler or
/// the class graph (spec §5 "delayed feedback propagation" — nothing
/// may write into the graph until every worker has returned).
#[derive(Default)]
struct FeedbackBuffer {
    updates: DashMap<u64, FeedbackUpdate>,
    seq: AtomicU32,
}

impl FeedbackBuffer {
    fn push(&self, update: FeedbackUpdate) {
        let key = self.seq.fetch_add(1, Ordering::Relaxed) as u64;
        self.updates.insert(key, update);
    }

    /// Applies every buffered update into `graph`'s encoded methods, in
    /// the order the updates were recorded, then empties the buffer.
    fn drain_into(&self, graph: &mut ClassGraph) {
        let mut updates: Vec<_> = self.updates.iter().map(|e| (*e.key(), e.value().clone())).collect();
        updates.sort_by_key(|(key, _)| *key);
        for (_, update) in updates {
            let method = match &update {
                FeedbackUpdate::NeverReturnsNormally(m) | FeedbackUpdate::InlineCandidate(m) => m.clone(),
            };
            let Some(encoded) = graph.lookup_method_mut(&method) else {
                continue;
            };
            match update {
                FeedbackUpdate::NeverReturnsNormally(_) => encoded.optimization_info.never_returns_normally = true,
                FeedbackUpdate::InlineCandidate(_) => encoded.optimization_info.is_inline_candidate = true,
            }
        }
        self.updates.clear();
    }
}

impl FeedbackSink for FeedbackBuffer {
    fn record_never_returns_normally(&self, method: DexMethod) {
        self.push(FeedbackUpdate::NeverReturnsNormally(method));
    }

    fn record_inline_candidate(&self, method: DexMethod) {
        self.push(FeedbackUpdate::InlineCandidate(method));
    }
}

/// Drives the per-method pipeline across waves (spec §4.5). Holds the
/// shared, wave-scoped state every [MethodProcessingContext] is built
/// from.
pub struct WaveScheduler {
    pool: Arc<ItemPool>,
    lens: Arc<dyn dexcomp_opt::GraphLens>,
    compiled_bodies: Arc<DashMap<DexMethod, IRCode>>,
    synthesized: Arc<DashMap<DexMethod, IRCode>>,
    feedback: Arc<FeedbackBuffer>,
    cancelled: Arc<AtomicBool>,
    synthetic_name_counter: Arc<AtomicU32>,
    wave_done_actions: Vec<WaveDoneAction>,
    in_wave: bool,
    pub timing: Timing,
}

impl WaveScheduler {
    pub fn new(pool: Arc<ItemPool>) -> Self {
        WaveScheduler {
            pool,
            lens: dexcomp_opt::lens::identity_lens(),
            compiled_bodies: Arc::new(DashMap::new()),
            synthesized: Arc::new(DashMap::new()),
            feedback: Arc::new(FeedbackBuffer::default()),
            cancelled: Arc::new(AtomicBool::new(false)),
            synthetic_name_counter: Arc::new(AtomicU32::new(0)),
            wave_done_actions: Vec::new(),
            in_wave: false,
            timing: Timing::new(),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Registers a callback to run once this wave finishes. Spec §4.5:
    /// "Attempts to register a wave-done action outside a wave are a
    /// programming error."
    pub fn register_wave_done_action(&mut self, action: WaveDoneAction) {
        assert!(self.in_wave, "wave-done actions may only be registered while a wave is running");
        self.wave_done_actions.push(action);
    }

    pub fn synthesized(&self) -> &DashMap<DexMethod, IRCode> {
        &self.synthesized
    }

    /// Processes one wave's methods in parallel through `passes`,
    /// merging results via `bodies` once every worker has joined
    /// (spec §5 "no worker observes partial results from another"),
    /// then applies the wave's buffered feedback facts into `graph`.
    pub fn run_wave(
        &mut self,
        wave: &[DexMethod],
        passes: &Arc<Vec<Box<dyn Pass>>>,
        throwable_type: &dexcomp_pool::DexType,
        bodies: &mut HashMap<DexMethod, IRCode>,
        graph: &mut ClassGraph,
        executor: &dyn Executor,
    ) -> Vec<Result<(), OptError>> {
        self.in_wave = true;
        let wave_scope = self.timing.scope("wave");

        let tasks: Vec<Box<dyn FnOnce() -> (DexMethod, Result<IRCode, OptError>) + Send>> = wave
            .iter()
            .filter_map(|method| {
                let code = bodies.remove(method)?;
                let pool = self.pool.clone();
                let lens = self.lens.clone();
                let compiled_bodies = self.compiled_bodies.clone();
                let synthesized = self.synthesized.clone();
                let feedback = self.feedback.clone();
                let cancelled = self.cancelled.clone();
                let synthetic_name_counter = self.synthetic_name_counter.clone();
                let method = method.clone();
                let passes = passes.clone();
                let throwable_type = throwable_type.clone();
                Some(Box::new(move || {
                    let mut ctx = MethodProcessingContext::new(cancelled, synthetic_name_counter, false, pool, compiled_bodies, synthesized)
                        .with_lens(lens)
                        .with_feedback(feedback);
                    let result = dexcomp_opt::run_method_pipeline(&passes, &mut ctx, &throwable_type, code);
                    (method, result)
                }) as Box<dyn FnOnce() -> (DexMethod, Result<IRCode, OptError>) + Send>)
            })
            .collect();

        let results = executor.run_all(tasks);
        wave_scope.finish();

        let mut outcomes = Vec::with_capacity(results.len());
        for (method, result) in results {
            match result {
                Ok(code) => {
                    self.compiled_bodies.insert(method.clone(), code.clone());
                    bodies.insert(method, code);
                    outcomes.push(Ok(()));
                }
                Err(err) => outcomes.push(Err(err)),
            }
        }

        self.drain_feedback(graph);
        self.run_wave_done_actions();
        self.in_wave = false;
        outcomes
    }

    fn drain_feedback(&self, graph: &mut ClassGraph) {
        self.feedback.drain_into(graph);
    }

    fn run_wave_done_actions(&mut self) {
        let mut actions = std::mem::take(&mut self.wave_done_actions);
        for action in actions.iter_mut() {
            action(self);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_ir::{Instruction, InvokeKind, PrimitiveType, TypeElement};
    use dexcomp_pool::ItemPool;
    use smallvec::smallvec;

    #[test]
    fn leaves_are_waved_before_their_callers() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"I");
        let proto = pool.intern_proto(ret, Vec::new());
        let a = pool.intern_method(holder.clone(), proto.clone(), b"f");
        let b = pool.intern_method(holder, proto, b"g");

        let mut bodies = HashMap::new();
        let mut a_code = IRCode::new(a.clone());
        let entry = a_code.entry_block();
        let result = a_code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        a_code.push_instruction(entry, Instruction::Invoke { result: Some(result), kind: InvokeKind::Static, method: b.clone(), arguments: smallvec![] });
        a_code.push_instruction(entry, Instruction::Return { value: Some(result) });
        bodies.insert(a.clone(), a_code);

        let mut b_code = IRCode::new(b.clone());
        let b_entry = b_code.entry_block();
        let one = b_code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        b_code.push_instruction(b_entry, Instruction::Const { result: one, bits: 1 });
        b_code.push_instruction(b_entry, Instruction::Return { value: Some(one) });
        bodies.insert(b.clone(), b_code);

        let graph = CallGraph::build([&a, &b], &bodies);
        let waves = partition_waves(&graph);

        assert_eq!(waves.len(), 2);
        assert_eq!(waves[0], vec![b.clone()]);
        assert_eq!(waves[1], vec![a.clone()]);
    }

    #[test]
    fn running_a_wave_produces_a_body_for_every_method() {
        let pool = Arc::new(ItemPool::new());
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let void_ty = pool.intern_type(b"V");
        let proto = pool.intern_proto(void_ty.clone(), Vec::new());
        let method = pool.intern_method(holder, proto, b"m");
        let throwable = pool.intern_type(b"Ljava/lang/RuntimeException;");

        let mut code = IRCode::new(method.clone());
        let entry = code.entry_block();
        code.push_instruction(entry, Instruction::Return { value: None });

        let mut bodies = HashMap::new();
        bodies.insert(method.clone(), code);

        let mut scheduler = WaveScheduler::new(pool);
        let passes: Arc<Vec<Box<dyn Pass>>> = Arc::new(Vec::new());
        let mut graph = ClassGraph::new();
        let outcomes = scheduler.run_wave(&[method.clone()], &passes, &throwable, &mut bodies, &mut graph, &crate::executor::SequentialExecutor);

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_ok());
        assert!(bodies.contains_key(&method));
    }

    #[test]
    fn a_never_returning_method_s_feedback_lands_in_the_class_graph() {
        use dexcomp_dex::{AccessFlags, ClassKind, DexClass, DexEncodedMethod};
        use dexcomp_ir::TypeElement;

        let pool = Arc::new(ItemPool::new());
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let void_ty = pool.intern_type(b"V");
        let proto = pool.intern_proto(void_ty, Vec::new());
        let method = pool.intern_method(holder.clone(), proto, b"m");
        let throwable = pool.intern_type(b"Ljava/lang/RuntimeException;");

        let mut code = IRCode::new(method.clone());
        let entry = code.entry_block();
        let exc = code.new_undefined_value(TypeElement::Reference { class: Some(throwable.clone()), interfaces: Default::default(), nullable: false });
        code.push_instruction(entry, Instruction::ConstNull { result: exc });
        code.push_instruction(entry, Instruction::Throw { exception: exc });

        let mut bodies = HashMap::new();
        bodies.insert(method.clone(), code);

        let passes: Arc<Vec<Box<dyn Pass>>> = Arc::new(vec![Box::new(dexcomp_opt::passes::always_throwing::AlwaysThrowing::new())]);

        let mut graph = ClassGraph::new();
        graph.insert(DexClass {
            kind: ClassKind::Program(Default::default()),
            class_type: holder,
            access_flags: AccessFlags::PUBLIC,
            super_type: None,
            interfaces: Vec::new(),
            source_file: None,
            nest_host: None,
            nest_members: Vec::new(),
            inner_classes: Vec::new(),
            enclosing_method: None,
            generic_signature: None,
            annotations: Default::default(),
            static_fields: Vec::new(),
            instance_fields: Vec::new(),
            direct_methods: vec![DexEncodedMethod::new(method.clone(), AccessFlags::STATIC)],
            virtual_methods: Vec::new(),
        });

        let mut scheduler = WaveScheduler::new(pool);
        let outcomes = scheduler.run_wave(&[method.clone()], &passes, &throwable, &mut bodies, &mut graph, &crate::executor::SequentialExecutor);
        assert!(outcomes[0].is_ok());

        let encoded = graph.lookup_method_mut(&method).unwrap();
        assert!(encoded.optimization_info.never_returns_normally);
    }
}
