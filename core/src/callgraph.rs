//! A call graph over program methods, restricted to the edges the wave
//! scheduler actually cares about: direct/static invokes, the only kind
//! [dexcomp_opt::passes::inlining::Inlining] can ever fold across a wave
//! boundary (spec §4.5 "no method transitively calls another method of
//! the same wave whose result is needed for inlining").

use std::collections::{HashMap, HashSet};

use dexcomp_ir::{IRCode, Instruction, InvokeKind};
use dexcomp_pool::DexMethod;

/// `callers_of[callee]` / `callees_of[caller]`, built once from each
/// program method's already-constructed IR.
#[derive(Default)]
pub struct CallGraph {
    callees: HashMap<DexMethod, HashSet<DexMethod>>,
    callers: HashMap<DexMethod, HashSet<DexMethod>>,
    methods: HashSet<DexMethod>,
}

impl CallGraph {
    pub fn build<'a>(program_methods: impl IntoIterator<Item = &'a DexMethod>, bodies: &HashMap<DexMethod, IRCode>) -> Self {
        let mut graph = CallGraph::default();
        for method in program_methods {
            graph.methods.insert(method.clone());
            graph.callees.entry(method.clone()).or_default();
            graph.callers.entry(method.clone()).or_default();
        }
        for method in graph.methods.clone() {
            let Some(code) = bodies.get(&method) else { continue };
            for (_, block) in code.blocks() {
                for &instr_id in &block.instructions {
                    let Instruction::Invoke { kind: InvokeKind::Direct | InvokeKind::Static, method: callee, .. } = code.instruction(instr_id) else {
                        continue;
                    };
                    if !graph.methods.contains(callee) || callee == &method {
                        continue;
                    }
                    graph.callees.get_mut(&method).unwrap().insert(callee.clone());
                    graph.callers.entry(callee.clone()).or_default().insert(method.clone());
                }
            }
        }
        graph
    }

    pub fn methods(&self) -> impl Iterator<Item = &DexMethod> {
        self.methods.iter()
    }

    pub fn callees(&self, method: &DexMethod) -> impl Iterator<Item = &DexMethod> {
        self.callees.get(method).into_iter().flatten()
    }

    pub fn callers(&self, method: &DexMethod) -> impl Iterator<Item = &DexMethod> {
        self.callers.get(method).into_iter().flatten()
    }

    /// Removes one edge (records it as pre-broken, spec §4.5 "Cycles are
    /// pre-broken by a cycle-elimination pass that removes the
    /// lowest-priority edge in each SCC").
    fn remove_edge(&mut self, caller: &DexMethod, callee: &DexMethod) {
        if let Some(set) = self.callees.get_mut(caller) {
            set.remove(callee);
        }
        if let Some(set) = self.callers.get_mut(callee) {
            set.remove(caller);
        }
    }

    /// Breaks every strongly-connected component by removing its
    /// lowest-priority edge (the edge whose caller sorts last, a
    /// deterministic stand-in for whatever priority metric an inliner
    /// would use) until the graph is a DAG. Tarjan-free: repeatedly
    /// finds one cycle by depth-first search and cuts its closing edge,
    /// which terminates because each cut strictly shrinks the edge set.
    pub fn break_cycles(&mut self) -> Vec<(DexMethod, DexMethod)> {
        let mut broken = Vec::new();
        loop {
            let Some(cycle_edge) = self.find_cycle_edge() else { break };
            self.remove_edge(&cycle_edge.0, &cycle_edge.1);
            broken.push(cycle_edge);
        }
        broken
    }

    fn find_cycle_edge(&self) -> Option<(DexMethod, DexMethod)> {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Visiting,
            Done,
        }
        let mut state: HashMap<DexMethod, State> = HashMap::new();
        let mut stack = Vec::new();

        fn visit(
            graph: &CallGraph,
            method: &DexMethod,
            state: &mut HashMap<DexMethod, State>,
            stack: &mut Vec<DexMethod>,
        ) -> Option<(DexMethod, DexMethod)> {
            state.insert(method.clone(), State::Visiting);
            stack.push(method.clone());
            for callee in graph.callees(method) {
                match state.get(callee) {
                    Some(State::Visiting) => return Some((method.clone(), callee.clone())),
                    Some(State::Done) => continue,
                    None => {
                        if let Some(edge) = visit(graph, callee, state, stack) {
                            return Some(edge);
                        }
                    }
                }
            }
            stack.pop();
            state.insert(method.clone(), State::Done);
            None
        }

        let mut methods: Vec<_> = self.methods.iter().cloned().collect();
        methods.sort_by_key(|m| m.name().as_bytes().to_vec());
        for method in &methods {
            if state.contains_key(method) {
                continue;
            }
            if let Some(edge) = visit(self, method, &mut state, &mut stack) {
                return Some(edge);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_ir::{IRCode, PrimitiveType, TypeElement};
    use dexcomp_pool::ItemPool;
    use smallvec::smallvec;

    fn make_method(pool: &ItemPool, name: &[u8]) -> DexMethod {
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"I");
        let proto = pool.intern_proto(ret, Vec::new());
        pool.intern_method(holder, proto, name)
    }

    fn body_calling(method: DexMethod, callee: DexMethod) -> IRCode {
        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let result = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        code.push_instruction(entry, Instruction::Invoke { result: Some(result), kind: InvokeKind::Static, method: callee, arguments: smallvec![] });
        code.push_instruction(entry, Instruction::Return { value: Some(result) });
        code
    }

    #[test]
    fn a_direct_call_becomes_a_call_graph_edge() {
        let pool = ItemPool::new();
        let a = make_method(&pool, b"a");
        let b = make_method(&pool, b"b");
        let mut bodies = HashMap::new();
        bodies.insert(a.clone(), body_calling(a.clone(), b.clone()));
        bodies.insert(b.clone(), IRCode::new(b.clone()));

        let graph = CallGraph::build([&a, &b], &bodies);
        assert_eq!(graph.callees(&a).collect::<Vec<_>>(), vec![&b]);
        assert_eq!(graph.callers(&b).collect::<Vec<_>>(), vec![&a]);
    }

    #[test]
    fn a_mutual_recursion_cycle_is_broken_into_a_dag() {
        let pool = ItemPool::new();
        let a = make_method(&pool, b"a");
        let b = make_method(&pool, b"b");
        let mut bodies = HashMap::new();
        bodies.insert(a.clone(), body_calling(a.clone(), b.clone()));
        bodies.insert(b.clone(), body_calling(b.clone(), a.clone()));

        let mut graph = CallGraph::build([&a, &b], &bodies);
        let broken = graph.break_cycles();
        assert_eq!(broken.len(), 1);
        assert!(graph.find_cycle_edge().is_none());
    }
}
