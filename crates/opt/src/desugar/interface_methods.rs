//! Step 20: interface-method rewriting. Default, static and private
//! interface methods are unavailable as `invoke-interface` targets on
//! runtimes that predate them, so their call sites get retargeted to a
//! synthetic companion class — the same companion class
//! [crate::lens::InterfaceProcessorLens] already knows how to redirect
//! through once this desugaring has recorded the mapping.
//!
//! Synthesizing the companion class itself (access flags, interface
//! list, registering it with the program) is the class-model layer's
//! job; this desugaring owns exactly the per-call-site rewrite, lazily
//! minting one companion method reference per relocated original.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use dexcomp_ir::{IRCode, Instruction, InvokeKind};
use dexcomp_pool::{DexMethod, ItemPool};

use crate::context::MethodProcessingContext;
use crate::desugar::{synthetic_companion_type, Desugaring, DesugaringEvents};
use crate::errors::OptError;

pub struct InterfaceMethodRewriting {
    pool: Arc<ItemPool>,
    /// Default/static/private interface methods known to need relocation,
    /// populated ahead of the wave from the class model's method list.
    needs_relocation: DashSet<DexMethod>,
    companions: DashMap<DexMethod, DexMethod>,
}

impl InterfaceMethodRewriting {
    pub fn new(pool: Arc<ItemPool>) -> Self {
        InterfaceMethodRewriting { pool, needs_relocation: DashSet::new(), companions: DashMap::new() }
    }

    pub fn record_default_method(&self, method: DexMethod) {
        self.needs_relocation.insert(method);
    }

    fn companion_for(&self, ctx: &MethodProcessingContext, original: &DexMethod) -> DexMethod {
        if let Some(existing) = self.companions.get(original) {
            return existing.clone();
        }
        let companion_type = synthetic_companion_type(&self.pool, original.holder(), ctx);
        let companion = self.pool.intern_method(companion_type, original.proto().clone(), original.name().as_bytes());
        self.companions.insert(original.clone(), companion.clone());
        companion
    }
}

impl Desugaring for InterfaceMethodRewriting {
    fn name(&self) -> &'static str {
        "interface-method-rewriting"
    }

    fn needs_desugaring(&self, code: &IRCode) -> bool {
        code.blocks().any(|(_, block)| {
            block
                .instructions
                .iter()
                .any(|&id| matches!(code.instruction(id), Instruction::Invoke { kind: InvokeKind::Interface, method, .. } if self.needs_relocation.contains(method)))
        })
    }

    fn desugar(&self, ctx: &mut MethodProcessingContext, mut code: IRCode, _events: &mut DesugaringEvents) -> Result<IRCode, OptError> {
        let targets: Vec<_> = code
            .blocks()
            .flat_map(|(_, block)| block.instructions.iter().copied())
            .filter(|&id| matches!(code.instruction(id), Instruction::Invoke { kind: InvokeKind::Interface, method, .. } if self.needs_relocation.contains(method)))
            .collect();

        for id in targets {
            let original = match code.instruction(id) {
                Instruction::Invoke { method, .. } => method.clone(),
                _ => unreachable!(),
            };
            let companion = self.companion_for(ctx, &original);
            let Instruction::Invoke { method, kind, .. } = code.instruction_mut(id) else {
                unreachable!()
            };
            *method = companion;
            *kind = InvokeKind::Static;
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_registered_default_method_call_is_retargeted_to_its_companion() {
        let pool = Arc::new(ItemPool::new());
        let iface = pool.intern_type(b"Lcom/app/Greeter;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret.clone(), Vec::new());
        let default_method = pool.intern_method(iface, proto.clone(), b"greet");

        let rewriting = InterfaceMethodRewriting::new(pool.clone());
        rewriting.record_default_method(default_method.clone());

        let caller_proto = pool.intern_proto(ret, Vec::new());
        let caller = pool.intern_method(pool.intern_type(b"Lcom/app/Caller;"), caller_proto, b"m");
        let mut code = IRCode::new(caller);
        let entry = code.entry_block();
        code.push_instruction(
            entry,
            Instruction::Invoke { result: None, kind: InvokeKind::Interface, method: default_method.clone(), arguments: Default::default() },
        );

        assert!(rewriting.needs_desugaring(&code));
        let mut ctx = MethodProcessingContext::for_test(false);
        let mut events = DesugaringEvents::default();
        let code = rewriting.desugar(&mut ctx, code, &mut events).unwrap();

        let Instruction::Invoke { method, kind, .. } = code.instruction(code.block(entry).instructions[0]) else {
            panic!("expected Invoke")
        };
        assert_ne!(*method, default_method);
        assert_eq!(*kind, InvokeKind::Static);
    }
}
