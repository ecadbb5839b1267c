//! Steps 18-20 of the optimization pipeline (spec §4.3), run as one slot
//! that delegates to the desugaring collection (spec §4.4): each member
//! is asked `needs_desugaring` first, and only runs its transformation
//! when it answers yes, per the "fast registry scan" contract.

use dexcomp_ir::IRCode;

use crate::context::MethodProcessingContext;
use crate::desugar::{Desugaring, DesugaringEvents};
use crate::errors::OptError;
use crate::pass::Pass;

pub struct DesugaringPass {
    collection: Vec<Box<dyn Desugaring>>,
}

impl Default for DesugaringPass {
    fn default() -> Self {
        DesugaringPass {
            collection: vec![
                Box::new(crate::desugar::TryWithResourcesDesugaring),
                Box::new(crate::desugar::DesugaredLibraryRetargeting::default()),
                Box::new(crate::desugar::InvokeSpecialBridgeSynthesis),
                Box::new(crate::desugar::CovariantReturnTypeExpansion),
            ],
        }
    }
}

impl DesugaringPass {
    /// [crate::desugar::InterfaceMethodRewriting] needs a pool handle
    /// the parameterless `Default` collection doesn't have; callers that
    /// need interface-method rewriting wire one in through here.
    pub fn with_interface_method_rewriting(mut self, rewriting: crate::desugar::InterfaceMethodRewriting) -> Self {
        self.collection.push(Box::new(rewriting));
        self
    }
}

impl Pass for DesugaringPass {
    fn name(&self) -> &'static str {
        "desugaring"
    }

    fn run(&self, ctx: &mut MethodProcessingContext, mut code: IRCode) -> Result<IRCode, OptError> {
        for desugaring in &self.collection {
            if !desugaring.needs_desugaring(&code) {
                continue;
            }
            let mut events = DesugaringEvents::default();
            code = desugaring.desugar(ctx, code, &mut events)?;
            for (method, synthesized) in events.into_synthesized() {
                ctx.synthesized.insert(method, synthesized);
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_ir::{Instruction, InvokeKind};
    use dexcomp_pool::ItemPool;

    #[test]
    fn a_registered_backport_is_applied_through_the_collection() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Ljava/util/Objects;");
        let bool_ty = pool.intern_type(b"Z");
        let obj_ty = pool.intern_type(b"Ljava/lang/Object;");
        let proto = pool.intern_proto(bool_ty, vec![obj_ty]);
        let original = pool.intern_method(holder, proto.clone(), b"isNull");
        let backport = pool.intern_method(pool.intern_type(b"Lj$/util/Objects;"), proto, b"isNull");

        let retargeting = crate::desugar::DesugaredLibraryRetargeting::default();
        retargeting.record_backport(original.clone(), backport.clone());
        let pass = DesugaringPass { collection: vec![Box::new(retargeting)] };

        let ret = pool.intern_type(b"V");
        let m_proto = pool.intern_proto(ret, Vec::new());
        let method = pool.intern_method(pool.intern_type(b"Lcom/app/Foo;"), m_proto, b"m");
        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        code.push_instruction(entry, Instruction::Invoke { result: None, kind: InvokeKind::Static, method: original, arguments: Default::default() });

        let mut ctx = MethodProcessingContext::for_test(false);
        let code = pass.run(&mut ctx, code).unwrap();

        let Instruction::Invoke { method, .. } = code.instruction(code.block(entry).instructions[0]) else {
            panic!("expected Invoke")
        };
        assert_eq!(*method, backport);
    }
}
