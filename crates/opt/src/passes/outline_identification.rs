//! Step 22: outline identification (spec §4.3: "record candidates for
//! later outlining (not performed this wave)"). A read-only observer —
//! it never rewrites the method, only records blocks whose instruction
//! count clears a threshold as candidates a later, whole-program
//! outlining pass (out of scope here) could hoist into a shared helper.
//!
//! Threshold-based rather than pattern-matched: finding which blocks are
//! textually *identical* across methods needs a program-wide hash index,
//! which belongs to the driver that owns every method's IR at once, not
//! to a single method's pipeline run. This pass only flags the blocks
//! long enough to be worth that later comparison.

use dashmap::DashMap;
use dexcomp_ir::{BlockId, IRCode};
use dexcomp_pool::DexMethod;

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

const DEFAULT_CANDIDATE_THRESHOLD: usize = 8;

pub struct OutlineIdentification {
    threshold: usize,
    candidates: DashMap<(DexMethod, BlockId), usize>,
}

impl Default for OutlineIdentification {
    fn default() -> Self {
        OutlineIdentification { threshold: DEFAULT_CANDIDATE_THRESHOLD, candidates: DashMap::new() }
    }
}

impl OutlineIdentification {
    pub fn candidates(&self) -> Vec<(DexMethod, BlockId, usize)> {
        self.candidates.iter().map(|entry| (entry.key().0.clone(), entry.key().1, *entry.value())).collect()
    }
}

impl Pass for OutlineIdentification {
    fn name(&self) -> &'static str {
        "outline-identification"
    }

    fn run(&self, _ctx: &mut MethodProcessingContext, code: IRCode) -> Result<IRCode, OptError> {
        for (block_id, block) in code.blocks() {
            if block.instructions.len() >= self.threshold {
                self.candidates.insert((code.method().clone(), block_id), block.instructions.len());
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_ir::{BinaryOp, Instruction, PrimitiveType};
    use dexcomp_pool::ItemPool;

    #[test]
    fn a_long_block_is_recorded_as_a_candidate() {
        let pool = ItemPool::new();
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        let method = pool.intern_method(holder, proto, b"m");

        let mut code = IRCode::new(method);
        let entry = code.entry_block();
        let mut acc = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
        code.push_instruction(entry, Instruction::Const { result: acc, bits: 0 });
        for i in 0..10 {
            let one = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
            code.push_instruction(entry, Instruction::Const { result: one, bits: i });
            let next = code.new_undefined_value(dexcomp_ir::TypeElement::Primitive(PrimitiveType::Int));
            code.push_instruction(entry, Instruction::Binary { result: next, op: BinaryOp::Add, lhs: acc, rhs: one });
            acc = next;
        }

        let pass = OutlineIdentification::default();
        let mut ctx = MethodProcessingContext::for_test(false);
        let code = pass.run(&mut ctx, code).unwrap();

        let candidates = pass.candidates();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].1, entry);
        assert_eq!(candidates[0].2, code.block(entry).instructions.len());
    }
}
