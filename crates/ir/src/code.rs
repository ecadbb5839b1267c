//! `IRCode`: the arena container spec §3 describes as "(entry block,
//! ordered block list, value-number generator, method context)".

use dexcomp_pool::DexMethod;

use crate::block::{BasicBlock, BlockId};
use crate::instruction::{Instruction, InstructionId};
use crate::value::{TypeElement, Value, ValueId};

/// One method's SSA program. Blocks, values and instructions are dense
/// arenas indexed by [BlockId]/[ValueId]/[InstructionId] — never pointers,
/// per the arena-plus-handle pattern for cyclic def/use and control-flow
/// graphs.
#[derive(Debug, Clone)]
pub struct IRCode {
    method: DexMethod,
    entry_block: BlockId,
    blocks: Vec<BasicBlock>,
    values: Vec<Value>,
    instructions: Vec<Instruction>,
    /// Formal parameter values, in calling-convention order (the
    /// receiver first for an instance method). Populated once by the
    /// builder as it seeds the entry block; [crate::verify] does not
    /// check these since they're positional, not instruction-defined.
    arguments: Vec<ValueId>,
}

impl IRCode {
    /// An empty program with a single, empty entry block. Builders append
    /// blocks/values/instructions via the `new_*` helpers as they walk the
    /// source bytecode.
    pub fn new(method: DexMethod) -> Self {
        let entry_block = BlockId(0);
        IRCode {
            method,
            entry_block,
            blocks: vec![BasicBlock::new(entry_block)],
            values: Vec::new(),
            instructions: Vec::new(),
            arguments: Vec::new(),
        }
    }

    pub fn method(&self) -> &DexMethod {
        &self.method
    }

    /// Records the method's formal parameter values, in order. Called
    /// once by the builder after it seeds the entry block.
    pub fn set_arguments(&mut self, arguments: Vec<ValueId>) {
        self.arguments = arguments;
    }

    pub fn arguments(&self) -> &[ValueId] {
        &self.arguments
    }

    pub fn entry_block(&self) -> BlockId {
        self.entry_block
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &BasicBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId(i as u32), b))
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id));
        id
    }

    pub fn value(&self, id: ValueId) -> &Value {
        &self.values[id.0 as usize]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut Value {
        &mut self.values[id.0 as usize]
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> impl Iterator<Item = (ValueId, &Value)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (ValueId(i as u32), v))
    }

    /// Allocates a fresh [ValueId] with no defining instruction yet — used
    /// for method arguments and for phi values, both of which are
    /// "defined" by their position rather than an [Instruction].
    pub fn new_undefined_value(&mut self, type_element: TypeElement) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(Value {
            id,
            type_element,
            debug_local: None,
            definition: None,
            users: Default::default(),
            phi_block: None,
            phi_operands: Default::default(),
        });
        id
    }

    pub fn instruction(&self, id: InstructionId) -> &Instruction {
        &self.instructions[id.0 as usize]
    }

    /// The instruction that defines `value`, if any — `None` for method
    /// arguments and phis, whose "definition" is positional rather than
    /// an [Instruction]. A thin convenience over `value().definition`
    /// that every constant-folding and pattern-matching pass reaches for.
    pub fn definition(&self, value: ValueId) -> Option<&Instruction> {
        self.values[value.0 as usize].definition.map(|id| &self.instructions[id.0 as usize])
    }

    pub fn instruction_mut(&mut self, id: InstructionId) -> &mut Instruction {
        &mut self.instructions[id.0 as usize]
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Appends `instruction` to `block`, registers it as the definition of
    /// its `result` value (if any), and records it in the user list of
    /// every operand it reads — maintaining the bidirectional def/use
    /// links spec §3 requires as an invariant.
    pub fn push_instruction(&mut self, block: BlockId, instruction: Instruction) -> InstructionId {
        let id = InstructionId(self.instructions.len() as u32);
        let operands = instruction.operands();
        let result = instruction.result();
        self.instructions.push(instruction);
        self.blocks[block.0 as usize].instructions.push(id);
        if let Some(result) = result {
            self.values[result.0 as usize].definition = Some(id);
        }
        for operand in operands {
            self.values[operand.0 as usize].users.push(id);
        }
        id
    }

    /// Adds `phi` to `block`'s phi list, tagging it as a phi defined at
    /// that join point.
    pub fn push_phi(&mut self, block: BlockId, phi: ValueId) {
        self.values[phi.0 as usize].phi_block = Some(block);
        self.blocks[block.0 as usize].phis.push(phi);
    }

    /// Fills in a phi's operand list once every predecessor's exit
    /// register state is known (second pass of SSA construction, after
    /// all blocks have been visited once).
    pub fn set_phi_operands(&mut self, phi: ValueId, operands: smallvec::SmallVec<[ValueId; 4]>) {
        self.values[phi.0 as usize].phi_operands = operands;
    }

    /// Links `from -> to` as predecessor/successor, keeping both sides of
    /// the bidirectional edge consistent in one call.
    pub fn link(&mut self, from: BlockId, to: BlockId) {
        self.blocks[from.0 as usize].successors.push(to);
        self.blocks[to.0 as usize].predecessors.push(from);
    }

    /// Rewrites every use of `old` to `new` and merges `old`'s user list
    /// into `new`'s, leaving `old` orphaned in the arena. The standard
    /// "replace all uses with" SSA primitive optimization passes fold,
    /// forward, or eliminate a value through.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        let users = std::mem::take(&mut self.values[old.0 as usize].users);
        for &user in &users {
            self.instructions[user.0 as usize].replace_operand(old, new);
        }
        self.values[new.0 as usize].users.extend(users);
    }

    /// Removes `instruction` from `block`'s instruction list and drops it
    /// from every operand's user list. The instruction's storage slot in
    /// the arena is left in place — dead-code removal orphans entries
    /// rather than compacting ids, matching the arena-plus-handle pattern.
    pub fn remove_instruction(&mut self, block: BlockId, instruction: InstructionId) {
        self.blocks[block.0 as usize].instructions.retain(|&id| id != instruction);
        for operand in self.instructions[instruction.0 as usize].operands() {
            self.values[operand.0 as usize].users.retain(|&id| id != instruction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Instruction;
    use crate::value::PrimitiveType;
    use dexcomp_pool::ItemPool;

    fn test_method(pool: &ItemPool) -> DexMethod {
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        pool.intern_method(holder, proto, b"bar")
    }

    #[test]
    fn pushing_an_instruction_updates_def_and_use_lists() {
        let pool = ItemPool::new();
        let mut code = IRCode::new(test_method(&pool));
        let entry = code.entry_block();
        let a = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        let b = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        let result = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));

        let instr_id = code.push_instruction(
            entry,
            Instruction::Binary {
                result,
                op: crate::instruction::BinaryOp::Add,
                lhs: a,
                rhs: b,
            },
        );

        assert_eq!(code.value(result).definition, Some(instr_id));
        assert!(code.value(a).users.contains(&instr_id));
        assert!(code.value(b).users.contains(&instr_id));
        assert_eq!(code.block(entry).instructions, vec![instr_id]);
    }

    #[test]
    fn replacing_all_uses_rewrites_every_consumer_and_merges_user_lists() {
        let pool = ItemPool::new();
        let mut code = IRCode::new(test_method(&pool));
        let entry = code.entry_block();
        let a = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        let b = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        let folded = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        let result = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        let add = code.push_instruction(
            entry,
            Instruction::Binary { result, op: crate::instruction::BinaryOp::Add, lhs: a, rhs: b },
        );

        code.replace_all_uses(result, folded);

        assert!(code.value(folded).users.contains(&add));
        assert!(code.value(result).users.is_empty());
    }

    #[test]
    fn removing_an_instruction_drops_it_from_every_operand_user_list() {
        let pool = ItemPool::new();
        let mut code = IRCode::new(test_method(&pool));
        let entry = code.entry_block();
        let a = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        let result = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        let neg = code.push_instruction(
            entry,
            Instruction::Unary { result, op: crate::instruction::UnaryOp::Neg, operand: a },
        );

        code.remove_instruction(entry, neg);

        assert!(!code.block(entry).instructions.contains(&neg));
        assert!(!code.value(a).users.contains(&neg));
    }

    #[test]
    fn linking_blocks_is_bidirectional() {
        let pool = ItemPool::new();
        let mut code = IRCode::new(test_method(&pool));
        let entry = code.entry_block();
        let next = code.new_block();
        code.link(entry, next);

        assert_eq!(code.block(entry).successors.as_slice(), &[next]);
        assert_eq!(code.block(next).predecessors.as_slice(), &[entry]);
    }

    #[test]
    fn phi_values_are_tagged_with_their_block() {
        let pool = ItemPool::new();
        let mut code = IRCode::new(test_method(&pool));
        let entry = code.entry_block();
        let phi = code.new_undefined_value(TypeElement::Primitive(PrimitiveType::Int));
        code.push_phi(entry, phi);

        assert!(code.value(phi).is_phi());
        assert_eq!(code.block(entry).phis.as_slice(), &[phi]);
    }
}
