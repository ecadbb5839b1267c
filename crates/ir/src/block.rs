//! Basic blocks: an arena-indexed handle plus the ordered instruction,
//! predecessor, successor and catch-handler lists spec §3 attaches to
//! each one.

use smallvec::SmallVec;

use crate::instruction::InstructionId;
use crate::value::ValueId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

/// One exception handler reachable from a block: the caught type (`None`
/// for a catch-all) and the handler block it transfers to.
#[derive(Debug, Clone)]
pub struct CatchHandler {
    pub exception_type: Option<dexcomp_pool::DexType>,
    pub handler_block: BlockId,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    id: BlockId,
    /// Phis first, matching the convention that every phi in a block
    /// logically executes before any non-phi instruction.
    pub phis: SmallVec<[ValueId; 4]>,
    pub instructions: Vec<InstructionId>,
    pub predecessors: SmallVec<[BlockId; 4]>,
    pub successors: SmallVec<[BlockId; 2]>,
    pub catch_handlers: SmallVec<[CatchHandler; 2]>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        BasicBlock {
            id,
            phis: SmallVec::new(),
            instructions: Vec::new(),
            predecessors: SmallVec::new(),
            successors: SmallVec::new(),
            catch_handlers: SmallVec::new(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn is_catch_block(&self) -> bool {
        !self.catch_handlers.is_empty()
    }
}
