//! Small control-flow-graph edits shared by several passes: pruning a
//! dead edge has to keep every affected block's phi operand count in
//! sync with its (now shorter) predecessor list (spec §4.2 invariant),
//! so every pass that removes an edge goes through here instead of
//! poking `predecessors`/`successors`/`phi_operands` directly.

use dexcomp_ir::{BlockId, IRCode};

/// Removes the `from -> to` edge and drops the matching operand from
/// every phi in `to`.
pub fn unlink_edge(code: &mut IRCode, from: BlockId, to: BlockId) {
    let Some(index) = code.block(to).predecessors.iter().position(|&p| p == from) else {
        return;
    };
    code.block_mut(from).successors.retain(|&s| s != to);
    code.block_mut(to).predecessors.remove(index);
    let phis = code.block(to).phis.clone();
    for phi in phis {
        code.value_mut(phi).phi_operands.remove(index);
    }
}
