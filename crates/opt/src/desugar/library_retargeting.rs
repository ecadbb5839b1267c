//! Step 19: desugared-library retargeting. Rewrites a call to a library
//! API absent on older runtimes to a backport equivalent — a static
//! helper method shipped alongside the app (the real d8/r8 ships these
//! under a `j$.` package prefix; which package is out of scope here, only
//! the call-site rewrite is).

use dashmap::DashMap;
use dexcomp_ir::{IRCode, Instruction, InvokeKind};
use dexcomp_pool::DexMethod;

use crate::context::MethodProcessingContext;
use crate::desugar::{Desugaring, DesugaringEvents};
use crate::errors::OptError;

/// `original -> backport` map, populated ahead of the wave from whichever
/// desugared-library configuration the driver loaded (spec mentions this
/// only as "backport equivalents"; this crate doesn't ship the actual
/// mapping table, just the mechanism that applies one).
#[derive(Default)]
pub struct DesugaredLibraryRetargeting {
    backports: DashMap<DexMethod, DexMethod>,
}

impl DesugaredLibraryRetargeting {
    pub fn record_backport(&self, original: DexMethod, replacement: DexMethod) {
        self.backports.insert(original, replacement);
    }
}

impl Desugaring for DesugaredLibraryRetargeting {
    fn name(&self) -> &'static str {
        "desugared-library-retargeting"
    }

    fn needs_desugaring(&self, code: &IRCode) -> bool {
        code.blocks().any(|(_, block)| {
            block.instructions.iter().any(|&id| matches!(code.instruction(id), Instruction::Invoke { method, .. } if self.backports.contains_key(method)))
        })
    }

    fn desugar(&self, _ctx: &mut MethodProcessingContext, mut code: IRCode, _events: &mut DesugaringEvents) -> Result<IRCode, OptError> {
        let targets: Vec<_> = code
            .blocks()
            .flat_map(|(_, block)| block.instructions.iter().copied())
            .filter(|&id| matches!(code.instruction(id), Instruction::Invoke { method, .. } if self.backports.contains_key(method)))
            .collect();

        for id in targets {
            let Instruction::Invoke { method, kind, .. } = code.instruction_mut(id) else {
                unreachable!()
            };
            let replacement = self.backports.get(method).unwrap().clone();
            *method = replacement;
            *kind = InvokeKind::Static;
        }
        Ok(code)
    }
}
