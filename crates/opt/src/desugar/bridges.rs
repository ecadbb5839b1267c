//! Invoke-special bridge synthesis (spec §4.4): a call to a private
//! member of a different class in the same nest needs a package-private
//! bridge method on platforms without nestmate access, since
//! `invoke-special` across classes is otherwise illegal.
//!
//! Nest membership comes from a class's `NestHost`/`NestMembers`
//! attributes, which aren't modeled anywhere in this crate's class or IR
//! layer — a documented no-op until that attribute data exists, same as
//! [crate::desugar::try_with_resources::TryWithResourcesDesugaring].

use dexcomp_ir::IRCode;

use crate::context::MethodProcessingContext;
use crate::desugar::{Desugaring, DesugaringEvents};
use crate::errors::OptError;

#[derive(Default)]
pub struct InvokeSpecialBridgeSynthesis;

impl Desugaring for InvokeSpecialBridgeSynthesis {
    fn name(&self) -> &'static str {
        "invoke-special-bridge-synthesis"
    }

    fn needs_desugaring(&self, _code: &IRCode) -> bool {
        false
    }

    fn desugar(&self, _ctx: &mut MethodProcessingContext, code: IRCode, _events: &mut DesugaringEvents) -> Result<IRCode, OptError> {
        Ok(code)
    }
}
