//! The desugaring collection (spec §4.4): a set of per-method
//! transformations, each reporting whether it applies to a given method
//! before running, composed behind one entry point
//! ([crate::passes::desugaring_pass::DesugaringPass]). Transformations
//! that synthesize new methods (a companion class, a lambda class, a
//! bridge) report them through [DesugaringEvents] rather than a callback,
//! since every desugaring in the collection shares one sink for the wave
//! scheduler to drain.

mod bridges;
mod covariant_return;
mod interface_methods;
mod library_retargeting;
mod try_with_resources;

pub use bridges::InvokeSpecialBridgeSynthesis;
pub use covariant_return::CovariantReturnTypeExpansion;
pub use interface_methods::InterfaceMethodRewriting;
pub use library_retargeting::DesugaredLibraryRetargeting;
pub use try_with_resources::TryWithResourcesDesugaring;

use dexcomp_ir::IRCode;
use dexcomp_pool::{DexMethod, ItemPool};

use crate::context::MethodProcessingContext;
use crate::errors::OptError;

/// Collects methods synthesized while desugaring one method body.
#[derive(Default)]
pub struct DesugaringEvents {
    synthesized: Vec<(DexMethod, IRCode)>,
}

impl DesugaringEvents {
    pub fn emit(&mut self, method: DexMethod, code: IRCode) {
        self.synthesized.push((method, code));
    }

    pub fn into_synthesized(self) -> Vec<(DexMethod, IRCode)> {
        self.synthesized
    }
}

/// One member of the desugaring collection. `needs_desugaring` is a fast
/// registry scan so the driver can skip methods untouched by a given
/// transformation without running its full logic.
pub trait Desugaring: Send + Sync {
    fn name(&self) -> &'static str;
    fn needs_desugaring(&self, code: &IRCode) -> bool;
    fn desugar(&self, ctx: &mut MethodProcessingContext, code: IRCode, events: &mut DesugaringEvents) -> Result<IRCode, OptError>;
}

/// Interns a fresh type for a synthesized class, named by appending a
/// process-unique suffix to `from`'s descriptor (minus its trailing `;`).
pub(crate) fn synthetic_companion_type(pool: &ItemPool, from: &dexcomp_pool::DexType, ctx: &MethodProcessingContext) -> dexcomp_pool::DexType {
    let mut descriptor = from.descriptor().as_bytes().to_vec();
    descriptor.pop();
    let suffix = ctx.fresh_synthetic_name("-CC");
    descriptor.extend_from_slice(format!("${suffix};").as_bytes());
    pool.intern_type(&descriptor)
}
