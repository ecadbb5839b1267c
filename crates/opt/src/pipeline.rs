//! Wires the fixed pass list together (spec §4.3) and implements the
//! `InvariantViolation`/`TypeCheckFailure` failure semantics: the former
//! is always fatal, the latter degrades to an empty throwing body unless
//! the method is pinned.

use dexcomp_ir::{IRCode, Instruction};
use dexcomp_pool::{DexMethod, DexType};

use crate::context::MethodProcessingContext;
use crate::errors::OptError;
use crate::pass::Pass;

/// Runs `passes` over `code` in order, re-verifying SSA invariants after
/// each one. A [OptError::TypeCheckFailure] on an unpinned method stops
/// the pipeline early and substitutes [finalize_empty_throwing_code]
/// rather than propagating (spec §4.3 "Failure semantics"); every other
/// failure, and a `TypeCheckFailure` on a pinned method, propagates.
pub fn run_method_pipeline(
    passes: &[Box<dyn Pass>],
    ctx: &mut MethodProcessingContext,
    throwable_type: &DexType,
    mut code: IRCode,
) -> Result<IRCode, OptError> {
    for pass in passes {
        if ctx.is_cancelled() {
            return Ok(code);
        }
        code = match pass.run(ctx, code) {
            Ok(code) => code,
            Err(OptError::TypeCheckFailure { pass, reason }) if !ctx.pinned => {
                log::warn!("pass `{pass}` failed to type-check ({reason}), degrading method body");
                return Ok(finalize_empty_throwing_code(code.method().clone(), throwable_type));
            }
            Err(err) => return Err(err),
        };

        if let Err(source) = dexcomp_ir::verify::verify(&code) {
            return Err(OptError::InvariantViolation { pass: pass.name(), source });
        }
    }
    Ok(code)
}

/// Replaces a method body with one that constructs and throws
/// `throwable_type` — the degraded form for a method whose optimized IR
/// failed to type-check (spec §4.3). The method keeps its original
/// signature; only the body changes.
pub fn finalize_empty_throwing_code(method: DexMethod, throwable_type: &DexType) -> IRCode {
    let mut code = IRCode::new(method);
    let entry = code.entry_block();
    let exception = code.new_undefined_value(dexcomp_ir::TypeElement::Reference {
        class: Some(throwable_type.clone()),
        interfaces: Default::default(),
        nullable: false,
    });
    code.push_instruction(
        entry,
        Instruction::NewInstance {
            result: exception,
            class_type: throwable_type.clone(),
        },
    );
    code.push_instruction(entry, Instruction::Throw { exception });
    code
}

#[cfg(test)]
mod tests {
    use super::*;

    use dexcomp_pool::ItemPool;

    fn test_method(pool: &ItemPool) -> DexMethod {
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        pool.intern_method(holder, proto, b"bar")
    }

    struct AlwaysFailsTypeCheck;
    impl Pass for AlwaysFailsTypeCheck {
        fn name(&self) -> &'static str {
            "always-fails-type-check"
        }

        fn run(&self, _ctx: &mut MethodProcessingContext, _code: IRCode) -> Result<IRCode, OptError> {
            Err(OptError::TypeCheckFailure {
                pass: self.name(),
                reason: "simulated failure".to_string(),
            })
        }
    }

    #[test]
    fn type_check_failure_degrades_unpinned_methods_to_a_throwing_body() {
        let pool = ItemPool::new();
        let method = test_method(&pool);
        let throwable = pool.intern_type(b"Ljava/lang/RuntimeException;");
        let code = IRCode::new(method.clone());
        let passes: Vec<Box<dyn Pass>> = vec![Box::new(AlwaysFailsTypeCheck)];
        let mut ctx = MethodProcessingContext::for_test(false);

        let result = run_method_pipeline(&passes, &mut ctx, &throwable, code).unwrap();
        assert_eq!(result.block(result.entry_block()).instructions.len(), 2);
    }

    #[test]
    fn type_check_failure_propagates_for_pinned_methods() {
        let pool = ItemPool::new();
        let method = test_method(&pool);
        let throwable = pool.intern_type(b"Ljava/lang/RuntimeException;");
        let code = IRCode::new(method.clone());
        let passes: Vec<Box<dyn Pass>> = vec![Box::new(AlwaysFailsTypeCheck)];
        let mut ctx = MethodProcessingContext::for_test(true);

        assert!(matches!(
            run_method_pipeline(&passes, &mut ctx, &throwable, code),
            Err(OptError::TypeCheckFailure { .. })
        ));
    }
}
