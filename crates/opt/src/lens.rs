//! Graph lenses (spec §4.6): a composable, monotone mapping from original
//! references to their current ones, threaded through every pass so a
//! rewrite (inlining, interface retargeting, class merging) never has to
//! rewrite every existing instruction in place — later passes just look
//! the reference up through the lens chain.

use std::sync::Arc;

use dashmap::DashMap;
use dexcomp_ir::InvokeKind;
use dexcomp_pool::{DexField, DexMethod, DexType};
use once_cell::sync::Lazy;

/// A monotone, idempotent reference rewriter. Default methods are the
/// identity; a lens only needs to override what it actually changes.
/// "Idempotent" here means `lens.lookup_method(lens.lookup_method(m)) ==
/// lens.lookup_method(m))` for every lens this module builds — each one
/// resolves straight through to the final reference rather than one hop
/// at a time.
pub trait GraphLens: Send + Sync {
    fn lookup_type(&self, original: &DexType) -> DexType {
        original.clone()
    }

    fn lookup_field(&self, original: &DexField) -> DexField {
        original.clone()
    }

    fn lookup_method(&self, original: &DexMethod) -> DexMethod {
        original.clone()
    }

    /// The invoke kind to use at call sites of `method` after rewriting,
    /// e.g. `Interface` to `Static` once retargeted to a companion class
    /// (spec §4.4 interface-method rewriting).
    fn lookup_invoke_type(&self, original_kind: InvokeKind, _method: &DexMethod) -> InvokeKind {
        original_kind
    }
}

/// The no-op lens. Exposed as a process-wide singleton so passes that
/// don't need a lens can share one `Arc` instead of allocating.
pub struct IdentityLens;

impl GraphLens for IdentityLens {}

static IDENTITY_LENS: Lazy<Arc<dyn GraphLens>> = Lazy::new(|| Arc::new(IdentityLens));

pub fn identity_lens() -> Arc<dyn GraphLens> {
    IDENTITY_LENS.clone()
}

/// Composes two lenses: looks a reference up through `inner` first, then
/// resolves the result through `outer`. Building a chain this way keeps
/// each individual lens simple and total-order-independent of the others.
pub struct ComposedLens {
    inner: Arc<dyn GraphLens>,
    outer: Arc<dyn GraphLens>,
}

impl ComposedLens {
    pub fn new(inner: Arc<dyn GraphLens>, outer: Arc<dyn GraphLens>) -> Arc<dyn GraphLens> {
        Arc::new(ComposedLens { inner, outer })
    }
}

impl GraphLens for ComposedLens {
    fn lookup_type(&self, original: &DexType) -> DexType {
        self.outer.lookup_type(&self.inner.lookup_type(original))
    }

    fn lookup_field(&self, original: &DexField) -> DexField {
        self.outer.lookup_field(&self.inner.lookup_field(original))
    }

    fn lookup_method(&self, original: &DexMethod) -> DexMethod {
        self.outer.lookup_method(&self.inner.lookup_method(original))
    }

    fn lookup_invoke_type(&self, original_kind: InvokeKind, method: &DexMethod) -> InvokeKind {
        let retargeted = self.inner.lookup_method(method);
        self.outer
            .lookup_invoke_type(self.inner.lookup_invoke_type(original_kind, method), &retargeted)
    }
}

/// Retargets interface-method invocations to their companion-class
/// static equivalent (spec §4.4 "interface-method rewriting"). Populated
/// incrementally as the desugaring pass moves default methods out of
/// interfaces; a `DashMap` rather than a plain map since passes within a
/// wave may populate and query it across worker threads (spec §5).
#[derive(Default)]
pub struct InterfaceProcessorLens {
    retargeted: DashMap<DexMethod, DexMethod>,
}

impl InterfaceProcessorLens {
    pub fn new() -> Self {
        InterfaceProcessorLens::default()
    }

    /// Records that calls to `original` (an interface default method)
    /// should resolve to `companion` (its static twin on the companion
    /// class) from now on.
    pub fn record_retarget(&self, original: DexMethod, companion: DexMethod) {
        self.retargeted.insert(original, companion);
    }
}

impl GraphLens for InterfaceProcessorLens {
    fn lookup_method(&self, original: &DexMethod) -> DexMethod {
        match self.retargeted.get(original) {
            Some(companion) => companion.clone(),
            None => original.clone(),
        }
    }

    fn lookup_invoke_type(&self, original_kind: InvokeKind, method: &DexMethod) -> InvokeKind {
        if self.retargeted.contains_key(method) {
            InvokeKind::Static
        } else {
            original_kind
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dexcomp_pool::ItemPool;

    fn method(pool: &ItemPool, name: &[u8]) -> DexMethod {
        let holder = pool.intern_type(b"Lcom/app/Foo;");
        let ret = pool.intern_type(b"V");
        let proto = pool.intern_proto(ret, Vec::new());
        pool.intern_method(holder, proto, name)
    }

    #[test]
    fn identity_lens_changes_nothing() {
        let pool = ItemPool::new();
        let m = method(&pool, b"bar");
        assert_eq!(identity_lens().lookup_method(&m), m);
    }

    #[test]
    fn interface_processor_lens_retargets_recorded_methods_only() {
        let pool = ItemPool::new();
        let original = method(&pool, b"bar");
        let companion = method(&pool, b"bar$companion");
        let lens = InterfaceProcessorLens::new();
        lens.record_retarget(original.clone(), companion.clone());

        assert_eq!(lens.lookup_method(&original), companion);
        assert_eq!(lens.lookup_invoke_type(InvokeKind::Interface, &original), InvokeKind::Static);

        let untouched = method(&pool, b"baz");
        assert_eq!(lens.lookup_method(&untouched), untouched);
    }

    #[test]
    fn composed_lens_resolves_through_both_hops() {
        let pool = ItemPool::new();
        let original = method(&pool, b"bar");
        let companion = method(&pool, b"bar$companion");
        let first = InterfaceProcessorLens::new();
        first.record_retarget(original.clone(), companion.clone());
        let first: Arc<dyn GraphLens> = Arc::new(first);

        let composed = ComposedLens::new(first, identity_lens());
        assert_eq!(composed.lookup_method(&original), companion);
    }
}
