//! [`DexCallSite`]: an `invoke-custom` call site (bootstrap method handle,
//! invoked name, invoked prototype). Structurally present alongside the
//! other interned tables (spec §4.7 step 5); nothing in this workspace's
//! instruction set currently produces one, since `invoke-custom` itself
//! isn't modeled by [`dexcomp_ir`]'s `Instruction::Invoke`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;

use crate::interned::DexString;
use crate::method_handle::DexMethodHandle;
use crate::proto::DexProto;

#[derive(Debug)]
struct DexCallSiteData {
    bootstrap_method: DexMethodHandle,
    method_name: DexString,
    method_proto: DexProto,
}

#[derive(Clone)]
pub struct DexCallSite(Arc<DexCallSiteData>);

impl PartialEq for DexCallSite {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for DexCallSite {}

impl Hash for DexCallSite {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for DexCallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DexCallSite({})", self.method_name().as_str())
    }
}

impl DexCallSite {
    pub fn bootstrap_method(&self) -> &DexMethodHandle {
        &self.0.bootstrap_method
    }

    pub fn method_name(&self) -> &DexString {
        &self.0.method_name
    }

    pub fn method_proto(&self) -> &DexProto {
        &self.0.method_proto
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct CallSiteKey {
    bootstrap_method: DexMethodHandle,
    method_name: DexString,
    method_proto: DexProto,
}

#[derive(Default)]
pub struct CallSiteTable {
    by_signature: DashMap<CallSiteKey, DexCallSite>,
}

impl CallSiteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&self, bootstrap_method: DexMethodHandle, method_name: DexString, method_proto: DexProto) -> DexCallSite {
        let key = CallSiteKey {
            bootstrap_method: bootstrap_method.clone(),
            method_name: method_name.clone(),
            method_proto: method_proto.clone(),
        };
        if let Some(existing) = self.by_signature.get(&key) {
            return existing.clone();
        }
        let handle = DexCallSite(Arc::new(DexCallSiteData { bootstrap_method, method_name, method_proto }));
        self.by_signature.entry(key).or_insert_with(|| handle.clone()).clone()
    }

    pub fn len(&self) -> usize {
        self.by_signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_signature.is_empty()
    }
}
