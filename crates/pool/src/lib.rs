//! Process-wide interning, structural ordering, and the liveness fact
//! bundle shared by every other crate in the workspace.
//!
//! Nothing here knows about DEX encoding or the SSA IR — this crate is the
//! leaf: identity, descriptors, and the total orders over them.

pub mod call_site;
pub mod errors;
pub mod field;
pub mod interned;
pub mod liveness;
pub mod method;
pub mod method_handle;
pub mod order;
pub mod pool;
pub mod proto;
pub mod types;

pub use call_site::DexCallSite;
pub use errors::PoolError;
pub use field::DexField;
pub use interned::DexString;
pub use liveness::LivenessInfo;
pub use method::DexMethod;
pub use method_handle::{DexMethodHandle, MethodHandleKind, MethodHandleTarget};
pub use pool::ItemPool;
pub use proto::DexProto;
pub use types::DexType;
