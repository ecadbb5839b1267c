//! IR construction from the two method-body shapes a [dexcomp_dex::Code]
//! can hold (spec §4.2).

mod cf;
mod decode;
mod dex;

pub use cf::{CfConstantPool, build_from_cf_code};
pub use dex::build_from_dex_code;
