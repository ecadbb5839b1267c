//! DEX container data model: header, classes, the class graph, encoded
//! members and code, parsing from bytes, index-and-offset assembly, and
//! bytecode lowering from the SSA IR into concrete DEX instructions.

pub mod access_flags;
pub mod assembly;
pub mod class;
pub mod code;
pub mod errors;
pub mod graph;
pub mod header;
pub mod image;
pub mod lowering;
pub mod parse;

pub use access_flags::AccessFlags;
pub use assembly::{AssembledIndex, ExtraReferences};
pub use class::{ClassKind, DexClass, DexEncodedField, DexEncodedMethod, EncodedValue};
pub use code::{CfCode, Code, DexCode};
pub use errors::DexError;
pub use graph::ClassGraph;
pub use header::{DexHeader, DexVersion};
pub use image::DexImage;
pub use parse::{DexIndexTables, ParsedDex, parse};
