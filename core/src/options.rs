//! The command surface a compilation is parameterized by (spec §6
//! "Command surface"), plus the two already-parsed program-input shapes
//! this crate accepts (parsing the input container itself — zip/apk
//! reading — is out of scope, spec §1).

use std::collections::HashMap;
use std::path::PathBuf;

use dexcomp_dex::{DexClass, DexIndexTables};
use dexcomp_ir::builder::CfConstantPool;
use dexcomp_pool::LivenessInfo;

/// A program class read from a DEX file, paired with the index tables
/// that resolve its code items' raw instruction operands.
pub struct DexProgramUnit {
    pub classes: Vec<DexClass>,
    pub tables: DexIndexTables,
}

/// A single class read from a `.class` file, paired with the constant
/// pool that resolves its bytecode's operands.
pub struct ClassFileProgramUnit {
    pub class: DexClass,
    pub pool: CfConstantPool,
}

/// The shape the program's own sources were read in. Classpath/library
/// sources never need this — they contribute only declarations to the
/// [dexcomp_dex::ClassGraph], never bodies to build IR from.
pub enum ProgramInput {
    Dex(Vec<DexProgramUnit>),
    ClassFiles(Vec<ClassFileProgramUnit>),
}

/// Where the finished DEX (or class-file) output should go (spec §6
/// "output consumer").
pub enum OutputConsumer {
    Directory(PathBuf),
    Archive(PathBuf),
    InMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Dex,
    ClassFiles,
}

/// A compilation's full parameter set (spec §6). Built with the
/// `with_*` builder methods, mirroring the rest of the workspace's
/// configuration surfaces.
pub struct CompilationOptions {
    pub program: ProgramInput,
    /// Declarations-only sources resolvable at compile time but not
    /// re-emitted (e.g. the app's own modules not currently targeted).
    pub classpath: Vec<DexClass>,
    /// Declarations-only sources never re-emitted (the Android platform
    /// API surface, other libraries).
    pub library: Vec<DexClass>,
    pub min_api: u32,
    pub output_format: OutputFormat,
    pub output: OutputConsumer,
    pub desugar: bool,
    /// Deobfuscation map, consumed as an opaque table (spec §6 "Proguard
    /// map input"); parsing the map file itself is out of scope.
    pub proguard_map: Option<HashMap<String, String>>,
    pub feature_split_map: Option<HashMap<String, String>>,
    /// Liveness facts computed by an external shrinker (spec §2, §4.3);
    /// `None` means "nothing was shrunk, treat everything as live".
    pub liveness: Option<LivenessInfo>,
}

impl CompilationOptions {
    pub fn new(program: ProgramInput, min_api: u32, output_format: OutputFormat, output: OutputConsumer) -> Self {
        CompilationOptions {
            program,
            classpath: Vec::new(),
            library: Vec::new(),
            min_api,
            output_format,
            output,
            desugar: true,
            proguard_map: None,
            feature_split_map: None,
            liveness: None,
        }
    }

    pub fn with_classpath(mut self, classpath: Vec<DexClass>) -> Self {
        self.classpath = classpath;
        self
    }

    pub fn with_library(mut self, library: Vec<DexClass>) -> Self {
        self.library = library;
        self
    }

    pub fn with_desugar(mut self, desugar: bool) -> Self {
        self.desugar = desugar;
        self
    }

    pub fn with_proguard_map(mut self, map: HashMap<String, String>) -> Self {
        self.proguard_map = Some(map);
        self
    }

    pub fn with_feature_split_map(mut self, map: HashMap<String, String>) -> Self {
        self.feature_split_map = Some(map);
        self
    }

    pub fn with_liveness(mut self, liveness: LivenessInfo) -> Self {
        self.liveness = Some(liveness);
        self
    }

    /// Rejects combinations the driver refuses to even start with (spec
    /// §7 `ConfigurationError`, "fatal before processing starts").
    pub fn validate(&self) -> Result<(), crate::errors::CompileError> {
        if self.desugar && self.min_api == 0 {
            return Err(crate::errors::CompileError::ConfigurationError(
                "desugaring requires a min-api level to decide which language features need rewriting".to_string(),
            ));
        }
        if matches!(self.output_format, OutputFormat::ClassFiles) && matches!(self.output, OutputConsumer::Archive(_)) {
            return Err(crate::errors::CompileError::ConfigurationError(
                "class-file output does not support archive consumers, only directory or in-memory".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desugaring_without_a_min_api_is_rejected() {
        let options = CompilationOptions::new(ProgramInput::Dex(Vec::new()), 0, OutputFormat::Dex, OutputConsumer::InMemory);
        assert!(options.validate().is_err());
    }

    #[test]
    fn class_file_output_to_an_archive_is_rejected() {
        let options = CompilationOptions::new(ProgramInput::Dex(Vec::new()), 21, OutputFormat::ClassFiles, OutputConsumer::Archive(PathBuf::from("out.jar")))
            .with_desugar(false);
        assert!(options.validate().is_err());
    }

    #[test]
    fn a_plain_dex_in_memory_compile_validates() {
        let options = CompilationOptions::new(ProgramInput::Dex(Vec::new()), 21, OutputFormat::Dex, OutputConsumer::InMemory);
        assert!(options.validate().is_ok());
    }
}
