//! Wave scheduler, concurrency model, `Reporter`/`Diagnostic`,
//! `CompilationOptions` and the top-level compilation driver (spec §4.5,
//! §5, §6, §7).
//!
//! Every other workspace crate is pure with respect to threads;
//! `dexcomp-core` is the only place a method actually gets scheduled
//! onto a worker.

pub mod callgraph;
pub mod driver;
pub mod errors;
pub mod executor;
pub mod options;
pub mod report;
pub mod timing;
pub mod waves;

pub use callgraph::CallGraph;
pub use driver::Compiler;
pub use errors::{CompileError, Origin};
pub use executor::{Executor, RayonExecutor, SequentialExecutor};
pub use options::{CompilationOptions, OutputConsumer, OutputFormat, ProgramInput};
pub use report::{BufferingReporter, Diagnostic, Reporter, Severity};
pub use timing::Timing;
pub use waves::{WaveScheduler, partition_waves};
