mod executor;
mod local;
mod output;
mod remote;

pub use executor::{BackendError, CompilationExecutor, CompileError, CompilerBackend};
pub use local::LocalCompiler;
pub use output::{CompilationOutput, CompilationResult};
pub use remote::RemoteCompiler;
