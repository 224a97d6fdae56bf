//! Code generation backends

pub mod cranelift;

use crate::ir::Module;
use crate::CompileError;

/// Code generation backend trait
pub trait Backend {
    /// Serialize a verified IR module into a binary module file.
    fn generate(&self, module: &Module) -> Result<Vec<u8>, CompileError>;
}
