//! Code generation orchestration
//!
//! Lowers each top-level form in source order, then emits the builtins the
//! program referenced and verifies the finished module:
//! AST -> typed AST -> IR -> verified IR

pub mod lowering;

use log::debug;

use crate::builtins::BuiltinRegistry;
use crate::ir::verify::verify_module;
use crate::ir::Module;
use crate::parser::ast::Program;
use crate::CompileError;

/// Main codegen entry point.
#[derive(Debug, Default)]
pub struct CodeGenerator;

impl CodeGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Compile a parsed program to a verified IR module.
    pub fn compile(
        &self,
        program: &Program,
        builtins: &BuiltinRegistry,
        module_name: &str,
    ) -> Result<Module, CompileError> {
        let mut lowering = lowering::Lowering::new(module_name, builtins);
        for item in &program.items {
            lowering.lower_item(item)?;
        }
        lowering.generate_referenced()?;

        let module = lowering.finish();
        verify_module(&module)?;
        debug!(
            "module '{}' verified with {} function(s)",
            module.name,
            module.functions.len()
        );
        Ok(module)
    }
}
