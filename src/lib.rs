//! tarn: a small compiler for an expression language.
//!
//! Source text is scanned and parsed into one AST per top-level form, each
//! form is type checked and lowered into a typed SSA module, and the module
//! is handed to Cranelift, which writes a relocatable object file.

pub mod backend;
pub mod builtins;
pub mod codegen;
pub mod errors;
pub mod ir;
pub mod lexer;
pub mod parser;
pub mod typechecker;

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use thiserror::Error;

use backend::cranelift::CraneliftBackend;
use backend::Backend;
use builtins::BuiltinRegistry;
use codegen::CodeGenerator;
use parser::{ParseError, Parser};
use typechecker::SemanticError;

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Syntax(#[from] ParseError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    /// IR verification failed
    #[error("invalid IR: {0}")]
    InvalidIR(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("failed to {action} '{}': {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Main compiler interface
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    /// Module name used when none is derived from a file name.
    pub module_name: Option<String>,
    /// Print the IR module to stdout before code generation.
    pub emit_ir: bool,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile source text into a verified IR module.
    pub fn compile_source(&self, source: &str, module_name: &str) -> Result<ir::Module, CompileError> {
        let mut builtins = BuiltinRegistry::new();
        let program = Parser::new(source, &mut builtins).parse_program()?;
        debug!("parsed {} top-level form(s)", program.items.len());

        let module = CodeGenerator::new().compile(&program, &builtins, module_name)?;
        if self.emit_ir {
            ir::printer::print_ir(&module);
        }
        Ok(module)
    }

    /// Compile source text into object file bytes.
    pub fn compile_to_object(&self, source: &str, module_name: &str) -> Result<Vec<u8>, CompileError> {
        let module = self.compile_source(source, module_name)?;
        CraneliftBackend::new().generate(&module)
    }

    /// Compile the file at `path` and write the object next to it as
    /// `<path>s`. Nothing is written when compilation fails.
    pub fn compile_file(&self, path: &Path) -> Result<PathBuf, CompileError> {
        let source = read_source(path)?;
        self.compile_loaded_file(path, &source)
    }

    /// Like [`Compiler::compile_file`] for a source the caller already read
    /// from `path`.
    pub fn compile_loaded_file(&self, path: &Path, source: &str) -> Result<PathBuf, CompileError> {
        let module_name = match &self.module_name {
            Some(name) => name.clone(),
            None => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "main".to_string()),
        };
        let bytes = self.compile_to_object(source, &module_name)?;

        let output = output_path(path);
        fs::write(&output, &bytes).map_err(|source| CompileError::Io {
            action: "write",
            path: output.clone(),
            source,
        })?;
        info!("wrote {} bytes to {}", bytes.len(), output.display());
        Ok(output)
    }
}

/// Read a source file, reporting failure as [`CompileError::Io`].
pub fn read_source(path: &Path) -> Result<String, CompileError> {
    fs::read_to_string(path).map_err(|source| CompileError::Io {
        action: "read",
        path: path.to_path_buf(),
        source,
    })
}

/// `prog.tn` compiles to `prog.tns`.
pub fn output_path(input: &Path) -> PathBuf {
    let mut name = OsString::from(input.as_os_str());
    name.push("s");
    PathBuf::from(name)
}
