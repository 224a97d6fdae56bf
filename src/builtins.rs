//! Library functions that are only emitted into a module when source code
//! calls them.

use crate::ir::builder::FunctionBuilder;
use crate::ir::{Conversion, Value};
use crate::parser::ast::Param;
use crate::typechecker::types::{Signature, Type};
use crate::CompileError;

/// Emits the body of a builtin into the entry block of `builder` and returns
/// the value to return.
pub type Generator = fn(&mut FunctionBuilder, &[Value]) -> Result<Value, CompileError>;

#[derive(Debug, Clone)]
pub struct Builtin {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: Type,
    pub generate: Generator,
    pub referenced: bool,
}

impl Builtin {
    pub fn signature(&self) -> Signature {
        Signature::new(
            self.params.iter().map(|param| param.ty).collect(),
            self.return_type,
        )
    }
}

/// Builtins in registration order.
#[derive(Debug, Clone)]
pub struct BuiltinRegistry {
    entries: Vec<Builtin>,
}

impl BuiltinRegistry {
    /// Registry with the standard library registered.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "itod",
            vec![Param {
                name: "i".to_string(),
                ty: Type::Int,
            }],
            Type::Float,
            generate_itod,
        );
        registry
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers a builtin, replacing any earlier entry of the same name.
    pub fn register(
        &mut self,
        name: &str,
        params: Vec<Param>,
        return_type: Type,
        generate: Generator,
    ) {
        let builtin = Builtin {
            name: name.to_string(),
            params,
            return_type,
            generate,
            referenced: false,
        };
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(existing) => *existing = builtin,
            None => self.entries.push(builtin),
        }
    }

    /// Flags `name` as used. Returns false when no builtin has that name.
    pub fn mark_referenced(&mut self, name: &str) -> bool {
        match self.entries.iter_mut().find(|entry| entry.name == name) {
            Some(entry) => {
                entry.referenced = true;
                true
            }
            None => false,
        }
    }

    pub fn is_referenced(&self, name: &str) -> bool {
        self.get(name).is_some_and(|entry| entry.referenced)
    }

    pub fn get(&self, name: &str) -> Option<&Builtin> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn referenced(&self) -> impl Iterator<Item = &Builtin> {
        self.entries.iter().filter(|entry| entry.referenced)
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_itod(builder: &mut FunctionBuilder, args: &[Value]) -> Result<Value, CompileError> {
    let [value] = args else {
        return Err(CompileError::InvalidIR(format!(
            "itod expects 1 argument, got {}",
            args.len()
        )));
    };
    Ok(builder.ins_convert(Conversion::IntToFloat, value.clone()))
}
