//! Typed SSA intermediate representation.
//!
//! Every SSA name is assigned exactly once. Control-flow joins are expressed
//! with `Phi` instructions at the head of the merge block; the Cranelift
//! backend turns those into block parameters.

pub mod builder;
pub mod printer;
pub mod verify;

use crate::typechecker::types::Type;

/// A compiled module
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    /// Module name
    pub name: String,
    /// Functions in declaration order
    pub functions: Vec<Function>,
}

/// A function definition, or an external declaration when it has no blocks
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: Type,
    /// Basic blocks; the first one is the entry block
    pub blocks: Vec<BasicBlock>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
}

/// A basic block (straight-line code with no branches except at the end)
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    BinOp {
        dest: String,
        op: BinOp,
        left: Value,
        right: Value,
    },
    /// Comparison producing a `chr` (0 or 1).
    Compare {
        dest: String,
        cond: Comparison,
        left: Value,
        right: Value,
    },
    Convert {
        dest: String,
        op: Conversion,
        value: Value,
    },
    Call {
        dest: String,
        func: String,
        args: Vec<Value>,
    },
    /// SSA merge: one incoming value per predecessor block label.
    Phi {
        dest: String,
        ty: Type,
        incoming: Vec<(Value, String)>,
    },
}

impl Instruction {
    pub fn dest(&self) -> &str {
        match self {
            Instruction::BinOp { dest, .. }
            | Instruction::Compare { dest, .. }
            | Instruction::Convert { dest, .. }
            | Instruction::Call { dest, .. }
            | Instruction::Phi { dest, .. } => dest,
        }
    }

    /// Values read by this instruction, phi inputs included.
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Instruction::BinOp { left, right, .. } | Instruction::Compare { left, right, .. } => {
                vec![left, right]
            }
            Instruction::Convert { value, .. } => vec![value],
            Instruction::Call { args, .. } => args.iter().collect(),
            Instruction::Phi { incoming, .. } => incoming.iter().map(|(value, _)| value).collect(),
        }
    }
}

/// Block terminator (control flow)
#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Return(Value),
    Branch {
        target: String,
    },
    CondBranch {
        cond: Value,
        then_block: String,
        else_block: String,
    },
    /// Placeholder of a block that has not been closed yet
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> Vec<&str> {
        match self {
            Terminator::Branch { target } => vec![target],
            Terminator::CondBranch {
                then_block,
                else_block,
                ..
            } => vec![then_block, else_block],
            Terminator::Return(_) | Terminator::Unreachable => vec![],
        }
    }
}

/// Arithmetic, split by operand kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    IAdd,
    ISub,
    IMul,
    FAdd,
    FSub,
    FMul,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Unsigned integer less-than
    IntUlt,
    IntNe,
    /// Unordered-or-less-than on doubles
    FloatUlt,
    /// Ordered not-equal on doubles
    FloatOne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Signed 64-bit integer to double
    IntToFloat,
}

/// IR value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SSA name or function parameter
    Var(String),
    Int(i64),
    Float(f64),
    Chr(u8),
    /// Address of a nul-terminated constant string
    Str(String),
}

impl Value {
    /// The zero constant of a numeric type.
    pub fn zero(ty: Type) -> Option<Self> {
        match ty {
            Type::Int => Some(Value::Int(0)),
            Type::Chr => Some(Value::Chr(0)),
            Type::Float => Some(Value::Float(0.0)),
            Type::Str => None,
        }
    }
}

impl Module {
    pub fn new(name: String) -> Self {
        Self {
            name,
            functions: Vec::new(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }
}

impl Function {
    pub fn new(name: String, params: Vec<Parameter>, return_type: Type) -> Self {
        Self {
            name,
            params,
            return_type,
            blocks: Vec::new(),
        }
    }

    /// External declaration without a body.
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Every instruction of the function in block order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|block| block.instructions.iter())
    }
}

impl BasicBlock {
    pub fn new(label: String) -> Self {
        Self {
            label,
            instructions: Vec::new(),
            terminator: Terminator::Unreachable,
        }
    }
}
