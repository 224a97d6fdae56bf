//! IR pretty-printing for debugging

use super::*;
use std::fmt;

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {} {{", self.name)?;

        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", func)?;
        }

        writeln!(f, "}}")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = if self.is_declaration() { "declare" } else { "fn" };
        write!(f, "  {} {}(", keyword, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", param.name, param.ty)?;
        }
        write!(f, ") -> {}", self.return_type)?;

        if self.is_declaration() {
            return writeln!(f);
        }

        writeln!(f, " {{")?;
        for block in &self.blocks {
            writeln!(f, "    {}:", block.label)?;
            for inst in &block.instructions {
                writeln!(f, "      {}", inst)?;
            }
            writeln!(f, "      {}", block.terminator)?;
        }
        writeln!(f, "  }}")
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::BinOp {
                dest,
                op,
                left,
                right,
            } => write!(f, "{} = {:?} {}, {}", dest, op, left, right),
            Instruction::Compare {
                dest,
                cond,
                left,
                right,
            } => write!(f, "{} = cmp {:?} {}, {}", dest, cond, left, right),
            Instruction::Convert { dest, op, value } => {
                write!(f, "{} = {:?} {}", dest, op, value)
            }
            Instruction::Call { dest, func, args } => {
                write!(f, "{} = call {}(", dest, func)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Instruction::Phi { dest, ty, incoming } => {
                write!(f, "{} = phi {}", dest, ty)?;
                for (i, (value, label)) in incoming.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{}[{}, {}]", sep, value, label)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Return(value) => write!(f, "ret {}", value),
            Terminator::Branch { target } => write!(f, "br {}", target),
            Terminator::CondBranch {
                cond,
                then_block,
                else_block,
            } => write!(f, "brif {}, {}, {}", cond, then_block, else_block),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Var(name) => write!(f, "{}", name),
            Value::Int(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{:?}", value),
            Value::Chr(value) => write!(f, "{}i8", value),
            Value::Str(text) => write!(f, "{:?}", text),
        }
    }
}

/// Print IR to stdout for debugging
pub fn print_ir(module: &Module) {
    println!("{}", module);
}
