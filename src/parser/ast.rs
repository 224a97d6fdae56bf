use std::fmt;

use crate::typechecker::types::Type;

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub items: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Box<Expr>,
}

impl FunctionDef {
    /// Return type of a declaration-only form: the body is a bare call to one
    /// of the type names, as in `sqrt x_float = float`.
    pub fn declared_return(&self) -> Option<Type> {
        match self.body.as_ref() {
            Expr::Call { callee, args } if args.is_empty() => Type::from_name(callee),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Char(char),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Argument(String),
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    Function(FunctionDef),
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Error(String),
}

impl Expr {
    /// Visits every call site in the tree, outermost first.
    pub fn for_each_call<F>(&self, f: &mut F)
    where
        F: FnMut(&str),
    {
        match self {
            Expr::Call { callee, args } => {
                f(callee);
                for arg in args {
                    arg.for_each_call(f);
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_call(f);
                rhs.for_each_call(f);
            }
            Expr::Function(def) => def.body.for_each_call(f),
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                cond.for_each_call(f);
                then_branch.for_each_call(f);
                else_branch.for_each_call(f);
            }
            Expr::Int(_)
            | Expr::Float(_)
            | Expr::Str(_)
            | Expr::Char(_)
            | Expr::Argument(_)
            | Expr::Error(_) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Less,
    Greater,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '<' => Some(BinaryOp::Less),
            '>' => Some(BinaryOp::Greater),
            '+' => Some(BinaryOp::Add),
            '-' => Some(BinaryOp::Subtract),
            '*' => Some(BinaryOp::Multiply),
            '/' => Some(BinaryOp::Divide),
            '%' => Some(BinaryOp::Modulo),
            _ => None,
        }
    }

    /// Binding power; higher binds tighter.
    pub fn precedence(self) -> i32 {
        match self {
            BinaryOp::Less | BinaryOp::Greater => 10,
            BinaryOp::Add | BinaryOp::Subtract => 20,
            BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => 40,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            BinaryOp::Less => '<',
            BinaryOp::Greater => '>',
            BinaryOp::Add => '+',
            BinaryOp::Subtract => '-',
            BinaryOp::Multiply => '*',
            BinaryOp::Divide => '/',
            BinaryOp::Modulo => '%',
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(value) => write!(f, "Int: {}", value),
            Expr::Float(value) => write!(f, "Float: {:?}", value),
            Expr::Str(value) => write!(f, "String: {:?}", value),
            Expr::Char(value) => write!(f, "Char: {:?} / {}", value, u32::from(*value)),
            Expr::Binary { op, lhs, rhs } => {
                write!(f, "Binop: {} Left: ({}) Right: ({})", op, lhs, rhs)
            }
            Expr::Argument(name) => write!(f, "Argument: {}", name),
            Expr::Call { callee, args } => {
                write!(f, "Call: {} [", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, "]")
            }
            Expr::Function(def) => {
                write!(f, "Function: {} [", def.name)?;
                for (i, param) in def.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, "] Body: ({})", def.body)
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => write!(
                f,
                "If: ({}) Then: ({}) Else: ({})",
                cond, then_branch, else_branch
            ),
            Expr::Error(message) => write!(f, "Error: {}", message),
        }
    }
}
