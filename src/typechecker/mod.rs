pub mod types;

use log::trace;
use thiserror::Error;

use crate::parser::ast::{BinaryOp, Expr, FunctionDef, Param};
use types::{Signature, Type};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("semantic error: {message}")]
pub struct SemanticError {
    pub message: String,
}

impl SemanticError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Resolves callee names to signatures. Implemented by the generation
/// context, which knows the functions declared so far and the builtins.
pub trait SignatureLookup {
    fn lookup(&mut self, name: &str) -> Option<Signature>;
}

/// An expression annotated with the type it evaluates to.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr {
    pub kind: TypedKind,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedKind {
    Int(i64),
    Float(f64),
    Str(String),
    Char(u8),
    /// Index into the parameter list of the enclosing function.
    Argument(usize),
    Binary {
        op: BinaryOp,
        lhs: Box<TypedExpr>,
        rhs: Box<TypedExpr>,
    },
    Call {
        callee: String,
        args: Vec<TypedExpr>,
    },
    If {
        cond: Box<TypedExpr>,
        then_branch: Box<TypedExpr>,
        else_branch: Box<TypedExpr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedFunction {
    pub name: String,
    pub params: Vec<Param>,
    pub body: TypedExpr,
}

impl TypedFunction {
    pub fn signature(&self) -> Signature {
        Signature::new(
            self.params.iter().map(|param| param.ty).collect(),
            self.body.ty,
        )
    }
}

/// Types a function definition. The return type is the type of the body.
pub fn infer_function(
    def: &FunctionDef,
    functions: &mut dyn SignatureLookup,
) -> Result<TypedFunction, SemanticError> {
    let body = infer_expr(&def.body, &def.params, functions)?;
    trace!("function '{}' returns {}", def.name, body.ty);
    Ok(TypedFunction {
        name: def.name.clone(),
        params: def.params.clone(),
        body,
    })
}

pub fn infer_expr(
    expr: &Expr,
    params: &[Param],
    functions: &mut dyn SignatureLookup,
) -> Result<TypedExpr, SemanticError> {
    let result = match expr {
        Expr::Int(value) => typed(TypedKind::Int(*value), Type::Int),
        Expr::Float(value) => typed(TypedKind::Float(*value), Type::Float),
        Expr::Str(value) => typed(TypedKind::Str(value.clone()), Type::Str),
        Expr::Char(value) => {
            let byte = u8::try_from(u32::from(*value)).map_err(|_| {
                SemanticError::new(format!(
                    "character literal {:?} does not fit in a chr",
                    value
                ))
            })?;
            typed(TypedKind::Char(byte), Type::Chr)
        }
        Expr::Argument(name) => {
            let (index, param) = params
                .iter()
                .enumerate()
                .find(|(_, param)| param.name == *name)
                .ok_or_else(|| SemanticError::new(format!("argument not found: {}", name)))?;
            typed(TypedKind::Argument(index), param.ty)
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = infer_expr(lhs, params, functions)?;
            let rhs = infer_expr(rhs, params, functions)?;
            if lhs.ty != rhs.ty {
                return Err(SemanticError::new(format!(
                    "mismatched operand types for '{}': {} and {}",
                    op, lhs.ty, rhs.ty
                )));
            }
            let ty = binary_result_type(*op, lhs.ty)?;
            typed(
                TypedKind::Binary {
                    op: *op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                ty,
            )
        }
        Expr::Call { callee, args } => infer_call(callee, args, params, functions)?,
        Expr::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let cond = infer_expr(cond, params, functions)?;
            if !cond.ty.is_numeric() {
                return Err(SemanticError::new(format!(
                    "if condition must be an integer or float, found {}",
                    cond.ty
                )));
            }
            let then_branch = infer_expr(then_branch, params, functions)?;
            let else_branch = infer_expr(else_branch, params, functions)?;
            if then_branch.ty != else_branch.ty {
                return Err(SemanticError::new(format!(
                    "if arms have different types: then is {}, else is {}",
                    then_branch.ty, else_branch.ty
                )));
            }
            let ty = then_branch.ty;
            typed(
                TypedKind::If {
                    cond: Box::new(cond),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                },
                ty,
            )
        }
        Expr::Function(def) => {
            return Err(SemanticError::new(format!(
                "function '{}' must be defined at the top level",
                def.name
            )))
        }
        Expr::Error(message) => {
            return Err(SemanticError::new(format!(
                "internal error: unparsed expression reached type inference: {}",
                message
            )))
        }
    };
    Ok(result)
}

fn infer_call(
    callee: &str,
    args: &[Expr],
    params: &[Param],
    functions: &mut dyn SignatureLookup,
) -> Result<TypedExpr, SemanticError> {
    let signature = functions
        .lookup(callee)
        .ok_or_else(|| SemanticError::new(format!("unknown function: {}", callee)))?;

    if signature.params.len() != args.len() {
        return Err(SemanticError::new(format!(
            "function '{}' expects {} argument(s), got {}",
            callee,
            signature.params.len(),
            args.len()
        )));
    }

    let mut typed_args = Vec::with_capacity(args.len());
    for (index, (arg, expected)) in args.iter().zip(&signature.params).enumerate() {
        let arg = infer_expr(arg, params, functions)?;
        if arg.ty != *expected {
            return Err(SemanticError::new(format!(
                "argument {} of '{}' expects {}, got {}",
                index + 1,
                callee,
                expected,
                arg.ty
            )));
        }
        typed_args.push(arg);
    }

    Ok(typed(
        TypedKind::Call {
            callee: callee.to_string(),
            args: typed_args,
        },
        signature.ret,
    ))
}

/// Result type of `op` applied to two operands of type `operand`.
pub fn binary_result_type(op: BinaryOp, operand: Type) -> Result<Type, SemanticError> {
    match op {
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply if operand.is_numeric() => {
            Ok(operand)
        }
        BinaryOp::Less if operand.is_numeric() => Ok(Type::Chr),
        _ => Err(SemanticError::new(format!(
            "unknown operator '{}' for type {}",
            op, operand
        ))),
    }
}

fn typed(kind: TypedKind, ty: Type) -> TypedExpr {
    TypedExpr { kind, ty }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Table(HashMap<String, Signature>);

    impl SignatureLookup for Table {
        fn lookup(&mut self, name: &str) -> Option<Signature> {
            self.0.get(name).cloned()
        }
    }

    fn int_param(name: &str) -> Param {
        Param {
            name: name.to_string(),
            ty: Type::Int,
        }
    }

    fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    #[test]
    fn comparison_yields_chr() {
        let expr = binary(BinaryOp::Less, Expr::Int(1), Expr::Int(2));
        let typed = infer_expr(&expr, &[], &mut Table::default()).unwrap();
        assert_eq!(typed.ty, Type::Chr);
    }

    #[test]
    fn arguments_resolve_to_parameter_index() {
        let params = vec![int_param("a"), int_param("b")];
        let typed = infer_expr(&Expr::Argument("b".to_string()), &params, &mut Table::default())
            .unwrap();
        assert_eq!(typed.kind, TypedKind::Argument(1));
    }

    #[test]
    fn int_and_chr_do_not_mix() {
        let expr = binary(BinaryOp::Add, Expr::Int(1), Expr::Char('a'));
        let err = infer_expr(&expr, &[], &mut Table::default()).unwrap_err();
        assert!(err.message.contains("mismatched operand types"));
    }

    #[test]
    fn division_is_unsupported() {
        for op in [BinaryOp::Divide, BinaryOp::Modulo, BinaryOp::Greater] {
            let expr = binary(op, Expr::Int(4), Expr::Int(2));
            let err = infer_expr(&expr, &[], &mut Table::default()).unwrap_err();
            assert!(err.message.contains("unknown operator"), "{}", err);
        }
    }

    #[test]
    fn strings_have_no_operators() {
        let expr = binary(
            BinaryOp::Add,
            Expr::Str("a".to_string()),
            Expr::Str("b".to_string()),
        );
        assert!(infer_expr(&expr, &[], &mut Table::default()).is_err());
    }

    #[test]
    fn call_checks_argument_types() {
        let mut table = Table::default();
        table.0.insert(
            "itod".to_string(),
            Signature::new(vec![Type::Int], Type::Float),
        );
        let call = Expr::Call {
            callee: "itod".to_string(),
            args: vec![Expr::Float(1.0)],
        };
        let err = infer_expr(&call, &[], &mut table).unwrap_err();
        assert!(err.message.contains("expects int, got float"));
    }

    #[test]
    fn wide_char_literal_is_rejected() {
        let err = infer_expr(&Expr::Char('λ'), &[], &mut Table::default()).unwrap_err();
        assert!(err.message.contains("does not fit"));
    }

    #[test]
    fn float_condition_is_allowed() {
        let expr = Expr::If {
            cond: Box::new(Expr::Float(0.5)),
            then_branch: Box::new(Expr::Float(1.0)),
            else_branch: Box::new(Expr::Float(2.0)),
        };
        let typed = infer_expr(&expr, &[], &mut Table::default()).unwrap();
        assert_eq!(typed.ty, Type::Float);
    }
}
