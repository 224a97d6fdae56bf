//! Typed AST to IR lowering
//!
//! `Lowering` is the generation context: it owns the module being built and
//! the table of functions declared so far. Each function body is lowered by a
//! short-lived `BodyLowering` that holds the argument bindings of that
//! function only.

use std::collections::HashMap;

use log::{debug, trace};

use crate::builtins::{Builtin, BuiltinRegistry};
use crate::ir::builder::{FunctionBuilder, ModuleBuilder};
use crate::ir::verify::verify_function;
use crate::ir::{BinOp, Comparison, Function, Module, Parameter, Terminator, Value};
use crate::parser::ast::{BinaryOp, Expr, FunctionDef, Param};
use crate::typechecker::types::{Signature, Type};
use crate::typechecker::{
    infer_expr, infer_function, SemanticError, SignatureLookup, TypedExpr, TypedFunction,
    TypedKind,
};
use crate::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    User,
    Builtin,
}

#[derive(Debug, Clone)]
struct FunctionSlot {
    signature: Signature,
    defined: bool,
    origin: Origin,
}

pub struct Lowering<'r> {
    module: ModuleBuilder,
    functions: HashMap<String, FunctionSlot>,
    builtins: &'r BuiltinRegistry,
}

impl<'r> Lowering<'r> {
    pub fn new(module_name: &str, builtins: &'r BuiltinRegistry) -> Self {
        Self {
            module: ModuleBuilder::new(module_name.to_string()),
            functions: HashMap::new(),
            builtins,
        }
    }

    /// Lowers one top-level form.
    pub fn lower_item(&mut self, item: &Expr) -> Result<(), CompileError> {
        match item {
            Expr::Function(def) => match def.declared_return() {
                Some(ret) => self.declare(def, ret),
                None => self.define(def),
            },
            other => {
                let typed = infer_expr(other, &[], self)?;
                trace!("top-level expression of type {} produces no code", typed.ty);
                Ok(())
            }
        }
    }

    /// `name params = int|float|chr` declares an external function.
    fn declare(&mut self, def: &FunctionDef, ret: Type) -> Result<(), CompileError> {
        let signature = signature_of(&def.params, ret);
        if let Some(slot) = self.functions.get(&def.name) {
            if slot.signature == signature {
                trace!("'{}' already declared as {}", def.name, signature);
                return Ok(());
            }
            return Err(conflict(&def.name, &slot.signature, &signature));
        }

        debug!("declaring external function '{}' {}", def.name, signature);
        self.module.add_function(Function::new(
            def.name.clone(),
            ir_params(&def.params),
            ret,
        ));
        self.functions.insert(
            def.name.clone(),
            FunctionSlot {
                signature,
                defined: false,
                origin: Origin::User,
            },
        );
        Ok(())
    }

    fn define(&mut self, def: &FunctionDef) -> Result<(), CompileError> {
        let typed = infer_function(def, self)?;
        let signature = typed.signature();

        match self.functions.get(&def.name) {
            Some(slot) if slot.defined => {
                return Err(SemanticError::new(format!(
                    "function '{}' is already defined",
                    def.name
                ))
                .into())
            }
            Some(slot) if slot.signature != signature => {
                return Err(conflict(&def.name, &slot.signature, &signature))
            }
            _ => {}
        }

        debug!("lowering function '{}' {}", def.name, signature);
        let function = BodyLowering::new(&typed).lower(&typed.body)?;
        verify_function(&function)?;
        self.module.add_function(function);
        self.functions.insert(
            def.name.clone(),
            FunctionSlot {
                signature,
                defined: true,
                origin: Origin::User,
            },
        );
        Ok(())
    }

    /// Emits the bodies of builtins that source code called and did not
    /// declare or define itself.
    pub fn generate_referenced(&mut self) -> Result<(), CompileError> {
        let builtins = self.builtins;
        for builtin in builtins.referenced() {
            match self.functions.get(&builtin.name) {
                Some(slot) if slot.origin == Origin::User || slot.defined => {
                    trace!("builtin '{}' provided by source, skipping", builtin.name);
                    continue;
                }
                _ => {}
            }

            debug!("generating builtin '{}'", builtin.name);
            let function = generate_builtin(builtin)?;
            verify_function(&function)?;
            self.module.add_function(function);
            self.functions.insert(
                builtin.name.clone(),
                FunctionSlot {
                    signature: builtin.signature(),
                    defined: true,
                    origin: Origin::Builtin,
                },
            );
        }
        Ok(())
    }

    pub fn finish(self) -> Module {
        self.module.build()
    }
}

impl SignatureLookup for Lowering<'_> {
    /// Known functions resolve directly. A referenced builtin is declared on
    /// first lookup so calls to it can be lowered before its body exists.
    fn lookup(&mut self, name: &str) -> Option<Signature> {
        if let Some(slot) = self.functions.get(name) {
            return Some(slot.signature.clone());
        }

        let builtin = self.builtins.get(name).filter(|builtin| builtin.referenced)?;
        let signature = builtin.signature();
        trace!("declaring builtin '{}' {}", name, signature);
        self.module.add_function(Function::new(
            builtin.name.clone(),
            ir_params(&builtin.params),
            builtin.return_type,
        ));
        self.functions.insert(
            name.to_string(),
            FunctionSlot {
                signature: signature.clone(),
                defined: false,
                origin: Origin::Builtin,
            },
        );
        Some(signature)
    }
}

struct BodyLowering {
    builder: FunctionBuilder,
    args: Vec<Value>,
}

impl BodyLowering {
    fn new(function: &TypedFunction) -> Self {
        let mut builder = FunctionBuilder::new(
            function.name.clone(),
            ir_params(&function.params),
            function.body.ty,
        );
        let args = (0..function.params.len())
            .filter_map(|index| builder.param(index))
            .collect();
        let entry = builder.create_block("entry".to_string());
        builder.switch_to_block(entry);
        Self { builder, args }
    }

    fn lower(mut self, body: &TypedExpr) -> Result<Function, CompileError> {
        let result = self.lower_expr(body)?;
        self.builder.set_terminator(Terminator::Return(result));
        Ok(self.builder.build())
    }

    fn lower_expr(&mut self, expr: &TypedExpr) -> Result<Value, CompileError> {
        match &expr.kind {
            TypedKind::Int(value) => Ok(Value::Int(*value)),
            TypedKind::Float(value) => Ok(Value::Float(*value)),
            TypedKind::Char(value) => Ok(Value::Chr(*value)),
            TypedKind::Str(value) => Ok(Value::Str(value.clone())),
            TypedKind::Argument(index) => self.args.get(*index).cloned().ok_or_else(|| {
                CompileError::InvalidIR(format!("argument index {} out of range", index))
            }),
            TypedKind::Binary { op, lhs, rhs } => {
                let operand = lhs.ty;
                let left = self.lower_expr(lhs)?;
                let right = self.lower_expr(rhs)?;
                self.lower_binary(*op, operand, left, right)
            }
            TypedKind::Call { callee, args } => {
                let mut lowered = Vec::with_capacity(args.len());
                for arg in args {
                    lowered.push(self.lower_expr(arg)?);
                }
                Ok(self.builder.ins_call(callee.clone(), lowered))
            }
            TypedKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(cond, then_branch, else_branch, expr.ty),
        }
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        operand: Type,
        left: Value,
        right: Value,
    ) -> Result<Value, CompileError> {
        let value = match (op, operand.is_float()) {
            (BinaryOp::Add, false) => self.builder.ins_binop(BinOp::IAdd, left, right),
            (BinaryOp::Subtract, false) => self.builder.ins_binop(BinOp::ISub, left, right),
            (BinaryOp::Multiply, false) => self.builder.ins_binop(BinOp::IMul, left, right),
            (BinaryOp::Less, false) => self.builder.ins_compare(Comparison::IntUlt, left, right),
            (BinaryOp::Add, true) => self.builder.ins_binop(BinOp::FAdd, left, right),
            (BinaryOp::Subtract, true) => self.builder.ins_binop(BinOp::FSub, left, right),
            (BinaryOp::Multiply, true) => self.builder.ins_binop(BinOp::FMul, left, right),
            (BinaryOp::Less, true) => self.builder.ins_compare(Comparison::FloatUlt, left, right),
            _ => {
                return Err(SemanticError::new(format!(
                    "unknown operator '{}' for type {}",
                    op, operand
                ))
                .into())
            }
        };
        Ok(value)
    }

    fn lower_if(
        &mut self,
        cond: &TypedExpr,
        then_branch: &TypedExpr,
        else_branch: &TypedExpr,
        ty: Type,
    ) -> Result<Value, CompileError> {
        let cond_ty = cond.ty;
        let cond = self.lower_expr(cond)?;
        let zero = Value::zero(cond_ty).ok_or_else(|| {
            SemanticError::new(format!("if condition of type {} has no zero", cond_ty))
        })?;
        let test = if cond_ty.is_float() {
            self.builder.ins_compare(Comparison::FloatOne, cond, zero)
        } else {
            self.builder.ins_compare(Comparison::IntNe, cond, zero)
        };

        let then_label = self.builder.new_label("then");
        let else_label = self.builder.new_label("else");
        let merge_label = self.builder.new_label("ifcont");
        self.builder.set_terminator(Terminator::CondBranch {
            cond: test,
            then_block: then_label.clone(),
            else_block: else_label.clone(),
        });

        let then_value = self.lower_arm(then_label, then_branch, &merge_label)?;
        let else_value = self.lower_arm(else_label, else_branch, &merge_label)?;

        let merge = self.builder.create_block(merge_label);
        self.builder.switch_to_block(merge);
        Ok(self.builder.ins_phi(ty, vec![then_value, else_value]))
    }

    /// Lowers one arm into a fresh block that falls through to `merge`.
    /// Returns the arm value with the label of the block it leaves from,
    /// which differs from `label` when the arm itself branches.
    fn lower_arm(
        &mut self,
        label: String,
        arm: &TypedExpr,
        merge: &str,
    ) -> Result<(Value, String), CompileError> {
        let block = self.builder.create_block(label);
        self.builder.switch_to_block(block);
        let value = self.lower_expr(arm)?;
        let exit = self
            .builder
            .current_label()
            .ok_or_else(|| CompileError::InvalidIR("no insertion block".to_string()))?
            .to_string();
        self.builder.set_terminator(Terminator::Branch {
            target: merge.to_string(),
        });
        Ok((value, exit))
    }
}

fn generate_builtin(builtin: &Builtin) -> Result<Function, CompileError> {
    let mut builder = FunctionBuilder::new(
        builtin.name.clone(),
        ir_params(&builtin.params),
        builtin.return_type,
    );
    let args: Vec<Value> = (0..builtin.params.len())
        .filter_map(|index| builder.param(index))
        .collect();
    let entry = builder.create_block("entry".to_string());
    builder.switch_to_block(entry);
    let result = (builtin.generate)(&mut builder, &args)?;
    builder.set_terminator(Terminator::Return(result));
    Ok(builder.build())
}

fn ir_params(params: &[Param]) -> Vec<Parameter> {
    params
        .iter()
        .map(|param| Parameter {
            name: param.name.clone(),
            ty: param.ty,
        })
        .collect()
}

fn signature_of(params: &[Param], ret: Type) -> Signature {
    Signature::new(params.iter().map(|param| param.ty).collect(), ret)
}

fn conflict(name: &str, existing: &Signature, new: &Signature) -> CompileError {
    SemanticError::new(format!(
        "conflicting signatures for '{}': {} and {}",
        name, existing, new
    ))
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Instruction;
    use crate::parser::Parser;

    fn lower(source: &str) -> Result<Module, CompileError> {
        let mut builtins = BuiltinRegistry::new();
        let program = Parser::new(source, &mut builtins).parse_program()?;
        let mut lowering = Lowering::new("test", &builtins);
        for item in &program.items {
            lowering.lower_item(item)?;
        }
        lowering.generate_referenced()?;
        Ok(lowering.finish())
    }

    #[test]
    fn integer_add_uses_integer_instruction() {
        let module = lower("add a b = a + b\n").unwrap();
        let add = module.function("add").unwrap();
        assert!(add.instructions().any(|inst| matches!(
            inst,
            Instruction::BinOp { op: BinOp::IAdd, .. }
        )));
    }

    #[test]
    fn if_joins_arms_with_a_phi() {
        let module = lower("choose = if 1 < 2 then 10 else 20\n").unwrap();
        let choose = module.function("choose").unwrap();
        let labels: Vec<&str> = choose.blocks.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, ["entry", "then0", "else1", "ifcont2"]);
        assert!(matches!(
            choose.blocks[3].instructions[0],
            Instruction::Phi { ty: Type::Int, .. }
        ));
    }

    #[test]
    fn nested_if_phi_uses_exit_block() {
        let module = lower("f x = if x then (if x < 3 then 1 else 2) else 0\n").unwrap();
        let f = module.function("f").unwrap();
        let outer_phi = f
            .blocks
            .last()
            .and_then(|block| block.instructions.first())
            .unwrap();
        let Instruction::Phi { incoming, .. } = outer_phi else {
            panic!("expected phi, got {}", outer_phi);
        };
        assert_eq!(incoming[0].1, "ifcont5");
    }

    #[test]
    fn declaration_then_definition_reuses_slot() {
        let module = lower("sq x = int\nsq x = x * x\n").unwrap();
        assert_eq!(module.functions.len(), 1);
        assert!(!module.functions[0].is_declaration());
    }

    #[test]
    fn conflicting_declaration_is_rejected() {
        let err = lower("g x = int\ng x_float = float\n").unwrap_err();
        assert!(err.to_string().contains("conflicting signatures"));
    }

    #[test]
    fn redefinition_is_rejected() {
        let err = lower("one = 1\none = 1\n").unwrap_err();
        assert!(err.to_string().contains("already defined"));
    }

    #[test]
    fn recursion_needs_a_declaration() {
        assert!(lower("loop n = loop n\n").is_err());
        assert!(lower("loop n = int\nloop n = loop n\n").is_ok());
    }

    #[test]
    fn builtin_defined_by_source_is_not_generated() {
        let module = lower("itod i = float\nf = itod 1\n").unwrap();
        let itod = module.function("itod").unwrap();
        assert!(itod.is_declaration());
    }
}
