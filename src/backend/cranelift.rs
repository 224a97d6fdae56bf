//! Cranelift backend implementation
//!
//! Lowers the SSA IR into Cranelift functions and emits a relocatable object
//! file. The same lowering also feeds a JIT module so tests can call the
//! generated code directly.

use std::collections::HashMap;

use cranelift::codegen::ir::FuncRef;
use cranelift::codegen::isa::OwnedTargetIsa;
use cranelift::prelude::{
    settings, types, AbiParam, Block, Configurable, FloatCC, FunctionBuilder,
    FunctionBuilderContext, InstBuilder, IntCC, Value as ClifValue,
};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{DataDescription, DataId, FuncId, Linkage, Module as ClifModule};
use cranelift_object::{ObjectBuilder, ObjectModule};
use log::{debug, trace};

use crate::backend::Backend;
use crate::ir::{
    BinOp, Comparison, Conversion, Function as IrFunction, Instruction, Module, Terminator,
    Value,
};
use crate::typechecker::types::Type;
use crate::CompileError;

/// Cranelift code generator for the host ISA.
pub struct CraneliftBackend;

impl CraneliftBackend {
    pub fn new() -> Self {
        Self
    }

    /// Compile IR to object bytes.
    fn compile_module(&self, module: &Module) -> Result<Vec<u8>, CompileError> {
        let isa = build_native_isa(true)?;
        let builder = ObjectBuilder::new(
            isa,
            module.name.as_str(),
            cranelift_module::default_libcall_names(),
        )
        .map_err(module_error)?;
        let mut object_module = ObjectModule::new(builder);

        compile_into_module(&mut object_module, module)?;
        let product = object_module.finish();
        let bytes = product.emit().map_err(|err| {
            CompileError::Backend(format!("failed to emit object bytes: {}", err))
        })?;
        debug!("emitted {} object bytes for '{}'", bytes.len(), module.name);
        Ok(bytes)
    }

    /// JIT-compile every function of the module. External declarations
    /// cannot be resolved in-process, so modules that still have any are
    /// rejected.
    pub fn jit(&self, module: &Module) -> Result<JitProgram, CompileError> {
        if let Some(external) = module.functions.iter().find(|f| f.is_declaration()) {
            return Err(CompileError::Backend(format!(
                "cannot JIT-compile module with external function '{}'",
                external.name
            )));
        }

        let jit_builder = JITBuilder::with_isa(
            build_native_isa(false)?,
            cranelift_module::default_libcall_names(),
        );
        let mut jit_module = JITModule::new(jit_builder);
        let functions = compile_into_module(&mut jit_module, module)?;
        jit_module.finalize_definitions().map_err(module_error)?;

        Ok(JitProgram {
            module: jit_module,
            functions,
        })
    }
}

impl Default for CraneliftBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CraneliftBackend {
    fn generate(&self, module: &Module) -> Result<Vec<u8>, CompileError> {
        self.compile_module(module)
    }
}

/// Finalized JIT code for a module.
pub struct JitProgram {
    module: JITModule,
    functions: HashMap<String, FuncId>,
}

impl JitProgram {
    /// Address of the compiled function `name`. Callers transmute it to an
    /// `extern "C"` function pointer of the matching signature.
    pub fn function_ptr(&self, name: &str) -> Option<*const u8> {
        let id = self.functions.get(name)?;
        Some(self.module.get_finalized_function(*id))
    }
}

struct StringPool {
    next_id: usize,
    ids: HashMap<String, DataId>,
}

impl StringPool {
    fn new() -> Self {
        Self {
            next_id: 0,
            ids: HashMap::new(),
        }
    }

    fn data_id_for<M: ClifModule>(
        &mut self,
        module: &mut M,
        text: &str,
    ) -> Result<DataId, CompileError> {
        if let Some(id) = self.ids.get(text) {
            return Ok(*id);
        }

        let name = format!(".str.{}", self.next_id);
        self.next_id += 1;

        let mut data = DataDescription::new();
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        data.define(bytes.into_boxed_slice());

        let data_id = module
            .declare_data(&name, Linkage::Local, false, false)
            .map_err(module_error)?;
        module.define_data(data_id, &data).map_err(module_error)?;
        self.ids.insert(text.to_string(), data_id);
        Ok(data_id)
    }
}

/// Per-function lowering state.
struct FunctionState<'a> {
    function_ids: &'a HashMap<String, FuncId>,
    blocks: HashMap<String, Block>,
    /// Phi destinations and incoming edges of each block, in block
    /// parameter order.
    phis: HashMap<String, Vec<(&'a str, &'a [(Value, String)])>>,
    variables: HashMap<String, ClifValue>,
    function_refs: HashMap<String, FuncRef>,
    /// Label of the IR block being lowered.
    current: &'a str,
}

fn compile_into_module<M: ClifModule>(
    module: &mut M,
    ir_module: &Module,
) -> Result<HashMap<String, FuncId>, CompileError> {
    let mut functions = HashMap::new();

    for function in &ir_module.functions {
        let signature = make_signature(module, function)?;
        let linkage = if function.is_declaration() {
            Linkage::Import
        } else {
            Linkage::Export
        };
        let func_id = module
            .declare_function(&function.name, linkage, &signature)
            .map_err(module_error)?;
        functions.insert(function.name.clone(), func_id);
    }

    let mut string_pool = StringPool::new();
    let mut builder_context = FunctionBuilderContext::new();

    for function in ir_module.functions.iter().filter(|f| !f.is_declaration()) {
        let func_id = *functions.get(&function.name).ok_or_else(|| {
            CompileError::InvalidIR(format!("missing function id for {}", function.name))
        })?;

        let mut context = module.make_context();
        context.func.signature = make_signature(module, function)?;

        {
            let mut builder = FunctionBuilder::new(&mut context.func, &mut builder_context);
            lower_function(module, function, &functions, &mut string_pool, &mut builder)?;
            builder.seal_all_blocks();
            builder.finalize();
        }

        cranelift::codegen::verify_function(&context.func, module.isa()).map_err(|errors| {
            CompileError::Backend(format!(
                "Cranelift verifier rejected '{}': {}",
                function.name, errors
            ))
        })?;
        trace!("lowered '{}':\n{}", function.name, context.func.display());

        module
            .define_function(func_id, &mut context)
            .map_err(module_error)?;
        module.clear_context(&mut context);
    }

    Ok(functions)
}

fn lower_function<M: ClifModule>(
    module: &mut M,
    ir_function: &IrFunction,
    function_ids: &HashMap<String, FuncId>,
    string_pool: &mut StringPool,
    builder: &mut FunctionBuilder,
) -> Result<(), CompileError> {
    let Some(first) = ir_function.blocks.first() else {
        return Err(CompileError::InvalidIR(format!(
            "function '{}' has no basic blocks",
            ir_function.name
        )));
    };

    let mut state = FunctionState {
        function_ids,
        blocks: HashMap::new(),
        phis: HashMap::new(),
        variables: HashMap::new(),
        function_refs: HashMap::new(),
        current: &first.label,
    };

    for block in &ir_function.blocks {
        let id = builder.create_block();
        let mut phis = Vec::new();
        for inst in &block.instructions {
            let Instruction::Phi { dest, ty, incoming } = inst else {
                break;
            };
            builder.append_block_param(id, clif_type(module, *ty));
            phis.push((dest.as_str(), incoming.as_slice()));
        }
        state.blocks.insert(block.label.clone(), id);
        state.phis.insert(block.label.clone(), phis);
    }

    let entry = state.block(&first.label)?;
    builder.append_block_params_for_function_params(entry);

    for (index, param) in ir_function.params.iter().enumerate() {
        let Some(value) = builder.block_params(entry).get(index).copied() else {
            return Err(CompileError::InvalidIR(format!(
                "missing block parameter {} for function {}",
                index, ir_function.name
            )));
        };
        state.variables.insert(param.name.clone(), value);
    }

    for block in &ir_function.blocks {
        let clif_block = state.block(&block.label)?;
        builder.switch_to_block(clif_block);
        state.current = &block.label;

        let mut phi_index = 0;
        for instruction in &block.instructions {
            if let Instruction::Phi { dest, .. } = instruction {
                let param = builder
                    .block_params(clif_block)
                    .get(phi_index)
                    .copied()
                    .ok_or_else(|| {
                        CompileError::InvalidIR(format!("phi '{}' is not in the block header", dest))
                    })?;
                state.variables.insert(dest.clone(), param);
                phi_index += 1;
                continue;
            }
            lower_instruction(module, instruction, &mut state, string_pool, builder)?;
        }

        lower_terminator(module, &block.terminator, &mut state, string_pool, builder)?;
    }

    Ok(())
}

impl<'a> FunctionState<'a> {
    fn block(&self, label: &str) -> Result<Block, CompileError> {
        self.blocks
            .get(label)
            .copied()
            .ok_or_else(|| CompileError::InvalidIR(format!("unknown block '{}'", label)))
    }

    fn func_ref<M: ClifModule>(
        &mut self,
        module: &mut M,
        name: &str,
        builder: &mut FunctionBuilder,
    ) -> Result<FuncRef, CompileError> {
        if let Some(func_ref) = self.function_refs.get(name) {
            return Ok(*func_ref);
        }
        let id = self.function_ids.get(name).copied().ok_or_else(|| {
            CompileError::InvalidIR(format!("unknown call target '{}'", name))
        })?;
        let func_ref = module.declare_func_in_func(id, builder.func);
        self.function_refs.insert(name.to_string(), func_ref);
        Ok(func_ref)
    }

    /// Values the current block passes to the phis of `target`.
    fn edge_args<M: ClifModule>(
        &self,
        module: &mut M,
        target: &str,
        string_pool: &mut StringPool,
        builder: &mut FunctionBuilder,
    ) -> Result<Vec<ClifValue>, CompileError> {
        let Some(phis) = self.phis.get(target) else {
            return Err(CompileError::InvalidIR(format!("unknown block '{}'", target)));
        };

        let mut args = Vec::with_capacity(phis.len());
        for (dest, incoming) in phis {
            let value = incoming
                .iter()
                .find(|(_, label)| label == self.current)
                .map(|(value, _)| value)
                .ok_or_else(|| {
                    CompileError::InvalidIR(format!(
                        "phi '{}' has no value for edge from '{}'",
                        dest, self.current
                    ))
                })?;
            args.push(lower_value(module, value, &self.variables, string_pool, builder)?);
        }
        Ok(args)
    }
}

fn lower_instruction<M: ClifModule>(
    module: &mut M,
    instruction: &Instruction,
    state: &mut FunctionState<'_>,
    string_pool: &mut StringPool,
    builder: &mut FunctionBuilder,
) -> Result<(), CompileError> {
    match instruction {
        Instruction::BinOp {
            dest,
            op,
            left,
            right,
        } => {
            let lhs = lower_value(module, left, &state.variables, string_pool, builder)?;
            let rhs = lower_value(module, right, &state.variables, string_pool, builder)?;
            let result = lower_binop(*op, lhs, rhs, builder);
            state.variables.insert(dest.clone(), result);
        }
        Instruction::Compare {
            dest,
            cond,
            left,
            right,
        } => {
            let lhs = lower_value(module, left, &state.variables, string_pool, builder)?;
            let rhs = lower_value(module, right, &state.variables, string_pool, builder)?;
            // `<` yields a chr value, sign-extended so true is 0xFF.
            let result = match cond {
                Comparison::IntUlt => {
                    let flag = builder.ins().icmp(IntCC::UnsignedLessThan, lhs, rhs);
                    builder.ins().ineg(flag)
                }
                Comparison::IntNe => builder.ins().icmp(IntCC::NotEqual, lhs, rhs),
                Comparison::FloatUlt => {
                    let flag = builder.ins().fcmp(FloatCC::UnorderedOrLessThan, lhs, rhs);
                    builder.ins().ineg(flag)
                }
                Comparison::FloatOne => builder.ins().fcmp(FloatCC::OrderedNotEqual, lhs, rhs),
            };
            state.variables.insert(dest.clone(), result);
        }
        Instruction::Convert { dest, op, value } => {
            let value = lower_value(module, value, &state.variables, string_pool, builder)?;
            let result = match op {
                Conversion::IntToFloat => builder.ins().fcvt_from_sint(types::F64, value),
            };
            state.variables.insert(dest.clone(), result);
        }
        Instruction::Call { dest, func, args } => {
            let func_ref = state.func_ref(module, func, builder)?;

            let mut lowered_args = Vec::with_capacity(args.len());
            for arg in args {
                let value = lower_value(module, arg, &state.variables, string_pool, builder)?;
                lowered_args.push(value);
            }

            let call = builder.ins().call(func_ref, &lowered_args);
            let result = builder.inst_results(call).first().copied().ok_or_else(|| {
                CompileError::InvalidIR(format!("call to '{}' produces no value", func))
            })?;
            state.variables.insert(dest.clone(), result);
        }
        Instruction::Phi { dest, .. } => {
            return Err(CompileError::InvalidIR(format!(
                "phi '{}' follows a non-phi instruction",
                dest
            )))
        }
    }
    Ok(())
}

fn lower_terminator<M: ClifModule>(
    module: &mut M,
    terminator: &Terminator,
    state: &mut FunctionState<'_>,
    string_pool: &mut StringPool,
    builder: &mut FunctionBuilder,
) -> Result<(), CompileError> {
    match terminator {
        Terminator::Return(value) => {
            let lowered = lower_value(module, value, &state.variables, string_pool, builder)?;
            builder.ins().return_(&[lowered]);
        }
        Terminator::Branch { target } => {
            let args = state.edge_args(module, target, string_pool, builder)?;
            let target = state.block(target)?;
            builder.ins().jump(target, &args);
        }
        Terminator::CondBranch {
            cond,
            then_block,
            else_block,
        } => {
            let cond_value = lower_value(module, cond, &state.variables, string_pool, builder)?;
            let then_args = state.edge_args(module, then_block, string_pool, builder)?;
            let else_args = state.edge_args(module, else_block, string_pool, builder)?;
            let then_block = state.block(then_block)?;
            let else_block = state.block(else_block)?;
            builder
                .ins()
                .brif(cond_value, then_block, &then_args, else_block, &else_args);
        }
        Terminator::Unreachable => {
            return Err(CompileError::InvalidIR(format!(
                "block '{}' was never terminated",
                state.current
            )))
        }
    }
    Ok(())
}

fn lower_value<M: ClifModule>(
    module: &mut M,
    value: &Value,
    variables: &HashMap<String, ClifValue>,
    string_pool: &mut StringPool,
    builder: &mut FunctionBuilder,
) -> Result<ClifValue, CompileError> {
    match value {
        Value::Var(name) => variables.get(name).copied().ok_or_else(|| {
            CompileError::InvalidIR(format!("unknown variable '{}' referenced in backend", name))
        }),
        Value::Int(value) => Ok(builder.ins().iconst(types::I64, *value)),
        Value::Chr(value) => Ok(builder.ins().iconst(types::I8, i64::from(*value))),
        Value::Float(value) => Ok(builder.ins().f64const(*value)),
        Value::Str(text) => {
            let data_id = string_pool.data_id_for(module, text)?;
            let global_value = module.declare_data_in_func(data_id, builder.func);
            let ptr_ty = module.target_config().pointer_type();
            Ok(builder.ins().global_value(ptr_ty, global_value))
        }
    }
}

fn lower_binop(
    op: BinOp,
    lhs: ClifValue,
    rhs: ClifValue,
    builder: &mut FunctionBuilder,
) -> ClifValue {
    match op {
        BinOp::IAdd => builder.ins().iadd(lhs, rhs),
        BinOp::ISub => builder.ins().isub(lhs, rhs),
        BinOp::IMul => builder.ins().imul(lhs, rhs),
        BinOp::FAdd => builder.ins().fadd(lhs, rhs),
        BinOp::FSub => builder.ins().fsub(lhs, rhs),
        BinOp::FMul => builder.ins().fmul(lhs, rhs),
    }
}

fn make_signature<M: ClifModule>(
    module: &M,
    function: &IrFunction,
) -> Result<cranelift::prelude::Signature, CompileError> {
    let mut signature = module.make_signature();

    for param in &function.params {
        signature
            .params
            .push(AbiParam::new(clif_type(module, param.ty)));
    }
    signature
        .returns
        .push(AbiParam::new(clif_type(module, function.return_type)));

    Ok(signature)
}

fn clif_type<M: ClifModule>(module: &M, ty: Type) -> cranelift::prelude::Type {
    match ty {
        Type::Int => types::I64,
        Type::Float => types::F64,
        Type::Chr => types::I8,
        Type::Str => module.target_config().pointer_type(),
    }
}

/// Object files are position independent; JIT code is placed at fixed
/// addresses and must reach its callees through absolute relocations.
fn build_native_isa(pic: bool) -> Result<OwnedTargetIsa, CompileError> {
    let mut flags = settings::builder();
    let settings: &[(&str, &str)] = if pic {
        &[("is_pic", "true")]
    } else {
        &[("is_pic", "false"), ("use_colocated_libcalls", "false")]
    };
    for (name, value) in settings {
        flags.set(name, value).map_err(|err| {
            CompileError::Backend(format!("failed to set Cranelift flag {}: {}", name, err))
        })?;
    }

    let isa_builder = cranelift_native::builder().map_err(|msg| {
        CompileError::Backend(format!(
            "host machine is not supported by Cranelift: {}",
            msg
        ))
    })?;

    isa_builder
        .finish(settings::Flags::new(flags))
        .map_err(module_error)
}

fn module_error(err: impl std::fmt::Display) -> CompileError {
    CompileError::Backend(err.to_string())
}
