//! IR builder utilities
//!
//! `ModuleBuilder` keeps functions in declaration order; `FunctionBuilder` is
//! the insertion cursor used while lowering one function body.

use super::*;

pub struct ModuleBuilder {
    module: Module,
}

impl ModuleBuilder {
    pub fn new(name: String) -> Self {
        Self {
            module: Module::new(name),
        }
    }

    /// Appends a function, or replaces the declaration of the same name in
    /// place so the declaration order is kept.
    pub fn add_function(&mut self, func: Function) {
        match self
            .module
            .functions
            .iter_mut()
            .find(|existing| existing.name == func.name)
        {
            Some(existing) => *existing = func,
            None => self.module.functions.push(func),
        }
    }

    pub fn build(self) -> Module {
        self.module
    }
}

pub struct FunctionBuilder {
    function: Function,
    current_block: Option<usize>,
    next_temp: usize,
    next_label: usize,
}

impl FunctionBuilder {
    pub fn new(name: String, params: Vec<Parameter>, return_type: Type) -> Self {
        Self {
            function: Function::new(name, params, return_type),
            current_block: None,
            next_temp: 0,
            next_label: 0,
        }
    }

    /// Value of the parameter at `index`, if any.
    pub fn param(&self, index: usize) -> Option<Value> {
        self.function
            .params
            .get(index)
            .map(|param| Value::Var(param.name.clone()))
    }

    /// SSA temporaries use a `%` prefix so they never collide with
    /// parameter names.
    pub fn new_temp(&mut self) -> String {
        let temp = format!("%t{}", self.next_temp);
        self.next_temp += 1;
        temp
    }

    /// Reserves a label for a block that will be created later.
    pub fn new_label(&mut self, base: &str) -> String {
        let label = format!("{}{}", base, self.next_label);
        self.next_label += 1;
        label
    }

    pub fn create_block(&mut self, label: String) -> usize {
        let block = BasicBlock::new(label);
        self.function.blocks.push(block);
        self.function.blocks.len() - 1
    }

    pub fn switch_to_block(&mut self, block_id: usize) {
        self.current_block = Some(block_id);
    }

    pub fn current_label(&self) -> Option<&str> {
        self.current_block
            .and_then(|id| self.function.blocks.get(id))
            .map(|block| block.label.as_str())
    }

    pub fn add_instruction(&mut self, inst: Instruction) {
        if let Some(block_id) = self.current_block {
            self.function.blocks[block_id].instructions.push(inst);
        }
    }

    pub fn set_terminator(&mut self, term: Terminator) {
        if let Some(block_id) = self.current_block {
            self.function.blocks[block_id].terminator = term;
        }
    }

    pub fn ins_binop(&mut self, op: BinOp, left: Value, right: Value) -> Value {
        let dest = self.new_temp();
        self.add_instruction(Instruction::BinOp {
            dest: dest.clone(),
            op,
            left,
            right,
        });
        Value::Var(dest)
    }

    pub fn ins_compare(&mut self, cond: Comparison, left: Value, right: Value) -> Value {
        let dest = self.new_temp();
        self.add_instruction(Instruction::Compare {
            dest: dest.clone(),
            cond,
            left,
            right,
        });
        Value::Var(dest)
    }

    pub fn ins_convert(&mut self, op: Conversion, value: Value) -> Value {
        let dest = self.new_temp();
        self.add_instruction(Instruction::Convert {
            dest: dest.clone(),
            op,
            value,
        });
        Value::Var(dest)
    }

    pub fn ins_call(&mut self, func: String, args: Vec<Value>) -> Value {
        let dest = self.new_temp();
        self.add_instruction(Instruction::Call {
            dest: dest.clone(),
            func,
            args,
        });
        Value::Var(dest)
    }

    pub fn ins_phi(&mut self, ty: Type, incoming: Vec<(Value, String)>) -> Value {
        let dest = self.new_temp();
        self.add_instruction(Instruction::Phi {
            dest: dest.clone(),
            ty,
            incoming,
        });
        Value::Var(dest)
    }

    pub fn build(self) -> Function {
        self.function
    }
}
