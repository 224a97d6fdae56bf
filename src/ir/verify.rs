//! Structural checks run on every function before it is added to a module,
//! and on the finished module before it reaches a backend.

use std::collections::{HashMap, HashSet};

use super::*;
use crate::CompileError;

pub fn verify_function(function: &Function) -> Result<(), CompileError> {
    if function.is_declaration() {
        return Ok(());
    }
    let fail = |message: String| {
        CompileError::InvalidIR(format!("function '{}': {}", function.name, message))
    };

    let mut labels = HashSet::new();
    for block in &function.blocks {
        if !labels.insert(block.label.as_str()) {
            return Err(fail(format!("duplicate block label '{}'", block.label)));
        }
    }

    let mut predecessors: HashMap<&str, Vec<&str>> = HashMap::new();
    for block in &function.blocks {
        if block.terminator == Terminator::Unreachable {
            return Err(fail(format!("block '{}' has no terminator", block.label)));
        }
        for target in block.terminator.successors() {
            if !labels.contains(target) {
                return Err(fail(format!(
                    "block '{}' branches to unknown block '{}'",
                    block.label, target
                )));
            }
            predecessors.entry(target).or_default().push(&block.label);
        }
    }

    let entry = &function.blocks[0];
    if predecessors.contains_key(entry.label.as_str()) {
        return Err(fail(format!(
            "entry block '{}' has predecessors",
            entry.label
        )));
    }

    let mut defined: HashSet<&str> = HashSet::new();
    for param in &function.params {
        if !defined.insert(&param.name) {
            return Err(fail(format!("duplicate parameter '{}'", param.name)));
        }
    }
    for inst in function.instructions() {
        if !defined.insert(inst.dest()) {
            return Err(fail(format!("'{}' is assigned more than once", inst.dest())));
        }
    }

    for block in &function.blocks {
        let preds = predecessors
            .get(block.label.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut in_header = true;

        for inst in &block.instructions {
            if let Instruction::Phi { dest, incoming, .. } = inst {
                if !in_header {
                    return Err(fail(format!(
                        "phi '{}' in block '{}' follows a non-phi instruction",
                        dest, block.label
                    )));
                }
                verify_phi_edges(dest, incoming, preds).map_err(fail)?;
            } else {
                in_header = false;
            }

            for operand in inst.operands() {
                check_use(operand, &defined).map_err(fail)?;
            }
        }

        match &block.terminator {
            Terminator::Return(value) | Terminator::CondBranch { cond: value, .. } => {
                check_use(value, &defined).map_err(fail)?;
            }
            Terminator::Branch { .. } | Terminator::Unreachable => {}
        }
    }

    Ok(())
}

/// A phi needs exactly one incoming value per predecessor.
fn verify_phi_edges(
    dest: &str,
    incoming: &[(Value, String)],
    preds: &[&str],
) -> Result<(), String> {
    let mut seen = HashSet::new();
    for (_, label) in incoming {
        if !preds.contains(&label.as_str()) {
            return Err(format!(
                "phi '{}' has an edge from '{}', which is not a predecessor",
                dest, label
            ));
        }
        if !seen.insert(label.as_str()) {
            return Err(format!("phi '{}' lists '{}' twice", dest, label));
        }
    }
    if let Some(missing) = preds.iter().find(|pred| !seen.contains(**pred)) {
        return Err(format!("phi '{}' has no value for '{}'", dest, missing));
    }
    Ok(())
}

fn check_use(value: &Value, defined: &HashSet<&str>) -> Result<(), String> {
    match value {
        Value::Var(name) if !defined.contains(name.as_str()) => {
            Err(format!("use of undefined value '{}'", name))
        }
        _ => Ok(()),
    }
}

/// Function names are unique and every call targets a function of the module
/// with the right number of arguments.
pub fn verify_module(module: &Module) -> Result<(), CompileError> {
    let mut arities = HashMap::new();
    for function in &module.functions {
        if arities
            .insert(function.name.as_str(), function.params.len())
            .is_some()
        {
            return Err(CompileError::InvalidIR(format!(
                "function '{}' appears twice in module '{}'",
                function.name, module.name
            )));
        }
    }

    for function in &module.functions {
        verify_function(function)?;
        for inst in function.instructions() {
            let Instruction::Call { func, args, .. } = inst else {
                continue;
            };
            match arities.get(func.as_str()) {
                Some(arity) if *arity == args.len() => {}
                Some(arity) => {
                    return Err(CompileError::InvalidIR(format!(
                        "function '{}': call to '{}' passes {} argument(s), expected {}",
                        function.name,
                        func,
                        args.len(),
                        arity
                    )))
                }
                None => {
                    return Err(CompileError::InvalidIR(format!(
                        "function '{}': call to undeclared function '{}'",
                        function.name, func
                    )))
                }
            }
        }
    }

    Ok(())
}
