//! Structural verification of whole modules.

use std::collections::HashSet;
use std::fmt;

use itertools::Itertools;
use thiserror::Error;

use super::{Constant, Function, InstKind, Module, Type, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// The function or global the problem was found in.
    pub scope: String,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.message)
    }
}

#[derive(Debug, Error)]
#[error("module verification failed:\n  {}", .violations.iter().join("\n  "))]
pub struct VerifyError {
    pub violations: Vec<Violation>,
}

struct Verifier<'m> {
    module: &'m Module,
    violations: Vec<Violation>,
}

impl<'m> Verifier<'m> {
    fn report(&mut self, scope: &str, message: impl Into<String>) {
        self.violations.push(Violation {
            scope: scope.to_owned(),
            message: message.into(),
        });
    }

    fn check_names(&mut self) {
        let mut seen = HashSet::new();
        for (_, function) in self.module.functions() {
            if !seen.insert(function.name.as_str()) {
                self.report(&function.name, "duplicate symbol name");
            }
        }
        for (_, global) in self.module.globals() {
            if !seen.insert(global.name.as_str()) {
                self.report(&global.name, "duplicate symbol name");
            }
        }
    }

    fn check_constant(&mut self, scope: &str, constant: &Constant) {
        let mut dangling = Vec::new();
        constant.visit(&mut |c| match c {
            Constant::Func(id) if self.module.function(*id).is_none() => {
                dangling.push(id.to_string())
            }
            Constant::Global(id) if self.module.global(*id).is_none() => {
                dangling.push(id.to_string())
            }
            _ => {}
        });
        for id in dangling {
            self.report(scope, format!("reference to removed entity {id}"));
        }
    }

    fn check_globals(&mut self) {
        for (_, global) in self.module.globals() {
            if let Some(init) = &global.init {
                self.check_constant(&global.name, init);
            }
        }
    }

    fn check_function(&mut self, function: &Function) {
        if function.params.len() != function.ty.params.len() {
            self.report(
                &function.name,
                format!(
                    "{} parameter descriptors for {} parameter types",
                    function.params.len(),
                    function.ty.params.len()
                ),
            );
        }
        let Some(body) = &function.body else {
            return;
        };
        let scope = function.name.as_str();
        if body.blocks.is_empty() {
            self.report(scope, "definition without blocks");
        }

        let placed: HashSet<_> = body.inst_ids().into_iter().collect();
        for block in &body.blocks {
            let Some((last, init)) = block.insts.split_last() else {
                self.report(scope, format!("block `{}` is empty", block.name));
                continue;
            };
            if init
                .iter()
                .filter_map(|id| body.try_inst(*id))
                .any(|inst| inst.is_terminator())
            {
                self.report(
                    scope,
                    format!("block `{}` has a terminator before its end", block.name),
                );
            }
            if !body.try_inst(*last).is_some_and(|inst| inst.is_terminator()) {
                self.report(
                    scope,
                    format!("block `{}` does not end with a terminator", block.name),
                );
            }
        }

        for block in &body.blocks {
            for id in &block.insts {
                let Some(inst) = body.try_inst(*id) else {
                    self.report(scope, format!("removed instruction {id} is still placed"));
                    continue;
                };
                for operand in inst.kind.operands() {
                    match operand {
                        Value::Inst(used) if !placed.contains(used) => self.report(
                            scope,
                            format!("{id} uses {used}, which is not placed in the function"),
                        ),
                        Value::Arg(index) if *index as usize >= function.ty.params.len() => self
                            .report(
                                scope,
                                format!("{id} uses missing argument #{index}"),
                            ),
                        Value::Const(c) => self.check_constant(scope, c),
                        _ => {}
                    }
                }
                for target in inst.kind.successors() {
                    if body.block(target).is_none() {
                        self.report(scope, format!("{id} branches to missing block {target}"));
                    }
                }
                match &inst.kind {
                    InstKind::Ret { value } => self.check_ret(function, value.as_ref()),
                    InstKind::Call(call) | InstKind::Invoke { call, .. } => {
                        if let Some(callee) = call.direct_callee() {
                            self.check_call(function, *id, callee, &call.args);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    fn check_ret(&mut self, function: &Function, value: Option<&Value>) {
        let expected = function.ret_type();
        match (expected, value) {
            (Type::Void, None) => {}
            (Type::Void, Some(_)) => self.report(&function.name, "void function returns a value"),
            (_, None) => self.report(&function.name, "non-void function returns nothing"),
            (expected, Some(value)) => {
                if let Some(actual) = self.module.type_of_value(function, value) {
                    if !actual.is_compatible_with(expected) {
                        self.report(
                            &function.name,
                            format!("returns `{actual}` where `{expected}` is declared"),
                        );
                    }
                }
            }
        }
    }

    fn check_call(
        &mut self,
        function: &Function,
        site: super::InstId,
        callee: super::FuncId,
        args: &[Value],
    ) {
        let Some(target) = self.module.function(callee) else {
            return;
        };
        let ty = &target.ty;
        let count_ok = if ty.var_arg {
            args.len() >= ty.params.len()
        } else {
            args.len() == ty.params.len()
        };
        if !count_ok {
            self.report(
                &function.name,
                format!(
                    "{site} calls `{}` with {} arguments, expected {}",
                    target.name,
                    args.len(),
                    ty.params.len()
                ),
            );
            return;
        }
        for (index, (arg, expected)) in args.iter().zip(&ty.params).enumerate() {
            let Some(actual) = self.module.type_of_value(function, arg) else {
                continue;
            };
            if !actual.is_compatible_with(expected) {
                self.report(
                    &function.name,
                    format!(
                        "{site} passes `{actual}` as argument {index} of `{}`, expected `{expected}`",
                        target.name
                    ),
                );
            }
        }
    }
}

/// Checks the structural integrity of the module and reports every
/// violation found.
pub fn verify_module(module: &Module) -> Result<(), VerifyError> {
    let mut verifier = Verifier {
        module,
        violations: Vec::new(),
    };
    verifier.check_names();
    verifier.check_globals();
    for (_, function) in module.functions() {
        verifier.check_function(function);
    }

    if verifier.violations.is_empty() {
        Ok(())
    } else {
        Err(VerifyError {
            violations: verifier.violations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Body, CallSite, FunctionType, Instruction};

    fn callee_and_caller(args: Vec<Value>) -> Module {
        let mut module = Module::new("m");
        let callee = module.add_function(Function::declaration(
            "f",
            FunctionType::new(Type::i32(), vec![Type::i32(), Type::i8_ptr()]),
        ));
        let mut body = Body::new();
        let entry = body.add_block("entry");
        let call = body.append(
            entry,
            Instruction::call(CallSite::direct(callee, args), Type::i32()),
        );
        body.append(entry, Instruction::ret(Some(Value::Inst(call))));
        module.add_function(Function::definition(
            "main",
            FunctionType::new(Type::i32(), vec![]),
            body,
        ));
        module
    }

    #[test]
    fn well_formed_module_passes() {
        let module = callee_and_caller(vec![
            Value::i32(1),
            Constant::null(Type::i8().pointer_to().pointer_to()).into(),
        ]);
        assert!(verify_module(&module).is_ok());
    }

    #[test]
    fn wrong_call_arity_is_reported() {
        let module = callee_and_caller(vec![Value::i32(1)]);
        let err = verify_module(&module).unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert!(err.violations[0].message.contains("with 1 arguments, expected 2"));
    }

    #[test]
    fn missing_terminator_and_void_return_are_reported() {
        let mut module = Module::new("m");
        let mut body = Body::new();
        let entry = body.add_block("entry");
        body.append(entry, Instruction::alloca(Type::i32()));
        let exit = body.add_block("exit");
        body.append(exit, Instruction::ret(Some(Value::i32(0))));
        module.add_function(Function::definition(
            "g",
            FunctionType::new(Type::Void, vec![]),
            body,
        ));

        let err = verify_module(&module).unwrap_err();
        let messages = err.violations.iter().map(|v| v.message.as_str()).collect_vec();
        assert!(messages.contains(&"block `entry` does not end with a terminator"));
        assert!(messages.contains(&"void function returns a value"));
    }
}
