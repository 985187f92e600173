use common::{
    log_debug, log_info, log_warn, names, Annotation, AssertionDescriptor, MetaBinding,
};

use super::ModulePass;
use crate::config::ReturnAssertionPolicy;
use crate::error::{InstrumentError, Result};
use crate::ir::{
    Attribute, Body, CallSite, Constant, FuncId, FunctionType, GlobalId, GlobalVariable, InstKind,
    Instruction, Linkage, Module, Param, Type, Value,
};
use crate::transform::{
    extract,
    modification::{BodyInstructionManager, BodyModificationUnit},
    replace_signature, AnnotationRecord, InstrumentationContext, ParamDecl, RoutineKind,
};

/// Threads hidden state parameters through functions with `assertion.meta`
/// annotations and checks the return values of functions with return-value
/// assertions.
#[derive(Default)]
pub struct CalleeInstrumenter {
    /// Module-scope states of return-value assertions, with their defaults.
    return_states: Vec<(GlobalId, Constant)>,
}

impl ModulePass for CalleeInstrumenter {
    fn name(&self) -> &'static str {
        "callee instrumentation"
    }

    fn run(&mut self, module: &mut Module, cx: &mut InstrumentationContext) -> Result<()> {
        let annotations = extract(module);
        log_info!("Found annotations on {} functions", annotations.len());

        for (function, records) in annotations {
            self.instrument_function(module, cx, function, &records)?;
        }

        self.define_module_initializer(module);
        Ok(())
    }
}

impl CalleeInstrumenter {
    fn instrument_function(
        &mut self,
        module: &mut Module,
        cx: &mut InstrumentationContext,
        function: FuncId,
        records: &[AnnotationRecord],
    ) -> Result<()> {
        let Some(name) = module.function(function).map(|f| f.name.clone()) else {
            log_warn!("Annotated function {function} is no longer in the module");
            return Ok(());
        };
        log_debug!("Instrumenting callee `{name}`");

        let mut bindings = Vec::<MetaBinding>::new();
        let mut returns = Vec::<(AssertionDescriptor, &AnnotationRecord)>::new();
        for record in records {
            match Annotation::decode(&record.text) {
                Annotation::MetaBinding(entries) => bindings.extend(entries),
                Annotation::Assertion(descriptor) => returns.push((descriptor, record)),
                other => log_debug!("Ignoring annotation `{}` on `{name}`: {:?}", record.text, other),
            }
        }

        /* NOTE: The signature goes first, as it replaces the function. */
        let function = if bindings.is_empty() {
            function
        } else {
            self.add_hidden_params(module, cx, function, &bindings)?
        };

        let Some((descriptor, record)) = self.pick_return_assertion(cx, &name, returns)? else {
            return Ok(());
        };
        self.instrument_returns(module, cx, function, &descriptor, record)
    }

    fn add_hidden_params(
        &mut self,
        module: &mut Module,
        cx: &mut InstrumentationContext,
        function: FuncId,
        bindings: &[MetaBinding],
    ) -> Result<FuncId> {
        let Some(current) = module.function(function) else {
            return Err(InstrumentError::DanglingFunction(function));
        };
        let mut params: Vec<_> = current
            .ty
            .params
            .iter()
            .cloned()
            .zip(current.params.iter().cloned())
            .map(|(ty, param)| ParamDecl::new(ty, param))
            .collect();

        for binding in bindings {
            let state = cx.state_type_for(module, &binding.kind);
            let mut param = Param::named(names::state_name(binding.uid));
            param.attrs.insert(Attribute::NoCapture);
            log_debug!(
                "Adding hidden parameter `{}` of type `{}`",
                param.name.as_deref().unwrap_or_default(),
                state.pointer()
            );
            params.push(ParamDecl::new(state.pointer(), param));
        }

        replace_signature(module, function, params)
    }

    fn pick_return_assertion<'r>(
        &self,
        cx: &InstrumentationContext,
        function: &str,
        mut returns: Vec<(AssertionDescriptor, &'r AnnotationRecord)>,
    ) -> Result<Option<(AssertionDescriptor, &'r AnnotationRecord)>> {
        if returns.len() > 1 {
            let honored = returns[0].0.uid;
            match cx.return_assertions {
                ReturnAssertionPolicy::First => {
                    for (ignored, _) in &returns[1..] {
                        log_warn!(
                            "Ignoring return-value assertion `{ignored}` on `{function}`, only the first one (uid {honored}) is instrumented"
                        );
                    }
                }
                ReturnAssertionPolicy::Reject => {
                    return Err(InstrumentError::MultipleReturnAssertions {
                        function: function.to_owned(),
                        honored,
                        ignored: returns[1].0.uid,
                    });
                }
            }
        }
        Ok((!returns.is_empty()).then(|| returns.swap_remove(0)))
    }

    fn instrument_returns(
        &mut self,
        module: &mut Module,
        cx: &mut InstrumentationContext,
        function: FuncId,
        descriptor: &AssertionDescriptor,
        record: &AnnotationRecord,
    ) -> Result<()> {
        let Some(current) = module.function(function) else {
            return Err(InstrumentError::DanglingFunction(function));
        };
        let name = current.name.clone();
        if current.ret_type().is_void() {
            return Err(InstrumentError::VoidReturnAssertion {
                function: name,
                kind: descriptor.kind.clone(),
            });
        }
        if current.is_declaration() {
            log_warn!("Skipping return-value assertion `{descriptor}` on declaration `{name}`");
            return Ok(());
        }

        let state = cx.state_type_for(module, &descriptor.kind);
        let default = cx.default_state_for(module, &descriptor.kind);
        let update = cx.required_routine(module, &descriptor.kind, RoutineKind::Update)?;

        let state_ptr = if state.is_stateless {
            Value::from(Constant::null(state.pointer()))
        } else {
            let mut global = GlobalVariable::new(
                module.unique_symbol_name(&names::global_state_name(&name, descriptor.uid)),
                state.ty.clone(),
                Some(default.clone()),
            );
            global.linkage = Linkage::Internal;
            let state_global = module.add_global(global);
            self.return_states.push((state_global, default));
            Value::global(state_global)
        };

        let Some(body) = module
            .function_mut(function)
            .and_then(|f| f.body.as_mut())
        else {
            return Err(InstrumentError::DanglingFunction(function));
        };
        let count = check_returns(body, update, &state_ptr, record);
        log_debug!("Checking {count} returns of `{name}` with `{descriptor}`");
        Ok(())
    }

    /// Defines the module initializer if the program declares it.
    fn define_module_initializer(&mut self, module: &mut Module) {
        let Some(id) = module.function_by_name(names::MODULE_INITIALIZER) else {
            return;
        };
        let Some(initializer) = module.function_mut(id) else {
            return;
        };
        if !initializer.is_declaration() {
            log_debug!("`{}` is already defined", names::MODULE_INITIALIZER);
            return;
        }
        if initializer.ty != FunctionType::new(Type::Void, vec![]) {
            log_warn!(
                "`{}` has type `{}` instead of `void ()`, leaving it undefined",
                names::MODULE_INITIALIZER,
                initializer.ty
            );
            return;
        }

        let mut body = Body::new();
        let entry = body.add_block("entry");
        for (global, default) in &self.return_states {
            body.append(
                entry,
                Instruction::store(default.clone().into(), Value::global(*global)),
            );
        }
        body.append(entry, Instruction::ret(None));
        initializer.body = Some(body);
        log_info!(
            "Defined `{}` resetting {} states",
            names::MODULE_INITIALIZER,
            self.return_states.len()
        );
    }
}

/// Inserts a call to `update` right before every return of the body.
fn check_returns(
    body: &mut Body,
    update: FuncId,
    state: &Value,
    record: &AnnotationRecord,
) -> usize {
    let mut unit = BodyModificationUnit::for_body(body);
    let mut count = 0;
    for (id, inst) in body.iter_insts() {
        let InstKind::Ret { value: Some(value) } = &inst.kind else {
            continue;
        };
        let call = CallSite::direct(
            update,
            vec![
                value.clone(),
                state.clone(),
                record.file.clone().into(),
                record.line.clone().into(),
            ],
        );
        unit.insert_before(
            id,
            [Instruction::call(call, Type::Void).with_debug_loc(inst.debug_loc.clone())],
        );
        count += 1;
    }
    unit.commit(body);
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{verify::verify_module, Function, StructDef};
    use crate::transform::annotations::tests::add_annotation_table;

    fn update_routine(module: &mut Module, kind: &str, value: Type) -> FuncId {
        let state = Type::named(names::state_type_name(kind)).pointer_to();
        module.add_function(Function::declaration(
            names::update_routine_name(kind),
            FunctionType::new(Type::Void, vec![value, state, Type::i8_ptr(), Type::i32()]),
        ))
    }

    /// `int next(int x) { if (x) return 1; return x; }`
    fn next_function(module: &mut Module, ret: Type) -> FuncId {
        let mut body = Body::new();
        let entry = body.add_block("entry");
        let then = body.add_block("then");
        let exit = body.add_block("exit");
        let cond = body.append(
            entry,
            Instruction::icmp(crate::ir::IntPredicate::Ne, Value::Arg(0), Value::i32(0)),
        );
        body.append(entry, Instruction::cond_br(Value::Inst(cond), then, exit));
        let value = |v| (!ret.is_void()).then_some(v);
        body.append(then, Instruction::ret(value(Value::i32(1))));
        body.append(exit, Instruction::ret(value(Value::Arg(0))));
        module.add_function(
            Function::definition("next", FunctionType::new(ret.clone(), vec![Type::i32()]), body)
                .with_param_names(["x"]),
        )
    }

    fn run(module: &mut Module, policy: ReturnAssertionPolicy) -> Result<()> {
        let mut cx = InstrumentationContext::new(policy);
        CalleeInstrumenter::default().run(module, &mut cx)
    }

    #[test]
    fn every_return_gets_an_update_call() {
        let mut module = Module::new("m");
        module
            .struct_types
            .insert("struct.ge_state".to_owned(), StructDef::new(vec![Type::i32()]));
        let update = update_routine(&mut module, "ge", Type::i32());
        let next = next_function(&mut module, Type::i32());
        add_annotation_table(&mut module, &[(Constant::Func(next), "assertion,ge(0),1")]);

        run(&mut module, ReturnAssertionPolicy::First).unwrap();

        let state = module.global_by_name("next.assertions.1.state").unwrap();
        let global = module.global(state).unwrap();
        assert_eq!(global.linkage, Linkage::Internal);
        assert_eq!(
            global.init,
            Some(Constant::Zero(Type::named("struct.ge_state")))
        );

        let body = module.function(next).unwrap().body.as_ref().unwrap();
        for block in &body.blocks[1..] {
            let [check, ret] = block.insts.as_slice() else {
                panic!("Unexpected block shape: {:?}", block.insts);
            };
            let call = body[*check].kind.call_site().unwrap();
            assert_eq!(call.direct_callee(), Some(update));
            assert_eq!(call.args[1], Value::global(state));
            let InstKind::Ret { value } = &body[*ret].kind else {
                panic!("Expected a return");
            };
            assert_eq!(Some(&call.args[0]), value.as_ref());
        }
        assert!(module.global_by_name(names::GLOBAL_ANNOTATIONS).is_none());
        verify_module(&module).unwrap();
    }

    #[test]
    fn void_functions_cannot_have_return_assertions() {
        let mut module = Module::new("m");
        update_routine(&mut module, "ge", Type::i32());
        let next = next_function(&mut module, Type::Void);
        add_annotation_table(&mut module, &[(Constant::Func(next), "assertion,ge(0),1")]);

        let err = run(&mut module, ReturnAssertionPolicy::First).unwrap_err();
        assert!(matches!(
            err,
            InstrumentError::VoidReturnAssertion { ref function, .. } if function == "next"
        ));
    }

    fn add_ge_state(module: &mut Module) {
        module
            .struct_types
            .insert("struct.ge_state".to_owned(), StructDef::new(vec![Type::i32()]));
    }

    #[test]
    fn only_the_first_return_assertion_is_honored() {
        let mut module = Module::new("m");
        add_ge_state(&mut module);
        update_routine(&mut module, "ge", Type::i32());
        update_routine(&mut module, "le", Type::i32());
        let next = next_function(&mut module, Type::i32());
        let entries = [
            (Constant::Func(next), "assertion,ge(0),1"),
            (Constant::Func(next), "assertion,le(9),2"),
        ];
        add_annotation_table(&mut module, &entries);
        run(&mut module, ReturnAssertionPolicy::First).unwrap();
        assert!(module.global_by_name("next.assertions.1.state").is_some());
        assert!(module.global_by_name("next.assertions.2.state").is_none());

        let mut module = Module::new("m");
        add_ge_state(&mut module);
        update_routine(&mut module, "ge", Type::i32());
        let next = next_function(&mut module, Type::i32());
        let entries = [
            (Constant::Func(next), "assertion,ge(0),1"),
            (Constant::Func(next), "assertion,le(9),2"),
        ];
        add_annotation_table(&mut module, &entries);
        assert!(matches!(
            run(&mut module, ReturnAssertionPolicy::Reject),
            Err(InstrumentError::MultipleReturnAssertions { .. })
        ));
    }

    #[test]
    fn meta_bindings_append_hidden_parameters_in_order() {
        let mut module = Module::new("m");
        module.struct_types.insert(
            "struct.monotonic_state".to_owned(),
            StructDef::new(vec![Type::i64()]),
        );
        let next = next_function(&mut module, Type::i32());
        add_annotation_table(
            &mut module,
            &[
                (Constant::Func(next), "assertion.meta,monotonic,3"),
                (Constant::Func(next), "assertion.meta,nonzero,5,monotonic,4"),
            ],
        );

        run(&mut module, ReturnAssertionPolicy::First).unwrap();

        let id = module.function_by_name("next").unwrap();
        assert_ne!(id, next);
        let f = module.function(id).unwrap();
        assert_eq!(
            f.ty.params,
            vec![
                Type::i32(),
                Type::named("struct.monotonic_state").pointer_to(),
                Type::named("struct.nonzero_state").pointer_to(),
                Type::named("struct.monotonic_state").pointer_to(),
            ]
        );
        let names = f.params.iter().map(|p| p.name.as_deref()).collect::<Vec<_>>();
        assert_eq!(
            names,
            [
                Some("x"),
                Some("assertions.3.state"),
                Some("assertions.5.state"),
                Some("assertions.4.state")
            ]
        );
        assert!(f.params[1].attrs.contains(&Attribute::NoCapture));
        assert!(module.struct_type("struct.nonzero_state").unwrap().is_empty());
    }

    #[test]
    fn declared_module_initializer_resets_return_states() {
        let mut module = Module::new("m");
        add_ge_state(&mut module);
        update_routine(&mut module, "ge", Type::i32());
        let next = next_function(&mut module, Type::i32());
        let init = module.add_function(Function::declaration(
            names::MODULE_INITIALIZER,
            FunctionType::new(Type::Void, vec![]),
        ));
        add_annotation_table(&mut module, &[(Constant::Func(next), "assertion,ge(0),7")]);

        run(&mut module, ReturnAssertionPolicy::First).unwrap();

        let state = module.global_by_name("next.assertions.7.state").unwrap();
        let body = module.function(init).unwrap().body.as_ref().unwrap();
        let kinds = body.iter_insts().map(|(_, i)| &i.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            [
                &InstKind::Store {
                    value: Constant::Zero(Type::named("struct.ge_state")).into(),
                    ptr: Value::global(state),
                },
                &InstKind::Ret { value: None },
            ]
        );
    }

    #[test]
    fn stateless_return_assertions_get_a_null_state() {
        let mut module = Module::new("m");
        let update = update_routine(&mut module, "positive", Type::i32());
        let next = next_function(&mut module, Type::i32());
        let init = module.add_function(Function::declaration(
            names::MODULE_INITIALIZER,
            FunctionType::new(Type::Void, vec![]),
        ));
        add_annotation_table(&mut module, &[(Constant::Func(next), "assertion,positive,1")]);

        run(&mut module, ReturnAssertionPolicy::First).unwrap();

        assert!(module.global_by_name("next.assertions.1.state").is_none());
        let null = Value::from(Constant::null(
            Type::named("struct.positive_state").pointer_to(),
        ));
        let body = module.function(next).unwrap().body.as_ref().unwrap();
        let checks = body
            .iter_insts()
            .filter_map(|(_, i)| i.kind.call_site())
            .filter(|c| c.direct_callee() == Some(update))
            .collect::<Vec<_>>();
        assert_eq!(checks.len(), 2);
        assert!(checks.iter().all(|c| c.args[1] == null));

        let reset = module.function(init).unwrap().body.as_ref().unwrap();
        assert_eq!(reset.iter_insts().count(), 1);
        verify_module(&module).unwrap();
    }
}
