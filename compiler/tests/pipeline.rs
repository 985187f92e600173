mod support;

use common::names;
use compiler::config::ReturnAssertionPolicy;
use compiler::ir::{
    link::link_in, BinaryOp, Body, CallSite, Constant, Function, FunctionType, InstKind,
    Instruction, Linkage, Module, Type, Value,
};
use compiler::{instrument, InstrumentError, Options};

use support::{body_of, calls_to, library, state_ptr, Program};

fn run(mut module: Module, options: Options) -> Result<Module, InstrumentError> {
    link_in(&mut module, library())?;
    instrument(&mut module, &options)?;
    Ok(module)
}

fn run_default(module: Module) -> Module {
    run(module, Options::default()).unwrap()
}

fn slots_of(body: &Body, kind: &str) -> Vec<Value> {
    body.iter_insts()
        .filter(|(_, inst)| {
            inst.kind
                == InstKind::Alloca {
                    allocated: Type::named(names::state_type_name(kind)),
                }
        })
        .map(|(id, _)| Value::Inst(id))
        .collect()
}

/// `void walk(int x) { x = x + 1; }`, `x` annotated `monotonic` (uid 1).
#[test]
fn annotated_parameter_is_initialized_and_updated() {
    let mut program = Program::new("walk.c");
    let mut body = Body::new();
    let entry = body.add_block("entry");
    let addr = body.append(entry, Instruction::alloca(Type::i32()).with_name("x.addr"));
    body.append(entry, Instruction::store(Value::Arg(0), Value::Inst(addr)));
    let cast = body.append(entry, Instruction::bitcast(Value::Inst(addr), Type::i8_ptr()));
    let decl = program.marker(program.declared, Value::Inst(cast), "assertion,monotonic,1", 1);
    body.append(entry, decl);
    let old = body.append(entry, Instruction::load(Value::Inst(addr), Type::i32()));
    let inc = body.append(
        entry,
        Instruction::binary(BinaryOp::Add, Value::Inst(old), Value::i32(1), Type::i32()),
    );
    body.append(entry, Instruction::store(Value::Inst(inc), Value::Inst(addr)));
    let cast2 = body.append(entry, Instruction::bitcast(Value::Inst(addr), Type::i8_ptr()));
    let assign = program.marker(program.assigned, Value::Inst(cast2), "assertion,monotonic,1", 2);
    body.append(entry, assign);
    body.append(entry, Instruction::ret(None));
    program.module.add_function(
        Function::definition("walk", FunctionType::new(Type::Void, vec![Type::i32()]), body)
            .with_param_names(["x"]),
    );

    let module = run_default(program.finish());

    let body = body_of(&module, "walk");
    let slots = slots_of(body, "monotonic");
    assert_eq!(slots.len(), 1);

    let inits = calls_to(&module, "walk", "__init_monotonic");
    assert_eq!(inits.len(), 1);
    assert_eq!(inits[0].args[0], slots[0]);
    assert_eq!(inits[0].args[1], Value::Inst(cast));
    let after_cast = body.next_inst(cast).unwrap();
    assert_eq!(body[after_cast].kind.call_site(), Some(&inits[0]));

    let updates = calls_to(&module, "walk", "__update_monotonic");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].args[0], Value::Inst(inc));
    assert_eq!(updates[0].args[1], slots[0]);

    assert!(module.function_by_name(names::MARKER_VAR_DECLARED).is_none());
    assert!(module.function_by_name(names::MARKER_VAR_ASSIGNED).is_none());
}

/// `int next(int x) { if (x) return 1; return x; }`
fn next_function(program: &mut Program, ret: Type) {
    let mut body = Body::new();
    let entry = body.add_block("entry");
    let then = body.add_block("then");
    let exit = body.add_block("exit");
    let cond = body.append(
        entry,
        Instruction::icmp(compiler::ir::IntPredicate::Ne, Value::Arg(0), Value::i32(0)),
    );
    body.append(entry, Instruction::cond_br(Value::Inst(cond), then, exit));
    let value = |v| (!ret.is_void()).then_some(v);
    body.append(then, Instruction::ret(value(Value::i32(1))));
    body.append(exit, Instruction::ret(value(Value::Arg(0))));
    let next = program.module.add_function(
        Function::definition("next", FunctionType::new(ret.clone(), vec![Type::i32()]), body)
            .with_param_names(["x"]),
    );
    program.annotate(next, "assertion,ge(0),1");
}

#[test]
fn every_return_of_an_annotated_function_is_checked() {
    let mut program = Program::new("next.c");
    next_function(&mut program, Type::i32());

    let module = run_default(program.finish());

    let state = module.global_by_name("next.assertions.1.state").unwrap();
    let global = module.global(state).unwrap();
    assert_eq!(global.linkage, Linkage::Internal);
    assert_eq!(
        global.init,
        Some(Constant::Struct {
            ty: Type::named("struct.ge_state"),
            fields: vec![Constant::i32(-1)],
        })
    );

    let body = body_of(&module, "next");
    let update = module.function_by_name("__update_ge").unwrap();
    let mut returns = 0;
    for (id, inst) in body.iter_insts() {
        let InstKind::Ret { value: Some(value) } = &inst.kind else {
            continue;
        };
        returns += 1;
        let prev = body.prev_inst(id).unwrap();
        let call = body[prev].kind.call_site().unwrap();
        assert_eq!(call.direct_callee(), Some(update));
        assert_eq!(&call.args[0], value);
        assert_eq!(call.args[1], Value::global(state));
    }
    assert_eq!(returns, 2);
    assert_eq!(calls_to(&module, "next", "__update_ge").len(), 2);
}

#[test]
fn return_assertion_on_a_void_function_aborts() {
    let mut program = Program::new("next.c");
    next_function(&mut program, Type::Void);

    let result = run(program.finish(), Options::default());

    assert!(matches!(
        result,
        Err(InstrumentError::VoidReturnAssertion { function, kind })
            if function == "next" && kind == "ge"
    ));
}

#[test]
fn several_return_assertions_follow_the_policy() {
    let build = || {
        let mut program = Program::new("next.c");
        next_function(&mut program, Type::i32());
        let next = program.module.function_by_name("next").unwrap();
        program.annotate(next, "assertion,monotonic,2");
        program.finish()
    };

    let module = run_default(build());
    assert!(module.global_by_name("next.assertions.1.state").is_some());
    assert!(module.global_by_name("next.assertions.2.state").is_none());

    let rejected = run(
        build(),
        Options {
            return_assertions: ReturnAssertionPolicy::Reject,
            ..Options::default()
        },
    );
    assert!(matches!(
        rejected,
        Err(InstrumentError::MultipleReturnAssertions { .. })
    ));
}

/// `int f(int seed)` expects the state of uid 3 from its callers, and
/// `void main() { int x = f(7); }` provides it.
#[test]
fn caller_states_reach_the_hidden_parameters() {
    let mut program = Program::new("main.c");

    let mut body = Body::new();
    let entry = body.add_block("entry");
    let seed = body.append(entry, Instruction::alloca(Type::i32()));
    body.append(entry, Instruction::store(Value::Arg(0), Value::Inst(seed)));
    let cast = body.append(entry, Instruction::bitcast(Value::Inst(seed), Type::i8_ptr()));
    let assign = program.marker(program.assigned, Value::Inst(cast), "assertion,monotonic,3", 1);
    body.append(entry, assign);
    let value = body.append(entry, Instruction::load(Value::Inst(seed), Type::i32()));
    body.append(entry, Instruction::ret(Some(Value::Inst(value))));
    let f = program.module.add_function(
        Function::definition("f", FunctionType::new(Type::i32(), vec![Type::i32()]), body)
            .with_param_names(["seed"]),
    );
    program.annotate(f, "assertion.meta,monotonic,3");

    let mut body = Body::new();
    let entry = body.add_block("entry");
    let x = body.append(entry, Instruction::alloca(Type::i32()));
    let cast = body.append(entry, Instruction::bitcast(Value::Inst(x), Type::i8_ptr()));
    let decl = program.marker(program.declared, Value::Inst(cast), "assertion,monotonic,3", 5);
    body.append(entry, decl);
    let call = body.append(
        entry,
        Instruction::call(CallSite::direct(f, vec![Value::i32(7)]), Type::i32()),
    );
    let forward = program.marker(program.assigned, Value::Inst(cast), "assertion.funcall,3", 5);
    body.append(entry, forward);
    body.append(entry, Instruction::store(Value::Inst(call), Value::Inst(x)));
    body.append(entry, Instruction::ret(None));
    program.module.add_function(Function::definition(
        "main",
        FunctionType::new(Type::Void, vec![]),
        body,
    ));

    let module = run_default(program.finish());

    let f = module.function_by_name("f").unwrap();
    let f_fn = module.function(f).unwrap();
    assert_eq!(f_fn.ty.params, vec![Type::i32(), state_ptr("monotonic")]);
    assert_eq!(f_fn.params[1].name.as_deref(), Some("assertions.3.state"));

    let updates = calls_to(&module, "f", "__update_monotonic");
    assert_eq!(updates[0].args[1], Value::Arg(1));

    let slots = slots_of(body_of(&module, "main"), "monotonic");
    assert_eq!(slots.len(), 1);
    let calls = calls_to(&module, "main", "f");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].args, vec![Value::i32(7), slots[0].clone()]);
}

/// Two variables with their own assertion instances in one function.
#[test]
fn assertion_instances_keep_separate_states() {
    let mut program = Program::new("pair.c");
    let mut body = Body::new();
    let entry = body.add_block("entry");
    let vars = [
        body.append(entry, Instruction::alloca(Type::i32())),
        body.append(entry, Instruction::alloca(Type::i32())),
    ];
    let mut casts = Vec::new();
    for (uid, var) in [1, 2].into_iter().zip(vars) {
        let cast = body.append(entry, Instruction::bitcast(Value::Inst(var), Type::i8_ptr()));
        let text = format!("assertion,monotonic,{uid}");
        let decl = program.marker(program.declared, Value::Inst(cast), &text, uid);
        body.append(entry, decl);
        body.append(entry, Instruction::store(Value::i32(0), Value::Inst(var)));
        casts.push(cast);
    }
    for (uid, var) in [2, 1].into_iter().map(|uid| (uid, vars[uid as usize - 1])) {
        body.append(entry, Instruction::store(Value::i32(10 * uid), Value::Inst(var)));
        let cast = body.append(entry, Instruction::bitcast(Value::Inst(var), Type::i8_ptr()));
        let text = format!("assertion,monotonic,{uid}");
        let assign = program.marker(program.assigned, Value::Inst(cast), &text, uid);
        body.append(entry, assign);
    }
    body.append(entry, Instruction::ret(None));
    program.module.add_function(Function::definition(
        "pair",
        FunctionType::new(Type::Void, vec![]),
        body,
    ));

    let module = run_default(program.finish());

    assert_eq!(slots_of(body_of(&module, "pair"), "monotonic").len(), 2);
    let inits = calls_to(&module, "pair", "__init_monotonic");
    let (first, second) = (&inits[0].args[0], &inits[1].args[0]);
    assert_ne!(first, second);
    assert_eq!(inits[0].args[1], Value::Inst(casts[0]));

    let updates = calls_to(&module, "pair", "__update_monotonic");
    assert_eq!(updates[0].args[0], Value::i32(20));
    assert_eq!(&updates[0].args[1], second);
    assert_eq!(updates[1].args[0], Value::i32(10));
    assert_eq!(&updates[1].args[1], first);
}

#[test]
fn module_initializer_resets_return_states() {
    let mut program = Program::new("next.c");
    next_function(&mut program, Type::i32());
    program.module.add_function(Function::declaration(
        names::MODULE_INITIALIZER,
        FunctionType::new(Type::Void, vec![]),
    ));

    let module = run_default(program.finish());

    let state = module.global_by_name("next.assertions.1.state").unwrap();
    let insts: Vec<_> = body_of(&module, names::MODULE_INITIALIZER)
        .iter_insts()
        .map(|(_, inst)| inst.kind.clone())
        .collect();
    assert_eq!(insts.len(), 2);
    assert!(matches!(
        &insts[0],
        InstKind::Store { ptr, .. } if *ptr == Value::global(state)
    ));
}

#[test]
fn missing_routines_are_reported() {
    let mut program = Program::new("next.c");
    next_function(&mut program, Type::i32());
    let mut module = program.finish();

    let result = instrument(&mut module, &Options::default());

    assert!(matches!(
        result,
        Err(InstrumentError::MissingRoutine(name)) if name == "__update_ge"
    ));
}

#[test]
fn modules_without_annotations_only_lose_the_markers() {
    let mut program = Program::new("plain.c");
    let mut body = Body::new();
    let entry = body.add_block("entry");
    body.append(entry, Instruction::ret(Some(Value::i32(0))));
    program.module.add_function(Function::definition(
        "main",
        FunctionType::new(Type::i32(), vec![]),
        body,
    ));

    let module = run_default(program.finish());

    assert!(module.function_by_name("main").is_some());
    assert!(module.function_by_name("__init_monotonic").is_some());
    assert!(module.function_by_name(names::MARKER_VAR_DECLARED).is_none());
}
