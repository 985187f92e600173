#![allow(dead_code)]

use common::names;
use compiler::ir::{
    Body, CallSite, Constant, FuncId, Function, FunctionType, GlobalVariable, Instruction,
    Linkage, Module, StructDef, Type, Value,
};

pub fn state_ptr(kind: &str) -> Type {
    Type::named(names::state_type_name(kind)).pointer_to()
}

fn returning_void(body: &mut Body) {
    let entry = body.add_block("entry");
    body.append(entry, Instruction::ret(None));
}

/// A library with two assertion kinds: `monotonic` and `ge`.
pub fn library() -> Module {
    let mut module = Module::new("assertions");
    module.struct_types.insert(
        names::state_type_name("monotonic"),
        StructDef::new(vec![Type::i32(), Type::i32()]),
    );
    module
        .struct_types
        .insert(names::state_type_name("ge"), StructDef::new(vec![Type::i32()]));
    module.add_global(GlobalVariable::new(
        names::state_default_name("ge"),
        Type::named(names::state_type_name("ge")),
        Some(Constant::Struct {
            ty: Type::named(names::state_type_name("ge")),
            fields: vec![Constant::i32(-1)],
        }),
    ));

    for kind in ["monotonic", "ge"] {
        let init = FunctionType::new(
            Type::Void,
            vec![
                state_ptr(kind),
                Type::i8_ptr(),
                Type::i8_ptr().pointer_to(),
                Type::i8_ptr(),
                Type::i32(),
            ],
        );
        let update = FunctionType::new(
            Type::Void,
            vec![Type::i32(), state_ptr(kind), Type::i8_ptr(), Type::i32()],
        );
        for (name, ty) in [
            (names::init_routine_name(kind), init),
            (names::update_routine_name(kind), update),
        ] {
            let mut body = Body::new();
            returning_void(&mut body);
            module.add_function(Function::definition(name, ty, body));
        }
    }
    module
}

/// A program under construction, with the marker declarations the front end
/// emits.
pub struct Program {
    pub module: Module,
    pub declared: FuncId,
    pub assigned: FuncId,
    file: Constant,
    annotations: Vec<(Constant, String)>,
}

impl Program {
    pub fn new(name: &str) -> Self {
        let mut module = Module::new(name);
        let marker_ty = FunctionType::new(
            Type::Void,
            vec![Type::i8_ptr(), Type::i8_ptr(), Type::i8_ptr(), Type::i32()],
        );
        let declared = module.add_function(Function::declaration(
            names::MARKER_VAR_DECLARED,
            marker_ty.clone(),
        ));
        let assigned =
            module.add_function(Function::declaration(names::MARKER_VAR_ASSIGNED, marker_ty));
        let file = module.add_c_string(".str.file", "prog.c");
        Self {
            module,
            declared,
            assigned,
            file,
            annotations: Vec::new(),
        }
    }

    pub fn marker(&mut self, marker: FuncId, address: Value, text: &str, line: i64) -> Instruction {
        let text = self.module.add_c_string(".str", text);
        Instruction::call(
            CallSite::direct(
                marker,
                vec![address, text.into(), self.file.clone().into(), Value::i32(line)],
            ),
            Type::Void,
        )
    }

    pub fn annotate(&mut self, function: FuncId, text: &str) {
        self.annotations
            .push((Constant::Func(function), text.to_owned()));
    }

    pub fn finish(mut self) -> Module {
        if self.annotations.is_empty() {
            return self.module;
        }

        let entry_ty = Type::Literal(vec![
            Type::i8_ptr(),
            Type::i8_ptr(),
            Type::i8_ptr(),
            Type::i32(),
        ]);
        let mut elems = Vec::new();
        for (i, (owner, text)) in self.annotations.iter().enumerate() {
            elems.push(Constant::Struct {
                ty: entry_ty.clone(),
                fields: vec![
                    owner.clone().bitcast(Type::i8_ptr()),
                    self.module.add_c_string(".str", text),
                    self.file.clone(),
                    Constant::i32(100 + i as i64),
                ],
            });
        }
        let mut table = GlobalVariable::new(
            names::GLOBAL_ANNOTATIONS,
            entry_ty.clone().array_of(elems.len() as u64),
            Some(Constant::Array {
                elem: entry_ty,
                elems,
            }),
        );
        table.linkage = Linkage::Appending;
        table.section = Some(names::GLOBAL_ANNOTATIONS_SECTION.to_owned());
        self.module.add_global(table);
        self.module
    }
}

pub fn body_of<'m>(module: &'m Module, function: &str) -> &'m Body {
    let id = module
        .function_by_name(function)
        .unwrap_or_else(|| panic!("No function `{function}`"));
    module.function(id).unwrap().body.as_ref().unwrap()
}

/// The calls to `routine` in `function`, in block order.
pub fn calls_to(module: &Module, function: &str, routine: &str) -> Vec<CallSite> {
    let routine = module.function_by_name(routine).unwrap();
    body_of(module, function)
        .iter_insts()
        .filter_map(|(_, inst)| inst.kind.call_site().cloned())
        .filter(|call| call.direct_callee() == Some(routine))
        .collect()
}
