//! Recognition of the marker calls the front end leaves in function bodies.

use common::names;

use crate::ir::{
    Body, CastOp, Constant, FuncId, FunctionType, InstKind, Instruction, Module, Type, Value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// A variable (or parameter) was declared.
    VarDeclared,
    /// A variable was assigned, possibly from a call.
    VarAssigned,
}

impl MarkerKind {
    pub fn of_name(name: &str) -> Option<MarkerKind> {
        match name {
            names::MARKER_VAR_DECLARED => Some(MarkerKind::VarDeclared),
            names::MARKER_VAR_ASSIGNED => Some(MarkerKind::VarAssigned),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MarkerKind::VarDeclared => names::MARKER_VAR_DECLARED,
            MarkerKind::VarAssigned => names::MARKER_VAR_ASSIGNED,
        }
    }

    /// `void (i8*, i8*, i8*, i32)`
    pub fn function_type() -> FunctionType {
        FunctionType::new(
            Type::Void,
            vec![Type::i8_ptr(), Type::i8_ptr(), Type::i8_ptr(), Type::i32()],
        )
    }
}

/// A marker call with its operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerCall {
    pub kind: MarkerKind,
    /// The annotated address, usually casted to `i8*`.
    pub address: Value,
    pub text: String,
    pub file: Value,
    pub line: Value,
}

/// The marker functions declared in the module, by their kind.
pub fn marker_functions(module: &Module) -> Vec<(FuncId, MarkerKind)> {
    module
        .functions()
        .filter(|(_, f)| f.ty == MarkerKind::function_type())
        .filter_map(|(id, f)| MarkerKind::of_name(&f.name).map(|k| (id, k)))
        .collect()
}

/// The kind of marker `inst` calls, if any.
pub fn marker_kind(markers: &[(FuncId, MarkerKind)], inst: &Instruction) -> Option<MarkerKind> {
    let callee = inst.kind.call_site()?.direct_callee()?;
    markers
        .iter()
        .find(|(id, _)| *id == callee)
        .map(|(_, kind)| *kind)
}

/// Recognizes `inst` as a call to one of `markers` whose annotation text can
/// be read.
pub fn as_marker_call(
    module: &Module,
    markers: &[(FuncId, MarkerKind)],
    inst: &Instruction,
) -> Option<MarkerCall> {
    let kind = marker_kind(markers, inst)?;
    let call = inst.kind.call_site()?;
    let [address, text, file, line] = call.args.as_slice() else {
        return None;
    };
    let text = text.as_const().and_then(|c| module.c_string_of(c))?;
    Some(MarkerCall {
        kind,
        address: address.clone(),
        text,
        file: file.clone(),
        line: line.clone(),
    })
}

/// Follows bitcasts of `value` inside `body` back to the casted value.
pub fn strip_pointer_casts(body: &Body, value: &Value) -> Value {
    let mut current = value.clone();
    loop {
        let next = match &current {
            Value::Inst(id) => body
                .try_inst(*id)
                .and_then(|inst| match &inst.kind {
                    InstKind::Cast {
                        op: CastOp::BitCast,
                        value,
                    } => Some(value.clone()),
                    _ => None,
                }),
            Value::Const(Constant::BitCast(inner, _)) => Some(Value::Const((**inner).clone())),
            _ => None,
        };
        match next {
            Some(next) => current = next,
            None => return current,
        }
    }
}
