//! Replacement of a function by one with an extended parameter list.

use common::{log_debug, log_trace};

use crate::error::{InstrumentError, Result};
use crate::ir::{
    AttributeSet, Body, CallAttributes, CallSite, Constant, FuncId, Function, FunctionType,
    InstKind, Instruction, Param, Type, Value,
};
use crate::ir::Module;

/// A parameter of a replacement signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    pub ty: Type,
    pub param: Param,
}

impl ParamDecl {
    pub fn new(ty: Type, param: Param) -> Self {
        Self { ty, param }
    }
}

/// Replaces `function` with a function taking `params`, which must start with
/// the current parameters of `function`.
///
/// The body, attributes and linkage move to the new function. Every call site
/// is rebuilt with `undef` placeholders for the appended parameters, and any
/// other reference to the old function is redirected to the new one before
/// the old one is removed. If nothing is appended, `function` is returned as
/// is.
pub fn replace_signature(
    module: &mut Module,
    function: FuncId,
    params: Vec<ParamDecl>,
) -> Result<FuncId> {
    let old = module
        .function(function)
        .ok_or(InstrumentError::DanglingFunction(function))?;
    check_prefix(old, &params)?;

    let new_ty = FunctionType {
        ret: old.ty.ret.clone(),
        params: params.iter().map(|p| p.ty.clone()).collect(),
        var_arg: old.ty.var_arg,
    };
    if new_ty == old.ty {
        log_trace!("Signature of `{}` is unchanged", old.name);
        return Ok(function);
    }
    let old_param_count = old.ty.params.len();
    log_debug!(
        "Replacing signature of `{}`: `{}` -> `{}`",
        old.name,
        old.ty,
        new_ty
    );

    let old = module
        .function_mut(function)
        .ok_or(InstrumentError::DanglingFunction(function))?;
    let replacement = Function {
        name: old.name.clone(),
        ty: new_ty.clone(),
        params: params.into_iter().map(|p| p.param).collect(),
        linkage: old.linkage,
        call_conv: old.call_conv,
        attrs: old.attrs.clone(),
        ret_attrs: old.ret_attrs.clone(),
        body: old.body.take(),
    };
    let new = module.insert_function_before(function, replacement);

    let mut rebuilt = 0;
    for id in module.function_ids() {
        if let Some(body) = module.function_mut(id).and_then(|f| f.body.as_mut()) {
            rebuilt += rebuild_call_sites(body, function, new, old_param_count, &new_ty.params);
        }
    }
    log_debug!("Rebuilt {rebuilt} call sites");

    // Non-call uses: casts in constants, global initializers, debug info.
    module.substitute_function(function, new);
    module.remove_function(function);
    Ok(new)
}

fn check_prefix(old: &Function, params: &[ParamDecl]) -> Result<()> {
    if params.len() < old.ty.params.len() {
        return Err(InstrumentError::SignatureShape {
            function: old.name.clone(),
            reason: format!(
                "{} parameters given for a function with {}",
                params.len(),
                old.ty.params.len()
            ),
        });
    }
    match old
        .ty
        .params
        .iter()
        .zip(params)
        .position(|(old, new)| *old != new.ty)
    {
        Some(index) => Err(InstrumentError::SignatureMismatch {
            function: old.name.clone(),
            index,
            old: old.ty.params[index].to_string(),
            new: params[index].ty.to_string(),
        }),
        None => Ok(()),
    }
}

/// Rebuilds the direct calls to `old` in the body as calls to `new`.
fn rebuild_call_sites(
    body: &mut Body,
    old: FuncId,
    new: FuncId,
    old_param_count: usize,
    new_params: &[Type],
) -> usize {
    let callee = Value::func(old);
    let sites: Vec<_> = body
        .iter_insts()
        .filter(|(_, inst)| inst.kind.call_site().is_some_and(|c| c.callee == callee))
        .map(|(id, _)| id)
        .collect();

    for &site in &sites {
        let Some(position) = body.position(site) else {
            continue;
        };
        let inst = &body[site];
        let Some(call) = inst.kind.call_site() else {
            continue;
        };
        let new_call = extend_call(call, new, old_param_count, new_params);
        let kind = match &inst.kind {
            InstKind::Invoke { normal, unwind, .. } => InstKind::Invoke {
                call: new_call,
                normal: *normal,
                unwind: *unwind,
            },
            _ => InstKind::Call(new_call),
        };
        let rebuilt = Instruction {
            name: inst.name.clone(),
            ty: inst.ty.clone(),
            kind,
            debug_loc: inst.debug_loc.clone(),
        };

        let rebuilt = body.add_inst(rebuilt);
        body.insert_at(position, rebuilt);
        body.replace_all_uses(&Value::Inst(site), &Value::Inst(rebuilt));
        body.remove(site);
        log_trace!("Rebuilt call site {site} as {rebuilt}");
    }
    sites.len()
}

fn extend_call(
    call: &CallSite,
    new: FuncId,
    old_param_count: usize,
    new_params: &[Type],
) -> CallSite {
    let fixed = old_param_count.min(call.args.len());
    let placeholders = &new_params[old_param_count.min(new_params.len())..];
    let attrs_of = |i: usize| call.attrs.param(i).cloned().unwrap_or_default();

    let mut args = Vec::with_capacity(call.args.len() + placeholders.len());
    let mut param_attrs = Vec::with_capacity(args.capacity());
    args.extend_from_slice(&call.args[..fixed]);
    param_attrs.extend((0..fixed).map(attrs_of));
    args.extend(placeholders.iter().map(|ty| Constant::Undef(ty.clone()).into()));
    param_attrs.extend(placeholders.iter().map(|_| AttributeSet::new()));
    // Var-arg arguments.
    args.extend_from_slice(&call.args[fixed..]);
    param_attrs.extend((fixed..call.args.len()).map(attrs_of));

    while param_attrs.last().is_some_and(|a| a.is_empty()) {
        param_attrs.pop();
    }

    CallSite {
        callee: Value::func(new),
        args,
        attrs: CallAttributes {
            func: call.attrs.func.clone(),
            ret: call.attrs.ret.clone(),
            params: param_attrs,
        },
        call_conv: call.call_conv,
        tail: call.tail,
    }
}
