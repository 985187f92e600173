//! Merging of a library module into a target module.

use std::collections::HashMap;

use thiserror::Error;

use common::log_debug;

use super::{Constant, FuncId, Function, GlobalId, GlobalVariable, Linkage, Module, Value};

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("struct type `%{0}` has conflicting layouts")]
    StructConflict(String),
    #[error("symbol `{0}` is defined in both modules")]
    DuplicateDefinition(String),
    #[error("symbol `{name}` has type `{target}` in the target but `{library}` in the library")]
    TypeMismatch {
        name: String,
        target: String,
        library: String,
    },
}

enum Resolution<I> {
    /// The library entity becomes (or fills in) this target entity.
    Adopt(I),
    /// The library entity is represented by this existing target entity.
    Reuse(I),
}

#[derive(Default)]
struct IdMaps {
    functions: HashMap<FuncId, FuncId>,
    globals: HashMap<GlobalId, GlobalId>,
}

impl IdMaps {
    fn remap_constant(&self, constant: &mut Constant) {
        constant.visit_mut(&mut |c| match c {
            Constant::Func(id) => {
                if let Some(to) = self.functions.get(&*id) {
                    *id = *to;
                }
            }
            Constant::Global(id) => {
                if let Some(to) = self.globals.get(&*id) {
                    *id = *to;
                }
            }
            _ => {}
        });
    }

    fn remap_function(&self, function: &mut Function) {
        let Some(body) = &mut function.body else {
            return;
        };
        for inst in body.insts_mut() {
            for operand in inst.kind.operands_mut() {
                if let Value::Const(c) = operand {
                    self.remap_constant(c);
                }
            }
        }
    }
}

/// Decides how a library symbol meets a target symbol of the same name.
fn resolve(
    name: &str,
    target: (Linkage, bool),
    library: (Linkage, bool),
) -> Result<Option<bool>, LinkError> {
    let (target_linkage, target_is_decl) = target;
    let (library_linkage, library_is_decl) = library;
    /* NOTE: `None` means the symbols do not meet at all (the library one gets
     * renamed), `Some(true)` means the library one fills in the target one,
     * `Some(false)` means the target one is kept as is. */
    if target_linkage.is_local() || library_linkage.is_local() {
        return Ok(None);
    }
    Ok(match (target_is_decl, library_is_decl) {
        (true, false) => Some(true),
        (_, true) => Some(false),
        (false, false) if target_linkage.is_discardable() || library_linkage.is_discardable() => {
            Some(false)
        }
        (false, false) => return Err(LinkError::DuplicateDefinition(name.to_owned())),
    })
}

/// Links `library` into `target`.
///
/// Declarations in either module are resolved against definitions in the
/// other one; references inside the moved library code are remapped to the
/// target's ids.
pub fn link_in(target: &mut Module, mut library: Module) -> Result<(), LinkError> {
    for (name, def) in std::mem::take(&mut library.struct_types) {
        match target.struct_types.get_mut(&name) {
            None => {
                target.struct_types.insert(name, def);
            }
            Some(existing) if *existing == def || def.is_empty() => {}
            Some(existing) if existing.is_empty() => *existing = def,
            Some(_) => return Err(LinkError::StructConflict(name)),
        }
    }

    let mut maps = IdMaps::default();

    let mut global_plan = Vec::new();
    for (lib_id, global) in library.globals() {
        let resolution = match target.global_by_name(&global.name) {
            Some(existing) => {
                let current = target.global(existing).expect("Looked up by name");
                match resolve(
                    &global.name,
                    (current.linkage, current.is_declaration()),
                    (global.linkage, global.is_declaration()),
                )? {
                    Some(true) if current.ty != global.ty => {
                        return Err(LinkError::TypeMismatch {
                            name: global.name.clone(),
                            target: current.ty.to_string(),
                            library: global.ty.to_string(),
                        });
                    }
                    Some(true) => Resolution::Adopt(existing),
                    Some(false) => Resolution::Reuse(existing),
                    None => Resolution::Adopt(target.add_global(GlobalVariable::new(
                        target.unique_symbol_name(&global.name),
                        global.ty.clone(),
                        None,
                    ))),
                }
            }
            None => Resolution::Adopt(target.add_global(GlobalVariable::new(
                global.name.clone(),
                global.ty.clone(),
                None,
            ))),
        };
        let (Resolution::Adopt(id) | Resolution::Reuse(id)) = resolution;
        maps.globals.insert(lib_id, id);
        global_plan.push((lib_id, resolution));
    }

    let mut function_plan = Vec::new();
    for (lib_id, function) in library.functions() {
        let resolution = match target.function_by_name(&function.name) {
            Some(existing) => {
                let current = target.function(existing).expect("Looked up by name");
                match resolve(
                    &function.name,
                    (current.linkage, current.is_declaration()),
                    (function.linkage, function.is_declaration()),
                )? {
                    Some(true) if current.ty != function.ty => {
                        return Err(LinkError::TypeMismatch {
                            name: function.name.clone(),
                            target: current.ty.to_string(),
                            library: function.ty.to_string(),
                        });
                    }
                    Some(true) => Resolution::Adopt(existing),
                    Some(false) => Resolution::Reuse(existing),
                    None => Resolution::Adopt(target.add_function(Function::declaration(
                        target.unique_symbol_name(&function.name),
                        function.ty.clone(),
                    ))),
                }
            }
            None => Resolution::Adopt(target.add_function(Function::declaration(
                function.name.clone(),
                function.ty.clone(),
            ))),
        };
        let (Resolution::Adopt(id) | Resolution::Reuse(id)) = resolution;
        maps.functions.insert(lib_id, id);
        function_plan.push((lib_id, resolution));
    }

    for (lib_id, resolution) in global_plan {
        let Resolution::Adopt(id) = resolution else {
            continue;
        };
        let Some(mut global) = library.remove_global(lib_id) else {
            continue;
        };
        if let Some(init) = &mut global.init {
            maps.remap_constant(init);
        }
        if let Some(slot) = target.global_mut(id) {
            global.name = std::mem::take(&mut slot.name);
            *slot = global;
        }
    }

    for (lib_id, resolution) in function_plan {
        let Resolution::Adopt(id) = resolution else {
            continue;
        };
        let Some(mut function) = library.remove_function(lib_id) else {
            continue;
        };
        maps.remap_function(&mut function);
        if let Some(slot) = target.function_mut(id) {
            log_debug!("Linking in function `{}`", function.name);
            function.name = std::mem::take(&mut slot.name);
            *slot = function;
        }
    }

    for mut subprogram in std::mem::take(&mut library.subprograms) {
        subprogram.function = subprogram
            .function
            .and_then(|id| maps.functions.get(&id).copied());
        target.subprograms.push(subprogram);
    }

    Ok(())
}
