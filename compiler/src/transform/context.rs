use std::collections::HashMap;

use common::{log_debug, names};

use crate::config::ReturnAssertionPolicy;
use crate::error::{InstrumentError, Result};
use crate::ir::{Constant, FuncId, Module, StructDef, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutineKind {
    Init,
    Update,
    Alloc,
}

impl RoutineKind {
    pub fn routine_name(self, kind: &str) -> String {
        match self {
            RoutineKind::Init => names::init_routine_name(kind),
            RoutineKind::Update => names::update_routine_name(kind),
            RoutineKind::Alloc => names::alloc_routine_name(kind),
        }
    }
}

/// The state record of an assertion kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateType {
    /// `%struct.<kind>_state`
    pub ty: Type,
    /// The kind keeps no state between checks; sites get a null state
    /// pointer instead of storage.
    pub is_stateless: bool,
}

impl StateType {
    pub fn pointer(&self) -> Type {
        self.ty.clone().pointer_to()
    }
}

/// Per-run knowledge shared by the passes: the assertion library's types,
/// defaults and routines, and the run's policies.
pub struct InstrumentationContext {
    pub return_assertions: ReturnAssertionPolicy,
    routines: HashMap<(String, RoutineKind), FuncId>,
    state_types: HashMap<String, StateType>,
}

impl InstrumentationContext {
    pub fn new(return_assertions: ReturnAssertionPolicy) -> Self {
        Self {
            return_assertions,
            routines: HashMap::new(),
            state_types: HashMap::new(),
        }
    }

    /// The state record type of `kind`, registering an empty placeholder
    /// when the module does not define one.
    pub fn state_type_for(&mut self, module: &mut Module, kind: &str) -> StateType {
        if let Some(found) = self.state_types.get(kind) {
            return found.clone();
        }

        let name = names::state_type_name(kind);
        let def = module
            .struct_types
            .entry(name.clone())
            .or_insert_with(|| {
                log_debug!("No state record for assertion kind `{kind}`, registering `%{name}`");
                StructDef::default()
            });
        let state = StateType {
            is_stateless: def.is_empty(),
            ty: Type::named(name),
        };
        self.state_types.insert(kind.to_owned(), state.clone());
        state
    }

    /// The initial value of a module-scope state of `kind`: the library's
    /// `<kind>_state_default`, or all zeros when it declares none.
    pub fn default_state_for(&mut self, module: &mut Module, kind: &str) -> Constant {
        let state = self.state_type_for(module, kind);
        module
            .global_by_name(&names::state_default_name(kind))
            .and_then(|id| module.global(id))
            .and_then(|g| g.init.clone())
            .unwrap_or(Constant::Zero(state.ty))
    }

    /// Looks up a routine of the assertion library. A strict lookup of a
    /// missing routine fails the run.
    pub fn routine(
        &mut self,
        module: &Module,
        kind: &str,
        routine: RoutineKind,
        strict: bool,
    ) -> Result<Option<FuncId>> {
        let key = (kind.to_owned(), routine);
        let name = routine.routine_name(kind);
        let cached = self
            .routines
            .get(&key)
            .copied()
            .filter(|id| module.function(*id).is_some_and(|f| f.name == name));

        let found = cached.or_else(|| module.function_by_name(&name));
        match found {
            Some(id) => {
                self.routines.insert(key, id);
                Ok(Some(id))
            }
            None if strict => Err(InstrumentError::MissingRoutine(name)),
            None => {
                self.routines.remove(&key);
                Ok(None)
            }
        }
    }

    pub fn required_routine(
        &mut self,
        module: &Module,
        kind: &str,
        routine: RoutineKind,
    ) -> Result<FuncId> {
        self.routine(module, kind, routine, true)?
            .ok_or_else(|| InstrumentError::MissingRoutine(routine.routine_name(kind)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Function, FunctionType, GlobalVariable};

    #[test]
    fn missing_state_types_become_one_shared_placeholder() {
        let mut module = Module::new("m");
        let mut cx = InstrumentationContext::new(ReturnAssertionPolicy::First);

        let first = cx.state_type_for(&mut module, "nonnull");
        let second = cx.state_type_for(&mut module, "nonnull");
        assert!(first.is_stateless);
        assert_eq!(first, second);
        assert_eq!(module.struct_types.len(), 1);
        assert_eq!(
            cx.default_state_for(&mut module, "nonnull"),
            Constant::Zero(Type::named("struct.nonnull_state"))
        );
    }

    #[test]
    fn library_types_and_defaults_are_used() {
        let mut module = Module::new("m");
        module.struct_types.insert(
            "struct.ge_state".to_owned(),
            StructDef::new(vec![Type::i32()]),
        );
        let default = Constant::Struct {
            ty: Type::named("struct.ge_state"),
            fields: vec![Constant::i32(-1)],
        };
        module.add_global(GlobalVariable::new(
            "ge_state_default",
            Type::named("struct.ge_state"),
            Some(default.clone()),
        ));
        let mut cx = InstrumentationContext::new(ReturnAssertionPolicy::First);

        assert!(!cx.state_type_for(&mut module, "ge").is_stateless);
        assert_eq!(cx.default_state_for(&mut module, "ge"), default);
    }

    #[test]
    fn routine_lookups_notice_replaced_functions() {
        let mut module = Module::new("m");
        let ty = FunctionType::new(Type::Void, vec![]);
        let old = module.add_function(Function::declaration("__init_ge", ty.clone()));
        let mut cx = InstrumentationContext::new(ReturnAssertionPolicy::First);

        assert_eq!(cx.routine(&module, "ge", RoutineKind::Init, true).unwrap(), Some(old));
        module.remove_function(old);
        let new = module.add_function(Function::declaration("__init_ge", ty));
        assert_eq!(cx.routine(&module, "ge", RoutineKind::Init, true).unwrap(), Some(new));

        assert_eq!(cx.routine(&module, "ge", RoutineKind::Alloc, false).unwrap(), None);
        assert!(matches!(
            cx.routine(&module, "ge", RoutineKind::Update, true),
            Err(InstrumentError::MissingRoutine(name)) if name == "__update_ge"
        ));
    }
}
