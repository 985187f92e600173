use std::collections::HashMap;

use common::{
    log_debug, log_info, log_warn, names, Annotation, AssertionDescriptor, AssertionParam, Uid,
};

use super::ModulePass;
use crate::error::{InstrumentError, Result};
use crate::ir::{
    Body, CallSite, Constant, DebugLoc, FuncId, GlobalVariable, InstId, InstKind, Instruction,
    Module, Type, Value,
};
use crate::transform::{
    markers::{
        as_marker_call, marker_functions, marker_kind, strip_pointer_casts, MarkerCall, MarkerKind,
    },
    modification::{BodyInstructionManager, BodyModificationUnit},
    InstrumentationContext, RoutineKind, StateType,
};

/// Lowers the marker calls left by the front end into calls to the assertion
/// library, and routes the caller's states into the hidden parameters the
/// callee instrumentation added.
#[derive(Default)]
pub struct CallerInstrumenter {
    markers: Vec<(FuncId, MarkerKind)>,
}

impl ModulePass for CallerInstrumenter {
    fn name(&self) -> &'static str {
        "caller instrumentation"
    }

    fn run(&mut self, module: &mut Module, cx: &mut InstrumentationContext) -> Result<()> {
        self.markers = marker_functions(module);
        if self.markers.is_empty() {
            log_info!("No marker declarations found, nothing to lower");
            return Ok(());
        }

        let mut total = 0;
        for function in module.function_ids() {
            let Some(mut body) = module.function_mut(function).and_then(|f| f.body.take()) else {
                continue;
            };
            let mut scope = FunctionScope::new(module, function);
            let result = scope.instrument_body(module, cx, &self.markers, &mut body);
            if let Some(f) = module.function_mut(function) {
                f.body = Some(body);
            }
            total += result?;
        }
        log_info!("Lowered {total} marker calls");

        self.remove_unused_markers(module);
        Ok(())
    }
}

impl CallerInstrumenter {
    fn remove_unused_markers(&self, module: &mut Module) {
        for (id, kind) in &self.markers {
            if !module.is_function_used(*id) {
                log_debug!("Removing marker declaration `{}`", kind.name());
                module.remove_function(*id);
            }
        }
    }
}

/// Where the state of an assertion instance lives inside a function.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StateLocation {
    /// A local slot in the entry block.
    Slot(InstId),
    /// A hidden parameter filled by the callers.
    Param(u32),
    /// The kind keeps no state.
    Null(Type),
}

impl StateLocation {
    fn value(&self) -> Value {
        match self {
            StateLocation::Slot(id) => Value::Inst(*id),
            StateLocation::Param(index) => Value::Arg(*index),
            StateLocation::Null(ty) => Constant::null(ty.clone()).into(),
        }
    }
}

struct Site {
    id: InstId,
    marker: MarkerCall,
    debug_loc: Option<DebugLoc>,
}

impl Site {
    fn call(&self, routine: FuncId, args: Vec<Value>) -> Instruction {
        Instruction::call(CallSite::direct(routine, args), Type::Void)
            .with_debug_loc(self.debug_loc.clone())
    }
}

/// The per-function part of the pass: state locations are only valid inside
/// the function that created them.
struct FunctionScope {
    function: FuncId,
    name: String,
    locations: HashMap<Uid, StateLocation>,
}

impl FunctionScope {
    fn new(module: &Module, function: FuncId) -> Self {
        Self {
            function,
            name: module
                .function(function)
                .map(|f| f.name.clone())
                .unwrap_or_default(),
            locations: HashMap::new(),
        }
    }

    fn instrument_body(
        &mut self,
        module: &mut Module,
        cx: &mut InstrumentationContext,
        markers: &[(FuncId, MarkerKind)],
        body: &mut Body,
    ) -> Result<usize> {
        let mut unit = BodyModificationUnit::for_body(body);
        let mut count = 0;

        for id in body.inst_ids() {
            let Some(inst) = body.try_inst(id) else {
                continue;
            };
            let Some(marker) = as_marker_call(module, markers, inst) else {
                if marker_kind(markers, inst).is_some() {
                    log_debug!("Dropping marker {id} with unreadable text in `{}`", self.name);
                    unit.remove(id);
                    count += 1;
                }
                continue;
            };
            let site = Site {
                id,
                marker,
                debug_loc: inst.debug_loc.clone(),
            };

            match site.marker.kind {
                MarkerKind::VarDeclared => self.instrument_init(module, cx, body, &mut unit, &site)?,
                MarkerKind::VarAssigned => {
                    self.instrument_assignment(module, cx, body, &mut unit, &site)?
                }
            }
            unit.remove(id);
            count += 1;
        }

        if count > 0 {
            log_debug!("Lowered {count} markers in `{}`", self.name);
        }
        unit.commit(body);
        Ok(count)
    }

    fn instrument_init(
        &mut self,
        module: &mut Module,
        cx: &mut InstrumentationContext,
        body: &Body,
        unit: &mut BodyModificationUnit,
        site: &Site,
    ) -> Result<()> {
        let descriptor = match Annotation::decode(&site.marker.text) {
            Annotation::Assertion(descriptor) => descriptor,
            other => {
                log_debug!(
                    "Dropping declaration marker `{}` in `{}`: {:?}",
                    site.marker.text,
                    self.name,
                    other
                );
                return Ok(());
            }
        };
        log_debug!("Initializing `{descriptor}` in `{}`", self.name);

        let state = cx.state_type_for(module, &descriptor.kind);
        let init = cx.required_routine(module, &descriptor.kind, RoutineKind::Init)?;
        let location = self.declare_location(unit, &state, descriptor.uid);
        let props = self.props(module, &descriptor);
        let anchor = init_anchor(body, site);

        if let StateLocation::Slot(slot) = &location {
            if let Some(alloc) = cx.routine(module, &descriptor.kind, RoutineKind::Alloc, false)? {
                self.fill_from_alloc(module, unit, anchor, site, alloc, &state, *slot, &props);
            }
        }

        unit.insert_after(
            anchor,
            [site.call(
                init,
                vec![
                    location.value(),
                    site.marker.address.clone(),
                    props.into(),
                    site.marker.file.clone(),
                    site.marker.line.clone(),
                ],
            )],
        );
        Ok(())
    }

    /// The location of `uid`, allocating a slot the first time a stateful
    /// kind is declared.
    fn declare_location(
        &mut self,
        unit: &mut BodyModificationUnit,
        state: &StateType,
        uid: Uid,
    ) -> StateLocation {
        if let Some(existing) = self.locations.get(&uid) {
            log_debug!("Reusing the state of uid {uid} in `{}`", self.name);
            return existing.clone();
        }

        let location = if state.is_stateless {
            StateLocation::Null(state.pointer())
        } else {
            StateLocation::Slot(unit.add_entry_slot(
                Instruction::alloca(state.ty.clone()).with_name(names::state_name(uid)),
            ))
        };
        self.locations.insert(uid, location.clone());
        location
    }

    /// Stores the result of the kind's allocation routine into the slot
    /// before it gets initialized.
    #[allow(clippy::too_many_arguments)]
    fn fill_from_alloc(
        &self,
        module: &Module,
        unit: &mut BodyModificationUnit,
        anchor: InstId,
        site: &Site,
        alloc: FuncId,
        state: &StateType,
        slot: InstId,
        props: &Constant,
    ) {
        let returns_state = module
            .function(alloc)
            .is_some_and(|f| *f.ret_type() == state.ty);
        if !returns_state {
            log_warn!(
                "Allocation routine of `{}` does not return the state record, skipping it",
                state.ty
            );
            return;
        }

        let call = Instruction::call(
            CallSite::direct(alloc, vec![site.marker.address.clone(), props.clone().into()]),
            state.ty.clone(),
        )
        .with_debug_loc(site.debug_loc.clone());
        let allocated = unit.insert_after(anchor, [call]);
        unit.insert_after(
            anchor,
            allocated
                .into_iter()
                .map(|id| Instruction::store(Value::Inst(id), Value::Inst(slot))),
        );
    }

    /// The null-terminated `i8*` array of the assertion's parameters, or a
    /// null `i8**` when it has none.
    fn props(&self, module: &mut Module, descriptor: &AssertionDescriptor) -> Constant {
        let elem = Type::i8_ptr();
        if descriptor.params.is_empty() {
            return Constant::null(elem.pointer_to());
        }

        let mut elems = Vec::with_capacity(descriptor.params.len() + 1);
        for param in &descriptor.params {
            elems.push(match param {
                AssertionParam::Int(value) => {
                    Constant::IntToPtr(Box::new(Constant::int(64, *value)), elem.clone())
                }
                AssertionParam::Str(text) => {
                    module.add_c_string(&names::prop_name(&self.name, descriptor.uid), text)
                }
            });
        }
        elems.push(Constant::null(elem.clone()));

        let ty = elem.clone().array_of(elems.len() as u64);
        let name = module.unique_symbol_name(&names::props_name(&self.name, descriptor.uid));
        let array = module.add_global(GlobalVariable::private_constant(
            name,
            ty,
            Constant::Array {
                elem: elem.clone(),
                elems,
            },
        ));
        Constant::Global(array).first_element(elem)
    }

    fn instrument_assignment(
        &mut self,
        module: &mut Module,
        cx: &mut InstrumentationContext,
        body: &mut Body,
        unit: &mut BodyModificationUnit,
        site: &Site,
    ) -> Result<()> {
        match Annotation::decode(&site.marker.text) {
            Annotation::FuncallForwarding(uids) => self.forward_states(module, body, site, &uids),
            Annotation::Assertion(descriptor) => {
                self.instrument_update(module, cx, body, unit, site, &descriptor)
            }
            other => {
                log_debug!(
                    "Dropping assignment marker `{}` in `{}`: {:?}",
                    site.marker.text,
                    self.name,
                    other
                );
                Ok(())
            }
        }
    }

    /// Replaces the placeholders of the call right before the marker with
    /// the states of `uids`. The last uid goes to the last parameter.
    fn forward_states(
        &self,
        module: &Module,
        body: &mut Body,
        site: &Site,
        uids: &[Uid],
    ) -> Result<()> {
        let call_id = body
            .prev_inst(site.id)
            .filter(|id| {
                body.try_inst(*id)
                    .is_some_and(|inst| matches!(inst.kind, InstKind::Call(_)))
            })
            .ok_or_else(|| self.malformed(format!("`{}` does not follow a call", site.marker.text)))?;
        let callee = body[call_id]
            .kind
            .call_site()
            .and_then(CallSite::direct_callee)
            .ok_or_else(|| {
                self.malformed(format!(
                    "`{}` follows an indirect call",
                    site.marker.text
                ))
            })?;
        let Some(callee_fn) = module.function(callee) else {
            return Err(InstrumentError::DanglingFunction(callee));
        };
        let param_count = callee_fn.ty.params.len();
        let callee_name = callee_fn.name.clone();
        log_debug!(
            "Forwarding uids {uids:?} into the call to `{callee_name}` in `{}`",
            self.name
        );

        for (i, uid) in uids.iter().rev().enumerate() {
            let index = param_count.checked_sub(i + 1).ok_or_else(|| {
                self.malformed(format!(
                    "`{callee_name}` has fewer parameters than the {} forwarded states",
                    uids.len()
                ))
            })?;
            let location = self.resolve_location(module, *uid)?;

            let Some(arg) = body
                .try_inst_mut(call_id)
                .and_then(|inst| inst.kind.call_site_mut())
                .and_then(|call| call.args.get_mut(index))
            else {
                return Err(self.malformed(format!(
                    "the call to `{callee_name}` has no argument {index}"
                )));
            };
            if !arg.is_undef() {
                return Err(InstrumentError::PlaceholderAlreadyAssigned {
                    function: self.name.clone(),
                    callee: callee_name,
                    index,
                    uid: *uid,
                });
            }
            *arg = location.value();
        }
        Ok(())
    }

    fn instrument_update(
        &self,
        module: &Module,
        cx: &mut InstrumentationContext,
        body: &Body,
        unit: &mut BodyModificationUnit,
        site: &Site,
        descriptor: &AssertionDescriptor,
    ) -> Result<()> {
        log_debug!("Updating `{descriptor}` in `{}`", self.name);
        let location = self.resolve_location(module, descriptor.uid)?;
        let update = cx.required_routine(module, &descriptor.kind, RoutineKind::Update)?;
        let value = self.assigned_value(body, site)?;

        unit.insert_before(
            site.id,
            [site.call(
                update,
                vec![
                    value,
                    location.value(),
                    site.marker.file.clone(),
                    site.marker.line.clone(),
                ],
            )],
        );
        Ok(())
    }

    fn resolve_location(&self, module: &Module, uid: Uid) -> Result<StateLocation> {
        if let Some(location) = self.locations.get(&uid) {
            return Ok(location.clone());
        }
        module
            .function(self.function)
            .and_then(|f| f.param_index_by_name(&names::state_name(uid)))
            .map(StateLocation::Param)
            .ok_or_else(|| InstrumentError::MissingState {
                function: self.name.clone(),
                uid,
            })
    }

    /// The value stored by the assignment the marker annotates. Expected
    /// shape: `store v, p; [%a = bitcast p;] marker(%a, ...)`.
    fn assigned_value(&self, body: &Body, site: &Site) -> Result<Value> {
        let target = strip_pointer_casts(body, &site.marker.address);

        let mut prev = body.prev_inst(site.id);
        if let (Some(id), Some(address)) = (prev, site.marker.address.as_inst()) {
            let is_address_cast = id == address
                && body
                    .try_inst(id)
                    .is_some_and(|inst| matches!(inst.kind, InstKind::Cast { .. }));
            if is_address_cast {
                prev = body.prev_inst(id);
            }
        }

        match prev.and_then(|id| body.try_inst(id)) {
            Some(Instruction {
                kind: InstKind::Store { value, ptr },
                ..
            }) if strip_pointer_casts(body, ptr) == target => Ok(value.clone()),
            _ => Err(self.malformed(format!(
                "`{}` does not follow a store to the annotated address",
                site.marker.text
            ))),
        }
    }

    fn malformed(&self, reason: String) -> InstrumentError {
        InstrumentError::MalformedMarker {
            function: self.name.clone(),
            reason,
        }
    }
}

/// Initialization must see the initial value: right after the store that
/// follows a declaration marker, or right after the marker otherwise (e.g.
/// parameters, whose store precedes it).
fn init_anchor(body: &Body, site: &Site) -> InstId {
    let target = strip_pointer_casts(body, &site.marker.address);
    match body.next_inst(site.id).map(|id| (id, body.try_inst(id))) {
        Some((
            next,
            Some(Instruction {
                kind: InstKind::Store { ptr, .. },
                ..
            }),
        )) if strip_pointer_casts(body, ptr) == target => next,
        _ => site.id,
    }
}
