//! Object creation and field access, including the resolution of symbolic
//! references.
//!
//! An access through an unresolved symbolic reference does not consume its
//! operands: it forks one refinement child per decision alternative (expand
//! fresh / alias existing / null), each with the resolution recorded and the
//! program counter unmoved, so the same instruction re-executes against the
//! refined state. Alias children are screened by the trigger rule engine;
//! fired trigger methods are pushed as frames and run to completion before
//! the interrupted method resumes.

use tracing::debug;

use super::invoke::AlgoEnsureInitialized;
use super::{finish, raise, type_text};
use crate::decision::{AliasCandidate, ClauseShape, DecisionAlternative};
use crate::dispatch::{Algorithm, DispatchCtx, FieldType, Outcome};
use crate::error::{EngineError, ExecFailure, StepError};
use crate::state::{Frame, Objekt, Resolution, State};
use crate::value::{HeapId, Origin, SymbolicRef, Value};

pub(crate) const NULL_POINTER: &str = "NullPointerException";

/// How a reference operand stands with respect to the current state.
pub(crate) enum RefState {
    Unresolved(SymbolicRef),
    At(HeapId),
    Null,
}

pub(crate) fn classify(state: &State, v: &Value) -> Result<RefState, StepError> {
    match v {
        Value::ReferenceConcrete(Some(id)) => Ok(RefState::At(*id)),
        Value::ReferenceConcrete(None) => Ok(RefState::Null),
        Value::ReferenceSymbolic(r) => Ok(match state.resolution(r) {
            Some(Resolution::Heap(id)) => RefState::At(id),
            Some(Resolution::Null) => RefState::Null,
            None => RefState::Unresolved(r.clone()),
        }),
        other => Err(ExecFailure::TypeMismatch {
            expected: "reference",
            found: other.to_string(),
        }
        .into()),
    }
}

/// Forks one refinement child per feasible resolution of `r`. Operands and
/// program counter stay untouched; every child re-executes the current
/// instruction with the resolution recorded.
pub(crate) fn refine_reference(
    state: &State,
    ctx: &mut DispatchCtx<'_>,
    r: &SymbolicRef,
) -> Result<Outcome, StepError> {
    let candidates: Vec<AliasCandidate> = state
        .heap()
        .filter_map(|(id, o)| {
            o.origin().map(|origin| AliasCandidate {
                heap_pos: id,
                origin: origin.clone(),
                type_name: o.type_name().to_string(),
            })
        })
        .filter(|c| c.type_name == r.type_name)
        .collect();

    let alts = ctx.port.decide(
        state.path_condition(),
        &ClauseShape::ReferenceResolution {
            reference: r,
            candidates: &candidates,
        },
    )?;
    debug!(reference = %r.origin, alternatives = alts.len(), "refining symbolic reference");

    let mut children = Vec::with_capacity(alts.len());
    for (i, alt) in alts.iter().enumerate() {
        let mut child = state.fork(&(i + 1).to_string());
        match alt {
            DecisionAlternative::ExpandTo { type_name } => {
                child.assume_expands(r.clone(), type_name)?;
            }
            DecisionAlternative::AliasTo { heap_pos } => {
                let target_origin = child
                    .objekt(*heap_pos)?
                    .origin()
                    .cloned()
                    .unwrap_or_default();
                child.assume_aliases(r.clone(), *heap_pos)?;
                let fires = ctx
                    .rules
                    .triggers_to_fire(r, &target_origin, &child)
                    .map_err(StepError::Engine)?;
                // First matching rule runs first, so its frame goes on top.
                for (sig, param) in fires.iter().rev() {
                    let mut frame = Frame::new(sig.clone());
                    frame.locals.insert(0, param.clone());
                    child.push_frame(frame)?;
                }
            }
            DecisionAlternative::Null => {
                child.assume_null(r.clone())?;
            }
            other => {
                return Err(StepError::Engine(EngineError::Fatal(format!(
                    "decision port answered a reference resolution with {other:?}"
                ))))
            }
        }
        children.push(child);
    }
    Ok(Outcome::Fork(children))
}

fn field_type_text(ty: &FieldType) -> String {
    match ty {
        FieldType::Prim(k) => k.to_string(),
        FieldType::Ref(t) => t.clone(),
    }
}

/// Reads a field, lazily materializing symbolic members of expansion-born
/// objects: the member symbol's origin is the object's origin extended by
/// the field name, so equal slots share one symbol.
pub(crate) fn read_field(
    state: &mut State,
    heap_pos: HeapId,
    name: &str,
    ty: &FieldType,
) -> Result<Value, StepError> {
    let (existing, origin) = {
        let obj = state.objekt(heap_pos)?;
        (
            obj.field(name).and_then(|var| var.value.clone()),
            obj.origin().cloned(),
        )
    };
    if let Some(v) = existing {
        return Ok(v);
    }
    let Some(origin) = origin else {
        return Err(ExecFailure::UnassignedField {
            name: name.to_string(),
        }
        .into());
    };
    let member = origin.field(name);
    let v = match ty {
        FieldType::Prim(k) => state.symbol_for(member, *k)?,
        FieldType::Ref(t) => Value::ReferenceSymbolic(state.symbolic_ref_for(member, t)?),
    };
    let ty_text = field_type_text(ty);
    state
        .objekt_mut(heap_pos)?
        .set_field(name, &ty_text, v.clone());
    Ok(v)
}

pub struct AlgoNew {
    pub class: String,
}

impl Algorithm for AlgoNew {
    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let id = state.heap_alloc(Objekt::new_instance(self.class.clone()))?;
        state.push_operand(Value::ReferenceConcrete(Some(id)))?;
        finish(state)
    }
}

pub struct AlgoGetField {
    pub name: String,
    pub ty: FieldType,
}

impl Algorithm for AlgoGetField {
    fn operand_count(&self) -> usize {
        1
    }

    fn execute(&self, state: &mut State, ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let target = state.peek_operand(0)?.clone();
        match classify(state, &target)? {
            RefState::Unresolved(r) => refine_reference(state, ctx, &r),
            RefState::Null => {
                state.pop_operand()?;
                raise(state, NULL_POINTER)
            }
            RefState::At(id) => {
                state.pop_operand()?;
                let v = read_field(state, id, &self.name, &self.ty)?;
                state.push_operand(v)?;
                finish(state)
            }
        }
    }
}

pub struct AlgoPutField {
    pub name: String,
}

impl Algorithm for AlgoPutField {
    fn operand_count(&self) -> usize {
        2
    }

    fn execute(&self, state: &mut State, ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let target = state.peek_operand(1)?.clone();
        match classify(state, &target)? {
            RefState::Unresolved(r) => refine_reference(state, ctx, &r),
            RefState::Null => {
                state.pop_operand()?;
                state.pop_operand()?;
                raise(state, NULL_POINTER)
            }
            RefState::At(id) => {
                let value = state.pop_operand()?;
                state.pop_operand()?;
                let ty = type_text(&value);
                state.objekt_mut(id)?.set_field(&self.name, &ty, value);
                finish(state)
            }
        }
    }
}

pub struct AlgoGetStatic {
    pub class: String,
    pub field: String,
    pub ty: FieldType,
}

impl Algorithm for AlgoGetStatic {
    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        if !state.klass_initialized(&self.class) {
            return Ok(Outcome::Continue(Box::new(AlgoEnsureInitialized {
                class: self.class.clone(),
            })));
        }
        let existing = state
            .klass(&self.class)
            .and_then(|k| k.field(&self.field))
            .and_then(|var| var.value.clone());
        let v = match existing {
            Some(v) => v,
            None => {
                // Statics of an assumed-pre-initialized class start symbolic.
                let origin = Origin::root(self.class.as_str()).field(self.field.as_str());
                let v = match &self.ty {
                    FieldType::Prim(k) => state.symbol_for(origin, *k)?,
                    FieldType::Ref(t) => {
                        Value::ReferenceSymbolic(state.symbolic_ref_for(origin, t)?)
                    }
                };
                let ty_text = field_type_text(&self.ty);
                state
                    .ensure_klass(&self.class)?
                    .set_field(&self.field, &ty_text, v.clone());
                v
            }
        };
        state.push_operand(v)?;
        finish(state)
    }
}

pub struct AlgoPutStatic {
    pub class: String,
    pub field: String,
}

impl Algorithm for AlgoPutStatic {
    fn operand_count(&self) -> usize {
        1
    }

    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        if !state.klass_initialized(&self.class) {
            return Ok(Outcome::Continue(Box::new(AlgoEnsureInitialized {
                class: self.class.clone(),
            })));
        }
        let value = state.pop_operand()?;
        let ty = type_text(&value);
        state.ensure_klass(&self.class)?.set_field(&self.field, &ty, value);
        finish(state)
    }
}
