//! Array allocation and element access.
//!
//! Concrete arrays use dense storage with a fast in-bounds path. Arrays with
//! a symbolic length or a symbolic access index go through the access-outcome
//! model: each read or write records the condition under which a value sits
//! at the accessed slot, keyed by a distinguished access-index term. Bounds
//! checks on symbolic indices fork through the decision port.

use super::objects::{classify, refine_reference, RefState, NULL_POINTER};
use super::{finish, raise};
use crate::decision::{ClauseShape, DecisionAlternative};
use crate::dispatch::{Algorithm, DispatchCtx, FieldType, Outcome};
use crate::error::{EngineError, ExecFailure, StepError};
use crate::state::{ArrayOutcome, ArrayRepr, Objekt, State};
use crate::value::{Const, HeapId, Operator, Value};

const INDEX_OUT_OF_BOUNDS: &str = "IndexOutOfBoundsException";
const NEGATIVE_ARRAY_SIZE: &str = "NegativeArraySizeException";

/// Placeholder term for "the index of this access" in outcome conditions.
/// Equality of two outcome conditions is structural, so a later read with
/// the same index expression hits the earlier write's entry.
fn access_index() -> Value {
    Value::FunctionApplication {
        name: "{INDEX}".to_string(),
        args: Vec::new(),
    }
}

fn at_index(index: &Value) -> Value {
    Value::binop(Operator::Eq, access_index(), index.clone())
}

fn in_bounds(index: &Value, length: &Value) -> Value {
    let nonneg = Value::binop(
        Operator::Ge,
        index.clone(),
        Value::Simplex(Const::Int(0)),
    );
    let below = Value::binop(Operator::Lt, index.clone(), length.clone());
    Value::binop(Operator::And, nonneg, below)
}

fn element_class(elem: &FieldType) -> String {
    match elem {
        FieldType::Prim(k) => format!("{k}[]"),
        FieldType::Ref(t) => format!("{t}[]"),
    }
}

fn default_element(elem: &FieldType) -> Value {
    match elem {
        FieldType::Prim(k) => Value::Simplex(match k {
            crate::value::PrimKind::Bool => Const::Bool(false),
            crate::value::PrimKind::Int => Const::Int(0),
            crate::value::PrimKind::Long => Const::Long(0),
            crate::value::PrimKind::Float => Const::Float(0.0),
            crate::value::PrimKind::Double => Const::Double(0.0),
        }),
        FieldType::Ref(_) => Value::NULL,
    }
}

fn array_length(state: &State, id: HeapId) -> Result<Value, StepError> {
    match state.objekt(id)? {
        Objekt::Array { length, .. } => Ok(length.clone()),
        other => Err(ExecFailure::TypeMismatch {
            expected: "array",
            found: other.type_name().to_string(),
        }
        .into()),
    }
}

/// Reads an element of array `id` under an already-assumed in-bounds index.
/// Outcome entries are consulted first (read-your-write); a miss on an
/// expansion-born array lazily mints the member symbol at the array's origin
/// extended by the index text, so equal indices share one symbol.
fn read_element(
    state: &mut State,
    id: HeapId,
    array_ref: &Value,
    index: &Value,
    elem: &FieldType,
) -> Result<Value, StepError> {
    let wanted = at_index(index);
    let (origin, hit) = match state.objekt(id)? {
        Objekt::Array { origin, repr, .. } => {
            let hit = match repr {
                ArrayRepr::Dense(items) => {
                    if let Value::Simplex(Const::Int(i)) = index {
                        items.get(*i as usize).cloned()
                    } else {
                        None
                    }
                }
                ArrayRepr::Outcomes(entries) => entries
                    .iter()
                    .find(|e| e.condition == wanted)
                    .map(|e| e.value.clone()),
            };
            (origin.clone(), hit)
        }
        other => {
            return Err(ExecFailure::TypeMismatch {
                expected: "array",
                found: other.type_name().to_string(),
            }
            .into())
        }
    };
    if let Some(v) = hit {
        return Ok(v);
    }
    let v = match origin {
        Some(origin) => {
            let member = origin.element(index.to_string());
            match elem {
                FieldType::Prim(k) => state.symbol_for(member, *k)?,
                FieldType::Ref(t) => {
                    Value::ReferenceSymbolic(state.symbolic_ref_for(member, t)?)
                }
            }
        }
        // Concrete array, symbolic index: an uninterpreted selection.
        None => Value::FunctionApplication {
            name: "select".to_string(),
            args: vec![array_ref.clone(), index.clone()],
        },
    };
    if let Objekt::Array {
        repr: ArrayRepr::Outcomes(entries),
        ..
    } = state.objekt_mut(id)?
    {
        entries.push(ArrayOutcome {
            condition: wanted,
            value: v.clone(),
        });
    }
    Ok(v)
}

/// Writes an element under an already-assumed in-bounds index. A dense array
/// hit by a symbolic index is first rebuilt as explicit outcome entries so
/// the new entry can coexist with the old contents.
fn write_element(state: &mut State, id: HeapId, index: &Value, value: Value) -> Result<(), StepError> {
    let wanted = at_index(index);
    match state.objekt_mut(id)? {
        Objekt::Array { repr, .. } => {
            if let ArrayRepr::Dense(items) = repr {
                if let Value::Simplex(Const::Int(i)) = index {
                    if let Some(slot) = items.get_mut(*i as usize) {
                        *slot = value;
                        return Ok(());
                    }
                }
                let entries = items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| ArrayOutcome {
                        condition: at_index(&Value::Simplex(Const::Int(i as i32))),
                        value: v.clone(),
                    })
                    .collect();
                *repr = ArrayRepr::Outcomes(entries);
            }
            if let ArrayRepr::Outcomes(entries) = repr {
                // Later entries shadow earlier ones for the same index term.
                entries.retain(|e| e.condition != wanted);
                entries.push(ArrayOutcome {
                    condition: wanted,
                    value,
                });
            }
            Ok(())
        }
        other => Err(ExecFailure::TypeMismatch {
            expected: "array",
            found: other.type_name().to_string(),
        }
        .into()),
    }
}

pub struct AlgoNewArray {
    pub elem: FieldType,
}

impl Algorithm for AlgoNewArray {
    fn operand_count(&self) -> usize {
        1
    }

    fn execute(&self, state: &mut State, ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let length = state.pop_operand()?;
        let class = element_class(&self.elem);

        if let Value::Simplex(Const::Int(n)) = &length {
            let n = *n;
            if n < 0 {
                return raise(state, NEGATIVE_ARRAY_SIZE);
            }
            let items = vec![default_element(&self.elem); n as usize];
            let id = state.heap_alloc(Objekt::Array {
                class,
                origin: None,
                length,
                repr: ArrayRepr::Dense(items),
            })?;
            state.push_operand(Value::ReferenceConcrete(Some(id)))?;
            return finish(state);
        }

        // Symbolic length: fork on its sign before committing the allocation.
        let nonneg = Value::binop(
            Operator::Ge,
            length.clone(),
            Value::Simplex(Const::Int(0)),
        );
        let alts = ctx.port.decide(
            state.path_condition(),
            &ClauseShape::Branch { condition: &nonneg },
        )?;
        let mut children = Vec::with_capacity(alts.len());
        for (i, alt) in alts.iter().enumerate() {
            let mut child = state.fork(&(i + 1).to_string());
            match alt {
                DecisionAlternative::Branch(true) => {
                    child.assume(nonneg.clone())?;
                    let id = child.heap_alloc(Objekt::Array {
                        class: class.clone(),
                        origin: None,
                        length: length.clone(),
                        repr: ArrayRepr::Outcomes(Vec::new()),
                    })?;
                    child.push_operand(Value::ReferenceConcrete(Some(id)))?;
                    child.advance_pc()?;
                }
                DecisionAlternative::Branch(false) => {
                    child.assume(nonneg.clone().negated())?;
                    raise(&mut child, NEGATIVE_ARRAY_SIZE)?;
                }
                other => {
                    return Err(StepError::Engine(EngineError::Fatal(format!(
                        "decision port answered a length-sign branch with {other:?}"
                    ))))
                }
            }
            children.push(child);
        }
        Ok(Outcome::Fork(children))
    }
}

pub struct AlgoArrayLen;

impl Algorithm for AlgoArrayLen {
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
                let length = array_length(state, id)?;
                state.push_operand(length)?;
                finish(state)
            }
        }
    }
}

pub struct AlgoALoad {
    pub elem: FieldType,
}

impl Algorithm for AlgoALoad {
    fn operand_count(&self) -> usize {
        2
    }

    fn execute(&self, state: &mut State, ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let target = state.peek_operand(1)?.clone();
        let id = match classify(state, &target)? {
            RefState::Unresolved(r) => return refine_reference(state, ctx, &r),
            RefState::Null => {
                state.pop_operand()?;
                state.pop_operand()?;
                return raise(state, NULL_POINTER);
            }
            RefState::At(id) => id,
        };
        let index = state.pop_operand()?;
        let array_ref = state.pop_operand()?;
        let length = array_length(state, id)?;

        // Fully concrete bounds check resolves without forking.
        if let (Value::Simplex(Const::Int(i)), Value::Simplex(Const::Int(n))) = (&index, &length) {
            if *i < 0 || *i >= *n {
                return raise(state, INDEX_OUT_OF_BOUNDS);
            }
            let v = read_element(state, id, &array_ref, &index, &self.elem)?;
            state.push_operand(v)?;
            return finish(state);
        }

        let guard = in_bounds(&index, &length);
        let alts = ctx.port.decide(
            state.path_condition(),
            &ClauseShape::Branch { condition: &guard },
        )?;
        let mut children = Vec::with_capacity(alts.len());
        for (i, alt) in alts.iter().enumerate() {
            let mut child = state.fork(&(i + 1).to_string());
            match alt {
                DecisionAlternative::Branch(true) => {
                    child.assume(guard.clone())?;
                    let v = read_element(&mut child, id, &array_ref, &index, &self.elem)?;
                    child.push_operand(v)?;
                    child.advance_pc()?;
                }
                DecisionAlternative::Branch(false) => {
                    child.assume(guard.clone().negated())?;
                    raise(&mut child, INDEX_OUT_OF_BOUNDS)?;
                }
                other => {
                    return Err(StepError::Engine(EngineError::Fatal(format!(
                        "decision port answered a bounds check with {other:?}"
                    ))))
                }
            }
            children.push(child);
        }
        Ok(Outcome::Fork(children))
    }
}

pub struct AlgoAStore;

impl Algorithm for AlgoAStore {
    fn operand_count(&self) -> usize {
        3
    }

    fn execute(&self, state: &mut State, ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let target = state.peek_operand(2)?.clone();
        let id = match classify(state, &target)? {
            RefState::Unresolved(r) => return refine_reference(state, ctx, &r),
            RefState::Null => {
                state.pop_operand()?;
                state.pop_operand()?;
                state.pop_operand()?;
                return raise(state, NULL_POINTER);
            }
            RefState::At(id) => id,
        };
        let value = state.pop_operand()?;
        let index = state.pop_operand()?;
        state.pop_operand()?;
        let length = array_length(state, id)?;

        if let (Value::Simplex(Const::Int(i)), Value::Simplex(Const::Int(n))) = (&index, &length) {
            if *i < 0 || *i >= *n {
                return raise(state, INDEX_OUT_OF_BOUNDS);
            }
            write_element(state, id, &index, value)?;
            return finish(state);
        }

        let guard = in_bounds(&index, &length);
        let alts = ctx.port.decide(
            state.path_condition(),
            &ClauseShape::Branch { condition: &guard },
        )?;
        let mut children = Vec::with_capacity(alts.len());
        for (i, alt) in alts.iter().enumerate() {
            let mut child = state.fork(&(i + 1).to_string());
            match alt {
                DecisionAlternative::Branch(true) => {
                    child.assume(guard.clone())?;
                    write_element(&mut child, id, &index, value.clone())?;
                    child.advance_pc()?;
                }
                DecisionAlternative::Branch(false) => {
                    child.assume(guard.clone().negated())?;
                    raise(&mut child, INDEX_OUT_OF_BOUNDS)?;
                }
                other => {
                    return Err(StepError::Engine(EngineError::Fatal(format!(
                        "decision port answered a bounds check with {other:?}"
                    ))))
                }
            }
            children.push(child);
        }
        Ok(Outcome::Fork(children))
    }
}
