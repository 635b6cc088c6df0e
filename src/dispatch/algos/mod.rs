//! Per-instruction algorithms.
//!
//! Numeric and stack-shuffling instructions are mechanically uniform and go
//! through the macros in `op_macros`; the semantically rich ones (object
//! creation, field/array access, invocation, branching) get their own
//! modules.

pub mod arithmetic;
pub mod arrays;
pub mod control;
pub mod invoke;
pub mod meta;
pub(crate) mod op_macros;
pub mod objects;
pub mod stack_ops;

use crate::dispatch::{Algorithm, Instr, Outcome};
use crate::error::StepError;
use crate::state::{Objekt, State};
use crate::value::Value;

/// Resolves the algorithm for a decoded instruction.
pub fn algo_for(instr: Instr) -> Box<dyn Algorithm> {
    match instr {
        Instr::Push(value) => Box::new(stack_ops::AlgoPush { value }),
        Instr::Pop => Box::new(stack_ops::AlgoPop),
        Instr::Dup => Box::new(stack_ops::AlgoDup),
        Instr::Load(slot) => Box::new(stack_ops::AlgoLoad { slot }),
        Instr::Store(slot) => Box::new(stack_ops::AlgoStore { slot }),
        Instr::Arith(op) => Box::new(arithmetic::AlgoArith { op }),
        Instr::Widen(to) => Box::new(arithmetic::AlgoWiden { to }),
        Instr::Narrow(to) => Box::new(arithmetic::AlgoNarrow { to }),
        Instr::IfTrue(target) => Box::new(control::AlgoCondJump {
            target,
            jump_when: true,
        }),
        Instr::IfFalse(target) => Box::new(control::AlgoCondJump {
            target,
            jump_when: false,
        }),
        Instr::Goto(target) => Box::new(control::AlgoGoto { target }),
        Instr::Return => Box::new(control::AlgoReturn { with_value: false }),
        Instr::ReturnVal => Box::new(control::AlgoReturn { with_value: true }),
        Instr::Throw => Box::new(control::AlgoThrow),
        Instr::New(class) => Box::new(objects::AlgoNew { class }),
        Instr::GetField { name, ty } => Box::new(objects::AlgoGetField { name, ty }),
        Instr::PutField { name } => Box::new(objects::AlgoPutField { name }),
        Instr::GetStatic { class, field, ty } => {
            Box::new(objects::AlgoGetStatic { class, field, ty })
        }
        Instr::PutStatic { class, field } => Box::new(objects::AlgoPutStatic { class, field }),
        Instr::NewArray { elem } => Box::new(arrays::AlgoNewArray { elem }),
        Instr::ALoad { elem } => Box::new(arrays::AlgoALoad { elem }),
        Instr::AStore => Box::new(arrays::AlgoAStore),
        Instr::ArrayLen => Box::new(arrays::AlgoArrayLen),
        Instr::Invoke(sig) => Box::new(invoke::AlgoInvoke { sig }),
    }
}

/// Advances the program counter past the finalized instruction.
pub(crate) fn finish(state: &mut State) -> Result<Outcome, StepError> {
    state.advance_pc()?;
    Ok(Outcome::Advance)
}

/// Raises a terminating condition: the branch unwinds and sticks with the
/// freshly allocated exception object.
pub(crate) fn raise(state: &mut State, class: &str) -> Result<Outcome, StepError> {
    let id = state.heap_alloc(Objekt::new_instance(class))?;
    state.set_stuck_exception(Value::ReferenceConcrete(Some(id)))?;
    Ok(Outcome::Advance)
}

/// Declared-type text recorded in a field variable on writes.
pub(crate) fn type_text(value: &Value) -> String {
    match value {
        Value::Simplex(c) => c.kind().to_string(),
        Value::Symbolic { kind, .. } => kind.to_string(),
        Value::ReferenceSymbolic(r) => r.type_name.clone(),
        Value::ReferenceConcrete(_) => "reference".to_string(),
        Value::WideningConversion { to, .. } | Value::NarrowingConversion { to, .. } => {
            to.to_string()
        }
        _ => "unknown".to_string(),
    }
}
