//! Meta-level overrides: invocations the engine intercepts instead of
//! running user code.
//!
//! The analysis-facing class lets the program under analysis signal failures
//! and detect symbolic execution; the container-model hook reports bulk
//! operations on modelled maps to the registered observer.

use crate::dispatch::{Algorithm, DispatchCtx, Outcome};
use crate::error::{EngineError, StepError};
use crate::state::{MethodSig, State};
use crate::value::{Const, OriginSeg, Value};

use super::finish;

/// Class whose static methods talk to the engine itself.
pub const ANALYSIS_CLASS: &str = "symbex.Analysis";
/// Modelled container class whose bulk operations notify the observer.
pub const CONTAINER_CLASS: &str = "symbex.Map";

/// Resolves a meta-level override for `sig`, if one exists. Checked before
/// ordinary method lookup, so overrides shadow any same-named bytecode.
pub fn intercept(sig: &MethodSig) -> Option<Box<dyn Algorithm>> {
    match (sig.class.as_str(), sig.name.as_str()) {
        (ANALYSIS_CLASS, "fail") => Some(Box::new(AlgoFail)),
        (ANALYSIS_CLASS, "isSymbolicVm") => Some(Box::new(AlgoIsSymbolicVm)),
        (CONTAINER_CLASS, "notifyBulkOperation") => {
            Some(Box::new(AlgoNotifyBulk { sig: sig.clone() }))
        }
        _ => None,
    }
}

/// The analyzed program declared the current path a failure. This is not a
/// branch-local error: the whole analysis must stop.
struct AlgoFail;

impl Algorithm for AlgoFail {
    fn execute(&self, _state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        Err(StepError::Engine(EngineError::Fatal(
            "analysis failure requested by the executed program".to_string(),
        )))
    }
}

/// Under this engine the answer is always true; the same method compiled
/// into a normal runtime returns false.
struct AlgoIsSymbolicVm;

impl Algorithm for AlgoIsSymbolicVm {
    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        state.push_operand(Value::Simplex(Const::Bool(true)))?;
        finish(state)
    }
}

/// Bulk-operation notification from a modelled container. The receiver is
/// consumed; operations on the internal pre-state helper map are not
/// observable and are skipped.
struct AlgoNotifyBulk {
    sig: MethodSig,
}

impl Algorithm for AlgoNotifyBulk {
    fn operand_count(&self) -> usize {
        1
    }

    fn execute(&self, state: &mut State, ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let receiver = state.pop_operand()?;
        let is_initial_map_helper = matches!(
            &receiver,
            Value::ReferenceSymbolic(r)
                if matches!(r.origin.last(), Some(OriginSeg::Field(f)) if f == "initialMap")
        );
        if !is_initial_map_helper {
            let call_stack: Vec<MethodSig> =
                state.frames().iter().map(|f| f.method.clone()).collect();
            ctx.observer.bulk_collection_op(&self.sig, &call_stack);
        }
        finish(state)
    }
}
