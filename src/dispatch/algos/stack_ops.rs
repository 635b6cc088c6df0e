use super::finish;
use crate::dispatch::{Algorithm, DispatchCtx, Outcome};
use crate::error::StepError;
use crate::state::State;
use crate::value::{Const, Value};

pub struct AlgoPush {
    pub value: Const,
}

impl Algorithm for AlgoPush {
    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        state.push_operand(Value::Simplex(self.value))?;
        finish(state)
    }
}

pub struct AlgoPop;

impl Algorithm for AlgoPop {
    fn operand_count(&self) -> usize {
        1
    }

    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        state.pop_operand()?;
        finish(state)
    }
}

pub struct AlgoDup;

impl Algorithm for AlgoDup {
    fn operand_count(&self) -> usize {
        1
    }

    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let top = state.peek_operand(0)?.clone();
        state.push_operand(top)?;
        finish(state)
    }
}

pub struct AlgoLoad {
    pub slot: u16,
}

impl Algorithm for AlgoLoad {
    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let v = state.local(self.slot)?;
        state.push_operand(v)?;
        finish(state)
    }
}

pub struct AlgoStore {
    pub slot: u16,
}

impl Algorithm for AlgoStore {
    fn operand_count(&self) -> usize {
        1
    }

    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let v = state.pop_operand()?;
        state.set_local(self.slot, v)?;
        finish(state)
    }
}
