use crate::decision::{ClauseShape, DecisionAlternative};
use crate::dispatch::{Algorithm, DispatchCtx, Outcome};
use crate::error::{EngineError, StepError};
use crate::state::State;

/// Conditional jump, taken when the popped condition equals `jump_when`. A
/// constant condition is followed directly; a symbolic one asks the decision
/// port for the feasible outcomes and forks one child per alternative, in
/// the port's order.
pub struct AlgoCondJump {
    pub target: u32,
    pub jump_when: bool,
}

impl Algorithm for AlgoCondJump {
    fn operand_count(&self) -> usize {
        1
    }

    fn execute(&self, state: &mut State, ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let cond = state.pop_operand()?;
        if let Some(holds) = cond.as_bool_const() {
            if holds == self.jump_when {
                state.set_pc(self.target)?;
            } else {
                state.advance_pc()?;
            }
            return Ok(Outcome::Advance);
        }

        let alts = ctx
            .port
            .decide(state.path_condition(), &ClauseShape::Branch { condition: &cond })?;
        let mut children = Vec::with_capacity(alts.len());
        for (i, alt) in alts.iter().enumerate() {
            let mut child = state.fork(&(i + 1).to_string());
            match alt {
                DecisionAlternative::Branch(holds) => {
                    child.assume(if *holds {
                        cond.clone()
                    } else {
                        cond.clone().negated()
                    })?;
                    if *holds == self.jump_when {
                        child.set_pc(self.target)?;
                    } else {
                        child.advance_pc()?;
                    }
                }
                other => {
                    return Err(StepError::Engine(EngineError::Fatal(format!(
                        "decision port answered a boolean branch with {other:?}"
                    ))))
                }
            }
            children.push(child);
        }
        Ok(Outcome::Fork(children))
    }
}

pub struct AlgoGoto {
    pub target: u32,
}

impl Algorithm for AlgoGoto {
    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        state.set_pc(self.target)?;
        Ok(Outcome::Advance)
    }
}

/// Method return. Popping the last frame makes the state stuck with its
/// return value; otherwise the caller resumes at its own program counter,
/// which was advanced past the invocation when the frame was pushed.
pub struct AlgoReturn {
    pub with_value: bool,
}

impl Algorithm for AlgoReturn {
    fn operand_count(&self) -> usize {
        if self.with_value {
            1
        } else {
            0
        }
    }

    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let value = if self.with_value {
            Some(state.pop_operand()?)
        } else {
            None
        };
        let frame = state.pop_frame()?;
        if state.frames().is_empty() {
            state.set_stuck_returned(value)?;
            return Ok(Outcome::Advance);
        }
        // Frames without a resume point (trigger methods, class
        // initializers) sit on top of an interrupted instruction; their
        // return value has no consumer there and is dropped.
        if frame.return_pc.is_some() {
            if let Some(v) = value {
                state.push_operand(v)?;
            }
        }
        Ok(Outcome::Advance)
    }
}

/// Uncaught raise: the branch unwinds and sticks with the thrown value.
pub struct AlgoThrow;

impl Algorithm for AlgoThrow {
    fn operand_count(&self) -> usize {
        1
    }

    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let v = state.pop_operand()?;
        state.set_stuck_exception(v)?;
        Ok(Outcome::Advance)
    }
}
