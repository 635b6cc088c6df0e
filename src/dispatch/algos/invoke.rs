//! Method invocation and class initialization.
//!
//! Invocation first routes through the meta-level overrides, then makes sure
//! the target class is initialized. The initialization check is a separate
//! unit of work chained through [`Outcome::Continue`]: it leaves the program
//! counter alone, so the invoke re-dispatches afterwards and the counter
//! moves exactly once for the whole instruction.

use super::meta;
use crate::decision::{ClauseShape, DecisionAlternative};
use crate::dispatch::{Algorithm, DispatchCtx, Outcome};
use crate::error::{EngineError, ExecFailure, StepError};
use crate::state::{Frame, MethodSig, State};

pub struct AlgoInvoke {
    pub sig: MethodSig,
}

impl Algorithm for AlgoInvoke {
    fn execute(&self, state: &mut State, ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        if let Some(algo) = meta::intercept(&self.sig) {
            return algo.execute(state, ctx);
        }
        if !state.klass_initialized(&self.sig.class) {
            return Ok(Outcome::Continue(Box::new(AlgoEnsureInitialized {
                class: self.sig.class.clone(),
            })));
        }
        let params = ctx
            .program
            .method(&self.sig)
            .ok_or_else(|| ExecFailure::UnknownMethod {
                signature: self.sig.to_string(),
            })?
            .params;

        let mut args = Vec::with_capacity(params as usize);
        for _ in 0..params {
            args.push(state.pop_operand()?);
        }
        args.reverse();

        // The caller resumes past the invocation once the callee returns.
        state.advance_pc()?;
        let resume_pc = state.pc()?;

        let mut frame = Frame::new(self.sig.clone());
        frame.return_pc = Some(resume_pc);
        for (slot, arg) in args.into_iter().enumerate() {
            frame.locals.insert(slot as u16, arg);
        }
        state.push_frame(frame)?;
        Ok(Outcome::Advance)
    }
}

/// Sub-unit that settles the initialization status of a class before the
/// instruction that needed it re-dispatches. Never touches the program
/// counter.
pub struct AlgoEnsureInitialized {
    pub class: String,
}

impl Algorithm for AlgoEnsureInitialized {
    fn execute(&self, state: &mut State, ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        let alts = ctx.port.decide(
            state.path_condition(),
            &ClauseShape::ClassInit { class: &self.class },
        )?;
        match alts.len() {
            // No feasible status at all: the branch dies.
            0 => Ok(Outcome::Fork(Vec::new())),
            1 => {
                apply(state, ctx, &self.class, &alts[0])?;
                Ok(Outcome::Advance)
            }
            _ => {
                let mut children = Vec::with_capacity(alts.len());
                for (i, alt) in alts.iter().enumerate() {
                    let mut child = state.fork(&(i + 1).to_string());
                    apply(&mut child, ctx, &self.class, alt)?;
                    children.push(child);
                }
                Ok(Outcome::Fork(children))
            }
        }
    }
}

fn apply(
    state: &mut State,
    ctx: &mut DispatchCtx<'_>,
    class: &str,
    alt: &DecisionAlternative,
) -> Result<(), StepError> {
    let DecisionAlternative::ClassInitialized(pre) = alt else {
        return Err(StepError::Engine(EngineError::Fatal(format!(
            "decision port answered a class-initialization query with {alt:?}"
        ))));
    };
    state.assume_class_initialized(class, *pre)?;
    state.ensure_klass(class)?;
    state.mark_klass_initialized(class)?;
    if !*pre {
        // A class not yet initialized when the analysis starts runs its
        // initializer now, as a frame on top of the interrupted one.
        let clinit = MethodSig::new(class, "<clinit>");
        if ctx.program.method(&clinit).is_some() {
            state.push_frame(Frame::new(clinit))?;
        }
    }
    Ok(())
}
