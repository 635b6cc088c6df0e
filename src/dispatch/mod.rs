//! Instruction dispatch: the unit-of-work abstraction.
//!
//! Every decoded instruction maps to an [`Algorithm`]. Running one against a
//! state yields an explicit [`Outcome`]: the state advanced in place, a set
//! of forked children (one per decision alternative), or a continuation,
//! meaning a different unit of work that must run against the same state
//! before the current instruction is finalized. The dispatcher pattern-matches
//! and acts; there is no hidden control transfer.
//!
//! Branch-local execution failures (stack underflow, missing locals, decode
//! errors) stick the owning state with an internal-error marker and never
//! touch sibling states; configuration, frozen-state and engine-fatal
//! failures escalate to the driver.

pub mod algos;

use std::collections::BTreeMap;

use tracing::{trace, warn};

use crate::decision::DecisionPort;
use crate::error::{EngineError, ExecFailure, FrozenStateViolation, StepError};
use crate::observe::ExecutionObserver;
use crate::rules::TriggerRuleSet;
use crate::state::{MethodSig, State};
use crate::value::{Const, Operator, PrimKind};

/// Declared type of a field or array element, enough to mint the right
/// symbol on lazy reads of symbolic objects.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    Prim(PrimKind),
    Ref(String),
}

/// The instruction set. Only the semantically rich instructions (object
/// creation, field/array access, invocation, branching) carry structure; the
/// numeric ones are mechanically uniform.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Push(Const),
    Pop,
    Dup,
    Load(u16),
    Store(u16),
    /// Arithmetic/comparison/logic over one or two operands.
    Arith(Operator),
    Widen(PrimKind),
    Narrow(PrimKind),
    /// Pops a boolean; jumps to the target when it holds.
    IfTrue(u32),
    /// Pops a boolean; jumps to the target when it does not hold.
    IfFalse(u32),
    Goto(u32),
    New(String),
    GetField { name: String, ty: FieldType },
    PutField { name: String },
    NewArray { elem: FieldType },
    ALoad { elem: FieldType },
    AStore,
    ArrayLen,
    GetStatic { class: String, field: String, ty: FieldType },
    PutStatic { class: String, field: String },
    Invoke(MethodSig),
    Return,
    ReturnVal,
    Throw,
}

/// Code of one method.
#[derive(Debug, Clone)]
pub struct Method {
    pub sig: MethodSig,
    pub params: u16,
    pub code: Vec<Instr>,
}

impl Method {
    pub fn new(sig: MethodSig, params: u16, code: Vec<Instr>) -> Method {
        Method { sig, params, code }
    }
}

/// The loaded program: a method table. Class-file loading/verification is an
/// external collaborator; the core only reads decoded code from here.
#[derive(Debug, Clone, Default)]
pub struct Program {
    methods: BTreeMap<MethodSig, Method>,
}

impl Program {
    pub fn new() -> Program {
        Program::default()
    }

    pub fn with_method(mut self, m: Method) -> Program {
        self.methods.insert(m.sig.clone(), m);
        self
    }

    pub fn method(&self, sig: &MethodSig) -> Option<&Method> {
        self.methods.get(sig)
    }
}

/// Everything one unit of work may touch besides the state itself.
pub struct DispatchCtx<'a> {
    pub program: &'a Program,
    pub port: &'a mut dyn DecisionPort,
    pub rules: &'a TriggerRuleSet,
    pub observer: &'a mut dyn ExecutionObserver,
}

/// Result of one unit of work.
pub enum Outcome {
    /// Effect applied to the state in place; for a decoded instruction this
    /// finalizes it (program counter already moved by the algorithm).
    Advance,
    /// One child per decision alternative, in the port's order. The
    /// originating state is consumed.
    Fork(Vec<State>),
    /// Run another unit of work against the same state first; the current
    /// instruction re-dispatches afterwards with the counter unmoved.
    Continue(Box<dyn Algorithm>),
}

/// One composable, resumable unit of work.
pub trait Algorithm {
    /// Operands the instruction consumes from the current frame. Checked by
    /// the dispatcher before execution.
    fn operand_count(&self) -> usize {
        0
    }

    fn execute(&self, state: &mut State, ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError>;
}

/// Advances one state by one instruction.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    /// Longest tolerated continuation chain for a single instruction.
    /// Exhausting it is a fatal engine defect, not a user-visible error.
    pub continuation_limit: usize,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Dispatcher {
            continuation_limit: 64,
        }
    }
}

impl Dispatcher {
    pub fn new() -> Dispatcher {
        Dispatcher::default()
    }

    /// Runs the instruction at the state's current program counter to its
    /// outcome, chasing continuations. Returns the resulting states: one for
    /// a direct update, several for a fork, the input itself (stuck) for a
    /// branch-local failure. A stuck state passes through untouched.
    pub fn step(
        &self,
        mut state: State,
        ctx: &mut DispatchCtx<'_>,
    ) -> Result<Vec<State>, EngineError> {
        if state.is_frozen() {
            return Err(EngineError::Frozen(FrozenStateViolation {
                state_id: state.identifier().to_string(),
            }));
        }
        if state.is_stuck() {
            return Ok(vec![state]);
        }

        let mut pending: Vec<Box<dyn Algorithm>> = Vec::new();
        let mut hops = 0usize;
        loop {
            let (algo, is_continuation) = match pending.pop() {
                Some(a) => (a, true),
                None => match decode(&state, ctx.program) {
                    Ok(instr) => {
                        trace!(state = state.identifier(), ?instr, "dispatch");
                        (algos::algo_for(instr), false)
                    }
                    Err(f) => return stick(state, f),
                },
            };

            match state.current_frame() {
                Ok(frame) if frame.operands.len() < algo.operand_count() => {
                    let found = frame.operands.len();
                    return stick(
                        state,
                        ExecFailure::OperandMismatch {
                            expected: algo.operand_count(),
                            found,
                        },
                    );
                }
                Err(f) => return stick(state, f),
                Ok(_) => {}
            }

            match algo.execute(&mut state, ctx) {
                Ok(Outcome::Advance) => {
                    if is_continuation {
                        continue;
                    }
                    return Ok(vec![state]);
                }
                Ok(Outcome::Fork(children)) => return Ok(children),
                Ok(Outcome::Continue(next)) => {
                    hops += 1;
                    if hops >= self.continuation_limit {
                        return Err(EngineError::Fatal(format!(
                            "continuation chain exceeded {} units in state {}",
                            self.continuation_limit,
                            state.identifier()
                        )));
                    }
                    if hops * 2 >= self.continuation_limit {
                        warn!(
                            state = state.identifier(),
                            hops, "continuation chain unusually deep"
                        );
                    }
                    pending.push(next);
                }
                Err(StepError::Failure(f)) => return stick(state, f),
                Err(StepError::Frozen(v)) => return Err(EngineError::Frozen(v)),
                Err(StepError::Engine(e)) => return Err(e),
            }
        }
    }
}

fn decode(state: &State, program: &Program) -> Result<Instr, ExecFailure> {
    let frame = state.current_frame()?;
    let method = program
        .method(&frame.method)
        .ok_or_else(|| ExecFailure::UnknownMethod {
            signature: frame.method.to_string(),
        })?;
    method
        .code
        .get(frame.pc as usize)
        .cloned()
        .ok_or(ExecFailure::DecodeError { pc: frame.pc })
}

fn stick(mut state: State, failure: ExecFailure) -> Result<Vec<State>, EngineError> {
    match state.set_stuck_failure(failure) {
        Ok(()) => Ok(vec![state]),
        Err(StepError::Frozen(v)) => Err(EngineError::Frozen(v)),
        Err(StepError::Engine(e)) => Err(e),
        Err(StepError::Failure(f)) => Err(EngineError::Fatal(format!(
            "could not record branch failure: {f}"
        ))),
    }
}
