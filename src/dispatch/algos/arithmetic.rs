use super::finish;
use super::op_macros::{binary_op, conversion_op, unary_op};
use crate::dispatch::{Algorithm, DispatchCtx, Outcome};
use crate::error::StepError;
use crate::state::State;
use crate::value::{Operator, PrimKind, Value};

/// Arithmetic, comparison and logic over one or two operands. Construction
/// folds two constants; everything else becomes an expression node.
pub struct AlgoArith {
    pub op: Operator,
}

impl Algorithm for AlgoArith {
    fn operand_count(&self) -> usize {
        if self.op.is_unary() {
            1
        } else {
            2
        }
    }

    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        if self.op.is_unary() {
            unary_op!(state, self.op);
        } else {
            binary_op!(state, self.op);
        }
        finish(state)
    }
}

pub struct AlgoWiden {
    pub to: PrimKind,
}

impl Algorithm for AlgoWiden {
    fn operand_count(&self) -> usize {
        1
    }

    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        conversion_op!(state, Value::widen, self.to);
        finish(state)
    }
}

pub struct AlgoNarrow {
    pub to: PrimKind,
}

impl Algorithm for AlgoNarrow {
    fn operand_count(&self) -> usize {
        1
    }

    fn execute(&self, state: &mut State, _ctx: &mut DispatchCtx<'_>) -> Result<Outcome, StepError> {
        conversion_op!(state, Value::narrow, self.to);
        finish(state)
    }
}
