macro_rules! binary_op {
    ($state:expr, $op:expr) => {{
        let b = $state.pop_operand()?;
        let a = $state.pop_operand()?;
        $state.push_operand($crate::value::Value::binop($op, a, b))?;
    }};
}

macro_rules! unary_op {
    ($state:expr, $op:expr) => {{
        let a = $state.pop_operand()?;
        $state.push_operand($crate::value::Value::unop($op, a))?;
    }};
}

macro_rules! conversion_op {
    ($state:expr, $ctor:path, $to:expr) => {{
        let a = $state.pop_operand()?;
        $state.push_operand($ctor($to, a))?;
    }};
}

pub(crate) use binary_op;
pub(crate) use conversion_op;
pub(crate) use unary_op;
