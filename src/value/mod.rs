//! Immutable symbolic/concrete value trees.
//!
//! Values are plain owned data, built once and never mutated; states clone
//! them freely on fork. Structural identity is the string-normalized form
//! produced by `Display`: two values (in particular two symbolic references)
//! denote the same logical slot iff their textual forms are equal.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Primitive kinds of the VM's numeric/boolean stack slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimKind {
    Bool,
    Int,
    Long,
    Float,
    Double,
}

impl fmt::Display for PrimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrimKind::Bool => "bool",
            PrimKind::Int => "int",
            PrimKind::Long => "long",
            PrimKind::Float => "float",
            PrimKind::Double => "double",
        };
        f.write_str(s)
    }
}

/// A concrete primitive constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Const {
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
}

impl Const {
    pub fn kind(&self) -> PrimKind {
        match self {
            Const::Bool(_) => PrimKind::Bool,
            Const::Int(_) => PrimKind::Int,
            Const::Long(_) => PrimKind::Long,
            Const::Float(_) => PrimKind::Float,
            Const::Double(_) => PrimKind::Double,
        }
    }

    /// Trivial constant folding over two constants. Returns `None` when the
    /// operation does not fold (mixed kinds, floats, division by zero); the
    /// caller then builds an expression node instead.
    pub fn fold(op: Operator, a: &Const, b: &Const) -> Option<Const> {
        use Const::*;
        use Operator::*;
        Some(match (op, a, b) {
            (Add, Int(x), Int(y)) => Int(x.wrapping_add(*y)),
            (Sub, Int(x), Int(y)) => Int(x.wrapping_sub(*y)),
            (Mul, Int(x), Int(y)) => Int(x.wrapping_mul(*y)),
            (Div, Int(x), Int(y)) if *y != 0 => Int(x.wrapping_div(*y)),
            (Rem, Int(x), Int(y)) if *y != 0 => Int(x.wrapping_rem(*y)),
            (Add, Long(x), Long(y)) => Long(x.wrapping_add(*y)),
            (Sub, Long(x), Long(y)) => Long(x.wrapping_sub(*y)),
            (Mul, Long(x), Long(y)) => Long(x.wrapping_mul(*y)),
            (Div, Long(x), Long(y)) if *y != 0 => Long(x.wrapping_div(*y)),
            (Rem, Long(x), Long(y)) if *y != 0 => Long(x.wrapping_rem(*y)),
            (Eq, Int(x), Int(y)) => Bool(x == y),
            (Ne, Int(x), Int(y)) => Bool(x != y),
            (Lt, Int(x), Int(y)) => Bool(x < y),
            (Le, Int(x), Int(y)) => Bool(x <= y),
            (Gt, Int(x), Int(y)) => Bool(x > y),
            (Ge, Int(x), Int(y)) => Bool(x >= y),
            (Eq, Long(x), Long(y)) => Bool(x == y),
            (Ne, Long(x), Long(y)) => Bool(x != y),
            (Lt, Long(x), Long(y)) => Bool(x < y),
            (Le, Long(x), Long(y)) => Bool(x <= y),
            (Gt, Long(x), Long(y)) => Bool(x > y),
            (Ge, Long(x), Long(y)) => Bool(x >= y),
            (And, Bool(x), Bool(y)) => Bool(*x && *y),
            (Or, Bool(x), Bool(y)) => Bool(*x || *y),
            _ => return None,
        })
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Bool(b) => write!(f, "{b}"),
            Const::Int(i) => write!(f, "{i}"),
            Const::Long(l) => write!(f, "{l}L"),
            Const::Float(x) => write!(f, "{x}f"),
            Const::Double(x) => write!(f, "{x}d"),
        }
    }
}

/// Operators over value trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

impl Operator {
    pub fn is_unary(&self) -> bool {
        matches!(self, Operator::Neg | Operator::Not)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Rem => "%",
            Operator::Neg => "neg",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::And => "&&",
            Operator::Or => "||",
            Operator::Not => "!",
        };
        f.write_str(s)
    }
}

/// One step of a structural origin path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OriginSeg {
    /// The execution root the path starts from, e.g. a method parameter.
    Root(String),
    /// Member field navigation.
    Field(String),
    /// Array element navigation; the index is kept in textual form.
    Element(String),
    /// Map entry navigation; the key is kept in textual form.
    Key(String),
}

/// Structural path identifying how a symbolic value was reached from an
/// execution root. The canonical text form (`root.f.element[i]`) is the
/// value's stable identity key, used for display, de-duplication, and
/// trigger-rule matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Origin(Vec<OriginSeg>);

impl Origin {
    pub fn root(name: impl Into<String>) -> Self {
        Origin(vec![OriginSeg::Root(name.into())])
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.0.push(OriginSeg::Field(name.into()));
        self
    }

    pub fn element(mut self, index: impl Into<String>) -> Self {
        self.0.push(OriginSeg::Element(index.into()));
        self
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.0.push(OriginSeg::Key(key.into()));
        self
    }

    pub fn segments(&self) -> &[OriginSeg] {
        &self.0
    }

    /// The origin of the enclosing object, or `None` at a root.
    pub fn parent(&self) -> Option<Origin> {
        if self.0.len() <= 1 {
            None
        } else {
            Some(Origin(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    pub fn last(&self) -> Option<&OriginSeg> {
        self.0.last()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.0 {
            match seg {
                OriginSeg::Root(n) => write!(f, "{n}")?,
                OriginSeg::Field(n) => write!(f, ".{n}")?,
                OriginSeg::Element(i) => write!(f, ".element[{i}]")?,
                OriginSeg::Key(k) => write!(f, ".key[{k}]")?,
            }
        }
        Ok(())
    }
}

/// An as-yet-unresolved symbolic object reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolicRef {
    pub id: u64,
    pub origin: Origin,
    /// Static type the reference is declared with; constrains which heap
    /// objects it may alias.
    pub type_name: String,
}

impl SymbolicRef {
    pub fn name(&self) -> String {
        format!("{{R{}}}", self.id)
    }
}

/// Heap position of an object within one state lineage.
pub type HeapId = u64;

/// A symbolic or concrete value tree. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Concrete primitive constant.
    Simplex(Const),
    /// Unbound primitive with a unique origin.
    Symbolic {
        id: u64,
        kind: PrimKind,
        origin: Origin,
    },
    /// Operator over one (left = None) or two operands.
    Expression {
        op: Operator,
        left: Option<Box<Value>>,
        right: Box<Value>,
    },
    /// Named uninterpreted operator over an ordered operand sequence.
    FunctionApplication { name: String, args: Vec<Value> },
    /// Widening numeric conversion; transparent to structural traversal.
    WideningConversion { to: PrimKind, operand: Box<Value> },
    /// Narrowing numeric conversion; transparent to structural traversal.
    NarrowingConversion { to: PrimKind, operand: Box<Value> },
    /// Unresolved object reference.
    ReferenceSymbolic(SymbolicRef),
    /// Resolved object reference; `None` is null.
    ReferenceConcrete(Option<HeapId>),
}

impl Value {
    pub const NULL: Value = Value::ReferenceConcrete(None);

    /// Builds a binary expression, folding when both operands are constants.
    /// Symbolic leaves are never collapsed.
    pub fn binop(op: Operator, left: Value, right: Value) -> Value {
        if let (Value::Simplex(a), Value::Simplex(b)) = (&left, &right) {
            if let Some(c) = Const::fold(op, a, b) {
                return Value::Simplex(c);
            }
        }
        Value::Expression {
            op,
            left: Some(Box::new(left)),
            right: Box::new(right),
        }
    }

    pub fn unop(op: Operator, operand: Value) -> Value {
        if let Value::Simplex(c) = &operand {
            match (op, c) {
                (Operator::Not, Const::Bool(b)) => return Value::Simplex(Const::Bool(!b)),
                (Operator::Neg, Const::Int(i)) => {
                    return Value::Simplex(Const::Int(i.wrapping_neg()))
                }
                (Operator::Neg, Const::Long(l)) => {
                    return Value::Simplex(Const::Long(l.wrapping_neg()))
                }
                _ => {}
            }
        }
        Value::Expression {
            op,
            left: None,
            right: Box::new(operand),
        }
    }

    pub fn negated(self) -> Value {
        Value::unop(Operator::Not, self)
    }

    pub fn widen(to: PrimKind, operand: Value) -> Value {
        Value::WideningConversion {
            to,
            operand: Box::new(operand),
        }
    }

    pub fn narrow(to: PrimKind, operand: Value) -> Value {
        Value::NarrowingConversion {
            to,
            operand: Box::new(operand),
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Value::ReferenceSymbolic(_) | Value::ReferenceConcrete(_)
        )
    }

    pub fn as_bool_const(&self) -> Option<bool> {
        match self {
            Value::Simplex(Const::Bool(b)) => Some(*b),
            Value::Simplex(Const::Int(i)) => Some(*i != 0),
            _ => None,
        }
    }

    /// Collects the symbolic leaves of this tree in left-to-right order,
    /// recursing through conversions. Each leaf is (symbol name, origin).
    pub fn symbolic_leaves(&self, out: &mut Vec<(String, Origin)>) {
        match self {
            Value::Simplex(_) | Value::ReferenceConcrete(_) => {}
            Value::Symbolic { id, origin, .. } => {
                out.push((format!("{{V{id}}}"), origin.clone()));
            }
            Value::ReferenceSymbolic(r) => {
                out.push((r.name(), r.origin.clone()));
            }
            Value::Expression { left, right, .. } => {
                if let Some(l) = left {
                    l.symbolic_leaves(out);
                }
                right.symbolic_leaves(out);
            }
            Value::FunctionApplication { args, .. } => {
                for a in args {
                    a.symbolic_leaves(out);
                }
            }
            Value::WideningConversion { operand, .. }
            | Value::NarrowingConversion { operand, .. } => {
                operand.symbolic_leaves(out);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Simplex(c) => write!(f, "{c}"),
            Value::Symbolic { id, .. } => write!(f, "{{V{id}}}"),
            Value::Expression { op, left, right } => match left {
                Some(l) => write!(f, "({l} {op} {right})"),
                None => write!(f, "({op} {right})"),
            },
            Value::FunctionApplication { name, args } => {
                write!(f, "{name}(")?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
            Value::WideningConversion { to, operand } => write!(f, "widen<{to}>({operand})"),
            Value::NarrowingConversion { to, operand } => write!(f, "narrow<{to}>({operand})"),
            Value::ReferenceSymbolic(r) => write!(f, "{}", r.name()),
            Value::ReferenceConcrete(None) => write!(f, "null"),
            Value::ReferenceConcrete(Some(id)) => write!(f, "Object[{id}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folding_is_trivial_only() {
        // Two constants fold.
        let v = Value::binop(
            Operator::Add,
            Value::Simplex(Const::Int(2)),
            Value::Simplex(Const::Int(3)),
        );
        assert_eq!(v, Value::Simplex(Const::Int(5)));

        // A symbolic leaf never collapses.
        let x = Value::Symbolic {
            id: 1,
            kind: PrimKind::Int,
            origin: Origin::root("root").field("x"),
        };
        let e = Value::binop(Operator::Add, x.clone(), Value::Simplex(Const::Int(0)));
        assert!(matches!(e, Value::Expression { .. }));

        // Division by zero does not fold.
        let d = Value::binop(
            Operator::Div,
            Value::Simplex(Const::Int(1)),
            Value::Simplex(Const::Int(0)),
        );
        assert!(matches!(d, Value::Expression { .. }));
    }

    #[test]
    fn test_leaves_recurse_through_conversions() {
        let x = Value::Symbolic {
            id: 7,
            kind: PrimKind::Int,
            origin: Origin::root("root").field("x"),
        };
        let wrapped = Value::widen(
            PrimKind::Long,
            Value::binop(Operator::Add, x, Value::Simplex(Const::Int(1))),
        );
        let mut leaves = Vec::new();
        wrapped.symbolic_leaves(&mut leaves);
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].0, "{V7}");
        assert_eq!(leaves[0].1.to_string(), "root.x");
    }

    #[test]
    fn test_origin_canonical_text() {
        let o = Origin::root("root").field("list").element("3");
        assert_eq!(o.to_string(), "root.list.element[3]");
        let same = Origin::root("root").field("list").element("3");
        assert_eq!(o, same);
        assert_eq!(o.parent().map(|p| p.to_string()).as_deref(), Some("root.list"));
    }
}
