//! Path condition: the ordered conjunction of clauses constraining one
//! branch. Order is significant; later clauses may reference heap objects
//! introduced by earlier ones.

use std::collections::BTreeSet;
use std::fmt;

use crate::value::{HeapId, Origin, SymbolicRef, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// Boolean constraint over primitive values.
    Assume(Value),
    /// A symbolic reference resolved by expanding a fresh object.
    Expands {
        reference: SymbolicRef,
        heap_pos: HeapId,
        type_name: String,
    },
    /// A symbolic reference resolved as an alias of a pre-existing object.
    Aliases {
        reference: SymbolicRef,
        heap_pos: HeapId,
        target_origin: Origin,
    },
    /// A symbolic reference resolved to null.
    Null { reference: SymbolicRef },
    ClassInitialized(String),
    ClassNotInitialized(String),
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Assume(v) => write!(f, "{v}"),
            Clause::Expands {
                reference,
                heap_pos,
                type_name,
            } => write!(
                f,
                "{} == Object[{heap_pos}] (fresh {type_name})",
                reference.name()
            ),
            Clause::Aliases {
                reference,
                heap_pos,
                target_origin,
            } => write!(
                f,
                "{} == Object[{heap_pos}] (aliases {target_origin})",
                reference.name()
            ),
            Clause::Null { reference } => write!(f, "{} == null", reference.name()),
            Clause::ClassInitialized(c) => write!(f, "initialized({c})"),
            Clause::ClassNotInitialized(c) => write!(f, "!initialized({c})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathCondition {
    clauses: Vec<Clause>,
}

impl PathCondition {
    pub fn push(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn iter(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter()
    }

    /// Objects known to exist, in path-condition order: every "expands"
    /// clause as (heap position, reference, type name).
    pub fn expansions(&self) -> impl Iterator<Item = (HeapId, &SymbolicRef, &str)> {
        self.clauses.iter().filter_map(|c| match c {
            Clause::Expands {
                reference,
                heap_pos,
                type_name,
            } => Some((*heap_pos, reference, type_name.as_str())),
            _ => None,
        })
    }

    /// The symbols this path condition mentions, in first-mention order,
    /// de-duplicated by origin so the same slot is never reported twice.
    /// Calling this repeatedly on the same condition yields identical output.
    pub fn known_symbols(&self) -> Vec<(String, String)> {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut out = Vec::new();
        let mut add = |name: String, origin: String| {
            if seen.insert(origin.clone()) {
                out.push((name, origin));
            }
        };
        for clause in &self.clauses {
            match clause {
                Clause::Assume(v) => {
                    let mut leaves = Vec::new();
                    v.symbolic_leaves(&mut leaves);
                    for (name, origin) in leaves {
                        add(name, origin.to_string());
                    }
                }
                Clause::Expands { reference, .. }
                | Clause::Aliases { reference, .. }
                | Clause::Null { reference } => {
                    add(reference.name(), reference.origin.to_string());
                }
                Clause::ClassInitialized(_) | Clause::ClassNotInitialized(_) => {}
            }
        }
        out
    }

    /// Textual rendition of the conjunction, clauses in insertion order.
    pub fn render(&self) -> String {
        let mut s = String::new();
        for (i, c) in self.clauses.iter().enumerate() {
            if i > 0 {
                s.push_str(" && ");
            }
            s.push_str(&c.to_string());
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Const, Operator, PrimKind};

    fn sym(id: u64, origin: Origin) -> Value {
        Value::Symbolic {
            id,
            kind: PrimKind::Int,
            origin,
        }
    }

    #[test]
    fn test_known_symbols_dedup_is_idempotent() {
        let x = sym(0, Origin::root("root").field("x"));
        let mut pc = PathCondition::default();
        // x appears in two clauses; it must be reported once.
        pc.push(Clause::Assume(Value::binop(
            Operator::Gt,
            x.clone(),
            Value::Simplex(Const::Int(0)),
        )));
        pc.push(Clause::Assume(Value::binop(
            Operator::Lt,
            x,
            Value::Simplex(Const::Int(10)),
        )));
        let first = pc.known_symbols();
        let second = pc.known_symbols();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0], ("{V0}".to_string(), "root.x".to_string()));
    }

    #[test]
    fn test_expansions_preserve_order() {
        let mut pc = PathCondition::default();
        let r1 = SymbolicRef {
            id: 1,
            origin: Origin::root("root").field("a"),
            type_name: "T".into(),
        };
        let r2 = SymbolicRef {
            id: 2,
            origin: Origin::root("root").field("b"),
            type_name: "T".into(),
        };
        pc.push(Clause::Expands {
            reference: r1,
            heap_pos: 4,
            type_name: "T".into(),
        });
        pc.push(Clause::Expands {
            reference: r2,
            heap_pos: 7,
            type_name: "T".into(),
        });
        let order: Vec<HeapId> = pc.expansions().map(|(id, _, _)| id).collect();
        assert_eq!(order, vec![4, 7]);
    }
}
