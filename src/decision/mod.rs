//! Boundary to the external decision procedure.
//!
//! The port receives the path condition accumulated so far plus the shape of
//! the candidate clause and answers with the ordered, complete feasible set
//! of alternatives for that decision point. The core never re-derives or
//! second-guesses alternatives; a pruning port simply returns fewer of them.

use crate::error::ExternalError;
use crate::state::PathCondition;
use crate::value::{Const, HeapId, Origin, SymbolicRef, Value};

/// A pre-existing heap object a symbolic reference might alias.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasCandidate {
    pub heap_pos: HeapId,
    pub origin: Origin,
    pub type_name: String,
}

/// Shape of the clause a branching instruction wants to append.
#[derive(Debug)]
pub enum ClauseShape<'a> {
    /// Two-way boolean branch on `condition`.
    Branch { condition: &'a Value },
    /// Resolution of a symbolic reference: expand fresh, alias one of
    /// `candidates`, or null.
    ReferenceResolution {
        reference: &'a SymbolicRef,
        candidates: &'a [AliasCandidate],
    },
    /// Whether a class must be assumed already initialized.
    ClassInit { class: &'a str },
}

/// One feasible outcome of a branching point, as certified by the external
/// decision procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionAlternative {
    Branch(bool),
    ExpandTo { type_name: String },
    AliasTo { heap_pos: HeapId },
    Null,
    Concrete(Const),
    ClassInitialized(bool),
}

/// Synchronous request/response contract consumed by dispatch. The returned
/// list is treated as the complete feasible set, in the order the children
/// will be produced; an empty list prunes the decision point entirely.
pub trait DecisionPort {
    fn decide(
        &mut self,
        path_condition: &PathCondition,
        shape: &ClauseShape<'_>,
    ) -> Result<Vec<DecisionAlternative>, ExternalError>;
}

/// Fully enumerating port: returns every syntactically possible alternative
/// in a fixed deterministic order, without consulting any solver. Useful for
/// tests and unguided exploration.
#[derive(Debug, Default)]
pub struct ExhaustivePort;

impl DecisionPort for ExhaustivePort {
    fn decide(
        &mut self,
        _path_condition: &PathCondition,
        shape: &ClauseShape<'_>,
    ) -> Result<Vec<DecisionAlternative>, ExternalError> {
        Ok(match shape {
            ClauseShape::Branch { .. } => vec![
                DecisionAlternative::Branch(true),
                DecisionAlternative::Branch(false),
            ],
            ClauseShape::ReferenceResolution {
                reference,
                candidates,
            } => {
                let mut alts = vec![DecisionAlternative::ExpandTo {
                    type_name: reference.type_name.clone(),
                }];
                for c in candidates.iter() {
                    alts.push(DecisionAlternative::AliasTo {
                        heap_pos: c.heap_pos,
                    });
                }
                alts.push(DecisionAlternative::Null);
                alts
            }
            ClauseShape::ClassInit { .. } => {
                vec![
                    DecisionAlternative::ClassInitialized(true),
                    DecisionAlternative::ClassInitialized(false),
                ]
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhaustive_port_reference_order_is_stable() {
        let mut port = ExhaustivePort;
        let reference = SymbolicRef {
            id: 0,
            origin: Origin::root("root").field("r"),
            type_name: "T".into(),
        };
        let candidates = vec![
            AliasCandidate {
                heap_pos: 2,
                origin: Origin::root("root").field("a"),
                type_name: "T".into(),
            },
            AliasCandidate {
                heap_pos: 5,
                origin: Origin::root("root").field("b"),
                type_name: "T".into(),
            },
        ];
        let pc = PathCondition::default();
        let shape = ClauseShape::ReferenceResolution {
            reference: &reference,
            candidates: &candidates,
        };
        let a = port.decide(&pc, &shape).unwrap();
        let b = port.decide(&pc, &shape).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a,
            vec![
                DecisionAlternative::ExpandTo {
                    type_name: "T".into()
                },
                DecisionAlternative::AliasTo { heap_pos: 2 },
                DecisionAlternative::AliasTo { heap_pos: 5 },
                DecisionAlternative::Null,
            ]
        );
    }
}
