//! Symbex library surface.
//!
//! The crate is the state/dispatch/aliasing core of a symbolic executor for a
//! stack-based managed VM. A driver owns the exploration tree and repeatedly
//! calls [`dispatch::Dispatcher::step`] on one branch [`state::State`] at a
//! time; every branching instruction consults an external
//! [`decision::DecisionPort`] and yields one child state per feasible
//! alternative. Aliasing resolutions are screened against user-supplied
//! [`rules::TriggerRuleSet`] rules whose trigger methods are scheduled as
//! ordinary frames on the child state.
//!
//! Constraint solving, class loading, rendering, and drivers are external
//! collaborators; only their narrow contracts live here.

pub mod decision;
pub mod dispatch;
pub mod error;
pub mod observe;
pub mod rules;
pub mod state;
pub mod value;

pub use decision::{ClauseShape, DecisionAlternative, DecisionPort, ExhaustivePort};
pub use dispatch::{DispatchCtx, Dispatcher, FieldType, Instr, Method, Outcome, Program};
pub use error::{EngineError, ExecFailure, Result};
pub use observe::{ExecutionObserver, NoopObserver};
pub use rules::{RuleSpec, TriggerRule, TriggerRuleSet};
pub use state::{Clause, Frame, MethodSig, Objekt, PathCondition, State, StuckCause};
pub use value::{Const, Origin, PrimKind, SymbolicRef, Value};
