//! One branch's full machine state.
//!
//! A [`State`] owns its heap, call stack, static area and path condition
//! outright; forking clones the lot, so no two branches ever share mutable
//! structure. Heap ids come from a state-local counter copied at fork time,
//! which keeps ids unique within a lineage without any shared allocation
//! state.

pub mod pathcond;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ExecFailure, FrozenStateViolation, StepError};
use crate::value::{HeapId, Origin, PrimKind, SymbolicRef, Value};

pub use pathcond::{Clause, PathCondition};

/// Owning method identity for a frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodSig {
    pub class: String,
    pub name: String,
}

impl MethodSig {
    pub fn new(class: impl Into<String>, name: impl Into<String>) -> Self {
        MethodSig {
            class: class.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for MethodSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.class, self.name)
    }
}

/// A named field slot of an object: declared type plus current value,
/// possibly unassigned.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub ty: String,
    pub value: Option<Value>,
}

/// Sparse access-outcome entry of a symbolic array: `value` holds whenever
/// `condition` does. Entries beyond the known ones are unconstrained.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayOutcome {
    pub condition: Value,
    pub value: Value,
}

/// Array backing representation.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayRepr {
    /// Simple dense storage, concrete length.
    Dense(Vec<Value>),
    /// Access-outcome model for symbolic arrays; "unknown beyond this point"
    /// is an empty (or exhausted) outcome list.
    Outcomes(Vec<ArrayOutcome>),
}

/// A heap (or static-area) object.
#[derive(Debug, Clone, PartialEq)]
pub enum Objekt {
    Instance {
        class: String,
        /// Non-null only for objects born from symbolic heap expansion.
        origin: Option<Origin>,
        fields: BTreeMap<String, Variable>,
    },
    Array {
        class: String,
        origin: Option<Origin>,
        length: Value,
        repr: ArrayRepr,
    },
    Klass {
        class: String,
        fields: BTreeMap<String, Variable>,
        initialized: bool,
    },
}

impl Objekt {
    pub fn new_instance(class: impl Into<String>) -> Objekt {
        Objekt::Instance {
            class: class.into(),
            origin: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Objekt::Instance { class, .. }
            | Objekt::Array { class, .. }
            | Objekt::Klass { class, .. } => class,
        }
    }

    pub fn origin(&self) -> Option<&Origin> {
        match self {
            Objekt::Instance { origin, .. } | Objekt::Array { origin, .. } => origin.as_ref(),
            Objekt::Klass { .. } => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Variable> {
        match self {
            Objekt::Instance { fields, .. } | Objekt::Klass { fields, .. } => fields.get(name),
            Objekt::Array { .. } => None,
        }
    }

    pub fn set_field(&mut self, name: &str, ty: &str, value: Value) {
        match self {
            Objekt::Instance { fields, .. } | Objekt::Klass { fields, .. } => {
                let var = fields.entry(name.to_string()).or_insert_with(|| Variable {
                    name: name.to_string(),
                    ty: ty.to_string(),
                    value: None,
                });
                var.value = Some(value);
            }
            Objekt::Array { .. } => {}
        }
    }
}

/// One activation record. Operand stack top is the last element; locals are
/// keyed by slot index.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub method: MethodSig,
    pub pc: u32,
    /// Program counter the caller resumes at, or `None` when unknown (the
    /// root frame, and trigger frames scheduled by the rule engine).
    pub return_pc: Option<u32>,
    pub operands: Vec<Value>,
    pub locals: BTreeMap<u16, Value>,
}

impl Frame {
    pub fn new(method: MethodSig) -> Frame {
        Frame {
            method,
            pc: 0,
            return_pc: None,
            operands: Vec::new(),
            locals: BTreeMap::new(),
        }
    }

    /// Operand stack rendered top-to-bottom for inspection.
    pub fn operands_top_down(&self) -> impl Iterator<Item = &Value> {
        self.operands.iter().rev()
    }
}

/// Why a state stopped for good. Return value and terminating exception are
/// mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum StuckCause {
    Returned(Option<Value>),
    Exception(Value),
    /// Branch-local execution failure (internal-error marker).
    Failure(ExecFailure),
}

/// How a symbolic reference was resolved within this lineage. Monotonic:
/// once recorded it never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Null,
    Heap(HeapId),
}

#[derive(Debug, Clone)]
pub struct State {
    identifier: String,
    sequence: u64,
    depth: u32,
    heap: BTreeMap<HeapId, Objekt>,
    next_heap_id: HeapId,
    static_area: BTreeMap<String, Objekt>,
    stack: Vec<Frame>,
    path_condition: PathCondition,
    resolutions: BTreeMap<String, Resolution>,
    /// Symbol cache keyed by canonical origin text: equal origins denote the
    /// same logical slot and must yield the identical symbol.
    symbols: BTreeMap<String, Value>,
    next_symbol_id: u64,
    stuck: Option<StuckCause>,
    frozen: bool,
}

impl State {
    pub fn new(identifier: impl Into<String>) -> State {
        State {
            identifier: identifier.into(),
            sequence: 0,
            depth: 0,
            heap: BTreeMap::new(),
            next_heap_id: 0,
            static_area: BTreeMap::new(),
            stack: Vec::new(),
            path_condition: PathCondition::default(),
            resolutions: BTreeMap::new(),
            symbols: BTreeMap::new(),
            next_symbol_id: 0,
            stuck: None,
            frozen: false,
        }
    }

    // ---- identity & lifecycle ------------------------------------------

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_stuck(&self) -> bool {
        self.stuck.is_some()
    }

    pub fn stuck(&self) -> Option<&StuckCause> {
        self.stuck.as_ref()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Marks the state permanently read-only. Any later mutation attempt
    /// fails with a frozen-state violation.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    fn check_mutable(&self) -> Result<(), FrozenStateViolation> {
        if self.frozen {
            Err(FrozenStateViolation {
                state_id: self.identifier.clone(),
            })
        } else {
            Ok(())
        }
    }

    /// Clones this state into a child branch. The child shares no mutable
    /// structure with the parent; the heap-id counter value is copied so ids
    /// stay unique within the lineage.
    pub fn fork(&self, tag: &str) -> State {
        let mut child = self.clone();
        child.identifier = format!("{}.{}", self.identifier, tag);
        child.sequence = self.sequence + 1;
        child.depth = self.depth + 1;
        child.frozen = false;
        child
    }

    // ---- call stack ----------------------------------------------------

    pub fn frames(&self) -> &[Frame] {
        &self.stack
    }

    pub fn current_frame(&self) -> Result<&Frame, ExecFailure> {
        self.stack.last().ok_or(ExecFailure::EmptyCallStack)
    }

    fn current_frame_mut(&mut self) -> Result<&mut Frame, ExecFailure> {
        self.stack.last_mut().ok_or(ExecFailure::EmptyCallStack)
    }

    pub fn push_frame(&mut self, frame: Frame) -> Result<(), StepError> {
        self.check_mutable()?;
        self.stack.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Result<Frame, StepError> {
        self.check_mutable()?;
        Ok(self.stack.pop().ok_or(ExecFailure::EmptyCallStack)?)
    }

    pub fn pc(&self) -> Result<u32, ExecFailure> {
        Ok(self.current_frame()?.pc)
    }

    pub fn set_pc(&mut self, pc: u32) -> Result<(), StepError> {
        self.check_mutable()?;
        self.current_frame_mut()?.pc = pc;
        Ok(())
    }

    pub fn advance_pc(&mut self) -> Result<(), StepError> {
        self.check_mutable()?;
        let f = self.current_frame_mut()?;
        f.pc += 1;
        Ok(())
    }

    pub fn push_operand(&mut self, v: Value) -> Result<(), StepError> {
        self.check_mutable()?;
        self.current_frame_mut()?.operands.push(v);
        Ok(())
    }

    /// Reads an operand without popping; depth 0 is the stack top.
    pub fn peek_operand(&self, depth: usize) -> Result<&Value, ExecFailure> {
        let ops = &self.current_frame()?.operands;
        ops.len()
            .checked_sub(1 + depth)
            .and_then(|i| ops.get(i))
            .ok_or(ExecFailure::StackUnderflow)
    }

    pub fn pop_operand(&mut self) -> Result<Value, StepError> {
        self.check_mutable()?;
        Ok(self
            .current_frame_mut()?
            .operands
            .pop()
            .ok_or(ExecFailure::StackUnderflow)?)
    }

    pub fn local(&self, slot: u16) -> Result<Value, ExecFailure> {
        self.current_frame()?
            .locals
            .get(&slot)
            .cloned()
            .ok_or(ExecFailure::MissingLocal { slot })
    }

    pub fn set_local(&mut self, slot: u16, v: Value) -> Result<(), StepError> {
        self.check_mutable()?;
        self.current_frame_mut()?.locals.insert(slot, v);
        Ok(())
    }

    // ---- heap & static area --------------------------------------------

    pub fn heap(&self) -> impl Iterator<Item = (HeapId, &Objekt)> {
        self.heap.iter().map(|(id, o)| (*id, o))
    }

    pub fn objekt(&self, heap_pos: HeapId) -> Result<&Objekt, ExecFailure> {
        self.heap
            .get(&heap_pos)
            .ok_or(ExecFailure::NoSuchObject { heap_pos })
    }

    pub fn objekt_mut(&mut self, heap_pos: HeapId) -> Result<&mut Objekt, StepError> {
        self.check_mutable()?;
        Ok(self
            .heap
            .get_mut(&heap_pos)
            .ok_or(ExecFailure::NoSuchObject { heap_pos })?)
    }

    pub fn heap_alloc(&mut self, obj: Objekt) -> Result<HeapId, StepError> {
        self.check_mutable()?;
        let id = self.next_heap_id;
        self.next_heap_id += 1;
        self.heap.insert(id, obj);
        Ok(id)
    }

    pub fn static_area(&self) -> impl Iterator<Item = (&String, &Objekt)> {
        self.static_area.iter()
    }

    pub fn klass(&self, class: &str) -> Option<&Objekt> {
        self.static_area.get(class)
    }

    pub fn klass_initialized(&self, class: &str) -> bool {
        matches!(
            self.static_area.get(class),
            Some(Objekt::Klass {
                initialized: true,
                ..
            })
        )
    }

    pub fn ensure_klass(&mut self, class: &str) -> Result<&mut Objekt, StepError> {
        self.check_mutable()?;
        Ok(self
            .static_area
            .entry(class.to_string())
            .or_insert_with(|| Objekt::Klass {
                class: class.to_string(),
                fields: BTreeMap::new(),
                initialized: false,
            }))
    }

    pub fn mark_klass_initialized(&mut self, class: &str) -> Result<(), StepError> {
        if let Objekt::Klass { initialized, .. } = self.ensure_klass(class)? {
            *initialized = true;
        }
        Ok(())
    }

    // ---- symbols ---------------------------------------------------------

    /// Returns the symbolic primitive for `origin`, minting it on first use.
    /// Equal origins always yield the identical symbol.
    pub fn symbol_for(&mut self, origin: Origin, kind: PrimKind) -> Result<Value, StepError> {
        self.check_mutable()?;
        let key = origin.to_string();
        if let Some(v) = self.symbols.get(&key) {
            return Ok(v.clone());
        }
        let id = self.next_symbol_id;
        self.next_symbol_id += 1;
        let v = Value::Symbolic { id, kind, origin };
        self.symbols.insert(key, v.clone());
        Ok(v)
    }

    /// Returns the symbolic reference for `origin`, minting it on first use.
    pub fn symbolic_ref_for(
        &mut self,
        origin: Origin,
        type_name: &str,
    ) -> Result<SymbolicRef, StepError> {
        self.check_mutable()?;
        let key = origin.to_string();
        if let Some(Value::ReferenceSymbolic(r)) = self.symbols.get(&key) {
            return Ok(r.clone());
        }
        let id = self.next_symbol_id;
        self.next_symbol_id += 1;
        let r = SymbolicRef {
            id,
            origin,
            type_name: type_name.to_string(),
        };
        self.symbols.insert(key, Value::ReferenceSymbolic(r.clone()));
        Ok(r)
    }

    // ---- path condition & resolutions ------------------------------------

    pub fn path_condition(&self) -> &PathCondition {
        &self.path_condition
    }

    pub fn resolution(&self, reference: &SymbolicRef) -> Option<Resolution> {
        self.resolutions.get(&reference.origin.to_string()).copied()
    }

    pub fn assume(&mut self, constraint: Value) -> Result<(), StepError> {
        self.check_mutable()?;
        self.path_condition.push(Clause::Assume(constraint));
        Ok(())
    }

    fn record_resolution(
        &mut self,
        reference: &SymbolicRef,
        r: Resolution,
    ) -> Result<(), ExecFailure> {
        let key = reference.origin.to_string();
        match self.resolutions.get(&key) {
            Some(existing) if *existing != r => Err(ExecFailure::ConflictingResolution {
                origin: key,
            }),
            _ => {
                self.resolutions.insert(key, r);
                Ok(())
            }
        }
    }

    /// Resolves `reference` by expanding a fresh object of `type_name`,
    /// born with the reference's own origin. Returns its heap position.
    pub fn assume_expands(
        &mut self,
        reference: SymbolicRef,
        type_name: &str,
    ) -> Result<HeapId, StepError> {
        self.check_mutable()?;
        let obj = if let Some(elem) = type_name.strip_suffix("[]") {
            let length = self.symbol_for(
                reference.origin.clone().field("length"),
                PrimKind::Int,
            )?;
            Objekt::Array {
                class: format!("{elem}[]"),
                origin: Some(reference.origin.clone()),
                length,
                repr: ArrayRepr::Outcomes(Vec::new()),
            }
        } else {
            Objekt::Instance {
                class: type_name.to_string(),
                origin: Some(reference.origin.clone()),
                fields: BTreeMap::new(),
            }
        };
        let heap_pos = self.heap_alloc(obj)?;
        self.record_resolution(&reference, Resolution::Heap(heap_pos))?;
        self.path_condition.push(Clause::Expands {
            reference,
            heap_pos,
            type_name: type_name.to_string(),
        });
        Ok(heap_pos)
    }

    /// Resolves `reference` as an alias of the pre-existing object at
    /// `heap_pos`.
    pub fn assume_aliases(
        &mut self,
        reference: SymbolicRef,
        heap_pos: HeapId,
    ) -> Result<(), StepError> {
        self.check_mutable()?;
        let target_origin = self
            .objekt(heap_pos)?
            .origin()
            .cloned()
            .unwrap_or_default();
        self.record_resolution(&reference, Resolution::Heap(heap_pos))?;
        self.path_condition.push(Clause::Aliases {
            reference,
            heap_pos,
            target_origin,
        });
        Ok(())
    }

    /// Resolves `reference` to null.
    pub fn assume_null(&mut self, reference: SymbolicRef) -> Result<(), StepError> {
        self.check_mutable()?;
        self.record_resolution(&reference, Resolution::Null)?;
        self.path_condition.push(Clause::Null { reference });
        Ok(())
    }

    pub fn assume_class_initialized(
        &mut self,
        class: &str,
        initialized: bool,
    ) -> Result<(), StepError> {
        self.check_mutable()?;
        self.path_condition.push(if initialized {
            Clause::ClassInitialized(class.to_string())
        } else {
            Clause::ClassNotInitialized(class.to_string())
        });
        Ok(())
    }

    // ---- terminal transitions ---------------------------------------------

    pub fn set_stuck_returned(&mut self, value: Option<Value>) -> Result<(), StepError> {
        self.check_mutable()?;
        self.stack.clear();
        self.stuck = Some(StuckCause::Returned(value));
        Ok(())
    }

    pub fn set_stuck_exception(&mut self, value: Value) -> Result<(), StepError> {
        self.check_mutable()?;
        self.stack.clear();
        self.stuck = Some(StuckCause::Exception(value));
        Ok(())
    }

    pub fn set_stuck_failure(&mut self, failure: ExecFailure) -> Result<(), StepError> {
        self.check_mutable()?;
        self.stuck = Some(StuckCause::Failure(failure));
        Ok(())
    }
}
