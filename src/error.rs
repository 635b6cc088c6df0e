use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures that escalate out of dispatch to the driver.
///
/// Branch-local execution failures never appear here: they are recovered at
/// the branch by marking the owning state stuck (see [`ExecFailure`]).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] RuleError),
    #[error("frozen state violation: {0}")]
    Frozen(#[from] FrozenStateViolation),
    #[error("external collaborator failed: {0}")]
    External(#[from] ExternalError),
    #[error("analysis abandoned: {0}")]
    Fatal(String),
}

/// Branch-local execution failure: the owning state becomes stuck with an
/// internal-error marker, siblings are unaffected, exploration continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecFailure {
    #[error("operand stack underflow")]
    StackUnderflow,
    #[error("operand count mismatch: instruction declares {expected}, frame has {found}")]
    OperandMismatch { expected: usize, found: usize },
    #[error("no value assigned to local slot {slot}")]
    MissingLocal { slot: u16 },
    #[error("field `{name}` has no assigned value")]
    UnassignedField { name: String },
    #[error("no instruction decodable at pc {pc}")]
    DecodeError { pc: u32 },
    #[error("no method `{signature}` in the loaded program")]
    UnknownMethod { signature: String },
    #[error("no object at heap position {heap_pos}")]
    NoSuchObject { heap_pos: u64 },
    #[error("no frame on the call stack")]
    EmptyCallStack,
    #[error("reference `{origin}` already resolved differently in this lineage")]
    ConflictingResolution { origin: String },
    #[error("value is not a {expected}: {found}")]
    TypeMismatch { expected: &'static str, found: String },
}

/// Malformed rule configuration. Raised while compiling a rule set, before
/// any state is touched; never raised mid-exploration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("malformed origin pattern `{pattern}`: {reason}")]
    MalformedPattern { pattern: String, reason: String },
    #[error("empty origin pattern")]
    EmptyPattern,
}

/// Attempted mutation of a state that was already frozen. A contract
/// violation in the driver, always fatal to the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("state {state_id} is frozen")]
pub struct FrozenStateViolation {
    pub state_id: String,
}

/// A failure raised by an external collaborator (decision port or a trigger
/// method). Propagated to the driver as-is; the core never retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalError {
    #[error("decision port failed: {0}")]
    Decision(String),
    #[error("trigger method `{method}` failed: {reason}")]
    Trigger { method: String, reason: String },
}

/// Error channel for one unit of work inside dispatch. The dispatcher sorts
/// the variants into "stick this branch" versus "escalate to the driver".
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Failure(#[from] ExecFailure),
    #[error(transparent)]
    Frozen(#[from] FrozenStateViolation),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<ExternalError> for StepError {
    fn from(e: ExternalError) -> Self {
        StepError::Engine(EngineError::External(e))
    }
}
