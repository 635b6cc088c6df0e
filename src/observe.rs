//! Execution-notification hook.
//!
//! A guided-concrete-execution comparator (or any other external observer)
//! can register here to stay synchronized with modeled bulk operations on
//! symbolic containers. The core calls the hook and moves on; a no-op
//! observer is a valid default.

use crate::state::MethodSig;

pub trait ExecutionObserver {
    /// Called whenever a modeled bulk-collection operation executes.
    /// `call_stack` lists the frame signatures innermost-last.
    fn bulk_collection_op(&mut self, current: &MethodSig, call_stack: &[MethodSig]);
}

/// Observer that ignores every notification.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl ExecutionObserver for NoopObserver {
    fn bulk_collection_op(&mut self, _current: &MethodSig, _call_stack: &[MethodSig]) {}
}
