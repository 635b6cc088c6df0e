use symbex::{
    Clause, Const, DispatchCtx, Dispatcher, EngineError, ExecFailure, ExhaustivePort, Frame, Instr,
    Method, MethodSig, NoopObserver, Objekt, Origin, PrimKind, Program, State, StuckCause,
    TriggerRuleSet, Value,
};

fn entry_sig() -> MethodSig {
    MethodSig::new("Main", "entry")
}

fn boot(code: Vec<Instr>) -> (Program, State) {
    let program = Program::new().with_method(Method::new(entry_sig(), 0, code));
    let mut s = State::new("s0");
    s.push_frame(Frame::new(entry_sig())).unwrap();
    (program, s)
}

#[test]
fn test_underflow_sticks_only_its_branch() {
    let (program, parent) = boot(vec![Instr::Pop, Instr::Return]);
    let mut port = ExhaustivePort;
    let mut obs = NoopObserver;
    let rules = TriggerRuleSet::empty();
    let mut ctx = DispatchCtx {
        program: &program,
        port: &mut port,
        rules: &rules,
        observer: &mut obs,
    };

    let bad = parent.fork("a");
    let mut good = parent.fork("b");
    good.push_operand(Value::Simplex(Const::Int(1))).unwrap();

    // The empty-stack sibling sticks with an internal-error marker...
    let out = Dispatcher::new().step(bad, &mut ctx).unwrap();
    assert_eq!(out.len(), 1);
    assert!(matches!(
        out[0].stuck(),
        Some(StuckCause::Failure(ExecFailure::OperandMismatch {
            expected: 1,
            found: 0
        }))
    ));

    // ...while the other branch is entirely unaffected.
    let out = Dispatcher::new().step(good, &mut ctx).unwrap();
    assert_eq!(out.len(), 1);
    assert!(!out[0].is_stuck());
    assert_eq!(out[0].pc().unwrap(), 1);
}

#[test]
fn test_stuck_state_passes_through_untouched() {
    let (program, mut s) = boot(vec![Instr::Return]);
    s.set_stuck_returned(None).unwrap();

    let mut port = ExhaustivePort;
    let mut obs = NoopObserver;
    let rules = TriggerRuleSet::empty();
    let mut ctx = DispatchCtx {
        program: &program,
        port: &mut port,
        rules: &rules,
        observer: &mut obs,
    };
    let out = Dispatcher::new().step(s, &mut ctx).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].identifier(), "s0");
    assert!(matches!(out[0].stuck(), Some(StuckCause::Returned(None))));
}

#[test]
fn test_frozen_state_is_rejected() {
    let (program, mut s) = boot(vec![Instr::Return]);
    s.freeze();

    let mut port = ExhaustivePort;
    let mut obs = NoopObserver;
    let rules = TriggerRuleSet::empty();
    let mut ctx = DispatchCtx {
        program: &program,
        port: &mut port,
        rules: &rules,
        observer: &mut obs,
    };
    let err = Dispatcher::new().step(s, &mut ctx).unwrap_err();
    assert!(matches!(err, EngineError::Frozen(_)));
}

#[test]
fn test_branch_fork_isolates_heap_and_path_condition() {
    let code = vec![
        Instr::Load(0),
        Instr::IfTrue(4),
        Instr::Push(Const::Int(0)),
        Instr::ReturnVal,
        Instr::Push(Const::Int(1)),
        Instr::ReturnVal,
    ];
    let (program, mut s) = boot(code);
    let cond = s
        .symbol_for(Origin::root("root").field("c"), PrimKind::Bool)
        .unwrap();
    s.set_local(0, cond.clone()).unwrap();

    let mut port = ExhaustivePort;
    let mut obs = NoopObserver;
    let rules = TriggerRuleSet::empty();
    let mut ctx = DispatchCtx {
        program: &program,
        port: &mut port,
        rules: &rules,
        observer: &mut obs,
    };
    let d = Dispatcher::new();

    let s = d.step(s, &mut ctx).unwrap().remove(0); // Load
    let mut children = d.step(s, &mut ctx).unwrap(); // IfTrue forks
    assert_eq!(children.len(), 2);
    let mut not_taken = children.remove(1);
    let taken = children.remove(0);

    assert_eq!(taken.identifier(), "s0.1");
    assert_eq!(taken.pc().unwrap(), 4);
    assert_eq!(taken.path_condition().clauses(), &[Clause::Assume(cond)]);
    assert_eq!(not_taken.pc().unwrap(), 2);
    assert!(matches!(
        not_taken.path_condition().clauses(),
        [Clause::Assume(Value::Expression { .. })]
    ));

    // Mutating one child never shows up in the sibling.
    not_taken.heap_alloc(Objekt::new_instance("T")).unwrap();
    assert_eq!(taken.heap().count(), 0);
    assert_eq!(not_taken.heap().count(), 1);
}
