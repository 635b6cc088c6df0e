use symbex::{
    Const, DispatchCtx, Dispatcher, ExhaustivePort, FieldType, Frame, Instr, Method, MethodSig,
    NoopObserver, Origin, PrimKind, Program, RuleSpec, State, StuckCause, TriggerRuleSet, Value,
};

fn entry_sig() -> MethodSig {
    MethodSig::new("Main", "entry")
}

fn get_f() -> Instr {
    Instr::GetField {
        name: "f".to_string(),
        ty: FieldType::Prim(PrimKind::Int),
    }
}

/// Entry reads a field through the unresolved `root.p`; one expansion-born
/// object at `root.q` is the sole alias candidate.
fn boot(extra_methods: Vec<Method>) -> (Program, State, u64) {
    let mut program = Program::new().with_method(Method::new(
        entry_sig(),
        0,
        vec![Instr::Load(0), get_f(), Instr::ReturnVal],
    ));
    for m in extra_methods {
        program = program.with_method(m);
    }
    let mut s = State::new("s0");
    s.push_frame(Frame::new(entry_sig())).unwrap();
    let r_q = s
        .symbolic_ref_for(Origin::root("root").field("q"), "T")
        .unwrap();
    let q_pos = s.assume_expands(r_q, "T").unwrap();
    let r_p = s
        .symbolic_ref_for(Origin::root("root").field("p"), "T")
        .unwrap();
    s.set_local(0, Value::ReferenceSymbolic(r_p)).unwrap();
    (program, s, q_pos)
}

/// Steps to the refinement fork and returns the alias child.
fn alias_child(d: &Dispatcher, s: State, ctx: &mut DispatchCtx<'_>) -> State {
    let s = d.step(s, ctx).unwrap().remove(0); // Load
    let mut children = d.step(s, ctx).unwrap();
    assert_eq!(children.len(), 3);
    children.remove(1)
}

#[test]
fn test_alias_resolution_schedules_the_trigger_frame() {
    let on_alias = MethodSig::new("Watcher", "onAlias");
    let (program, s, q_pos) = boot(vec![Method::new(
        on_alias.clone(),
        1,
        vec![Instr::Return],
    )]);
    let rules = TriggerRuleSet::compile(&[RuleSpec {
        trigger_origin: "root.q".to_string(),
        parameter_origin: "root.q".to_string(),
        trigger_method: on_alias.clone(),
    }])
    .unwrap();

    let mut port = ExhaustivePort;
    let mut obs = NoopObserver;
    let mut ctx = DispatchCtx {
        program: &program,
        port: &mut port,
        rules: &rules,
        observer: &mut obs,
    };
    let d = Dispatcher::new();

    let child = alias_child(&d, s, &mut ctx);
    assert_eq!(child.frames().len(), 2);
    let top = child.current_frame().unwrap();
    assert_eq!(top.method, on_alias);
    assert_eq!(top.return_pc, None);
    // The trigger parameter is the matched expansion object.
    assert_eq!(
        top.locals.get(&0),
        Some(&Value::ReferenceConcrete(Some(q_pos)))
    );

    // The trigger runs to completion, then the interrupted read resumes
    // against the now-resolved reference.
    let child = d.step(child, &mut ctx).unwrap().remove(0); // trigger Return
    assert_eq!(child.frames().len(), 1);
    assert_eq!(child.pc().unwrap(), 1);

    let child = d.step(child, &mut ctx).unwrap().remove(0); // re-executed read
    let done = d.step(child, &mut ctx).unwrap().remove(0);
    match done.stuck() {
        Some(StuckCause::Returned(Some(Value::Symbolic { origin, .. }))) => {
            assert_eq!(origin.to_string(), "root.q.f");
        }
        other => panic!("expected a symbolic return, got {other:?}"),
    }
}

#[test]
fn test_first_matching_rule_runs_first() {
    let first = MethodSig::new("Hooks", "first");
    let second = MethodSig::new("Hooks", "second");
    let (program, s, _) = boot(vec![
        Method::new(first.clone(), 1, vec![Instr::Return]),
        Method::new(second.clone(), 1, vec![Instr::Return]),
    ]);
    let rules = TriggerRuleSet::compile(&[
        RuleSpec {
            trigger_origin: "root.{R_ANY}".to_string(),
            parameter_origin: "root.q".to_string(),
            trigger_method: first.clone(),
        },
        RuleSpec {
            trigger_origin: "root.q".to_string(),
            parameter_origin: "root.q".to_string(),
            trigger_method: second.clone(),
        },
    ])
    .unwrap();

    let mut port = ExhaustivePort;
    let mut obs = NoopObserver;
    let mut ctx = DispatchCtx {
        program: &program,
        port: &mut port,
        rules: &rules,
        observer: &mut obs,
    };
    let d = Dispatcher::new();

    let child = alias_child(&d, s, &mut ctx);
    assert_eq!(child.frames().len(), 3);
    assert_eq!(child.frames()[2].method, first); // declaration order, topmost
    assert_eq!(child.frames()[1].method, second);
}

#[test]
fn test_rule_without_a_known_parameter_stays_silent() {
    let on_alias = MethodSig::new("Watcher", "onAlias");
    let (program, s, _) = boot(vec![Method::new(
        on_alias.clone(),
        1,
        vec![Instr::Return],
    )]);
    // No expansion of root.owner exists yet, so the rule cannot find its
    // parameter object and does not fire.
    let rules = TriggerRuleSet::compile(&[RuleSpec {
        trigger_origin: "root.q".to_string(),
        parameter_origin: "root.owner".to_string(),
        trigger_method: on_alias,
    }])
    .unwrap();

    let mut port = ExhaustivePort;
    let mut obs = NoopObserver;
    let mut ctx = DispatchCtx {
        program: &program,
        port: &mut port,
        rules: &rules,
        observer: &mut obs,
    };
    let d = Dispatcher::new();

    let child = alias_child(&d, s, &mut ctx);
    assert_eq!(child.frames().len(), 1);
}

#[test]
fn test_trigger_return_value_never_reaches_the_interrupted_frame() {
    let on_alias = MethodSig::new("Watcher", "onAlias");
    // A trigger method that returns a value. The interrupted read has no
    // consumer for it, so it must be discarded with the trigger frame.
    let (program, s, _) = boot(vec![Method::new(
        on_alias.clone(),
        1,
        vec![Instr::Push(Const::Int(1)), Instr::ReturnVal],
    )]);
    let rules = TriggerRuleSet::compile(&[RuleSpec {
        trigger_origin: "root.q".to_string(),
        parameter_origin: "root.q".to_string(),
        trigger_method: on_alias,
    }])
    .unwrap();

    let mut port = ExhaustivePort;
    let mut obs = NoopObserver;
    let mut ctx = DispatchCtx {
        program: &program,
        port: &mut port,
        rules: &rules,
        observer: &mut obs,
    };
    let d = Dispatcher::new();

    let child = alias_child(&d, s, &mut ctx);
    assert_eq!(child.frames().len(), 2);
    let child = d.step(child, &mut ctx).unwrap().remove(0); // trigger push
    let child = d.step(child, &mut ctx).unwrap().remove(0); // trigger return
    assert_eq!(child.frames().len(), 1);
    // Exactly the operand the interrupted read loaded, nothing extra.
    assert_eq!(child.current_frame().unwrap().operands.len(), 1);

    let child = d.step(child, &mut ctx).unwrap().remove(0); // re-executed read
    let done = d.step(child, &mut ctx).unwrap().remove(0);
    match done.stuck() {
        Some(StuckCause::Returned(Some(Value::Symbolic { origin, .. }))) => {
            assert_eq!(origin.to_string(), "root.q.f");
        }
        other => panic!("expected a symbolic return, got {other:?}"),
    }
}

#[test]
fn test_relative_parameter_pattern_resolves_against_the_firing_reference() {
    let on_alias = MethodSig::new("Watcher", "onAlias");
    let (program, mut s, _) = boot(vec![Method::new(
        on_alias.clone(),
        1,
        vec![Instr::Return],
    )]);
    // Expand an owner object so the resolved pattern has a match. Its type
    // differs from T, so it never enters the alias candidate list.
    let r_owner = s
        .symbolic_ref_for(Origin::root("root").field("owner"), "Owner")
        .unwrap();
    let owner_pos = s.assume_expands(r_owner, "Owner").unwrap();

    // {$REF}.{UP}.owner resolved against the firing root.p is root.owner.
    let rules = TriggerRuleSet::compile(&[RuleSpec {
        trigger_origin: "root.q".to_string(),
        parameter_origin: "{$REF}.{UP}.owner".to_string(),
        trigger_method: on_alias,
    }])
    .unwrap();

    let mut port = ExhaustivePort;
    let mut obs = NoopObserver;
    let mut ctx = DispatchCtx {
        program: &program,
        port: &mut port,
        rules: &rules,
        observer: &mut obs,
    };
    let d = Dispatcher::new();

    let child = alias_child(&d, s, &mut ctx);
    assert_eq!(child.frames().len(), 2);
    assert_eq!(
        child.current_frame().unwrap().locals.get(&0),
        Some(&Value::ReferenceConcrete(Some(owner_pos)))
    );
}
