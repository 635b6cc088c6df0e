use symbex::value::Operator;
use symbex::{Const, Origin, PrimKind, State, Value};

/// One state accumulating every clause kind, rendered the way an inspection
/// surface would show it.
#[test]
fn test_mixed_path_condition_renders_in_insertion_order() {
    let mut s = State::new("s0");

    let x = s
        .symbol_for(Origin::root("root").field("x"), PrimKind::Int)
        .unwrap();
    s.assume(Value::binop(
        Operator::Gt,
        x,
        Value::Simplex(Const::Int(0)),
    ))
    .unwrap();

    let r_q = s
        .symbolic_ref_for(Origin::root("root").field("q"), "T")
        .unwrap();
    let q_pos = s.assume_expands(r_q, "T").unwrap();

    let r_a = s
        .symbolic_ref_for(Origin::root("root").field("a"), "T")
        .unwrap();
    s.assume_aliases(r_a, q_pos).unwrap();

    let r_n = s
        .symbolic_ref_for(Origin::root("root").field("n"), "T")
        .unwrap();
    s.assume_null(r_n).unwrap();

    s.assume_class_initialized("C", true).unwrap();

    assert_eq!(
        s.path_condition().render(),
        "({V0} > 0) && \
         {R1} == Object[0] (fresh T) && \
         {R2} == Object[0] (aliases root.q) && \
         {R3} == null && \
         initialized(C)"
    );

    // Known symbols come out in first-mention order, one entry per origin,
    // and repeating the query changes nothing.
    let known = s.path_condition().known_symbols();
    assert_eq!(
        known,
        vec![
            ("{V0}".to_string(), "root.x".to_string()),
            ("{R1}".to_string(), "root.q".to_string()),
            ("{R2}".to_string(), "root.a".to_string()),
            ("{R3}".to_string(), "root.n".to_string()),
        ]
    );
    assert_eq!(s.path_condition().known_symbols(), known);
}

#[test]
fn test_symbol_mentioned_twice_is_reported_once() {
    let mut s = State::new("s0");
    let x = s
        .symbol_for(Origin::root("root").field("x"), PrimKind::Int)
        .unwrap();
    s.assume(Value::binop(
        Operator::Gt,
        x.clone(),
        Value::Simplex(Const::Int(0)),
    ))
    .unwrap();
    s.assume(Value::binop(
        Operator::Lt,
        x,
        Value::Simplex(Const::Int(10)),
    ))
    .unwrap();

    let known = s.path_condition().known_symbols();
    assert_eq!(known.len(), 1);
    assert_eq!(known[0].1, "root.x");
}
