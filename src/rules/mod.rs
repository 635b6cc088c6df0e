//! Trigger rule engine.
//!
//! A rule is a (trigger-origin pattern, parameter-origin pattern, trigger
//! method) triple. When a symbolic reference is about to be resolved as an
//! alias of a pre-existing heap object, every rule whose trigger pattern
//! matches that object's origin fires: the engine locates the rule's
//! designated parameter object and schedules the trigger method.
//!
//! Patterns compile to a small token AST (literal / wildcard-capture /
//! end-anchor) matched exactly against canonical origin text; relative
//! patterns additionally carry navigate-up and back-reference tokens that
//! are resolved against the firing reference's origin before matching.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, FrozenStateViolation, RuleError};
use crate::state::{MethodSig, State};
use crate::value::{Origin, SymbolicRef, Value};

/// Wildcard: matches any substring, captured for back-reference.
pub const TOK_ANY: &str = "{R_ANY}";
/// End-of-path anchor.
pub const TOK_EOL: &str = "{EOL}";
/// Navigate-up: cancels the nearest preceding path segment.
pub const TOK_UP: &str = "{UP}";
/// The origin of the reference that fired the rule.
pub const TOK_REF: &str = "{$REF}";
/// Back-reference to the trigger pattern's wildcard capture.
pub const TOK_BACKREF_ANY: &str = "{$R_ANY}";

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatTok {
    Lit(String),
    Any,
    End,
}

/// A compiled absolute origin pattern. Compilation is a pure function of the
/// pattern text: compiling the same text twice yields patterns matching
/// exactly the same origin strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginPattern {
    source: String,
    toks: Vec<PatTok>,
}

impl OriginPattern {
    pub fn compile(text: &str) -> Result<OriginPattern, RuleError> {
        if text.is_empty() {
            return Err(RuleError::EmptyPattern);
        }
        let mut toks = Vec::new();
        let mut lit = String::new();
        let mut rest = text;
        while !rest.is_empty() {
            if rest.starts_with('{') {
                if let Some(tail) = rest.strip_prefix(TOK_ANY) {
                    if !lit.is_empty() {
                        toks.push(PatTok::Lit(std::mem::take(&mut lit)));
                    }
                    toks.push(PatTok::Any);
                    rest = tail;
                } else if let Some(tail) = rest.strip_prefix(TOK_EOL) {
                    if !lit.is_empty() {
                        toks.push(PatTok::Lit(std::mem::take(&mut lit)));
                    }
                    toks.push(PatTok::End);
                    rest = tail;
                } else if rest.starts_with(TOK_UP)
                    || rest.starts_with(TOK_REF)
                    || rest.starts_with(TOK_BACKREF_ANY)
                {
                    return Err(RuleError::MalformedPattern {
                        pattern: text.to_string(),
                        reason: "relative token in absolute position".to_string(),
                    });
                } else {
                    let at: String = rest.chars().take(12).collect();
                    return Err(RuleError::MalformedPattern {
                        pattern: text.to_string(),
                        reason: format!("unknown token at `{at}`"),
                    });
                }
            } else {
                let c = rest.chars().next().unwrap_or('\0');
                lit.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
        if !lit.is_empty() {
            toks.push(PatTok::Lit(lit));
        }
        Ok(OriginPattern {
            source: text.to_string(),
            toks,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Exact full match against canonical origin text; on success returns the
    /// wildcard captures in order. Wildcards capture greedily (longest match
    /// first), as a regular-expression `(.*)` would.
    pub fn match_origin(&self, origin_text: &str) -> Option<Vec<String>> {
        let mut caps = Vec::new();
        if match_toks(&self.toks, origin_text, &mut caps) {
            Some(caps)
        } else {
            None
        }
    }

    pub fn matches(&self, origin: &Origin) -> bool {
        self.match_origin(&origin.to_string()).is_some()
    }

    /// The wildcard capture a relative rule resolves against: defined only
    /// when the pattern opens with a wildcard and matches `origin_text`.
    pub fn leading_capture(&self, origin_text: &str) -> Option<String> {
        if self.toks.first() != Some(&PatTok::Any) {
            return None;
        }
        self.match_origin(origin_text)
            .and_then(|caps| caps.into_iter().next())
    }
}

fn match_toks(toks: &[PatTok], s: &str, caps: &mut Vec<String>) -> bool {
    match toks.first() {
        None => s.is_empty(),
        Some(PatTok::Lit(l)) => match s.strip_prefix(l.as_str()) {
            Some(rest) => match_toks(&toks[1..], rest, caps),
            None => false,
        },
        Some(PatTok::End) => s.is_empty() && match_toks(&toks[1..], s, caps),
        Some(PatTok::Any) => {
            let mut boundaries: Vec<usize> = s.char_indices().map(|(i, _)| i).collect();
            boundaries.push(s.len());
            for split in boundaries.into_iter().rev() {
                caps.push(s[..split].to_string());
                if match_toks(&toks[1..], &s[split..], caps) {
                    return true;
                }
                caps.pop();
            }
            false
        }
    }
}

/// Cancels every `.segment.{UP}` pair in `text`, repeatedly to a fixed
/// point. A segment is a maximal dot-free run; pairs are removed leftmost
/// first, and the result is independent of invoking the reducer again.
pub fn cancel_up(text: &str) -> String {
    let mut s = text.to_string();
    loop {
        let Some(removed) = cancel_one_up(&s) else {
            return s;
        };
        s = removed;
    }
}

fn cancel_one_up(s: &str) -> Option<String> {
    let mut search_from = 0;
    while let Some(rel) = s[search_from..].find(TOK_UP) {
        let up_at = search_from + rel;
        // The token must be preceded by ".segment." with a dot-free segment.
        if up_at >= 2 && s.as_bytes()[up_at - 1] == b'.' {
            let before_dot = &s[..up_at - 1];
            if let Some(seg_dot) = before_dot.rfind('.') {
                if seg_dot + 1 < up_at - 1 {
                    let mut out = String::with_capacity(s.len());
                    out.push_str(&s[..seg_dot]);
                    out.push_str(&s[up_at + TOK_UP.len()..]);
                    return Some(out);
                }
            }
        }
        search_from = up_at + TOK_UP.len();
    }
    None
}

/// Resolves a relative parameter pattern into absolute pattern text:
/// substitutes the trigger pattern's wildcard capture into `{$R_ANY}`,
/// replaces `{$REF}` with the firing reference's origin, then cancels
/// navigate-up pairs.
pub fn resolve_relative(
    relative: &str,
    firing: &SymbolicRef,
    trigger_pattern: &OriginPattern,
) -> String {
    let origin_text = firing.origin.to_string();
    let specialized = match trigger_pattern.leading_capture(&origin_text) {
        Some(cap) => relative.replace(TOK_BACKREF_ANY, &cap),
        None => relative.to_string(),
    };
    cancel_up(&specialized.replace(TOK_REF, &origin_text))
}

/// Textual rule configuration, as a driver reads it from a settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub trigger_origin: String,
    pub parameter_origin: String,
    pub trigger_method: MethodSig,
}

/// A compiled trigger rule.
#[derive(Debug, Clone)]
pub struct TriggerRule {
    trigger_pattern: OriginPattern,
    parameter_text: String,
    pub trigger_method: MethodSig,
}

impl TriggerRule {
    pub fn compile(spec: &RuleSpec) -> Result<TriggerRule, RuleError> {
        let trigger_pattern = OriginPattern::compile(&spec.trigger_origin)?;
        // Surface malformed parameter patterns now, before any state exists:
        // substitute stand-in segments for the relative tokens and compile.
        // Navigate-up depth depends on the firing origin, so `{UP}` is
        // checked as a plain segment rather than cancelled here.
        let stand_in = spec
            .parameter_origin
            .replace(TOK_BACKREF_ANY, "root.seg")
            .replace(TOK_REF, "root.seg")
            .replace(TOK_UP, "seg");
        OriginPattern::compile(&stand_in).map_err(|e| match e {
            RuleError::EmptyPattern => RuleError::EmptyPattern,
            RuleError::MalformedPattern { reason, .. } => RuleError::MalformedPattern {
                pattern: spec.parameter_origin.clone(),
                reason,
            },
        })?;
        Ok(TriggerRule {
            trigger_pattern,
            parameter_text: spec.parameter_origin.clone(),
            trigger_method: spec.trigger_method.clone(),
        })
    }

    /// Does an alias assumption on an object with `target_origin` satisfy
    /// this rule?
    pub fn matches_target(&self, target_origin: &Origin) -> bool {
        self.trigger_pattern.matches(target_origin)
    }

    /// Does `candidate_origin` identify this rule's trigger parameter for a
    /// firing on `firing`?
    pub fn is_trigger_parameter_object(
        &self,
        firing: &SymbolicRef,
        candidate_origin: &Origin,
    ) -> Result<bool, EngineError> {
        let absolute = resolve_relative(&self.parameter_text, firing, &self.trigger_pattern);
        // Compilation was validated at setup; failure here is an engine
        // defect, not a user error.
        let pattern = OriginPattern::compile(&absolute).map_err(|e| {
            EngineError::Fatal(format!(
                "parameter pattern `{}` failed after resolution: {e}",
                self.parameter_text
            ))
        })?;
        Ok(pattern.matches(candidate_origin))
    }
}

/// Searches for the actual parameter of a trigger rule: the first object in
/// `state`'s path-condition "expands" clauses, in path-condition order,
/// whose origin matches the rule's parameter pattern. First match wins; when
/// multiple heap objects satisfy the rule equally this is a known
/// limitation, preserved deliberately. Returns `None` when no such object
/// exists yet (the rule does not fire this round).
pub fn find_trigger_parameter_object(
    rule: &TriggerRule,
    firing: &SymbolicRef,
    state: &State,
) -> Result<Option<Value>, EngineError> {
    if state.is_frozen() {
        return Err(EngineError::Frozen(FrozenStateViolation {
            state_id: state.identifier().to_string(),
        }));
    }
    for (heap_pos, reference, _type_name) in state.path_condition().expansions() {
        if rule.is_trigger_parameter_object(firing, &reference.origin)? {
            return Ok(Some(Value::ReferenceConcrete(Some(heap_pos))));
        }
    }
    Ok(None)
}

/// An ordered, setup-time-compiled collection of trigger rules.
#[derive(Debug, Clone, Default)]
pub struct TriggerRuleSet {
    rules: Vec<TriggerRule>,
}

impl TriggerRuleSet {
    pub fn empty() -> TriggerRuleSet {
        TriggerRuleSet::default()
    }

    /// Compiles the whole rule list; the first malformed pattern fails the
    /// setup, before any state is touched.
    pub fn compile(specs: &[RuleSpec]) -> Result<TriggerRuleSet, RuleError> {
        let rules = specs
            .iter()
            .map(TriggerRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TriggerRuleSet { rules })
    }

    pub fn rules(&self) -> &[TriggerRule] {
        &self.rules
    }

    /// The ordered trigger method invocations an alias resolution fires:
    /// every rule matching the aliased object's origin that also finds its
    /// parameter object. Deterministic for a fixed path condition.
    pub fn triggers_to_fire(
        &self,
        firing: &SymbolicRef,
        target_origin: &Origin,
        state: &State,
    ) -> Result<Vec<(MethodSig, Value)>, EngineError> {
        let mut out = Vec::new();
        for rule in &self.rules {
            if !rule.matches_target(target_origin) {
                continue;
            }
            match find_trigger_parameter_object(rule, firing, state)? {
                Some(parameter) => {
                    debug!(
                        method = %rule.trigger_method,
                        firing = %firing.origin,
                        "trigger rule fires"
                    );
                    out.push((rule.trigger_method.clone(), parameter));
                }
                None => {
                    // No parameter object known yet; the rule may fire later
                    // as more objects enter the path condition.
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_is_pure() {
        let a = OriginPattern::compile("root.list.element[{R_ANY}]").unwrap();
        let b = OriginPattern::compile("root.list.element[{R_ANY}]").unwrap();
        assert_eq!(a, b);
        for origin in ["root.list.element[3]", "root.list.element[{V2}]", "root.list"] {
            assert_eq!(
                a.match_origin(origin).is_some(),
                b.match_origin(origin).is_some()
            );
        }
    }

    #[test]
    fn test_wildcard_captures_greedily() {
        let p = OriginPattern::compile("{R_ANY}.owner").unwrap();
        let caps = p.match_origin("root.a.owner.owner").unwrap();
        // Longest capture, as (.*) would take it.
        assert_eq!(caps, vec!["root.a.owner".to_string()]);
    }

    #[test]
    fn test_end_anchor() {
        let p = OriginPattern::compile("root.x{EOL}").unwrap();
        assert!(p.match_origin("root.x").is_some());
        assert!(p.match_origin("root.xy").is_none());
    }

    #[test]
    fn test_malformed_patterns_fail_at_compile() {
        assert!(matches!(
            OriginPattern::compile(""),
            Err(RuleError::EmptyPattern)
        ));
        assert!(matches!(
            OriginPattern::compile("root.{BOGUS}"),
            Err(RuleError::MalformedPattern { .. })
        ));
        assert!(matches!(
            OriginPattern::compile("root.{UP}"),
            Err(RuleError::MalformedPattern { .. })
        ));
    }

    #[test]
    fn test_up_cancellation_fixed_point() {
        // N pairs strip regardless of where they appear.
        assert_eq!(cancel_up("root.a.{UP}.b.{UP}.c"), "root.c");
        assert_eq!(cancel_up("root.a.b.{UP}.{UP}.c"), "root.c");
        // Re-invoking beyond the fixed point changes nothing.
        let once = cancel_up("root.a.b.{UP}.{UP}.c");
        assert_eq!(cancel_up(&once), once);
        // Nothing to cancel: identity.
        assert_eq!(cancel_up("root.a.b"), "root.a.b");
    }

    #[test]
    fn test_relative_resolution_composes_against_firing_origin() {
        let trigger = OriginPattern::compile("{R_ANY}.list.element[3]").unwrap();
        let firing = SymbolicRef {
            id: 0,
            origin: Origin::root("root").field("list").element("3"),
            type_name: "T".into(),
        };
        // "the field `owner` of the object two segments above the element"
        let abs = resolve_relative("{$REF}.{UP}.owner", &firing, &trigger);
        assert_eq!(abs, "root.list.owner");
        // Back-reference substitution.
        let abs = resolve_relative("{$R_ANY}.owner", &firing, &trigger);
        assert_eq!(abs, "root.owner");
    }

    #[test]
    fn test_compile_accepts_relative_parameter_patterns() {
        // Navigate-up and back-reference tokens resolve per firing origin;
        // compiling the rule itself must not reject them.
        for param in ["{$REF}.{UP}.owner", "{$REF}.{UP}.{UP}.owner", "{$R_ANY}.owner"] {
            let rule = TriggerRule::compile(&RuleSpec {
                trigger_origin: "{R_ANY}.list.element[3]".into(),
                parameter_origin: param.into(),
                trigger_method: MethodSig::new("Hooks", "onAlias"),
            });
            assert!(rule.is_ok(), "rejected `{param}`");
        }
    }

    #[test]
    fn test_rule_specs_load_from_json() {
        let text = r#"[
            {
                "trigger_origin": "root.list.element[{R_ANY}]",
                "parameter_origin": "root.owner",
                "trigger_method": { "class": "Owner", "name": "touch" }
            }
        ]"#;
        let specs: Vec<RuleSpec> = serde_json::from_str(text).unwrap();
        let rules = TriggerRuleSet::compile(&specs).unwrap();
        assert_eq!(rules.rules().len(), 1);
        assert_eq!(
            rules.rules()[0].trigger_method,
            MethodSig::new("Owner", "touch")
        );
    }

    #[test]
    fn test_parameter_search_returns_the_earliest_expansion() {
        let mut state = State::new("s0");
        let r_a = state
            .symbolic_ref_for(Origin::root("root").field("a"), "T")
            .unwrap();
        let a_pos = state.assume_expands(r_a, "T").unwrap();
        let r_b = state
            .symbolic_ref_for(Origin::root("root").field("b"), "T")
            .unwrap();
        state.assume_expands(r_b, "T").unwrap();

        // Both expansions satisfy the parameter pattern; path-condition
        // order decides, first match wins.
        let rule = TriggerRule::compile(&RuleSpec {
            trigger_origin: "root.{R_ANY}".into(),
            parameter_origin: "root.{R_ANY}".into(),
            trigger_method: MethodSig::new("Hooks", "onAlias"),
        })
        .unwrap();
        let firing = SymbolicRef {
            id: 9,
            origin: Origin::root("root").field("p"),
            type_name: "T".into(),
        };
        let found = find_trigger_parameter_object(&rule, &firing, &state).unwrap();
        assert_eq!(found, Some(Value::ReferenceConcrete(Some(a_pos))));
    }

    #[test]
    fn test_firing_on_a_matched_element_finds_the_owner_object() {
        let mut state = State::new("s0");
        let r_elem = state
            .symbolic_ref_for(Origin::root("root").field("list").element("3"), "T")
            .unwrap();
        state.assume_expands(r_elem.clone(), "T").unwrap();
        let r_owner = state
            .symbolic_ref_for(Origin::root("root").field("owner"), "Owner")
            .unwrap();
        let owner_pos = state.assume_expands(r_owner, "Owner").unwrap();

        let rules = TriggerRuleSet::compile(&[RuleSpec {
            trigger_origin: "root.list.element[{R_ANY}]".into(),
            parameter_origin: "root.owner".into(),
            trigger_method: MethodSig::new("Owner", "touch"),
        }])
        .unwrap();
        let fires = rules
            .triggers_to_fire(&r_elem, &Origin::root("root").field("list").element("3"), &state)
            .unwrap();
        assert_eq!(
            fires,
            vec![(
                MethodSig::new("Owner", "touch"),
                Value::ReferenceConcrete(Some(owner_pos))
            )]
        );
    }

    #[test]
    fn test_frozen_state_is_rejected_by_the_parameter_search() {
        let mut state = State::new("s0");
        let r_a = state
            .symbolic_ref_for(Origin::root("root").field("a"), "T")
            .unwrap();
        state.assume_expands(r_a, "T").unwrap();
        state.freeze();

        let rule = TriggerRule::compile(&RuleSpec {
            trigger_origin: "root.{R_ANY}".into(),
            parameter_origin: "root.a".into(),
            trigger_method: MethodSig::new("Hooks", "onAlias"),
        })
        .unwrap();
        let firing = SymbolicRef {
            id: 9,
            origin: Origin::root("root").field("p"),
            type_name: "T".into(),
        };
        assert!(matches!(
            find_trigger_parameter_object(&rule, &firing, &state),
            Err(EngineError::Frozen(_))
        ));
    }

    #[test]
    fn test_ruleset_compile_rejects_bad_parameter_pattern() {
        let specs = vec![RuleSpec {
            trigger_origin: "root.list.element[{R_ANY}]".into(),
            parameter_origin: "root.{WHAT}".into(),
            trigger_method: MethodSig::new("Hooks", "onAlias"),
        }];
        assert!(TriggerRuleSet::compile(&specs).is_err());
    }
}
