//! Formalizer Tests
//! Scope resolution, binding scopes and identifier classification

mod common;

use common::{binding, doc, eval, formalize, init_tracing, keyspace_row, numbers};
use docql::expression::{Binding, Comprehension};
use docql::{ExprError, Expression, Formalizer, IdentFlags, Location, Mapper, Value};
use serde_json::json;

fn comprehension(expr: &Expression) -> &Comprehension {
    match expr {
        Expression::Comprehension(c) => c,
        other => panic!("expected comprehension, got {:?}", other),
    }
}

// ==================== Identifier Resolution ====================

#[test]
fn test_bare_identifier_becomes_keyspace_field() {
    init_tracing();
    let out = formalize("b", Expression::ident("x")).unwrap();
    assert_eq!(out, Expression::field(Expression::keyspace("b"), "x"));
    assert_eq!(out.to_string(), "`b`.`x`");
}

#[test]
fn test_formalized_tree_evaluates_against_keyspace_row() {
    let expr = Expression::and(vec![
        Expression::gt(Expression::ident("age"), Expression::constant(18i64)),
        Expression::eq(
            Expression::field(Expression::ident("b"), "city"),
            Expression::constant("Paris"),
        ),
    ]);
    let out = formalize("b", expr).unwrap();

    let row = keyspace_row("b", json!({"age": 30, "city": "Paris"}));
    assert_eq!(eval(&out, &row), Value::Boolean(true));
    let row = keyspace_row("b", json!({"city": "Paris"}));
    assert_eq!(eval(&out, &row), Value::Missing);
}

#[test]
fn test_unresolvable_identifier_without_keyspace() {
    let err = formalize("", Expression::ident("x")).unwrap_err();
    assert_eq!(err.to_string(), "Ambiguous reference to field 'x'");
    assert!(err.is_semantic());
}

#[test]
fn test_error_carries_location() {
    let ident = docql::expression::Identifier::new("x").with_location(docql::Location::new(3, 7));
    let err = formalize("", Expression::Identifier(ident)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Ambiguous reference to field 'x' - at line 3, column 7"
    );
}

// ==================== Comprehension Scopes ====================

#[test]
fn test_any_binds_variable_only_in_satisfies() {
    init_tracing();
    let expr = Expression::any(
        binding("v", numbers(&[1, 2, 3])),
        Expression::gt(Expression::ident("v"), Expression::constant(1i64)),
    );
    let mut f = Formalizer::new("b", None);
    let out = f.formalize(expr).unwrap();

    let c = comprehension(&out);
    // the literal source is untouched
    assert_eq!(c.bindings[0].expression, numbers(&[1, 2, 3]));
    let Expression::BinaryOp { left, .. } = &c.mapping else {
        panic!("expected comparison");
    };
    let Expression::Identifier(v) = left.as_ref() else {
        panic!("expected bound variable");
    };
    assert!(v.is_binding_variable());

    // v is gone once the comprehension is closed
    assert!(f.allowed().lookup("v").is_none());
    assert_eq!(
        f.formalize(Expression::ident("v")).unwrap(),
        Expression::field(Expression::keyspace("b"), "v")
    );

    assert_eq!(eval(&out, &Value::Missing), Value::Boolean(true));
}

#[test]
fn test_binding_source_resolves_in_outer_scope() {
    let expr = Expression::array_for(
        Expression::ident("v"),
        binding("v", Expression::ident("v")),
        None,
    );
    let out = formalize("b", expr).unwrap();
    let c = comprehension(&out);
    // the source `v` is the keyspace field, the mapping is the variable
    assert_eq!(
        c.bindings[0].expression,
        Expression::field(Expression::keyspace("b"), "v")
    );
    let Expression::Identifier(v) = &c.mapping else {
        panic!("expected variable");
    };
    assert!(v.is_binding_variable());

    let row = keyspace_row("b", json!({"v": [1, 2]}));
    assert_eq!(eval(&out, &row), doc(json!([1, 2])));
}

#[test]
fn test_duplicate_variable_at_same_level() {
    let expr = Expression::any(
        vec![
            Binding::new("v", numbers(&[1])),
            Binding::new("v", numbers(&[2])),
        ],
        Expression::constant(true),
    );
    let err = formalize("b", expr).unwrap_err();
    assert!(matches!(err, ExprError::DuplicateVariable { ref name, .. } if name == "v"));
}

#[test]
fn test_duplicate_variable_reports_declaration_position() {
    let expr = Expression::every(
        vec![
            Binding::new("v", numbers(&[1])).with_location(Location::new(1, 7)),
            Binding::new("v", numbers(&[2])).with_location(Location::new(2, 5)),
        ],
        Expression::constant(true),
    );
    let err = formalize("b", expr).unwrap_err();
    assert!(err.is_semantic());
    assert_eq!(
        err.to_string(),
        "Duplicate variable 'v' already in scope - at line 2, column 5"
    );
}

#[test]
fn test_name_variable_clashes_with_value_variable() {
    let expr = Expression::any(
        vec![Binding::new("v", numbers(&[1])).with_name_variable("v")],
        Expression::constant(true),
    );
    assert!(matches!(
        formalize("b", expr),
        Err(ExprError::DuplicateVariable { .. })
    ));
}

#[test]
fn test_nested_scope_may_shadow() {
    // ANY v IN [[1, 2]] SATISFIES (ANY v IN v SATISFIES v = 2 END) END
    let inner = Expression::any(
        binding("v", Expression::ident("v")),
        Expression::eq(Expression::ident("v"), Expression::constant(2i64)),
    );
    let outer = Expression::any(
        binding("v", Expression::array(vec![numbers(&[1, 2])])),
        inner,
    );
    let out = formalize("b", outer).unwrap();
    assert_eq!(eval(&out, &Value::Missing), Value::Boolean(true));
}

#[test]
fn test_failed_push_leaves_scopes_balanced() {
    let mut f = Formalizer::new("b", None);
    let bad = Expression::any(
        vec![
            Binding::new("v", numbers(&[1])),
            Binding::new("v", numbers(&[2])),
        ],
        Expression::constant(true),
    );
    assert!(f.formalize(bad).is_err());
    assert_eq!(f.allowed().depth(), 1);
    assert_eq!(f.identifiers().depth(), 1);
    assert_eq!(f.aliases().depth(), 1);
}

#[test]
fn test_free_identifier_propagates_to_parent_level() {
    let mut f = Formalizer::new("b", None);
    let mut outer = binding("u", Expression::ident("arr"));
    f.push_bindings(&mut outer, true).unwrap();

    // ANY v IN u SATISFIES v = u END, formalized inside the u level
    let inner = Expression::any(
        binding("v", Expression::ident("u")),
        Expression::eq(Expression::ident("v"), Expression::ident("u")),
    );
    f.formalize(inner).unwrap();

    let level = f.identifiers().current();
    assert_eq!(level.get("u"), Some(IdentFlags::IS_VARIABLE));
    assert!(!level.contains("v"));

    f.pop_bindings();
    // u is defined by the popped level, so it stops there
    assert!(!f.identifiers().current().contains("u"));
    assert!(f.identifiers().current().contains("b"));
}

#[test]
fn test_object_comprehension_scopes_name_and_value() {
    // OBJECT "k": i FOR i:v IN [7, 8] WHEN v > 7 END
    let expr = Expression::object_for(
        Expression::constant("k"),
        Expression::ident("i"),
        vec![Binding::new("v", numbers(&[7, 8])).with_name_variable("i")],
        Some(Expression::gt(Expression::ident("v"), Expression::constant(7i64))),
    );
    let mut f = Formalizer::new("b", None);
    let out = f.formalize(expr).unwrap();
    assert!(f.allowed().lookup("i").is_none());
    assert_eq!(eval(&out, &Value::Missing), doc(json!({"k": 1})));
}

// ==================== Copy ====================

#[test]
fn test_copy_formalizes_identically() {
    let mut original = Formalizer::new("b", None);
    original.set_allowed_unnest_alias("u");
    let mut copy = original.copy();

    let expr = Expression::any(
        binding("v", Expression::field(Expression::ident("u"), "tags")),
        Expression::eq(Expression::ident("v"), Expression::ident("tag")),
    );
    let a = original.formalize(expr.clone()).unwrap();
    let b = copy.formalize(expr).unwrap();
    assert_eq!(a, b);
    assert!(a.equivalent_to(&b));
}

#[test]
fn test_copy_is_independent() {
    let mut original = Formalizer::new("b", None);
    let mut copy = original.copy();
    copy.set_allowed_alias("extra", true);
    copy.formalize(Expression::ident("extra")).unwrap();

    assert!(original.allowed().lookup("extra").is_none());
    assert!(!original.identifiers().current().contains("extra"));
    assert_eq!(
        original.formalize(Expression::ident("extra")).unwrap(),
        Expression::field(Expression::keyspace("b"), "extra")
    );
}

// ==================== META ====================

#[test]
fn test_zero_argument_meta() {
    let out = formalize("b", Expression::function("META", vec![]).unwrap()).unwrap();
    assert_eq!(
        out,
        Expression::function("META", vec![Expression::keyspace("b")]).unwrap()
    );
    assert_eq!(out.to_string(), "meta(`b`)");

    let row = keyspace_row("b", json!({"@meta": {"id": "k1"}}));
    let id = Expression::field(out, "id");
    assert_eq!(eval(&id, &row), Value::from("k1"));

    let err = formalize("", Expression::function("META", vec![]).unwrap()).unwrap_err();
    assert!(matches!(err, ExprError::AmbiguousMeta { .. }));
}

#[test]
fn test_search_score_reads_search_output() {
    let out = formalize("b", Expression::function("SEARCH_SCORE", vec![]).unwrap()).unwrap();
    let row = keyspace_row("b", json!({"out": {"@smeta": {"score": 1.5}}}));
    assert_eq!(eval(&out, &row), Value::from(1.5));
}

// ==================== Mapper Contract ====================

#[test]
fn test_formalizer_is_a_mapper() {
    let mut f = Formalizer::new("b", None);
    let mapped = f.map(Expression::ident("x")).unwrap();
    assert_eq!(mapped, Expression::field(Expression::keyspace("b"), "x"));
}

#[test]
fn test_constants_pass_through() {
    let expr = Expression::add(Expression::constant(1i64), Expression::constant(2i64));
    assert_eq!(formalize("", expr.clone()).unwrap(), expr);
}
