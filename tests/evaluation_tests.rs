//! Evaluation Tests
//! Three-valued semantics, builtins, folding, equivalence and shared trees

mod common;

use std::sync::Arc;

use common::{binding, doc, eval, formalize, init_tracing, keyspace_row, numbers};
use docql::expression::{fold_constants, remove_expr, Binding, FnMapper, Rewrite, Stringer};
use docql::expression::{BinaryOperator, UnaryOperator};
use docql::{ExecutionContext, Expression, Mapper, Value, ValueType};
use rayon::prelude::*;
use serde_json::json;

// ==================== MISSING / NULL ====================

#[test]
fn test_missing_and_null_propagation() {
    init_tracing();
    let item = doc(json!({"n": 1, "z": null}));
    let plus = |name: &str| {
        Expression::add(
            Expression::field(Expression::SelfRef, name),
            Expression::constant(1i64),
        )
    };
    assert_eq!(eval(&plus("n"), &item), Value::from(2i64));
    assert_eq!(eval(&plus("absent"), &item), Value::Missing);
    assert_eq!(eval(&plus("z"), &item), Value::Null);
}

#[test]
fn test_missing_wins_over_null() {
    let expr = Expression::add(Expression::missing(), Expression::null());
    assert_eq!(eval(&expr, &Value::Missing), Value::Missing);
}

#[test]
fn test_type_mismatch_is_null() {
    let expr = Expression::add(Expression::constant("a"), Expression::constant(1i64));
    assert_eq!(eval(&expr, &Value::Missing), Value::Null);
}

#[test]
fn test_logical_operators_three_valued() {
    let t = Expression::constant(true);
    let f = Expression::constant(false);
    let cases = [
        (Expression::and(vec![Expression::missing(), f.clone()]), Value::Boolean(false)),
        (Expression::and(vec![Expression::missing(), Expression::null()]), Value::Missing),
        (Expression::and(vec![Expression::null(), t.clone()]), Value::Null),
        (Expression::or(vec![Expression::missing(), t.clone()]), Value::Boolean(true)),
        (Expression::or(vec![Expression::missing(), Expression::null()]), Value::Null),
        (Expression::or(vec![Expression::missing(), f.clone()]), Value::Missing),
        (Expression::not(Expression::null()), Value::Null),
    ];
    for (expr, expected) in cases {
        assert_eq!(eval(&expr, &Value::Missing), expected, "{}", expr);
    }
}

#[test]
fn test_comparisons_use_collation() {
    let lt = |a: Value, b: Value| {
        eval(
            &Expression::lt(Expression::Constant(a), Expression::Constant(b)),
            &Value::Missing,
        )
    };
    assert_eq!(lt(Value::Boolean(true), Value::from(0i64)), Value::Boolean(true));
    assert_eq!(lt(Value::from(10i64), Value::from("1")), Value::Boolean(true));
    assert_eq!(lt(Value::from("b"), Value::from("a")), Value::Boolean(false));
    assert_eq!(lt(Value::from(1i64), Value::Null), Value::Null);
}

#[test]
fn test_type_tests() {
    use docql::expression::UnaryOperator;
    let item = doc(json!({"z": null}));
    let test = |op, name: &str| {
        eval(
            &Expression::unary(op, Expression::field(Expression::SelfRef, name)),
            &item,
        )
    };
    assert_eq!(test(UnaryOperator::IsMissing, "a"), Value::Boolean(true));
    assert_eq!(test(UnaryOperator::IsNull, "z"), Value::Boolean(true));
    assert_eq!(test(UnaryOperator::IsValued, "z"), Value::Boolean(false));
    assert_eq!(test(UnaryOperator::IsNotMissing, "z"), Value::Boolean(true));
}

#[test]
fn test_between_and_case() {
    let between = Expression::between(
        Expression::SelfRef,
        Expression::constant(1i64),
        Expression::constant(3i64),
    );
    assert_eq!(eval(&between, &Value::from(2i64)), Value::Boolean(true));
    assert_eq!(eval(&between, &Value::Missing), Value::Missing);

    let case = Expression::simple_case(
        Expression::SelfRef,
        vec![
            (Expression::constant("a"), Expression::constant(1i64)),
            (Expression::constant("b"), Expression::constant(2i64)),
        ],
        None,
    );
    assert_eq!(eval(&case, &Value::from("b")), Value::from(2i64));
    assert_eq!(eval(&case, &Value::from("c")), Value::Null);
}

#[test]
fn test_constructors_drop_or_null_missing() {
    let array = Expression::array(vec![Expression::missing(), Expression::constant(1i64)]);
    assert_eq!(eval(&array, &Value::Missing), doc(json!([null, 1])));

    let object = Expression::object(vec![
        ("a".to_string(), Expression::missing()),
        ("b".to_string(), Expression::null()),
    ]);
    assert_eq!(eval(&object, &Value::Missing), doc(json!({"b": null})));
}

// ==================== Arithmetic Overflow ====================

fn int_op(op: BinaryOperator, x: i64, y: i64) -> Expression {
    Expression::binary(op, Expression::constant(x), Expression::constant(y))
}

#[test]
fn test_integer_division_overflow_is_float() {
    init_tracing();
    let expr = int_op(BinaryOperator::Divide, i64::MIN, -1);
    assert_eq!(eval(&expr, &Value::Missing), Value::from(9.223372036854776e18));
    // exact quotients stay integral
    let exact = int_op(BinaryOperator::Divide, i64::MIN, 2);
    assert_eq!(eval(&exact, &Value::Missing), Value::from(i64::MIN / 2));
}

#[test]
fn test_integer_modulus_overflow() {
    let expr = int_op(BinaryOperator::Modulus, i64::MIN, -1);
    assert_eq!(eval(&expr, &Value::Missing), Value::from(0i64));
    let by_zero = int_op(BinaryOperator::Modulus, 7, 0);
    assert_eq!(eval(&by_zero, &Value::Missing), Value::Null);
}

#[test]
fn test_negating_min_integer_is_float() {
    let expr = Expression::unary(UnaryOperator::Negate, Expression::field(Expression::SelfRef, "n"));
    let item = doc(json!({"n": i64::MIN}));
    assert_eq!(eval(&expr, &item), Value::from(9.223372036854776e18));
}

#[test]
fn test_overflow_past_max_integer_is_float() {
    let add = int_op(BinaryOperator::Add, i64::MAX, 1);
    assert_eq!(eval(&add, &Value::Missing), Value::from(9.223372036854776e18));
    let mul = int_op(BinaryOperator::Multiply, i64::MAX, 2);
    assert_eq!(eval(&mul, &Value::Missing), Value::from(1.8446744073709552e19));
    // the float result is not clamped back to i64::MAX
    assert_ne!(eval(&add, &Value::Missing), Value::from(i64::MAX));
}

// ==================== Comprehensions ====================

#[test]
fn test_every_and_first() {
    let every = Expression::every(
        binding("v", numbers(&[2, 4])),
        Expression::eq(
            Expression::binary(
                docql::expression::BinaryOperator::Modulus,
                Expression::ident("v"),
                Expression::constant(2i64),
            ),
            Expression::constant(0i64),
        ),
    );
    assert_eq!(eval(&every, &Value::Missing), Value::Boolean(true));

    let first = Expression::first_for(
        Expression::add(Expression::ident("v"), Expression::constant(10i64)),
        binding("v", numbers(&[1, 2, 3])),
        Some(Expression::gt(Expression::ident("v"), Expression::constant(1i64))),
    );
    assert_eq!(eval(&first, &Value::Missing), Value::from(12i64));
}

#[test]
fn test_comprehension_over_non_array() {
    let any = Expression::any(
        binding("v", Expression::field(Expression::SelfRef, "x")),
        Expression::constant(true),
    );
    assert_eq!(eval(&any, &doc(json!({}))), Value::Missing);
    assert_eq!(eval(&any, &doc(json!({"x": 3}))), Value::Null);
}

// ==================== Builtins ====================

#[test]
fn test_function_missing_null_policy() {
    let lower = Expression::function("lower", vec![Expression::SelfRef]).unwrap();
    assert_eq!(eval(&lower, &Value::Missing), Value::Missing);
    assert_eq!(eval(&lower, &Value::Null), Value::Null);
    assert_eq!(eval(&lower, &Value::from("ABC")), Value::from("abc"));

    // OBJECT_ADD sees MISSING arguments itself
    let add = Expression::function(
        "OBJECT_ADD",
        vec![
            Expression::constant(Value::from(json!({"a": 1}))),
            Expression::constant("b"),
            Expression::field(Expression::SelfRef, "nope"),
        ],
    )
    .unwrap();
    assert_eq!(eval(&add, &doc(json!({}))), doc(json!({"a": 1})));
}

#[test]
fn test_ifmissing_and_object_path() {
    let expr = Expression::function(
        "IFMISSING",
        vec![
            Expression::field(Expression::SelfRef, "a"),
            Expression::field(Expression::SelfRef, "b"),
        ],
    )
    .unwrap();
    assert_eq!(eval(&expr, &doc(json!({"b": 2}))), Value::from(2i64));

    let path = Expression::function(
        "OBJECT_PATH",
        vec![Expression::SelfRef, Expression::constant("a.list[0]")],
    )
    .unwrap();
    assert_eq!(eval(&path, &doc(json!({"a": {"list": ["x"]}}))), Value::from("x"));
}

#[test]
fn test_arity_checked_at_construction() {
    let err = Expression::function("LOWER", vec![]).unwrap_err();
    assert!(err.to_string().contains("LOWER"));
    assert!(Expression::function("NO_SUCH", vec![]).is_err());
}

#[test]
fn test_statement_time_is_stable() {
    let now = Expression::function("NOW_MILLIS", vec![]).unwrap();
    assert!(now.is_volatile());
    assert!(now.static_value().is_none());
    let ctx = ExecutionContext::new();
    let first = now.evaluate(&Value::Missing, &ctx).unwrap();
    let second = now.evaluate(&Value::Missing, &ctx).unwrap();
    assert_eq!(first, second);
    assert_eq!(now.value_type(), ValueType::Number);
}

// ==================== Folding and Equivalence ====================

#[test]
fn test_fold_constants() {
    let expr = Expression::and(vec![
        Expression::eq(
            Expression::add(Expression::constant(1i64), Expression::constant(2i64)),
            Expression::constant(3i64),
        ),
        Expression::ident("x"),
    ]);
    let folded = fold_constants(expr).unwrap();
    assert_eq!(
        folded,
        Expression::and(vec![Expression::constant(true), Expression::ident("x")])
    );
}

#[test]
fn test_missing_operand_folds_through_unknown_sibling() {
    let expr = Expression::add(Expression::missing(), Expression::ident("x"));
    assert_eq!(expr.static_value(), Some(Value::Missing));
    // no shortcut for NULL: x may itself be MISSING
    let expr = Expression::add(Expression::null(), Expression::ident("x"));
    assert_eq!(expr.static_value(), None);
}

#[test]
fn test_equivalence_has_no_false_positives() {
    let a = Expression::add(Expression::ident("x"), Expression::constant(1i64));
    let b = Expression::add(Expression::ident("x"), Expression::constant(1i64));
    let c = Expression::add(Expression::constant(1i64), Expression::ident("x"));
    assert!(a.equivalent_to(&b));
    assert!(!a.equivalent_to(&c));

    let now = Expression::function("NOW_MILLIS", vec![]).unwrap();
    assert!(!now.equivalent_to(&now.clone()));

    let folded = Expression::add(Expression::constant(1i64), Expression::constant(2i64));
    assert!(folded.equivalent_to(&Expression::constant(3i64)));
}

#[test]
fn test_remove_conjunct() {
    let x = Expression::gt(Expression::ident("x"), Expression::constant(1i64));
    let y = Expression::lt(Expression::ident("y"), Expression::constant(2i64));
    let both = Expression::and(vec![x.clone(), y.clone()]);
    assert_eq!(remove_expr(both, &x), Some(y));
    assert_eq!(remove_expr(x.clone(), &x), None);
}

// ==================== Visitor / Mapper ====================

#[test]
fn test_stringer_visits_every_child() {
    let expr = Expression::and(vec![
        Expression::eq(Expression::ident("a"), Expression::ident("b")),
        Expression::function("LOWER", vec![Expression::ident("c")]).unwrap(),
    ]);
    assert_eq!(
        Stringer::format(&expr),
        "((`a` = `b`) and lower(`c`))"
    );
}

#[test]
fn test_fn_mapper_replace_and_descend() {
    let expr = Expression::add(Expression::ident("a"), Expression::ident("b"));
    let mut renamer = FnMapper::new(|e: Expression| {
        Ok(match e {
            Expression::Identifier(ident) if ident.name == "a" => {
                Rewrite::Replace(Expression::constant(10i64))
            }
            other => Rewrite::Descend(other),
        })
    });
    let mapped = renamer.map(expr).unwrap();
    assert_eq!(
        mapped,
        Expression::add(Expression::constant(10i64), Expression::ident("b"))
    );
}

// ==================== Shared Trees ====================

#[test]
fn test_formalized_tree_shared_across_threads() {
    let expr = formalize(
        "b",
        Expression::and(vec![
            Expression::like(Expression::ident("name"), Expression::constant("a%"), None).unwrap(),
            Expression::any(
                vec![Binding::new("t", Expression::ident("tags"))],
                Expression::eq(Expression::ident("t"), Expression::constant("x")),
            ),
        ]),
    )
    .unwrap();
    let expr = Arc::new(expr);

    let matches: usize = (0..200)
        .into_par_iter()
        .map(|i| {
            // one execution context per worker
            let ctx = ExecutionContext::new();
            let name = if i % 2 == 0 { "alice" } else { "bob" };
            let row = keyspace_row("b", json!({"name": name, "tags": ["x"]}));
            let v = expr.evaluate(&row, &ctx).unwrap();
            usize::from(v == Value::Boolean(true))
        })
        .sum();
    assert_eq!(matches, 100);
}
