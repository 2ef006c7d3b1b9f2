use super::ast::Expression;

/// Remove `term` from the conjunction `expr`.
///
/// Only AND boundaries are searched. Returns `None` when nothing is left.
pub fn remove_expr(expr: Expression, term: &Expression) -> Option<Expression> {
    if expr.equivalent_to(term) {
        return None;
    }

    match expr {
        Expression::And(terms) => {
            let mut kept: Vec<Expression> = terms
                .into_iter()
                .filter_map(|t| remove_expr(t, term))
                .collect();
            match kept.len() {
                0 => None,
                1 => kept.pop(),
                _ => Some(Expression::And(kept)),
            }
        }
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(name: &str) -> Expression {
        Expression::eq(
            Expression::field(Expression::ident("b"), name),
            Expression::constant(1i64),
        )
    }

    #[test]
    fn test_remove_conjunct() {
        let expr = Expression::and(vec![term("x"), term("y"), term("z")]);
        let removed = remove_expr(expr, &term("y")).unwrap();
        assert_eq!(removed, Expression::and(vec![term("x"), term("z")]));
    }

    #[test]
    fn test_single_survivor_unwrapped() {
        let expr = Expression::and(vec![term("x"), term("y")]);
        assert_eq!(remove_expr(expr, &term("x")), Some(term("y")));
    }

    #[test]
    fn test_remove_everything() {
        assert_eq!(remove_expr(term("x"), &term("x")), None);
    }

    #[test]
    fn test_or_is_not_searched() {
        let expr = Expression::or(vec![term("x"), term("y")]);
        assert_eq!(remove_expr(expr.clone(), &term("x")), Some(expr));
    }

    #[test]
    fn test_nested_and() {
        let expr = Expression::and(vec![
            term("x"),
            Expression::and(vec![term("y"), term("z")]),
        ]);
        let removed = remove_expr(expr, &term("z")).unwrap();
        assert_eq!(removed, Expression::and(vec![term("x"), term("y")]));
    }
}
