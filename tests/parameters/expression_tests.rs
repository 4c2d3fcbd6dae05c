//! Tests for the Expression parsing and evaluation

use multiexp_rs::parameters::{EvaluationContext, Expression, ExpressionError, SimpleContext};

fn context(vars: &[(&str, f64)]) -> SimpleContext {
    let mut ctx = SimpleContext::new();
    for (name, value) in vars {
        ctx.set_variable(name, *value);
    }
    ctx
}

#[test]
fn test_expression_variables() {
    let expr = Expression::parse("1 - g0_amp0 - g0_amp1").unwrap();
    assert_eq!(expr.variables(), vec!["g0_amp0", "g0_amp1"]);

    let expr = Expression::parse("x * x + y").unwrap();
    assert_eq!(expr.variables(), vec!["x", "y"]);

    assert!(Expression::parse("0.4").unwrap().variables().is_empty());
}

#[test]
fn test_sum_constraint_matches_native_arithmetic() {
    let expr = Expression::parse("1 - a - b").unwrap();
    for (a, b) in [(0.3, 0.3), (0.1, 0.7), (0.123456789, 0.987654321), (0.0, 1.0)] {
        let ctx = context(&[("a", a), ("b", b)]);
        // Bit-identical, not just close
        assert_eq!(expr.evaluate(&ctx).unwrap(), 1.0 - a - b);
    }
}

#[test]
fn test_precedence_and_functions() {
    let ctx = context(&[("x", 2.0), ("y", 3.0)]);
    let eval = |s: &str| Expression::parse(s).unwrap().evaluate(&ctx).unwrap();

    assert_eq!(eval("x + y * 2"), 8.0);
    assert_eq!(eval("(x + y) * 2"), 10.0);
    assert_eq!(eval("2 ^ 3 ^ 2"), 512.0);
    assert_eq!(eval("x ** 2"), 4.0);
    assert_eq!(eval("-x ^ 2"), -4.0);
    assert_eq!(eval("8 / 4 / 2"), 1.0);
    assert_eq!(eval("max(x, y, 1)"), 3.0);
    assert!((eval("exp(-x / y)") - (-2.0f64 / 3.0).exp()).abs() < 1e-15);
    assert!((eval("pi") - std::f64::consts::PI).abs() < 1e-15);
}

#[test]
fn test_expression_errors() {
    assert!(matches!(
        Expression::parse("1 +"),
        Err(ExpressionError::ParseError { .. })
    ));
    assert!(matches!(
        Expression::parse("(a - b"),
        Err(ExpressionError::ParseError { .. })
    ));

    let ctx = context(&[("a", 1.0)]);
    assert!(matches!(
        Expression::parse("a + missing").unwrap().evaluate(&ctx),
        Err(ExpressionError::UndefinedVariable { .. })
    ));
    assert!(matches!(
        Expression::parse("a / 0").unwrap().evaluate(&ctx),
        Err(ExpressionError::DivisionByZero)
    ));
    assert!(matches!(
        Expression::parse("nope(a)").unwrap().evaluate(&ctx),
        Err(ExpressionError::UndefinedFunction { .. })
    ));
}

#[test]
fn test_context_trait() {
    let ctx = context(&[("a", 1.5)]);
    assert!(ctx.has_variable("a"));
    assert!(!ctx.has_variable("b"));
    assert_eq!(ctx.get_variable("a").unwrap(), 1.5);
}
