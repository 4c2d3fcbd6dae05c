//! Expression parsing and evaluation for parameter constraints
//!
//! Expressions are parsed once into an AST and then interpreted on every
//! evaluation: each variable is looked up by name in an [`EvaluationContext`].
//! The grammar follows the usual precedence rules:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := factor (('*' | '/') factor)*
//! factor  := ('-' | '+') factor | power
//! power   := primary (('^' | '**') factor)?
//! primary := number | ident '(' args ')' | ident | '(' expr ')'
//! ```
//!
//! Binary operators of equal precedence associate to the left, so
//! `1 - a - b` evaluates as `(1 - a) - b`. Exponentiation associates to the
//! right.

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, multispace0},
    combinator::recognize,
    error::ErrorKind,
    multi::many0,
    number::complete::double,
    sequence::pair,
    IResult, Parser,
};
use std::collections::HashMap;
use thiserror::Error;

/// Error that can occur during expression parsing or evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Failed to parse expression: {message}")]
    ParseError { message: String },

    #[error("Undefined variable: {name}")]
    UndefinedVariable { name: String },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("Undefined function: {name}")]
    UndefinedFunction { name: String },

    #[error("Circular reference while resolving '{name}'")]
    CircularReference { name: String },
}

/// Result type for expression evaluation
type ExprResult<T> = Result<T, ExpressionError>;

/// Expression AST node
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Constant number
    Number(f64),

    /// Variable reference
    Variable(String),

    /// Unary operations
    Unary(UnaryOp, Box<Expression>),

    /// Binary operations
    Binary(BinaryOp, Box<Expression>, Box<Expression>),

    /// Function call
    Function(String, Vec<Expression>),
}

/// Unary operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    /// Negation (-)
    Neg,
}

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    /// Addition (+)
    Add,

    /// Subtraction (-)
    Sub,

    /// Multiplication (*)
    Mul,

    /// Division (/)
    Div,

    /// Power (^ or **)
    Pow,
}

/// Context for expression evaluation, providing variable values
pub trait EvaluationContext {
    /// Get the value of a variable
    fn get_variable(&self, name: &str) -> ExprResult<f64>;

    /// Check if a variable exists
    fn has_variable(&self, name: &str) -> bool;
}

/// Simple implementation of EvaluationContext using a HashMap
#[derive(Debug, Clone, Default)]
pub struct SimpleContext {
    variables: HashMap<String, f64>,
}

impl SimpleContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a variable value
    pub fn set_variable(&mut self, name: &str, value: f64) {
        self.variables.insert(name.to_string(), value);
    }
}

impl EvaluationContext for SimpleContext {
    fn get_variable(&self, name: &str) -> ExprResult<f64> {
        self.variables
            .get(name)
            .copied()
            .ok_or_else(|| ExpressionError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }
}

/// Named constants available to every expression unless shadowed by a variable.
fn builtin_constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}

fn expect_args(name: &str, args: &[f64], count: usize) -> ExprResult<()> {
    if args.len() != count {
        return Err(ExpressionError::InvalidOperation {
            message: format!("{}() requires {} argument(s), got {}", name, count, args.len()),
        });
    }
    Ok(())
}

fn call_function(name: &str, args: &[f64]) -> ExprResult<f64> {
    let unary: Option<fn(f64) -> f64> = match name {
        "sin" => Some(f64::sin),
        "cos" => Some(f64::cos),
        "tan" => Some(f64::tan),
        "exp" => Some(f64::exp),
        "log" | "ln" => Some(f64::ln),
        "log10" => Some(f64::log10),
        "sqrt" => Some(f64::sqrt),
        "abs" => Some(f64::abs),
        _ => None,
    };
    if let Some(f) = unary {
        expect_args(name, args, 1)?;
        return Ok(f(args[0]));
    }

    match name {
        "max" | "min" => {
            if args.len() < 2 {
                return Err(ExpressionError::InvalidOperation {
                    message: format!("{}() requires at least 2 arguments, got {}", name, args.len()),
                });
            }
            let fold = if name == "max" {
                args.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            } else {
                args.iter().copied().fold(f64::INFINITY, f64::min)
            };
            Ok(fold)
        }
        _ => Err(ExpressionError::UndefinedFunction {
            name: name.to_string(),
        }),
    }
}

impl Expression {
    /// Parse an expression from a string
    pub fn parse(input: &str) -> ExprResult<Self> {
        match expr_parser(input) {
            Ok((remainder, expr)) => {
                if remainder.trim().is_empty() {
                    Ok(expr)
                } else {
                    Err(ExpressionError::ParseError {
                        message: format!("Unexpected trailing characters: '{}'", remainder.trim()),
                    })
                }
            }
            Err(e) => Err(ExpressionError::ParseError {
                message: format!("{:?}", e),
            }),
        }
    }

    /// Evaluate the expression with the given context
    pub fn evaluate<C: EvaluationContext + ?Sized>(&self, context: &C) -> ExprResult<f64> {
        match self {
            Self::Number(n) => Ok(*n),

            Self::Variable(name) => match context.get_variable(name) {
                Err(ExpressionError::UndefinedVariable { .. }) if !context.has_variable(name) => {
                    builtin_constant(name).ok_or_else(|| ExpressionError::UndefinedVariable {
                        name: name.clone(),
                    })
                }
                other => other,
            },

            Self::Unary(UnaryOp::Neg, expr) => Ok(-expr.evaluate(context)?),

            Self::Binary(op, left, right) => {
                let lhs = left.evaluate(context)?;
                let rhs = right.evaluate(context)?;

                match op {
                    BinaryOp::Add => Ok(lhs + rhs),
                    BinaryOp::Sub => Ok(lhs - rhs),
                    BinaryOp::Mul => Ok(lhs * rhs),
                    BinaryOp::Div => {
                        if rhs == 0.0 {
                            Err(ExpressionError::DivisionByZero)
                        } else {
                            Ok(lhs / rhs)
                        }
                    }
                    BinaryOp::Pow => Ok(lhs.powf(rhs)),
                }
            }

            Self::Function(name, args) => {
                let evaluated = args
                    .iter()
                    .map(|arg| arg.evaluate(context))
                    .collect::<ExprResult<Vec<f64>>>()?;
                call_function(name, &evaluated)
            }
        }
    }

    /// Find all variable names used in the expression, sorted and deduplicated
    pub fn variables(&self) -> Vec<String> {
        let mut vars = Vec::new();
        self.collect_variables(&mut vars);
        vars.sort();
        vars.dedup();
        vars
    }

    fn collect_variables(&self, vars: &mut Vec<String>) {
        match self {
            Self::Number(_) => {}
            Self::Variable(name) => vars.push(name.clone()),
            Self::Unary(_, expr) => expr.collect_variables(vars),
            Self::Binary(_, left, right) => {
                left.collect_variables(vars);
                right.collect_variables(vars);
            }
            Self::Function(_, args) => {
                for arg in args {
                    arg.collect_variables(vars);
                }
            }
        }
    }
}

// Parser functions using nom

fn parse_failure(input: &str, kind: ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(input, kind))
}

/// Skip leading whitespace and match a single character
fn symbol(input: &str, c: char) -> IResult<&str, char> {
    let (input, _) = multispace0(input)?;
    char(c).parse(input)
}

/// Parse an identifier (variable or function name)
fn identifier(input: &str) -> IResult<&str, String> {
    let (input, matched) = recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))
    .parse(input)?;
    Ok((input, matched.to_string()))
}

/// Parse a number literal. Identifiers such as `nan_scale` or `inf0` must not
/// be taken as numbers, so a literal has to start with a digit or a dot.
fn number(input: &str) -> IResult<&str, Expression> {
    match input.chars().next() {
        Some(c) if c.is_ascii_digit() || c == '.' => {
            let (input, value) = double(input)?;
            Ok((input, Expression::Number(value)))
        }
        _ => Err(parse_failure(input, ErrorKind::Float)),
    }
}

/// Parse a comma-separated argument list, up to and including the closing paren
fn arguments(input: &str) -> IResult<&str, Vec<Expression>> {
    if let Ok((input, _)) = symbol(input, ')') {
        return Ok((input, Vec::new()));
    }

    let mut args = Vec::new();
    let mut input = input;
    loop {
        let (rest, arg) = expr_parser(input)?;
        args.push(arg);
        if let Ok((rest, _)) = symbol(rest, ',') {
            input = rest;
            continue;
        }
        let (rest, _) = symbol(rest, ')')?;
        return Ok((rest, args));
    }
}

/// Parse a primary expression (number, function call, variable, or parenthesized expression)
fn primary(input: &str) -> IResult<&str, Expression> {
    let (input, _) = multispace0(input)?;

    if let Ok(result) = number(input) {
        return Ok(result);
    }

    if let Ok((rest, name)) = identifier(input) {
        if let Ok((rest, _)) = symbol(rest, '(') {
            let (rest, args) = arguments(rest)?;
            return Ok((rest, Expression::Function(name, args)));
        }
        return Ok((rest, Expression::Variable(name)));
    }

    let (input, _) = symbol(input, '(')?;
    let (input, expr) = expr_parser(input)?;
    let (input, _) = symbol(input, ')')?;
    Ok((input, expr))
}

/// Parse an exponentiation, which binds tighter than unary minus on its left
fn power(input: &str) -> IResult<&str, Expression> {
    let (input, base) = primary(input)?;
    let (after_ws, _) = multispace0(input)?;

    let after_op = if let Some(rest) = after_ws.strip_prefix("**") {
        rest
    } else if let Some(rest) = after_ws.strip_prefix('^') {
        rest
    } else {
        return Ok((input, base));
    };

    let (rest, exponent) = factor(after_op)?;
    Ok((
        rest,
        Expression::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)),
    ))
}

/// Parse a signed factor
fn factor(input: &str) -> IResult<&str, Expression> {
    let (input, _) = multispace0(input)?;

    if let Some(rest) = input.strip_prefix('-') {
        let (rest, operand) = factor(rest)?;
        return Ok((rest, Expression::Unary(UnaryOp::Neg, Box::new(operand))));
    }
    if let Some(rest) = input.strip_prefix('+') {
        return factor(rest);
    }

    power(input)
}

/// Parse a left-associative chain of multiplications and divisions
fn term(input: &str) -> IResult<&str, Expression> {
    let (mut input, mut acc) = factor(input)?;

    loop {
        let (rest, _) = multispace0(input)?;
        let op = if rest.starts_with("**") {
            break;
        } else if rest.starts_with('*') {
            BinaryOp::Mul
        } else if rest.starts_with('/') {
            BinaryOp::Div
        } else {
            break;
        };

        let (rest, right) = factor(&rest[1..])?;
        acc = Expression::Binary(op, Box::new(acc), Box::new(right));
        input = rest;
    }

    Ok((input, acc))
}

/// Parse a left-associative chain of additions and subtractions
fn expr_parser(input: &str) -> IResult<&str, Expression> {
    let (mut input, mut acc) = term(input)?;

    loop {
        let (rest, _) = multispace0(input)?;
        let op = if rest.starts_with('+') {
            BinaryOp::Add
        } else if rest.starts_with('-') {
            BinaryOp::Sub
        } else {
            break;
        };

        let (rest, right) = term(&rest[1..])?;
        acc = Expression::Binary(op, Box::new(acc), Box::new(right));
        input = rest;
    }

    Ok((input, acc))
}
