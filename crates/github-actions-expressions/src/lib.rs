//! GitHub Actions expression parsing and worst-case evaluation.
//!
//! Expressions are parsed into a small AST and then evaluated against an
//! [`Environment`] that models an external attacker: contexts the attacker
//! controls evaluate to [`Wildcard`]s, and contexts that take one of several
//! attacker-choosable values evaluate to [`FlexibleAction`]s.
//!
//! Anything outside of the supported grammar fails to parse; callers are
//! expected to treat failures as "possibly true" (see [`Satisfiability`]).

#![forbid(unsafe_code)]
#![deny(missing_docs)]

use itertools::Itertools;
use pest::{Parser, iterators::Pair};

use self::parser::{ExprParser, Rule};

mod call;
pub mod context;
mod env;
mod eval;

pub use env::Environment;
pub use eval::{EvalError, Evaluation, Evaluator, FlexibleAction, Satisfiability, Wildcard};

// Isolates the ExprParser, Rule and other generated types
// so that we can do `missing_docs` at the top-level.
// See: https://github.com/pest-parser/pest/issues/326
mod parser {
    use pest_derive::Parser;

    /// A parser for GitHub Actions' expression language.
    #[derive(Parser)]
    #[grammar = "expr.pest"]
    pub struct ExprParser;
}

/// Errors produced while parsing an expression.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The input doesn't match the expression grammar.
    #[error("invalid expression: {0}")]
    Syntax(String),
    /// The grammar matched but produced a tree we don't understand.
    #[error("malformed expression tree near {0:?}")]
    Malformed(String),
}

/// Represents a function in a GitHub Actions expression.
///
/// Function names are case-insensitive.
#[derive(Debug)]
pub struct Function<'src>(pub(crate) &'src str);

impl Function<'_> {
    /// Returns the function's name as written.
    pub fn as_str(&self) -> &str {
        self.0
    }
}

impl PartialEq for Function<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(other.0)
    }
}

impl PartialEq<str> for Function<'_> {
    fn eq(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

/// A bare identifier in an expression, e.g. `github.event.issue.title`
/// or `true`.
///
/// Identifiers are case-insensitive.
#[derive(Debug)]
pub struct Identifier<'src>(pub(crate) &'src str);

impl Identifier<'_> {
    /// Returns the identifier as written.
    pub fn as_str(&self) -> &str {
        self.0
    }

    /// Returns true if this identifier is within the `github` context.
    pub fn is_github(&self) -> bool {
        let head = self.0.split('.').next().unwrap_or_default();
        head.eq_ignore_ascii_case("github")
    }

    /// Returns true if this identifier is a boolean keyword.
    pub fn is_boolean(&self) -> bool {
        self.0.eq_ignore_ascii_case("true") || self.0.eq_ignore_ascii_case("false")
    }
}

impl PartialEq for Identifier<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq_ignore_ascii_case(other.0)
    }
}

impl PartialEq<str> for Identifier<'_> {
    fn eq(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

/// Binary operations allowed in an expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    /// `expr && expr`
    And,
    /// `expr || expr`
    Or,
    /// `expr == expr`
    Eq,
    /// `expr != expr`
    Neq,
}

/// Unary operations allowed in an expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnOp {
    /// `!expr`
    Not,
}

/// Represents a GitHub Actions expression.
#[derive(Debug, PartialEq)]
pub enum Expr<'src> {
    /// A number literal.
    Number(f64),
    /// A string literal, with quotes stripped and `''` unescaped.
    String(String),
    /// An identifier, including dotted contexts.
    Identifier(Identifier<'src>),
    /// A function call.
    Call {
        /// The function name, e.g. `foo` in `foo()`.
        func: Function<'src>,
        /// The function's arguments.
        args: Vec<Expr<'src>>,
    },
    /// A binary operation, either logical or a comparison.
    BinOp {
        /// The LHS of the binop.
        lhs: Box<Expr<'src>>,
        /// The binary operator.
        op: BinOp,
        /// The RHS of the binop.
        rhs: Box<Expr<'src>>,
    },
    /// A unary operation. Negation (`!`) is currently the only `UnOp`.
    UnOp {
        /// The unary operator.
        op: UnOp,
        /// The expression to apply the operator to.
        expr: Box<Expr<'src>>,
    },
}

impl<'src> Expr<'src> {
    /// Convenience API for making a boxed `Expr::String`.
    fn string(s: impl Into<String>) -> Box<Self> {
        Self::String(s.into()).into()
    }

    /// Convenience API for making an `Expr::Identifier`.
    fn ident(i: &'src str) -> Self {
        Self::Identifier(Identifier(i))
    }

    /// Returns the contexts referenced anywhere in this expression,
    /// in source order.
    ///
    /// Boolean keywords are not contexts and are never returned.
    pub fn contexts(&self) -> Vec<&str> {
        let mut contexts = vec![];

        match self {
            Expr::Identifier(ident) if !ident.is_boolean() => contexts.push(ident.as_str()),
            Expr::Call { args, .. } => {
                for arg in args {
                    contexts.extend(arg.contexts());
                }
            }
            Expr::BinOp { lhs, rhs, .. } => {
                contexts.extend(lhs.contexts());
                contexts.extend(rhs.contexts());
            }
            Expr::UnOp { expr, .. } => contexts.extend(expr.contexts()),
            _ => {}
        }

        contexts
    }

    /// Parses the given string into an expression.
    ///
    /// The input may be bare (`a == b`) or fenced (`${{ a == b }}`).
    pub fn parse(expr: &'src str) -> Result<Expr<'src>, ParseError> {
        let expr = unfence(expr);

        // Top level `expression` is a single `or_expr`.
        let or_expr = ExprParser::parse(Rule::expression, expr)
            .map_err(|e| ParseError::Syntax(e.to_string()))?
            .next()
            .and_then(|expression| expression.into_inner().next())
            .ok_or_else(|| ParseError::Malformed(expr.into()))?;

        fn next<'a>(
            pairs: &mut impl Iterator<Item = Pair<'a, Rule>>,
            parent: &str,
        ) -> Result<Pair<'a, Rule>, ParseError> {
            pairs
                .next()
                .ok_or_else(|| ParseError::Malformed(parent.into()))
        }

        fn parse_pair(pair: Pair<'_, Rule>) -> Result<Box<Expr<'_>>, ParseError> {
            // The grammar isn't left-recursive, so rules like
            // `or_expr = { and_expr ~ ("||" ~ and_expr)* }` match one or
            // many operands. Single operands are punched through to their
            // primitive and many-headed ones are folded left, so that
            // `a || b || c` becomes `BinOp(BinOp(a, b), c)`.
            let raw = pair.as_str();

            match pair.as_rule() {
                Rule::or_expr | Rule::and_expr => {
                    let op = match pair.as_rule() {
                        Rule::or_expr => BinOp::Or,
                        _ => BinOp::And,
                    };

                    let mut pairs = pair.into_inner();
                    let lhs = parse_pair(next(&mut pairs, raw)?)?;
                    pairs.try_fold(lhs, |expr, next| {
                        Ok(Expr::BinOp {
                            lhs: expr,
                            op,
                            rhs: parse_pair(next)?,
                        }
                        .into())
                    })
                }
                Rule::eq_expr => {
                    // eq_expr captures `==` and `!=` in `eq_op`, so we fold
                    // over two-tuples of (eq_op, unary_expr).
                    let mut pairs = pair.into_inner();
                    let lhs = parse_pair(next(&mut pairs, raw)?)?;

                    let pair_chunks = pairs.chunks(2);
                    pair_chunks.into_iter().try_fold(lhs, |expr, mut chunk| {
                        let eq_op = next(&mut chunk, raw)?;
                        let operand = next(&mut chunk, raw)?;

                        let op = match eq_op.as_str() {
                            "==" => BinOp::Eq,
                            "!=" => BinOp::Neq,
                            other => return Err(ParseError::Malformed(other.into())),
                        };

                        Ok(Expr::BinOp {
                            lhs: expr,
                            op,
                            rhs: parse_pair(operand)?,
                        }
                        .into())
                    })
                }
                Rule::unary_expr => {
                    let mut pairs = pair.into_inner();
                    let pair = next(&mut pairs, raw)?;

                    match pair.as_rule() {
                        Rule::unary_op => Ok(Expr::UnOp {
                            op: UnOp::Not,
                            expr: parse_pair(next(&mut pairs, raw)?)?,
                        }
                        .into()),
                        _ => parse_pair(pair),
                    }
                }
                Rule::primary_expr => {
                    // Punt back to the top level match to keep things simple.
                    parse_pair(next(&mut pair.into_inner(), raw)?)
                }
                Rule::number => raw
                    .parse()
                    .map(|n| Expr::Number(n).into())
                    .map_err(|_| ParseError::Malformed(raw.into())),
                Rule::string => {
                    // string -> string_inner
                    let inner = next(&mut pair.into_inner(), raw)?;
                    Ok(Expr::string(inner.as_str().replace("''", "'")))
                }
                Rule::function_call => {
                    let mut pairs = pair.into_inner();

                    let name = next(&mut pairs, raw)?;
                    let args = pairs
                        .map(|pair| parse_pair(pair).map(|e| *e))
                        .collect::<Result<_, _>>()?;

                    Ok(Expr::Call {
                        func: Function(name.as_str()),
                        args,
                    }
                    .into())
                }
                Rule::identifier => Ok(Expr::ident(raw).into()),
                _ => Err(ParseError::Malformed(raw.into())),
            }
        }

        parse_pair(or_expr).map(|e| *e)
    }
}

/// Strips a surrounding `${{ ... }}` fence, if present.
fn unfence(expr: &str) -> &str {
    let trimmed = expr.trim();

    trimmed
        .strip_prefix("${{")
        .and_then(|e| e.strip_suffix("}}"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
