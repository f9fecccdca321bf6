//! Worst-case evaluation of parsed expressions.
//!
//! Evaluation answers "could this be true when an attacker picks the
//! inputs?" rather than "is this true?". Values the attacker controls
//! become [`Wildcard`]s and match anything; values the attacker can pick
//! from a fixed set become [`FlexibleAction`]s and match any of their
//! options.

use std::fmt;

use crate::{BinOp, Environment, Expr, UnOp, call};

/// Errors produced while evaluating an expression.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// The expression uses a context or function we don't model.
    #[error("not implemented: {0}")]
    NotImplemented(String),
    /// A function was called with the wrong number of arguments.
    #[error("{func} expects {expected} argument(s), got {actual}")]
    Arity {
        /// The function's name.
        func: String,
        /// The expected arity, as a human-readable string.
        expected: &'static str,
        /// The number of arguments actually passed.
        actual: usize,
    },
}

/// A value that the attacker fully controls.
///
/// A wildcard matches any value it is compared against.
#[derive(Debug, Clone, PartialEq)]
pub struct Wildcard {
    /// The context the wildcard was produced from.
    pub origin: String,
}

impl Wildcard {
    /// Creates a new wildcard for the given context.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
        }
    }
}

/// A value that the attacker can choose from a fixed set of options.
///
/// A flexible value matches a comparison if any of its options does.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexibleAction {
    /// The possible values.
    pub options: Vec<Evaluation>,
}

impl FlexibleAction {
    /// Creates a flexible value from string options.
    pub fn strings(options: &[&str]) -> Self {
        Self {
            options: options
                .iter()
                .map(|o| Evaluation::String((*o).into()))
                .collect(),
        }
    }

    /// A flexible value that can be either `true` or `false`.
    pub fn either() -> Self {
        Self {
            options: vec![Evaluation::Boolean(true), Evaluation::Boolean(false)],
        }
    }
}

/// The result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// A boolean.
    Boolean(bool),
    /// A string.
    String(String),
    /// A number.
    Number(f64),
    /// An array, e.g. from `fromJSON('[1, 2]')`.
    List(Vec<Evaluation>),
    /// An object, e.g. from `fromJSON('{}')`.
    Object(serde_json::Map<String, serde_json::Value>),
    /// An attacker-controlled value.
    Wildcard(Wildcard),
    /// An attacker-choosable value.
    Flexible(FlexibleAction),
}

impl From<serde_json::Value> for Evaluation {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Evaluation::String(String::new()),
            serde_json::Value::Bool(b) => Evaluation::Boolean(b),
            serde_json::Value::Number(n) => Evaluation::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => Evaluation::String(s),
            serde_json::Value::Array(items) => {
                Evaluation::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(map) => Evaluation::Object(map),
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Boolean(b) => write!(f, "{b}"),
            Evaluation::String(s) => write!(f, "{s}"),
            Evaluation::Number(n) => write!(f, "{n}"),
            Evaluation::List(_) => write!(f, "Array"),
            Evaluation::Object(_) => write!(f, "Object"),
            Evaluation::Wildcard(w) => write!(f, "{}", w.origin),
            Evaluation::Flexible(flex) => match flex.options.first() {
                Some(first) => write!(f, "{first}"),
                None => Ok(()),
            },
        }
    }
}

impl Evaluation {
    /// Returns whether this value could be truthy.
    pub fn truthy(&self) -> bool {
        match self {
            Evaluation::Boolean(b) => *b,
            Evaluation::String(s) => !s.is_empty(),
            Evaluation::Number(n) => *n != 0.0 && !n.is_nan(),
            Evaluation::List(_) | Evaluation::Object(_) | Evaluation::Wildcard(_) => true,
            Evaluation::Flexible(flex) => flex.options.iter().any(Evaluation::truthy),
        }
    }

    /// Returns whether this value could be falsy.
    pub fn falsy(&self) -> bool {
        match self {
            Evaluation::Wildcard(_) => true,
            Evaluation::Flexible(flex) => flex.options.iter().any(Evaluation::falsy),
            other => !other.truthy(),
        }
    }

    /// Returns whether this value could be equal to `other`.
    ///
    /// String comparison is case-insensitive, like GitHub's.
    pub fn could_equal(&self, other: &Evaluation) -> bool {
        match (self, other) {
            (Evaluation::Wildcard(_), _) | (_, Evaluation::Wildcard(_)) => true,
            (Evaluation::Flexible(flex), other) | (other, Evaluation::Flexible(flex)) => {
                flex.options.iter().any(|o| o.could_equal(other))
            }
            (Evaluation::Boolean(l), Evaluation::Boolean(r)) => l == r,
            (Evaluation::Number(l), Evaluation::Number(r)) => l == r,
            (Evaluation::String(l), Evaluation::String(r)) => l.eq_ignore_ascii_case(r),
            (Evaluation::List(l), Evaluation::List(r)) => l == r,
            (Evaluation::Object(l), Evaluation::Object(r)) => l == r,
            (l @ Evaluation::List(_), r) | (r, l @ Evaluation::List(_)) => l == r,
            (l @ Evaluation::Object(_), r) | (r, l @ Evaluation::Object(_)) => l == r,
            // Mixed primitives are compared by their string forms.
            (l, r) => l.to_string().eq_ignore_ascii_case(&r.to_string()),
        }
    }

    /// Returns whether this value could differ from `other`.
    ///
    /// This is not the negation of [`Evaluation::could_equal`]: a wildcard
    /// could both equal and differ from anything.
    pub fn could_differ(&self, other: &Evaluation) -> bool {
        match (self, other) {
            (Evaluation::Wildcard(_), _) | (_, Evaluation::Wildcard(_)) => true,
            (Evaluation::Flexible(flex), other) | (other, Evaluation::Flexible(flex)) => {
                flex.options.iter().any(|o| o.could_differ(other))
            }
            (l, r) => !l.could_equal(r),
        }
    }
}

/// Evaluates expressions against an [`Environment`].
pub struct Evaluator<'env> {
    env: &'env Environment,
}

impl<'env> Evaluator<'env> {
    /// Creates a new evaluator over the given environment.
    pub fn new(env: &'env Environment) -> Self {
        Self { env }
    }

    /// Evaluates the given expression.
    ///
    /// Both sides of `&&` and `||` are always evaluated, so an unsupported
    /// construct anywhere in the expression produces an error.
    pub fn evaluate(&self, expr: &Expr<'_>) -> Result<Evaluation, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Evaluation::Number(*n)),
            Expr::String(s) => Ok(Evaluation::String(s.clone())),
            Expr::Identifier(ident) => {
                if ident == "true" {
                    Ok(Evaluation::Boolean(true))
                } else if ident == "false" {
                    Ok(Evaluation::Boolean(false))
                } else if ident.is_github() {
                    Ok(self
                        .env
                        .lookup(ident.as_str())
                        .unwrap_or_else(|| Evaluation::Wildcard(Wildcard::new(ident.as_str()))))
                } else {
                    Err(EvalError::NotImplemented(ident.as_str().into()))
                }
            }
            Expr::Call { func, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<Result<Vec<_>, _>>()?;

                call::dispatch(func, args)
            }
            Expr::UnOp {
                op: UnOp::Not,
                expr,
            } => {
                let inner = self.evaluate(expr)?;
                Ok(Evaluation::Boolean(inner.falsy()))
            }
            Expr::BinOp { lhs, op, rhs } => {
                let l = self.evaluate(lhs)?;
                let r = self.evaluate(rhs)?;

                let result = match op {
                    BinOp::And => l.truthy() && r.truthy(),
                    BinOp::Or => l.truthy() || r.truthy(),
                    BinOp::Eq | BinOp::Neq => {
                        // Two attacker-controlled github contexts are only
                        // considered equal when they name the same context.
                        if let (Expr::Identifier(li), Expr::Identifier(ri)) =
                            (lhs.as_ref(), rhs.as_ref())
                            && li.is_github()
                            && ri.is_github()
                            && (matches!(l, Evaluation::Wildcard(_))
                                || matches!(r, Evaluation::Wildcard(_)))
                        {
                            let same = li == ri;
                            return Ok(Evaluation::Boolean(match op {
                                BinOp::Eq => same,
                                _ => !same,
                            }));
                        }

                        match op {
                            BinOp::Eq => l.could_equal(&r),
                            _ => l.could_differ(&r),
                        }
                    }
                };

                Ok(Evaluation::Boolean(result))
            }
        }
    }
}

/// Whether a job or step condition could be satisfied by an attacker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Satisfiability {
    /// The condition evaluated cleanly to the given value.
    Definite(bool),
    /// The condition couldn't be parsed or evaluated.
    Unknown,
}

impl Satisfiability {
    /// Evaluates a raw `if:` condition under the given environment.
    ///
    /// An empty condition is always satisfiable.
    pub fn of(raw: &str, env: &Environment) -> Self {
        if raw.trim().is_empty() {
            return Satisfiability::Definite(true);
        }

        let Ok(expr) = Expr::parse(raw) else {
            return Satisfiability::Unknown;
        };

        match Evaluator::new(env).evaluate(&expr) {
            Ok(result) => Satisfiability::Definite(result.truthy()),
            Err(_) => Satisfiability::Unknown,
        }
    }

    /// Returns whether the condition could be true. Unknown conditions
    /// are treated as reachable.
    pub fn is_reachable(&self) -> bool {
        !matches!(self, Satisfiability::Definite(false))
    }
}
