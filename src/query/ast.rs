//! Abstract syntax tree for the catalog query language.

use std::fmt;

/// Comparison/match operator attached to a field predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `:` token-match under stemming.
    Match,
    /// `=` exact.
    Eq,
    /// `!=` exact negated.
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// `~` regex.
    Regex,
    /// `!~` regex negated.
    NotRegex,
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Op::Match => ":",
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Regex => "~",
            Op::NotRegex => "!~",
        };
        f.write_str(s)
    }
}

/// A scalar value on the right-hand side of a field predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Word(String),
    Phrase(String),
    Number(f64),
    Bool(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Word(w) => f.write_str(w),
            Value::Phrase(p) => write!(f, "\"{p}\""),
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Dotted field path, e.g. `type` or `metadata.owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path(pub Vec<String>);

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl Path {
    pub fn first_segment(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or_default()
    }

    /// For `metadata.x`, returns `x` and onward; empty for a bare `metadata`.
    pub fn rest(&self) -> &[String] {
        &self.0[1.min(self.0.len())..]
    }
}

/// A parsed query expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    /// Bare free text, matched fuzzily via trigram similarity.
    Word(String),
    Phrase(String),
    FieldPred { path: Path, op: Op, value: Value },
    Not(Box<Ast>),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
}

impl fmt::Display for Ast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ast::Word(w) => f.write_str(w),
            Ast::Phrase(p) => write!(f, "\"{p}\""),
            Ast::FieldPred { path, op, value } => write!(f, "@{path}{op}{value}"),
            Ast::Not(inner) => write!(f, "NOT {inner}"),
            Ast::And(l, r) => write!(f, "({l} AND {r})"),
            Ast::Or(l, r) => write!(f, "({l} OR {r})"),
        }
    }
}
