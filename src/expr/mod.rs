//! Key Expression Module
//!
//! A small expression language over the arguments of an intercepted call.
//!
//! # Grammar
//! ```text
//! expr := term ('+' term)*
//! term := '#' ident path* | '\'' literal '\'' | integer
//! path := '.' (ident | digits) | '[' digits ']'
//! ```
//!
//! `#userId` renders the `userId` argument, `#query.page` a field of a structured
//! argument, `#ids[0]` an array element, and `'list:' + #page` concatenates.

mod parser;
mod render;


use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::context::CallContext;
use crate::error::{CacheError, Result};

pub use render::render;

// == Path Step ==
/// One step into a structured argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Field(String),
    Index(usize),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Field(name) => write!(f, ".{}", name),
            PathStep::Index(i) => write!(f, "[{}]", i),
        }
    }
}

// == Segment ==
/// A compiled piece of a key expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Argument { name: String, path: Vec<PathStep> },
}

// == Key Expression ==
/// A compiled key expression.
///
/// Compile once when the policy is registered, evaluate on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyExpression {
    source: String,
    segments: Vec<Segment>,
}

impl KeyExpression {
    /// Compiles an expression, failing on malformed syntax.
    pub fn parse(source: &str) -> Result<Self> {
        let segments = parser::Parser::new(source).parse()?;
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Names of the arguments the expression reads.
    pub fn arguments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Argument { name, .. } => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    // == Evaluate ==
    /// Evaluates the expression against a call's arguments.
    ///
    /// Pure: the same arguments always produce the same string.
    pub fn evaluate(&self, ctx: &CallContext) -> Result<String> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Argument { name, path } => {
                    let root = ctx.lookup(name)?;
                    let value = walk(name, root, path)?;
                    out.push_str(&render(value));
                }
            }
        }
        Ok(out)
    }
}

impl FromStr for KeyExpression {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for KeyExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Evaluates `source` once without keeping the compiled form.
pub fn evaluate(source: &str, ctx: &CallContext) -> Result<String> {
    KeyExpression::parse(source)?.evaluate(ctx)
}

/// Follows `path` from `root`; stepping into a scalar, null or a missing
/// field is an error.
fn walk<'v>(name: &str, root: &'v Value, path: &[PathStep]) -> Result<&'v Value> {
    let mut current = root;
    for (depth, step) in path.iter().enumerate() {
        let next = match (step, current) {
            (PathStep::Field(field), Value::Object(map)) => map.get(field),
            (PathStep::Index(i), Value::Array(items)) => items.get(*i),
            (PathStep::Field(field), Value::Array(items)) => {
                field.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            (PathStep::Index(i), Value::Object(map)) => map.get(&i.to_string()),
            _ => None,
        };
        current = next.ok_or_else(|| CacheError::UnresolvedPath {
            argument: name.to_string(),
            path: path[..=depth].iter().map(ToString::to_string).collect(),
        })?;
    }
    Ok(current)
}
