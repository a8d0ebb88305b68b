//! Call Context Module
//!
//! Captures one intercepted invocation: the operation identifier and its named
//! arguments, in declaration order.

use serde::Serialize;
use serde_json::Value;

use crate::error::{CacheError, Result};

// == Argument ==
/// A named argument of an intercepted call.
#[derive(Debug, Clone)]
struct Argument {
    name: String,
    /// Captured value, or the reason it could not be captured
    value: std::result::Result<Value, String>,
}

// == Call Context ==
/// One intercepted invocation.
///
/// Values are captured through `serde`, so any argument shape that serializes can
/// be referenced from a key expression.
///
/// # Example
/// ```
/// use cache_aside::CallContext;
///
/// let ctx = CallContext::new("UserService::get_user")
///     .arg("userId", &42)
///     .arg("verbose", &false);
/// assert_eq!(ctx.operation(), "UserService::get_user");
/// assert_eq!(ctx.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct CallContext {
    operation: String,
    args: Vec<Argument>,
}

impl CallContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            args: Vec::new(),
        }
    }

    /// Appends a named argument.
    ///
    /// A value that fails to serialize is remembered as an error and only reported
    /// if a key expression references it.
    pub fn arg<T: Serialize + ?Sized>(mut self, name: impl Into<String>, value: &T) -> Self {
        let value = serde_json::to_value(value).map_err(|e| e.to_string());
        self.args.push(Argument {
            name: name.into(),
            value,
        });
        self
    }

    /// Appends an already captured JSON value.
    pub fn arg_value(mut self, name: impl Into<String>, value: Value) -> Self {
        self.args.push(Argument {
            name: name.into(),
            value: Ok(value),
        });
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Argument names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.args.iter().map(|a| a.name.as_str())
    }

    // == Lookup ==
    /// Looks up an argument by declared name.
    ///
    /// Falls back to positional aliases `p<n>` / `a<n>` when no argument carries
    /// the name itself.
    pub fn lookup(&self, name: &str) -> Result<&Value> {
        let arg = self
            .args
            .iter()
            .find(|a| a.name == name)
            .or_else(|| positional_index(name).and_then(|i| self.args.get(i)))
            .ok_or_else(|| CacheError::UnknownArgument(name.to_string()))?;

        arg.value.as_ref().map_err(|message| CacheError::Argument {
            name: name.to_string(),
            message: message.clone(),
        })
    }
}

fn positional_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix('p').or_else(|| name.strip_prefix('a'))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
