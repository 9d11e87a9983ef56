//! Runtime values for the MPL evaluator.
//!
//! A closed tagged union with the coercion rules specified once, here,
//! rather than ad hoc at call sites. Objects preserve insertion order
//! (`for..of` iterates values in the order keys were written).

use indexmap::IndexMap;
use mpl_types::ast::Block;
use std::fmt;
use std::rc::Rc;

/// Table of named functions or rules, in declaration order.
pub type FnTable = IndexMap<String, Rc<FunctionValue>>;

/// A user-declared function or rule: parameter names plus the body AST.
///
/// The body is shared (`Rc`) between the declaration table, any values
/// holding the function, and active simulation rules; it is never
/// mutated after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionValue {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    /// `true` for `rule` declarations, `false` for `function`.
    pub is_rule: bool,
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    Function(Rc<FunctionValue>),
    Undefined,
}

impl Value {
    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
            Value::Undefined => "undefined",
        }
    }

    /// Loose-scripting truthiness: `false`, `0`, `NaN`, `""` and
    /// `undefined` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Undefined => false,
            Value::Array(_) | Value::Object(_) | Value::Function(_) => true,
        }
    }

    /// Numeric view used by arithmetic: numbers pass through; a string
    /// parses only when the *other* operand is also a numeric-like
    /// string (the caller enforces pairing). Returns `None` for
    /// everything non-numeric.
    pub fn as_numeric_string(&self) -> Option<f64> {
        match self {
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Display form used by `print` and string concatenation.
    pub fn display_string(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.clone(),
            Value::Bool(b) => b.to_string(),
            Value::Array(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.display_string()).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Object(fields) => {
                let inner: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.display_string()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Function(f) => format!("<{} {}>", if f.is_rule { "rule" } else { "function" }, f.name),
            Value::Undefined => "undefined".to_string(),
        }
    }
}

/// Format an f64 the way scripts expect: integers without a trailing
/// `.0`, everything else with Rust's shortest round-trip form.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}
