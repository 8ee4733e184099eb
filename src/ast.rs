//! This module defines the core Abstract Syntax Tree (AST) type, [`Value`], which is
//! both the shape the parser produces and the result type of evaluation. Literals
//! (integers, floats, booleans, strings) are self-evaluating, identifiers are looked
//! up in the environment, and lists are applications whose first element names the
//! operation. User functions created by `func` are values too.
//!
//! Ergonomic helper functions such as [`val`], [`ident`], and [`nil`] are provided for
//! convenient AST construction in tests, together with `From` conversions for common
//! Rust types.

use std::fmt;
use std::rc::Rc;

/// Type alias for integer values in the interpreter
pub(crate) type IntegerType = i64;

/// Type alias for floating point values in the interpreter
pub(crate) type FloatType = f64;

/// Core AST type in the interpreter
///
/// To build an AST by hand, use the helper functions:
/// - `val(42)` for values, `ident("name")` for identifiers, `nil()` for empty lists
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![ident("op"), val(42)])` for mixed lists
#[derive(Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integers
    Integer(IntegerType),
    /// 64-bit floating point numbers
    Float(FloatType),
    /// Boolean values (`true` / `false` in source)
    Bool(bool),
    /// String literals
    String(String),
    /// Identifiers, resolved against the environment when evaluated
    Identifier(String),
    /// Applications and special forms; element 0 names the operation
    List(Vec<Value>),
    /// User-defined functions. Parameters and body are shared so that copying a
    /// call frame does not deep-copy every function bound in it.
    Function {
        params: Rc<[String]>,
        body: Rc<Value>,
    },
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Float(n) => write!(f, "Float({n:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::String(s) => write!(f, "String(\"{s}\")"),
            Value::Identifier(s) => write!(f, "Identifier({s})"),
            Value::List(list) => {
                write!(f, "List(")?;
                for (i, v) in list.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v:?}")?;
                }
                write!(f, ")")
            }
            Value::Function { params, body } => {
                write!(f, "Function(params={params:?}, body={body:?})")
            }
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<FloatType> for Value {
    fn from(n: FloatType) -> Self {
        Value::Float(n)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::Integer(n as IntegerType)
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(IntegerType); // Special case - no casting
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::List(arr.into_iter().map(|x| x.into()).collect())
    }
}

/// Helper function for creating identifiers - works great in mixed lists!
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn ident<S: AsRef<str>>(name: S) -> Value {
    Value::Identifier(name.as_ref().to_owned())
}

/// Helper function for creating Values - works great in mixed lists!
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Helper function for creating empty lists, used as empty parameter lists
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Value {
    Value::List(vec![])
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            // Floats always show a fractional part so their kind is visible
            Value::Float(n) if n.is_finite() && n.fract() == 0.0 => write!(f, "{n:.1}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Value::Identifier(s) => write!(f, "{s}"),
            Value::List(elements) => {
                write!(f, "(")?;
                for (i, elem) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{elem}")?;
                }
                write!(f, ")")
            }
            Value::Function { params, .. } => write!(f, "#<function/{}>", params.len()),
        }
    }
}

impl Value {
    /// Short name of this value's kind, used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::String(_) => "string",
            Value::Identifier(_) => "identifier",
            Value::List(_) => "list",
            Value::Function { .. } => "function",
        }
    }

    /// Kind and printed form together, e.g. `float 2.5`
    pub fn describe(&self) -> String {
        format!("{} {self}", self.kind_name())
    }
}
