//! Schemelike - a tree-walking interpreter for a minimal parenthesized expression language
//!
//! Programs are S-expressions built from integers, floats, strings, booleans and
//! identifiers:
//!
//! ```scheme
//! (+ 1 2 3)                         ; arithmetic, result kind follows the first operand
//! (begin (var a 5) (var b 6) (+ a b))
//! (const limit 10)                  ; immutable binding
//! (if (< 1 2) "yes" "no")           ; conditions must be booleans
//! (func add2 (a b) (+ a b))         ; named function definition
//! (add2 3 4)
//! ```
//!
//! ## Scoping
//!
//! Bindings live in an open-addressing hash table ([`environment::Environment`]).
//! A user function call copies the *caller's* table into a fresh call frame, binds
//! the parameters there, and evaluates the body in that frame. Nothing a function
//! body binds is visible after the call returns.
//!
//! ## Errors
//!
//! Every failure is reported as an [`Error`] propagated out of
//! [`evaluator::evaluate`]; the host decides whether to abort or continue.
//!
//! ## Modules
//!
//! - `scheme`: lexer and parser from source text to [`ast::Value`]
//! - `environment`: the binding table (quadratic probing, tombstones, prime capacities)
//! - `evaluator`: the recursive AST walker
//! - `builtinops`: the closed set of builtin operators

use std::fmt;

/// Maximum parsing depth to prevent stack overflow on deeply nested input
pub const MAX_PARSE_DEPTH: usize = 64;

/// Default limit on nested user-function calls.
///
/// Only calls count: the nesting inside one body is already bounded by
/// [`MAX_PARSE_DEPTH`]. The evaluator grows the native stack on demand, so the
/// limit bounds memory and runaway recursion, not the thread's stack size.
pub const MAX_CALL_DEPTH: usize = 1000;

/// Categorizes the different kinds of lexing errors.
#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum LexErrorKind {
    #[error("unexpected character '{0}'")]
    UnexpectedChar(char),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unknown escape sequence '\\{0}'")]
    InvalidEscape(char),
    #[error("malformed number '{0}'")]
    MalformedNumber(String),
}

/// A failure while turning source text into tokens.
#[derive(Debug, PartialEq, Clone)]
pub struct LexError {
    pub kind: LexErrorKind,
    /// Byte offset into the source where the offending token starts
    pub offset: usize,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
}

impl LexError {
    pub fn new(kind: LexErrorKind, offset: usize) -> Self {
        LexError {
            kind,
            offset,
            context: None,
        }
    }

    /// Create a LexError with context extracted from input at a given offset
    pub fn with_context(kind: LexErrorKind, input: &str, offset: usize) -> Self {
        LexError {
            kind,
            offset,
            context: Some(context_snippet(input, offset)),
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.kind, self.offset)?;
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

impl std::error::Error for LexError {}

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Input ended inside an open list
    Unclosed,
    /// A `)` with no matching `(`
    UnexpectedClose,
    /// No expression at all
    Empty,
    /// Extra input found after a complete, valid expression
    TrailingContent,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Byte offset of the token the parser stopped at, if there was one
    pub offset: Option<usize>,
    /// The problematic token encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        offset: Option<usize>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            offset,
            found,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(offset) = self.offset {
            write!(f, " at offset {offset}")?;
        }
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("LexError: {0}")]
    Lex(#[from] LexError),
    #[error("ParseError: {0}")]
    Parse(#[from] ParseError),
    #[error("Unbound identifier: {0}")]
    UnboundIdentifier(String),
    #[error("Cannot reassign to const identifier: {0}")]
    ConstReassignment(String),
    #[error("Type error: {operator} expected {expected}, found {found}")]
    TypeMismatch {
        operator: String,
        expected: &'static str,
        found: String,
    },
    #[error("If condition must be a bool, found {0}")]
    InvalidCondition(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow in {0}")]
    IntegerOverflow(&'static str),
    #[error("Call depth limit exceeded (max: {0})")]
    DepthLimitExceeded(usize),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a TypeMismatch for an operand of the wrong (or missing) kind
    pub fn type_mismatch(
        operator: impl Into<String>,
        expected: &'static str,
        found: impl Into<String>,
    ) -> Self {
        Error::TypeMismatch {
            operator: operator.into(),
            expected,
            found: found.into(),
        }
    }
}

/// Extract a display snippet around `offset`, marking truncation with `[...]`
pub(crate) fn context_snippet(input: &str, offset: usize) -> String {
    const MAX_CONTEXT: usize = 100;

    let context_start = offset.saturating_sub(20);
    let context_str: String = input
        .chars()
        .skip(context_start)
        .take(MAX_CONTEXT)
        .collect();

    let mut display_context = String::new();
    if context_start > 0 {
        display_context.push_str("[...]");
    }
    display_context.push_str(&context_str);
    if context_start + context_str.len() < input.len() {
        display_context.push_str("[...]");
    }

    // Replace newlines with visible markers for better error display
    display_context.replace('\n', "\\n").replace('\r', "")
}

pub mod ast;
pub mod builtinops;
pub mod environment;
pub mod evaluator;

#[cfg(feature = "scheme")]
pub mod scheme;
