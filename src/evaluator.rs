use crate::ast::Value;
use crate::builtinops::BuiltinOp;
use crate::environment::{Binding, Environment};
use crate::{Error, MAX_CALL_DEPTH};
use std::rc::Rc;
use tracing::{debug, instrument, trace};

/// Evaluator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Longest chain of nested user-function calls before evaluation fails
    pub max_call_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            max_call_depth: MAX_CALL_DEPTH,
        }
    }
}

/// How many user-function calls enclose the expression being evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CallDepth {
    current: usize,
    limit: usize,
}

impl CallDepth {
    pub(crate) fn new(config: EvalConfig) -> Self {
        CallDepth {
            current: 0,
            limit: config.max_call_depth,
        }
    }

    /// The depth inside one more call, or an error past the limit
    fn enter(self) -> Result<Self, Error> {
        if self.current >= self.limit {
            return Err(Error::DepthLimitExceeded(self.limit));
        }
        Ok(CallDepth {
            current: self.current + 1,
            ..self
        })
    }
}

impl Default for CallDepth {
    fn default() -> Self {
        CallDepth::new(EvalConfig::default())
    }
}

/// Stack space kept free before recursing (100KB)
#[cfg(not(target_arch = "wasm32"))]
const RED_ZONE: usize = 100 * 1024;

/// Stack allocated each time the red zone is reached (1MB)
#[cfg(not(target_arch = "wasm32"))]
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, moving to a freshly allocated stack segment when the current one runs low
#[inline]
#[cfg(not(target_arch = "wasm32"))]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Evaluate an expression against `env` with the default settings (public API)
///
/// Definitions made by top-level `var`, `const` and `func` forms stay in `env`,
/// so a host can evaluate the forms of a program one after another.
pub fn evaluate(expr: &Value, env: &mut Environment) -> Result<Value, Error> {
    evaluate_with_config(expr, env, EvalConfig::default())
}

/// Evaluate an expression against `env` under `config`
#[instrument(level = "debug", skip_all, fields(expr = %expr))]
pub fn evaluate_with_config(
    expr: &Value,
    env: &mut Environment,
    config: EvalConfig,
) -> Result<Value, Error> {
    eval_with_depth_tracking(expr, env, CallDepth::new(config))
}

/// Evaluate an expression inside `depth` enclosing calls
pub(crate) fn eval_with_depth_tracking(
    expr: &Value,
    env: &mut Environment,
    depth: CallDepth,
) -> Result<Value, Error> {
    match expr {
        // Self-evaluating forms
        Value::Integer(_)
        | Value::Float(_)
        | Value::Bool(_)
        | Value::String(_)
        | Value::Function { .. } => Ok(expr.clone()),

        // Identifier lookup; there is no default value for a miss
        Value::Identifier(name) => env
            .lookup(name)
            .map(|binding| binding.value.clone())
            .ok_or_else(|| Error::UnboundIdentifier(name.clone())),

        Value::List(elements) => ensure_sufficient_stack(|| eval_list(elements, env, depth)),
    }
}

/// Evaluate an application: a builtin form or a call to a user function
///
/// Builtin names are checked first, so they cannot be shadowed by bindings.
fn eval_list(elements: &[Value], env: &mut Environment, depth: CallDepth) -> Result<Value, Error> {
    let Some((head, arg_exprs)) = elements.split_first() else {
        return Err(Error::type_mismatch("application", "operator", "empty list"));
    };
    let Value::Identifier(name) = head else {
        return Err(Error::type_mismatch(
            "application",
            "operator",
            head.describe(),
        ));
    };

    if let Some(op) = BuiltinOp::from_name(name) {
        trace!(builtin = %op, depth = depth.current, "dispatch");
        return op.apply(elements, env, depth);
    }

    let (params, body) = match env.lookup(name) {
        Some(Binding {
            value: Value::Function { params, body },
            ..
        }) => (Rc::clone(params), Rc::clone(body)),
        Some(binding) => {
            return Err(Error::type_mismatch(
                name.as_str(),
                "function",
                binding.value.describe(),
            ));
        }
        None => return Err(Error::UnboundIdentifier(name.clone())),
    };

    debug!(function = %name, args = arg_exprs.len(), depth = depth.current, "calling");
    apply_function(&params, &body, arg_exprs, env, depth)
}

/// Call a user function
///
/// The call frame is a copy of the *caller's* environment taken before any
/// argument is evaluated. Arguments are evaluated in the caller's environment, in
/// order, and bound to the matching parameter in the frame; surplus arguments are
/// evaluated and dropped, missing ones leave their parameter unbound. Nothing the
/// body binds outlives the frame.
fn apply_function(
    params: &[String],
    body: &Value,
    arg_exprs: &[Value],
    env: &mut Environment,
    depth: CallDepth,
) -> Result<Value, Error> {
    let inner = depth.enter()?;
    let mut frame = env.copy();

    for (index, arg_expr) in arg_exprs.iter().enumerate() {
        let arg = eval_with_depth_tracking(arg_expr, env, depth)?;
        if let Some(param) = params.get(index) {
            // Parameters shadow anything in the frame, constants included
            frame.insert(param, Binding::mutable(arg));
        }
    }

    eval_with_depth_tracking(body, &mut frame, inner)
}

/// Create an empty global environment with the default table settings
pub fn create_global_env() -> Environment {
    Environment::new()
}
