//! The fixed set of builtin operators.
//!
//! Every builtin receives the whole application form, operator name included, and
//! decides itself which operands to evaluate and when. This makes every builtin
//! a special form in the Scheme sense: `if` evaluates only the taken branch, `var`
//! and `func` read their name operand without evaluating it, and the arithmetic
//! operators evaluate their operands left to right as they fold.
//!
//! ```scheme
//! (+ 1 2 3)              ; 6
//! (+ 1.0 2 3)            ; 6.0, the first operand picks the numeric kind
//! (begin (var a 5) a)    ; 5
//! (average 1 2 3)        ; 2.0
//! ```
//!
//! ## Strictness
//!
//! - **No arity checking up front**: a missing operand is reported by the builtin
//!   that first needs it, as a type error that found `nothing`. Extra operands of a
//!   fixed-arity builtin are never evaluated.
//! - **No promotion mid-fold**: the first operand of `+ - * /` fixes the result
//!   kind. Under Float, Integer operands are converted; under Integer, a Float
//!   operand is an error.
//! - **Checked integers**: overflow and integer division by zero are errors.
//!
//! Builtin names are reserved: the evaluator looks them up before the environment,
//! so binding `+` with `var` has no effect on `(+ ...)`.

use std::fmt;

use tracing::trace;

use crate::Error;
use crate::ast::{FloatType, IntegerType, Value};
use crate::environment::{Binding, Environment, Mutability};
use crate::evaluator::{CallDepth, eval_with_depth_tracking};

/// Number of operands a builtin documents, not counting the operator itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly this many operands are read
    Exact(usize),
    /// At least this many operands, any number more
    AtLeast(usize),
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "{n}+"),
        }
    }
}

/// A builtin operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinOp {
    Add,
    Sub,
    Mul,
    Div,
    Var,
    Const,
    Begin,
    Less,
    If,
    Func,
    Average,
    Abs,
}

impl BuiltinOp {
    /// Every builtin, in the order they are listed to users
    pub const ALL: [BuiltinOp; 12] = [
        BuiltinOp::Add,
        BuiltinOp::Sub,
        BuiltinOp::Mul,
        BuiltinOp::Div,
        BuiltinOp::Var,
        BuiltinOp::Const,
        BuiltinOp::Begin,
        BuiltinOp::Less,
        BuiltinOp::If,
        BuiltinOp::Func,
        BuiltinOp::Average,
        BuiltinOp::Abs,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        let op = match name {
            "+" => BuiltinOp::Add,
            "-" => BuiltinOp::Sub,
            "*" => BuiltinOp::Mul,
            "/" => BuiltinOp::Div,
            "var" => BuiltinOp::Var,
            "const" => BuiltinOp::Const,
            "begin" => BuiltinOp::Begin,
            "<" => BuiltinOp::Less,
            "if" => BuiltinOp::If,
            "func" => BuiltinOp::Func,
            "average" => BuiltinOp::Average,
            "abs" => BuiltinOp::Abs,
            _ => return None,
        };
        Some(op)
    }

    pub fn name(self) -> &'static str {
        match self {
            BuiltinOp::Add => "+",
            BuiltinOp::Sub => "-",
            BuiltinOp::Mul => "*",
            BuiltinOp::Div => "/",
            BuiltinOp::Var => "var",
            BuiltinOp::Const => "const",
            BuiltinOp::Begin => "begin",
            BuiltinOp::Less => "<",
            BuiltinOp::If => "if",
            BuiltinOp::Func => "func",
            BuiltinOp::Average => "average",
            BuiltinOp::Abs => "abs",
        }
    }

    pub fn arity(self) -> Arity {
        match self {
            BuiltinOp::Add
            | BuiltinOp::Sub
            | BuiltinOp::Mul
            | BuiltinOp::Div
            | BuiltinOp::Begin
            | BuiltinOp::Average => Arity::AtLeast(1),
            BuiltinOp::Var | BuiltinOp::Const | BuiltinOp::Less => Arity::Exact(2),
            BuiltinOp::If | BuiltinOp::Func => Arity::Exact(3),
            BuiltinOp::Abs => Arity::Exact(1),
        }
    }

    /// One-line usage text for interactive help
    pub fn description(self) -> &'static str {
        match self {
            BuiltinOp::Add => "(+ a b ...) sum, kind of the first operand",
            BuiltinOp::Sub => "(- a b ...) difference, kind of the first operand",
            BuiltinOp::Mul => "(* a b ...) product, kind of the first operand",
            BuiltinOp::Div => "(/ a b ...) quotient, integer division truncates",
            BuiltinOp::Var => "(var name expr) bind a mutable variable",
            BuiltinOp::Const => "(const name expr) bind a constant",
            BuiltinOp::Begin => "(begin expr ...) evaluate in order, yield the last",
            BuiltinOp::Less => "(< a b) numeric less-than",
            BuiltinOp::If => "(if cond then else) cond must be a bool",
            BuiltinOp::Func => "(func name (params ...) (body)) define a function",
            BuiltinOp::Average => "(average a b ...) mean as a float",
            BuiltinOp::Abs => "(abs n) absolute value, same kind",
        }
    }

    /// Run this builtin on `form`, whose element 0 is the operator name
    pub(crate) fn apply(
        self,
        form: &[Value],
        env: &mut Environment,
        depth: CallDepth,
    ) -> Result<Value, Error> {
        match self {
            BuiltinOp::Add => self.fold_numeric(form, env, depth, int_add, |a, b| a + b),
            BuiltinOp::Sub => self.fold_numeric(form, env, depth, int_sub, |a, b| a - b),
            BuiltinOp::Mul => self.fold_numeric(form, env, depth, int_mul, |a, b| a * b),
            BuiltinOp::Div => self.fold_numeric(form, env, depth, int_div, |a, b| a / b),
            BuiltinOp::Var => self.bind(form, env, depth, Mutability::Mutable),
            BuiltinOp::Const => self.bind(form, env, depth, Mutability::Constant),
            BuiltinOp::Begin => {
                let mut last = self.eval_operand(form, 1, env, depth)?;
                for expr in form.iter().skip(2) {
                    last = eval_with_depth_tracking(expr, env, depth)?;
                }
                Ok(last)
            }
            BuiltinOp::Less => {
                let left = self.eval_operand(form, 1, env, depth)?;
                let right = self.eval_operand(form, 2, env, depth)?;
                let less = match (self.number(left)?, self.number(right)?) {
                    (Number::Integer(a), Number::Integer(b)) => a < b,
                    (a, b) => a.as_float() < b.as_float(),
                };
                trace!(result = less, "compared");
                Ok(Value::Bool(less))
            }
            BuiltinOp::If => match self.eval_operand(form, 1, env, depth)? {
                Value::Bool(condition) => {
                    let branch = if condition { 2 } else { 3 };
                    self.eval_operand(form, branch, env, depth)
                }
                other => Err(Error::InvalidCondition(other.describe())),
            },
            BuiltinOp::Func => {
                let name = self.identifier_operand(form, 1)?;
                let params = match self.operand(form, 2, "parameter list")? {
                    Value::List(items) => items
                        .iter()
                        .map(|item| match item {
                            Value::Identifier(param) => Ok(param.clone()),
                            other => Err(Error::type_mismatch(
                                self.name(),
                                "parameter name",
                                other.describe(),
                            )),
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    other => {
                        return Err(Error::type_mismatch(
                            self.name(),
                            "parameter list",
                            other.describe(),
                        ));
                    }
                };
                let body = match self.operand(form, 3, "body list")? {
                    body @ Value::List(_) => body.clone(),
                    other => {
                        return Err(Error::type_mismatch(
                            self.name(),
                            "body list",
                            other.describe(),
                        ));
                    }
                };

                let function = Value::Function {
                    params: params.into(),
                    body: body.into(),
                };
                env.insert(name, Binding::mutable(function.clone()));
                Ok(function)
            }
            BuiltinOp::Average => {
                let mut sum = self
                    .number(self.eval_operand(form, 1, env, depth)?)?
                    .as_float();
                for expr in form.iter().skip(2) {
                    let value = eval_with_depth_tracking(expr, env, depth)?;
                    sum += self.number(value)?.as_float();
                }
                let count = (form.len() - 1) as FloatType;
                Ok(Value::Float(sum / count))
            }
            BuiltinOp::Abs => match self.number(self.eval_operand(form, 1, env, depth)?)? {
                Number::Integer(n) => n
                    .checked_abs()
                    .map(Value::Integer)
                    .ok_or(Error::IntegerOverflow("abs")),
                Number::Float(n) => Ok(Value::Float(n.abs())),
            },
        }
    }

    /// Unevaluated operand at `index`, or a type error naming what was expected there
    fn operand<'a>(
        self,
        form: &'a [Value],
        index: usize,
        expected: &'static str,
    ) -> Result<&'a Value, Error> {
        form.get(index)
            .ok_or_else(|| Error::type_mismatch(self.name(), expected, "nothing"))
    }

    fn eval_operand(
        self,
        form: &[Value],
        index: usize,
        env: &mut Environment,
        depth: CallDepth,
    ) -> Result<Value, Error> {
        let expr = self.operand(form, index, "an operand")?;
        eval_with_depth_tracking(expr, env, depth)
    }

    fn identifier_operand(self, form: &[Value], index: usize) -> Result<&str, Error> {
        match self.operand(form, index, "identifier")? {
            Value::Identifier(name) => Ok(name),
            other => Err(Error::type_mismatch(
                self.name(),
                "identifier",
                other.describe(),
            )),
        }
    }

    fn number(self, value: Value) -> Result<Number, Error> {
        match value {
            Value::Integer(n) => Ok(Number::Integer(n)),
            Value::Float(n) => Ok(Number::Float(n)),
            other => Err(Error::type_mismatch(self.name(), "number", other.describe())),
        }
    }

    /// `var` and `const`: the const check happens before the value is evaluated
    fn bind(
        self,
        form: &[Value],
        env: &mut Environment,
        depth: CallDepth,
        mutability: Mutability,
    ) -> Result<Value, Error> {
        let name = self.identifier_operand(form, 1)?;
        if env.lookup(name).is_some_and(Binding::is_constant) {
            return Err(Error::ConstReassignment(name.to_owned()));
        }

        let value = self.eval_operand(form, 2, env, depth)?;
        env.insert(
            name,
            Binding {
                value: value.clone(),
                mutability,
            },
        );
        Ok(value)
    }

    /// Left fold over operands 1.., seeded and kind-fixed by operand 1
    fn fold_numeric(
        self,
        form: &[Value],
        env: &mut Environment,
        depth: CallDepth,
        int_step: fn(IntegerType, IntegerType) -> Result<IntegerType, Error>,
        float_step: fn(FloatType, FloatType) -> FloatType,
    ) -> Result<Value, Error> {
        let seed = self.number(self.eval_operand(form, 1, env, depth)?)?;
        let rest = form.iter().skip(2);

        match seed {
            Number::Integer(mut acc) => {
                for expr in rest {
                    match eval_with_depth_tracking(expr, env, depth)? {
                        Value::Integer(n) => acc = int_step(acc, n)?,
                        other => {
                            return Err(Error::type_mismatch(
                                self.name(),
                                "integer",
                                other.describe(),
                            ));
                        }
                    }
                }
                Ok(Value::Integer(acc))
            }
            Number::Float(mut acc) => {
                for expr in rest {
                    let value = eval_with_depth_tracking(expr, env, depth)?;
                    acc = float_step(acc, self.number(value)?.as_float());
                }
                Ok(Value::Float(acc))
            }
        }
    }
}

impl fmt::Display for BuiltinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numeric operand after kind dispatch
#[derive(Debug, Clone, Copy)]
enum Number {
    Integer(IntegerType),
    Float(FloatType),
}

impl Number {
    fn as_float(self) -> FloatType {
        match self {
            Number::Integer(n) => n as FloatType,
            Number::Float(n) => n,
        }
    }
}

fn int_add(a: IntegerType, b: IntegerType) -> Result<IntegerType, Error> {
    a.checked_add(b).ok_or(Error::IntegerOverflow("+"))
}

fn int_sub(a: IntegerType, b: IntegerType) -> Result<IntegerType, Error> {
    a.checked_sub(b).ok_or(Error::IntegerOverflow("-"))
}

fn int_mul(a: IntegerType, b: IntegerType) -> Result<IntegerType, Error> {
    a.checked_mul(b).ok_or(Error::IntegerOverflow("*"))
}

fn int_div(a: IntegerType, b: IntegerType) -> Result<IntegerType, Error> {
    if b == 0 {
        return Err(Error::DivisionByZero);
    }
    // Only MIN / -1 can overflow
    a.checked_div(b).ok_or(Error::IntegerOverflow("/"))
}
