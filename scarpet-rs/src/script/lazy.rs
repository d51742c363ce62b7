//! Deferred computations.
//!
//! Every operand and argument reaches its operator or function as a
//! [`LazyValue`]; nothing is evaluated until the implementation asks for it.
//! That is what lets `if`, `&&` and the loop builtins control evaluation
//! order and repetition.

use std::fmt;
use std::rc::Rc;

use super::context::Context;
use super::error::EvalResult;
use super::value::Value;

/// Hint passed down to a deferred computation about how its result will be
/// used.  Implementations may take cheaper paths but must stay correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvalKind {
    #[default]
    Value,
    Boolean,
    /// Result is discarded (left side of `;`).
    Void,
}

type Thunk = dyn Fn(&mut Context, EvalKind) -> EvalResult<Value>;

/// A computation producing a [`Value`] when forced against a [`Context`].
///
/// Cheap to clone; may be forced any number of times.
#[derive(Clone)]
pub struct LazyValue(Rc<Thunk>);

impl LazyValue {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Context, EvalKind) -> EvalResult<Value> + 'static,
    {
        LazyValue(Rc::new(f))
    }

    /// A computation that always yields `value`.
    pub fn of(value: Value) -> Self {
        LazyValue::new(move |_, _| Ok(value.clone()))
    }

    pub fn null() -> Self {
        Self::of(Value::null())
    }

    pub fn eval(&self, ctx: &mut Context) -> EvalResult<Value> {
        (self.0)(ctx, EvalKind::Value)
    }

    pub fn eval_as(&self, ctx: &mut Context, kind: EvalKind) -> EvalResult<Value> {
        (self.0)(ctx, kind)
    }

    pub fn eval_bool(&self, ctx: &mut Context) -> EvalResult<bool> {
        Ok((self.0)(ctx, EvalKind::Boolean)?.as_bool())
    }
}

impl From<Value> for LazyValue {
    fn from(v: Value) -> Self {
        LazyValue::of(v)
    }
}

impl fmt::Debug for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LazyValue(..)")
    }
}
