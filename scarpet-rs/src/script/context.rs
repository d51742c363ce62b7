//! Variable scopes.
//!
//! A [`Context`] is the local scope of one evaluation: a name → [`LazyValue`]
//! map plus a handle on the [`Interpreter`] that owns the global registry.
//! Names starting with `global_` always live in the global registry; any
//! other name is local, falling back to the registry on reads so that
//! pre-registered globals such as `pi` are visible everywhere.

use std::collections::HashMap;
use std::rc::Rc;

use super::error::EvalResult;
use super::interp::Interpreter;
use super::lazy::LazyValue;

pub const GLOBAL_PREFIX: &str = "global_";

pub fn is_global_name(name: &str) -> bool {
    name.starts_with(GLOBAL_PREFIX)
}

pub struct Context {
    interp: Rc<Interpreter>,
    variables: HashMap<String, LazyValue>,
}

/// Local bindings captured by [`Context::save`], to be put back with
/// [`Context::restore`].
#[derive(Debug)]
pub struct ScopeFrame {
    saved: Vec<(String, Option<LazyValue>)>,
}

impl Context {
    pub fn new(interp: Rc<Interpreter>) -> Self {
        Context { interp, variables: HashMap::new() }
    }

    pub fn interpreter(&self) -> &Rc<Interpreter> {
        &self.interp
    }

    /// Add one binding, builder style.
    pub fn with(mut self, name: &str, value: LazyValue) -> Self {
        self.set_variable(name, value);
        self
    }

    /// A fresh, empty scope on the same interpreter (used for procedure
    /// calls, which do not see the caller's locals).
    pub fn recreate(&self) -> Self {
        Context::new(self.interp.clone())
    }

    pub fn get_variable(&self, name: &str) -> Option<LazyValue> {
        if !is_global_name(name) {
            if let Some(v) = self.variables.get(name) {
                return Some(v.clone());
            }
        }
        self.interp.global(name)
    }

    pub fn set_variable(&mut self, name: &str, value: LazyValue) {
        if is_global_name(name) {
            self.interp.set_global(name, value);
        } else if let Some(slot) = self.variables.get_mut(name) {
            *slot = value;
        } else {
            self.variables.insert(name.to_owned(), value);
        }
    }

    /// Remove a binding; returns whether anything was bound.
    pub fn del_variable(&mut self, name: &str) -> bool {
        if is_global_name(name) {
            self.interp.remove_global(name)
        } else {
            self.variables.remove(name).is_some()
        }
    }

    // ── Save / restore ────────────────────────────────────────────────────────

    /// Capture the local bindings of `names` (bound or not).
    pub fn save(&self, names: &[&str]) -> ScopeFrame {
        ScopeFrame {
            saved: names
                .iter()
                .map(|n| ((*n).to_owned(), self.variables.get(*n).cloned()))
                .collect(),
        }
    }

    /// Put back exactly what [`save`](Self::save) captured: previously
    /// unbound names become unbound again.
    pub fn restore(&mut self, frame: ScopeFrame) {
        for (name, value) in frame.saved {
            match value {
                Some(v) => {
                    self.variables.insert(name, v);
                }
                None => {
                    self.variables.remove(&name);
                }
            }
        }
    }

    /// Run `body` with `names` saved beforehand and restored afterwards,
    /// whether `body` succeeds, fails or is interrupted.
    pub fn scoped<T>(
        &mut self,
        names: &[&str],
        body: impl FnOnce(&mut Context) -> EvalResult<T>,
    ) -> EvalResult<T> {
        let frame = self.save(names);
        let result = body(self);
        self.restore(frame);
        result
    }

    /// Return `Exit` if the run has been cancelled.
    pub fn check_cancelled(&self) -> EvalResult<()> {
        self.interp.control().check()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::error::{Interrupt, ScriptError};
    use crate::script::value::Value;

    fn ctx() -> Context {
        Context::new(Rc::new(Interpreter::new()))
    }

    fn read(ctx: &mut Context, name: &str) -> Option<Value> {
        ctx.get_variable(name).map(|l| l.eval(ctx).unwrap())
    }

    #[test]
    fn with_adds_binding() {
        let mut c = ctx().with("x", LazyValue::of(Value::number(3.0)));
        assert_eq!(read(&mut c, "x"), Some(Value::number(3.0)));
        assert_eq!(read(&mut c, "y"), None);
    }

    #[test]
    fn locals_fall_back_to_globals() {
        let mut c = ctx();
        c.interpreter().set_global("answer", LazyValue::of(Value::number(42.0)));
        assert_eq!(read(&mut c, "answer"), Some(Value::number(42.0)));
        c.set_variable("answer", LazyValue::of(Value::number(1.0)));
        assert_eq!(read(&mut c, "answer"), Some(Value::number(1.0)));
    }

    #[test]
    fn global_prefix_goes_to_registry() {
        let mut a = ctx();
        let mut b = a.recreate();
        a.set_variable("global_n", LazyValue::of(Value::number(5.0)));
        assert!(!a.variables.contains_key("global_n"));
        assert_eq!(read(&mut b, "global_n"), Some(Value::number(5.0)));
        assert!(b.del_variable("global_n"));
        assert_eq!(read(&mut a, "global_n"), None);
    }

    #[test]
    fn recreate_hides_locals() {
        let c = ctx().with("x", LazyValue::null());
        let fresh = c.recreate();
        assert!(!fresh.variables.contains_key("x"));
    }

    #[test]
    fn save_restore_round_trip() {
        let mut c = ctx().with("_", LazyValue::of(Value::string("outer")));
        let frame = c.save(&["_", "_i"]);
        c.set_variable("_", LazyValue::of(Value::number(1.0)));
        c.set_variable("_i", LazyValue::of(Value::number(2.0)));
        c.restore(frame);
        assert_eq!(read(&mut c, "_"), Some(Value::string("outer")));
        assert!(!c.variables.contains_key("_i"));
    }

    #[test]
    fn scoped_restores_on_error() {
        let mut c = ctx();
        let r: EvalResult<()> = c.scoped(&["_"], |c| {
            c.set_variable("_", LazyValue::null());
            Err(Interrupt::Error(ScriptError::internal("fail")))
        });
        assert!(r.is_err());
        assert!(!c.variables.contains_key("_"));
    }
}
