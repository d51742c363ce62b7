//! Stored procedures defined with `name(params) -> body`.

use std::rc::Rc;

use super::context::Context;
use super::error::{snippet, EvalResult, ScriptError, Site};
use super::expr::Node;
use super::lazy::{EvalKind, LazyValue};
use super::value::Value;

pub struct UserFunction {
    name: String,
    params: Vec<Rc<str>>,
    body: Rc<Node>,
    site: Site,
}

/// Introspection record for hosts listing defined procedures.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureInfo {
    pub name: String,
    pub params: Vec<String>,
    /// One-based.
    pub line: usize,
    /// One-based.
    pub column: usize,
    pub snippet: Vec<String>,
}

impl UserFunction {
    pub(crate) fn new(name: &str, params: Vec<Rc<str>>, body: Rc<Node>, site: Site) -> Self {
        UserFunction { name: name.to_owned(), params, body, site }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| &**p)
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn info(&self) -> ProcedureInfo {
        ProcedureInfo {
            name: self.name.clone(),
            params: self.params().map(str::to_owned).collect(),
            line: self.site.token.line + 1,
            column: self.site.token.column + 1,
            snippet: snippet(&self.site.source.code, &self.site.token),
        }
    }

    /// Arguments are forced left to right in the caller's context, then the
    /// body runs in a fresh scope holding only the parameters.
    pub(crate) fn call(
        &self,
        caller: &mut Context,
        args: &[LazyValue],
        kind: EvalKind,
    ) -> EvalResult<Value> {
        if args.len() != self.params.len() {
            return Err(ScriptError::internal(format!(
                "Function '{}' takes {} argument{}, not {}",
                self.name,
                self.params.len(),
                if self.params.len() == 1 { "" } else { "s" },
                args.len()
            ))
            .into());
        }
        let mut scope = caller.recreate();
        for (param, arg) in self.params.iter().zip(args) {
            let value = arg.eval(caller)?.bind_to(param.clone());
            scope.set_variable(param, LazyValue::of(value));
        }
        let interp = caller.interpreter().clone();
        let _depth = interp.enter_call().map_err(|e| e.in_procedure(&self.name))?;
        self.body.eval(&mut scope, kind).map_err(|e| e.in_procedure(&self.name))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
