//! The interpreter.
//!
//! An [`Interpreter`] owns everything a script can reach that outlives one
//! evaluation: the operator and function registries, the global variable
//! registry, stored procedures, printed output and the
//! [`ExecutionControl`] block.  Registries are filled before the
//! interpreter is shared (`Rc<Interpreter>`) and are read-only afterwards;
//! the mutable parts sit behind `RefCell`s.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use regex::Regex;
use tracing::{debug, trace};

use super::builtins;
use super::context::Context;
use super::control::{CancelToken, ExecutionControl};
use super::error::{EvalResult, Interrupt, ScriptError};
use super::expr::{Expression, SEQUENCE_OPERATOR};
use super::lazy::{EvalKind, LazyValue};
use super::procedure::{ProcedureInfo, UserFunction};
use super::token::OperatorTable;
use super::value::Value;

/// Nested procedure calls deeper than this fail instead of overflowing the
/// native stack.
pub const MAX_CALL_DEPTH: usize = 128;

/// The reserved procedure-definition operator.
pub const DEFINE_OPERATOR: &str = "->";

/// Compiled patterns kept for reuse; the cache is emptied when full.
pub const REGEX_CACHE_SIZE: usize = 64;

// ── Registry entries ──────────────────────────────────────────────────────────

pub type BinaryFn = Rc<dyn Fn(&mut Context, EvalKind, &LazyValue, &LazyValue) -> EvalResult<Value>>;
pub type UnaryFn = Rc<dyn Fn(&mut Context, EvalKind, &LazyValue) -> EvalResult<Value>>;
pub type NativeFn = Rc<dyn Fn(&mut Context, EvalKind, &[LazyValue]) -> EvalResult<LazyValue>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(usize),
    AtLeast(usize),
    Variadic,
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Fixed(k) => n == k,
            Arity::AtLeast(k) => n >= k,
            Arity::Variadic => true,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Fixed(1) => f.write_str("1 argument"),
            Arity::Fixed(n) => write!(f, "{n} arguments"),
            Arity::AtLeast(1) => f.write_str("at least 1 argument"),
            Arity::AtLeast(n) => write!(f, "at least {n} arguments"),
            Arity::Variadic => f.write_str("any number of arguments"),
        }
    }
}

#[derive(Clone)]
pub(crate) enum OperatorImpl {
    Eval(BinaryFn),
    /// Left operand is compiled as an assignment target.
    Assign(BinaryFn),
    Define,
    /// Folded into one sequence node by the parser.
    Sequence,
}

pub struct BinaryOperator {
    pub name: String,
    pub precedence: u16,
    pub assoc: Assoc,
    pub(crate) imp: OperatorImpl,
}

pub struct UnaryOperator {
    pub name: String,
    pub precedence: u16,
    pub(crate) imp: UnaryFn,
}

pub struct NativeFunction {
    pub name: String,
    pub arity: Arity,
    pub(crate) imp: NativeFn,
}

// ── Interpreter ───────────────────────────────────────────────────────────────

pub struct Interpreter {
    operators: HashMap<String, Rc<BinaryOperator>>,
    unary_operators: HashMap<String, Rc<UnaryOperator>>,
    functions: HashMap<String, Rc<NativeFunction>>,
    operator_prefixes: HashSet<String>,
    globals: RefCell<HashMap<String, LazyValue>>,
    procedures: RefCell<BTreeMap<String, Rc<UserFunction>>>,
    control: ExecutionControl,
    output: RefCell<Vec<String>>,
    depth: Cell<usize>,
    rng: Cell<u64>,
    regex_cache: RefCell<HashMap<String, Regex>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// An interpreter with the standard operators, functions and constants.
    pub fn new() -> Self {
        let mut interp = Self::bare();
        builtins::install(&mut interp);
        interp
    }

    /// An interpreter knowing only the structural operators: `->` for
    /// definitions and `;` for sequencing.
    pub fn bare() -> Self {
        let mut interp = Interpreter {
            operators: HashMap::new(),
            unary_operators: HashMap::new(),
            functions: HashMap::new(),
            operator_prefixes: HashSet::new(),
            globals: RefCell::new(HashMap::new()),
            procedures: RefCell::new(BTreeMap::new()),
            control: ExecutionControl::default(),
            output: RefCell::new(Vec::new()),
            depth: Cell::new(0),
            rng: Cell::new(seed()),
            regex_cache: RefCell::new(HashMap::new()),
        };
        interp.add_operator(DEFINE_OPERATOR, 2, Assoc::Right, OperatorImpl::Define);
        interp.add_operator(SEQUENCE_OPERATOR, 1, Assoc::Left, OperatorImpl::Sequence);
        interp
    }

    // ── Registration ──────────────────────────────────────────────────────────

    fn add_operator(&mut self, name: &str, precedence: u16, assoc: Assoc, imp: OperatorImpl) {
        self.add_prefixes(name);
        self.operators.insert(
            name.to_owned(),
            Rc::new(BinaryOperator { name: name.to_owned(), precedence, assoc, imp }),
        );
    }

    fn add_prefixes(&mut self, name: &str) {
        for (i, c) in name.char_indices() {
            self.operator_prefixes.insert(name[..i + c.len_utf8()].to_owned());
        }
    }

    pub fn register_operator<F>(&mut self, name: &str, precedence: u16, assoc: Assoc, f: F)
    where
        F: Fn(&mut Context, EvalKind, &LazyValue, &LazyValue) -> EvalResult<Value> + 'static,
    {
        self.add_operator(name, precedence, assoc, OperatorImpl::Eval(Rc::new(f)));
    }

    /// Register a right-associative operator whose left operand is an
    /// assignment target: unbound variables there yield null bound to the
    /// variable name instead of failing.
    pub fn register_assignment_operator<F>(&mut self, name: &str, precedence: u16, f: F)
    where
        F: Fn(&mut Context, EvalKind, &LazyValue, &LazyValue) -> EvalResult<Value> + 'static,
    {
        self.add_operator(name, precedence, Assoc::Right, OperatorImpl::Assign(Rc::new(f)));
    }

    pub fn register_unary_operator<F>(&mut self, name: &str, precedence: u16, f: F)
    where
        F: Fn(&mut Context, EvalKind, &LazyValue) -> EvalResult<Value> + 'static,
    {
        self.add_prefixes(name);
        self.unary_operators.insert(
            name.to_owned(),
            Rc::new(UnaryOperator { name: name.to_owned(), precedence, imp: Rc::new(f) }),
        );
    }

    pub fn register_function<F>(&mut self, name: &str, arity: Arity, f: F)
    where
        F: Fn(&mut Context, EvalKind, &[LazyValue]) -> EvalResult<LazyValue> + 'static,
    {
        self.functions.insert(
            name.to_owned(),
            Rc::new(NativeFunction { name: name.to_owned(), arity, imp: Rc::new(f) }),
        );
    }

    /// Bind a constant in the global registry.
    pub fn register_global(&self, name: &str, value: Value) {
        self.set_global(name, LazyValue::of(value.bind_to(name.into())));
    }

    // ── Lookup ────────────────────────────────────────────────────────────────

    pub fn operator(&self, name: &str) -> Option<&Rc<BinaryOperator>> {
        self.operators.get(name)
    }

    pub fn unary_operator(&self, name: &str) -> Option<&Rc<UnaryOperator>> {
        self.unary_operators.get(name)
    }

    pub fn function(&self, name: &str) -> Option<&Rc<NativeFunction>> {
        self.functions.get(name)
    }

    // ── Globals ───────────────────────────────────────────────────────────────

    pub fn global(&self, name: &str) -> Option<LazyValue> {
        self.globals.borrow().get(name).cloned()
    }

    pub fn set_global(&self, name: &str, value: LazyValue) {
        let mut globals = self.globals.borrow_mut();
        if let Some(slot) = globals.get_mut(name) {
            *slot = value;
        } else {
            globals.insert(name.to_owned(), value);
        }
    }

    pub fn remove_global(&self, name: &str) -> bool {
        self.globals.borrow_mut().remove(name).is_some()
    }

    pub fn global_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.globals.borrow().keys().cloned().collect();
        names.sort();
        names
    }

    // ── Procedures ────────────────────────────────────────────────────────────

    /// Store a procedure, replacing any earlier definition of the name.
    pub(crate) fn define_procedure(&self, f: UserFunction) {
        debug!(name = f.name(), params = f.arity(), "defining procedure");
        self.procedures.borrow_mut().insert(f.name().to_owned(), Rc::new(f));
    }

    pub fn procedure(&self, name: &str) -> Option<Rc<UserFunction>> {
        self.procedures.borrow().get(name).cloned()
    }

    pub fn undefine_procedure(&self, name: &str) -> bool {
        self.procedures.borrow_mut().remove(name).is_some()
    }

    /// Every stored procedure, sorted by name.
    pub fn procedures(&self) -> Vec<ProcedureInfo> {
        self.procedures.borrow().values().map(|f| f.info()).collect()
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    pub fn parse(&self, code: &str) -> Result<Expression, ScriptError> {
        Expression::parse(self, code)
    }

    /// Parse and evaluate `code` in a fresh [`Context`].  Errors (including
    /// parse errors) go to the installed snooper; cancellation does not.
    pub fn run(self: &Rc<Self>, code: &str) -> EvalResult<Value> {
        debug!(len = code.len(), "run");
        let expr = self.parse(code).map_err(|e| {
            self.control.report(&e);
            Interrupt::Error(e)
        })?;
        expr.eval(&mut Context::new(self.clone()))
    }

    /// Call the stored procedure `name` from the host.
    pub fn invoke(self: &Rc<Self>, name: &str, args: Vec<LazyValue>) -> EvalResult<Value> {
        debug!(name, args = args.len(), "invoke");
        let result = match self.procedure(name) {
            Some(f) => f.call(&mut Context::new(self.clone()), &args, EvalKind::Value),
            None => Err(ScriptError::internal(format!("Function '{name}' is not defined")).into()),
        };
        if let Err(Interrupt::Error(e)) = &result {
            self.control.report(e);
        }
        result
    }

    // ── Control ───────────────────────────────────────────────────────────────

    pub fn control(&self) -> &ExecutionControl {
        &self.control
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.control.cancel_token()
    }

    pub(crate) fn enter_call(&self) -> Result<CallDepth<'_>, ScriptError> {
        let depth = self.depth.get() + 1;
        if depth > MAX_CALL_DEPTH {
            return Err(ScriptError::internal(format!(
                "maximum call depth of {MAX_CALL_DEPTH} exceeded"
            )));
        }
        self.depth.set(depth);
        Ok(CallDepth(self))
    }

    // ── Output ────────────────────────────────────────────────────────────────

    pub fn print(&self, line: String) {
        trace!(%line, "print");
        self.output.borrow_mut().push(line);
    }

    /// Drain everything printed since the last call.
    pub fn take_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output.borrow_mut())
    }

    // ── Helpers for builtins ──────────────────────────────────────────────────

    pub(crate) fn regex(&self, pattern: &str) -> Result<Regex, ScriptError> {
        if let Some(re) = self.regex_cache.borrow().get(pattern) {
            return Ok(re.clone());
        }
        trace!(pattern, "compiling regex");
        let re = Regex::new(pattern)
            .map_err(|e| ScriptError::internal(format!("invalid regex '{pattern}': {e}")))?;
        let mut cache = self.regex_cache.borrow_mut();
        if cache.len() >= REGEX_CACHE_SIZE {
            cache.clear();
        }
        cache.insert(pattern.to_owned(), re.clone());
        Ok(re)
    }

    /// Uniform in `[0, 1)`, xorshift64.
    pub(crate) fn next_random(&self) -> f64 {
        let mut s = self.rng.get();
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.rng.set(s);
        (s >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn seed() -> u64 {
    let s = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0xdeadbeef);
    if s == 0 {
        0xdeadbeef
    } else {
        s
    }
}

impl OperatorTable for Interpreter {
    fn is_operator(&self, s: &str) -> bool {
        self.operators.contains_key(s) || self.unary_operators.contains_key(s)
    }

    fn is_operator_prefix(&self, s: &str) -> bool {
        self.operator_prefixes.contains(s)
    }
}

/// Decrements the call depth when dropped.
pub(crate) struct CallDepth<'a>(&'a Interpreter);

impl Drop for CallDepth<'_> {
    fn drop(&mut self) {
        self.0.depth.set(self.0.depth.get().saturating_sub(1));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn run(interp: &Rc<Interpreter>, src: &str) -> Value {
        interp.run(src).unwrap_or_else(|e| panic!("{src}: {e}"))
    }

    #[test]
    fn operator_prefixes_cover_registered_spellings() {
        let interp = Interpreter::new();
        assert!(interp.is_operator("<="));
        assert!(interp.is_operator_prefix("<"));
        assert!(interp.is_operator_prefix("-"));
        assert!(!interp.is_operator_prefix("#"));
        assert!(interp.is_operator(DEFINE_OPERATOR));
    }

    #[test]
    fn host_registered_operator_is_tokenized_and_parsed() {
        let mut interp = Interpreter::new();
        interp.register_operator("<=>", 10, Assoc::Left, |ctx, _, a, b| {
            let (a, b) = (a.eval(ctx)?, b.eval(ctx)?);
            Ok(Value::number(a.compare(&b) as i8 as f64))
        });
        let interp = Rc::new(interp);
        assert_eq!(run(&interp, "1 <=> 2"), Value::number(-1.0));
        assert_eq!(run(&interp, "3<=2"), Value::number(0.0));
    }

    #[test]
    fn host_registered_function() {
        let mut interp = Interpreter::new();
        interp.register_function("twice", Arity::Fixed(1), |ctx, _, args| {
            let v = args[0].eval(ctx)?;
            Ok(LazyValue::of(v.mul(&Value::number(2.0))?))
        });
        let interp = Rc::new(interp);
        assert_eq!(run(&interp, "twice(21)"), Value::number(42.0));
        let err = interp.run("twice(1, 2)").unwrap_err();
        assert!(err.to_string().contains("expects 1 argument"), "{err}");
    }

    #[test]
    fn registered_global_visible() {
        let interp = Rc::new(Interpreter::new());
        interp.register_global("answer", Value::number(42.0));
        assert_eq!(run(&interp, "answer + 0"), Value::number(42.0));
        assert!(interp.global_names().contains(&"answer".to_owned()));
    }

    #[test]
    fn output_is_drained() {
        let interp = Rc::new(Interpreter::new());
        run(&interp, "print('a'); print(1+1)");
        assert_eq!(interp.take_output(), vec!["a".to_owned(), "2".to_owned()]);
        assert!(interp.take_output().is_empty());
    }

    #[test]
    fn invoke_unknown_procedure() {
        let interp = Rc::new(Interpreter::new());
        let err = interp.invoke("nope", vec![]).unwrap_err();
        assert_eq!(err.to_string(), "Function 'nope' is not defined");
    }

    #[test]
    fn random_in_unit_interval() {
        let interp = Interpreter::new();
        for _ in 0..1000 {
            let r = interp.next_random();
            assert!((0.0..1.0).contains(&r));
        }
    }

    #[test]
    fn regex_cache_reuses_compiled() {
        let interp = Interpreter::new();
        assert!(interp.regex("a+").unwrap().is_match("caab"));
        assert!(interp.regex("a+").is_ok());
        assert!(interp.regex("(").is_err());
        assert_eq!(interp.regex_cache.borrow().len(), 1);
    }

    #[test]
    fn regex_cache_is_bounded() {
        let interp = Rc::new(Interpreter::new());
        run(&interp, "loop(1000, 'a' ~ str(_))");
        let cached = interp.regex_cache.borrow().len();
        assert!(cached > 0 && cached <= REGEX_CACHE_SIZE, "{cached}");
        assert_eq!(run(&interp, "'x123' ~ '\\d+'"), Value::string("123"));
    }
}
