//! The embedded expression language.
//!
//! Everything is an expression: `;` sequences, `=` assigns, `name(a, b) ->
//! body` defines a procedure.  Operators and functions live in registries
//! on the [`Interpreter`], so hosts extend the language with the same calls
//! the standard library uses.
//!
//! - [`token`]: pull-style tokenizer with greedy operator matching
//! - [`expr`]: precedence-climbing parser and tree evaluator
//! - [`lazy`]: deferred operands ([`LazyValue`])
//! - [`context`]: local scopes, save/restore of loop variables
//! - [`control`]: cancellation, host yield hook, error snooper
//! - [`builtins`]: standard operators, functions and constants
//!
//! # Quick start
//!
//! ```rust
//! use std::rc::Rc;
//! use scarpet::script::{Interpreter, Value};
//!
//! let interp = Rc::new(Interpreter::new());
//! interp.run("sq(x) -> x * x").unwrap();
//! assert_eq!(interp.run("sq(3) + 1").unwrap(), Value::number(10.0));
//! ```

pub mod builtins;
pub mod context;
pub mod control;
pub mod error;
pub mod expr;
pub mod interp;
pub mod lazy;
pub mod procedure;
pub mod token;
pub mod value;

// Re-exports for convenience.
pub use context::Context;
pub use control::{CancelToken, ErrorSnooper, TickHook};
pub use error::{Diagnostic, ErrorKind, EvalResult, Interrupt, ScriptError};
pub use expr::Expression;
pub use interp::{Arity, Assoc, Interpreter};
pub use lazy::{EvalKind, LazyValue};
pub use procedure::ProcedureInfo;
pub use value::{HostValue, LazyList, Value};
