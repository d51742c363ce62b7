//! Cooperative cancellation, yield points and error reporting.
//!
//! Long-running scripts are stopped by flipping a shared [`CancelToken`]
//! (from another thread, a signal handler, or the console).  Loop builtins
//! check the token at every iteration head and `game_tick` checks it after
//! yielding to the host; both then unwind with [`Interrupt::Exit`].

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::error::{Diagnostic, EvalResult, Interrupt, ScriptError};

// ── CancelToken ───────────────────────────────────────────────────────────────

/// Process-wide stop flag.  Clone freely; all clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── ExecutionControl ──────────────────────────────────────────────────────────

/// Receives a rendered [`Diagnostic`] for every error that escapes a
/// top-level evaluation.
pub type ErrorSnooper = Rc<dyn Fn(&Diagnostic)>;

/// Called by `game_tick`: the host runs one tick of its own work, waiting
/// for the given budget if one is supplied.
pub type TickHook = Rc<dyn Fn(Option<Duration>)>;

#[derive(Default)]
pub struct ExecutionControl {
    cancel: CancelToken,
    snooper: RefCell<Option<ErrorSnooper>>,
    tick_hook: RefCell<Option<TickHook>>,
}

impl ExecutionControl {
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn check(&self) -> EvalResult<()> {
        if self.cancel.is_cancelled() {
            debug!("evaluation cancelled");
            Err(Interrupt::Exit)
        } else {
            Ok(())
        }
    }

    /// Hand control to the host, then check for cancellation.
    pub fn yield_point(&self, budget: Option<Duration>) -> EvalResult<()> {
        // Clone out so the hook may re-enter the interpreter.
        let hook = self.tick_hook.borrow().clone();
        if let Some(hook) = hook {
            hook(budget);
        }
        self.check()
    }

    pub fn set_tick_hook(&self, hook: Option<TickHook>) {
        *self.tick_hook.borrow_mut() = hook;
    }

    /// Install `snooper` until the returned guard is dropped, at which point
    /// the previously installed snooper (if any) is back in place.
    #[must_use = "the snooper is removed when the guard is dropped"]
    pub fn install_snooper(&self, snooper: ErrorSnooper) -> SnooperGuard<'_> {
        let previous = self.snooper.borrow_mut().replace(snooper);
        SnooperGuard { control: self, previous }
    }

    pub fn has_snooper(&self) -> bool {
        self.snooper.borrow().is_some()
    }

    /// Forward `err` to the installed snooper.
    pub fn report(&self, err: &ScriptError) {
        debug!(kind = %err.kind, "{}", err.message);
        let snooper = self.snooper.borrow().clone();
        if let Some(snooper) = snooper {
            snooper(&err.diagnostic());
        }
    }
}

pub struct SnooperGuard<'a> {
    control: &'a ExecutionControl,
    previous: Option<ErrorSnooper>,
}

impl Drop for SnooperGuard<'_> {
    fn drop(&mut self) {
        *self.control.snooper.borrow_mut() = self.previous.take();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn token_shared_between_clones() {
        let a = CancelToken::new();
        let b = a.clone();
        b.cancel();
        assert!(a.is_cancelled());
        a.resume();
        assert!(!b.is_cancelled());
    }

    #[test]
    fn check_reports_exit() {
        let c = ExecutionControl::default();
        assert!(c.check().is_ok());
        c.cancel_token().cancel();
        assert!(matches!(c.check(), Err(Interrupt::Exit)));
    }

    #[test]
    fn yield_runs_hook_then_checks() {
        let c = ExecutionControl::default();
        let token = c.cancel_token();
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        c.set_tick_hook(Some(Rc::new(move |_| {
            seen.set(seen.get() + 1);
            token.cancel();
        })));
        assert!(matches!(c.yield_point(None), Err(Interrupt::Exit)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn snooper_guard_restores_previous() {
        let c = ExecutionControl::default();
        let hits = Rc::new(RefCell::new(Vec::new()));
        let outer_hits = hits.clone();
        let _outer = c.install_snooper(Rc::new(move |d| outer_hits.borrow_mut().push(format!("outer:{}", d.headline))));
        {
            let inner_hits = hits.clone();
            let _inner = c.install_snooper(Rc::new(move |d| inner_hits.borrow_mut().push(format!("inner:{}", d.headline))));
            c.report(&ScriptError::internal("a"));
        }
        c.report(&ScriptError::internal("b"));
        assert_eq!(*hits.borrow(), vec!["inner:a".to_owned(), "outer:b".to_owned()]);
    }

    #[test]
    fn no_snooper_after_guard_dropped() {
        let c = ExecutionControl::default();
        drop(c.install_snooper(Rc::new(|_| {})));
        assert!(!c.has_snooper());
    }
}
