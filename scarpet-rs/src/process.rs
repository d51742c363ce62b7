//! Repeating scripts driven by the host tick counter.
//!
//! [`ProcessScheduler`] holds the scripts registered with the console's
//! `every` command.  Each host tick the event loop (or a script yielding
//! through `game_tick`) calls [`ProcessScheduler::take_ready`] to collect
//! the processes that are due, evaluates them, then hands each back via
//! [`ProcessScheduler::reschedule`] after [`Proc::tick`].
//!
//! [`TickClock`] owns the scheduler and the tick counter.  It is shared by
//! the event loop's interval timer and the interpreter's tick hook, so a
//! script blocked in `game_tick` still lets scheduled scripts run.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::console::invoker_context;
use crate::script::{Diagnostic, Expression, Interpreter, Interrupt};

// ── Proc ──────────────────────────────────────────────────────────────────────

/// A single scheduled script.
#[derive(Debug, Clone)]
pub struct Proc {
    /// Monotonically increasing process ID.
    pub id: u32,
    /// The parsed script, evaluated in a fresh context on every run.
    pub expr: Rc<Expression>,
    /// Ticks between runs.
    pub interval: u64,
    /// Tick at which this process should next run.
    pub next_tick: u64,
    /// Remaining runs; `None` means run forever.
    pub runs_left: Option<u32>,
}

impl Proc {
    /// Consume one run and advance `next_tick`.
    ///
    /// Returns `true` if the process should continue.
    pub fn tick(&mut self) -> bool {
        if let Some(ref mut n) = self.runs_left {
            *n = n.saturating_sub(1);
            if *n == 0 {
                return false;
            }
        }
        // From the scheduled tick, not the current one, so a late run does
        // not shift the whole series.
        self.next_tick += self.interval;
        true
    }
}

// ── ProcessScheduler ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ProcessScheduler {
    procs: Vec<Proc>,
    next_id: u32,
}

impl Default for ProcessScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessScheduler {
    pub fn new() -> Self {
        Self { procs: Vec::new(), next_id: 1 }
    }

    /// Schedule `expr` every `interval` ticks (at least 1), starting
    /// `interval` ticks after `now`.  Returns the assigned process ID.
    pub fn add(&mut self, expr: Expression, interval: u64, count: Option<u32>, now: u64) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        let interval = interval.max(1);
        self.procs.push(Proc {
            id,
            expr: Rc::new(expr),
            interval,
            next_tick: now + interval,
            runs_left: count,
        });
        id
    }

    /// Remove a process by ID.  Returns `true` if found.
    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.procs.len();
        self.procs.retain(|p| p.id != id);
        self.procs.len() < before
    }

    pub fn kill_all(&mut self) {
        self.procs.clear();
    }

    /// Remove and return all processes due at or before `tick`.
    pub fn take_ready(&mut self, tick: u64) -> Vec<Proc> {
        let (ready, pending): (Vec<Proc>, Vec<Proc>) =
            self.procs.drain(..).partition(|p| p.next_tick <= tick);
        self.procs = pending;
        ready
    }

    /// Put a process back after running it.
    ///
    /// Call [`Proc::tick`] first; if it returned `false`, drop the process
    /// instead of rescheduling it.
    pub fn reschedule(&mut self, proc: Proc) {
        self.procs.push(proc);
    }

    pub fn list(&self) -> &[Proc] {
        &self.procs
    }
}

// ── TickClock ─────────────────────────────────────────────────────────────────

/// Host tick counter plus the scheduled scripts it drives.
pub struct TickClock {
    interp: Weak<Interpreter>,
    scheduler: RefCell<ProcessScheduler>,
    tick: Cell<u64>,
    /// Set while due processes run; a nested `game_tick` only counts.
    running: Cell<bool>,
}

impl TickClock {
    pub fn new(interp: &Rc<Interpreter>) -> Rc<Self> {
        Rc::new(TickClock {
            interp: Rc::downgrade(interp),
            scheduler: RefCell::new(ProcessScheduler::new()),
            tick: Cell::new(0),
            running: Cell::new(false),
        })
    }

    /// Make `game_tick` advance this clock.  With a budget, the hook then
    /// sleeps out whatever is left of it.
    pub fn install(self: &Rc<Self>) {
        let Some(interp) = self.interp.upgrade() else { return };
        let clock = Rc::downgrade(self);
        interp.control().set_tick_hook(Some(Rc::new(move |budget: Option<Duration>| {
            let start = Instant::now();
            if let Some(clock) = clock.upgrade() {
                clock.advance();
            }
            if let Some(rest) = budget.and_then(|b| b.checked_sub(start.elapsed())) {
                std::thread::sleep(rest);
            }
        })));
    }

    pub fn now(&self) -> u64 {
        self.tick.get()
    }

    pub fn schedule(&self, expr: Expression, interval: u64, count: Option<u32>) -> u32 {
        let id = self.scheduler.borrow_mut().add(expr, interval, count, self.now());
        debug!(id, interval, ?count, "scheduled script");
        id
    }

    pub fn kill(&self, id: u32) -> bool {
        self.scheduler.borrow_mut().remove(id)
    }

    pub fn kill_all(&self) {
        self.scheduler.borrow_mut().kill_all();
    }

    /// Snapshot of the scheduled processes, ordered by ID.
    pub fn processes(&self) -> Vec<Proc> {
        let mut procs = self.scheduler.borrow().list().to_vec();
        procs.sort_by_key(|p| p.id);
        procs
    }

    /// Count one tick and run whatever is due.
    ///
    /// Nothing runs while the cancel flag is up.  A process whose run
    /// fails is dropped; its diagnostic goes to the interpreter output.
    pub fn advance(&self) {
        let tick = self.tick.get() + 1;
        self.tick.set(tick);
        if self.running.replace(true) {
            return;
        }
        if let Some(interp) = self.interp.upgrade() {
            if !interp.cancel_token().is_cancelled() {
                let ready = self.scheduler.borrow_mut().take_ready(tick);
                for proc in ready {
                    self.run_one(&interp, proc, tick);
                }
            }
        }
        self.running.set(false);
    }

    fn run_one(&self, interp: &Rc<Interpreter>, mut proc: Proc, tick: u64) {
        trace!(id = proc.id, tick, "running scheduled script");
        let sink = Rc::downgrade(interp);
        let result = {
            let _guard = interp.control().install_snooper(Rc::new(move |d: &Diagnostic| {
                if let Some(interp) = sink.upgrade() {
                    for line in d.lines() {
                        interp.print(line.to_owned());
                    }
                }
            }));
            proc.expr.eval(&mut invoker_context(interp, [0.0; 3]))
        };
        match result {
            Err(Interrupt::Error(e)) => {
                debug!(id = proc.id, error = %e, "scheduled script failed");
                interp.print(format!("process {} stopped", proc.id));
            }
            Err(Interrupt::Exit) | Ok(_) => {
                if proc.tick() {
                    self.scheduler.borrow_mut().reschedule(proc);
                }
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
