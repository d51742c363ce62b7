//! The host's main loop.
//!
//! Console lines arrive from a dedicated stdin thread over an [`mpsc`]
//! channel; Ctrl-C is watched by a spawned task.  A single
//! `tokio::select!` loop multiplexes both with the tick interval:
//!
//! ```text
//!   stdin thread ──(line)──┐
//!   ctrl_c task ──(sig)────┤   tokio::select! { line, signal, tick }
//!   interval ──────────────┘        │
//!                                   ├─ Console::execute → stdout
//!                                   └─ TickClock::advance → stdout
//! ```
//!
//! Script evaluation is synchronous, so while a console command runs the
//! loop is blocked.  Cancellation therefore does not go through the loop:
//! both the stdin thread (on a `stop` line) and the signal task flip the
//! shared [`CancelToken`](crate::script::CancelToken) directly, and the
//! running script sees it at its next loop head or `game_tick`.

use std::io::{self, BufRead};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::config::Config;
use crate::console::Console;
use crate::process::TickClock;
use crate::script::Interpreter;

// ── Host ──────────────────────────────────────────────────────────────────────

pub struct Host {
    console: Console,
    clock: Rc<TickClock>,
    tick: Duration,
    stdout: Stdout,
}

impl Host {
    pub fn new(interp: Rc<Interpreter>, config: &Config, quiet: bool) -> Self {
        let clock = TickClock::new(&interp);
        clock.install();
        let console = Console::new(interp, clock.clone(), config, quiet);
        Host { console, clock, tick: config.tick, stdout: tokio::io::stdout() }
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Evaluate a script file.  I/O errors are returned; script errors are
    /// printed like any console call.
    pub async fn load_script(&mut self, path: &Path) -> io::Result<()> {
        let code = std::fs::read_to_string(path)?;
        let name = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
        info!(path = %path.display(), "loading script");
        let lines = self.console.run_script(&name, &code);
        self.emit(lines).await
    }

    /// Execute one console line.  Returns `false` on `quit`.
    pub async fn run_line(&mut self, line: &str) -> io::Result<bool> {
        let reply = self.console.execute(line);
        self.emit(reply.lines).await?;
        Ok(!reply.quit)
    }

    async fn emit(&mut self, lines: Vec<String>) -> io::Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let mut text = String::new();
        for line in lines {
            text.push_str(&line);
            text.push('\n');
        }
        self.stdout.write_all(text.as_bytes()).await?;
        self.stdout.flush().await
    }

    /// Drive the console and the tick clock until `quit`, end of input, or
    /// a second Ctrl-C.
    pub async fn run(&mut self) -> io::Result<()> {
        let cancel = self.console.interpreter().cancel_token();

        // A dedicated thread owns stdin; tokio's stdin would leave a
        // blocking read behind every time select! drops its future.
        let (line_tx, mut line_rx) = mpsc::channel::<String>(16);
        let stop = cancel.clone();
        std::thread::spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim() == "stop" {
                    stop.cancel();
                }
                if line_tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });

        // `true` when the flag was already up, i.e. a second Ctrl-C.
        let (sig_tx, mut sig_rx) = mpsc::channel::<bool>(4);
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                let again = interrupt.is_cancelled();
                interrupt.cancel();
                if sig_tx.send(again).await.is_err() {
                    break;
                }
            }
        });

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(tick_ms = self.tick.as_millis() as u64, "console ready");

        loop {
            tokio::select! {
                line = line_rx.recv() => {
                    let Some(line) = line else {
                        debug!("end of input");
                        break;
                    };
                    if !self.run_line(&line).await? {
                        break;
                    }
                }

                Some(again) = sig_rx.recv() => {
                    if again {
                        break;
                    }
                    warn!("interrupted; scripting stopped");
                    self.emit(vec!["scripting stopped ('resume' to continue, Ctrl-C again to quit)".to_owned()])
                        .await?;
                }

                _ = ticker.tick() => {
                    self.clock.advance();
                    let output = self.console.drain_output();
                    if !output.is_empty() {
                        trace!(tick = self.clock.now(), lines = output.len(), "scheduled output");
                    }
                    self.emit(output).await?;
                }
            }
        }

        self.clock.kill_all();
        info!("console closed");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
