//! Console commands of the host binary.
//!
//! | Command | Action |
//! |---------|--------|
//! | `run <expr>` (or any other line) | evaluate once, print ` = result (time)` |
//! | `scan ox oy oz x1 y1 z1 x2 y2 z2 <expr>` | evaluate at every position of a box |
//! | `invoke <fn> [args…]` | call a stored procedure with literal arguments |
//! | `globals` | list stored procedures and global variables |
//! | `every <ticks>[x<count>] <expr>` | schedule a repeating script |
//! | `ps` / `kill <id>` | list / remove scheduled scripts |
//! | `stop` / `resume` | raise / clear the cancel flag |
//! | `quit` | leave the console |
//!
//! Every command installs an error snooper for its duration; diagnostics
//! land in the interpreter output next to whatever the script printed.

use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::Config;
use crate::process::TickClock;
use crate::script::token::{TokenKind, Tokenizer};
use crate::script::value::parse_number;
use crate::script::{
    Context, Diagnostic, ErrorKind, EvalResult, Expression, HostValue, Interpreter, Interrupt, LazyValue,
    Value,
};

/// Returned by calls made while the cancel flag is up.
pub const PAUSED: &str = "SCRIPTING PAUSED";

const HELP: &[&str] = &[
    "run <expr>                          evaluate an expression",
    "scan ox oy oz x1 y1 z1 x2 y2 z2 <expr>  evaluate over a box",
    "invoke <fn> [args...]               call a stored procedure",
    "globals                             list procedures and globals",
    "every <ticks>[x<count>] <expr>      schedule a repeating script",
    "ps                                  list scheduled scripts",
    "kill <id>                           remove a scheduled script",
    "stop | resume                       pause or resume scripting",
    "quit                                leave",
];

// ── Invoker ───────────────────────────────────────────────────────────────────

/// The opaque `p` value: who is running the script.
#[derive(Debug)]
pub struct Invoker {
    pub name: String,
}

impl HostValue for Invoker {
    fn type_name(&self) -> &str {
        "invoker"
    }

    fn display(&self) -> String {
        self.name.clone()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A run context with the invoker position (`x`, `y`, `z`) and the
/// invoker itself (`p`) bound.
pub fn invoker_context(interp: &Rc<Interpreter>, pos: [f64; 3]) -> Context {
    let bound = |name: &str, v: Value| LazyValue::of(v.bind_to(name.into()));
    Context::new(interp.clone())
        .with("x", bound("x", Value::number(pos[0])))
        .with("y", bound("y", Value::number(pos[1])))
        .with("z", bound("z", Value::number(pos[2])))
        .with("p", bound("p", Value::host(Rc::new(Invoker { name: "console".to_owned() }))))
}

// ── Command ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Run(String),
    Scan { origin: [i64; 3], from: [i64; 3], to: [i64; 3], expr: String },
    Invoke { name: String, args: String },
    Globals,
    Every { ticks: u64, count: Option<u32>, expr: String },
    Ps,
    Kill(u32),
    Stop,
    Resume,
    Quit,
    Help,
}

impl Command {
    /// Parse one console line.  Blank lines give `Ok(None)`; a line that
    /// does not start with a command word is an expression to run.
    pub fn parse(line: &str) -> Result<Option<Command>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = split_word(line);
        let cmd = match verb {
            "run" if rest.is_empty() => return Err("usage: run <expr>".to_owned()),
            "run" => Command::Run(rest.to_owned()),
            "scan" => parse_scan(rest)?,
            "invoke" => {
                let (name, args) = split_word(rest);
                if name.is_empty() {
                    return Err("usage: invoke <fn> [args...]".to_owned());
                }
                Command::Invoke { name: name.to_owned(), args: args.to_owned() }
            }
            "every" => parse_every(rest)?,
            "kill" => {
                let id = rest.parse().map_err(|_| "usage: kill <id>".to_owned())?;
                Command::Kill(id)
            }
            "globals" | "ps" | "stop" | "resume" | "quit" | "help" if !rest.is_empty() => {
                return Err(format!("'{verb}' takes no arguments"));
            }
            "globals" => Command::Globals,
            "ps" => Command::Ps,
            "stop" => Command::Stop,
            "resume" => Command::Resume,
            "quit" => Command::Quit,
            "help" => Command::Help,
            _ => Command::Run(line.to_owned()),
        };
        Ok(Some(cmd))
    }
}

fn split_word(s: &str) -> (&str, &str) {
    match s.split_once(|c: char| c.is_ascii_whitespace()) {
        Some((word, rest)) => (word, rest.trim()),
        None => (s, ""),
    }
}

fn parse_scan(rest: &str) -> Result<Command, String> {
    const USAGE: &str = "usage: scan ox oy oz x1 y1 z1 x2 y2 z2 <expr>";
    let mut coords = [0i64; 9];
    let mut rest = rest;
    for slot in &mut coords {
        let (word, tail) = split_word(rest);
        *slot = word.parse().map_err(|_| USAGE.to_owned())?;
        rest = tail;
    }
    if rest.is_empty() {
        return Err(USAGE.to_owned());
    }
    Ok(Command::Scan {
        origin: [coords[0], coords[1], coords[2]],
        from: [coords[3], coords[4], coords[5]],
        to: [coords[6], coords[7], coords[8]],
        expr: rest.to_owned(),
    })
}

/// `<ticks>[x<count>] <expr>`
fn parse_every(rest: &str) -> Result<Command, String> {
    const USAGE: &str = "usage: every <ticks>[x<count>] <expr>";
    let (period, expr) = split_word(rest);
    if expr.is_empty() {
        return Err(USAGE.to_owned());
    }
    let (ticks, count) = match period.split_once('x') {
        Some((t, c)) => (t, Some(c.parse::<u32>().map_err(|_| USAGE.to_owned())?)),
        None => (period, None),
    };
    let ticks: u64 = ticks.parse().map_err(|_| USAGE.to_owned())?;
    if ticks == 0 || count == Some(0) {
        return Err("ticks and count must be positive".to_owned());
    }
    Ok(Command::Every { ticks, count, expr: expr.to_owned() })
}

// ── Console ───────────────────────────────────────────────────────────────────

/// What a command produced.
#[derive(Debug, Default, PartialEq)]
pub struct Reply {
    pub lines: Vec<String>,
    pub quit: bool,
}

impl Reply {
    fn lines(lines: Vec<String>) -> Self {
        Reply { lines, quit: false }
    }
}

pub struct Console {
    interp: Rc<Interpreter>,
    clock: Rc<TickClock>,
    scan_limit: u64,
    echo: bool,
    quiet: bool,
}

impl Console {
    pub fn new(interp: Rc<Interpreter>, clock: Rc<TickClock>, config: &Config, quiet: bool) -> Self {
        Console { interp, clock, scan_limit: config.scan_limit, echo: config.echo, quiet }
    }

    pub fn interpreter(&self) -> &Rc<Interpreter> {
        &self.interp
    }

    pub fn execute(&self, line: &str) -> Reply {
        debug!(line, "console command");
        let mut reply = match Command::parse(line) {
            Ok(None) => return Reply::default(),
            Ok(Some(cmd)) => self.dispatch(cmd),
            Err(msg) => Reply::lines(vec![msg]),
        };
        if self.echo {
            reply.lines.insert(0, format!("> {}", line.trim()));
        }
        reply
    }

    pub fn dispatch(&self, cmd: Command) -> Reply {
        let lines = match cmd {
            Command::Run(code) => self.handle_call(|| self.run(None, &code)),
            Command::Scan { origin, from, to, expr } => self.scan(origin, from, to, &expr),
            Command::Invoke { name, args } => {
                if name.starts_with("__") {
                    vec!["Hidden functions are only callable in scripts".to_owned()]
                } else {
                    self.handle_call(|| self.invoke(&name, &args))
                }
            }
            Command::Globals => self.globals(),
            Command::Every { ticks, count, expr } => self.every(ticks, count, &expr),
            Command::Ps => self.ps(),
            Command::Kill(id) if self.clock.kill(id) => vec![format!("process {id} killed")],
            Command::Kill(id) => vec![format!("no process {id}")],
            Command::Stop => {
                self.interp.cancel_token().cancel();
                info!("scripting stopped");
                vec!["scripting stopped".to_owned()]
            }
            Command::Resume => {
                self.interp.cancel_token().resume();
                info!("scripting resumed");
                vec!["scripting resumed".to_owned()]
            }
            Command::Help => HELP.iter().map(|s| (*s).to_owned()).collect(),
            Command::Quit => return Reply { lines: Vec::new(), quit: true },
        };
        Reply::lines(lines)
    }

    /// Everything printed (and snooped) since the last call.
    pub fn drain_output(&self) -> Vec<String> {
        self.interp.take_output()
    }

    // ── Calls ─────────────────────────────────────────────────────────────────

    /// Run `call` with a snooper installed that writes diagnostics to the
    /// interpreter output.  Returns that output followed by the result line.
    fn handle_call(&self, call: impl FnOnce() -> EvalResult<String>) -> Vec<String> {
        let start = Instant::now();
        let result = {
            let _guard = self.install_snooper(|_| true);
            call()
        };
        let elapsed = start.elapsed();
        let mut lines = self.interp.take_output();
        match result {
            Ok(text) => {
                let mut text = text.lines().map(str::to_owned);
                let first = text.next().unwrap_or_default();
                lines.push(if self.quiet {
                    format!(" = {first}")
                } else {
                    format!(" = {first} ({})", format_elapsed(elapsed))
                });
                lines.extend(text);
            }
            Err(Interrupt::Exit) => lines.push(Interrupt::Exit.to_string()),
            // Already rendered by the snooper.
            Err(Interrupt::Error(_)) => {}
        }
        lines
    }

    fn install_snooper(
        &self,
        filter: impl Fn(&Diagnostic) -> bool + 'static,
    ) -> crate::script::control::SnooperGuard<'_> {
        let sink: Weak<Interpreter> = Rc::downgrade(&self.interp);
        self.interp.control().install_snooper(Rc::new(move |d: &Diagnostic| {
            if !filter(d) {
                return;
            }
            if let Some(interp) = sink.upgrade() {
                for line in d.lines() {
                    interp.print(line.to_owned());
                }
            }
        }))
    }

    fn paused(&self) -> bool {
        self.interp.cancel_token().is_cancelled()
    }

    /// Evaluate a whole script file, naming it in diagnostics.
    pub fn run_script(&self, name: &str, code: &str) -> Vec<String> {
        self.handle_call(|| self.run(Some(name), code))
    }

    fn run(&self, name: Option<&str>, code: &str) -> EvalResult<String> {
        if self.paused() {
            return Ok(PAUSED.to_owned());
        }
        let parsed = match name {
            Some(name) => Expression::parse_named(&self.interp, name, code),
            None => self.interp.parse(code),
        };
        let expr = parsed.map_err(|e| {
            self.interp.control().report(&e);
            Interrupt::Error(e)
        })?;
        let value = expr.eval(&mut invoker_context(&self.interp, [0.0; 3]))?;
        Ok(value.to_string())
    }

    /// Arguments are literals only: numbers (optionally negated), quoted
    /// strings and bare words.  A bare word naming a global passes its
    /// value; any other bare word passes as a string.
    fn invoke(&self, name: &str, args: &str) -> EvalResult<String> {
        if self.paused() {
            return Ok(PAUSED.to_owned());
        }
        let Some(procedure) = self.interp.procedure(name) else {
            return Ok("UNDEFINED".to_owned());
        };
        let mut argv: Vec<LazyValue> = Vec::new();
        let mut sign = "";
        for token in Tokenizer::simple_pass(args, &*self.interp) {
            let token = match token {
                Ok(t) => t,
                Err(e) => return Ok(format!("Fail: {}", e.message)),
            };
            match token.kind {
                TokenKind::Variable => {
                    let lower = token.surface.to_lowercase();
                    argv.push(match self.interp.global(&lower) {
                        Some(v) => v,
                        None => LazyValue::of(Value::string(token.surface)),
                    });
                    sign = "";
                }
                TokenKind::StringLiteral => {
                    argv.push(LazyValue::of(Value::string(token.surface)));
                    sign = "";
                }
                TokenKind::Literal | TokenKind::HexLiteral => {
                    let Some(n) = parse_number(&format!("{sign}{}", token.surface)) else {
                        return Ok(format!(
                            "Fail: {sign}{} seems like a number but it is not a number. \
                             Use quotes to ensure its a string",
                            token.surface
                        ));
                    };
                    argv.push(LazyValue::of(Value::number(n)));
                    sign = "";
                }
                TokenKind::Operator | TokenKind::UnaryOperator
                    if token.surface == "-" && sign.is_empty() =>
                {
                    sign = "-";
                }
                TokenKind::Operator | TokenKind::UnaryOperator => {
                    return Ok(format!("Fail: operators, like {} are not allowed in invoke", token.surface));
                }
                TokenKind::Function => {
                    return Ok(format!(
                        "Fail: passing functions like {}() to invoke is not allowed",
                        token.surface
                    ));
                }
                TokenKind::OpenParen | TokenKind::CloseParen | TokenKind::Comma => {
                    return Ok(format!("Fail: {} is not allowed in invoke", token.surface));
                }
            }
        }

        let params: Vec<&str> = procedure.params().collect();
        if params.len() != argv.len() {
            let mut ctx = Context::new(self.interp.clone());
            let mut text = format!(
                "Fail: stored function {name} takes {} arguments, not {}:",
                params.len(),
                argv.len()
            );
            for i in 0..params.len().max(argv.len()) {
                let param = params.get(i).copied().unwrap_or("??");
                let value = argv
                    .get(i)
                    .and_then(|a| a.eval(&mut ctx).ok())
                    .map_or_else(|| "??".to_owned(), |v| v.to_string());
                text.push_str(&format!("\n{param} => {value}"));
            }
            return Ok(text);
        }
        let value = self.interp.invoke(name, argv)?;
        Ok(value.to_string())
    }

    // ── Scan ──────────────────────────────────────────────────────────────────

    /// Evaluate `code` at every position of the box `from..=to`.  `x y z`
    /// are bound relative to `origin`, `_` to the absolute position.
    /// Arithmetic errors skip a position; any other error aborts.
    fn scan(&self, origin: [i64; 3], from: [i64; 3], to: [i64; 3], code: &str) -> Vec<String> {
        let min: [i64; 3] = std::array::from_fn(|i| from[i].min(to[i]));
        let max: [i64; 3] = std::array::from_fn(|i| from[i].max(to[i]));
        let volume = (0..3).fold(1u64, |acc, i| acc.saturating_mul(max[i].abs_diff(min[i]).saturating_add(1)));
        if volume > self.scan_limit {
            return vec![format!("too many blocks to evaluate: {volume}")];
        }
        if self.paused() {
            return vec![PAUSED.to_owned()];
        }

        let _guard = self.install_snooper(|d| d.kind != ErrorKind::Arithmetic);
        let expr = match self.interp.parse(code) {
            Ok(e) => e,
            Err(e) => {
                self.interp.control().report(&e);
                return self.interp.take_output();
            }
        };

        let mut successes = 0u64;
        let mut stopped = None;
        'scan: for x in min[0]..=max[0] {
            for y in min[1]..=max[1] {
                for z in min[2]..=max[2] {
                    let rel: [f64; 3] =
                        std::array::from_fn(|i| (i128::from([x, y, z][i]) - i128::from(origin[i])) as f64);
                    let here = Value::list(vec![
                        Value::number(x as f64),
                        Value::number(y as f64),
                        Value::number(z as f64),
                    ]);
                    let mut ctx = invoker_context(&self.interp, rel)
                        .with("_", LazyValue::of(here.bind_to("_".into())));
                    match expr.eval(&mut ctx) {
                        Ok(v) if v.as_bool() => successes += 1,
                        Ok(_) => {}
                        Err(i) if i.is_arithmetic() => {}
                        Err(i) => {
                            stopped = Some(i);
                            break 'scan;
                        }
                    }
                }
            }
        }

        let mut lines = self.interp.take_output();
        match stopped {
            Some(Interrupt::Exit) => lines.push(Interrupt::Exit.to_string()),
            Some(Interrupt::Error(_)) => lines.push("Error while processing command".to_owned()),
            None => lines.push(format!("Expression successful in {successes} out of {volume} blocks")),
        }
        lines
    }

    // ── Introspection ─────────────────────────────────────────────────────────

    fn globals(&self) -> Vec<String> {
        let mut lines = vec!["Global functions:".to_owned()];
        for f in self.interp.procedures().into_iter().filter(|f| !f.name.starts_with('_')) {
            lines.push(format!("Function {} defined at: line {} pos {}", f.name, f.line, f.column));
            lines.extend(f.snippet);
            lines.push("----------------".to_owned());
        }
        lines.push("Global Variables:".to_owned());
        let mut ctx = Context::new(self.interp.clone());
        for name in self.interp.global_names() {
            let value = self
                .interp
                .global(&name)
                .and_then(|v| v.eval(&mut ctx).ok())
                .map_or_else(|| "??".to_owned(), |v| v.to_string());
            lines.push(format!("Variable {name}: {value}"));
        }
        lines
    }

    // ── Scheduling ────────────────────────────────────────────────────────────

    fn every(&self, ticks: u64, count: Option<u32>, code: &str) -> Vec<String> {
        let expr = {
            let _guard = self.install_snooper(|_| true);
            self.interp.parse(code).map_err(|e| self.interp.control().report(&e))
        };
        match expr {
            Ok(expr) => {
                let id = self.clock.schedule(expr, ticks, count);
                vec![format!("process {id} scheduled every {ticks} ticks")]
            }
            Err(()) => self.interp.take_output(),
        }
    }

    fn ps(&self) -> Vec<String> {
        let procs = self.clock.processes();
        if procs.is_empty() {
            return vec!["no scheduled scripts".to_owned()];
        }
        procs
            .iter()
            .map(|p| {
                let runs = p.runs_left.map_or_else(|| "forever".to_owned(), |n| format!("{n} left"));
                format!("{:>4}  every {} ticks  {runs}  {}", p.id, p.interval, p.expr.code())
            })
            .collect()
    }
}

/// Microseconds, switching to milliseconds above 5000µs and to seconds
/// above 10000ms.
pub fn format_elapsed(elapsed: Duration) -> String {
    let mut time = elapsed.as_micros();
    let mut unit = "µs";
    if time > 5000 {
        time /= 1000;
        unit = "ms";
    }
    if time > 10000 {
        time /= 1000;
        unit = "s";
    }
    format!("{time}{unit}")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn console() -> Console {
        let interp = Rc::new(Interpreter::new());
        let clock = TickClock::new(&interp);
        clock.install();
        Console::new(interp, clock, &Config::default(), true)
    }

    fn exec(c: &Console, line: &str) -> Vec<String> {
        c.execute(line).lines
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("  "), Ok(None));
        assert_eq!(Command::parse("run 1+1"), Ok(Some(Command::Run("1+1".into()))));
        assert_eq!(Command::parse("x = 2"), Ok(Some(Command::Run("x = 2".into()))));
        assert_eq!(
            Command::parse("every 5x3 print(1)"),
            Ok(Some(Command::Every { ticks: 5, count: Some(3), expr: "print(1)".into() }))
        );
        assert_eq!(Command::parse("kill 4"), Ok(Some(Command::Kill(4))));
        assert!(Command::parse("kill four").is_err());
        assert!(Command::parse("every 0 1").is_err());
        assert!(Command::parse("ps now").is_err());
        assert!(Command::parse("scan 1 2 3 x").is_err());
        assert_eq!(
            Command::parse("scan 0 0 0 -1 0 0 1 2 0 x > 0"),
            Ok(Some(Command::Scan {
                origin: [0, 0, 0],
                from: [-1, 0, 0],
                to: [1, 2, 0],
                expr: "x > 0".into()
            }))
        );
    }

    #[test]
    fn run_prints_result() {
        let c = console();
        assert_eq!(exec(&c, "run 3+4*2"), vec![" = 11"]);
        assert_eq!(exec(&c, "print('hi'); 'done'"), vec!["hi", " = done"]);
    }

    #[test]
    fn run_binds_invoker() {
        let c = console();
        assert_eq!(exec(&c, "l(x, y, z)"), vec![" = [0, 0, 0]"]);
        assert_eq!(exec(&c, "type(p) + ':' + p"), vec![" = invoker:console"]);

        let interp = c.interpreter().clone();
        let mut ctx = invoker_context(&interp, [1.0, 2.0, 3.0]);
        let p = ctx.get_variable("p").unwrap().eval(&mut ctx).unwrap();
        assert_eq!(p.as_host::<Invoker>().map(|i| i.name.as_str()), Some("console"));
        assert!(p.as_host::<String>().is_none());
    }

    #[test]
    fn run_errors_are_snooped() {
        let c = console();
        let out = exec(&c, "1 + foo");
        assert_eq!(out[0], "Variable 'foo' is not defined at pos 5");
        assert_eq!(out.len(), 2);
        let out = exec(&c, "3 4");
        assert!(out[0].contains("is not allowed after"), "{out:?}");
    }

    #[test]
    fn timing_suffix_unless_quiet() {
        let interp = Rc::new(Interpreter::new());
        let clock = TickClock::new(&interp);
        let c = Console::new(interp, clock, &Config::default(), false);
        let out = exec(&c, "1");
        assert!(out[0].starts_with(" = 1 (") && out[0].ends_with(')'), "{out:?}");
    }

    #[test]
    fn elapsed_units() {
        assert_eq!(format_elapsed(Duration::from_micros(42)), "42µs");
        assert_eq!(format_elapsed(Duration::from_micros(5001)), "5ms");
        assert_eq!(format_elapsed(Duration::from_millis(20_000)), "20s");
    }

    #[test]
    fn invoke_literal_arguments() {
        let c = console();
        exec(&c, "f(a, b, c) -> str(a) + '|' + b + '|' + c");
        assert_eq!(exec(&c, "invoke f -3 'two words' pi"), vec![" = -3|two words|3.141592653589793"]);
        assert_eq!(exec(&c, "invoke f 0x10 bare -0x1"), vec![" = 16|bare|-1"]);
    }

    #[test]
    fn invoke_rejections() {
        let c = console();
        exec(&c, "g(a) -> a");
        exec(&c, "__h() -> 1");
        assert_eq!(exec(&c, "invoke nope"), vec![" = UNDEFINED"]);
        assert_eq!(exec(&c, "invoke __h"), vec!["Hidden functions are only callable in scripts"]);
        assert_eq!(exec(&c, "invoke g 1 + 2"), vec![" = Fail: operators, like + are not allowed in invoke"]);
        assert_eq!(
            exec(&c, "invoke g sin(3)"),
            vec![" = Fail: passing functions like sin() to invoke is not allowed"]
        );
        assert_eq!(
            exec(&c, "invoke g 1 2"),
            vec![" = Fail: stored function g takes 1 arguments, not 2:", "a => 1", "?? => 2"]
        );
    }

    #[test]
    fn scan_counts_truthy_positions() {
        let c = console();
        let out = exec(&c, "scan 0 0 0 -1 0 0 1 0 0 x >= 0");
        assert_eq!(out, vec!["Expression successful in 2 out of 3 blocks"]);
    }

    #[test]
    fn scan_skips_arithmetic_errors() {
        let c = console();
        let out = exec(&c, "scan 0 0 0 -2 0 0 2 0 0 1 / x");
        assert_eq!(out, vec!["Expression successful in 4 out of 5 blocks"]);
    }

    #[test]
    fn scan_aborts_on_other_errors() {
        let c = console();
        let out = exec(&c, "scan 0 0 0 0 0 0 3 0 0 nope");
        assert_eq!(out.last().map(String::as_str), Some("Error while processing command"));
        assert!(out[0].starts_with("Variable 'nope' is not defined"));
    }

    #[test]
    fn scan_respects_limit() {
        let interp = Rc::new(Interpreter::new());
        let clock = TickClock::new(&interp);
        let (config, _) = Config::load_str("/set scan_limit=8");
        let c = Console::new(interp, clock, &config, true);
        assert_eq!(exec(&c, "scan 0 0 0 0 0 0 2 2 2 1"), vec!["too many blocks to evaluate: 27"]);
    }

    #[test]
    fn scan_handles_extreme_coordinates() {
        let c = console();
        let out = exec(&c, "scan 0 0 0 -9223372036854775808 0 0 9223372036854775807 0 0 1");
        assert_eq!(out, vec![format!("too many blocks to evaluate: {}", u64::MAX)]);

        let out = exec(
            &c,
            "scan -9223372036854775808 0 0 9223372036854775807 0 0 9223372036854775807 0 0 x > 0",
        );
        assert_eq!(out, vec!["Expression successful in 1 out of 1 blocks"]);
    }

    #[test]
    fn globals_listing() {
        let c = console();
        exec(&c, "sq(n) -> n * n");
        exec(&c, "_hidden() -> 0");
        exec(&c, "global_count = 3");
        let out = exec(&c, "globals");
        assert_eq!(out[0], "Global functions:");
        assert_eq!(out[1], "Function sq defined at: line 1 pos 1");
        assert_eq!(out[2], " HERE>> sq(n) -> n * n");
        assert_eq!(out[3], "----------------");
        assert_eq!(out[4], "Global Variables:");
        assert!(out.contains(&"Variable global_count: 3".to_owned()));
        assert!(!out.iter().any(|l| l.contains("_hidden")));
    }

    #[test]
    fn stop_pauses_until_resume() {
        let c = console();
        exec(&c, "stop");
        assert_eq!(exec(&c, "1"), vec![format!(" = {PAUSED}")]);
        exec(&c, "resume");
        assert_eq!(exec(&c, "1"), vec![" = 1"]);
    }

    #[test]
    fn every_ps_kill() {
        let c = console();
        assert_eq!(exec(&c, "every 2x3 print('t')"), vec!["process 1 scheduled every 2 ticks"]);
        assert_eq!(exec(&c, "ps"), vec!["   1  every 2 ticks  3 left  print('t')"]);
        assert_eq!(exec(&c, "kill 1"), vec!["process 1 killed"]);
        assert_eq!(exec(&c, "kill 1"), vec!["no process 1"]);
        assert_eq!(exec(&c, "ps"), vec!["no scheduled scripts"]);
    }

    #[test]
    fn script_errors_name_the_source() {
        let c = console();
        let out = c.run_script("lib.sc", "a = 1;\nb = nope;\nc = 2");
        assert_eq!(out[0], "Variable 'nope' is not defined at line 2, pos 5 in lib.sc");
        assert_eq!(out[2], "b =  HERE>> nope;");
    }

    #[test]
    fn quit_sets_flag() {
        let c = console();
        assert!(c.execute("quit").quit);
        assert!(!c.execute("1").quit);
    }
}
