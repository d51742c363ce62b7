//! `.scarpetrc` configuration file parser.
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `/set <name>=<value>` or `/set <name> <value>` | host setting (`tick_ms`, `scan_limit`, `echo`) |
//! | `/global <name>=<literal>` | pre-bind a global variable |
//! | `/load <path>` | evaluate a script file at start-up |
//! | Lines starting with `;` | comment, ignored |
//! | Any other `/command` | silently skipped |

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::script::value::parse_number;
use crate::script::{Interpreter, Value};

pub const DEFAULT_TICK: Duration = Duration::from_millis(50);
pub const DEFAULT_SCAN_LIMIT: u64 = 32_768;

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Host settings and start-up bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Length of one host tick.
    pub tick: Duration,
    /// Largest volume the `scan` console command will evaluate.
    pub scan_limit: u64,
    /// Echo console lines before running them.
    pub echo: bool,
    /// Globals registered before any user code runs.
    pub globals: Vec<(String, Value)>,
    /// Script files evaluated at start-up, in order.
    pub loads: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tick: DEFAULT_TICK,
            scan_limit: DEFAULT_SCAN_LIMIT,
            echo: false,
            globals: Vec::new(),
            loads: Vec::new(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an rc string.
    ///
    /// Unknown directives are skipped.  Returns the config and a list of
    /// errors on recognised but malformed lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }

            let Some(rest) = line.strip_prefix('/') else { continue };

            let (cmd, args_str) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));
            let args_str = args_str.trim();

            let result = match cmd {
                "set" => config.parse_set(args_str),
                "global" => config.parse_global(args_str),
                "load" if args_str.is_empty() => Err("/load requires a path".to_owned()),
                "load" => {
                    config.loads.push(PathBuf::from(args_str));
                    Ok(())
                }
                _ => Ok(()),
            };
            if let Err(message) = result {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse an rc file.  Relative `/load` paths are resolved
    /// against the file's directory.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        let (mut config, errors) = Self::load_str(&s);
        if let Some(dir) = path.parent() {
            for load in &mut config.loads {
                if load.is_relative() {
                    *load = dir.join(&*load);
                }
            }
        }
        debug!(path = %path.display(), errors = errors.len(), "loaded config");
        Ok((config, errors))
    }

    /// Register the configured globals.
    pub fn apply(&self, interp: &Interpreter) {
        for (name, value) in &self.globals {
            interp.register_global(name, value.clone());
        }
    }

    // ── /set ──────────────────────────────────────────────────────────────────

    fn parse_set(&mut self, args: &str) -> Result<(), String> {
        let (name, value) = split_assignment(args).ok_or_else(|| "usage: /set <name>=<value>".to_owned())?;
        match name {
            "tick_ms" => {
                let ms: u64 = value.parse().map_err(|_| format!("invalid tick_ms: {value}"))?;
                if ms == 0 {
                    return Err("tick_ms must be positive".to_owned());
                }
                self.tick = Duration::from_millis(ms);
            }
            "scan_limit" => {
                self.scan_limit = value.parse().map_err(|_| format!("invalid scan_limit: {value}"))?;
            }
            "echo" => {
                self.echo = match value {
                    "1" | "on" | "true" => true,
                    "0" | "off" | "false" => false,
                    _ => return Err(format!("invalid echo: {value}")),
                };
            }
            _ => return Err(format!("unknown setting '{name}'")),
        }
        Ok(())
    }

    // ── /global ───────────────────────────────────────────────────────────────

    fn parse_global(&mut self, args: &str) -> Result<(), String> {
        let (name, literal) =
            split_assignment(args).ok_or_else(|| "usage: /global <name>=<literal>".to_owned())?;
        let valid = name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_alphanumeric() || c == '_');
        if !valid {
            return Err(format!("invalid variable name '{name}'"));
        }
        let value = if let Some(quoted) = literal.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
            Value::string(quoted)
        } else if let Some(n) = parse_number(literal) {
            Value::number(n)
        } else {
            Value::string(literal)
        };
        self.globals.retain(|(n, _)| n != name);
        self.globals.push((name.to_owned(), value));
        Ok(())
    }
}

/// `name=value` or `name value`.
fn split_assignment(args: &str) -> Option<(&str, &str)> {
    let (name, value) = args
        .split_once('=')
        .or_else(|| args.split_once(|c: char| c.is_ascii_whitespace()))?;
    let (name, value) = (name.trim(), value.trim());
    (!name.is_empty()).then_some((name, value))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let (c, errs) = Config::load_str("");
        assert!(errs.is_empty());
        assert_eq!(c, Config::default());
    }

    #[test]
    fn set_equals_syntax() {
        let (c, errs) = Config::load_str("/set tick_ms=20\n/set scan_limit=100\n/set echo=on");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(c.tick, Duration::from_millis(20));
        assert_eq!(c.scan_limit, 100);
        assert!(c.echo);
    }

    #[test]
    fn set_space_syntax() {
        let (c, _) = Config::load_str("/set tick_ms 10");
        assert_eq!(c.tick, Duration::from_millis(10));
    }

    #[test]
    fn malformed_settings_reported_with_line() {
        let (c, errs) = Config::load_str("; header\n/set tick_ms=fast\n/set colour=red\n/set tick_ms=0");
        assert_eq!(errs.len(), 3);
        assert_eq!(errs[0].line, 2);
        assert_eq!(errs[1].to_string(), "line 3: unknown setting 'colour'");
        assert_eq!(c.tick, DEFAULT_TICK);
    }

    #[test]
    fn globals_parse_literals() {
        let (c, errs) = Config::load_str("/global size=16\n/global greeting='hi there'\n/global mode=fast");
        assert!(errs.is_empty(), "{errs:?}");
        assert_eq!(c.globals[0], ("size".to_owned(), Value::number(16.0)));
        assert_eq!(c.globals[1], ("greeting".to_owned(), Value::string("hi there")));
        assert_eq!(c.globals[2], ("mode".to_owned(), Value::string("fast")));
    }

    #[test]
    fn global_redefinition_keeps_last() {
        let (c, _) = Config::load_str("/global a=1\n/global a=2");
        assert_eq!(c.globals, vec![("a".to_owned(), Value::number(2.0))]);
    }

    #[test]
    fn invalid_global_name() {
        let (_, errs) = Config::load_str("/global 9lives=1");
        assert_eq!(errs.len(), 1);
    }

    #[test]
    fn unknown_commands_silently_skipped() {
        let (_, errs) = Config::load_str("/def foo = bar\nplain text\n;; comment");
        assert!(errs.is_empty());
    }

    #[test]
    fn apply_registers_globals() {
        let (c, _) = Config::load_str("/global size=16");
        let interp = std::rc::Rc::new(Interpreter::new());
        c.apply(&interp);
        assert_eq!(interp.run("size * 2").unwrap(), Value::number(32.0));
    }

    #[test]
    fn load_paths_resolve_against_rc_dir() {
        let dir = tempfile::tempdir().unwrap();
        let rc = dir.path().join(".scarpetrc");
        let mut f = std::fs::File::create(&rc).unwrap();
        writeln!(f, "/load lib.sc\n/load /abs/x.sc").unwrap();
        let (c, errs) = Config::load_file(&rc).unwrap();
        assert!(errs.is_empty());
        assert_eq!(c.loads, vec![dir.path().join("lib.sc"), PathBuf::from("/abs/x.sc")]);
    }
}
