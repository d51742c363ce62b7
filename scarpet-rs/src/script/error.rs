//! Errors raised while tokenizing, parsing and evaluating expressions.
//!
//! Every failure is a [`ScriptError`] carrying an [`ErrorKind`], a message,
//! and (once known) the [`Site`] that produced it.  Evaluation returns
//! [`EvalResult`], whose error side is an [`Interrupt`]: either a real error
//! or the cooperative [`Interrupt::Exit`] raised when a run is cancelled.

use std::fmt;
use std::rc::Rc;

use thiserror::Error;

use super::token::Token;

// ── Source / Site ─────────────────────────────────────────────────────────────

/// Source text an expression was parsed from, kept alive for diagnostics.
#[derive(Debug)]
pub struct Source {
    pub code: String,
    pub name: Option<String>,
}

impl Source {
    pub fn anonymous(code: &str) -> Self {
        Source { code: code.to_owned(), name: None }
    }

    pub fn named(name: &str, code: &str) -> Self {
        Source { code: code.to_owned(), name: Some(name.to_owned()) }
    }
}

/// A token together with the source it was read from.
#[derive(Debug, Clone)]
pub struct Site {
    pub token: Token,
    pub source: Rc<Source>,
}

impl Site {
    pub fn new(token: Token, source: Rc<Source>) -> Self {
        Site { token, source }
    }
}

// ── ScriptError ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input: bad tokens, adjacency, unbalanced parentheses.
    Syntax,
    /// Runtime failure: wrong arity, unknown function, type mismatch.
    Internal,
    /// Numeric failure: division by zero, math domain errors.
    Arithmetic,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Internal => "error",
            ErrorKind::Arithmetic => "math error",
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ScriptError {
    pub kind: ErrorKind,
    pub message: String,
    pub site: Option<Site>,
    /// Innermost user procedure the error escaped from.
    pub procedure: Option<String>,
}

impl ScriptError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ScriptError { kind, message: message.into(), site: None, procedure: None }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn arithmetic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Arithmetic, message)
    }

    /// Attach a location unless a more specific one is already recorded.
    pub fn at(mut self, site: &Site) -> Self {
        if self.site.is_none() {
            self.site = Some(site.clone());
        }
        self
    }

    /// Record the procedure the error occurred in (innermost wins).
    pub fn in_procedure(mut self, name: &str) -> Self {
        if self.procedure.is_none() {
            self.procedure = Some(name.to_owned());
        }
        self
    }

    pub fn diagnostic(&self) -> Diagnostic {
        let mut headline = self.message.clone();
        let mut lines = Vec::new();
        if let Some(site) = &self.site {
            let tok = &site.token;
            if site.source.code.contains('\n') {
                headline.push_str(&format!(" at line {}, pos {}", tok.line + 1, tok.column + 1));
            } else {
                headline.push_str(&format!(" at pos {}", tok.pos + 1));
            }
            lines = snippet(&site.source.code, tok);
        }
        let origin = self
            .procedure
            .as_deref()
            .or_else(|| self.site.as_ref().and_then(|s| s.source.name.as_deref()));
        if let Some(name) = origin {
            headline.push_str(&format!(" in {name}"));
        }
        Diagnostic { kind: self.kind, headline, snippet: lines }
    }
}

// ── Interrupt ─────────────────────────────────────────────────────────────────

/// Why an evaluation stopped early.
#[derive(Debug, Clone, Error)]
pub enum Interrupt {
    #[error(transparent)]
    Error(#[from] ScriptError),
    /// The run was cancelled.  Never reported as an error.
    #[error("script execution stopped")]
    Exit,
}

impl Interrupt {
    pub fn at(self, site: &Site) -> Self {
        match self {
            Interrupt::Error(e) => Interrupt::Error(e.at(site)),
            Interrupt::Exit => Interrupt::Exit,
        }
    }

    pub fn in_procedure(self, name: &str) -> Self {
        match self {
            Interrupt::Error(e) => Interrupt::Error(e.in_procedure(name)),
            Interrupt::Exit => Interrupt::Exit,
        }
    }

    pub fn error(&self) -> Option<&ScriptError> {
        match self {
            Interrupt::Error(e) => Some(e),
            Interrupt::Exit => None,
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        self.error().is_some_and(|e| e.kind == ErrorKind::Arithmetic)
    }
}

pub type EvalResult<T> = Result<T, Interrupt>;

// ── Diagnostic ────────────────────────────────────────────────────────────────

/// A rendered error: headline plus up to three source lines, the middle one
/// split by a `HERE>>` marker at the failing column.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub headline: String,
    pub snippet: Vec<String>,
}

impl Diagnostic {
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.headline.as_str()).chain(self.snippet.iter().map(String::as_str))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.headline)?;
        for line in &self.snippet {
            write!(f, "\n{line}")?;
        }
        Ok(())
    }
}

/// Previous line, marked line and next line around `token`.
pub fn snippet(code: &str, token: &Token) -> Vec<String> {
    let lines: Vec<&str> = code.lines().collect();
    let Some(current) = lines.get(token.line) else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(3);
    if token.line > 0 {
        out.push(lines[token.line - 1].to_owned());
    }
    let split = current
        .char_indices()
        .nth(token.column)
        .map_or(current.len(), |(i, _)| i);
    out.push(format!("{} HERE>> {}", &current[..split], &current[split..]));
    if let Some(next) = lines.get(token.line + 1) {
        out.push((*next).to_owned());
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
