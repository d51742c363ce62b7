//! Expression tokenizer.
//!
//! Converts source text into classified [`Token`]s, one at a time
//! (pull-style, via [`Tokenizer::next_token`] or the [`Iterator`] impl).
//! Whitespace is skipped but still advances the line/column counters so
//! every token knows where it came from.
//!
//! Operators are not hard-coded: the tokenizer asks an [`OperatorTable`]
//! which strings are operators and scans them greedily, backtracking to the
//! longest complete match.  Host-registered operators of any length are
//! therefore recognised without touching this module.

use std::fmt;
use std::rc::Rc;

use super::error::{ScriptError, Site, Source};

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Variable,
    Function,
    Literal,
    HexLiteral,
    StringLiteral,
    Operator,
    UnaryOperator,
    OpenParen,
    CloseParen,
    Comma,
}

impl TokenKind {
    /// Tokens that end an operand.  Nothing but an operator, `,` or `)` may
    /// follow them.
    fn ends_operand(self) -> bool {
        matches!(
            self,
            TokenKind::Variable
                | TokenKind::Function
                | TokenKind::Literal
                | TokenKind::HexLiteral
                | TokenKind::StringLiteral
                | TokenKind::CloseParen
        )
    }

    fn starts_operand(self) -> bool {
        matches!(
            self,
            TokenKind::Variable
                | TokenKind::Function
                | TokenKind::Literal
                | TokenKind::HexLiteral
                | TokenKind::StringLiteral
                | TokenKind::OpenParen
        )
    }

    /// A sign-like operator after one of these is unary.
    fn precedes_unary(kind: Option<TokenKind>) -> bool {
        matches!(
            kind,
            None | Some(
                TokenKind::Operator
                    | TokenKind::UnaryOperator
                    | TokenKind::OpenParen
                    | TokenKind::Comma
            )
        )
    }
}

/// A classified piece of source text.
///
/// `pos`, `line` and `column` are zero-based and counted in characters.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub surface: String,
    pub pos: usize,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.surface)
    }
}

// ── OperatorTable ─────────────────────────────────────────────────────────────

/// The set of operator spellings the tokenizer should recognise.
///
/// Implemented by [`Interpreter`](super::interp::Interpreter) from its
/// binary and unary operator registries.
pub trait OperatorTable {
    /// `true` when `s` is a complete registered operator (binary or unary).
    fn is_operator(&self, s: &str) -> bool;

    /// `true` when at least one registered operator starts with `s`
    /// (including the operator equal to `s`).
    fn is_operator_prefix(&self, s: &str) -> bool;
}

// ── Tokenizer ─────────────────────────────────────────────────────────────────

pub struct Tokenizer<'a> {
    source: Rc<Source>,
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    previous: Option<Token>,
    operators: &'a dyn OperatorTable,
    /// Reject operand-after-operand sequences such as `3 4` or `)(`.
    validate: bool,
    failed: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(code: &str, operators: &'a dyn OperatorTable) -> Self {
        Self::for_source(Rc::new(Source::anonymous(code)), operators)
    }

    pub fn for_source(source: Rc<Source>, operators: &'a dyn OperatorTable) -> Self {
        let chars = source.code.chars().collect();
        Tokenizer {
            source,
            chars,
            pos: 0,
            line: 0,
            column: 0,
            previous: None,
            operators,
            validate: true,
            failed: false,
        }
    }

    /// A tokenizer that skips adjacency validation.
    ///
    /// Used by hosts that want to classify a loose list of literal arguments
    /// (`5 'foo' -3`) without treating it as an expression.
    pub fn simple_pass(code: &str, operators: &'a dyn OperatorTable) -> Self {
        let mut t = Self::new(code, operators);
        t.validate = false;
        t
    }

    /// `true` if another token remains.  Consumes leading whitespace.
    pub fn has_next(&mut self) -> bool {
        self.skip_whitespace();
        !self.failed && self.pos < self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn error(&self, token: Token, message: String) -> ScriptError {
        ScriptError::syntax(message).at(&Site::new(token, self.source.clone()))
    }

    /// Produce the next token, `Ok(None)` at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, ScriptError> {
        if self.failed {
            return Ok(None);
        }
        self.skip_whitespace();
        let Some(ch) = self.peek() else {
            return Ok(None);
        };

        let mut token = Token {
            kind: TokenKind::Literal,
            surface: String::new(),
            pos: self.pos,
            line: self.line,
            column: self.column,
        };

        if ch.is_ascii_digit() || (ch == '.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())) {
            self.read_number(&mut token)?;
        } else if ch == '\'' {
            self.read_string(&mut token)?;
        } else if ch.is_alphabetic() || ch == '_' {
            self.read_identifier(&mut token);
        } else if matches!(ch, '(' | ')' | ',') {
            self.bump();
            token.surface.push(ch);
            token.kind = match ch {
                '(' => TokenKind::OpenParen,
                ')' => TokenKind::CloseParen,
                _ => TokenKind::Comma,
            };
        } else {
            self.read_operator(&mut token)?;
        }

        if self.validate {
            if let Some(prev) = &self.previous {
                let call_paren =
                    prev.kind == TokenKind::Function && token.kind == TokenKind::OpenParen;
                if !call_paren && prev.kind.ends_operand() && token.kind.starts_operand() {
                    let message = format!(
                        "'{}' at pos {} is not allowed after '{}' at pos {}",
                        token.surface,
                        token.pos + 1,
                        prev.surface,
                        prev.pos + 1
                    );
                    self.failed = true;
                    return Err(self.error(token, message));
                }
            }
        }

        self.previous = Some(token.clone());
        Ok(Some(token))
    }

    fn read_number(&mut self, token: &mut Token) -> Result<(), ScriptError> {
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            token.kind = TokenKind::HexLiteral;
            for _ in 0..2 {
                if let Some(c) = self.bump() {
                    token.surface.push(c);
                }
            }
            while let Some(c) = self.peek().filter(char::is_ascii_hexdigit) {
                self.bump();
                token.surface.push(c);
            }
            if token.surface.len() == 2 {
                let message = format!("malformed hex literal '{}'", token.surface);
                self.failed = true;
                return Err(self.error(token.clone(), message));
            }
            return Ok(());
        }

        token.kind = TokenKind::Literal;
        self.take_digits(token);
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            token.surface.push('.');
            self.take_digits(token);
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let digit_at = if matches!(self.peek_at(1), Some('+' | '-')) { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                for _ in 0..digit_at {
                    if let Some(c) = self.bump() {
                        token.surface.push(c);
                    }
                }
                self.take_digits(token);
            }
        }
        Ok(())
    }

    fn take_digits(&mut self, token: &mut Token) {
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            self.bump();
            token.surface.push(c);
        }
    }

    fn read_string(&mut self, token: &mut Token) -> Result<(), ScriptError> {
        token.kind = TokenKind::StringLiteral;
        self.bump();
        loop {
            match self.bump() {
                Some('\'') => return Ok(()),
                Some(c) => token.surface.push(c),
                None => {
                    self.failed = true;
                    return Err(self.error(token.clone(), "unterminated string literal".to_owned()));
                }
            }
        }
    }

    fn read_identifier(&mut self, token: &mut Token) {
        while let Some(c) = self.peek().filter(|c| c.is_alphanumeric() || *c == '_') {
            self.bump();
            token.surface.push(c);
        }
        // `foo   (` is still a call.
        self.skip_whitespace();
        token.kind = if self.peek() == Some('(') {
            TokenKind::Function
        } else {
            TokenKind::Variable
        };
    }

    /// Greedy scan with backtrack: grow the candidate while it is still a
    /// prefix of some operator, remember the longest complete operator seen,
    /// then rewind to it.
    fn read_operator(&mut self, token: &mut Token) -> Result<(), ScriptError> {
        let mut candidate = String::new();
        let mut longest = 0;
        let mut offset = 0;
        while let Some(c) = self.peek_at(offset) {
            candidate.push(c);
            if !self.operators.is_operator_prefix(&candidate) {
                candidate.pop();
                break;
            }
            offset += 1;
            if self.operators.is_operator(&candidate) {
                longest = offset;
            }
        }

        if longest == 0 {
            let shown = if candidate.is_empty() {
                self.peek().map(String::from).unwrap_or_default()
            } else {
                candidate
            };
            token.surface = shown.clone();
            self.failed = true;
            return Err(self.error(token.clone(), format!("unknown operator '{shown}'")));
        }

        for _ in 0..longest {
            if let Some(c) = self.bump() {
                token.surface.push(c);
            }
        }
        token.kind = if TokenKind::precedes_unary(self.previous.as_ref().map(|t| t.kind)) {
            TokenKind::UnaryOperator
        } else {
            TokenKind::Operator
        };
        Ok(())
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token, ScriptError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

/// Tokenize a whole expression.
pub fn tokenize(source: Rc<Source>, operators: &dyn OperatorTable) -> Result<Vec<Token>, ScriptError> {
    Tokenizer::for_source(source, operators).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct Ops(HashSet<&'static str>);

    impl Ops {
        fn standard() -> Self {
            Ops(["+", "-", "*", "/", "<", "<=", "==", "=", "!", "!=", ";", "->", "^"]
                .into_iter()
                .collect())
        }
    }

    impl OperatorTable for Ops {
        fn is_operator(&self, s: &str) -> bool {
            self.0.contains(s)
        }
        fn is_operator_prefix(&self, s: &str) -> bool {
            self.0.iter().any(|op| op.starts_with(s))
        }
    }

    fn lex(src: &str) -> Vec<Token> {
        let ops = Ops::standard();
        Tokenizer::new(src, &ops).collect::<Result<_, _>>().expect("tokenize failed")
    }

    fn kinds(src: &str) -> Vec<(TokenKind, String)> {
        lex(src).into_iter().map(|t| (t.kind, t.surface)).collect()
    }

    fn lex_err(src: &str) -> ScriptError {
        let ops = Ops::standard();
        Tokenizer::new(src, &ops)
            .collect::<Result<Vec<_>, _>>()
            .expect_err("expected a syntax error")
    }

    #[test]
    fn simple_arithmetic() {
        use TokenKind::*;
        assert_eq!(
            kinds("3+4*2"),
            vec![
                (Literal, "3".into()),
                (Operator, "+".into()),
                (Literal, "4".into()),
                (Operator, "*".into()),
                (Literal, "2".into()),
            ]
        );
    }

    #[test]
    fn longest_operator_wins() {
        assert_eq!(kinds("a<=b")[1], (TokenKind::Operator, "<=".into()));
        assert_eq!(kinds("a<b")[1], (TokenKind::Operator, "<".into()));
        assert_eq!(kinds("f(a)->a")[4], (TokenKind::Operator, "->".into()));
    }

    #[test]
    fn operator_scan_backtracks() {
        // "-->" is registered; "--" is only a prefix, so "--3" must split.
        let ops = Ops(["-", "-->"].into_iter().collect());
        let toks: Vec<Token> = Tokenizer::new("a-->b", &ops).collect::<Result<_, _>>().unwrap();
        assert_eq!(toks[1].surface, "-->");
        let toks: Vec<Token> = Tokenizer::new("a--3", &ops).collect::<Result<_, _>>().unwrap();
        assert_eq!(toks[1].surface, "-");
        assert_eq!(toks[1].kind, TokenKind::Operator);
        assert_eq!(toks[2].surface, "-");
        assert_eq!(toks[2].kind, TokenKind::UnaryOperator);
    }

    #[test]
    fn unary_classification() {
        assert_eq!(kinds("-3")[0].0, TokenKind::UnaryOperator);
        assert_eq!(kinds("(-3)")[1].0, TokenKind::UnaryOperator);
        assert_eq!(kinds("f(1,-3)")[4].0, TokenKind::UnaryOperator);
        assert_eq!(kinds("4*-3")[2].0, TokenKind::UnaryOperator);
        assert_eq!(kinds("4-3")[1].0, TokenKind::Operator);
        assert_eq!(kinds("x -3")[1].0, TokenKind::Operator);
    }

    #[test]
    fn function_vs_variable() {
        assert_eq!(kinds("foo(1)")[0].0, TokenKind::Function);
        assert_eq!(kinds("foo   (1)")[0].0, TokenKind::Function);
        assert_eq!(kinds("foo + 1")[0].0, TokenKind::Variable);
    }

    #[test]
    fn numeric_forms() {
        assert_eq!(kinds("0xFF")[0], (TokenKind::HexLiteral, "0xFF".into()));
        assert_eq!(kinds("1.5e-3")[0], (TokenKind::Literal, "1.5e-3".into()));
        assert_eq!(kinds(".25")[0], (TokenKind::Literal, ".25".into()));
        assert_eq!(kinds("2E+10")[0], (TokenKind::Literal, "2E+10".into()));
    }

    #[test]
    fn string_literal_verbatim() {
        assert_eq!(kinds("'a b\\n'")[0], (TokenKind::StringLiteral, "a b\\n".into()));
        assert_eq!(lex_err("'open").message, "unterminated string literal");
    }

    #[test]
    fn adjacent_operands_rejected() {
        let err = lex_err("3 4");
        assert!(err.message.contains("'4'"), "{}", err.message);
        assert!(err.message.contains("'3'"), "{}", err.message);
        assert!(lex_err("foo(3)(4)").message.contains("'('"));
        lex_err("'a' 'b'");
        lex_err("x y");
    }

    #[test]
    fn simple_pass_skips_adjacency() {
        let ops = Ops::standard();
        let toks: Vec<Token> = Tokenizer::simple_pass("5 'foo' -3", &ops)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(toks.len(), 4);
    }

    #[test]
    fn unknown_operator() {
        let err = lex_err("3 # 4");
        assert_eq!(err.message, "unknown operator '#'");
        assert_eq!(err.site.unwrap().token.pos, 2);
    }

    #[test]
    fn positions_track_lines() {
        let toks = lex("a = 1;\n  b = 2");
        let b = toks.iter().find(|t| t.surface == "b").unwrap();
        assert_eq!((b.line, b.column, b.pos), (1, 2, 9));
    }

    #[test]
    fn has_next_ignores_trailing_whitespace() {
        let ops = Ops::standard();
        let mut t = Tokenizer::new("1   ", &ops);
        assert!(t.has_next());
        t.next_token().unwrap();
        assert!(!t.has_next());
    }
}
