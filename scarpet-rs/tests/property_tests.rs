use std::rc::Rc;

use proptest::prelude::*;
use scarpet::script::error::Source;
use scarpet::script::token::{tokenize, Token, TokenKind, Tokenizer};
use scarpet::script::value::{format_number, parse_number};
use scarpet::script::{Interpreter, Value};

fn tokens(interp: &Interpreter, src: &str) -> Result<Vec<Token>, String> {
    tokenize(Rc::new(Source::anonymous(src)), interp).map_err(|e| e.message)
}

/// Every operator spelling the standard interpreter knows.
const OPERATORS: &[&str] = &[
    ":", "~", "^", "*", "/", "%", "+", "-", ">", ">=", "<", "<=", "==", "!=", "&&", "||", "=", "+=",
    "<>", "->", ";", "!",
];

proptest! {
    /// Tokenizing arbitrary input returns Ok or Err but never panics.
    #[test]
    fn tokenizer_never_panics(s in "\\PC{0,64}") {
        let interp = Interpreter::new();
        let _ = tokens(&interp, &s);
        let _ = Tokenizer::simple_pass(&s, &interp).collect::<Vec<_>>();
    }

    /// Parsing arbitrary input never panics either.
    #[test]
    fn parser_never_panics(s in "[a-z0-9 +*/%(),;:~<>=!'-]{0,40}") {
        let interp = Interpreter::new();
        let _ = interp.parse(&s);
    }

    /// Between two operands, every registered binary operator comes out as
    /// exactly one token with its full spelling.
    #[test]
    fn greedy_longest_match(op in prop::sample::select(OPERATORS), a in 0u32..100, b in 0u32..100) {
        prop_assume!(op != "!");
        let interp = Interpreter::new();
        let src = format!("{a}{op}{b}");
        let toks = tokens(&interp, &src).unwrap();
        prop_assert_eq!(toks.len(), 3, "{}", src);
        prop_assert_eq!(&toks[1].surface, op);
    }

    /// A `-` is unary exactly when the token before it is absent, an
    /// operator, `(` or `,`; the rest of the input does not matter.
    #[test]
    fn sign_classification_depends_only_on_predecessor(
        prefix in prop::sample::select(vec!["", "(", "l(1,", "2*", "2+", "x", "3", ")", "'s'"]),
        n in 0u32..1000,
        suffix in prop::sample::select(vec!["", "+1", "*x", ")"]),
    ) {
        let interp = Interpreter::new();
        let src = format!("{prefix}-{n}{suffix}");
        let toks: Vec<Token> = Tokenizer::simple_pass(&src, &interp)
            .collect::<Result<_, _>>()
            .unwrap();
        let i = toks.iter().position(|t| t.surface == "-").unwrap();
        let expected_unary = match i.checked_sub(1).map(|p| toks[p].kind) {
            None => true,
            Some(k) => matches!(
                k,
                TokenKind::Operator | TokenKind::UnaryOperator | TokenKind::OpenParen | TokenKind::Comma
            ),
        };
        let kind = toks[i].kind;
        prop_assert_eq!(kind == TokenKind::UnaryOperator, expected_unary, "{}", src);
    }

    /// Integral values print without a fraction and parse back exactly.
    #[test]
    fn integral_numbers_round_trip(n in -1_000_000_000i64..1_000_000_000) {
        let text = format_number(n as f64);
        prop_assert_eq!(&text, &n.to_string());
        prop_assert_eq!(parse_number(&text), Some(n as f64));
    }

    /// Finite floats survive print-then-parse.
    #[test]
    fn float_numbers_round_trip(x in -1.0e12f64..1.0e12) {
        let text = format_number(x);
        prop_assert_eq!(parse_number(&text), Some(x));
    }

    /// Evaluation agrees with Rust integer arithmetic on small operands.
    #[test]
    fn arithmetic_matches_host(a in -1000i64..1000, b in 1i64..1000, c in -1000i64..1000) {
        let interp = Rc::new(Interpreter::new());
        let v = interp.run(&format!("{a} + {b} * {c} - {a} % {b}")).unwrap();
        let expected = (a + b * c - a % b) as f64;
        prop_assert_eq!(v, Value::number(expected));
    }

    /// A loop leaves `_` exactly as it found it, whatever the body does.
    #[test]
    fn loops_restore_underscore(n in 0u32..200, start in -50i64..50) {
        let interp = Rc::new(Interpreter::new());
        let v = interp.run(&format!("_ = {start}; loop({n}, _ = _ + 1); _")).unwrap();
        prop_assert_eq!(v, Value::number(start as f64));
    }
}
