//! Expression parser and evaluator.
//!
//! Tokens from [`Tokenizer`](super::token::Tokenizer) are arranged into a
//! tree by precedence climbing over the interpreter's operator registry.
//! Each node is pre-wrapped in a [`LazyValue`] at parse time, so handing
//! operands to operators and arguments to functions costs nothing extra at
//! evaluation time.
//!
//! Grammar (informal):
//!
//! ```text
//! expr     := operand (binop expr)*          precedence climbing
//! operand  := unop expr | literal | variable | call | '(' expr ')'
//! call     := NAME '(' [expr (',' expr)*] ')'
//! ```
//!
//! A trailing `;` before `)`, `,` or the end of input is accepted.  A chain
//! of `;` statements becomes a single sequence node, so script length does
//! not add to tree depth; nesting is capped at [`MAX_NESTING`].

use std::fmt;
use std::rc::Rc;

use super::context::Context;
use super::error::{EvalResult, Interrupt, ScriptError, Site, Source};
use super::interp::{Assoc, BinaryFn, Interpreter, NativeFunction, OperatorImpl, UnaryFn};
use super::lazy::{EvalKind, LazyValue};
use super::procedure::UserFunction;
use super::token::{tokenize, Token, TokenKind};
use super::value::{parse_hex, Value};

/// Builtin whose arguments become assignment targets in `l(a, b) = ...`.
pub const LIST_CONSTRUCTOR: &str = "l";

/// Sequencing operator; may appear with no right operand.
pub const SEQUENCE_OPERATOR: &str = ";";

/// Deepest tree the parser builds.  Evaluation and drop both recurse once
/// per level, so anything deeper is refused as a syntax error.
pub const MAX_NESTING: usize = 200;

// ── AST ───────────────────────────────────────────────────────────────────────

pub(crate) enum Callee {
    Native(Rc<NativeFunction>),
    /// Resolved by name when evaluated; the procedure may be defined later.
    Procedure,
}

pub(crate) enum Node {
    Literal(Value),
    Variable {
        name: Rc<str>,
        /// Unbound reads yield null bound to `name` instead of failing.
        target: bool,
        site: Site,
    },
    Unary {
        imp: UnaryFn,
        operand: LazyValue,
        site: Site,
    },
    Binary {
        imp: BinaryFn,
        lhs: LazyValue,
        rhs: LazyValue,
        site: Site,
    },
    Call {
        name: Rc<str>,
        callee: Callee,
        args: Vec<Rc<Node>>,
        lazies: Vec<LazyValue>,
        site: Site,
    },
    Define {
        name: Rc<str>,
        params: Vec<Rc<str>>,
        body: Rc<Node>,
        site: Site,
    },
    /// A whole `a; b; c` chain, evaluated in a loop.
    Sequence(Vec<Rc<Node>>),
}

fn lazy(node: &Rc<Node>) -> LazyValue {
    let node = node.clone();
    LazyValue::new(move |ctx, kind| node.eval(ctx, kind))
}

impl Node {
    pub(crate) fn eval(&self, ctx: &mut Context, kind: EvalKind) -> EvalResult<Value> {
        match self {
            Node::Literal(v) => Ok(v.clone()),
            Node::Variable { name, target, site } => match ctx.get_variable(name) {
                Some(value) => Ok(value.eval_as(ctx, kind).map_err(|e| e.at(site))?.bind_to(name.clone())),
                None if *target => Ok(Value::null().bind_to(name.clone())),
                None => Err(ScriptError::internal(format!("Variable '{name}' is not defined"))
                    .at(site)
                    .into()),
            },
            Node::Unary { imp, operand, site } => imp(ctx, kind, operand).map_err(|e| e.at(site)),
            Node::Binary { imp, lhs, rhs, site } => imp(ctx, kind, lhs, rhs).map_err(|e| e.at(site)),
            Node::Call { name, callee, lazies, site, .. } => match callee {
                Callee::Native(f) => {
                    let result = (f.imp)(ctx, kind, lazies).map_err(|e| e.at(site))?;
                    result.eval_as(ctx, kind).map_err(|e| e.at(site))
                }
                Callee::Procedure => {
                    let Some(f) = ctx.interpreter().procedure(name) else {
                        return Err(ScriptError::internal(format!("Function '{name}' is not defined"))
                            .at(site)
                            .into());
                    };
                    f.call(ctx, lazies, kind).map_err(|e| e.at(site))
                }
            },
            Node::Define { name, params, body, site } => {
                ctx.interpreter()
                    .define_procedure(UserFunction::new(name, params.clone(), body.clone(), site.clone()));
                Ok(Value::string(name.clone()))
            }
            Node::Sequence(items) => {
                let Some((last, init)) = items.split_last() else {
                    return Ok(Value::null());
                };
                for item in init {
                    item.eval(ctx, EvalKind::Void)?;
                }
                last.eval(ctx, kind)
            }
        }
    }

    fn as_target(node: &Rc<Node>) -> Rc<Node> {
        match &**node {
            Node::Variable { name, site, .. } => {
                Rc::new(Node::Variable { name: name.clone(), target: true, site: site.clone() })
            }
            Node::Call { name, callee: Callee::Native(f), args, site, .. }
                if f.name == LIST_CONSTRUCTOR =>
            {
                let args: Vec<Rc<Node>> = args.iter().map(Node::as_target).collect();
                Rc::new(Node::Call {
                    name: name.clone(),
                    callee: Callee::Native(f.clone()),
                    lazies: args.iter().map(lazy).collect(),
                    args,
                    site: site.clone(),
                })
            }
            _ => node.clone(),
        }
    }
}

// ── Parser ────────────────────────────────────────────────────────────────────

/// A parsed subtree with the height of its tree.
struct Parsed {
    node: Rc<Node>,
    height: usize,
}

impl Parsed {
    fn leaf(node: Node) -> Self {
        Parsed { node: Rc::new(node), height: 1 }
    }

    /// Append `next` to a `;` chain, keeping the chain one level deep.
    fn sequence(first: Parsed, next: Parsed) -> Parsed {
        let (mut items, height) = match Rc::try_unwrap(first.node) {
            Ok(Node::Sequence(items)) => (items, first.height),
            Ok(node) => (vec![Rc::new(node)], first.height + 1),
            Err(node) => (vec![node], first.height + 1),
        };
        items.push(next.node);
        Parsed { node: Rc::new(Node::Sequence(items)), height: height.max(next.height + 1) }
    }
}

struct Parser<'a> {
    interp: &'a Interpreter,
    source: Rc<Source>,
    tokens: Vec<Token>,
    pos: usize,
    /// Current `operand` recursion depth.
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn site(&self, tok: &Token) -> Site {
        Site::new(tok.clone(), self.source.clone())
    }

    fn error_at(&self, tok: &Token, message: String) -> ScriptError {
        ScriptError::syntax(message).at(&self.site(tok))
    }

    fn error_at_end(&self, message: &str) -> ScriptError {
        match self.tokens.last() {
            Some(tok) => self.error_at(tok, message.to_owned()),
            None => ScriptError::syntax(message),
        }
    }

    fn at_operand_end(&self) -> bool {
        matches!(self.peek_kind(), None | Some(TokenKind::CloseParen | TokenKind::Comma))
    }

    // ── Grammar ───────────────────────────────────────────────────────────────

    fn expression(&mut self, min_precedence: u16) -> Result<Parsed, ScriptError> {
        let mut lhs = self.operand()?;
        loop {
            let Some(tok) = self.peek().filter(|t| t.kind == TokenKind::Operator).cloned() else {
                break;
            };
            let Some(op) = self.interp.operator(&tok.surface).cloned() else {
                return Err(self.error_at(&tok, format!("'{}' is not a binary operator", tok.surface)));
            };
            if op.precedence < min_precedence {
                break;
            }
            self.advance();
            let sequence = matches!(op.imp, OperatorImpl::Sequence);
            if sequence && self.at_operand_end() {
                break;
            }
            let next = match op.assoc {
                Assoc::Left => op.precedence + 1,
                Assoc::Right => op.precedence,
            };
            let rhs = self.expression(next)?;
            let height = lhs.height.max(rhs.height) + 1;
            if height > MAX_NESTING {
                return Err(self.error_at(&tok, format!("expression nested deeper than {MAX_NESTING} levels")));
            }
            let site = self.site(&tok);
            let node = match &op.imp {
                OperatorImpl::Sequence => {
                    lhs = Parsed::sequence(lhs, rhs);
                    continue;
                }
                OperatorImpl::Eval(imp) => Rc::new(Node::Binary {
                    imp: imp.clone(),
                    lhs: lazy(&lhs.node),
                    rhs: lazy(&rhs.node),
                    site,
                }),
                OperatorImpl::Assign(imp) => Rc::new(Node::Binary {
                    imp: imp.clone(),
                    lhs: lazy(&Node::as_target(&lhs.node)),
                    rhs: lazy(&rhs.node),
                    site,
                }),
                OperatorImpl::Define => self.definition(&lhs.node, rhs.node, &tok)?,
            };
            lhs = Parsed { node, height };
        }
        Ok(lhs)
    }

    fn operand(&mut self) -> Result<Parsed, ScriptError> {
        self.depth += 1;
        let result = if self.depth > MAX_NESTING {
            Err(self.error_at_end(&format!("expression nested deeper than {MAX_NESTING} levels")))
        } else {
            self.operand_inner()
        };
        self.depth -= 1;
        result
    }

    fn operand_inner(&mut self) -> Result<Parsed, ScriptError> {
        let Some(tok) = self.advance() else {
            return Err(self.error_at_end("unexpected end of expression"));
        };
        match tok.kind {
            TokenKind::Literal => {
                let n = tok
                    .surface
                    .parse::<f64>()
                    .map_err(|_| self.error_at(&tok, format!("malformed number '{}'", tok.surface)))?;
                Ok(Parsed::leaf(Node::Literal(Value::number(n))))
            }
            TokenKind::HexLiteral => {
                let n = parse_hex(&tok.surface[2..])
                    .ok_or_else(|| self.error_at(&tok, format!("malformed hex literal '{}'", tok.surface)))?;
                Ok(Parsed::leaf(Node::Literal(Value::number(n))))
            }
            TokenKind::StringLiteral => Ok(Parsed::leaf(Node::Literal(Value::string(tok.surface.as_str())))),
            TokenKind::Variable => Ok(Parsed::leaf(Node::Variable {
                name: tok.surface.as_str().into(),
                target: false,
                site: self.site(&tok),
            })),
            TokenKind::Function => self.call(tok),
            TokenKind::OpenParen => {
                let inner = self.expression(0)?;
                match self.advance() {
                    Some(t) if t.kind == TokenKind::CloseParen => Ok(inner),
                    Some(t) => Err(self.error_at(&t, format!("expected ')' but found '{}'", t.surface))),
                    None => Err(self.error_at(&tok, "unbalanced '('".to_owned())),
                }
            }
            TokenKind::UnaryOperator => {
                let Some(op) = self.interp.unary_operator(&tok.surface).cloned() else {
                    return Err(self.error_at(&tok, format!("'{}' is not a unary operator", tok.surface)));
                };
                let operand = self.expression(op.precedence)?;
                Ok(Parsed {
                    node: Rc::new(Node::Unary {
                        imp: op.imp.clone(),
                        operand: lazy(&operand.node),
                        site: self.site(&tok),
                    }),
                    height: operand.height + 1,
                })
            }
            TokenKind::Operator | TokenKind::CloseParen | TokenKind::Comma => {
                Err(self.error_at(&tok, format!("unexpected '{}'", tok.surface)))
            }
        }
    }

    fn call(&mut self, name_tok: Token) -> Result<Parsed, ScriptError> {
        // The tokenizer only emits Function when '(' follows.
        self.advance();
        let mut args = Vec::new();
        let mut height = 0;
        if self.peek_kind() == Some(TokenKind::CloseParen) {
            self.advance();
        } else {
            loop {
                let arg = self.expression(0)?;
                height = height.max(arg.height);
                args.push(arg.node);
                match self.advance() {
                    Some(t) if t.kind == TokenKind::Comma => {}
                    Some(t) if t.kind == TokenKind::CloseParen => break,
                    Some(t) => {
                        return Err(self.error_at(&t, format!("expected ',' or ')' but found '{}'", t.surface)))
                    }
                    None => {
                        return Err(self.error_at(&name_tok, format!("missing ')' in call to '{}'", name_tok.surface)))
                    }
                }
            }
        }

        let site = self.site(&name_tok);
        let name: Rc<str> = name_tok.surface.as_str().into();
        let callee = match self.interp.function(&name) {
            Some(f) if !f.arity.accepts(args.len()) => {
                return Err(ScriptError::internal(format!(
                    "Function '{name}' expects {}, got {}",
                    f.arity,
                    args.len()
                ))
                .at(&site));
            }
            Some(f) => Callee::Native(f.clone()),
            None => Callee::Procedure,
        };
        Ok(Parsed {
            node: Rc::new(Node::Call { name, callee, lazies: args.iter().map(lazy).collect(), args, site }),
            height: height + 1,
        })
    }

    fn definition(&self, signature: &Rc<Node>, body: Rc<Node>, arrow: &Token) -> Result<Rc<Node>, ScriptError> {
        let Node::Call { name, callee, args, site, .. } = &**signature else {
            return Err(self.error_at(arrow, "left side of '->' must look like name(params)".to_owned()));
        };
        if let Callee::Native(_) = callee {
            return Err(ScriptError::syntax(format!("cannot redefine built-in function '{name}'")).at(site));
        }
        let params = args
            .iter()
            .map(|a| match &**a {
                Node::Variable { name, .. } => Ok(name.clone()),
                _ => Err(ScriptError::syntax(format!("parameters of '{name}' must be variable names")).at(site)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Rc::new(Node::Define { name: name.clone(), params, body, site: site.clone() }))
    }
}

// ── Expression ────────────────────────────────────────────────────────────────

/// A parsed expression, ready to be evaluated any number of times.
pub struct Expression {
    root: Rc<Node>,
    source: Rc<Source>,
}

impl Expression {
    pub fn parse(interp: &Interpreter, code: &str) -> Result<Self, ScriptError> {
        Self::parse_source(interp, Rc::new(Source::anonymous(code)))
    }

    /// Like [`parse`](Self::parse), naming the source in diagnostics.
    pub fn parse_named(interp: &Interpreter, name: &str, code: &str) -> Result<Self, ScriptError> {
        Self::parse_source(interp, Rc::new(Source::named(name, code)))
    }

    fn parse_source(interp: &Interpreter, source: Rc<Source>) -> Result<Self, ScriptError> {
        let tokens = tokenize(source.clone(), interp)?;
        if tokens.is_empty() {
            return Err(ScriptError::syntax("empty expression"));
        }
        let mut parser = Parser { interp, source: source.clone(), tokens, pos: 0, depth: 0 };
        let root = parser.expression(0)?.node;
        if let Some(tok) = parser.advance() {
            return Err(parser.error_at(&tok, format!("unexpected '{}'", tok.surface)));
        }
        Ok(Expression { root, source })
    }

    pub fn code(&self) -> &str {
        &self.source.code
    }

    pub fn name(&self) -> Option<&str> {
        self.source.name.as_deref()
    }

    pub fn eval(&self, ctx: &mut Context) -> EvalResult<Value> {
        self.eval_as(ctx, EvalKind::Value)
    }

    /// Evaluate against `ctx`.  An error escaping here is passed to the
    /// interpreter's snooper; cancellation is not.
    pub fn eval_as(&self, ctx: &mut Context, kind: EvalKind) -> EvalResult<Value> {
        let result = self.root.eval(ctx, kind);
        if let Err(Interrupt::Error(e)) = &result {
            ctx.interpreter().control().report(e);
        }
        result
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression").field("code", &self.source.code).finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::error::ErrorKind;

    fn interp() -> Rc<Interpreter> {
        Rc::new(Interpreter::new())
    }

    fn eval(src: &str) -> Value {
        interp().run(src).unwrap_or_else(|e| panic!("{src}: {e}"))
    }

    fn eval_err(src: &str) -> ScriptError {
        match interp().run(src) {
            Err(Interrupt::Error(e)) => e,
            other => panic!("{src}: expected an error, got {other:?}"),
        }
    }

    #[test]
    fn precedence() {
        assert_eq!(eval("3+4*2"), Value::number(11.0));
        assert_eq!(eval("(3+4)*2"), Value::number(14.0));
        assert_eq!(eval("10-4-3"), Value::number(3.0));
        assert_eq!(eval("2^3^2"), Value::number(512.0));
        assert_eq!(eval("1+2 == 3"), Value::number(1.0));
        assert_eq!(eval("1 < 2 && 2 < 3"), Value::number(1.0));
    }

    #[test]
    fn unary_operators() {
        assert_eq!(eval("-3"), Value::number(-3.0));
        assert_eq!(eval("4*-3"), Value::number(-12.0));
        assert_eq!(eval("-2^2"), Value::number(4.0));
        assert_eq!(eval("!0"), Value::number(1.0));
        assert_eq!(eval("- -3"), Value::number(3.0));
        assert_eq!(eval("4-3"), Value::number(1.0));
    }

    #[test]
    fn literals() {
        assert_eq!(eval("0xff"), Value::number(255.0));
        assert_eq!(eval("1.5e2"), Value::number(150.0));
        assert_eq!(eval("'hi'"), Value::string("hi"));
    }

    #[test]
    fn sequencing_and_trailing_semicolon() {
        assert_eq!(eval("a = 1; b = a + 1; b"), Value::number(2.0));
        assert_eq!(eval("a = 5;"), Value::number(5.0));
        assert_eq!(eval("l(1;2, 3;)"), Value::list(vec![Value::number(2.0), Value::number(3.0)]));
    }

    #[test]
    fn long_scripts_stay_flat() {
        let i = interp();
        let src = "a += 1;\n".repeat(20_000);
        assert_eq!(i.run(&src).unwrap(), Value::number(20_000.0));
        let expr = i.parse(&src).unwrap();
        assert!(matches!(&*expr.root, Node::Sequence(items) if items.len() == 20_000));
        drop(expr);
        assert_eq!(eval("(a = 1; b = 2); c = 3; a + b + c"), Value::number(6.0));
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let parens = format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000));
        let signs = format!("{}1", "- ".repeat(5_000));
        let chain = format!("{}1", "1 + ".repeat(5_000));
        let args = format!("{}1{}", "l(".repeat(5_000), ")".repeat(5_000));
        for src in [&parens, &signs, &chain, &args] {
            let err = interp().parse(src).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Syntax);
            assert!(err.message.contains("nested deeper than"), "{}", err.message);
        }
        let ok = format!("{}1{}", "(".repeat(MAX_NESTING - 1), ")".repeat(MAX_NESTING - 1));
        assert_eq!(eval(&ok), Value::number(1.0));
    }

    #[test]
    fn assignment_family() {
        assert_eq!(eval("a = b = 4; a + b"), Value::number(8.0));
        assert_eq!(eval("n += 2; n += 3; n"), Value::number(5.0));
        assert_eq!(eval("a = 1; b = 2; a <> b; l(a, b)"), eval("l(2, 1)"));
        assert_eq!(eval("l(x, y) = l(3, 4); x * y"), Value::number(12.0));
        assert_eq!(eval_err("l(x, y) = l(1)").kind, ErrorKind::Internal);
        assert_eq!(eval_err("3 = 4").kind, ErrorKind::Internal);
    }

    #[test]
    fn unbound_read_fails_but_target_does_not() {
        let e = eval_err("1 + nope");
        assert_eq!(e.message, "Variable 'nope' is not defined");
        assert_eq!(e.site.unwrap().token.pos, 4);
        assert_eq!(eval("fresh = 3"), Value::number(3.0));
    }

    #[test]
    fn procedure_definition_and_redefinition() {
        let i = interp();
        assert_eq!(i.run("f(x) -> x*2").unwrap(), Value::string("f"));
        assert_eq!(i.run("f(3)").unwrap(), Value::number(6.0));
        i.run("f(x) -> x+7").unwrap();
        assert_eq!(i.run("f(3)").unwrap(), Value::number(10.0));
    }

    #[test]
    fn procedure_defined_after_use_site_is_parsed() {
        assert_eq!(eval("g() -> h(); h() -> 5; g()"), Value::number(5.0));
    }

    #[test]
    fn definition_errors() {
        assert!(eval_err("sin(x) -> x").message.contains("built-in"));
        assert!(eval_err("f(1) -> 2").message.contains("variable names"));
        assert!(eval_err("3 -> 2").message.contains("name(params)"));
        assert_eq!(eval_err("undefined_fn(1)").message, "Function 'undefined_fn' is not defined");
    }

    #[test]
    fn syntax_errors() {
        for src in ["", "(1", "1)", "1 +", "f(1,", "3 4", "*3", "l(1 2)"] {
            let err = interp().parse(src).unwrap_err();
            assert_eq!(err.kind, ErrorKind::Syntax, "{src}: {}", err.message);
        }
    }

    #[test]
    fn builtin_arity_checked_at_parse() {
        let err = interp().parse("sqrt(1, 2)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.message, "Function 'sqrt' expects 1 argument, got 2");
    }

    #[test]
    fn errors_carry_innermost_procedure() {
        let i = interp();
        i.run("inner() -> 1/0; outer() -> inner()").unwrap();
        let e = match i.run("outer()") {
            Err(Interrupt::Error(e)) => e,
            other => panic!("{other:?}"),
        };
        assert_eq!(e.kind, ErrorKind::Arithmetic);
        assert_eq!(e.procedure.as_deref(), Some("inner"));
        assert_eq!(e.site.unwrap().token.surface, "/");
    }

    #[test]
    fn expression_reusable() {
        let i = interp();
        let expr = Expression::parse_named(&i, "twice", "x * 2").unwrap();
        assert_eq!(expr.name(), Some("twice"));
        for n in 0..3 {
            let mut ctx = Context::new(i.clone()).with("x", LazyValue::of(Value::number(n as f64)));
            assert_eq!(expr.eval(&mut ctx).unwrap(), Value::number(2.0 * n as f64));
        }
    }
}
