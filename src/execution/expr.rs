//! Binding expression language: a small, pure, JavaScript-flavoured subset.
//!
//! ```text
//! expr    := or ("?" expr ":" expr)?
//! or      := and ("||" and)*
//! and     := eq ("&&" eq)*
//! eq      := cmp (("==" | "!=" | "===" | "!==") cmp)*
//! cmp     := add (("<" | "<=" | ">" | ">=") add)*
//! add     := mul (("+" | "-") mul)*
//! mul     := unary (("*" | "/" | "%") unary)*
//! unary   := ("!" | "-")* postfix
//! postfix := primary ("." ident | "[" expr "]")*
//! primary := number | string | ident | "(" expr ")" | "[" (expr ("," expr)*)? "]"
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::EvalError;

pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Identifier lookup for a single evaluation.
pub trait Scope {
    fn resolve(&self, name: &str) -> Option<&Value>;
}

impl Scope for BTreeMap<String, Value> {
    fn resolve(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

impl Scope for Map<String, Value> {
    fn resolve(&self, name: &str) -> Option<&Value> {
        self.get(name)
    }
}

/// Evaluates one binding body. Implementations must be pure and synchronous.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, scope: &dyn Scope) -> EvalResult<Value>;
}

/// Built-in evaluator for the grammar above.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEvaluator;

impl ExpressionEvaluator for DefaultEvaluator {
    fn evaluate(&self, expression: &str, scope: &dyn Scope) -> EvalResult<Value> {
        let ast = parse(expression)?;
        eval(&ast, scope)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Punct(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

const PUNCTS: [&str; 24] = [
    "===", "!==", "==", "!=", "<=", ">=", "&&", "||", "(", ")", "[", "]", ".", ",", "?", ":", "+",
    "-", "*", "/", "%", "!", "<", ">",
];

pub(crate) const KEYWORDS: [&str; 4] = ["true", "false", "null", "undefined"];

/// Split an expression into tokens carrying byte spans.
pub fn tokenize(source: &str) -> EvalResult<Vec<Token>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;
        if c.is_ascii_digit() {
            while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                pos += 1;
            }
            let text = &source[start..pos];
            let value = text.parse::<f64>().map_err(|_| EvalError::Syntax {
                position: start,
                message: format!("invalid number `{text}`"),
            })?;
            tokens.push(Token {
                kind: TokenKind::Number(value),
                start,
                end: pos,
            });
            continue;
        }
        if c == b'"' || c == b'\'' || c == b'`' {
            let (text, end) = read_string(source, start)?;
            tokens.push(Token {
                kind: TokenKind::Str(text),
                start,
                end,
            });
            pos = end;
            continue;
        }
        if is_ident_start(c) {
            while pos < bytes.len() && is_ident_continue(bytes[pos]) {
                pos += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident(source[start..pos].to_string()),
                start,
                end: pos,
            });
            continue;
        }
        let rest = &source[pos..];
        let Some(punct) = PUNCTS.iter().find(|p| rest.starts_with(**p)) else {
            return Err(EvalError::Syntax {
                position: pos,
                message: format!("unexpected character `{}`", rest.chars().next().unwrap_or(' ')),
            });
        };
        pos += punct.len();
        tokens.push(Token {
            kind: TokenKind::Punct(punct),
            start,
            end: pos,
        });
    }
    Ok(tokens)
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'$'
}

fn is_ident_continue(c: u8) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

/// Read a quoted literal starting at `start`; returns its text and the end offset.
fn read_string(source: &str, start: usize) -> EvalResult<(String, usize)> {
    let mut chars = source[start..].char_indices();
    let Some((_, quote)) = chars.next() else {
        return Err(EvalError::Syntax {
            position: start,
            message: "expected string".into(),
        });
    };
    let mut text = String::new();
    let mut escaped = false;
    for (offset, c) in chars {
        if escaped {
            text.push(match c {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((text, start + offset + c.len_utf8()));
        } else {
            text.push(c);
        }
    }
    Err(EvalError::Syntax {
        position: start,
        message: "unterminated string".into(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Array(Vec<Expr>),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary(&'static str, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional(Box<Expr>, Box<Expr>, Box<Expr>),
}

/// Deepest expression tree `parse` will build.
pub const MAX_NESTING: usize = 128;

pub fn parse(source: &str) -> EvalResult<Expr> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        len: source.len(),
        depth: 0,
    };
    let expr = parser.expression()?;
    if let Some(token) = parser.tokens.get(parser.pos) {
        return Err(EvalError::Syntax {
            position: token.start,
            message: "unexpected trailing input".into(),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    len: usize,
    depth: usize,
}

impl Parser {
    fn peek_punct(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos).map(|t| &t.kind) {
            Some(TokenKind::Punct(p)) => Some(p),
            _ => None,
        }
    }

    fn eat(&mut self, punct: &str) -> bool {
        if self.peek_punct() == Some(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, punct: &str) -> EvalResult<()> {
        if self.eat(punct) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{punct}`")))
        }
    }

    fn error(&self, message: String) -> EvalError {
        let position = self
            .tokens
            .get(self.pos)
            .map(|t| t.start)
            .unwrap_or(self.len);
        EvalError::Syntax { position, message }
    }

    /// One level deeper in the tree being built. Callers reset `depth` on
    /// success; an error abandons the whole parse.
    fn grow(&mut self) -> EvalResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error(format!("expression nested deeper than {MAX_NESTING}")));
        }
        Ok(())
    }

    fn expression(&mut self) -> EvalResult<Expr> {
        let base = self.depth;
        self.grow()?;
        let expr = self.conditional()?;
        self.depth = base;
        Ok(expr)
    }

    fn conditional(&mut self) -> EvalResult<Expr> {
        let condition = self.or()?;
        if self.eat("?") {
            let then = self.expression()?;
            self.expect(":")?;
            let otherwise = self.expression()?;
            return Ok(Expr::Conditional(
                Box::new(condition),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(condition)
    }

    fn or(&mut self) -> EvalResult<Expr> {
        let base = self.depth;
        let mut left = self.and()?;
        while self.eat("||") {
            self.grow()?;
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        self.depth = base;
        Ok(left)
    }

    fn and(&mut self) -> EvalResult<Expr> {
        let base = self.depth;
        let mut left = self.binary_level(0)?;
        while self.eat("&&") {
            self.grow()?;
            left = Expr::And(Box::new(left), Box::new(self.binary_level(0)?));
        }
        self.depth = base;
        Ok(left)
    }

    fn binary_level(&mut self, level: usize) -> EvalResult<Expr> {
        const LEVELS: [&[&str]; 4] = [
            &["===", "!==", "==", "!="],
            &["<=", ">=", "<", ">"],
            &["+", "-"],
            &["*", "/", "%"],
        ];
        if level == LEVELS.len() {
            return self.unary();
        }
        let base = self.depth;
        let mut left = self.binary_level(level + 1)?;
        while let Some(op) = self.peek_punct().filter(|p| LEVELS[level].contains(p)) {
            self.pos += 1;
            self.grow()?;
            let right = self.binary_level(level + 1)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn unary(&mut self) -> EvalResult<Expr> {
        let base = self.depth;
        let expr = if self.eat("!") {
            self.grow()?;
            Expr::Not(Box::new(self.unary()?))
        } else if self.eat("-") {
            self.grow()?;
            Expr::Negate(Box::new(self.unary()?))
        } else {
            self.postfix()?
        };
        self.depth = base;
        Ok(expr)
    }

    fn postfix(&mut self) -> EvalResult<Expr> {
        let base = self.depth;
        let mut expr = self.primary()?;
        loop {
            if matches!(self.peek_punct(), Some("." | "[")) {
                self.grow()?;
            }
            if self.eat(".") {
                match self.tokens.get(self.pos).map(|t| t.kind.clone()) {
                    Some(TokenKind::Ident(name)) => {
                        self.pos += 1;
                        expr = Expr::Member(Box::new(expr), name);
                    }
                    _ => return Err(self.error("expected property name".into())),
                }
            } else if self.eat("[") {
                let index = self.expression()?;
                self.expect("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                self.depth = base;
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> EvalResult<Expr> {
        let Some(token) = self.tokens.get(self.pos).cloned() else {
            return Err(self.error("unexpected end of expression".into()));
        };
        self.pos += 1;
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(number(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::Ident(name) => Ok(match name.as_str() {
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "null" | "undefined" => Expr::Literal(Value::Null),
                _ => Expr::Ident(name),
            }),
            TokenKind::Punct("(") => {
                let inner = self.expression()?;
                self.expect(")")?;
                Ok(inner)
            }
            TokenKind::Punct("[") => {
                let mut items = Vec::new();
                if !self.eat("]") {
                    loop {
                        items.push(self.expression()?);
                        if self.eat("]") {
                            break;
                        }
                        self.expect(",")?;
                    }
                }
                Ok(Expr::Array(items))
            }
            TokenKind::Punct(p) => {
                self.pos -= 1;
                Err(self.error(format!("unexpected `{p}`")))
            }
        }
    }
}

pub fn eval(expr: &Expr, scope: &dyn Scope) -> EvalResult<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) => scope
            .resolve(name)
            .cloned()
            .ok_or_else(|| EvalError::UnresolvedReference(name.clone())),
        Expr::Member(target, name) => member(&eval(target, scope)?, name),
        Expr::Index(target, index) => {
            let target = eval(target, scope)?;
            match eval(index, scope)? {
                Value::String(key) => member(&target, &key),
                Value::Number(n) => member(&target, &n.to_string()),
                other => Err(EvalError::Type(format!("cannot index with {other}"))),
            }
        }
        Expr::Array(items) => items
            .iter()
            .map(|item| eval(item, scope))
            .collect::<EvalResult<Vec<_>>>()
            .map(Value::Array),
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval(inner, scope)?))),
        Expr::Negate(inner) => Ok(number(-to_number(&eval(inner, scope)?)?)),
        Expr::And(left, right) => {
            let left = eval(left, scope)?;
            if truthy(&left) { eval(right, scope) } else { Ok(left) }
        }
        Expr::Or(left, right) => {
            let left = eval(left, scope)?;
            if truthy(&left) { Ok(left) } else { eval(right, scope) }
        }
        Expr::Conditional(condition, then, otherwise) => {
            if truthy(&eval(condition, scope)?) {
                eval(then, scope)
            } else {
                eval(otherwise, scope)
            }
        }
        Expr::Binary(op, left, right) => binary(op, eval(left, scope)?, eval(right, scope)?),
    }
}

fn member(target: &Value, name: &str) -> EvalResult<Value> {
    match target {
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        Value::Array(items) if name == "length" => Ok(Value::from(items.len())),
        Value::Array(items) => Ok(name
            .parse::<usize>()
            .ok()
            .and_then(|index| items.get(index).cloned())
            .unwrap_or(Value::Null)),
        Value::String(s) if name == "length" => Ok(Value::from(s.chars().count())),
        Value::Null => Err(EvalError::Type(format!("cannot read `{name}` of null"))),
        _ => Ok(Value::Null),
    }
}

fn binary(op: &str, left: Value, right: Value) -> EvalResult<Value> {
    match op {
        "+" => {
            if left.is_string() || right.is_string() {
                Ok(Value::String(format!("{}{}", display(&left), display(&right))))
            } else {
                Ok(number(to_number(&left)? + to_number(&right)?))
            }
        }
        "-" => Ok(number(to_number(&left)? - to_number(&right)?)),
        "*" => Ok(number(to_number(&left)? * to_number(&right)?)),
        "/" | "%" => {
            let divisor = to_number(&right)?;
            if divisor == 0.0 {
                return Err(EvalError::Type("division by zero".into()));
            }
            let dividend = to_number(&left)?;
            Ok(number(if op == "/" { dividend / divisor } else { dividend % divisor }))
        }
        "==" | "===" => Ok(Value::Bool(loosely_equal(&left, &right))),
        "!=" | "!==" => Ok(Value::Bool(!loosely_equal(&left, &right))),
        "<" | "<=" | ">" | ">=" => {
            let ordering = match (&left, &right) {
                (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                _ => to_number(&left)?.partial_cmp(&to_number(&right)?),
            };
            let Some(ordering) = ordering else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(match op {
                "<" => ordering.is_lt(),
                "<=" => ordering.is_le(),
                ">" => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }
        other => Err(EvalError::Type(format!("unknown operator `{other}`"))),
    }
}

fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

/// JavaScript-style truthiness.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn to_number(value: &Value) -> EvalResult<f64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| EvalError::Type("number out of range".into())),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null => Ok(0.0),
        Value::String(s) if s.trim().is_empty() => Ok(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| EvalError::Type(format!("`{s}` is not a number"))),
        Value::Array(_) | Value::Object(_) => {
            Err(EvalError::Type("cannot use an object as a number".into()))
        }
    }
}

/// Whole numbers come back as JSON integers.
pub fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Text form of a value inside an interpolated template.
pub fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> Map<String, Value> {
        match json!({
            "input1": {"value": "ada", "count": 3},
            "list1": {"data": [{"name": "x"}, {"name": "y"}]},
            "flag": false,
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn run(source: &str) -> EvalResult<Value> {
        DefaultEvaluator.evaluate(source, &scope())
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(run("1 + 2 * 3").unwrap(), json!(7));
        assert_eq!(run("(1 + 2) * 3").unwrap(), json!(9));
        assert_eq!(run("7 / 2").unwrap(), json!(3.5));
        assert_eq!(run("-input1.count + 1").unwrap(), json!(-2));
    }

    #[test]
    fn member_and_index_access() {
        assert_eq!(run("input1.value").unwrap(), json!("ada"));
        assert_eq!(run("list1.data[1].name").unwrap(), json!("y"));
        assert_eq!(run("list1.data.length").unwrap(), json!(2));
        assert_eq!(run("input1['count']").unwrap(), json!(3));
        assert_eq!(run("input1.missing").unwrap(), Value::Null);
    }

    #[test]
    fn strings_concatenate() {
        assert_eq!(run("'hi ' + input1.value").unwrap(), json!("hi ada"));
        assert_eq!(run("\"n=\" + input1.count").unwrap(), json!("n=3"));
    }

    #[test]
    fn logic_and_ternary() {
        assert_eq!(run("flag || input1.value").unwrap(), json!("ada"));
        assert_eq!(run("flag && input1.value").unwrap(), json!(false));
        assert_eq!(run("input1.count >= 3 ? 'big' : 'small'").unwrap(), json!("big"));
        assert_eq!(run("!flag").unwrap(), json!(true));
        assert_eq!(run("input1.count === 3").unwrap(), json!(true));
    }

    #[test]
    fn unresolved_and_syntax_errors() {
        assert_eq!(run("ghost.value"), Err(EvalError::UnresolvedReference("ghost".into())));
        assert!(matches!(run("1 +"), Err(EvalError::Syntax { .. })));
        assert!(matches!(run("'open"), Err(EvalError::Syntax { .. })));
        assert!(matches!(run("1 / 0"), Err(EvalError::Type(_))));
        assert!(matches!(run("ghost2 ghost3"), Err(EvalError::Syntax { .. })));
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let parens = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(parse(&parens), Err(EvalError::Syntax { .. })));
        assert!(matches!(parse(&"!".repeat(10_000)), Err(EvalError::Syntax { .. })));
        let chain = vec!["1"; 10_000].join(" + ");
        assert!(matches!(parse(&chain), Err(EvalError::Syntax { .. })));

        let nested = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(run(&nested).unwrap(), json!(1));
        assert_eq!(run("input1.count + 1 + 1 + 1").unwrap(), json!(6));
    }

    #[test]
    fn tokens_carry_spans() {
        let tokens = tokenize("a.b + 'c'").unwrap();
        assert_eq!(tokens.len(), 5);
        assert_eq!((tokens[4].start, tokens[4].end), (6, 9));
    }
}
