//! Guard conditions and datamodel literals.
//!
//! Only a small, side-effect free expression language is supported:
//!
//! ```text
//! cond  := or
//! or    := and ( "||" and )*
//! and   := unary ( "&&" unary )*
//! unary := "!" unary | "(" or ")" | "In(" string ")" | operand [ cmp operand ]
//! cmp   := "==" | "!=" | "<" | "<=" | ">" | ">="
//! ```
//!
//! Operands are datamodel variables, quoted strings, numbers, `true`,
//! `false` and `null`. A lone variable is tested for truthiness.

use crate::error::{BonsaiError, BonsaiResult};
use serde_json::Value;
use std::fmt;

/// What a condition may look at while being evaluated.
pub trait ConditionContext {
    /// Is the state with this id in the active configuration?
    fn is_active(&self, state_id: &str) -> bool;

    fn variable(&self, name: &str) -> Option<Value>;
}

/// Typed value of a datamodel `expr` or `<assign expr>`.
///
/// `'quoted'` and `"quoted"` text becomes a string; integers, floats,
/// booleans and `null` are typed; anything else is kept as raw text.
pub fn parse_literal(raw: &str) -> Value {
    let text = raw.trim();
    if text.len() >= 2
        && ((text.starts_with('\'') && text.ends_with('\''))
            || (text.starts_with('"') && text.ends_with('"')))
    {
        return Value::String(text[1..text.len() - 1].to_string());
    }
    match text {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    if let Ok(i) = text.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = text.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    Value::String(text.to_string())
}

/// Truthiness used by guards: empty, zero, `false` and null are false.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Variable(String),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Bool(bool),
    In(String),
    Truthy(Operand),
    Compare(Operand, CompareOp, Operand),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// A parsed `cond` attribute, keeping its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> BonsaiResult<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(BonsaiError::parse(format!(
                "unexpected trailing input in condition '{}'",
                source
            )));
        }
        Ok(Self {
            source: source.trim().to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self, ctx: &dyn ConditionContext) -> bool {
        eval(&self.expr, ctx)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn resolve(operand: &Operand, ctx: &dyn ConditionContext) -> Value {
    match operand {
        Operand::Variable(name) => ctx.variable(name).unwrap_or(Value::Null),
        Operand::Literal(value) => value.clone(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> bool {
    let numeric = match (left, right) {
        (Value::Number(_), _) | (_, Value::Number(_)) => as_number(left).zip(as_number(right)),
        _ => None,
    };

    match op {
        CompareOp::Eq | CompareOp::Ne => {
            let equal = match (numeric, left, right) {
                (Some((a, b)), _, _) => a == b,
                (None, Value::String(a), b) | (None, b, Value::String(a)) => match b {
                    Value::String(b) => a == b,
                    Value::Bool(flag) => a == &flag.to_string(),
                    other => a == &other.to_string(),
                },
                _ => left == right,
            };
            (op == CompareOp::Eq) == equal
        }
        _ => {
            let Some((a, b)) = numeric.or_else(|| as_number(left).zip(as_number(right))) else {
                return false;
            };
            match op {
                CompareOp::Lt => a < b,
                CompareOp::Le => a <= b,
                CompareOp::Gt => a > b,
                CompareOp::Ge => a >= b,
                CompareOp::Eq | CompareOp::Ne => unreachable!(),
            }
        }
    }
}

fn eval(expr: &Expr, ctx: &dyn ConditionContext) -> bool {
    match expr {
        Expr::Bool(b) => *b,
        Expr::In(id) => ctx.is_active(id),
        Expr::Truthy(operand) => is_truthy(&resolve(operand, ctx)),
        Expr::Compare(left, op, right) => compare(&resolve(left, ctx), *op, &resolve(right, ctx)),
        Expr::Not(inner) => !eval(inner, ctx),
        Expr::And(a, b) => eval(a, ctx) && eval(b, ctx),
        Expr::Or(a, b) => eval(a, ctx) || eval(b, ctx),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Number(Value),
    LParen,
    RParen,
    Not,
    And,
    Or,
    Cmp(CompareOp),
}

fn tokenize(source: &str) -> BonsaiResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let err = |msg: String| BonsaiError::parse(format!("{} in condition '{}'", msg, source));

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' | '|' => {
                if chars.get(i + 1) != Some(&c) {
                    return Err(err(format!("expected '{}{}'", c, c)));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
                i += 2;
            }
            '=' | '!' | '<' | '>' => {
                let next_is_eq = chars.get(i + 1) == Some(&'=');
                let token = match (c, next_is_eq) {
                    ('=', true) => Token::Cmp(CompareOp::Eq),
                    ('!', true) => Token::Cmp(CompareOp::Ne),
                    ('<', true) => Token::Cmp(CompareOp::Le),
                    ('>', true) => Token::Cmp(CompareOp::Ge),
                    ('<', false) => Token::Cmp(CompareOp::Lt),
                    ('>', false) => Token::Cmp(CompareOp::Gt),
                    ('!', false) => Token::Not,
                    _ => return Err(err("single '=' is not a comparison".to_string())),
                };
                tokens.push(token);
                i += if next_is_eq { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && chars[end] != quote {
                    end += 1;
                }
                if end >= chars.len() {
                    return Err(err("unterminated string".to_string()));
                }
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                match parse_literal(&text) {
                    number @ Value::Number(_) => tokens.push(Token::Number(number)),
                    _ => return Err(err(format!("bad number '{}'", text))),
                }
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.' | '$' | '#'))
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(err(format!("unexpected character '{}'", other))),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> BonsaiResult<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            other => Err(BonsaiError::parse(format!(
                "expected {:?}, found {:?}",
                expected, other
            ))),
        }
    }

    fn parse_or(&mut self) -> BonsaiResult<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> BonsaiResult<Expr> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> BonsaiResult<Expr> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) if name == "In" => {
                self.pos += 1;
                self.expect(Token::LParen)?;
                let id = match self.next() {
                    Some(Token::Str(id)) | Some(Token::Ident(id)) => id,
                    other => {
                        return Err(BonsaiError::parse(format!(
                            "In() expects a state id, found {:?}",
                            other
                        )))
                    }
                };
                self.expect(Token::RParen)?;
                Ok(Expr::In(id))
            }
            _ => {
                let left = self.parse_operand()?;
                if let Some(Token::Cmp(op)) = self.peek().cloned() {
                    self.pos += 1;
                    let right = self.parse_operand()?;
                    return Ok(Expr::Compare(left, op, right));
                }
                Ok(match left {
                    Operand::Literal(Value::Bool(b)) => Expr::Bool(b),
                    operand => Expr::Truthy(operand),
                })
            }
        }
    }

    fn parse_operand(&mut self) -> BonsaiResult<Operand> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Operand::Literal(Value::Bool(true)),
                "false" => Operand::Literal(Value::Bool(false)),
                "null" => Operand::Literal(Value::Null),
                _ => Operand::Variable(name),
            }),
            Some(Token::Str(s)) => Ok(Operand::Literal(Value::String(s))),
            Some(Token::Number(n)) => Ok(Operand::Literal(n)),
            other => Err(BonsaiError::parse(format!(
                "expected a value, found {:?}",
                other
            ))),
        }
    }
}
