//! Rule condition expressions
//!
//! Conditions are parsed once, when a rule is added to a survey, into a small
//! [`Expr`] tree. Evaluation walks the tree against an [`Environment`] that
//! resolves variable paths (`q1`, `q1.answer`, `scenario.city`, `agent.age`).
//!
//! ```
//! use cohort_domain::survey::expression::{Expr, MapEnvironment};
//! use serde_json::json;
//!
//! let expr = Expr::parse("{{ q0.answer }} == 'no' and scenario.year > 2000").unwrap();
//! let env = MapEnvironment::new()
//!     .with("q0.answer", json!("no"))
//!     .with("scenario.year", json!(2024));
//! assert!(expr.evaluate_bool(&env).unwrap());
//! ```

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Path prefix for scenario fields
pub const SCENARIO_PREFIX: &str = "scenario";
/// Path prefix for agent traits
pub const AGENT_PREFIX: &str = "agent";

/// Parse failures, with the byte offset where parsing stopped
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("{message} at offset {offset}")]
    Syntax { message: String, offset: usize },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Empty expression")]
    Empty,
}

/// Evaluation failures; rules treat these as "does not match"
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("Cannot apply '{op}' to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("Condition evaluated to {0}, expected a boolean")]
    NotBoolean(&'static str),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

impl CompareOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
        }
    }
}

/// Parsed condition tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    Variable(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
}

/// Resolves variable paths during evaluation
pub trait Environment {
    fn lookup(&self, path: &[String]) -> Option<&Value>;
}

impl Expr {
    /// The condition that always holds (used by default rules)
    pub fn always() -> Self {
        Expr::Literal(Value::Bool(true))
    }

    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(ExpressionError::Syntax {
                message: format!("Unexpected {}", token.kind.describe()),
                offset: token.offset,
            }),
        }
    }

    /// Names of questions referenced by this expression
    pub fn question_references(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_paths(&mut |path| {
            if let Some(head) = path.first()
                && head != SCENARIO_PREFIX
                && head != AGENT_PREFIX
            {
                out.insert(head.clone());
            }
        });
        out
    }

    fn collect_paths(&self, visit: &mut dyn FnMut(&[String])) {
        match self {
            Expr::Literal(_) => {}
            Expr::Variable(path) => visit(path),
            Expr::List(items) => items.iter().for_each(|item| item.collect_paths(visit)),
            Expr::Not(inner) => inner.collect_paths(visit),
            Expr::And(l, r) | Expr::Or(l, r) | Expr::Compare(_, l, r) => {
                l.collect_paths(visit);
                r.collect_paths(visit);
            }
        }
    }

    pub fn evaluate(&self, env: &dyn Environment) -> Result<Value, EvalError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::List(items) => items
                .iter()
                .map(|item| item.evaluate(env))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Variable(path) => env
                .lookup(path)
                .cloned()
                .ok_or_else(|| EvalError::UnknownVariable(path.join("."))),
            Expr::Not(inner) => Ok(Value::Bool(!inner.evaluate_bool(env)?)),
            Expr::And(l, r) => Ok(Value::Bool(l.evaluate_bool(env)? && r.evaluate_bool(env)?)),
            Expr::Or(l, r) => Ok(Value::Bool(l.evaluate_bool(env)? || r.evaluate_bool(env)?)),
            Expr::Compare(op, l, r) => {
                let left = l.evaluate(env)?;
                let right = r.evaluate(env)?;
                compare(*op, &left, &right).map(Value::Bool)
            }
        }
    }

    /// Evaluate as a condition; `null` counts as false
    pub fn evaluate_bool(&self, env: &dyn Environment) -> Result<bool, EvalError> {
        match self.evaluate(env)? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(EvalError::NotBoolean(type_name(&other))),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    let mismatch = || EvalError::TypeMismatch {
        op: op.as_str(),
        left: type_name(left),
        right: type_name(right),
    };
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::Ne => Ok(!values_equal(left, right)),
        CompareOp::In | CompareOp::NotIn => {
            let found = match (left, right) {
                (_, Value::Array(items)) => items.iter().any(|item| values_equal(left, item)),
                (Value::String(needle), Value::String(haystack)) => {
                    haystack.contains(needle.as_str())
                }
                _ => return Err(mismatch()),
            };
            Ok(if op == CompareOp::In { found } else { !found })
        }
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let ordering = match (left, right) {
                (Value::Number(a), Value::Number(b)) => a
                    .as_f64()
                    .zip(b.as_f64())
                    .and_then(|(a, b)| a.partial_cmp(&b)),
                (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
                _ => None,
            }
            .ok_or_else(mismatch)?;
            Ok(match op {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

// ==================== Tokenizer ====================

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Cmp(CompareOp),
    And,
    Or,
    Not,
    In,
    Minus,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Number(n) => format!("number {}", n),
            TokenKind::Str(s) => format!("string '{}'", s),
            TokenKind::Ident(name) => format!("name '{}'", name),
            TokenKind::Dot => "'.'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
            TokenKind::LBracket => "'['".to_string(),
            TokenKind::RBracket => "']'".to_string(),
            TokenKind::Cmp(op) => format!("'{}'", op.as_str()),
            TokenKind::And => "'and'".to_string(),
            TokenKind::Or => "'or'".to_string(),
            TokenKind::Not => "'not'".to_string(),
            TokenKind::In => "'in'".to_string(),
            TokenKind::Minus => "'-'".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExpressionError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let start = i;

        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        // Template braces are decoration only
        if source[i..].starts_with("{{") || source[i..].starts_with("}}") {
            i += 2;
            continue;
        }

        let two = source.get(i..i + 2).unwrap_or("");
        let kind = match two {
            "==" => Some(TokenKind::Cmp(CompareOp::Eq)),
            "!=" => Some(TokenKind::Cmp(CompareOp::Ne)),
            "<=" => Some(TokenKind::Cmp(CompareOp::Le)),
            ">=" => Some(TokenKind::Cmp(CompareOp::Ge)),
            "&&" => Some(TokenKind::And),
            "||" => Some(TokenKind::Or),
            _ => None,
        };
        if let Some(kind) = kind {
            tokens.push(Token { kind, offset: start });
            i += 2;
            continue;
        }

        let single = match c {
            b'<' => Some(TokenKind::Cmp(CompareOp::Lt)),
            b'>' => Some(TokenKind::Cmp(CompareOp::Gt)),
            b'(' => Some(TokenKind::LParen),
            b')' => Some(TokenKind::RParen),
            b'[' => Some(TokenKind::LBracket),
            b']' => Some(TokenKind::RBracket),
            b',' => Some(TokenKind::Comma),
            b'.' if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => Some(TokenKind::Dot),
            b'-' => Some(TokenKind::Minus),
            b'!' => Some(TokenKind::Not),
            _ => None,
        };
        if let Some(kind) = single {
            tokens.push(Token { kind, offset: start });
            i += 1;
            continue;
        }

        if c == b'\'' || c == b'"' {
            let quote = c;
            let mut value = String::new();
            i += 1;
            loop {
                match bytes.get(i) {
                    None => {
                        return Err(ExpressionError::Syntax {
                            message: "Unterminated string".to_string(),
                            offset: start,
                        });
                    }
                    Some(&b) if b == quote => {
                        i += 1;
                        break;
                    }
                    Some(b'\\') if i + 1 < bytes.len() => {
                        let escaped = source[i + 1..].chars().next().unwrap_or('\\');
                        value.push(escaped);
                        i += 1 + escaped.len_utf8();
                    }
                    Some(_) => {
                        let ch = source[i..].chars().next().unwrap_or_default();
                        value.push(ch);
                        i += ch.len_utf8();
                    }
                }
            }
            tokens.push(Token {
                kind: TokenKind::Str(value),
                offset: start,
            });
            continue;
        }

        if c.is_ascii_digit() || c == b'.' {
            while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                i += 1;
            }
            let text = &source[start..i];
            let number = text.parse::<f64>().map_err(|_| ExpressionError::Syntax {
                message: format!("Invalid number '{}'", text),
                offset: start,
            })?;
            tokens.push(Token {
                kind: TokenKind::Number(number),
                offset: start,
            });
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let word = &source[start..i];
            let kind = match word {
                "and" => TokenKind::And,
                "or" => TokenKind::Or,
                "not" => TokenKind::Not,
                "in" => TokenKind::In,
                _ => TokenKind::Ident(word.to_string()),
            };
            tokens.push(Token { kind, offset: start });
            continue;
        }

        let ch = source[i..].chars().next().unwrap_or_default();
        return Err(ExpressionError::Syntax {
            message: format!("Unexpected character '{}'", ch),
            offset: start,
        });
    }

    Ok(tokens)
}

// ==================== Parser ====================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, kind: TokenKind) -> Result<(), ExpressionError> {
        match self.advance() {
            Some(token) if token.kind == kind => Ok(()),
            Some(token) => Err(ExpressionError::Syntax {
                message: format!("Expected {}, found {}", kind.describe(), token.kind.describe()),
                offset: token.offset,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.peek_kind() == Some(&TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_not()?;
        while self.peek_kind() == Some(&TokenKind::And) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ExpressionError> {
        if self.peek_kind() == Some(&TokenKind::Not) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_not()?)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_primary()?;
        let op = match self.peek_kind() {
            Some(TokenKind::Cmp(op)) => Some(*op),
            Some(TokenKind::In) => Some(CompareOp::In),
            Some(TokenKind::Not)
                if self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::In) =>
            {
                self.advance();
                Some(CompareOp::NotIn)
            }
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let right = self.parse_primary()?;
                Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
            }
            None => Ok(left),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        let token = self.advance().ok_or(ExpressionError::UnexpectedEnd)?;
        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Literal(number(n))),
            TokenKind::Minus => match self.advance() {
                Some(Token {
                    kind: TokenKind::Number(n),
                    ..
                }) => Ok(Expr::Literal(number(-n))),
                Some(other) => Err(ExpressionError::Syntax {
                    message: format!("Expected number after '-', found {}", other.kind.describe()),
                    offset: other.offset,
                }),
                None => Err(ExpressionError::UnexpectedEnd),
            },
            TokenKind::Str(s) => Ok(Expr::Literal(Value::String(s))),
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                let mut items = Vec::new();
                if self.peek_kind() == Some(&TokenKind::RBracket) {
                    self.advance();
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.parse_or()?);
                    match self.advance() {
                        Some(Token {
                            kind: TokenKind::Comma,
                            ..
                        }) => {
                            // Allow a trailing comma
                            if self.peek_kind() == Some(&TokenKind::RBracket) {
                                self.advance();
                                break;
                            }
                        }
                        Some(Token {
                            kind: TokenKind::RBracket,
                            ..
                        }) => break,
                        Some(other) => {
                            return Err(ExpressionError::Syntax {
                                message: format!(
                                    "Expected ',' or ']', found {}",
                                    other.kind.describe()
                                ),
                                offset: other.offset,
                            });
                        }
                        None => return Err(ExpressionError::UnexpectedEnd),
                    }
                }
                Ok(Expr::List(items))
            }
            TokenKind::Ident(word) => match word.as_str() {
                "true" | "True" => Ok(Expr::Literal(Value::Bool(true))),
                "false" | "False" => Ok(Expr::Literal(Value::Bool(false))),
                "null" | "None" => Ok(Expr::Literal(Value::Null)),
                _ => {
                    let mut path = vec![word];
                    while self.peek_kind() == Some(&TokenKind::Dot) {
                        self.advance();
                        match self.advance() {
                            Some(Token {
                                kind: TokenKind::Ident(segment),
                                ..
                            }) => path.push(segment),
                            Some(other) => {
                                return Err(ExpressionError::Syntax {
                                    message: format!(
                                        "Expected name after '.', found {}",
                                        other.kind.describe()
                                    ),
                                    offset: other.offset,
                                });
                            }
                            None => return Err(ExpressionError::UnexpectedEnd),
                        }
                    }
                    Ok(Expr::Variable(path))
                }
            },
            other => Err(ExpressionError::Syntax {
                message: format!("Unexpected {}", other.describe()),
                offset: token.offset,
            }),
        }
    }
}

fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Flat dotted-path environment, handy for tests and ad hoc evaluation
#[derive(Debug, Clone, Default)]
pub struct MapEnvironment {
    values: BTreeMap<String, Value>,
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, value: Value) -> Self {
        self.values.insert(path.into(), value);
        self
    }
}

impl Environment for MapEnvironment {
    fn lookup(&self, path: &[String]) -> Option<&Value> {
        self.values.get(&path.join("."))
    }
}
