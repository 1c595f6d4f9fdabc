//! Static formulas.
//!
//! A static formula is a constant expression with no external variables,
//! written `=Function(args...)` or `=(expression)`. It is evaluated once,
//! when the declaration is parsed, and behaves like a literal afterwards.
//!
//! ```text
//! =Upper("open")
//! =(2 * 3 + 1)
//! =If(Max(0, 4) - 3, "big", "small")
//! ```
//!
//! Supported: number and string literals, `+ - * /`, unary minus,
//! parentheses, and the pure functions `Concat`, `Upper`, `Lower`, `Trim`,
//! `Round`, `Abs`, `Min`, `Max` and `If`. Functions that read the
//! environment (`Now`, `User`, ...) make the operand unsupported.

use std::fmt;

use crate::error::{Error, Result};
use crate::value::{Scalar, Value};

/// Functions whose result depends on something other than their arguments.
const NON_STATIC_FUNCTIONS: &[&str] = &[
    "now", "today", "user", "username", "session", "random", "rand", "param", "env", "locale",
];

/// A parsed and evaluated static formula.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    value: Value,
}

impl Formula {
    /// Whether `expr` has the shape of a formula (`=Name(` or `=(`).
    pub fn looks_like(expr: &str) -> bool {
        let Some(body) = expr.trim().strip_prefix('=') else {
            return false;
        };
        let body = body.trim_start();
        if body.starts_with('(') {
            return true;
        }
        let name_len = body
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(body.len());
        name_len > 0
            && body.as_bytes()[0].is_ascii_alphabetic()
            && body[name_len..].trim_start().starts_with('(')
    }

    /// Parse and evaluate `expr`.
    pub fn parse(expr: &str) -> Result<Self> {
        let body = expr
            .trim()
            .strip_prefix('=')
            .ok_or_else(|| Error::invalid_formula(expr, "formula must start with '='"))?;
        let tokens = tokenize(body).map_err(|m| Error::invalid_formula(expr, m))?;
        let mut parser = Parser {
            source: expr,
            tokens,
            pos: 0,
        };
        let ast = parser.expression()?;
        if let Some(token) = parser.peek() {
            return Err(Error::invalid_formula(expr, format!("unexpected {token}")));
        }
        let value = eval(&ast).map_err(|m| Error::invalid_formula(expr, m))?;
        Ok(Self {
            source: expr.trim().to_string(),
            value,
        })
    }

    /// The formula text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The constant the formula evaluated to.
    pub fn value(&self) -> &Value {
        &self.value
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {n}"),
            Token::Str(s) => write!(f, "string \"{s}\""),
            Token::Ident(name) => write!(f, "identifier '{name}'"),
            Token::Plus => f.write_str("'+'"),
            Token::Minus => f.write_str("'-'"),
            Token::Star => f.write_str("'*'"),
            Token::Slash => f.write_str("'/'"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::Comma => f.write_str("','"),
        }
    }
}

fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' | '(' | ')' | ',' => {
                chars.next();
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    _ => Token::Comma,
                });
            }
            '"' | '\'' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                for (_, ch) in chars.by_ref() {
                    if ch == c {
                        closed = true;
                        break;
                    }
                    text.push(ch);
                }
                if !closed {
                    return Err("unterminated string".into());
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = start;
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_ascii_digit() || ch == '.' {
                        end = i + ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &input[start..end];
                let n = literal
                    .parse()
                    .map_err(|_| format!("invalid number '{literal}'"))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, ch)) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        end = i + ch.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(input[start..end].to_string()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::invalid_formula(self.source, message)
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(self.error(format!("expected {expected}, found {token}"))),
            None => Err(self.error(format!("expected {expected}, found end of input"))),
        }
    }

    // expression := term (('+' | '-') term)*
    fn expression(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // term := unary (('*' | '/') unary)*
    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Text(s))),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() != Some(&Token::LParen) {
                    return Err(Error::unsupported_operand(
                        self.source,
                        format!("'{name}' is not a constant"),
                    ));
                }
                if NON_STATIC_FUNCTIONS.contains(&name.to_ascii_lowercase().as_str()) {
                    return Err(Error::unsupported_operand(
                        self.source,
                        format!("'{name}' is not a static function"),
                    ));
                }
                self.pos += 1;
                let mut args = Vec::new();
                if self.peek() == Some(&Token::RParen) {
                    self.pos += 1;
                    return Ok(Expr::Call(name, args));
                }
                loop {
                    args.push(self.expression()?);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::RParen) => break,
                        Some(token) => return Err(self.error(format!("expected ',' or ')', found {token}"))),
                        None => return Err(self.error("unclosed argument list")),
                    }
                }
                Ok(Expr::Call(name, args))
            }
            Some(token) => Err(self.error(format!("unexpected {token}"))),
            None => Err(self.error("unexpected end of input")),
        }
    }
}

fn number(value: &Value) -> std::result::Result<f64, String> {
    value
        .to_scalar(",")
        .as_number()
        .ok_or_else(|| format!("'{}' is not a number", value.to_text(",")))
}

fn truthy(value: &Value) -> bool {
    match value.to_scalar(",") {
        Scalar::Number(n) => n != 0.0,
        Scalar::Text(s) => !s.trim().is_empty() && !s.trim().eq_ignore_ascii_case("false"),
    }
}

fn arity(name: &str, args: &[Value], expected: usize) -> std::result::Result<(), String> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(format!("{name} takes {expected} argument(s), got {}", args.len()))
    }
}

fn eval(expr: &Expr) -> std::result::Result<Value, String> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Negate(inner) => Ok(Value::Number(-number(&eval(inner)?)?)),
        Expr::Binary(op, lhs, rhs) => {
            let a = number(&eval(lhs)?)?;
            let b = number(&eval(rhs)?)?;
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div if b == 0.0 => return Err("division by zero".into()),
                BinaryOp::Div => a / b,
            };
            Ok(Value::Number(result))
        }
        Expr::Call(name, args) => {
            let args = args.iter().map(eval).collect::<std::result::Result<Vec<_>, _>>()?;
            call(name, &args)
        }
    }
}

fn call(name: &str, args: &[Value]) -> std::result::Result<Value, String> {
    match name.to_ascii_lowercase().as_str() {
        "concat" => Ok(Value::Text(args.iter().map(|a| a.to_text(",")).collect())),
        "upper" => {
            arity(name, args, 1)?;
            Ok(Value::Text(args[0].to_text(",").to_uppercase()))
        }
        "lower" => {
            arity(name, args, 1)?;
            Ok(Value::Text(args[0].to_text(",").to_lowercase()))
        }
        "trim" => {
            arity(name, args, 1)?;
            Ok(Value::Text(args[0].to_text(",").trim().to_string()))
        }
        "abs" => {
            arity(name, args, 1)?;
            Ok(Value::Number(number(&args[0])?.abs()))
        }
        "round" => {
            let (n, digits) = match args {
                [n] => (number(n)?, 0.0),
                [n, d] => (number(n)?, number(d)?.trunc()),
                _ => return Err(format!("{name} takes 1 or 2 arguments, got {}", args.len())),
            };
            let factor = 10f64.powf(digits);
            Ok(Value::Number((n * factor).round() / factor))
        }
        "min" | "max" => {
            let numbers = args.iter().map(number).collect::<std::result::Result<Vec<_>, _>>()?;
            let is_min = name.eq_ignore_ascii_case("min");
            numbers
                .into_iter()
                .reduce(|a, b| if is_min { a.min(b) } else { a.max(b) })
                .map(Value::Number)
                .ok_or_else(|| format!("{name} needs at least one argument"))
        }
        "if" => {
            arity(name, args, 3)?;
            Ok(if truthy(&args[0]) {
                args[1].clone()
            } else {
                args[2].clone()
            })
        }
        _ => Err(format!("unknown function '{name}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(expr: &str) -> Value {
        Formula::parse(expr).unwrap().value().clone()
    }

    #[test]
    fn test_shape_detection() {
        assert!(Formula::looks_like("=Upper(\"x\")"));
        assert!(Formula::looks_like("= (1 + 2)"));
        assert!(Formula::looks_like("=Now ()"));
        assert!(!Formula::looks_like("=status"));
        assert!(!Formula::looks_like("Upper(\"x\")"));
        assert!(!Formula::looks_like("=1abc("));
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(value("=(1 + 2 * 3)"), Value::Number(7.0));
        assert_eq!(value("=((1 + 2) * 3)"), Value::Number(9.0));
        assert_eq!(value("=(-4 / 2 - -1)"), Value::Number(-1.0));
        assert_eq!(value("=(\"5\" + 1)"), Value::Number(6.0));
    }

    #[test]
    fn test_functions() {
        assert_eq!(value("=Upper('open')"), Value::text("OPEN"));
        assert_eq!(value("=Concat(\"a\", 1, \"b\")"), Value::text("a1b"));
        assert_eq!(value("=Trim(\"  x \")"), Value::text("x"));
        assert_eq!(value("=Round(2.346, 2)"), Value::Number(2.35));
        assert_eq!(value("=Round(2.5)"), Value::Number(3.0));
        assert_eq!(value("=Max(1, 9, 4)"), Value::Number(9.0));
        assert_eq!(value("=Min(1, -9)"), Value::Number(-9.0));
        assert_eq!(value("=If(0, \"y\", \"n\")"), Value::text("n"));
        assert_eq!(value("=If(Abs(-2) - 1, \"y\", \"n\")"), Value::text("y"));
    }

    #[test]
    fn test_non_static_is_unsupported() {
        assert!(matches!(
            Formula::parse("=Now()"),
            Err(Error::UnsupportedOperand { .. })
        ));
        assert!(matches!(
            Formula::parse("=Concat(User(), \"x\")"),
            Err(Error::UnsupportedOperand { .. })
        ));
        assert!(matches!(
            Formula::parse("=(price * 2)"),
            Err(Error::UnsupportedOperand { .. })
        ));
    }

    #[test]
    fn test_invalid_formulas() {
        for expr in ["=(1 +)", "=Upper(\"x\"", "=(1 / 0)", "=Frobnicate(1)", "=(\"a\" * 2)", "=(1 # 2)"] {
            assert!(
                matches!(Formula::parse(expr), Err(Error::InvalidFormula { .. })),
                "{expr} should be invalid"
            );
        }
    }
}
