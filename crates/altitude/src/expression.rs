//! Numeric style expressions.
//!
//! Infix arithmetic over literals and `[attribute]` references:
//!
//! ```text
//! [height] * 0.3048 + 2
//! -([floors] * 3.5)
//! ```
//!
//! Attribute references that are missing or not numeric evaluate to `0.0`.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("Empty expression")]
    Empty,

    #[error("Unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("Unterminated attribute reference starting at offset {0}")]
    UnterminatedReference(usize),

    #[error("Invalid number literal: {0}")]
    InvalidNumber(String),

    #[error("Unexpected token at offset {0}")]
    UnexpectedToken(usize),

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Expression nests deeper than {0} levels")]
    TooDeep(usize),
}

/// Bound on nesting (parentheses, signs and chained operators) so parsing,
/// evaluation and drop stay within the stack.
const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Constant(f64),
    Variable(String),
    Neg(Box<Expr>),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
}

impl Expr {
    fn eval(&self, resolve: &dyn Fn(&str) -> Option<f64>) -> f64 {
        match self {
            Expr::Constant(v) => *v,
            Expr::Variable(name) => resolve(name).unwrap_or(0.0),
            Expr::Neg(inner) => -inner.eval(resolve),
            Expr::Binary(lhs, op, rhs) => {
                let (a, b) = (lhs.eval(resolve), rhs.eval(resolve));
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                }
            }
        }
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Constant(_) => {}
            Expr::Variable(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Neg(inner) => inner.collect_variables(out),
            Expr::Binary(lhs, _, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Variable(String),
    Op(char),
    Open,
    Close,
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, ch)) = chars.peek() {
        match ch {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' => {
                chars.next();
                tokens.push((offset, Token::Op(ch)));
            }
            '(' => {
                chars.next();
                tokens.push((offset, Token::Open));
            }
            ')' => {
                chars.next();
                tokens.push((offset, Token::Close));
            }
            '[' => {
                chars.next();
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, ']')) => break,
                        Some((_, c)) => name.push(c),
                        None => return Err(ExpressionError::UnterminatedReference(offset)),
                    }
                }
                tokens.push((offset, Token::Variable(name.trim().to_string())));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    let exponent_sign =
                        (c == '-' || c == '+') && literal.ends_with(['e', 'E']);
                    if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' || exponent_sign {
                        literal.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal
                    .parse()
                    .map_err(|_| ExpressionError::InvalidNumber(literal.clone()))?;
                tokens.push((offset, Token::Number(value)));
            }
            _ => return Err(ExpressionError::UnexpectedChar { ch, offset }),
        }
    }

    Ok(tokens)
}

/// Recursive-descent parser:
///
/// ```text
/// expr   := term (('+' | '-') term)*
/// term   := unary (('*' | '/') unary)*
/// unary  := '-' unary | '+' unary | atom
/// atom   := number | '[' name ']' | '(' expr ')'
/// ```
struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn descend(&mut self) -> Result<(), ExpressionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExpressionError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    // Each chained operand deepens the left-leaning tree by one.
    fn expr(&mut self) -> Result<Expr, ExpressionError> {
        let depth = self.depth;
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = if *op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
            self.pos += 1;
            self.descend()?;
            let rhs = self.term()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ExpressionError> {
        let depth = self.depth;
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = if *op == '*' { BinaryOp::Mul } else { BinaryOp::Div };
            self.pos += 1;
            self.descend()?;
            let rhs = self.unary()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        self.depth = depth;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        let negate = match self.peek() {
            Some(Token::Op('-')) => true,
            Some(Token::Op('+')) => false,
            _ => return self.atom(),
        };
        self.pos += 1;
        self.descend()?;
        let inner = self.unary()?;
        self.depth -= 1;
        Ok(if negate { Expr::Neg(Box::new(inner)) } else { inner })
    }

    fn atom(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some((_, Token::Number(v))) => Ok(Expr::Constant(v)),
            Some((_, Token::Variable(name))) => Ok(Expr::Variable(name)),
            Some((_, Token::Open)) => {
                self.descend()?;
                let inner = self.expr()?;
                self.depth -= 1;
                match self.next() {
                    Some((_, Token::Close)) => Ok(inner),
                    Some((offset, _)) => Err(ExpressionError::UnexpectedToken(offset)),
                    None => Err(ExpressionError::UnexpectedEnd),
                }
            }
            Some((offset, _)) => Err(ExpressionError::UnexpectedToken(offset)),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

/// A parsed numeric expression, evaluated per feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ExpressionRepr", into = "ExpressionRepr")]
pub struct NumericExpression {
    source: String,
    expr: Expr,
}

impl NumericExpression {
    pub fn constant(value: f64) -> Self {
        Self {
            source: value.to_string(),
            expr: Expr::Constant(value),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// The literal value, when the expression references no attributes.
    pub fn as_constant(&self) -> Option<f64> {
        match self.expr {
            Expr::Constant(v) => Some(v),
            _ => None,
        }
    }

    /// Attribute names referenced by the expression, in first-use order.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.expr.collect_variables(&mut out);
        out
    }

    pub fn eval(&self, resolve: impl Fn(&str) -> Option<f64>) -> f64 {
        self.expr.eval(&resolve)
    }
}

impl FromStr for NumericExpression {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens = tokenize(s)?;
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.expr()?;
        if let Some((offset, _)) = parser.tokens.get(parser.pos) {
            return Err(ExpressionError::UnexpectedToken(*offset));
        }

        Ok(Self {
            source: s.trim().to_string(),
            expr,
        })
    }
}

impl fmt::Display for NumericExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Styles may give an expression as a bare number or as text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ExpressionRepr {
    Number(f64),
    Text(String),
}

impl TryFrom<ExpressionRepr> for NumericExpression {
    type Error = ExpressionError;

    fn try_from(repr: ExpressionRepr) -> Result<Self, Self::Error> {
        match repr {
            ExpressionRepr::Number(v) => Ok(NumericExpression::constant(v)),
            ExpressionRepr::Text(s) => s.parse(),
        }
    }
}

impl From<NumericExpression> for ExpressionRepr {
    fn from(expr: NumericExpression) -> Self {
        match expr.as_constant() {
            Some(v) => ExpressionRepr::Number(v),
            None => ExpressionRepr::Text(expr.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(source: &str) -> f64 {
        source
            .parse::<NumericExpression>()
            .unwrap()
            .eval(|name| match name {
                "height" => Some(10.0),
                "floors" => Some(4.0),
                _ => None,
            })
    }

    #[test]
    fn test_precedence_and_grouping() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("8 / 2 / 2"), 2.0);
        assert_eq!(eval("-2 * -3"), 6.0);
        assert_eq!(eval("1.5e2"), 150.0);
    }

    #[test]
    fn test_attribute_references() {
        assert_eq!(eval("[height] * 2"), 20.0);
        assert_eq!(eval("[floors] * 3.5 + [height]"), 24.0);
        assert_eq!(eval("[ height ]"), 10.0);
        // Missing attributes read as zero.
        assert_eq!(eval("[missing] + 1"), 1.0);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!("".parse::<NumericExpression>(), Err(ExpressionError::Empty));
        assert_eq!(
            "[height".parse::<NumericExpression>(),
            Err(ExpressionError::UnterminatedReference(0))
        );
        assert!(matches!(
            "2 $ 3".parse::<NumericExpression>(),
            Err(ExpressionError::UnexpectedChar { ch: '$', offset: 2 })
        ));
        assert_eq!(
            "(1 + 2".parse::<NumericExpression>(),
            Err(ExpressionError::UnexpectedEnd)
        );
        assert_eq!(
            "1 2".parse::<NumericExpression>(),
            Err(ExpressionError::UnexpectedToken(2))
        );
    }

    #[test]
    fn test_nesting_is_bounded() {
        let nested = format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000));
        assert_eq!(
            nested.parse::<NumericExpression>(),
            Err(ExpressionError::TooDeep(MAX_DEPTH))
        );

        let negated = format!("{}1", "-".repeat(5_000));
        assert_eq!(
            negated.parse::<NumericExpression>(),
            Err(ExpressionError::TooDeep(MAX_DEPTH))
        );

        let chained = vec!["1"; 5_000].join(" + ");
        assert_eq!(
            chained.parse::<NumericExpression>(),
            Err(ExpressionError::TooDeep(MAX_DEPTH))
        );

        let json = format!("\"{nested}\"");
        assert!(serde_json::from_str::<NumericExpression>(&json).is_err());

        // Ordinary nesting is fine.
        let shallow = format!("{}[height]{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(eval(&shallow), 10.0);
        assert_eq!(eval(&vec!["1"; 200].join(" + ")), 200.0);
    }

    #[test]
    fn test_variables_and_constants() {
        let expr: NumericExpression = "[a] * [b] + [a]".parse().unwrap();
        assert_eq!(expr.variables(), vec!["a", "b"]);
        assert_eq!(expr.as_constant(), None);

        let constant: NumericExpression = "2.5".parse().unwrap();
        assert_eq!(constant.as_constant(), Some(2.5));
    }

    #[test]
    fn test_deserialize_number_or_text() {
        let from_number: NumericExpression = serde_json::from_str("1.5").unwrap();
        assert_eq!(from_number.as_constant(), Some(1.5));

        let from_text: NumericExpression = serde_json::from_str("\"[height] + 1\"").unwrap();
        assert_eq!(from_text.variables(), vec!["height"]);

        assert!(serde_json::from_str::<NumericExpression>("\"[height\"").is_err());
        assert_eq!(serde_json::to_string(&from_text).unwrap(), "\"[height] + 1\"");
    }
}
