//! Motion formula evaluation.
//!
//! Motions carry their drivers as text in the engine's expression language.
//! This module understands the subset the bundled backend needs:
//! - numbers (`1.5`, `2e-3`)
//! - the variable `time` and the constants `pi`, `e`
//! - `+ - * / ^` with the usual precedence, unary minus, parentheses
//! - `sin cos tan asin acos atan sqrt abs exp ln log`

use crate::error::SolverError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(u8),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, SolverError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let ch = bytes[pos];
        match ch {
            b' ' | b'\t' => pos += 1,
            b'(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            b')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            b'+' | b'-' | b'*' | b'/' | b'^' => {
                tokens.push(Token::Op(ch));
                pos += 1;
            }
            b'0'..=b'9' | b'.' => {
                let start = pos;
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
                    let mut look = pos + 1;
                    if look < bytes.len() && (bytes[look] == b'+' || bytes[look] == b'-') {
                        look += 1;
                    }
                    if look < bytes.len() && bytes[look].is_ascii_digit() {
                        pos = look;
                        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                            pos += 1;
                        }
                    }
                }
                let text = &input[start..pos];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| SolverError::Formula(format!("bad number {text:?} in {input:?}")))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let start = pos;
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                    pos += 1;
                }
                tokens.push(Token::Ident(input[start..pos].to_string()));
            }
            _ => {
                return Err(SolverError::Formula(format!(
                    "unexpected character {:?} in {input:?}",
                    ch as char
                )))
            }
        }
    }
    Ok(tokens)
}

/// A parsed formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Formula {
    /// Literal.
    Number(f64),
    /// The simulation time.
    Time,
    /// Unary minus.
    Neg(Box<Formula>),
    /// Binary operation.
    Binary(u8, Box<Formula>, Box<Formula>),
    /// Function call.
    Call(String, Box<Formula>),
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn error(&self, what: &str) -> SolverError {
        SolverError::Formula(format!("{what} in {:?}", self.source))
    }

    fn expr(&mut self) -> Result<Formula, SolverError> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ (b'+' | b'-'))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Formula::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Formula, SolverError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ (b'*' | b'/'))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Formula::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Formula, SolverError> {
        match self.peek() {
            Some(Token::Op(b'-')) => {
                self.pos += 1;
                Ok(Formula::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op(b'+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Formula, SolverError> {
        let base = self.atom()?;
        if let Some(Token::Op(b'^')) = self.peek() {
            self.pos += 1;
            // right associative
            let exp = self.unary()?;
            return Ok(Formula::Binary(b'^', Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Formula, SolverError> {
        let token = self.peek().cloned().ok_or_else(|| self.error("unexpected end"))?;
        self.pos += 1;
        match token {
            Token::Number(v) => Ok(Formula::Number(v)),
            Token::LParen => {
                let inner = self.expr()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(inner)
                    }
                    _ => Err(self.error("missing ')'")),
                }
            }
            Token::Ident(name) => match name.as_str() {
                "time" => Ok(Formula::Time),
                "pi" => Ok(Formula::Number(std::f64::consts::PI)),
                "e" => Ok(Formula::Number(std::f64::consts::E)),
                "sin" | "cos" | "tan" | "asin" | "acos" | "atan" | "sqrt" | "abs" | "exp"
                | "ln" | "log" => {
                    if self.peek() != Some(&Token::LParen) {
                        return Err(self.error("expected '(' after function name"));
                    }
                    let arg = self.atom()?;
                    Ok(Formula::Call(name, Box::new(arg)))
                }
                _ => Err(self.error(&format!("unknown name {name:?}"))),
            },
            Token::Op(op) => Err(self.error(&format!("unexpected operator {:?}", op as char))),
            Token::RParen => Err(self.error("unexpected ')'")),
        }
    }
}

impl Formula {
    /// Parse `source`.
    pub fn parse(source: &str) -> Result<Self, SolverError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            source,
        };
        let formula = parser.expr()?;
        if parser.pos != tokens.len() {
            return Err(parser.error("trailing input"));
        }
        Ok(formula)
    }

    /// Evaluate at simulation time `time`.
    pub fn eval(&self, time: f64) -> f64 {
        match self {
            Formula::Number(v) => *v,
            Formula::Time => time,
            Formula::Neg(inner) => -inner.eval(time),
            Formula::Binary(op, a, b) => {
                let (a, b) = (a.eval(time), b.eval(time));
                match op {
                    b'+' => a + b,
                    b'-' => a - b,
                    b'*' => a * b,
                    b'/' => a / b,
                    _ => a.powf(b),
                }
            }
            Formula::Call(name, arg) => {
                let x = arg.eval(time);
                match name.as_str() {
                    "sin" => x.sin(),
                    "cos" => x.cos(),
                    "tan" => x.tan(),
                    "asin" => x.asin(),
                    "acos" => x.acos(),
                    "atan" => x.atan(),
                    "sqrt" => x.sqrt(),
                    "abs" => x.abs(),
                    "exp" => x.exp(),
                    "ln" => x.ln(),
                    _ => x.log10(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str, t: f64) -> f64 {
        Formula::parse(src).unwrap().eval(t)
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3", 0.0), 7.0);
        assert_eq!(eval("(1 + 2) * 3", 0.0), 9.0);
        assert_eq!(eval("2 ^ 3 ^ 2", 0.0), 512.0);
        assert_eq!(eval("-2 ^ 2", 0.0), -4.0);
        assert_eq!(eval("10 / 4", 0.0), 2.5);
    }

    #[test]
    fn test_time_and_constants() {
        assert_eq!(eval("2*time", 1.5), 3.0);
        assert!((eval("360*time*pi/180.0", 0.5) - std::f64::consts::PI).abs() < 1e-12);
        assert!((eval("sin(pi/2)", 0.0) - 1.0).abs() < 1e-12);
        assert_eq!(eval("1.0e-9", 0.0), 1.0e-9);
        assert_eq!(eval("abs(-time)", 2.0), 2.0);
    }

    #[test]
    fn test_errors() {
        assert!(Formula::parse("").is_err());
        assert!(Formula::parse("1 +").is_err());
        assert!(Formula::parse("(1").is_err());
        assert!(Formula::parse("foo").is_err());
        assert!(Formula::parse("2 $ 3").is_err());
        assert!(Formula::parse("1 2").is_err());
        assert!(Formula::parse("sin 2").is_err());
    }
}
