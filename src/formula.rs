//! Parsed throughput-ratio formulas.
//!
//! Reference configurations describe per-process volume ratios as small
//! arithmetic formulas over the throughput variables, e.g.
//! `"total_cell / baseline_total_cell"`. Each formula is parsed once into an
//! [`Expr`] tree at configuration-load time and evaluated against a fixed
//! variable map. The only names an expression can bind are the keys of that
//! map; there are no function calls, no indexing and no assignment, so a
//! formula string can never execute anything.
//!
//! Grammar (usual precedence, `^` binds tightest and is right-associative):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := power (('*' | '/') power)*
//! power   := unary ('^' power)?
//! unary   := '-' unary | atom
//! atom    := number | identifier | '(' expr ')'
//! ```
//!
//! # Example
//!
//! ```
//! use battecon::formula::Expr;
//! use std::collections::HashMap;
//!
//! let expr = Expr::parse("total_cell / baseline_total_cell").unwrap();
//! let mut vars = HashMap::new();
//! vars.insert("total_cell".to_string(), 3.0e6);
//! vars.insert("baseline_total_cell".to_string(), 1.5e6);
//! assert_eq!(expr.eval(&vars).unwrap(), 2.0);
//! ```

use std::collections::HashMap;

/// Result type for formula parsing and evaluation.
pub type FormulaResult<T> = Result<T, FormulaError>;

/// Errors raised while parsing or evaluating a formula.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    /// The formula string is empty or whitespace
    #[error("empty formula")]
    EmptyExpression,
    /// Unexpected character or token at the given byte offset
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },
    /// An identifier is not bound in the variable map
    #[error("unknown variable '{0}' in formula")]
    UnknownVariable(String),
}

/// Binary arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Arithmetic expression over a fixed set of named variables.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Num(f64),
    /// Named variable, resolved at evaluation time
    Var(String),
    /// Unary negation
    Neg(Box<Expr>),
    /// Binary operation
    Bin(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Parses a formula string into an expression tree.
    pub fn parse(source: &str) -> FormulaResult<Expr> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(FormulaError::EmptyExpression);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expr()?;
        match parser.peek() {
            None => Ok(expr),
            Some(tok) => Err(FormulaError::Parse {
                offset: tok.offset,
                message: format!("unexpected trailing token '{}'", tok.kind.describe()),
            }),
        }
    }

    /// Evaluates the expression against the variable map.
    ///
    /// # Errors
    ///
    /// [`FormulaError::UnknownVariable`] if an identifier is not a key of
    /// `vars`. Division by zero follows IEEE semantics (inf/NaN), matching
    /// the reference behavior; range checking is the caller's concern.
    pub fn eval(&self, vars: &HashMap<String, f64>) -> FormulaResult<f64> {
        match self {
            Expr::Num(v) => Ok(*v),
            Expr::Var(name) => {
                vars.get(name).copied().ok_or_else(|| FormulaError::UnknownVariable(name.clone()))
            }
            Expr::Neg(inner) => Ok(-inner.eval(vars)?),
            Expr::Bin(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(vars)?, rhs.eval(vars)?);
                Ok(match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    BinOp::Pow => a.powf(b),
                })
            }
        }
    }

    /// All variable names referenced by the expression.
    pub fn variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Expr::Num(_) => {}
            Expr::Var(name) => {
                if !out.iter().any(|n| n == name) {
                    out.push(name.clone());
                }
            }
            Expr::Neg(inner) => inner.collect_variables(out),
            Expr::Bin(_, lhs, rhs) => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Num(v) => format!("{}", v),
            TokenKind::Ident(s) => s.clone(),
            TokenKind::Plus => "+".into(),
            TokenKind::Minus => "-".into(),
            TokenKind::Star => "*".into(),
            TokenKind::Slash => "/".into(),
            TokenKind::Caret => "^".into(),
            TokenKind::LParen => "(".into(),
            TokenKind::RParen => ")".into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn tokenize(source: &str) -> FormulaResult<Vec<Token>> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => {
                tokens.push(Token { kind: TokenKind::Plus, offset: i });
                i += 1;
            }
            '-' => {
                tokens.push(Token { kind: TokenKind::Minus, offset: i });
                i += 1;
            }
            '*' => {
                // Accept Python-style '**' as the power operator
                if i + 1 < bytes.len() && bytes[i + 1] == b'*' {
                    tokens.push(Token { kind: TokenKind::Caret, offset: i });
                    i += 2;
                } else {
                    tokens.push(Token { kind: TokenKind::Star, offset: i });
                    i += 1;
                }
            }
            '/' => {
                tokens.push(Token { kind: TokenKind::Slash, offset: i });
                i += 1;
            }
            '^' => {
                tokens.push(Token { kind: TokenKind::Caret, offset: i });
                i += 1;
            }
            '(' => {
                tokens.push(Token { kind: TokenKind::LParen, offset: i });
                i += 1;
            }
            ')' => {
                tokens.push(Token { kind: TokenKind::RParen, offset: i });
                i += 1;
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < bytes.len()
                    && (bytes[i].is_ascii_digit()
                        || bytes[i] == b'.'
                        || bytes[i] == b'e'
                        || bytes[i] == b'E'
                        || ((bytes[i] == b'+' || bytes[i] == b'-')
                            && i > start
                            && (bytes[i - 1] == b'e' || bytes[i - 1] == b'E')))
                {
                    i += 1;
                }
                let text = &source[start..i];
                let value = text.parse::<f64>().map_err(|_| FormulaError::Parse {
                    offset: start,
                    message: format!("invalid number '{}'", text),
                })?;
                tokens.push(Token { kind: TokenKind::Num(value), offset: start });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric() || bytes[i] == b'_')
                {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(source[start..i].to_string()),
                    offset: start,
                });
            }
            other => {
                return Err(FormulaError::Parse {
                    offset: i,
                    message: format!("unexpected character '{}'", other),
                });
            }
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

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eof_offset(&self) -> usize {
        self.tokens.last().map(|t| t.offset + 1).unwrap_or(0)
    }

    fn expr(&mut self) -> FormulaResult<Expr> {
        let mut lhs = self.term()?;
        while let Some(tok) = self.peek() {
            let op = match tok.kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.term()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> FormulaResult<Expr> {
        let mut lhs = self.power()?;
        while let Some(tok) = self.peek() {
            let op = match tok.kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.power()?;
            lhs = Expr::Bin(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn power(&mut self) -> FormulaResult<Expr> {
        let base = self.unary()?;
        if let Some(tok) = self.peek() {
            if tok.kind == TokenKind::Caret {
                self.advance();
                // Right-associative
                let exponent = self.power()?;
                return Ok(Expr::Bin(BinOp::Pow, Box::new(base), Box::new(exponent)));
            }
        }
        Ok(base)
    }

    fn unary(&mut self) -> FormulaResult<Expr> {
        if let Some(tok) = self.peek() {
            if tok.kind == TokenKind::Minus {
                self.advance();
                return Ok(Expr::Neg(Box::new(self.unary()?)));
            }
        }
        self.atom()
    }

    fn atom(&mut self) -> FormulaResult<Expr> {
        let offset = self.peek().map(|t| t.offset).unwrap_or_else(|| self.eof_offset());
        match self.advance() {
            Some(Token { kind: TokenKind::Num(v), .. }) => Ok(Expr::Num(v)),
            Some(Token { kind: TokenKind::Ident(name), .. }) => {
                // A '(' after an identifier would be a function call; reject it
                if let Some(next) = self.peek() {
                    if next.kind == TokenKind::LParen {
                        return Err(FormulaError::Parse {
                            offset: next.offset,
                            message: format!("function calls are not allowed ('{}')", name),
                        });
                    }
                }
                Ok(Expr::Var(name))
            }
            Some(Token { kind: TokenKind::LParen, .. }) => {
                let inner = self.expr()?;
                match self.advance() {
                    Some(Token { kind: TokenKind::RParen, .. }) => Ok(inner),
                    Some(tok) => Err(FormulaError::Parse {
                        offset: tok.offset,
                        message: "expected ')'".into(),
                    }),
                    None => Err(FormulaError::Parse {
                        offset: self.eof_offset(),
                        message: "unclosed '('".into(),
                    }),
                }
            }
            Some(tok) => Err(FormulaError::Parse {
                offset: tok.offset,
                message: format!("unexpected token '{}'", tok.kind.describe()),
            }),
            None => Err(FormulaError::Parse { offset, message: "unexpected end of formula".into() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_parse_and_eval_ratio() {
        let e = Expr::parse("total_cell / baseline_total_cell").unwrap();
        let v = vars(&[("total_cell", 10.0), ("baseline_total_cell", 4.0)]);
        assert!((e.eval(&v).unwrap() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_precedence() {
        let e = Expr::parse("1 + 2 * 3 - 4 / 2").unwrap();
        assert!((e.eval(&HashMap::new()).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_power_binds_tightest_and_right_assoc() {
        let e = Expr::parse("2 * 3 ^ 2").unwrap();
        assert!((e.eval(&HashMap::new()).unwrap() - 18.0).abs() < 1e-12);
        let e = Expr::parse("2 ^ 3 ^ 2").unwrap();
        assert!((e.eval(&HashMap::new()).unwrap() - 512.0).abs() < 1e-12);
    }

    #[test]
    fn test_python_style_double_star() {
        let e = Expr::parse("volume_ratio ** 0.6").unwrap();
        let v = vars(&[("volume_ratio", 1.0)]);
        assert!((e.eval(&v).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unary_minus_and_parens() {
        let e = Expr::parse("-(a + b) * 2").unwrap();
        let v = vars(&[("a", 1.0), ("b", 2.0)]);
        assert!((e.eval(&v).unwrap() + 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_variable_is_error() {
        let e = Expr::parse("packs * cells_per_pack").unwrap();
        let v = vars(&[("packs", 2.0)]);
        assert_eq!(e.eval(&v).unwrap_err(), FormulaError::UnknownVariable("cells_per_pack".into()));
    }

    #[test]
    fn test_function_calls_rejected() {
        let err = Expr::parse("exp(total_cell)").unwrap_err();
        assert!(matches!(err, FormulaError::Parse { .. }));
    }

    #[test]
    fn test_empty_formula_rejected() {
        assert_eq!(Expr::parse("   "), Err(FormulaError::EmptyExpression));
    }

    #[test]
    fn test_trailing_garbage_rejected() {
        assert!(matches!(Expr::parse("a + b )"), Err(FormulaError::Parse { .. })));
    }

    #[test]
    fn test_scientific_notation() {
        let e = Expr::parse("1.5e6 / 3e5").unwrap();
        assert!((e.eval(&HashMap::new()).unwrap() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_variables_listed_once() {
        let e = Expr::parse("a * a + b").unwrap();
        assert_eq!(e.variables(), vec!["a".to_string(), "b".to_string()]);
    }
}
