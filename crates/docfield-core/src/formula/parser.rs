//! Recursive-descent parser producing [`Expr`] trees.
//!
//! Precedence, loosest first: `||`, `&&`, comparisons, `+ -`, `* / %`,
//! unary `- + !`, `^` (right associative).

use super::ast::{BinaryOp, Expr, Function, UnaryOp};
use super::lexer::{tokenize, Spanned, Token};
use crate::error::FormulaError;

/// Parse formula text into an expression tree.
pub fn parse(source: &str) -> Result<Expr, FormulaError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;

    match parser.tokens.get(parser.pos) {
        None => Ok(expr),
        Some(extra) => Err(unexpected(extra)),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

fn unexpected(spanned: &Spanned) -> FormulaError {
    FormulaError::UnexpectedToken {
        token: spanned.token.describe(),
        position: spanned.position,
    }
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let spanned = self.tokens.get(self.pos).cloned();
        if spanned.is_some() {
            self.pos += 1;
        }
        spanned
    }

    fn expect(&mut self, expected: Token) -> Result<(), FormulaError> {
        match self.advance() {
            Some(spanned) if spanned.token == expected => Ok(()),
            Some(spanned) => Err(unexpected(&spanned)),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Self::binary(BinaryOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Self::binary(BinaryOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Ge) => BinaryOp::Ge,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::Ne) => BinaryOp::Ne,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_additive(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Self::binary(op, left, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        let op = match self.peek() {
            Some(Token::Minus) => UnaryOp::Neg,
            Some(Token::Plus) => UnaryOp::Plus,
            Some(Token::Bang) => UnaryOp::Not,
            _ => return self.parse_power(),
        };
        self.pos += 1;
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.parse_primary()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            let exponent = self.parse_unary()?;
            return Ok(Self::binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        let spanned = self.advance().ok_or(FormulaError::UnexpectedEnd)?;

        match spanned.token {
            Token::Number(value) => Ok(Expr::Literal(value)),
            Token::Reference(reference) => Ok(Expr::Reference(reference)),
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => {
                if self.peek() != Some(&Token::LParen) {
                    return Err(FormulaError::UnexpectedToken {
                        token: name,
                        position: spanned.position,
                    });
                }
                let function =
                    Function::from_name(&name).ok_or(FormulaError::UnknownFunction(name))?;
                self.pos += 1;

                let args = self.parse_arguments()?;
                function.check_arity(args.len())?;
                Ok(Expr::Call { function, args })
            }
            _ => Err(unexpected(&spanned)),
        }
    }

    /// Arguments after the opening parenthesis, through the closing one.
    fn parse_arguments(&mut self) -> Result<Vec<Expr>, FormulaError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }

        loop {
            args.push(self.parse_or()?);
            match self.advance() {
                Some(Spanned { token: Token::Comma, .. }) => continue,
                Some(Spanned { token: Token::RParen, .. }) => return Ok(args),
                Some(other) => return Err(unexpected(&other)),
                None => return Err(FormulaError::UnexpectedEnd),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::ast::{Reference, ReferenceKind};

    fn lit(v: f64) -> Box<Expr> {
        Box::new(Expr::Literal(v))
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 ^ 2
        let expr = parse("1 + 2 * 3 ^ 2").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                left: lit(1.0),
                right: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    left: lit(2.0),
                    right: Box::new(Expr::Binary {
                        op: BinaryOp::Pow,
                        left: lit(3.0),
                        right: lit(2.0),
                    }),
                }),
            }
        );
    }

    #[test]
    fn test_function_call() {
        let expr = parse("if([Input:Revenue#1] > 1000, [Input:Revenue#1], 0)").unwrap();
        let Expr::Call { function, args } = &expr else {
            panic!("expected a call, got {:?}", expr);
        };
        assert_eq!(*function, Function::If);
        assert_eq!(args.len(), 3);
        assert_eq!(
            expr.references(),
            vec![
                &Reference::new(ReferenceKind::Input, "Revenue").with_id(1),
                &Reference::new(ReferenceKind::Input, "Revenue").with_id(1),
            ]
        );
    }

    #[test]
    fn test_nested_calls() {
        assert!(parse("ROUND(MAX(1, SQRT(16), ABS(-3)), 2)").is_ok());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse("   "), Err(FormulaError::Empty));
        assert_eq!(parse("1 +"), Err(FormulaError::UnexpectedEnd));
        assert_eq!(parse("(1 + 2"), Err(FormulaError::UnexpectedEnd));
        assert_eq!(parse("LOG(2)"), Err(FormulaError::UnknownFunction("LOG".to_string())));
        assert!(matches!(parse("IF(1, 2)"), Err(FormulaError::Arity { .. })));
        assert!(matches!(parse("1 2"), Err(FormulaError::UnexpectedToken { position: 2, .. })));
        assert!(matches!(parse("revenue + 1"), Err(FormulaError::UnexpectedToken { .. })));
    }
}
