//! Tokenizer for formula text.

use super::ast::Reference;
use crate::error::FormulaError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Number(f64),
    Reference(Reference),
    Ident(String),
    LParen,
    RParen,
    Comma,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Bang,
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    And,
    Or,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Number(n) => n.to_string(),
            Token::Reference(r) => r.to_string(),
            Token::Ident(name) => name.clone(),
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Comma => ",".to_string(),
            Token::Plus => "+".to_string(),
            Token::Minus => "-".to_string(),
            Token::Star => "*".to_string(),
            Token::Slash => "/".to_string(),
            Token::Percent => "%".to_string(),
            Token::Caret => "^".to_string(),
            Token::Bang => "!".to_string(),
            Token::Gt => ">".to_string(),
            Token::Lt => "<".to_string(),
            Token::Ge => ">=".to_string(),
            Token::Le => "<=".to_string(),
            Token::Eq => "==".to_string(),
            Token::Ne => "!=".to_string(),
            Token::And => "&&".to_string(),
            Token::Or => "||".to_string(),
        }
    }
}

/// A token and its character offset in the formula.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, FormulaError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let position = i;

        if ch.is_whitespace() {
            i += 1;
            continue;
        }

        let next = chars.get(i + 1).copied();
        let (token, len) = match ch {
            '0'..='9' | '.' => {
                let start = i;
                let mut end = i;
                let mut seen_dot = false;
                while end < chars.len() && (chars[end].is_ascii_digit() || (chars[end] == '.' && !seen_dot)) {
                    seen_dot |= chars[end] == '.';
                    end += 1;
                }
                let text: String = chars[start..end].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::UnexpectedChar { ch, position })?;
                (Token::Number(value), end - start)
            }
            '[' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|&c| c == ']')
                    .ok_or_else(|| FormulaError::InvalidReference(chars[i..].iter().collect()))?;
                let inner: String = chars[i + 1..i + 1 + close].iter().collect();
                (Token::Reference(Reference::parse(&inner)?), close + 2)
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                let mut end = i;
                while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                    end += 1;
                }
                (Token::Ident(chars[start..end].iter().collect()), end - start)
            }
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            ',' => (Token::Comma, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '*' => (Token::Star, 1),
            '/' => (Token::Slash, 1),
            '%' => (Token::Percent, 1),
            '^' => (Token::Caret, 1),
            '>' if next == Some('=') => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            '<' if next == Some('=') => (Token::Le, 2),
            '<' if next == Some('>') => (Token::Ne, 2),
            '<' => (Token::Lt, 1),
            '=' if next == Some('=') => (Token::Eq, 2),
            '=' => (Token::Eq, 1),
            '!' if next == Some('=') => (Token::Ne, 2),
            '!' => (Token::Bang, 1),
            '&' if next == Some('&') => (Token::And, 2),
            '|' if next == Some('|') => (Token::Or, 2),
            _ => return Err(FormulaError::UnexpectedChar { ch, position }),
        };

        tokens.push(Spanned { token, position });
        i += len;
    }

    Ok(tokens)
}
