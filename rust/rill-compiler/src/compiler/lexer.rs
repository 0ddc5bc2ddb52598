//! Hand-written lexer for Rill source code.

use crate::compiler::tokens::{Token, TokenKind};
use rill_core::location::{CodePoint, CodeRange};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum LexError {
    #[error("unexpected character '{ch}' at line {line}, col {col}")]
    UnexpectedChar { ch: char, line: u32, col: u32 },
    #[error("invalid number at line {line}, col {col}")]
    InvalidNumber { line: u32, col: u32 },
}

impl LexError {
    pub fn range(&self) -> CodeRange {
        match self {
            LexError::UnexpectedChar { line, col, .. }
            | LexError::InvalidNumber { line, col } => CodeRange::point(*line, *col),
        }
    }
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }
    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn here(&self) -> CodePoint {
        CodePoint::new(self.line, self.col)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.current() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek() == Some('/') => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let start = self.here();
            let Some(ch) = self.current() else {
                tokens.push(Token::new(TokenKind::Eof, CodeRange::new(start, start)));
                return Ok(tokens);
            };
            let kind = match ch {
                '0'..='9' => self.lex_number()?,
                c if c.is_alphabetic() || c == '_' => self.lex_ident(),
                '~' => {
                    self.advance();
                    TokenKind::Infinity
                }
                '+' => {
                    self.advance();
                    if self.current() == Some('+') {
                        self.advance();
                        TokenKind::PlusPlus
                    } else {
                        TokenKind::Plus
                    }
                }
                '-' => {
                    self.advance();
                    TokenKind::Minus
                }
                '*' => {
                    self.advance();
                    TokenKind::Star
                }
                '/' => {
                    self.advance();
                    TokenKind::Slash
                }
                '%' => {
                    self.advance();
                    TokenKind::Percent
                }
                '^' => {
                    self.advance();
                    TokenKind::Caret
                }
                '=' => {
                    self.advance();
                    if self.current() == Some('=') {
                        self.advance();
                        TokenKind::EqEq
                    } else {
                        TokenKind::Assign
                    }
                }
                '!' => {
                    self.advance();
                    if self.current() == Some('=') {
                        self.advance();
                        TokenKind::BangEq
                    } else {
                        TokenKind::Bang
                    }
                }
                '<' => {
                    self.advance();
                    if self.current() == Some('=') {
                        self.advance();
                        TokenKind::LtEq
                    } else {
                        TokenKind::Lt
                    }
                }
                '>' => {
                    self.advance();
                    if self.current() == Some('=') {
                        self.advance();
                        TokenKind::GtEq
                    } else {
                        TokenKind::Gt
                    }
                }
                '&' => {
                    self.advance();
                    if self.current() == Some('&') {
                        self.advance();
                        TokenKind::AndAnd
                    } else {
                        return Err(LexError::UnexpectedChar {
                            ch: '&',
                            line: start.line,
                            col: start.column,
                        });
                    }
                }
                '|' => {
                    self.advance();
                    if self.current() == Some('|') {
                        self.advance();
                        TokenKind::OrOr
                    } else {
                        return Err(LexError::UnexpectedChar {
                            ch: '|',
                            line: start.line,
                            col: start.column,
                        });
                    }
                }
                '.' => {
                    self.advance();
                    if self.current() == Some('.') {
                        self.advance();
                        TokenKind::DotDot
                    } else {
                        return Err(LexError::UnexpectedChar {
                            ch: '.',
                            line: start.line,
                            col: start.column,
                        });
                    }
                }
                '#' => {
                    self.advance();
                    TokenKind::Hash
                }
                '@' => {
                    self.advance();
                    TokenKind::At
                }
                ':' => {
                    self.advance();
                    TokenKind::Colon
                }
                ';' => {
                    self.advance();
                    TokenKind::Semicolon
                }
                ',' => {
                    self.advance();
                    TokenKind::Comma
                }
                '(' => {
                    self.advance();
                    TokenKind::LParen
                }
                ')' => {
                    self.advance();
                    TokenKind::RParen
                }
                '[' => {
                    self.advance();
                    TokenKind::LBracket
                }
                ']' => {
                    self.advance();
                    TokenKind::RBracket
                }
                '{' => {
                    self.advance();
                    TokenKind::LBrace
                }
                '}' => {
                    self.advance();
                    TokenKind::RBrace
                }
                other => {
                    return Err(LexError::UnexpectedChar {
                        ch: other,
                        line: start.line,
                        col: start.column,
                    })
                }
            };
            let end = CodePoint::new(self.line, self.col.saturating_sub(1).max(1));
            tokens.push(Token::new(kind, CodeRange::new(start, end)));
        }
    }

    fn lex_number(&mut self) -> Result<TokenKind, LexError> {
        let line = self.line;
        let col = self.col;
        let mut text = String::new();
        while let Some(c) = self.current() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let mut is_real = false;
        // A '.' starts a fraction only when not the '..' range operator.
        if self.current() == Some('.') && self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
            is_real = true;
            text.push('.');
            self.advance();
            while let Some(c) = self.current() {
                if c.is_ascii_digit() {
                    text.push(c);
                    self.advance();
                } else {
                    break;
                }
            }
        }
        if self.current() == Some('i') {
            self.advance();
            let value = text
                .parse::<f64>()
                .map_err(|_| LexError::InvalidNumber { line, col })?;
            return Ok(TokenKind::ImagLit(value));
        }
        if is_real {
            let value = text
                .parse::<f64>()
                .map_err(|_| LexError::InvalidNumber { line, col })?;
            Ok(TokenKind::RealLit(value))
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|_| LexError::InvalidNumber { line, col })?;
            Ok(TokenKind::IntLit(value))
        }
    }

    fn lex_ident(&mut self) -> TokenKind {
        let mut text = String::new();
        while let Some(c) = self.current() {
            if c.is_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        match text.as_str() {
            "true" => TokenKind::BoolLit(true),
            "false" => TokenKind::BoolLit(false),
            _ => TokenKind::Ident(text),
        }
    }
}

/// Render a token stream for `--print-tokens`.
pub fn dump_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    for tok in tokens {
        out.push_str(&format!("{}  {}\n", tok.range, tok.kind));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a ++ b .. c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::PlusPlus,
                TokenKind::Ident("b".into()),
                TokenKind::DotDot,
                TokenKind::Ident("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("42 3.5 2i 1..4"),
            vec![
                TokenKind::IntLit(42),
                TokenKind::RealLit(3.5),
                TokenKind::ImagLit(2.0),
                TokenKind::IntLit(1),
                TokenKind::DotDot,
                TokenKind::IntLit(4),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comment_and_infinity() {
        assert_eq!(
            kinds("x = ~; // stream\n"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::Infinity,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_unexpected_char() {
        assert!(Lexer::new("a $ b").tokenize().is_err());
    }
}
