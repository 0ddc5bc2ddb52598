use rill_core::location::CodeRange;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token types for the Rill language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    IntLit(i64),
    RealLit(f64),
    /// Imaginary literal: `1.5i`
    ImagLit(f64),
    BoolLit(bool),
    /// `~`, the infinite extent
    Infinity,

    Ident(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    EqEq,
    BangEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Bang,
    /// `++` array concatenation
    PlusPlus,
    /// `..` enumeration range
    DotDot,
    /// `#` array size query
    Hash,
    /// `@` size dimension selector
    At,

    // Punctuation
    Assign,
    Colon,
    Semicolon,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::IntLit(v) => write!(f, "int({})", v),
            TokenKind::RealLit(v) => write!(f, "real({})", v),
            TokenKind::ImagLit(v) => write!(f, "imag({})", v),
            TokenKind::BoolLit(v) => write!(f, "bool({})", v),
            TokenKind::Infinity => write!(f, "~"),
            TokenKind::Ident(s) => write!(f, "ident({})", s),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::Caret => write!(f, "^"),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::BangEq => write!(f, "!="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::LtEq => write!(f, "<="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::GtEq => write!(f, ">="),
            TokenKind::AndAnd => write!(f, "&&"),
            TokenKind::OrOr => write!(f, "||"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::PlusPlus => write!(f, "++"),
            TokenKind::DotDot => write!(f, ".."),
            TokenKind::Hash => write!(f, "#"),
            TokenKind::At => write!(f, "@"),
            TokenKind::Assign => write!(f, "="),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::Eof => write!(f, "<eof>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub range: CodeRange,
}

impl Token {
    pub fn new(kind: TokenKind, range: CodeRange) -> Self {
        Self { kind, range }
    }
}
