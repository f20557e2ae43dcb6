//! Lexer tokens for Mini.

use crate::span::Span;
use serde::Serialize;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenKind {
    // Literals
    Number,
    String,
    Identifier,

    // Keywords
    Let,
    Const,
    Print,
    If,
    Else,
    Return,
    Function,
    True,
    False,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Assign, // =
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Bang,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,

    Eof,
}

impl TokenKind {
    /// Keyword lookup for identifier-shaped lexemes.
    pub fn keyword(text: &str) -> Option<TokenKind> {
        let kind = match text {
            "let" => TokenKind::Let,
            "const" => TokenKind::Const,
            "print" => TokenKind::Print,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "return" => TokenKind::Return,
            "function" => TokenKind::Function,
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            _ => return None,
        };
        Some(kind)
    }

    /// Fixed source text for keywords, operators and punctuation.
    pub fn symbol(self) -> Option<&'static str> {
        let s = match self {
            TokenKind::Let => "let",
            TokenKind::Const => "const",
            TokenKind::Print => "print",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::Return => "return",
            TokenKind::Function => "function",
            TokenKind::True => "true",
            TokenKind::False => "false",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Slash => "/",
            TokenKind::Assign => "=",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Gt => ">",
            TokenKind::Le => "<=",
            TokenKind::Ge => ">=",
            TokenKind::Bang => "!",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Number | TokenKind::String | TokenKind::Identifier | TokenKind::Eof => {
                return None
            }
        };
        Some(s)
    }

    /// True for tokens that may begin a statement (parser recovery points).
    pub fn starts_statement(self) -> bool {
        matches!(
            self,
            TokenKind::Let
                | TokenKind::Const
                | TokenKind::Function
                | TokenKind::If
                | TokenKind::Return
                | TokenKind::Print
        )
    }
}

/// Symbol for fixed-text kinds, class name (`IDENTIFIER`, `NUMBER`, ...) otherwise.
impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.symbol() {
            Some(s) => f.write_str(s),
            None => f.write_str(match self {
                TokenKind::Number => "NUMBER",
                TokenKind::String => "STRING",
                TokenKind::Identifier => "IDENTIFIER",
                _ => "EOF",
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    /// Lexeme; for strings, the contents without quotes.
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            text: text.into(),
            span,
        }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    pub fn line(&self) -> u32 {
        self.span.start.line
    }

    pub fn column(&self) -> u32 {
        self.span.start.column
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} {:?} {:?}",
            self.line(),
            self.column(),
            self.kind,
            self.text
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_table_round_trips_symbols() {
        for word in ["let", "const", "print", "if", "else", "return", "function", "true", "false"] {
            let kind = TokenKind::keyword(word).expect("keyword");
            assert_eq!(kind.symbol(), Some(word));
        }
        assert_eq!(TokenKind::keyword("lets"), None);
    }

    #[test]
    fn display_uses_symbol_or_class_name() {
        assert_eq!(TokenKind::RParen.to_string(), ")");
        assert_eq!(TokenKind::Identifier.to_string(), "IDENTIFIER");
        assert_eq!(TokenKind::Eof.to_string(), "EOF");
    }
}
