//! Lexer: source text → tokens. Unrecognized characters are skipped and
//! reported; the token stream always ends with `Eof`.

use mini_syntax::diagnostics::{Diagnostic, Phase};
use mini_syntax::span::{Position, Span};
use mini_syntax::token::{Token, TokenKind};
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Error)]
pub enum LexError {
    #[error("unexpected character '{character}'")]
    UnexpectedCharacter { character: char, position: Position },
    #[error("unterminated string literal")]
    UnterminatedString { position: Position },
}

impl LexError {
    pub fn kind(&self) -> &'static str {
        match self {
            LexError::UnexpectedCharacter { .. } => "unexpected-character",
            LexError::UnterminatedString { .. } => "unterminated-string",
        }
    }

    pub fn position(&self) -> Position {
        match self {
            LexError::UnexpectedCharacter { position, .. }
            | LexError::UnterminatedString { position } => *position,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let start = self.position();
        let end = Position::new(start.line, start.column + 1, start.offset + 1);
        Diagnostic::error(
            Phase::Lexical,
            self.kind(),
            self.to_string(),
            Some(Span::new(start, end)),
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Lexed {
    pub tokens: Vec<Token>,
    pub errors: Vec<LexError>,
}

pub fn tokenize(source: &str) -> Lexed {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let t = lexer.next_token();
        let eof = t.is_eof();
        tokens.push(t);
        if eof {
            break;
        }
    }
    Lexed {
        tokens,
        errors: lexer.errors,
    }
}

pub struct Lexer<'a> {
    source: &'a str,
    chars: Peekable<Chars<'a>>,
    pos: Position,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().peekable(),
            pos: Position::default(),
            errors: Vec::new(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    /// Character after the next one.
    fn peek_second(&self) -> Option<char> {
        let mut rest = self.source[self.pos.offset as usize..].chars();
        rest.next();
        rest.next()
    }

    fn next(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        self.pos.offset += c.len_utf8() as u32;
        if c == '\n' {
            self.pos.line += 1;
            self.pos.column = 1;
        } else {
            self.pos.column += 1;
        }
        Some(c)
    }

    fn span_from(&self, start: Position) -> Span {
        Span::new(start, self.pos)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.next();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    while matches!(self.peek(), Some(c) if c != '\n') {
                        self.next();
                    }
                }
                _ => return,
            }
        }
    }

    fn read_ident_or_keyword(&mut self, start: Position) -> Token {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            s.push(c);
            self.next();
        }
        let kind = TokenKind::keyword(&s).unwrap_or(TokenKind::Identifier);
        Token::new(kind, s, self.span_from(start))
    }

    fn read_number(&mut self, start: Position) -> Token {
        let mut s = String::new();
        while let Some(c) = self.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            s.push(c);
            self.next();
        }
        if self.peek() == Some('.') && matches!(self.peek_second(), Some(c) if c.is_ascii_digit())
        {
            s.push('.');
            self.next();
            while let Some(c) = self.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                s.push(c);
                self.next();
            }
        }
        Token::new(TokenKind::Number, s, self.span_from(start))
    }

    fn read_string(&mut self, start: Position, quote: char) -> Token {
        self.next(); // opening quote
        let mut s = String::new();
        loop {
            match self.next() {
                None => {
                    self.errors
                        .push(LexError::UnterminatedString { position: start });
                    break;
                }
                Some(c) if c == quote => break,
                Some('\\') => match self.next() {
                    Some('n') => s.push('\n'),
                    Some('t') => s.push('\t'),
                    Some('r') => s.push('\r'),
                    Some('0') => s.push('\0'),
                    Some(c) => s.push(c),
                    None => {
                        self.errors
                            .push(LexError::UnterminatedString { position: start });
                        break;
                    }
                },
                Some(c) => s.push(c),
            }
        }
        Token::new(TokenKind::String, s, self.span_from(start))
    }

    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_whitespace_and_comments();
            let start = self.pos;

            let c = match self.peek() {
                Some(c) => c,
                None => return Token::new(TokenKind::Eof, "", self.span_from(start)),
            };

            if c.is_ascii_alphabetic() || c == '_' {
                return self.read_ident_or_keyword(start);
            }
            if c.is_ascii_digit() {
                return self.read_number(start);
            }
            if c == '"' || c == '\'' {
                return self.read_string(start, c);
            }

            self.next();
            let kind = match c {
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '{' => TokenKind::LBrace,
                '}' => TokenKind::RBrace,
                ',' => TokenKind::Comma,
                ';' => TokenKind::Semicolon,
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '=' => self.with_eq(TokenKind::EqEq, TokenKind::Assign),
                '!' => self.with_eq(TokenKind::NotEq, TokenKind::Bang),
                '<' => self.with_eq(TokenKind::Le, TokenKind::Lt),
                '>' => self.with_eq(TokenKind::Ge, TokenKind::Gt),
                other => {
                    self.errors.push(LexError::UnexpectedCharacter {
                        character: other,
                        position: start,
                    });
                    continue;
                }
            };
            let text = kind.symbol().unwrap_or_default();
            return Token::new(kind, text, self.span_from(start));
        }
    }

    /// Two-character operator ending in `=`, else the one-character form.
    fn with_eq(&mut self, double: TokenKind, single: TokenKind) -> TokenKind {
        if self.peek() == Some('=') {
            self.next();
            double
        } else {
            single
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).tokens.iter().map(|t| t.kind).collect()
    }

    #[test]
    fn let_statement() {
        use TokenKind::*;
        assert_eq!(
            kinds("let x = 10;"),
            vec![Let, Identifier, Assign, Number, Semicolon, Eof]
        );
    }

    #[test]
    fn two_char_operators_win() {
        use TokenKind::*;
        assert_eq!(
            kinds("a == b != c <= d >= e < f > g ! h"),
            vec![
                Identifier, EqEq, Identifier, NotEq, Identifier, Le, Identifier, Ge, Identifier,
                Lt, Identifier, Gt, Identifier, Bang, Identifier, Eof
            ]
        );
    }

    #[test]
    fn positions_track_lines_and_columns() {
        let lexed = tokenize("let a = 1;\n  print(a);");
        let print = &lexed.tokens[5];
        assert_eq!(print.kind, TokenKind::Print);
        assert_eq!((print.line(), print.column()), (2, 3));
        assert_eq!(print.span.start.offset, 13);
    }

    #[test]
    fn numbers_and_strings() {
        let lexed = tokenize("3.25 7. 'it\\'s' \"a\\nb\"");
        let texts: Vec<&str> = lexed.tokens.iter().map(|t| t.text.as_str()).collect();
        // `7.` is a number followed by an unknown `.`
        assert_eq!(texts, vec!["3.25", "7", "it's", "a\nb", ""]);
        assert_eq!(lexed.errors.len(), 1);
        assert!(matches!(
            lexed.errors[0],
            LexError::UnexpectedCharacter { character: '.', .. }
        ));
    }

    #[test]
    fn comments_are_skipped() {
        use TokenKind::*;
        assert_eq!(kinds("1 // one\n/ 2"), vec![Number, Slash, Number, Eof]);
    }

    #[test]
    fn bad_characters_are_collected() {
        let lexed = tokenize("let @x = 1 # 2;");
        assert_eq!(lexed.errors.len(), 2);
        let d = lexed.errors[0].to_diagnostic();
        assert_eq!(d.phase, Phase::Lexical);
        assert_eq!((d.line(), d.column()), (Some(1), Some(5)));
        assert_eq!(lexed.tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
    }

    #[test]
    fn unterminated_string() {
        let lexed = tokenize("print(\"oops");
        assert_eq!(
            lexed.errors,
            vec![LexError::UnterminatedString {
                position: Position::new(1, 7, 6)
            }]
        );
        assert_eq!(lexed.tokens[2].text, "oops");
    }
}
