use std::{
    collections::{BTreeMap, VecDeque},
    str::Chars,
};

use itertools::{PeekNth, peek_nth};
use once_cell::sync::Lazy;
use strum::EnumString;

use crate::{
    error::{Diagnostic, ErrorKind},
    frontend::{Position, SourceFile},
};

#[derive(Debug)]
pub struct Lexer<'source> {
    source: &'source SourceFile,
    position: usize,
    line: usize,
    line_start: usize,
    chars: PeekNth<Chars<'source>>,
    peek_buffer: VecDeque<Token>,
}

#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /* Words */
    Keyword(Keyword), // while
    Identifier,       // main

    /* Literals */
    IntegerLiteral, // 1

    /* Delimiters */
    OpenParen,    // (
    CloseParen,   // )
    OpenBracket,  // [
    CloseBracket, // ]
    OpenBrace,    // {
    CloseBrace,   // }
    Semicolon,    // ;
    Comma,        // ,

    /* Unary + Binary Ops */
    Asterisk,  // *
    Minus,     // -
    Ampersand, // &

    /* Binary Ops */
    Plus,                 // +
    Divide,               // /
    LogicalAnd,           // &&
    LogicalOr,            // ||
    DoubleEquals,         // ==
    NotEquals,            // !=
    LessThan,             // <
    LessThanOrEqualTo,    // <=
    GreaterThan,          // >
    GreaterThanOrEqualTo, // >=

    /* Assignment */
    Equals, // =
}

impl TokenKind {
    pub fn is_equality_operator(&self) -> bool {
        matches!(self, Self::DoubleEquals | Self::NotEquals)
    }

    pub fn is_relational_operator(&self) -> bool {
        matches!(
            self,
            Self::LessThan
                | Self::LessThanOrEqualTo
                | Self::GreaterThan
                | Self::GreaterThanOrEqualTo
        )
    }

    pub fn is_term_operator(&self) -> bool {
        matches!(self, Self::Plus | Self::Minus)
    }

    pub fn is_factor_operator(&self) -> bool {
        matches!(self, Self::Asterisk | Self::Divide)
    }

    pub fn is_unary_operator(&self) -> bool {
        matches!(self, Self::Asterisk | Self::Minus | Self::Ampersand)
    }

    pub fn is_type_keyword(&self) -> bool {
        matches!(self, Self::Keyword(Keyword::Int | Keyword::Void))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Keyword {
    Int,
    Void,
    If,
    Else,
    While,
    For,
    Return,
}

/// Table of single char tokens (matched after longer sequences are checked for)
static SINGLE_TOKENS: Lazy<BTreeMap<char, TokenKind>> = Lazy::new(|| {
    BTreeMap::from([
        ('(', TokenKind::OpenParen),
        (')', TokenKind::CloseParen),
        ('[', TokenKind::OpenBracket),
        (']', TokenKind::CloseBracket),
        ('{', TokenKind::OpenBrace),
        ('}', TokenKind::CloseBrace),
        (';', TokenKind::Semicolon),
        (',', TokenKind::Comma),
        ('*', TokenKind::Asterisk),
        ('-', TokenKind::Minus),
        ('&', TokenKind::Ampersand),
        ('=', TokenKind::Equals),
        ('+', TokenKind::Plus),
        ('/', TokenKind::Divide),
        ('<', TokenKind::LessThan),
        ('>', TokenKind::GreaterThan),
    ])
});

/// A byte range in the source along with the position of its first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub position: Position,
}

impl Span {
    /// A span starting where `self` starts and ending where `other` ends
    pub fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
            position: self.position,
        }
    }
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source SourceFile) -> Self {
        Self {
            source,
            chars: peek_nth(source.contents.chars()),
            position: 0,
            line: 1,
            line_start: 0,
            peek_buffer: VecDeque::new(),
        }
    }

    pub fn source(&self) -> &'source SourceFile {
        self.source
    }

    pub fn current_position(&self) -> Position {
        Position::new(self.line, self.position - self.line_start + 1)
    }

    fn error(&self, message: String) -> Diagnostic {
        Diagnostic::new(self.current_position(), ErrorKind::Syntax(message))
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next()?;

        self.position += c.len_utf8();

        if c == '\n' {
            self.line += 1;
            self.line_start = self.position;
        }

        Some(c)
    }

    fn ignore_whitespace(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_ascii_whitespace()) {
            self.advance();
        }
    }

    fn ignore_line(&mut self) {
        while self.chars.peek().is_some_and(|c| *c != '\n') {
            self.advance();
        }
    }

    fn ignore_block_comment(&mut self) -> Result<(), Diagnostic> {
        let start = self.current_position();

        // Consume the opening `/*`
        self.advance();
        self.advance();

        loop {
            match self.advance() {
                Some('*') if self.chars.peek().is_some_and(|c| *c == '/') => {
                    self.advance();
                    return Ok(());
                }
                Some(_) => {}
                None => {
                    return Err(Diagnostic::new(
                        start,
                        ErrorKind::Syntax("unterminated block comment".into()),
                    ));
                }
            }
        }
    }

    // Keyword or identifier
    fn read_word(&mut self) -> Token {
        let start_position = self.position;
        let position = self.current_position();

        while self
            .chars
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
        {
            self.advance();
        }

        let span = self.new_span(start_position, position);
        let value = self.source.value_of_span(span);

        let kind = match value.parse() {
            Ok(keyword) => TokenKind::Keyword(keyword),
            Err(_) => TokenKind::Identifier,
        };

        Token { kind, span }
    }

    fn read_number(&mut self) -> Token {
        let start_position = self.position;
        let position = self.current_position();

        while self.chars.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        Token {
            kind: TokenKind::IntegerLiteral,
            span: self.new_span(start_position, position),
        }
    }

    fn read_tokens(&mut self, length: usize, kind: TokenKind) -> Token {
        let start_position = self.position;
        let position = self.current_position();

        for _ in 0..length {
            self.advance();
        }

        Token {
            kind,
            span: self.new_span(start_position, position),
        }
    }

    fn new_span(&self, start: usize, position: Position) -> Span {
        Span {
            start,
            end: self.position,
            position,
        }
    }

    pub fn peek(&mut self) -> Result<Option<Token>, Diagnostic> {
        self.peek_nth(0)
    }

    pub fn peek_nth(&mut self, n: usize) -> Result<Option<Token>, Diagnostic> {
        while self.peek_buffer.len() <= n {
            match self.read_token()? {
                Some(token) => self.peek_buffer.push_back(token),
                None => break,
            }
        }

        Ok(self.peek_buffer.get(n).copied())
    }

    pub fn next(&mut self) -> Result<Option<Token>, Diagnostic> {
        if let Some(token) = self.peek_buffer.pop_front() {
            return Ok(Some(token));
        }

        self.read_token()
    }

    fn read_token(&mut self) -> Result<Option<Token>, Diagnostic> {
        while let Some(c) = self.chars.peek().copied() {
            let second = self.chars.peek_nth(1).copied();

            let token = match (c, second) {
                // Ignore whitespace
                (c, _) if c.is_ascii_whitespace() => {
                    self.ignore_whitespace();
                    continue;
                }
                // Ignore comments
                ('/', Some('/')) => {
                    self.ignore_line();
                    continue;
                }
                ('/', Some('*')) => {
                    self.ignore_block_comment()?;
                    continue;
                }

                // Integer literals
                (n, _) if n.is_ascii_digit() => self.read_number(),

                // Identifiers and keywords
                (a, _) if a.is_ascii_alphabetic() || a == '_' => self.read_word(),

                ('=', Some('=')) => self.read_tokens(2, TokenKind::DoubleEquals),
                ('!', Some('=')) => self.read_tokens(2, TokenKind::NotEquals),
                ('<', Some('=')) => self.read_tokens(2, TokenKind::LessThanOrEqualTo),
                ('>', Some('=')) => self.read_tokens(2, TokenKind::GreaterThanOrEqualTo),
                ('&', Some('&')) => self.read_tokens(2, TokenKind::LogicalAnd),
                ('|', Some('|')) => self.read_tokens(2, TokenKind::LogicalOr),

                (s, _) if SINGLE_TOKENS.contains_key(&s) => self.read_tokens(1, SINGLE_TOKENS[&s]),
                (c, _) => return Err(self.error(format!("unexpected character `{c}`"))),
            };

            return Ok(Some(token));
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let source = SourceFile::from_memory(source);
        let mut lexer = Lexer::new(&source);
        let mut kinds = Vec::new();

        while let Some(token) = lexer.next().unwrap() {
            kinds.push(token.kind);
        }

        kinds
    }

    #[test]
    fn lexes_operators_longest_first() {
        assert_eq!(
            kinds("a <= b && *p != -1"),
            vec![
                TokenKind::Identifier,
                TokenKind::LessThanOrEqualTo,
                TokenKind::Identifier,
                TokenKind::LogicalAnd,
                TokenKind::Asterisk,
                TokenKind::Identifier,
                TokenKind::NotEquals,
                TokenKind::Minus,
                TokenKind::IntegerLiteral,
            ]
        );
    }

    #[test]
    fn classifies_keywords() {
        assert_eq!(
            kinds("int whilex while"),
            vec![
                TokenKind::Keyword(Keyword::Int),
                TokenKind::Identifier,
                TokenKind::Keyword(Keyword::While),
            ]
        );
    }

    #[test]
    fn skips_comments_and_tracks_positions() {
        let source = SourceFile::from_memory("// line\n/* block\n */  x");
        let mut lexer = Lexer::new(&source);

        let token = lexer.next().unwrap().unwrap();

        assert_eq!(token.kind, TokenKind::Identifier);
        assert_eq!(token.span.position, Position::new(3, 6));
        assert!(lexer.next().unwrap().is_none());
    }

    #[test]
    fn rejects_unknown_characters() {
        let source = SourceFile::from_memory("int a;\n  @");
        let mut lexer = Lexer::new(&source);

        let error = loop {
            match lexer.next() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected a lexing error"),
                Err(error) => break error,
            }
        };

        assert_eq!(error.position, Position::new(2, 3));
        assert!(matches!(error.kind, ErrorKind::Syntax(_)));
    }
}
