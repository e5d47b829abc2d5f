use thiserror::Error;

use crate::token::{Position, Token, TokenKind, KEYWORDS};

/// The Lunic lexer.
///
/// ## Implementation Remarks
///
/// This type implements the [`Iterator`] trait so the parser can walk the
/// token stream without the lexer allocating it up front. The final item is a
/// token of kind [`TokenKind::Eof`]; after yielding it, the iterator is
/// exhausted.
///
/// The lexer never aborts. An unknown byte becomes a [`TokenKind::Illegal`]
/// token which the parser reports when it reaches it; an unterminated string
/// yields the accumulated text as a string token and records an error on the
/// lexer itself (there is no later token to hang it on).
pub struct Lexer<'src> {
    src: &'src [u8],
    cursor: usize,
    line: u32,
    column: u32,
    done: bool,
    errors: Vec<LexError>,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("Unterminated string literal")]
    UnterminatedString { position: Position },
}

impl LexError {
    pub fn position(&self) -> Position {
        match self {
            LexError::UnterminatedString { position } => *position,
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let token = self.scan_token();
        self.done = token.is_eof();
        Some(token)
    }
}

/// Collects the whole token stream for `src`, along with any errors the
/// lexer had to record on itself.
pub fn tokenize(src: &str) -> (Vec<Token>, Vec<LexError>) {
    let mut lexer = Lexer::new(src);
    let tokens: Vec<_> = lexer.by_ref().collect();
    (tokens, lexer.into_errors())
}

impl<'src> Lexer<'src> {
    pub fn new(src: &'src str) -> Lexer<'src> {
        Lexer {
            src: src.as_bytes(),
            cursor: 0,
            line: 1,
            column: 1,
            done: false,
            errors: Vec::new(),
        }
    }

    pub fn into_errors(self) -> Vec<LexError> {
        self.errors
    }

    fn scan_token(&mut self) -> Token {
        use TokenKind::*;

        self.skip_trivia();

        let position = self.current_position();
        let c = self.advance();
        match c {
            0 => Token::new(Eof, "", position),
            b'+' => self.produce(Plus, "+", position),
            b'-' => self.produce(Minus, "-", position),
            b'*' => self.produce(Asterisk, "*", position),
            b'/' => self.produce(Slash, "/", position),
            b'%' => self.produce(Percent, "%", position),
            b'~' => match self.peek() {
                b'=' => self.advance_with(NotEqLua, "~=", position),
                _ => self.produce(Illegal, "~", position),
            },
            b'!' => match self.peek() {
                b'=' => self.advance_with(NotEq, "!=", position),
                _ => self.produce(Bang, "!", position),
            },
            b'=' => match self.peek() {
                b'=' => self.advance_with(Eq, "==", position),
                b'>' => self.advance_with(Arrow, "=>", position),
                _ => self.produce(Assign, "=", position),
            },
            b'<' => match self.peek() {
                b'=' => self.advance_with(LtEq, "<=", position),
                _ => self.produce(Lt, "<", position),
            },
            b'>' => match self.peek() {
                b'=' => self.advance_with(GtEq, ">=", position),
                _ => self.produce(Gt, ">", position),
            },
            b'.' => match self.peek() {
                b'.' => self.advance_with(Concat, "..", position),
                _ => self.produce(Dot, ".", position),
            },
            b',' => self.produce(Comma, ",", position),
            b':' => self.produce(Colon, ":", position),
            b'?' => self.produce(Question, "?", position),
            b'|' => self.produce(Pipe, "|", position),
            b'(' => self.produce(LParen, "(", position),
            b')' => self.produce(RParen, ")", position),
            b'{' => self.produce(LBrace, "{", position),
            b'}' => self.produce(RBrace, "}", position),
            b'[' => self.produce(LBracket, "[", position),
            b']' => self.produce(RBracket, "]", position),
            b'"' => self.string(position),
            c if is_letter(c) => self.identifier_or_keyword(c, position),
            c if c.is_ascii_digit() => self.number(c, position),
            c => self.produce(Illegal, (c as char).to_string(), position),
        }
    }

    /// Skips whitespace and comments. Both comment forms open with two
    /// hyphens; `--[[` opens a block comment closed by `]]`.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.advance();
                }
                b'-' if self.peek_at(1) == b'-' => {
                    self.advance();
                    self.advance();
                    if self.peek() == b'[' && self.peek_at(1) == b'[' {
                        self.advance();
                        self.advance();
                        self.block_comment();
                    } else {
                        while self.peek() != b'\n' && self.peek() != 0 {
                            self.advance();
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn block_comment(&mut self) {
        // An unclosed block comment simply consumes the rest of the input.
        loop {
            match self.advance() {
                0 => return,
                b']' if self.peek() == b']' => {
                    self.advance();
                    return;
                }
                _ => {}
            }
        }
    }

    fn string(&mut self, position: Position) -> Token {
        // Accumulated as raw bytes so multi-byte characters pass through.
        let mut value: Vec<u8> = Vec::new();
        let cooked = |bytes: Vec<u8>| String::from_utf8_lossy(&bytes).into_owned();
        loop {
            match self.advance() {
                0 => {
                    self.errors.push(LexError::UnterminatedString { position });
                    return Token::new(TokenKind::String, cooked(value), position);
                }
                b'"' => return Token::new(TokenKind::String, cooked(value), position),
                b'\\' => match self.advance() {
                    0 => {
                        self.errors.push(LexError::UnterminatedString { position });
                        return Token::new(TokenKind::String, cooked(value), position);
                    }
                    b'n' => value.push(b'\n'),
                    b't' => value.push(b'\t'),
                    b'r' => value.push(b'\r'),
                    b'"' => value.push(b'"'),
                    b'\\' => value.push(b'\\'),
                    // Unknown escapes keep the literal character.
                    c => value.push(c),
                },
                c => value.push(c),
            }
        }
    }

    fn identifier_or_keyword(&mut self, first: u8, position: Position) -> Token {
        let mut lexeme = String::new();
        lexeme.push(first as char);
        while is_letter(self.peek()) || self.peek().is_ascii_digit() {
            lexeme.push(self.advance() as char);
        }
        match KEYWORDS.get(lexeme.as_str()) {
            Some(&kind) => Token::new(kind, lexeme, position),
            None => Token::new(TokenKind::Identifier, lexeme, position),
        }
    }

    fn number(&mut self, first: u8, position: Position) -> Token {
        let mut lexeme = String::new();
        lexeme.push(first as char);
        while self.peek().is_ascii_digit() {
            lexeme.push(self.advance() as char);
        }
        // A dot only belongs to the number if a digit follows; `1..2` must
        // lex as number, concat, number.
        if self.peek() == b'.' && self.peek_at(1).is_ascii_digit() {
            lexeme.push(self.advance() as char);
            while self.peek().is_ascii_digit() {
                lexeme.push(self.advance() as char);
            }
        }
        Token::new(TokenKind::Number, lexeme, position)
    }

    fn current_position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    /// Returns the next byte and advances, keeping the line/column counters
    /// in sync. Returns NUL at end of input.
    fn advance(&mut self) -> u8 {
        let Some(&c) = self.src.get(self.cursor) else {
            return 0;
        };
        self.cursor += 1;
        if c == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    /// Advances once and produces a token, for two-character operators.
    fn advance_with(&mut self, kind: TokenKind, lexeme: &str, position: Position) -> Token {
        self.advance();
        Token::new(kind, lexeme, position)
    }

    fn produce(&self, kind: TokenKind, lexeme: impl Into<String>, position: Position) -> Token {
        Token::new(kind, lexeme, position)
    }

    fn peek(&self) -> u8 {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.src.get(self.cursor + offset).copied().unwrap_or(0)
    }
}

fn is_letter(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}
