//! Pseudo-assembly Lexer
//!
//! Splits source text into tokens. Newlines are significant (one instruction or label per
//! line); `;` and `#` start a comment that runs to the end of the line.

use crate::backend::error::{IonError, IonResult, SourceLocation};

/// Token kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Opcode mnemonic or label name
    Ident(String),
    /// `%N`
    VReg(u32),
    /// Integer literal, optionally negative
    Int(i64),
    Colon,
    Comma,
    Newline,
    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier '{name}'"),
            TokenKind::VReg(id) => format!("register %{id}"),
            TokenKind::Int(value) => format!("integer {value}"),
            TokenKind::Colon => "':'".to_string(),
            TokenKind::Comma => "','".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

/// Streaming lexer over a source string.
pub struct Lexer<'src> {
    chars: std::iter::Peekable<std::str::CharIndices<'src>>,
    source: &'src str,
    line: u32,
    column: u32,
    finished: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            source,
            line: 1,
            column: 1,
            finished: false,
        }
    }

    /// Lex the whole input. The last token is always `Eof`.
    pub fn tokenize(source: &str) -> IonResult<Vec<Token>> {
        let mut lexer = Lexer::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    /// Consume characters while `pred` holds; return the consumed slice.
    fn take_while(&mut self, start: usize, pred: impl Fn(char) -> bool) -> &'src str {
        let mut end = start;
        while let Some(&(idx, c)) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            end = idx + c.len_utf8();
            self.bump();
        }
        &self.source[start..end]
    }

    pub fn next_token(&mut self) -> IonResult<Token> {
        loop {
            match self.peek_char() {
                Some(c) if c == ' ' || c == '\t' || c == '\r' => {
                    self.bump();
                }
                Some(';' | '#') => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }

        let location = SourceLocation::new(self.line, self.column);
        let Some((start, c)) = self.bump() else {
            self.finished = true;
            return Ok(Token { kind: TokenKind::Eof, location });
        };

        let kind = match c {
            '\n' => TokenKind::Newline,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '%' => {
                let digits = self.take_while(start + 1, |c| c.is_ascii_digit());
                if digits.is_empty() {
                    return Err(IonError::parse("expected register number after '%'", location));
                }
                let id = digits.parse::<u32>().map_err(|_| {
                    IonError::parse(format!("register number '{digits}' is out of range"), location)
                })?;
                TokenKind::VReg(id)
            }
            '-' | '0'..='9' => {
                let text = self.take_while(start + 1, |c| c.is_ascii_digit());
                let literal = &self.source[start..start + 1 + text.len()];
                if literal == "-" {
                    return Err(IonError::parse("expected digits after '-'", location));
                }
                let value = literal.parse::<i64>().map_err(|_| {
                    IonError::parse(format!("integer literal '{literal}' is out of range"), location)
                })?;
                TokenKind::Int(value)
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '.' => {
                let rest = self.take_while(start + c.len_utf8(), |c| {
                    c.is_ascii_alphanumeric() || c == '_' || c == '.'
                });
                let name = &self.source[start..start + c.len_utf8() + rest.len()];
                TokenKind::Ident(name.to_string())
            }
            other => {
                return Err(IonError::parse(format!("unexpected character '{other}'"), location));
            }
        };

        Ok(Token { kind, location })
    }
}

impl Iterator for Lexer<'_> {
    type Item = IonResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        Some(self.next_token())
    }
}
