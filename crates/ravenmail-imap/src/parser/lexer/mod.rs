//! Tokenizer for server response lines.
//!
//! Operates on a complete response (line plus any literals, as assembled by
//! the framing layer) and yields tokens per the RFC 9051 grammar. Literal
//! byte counts are 64-bit; the token borrows exactly the announced count
//! and scanning resumes at the byte after it.

#![allow(clippy::missing_errors_doc)]

mod token;

pub use token::Token;

use crate::{Error, Result};

/// Cursor over one response's bytes.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer over the given input.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Current byte offset.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Unconsumed input.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.pos.min(self.input.len())..]
    }

    /// Whether all input is consumed.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Current byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Byte at `offset` past the cursor.
    #[must_use]
    pub fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    /// Consumes one raw byte, bypassing tokenization. Used to capture
    /// unmodeled response-code text verbatim.
    pub fn next_raw_byte(&mut self) -> Option<u8> {
        self.advance()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.input.len());
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };

        match byte {
            b'\r' => {
                if self.peek_at(1) == Some(b'\n') {
                    self.skip(2);
                    Ok(Token::Crlf)
                } else {
                    Err(self.error("expected LF after CR"))
                }
            }
            b' ' => {
                self.advance();
                Ok(Token::Space)
            }
            b'(' => {
                self.advance();
                Ok(Token::LParen)
            }
            b')' => {
                self.advance();
                Ok(Token::RParen)
            }
            b'[' => {
                self.advance();
                Ok(Token::LBracket)
            }
            b']' => {
                self.advance();
                Ok(Token::RBracket)
            }
            b'*' => {
                self.advance();
                Ok(Token::Asterisk)
            }
            b'+' => {
                self.advance();
                Ok(Token::Plus)
            }
            b'"' => self.read_quoted_string(),
            b'{' => self.read_literal(),
            b'0'..=b'9' => self.read_number_or_atom(),
            _ if is_atom_char(byte) => self.read_atom(),
            _ => Err(self.error(&format!("unexpected byte {byte:#04x}"))),
        }
    }

    fn read_quoted_string(&mut self) -> Result<Token<'a>> {
        self.advance();

        let mut result = Vec::new();
        loop {
            match self.advance() {
                Some(b'"') => break,
                Some(b'\\') => match self.advance() {
                    // Only DQUOTE and backslash may be escaped.
                    Some(c @ (b'"' | b'\\')) => result.push(c),
                    Some(c) => return Err(self.error(&format!("invalid escape \\{}", c as char))),
                    None => return Err(self.error("unterminated quoted string")),
                },
                Some(c) => result.push(c),
                None => return Err(self.error("unterminated quoted string")),
            }
        }

        let s = String::from_utf8(result)
            .map_err(|_| self.error("quoted string is not valid UTF-8"))?;
        Ok(Token::QuotedString(s))
    }

    /// Reads `{count}` or `{count+}` followed by CRLF and exactly `count`
    /// bytes of data.
    fn read_literal(&mut self) -> Result<Token<'a>> {
        self.advance();

        let digits_start = self.pos;
        let mut non_sync = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => {
                    self.advance();
                }
                b'+' => {
                    non_sync = true;
                    self.advance();
                }
                b'}' => break,
                _ => return Err(self.error("invalid character in literal count")),
            }
        }

        let digits_end = if non_sync { self.pos - 1 } else { self.pos };
        if digits_start == digits_end {
            return Err(self.error("empty literal count"));
        }
        let digits = std::str::from_utf8(&self.input[digits_start..digits_end])
            .map_err(|_| self.error("invalid literal count"))?;
        let count: u64 = digits
            .parse()
            .map_err(|_| self.error("literal count out of range"))?;

        if self.advance() != Some(b'}') {
            return Err(self.error("expected } after literal count"));
        }
        if self.advance() != Some(b'\r') || self.advance() != Some(b'\n') {
            return Err(self.error("expected CRLF after literal count"));
        }

        let len = usize::try_from(count)
            .map_err(|_| self.error("literal count exceeds address space"))?;
        if self.pos + len > self.input.len() {
            return Err(self.error("literal data truncated"));
        }

        let data = &self.input[self.pos..self.pos + len];
        self.skip(len);
        Ok(Token::Literal(data))
    }

    fn read_number_or_atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;

        let mut all_digits = true;
        while let Some(b) = self.peek() {
            if is_atom_char(b) {
                if !b.is_ascii_digit() {
                    all_digits = false;
                }
                self.advance();
            } else {
                break;
            }
        }

        let s = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("atom is not valid UTF-8"))?;

        if all_digits {
            let n: u64 = s.parse().map_err(|_| self.error("number out of range"))?;
            Ok(Token::Number(n))
        } else {
            Ok(Token::Atom(s))
        }
    }

    fn read_atom(&mut self) -> Result<Token<'a>> {
        let start = self.pos;

        while let Some(b) = self.peek() {
            if is_atom_char(b) {
                self.advance();
            } else {
                break;
            }
        }

        let s = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("atom is not valid UTF-8"))?;

        if s.eq_ignore_ascii_case("NIL") {
            Ok(Token::Nil)
        } else {
            Ok(Token::Atom(s))
        }
    }

    fn error(&self, message: &str) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.to_string(),
        }
    }

    /// Consumes one token and checks it has the expected shape.
    #[allow(clippy::needless_pass_by_value)]
    pub fn expect(&mut self, expected: Token<'_>) -> Result<()> {
        let token = self.next_token()?;
        if std::mem::discriminant(&token) == std::mem::discriminant(&expected) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {expected:?}, got {token:?}")))
        }
    }

    /// Consumes a single space.
    pub fn expect_space(&mut self) -> Result<()> {
        self.expect(Token::Space)
    }

    /// Consumes the line terminator.
    pub fn expect_crlf(&mut self) -> Result<()> {
        self.expect(Token::Crlf)
    }

    /// Reads an astring: atom, quoted string, or literal.
    pub fn read_astring(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::QuotedString(s) => Ok(s),
            Token::Literal(data) => String::from_utf8(data.to_vec())
                .map_err(|_| self.error("literal is not valid UTF-8")),
            token => Err(self.error(&format!("expected astring, got {token:?}"))),
        }
    }

    /// Reads an nstring: NIL, quoted string, or literal.
    pub fn read_nstring(&mut self) -> Result<Option<Vec<u8>>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::QuotedString(s) => Ok(Some(s.into_bytes())),
            Token::Literal(data) => Ok(Some(data.to_vec())),
            token => Err(self.error(&format!("expected nstring, got {token:?}"))),
        }
    }

    /// Reads a number.
    pub fn read_number(&mut self) -> Result<u64> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            token => Err(self.error(&format!("expected number, got {token:?}"))),
        }
    }

    /// Reads a number that must fit a message counter.
    pub fn read_number_u32(&mut self) -> Result<u32> {
        let n = self.read_number()?;
        u32::try_from(n).map_err(|_| self.error("number exceeds 32 bits"))
    }

    /// Reads an atom.
    pub fn read_atom_string(&mut self) -> Result<&'a str> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s),
            token => Err(self.error(&format!("expected atom, got {token:?}"))),
        }
    }

    /// Consumes the remainder of the line up to (and including) CRLF or
    /// EOF, returning it as text.
    pub fn read_text(&mut self) -> Result<String> {
        let start = self.pos;
        let mut end = self.input.len();
        while self.pos < self.input.len() {
            if self.peek() == Some(b'\r') && self.peek_at(1) == Some(b'\n') {
                end = self.pos;
                self.skip(2);
                break;
            }
            self.advance();
        }
        std::str::from_utf8(&self.input[start..end])
            .map(str::to_string)
            .map_err(|_| self.error("response text is not valid UTF-8"))
    }

    /// Skips any run of spaces.
    pub fn skip_spaces(&mut self) {
        while self.peek() == Some(b' ') {
            self.advance();
        }
    }
}

/// Whether `b` may appear in an atom.
///
/// Backslash is accepted so flags like `\Seen` lex as one token, although
/// the grammar lists it as a quoted-special.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b,
        0x21..=0x27 |
        0x2B..=0x5A |
        0x5C |
        0x5E..=0x7A |
        0x7C |
        0x7E
    ) && b != b'"'
        && b != b'%'
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone, clippy::manual_string_new, clippy::unreadable_literal)]
mod tests {
    use super::*;

    #[test]
    fn untagged_prefix() {
        let mut lexer = Lexer::new(b"* OK");
        assert_eq!(lexer.next_token().unwrap(), Token::Asterisk);
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("OK"));
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn tagged_line() {
        let mut lexer = Lexer::new(b"A001 OK done\r\n");
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("A001"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("OK"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("done"));
        assert_eq!(lexer.next_token().unwrap(), Token::Crlf);
    }

    #[test]
    fn numbers_are_u64() {
        let mut lexer = Lexer::new(b"18446744073709551615");
        assert_eq!(lexer.next_token().unwrap(), Token::Number(u64::MAX));
    }

    #[test]
    fn quoted_string_with_escapes() {
        let mut lexer = Lexer::new(b"\"a \\\"b\\\" \\\\c\"");
        assert_eq!(
            lexer.next_token().unwrap(),
            Token::QuotedString("a \"b\" \\c".to_string())
        );
    }

    #[test]
    fn invalid_escape_is_rejected() {
        let mut lexer = Lexer::new(b"\"a\\nb\"");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn literal_consumes_exact_count() {
        // The literal body contains CRLF; it must not terminate the token.
        let mut lexer = Lexer::new(b"{5}\r\nA\r\nB FOO");
        match lexer.next_token().unwrap() {
            Token::Literal(data) => assert_eq!(data, b"A\r\nB"),
            other => panic!("expected literal, got {other:?}"),
        }
        // Scanning resumes at the byte after the literal.
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("FOO"));
        assert_eq!(lexer.next_token().unwrap(), Token::Eof);
    }

    #[test]
    fn truncated_literal_is_rejected() {
        let mut lexer = Lexer::new(b"{10}\r\nshort");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn non_sync_literal_marker_is_accepted() {
        let mut lexer = Lexer::new(b"{3+}\r\nabc");
        match lexer.next_token().unwrap() {
            Token::Literal(data) => assert_eq!(data, b"abc"),
            other => panic!("expected literal, got {other:?}"),
        }
    }

    #[test]
    fn nil_is_case_insensitive() {
        let mut lexer = Lexer::new(b"NIL nil");
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Nil);
    }

    #[test]
    fn flags_lex_as_single_atoms() {
        let mut lexer = Lexer::new(b"(\\Seen \\Flagged)");
        assert_eq!(lexer.next_token().unwrap(), Token::LParen);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("\\Seen"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("\\Flagged"));
        assert_eq!(lexer.next_token().unwrap(), Token::RParen);
    }

    #[test]
    fn bracketed_code() {
        let mut lexer = Lexer::new(b"[UIDNEXT 4392]");
        assert_eq!(lexer.next_token().unwrap(), Token::LBracket);
        assert_eq!(lexer.next_token().unwrap(), Token::Atom("UIDNEXT"));
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
        assert_eq!(lexer.next_token().unwrap(), Token::Number(4392));
        assert_eq!(lexer.next_token().unwrap(), Token::RBracket);
    }

    #[test]
    fn read_text_stops_at_crlf() {
        let mut lexer = Lexer::new(b"some human text\r\n");
        assert_eq!(lexer.read_text().unwrap(), "some human text");
        assert!(lexer.is_eof());
    }
}
