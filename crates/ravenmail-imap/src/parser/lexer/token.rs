//! Wire tokens.

/// A single token from a server response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Unquoted run of atom characters.
    Atom(&'a str),
    /// Quoted string with escapes resolved.
    QuotedString(String),
    /// Counted literal; the slice is exactly the announced byte count.
    Literal(&'a [u8]),
    /// Unsigned decimal number.
    Number(u64),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// Single space.
    Space,
    /// `*` untagged prefix.
    Asterisk,
    /// `+` continuation prefix.
    Plus,
    /// The NIL atom.
    Nil,
    /// Line terminator.
    Crlf,
    /// End of input.
    Eof,
}
