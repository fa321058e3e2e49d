//! Command argument types.

use crate::types::Flags;

/// STATUS attributes to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAttribute {
    /// MESSAGES.
    Messages,
    /// RECENT.
    Recent,
    /// UIDNEXT.
    UidNext,
    /// UIDVALIDITY.
    UidValidity,
    /// UNSEEN.
    Unseen,
}

impl StatusAttribute {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Messages => "MESSAGES",
            Self::Recent => "RECENT",
            Self::UidNext => "UIDNEXT",
            Self::UidValidity => "UIDVALIDITY",
            Self::Unseen => "UNSEEN",
        }
    }
}

/// What to request in a FETCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItems {
    /// The ALL macro.
    All,
    /// The FAST macro.
    Fast,
    /// The FULL macro.
    Full,
    /// An explicit attribute list.
    Items(Vec<FetchAttribute>),
}

/// One FETCH attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchAttribute {
    /// FLAGS.
    Flags,
    /// INTERNALDATE.
    InternalDate,
    /// RFC822.SIZE.
    Rfc822Size,
    /// UID.
    Uid,
    /// `BODY[section]` or `BODY.PEEK[section]`, optionally partial.
    Body {
        /// Section specifier, `None` for the whole message.
        section: Option<String>,
        /// Use BODY.PEEK to avoid setting `\Seen`.
        peek: bool,
        /// `(origin, length)` for a partial fetch.
        partial: Option<(u32, u32)>,
    },
}

/// A STORE flag mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreAction {
    /// Replace the flag set.
    Set(Flags),
    /// Add flags.
    Add(Flags),
    /// Remove flags.
    Remove(Flags),
}

/// SEARCH criteria. Compound criteria AND together by juxtaposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchCriteria {
    /// All messages.
    All,
    /// Without `\Seen`.
    Unseen,
    /// With `\Seen`.
    Seen,
    /// With `\Deleted`.
    Deleted,
    /// With `\Flagged`.
    Flagged,
    /// FROM contains the text.
    From(String),
    /// SUBJECT contains the text.
    Subject(String),
    /// Header or body contains the text.
    Text(String),
    /// Received since the date (`dd-Mon-yyyy`).
    Since(String),
    /// Received before the date (`dd-Mon-yyyy`).
    Before(String),
    /// All of the criteria.
    And(Vec<Self>),
    /// Either criterion.
    Or(Box<Self>, Box<Self>),
    /// Negation.
    Not(Box<Self>),
}
