//! Parsed response data types.

use crate::types::{Flags, ResponseCode, SeqNum, Uid};

/// A generic piece of response data.
///
/// Unrecognized untagged responses and unmodeled fetch items are kept as a
/// tree of these rather than rejected, so listeners can still inspect them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data {
    /// Bare atom.
    Atom(String),
    /// Decimal number.
    Number(u64),
    /// Quoted string.
    Quoted(String),
    /// Literal bytes.
    Bytes(Vec<u8>),
    /// Parenthesized list.
    List(Vec<Data>),
    /// NIL.
    Nil,
}

/// One item from a STATUS response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusItem {
    /// MESSAGES count.
    Messages(u32),
    /// RECENT count.
    Recent(u32),
    /// UIDNEXT prediction.
    UidNext(u32),
    /// UIDVALIDITY epoch.
    UidValidity(u32),
    /// UNSEEN count.
    Unseen(u32),
    /// An attribute the engine does not model.
    Other(String, u64),
}

/// One attribute/value pair from a FETCH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// FLAGS.
    Flags(Flags),
    /// UID.
    Uid(Uid),
    /// RFC822.SIZE.
    Rfc822Size(u64),
    /// INTERNALDATE, verbatim.
    InternalDate(String),
    /// `BODY[section]<origin>` content; `data` is `None` for NIL.
    Body {
        /// Section specifier between the brackets, verbatim.
        section: String,
        /// Partial-fetch origin octet if present.
        origin: Option<u64>,
        /// The content, or `None` when the server sent NIL.
        data: Option<Vec<u8>>,
    },
    /// Any other attribute, kept generically.
    Other {
        /// Attribute name as sent.
        name: String,
        /// Attribute value.
        value: Data,
    },
}

/// An untagged server response.
#[derive(Debug, Clone, PartialEq)]
pub enum UntaggedResponse {
    /// `* OK` status with optional code.
    Ok {
        /// Bracketed response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* NO` status.
    No {
        /// Bracketed response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* BAD` status.
    Bad {
        /// Bracketed response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* PREAUTH` greeting.
    PreAuth {
        /// Bracketed response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* BYE` connection shutdown notice.
    Bye {
        /// Bracketed response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// CAPABILITY listing.
    Capability(Vec<crate::types::Capability>),
    /// `n EXISTS`.
    Exists(u32),
    /// `n RECENT`.
    Recent(u32),
    /// `n EXPUNGE`.
    Expunge(SeqNum),
    /// `n FETCH (...)`.
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// Parsed attribute/value pairs.
        items: Vec<FetchItem>,
    },
    /// FLAGS applicable to the mailbox.
    Flags(Flags),
    /// One LIST line.
    List(crate::types::ListEntry),
    /// SEARCH result sequence numbers.
    Search(Vec<SeqNum>),
    /// STATUS result for a mailbox.
    Status {
        /// Mailbox name.
        mailbox: String,
        /// Reported attributes.
        items: Vec<StatusItem>,
    },
    /// Any keyword the engine does not model, kept with its raw data.
    Other {
        /// Response keyword as sent.
        keyword: String,
        /// Remaining data on the line.
        data: Vec<Data>,
    },
}
