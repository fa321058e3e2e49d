//! Bracketed response codes.

use super::{Capability, Flags, SeqNum, Uid, UidValidity};

/// The `[CODE ...]` annotation carried by status responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: text must be surfaced to the user.
    Alert,
    /// Inline CAPABILITY listing.
    Capability(Vec<Capability>),
    /// PERMANENTFLAGS: flags that persist across sessions.
    PermanentFlags(Flags),
    /// Mailbox selected read-only.
    ReadOnly,
    /// Mailbox selected read-write.
    ReadWrite,
    /// Target mailbox does not exist but may be created.
    TryCreate,
    /// Predicted next UID.
    UidNext(Uid),
    /// UIDVALIDITY epoch of the selected mailbox.
    UidValidity(UidValidity),
    /// Sequence number of the first unseen message.
    Unseen(SeqNum),
    /// A code the engine does not model, kept verbatim.
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_codes_keep_their_text() {
        let code = ResponseCode::Unknown("HIGHESTMODSEQ 715194045007".to_string());
        if let ResponseCode::Unknown(text) = code {
            assert!(text.starts_with("HIGHESTMODSEQ"));
        } else {
            panic!("expected Unknown");
        }
    }
}
