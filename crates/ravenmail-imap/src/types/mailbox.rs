//! Mailbox status and listing data.

use super::{Flags, SeqNum, Uid, UidValidity};

/// Snapshot produced by SELECT or EXAMINE.
#[derive(Debug, Clone, Default)]
pub struct MailboxStatus {
    /// Message count.
    pub exists: u32,
    /// Recent message count.
    pub recent: u32,
    /// Sequence number of the first unseen message, if reported.
    pub unseen: Option<SeqNum>,
    /// Predicted next UID.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY epoch.
    pub uid_validity: Option<UidValidity>,
    /// Flags applicable in this mailbox.
    pub flags: Flags,
    /// Flags that can be stored permanently.
    pub permanent_flags: Flags,
    /// Whether the mailbox was opened read-only.
    pub read_only: bool,
}

/// One line of a LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Name attributes, verbatim (for example `\Noselect`).
    pub attributes: Vec<String>,
    /// Hierarchy delimiter, `None` for a flat namespace.
    pub delimiter: Option<char>,
    /// Mailbox name.
    pub mailbox: String,
}
