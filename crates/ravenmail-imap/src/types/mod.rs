//! Core protocol types.
//!
//! Identifiers, flags, capabilities, and response codes shared by the
//! parser, the connection driver, and the store surface. Follows RFC 3501
//! with the RFC 9051 (`IMAP4rev2`) additions the engine understands.

#![allow(clippy::missing_const_for_fn)]

mod capability;
mod flags;
mod identifiers;
mod mailbox;
mod response_code;
mod sequence;

pub use capability::{Capability, Status};
pub use flags::{Flag, Flags};
pub use identifiers::{SeqNum, Tag, Uid, UidValidity};
pub use mailbox::{ListEntry, MailboxStatus};
pub use response_code::ResponseCode;
pub use sequence::SequenceSet;
