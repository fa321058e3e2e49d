//! Client commands and their wire serialization.

mod serialize;
mod tag_generator;
mod types;

pub use tag_generator::TagGenerator;
pub use types::{FetchAttribute, FetchItems, SearchCriteria, StatusAttribute, StoreAction};

use crate::types::SequenceSet;

use serialize::{write_astring, write_fetch_items, write_search_criteria, write_store_action};

/// A client command.
///
/// The same FETCH, STORE, and SEARCH shapes serve both sequence-number and
/// UID variants via the `uid` flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY.
    Capability,
    /// NOOP, also used as a pool liveness probe.
    Noop,
    /// LOGOUT.
    Logout,
    /// STARTTLS.
    StartTls,
    /// LOGIN with plaintext credentials.
    Login {
        /// Account name.
        username: String,
        /// Password.
        password: String,
    },
    /// AUTHENTICATE; further exchange runs over continuations.
    Authenticate {
        /// SASL mechanism name.
        mechanism: String,
        /// Base64 initial response, already encoded (`=` for empty).
        initial_response: Option<String>,
    },
    /// SELECT a mailbox read-write.
    Select {
        /// Mailbox name.
        mailbox: String,
    },
    /// EXAMINE a mailbox read-only.
    Examine {
        /// Mailbox name.
        mailbox: String,
    },
    /// LIST mailboxes.
    List {
        /// Reference name.
        reference: String,
        /// Mailbox pattern.
        pattern: String,
    },
    /// STATUS of a mailbox without selecting it.
    Status {
        /// Mailbox name.
        mailbox: String,
        /// Attributes to request.
        items: Vec<StatusAttribute>,
    },
    /// CLOSE the selected mailbox, expunging silently.
    Close,
    /// EXPUNGE deleted messages.
    Expunge,
    /// SEARCH for messages.
    Search {
        /// Criteria.
        criteria: SearchCriteria,
        /// Interpret results as UIDs.
        uid: bool,
    },
    /// FETCH message data.
    Fetch {
        /// Message set.
        sequence: SequenceSet,
        /// Attributes to fetch.
        items: FetchItems,
        /// Interpret the set as UIDs.
        uid: bool,
    },
    /// STORE flag changes.
    Store {
        /// Message set.
        sequence: SequenceSet,
        /// Flag mutation.
        action: StoreAction,
        /// Interpret the set as UIDs.
        uid: bool,
        /// Suppress the echoing FETCH responses.
        silent: bool,
    },
    /// IDLE.
    Idle,
    /// DONE, terminating IDLE. Sent without a tag.
    Done,
}

impl Command {
    /// Serializes the command line, including the trailing CRLF.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();

        // DONE continues the IDLE command and carries no tag.
        if !matches!(self, Self::Done) {
            buf.extend_from_slice(tag.as_bytes());
            buf.push(b' ');
        }

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),
            Self::Idle => buf.extend_from_slice(b"IDLE"),
            Self::Done => buf.extend_from_slice(b"DONE"),
            Self::Close => buf.extend_from_slice(b"CLOSE"),
            Self::Expunge => buf.extend_from_slice(b"EXPUNGE"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN ");
                write_astring(&mut buf, username);
                buf.push(b' ');
                write_astring(&mut buf, password);
            }

            Self::Authenticate {
                mechanism,
                initial_response,
            } => {
                buf.extend_from_slice(b"AUTHENTICATE ");
                buf.extend_from_slice(mechanism.as_bytes());
                if let Some(resp) = initial_response {
                    buf.push(b' ');
                    buf.extend_from_slice(resp.as_bytes());
                }
            }

            Self::Select { mailbox } => {
                buf.extend_from_slice(b"SELECT ");
                write_astring(&mut buf, mailbox);
            }

            Self::Examine { mailbox } => {
                buf.extend_from_slice(b"EXAMINE ");
                write_astring(&mut buf, mailbox);
            }

            Self::List { reference, pattern } => {
                buf.extend_from_slice(b"LIST ");
                write_astring(&mut buf, reference);
                buf.push(b' ');
                write_astring(&mut buf, pattern);
            }

            Self::Status { mailbox, items } => {
                buf.extend_from_slice(b"STATUS ");
                write_astring(&mut buf, mailbox);
                buf.extend_from_slice(b" (");
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        buf.push(b' ');
                    }
                    buf.extend_from_slice(item.as_str().as_bytes());
                }
                buf.push(b')');
            }

            Self::Search { criteria, uid } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"SEARCH ");
                write_search_criteria(&mut buf, criteria);
            }

            Self::Fetch {
                sequence,
                items,
                uid,
            } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"FETCH ");
                buf.extend_from_slice(sequence.to_string().as_bytes());
                buf.push(b' ');
                write_fetch_items(&mut buf, items);
            }

            Self::Store {
                sequence,
                action,
                uid,
                silent,
            } => {
                if *uid {
                    buf.extend_from_slice(b"UID ");
                }
                buf.extend_from_slice(b"STORE ");
                buf.extend_from_slice(sequence.to_string().as_bytes());
                buf.push(b' ');
                write_store_action(&mut buf, action, *silent);
            }
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Flag, Flags};

    fn render(cmd: &Command) -> String {
        String::from_utf8(cmd.serialize("R1")).unwrap()
    }

    #[test]
    fn simple_commands() {
        assert_eq!(render(&Command::Noop), "R1 NOOP\r\n");
        assert_eq!(render(&Command::Capability), "R1 CAPABILITY\r\n");
        assert_eq!(render(&Command::Idle), "R1 IDLE\r\n");
    }

    #[test]
    fn done_carries_no_tag() {
        assert_eq!(render(&Command::Done), "DONE\r\n");
    }

    #[test]
    fn login_quotes_when_needed() {
        let cmd = Command::Login {
            username: "user@example.com".into(),
            password: "p w".into(),
        };
        assert_eq!(render(&cmd), "R1 LOGIN user@example.com \"p w\"\r\n");
    }

    #[test]
    fn authenticate_with_initial_response() {
        let cmd = Command::Authenticate {
            mechanism: "PLAIN".into(),
            initial_response: Some("dGVzdAB0ZXN0AHRlc3Q=".into()),
        };
        assert_eq!(render(&cmd), "R1 AUTHENTICATE PLAIN dGVzdAB0ZXN0AHRlc3Q=\r\n");
    }

    #[test]
    fn select_quotes_spaced_mailbox() {
        let cmd = Command::Select {
            mailbox: "My Folder".into(),
        };
        assert_eq!(render(&cmd), "R1 SELECT \"My Folder\"\r\n");
    }

    #[test]
    fn uid_fetch_with_attribute_list() {
        let cmd = Command::Fetch {
            sequence: SequenceSet::range(1, 10).unwrap(),
            items: FetchItems::Items(vec![FetchAttribute::Flags, FetchAttribute::Uid]),
            uid: true,
        };
        assert_eq!(render(&cmd), "R1 UID FETCH 1:10 (FLAGS UID)\r\n");
    }

    #[test]
    fn silent_store() {
        let cmd = Command::Store {
            sequence: SequenceSet::single(3).unwrap(),
            action: StoreAction::Add(Flags::from_vec(vec![Flag::Seen])),
            uid: false,
            silent: true,
        };
        assert_eq!(render(&cmd), "R1 STORE 3 +FLAGS.SILENT (\\Seen)\r\n");
    }

    #[test]
    fn compound_search() {
        let cmd = Command::Search {
            criteria: SearchCriteria::And(vec![
                SearchCriteria::Unseen,
                SearchCriteria::From("alice".into()),
            ]),
            uid: false,
        };
        assert_eq!(render(&cmd), "R1 SEARCH UNSEEN FROM alice\r\n");
    }
}
