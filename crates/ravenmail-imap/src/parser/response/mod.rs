//! Server response parsing.
//!
//! Turns one framed response (line plus literals) into a [`Response`].
//! Keywords the engine does not model are kept as
//! [`UntaggedResponse::Other`] with their data as a generic token tree,
//! never rejected; a parse error here means the response was malformed,
//! not merely unfamiliar.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::option_if_let_else)]

mod fetch;
mod helpers;
mod types;

pub use types::{Data, FetchItem, StatusItem, UntaggedResponse};

use crate::parser::lexer::{Lexer, Token};
use crate::types::{ResponseCode, SeqNum, Status, Tag};
use crate::{Error, Result};

use helpers::{
    parse_capability_data, parse_data_items, parse_flag_list, parse_list_response,
    parse_response_code, parse_search_response, parse_status_response,
};

/// One parsed server response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Command completion, correlated by tag.
    Tagged {
        /// The echoed command tag.
        tag: Tag,
        /// Completion status.
        status: Status,
        /// Bracketed response code, if any.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Server data or status not tied to a specific command.
    Untagged(UntaggedResponse),
    /// `+` continuation request.
    Continuation {
        /// Prompt text after the `+`, if any. Base64 for SASL exchanges.
        text: Option<String>,
    },
}

/// Entry point for response parsing.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses a complete framed response.
    pub fn parse(input: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(input);

        match lexer.next_token()? {
            Token::Asterisk => Self::parse_untagged(&mut lexer),
            Token::Plus => Self::parse_continuation(&mut lexer),
            Token::Atom(tag) => Self::parse_tagged(&mut lexer, tag),
            token => Err(Error::Parse {
                position: 0,
                message: format!("expected *, +, or tag, got {token:?}"),
            }),
        }
    }

    fn parse_tagged(lexer: &mut Lexer<'_>, tag: &str) -> Result<Response> {
        lexer.expect_space()?;
        let status = Self::parse_status(lexer)?;
        lexer.expect_space()?;
        let (code, text) = Self::parse_resp_text(lexer)?;

        Ok(Response::Tagged {
            tag: Tag::new(tag),
            status,
            code,
            text,
        })
    }

    fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<Response> {
        lexer.expect_space()?;

        match lexer.next_token()? {
            Token::Atom(s) => Self::parse_untagged_keyword(lexer, s),
            Token::Number(n) => Self::parse_untagged_numeric(lexer, n),
            token => Err(Error::Parse {
                position: lexer.position(),
                message: format!("unexpected token after *: {token:?}"),
            }),
        }
    }

    fn parse_untagged_keyword(lexer: &mut Lexer<'_>, keyword: &str) -> Result<Response> {
        let upper = keyword.to_uppercase();
        let response = match upper.as_str() {
            "OK" => {
                lexer.expect_space()?;
                let (code, text) = Self::parse_resp_text(lexer)?;
                UntaggedResponse::Ok { code, text }
            }
            "NO" => {
                lexer.expect_space()?;
                let (code, text) = Self::parse_resp_text(lexer)?;
                UntaggedResponse::No { code, text }
            }
            "BAD" => {
                lexer.expect_space()?;
                let (code, text) = Self::parse_resp_text(lexer)?;
                UntaggedResponse::Bad { code, text }
            }
            "PREAUTH" => {
                lexer.expect_space()?;
                let (code, text) = Self::parse_resp_text(lexer)?;
                UntaggedResponse::PreAuth { code, text }
            }
            "BYE" => {
                lexer.expect_space()?;
                let (code, text) = Self::parse_resp_text(lexer)?;
                UntaggedResponse::Bye { code, text }
            }
            "CAPABILITY" => UntaggedResponse::Capability(parse_capability_data(lexer)?),
            "FLAGS" => {
                lexer.expect_space()?;
                UntaggedResponse::Flags(parse_flag_list(lexer)?)
            }
            "LIST" | "LSUB" => {
                lexer.expect_space()?;
                UntaggedResponse::List(parse_list_response(lexer)?)
            }
            "SEARCH" => UntaggedResponse::Search(parse_search_response(lexer)?),
            "STATUS" => {
                lexer.expect_space()?;
                let (mailbox, items) = parse_status_response(lexer)?;
                UntaggedResponse::Status { mailbox, items }
            }
            _ => UntaggedResponse::Other {
                keyword: keyword.to_string(),
                data: parse_data_items(lexer)?,
            },
        };

        Ok(Response::Untagged(response))
    }

    fn parse_untagged_numeric(lexer: &mut Lexer<'_>, n: u64) -> Result<Response> {
        lexer.expect_space()?;
        let keyword = lexer.read_atom_string()?;
        let upper = keyword.to_uppercase();

        let count = u32::try_from(n).map_err(|_| Error::Parse {
            position: lexer.position(),
            message: "message number exceeds 32 bits".to_string(),
        });

        let response = match upper.as_str() {
            "EXISTS" => UntaggedResponse::Exists(count?),
            "RECENT" => UntaggedResponse::Recent(count?),
            "EXPUNGE" => {
                let seq = SeqNum::new(count?).ok_or_else(|| Error::Parse {
                    position: lexer.position(),
                    message: "EXPUNGE of message 0".to_string(),
                })?;
                UntaggedResponse::Expunge(seq)
            }
            "FETCH" => {
                let seq = SeqNum::new(count?).ok_or_else(|| Error::Parse {
                    position: lexer.position(),
                    message: "FETCH of message 0".to_string(),
                })?;
                lexer.expect_space()?;
                UntaggedResponse::Fetch {
                    seq,
                    items: fetch::parse_fetch_response(lexer)?,
                }
            }
            _ => {
                let mut data = vec![Data::Number(n)];
                data.extend(parse_data_items(lexer)?);
                UntaggedResponse::Other {
                    keyword: keyword.to_string(),
                    data,
                }
            }
        };

        Ok(Response::Untagged(response))
    }

    fn parse_continuation(lexer: &mut Lexer<'_>) -> Result<Response> {
        if lexer.peek() == Some(b' ') {
            lexer.expect_space()?;
        }
        let text = lexer.read_text()?;
        Ok(Response::Continuation {
            text: if text.is_empty() { None } else { Some(text) },
        })
    }

    fn parse_status(lexer: &mut Lexer<'_>) -> Result<Status> {
        let s = lexer.read_atom_string()?;
        match s.to_uppercase().as_str() {
            "OK" => Ok(Status::Ok),
            "NO" => Ok(Status::No),
            "BAD" => Ok(Status::Bad),
            "PREAUTH" => Ok(Status::PreAuth),
            "BYE" => Ok(Status::Bye),
            _ => Err(Error::Parse {
                position: lexer.position(),
                message: format!("invalid status: {s}"),
            }),
        }
    }

    fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
        let code = if lexer.peek() == Some(b'[') {
            Some(parse_response_code(lexer)?)
        } else {
            None
        };

        if lexer.peek() == Some(b' ') {
            lexer.expect_space()?;
        }

        let text = lexer.read_text()?;
        Ok((code, text))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;
    use crate::types::{Capability, Flag};

    #[test]
    fn untagged_ok_greeting() {
        let response = ResponseParser::parse(b"* OK server ready\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Ok { code, text }) => {
                assert!(code.is_none());
                assert_eq!(text, "server ready");
            }
            other => panic!("expected untagged OK, got {other:?}"),
        }
    }

    #[test]
    fn tagged_completion() {
        let response = ResponseParser::parse(b"A007 OK LOGIN completed\r\n").unwrap();
        match response {
            Response::Tagged {
                tag, status, text, ..
            } => {
                assert_eq!(tag.as_str(), "A007");
                assert_eq!(status, Status::Ok);
                assert_eq!(text, "LOGIN completed");
            }
            other => panic!("expected tagged, got {other:?}"),
        }
    }

    #[test]
    fn capability_listing() {
        let response =
            ResponseParser::parse(b"* CAPABILITY IMAP4rev1 IDLE AUTH=PLAIN AUTH=XOAUTH2\r\n")
                .unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Capability(caps)) => {
                assert!(caps.contains(&Capability::Imap4Rev1));
                assert!(caps.contains(&Capability::Idle));
                assert!(caps.contains(&Capability::Auth("PLAIN".into())));
                assert!(caps.contains(&Capability::Auth("XOAUTH2".into())));
            }
            other => panic!("expected capabilities, got {other:?}"),
        }
    }

    #[test]
    fn exists_and_expunge() {
        let response = ResponseParser::parse(b"* 23 EXISTS\r\n").unwrap();
        assert!(matches!(
            response,
            Response::Untagged(UntaggedResponse::Exists(23))
        ));

        let response = ResponseParser::parse(b"* 4 EXPUNGE\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Expunge(seq)) => assert_eq!(seq.get(), 4),
            other => panic!("expected EXPUNGE, got {other:?}"),
        }
    }

    #[test]
    fn fetch_with_flags() {
        let response = ResponseParser::parse(b"* 12 FETCH (FLAGS (\\Seen) UID 4827)\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Fetch { seq, items }) => {
                assert_eq!(seq.get(), 12);
                assert!(
                    items
                        .iter()
                        .any(|i| matches!(i, FetchItem::Flags(f) if f.contains(&Flag::Seen)))
                );
                assert!(
                    items
                        .iter()
                        .any(|i| matches!(i, FetchItem::Uid(u) if u.get() == 4827))
                );
            }
            other => panic!("expected FETCH, got {other:?}"),
        }
    }

    #[test]
    fn response_code_on_untagged_ok() {
        let response = ResponseParser::parse(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n")
            .unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Ok { code, .. }) => {
                assert_eq!(
                    code,
                    Some(ResponseCode::UidValidity(
                        crate::types::UidValidity::new(3857529045).unwrap()
                    ))
                );
            }
            other => panic!("expected OK with code, got {other:?}"),
        }
    }

    #[test]
    fn unknown_response_code_is_kept_verbatim() {
        let response =
            ResponseParser::parse(b"* OK [HIGHESTMODSEQ 715194045007] ok\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Ok { code, .. }) => {
                assert_eq!(
                    code,
                    Some(ResponseCode::Unknown("HIGHESTMODSEQ 715194045007".into()))
                );
            }
            other => panic!("expected OK with code, got {other:?}"),
        }
    }

    #[test]
    fn unknown_keyword_is_lenient() {
        let response = ResponseParser::parse(b"* NAMESPACE ((\"\" \"/\")) NIL NIL\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Other { keyword, data }) => {
                assert_eq!(keyword, "NAMESPACE");
                assert_eq!(data.len(), 3);
                assert_eq!(data[1], Data::Nil);
            }
            other => panic!("expected Other, got {other:?}"),
        }
    }

    #[test]
    fn unknown_numeric_keyword_is_lenient() {
        let response = ResponseParser::parse(b"* 7 XSTATE (FOO 1)\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Other { keyword, data }) => {
                assert_eq!(keyword, "XSTATE");
                assert_eq!(data[0], Data::Number(7));
            }
            other => panic!("expected Other, got {other:?}"),
        }
    }

    #[test]
    fn continuation_with_prompt() {
        let response = ResponseParser::parse(b"+ Ready for literal\r\n").unwrap();
        assert_eq!(
            response,
            Response::Continuation {
                text: Some("Ready for literal".into())
            }
        );
    }

    #[test]
    fn bare_continuation() {
        let response = ResponseParser::parse(b"+\r\n").unwrap();
        assert_eq!(response, Response::Continuation { text: None });
    }

    #[test]
    fn search_results() {
        let response = ResponseParser::parse(b"* SEARCH 2 3 5 8\r\n").unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Search(seqs)) => {
                let nums: Vec<u32> = seqs.iter().map(|s| s.get()).collect();
                assert_eq!(nums, vec![2, 3, 5, 8]);
            }
            other => panic!("expected SEARCH, got {other:?}"),
        }
    }

    #[test]
    fn list_entry() {
        let response =
            ResponseParser::parse(b"* LIST (\\HasNoChildren) \"/\" \"INBOX/Receipts\"\r\n")
                .unwrap();
        match response {
            Response::Untagged(UntaggedResponse::List(entry)) => {
                assert_eq!(entry.attributes, vec!["\\HasNoChildren".to_string()]);
                assert_eq!(entry.delimiter, Some('/'));
                assert_eq!(entry.mailbox, "INBOX/Receipts");
            }
            other => panic!("expected LIST, got {other:?}"),
        }
    }

    #[test]
    fn status_items() {
        let response =
            ResponseParser::parse(b"* STATUS blurdybloop (MESSAGES 231 UIDNEXT 44292)\r\n")
                .unwrap();
        match response {
            Response::Untagged(UntaggedResponse::Status { mailbox, items }) => {
                assert_eq!(mailbox, "blurdybloop");
                assert!(items.contains(&StatusItem::Messages(231)));
                assert!(items.contains(&StatusItem::UidNext(44292)));
            }
            other => panic!("expected STATUS, got {other:?}"),
        }
    }
}
