//! FETCH attribute parsing.

use crate::parser::lexer::{Lexer, Token};
use crate::types::Uid;
use crate::{Error, Result};

use super::helpers::{parse_data, parse_flag_list};
use super::types::FetchItem;

/// Parses the parenthesized attribute/value list of a FETCH response.
pub fn parse_fetch_response(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();
    loop {
        lexer.skip_spaces();
        match lexer.peek() {
            Some(b')') => {
                lexer.expect(Token::RParen)?;
                break;
            }
            None => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: "unterminated FETCH item list".to_string(),
                });
            }
            Some(_) => {}
        }

        let name = lexer.read_atom_string()?.to_string();
        let upper = name.to_uppercase();

        let item = match upper.as_str() {
            "FLAGS" => {
                lexer.expect_space()?;
                FetchItem::Flags(parse_flag_list(lexer)?)
            }
            "UID" => {
                lexer.expect_space()?;
                let n = lexer.read_number_u32()?;
                let uid = Uid::new(n).ok_or_else(|| Error::Parse {
                    position: lexer.position(),
                    message: "UID of 0".to_string(),
                })?;
                FetchItem::Uid(uid)
            }
            "RFC822.SIZE" => {
                lexer.expect_space()?;
                FetchItem::Rfc822Size(lexer.read_number()?)
            }
            "INTERNALDATE" => {
                lexer.expect_space()?;
                match lexer.next_token()? {
                    Token::QuotedString(s) => FetchItem::InternalDate(s),
                    token => {
                        return Err(Error::Parse {
                            position: lexer.position(),
                            message: format!("expected INTERNALDATE string, got {token:?}"),
                        });
                    }
                }
            }
            _ if lexer.peek() == Some(b'[') => parse_body_section(lexer)?,
            _ => {
                lexer.expect_space()?;
                FetchItem::Other {
                    name,
                    value: parse_data(lexer)?,
                }
            }
        };
        items.push(item);
    }

    Ok(items)
}

/// Parses `[section]<origin>` plus its nstring content. The section text
/// is kept verbatim since it can itself contain lists and strings.
fn parse_body_section(lexer: &mut Lexer<'_>) -> Result<FetchItem> {
    let _ = lexer.next_raw_byte(); // [

    let mut section = String::new();
    loop {
        match lexer.next_raw_byte() {
            Some(b']') => break,
            Some(b) => section.push(b as char),
            None => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: "unterminated body section".to_string(),
                });
            }
        }
    }

    let origin = if lexer.peek() == Some(b'<') {
        let _ = lexer.next_raw_byte();
        let mut digits = String::new();
        loop {
            match lexer.next_raw_byte() {
                Some(b'>') => break,
                Some(b @ b'0'..=b'9') => digits.push(b as char),
                _ => {
                    return Err(Error::Parse {
                        position: lexer.position(),
                        message: "malformed partial-fetch origin".to_string(),
                    });
                }
            }
        }
        Some(digits.parse::<u64>().map_err(|_| Error::Parse {
            position: lexer.position(),
            message: "partial-fetch origin out of range".to_string(),
        })?)
    } else {
        None
    };

    lexer.expect_space()?;
    let data = lexer.read_nstring()?;

    Ok(FetchItem::Body {
        section,
        origin,
        data,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Flag;

    fn parse(input: &[u8]) -> Vec<FetchItem> {
        let mut lexer = Lexer::new(input);
        parse_fetch_response(&mut lexer).unwrap()
    }

    #[test]
    fn flags_and_uid() {
        let items = parse(b"(FLAGS (\\Seen) UID 4827313)");
        assert!(matches!(&items[0], FetchItem::Flags(f) if f.contains(&Flag::Seen)));
        assert!(matches!(&items[1], FetchItem::Uid(u) if u.get() == 4_827_313));
    }

    #[test]
    fn body_section_with_literal() {
        let items = parse(b"(BODY[HEADER.FIELDS (SUBJECT)] {15}\r\nSubject: hi\r\n\r\n)");
        match &items[0] {
            FetchItem::Body {
                section,
                origin,
                data,
            } => {
                assert_eq!(section, "HEADER.FIELDS (SUBJECT)");
                assert!(origin.is_none());
                assert_eq!(data.as_deref(), Some(&b"Subject: hi\r\n\r\n"[..]));
            }
            other => panic!("expected body item, got {other:?}"),
        }
    }

    #[test]
    fn partial_fetch_origin() {
        let items = parse(b"(BODY[TEXT]<128> \"abc\")");
        match &items[0] {
            FetchItem::Body {
                section,
                origin,
                data,
            } => {
                assert_eq!(section, "TEXT");
                assert_eq!(*origin, Some(128));
                assert_eq!(data.as_deref(), Some(&b"abc"[..]));
            }
            other => panic!("expected body item, got {other:?}"),
        }
    }

    #[test]
    fn nil_body_is_kept_as_none() {
        let items = parse(b"(BODY[1] NIL)");
        assert!(matches!(&items[0], FetchItem::Body { data: None, .. }));
    }

    #[test]
    fn unmodeled_attribute_falls_back_to_generic_data() {
        let items = parse(b"(X-GM-MSGID 1278455344230334865)");
        assert!(
            matches!(&items[0], FetchItem::Other { name, .. } if name == "X-GM-MSGID")
        );
    }
}
