//! Shared parsing helpers.

use crate::parser::lexer::{Lexer, Token};
use crate::types::{
    Capability, Flag, Flags, ListEntry, ResponseCode, SeqNum, Uid, UidValidity,
};
use crate::{Error, Result};

use super::types::{Data, StatusItem};

/// Parses a bracketed `[CODE ...]` annotation.
pub fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    lexer.expect(Token::LBracket)?;

    let atom = lexer.read_atom_string()?;
    let upper = atom.to_uppercase();

    let code = match upper.as_str() {
        "ALERT" => ResponseCode::Alert,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.read_number_u32()?;
            let uid = Uid::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "UIDNEXT of 0".to_string(),
            })?;
            ResponseCode::UidNext(uid)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            let n = lexer.read_number_u32()?;
            let validity = UidValidity::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "UIDVALIDITY of 0".to_string(),
            })?;
            ResponseCode::UidValidity(validity)
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            let n = lexer.read_number_u32()?;
            let seq = SeqNum::new(n).ok_or_else(|| Error::Parse {
                position: lexer.position(),
                message: "UNSEEN of 0".to_string(),
            })?;
            ResponseCode::Unseen(seq)
        }
        "CAPABILITY" => {
            let caps = parse_capability_data(lexer)?;
            ResponseCode::Capability(caps)
        }
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            let flags = parse_flag_list(lexer)?;
            ResponseCode::PermanentFlags(flags)
        }
        _ => {
            // Unknown code: keep the keyword plus its arguments verbatim.
            let mut raw = atom.to_string();
            while let Some(b) = lexer.peek() {
                if b == b']' {
                    break;
                }
                raw.push(b as char);
                let _ = lexer.next_raw_byte();
            }
            ResponseCode::Unknown(raw)
        }
    };

    // Tolerate trailing arguments on known codes.
    while lexer.peek() != Some(b']') && !lexer.is_eof() {
        let _ = lexer.next_raw_byte();
    }
    lexer.expect(Token::RBracket)?;

    Ok(code)
}

/// Parses the space-separated capability atoms following CAPABILITY.
pub fn parse_capability_data(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut caps = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.expect_space()?;
        if let Token::Atom(s) = lexer.next_token()? {
            caps.push(Capability::parse(s));
        }
    }

    Ok(caps)
}

/// Parses a parenthesized flag list.
pub fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect(Token::LParen)?;

    let mut flags = Flags::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => flags.insert(Flag::parse(s)),
            Token::Space => {}
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("unexpected token in flag list: {token:?}"),
                });
            }
        }
    }

    Ok(flags)
}

/// Parses one LIST line: attributes, delimiter, mailbox.
pub fn parse_list_response(lexer: &mut Lexer<'_>) -> Result<ListEntry> {
    lexer.expect(Token::LParen)?;
    let mut attributes = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Atom(s) => attributes.push(s.to_string()),
            Token::Space => {}
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("unexpected token in LIST attributes: {token:?}"),
                });
            }
        }
    }

    lexer.expect_space()?;

    let delimiter = match lexer.next_token()? {
        Token::Nil => None,
        Token::QuotedString(s) => s.chars().next(),
        token => {
            return Err(Error::Parse {
                position: lexer.position(),
                message: format!("expected hierarchy delimiter, got {token:?}"),
            });
        }
    };

    lexer.expect_space()?;
    let mailbox = lexer.read_astring()?;

    Ok(ListEntry {
        attributes,
        delimiter,
        mailbox,
    })
}

/// Parses the numbers following SEARCH.
pub fn parse_search_response(lexer: &mut Lexer<'_>) -> Result<Vec<SeqNum>> {
    let mut results = Vec::new();

    while lexer.peek() == Some(b' ') {
        lexer.expect_space()?;
        let n = lexer.read_number_u32()?;
        let seq = SeqNum::new(n).ok_or_else(|| Error::Parse {
            position: lexer.position(),
            message: "search result of 0".to_string(),
        })?;
        results.push(seq);
    }

    Ok(results)
}

/// Parses a STATUS line: mailbox then `(ATTR value ...)`.
pub fn parse_status_response(lexer: &mut Lexer<'_>) -> Result<(String, Vec<StatusItem>)> {
    let mailbox = lexer.read_astring()?;
    lexer.expect_space()?;
    lexer.expect(Token::LParen)?;

    let mut items = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(name) => {
                lexer.expect_space()?;
                let value = lexer.read_number()?;
                let item = match name.to_uppercase().as_str() {
                    "MESSAGES" => StatusItem::Messages(clamp_u32(value)),
                    "RECENT" => StatusItem::Recent(clamp_u32(value)),
                    "UIDNEXT" => StatusItem::UidNext(clamp_u32(value)),
                    "UIDVALIDITY" => StatusItem::UidValidity(clamp_u32(value)),
                    "UNSEEN" => StatusItem::Unseen(clamp_u32(value)),
                    _ => StatusItem::Other(name.to_string(), value),
                };
                items.push(item);
            }
            token => {
                return Err(Error::Parse {
                    position: lexer.position(),
                    message: format!("unexpected token in STATUS items: {token:?}"),
                });
            }
        }
    }

    Ok((mailbox, items))
}

fn clamp_u32(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Parses one generic data item: atom, number, string, literal, NIL, or a
/// parenthesized list of the same.
pub fn parse_data(lexer: &mut Lexer<'_>) -> Result<Data> {
    match lexer.next_token()? {
        Token::Atom(s) => Ok(Data::Atom(s.to_string())),
        Token::Number(n) => Ok(Data::Number(n)),
        Token::QuotedString(s) => Ok(Data::Quoted(s)),
        Token::Literal(data) => Ok(Data::Bytes(data.to_vec())),
        Token::Nil => Ok(Data::Nil),
        Token::LParen => {
            let mut items = Vec::new();
            loop {
                lexer.skip_spaces();
                if lexer.peek() == Some(b')') {
                    lexer.expect(Token::RParen)?;
                    break;
                }
                if lexer.is_eof() {
                    return Err(Error::Parse {
                        position: lexer.position(),
                        message: "unterminated list".to_string(),
                    });
                }
                items.push(parse_data(lexer)?);
            }
            Ok(Data::List(items))
        }
        token => Err(Error::Parse {
            position: lexer.position(),
            message: format!("unexpected token in data: {token:?}"),
        }),
    }
}

/// Parses the rest of a line as a flat sequence of data items.
pub fn parse_data_items(lexer: &mut Lexer<'_>) -> Result<Vec<Data>> {
    let mut items = Vec::new();
    loop {
        lexer.skip_spaces();
        if lexer.is_eof() {
            break;
        }
        if lexer.peek() == Some(b'\r') {
            lexer.expect_crlf()?;
            break;
        }
        items.push(parse_data(lexer)?);
    }
    Ok(items)
}
