//! XOAUTH2 mechanism (Google/Microsoft proprietary bearer-token scheme).
//!
//! The initial response is `user=<name>^Aauth=Bearer <token>^A^A`. On
//! failure the server sends a base64 JSON error blob as a challenge; the
//! client must answer with an empty response so the server can finish the
//! exchange with a tagged NO.

use crate::{require, CredentialRequest, Credentials, Mechanism, Result};

/// XOAUTH2 mechanism state.
#[derive(Debug, Default)]
pub struct XOAuth2 {
    _private: (),
}

impl XOAuth2 {
    /// Creates a new XOAUTH2 mechanism instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Mechanism for XOAuth2 {
    fn name(&self) -> &'static str {
        "XOAUTH2"
    }

    fn requires_tls(&self) -> bool {
        true
    }

    fn initial_response(&mut self, creds: &dyn Credentials) -> Result<Option<Vec<u8>>> {
        // Password carries the OAuth2 access token for this mechanism.
        let name = require(creds, CredentialRequest::Name)?;
        let token = require(creds, CredentialRequest::Password)?;

        let mut out = Vec::with_capacity(name.len() + token.len() + 20);
        out.extend_from_slice(b"user=");
        out.extend_from_slice(name.as_bytes());
        out.push(0x01);
        out.extend_from_slice(b"auth=Bearer ");
        out.extend_from_slice(token.as_bytes());
        out.push(0x01);
        out.push(0x01);
        Ok(Some(out))
    }

    fn respond(&mut self, _challenge: &[u8], _creds: &dyn Credentials) -> Result<Vec<u8>> {
        // Error challenge; empty reply lets the server conclude the exchange.
        Ok(Vec::new())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::StaticCredentials;

    #[test]
    fn test_initial_response_shape() {
        let creds = StaticCredentials::new("someuser@example.com", "ya29.token");
        let mut mech = XOAuth2::new();
        let out = mech.initial_response(&creds).unwrap().unwrap();
        assert_eq!(
            out,
            b"user=someuser@example.com\x01auth=Bearer ya29.token\x01\x01".to_vec()
        );
    }

    #[test]
    fn test_error_challenge_gets_empty_reply() {
        let creds = StaticCredentials::new("u", "t");
        let mut mech = XOAuth2::new();
        let out = mech.respond(b"{\"status\":\"401\"}", &creds).unwrap();
        assert!(out.is_empty());
    }
}
