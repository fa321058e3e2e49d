//! PLAIN mechanism (RFC 4616).

use crate::{require, CredentialRequest, Credentials, Error, Mechanism, Result};

/// PLAIN sends `authzid NUL authcid NUL password` as the initial response.
#[derive(Debug, Default)]
pub struct Plain {
    _private: (),
}

impl Plain {
    /// Creates a new PLAIN mechanism instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Mechanism for Plain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn requires_tls(&self) -> bool {
        true
    }

    fn initial_response(&mut self, creds: &dyn Credentials) -> Result<Option<Vec<u8>>> {
        let authzid = creds
            .resolve(CredentialRequest::AuthzId)
            .unwrap_or_default();
        let name = require(creds, CredentialRequest::Name)?;
        let password = require(creds, CredentialRequest::Password)?;

        // RFC 4616: NUL is forbidden inside any of the three fields.
        if authzid.contains('\0') || name.contains('\0') || password.contains('\0') {
            return Err(Error::InvalidChallenge(
                "NUL byte in PLAIN credential".to_string(),
            ));
        }

        let mut out = Vec::with_capacity(authzid.len() + name.len() + password.len() + 2);
        out.extend_from_slice(authzid.as_bytes());
        out.push(0);
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        out.extend_from_slice(password.as_bytes());
        Ok(Some(out))
    }

    fn respond(&mut self, _challenge: &[u8], creds: &dyn Credentials) -> Result<Vec<u8>> {
        // Some servers withhold the initial-response option and issue one
        // empty challenge instead; answer it with the same payload.
        Ok(self.initial_response(creds)?.unwrap_or_default())
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
    fn test_rfc4616_example() {
        // RFC 4616 section 4: "tim" / "tanstaaftanstaaf".
        let creds = StaticCredentials::new("tim", "tanstaaftanstaaf");
        let mut mech = Plain::new();
        let out = mech.initial_response(&creds).unwrap().unwrap();
        assert_eq!(out, b"\0tim\0tanstaaftanstaaf");
    }

    #[test]
    fn test_with_authzid() {
        let creds = StaticCredentials::new("kurt", "maennchen").authzid("ursel");
        let mut mech = Plain::new();
        let out = mech.initial_response(&creds).unwrap().unwrap();
        assert_eq!(out, b"ursel\0kurt\0maennchen");
    }

    #[test]
    fn test_nul_rejected() {
        let creds = StaticCredentials::new("a\0b", "pass");
        let mut mech = Plain::new();
        assert!(mech.initial_response(&creds).is_err());
    }

    #[test]
    fn test_empty_challenge_replays_initial() {
        let creds = StaticCredentials::new("tim", "tanstaaftanstaaf");
        let mut mech = Plain::new();
        let out = mech.respond(b"", &creds).unwrap();
        assert_eq!(out, b"\0tim\0tanstaaftanstaaf");
    }
}
