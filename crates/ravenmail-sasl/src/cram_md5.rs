//! CRAM-MD5 mechanism (RFC 2195).

use hmac::{Hmac, Mac};
use md5::Md5;

use crate::{require, CredentialRequest, Credentials, Error, Mechanism, Result};

type HmacMd5 = Hmac<Md5>;

/// CRAM-MD5: one challenge round; the response is
/// `name SP lowercase-hex(hmac-md5(password, challenge))`.
#[derive(Debug, Default)]
pub struct CramMd5 {
    _private: (),
}

impl CramMd5 {
    /// Creates a new CRAM-MD5 mechanism instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Mechanism for CramMd5 {
    fn name(&self) -> &'static str {
        "CRAM-MD5"
    }

    fn initial_response(&mut self, _creds: &dyn Credentials) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn respond(&mut self, challenge: &[u8], creds: &dyn Credentials) -> Result<Vec<u8>> {
        if challenge.is_empty() {
            return Err(Error::InvalidChallenge(
                "empty CRAM-MD5 challenge".to_string(),
            ));
        }

        let name = require(creds, CredentialRequest::Name)?;
        let password = require(creds, CredentialRequest::Password)?;

        let mut mac = HmacMd5::new_from_slice(password.as_bytes())
            .map_err(|_| Error::InvalidChallenge("invalid HMAC key".to_string()))?;
        mac.update(challenge);
        let digest = mac.finalize().into_bytes();

        let mut out = String::with_capacity(name.len() + 1 + digest.len() * 2);
        out.push_str(&name);
        out.push(' ');
        for byte in digest {
            out.push_str(&format!("{byte:02x}"));
        }
        Ok(out.into_bytes())
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
    fn test_rfc2195_vector() {
        // RFC 2195 section 2: tim / tanstaaftanstaaf against the example
        // challenge digests to b913a602c7eda7a495b4e6e7334d3890.
        let creds = StaticCredentials::new("tim", "tanstaaftanstaaf");
        let mut mech = CramMd5::new();
        let challenge = b"<1896.697170952@postoffice.reston.mci.net>";
        let out = mech.respond(challenge, &creds).unwrap();
        assert_eq!(
            out,
            b"tim b913a602c7eda7a495b4e6e7334d3890".to_vec()
        );
    }

    #[test]
    fn test_empty_challenge_rejected() {
        let creds = StaticCredentials::new("tim", "pw");
        let mut mech = CramMd5::new();
        assert!(mech.respond(b"", &creds).is_err());
    }

    #[test]
    fn test_no_initial_response() {
        let creds = StaticCredentials::new("tim", "pw");
        let mut mech = CramMd5::new();
        assert!(mech.initial_response(&creds).unwrap().is_none());
    }
}
