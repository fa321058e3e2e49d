//! LOGIN mechanism (draft-murchison-sasl-login).
//!
//! Two rounds: the server prompts for the username, then the password. The
//! prompts are nominally `User Name` / `Password` but servers vary, so we
//! match loosely and fall back on round order.

use crate::{require, CredentialRequest, Credentials, Mechanism, Result};

/// LOGIN mechanism state.
#[derive(Debug, Default)]
pub struct Login {
    rounds: u8,
}

impl Login {
    /// Creates a new LOGIN mechanism instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Mechanism for Login {
    fn name(&self) -> &'static str {
        "LOGIN"
    }

    fn requires_tls(&self) -> bool {
        true
    }

    fn initial_response(&mut self, _creds: &dyn Credentials) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn respond(&mut self, challenge: &[u8], creds: &dyn Credentials) -> Result<Vec<u8>> {
        let prompt = String::from_utf8_lossy(challenge).to_lowercase();
        self.rounds = self.rounds.saturating_add(1);

        let request = if prompt.contains("password") {
            CredentialRequest::Password
        } else if prompt.contains("user") || self.rounds == 1 {
            CredentialRequest::Name
        } else {
            CredentialRequest::Password
        };

        Ok(require(creds, request)?.into_bytes())
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
    fn test_prompt_order() {
        let creds = StaticCredentials::new("joe", "secret");
        let mut mech = Login::new();
        assert!(mech.initial_response(&creds).unwrap().is_none());
        assert_eq!(mech.respond(b"User Name\0", &creds).unwrap(), b"joe");
        assert_eq!(mech.respond(b"Password\0", &creds).unwrap(), b"secret");
    }

    #[test]
    fn test_unlabelled_prompts_fall_back_on_order() {
        let creds = StaticCredentials::new("joe", "secret");
        let mut mech = Login::new();
        assert_eq!(mech.respond(b"", &creds).unwrap(), b"joe");
        assert_eq!(mech.respond(b"", &creds).unwrap(), b"secret");
    }
}
