//! # ravenmail-sasl
//!
//! SASL client mechanisms for mail protocols: PLAIN (RFC 4616), LOGIN,
//! CRAM-MD5 (RFC 2195), and XOAUTH2 (Google/Microsoft proprietary).
//!
//! Mechanisms work on raw bytes; the protocol layer is responsible for the
//! base64 transport encoding that IMAP/SMTP/POP3 apply to each round.
//!
//! Credentials are pulled through the [`Credentials`] trait: when a mechanism
//! needs a value it asks for a [`CredentialRequest`], and the provider either
//! supplies it or the exchange fails with [`Error::MissingCredential`]. This
//! keeps secrets out of mechanism state until the moment they are encoded.
//!
//! ```
//! use ravenmail_sasl::{for_name, StaticCredentials};
//!
//! let creds = StaticCredentials::new("tim", "tanstaaftanstaaf");
//! let mut mech = for_name("PLAIN").unwrap();
//! let first = mech.initial_response(&creds).unwrap().unwrap();
//! assert_eq!(first, b"\0tim\0tanstaaftanstaaf");
//! ```

mod cram_md5;
mod login;
mod mechanism;
mod plain;
mod xoauth2;

pub use cram_md5::CramMd5;
pub use login::Login;
pub use mechanism::{for_name, is_supported, resolve, Mechanism, SUPPORTED_MECHANISMS};
pub use plain::Plain;
pub use xoauth2::XOAuth2;

use thiserror::Error;

/// Errors produced by a SASL exchange.
#[derive(Debug, Error)]
pub enum Error {
    /// The credential provider could not supply a requested value.
    #[error("missing credential: {0:?}")]
    MissingCredential(CredentialRequest),

    /// The server challenge was not in the form the mechanism expects.
    #[error("invalid challenge: {0}")]
    InvalidChallenge(String),

    /// The mechanism name is not in the supported set.
    #[error("unsupported mechanism: {0}")]
    Unsupported(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// The kinds of values a mechanism may request from a credential provider.
///
/// A closed set handled by exhaustive matching; providers that cannot supply
/// a kind return `None` and the exchange fails cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialRequest {
    /// Authentication identity (username or email address).
    Name,
    /// Password, or the access token for bearer-style mechanisms.
    Password,
    /// Authorization identity, when acting on behalf of another user.
    AuthzId,
    /// Authentication realm. No built-in mechanism requests this today,
    /// but providers may carry one from configuration.
    Realm,
}

/// Source of credential values for a SASL exchange.
pub trait Credentials {
    /// Resolves one credential kind, or `None` if unavailable.
    fn resolve(&self, request: CredentialRequest) -> Option<String>;
}

/// Fixed name/password credentials, with optional authorization id and realm.
#[derive(Clone)]
pub struct StaticCredentials {
    name: String,
    password: String,
    authzid: Option<String>,
    realm: Option<String>,
}

impl StaticCredentials {
    /// Creates a provider for the given name and password (or access token).
    #[must_use]
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            password: password.into(),
            authzid: None,
            realm: None,
        }
    }

    /// Sets the authorization identity.
    #[must_use]
    pub fn authzid(mut self, authzid: impl Into<String>) -> Self {
        self.authzid = Some(authzid.into());
        self
    }

    /// Sets the realm.
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }
}

impl Credentials for StaticCredentials {
    fn resolve(&self, request: CredentialRequest) -> Option<String> {
        match request {
            CredentialRequest::Name => Some(self.name.clone()),
            CredentialRequest::Password => Some(self.password.clone()),
            CredentialRequest::AuthzId => self.authzid.clone(),
            CredentialRequest::Realm => self.realm.clone(),
        }
    }
}

impl std::fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("name", &self.name)
            .field("password", &"<redacted>")
            .field("authzid", &self.authzid)
            .finish_non_exhaustive()
    }
}

pub(crate) fn require(
    creds: &dyn Credentials,
    request: CredentialRequest,
) -> Result<String> {
    creds
        .resolve(request)
        .ok_or(Error::MissingCredential(request))
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

    #[test]
    fn test_static_credentials() {
        let creds = StaticCredentials::new("user", "pass").authzid("admin");
        assert_eq!(
            creds.resolve(CredentialRequest::Name),
            Some("user".to_string())
        );
        assert_eq!(
            creds.resolve(CredentialRequest::Password),
            Some("pass".to_string())
        );
        assert_eq!(
            creds.resolve(CredentialRequest::AuthzId),
            Some("admin".to_string())
        );
        assert_eq!(creds.resolve(CredentialRequest::Realm), None);
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds = StaticCredentials::new("user", "hunter2");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_require_missing() {
        let creds = StaticCredentials::new("user", "pass");
        let err = require(&creds, CredentialRequest::Realm).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingCredential(CredentialRequest::Realm)
        ));
    }
}
