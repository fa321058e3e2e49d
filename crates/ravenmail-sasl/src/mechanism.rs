//! Mechanism trait and the closed mechanism registry.

use crate::cram_md5::CramMd5;
use crate::login::Login;
use crate::plain::Plain;
use crate::xoauth2::XOAuth2;
use crate::{Credentials, Error, Result};

/// A SASL client mechanism.
///
/// A mechanism is driven by the protocol layer: an optional initial response
/// goes out with the AUTHENTICATE command (or in reply to the first empty
/// challenge), and each subsequent server challenge is answered through
/// [`respond`](Mechanism::respond). Mechanisms are single-use; create a fresh
/// instance per authentication attempt.
pub trait Mechanism: Send {
    /// Canonical mechanism name as advertised in capability lists.
    fn name(&self) -> &'static str;

    /// True if the mechanism sends credentials in a recoverable form and
    /// should only be used over an encrypted transport.
    fn requires_tls(&self) -> bool {
        false
    }

    /// The client-first response, if the mechanism has one.
    ///
    /// # Errors
    ///
    /// Returns an error if a required credential is unavailable.
    fn initial_response(&mut self, creds: &dyn Credentials) -> Result<Option<Vec<u8>>>;

    /// Responds to a decoded server challenge.
    ///
    /// An empty return value is valid and means "empty response line".
    ///
    /// # Errors
    ///
    /// Returns an error if the challenge is malformed or a required
    /// credential is unavailable.
    fn respond(&mut self, challenge: &[u8], creds: &dyn Credentials) -> Result<Vec<u8>>;
}

impl std::fmt::Debug for dyn Mechanism + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mechanism")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

/// Mechanism names this crate implements, in default preference order.
pub const SUPPORTED_MECHANISMS: &[&str] = &["XOAUTH2", "CRAM-MD5", "PLAIN", "LOGIN"];

/// Returns true if `name` names a supported mechanism.
#[must_use]
pub fn is_supported(name: &str) -> bool {
    SUPPORTED_MECHANISMS
        .iter()
        .any(|m| m.eq_ignore_ascii_case(name))
}

/// Constructs a mechanism by name.
///
/// The name set is closed; unknown names return `None`. Callers resolving a
/// configuration string should surface [`Error::Unsupported`] via
/// [`resolve`].
#[must_use]
pub fn for_name(name: &str) -> Option<Box<dyn Mechanism>> {
    let upper = name.to_ascii_uppercase();
    match upper.as_str() {
        "PLAIN" => Some(Box::new(Plain::new())),
        "LOGIN" => Some(Box::new(Login::new())),
        "CRAM-MD5" => Some(Box::new(CramMd5::new())),
        "XOAUTH2" => Some(Box::new(XOAuth2::new())),
        _ => None,
    }
}

/// Constructs a mechanism by name, failing with a typed error for unknown
/// names.
///
/// # Errors
///
/// Returns [`Error::Unsupported`] if the name is not in the supported set.
pub fn resolve(name: &str) -> Result<Box<dyn Mechanism>> {
    for_name(name).ok_or_else(|| Error::Unsupported(name.to_string()))
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
    fn test_for_name_case_insensitive() {
        assert!(for_name("plain").is_some());
        assert!(for_name("Cram-Md5").is_some());
        assert!(for_name("XOAUTH2").is_some());
        assert!(for_name("GSSAPI").is_none());
    }

    #[test]
    fn test_resolve_unsupported() {
        let err = resolve("NTLM").unwrap_err();
        assert!(matches!(err, Error::Unsupported(name) if name == "NTLM"));
    }

    #[test]
    fn test_supported_names_round_trip() {
        for name in SUPPORTED_MECHANISMS {
            let mech = for_name(name).unwrap();
            assert_eq!(mech.name(), *name);
            assert!(is_supported(name));
        }
    }
}
