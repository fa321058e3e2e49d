//! Error types for the IMAP client engine.

use std::time::Duration;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by connection establishment, the wire protocol, and the
/// session layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration or handshake failed.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// The configured host is not a valid DNS name for TLS.
    #[error("invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// A response could not be parsed. Scoped to the command that read it;
    /// the connection itself stays usable as long as framing is intact.
    #[error("parse error at byte {position}: {message}")]
    Parse {
        /// Byte offset into the response where parsing failed.
        position: usize,
        /// Description of what was expected.
        message: String,
    },

    /// Authentication was refused or no usable mechanism remained.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Tagged NO: the command was valid but the server refused it.
    #[error("server refused command: {0}")]
    No(String),

    /// Tagged BAD: the server rejected the command as malformed.
    #[error("server rejected command: {0}")]
    Bad(String),

    /// The server announced BYE and is closing the connection.
    #[error("connection closed by server: {0}")]
    Bye(String),

    /// The server broke the exchange contract (unexpected continuation,
    /// missing greeting, and similar).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An HTTP CONNECT tunnel request was refused. Carries the proxy's
    /// status line verbatim.
    #[error("proxy refused tunnel: {0}")]
    ProxyTunnel(String),

    /// A SOCKS5 handshake or connect request failed.
    #[error("SOCKS5 error: {0}")]
    Socks(String),

    /// The peer's certificate was rejected for the configured trust policy.
    #[error("server identity check failed: {0}")]
    Trust(String),

    /// An operation did not complete within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The operation is not valid in the connection's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A primary failure whose cleanup path also failed. The primary error
    /// drives classification; the secondary is preserved for diagnostics.
    #[error("{primary} (cleanup also failed: {secondary})")]
    WithCleanup {
        /// The error that triggered cleanup.
        primary: Box<Error>,
        /// The error raised by the cleanup itself.
        secondary: Box<Error>,
    },
}

impl Error {
    /// Attaches a cleanup failure to this error, keeping `self` as the
    /// primary cause.
    #[must_use]
    pub fn with_cleanup(self, secondary: Error) -> Self {
        Self::WithCleanup {
            primary: Box::new(self),
            secondary: Box::new(secondary),
        }
    }

    /// Whether the connection that produced this error is unusable and must
    /// be discarded rather than returned to a pool.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io(_)
            | Self::Tls(_)
            | Self::InvalidDnsName(_)
            | Self::Bye(_)
            | Self::ProxyTunnel(_)
            | Self::Socks(_)
            | Self::Trust(_)
            | Self::Timeout(_) => true,
            Self::WithCleanup { primary, .. } => primary.is_fatal(),
            Self::Parse { .. }
            | Self::Auth(_)
            | Self::No(_)
            | Self::Bad(_)
            | Self::Protocol(_)
            | Self::InvalidState(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn tagged_failures_are_not_fatal() {
        assert!(!Error::No("mailbox busy".into()).is_fatal());
        assert!(!Error::Bad("unknown command".into()).is_fatal());
        assert!(
            !Error::Parse {
                position: 3,
                message: "expected atom".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn transport_failures_are_fatal() {
        assert!(Error::Bye("shutting down".into()).is_fatal());
        assert!(Error::Timeout(Duration::from_secs(5)).is_fatal());
        assert!(
            Error::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "x")).is_fatal()
        );
    }

    #[test]
    fn cleanup_wrapper_reports_both_causes() {
        let err = Error::Bye("going down".into())
            .with_cleanup(Error::Io(std::io::Error::other("close failed")));
        let text = err.to_string();
        assert!(text.contains("going down"));
        assert!(text.contains("close failed"));
        assert!(err.is_fatal());
    }
}
