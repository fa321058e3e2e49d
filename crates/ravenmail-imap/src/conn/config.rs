//! Connection configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// TLS security mode for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// Plaintext only.
    None,
    /// Connect plaintext, then upgrade via STARTTLS.
    #[default]
    StartTls,
    /// TLS from the first byte (port 993 by default).
    Implicit,
}

/// TLS protocol versions the client will offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    /// TLS 1.2.
    Tls12,
    /// TLS 1.3.
    Tls13,
}

/// An upstream proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy host.
    pub host: String,
    /// Proxy port.
    pub port: u16,
    /// Username for proxy authentication.
    pub username: Option<String>,
    /// Password for proxy authentication.
    pub password: Option<String>,
}

/// Connection, transport, and session settings.
///
/// Built with [`Config::builder`]. The HTTP CONNECT proxy takes precedence
/// over SOCKS5 when both are set.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host name.
    pub host: String,
    /// Server port; defaults to 993 for implicit TLS, 143 otherwise.
    pub port: u16,
    /// TLS mode.
    pub security: Security,
    /// Whether to require STARTTLS to succeed (fail instead of continuing
    /// plaintext when the server refuses the upgrade).
    pub require_starttls: bool,
    /// Retry without TLS when the implicit TLS handshake fails.
    pub fallback_to_plain: bool,
    /// Deadline for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Deadline for each response read.
    pub read_timeout: Duration,
    /// Deadline for each command write, if bounded.
    pub write_timeout: Option<Duration>,
    /// Local address to bind before connecting, for multihomed hosts.
    pub local_bind: Option<SocketAddr>,
    /// HTTP CONNECT proxy.
    pub http_proxy: Option<ProxyConfig>,
    /// SOCKS5 proxy.
    pub socks_proxy: Option<ProxyConfig>,
    /// TLS versions to offer, in preference order.
    pub tls_versions: Vec<TlsVersion>,
    /// Hosts whose certificates are accepted without verification.
    /// `"*"` trusts every host.
    pub trusted_hosts: Vec<String>,
    /// Named hostname-verifier to apply after certificate validation.
    pub hostname_verifier: Option<String>,
    /// Upper bound on pooled connections.
    pub pool_size: usize,
    /// How long an acquire waits for a free connection before failing.
    pub acquire_timeout: Duration,
    /// SASL mechanisms to try, in preference order.
    pub mechanisms: Vec<String>,
    /// Mechanisms to skip even if advertised.
    pub disabled_mechanisms: Vec<String>,
    /// Authorization identity for mechanisms that carry one.
    pub authzid: Option<String>,
    /// Account name.
    pub username: Option<String>,
    /// Password or OAuth token, depending on mechanism.
    pub password: Option<String>,
}

impl Config {
    /// Starts building a configuration for the given host.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }

    /// Whether certificate verification is disabled for this host.
    #[must_use]
    pub fn trusts(&self, host: &str) -> bool {
        self.trusted_hosts
            .iter()
            .any(|t| t == "*" || t.eq_ignore_ascii_case(host))
    }

    /// Mechanism preference order with disabled entries removed.
    #[must_use]
    pub fn enabled_mechanisms(&self) -> Vec<&str> {
        self.mechanisms
            .iter()
            .map(String::as_str)
            .filter(|m| {
                !self
                    .disabled_mechanisms
                    .iter()
                    .any(|d| d.eq_ignore_ascii_case(m))
            })
            .collect()
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
    port: Option<u16>,
}

impl ConfigBuilder {
    fn new(host: impl Into<String>) -> Self {
        Self {
            config: Config {
                host: host.into(),
                port: 0,
                security: Security::default(),
                require_starttls: true,
                fallback_to_plain: false,
                connect_timeout: Duration::from_secs(30),
                read_timeout: Duration::from_secs(60),
                write_timeout: None,
                local_bind: None,
                http_proxy: None,
                socks_proxy: None,
                tls_versions: vec![TlsVersion::Tls13, TlsVersion::Tls12],
                trusted_hosts: Vec::new(),
                hostname_verifier: None,
                pool_size: 1,
                acquire_timeout: Duration::from_secs(45),
                mechanisms: ravenmail_sasl::SUPPORTED_MECHANISMS
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
                disabled_mechanisms: Vec::new(),
                authzid: None,
                username: None,
                password: None,
            },
            port: None,
        }
    }

    /// Overrides the port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the TLS mode.
    #[must_use]
    pub fn security(mut self, security: Security) -> Self {
        self.config.security = security;
        self
    }

    /// Allows the session to continue plaintext when STARTTLS is refused.
    #[must_use]
    pub fn allow_plaintext_fallback(mut self) -> Self {
        self.config.require_starttls = false;
        self
    }

    /// Retries without TLS when the implicit TLS handshake fails.
    #[must_use]
    pub fn fallback_to_plain(mut self) -> Self {
        self.config.fallback_to_plain = true;
        self
    }

    /// Sets the TCP connect deadline.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the per-read deadline.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Bounds each command write.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.config.write_timeout = Some(timeout);
        self
    }

    /// Binds the socket to a local address before connecting.
    #[must_use]
    pub fn local_bind(mut self, addr: SocketAddr) -> Self {
        self.config.local_bind = Some(addr);
        self
    }

    /// Routes the connection through an HTTP CONNECT proxy.
    #[must_use]
    pub fn http_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.http_proxy = Some(proxy);
        self
    }

    /// Routes the connection through a SOCKS5 proxy.
    #[must_use]
    pub fn socks_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.config.socks_proxy = Some(proxy);
        self
    }

    /// Restricts the offered TLS versions.
    #[must_use]
    pub fn tls_versions(mut self, versions: Vec<TlsVersion>) -> Self {
        self.config.tls_versions = versions;
        self
    }

    /// Disables certificate verification for a host (`"*"` for all).
    #[must_use]
    pub fn trust_host(mut self, host: impl Into<String>) -> Self {
        self.config.trusted_hosts.push(host.into());
        self
    }

    /// Applies a named hostname verifier after certificate validation.
    #[must_use]
    pub fn hostname_verifier(mut self, alias: impl Into<String>) -> Self {
        self.config.hostname_verifier = Some(alias.into());
        self
    }

    /// Sets the connection pool bound.
    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config.pool_size = size.max(1);
        self
    }

    /// Sets how long an acquire waits before timing out.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.acquire_timeout = timeout;
        self
    }

    /// Replaces the SASL mechanism preference order.
    #[must_use]
    pub fn mechanisms(mut self, mechanisms: Vec<String>) -> Self {
        self.config.mechanisms = mechanisms;
        self
    }

    /// Skips a mechanism even when the server advertises it.
    #[must_use]
    pub fn disable_mechanism(mut self, mechanism: impl Into<String>) -> Self {
        self.config.disabled_mechanisms.push(mechanism.into());
        self
    }

    /// Sets the authorization identity.
    #[must_use]
    pub fn authzid(mut self, authzid: impl Into<String>) -> Self {
        self.config.authzid = Some(authzid.into());
        self
    }

    /// Sets the account name and secret.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.username = Some(username.into());
        self.config.password = Some(password.into());
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(mut self) -> Config {
        self.config.port = self.port.unwrap_or(match self.config.security {
            Security::Implicit => 993,
            Security::None | Security::StartTls => 143,
        });
        self.config
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_ports_follow_security() {
        let implicit = Config::builder("imap.example.com")
            .security(Security::Implicit)
            .build();
        assert_eq!(implicit.port, 993);

        let starttls = Config::builder("imap.example.com").build();
        assert_eq!(starttls.port, 143);

        let custom = Config::builder("imap.example.com").port(1143).build();
        assert_eq!(custom.port, 1143);
    }

    #[test]
    fn trusted_hosts_match_wildcard_and_exact() {
        let config = Config::builder("a").trust_host("IMAP.example.com").build();
        assert!(config.trusts("imap.example.com"));
        assert!(!config.trusts("other.example.com"));

        let all = Config::builder("a").trust_host("*").build();
        assert!(all.trusts("anything"));
    }

    #[test]
    fn disabled_mechanisms_are_filtered() {
        let config = Config::builder("a")
            .mechanisms(vec!["PLAIN".into(), "LOGIN".into(), "CRAM-MD5".into()])
            .disable_mechanism("login")
            .build();
        assert_eq!(config.enabled_mechanisms(), vec!["PLAIN", "CRAM-MD5"]);
    }

    #[test]
    fn pool_size_has_floor_of_one() {
        let config = Config::builder("a").pool_size(0).build();
        assert_eq!(config.pool_size, 1);
    }
}
