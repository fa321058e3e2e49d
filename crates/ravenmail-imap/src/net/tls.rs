//! TLS policy: connector construction, trust overrides, and hostname
//! verification.

#![allow(clippy::missing_errors_doc)]

use std::sync::Arc;

use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;
use tracing::warn;

use crate::conn::config::{Config, TlsVersion};
use crate::{Error, Result};

/// Builds the connector for a configuration.
///
/// Hosts listed in `trusted_hosts` get a verifier that skips chain
/// validation; a configured hostname-verifier alias still checks the
/// presented certificate's DNS names on that relaxed path. Setting an
/// alias without trusting the host is a configuration error: the webpki
/// path performs its own name validation and would silently override the
/// alias.
pub fn connector(config: &Config) -> Result<TlsConnector> {
    let versions: Vec<&'static rustls::SupportedProtocolVersion> = config
        .tls_versions
        .iter()
        .map(|v| match v {
            TlsVersion::Tls12 => &rustls::version::TLS12,
            TlsVersion::Tls13 => &rustls::version::TLS13,
        })
        .collect();

    let builder = rustls::ClientConfig::builder_with_protocol_versions(&versions);

    // An unknown alias is a configuration error, not a check to skip.
    let hostname_verifier = match config.hostname_verifier.as_deref() {
        Some(alias) => Some(verifier_for(alias).ok_or_else(|| {
            Error::Trust(format!("unknown hostname verifier alias: {alias}"))
        })?),
        None => None,
    };

    let client_config = if config.trusts(&config.host) {
        warn!(host = %config.host, "certificate verification disabled for trusted host");
        let verifier = TrustedHostVerifier {
            expected_host: config.host.clone(),
            hostname_verifier,
        };
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth()
    } else {
        if hostname_verifier.is_some() {
            return Err(Error::Trust(
                "hostname verifier alias requires the target host to be trusted".to_string(),
            ));
        }
        let roots = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(client_config)))
}

/// Hostname check applied to certificate names, selected by alias.
pub trait HostnameVerifier: Send + Sync + std::fmt::Debug {
    /// Whether the certificate name `presented` satisfies the expectation
    /// for `expected_host`.
    fn verify(&self, expected_host: &str, presented: &str) -> bool;
}

/// Case-insensitive exact match.
#[derive(Debug)]
pub struct StrictVerifier;

impl HostnameVerifier for StrictVerifier {
    fn verify(&self, expected_host: &str, presented: &str) -> bool {
        expected_host.eq_ignore_ascii_case(presented)
    }
}

/// Single-label wildcard match in the leftmost position, as older mail
/// deployments expect.
#[derive(Debug)]
pub struct LegacyWildcardVerifier;

impl HostnameVerifier for LegacyWildcardVerifier {
    fn verify(&self, expected_host: &str, presented: &str) -> bool {
        wildcard_matches(presented, expected_host)
    }
}

/// Resolves a verifier alias. The set is closed; unknown aliases resolve
/// to `None` and establishment fails rather than silently skipping the
/// check.
#[must_use]
pub fn verifier_for(alias: &str) -> Option<Arc<dyn HostnameVerifier>> {
    match alias {
        "strict" => Some(Arc::new(StrictVerifier)),
        "legacy" => Some(Arc::new(LegacyWildcardVerifier)),
        _ => None,
    }
}

/// Matches `host` against a certificate name that may carry a single
/// leftmost wildcard label.
///
/// `*.example.com` matches `foo.example.com` but neither `example.com`
/// (too few labels) nor `evil.foo.example.com` (the wildcard spans one
/// label only). Comparison is case-insensitive.
#[must_use]
pub fn wildcard_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.to_ascii_lowercase();
    let host = host.to_ascii_lowercase();

    if let Some(tail) = pattern.strip_prefix("*.") {
        match host.split_once('.') {
            Some((label, host_tail)) => !label.is_empty() && host_tail == tail,
            None => false,
        }
    } else {
        pattern == host
    }
}

const DER_BOOLEAN: u8 = 0x01;
const DER_OCTET_STRING: u8 = 0x04;
const DER_OID: u8 = 0x06;
const DER_SEQUENCE: u8 = 0x30;
/// Context tag \[2\]: a dNSName inside GeneralNames.
const DER_DNS_NAME: u8 = 0x82;
/// Context tag \[3\]: the extensions wrapper in a TBSCertificate.
const DER_EXTENSIONS: u8 = 0xA3;

/// OID 2.5.29.17, subjectAltName.
const SAN_OID: &[u8] = &[0x55, 0x1D, 0x11];

/// Cursor over concatenated DER TLVs.
struct DerReader<'a> {
    bytes: &'a [u8],
}

impl<'a> DerReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Reads one TLV, returning its tag and content octets.
    fn read_tlv(&mut self) -> Option<(u8, &'a [u8])> {
        let (&tag, rest) = self.bytes.split_first()?;
        let (&first, rest) = rest.split_first()?;
        let (len, rest) = if first < 0x80 {
            (usize::from(first), rest)
        } else {
            let count = usize::from(first & 0x7F);
            if count == 0 || count > 4 || rest.len() < count {
                return None;
            }
            let mut len = 0usize;
            for &b in &rest[..count] {
                len = (len << 8) | usize::from(b);
            }
            (len, &rest[count..])
        };
        if rest.len() < len {
            return None;
        }
        let (content, remainder) = rest.split_at(len);
        self.bytes = remainder;
        Some((tag, content))
    }
}

/// Pulls the DNS names out of a certificate's subjectAltName extension.
///
/// Minimal DER walk; a malformed certificate yields an empty list, which
/// fails closed once a hostname verifier is configured.
fn dns_names(cert: &CertificateDer<'_>) -> Vec<String> {
    parse_dns_names(cert.as_ref()).unwrap_or_default()
}

fn parse_dns_names(cert: &[u8]) -> Option<Vec<String>> {
    let (tag, certificate) = DerReader::new(cert).read_tlv()?;
    if tag != DER_SEQUENCE {
        return None;
    }
    let (tag, tbs) = DerReader::new(certificate).read_tlv()?;
    if tag != DER_SEQUENCE {
        return None;
    }

    // Walk the TBSCertificate fields until the extensions wrapper.
    let mut fields = DerReader::new(tbs);
    while let Some((tag, body)) = fields.read_tlv() {
        if tag != DER_EXTENSIONS {
            continue;
        }
        let (tag, list) = DerReader::new(body).read_tlv()?;
        if tag != DER_SEQUENCE {
            return None;
        }

        let mut extensions = DerReader::new(list);
        while let Some((tag, extension)) = extensions.read_tlv() {
            if tag != DER_SEQUENCE {
                continue;
            }
            let mut extension = DerReader::new(extension);
            let (tag, oid) = extension.read_tlv()?;
            if tag != DER_OID || oid != SAN_OID {
                continue;
            }
            let (mut tag, mut value) = extension.read_tlv()?;
            if tag == DER_BOOLEAN {
                // The optional criticality flag sits before the value.
                (tag, value) = extension.read_tlv()?;
            }
            if tag != DER_OCTET_STRING {
                return None;
            }
            let (tag, general_names) = DerReader::new(value).read_tlv()?;
            if tag != DER_SEQUENCE {
                return None;
            }

            let mut names = Vec::new();
            let mut entries = DerReader::new(general_names);
            while let Some((tag, name)) = entries.read_tlv() {
                if tag == DER_DNS_NAME {
                    names.push(String::from_utf8_lossy(name).into_owned());
                }
            }
            return Some(names);
        }
        break;
    }
    Some(Vec::new())
}

/// Certificate verifier for explicitly trusted hosts: chain validation is
/// skipped, but a configured hostname verifier still checks the
/// certificate's DNS names against the expected host.
#[derive(Debug)]
struct TrustedHostVerifier {
    expected_host: String,
    hostname_verifier: Option<Arc<dyn HostnameVerifier>>,
}

impl ServerCertVerifier for TrustedHostVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if let Some(verifier) = &self.hostname_verifier {
            let names = dns_names(end_entity);
            if !names
                .iter()
                .any(|name| verifier.verify(&self.expected_host, name))
            {
                return Err(rustls::Error::General(format!(
                    "no certificate name matches {} (presented: {names:?})",
                    self.expected_host
                )));
            }
        }
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::conn::config::Config;

    #[test]
    fn wildcard_matches_one_label() {
        assert!(wildcard_matches("*.example.com", "foo.example.com"));
        assert!(wildcard_matches("*.example.com", "BAR.EXAMPLE.COM"));
    }

    #[test]
    fn wildcard_does_not_match_apex() {
        assert!(!wildcard_matches("*.example.com", "example.com"));
    }

    #[test]
    fn wildcard_does_not_span_labels() {
        assert!(!wildcard_matches("*.example.com", "evil.foo.example.com"));
    }

    #[test]
    fn non_wildcard_is_exact() {
        assert!(wildcard_matches("mail.example.com", "MAIL.example.com"));
        assert!(!wildcard_matches("mail.example.com", "imap.example.com"));
    }

    #[test]
    fn verifier_registry_is_closed() {
        assert!(verifier_for("strict").is_some());
        assert!(verifier_for("legacy").is_some());
        assert!(verifier_for("com.example.CustomVerifier").is_none());
    }

    #[test]
    fn connector_builds_for_default_and_trusted_configs() {
        let config = Config::builder("imap.example.com").build();
        assert!(connector(&config).is_ok());

        let trusted = Config::builder("imap.example.com")
            .trust_host("*")
            .hostname_verifier("legacy")
            .build();
        assert!(connector(&trusted).is_ok());
    }

    #[test]
    fn unknown_verifier_alias_fails_establishment() {
        let config = Config::builder("imap.example.com")
            .trust_host("*")
            .hostname_verifier("reflective.Thing")
            .build();
        assert!(connector(&config).is_err());
    }

    #[test]
    fn verifier_alias_requires_a_trusted_host() {
        // On the webpki path the alias would be dead configuration.
        let config = Config::builder("imap.example.com")
            .hostname_verifier("strict")
            .build();
        assert!(connector(&config).is_err());
    }

    /// One DER TLV with a short-form length.
    fn der(tag: u8, content: &[u8]) -> Vec<u8> {
        assert!(content.len() < 128);
        #[allow(clippy::cast_possible_truncation)]
        let mut out = vec![tag, content.len() as u8];
        out.extend_from_slice(content);
        out
    }

    /// A structurally valid certificate whose SAN extension carries the
    /// given DNS names. Signature and key material are empty; only the
    /// name extraction looks at this.
    fn fake_cert(sans: &[&str]) -> Vec<u8> {
        let mut entries = Vec::new();
        for san in sans {
            entries.extend_from_slice(&der(DER_DNS_NAME, san.as_bytes()));
        }
        let general_names = der(DER_SEQUENCE, &entries);
        let extension = der(
            DER_SEQUENCE,
            &[der(DER_OID, SAN_OID), der(DER_OCTET_STRING, &general_names)].concat(),
        );
        let extensions = der(DER_EXTENSIONS, &der(DER_SEQUENCE, &extension));

        let mut tbs = Vec::new();
        tbs.extend_from_slice(&der(0xA0, &der(0x02, &[2]))); // version
        tbs.extend_from_slice(&der(0x02, &[1])); // serial
        for _ in 0..5 {
            // signature alg, issuer, validity, subject, key info
            tbs.extend_from_slice(&der(DER_SEQUENCE, &[]));
        }
        tbs.extend_from_slice(&extensions);

        der(
            DER_SEQUENCE,
            &[der(DER_SEQUENCE, &tbs), der(DER_SEQUENCE, &[]), der(0x03, &[0])].concat(),
        )
    }

    #[test]
    fn san_extraction_reads_dns_entries() {
        let cert = CertificateDer::from(fake_cert(&["mail.example.com", "*.example.org"]));
        assert_eq!(
            dns_names(&cert),
            vec!["mail.example.com".to_string(), "*.example.org".to_string()]
        );
    }

    #[test]
    fn san_extraction_fails_closed_on_garbage() {
        let cert = CertificateDer::from(vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(dns_names(&cert).is_empty());
    }

    #[test]
    fn trusted_host_verifier_checks_certificate_names() {
        let cert = CertificateDer::from(fake_cert(&["*.example.org"]));
        let server = ServerName::try_from("imap.example.org").unwrap();

        let legacy = TrustedHostVerifier {
            expected_host: "imap.example.org".to_string(),
            hostname_verifier: verifier_for("legacy"),
        };
        assert!(
            legacy
                .verify_server_cert(&cert, &[], &server, &[], UnixTime::now())
                .is_ok()
        );

        // Strict demands an exact name; the wildcard is not one.
        let strict = TrustedHostVerifier {
            expected_host: "imap.example.org".to_string(),
            hostname_verifier: verifier_for("strict"),
        };
        assert!(
            strict
                .verify_server_cert(&cert, &[], &server, &[], UnixTime::now())
                .is_err()
        );

        // The wildcard spans one label only.
        let deep = TrustedHostVerifier {
            expected_host: "deep.sub.example.org".to_string(),
            hostname_verifier: verifier_for("legacy"),
        };
        assert!(
            deep.verify_server_cert(&cert, &[], &server, &[], UnixTime::now())
                .is_err()
        );

        // Without an alias the trusted host accepts anything, names included.
        let open = TrustedHostVerifier {
            expected_host: "imap.example.org".to_string(),
            hostname_verifier: None,
        };
        assert!(
            open.verify_server_cert(&cert, &[], &server, &[], UnixTime::now())
                .is_ok()
        );
    }

    proptest::proptest! {
        #[test]
        fn wildcard_covers_exactly_one_label(
            label in "[a-z][a-z0-9-]{0,8}",
            extra in "[a-z][a-z0-9-]{0,8}",
        ) {
            let one_label = format!("{label}.example.com");
            let two_labels = format!("{extra}.{label}.example.com");
            proptest::prop_assert!(wildcard_matches("*.example.com", &one_label));
            proptest::prop_assert!(!wildcard_matches("*.example.com", &two_labels));
        }
    }
}
