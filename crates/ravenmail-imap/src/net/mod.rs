//! Socket establishment.
//!
//! Resolves the route policy (HTTP CONNECT proxy first, then SOCKS5, then
//! direct), binds a local address when asked, and applies the connect
//! timeout. Implicit TLS is layered here; STARTTLS happens later at the
//! session level.

#![allow(clippy::missing_errors_doc)]

pub mod proxy;
pub mod tls;

use std::io;
use std::net::SocketAddr;

use rustls::pki_types::ServerName;
use tokio::net::{TcpSocket, TcpStream};
use tracing::{debug, warn};

use crate::conn::config::{Config, Security};
use crate::conn::stream::ImapStream;
use crate::{Error, Result};

/// Opens the transport for a configuration, including implicit TLS.
pub async fn establish(config: &Config) -> Result<ImapStream> {
    let tcp = open_tcp(config).await?;

    match config.security {
        Security::Implicit => {
            let connector = tls::connector(config)?;
            let server_name = ServerName::try_from(config.host.clone())?;
            match connector.connect(server_name, tcp).await {
                Ok(stream) => {
                    debug!(host = %config.host, "implicit TLS established");
                    Ok(ImapStream::tls(stream))
                }
                Err(e) if config.fallback_to_plain => {
                    // The failed handshake consumed the socket; dial again.
                    warn!(host = %config.host, error = %e, "TLS handshake failed, retrying in the clear");
                    let tcp = open_tcp(config).await?;
                    Ok(ImapStream::plain(tcp))
                }
                Err(e) => Err(e.into()),
            }
        }
        Security::None | Security::StartTls => Ok(ImapStream::plain(tcp)),
    }
}

/// Opens the raw TCP connection, routing through a proxy when configured.
pub async fn open_tcp(config: &Config) -> Result<TcpStream> {
    if let Some(p) = &config.http_proxy {
        debug!(proxy = %p.host, port = p.port, "connecting via HTTP CONNECT proxy");
        let mut stream = connect_tcp(&p.host, p.port, config).await?;
        proxy::http_connect(&mut stream, &config.host, config.port, p).await?;
        Ok(stream)
    } else if let Some(p) = &config.socks_proxy {
        debug!(proxy = %p.host, port = p.port, "connecting via SOCKS5 proxy");
        let mut stream = connect_tcp(&p.host, p.port, config).await?;
        proxy::socks5_connect(&mut stream, &config.host, config.port, p).await?;
        Ok(stream)
    } else {
        connect_tcp(&config.host, config.port, config).await
    }
}

async fn connect_tcp(host: &str, port: u16, config: &Config) -> Result<TcpStream> {
    let attempt = connect_once(host, port, config.local_bind);
    let stream = tokio::time::timeout(config.connect_timeout, attempt)
        .await
        .map_err(|_| Error::Timeout(config.connect_timeout))??;
    Ok(stream)
}

async fn connect_once(
    host: &str,
    port: u16,
    local: Option<SocketAddr>,
) -> io::Result<TcpStream> {
    let Some(local) = local else {
        return TcpStream::connect((host, port)).await;
    };

    // With a local bind, each attempt needs its own socket since connect
    // consumes it.
    let mut last_err = None;
    for addr in tokio::net::lookup_host((host, port)).await? {
        if addr.is_ipv4() != local.is_ipv4() {
            continue;
        }
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.bind(local)?;
        match socket.connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no address matched the local bind family",
        )
    }))
}
