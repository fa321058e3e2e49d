//! HTTP CONNECT and SOCKS5 tunneling.

#![allow(clippy::missing_errors_doc)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::conn::config::ProxyConfig;
use crate::{Error, Result};

/// Establishes an HTTP CONNECT tunnel to `host:port` over the stream.
pub async fn http_connect<S>(
    stream: &mut S,
    host: &str,
    port: u16,
    proxy: &ProxyConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request = format!("CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n");
    if let (Some(user), Some(pass)) = (&proxy.username, &proxy.password) {
        let token = BASE64.encode(format!("{user}:{pass}"));
        request.push_str(&format!("Proxy-Authorization: Basic {token}\r\n"));
    }
    request.push_str("\r\n");

    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let status = read_proxy_response(stream).await?;
    trace!(status = %status, "proxy tunnel established");
    Ok(())
}

/// Reads the proxy's reply headers one byte at a time, stopping exactly at
/// the blank line so no tunneled bytes are consumed.
///
/// Returns the status line on success; a non-2xx reply fails with
/// [`Error::ProxyTunnel`] carrying that line verbatim.
pub async fn read_proxy_response<R>(reader: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    const MAX_HEADER_BYTES: usize = 16 * 1024;

    let mut header = Vec::new();
    loop {
        let byte = reader.read_u8().await?;
        header.push(byte);
        if header.ends_with(b"\r\n\r\n") {
            break;
        }
        if header.len() > MAX_HEADER_BYTES {
            return Err(Error::ProxyTunnel("proxy response too large".to_string()));
        }
    }

    let text = String::from_utf8_lossy(&header);
    let status_line = text.lines().next().unwrap_or_default().to_string();

    let code = status_line.split_whitespace().nth(1).unwrap_or_default();
    if code.starts_with('2') {
        Ok(status_line)
    } else {
        Err(Error::ProxyTunnel(status_line))
    }
}

/// Runs the SOCKS5 handshake and CONNECT request (RFC 1928, RFC 1929 for
/// authentication). The target host is sent as a domain name so the proxy
/// resolves it.
pub async fn socks5_connect<S>(
    stream: &mut S,
    host: &str,
    port: u16,
    proxy: &ProxyConfig,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let has_creds = proxy.username.is_some() && proxy.password.is_some();

    let mut greeting = vec![0x05, 0x01, 0x00];
    if has_creds {
        greeting = vec![0x05, 0x02, 0x00, 0x02];
    }
    stream.write_all(&greeting).await?;
    stream.flush().await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply[0] != 0x05 {
        return Err(Error::Socks(format!("unexpected version {:#04x}", reply[0])));
    }
    match reply[1] {
        0x00 => {}
        0x02 => {
            let (Some(user), Some(pass)) = (&proxy.username, &proxy.password) else {
                return Err(Error::Socks(
                    "proxy requires authentication but no credentials configured".to_string(),
                ));
            };
            negotiate_userpass(stream, user, pass).await?;
        }
        0xFF => {
            return Err(Error::Socks(
                "proxy accepted none of the offered auth methods".to_string(),
            ));
        }
        other => {
            return Err(Error::Socks(format!(
                "proxy chose unsupported auth method {other:#04x}"
            )));
        }
    }

    let host_bytes = host.as_bytes();
    if host_bytes.len() > 255 {
        return Err(Error::Socks("target host name too long".to_string()));
    }

    let mut request = vec![0x05, 0x01, 0x00, 0x03, host_bytes.len() as u8];
    request.extend_from_slice(host_bytes);
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;
    stream.flush().await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[1] != 0x00 {
        return Err(Error::Socks(socks_reply_message(head[1]).to_string()));
    }

    // Drain the bound address so no tunneled bytes are consumed.
    let addr_len = match head[3] {
        0x01 => 4,
        0x04 => 16,
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            usize::from(len[0])
        }
        other => {
            return Err(Error::Socks(format!("unknown address type {other:#04x}")));
        }
    };
    let mut rest = vec![0u8; addr_len + 2];
    stream.read_exact(&mut rest).await?;

    Ok(())
}

async fn negotiate_userpass<S>(stream: &mut S, user: &str, pass: &str) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (user, pass) = (user.as_bytes(), pass.as_bytes());
    if user.len() > 255 || pass.len() > 255 {
        return Err(Error::Socks("proxy credentials too long".to_string()));
    }

    let mut msg = vec![0x01, user.len() as u8];
    msg.extend_from_slice(user);
    msg.push(pass.len() as u8);
    msg.extend_from_slice(pass);
    stream.write_all(&msg).await?;
    stream.flush().await?;

    let mut reply = [0u8; 2];
    stream.read_exact(&mut reply).await?;
    if reply[1] != 0x00 {
        return Err(Error::Socks("proxy rejected credentials".to_string()));
    }
    Ok(())
}

const fn socks_reply_message(code: u8) -> &'static str {
    match code {
        0x01 => "general SOCKS server failure",
        0x02 => "connection not allowed by ruleset",
        0x03 => "network unreachable",
        0x04 => "host unreachable",
        0x05 => "connection refused",
        0x06 => "TTL expired",
        0x07 => "command not supported",
        0x08 => "address type not supported",
        _ => "unknown SOCKS failure",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn accepts_200_and_leaves_trailer_unread() {
        // Bytes after the blank line belong to the tunneled protocol and
        // must stay in the stream.
        let mut mock = Builder::new()
            .read(b"HTTP/1.1 200 Connection established\r\n\r\n* OK ready\r\n")
            .build();

        let status = read_proxy_response(&mut mock).await.unwrap();
        assert_eq!(status, "HTTP/1.1 200 Connection established");

        let mut trailer = vec![0u8; 12];
        mock.read_exact(&mut trailer).await.unwrap();
        assert_eq!(&trailer, b"* OK ready\r\n");
    }

    #[tokio::test]
    async fn rejects_403_with_verbatim_status_line() {
        let mut mock = Builder::new()
            .read(b"HTTP/1.1 403 Forbidden\r\nX-Reason: policy\r\n\r\n")
            .build();

        match read_proxy_response(&mut mock).await {
            Err(Error::ProxyTunnel(line)) => assert_eq!(line, "HTTP/1.1 403 Forbidden"),
            other => panic!("expected tunnel refusal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn tolerates_extra_headers_before_blank_line() {
        let mut mock = Builder::new()
            .read(b"HTTP/1.0 200 OK\r\nVia: 1.1 gateway\r\nConnection: keep-alive\r\n\r\n")
            .build();

        assert!(read_proxy_response(&mut mock).await.is_ok());
    }

    #[tokio::test]
    async fn socks5_no_auth_connect() {
        let mut mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&[
                0x05, 0x01, 0x00, 0x03, 0x04, b'm', b'a', b'i', b'l', 0x00, 0x8F,
            ])
            .read(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x1F, 0x90])
            .build();

        let proxy = ProxyConfig {
            host: "proxy".into(),
            port: 1080,
            username: None,
            password: None,
        };
        socks5_connect(&mut mock, "mail", 143, &proxy).await.unwrap();
    }

    #[tokio::test]
    async fn socks5_refusal_maps_reply_code() {
        let mut mock = Builder::new()
            .write(&[0x05, 0x01, 0x00])
            .read(&[0x05, 0x00])
            .write(&[
                0x05, 0x01, 0x00, 0x03, 0x04, b'm', b'a', b'i', b'l', 0x00, 0x8F,
            ])
            .read(&[0x05, 0x05, 0x00, 0x01])
            .build();

        let proxy = ProxyConfig {
            host: "proxy".into(),
            port: 1080,
            username: None,
            password: None,
        };
        match socks5_connect(&mut mock, "mail", 143, &proxy).await {
            Err(Error::Socks(msg)) => assert_eq!(msg, "connection refused"),
            other => panic!("expected SOCKS failure, got {other:?}"),
        }
    }
}
