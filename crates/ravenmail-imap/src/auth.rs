//! Authentication negotiation.
//!
//! Walks the configured mechanism preference order, keeping only
//! mechanisms the server advertised and this stack implements, and runs
//! each over AUTHENTICATE continuations until one succeeds. Plain LOGIN
//! is the last resort, used only when SASL got nowhere and the server
//! did not advertise LOGINDISABLED.

#![allow(clippy::missing_errors_doc)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use ravenmail_sasl::StaticCredentials;
use tracing::{debug, warn};

use crate::command::Command;
use crate::conn::config::Config;
use crate::conn::driver::{ConnState, ImapConnection};
use crate::types::Capability;
use crate::{Error, Result};

/// Authenticates the connection, leaving it in the authenticated state.
///
/// Mechanisms are tried in the configured preference order; a refusal
/// moves on to the next candidate, and only the final failure is
/// returned. Transport and protocol errors abort immediately.
pub async fn authenticate(conn: &mut ImapConnection, config: &Config) -> Result<()> {
    if conn.capabilities().is_empty() {
        conn.refresh_capabilities().await?;
    }

    let Some(username) = config.username.clone() else {
        return Err(Error::Auth("no username configured".to_string()));
    };
    let Some(password) = config.password.clone() else {
        return Err(Error::Auth("no password configured".to_string()));
    };
    let mut creds = StaticCredentials::new(username.clone(), password.clone());
    if let Some(authzid) = &config.authzid {
        creds = creds.authzid(authzid.clone());
    }

    let advertised: Vec<String> = conn
        .capabilities()
        .iter()
        .filter_map(Capability::auth_mechanism)
        .map(str::to_ascii_uppercase)
        .collect();

    let mut last_refusal: Option<Error> = None;
    for name in config.enabled_mechanisms() {
        let upper = name.to_ascii_uppercase();
        if !advertised.contains(&upper) || !ravenmail_sasl::is_supported(&upper) {
            continue;
        }
        let Some(mut mechanism) = ravenmail_sasl::for_name(&upper) else {
            continue;
        };
        if mechanism.requires_tls() && !conn.is_tls() {
            warn!(mechanism = %upper, "skipping plaintext-unsafe mechanism on unencrypted transport");
            continue;
        }

        debug!(mechanism = %upper, "attempting SASL authentication");
        match sasl_exchange(conn, mechanism.as_mut(), &creds, &upper).await {
            Ok(()) => {
                conn.set_state(ConnState::Authenticated);
                debug!(mechanism = %upper, "authenticated");
                return Ok(());
            }
            Err(e @ (Error::Auth(_) | Error::No(_) | Error::Bad(_))) => {
                warn!(mechanism = %upper, error = %e, "mechanism failed, trying next");
                last_refusal = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    // Plain LOGIN as the fallback of last resort.
    if !conn.has_capability(&Capability::LoginDisabled) {
        debug!("falling back to LOGIN");
        let cmd = Command::Login { username, password };
        match conn.command(&cmd).await?.ok() {
            Ok(_) => {
                conn.set_state(ConnState::Authenticated);
                debug!("authenticated via LOGIN");
                return Ok(());
            }
            Err(Error::No(text)) => {
                return Err(Error::Auth(text));
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_refusal
        .unwrap_or_else(|| Error::Auth("no usable authentication mechanism".to_string())))
}

/// Runs one AUTHENTICATE exchange. Challenges arrive base64 in
/// continuation prompts; replies go back base64, one per round.
async fn sasl_exchange(
    conn: &mut ImapConnection,
    mechanism: &mut dyn ravenmail_sasl::Mechanism,
    creds: &StaticCredentials,
    name: &str,
) -> Result<()> {
    let mut first_round = true;
    let mut handler = move |prompt: Option<&str>| -> Result<Vec<u8>> {
        let challenge = match prompt {
            Some(text) if !text.trim().is_empty() => BASE64
                .decode(text.trim())
                .map_err(|e| Error::Auth(format!("malformed challenge: {e}")))?,
            _ => Vec::new(),
        };

        let reply = if first_round && challenge.is_empty() {
            first_round = false;
            match mechanism.initial_response(creds).map_err(auth_error)? {
                Some(r) => r,
                None => mechanism.respond(&challenge, creds).map_err(auth_error)?,
            }
        } else {
            first_round = false;
            mechanism.respond(&challenge, creds).map_err(auth_error)?
        };

        // Every continuation needs a reply line; an empty response is the
        // "=" sentinel, not an omitted line.
        if reply.is_empty() {
            Ok(b"=".to_vec())
        } else {
            Ok(BASE64.encode(reply).into_bytes())
        }
    };

    let cmd = Command::Authenticate {
        mechanism: name.to_string(),
        initial_response: None,
    };
    conn.command_with(&cmd, Some(&mut handler)).await?.ok()?;
    Ok(())
}

fn auth_error(e: ravenmail_sasl::Error) -> Error {
    Error::Auth(e.to_string())
}
