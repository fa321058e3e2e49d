//! The connection driver.
//!
//! Owns the framed stream and runs the command loop: write a tagged
//! command, then read responses until the matching completion arrives.
//! Every untagged response read on the way is dispatched to listeners
//! before the command returns, in wire order. BYE terminates the loop
//! and the connection wherever it appears.

#![allow(clippy::missing_errors_doc)]

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::command::{Command, TagGenerator};
use crate::conn::config::Config;
use crate::conn::framed::FramedStream;
use crate::conn::stream::ImapStream;
use crate::dispatch::Dispatcher;
use crate::net;
use crate::parser::response::{Response, ResponseParser, UntaggedResponse};
use crate::types::{Capability, MailboxStatus, ResponseCode, Status};
use crate::{Error, Result};

/// Lifecycle state of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnState {
    /// Greeted, not yet authenticated.
    Connected,
    /// Authenticated, no mailbox selected.
    Authenticated,
    /// A mailbox is selected.
    Selected(String),
    /// An IDLE command is in progress in the named mailbox.
    Idling(String),
    /// Dead; the connection must be discarded.
    Closed,
}

/// A command's completion, together with the untagged responses read
/// while it was in flight.
///
/// The untagged responses have already been dispatched to listeners; they
/// are repeated here so the caller can consume command results (FETCH
/// data, SEARCH hits) directly.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Completion status.
    pub status: Status,
    /// Response code on the completion line.
    pub code: Option<ResponseCode>,
    /// Completion text.
    pub text: String,
    /// Untagged responses read before the completion, in wire order.
    pub untagged: Vec<UntaggedResponse>,
}

impl CommandResult {
    /// Converts NO, BAD, and BYE completions into errors.
    pub fn ok(self) -> Result<Self> {
        match self.status {
            Status::Ok | Status::PreAuth => Ok(self),
            Status::No => Err(Error::No(self.text)),
            Status::Bad => Err(Error::Bad(self.text)),
            Status::Bye => Err(Error::Bye(self.text)),
        }
    }
}

/// Replies to server continuation requests during a command.
///
/// Receives the decoded prompt text (if any) and returns the raw bytes of
/// the reply line, without CRLF. Used by AUTHENTICATE.
pub type ContinuationHandler<'a> =
    dyn FnMut(Option<&str>) -> Result<Vec<u8>> + Send + 'a;

/// One IMAP connection: framed stream, tag sequence, listener registry,
/// and lifecycle state.
pub struct ImapConnection {
    framed: FramedStream<ImapStream>,
    tags: TagGenerator,
    dispatcher: Arc<Dispatcher>,
    capabilities: Vec<Capability>,
    state: ConnState,
    read_timeout: Duration,
}

impl std::fmt::Debug for ImapConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapConnection")
            .field("state", &self.state)
            .field("capabilities", &self.capabilities)
            .field("read_timeout", &self.read_timeout)
            .finish_non_exhaustive()
    }
}

impl ImapConnection {
    /// Establishes the transport per the configuration and consumes the
    /// server greeting. Does not authenticate and does not run STARTTLS.
    pub async fn connect(config: &Config) -> Result<Self> {
        let stream = net::establish(config).await?;
        let mut conn = Self::from_stream(stream, config);
        conn.read_greeting().await?;
        Ok(conn)
    }

    /// Wraps an already-established stream. The greeting has not been
    /// read yet.
    pub fn from_stream(stream: ImapStream, config: &Config) -> Self {
        let mut framed = FramedStream::new(stream);
        framed.set_write_timeout(config.write_timeout);
        Self {
            framed,
            tags: TagGenerator::default(),
            dispatcher: Arc::new(Dispatcher::new()),
            capabilities: Vec::new(),
            state: ConnState::Connected,
            read_timeout: config.read_timeout,
        }
    }

    /// Reads and classifies the greeting.
    pub async fn read_greeting(&mut self) -> Result<()> {
        let raw = self.read_timed().await?;
        match ResponseParser::parse(&raw)? {
            Response::Untagged(UntaggedResponse::Ok { code, text }) => {
                trace!(%text, "greeted");
                if let Some(ResponseCode::Capability(caps)) = code {
                    self.capabilities = caps;
                }
                self.state = ConnState::Connected;
                Ok(())
            }
            Response::Untagged(UntaggedResponse::PreAuth { code, text }) => {
                trace!(%text, "greeted pre-authenticated");
                if let Some(ResponseCode::Capability(caps)) = code {
                    self.capabilities = caps;
                }
                self.state = ConnState::Authenticated;
                Ok(())
            }
            Response::Untagged(UntaggedResponse::Bye { text, .. }) => {
                self.state = ConnState::Closed;
                Err(Error::Bye(text))
            }
            other => Err(Error::Protocol(format!("unexpected greeting: {other:?}"))),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> &ConnState {
        &self.state
    }

    /// Whether the connection can still carry commands.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.state != ConnState::Closed
    }

    /// Whether the transport is TLS.
    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.framed.get_ref().is_tls()
    }

    /// Capabilities from the most recent listing.
    #[must_use]
    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Whether a capability was advertised.
    #[must_use]
    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }

    /// The listener registry fed by this connection.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub(crate) fn tags(&self) -> &TagGenerator {
        &self.tags
    }

    /// Sets the lifecycle state.
    pub fn set_state(&mut self, state: ConnState) {
        self.state = state;
    }

    /// Runs one command to completion.
    pub async fn command(&mut self, cmd: &Command) -> Result<CommandResult> {
        self.command_with(cmd, None).await
    }

    /// Runs one command, answering continuation requests through
    /// `handler`.
    pub async fn command_with(
        &mut self,
        cmd: &Command,
        mut handler: Option<&mut ContinuationHandler<'_>>,
    ) -> Result<CommandResult> {
        match &self.state {
            ConnState::Closed => {
                return Err(Error::InvalidState("connection is closed".to_string()));
            }
            ConnState::Idling(_) => {
                return Err(Error::InvalidState(
                    "IDLE in progress; terminate it first".to_string(),
                ));
            }
            _ => {}
        }

        let tag = self.tags.next();
        debug!(%tag, command = command_name(cmd), "sending command");
        self.write(&cmd.serialize(&tag)).await?;

        let mut untagged = Vec::new();
        loop {
            let raw = self.read_timed().await?;
            let parsed = match ResponseParser::parse(&raw) {
                Ok(p) => p,
                Err(e) => {
                    // Framing was intact, so the connection survives; the
                    // in-flight command does not.
                    warn!(error = %e, "discarding malformed response");
                    return Err(e);
                }
            };

            match parsed {
                Response::Continuation { text } => match handler.as_mut() {
                    Some(h) => match h(text.as_deref()) {
                        Ok(mut reply) => {
                            reply.extend_from_slice(b"\r\n");
                            self.write(&reply).await?;
                        }
                        Err(e) => {
                            // Cancel the exchange and drain to completion
                            // so the stream stays in sync.
                            self.write(b"*\r\n").await?;
                            self.drain_until_tagged(&tag, &mut untagged).await?;
                            return Err(e);
                        }
                    },
                    None => {
                        self.write(b"*\r\n").await?;
                        self.drain_until_tagged(&tag, &mut untagged).await?;
                        return Err(Error::Protocol(
                            "server requested continuation unexpectedly".to_string(),
                        ));
                    }
                },

                Response::Untagged(u) => {
                    self.absorb(&u);
                    self.dispatcher.notify(&u);
                    if let UntaggedResponse::Bye { text, .. } = &u {
                        let text = text.clone();
                        self.state = ConnState::Closed;
                        return Err(Error::Bye(text));
                    }
                    untagged.push(u);
                }

                Response::Tagged {
                    tag: t,
                    status,
                    code,
                    text,
                } => {
                    if t.as_str() == tag {
                        if let Some(ResponseCode::Capability(caps)) = &code {
                            self.capabilities = caps.clone();
                        }
                        return Ok(CommandResult {
                            status,
                            code,
                            text,
                            untagged,
                        });
                    }
                    // A completion for a tag we never issued, or one whose
                    // waiter gave up. Forward it as status data rather
                    // than failing the session.
                    warn!(expected = %tag, got = %t, "stray tagged response, forwarding");
                    let stray = stray_to_untagged(status, code, text);
                    self.dispatcher.notify(&stray);
                    untagged.push(stray);
                }
            }
        }
    }

    /// LOGOUT. The expected BYE is consumed; the connection ends Closed
    /// either way.
    pub async fn logout(&mut self) -> Result<()> {
        let result = self.command(&Command::Logout).await;
        self.state = ConnState::Closed;
        match result {
            Ok(_) | Err(Error::Bye(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Upgrades the transport via STARTTLS. On refusal, fails when
    /// `require_starttls` is set and continues plaintext otherwise.
    pub async fn starttls(&mut self, config: &Config) -> Result<()> {
        if self.is_tls() {
            return Err(Error::InvalidState("transport is already TLS".to_string()));
        }

        let result = self.command(&Command::StartTls).await?;
        if result.status != Status::Ok {
            if config.require_starttls {
                return Err(Error::Protocol(format!(
                    "server refused STARTTLS: {}",
                    result.text
                )));
            }
            warn!(text = %result.text, "continuing plaintext after STARTTLS refusal");
            return Ok(());
        }

        let connector = net::tls::connector(config)?;
        let framed = std::mem::replace(&mut self.framed, FramedStream::new(ImapStream::Closed));
        // Nothing may be buffered here: the server must not send between
        // its OK and the handshake.
        let plain = framed.into_inner();
        match plain.upgrade_to_tls(&connector, &config.host).await {
            Ok(upgraded) => {
                self.framed = FramedStream::new(upgraded);
                self.framed.set_write_timeout(config.write_timeout);
                // Pre-TLS capabilities can be attacker-controlled.
                self.capabilities.clear();
                debug!(host = %config.host, "STARTTLS upgrade complete");
                Ok(())
            }
            Err(e) => {
                self.state = ConnState::Closed;
                Err(e)
            }
        }
    }

    /// Asks the server for a fresh capability listing.
    pub async fn refresh_capabilities(&mut self) -> Result<()> {
        let _ = self.command(&Command::Capability).await?.ok()?;
        Ok(())
    }

    /// SELECT or EXAMINE a mailbox and assemble its status snapshot.
    pub async fn select(&mut self, mailbox: &str, read_only: bool) -> Result<MailboxStatus> {
        match &self.state {
            ConnState::Authenticated | ConnState::Selected(_) => {}
            other => {
                return Err(Error::InvalidState(format!(
                    "cannot select from state {other:?}"
                )));
            }
        }

        let cmd = if read_only {
            Command::Examine {
                mailbox: mailbox.to_string(),
            }
        } else {
            Command::Select {
                mailbox: mailbox.to_string(),
            }
        };
        let result = self.command(&cmd).await?.ok()?;

        let mut status = MailboxStatus {
            read_only,
            ..MailboxStatus::default()
        };
        for u in &result.untagged {
            match u {
                UntaggedResponse::Exists(n) => status.exists = *n,
                UntaggedResponse::Recent(n) => status.recent = *n,
                UntaggedResponse::Flags(flags) => status.flags = flags.clone(),
                UntaggedResponse::Ok { code: Some(code), .. } => {
                    apply_select_code(&mut status, code);
                }
                _ => {}
            }
        }
        if let Some(code) = &result.code {
            match code {
                ResponseCode::ReadOnly => status.read_only = true,
                ResponseCode::ReadWrite => status.read_only = false,
                _ => apply_select_code(&mut status, code),
            }
        }

        self.state = ConnState::Selected(mailbox.to_string());
        Ok(status)
    }

    /// Absorbs and dispatches one untagged response read outside the
    /// command loop (IDLE).
    pub(crate) fn ingest(&mut self, response: &UntaggedResponse) {
        self.absorb(response);
        self.dispatcher.notify(response);
    }

    fn absorb(&mut self, response: &UntaggedResponse) {
        match response {
            UntaggedResponse::Capability(caps) => self.capabilities = caps.clone(),
            UntaggedResponse::Ok {
                code: Some(ResponseCode::Capability(caps)),
                ..
            } => self.capabilities = caps.clone(),
            _ => {}
        }
    }

    async fn drain_until_tagged(
        &mut self,
        tag: &str,
        untagged: &mut Vec<UntaggedResponse>,
    ) -> Result<()> {
        loop {
            let raw = self.read_timed().await?;
            match ResponseParser::parse(&raw)? {
                Response::Tagged { tag: t, .. } if t.as_str() == tag => return Ok(()),
                Response::Untagged(u) => {
                    self.absorb(&u);
                    self.dispatcher.notify(&u);
                    if let UntaggedResponse::Bye { text, .. } = &u {
                        let text = text.clone();
                        self.state = ConnState::Closed;
                        return Err(Error::Bye(text));
                    }
                    untagged.push(u);
                }
                _ => {}
            }
        }
    }

    pub(crate) async fn write(&mut self, data: &[u8]) -> Result<()> {
        match self.framed.write_command(data).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_fatal() {
                    self.state = ConnState::Closed;
                }
                Err(e)
            }
        }
    }

    pub(crate) async fn read_timed(&mut self) -> Result<Vec<u8>> {
        match tokio::time::timeout(self.read_timeout, self.framed.read_response()).await {
            Err(_) => {
                self.state = ConnState::Closed;
                Err(Error::Timeout(self.read_timeout))
            }
            Ok(Err(e)) => {
                self.state = ConnState::Closed;
                Err(e)
            }
            Ok(Ok(raw)) => Ok(raw),
        }
    }

    pub(crate) fn framed(&mut self) -> &mut FramedStream<ImapStream> {
        &mut self.framed
    }
}

fn apply_select_code(status: &mut MailboxStatus, code: &ResponseCode) {
    match code {
        ResponseCode::UidNext(uid) => status.uid_next = Some(*uid),
        ResponseCode::UidValidity(v) => status.uid_validity = Some(*v),
        ResponseCode::Unseen(seq) => status.unseen = Some(*seq),
        ResponseCode::PermanentFlags(flags) => status.permanent_flags = flags.clone(),
        _ => {}
    }
}

fn stray_to_untagged(
    status: Status,
    code: Option<ResponseCode>,
    text: String,
) -> UntaggedResponse {
    match status {
        Status::Ok => UntaggedResponse::Ok { code, text },
        Status::No => UntaggedResponse::No { code, text },
        Status::Bad => UntaggedResponse::Bad { code, text },
        Status::PreAuth => UntaggedResponse::PreAuth { code, text },
        Status::Bye => UntaggedResponse::Bye { code, text },
    }
}

const fn command_name(cmd: &Command) -> &'static str {
    match cmd {
        Command::Capability => "CAPABILITY",
        Command::Noop => "NOOP",
        Command::Logout => "LOGOUT",
        Command::StartTls => "STARTTLS",
        Command::Login { .. } => "LOGIN",
        Command::Authenticate { .. } => "AUTHENTICATE",
        Command::Select { .. } => "SELECT",
        Command::Examine { .. } => "EXAMINE",
        Command::List { .. } => "LIST",
        Command::Status { .. } => "STATUS",
        Command::Close => "CLOSE",
        Command::Expunge => "EXPUNGE",
        Command::Search { .. } => "SEARCH",
        Command::Fetch { .. } => "FETCH",
        Command::Store { .. } => "STORE",
        Command::Idle => "IDLE",
        Command::Done => "DONE",
    }
}
