//! IDLE coordination (RFC 2177).
//!
//! One task owns the connection and waits inside [`IdleSession::wait`];
//! any other task holding an [`IdleInterrupter`] can ask for termination.
//! DONE is sent at most once no matter how many interrupts race, and the
//! session always drains to the tagged completion so the stream stays in
//! sync.

#![allow(clippy::missing_errors_doc)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::command::Command;
use crate::conn::driver::{ConnState, ImapConnection};
use crate::parser::response::{Response, ResponseParser, UntaggedResponse};
use crate::types::Capability;
use crate::{Error, Result};

/// Where the IDLE exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdlePhase {
    /// IDLE accepted, DONE not yet requested.
    Active,
    /// An interrupter asked for termination; DONE not yet on the wire.
    DoneRequested,
    /// DONE written, waiting for the tagged completion.
    DoneSent,
    /// Completion consumed (or the connection died).
    Ended,
}

struct IdleShared {
    phase: Mutex<IdlePhase>,
    notify: Notify,
}

fn lock_phase(shared: &IdleShared) -> std::sync::MutexGuard<'_, IdlePhase> {
    match shared.phase.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Handle for terminating an IDLE from another task.
///
/// Cheap to clone; requesting termination more than once is harmless.
#[derive(Clone)]
pub struct IdleInterrupter {
    shared: Arc<IdleShared>,
}

impl IdleInterrupter {
    /// Asks the idling task to send DONE and return. Idempotent; a no-op
    /// once the session has ended.
    pub fn request_done(&self) {
        let mut phase = lock_phase(&self.shared);
        if *phase == IdlePhase::Active {
            *phase = IdlePhase::DoneRequested;
        }
        drop(phase);
        self.shared.notify.notify_waiters();
    }
}

/// Something that happened while idling.
#[derive(Debug, Clone, PartialEq)]
pub enum IdleEvent {
    /// The server pushed an untagged response. It has already been
    /// dispatched to listeners.
    Update(UntaggedResponse),
    /// `wait` reached its deadline without traffic. The IDLE is still
    /// running; callers typically terminate and re-issue it to stay
    /// inside server inactivity limits.
    Timeout,
    /// An [`IdleInterrupter`] asked for termination. Call
    /// [`IdleSession::done`] next.
    Interrupted,
}

/// An IDLE command in progress.
///
/// Holds the connection exclusively until [`done`](Self::done) runs.
pub struct IdleSession<'a> {
    conn: &'a mut ImapConnection,
    tag: String,
    mailbox: String,
    shared: Arc<IdleShared>,
}

impl ImapConnection {
    /// Starts IDLE in the selected mailbox.
    ///
    /// Fails with [`Error::InvalidState`] when no mailbox is selected and
    /// with [`Error::Protocol`] when the server never advertised IDLE.
    pub async fn idle(&mut self) -> Result<IdleSession<'_>> {
        let mailbox = match self.state() {
            ConnState::Selected(m) => m.clone(),
            other => {
                return Err(Error::InvalidState(format!(
                    "IDLE requires a selected mailbox, state is {other:?}"
                )));
            }
        };
        if !self.has_capability(&Capability::Idle) {
            return Err(Error::Protocol(
                "server does not advertise IDLE".to_string(),
            ));
        }

        let tag = self.tags().next();
        self.write(&Command::Idle.serialize(&tag)).await?;

        // Everything before the continuation is ordinary untagged traffic.
        loop {
            let raw = self.read_timed().await?;
            match ResponseParser::parse(&raw)? {
                Response::Continuation { .. } => break,
                Response::Untagged(u) => {
                    self.ingest(&u);
                    if let UntaggedResponse::Bye { text, .. } = u {
                        self.set_state(ConnState::Closed);
                        return Err(Error::Bye(text));
                    }
                }
                Response::Tagged { tag: t, status, text, .. } if t.as_str() == tag => {
                    // Rejected outright, typically NO or BAD.
                    return Err(Error::Protocol(format!(
                        "IDLE refused: {status:?} {text}"
                    )));
                }
                Response::Tagged { tag: t, .. } => {
                    warn!(got = %t, "stray tagged response before IDLE continuation");
                }
            }
        }

        debug!(mailbox = %mailbox, %tag, "idling");
        self.set_state(ConnState::Idling(mailbox.clone()));
        Ok(IdleSession {
            conn: self,
            tag,
            mailbox,
            shared: Arc::new(IdleShared {
                phase: Mutex::new(IdlePhase::Active),
                notify: Notify::new(),
            }),
        })
    }
}

impl IdleSession<'_> {
    /// Handle other tasks can use to terminate this IDLE.
    #[must_use]
    pub fn interrupter(&self) -> IdleInterrupter {
        IdleInterrupter {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Waits for the next event, up to `max_wait`.
    ///
    /// Untagged responses are dispatched before being returned. After
    /// [`IdleEvent::Interrupted`] the caller should call
    /// [`done`](Self::done); after [`IdleEvent::Timeout`] it may keep
    /// waiting or terminate.
    pub async fn wait(&mut self, max_wait: Duration) -> Result<IdleEvent> {
        if *lock_phase(&self.shared) != IdlePhase::Active {
            return Ok(IdleEvent::Interrupted);
        }

        loop {
            tokio::select! {
                raw = self.conn.framed().read_response() => {
                    let raw = match raw {
                        Ok(raw) => raw,
                        Err(e) => {
                            self.fail();
                            return Err(e);
                        }
                    };
                    match ResponseParser::parse(&raw)? {
                        Response::Untagged(u) => {
                            self.conn.ingest(&u);
                            return match u {
                                UntaggedResponse::Bye { text, .. } => {
                                    self.fail();
                                    Err(Error::Bye(text))
                                }
                                other => Ok(IdleEvent::Update(other)),
                            };
                        }
                        other => {
                            warn!(?other, "unexpected response during IDLE");
                        }
                    }
                }
                () = self.shared.notify.notified() => {
                    return Ok(IdleEvent::Interrupted);
                }
                () = tokio::time::sleep(max_wait) => {
                    return Ok(IdleEvent::Timeout);
                }
            }
        }
    }

    /// Terminates the IDLE: sends DONE (once), drains to the tagged
    /// completion, and returns the connection to its selected state.
    ///
    /// Safe to call after the server already said BYE; the session is
    /// simply over.
    pub async fn done(self) -> Result<()> {
        if self.conn.state() == &ConnState::Closed {
            let mut phase = lock_phase(&self.shared);
            *phase = IdlePhase::Ended;
            return Ok(());
        }

        {
            let mut phase = lock_phase(&self.shared);
            match *phase {
                IdlePhase::Ended => return Ok(()),
                IdlePhase::DoneSent => {}
                IdlePhase::Active | IdlePhase::DoneRequested => {
                    *phase = IdlePhase::DoneSent;
                }
            }
        }

        self.conn.write(&Command::Done.serialize("")).await?;

        loop {
            let raw = self.conn.read_timed().await?;
            match ResponseParser::parse(&raw)? {
                Response::Tagged { tag: t, .. } if t.as_str() == self.tag => {
                    *lock_phase(&self.shared) = IdlePhase::Ended;
                    self.conn
                        .set_state(ConnState::Selected(self.mailbox.clone()));
                    debug!(mailbox = %self.mailbox, "IDLE terminated");
                    return Ok(());
                }
                Response::Untagged(u) => {
                    self.conn.ingest(&u);
                    if let UntaggedResponse::Bye { .. } = u {
                        *lock_phase(&self.shared) = IdlePhase::Ended;
                        self.conn.set_state(ConnState::Closed);
                        // The server ended the session for us.
                        return Ok(());
                    }
                }
                other => {
                    warn!(?other, "unexpected response while terminating IDLE");
                }
            }
        }
    }

    fn fail(&mut self) {
        *lock_phase(&self.shared) = IdlePhase::Ended;
        self.conn.set_state(ConnState::Closed);
    }
}
