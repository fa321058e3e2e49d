//! Session layer: a pooled store and folder handles over it.
//!
//! A [`Store`] owns a connection pool to one server; a [`Folder`] is a
//! lightweight handle that checks out a connection per operation, selects
//! its mailbox when needed, and keeps a [`FolderState`] view current via
//! the dispatch path.

#![allow(clippy::missing_errors_doc)]

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::auth;
use crate::command::{Command, FetchItems, SearchCriteria, StatusAttribute, StoreAction};
use crate::conn::config::{Config, Security};
use crate::conn::driver::{ConnState, ImapConnection};
use crate::conn::idle::{IdleEvent, IdleInterrupter};
use crate::dispatch::FolderState;
use crate::parser::response::{FetchItem, StatusItem, UntaggedResponse};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::types::{Capability, ListEntry, MailboxStatus, SeqNum, SequenceSet};
use crate::{Error, Result};

struct StoreShared {
    pool: ConnectionPool,
}

/// A pooled session with one IMAP server.
#[derive(Clone)]
pub struct Store {
    shared: Arc<StoreShared>,
}

impl Store {
    /// Connects, secures, and authenticates. One connection is opened
    /// eagerly so configuration and credential problems surface here
    /// rather than on first use.
    pub async fn connect(config: Config) -> Result<Self> {
        let max = config.pool_size;
        let acquire_timeout = config.acquire_timeout;
        let config = Arc::new(config);
        let pool = ConnectionPool::new(
            max,
            acquire_timeout,
            Box::new(move || {
                let config = Arc::clone(&config);
                Box::pin(async move { open_session(&config).await })
            }),
        );

        let store = Self {
            shared: Arc::new(StoreShared { pool }),
        };
        drop(store.shared.pool.acquire().await?);
        Ok(store)
    }

    /// Handle to a mailbox. No traffic until the first operation.
    #[must_use]
    pub fn folder(&self, name: impl Into<String>) -> Folder {
        let name = name.into();
        Folder {
            shared: Arc::clone(&self.shared),
            state: Arc::new(FolderState::new(name)),
        }
    }

    /// Lists mailboxes matching `pattern` under `reference`.
    pub async fn list(&self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        let mut conn = self.shared.pool.acquire().await?;
        let result = conn
            .command(&Command::List {
                reference: reference.to_string(),
                pattern: pattern.to_string(),
            })
            .await?
            .ok()?;
        Ok(result
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                UntaggedResponse::List(entry) => Some(entry),
                _ => None,
            })
            .collect())
    }

    /// STATUS of a mailbox without selecting it.
    pub async fn status(
        &self,
        mailbox: &str,
        items: &[StatusAttribute],
    ) -> Result<Vec<StatusItem>> {
        let mut conn = self.shared.pool.acquire().await?;
        let result = conn
            .command(&Command::Status {
                mailbox: mailbox.to_string(),
                items: items.to_vec(),
            })
            .await?
            .ok()?;
        for u in result.untagged {
            if let UntaggedResponse::Status { items, .. } = u {
                return Ok(items);
            }
        }
        Ok(Vec::new())
    }

    /// Logs out every idle connection and shuts the store down.
    ///
    /// The first failure becomes the primary error; failures from the
    /// remaining connections are attached as cleanup errors.
    pub async fn close(self) -> Result<()> {
        let mut first: Option<Error> = None;
        for mut conn in self.shared.pool.drain_idle() {
            if let Err(e) = conn.logout().await {
                warn!(error = %e, "logout during store close failed");
                first = Some(match first {
                    None => e,
                    Some(primary) => primary.with_cleanup(e),
                });
            }
        }
        match first {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

/// Handle to one mailbox on a [`Store`].
#[derive(Clone)]
pub struct Folder {
    shared: Arc<StoreShared>,
    state: Arc<FolderState>,
}

impl Folder {
    /// Mailbox name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.state.name()
    }

    /// Opens the mailbox and returns its status snapshot.
    pub async fn open(&self, read_only: bool) -> Result<MailboxStatus> {
        let mut conn = self.shared.pool.acquire().await?;
        let status = self.select_on(&mut conn, read_only).await?;
        Ok(status)
    }

    /// Message count from the live view.
    #[must_use]
    pub fn message_count(&self) -> u32 {
        self.state.message_count()
    }

    /// Recent count from the live view.
    #[must_use]
    pub fn recent_count(&self) -> u32 {
        self.state.recent_count()
    }

    /// The live view itself, for direct inspection.
    #[must_use]
    pub fn state(&self) -> &Arc<FolderState> {
        &self.state
    }

    /// FETCH over the mailbox. Returns per-message items in wire order;
    /// the live view absorbs flag and UID data as a side effect.
    pub async fn fetch(
        &self,
        sequence: SequenceSet,
        items: FetchItems,
        uid: bool,
    ) -> Result<Vec<(SeqNum, Vec<FetchItem>)>> {
        let mut conn = self.checkout(false).await?;
        let result = conn
            .command(&Command::Fetch {
                sequence,
                items,
                uid,
            })
            .await?
            .ok()?;
        Ok(collect_fetches(result.untagged))
    }

    /// STORE flag changes. Unless `silent`, the server's echoing FETCH
    /// responses are returned.
    pub async fn store_flags(
        &self,
        sequence: SequenceSet,
        action: StoreAction,
        uid: bool,
        silent: bool,
    ) -> Result<Vec<(SeqNum, Vec<FetchItem>)>> {
        let mut conn = self.checkout(false).await?;
        let result = conn
            .command(&Command::Store {
                sequence,
                action,
                uid,
                silent,
            })
            .await?
            .ok()?;
        Ok(collect_fetches(result.untagged))
    }

    /// SEARCH the mailbox.
    pub async fn search(&self, criteria: SearchCriteria, uid: bool) -> Result<Vec<SeqNum>> {
        let mut conn = self.checkout(false).await?;
        let result = conn
            .command(&Command::Search { criteria, uid })
            .await?
            .ok()?;
        let mut hits = Vec::new();
        for u in result.untagged {
            if let UntaggedResponse::Search(seqs) = u {
                hits.extend(seqs);
            }
        }
        Ok(hits)
    }

    /// EXPUNGE deleted messages, returning the expunged sequence numbers
    /// in server order.
    pub async fn expunge(&self) -> Result<Vec<SeqNum>> {
        let mut conn = self.checkout(false).await?;
        let result = conn.command(&Command::Expunge).await?.ok()?;
        Ok(result
            .untagged
            .into_iter()
            .filter_map(|u| match u {
                UntaggedResponse::Expunge(seq) => Some(seq),
                _ => None,
            })
            .collect())
    }

    /// CLOSE the mailbox, expunging silently.
    pub async fn close(&self) -> Result<()> {
        let mut conn = self.checkout(false).await?;
        let _ = conn.command(&Command::Close).await?.ok()?;
        conn.dispatcher().clear_folder();
        conn.set_state(ConnState::Authenticated);
        Ok(())
    }

    /// Idles until the server pushes an update, `max_wait` elapses, or an
    /// interrupter fires, then terminates the IDLE and returns the first
    /// event. `on_start` receives an interrupt handle before waiting
    /// begins.
    pub async fn idle_with<F>(&self, max_wait: Duration, on_start: F) -> Result<IdleEvent>
    where
        F: FnOnce(IdleInterrupter),
    {
        let mut conn = self.checkout(false).await?;
        let mut session = conn.idle().await?;
        on_start(session.interrupter());
        let event = session.wait(max_wait).await?;
        session.done().await?;
        Ok(event)
    }

    /// [`idle_with`](Self::idle_with) without an interrupt handle.
    pub async fn idle(&self, max_wait: Duration) -> Result<IdleEvent> {
        self.idle_with(max_wait, |_| {}).await
    }

    /// Checks out a connection with this mailbox selected and the live
    /// view registered on its dispatch path.
    async fn checkout(&self, read_only: bool) -> Result<PooledConnection> {
        let mut conn = self.shared.pool.acquire().await?;
        let already_selected = matches!(
            conn.state(),
            ConnState::Selected(m) if m == self.state.name()
        );
        if already_selected {
            conn.dispatcher().set_folder(self.state.clone());
        } else {
            let _ = self.select_on(&mut conn, read_only).await?;
        }
        Ok(conn)
    }

    async fn select_on(
        &self,
        conn: &mut ImapConnection,
        read_only: bool,
    ) -> Result<MailboxStatus> {
        // Install before SELECT so its untagged responses flow into the
        // view, displacing whichever folder held the connection last;
        // reset afterwards to drop state from any previous epoch.
        conn.dispatcher().set_folder(self.state.clone());
        let status = conn.select(self.state.name(), read_only).await?;
        self.state
            .reset(status.exists, status.recent, status.flags.clone());
        debug!(mailbox = %self.state.name(), exists = status.exists, "mailbox opened");
        Ok(status)
    }
}

/// Establishes, secures, and authenticates one connection.
async fn open_session(config: &Config) -> Result<ImapConnection> {
    let mut conn = ImapConnection::connect(config).await?;

    if config.security == Security::StartTls && !conn.is_tls() {
        if conn.capabilities().is_empty() {
            conn.refresh_capabilities().await?;
        }
        if conn.has_capability(&Capability::StartTls) {
            conn.starttls(config).await?;
        } else if config.require_starttls {
            return Err(Error::Protocol(
                "server does not offer STARTTLS".to_string(),
            ));
        } else {
            warn!(host = %config.host, "continuing plaintext, STARTTLS not offered");
        }
    }

    if conn.state() == &ConnState::Connected {
        auth::authenticate(&mut conn, config).await?;
    }
    Ok(conn)
}

fn collect_fetches(untagged: Vec<UntaggedResponse>) -> Vec<(SeqNum, Vec<FetchItem>)> {
    untagged
        .into_iter()
        .filter_map(|u| match u {
            UntaggedResponse::Fetch { seq, items } => Some((seq, items)),
            _ => None,
        })
        .collect()
}
