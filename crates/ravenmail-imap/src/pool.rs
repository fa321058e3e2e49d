//! Bounded connection pool.
//!
//! Connections are created lazily through a factory, handed out one owner
//! at a time, and probed with NOOP on reuse so a dead connection is never
//! returned. At most `max` connections exist at once; when all are out,
//! `acquire` waits up to the acquire timeout for a return.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::command::Command;
use crate::conn::driver::ImapConnection;
use crate::{Error, Result};

/// Creates a ready-to-use (established and authenticated) connection.
pub type ConnectionFactory = Box<
    dyn Fn() -> Pin<Box<dyn Future<Output = Result<ImapConnection>> + Send>> + Send + Sync,
>;

struct PoolState {
    free: Vec<ImapConnection>,
    in_use: usize,
}

struct PoolShared {
    max: usize,
    acquire_timeout: Duration,
    state: Mutex<PoolState>,
    returned: Notify,
    factory: ConnectionFactory,
}

fn lock_state(shared: &PoolShared) -> std::sync::MutexGuard<'_, PoolState> {
    match shared.state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Pool of authenticated connections to one server.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Creates an empty pool. `max` is clamped to at least one.
    #[must_use]
    pub fn new(max: usize, acquire_timeout: Duration, factory: ConnectionFactory) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                max: max.max(1),
                acquire_timeout,
                state: Mutex::new(PoolState {
                    free: Vec::new(),
                    in_use: 0,
                }),
                returned: Notify::new(),
                factory,
            }),
        }
    }

    /// Checks out a connection, creating one if under the limit.
    ///
    /// Reused connections are probed with NOOP first; a probe failure
    /// evicts the connection and the search continues. Waiting past the
    /// acquire timeout fails with [`Error::Timeout`].
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let deadline = Instant::now() + self.shared.acquire_timeout;

        loop {
            enum Plan {
                Reuse(ImapConnection),
                Create,
                Wait,
            }

            let plan = {
                let mut state = lock_state(&self.shared);
                if let Some(conn) = state.free.pop() {
                    state.in_use += 1;
                    Plan::Reuse(conn)
                } else if state.in_use < self.shared.max {
                    // Reserve the slot before the (slow) factory call so
                    // concurrent acquires cannot overshoot the limit.
                    state.in_use += 1;
                    Plan::Create
                } else {
                    Plan::Wait
                }
            };

            match plan {
                Plan::Reuse(mut conn) => {
                    if !conn.is_usable() {
                        trace!("evicting dead pooled connection");
                        self.release_slot();
                        continue;
                    }
                    match conn.command(&Command::Noop).await {
                        Ok(_) => {
                            trace!("reusing pooled connection");
                            return Ok(PooledConnection {
                                conn: Some(conn),
                                shared: Arc::clone(&self.shared),
                            });
                        }
                        Err(e) => {
                            debug!(error = %e, "liveness probe failed, evicting");
                            self.release_slot();
                        }
                    }
                }
                Plan::Create => match (self.shared.factory)().await {
                    Ok(conn) => {
                        debug!("opened new pooled connection");
                        return Ok(PooledConnection {
                            conn: Some(conn),
                            shared: Arc::clone(&self.shared),
                        });
                    }
                    Err(e) => {
                        self.release_slot();
                        return Err(e);
                    }
                },
                Plan::Wait => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(Error::Timeout(self.shared.acquire_timeout));
                    }
                    if tokio::time::timeout(remaining, self.shared.returned.notified())
                        .await
                        .is_err()
                    {
                        return Err(Error::Timeout(self.shared.acquire_timeout));
                    }
                }
            }
        }
    }

    /// Removes every idle connection from the pool and hands it over, for
    /// orderly shutdown. Checked-out connections are unaffected.
    #[must_use]
    pub fn drain_idle(&self) -> Vec<ImapConnection> {
        std::mem::take(&mut lock_state(&self.shared).free)
    }

    /// Number of idle connections currently pooled.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        lock_state(&self.shared).free.len()
    }

    /// Number of connections currently checked out.
    #[must_use]
    pub fn in_use_count(&self) -> usize {
        lock_state(&self.shared).in_use
    }

    fn release_slot(&self) {
        let mut state = lock_state(&self.shared);
        state.in_use = state.in_use.saturating_sub(1);
        drop(state);
        self.shared.returned.notify_one();
    }
}

/// A checked-out connection; returns to the pool on drop.
///
/// A connection that died while checked out is discarded instead of
/// returned.
pub struct PooledConnection {
    conn: Option<ImapConnection>,
    shared: Arc<PoolShared>,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    /// Permanently removes this connection from the pool, for example to
    /// dedicate it to a long-lived IDLE.
    #[must_use]
    pub fn detach(mut self) -> ImapConnection {
        // Drop still runs and frees the slot; the connection just never
        // goes back.
        self.conn
            .take()
            .unwrap_or_else(|| unreachable!("connection taken twice"))
    }
}

impl Deref for PooledConnection {
    type Target = ImapConnection;

    fn deref(&self) -> &Self::Target {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("connection accessed after detach"),
        }
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("connection accessed after detach"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let mut state = lock_state(&self.shared);
        state.in_use = state.in_use.saturating_sub(1);
        if let Some(conn) = self.conn.take() {
            if conn.is_usable() {
                state.free.push(conn);
            } else {
                warn!("discarding dead connection instead of pooling it");
            }
        }
        drop(state);
        self.shared.returned.notify_one();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::conn::config::Config;
    use crate::conn::stream::ImapStream;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // A connection over a closed stream: state says usable, but any
    // probe I/O fails. Good enough to exercise accounting and eviction.
    fn hollow_factory(created: Arc<AtomicUsize>) -> ConnectionFactory {
        Box::new(move || {
            let created = created.clone();
            Box::pin(async move {
                created.fetch_add(1, Ordering::SeqCst);
                let config = Config::builder("imap.example.com").build();
                Ok(ImapConnection::from_stream(ImapStream::Closed, &config))
            })
        })
    }

    #[tokio::test]
    async fn fresh_connections_skip_the_probe() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::new(
            2,
            Duration::from_secs(1),
            hollow_factory(created.clone()),
        );

        let conn = pool.acquire().await.unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(pool.in_use_count(), 1);
        drop(conn);
        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.idle_count(), 1);
    }

    #[tokio::test]
    async fn failed_probe_evicts_and_creates_anew() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::new(
            2,
            Duration::from_secs(1),
            hollow_factory(created.clone()),
        );

        drop(pool.acquire().await.unwrap());
        assert_eq!(pool.idle_count(), 1);

        // The pooled connection's NOOP probe fails on its closed stream,
        // so acquire falls through to the factory.
        let _conn = pool.acquire().await.unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(pool.idle_count(), 0);
        assert_eq!(pool.in_use_count(), 1);
    }

    #[tokio::test]
    async fn factory_failure_frees_the_slot() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in = calls.clone();
        let factory: ConnectionFactory = Box::new(move || {
            let calls = calls_in.clone();
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Protocol("refused".to_string()))
            })
        });
        let pool = ConnectionPool::new(1, Duration::from_secs(1), factory);

        assert!(pool.acquire().await.is_err());
        assert_eq!(pool.in_use_count(), 0);
        // The slot was released, so the next attempt reaches the factory
        // again instead of waiting for the timeout.
        assert!(pool.acquire().await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_pool_times_out() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::new(
            1,
            Duration::from_millis(50),
            hollow_factory(created),
        );

        let held = pool.acquire().await.unwrap();
        match pool.acquire().await {
            Err(Error::Timeout(_)) => {}
            other => panic!("expected acquire timeout, got {other:?}"),
        }
        drop(held);
    }

    #[tokio::test]
    async fn detach_removes_the_connection_for_good() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::new(
            2,
            Duration::from_secs(1),
            hollow_factory(created),
        );

        let conn = pool.acquire().await.unwrap();
        let _owned = conn.detach();
        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn drain_idle_empties_the_pool() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = ConnectionPool::new(
            2,
            Duration::from_secs(1),
            hollow_factory(created),
        );

        drop(pool.acquire().await.unwrap());
        let drained = pool.drain_idle();
        assert_eq!(drained.len(), 1);
        assert_eq!(pool.idle_count(), 0);
    }
}
