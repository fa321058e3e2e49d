//! Untagged-response dispatch.
//!
//! Every untagged response a connection reads is offered to the registered
//! listeners exactly once, in wire order, before the command that was in
//! flight returns. The listener for the currently selected mailbox is
//! consulted first; the remaining listeners follow in registration order,
//! and the first to claim a response stops propagation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tracing::{debug, trace};

use crate::parser::response::{FetchItem, UntaggedResponse};
use crate::types::{Flags, SeqNum, Uid};

/// A listener's verdict on one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Consumed; later listeners are not consulted.
    Claimed,
    /// Not of interest; propagation continues.
    Ignored,
}

/// Receives untagged responses from a connection.
///
/// Implementations must not block: they run on the connection's read path.
/// Interior mutability is the listener's own business.
pub trait ResponseListener: Send + Sync {
    /// Offers one response.
    fn on_response(&self, response: &UntaggedResponse) -> Dispatch;
}

/// Ordered listener registry for one connection.
///
/// Besides the general registry, the dispatcher holds one slot for the
/// listener of the currently selected mailbox. A connection only ever has
/// one mailbox selected, so installing a new folder listener replaces the
/// previous one; a stale folder can never swallow another folder's
/// updates after the connection re-selects.
#[derive(Default)]
pub struct Dispatcher {
    folder: Mutex<Option<Arc<dyn ResponseListener>>>,
    listeners: Mutex<Vec<Arc<dyn ResponseListener>>>,
}

impl Dispatcher {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener. Registering the same listener twice is a no-op.
    pub fn register(&self, listener: Arc<dyn ResponseListener>) {
        let mut listeners = lock_unpoisoned(&self.listeners);
        if !listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            listeners.push(listener);
        }
    }

    /// Removes a listener by identity.
    pub fn unregister(&self, listener: &Arc<dyn ResponseListener>) {
        lock_unpoisoned(&self.listeners).retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Installs the listener for the selected mailbox, replacing any
    /// previous one. The replaced listener stops receiving immediately.
    pub fn set_folder(&self, listener: Arc<dyn ResponseListener>) {
        *lock_unpoisoned(&self.folder) = Some(listener);
    }

    /// Clears the selected-mailbox slot, for CLOSE and logout.
    pub fn clear_folder(&self) {
        *lock_unpoisoned(&self.folder) = None;
    }

    /// Offers a response to the selected-mailbox listener, then to each
    /// registered listener, until one claims it.
    ///
    /// Listeners run outside the registry lock, so they may register or
    /// unregister re-entrantly.
    pub fn notify(&self, response: &UntaggedResponse) -> Dispatch {
        let folder = lock_unpoisoned(&self.folder).clone();
        if let Some(listener) = folder {
            if listener.on_response(response) == Dispatch::Claimed {
                trace!(?response, "untagged response claimed by the selected folder");
                return Dispatch::Claimed;
            }
        }

        let snapshot = lock_unpoisoned(&self.listeners).clone();
        for listener in &snapshot {
            if listener.on_response(response) == Dispatch::Claimed {
                trace!(?response, "untagged response claimed");
                return Dispatch::Claimed;
            }
        }
        trace!(?response, "untagged response unclaimed");
        Dispatch::Ignored
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.listeners).len()
    }

    /// Whether no listeners are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Listener that logs each response at debug level and never claims.
#[derive(Debug, Default)]
pub struct LoggingListener;

impl ResponseListener for LoggingListener {
    fn on_response(&self, response: &UntaggedResponse) -> Dispatch {
        debug!(?response, "untagged response");
        Dispatch::Ignored
    }
}

/// Listener that records every response it sees, for tests and polling
/// consumers.
#[derive(Default)]
pub struct CollectingListener {
    responses: Mutex<Vec<UntaggedResponse>>,
}

impl CollectingListener {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drains the recorded responses.
    #[must_use]
    pub fn take(&self) -> Vec<UntaggedResponse> {
        std::mem::take(&mut lock_unpoisoned(&self.responses))
    }
}

impl ResponseListener for CollectingListener {
    fn on_response(&self, response: &UntaggedResponse) -> Dispatch {
        lock_unpoisoned(&self.responses).push(response.clone());
        Dispatch::Ignored
    }
}

#[derive(Debug, Default)]
struct FolderStateInner {
    exists: u32,
    recent: u32,
    flags: Flags,
    uid_map: BTreeMap<u32, Uid>,
    flag_cache: BTreeMap<u32, Flags>,
}

impl FolderStateInner {
    /// Removes the expunged message and renumbers everything above it.
    fn expunge(&mut self, seq: SeqNum) {
        let seq = seq.get();
        self.uid_map.remove(&seq);
        self.flag_cache.remove(&seq);

        let shift_uid: Vec<u32> = self.uid_map.range(seq..).map(|(k, _)| *k).collect();
        for k in shift_uid {
            if let Some(v) = self.uid_map.remove(&k) {
                self.uid_map.insert(k - 1, v);
            }
        }
        let shift_flags: Vec<u32> = self.flag_cache.range(seq..).map(|(k, _)| *k).collect();
        for k in shift_flags {
            if let Some(v) = self.flag_cache.remove(&k) {
                self.flag_cache.insert(k - 1, v);
            }
        }

        self.exists = self.exists.saturating_sub(1);
    }
}

/// Live view of the selected mailbox, fed by untagged responses.
///
/// All mutation happens under one internal lock; the listener callback
/// takes no other lock, so dispatch can never deadlock against readers.
pub struct FolderState {
    name: String,
    inner: Mutex<FolderStateInner>,
}

impl FolderState {
    /// Creates a view for the named mailbox.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(FolderStateInner::default()),
        }
    }

    /// Mailbox name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current message count.
    #[must_use]
    pub fn message_count(&self) -> u32 {
        lock_unpoisoned(&self.inner).exists
    }

    /// Current recent count.
    #[must_use]
    pub fn recent_count(&self) -> u32 {
        lock_unpoisoned(&self.inner).recent
    }

    /// Flags applicable in the mailbox.
    #[must_use]
    pub fn applicable_flags(&self) -> Flags {
        lock_unpoisoned(&self.inner).flags.clone()
    }

    /// UID of the message at a sequence number, if seen.
    #[must_use]
    pub fn uid_for(&self, seq: SeqNum) -> Option<Uid> {
        lock_unpoisoned(&self.inner).uid_map.get(&seq.get()).copied()
    }

    /// Cached flags of the message at a sequence number, if seen.
    #[must_use]
    pub fn flags_for(&self, seq: SeqNum) -> Option<Flags> {
        lock_unpoisoned(&self.inner)
            .flag_cache
            .get(&seq.get())
            .cloned()
    }

    /// Primes the view from a SELECT result.
    pub(crate) fn reset(&self, exists: u32, recent: u32, flags: Flags) {
        let mut inner = lock_unpoisoned(&self.inner);
        *inner = FolderStateInner {
            exists,
            recent,
            flags,
            ..FolderStateInner::default()
        };
    }
}

impl ResponseListener for FolderState {
    fn on_response(&self, response: &UntaggedResponse) -> Dispatch {
        let mut inner = lock_unpoisoned(&self.inner);
        match response {
            UntaggedResponse::Exists(n) => {
                inner.exists = *n;
                Dispatch::Claimed
            }
            UntaggedResponse::Recent(n) => {
                inner.recent = *n;
                Dispatch::Claimed
            }
            UntaggedResponse::Flags(flags) => {
                inner.flags = flags.clone();
                Dispatch::Claimed
            }
            UntaggedResponse::Expunge(seq) => {
                inner.expunge(*seq);
                Dispatch::Claimed
            }
            UntaggedResponse::Fetch { seq, items } => {
                for item in items {
                    match item {
                        FetchItem::Uid(uid) => {
                            inner.uid_map.insert(seq.get(), *uid);
                        }
                        FetchItem::Flags(flags) => {
                            inner.flag_cache.insert(seq.get(), flags.clone());
                        }
                        _ => {}
                    }
                }
                Dispatch::Claimed
            }
            _ => Dispatch::Ignored,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Flag;

    fn exists(n: u32) -> UntaggedResponse {
        UntaggedResponse::Exists(n)
    }

    fn seq(n: u32) -> SeqNum {
        SeqNum::new(n).unwrap()
    }

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    fn fetch_uid(s: u32, u: u32) -> UntaggedResponse {
        UntaggedResponse::Fetch {
            seq: seq(s),
            items: vec![FetchItem::Uid(uid(u))],
        }
    }

    #[test]
    fn claim_stops_propagation() {
        let dispatcher = Dispatcher::new();
        let folder = Arc::new(FolderState::new("INBOX"));
        let collector = Arc::new(CollectingListener::new());
        dispatcher.register(folder.clone());
        dispatcher.register(collector.clone());

        assert_eq!(dispatcher.notify(&exists(5)), Dispatch::Claimed);
        assert_eq!(folder.message_count(), 5);
        // The folder claimed it first; the collector saw nothing.
        assert!(collector.take().is_empty());
    }

    #[test]
    fn unclaimed_responses_reach_later_listeners() {
        let dispatcher = Dispatcher::new();
        let folder = Arc::new(FolderState::new("INBOX"));
        let collector = Arc::new(CollectingListener::new());
        dispatcher.register(folder);
        dispatcher.register(collector.clone());

        let other = UntaggedResponse::Other {
            keyword: "XPING".into(),
            data: vec![],
        };
        assert_eq!(dispatcher.notify(&other), Dispatch::Ignored);
        assert_eq!(collector.take(), vec![other]);
    }

    #[test]
    fn replacing_the_folder_listener_redirects_updates() {
        let dispatcher = Dispatcher::new();
        let inbox = Arc::new(FolderState::new("INBOX"));
        let archive = Arc::new(FolderState::new("Archive"));

        dispatcher.set_folder(inbox.clone());
        assert_eq!(dispatcher.notify(&exists(5)), Dispatch::Claimed);

        // Re-selecting installs the new folder; the old one must not see
        // the new mailbox's traffic.
        dispatcher.set_folder(archive.clone());
        assert_eq!(dispatcher.notify(&exists(7)), Dispatch::Claimed);

        assert_eq!(inbox.message_count(), 5);
        assert_eq!(archive.message_count(), 7);

        dispatcher.clear_folder();
        assert_eq!(dispatcher.notify(&exists(9)), Dispatch::Ignored);
        assert_eq!(archive.message_count(), 7);
    }

    #[test]
    fn duplicate_registration_is_ignored() {
        let dispatcher = Dispatcher::new();
        let collector: Arc<dyn ResponseListener> = Arc::new(CollectingListener::new());
        dispatcher.register(collector.clone());
        dispatcher.register(collector.clone());
        assert_eq!(dispatcher.len(), 1);

        dispatcher.unregister(&collector);
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn expunge_renumbers_uid_map() {
        let folder = FolderState::new("INBOX");
        let _ = folder.on_response(&exists(3));
        let _ = folder.on_response(&fetch_uid(1, 101));
        let _ = folder.on_response(&fetch_uid(2, 102));
        let _ = folder.on_response(&fetch_uid(3, 103));

        let _ = folder.on_response(&UntaggedResponse::Expunge(seq(2)));

        assert_eq!(folder.message_count(), 2);
        assert_eq!(folder.uid_for(seq(1)), Some(uid(101)));
        // Message 3 slid down into slot 2.
        assert_eq!(folder.uid_for(seq(2)), Some(uid(103)));
        assert_eq!(folder.uid_for(seq(3)), None);
    }

    #[test]
    fn fetch_updates_flag_cache() {
        let folder = FolderState::new("INBOX");
        let _ = folder.on_response(&UntaggedResponse::Fetch {
            seq: seq(4),
            items: vec![FetchItem::Flags(Flags::from_vec(vec![Flag::Seen]))],
        });
        assert!(folder.flags_for(seq(4)).unwrap().contains(&Flag::Seen));
    }
}
