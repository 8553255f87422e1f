//! Bounded operation queues
//!
//! A [`BoundedOperationQueue`] admits restore or delete work in FIFO order
//! and caps how many entries are in service at once. The backlog itself is
//! unbounded; the cap is on service concurrency.
//!
//! Membership is tracked from [`push`](BoundedOperationQueue::push) until the
//! [`ServiceLease`] for the entry is dropped, so an entry that has been taken
//! off the backlog but is still running is still reported by
//! [`contains`](BoundedOperationQueue::contains). A lease dropped by a
//! panicking or cancelled task releases membership the same way as
//! [`complete`](BoundedOperationQueue::complete).

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashSet;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::index::IndexIdentifier;

/// Default idle poll used when no push notification arrives
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Kind of remote operation a queue serializes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Restore from snapshot
    Restore,
    /// Delete a live index
    Delete,
}

impl OperationKind {
    /// Lowercase label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Restore => "restore",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An admitted unit of work
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// Identifier to operate on
    pub identifier: IndexIdentifier,
    /// When the entry was admitted
    pub enqueued_at: Instant,
}

/// Membership and in-service count shared between a queue and its leases
#[derive(Debug)]
struct Membership {
    kind: OperationKind,
    members: DashSet<IndexIdentifier>,
    in_service: AtomicUsize,
}

/// An entry taken into service together with its concurrency slot.
///
/// Dropping the lease drops the identifier's membership and then frees the
/// slot.
#[derive(Debug)]
pub struct ServiceLease {
    entry: QueueEntry,
    membership: Arc<Membership>,
    _permit: OwnedSemaphorePermit,
}

impl ServiceLease {
    /// Identifier being serviced
    pub fn identifier(&self) -> &IndexIdentifier {
        &self.entry.identifier
    }

    /// Entry being serviced
    pub fn entry(&self) -> &QueueEntry {
        &self.entry
    }

    /// Time spent between admission and now
    pub fn age(&self) -> Duration {
        self.entry.enqueued_at.elapsed()
    }
}

impl Drop for ServiceLease {
    fn drop(&mut self) {
        self.membership.members.remove(&self.entry.identifier);
        self.membership.in_service.fetch_sub(1, Ordering::SeqCst);
        debug!(queue = %self.membership.kind, index = %self.entry.identifier, "Completed");
    }
}

/// Point-in-time view of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    /// Queue this view describes
    pub kind: OperationKind,
    /// Entries awaiting service
    pub backlog: usize,
    /// Entries taken into service and not yet released
    pub in_service: usize,
    /// Service cap
    pub max_concurrent: usize,
}

/// FIFO of identifiers with a service concurrency cap
pub struct BoundedOperationQueue {
    kind: OperationKind,
    backlog: Mutex<VecDeque<QueueEntry>>,
    membership: Arc<Membership>,
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    work_available: Notify,
    poll_interval: Duration,
}

impl BoundedOperationQueue {
    /// Create a queue; a `max_concurrent` of zero is treated as one
    pub fn new(kind: OperationKind, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            kind,
            backlog: Mutex::new(VecDeque::new()),
            membership: Arc::new(Membership {
                kind,
                members: DashSet::new(),
                in_service: AtomicUsize::new(0),
            }),
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            work_available: Notify::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the idle poll used as a fallback to push notifications
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Operation this queue serializes
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Service cap after clamping
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Admit `identifier`.
    ///
    /// Returns `false` without changing the queue if the identifier is
    /// already awaiting or in service.
    pub fn push(&self, identifier: IndexIdentifier) -> bool {
        {
            let mut backlog = self.backlog.lock();
            if !self.membership.members.insert(identifier.clone()) {
                return false;
            }
            backlog.push_back(QueueEntry {
                identifier: identifier.clone(),
                enqueued_at: Instant::now(),
            });
        }

        debug!(queue = %self.kind, index = %identifier, "Enqueued");
        self.work_available.notify_one();
        true
    }

    /// True from push until the entry's lease is dropped
    pub fn contains(&self, identifier: &IndexIdentifier) -> bool {
        self.membership.members.contains(identifier)
    }

    /// Number of entries awaiting service
    pub fn count(&self) -> usize {
        self.backlog.lock().len()
    }

    /// True when nothing awaits service
    pub fn is_empty(&self) -> bool {
        self.backlog.lock().is_empty()
    }

    /// Number of entries taken into service and not yet completed
    pub fn in_service(&self) -> usize {
        self.membership.in_service.load(Ordering::SeqCst)
    }

    /// Identifiers awaiting service, in admission order
    pub fn pending(&self) -> Vec<IndexIdentifier> {
        self.backlog
            .lock()
            .iter()
            .map(|entry| entry.identifier.clone())
            .collect()
    }

    /// Point-in-time counts
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            kind: self.kind,
            backlog: self.count(),
            in_service: self.in_service(),
            max_concurrent: self.max_concurrent,
        }
    }

    /// Take the front entry if a service slot and an entry are both available
    pub fn pop(&self) -> Option<ServiceLease> {
        let permit = Arc::clone(&self.slots).try_acquire_owned().ok()?;
        self.take_front(permit).ok()
    }

    /// Wait for a service slot, then for the next entry.
    ///
    /// Wakes on push and falls back to polling every `poll_interval`.
    pub async fn next(&self) -> ServiceLease {
        let mut permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .expect("queue semaphore is never closed");

        loop {
            match self.take_front(permit) {
                Ok(lease) => return lease,
                Err(returned) => permit = returned,
            }
            let _ = tokio::time::timeout(self.poll_interval, self.work_available.notified()).await;
        }
    }

    /// Hand a lease back once its operation has finished
    pub fn complete(&self, lease: ServiceLease) {
        debug_assert!(Arc::ptr_eq(&self.membership, &lease.membership));
        drop(lease);
    }

    fn take_front(&self, permit: OwnedSemaphorePermit) -> Result<ServiceLease, OwnedSemaphorePermit> {
        let mut backlog = self.backlog.lock();
        match backlog.pop_front() {
            Some(entry) => {
                self.membership.in_service.fetch_add(1, Ordering::SeqCst);
                Ok(ServiceLease {
                    entry,
                    membership: Arc::clone(&self.membership),
                    _permit: permit,
                })
            }
            None => Err(permit),
        }
    }
}

impl fmt::Debug for BoundedOperationQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedOperationQueue")
            .field("kind", &self.kind)
            .field("backlog", &self.count())
            .field("in_service", &self.in_service())
            .field("max_concurrent", &self.max_concurrent)
            .finish()
    }
}
