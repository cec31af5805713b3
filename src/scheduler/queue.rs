use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

use crate::scheduler::job::{Job, Priority};

/// Lightweight reference to a pending job. The store owns the job body; the
/// queue only orders these references.
///
/// Field order drives the derived ordering: priority class first, then age
/// within the class, id as the final tie-break.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueRef {
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub id: String,
}

impl From<&Job> for QueueRef {
    fn from(job: &Job) -> Self {
        Self {
            priority: job.priority,
            created_at: job.created_at,
            id: job.id.clone(),
        }
    }
}

#[derive(Default)]
struct QueueInner {
    ordered: BTreeSet<QueueRef>,
    by_id: HashMap<String, QueueRef>,
}

/// Ordered set of pending job references. A pushed-back reference keeps its
/// original `created_at`, so it lands ahead of any concurrently enqueued peer
/// of the same priority.
pub struct PendingQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
        }
    }

    pub async fn push(&self, job_ref: QueueRef) {
        let mut inner = self.inner.lock().await;
        inner.by_id.insert(job_ref.id.clone(), job_ref.clone());
        inner.ordered.insert(job_ref);
        drop(inner);
        self.notify.notify_one();
    }

    /// Take the highest-priority, oldest reference.
    pub async fn pop_front(&self) -> Option<QueueRef> {
        let mut inner = self.inner.lock().await;
        let front = inner.ordered.iter().next().cloned()?;
        inner.ordered.remove(&front);
        inner.by_id.remove(&front.id);
        Some(front)
    }

    /// Drop the reference for `id`, if queued. Used when a pending job is
    /// cancelled.
    pub async fn remove(&self, id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.by_id.remove(id) {
            Some(job_ref) => {
                inner.ordered.remove(&job_ref);
                true
            }
            None => false,
        }
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.lock().await.by_id.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.ordered.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.ordered.is_empty()
    }

    pub async fn clear(&self) -> usize {
        let mut inner = self.inner.lock().await;
        let drained = inner.ordered.len();
        inner.ordered.clear();
        inner.by_id.clear();
        drained
    }

    /// Resolves once a reference has been pushed. Backed by a single stored
    /// permit, so a push while nobody is waiting still wakes the next waiter.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
