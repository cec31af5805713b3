use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{JobqError, Result};
use crate::scheduler::job::{Job, JobStatus};

/// Authoritative registry of every job the process has accepted.
///
/// The outer map is only locked to look up or insert records; each record
/// carries its own lock so state transitions for a single job are serialised
/// without blocking unrelated jobs.
pub struct JobStore {
    jobs: RwLock<HashMap<String, Arc<RwLock<Job>>>>,
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, job: Job) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(JobqError::DuplicateId(job.id));
        }
        jobs.insert(job.id.clone(), Arc::new(RwLock::new(job)));
        Ok(())
    }

    /// Snapshot of the record for `id`.
    pub async fn get(&self, id: &str) -> Result<Job> {
        let record = {
            let jobs = self.jobs.read().await;
            jobs.get(id).cloned()
        };
        match record {
            Some(record) => Ok(record.read().await.clone()),
            None => Err(JobqError::NotFound(id.to_string())),
        }
    }

    /// Apply `mutate` under the record's exclusive lock and return the new
    /// value. Concurrent mutations of the same job cannot interleave.
    pub async fn update<F>(&self, id: &str, mutate: F) -> Result<Job>
    where
        F: FnOnce(&mut Job),
    {
        let record = {
            let jobs = self.jobs.read().await;
            jobs.get(id).cloned()
        };
        let record = record.ok_or_else(|| JobqError::NotFound(id.to_string()))?;
        let mut job = record.write().await;
        mutate(&mut job);
        Ok(job.clone())
    }

    /// Coherent snapshot of all records matching `filter`, newest first.
    /// `total` counts matches before pagination is applied.
    pub async fn list(
        &self,
        filter: Option<JobStatus>,
        limit: usize,
        offset: usize,
    ) -> (Vec<Job>, usize) {
        let jobs = self.jobs.read().await;
        let mut matched = Vec::with_capacity(jobs.len());
        for record in jobs.values() {
            let job = record.read().await;
            if filter.is_none() || filter == Some(job.status) {
                matched.push(job.clone());
            }
        }
        drop(jobs);

        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        let total = matched.len();
        let items = matched.into_iter().skip(offset).take(limit).collect();
        (items, total)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Drop every record. Test-only escape hatch.
    pub async fn clear(&self) -> usize {
        let mut jobs = self.jobs.write().await;
        let removed = jobs.len();
        jobs.clear();
        removed
    }
}
