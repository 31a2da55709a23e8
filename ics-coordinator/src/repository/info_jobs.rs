//! Information Jobs registry
//!
//! Jobs are indexed by id, by type and by owner and mirrored to the
//! durable store. Removing a job also stops it in every producer serving
//! its type.

use super::info_producers::InfoProducers;
use super::multimap::MultiMap;
use super::store::EntityStore;
use crate::callbacks::ProducerCallbacks;
use chrono::{SecondsFormat, Utc};
use ics_common::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store directory name for jobs
pub const STORE_KIND: &str = "infojobs";

/// A consumer's standing request for data of one type
#[derive(Debug, Serialize, Deserialize)]
pub struct InfoJob {
    pub id: String,
    /// Never changes once the job exists
    pub type_id: String,
    pub owner: String,
    pub job_data: Value,
    /// Where produced results are delivered
    pub target_url: String,
    /// Where ENABLED/DISABLED notifications are sent
    #[serde(default)]
    pub job_status_url: Option<String>,
    /// RFC 3339 creation time
    pub last_updated: String,
    /// Last status successfully reported to `job_status_url`.
    /// Only the status reconciliation touches this.
    #[serde(default = "reported_enabled_default")]
    last_status_reported_enabled: AtomicBool,
}

fn reported_enabled_default() -> AtomicBool {
    AtomicBool::new(true)
}

impl InfoJob {
    pub fn new(
        id: impl Into<String>,
        type_id: impl Into<String>,
        owner: impl Into<String>,
        job_data: Value,
        target_url: impl Into<String>,
        job_status_url: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            type_id: type_id.into(),
            owner: owner.into(),
            job_data,
            target_url: target_url.into(),
            job_status_url: job_status_url.filter(|url| !url.is_empty()),
            last_updated: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            last_status_reported_enabled: reported_enabled_default(),
        }
    }

    pub fn is_last_status_reported_enabled(&self) -> bool {
        self.last_status_reported_enabled.load(Ordering::SeqCst)
    }

    pub fn set_last_reported_status(&self, enabled: bool) {
        self.last_status_reported_enabled.store(enabled, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct JobIndex {
    all: HashMap<String, Arc<InfoJob>>,
    by_type: MultiMap<Arc<InfoJob>>,
    by_owner: MultiMap<Arc<InfoJob>>,
}

impl JobIndex {
    fn insert(&mut self, job: Arc<InfoJob>) {
        // Full replace: drop the previous definition's index entries first
        if let Some(previous) = self.all.remove(&job.id) {
            self.by_type.remove(&previous.type_id, &previous.id);
            self.by_owner.remove(&previous.owner, &previous.id);
        }
        self.by_type.put(&job.type_id, &job.id, Arc::clone(&job));
        self.by_owner.put(&job.owner, &job.id, Arc::clone(&job));
        self.all.insert(job.id.clone(), job);
    }

    /// Drop whatever is currently stored under `id`, keyed by the stored
    /// entry's type and owner
    fn remove(&mut self, id: &str) -> Option<Arc<InfoJob>> {
        let current = self.all.remove(id)?;
        self.by_type.remove(&current.type_id, &current.id);
        self.by_owner.remove(&current.owner, &current.id);
        Some(current)
    }
}

pub struct InfoJobs {
    index: Mutex<JobIndex>,
    store: EntityStore,
    producer_callbacks: Arc<ProducerCallbacks>,
}

impl InfoJobs {
    pub fn new(store: EntityStore, producer_callbacks: Arc<ProducerCallbacks>) -> Self {
        Self {
            index: Mutex::new(JobIndex::default()),
            store,
            producer_callbacks,
        }
    }

    pub fn restore_from_disk(&self) -> Result<usize> {
        let restored: Vec<InfoJob> = self.store.load_all()?;
        let count = restored.len();
        let mut index = self.index.lock();
        for job in restored {
            index.insert(Arc::new(job));
        }
        info!(count, "Restored information jobs");
        Ok(count)
    }

    /// Insert or fully replace a job and persist it
    pub fn put(&self, job: InfoJob) -> Arc<InfoJob> {
        let job = Arc::new(job);
        let mut index = self.index.lock();
        index.insert(Arc::clone(&job));
        if let Err(e) = self.store.write(&job.id, job.as_ref()) {
            warn!(job_id = %job.id, error = %e, "Could not store job");
        }
        debug!(job_id = %job.id, type_id = %job.type_id, owner = %job.owner, "Stored information job");
        job
    }

    pub fn get(&self, id: &str) -> Option<Arc<InfoJob>> {
        self.index.lock().all.get(id).cloned()
    }

    pub fn get_or_fail(&self, id: &str) -> Result<Arc<InfoJob>> {
        self.get(id)
            .ok_or_else(|| Error::not_found("Information job", id))
    }

    pub fn all(&self) -> Vec<Arc<InfoJob>> {
        self.index.lock().all.values().cloned().collect()
    }

    pub fn jobs_for_type(&self, type_id: &str) -> Vec<Arc<InfoJob>> {
        self.index.lock().by_type.get(type_id)
    }

    pub fn jobs_for_owner(&self, owner: &str) -> Vec<Arc<InfoJob>> {
        self.index.lock().by_owner.get(owner)
    }

    /// Remove a job and stop it in every producer currently serving its
    /// type. Producer calls are fire-and-forget.
    pub fn remove(&self, job: &InfoJob, producers: &InfoProducers) {
        let current = {
            let mut index = self.index.lock();
            let Some(current) = index.remove(&job.id) else {
                return;
            };
            if let Err(e) = self.store.delete(&job.id) {
                warn!(job_id = %job.id, error = %e, "Could not remove file");
            }
            current
        };
        self.producer_callbacks.stop_info_job(&current, producers);
    }

    pub fn len(&self) -> usize {
        self.index.lock().all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut index = self.index.lock();
        index.all.clear();
        index.by_type.clear();
        index.by_owner.clear();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Could not delete database");
        }
    }
}
