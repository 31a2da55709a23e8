//! Information Producers registry
//!
//! Producers are registry-only (not persisted); a restarted producer is
//! expected to register again. The registry owns the type → producer
//! index and drives the (re)registration protocol:
//!
//! 1. swap the producer definition and its index entries under the lock
//! 2. in a detached task, push every existing job of the producer's types
//!    to its job callback
//! 3. then reconcile job status for the new type set, then for the old one

use super::info_jobs::{InfoJob, InfoJobs};
use super::info_types::{InfoType, InfoTypes};
use super::multimap::MultiMap;
use crate::callbacks::{JobStatusNotifier, ProducerCallbacks};
use ics_common::{Error, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Unresponsive supervision calls before a producer counts as dead
pub const DEFAULT_DEAD_THRESHOLD: u32 = 3;

/// A process able to supply data for one or more types
#[derive(Debug)]
pub struct InfoProducer {
    id: String,
    info_types: Vec<Arc<InfoType>>,
    job_callback_url: String,
    supervision_callback_url: String,
    enabled_jobs: Mutex<HashSet<String>>,
    unresponsive_counter: AtomicU32,
    dead_threshold: u32,
}

impl InfoProducer {
    pub fn new(
        id: impl Into<String>,
        info_types: Vec<Arc<InfoType>>,
        job_callback_url: impl Into<String>,
        supervision_callback_url: impl Into<String>,
        dead_threshold: u32,
    ) -> Self {
        Self {
            id: id.into(),
            info_types,
            job_callback_url: job_callback_url.into(),
            supervision_callback_url: supervision_callback_url.into(),
            enabled_jobs: Mutex::new(HashSet::new()),
            unresponsive_counter: AtomicU32::new(0),
            dead_threshold,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn info_types(&self) -> &[Arc<InfoType>] {
        &self.info_types
    }

    pub fn type_ids(&self) -> Vec<String> {
        self.info_types.iter().map(|t| t.id.clone()).collect()
    }

    pub fn job_callback_url(&self) -> &str {
        &self.job_callback_url
    }

    pub fn supervision_callback_url(&self) -> &str {
        &self.supervision_callback_url
    }

    pub fn set_job_enabled(&self, job: &InfoJob) {
        self.enabled_jobs.lock().insert(job.id.clone());
    }

    pub fn set_job_disabled(&self, job: &InfoJob) {
        self.enabled_jobs.lock().remove(&job.id);
    }

    pub fn is_job_enabled(&self, job: &InfoJob) -> bool {
        self.enabled_jobs.lock().contains(&job.id)
    }

    pub fn enabled_job_ids(&self) -> Vec<String> {
        self.enabled_jobs.lock().iter().cloned().collect()
    }

    /// Record the outcome of one supervision call
    pub fn set_alive_status(&self, alive: bool) {
        if alive {
            self.unresponsive_counter.store(0, Ordering::SeqCst);
        } else {
            self.unresponsive_counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn unresponsive_counter(&self) -> u32 {
        self.unresponsive_counter.load(Ordering::SeqCst)
    }

    pub fn is_dead(&self) -> bool {
        self.unresponsive_counter() >= self.dead_threshold
    }

    pub fn is_available(&self) -> bool {
        self.unresponsive_counter() == 0
    }
}

/// Registration request, type ids still unresolved
#[derive(Debug, Clone)]
pub struct ProducerRegistrationInfo {
    pub id: String,
    pub supported_type_ids: Vec<String>,
    pub job_callback_url: String,
    pub supervision_callback_url: String,
}

#[derive(Default)]
struct ProducerIndex {
    all: HashMap<String, Arc<InfoProducer>>,
    by_type: MultiMap<Arc<InfoProducer>>,
}

pub struct InfoProducers {
    index: Mutex<ProducerIndex>,
    types: Arc<InfoTypes>,
    jobs: Arc<InfoJobs>,
    producer_callbacks: Arc<ProducerCallbacks>,
    job_status: Arc<JobStatusNotifier>,
    dead_threshold: u32,
}

impl InfoProducers {
    pub fn new(
        types: Arc<InfoTypes>,
        jobs: Arc<InfoJobs>,
        producer_callbacks: Arc<ProducerCallbacks>,
        job_status: Arc<JobStatusNotifier>,
        dead_threshold: u32,
    ) -> Self {
        Self {
            index: Mutex::new(ProducerIndex::default()),
            types,
            jobs,
            producer_callbacks,
            job_status,
            dead_threshold,
        }
    }

    /// Register a producer, replacing any previous definition with the
    /// same id.
    ///
    /// Fails with `NotFound` if a supported type is unknown; nothing is
    /// changed in that case. Job start and status reconciliation run in a
    /// detached task and never report back to the caller.
    pub fn register_producer(self: &Arc<Self>, registration: ProducerRegistrationInfo) -> Result<Arc<InfoProducer>> {
        let supported_types = registration
            .supported_type_ids
            .iter()
            .map(|type_id| self.types.get_or_fail(type_id))
            .collect::<Result<Vec<_>>>()?;

        let producer = Arc::new(InfoProducer::new(
            registration.id,
            supported_types,
            registration.job_callback_url,
            registration.supervision_callback_url,
            self.dead_threshold,
        ));

        let previous = {
            let mut index = self.index.lock();
            let previous = index.all.remove(producer.id());
            if let Some(previous) = &previous {
                for info_type in previous.info_types() {
                    index.by_type.remove(&info_type.id, previous.id());
                }
            }

            index.all.insert(producer.id().to_string(), Arc::clone(&producer));
            for info_type in producer.info_types() {
                index.by_type.put(&info_type.id, producer.id(), Arc::clone(&producer));
            }
            previous
        };

        info!(
            producer_id = %producer.id(),
            types = ?producer.type_ids(),
            replaced = previous.is_some(),
            "Registered information producer"
        );

        let previous_types = previous
            .map(|p| p.info_types().to_vec())
            .unwrap_or_default();

        let this = Arc::clone(self);
        let started = Arc::clone(&producer);
        tokio::spawn(async move {
            let count = this.producer_callbacks.start_info_jobs(&started, &this.jobs).await;
            debug!(producer_id = %started.id(), jobs_started = count, "Producer job start completed");

            this.job_status.notify_job_status(started.info_types(), &this).await;
            this.job_status.notify_job_status(&previous_types, &this).await;
        });

        Ok(producer)
    }

    /// Remove a producer and reconcile the status of the jobs it served
    pub fn deregister_producer(self: &Arc<Self>, producer: &InfoProducer) {
        {
            let mut index = self.index.lock();
            if let Some(current) = index.all.get(producer.id()) {
                if !std::ptr::eq(current.as_ref(), producer) {
                    // Re-registered since the caller looked it up
                    debug!(producer_id = %producer.id(), "Skipping deregistration of replaced producer");
                    return;
                }
            }
            index.all.remove(producer.id());
            for info_type in producer.info_types() {
                if index.by_type.remove(&info_type.id, producer.id()).is_none() {
                    error!(
                        producer_id = %producer.id(),
                        type_id = %info_type.id,
                        "Bug, no producer found in type index"
                    );
                }
            }
        }

        info!(producer_id = %producer.id(), "Deregistered information producer");

        let this = Arc::clone(self);
        let types = producer.info_types().to_vec();
        tokio::spawn(async move {
            this.job_status.notify_job_status(&types, &this).await;
        });
    }

    pub fn get(&self, id: &str) -> Option<Arc<InfoProducer>> {
        self.index.lock().all.get(id).cloned()
    }

    pub fn get_or_fail(&self, id: &str) -> Result<Arc<InfoProducer>> {
        self.get(id)
            .ok_or_else(|| Error::not_found("Information producer", id))
    }

    pub fn all(&self) -> Vec<Arc<InfoProducer>> {
        self.index.lock().all.values().cloned().collect()
    }

    pub fn producers_for_type(&self, type_id: &str) -> Vec<Arc<InfoProducer>> {
        self.index.lock().by_type.get(type_id)
    }

    pub fn producer_ids_for_type(&self, type_id: &str) -> Vec<String> {
        self.producers_for_type(type_id)
            .iter()
            .map(|p| p.id().to_string())
            .collect()
    }

    /// A job is enabled iff at least one producer serving its type has
    /// accepted it
    pub fn is_job_enabled(&self, job: &InfoJob) -> bool {
        self.index
            .lock()
            .by_type
            .get(&job.type_id)
            .iter()
            .any(|producer| producer.is_job_enabled(job))
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
    }
}
