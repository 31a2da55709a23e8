//! Coordinator service facade
//!
//! Builds the registries in dependency order and implements the producer
//! and consumer operations on top of them. Validation happens here, before
//! any registry state changes; asynchronous callback failures never reach
//! the caller.

use crate::callbacks::{consumer_callbacks, ConsumerCallbacks, JobStatusNotifier, ProducerCallbacks, ProducerJobInfo};
use crate::clients::RestClient;
use crate::repository::{
    info_jobs, info_types, type_subscriptions, EntityStore, InfoJob, InfoJobs, InfoProducer, InfoProducers,
    InfoType, InfoTypeSubscriptions, InfoTypes, ProducerRegistrationInfo, SubscriptionInfo,
};
use crate::tasks::ProducerSupervision;
use crate::validation::{validate_absolute_uri, validate_json_object, validate_optional_uri};
use ics_common::config::TomlConfig;
use ics_common::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

/// Whether a PUT created a new entity or replaced an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Created,
    Updated,
}

impl PutOutcome {
    fn from_previous<T>(previous: &Option<T>) -> Self {
        if previous.is_some() {
            PutOutcome::Updated
        } else {
            PutOutcome::Created
        }
    }
}

/// Tunables of the callback engine
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub retry_base_delay: Duration,
    pub dead_threshold: u32,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            retry_base_delay: Duration::from_secs(1),
            dead_threshold: crate::repository::info_producers::DEFAULT_DEAD_THRESHOLD,
        }
    }
}

impl From<&TomlConfig> for CoordinatorSettings {
    fn from(config: &TomlConfig) -> Self {
        Self {
            retry_base_delay: config.callbacks.retry_base_delay(),
            dead_threshold: config.supervision.dead_threshold,
        }
    }
}

/// A consumer's job definition, before validation
#[derive(Debug, Clone)]
pub struct JobDefinition {
    pub type_id: String,
    pub owner: String,
    pub job_data: Value,
    pub target_url: String,
    pub job_status_url: Option<String>,
}

/// Effective status of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusReport {
    pub enabled: bool,
    /// Every producer serving the job's type
    pub producers: Vec<String>,
}

/// A type as seen by consumers
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerTypeInfo {
    pub job_data_schema: Option<Value>,
    /// At least one producer of the type answers supervision
    pub available: bool,
    pub no_of_producers: usize,
}

pub struct InfoCoordinator {
    types: Arc<InfoTypes>,
    jobs: Arc<InfoJobs>,
    producer_callbacks: Arc<ProducerCallbacks>,
    job_status: Arc<JobStatusNotifier>,
    producers: Arc<InfoProducers>,
    subscriptions: Arc<InfoTypeSubscriptions>,
    job_locks: KeyedLocks,
}

/// One async lock per job id, so a job PUT (which awaits producer calls
/// between validation and storing) and a DELETE of the same job never
/// interleave
#[derive(Default)]
struct KeyedLocks {
    locks: parking_lot::Mutex<HashMap<String, Weak<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks.retain(|_, lock| lock.strong_count() > 0);
            match locks.get(key).and_then(Weak::upgrade) {
                Some(lock) => lock,
                None => {
                    let lock = Arc::new(tokio::sync::Mutex::new(()));
                    locks.insert(key.to_string(), Arc::downgrade(&lock));
                    lock
                }
            }
        };
        lock.lock_owned().await
    }
}

impl InfoCoordinator {
    /// Build the registries on top of `{vardata}/database`.
    ///
    /// `rest_client` calls producers and type subscribers directly;
    /// `proxy_client` carries job status reports to job owners.
    pub fn new(
        vardata: &Path,
        rest_client: Arc<dyn RestClient>,
        proxy_client: Arc<dyn RestClient>,
        settings: CoordinatorSettings,
    ) -> Result<Self> {
        let types = Arc::new(InfoTypes::new(EntityStore::open(vardata, info_types::STORE_KIND)?));

        let producer_callbacks = Arc::new(ProducerCallbacks::new(Arc::clone(&rest_client), settings.retry_base_delay));

        let jobs = Arc::new(InfoJobs::new(
            EntityStore::open(vardata, info_jobs::STORE_KIND)?,
            Arc::clone(&producer_callbacks),
        ));

        let job_status = Arc::new(JobStatusNotifier::new(proxy_client, Arc::clone(&jobs)));

        let producers = Arc::new(InfoProducers::new(
            Arc::clone(&types),
            Arc::clone(&jobs),
            Arc::clone(&producer_callbacks),
            Arc::clone(&job_status),
            settings.dead_threshold,
        ));

        let subscriptions = Arc::new(InfoTypeSubscriptions::new(
            EntityStore::open(vardata, type_subscriptions::STORE_KIND)?,
            settings.retry_base_delay,
        ));
        subscriptions.register_callback_handler(
            Arc::new(ConsumerCallbacks::new(rest_client)),
            consumer_callbacks::API_VERSION,
        );

        Ok(Self {
            types,
            jobs,
            producer_callbacks,
            job_status,
            producers,
            subscriptions,
            job_locks: KeyedLocks::default(),
        })
    }

    /// Reload types, jobs and subscriptions; call once before serving
    pub fn restore_from_disk(&self) -> Result<()> {
        let types = self.types.restore_from_disk()?;
        let jobs = self.jobs.restore_from_disk()?;
        let subscriptions = self.subscriptions.restore_from_disk()?;
        info!(types, jobs, subscriptions, "Registry restored from disk");
        Ok(())
    }

    pub fn supervision(&self) -> ProducerSupervision {
        ProducerSupervision::new(
            Arc::clone(&self.producers),
            Arc::clone(&self.jobs),
            Arc::clone(&self.producer_callbacks),
            Arc::clone(&self.job_status),
        )
    }

    pub fn types(&self) -> &Arc<InfoTypes> {
        &self.types
    }

    pub fn jobs(&self) -> &Arc<InfoJobs> {
        &self.jobs
    }

    pub fn producers(&self) -> &Arc<InfoProducers> {
        &self.producers
    }

    pub fn subscriptions(&self) -> &Arc<InfoTypeSubscriptions> {
        &self.subscriptions
    }

    // ========================================================================
    // Types
    // ========================================================================

    pub fn type_ids(&self) -> Vec<String> {
        self.types.all().iter().map(|t| t.id.clone()).collect()
    }

    pub fn get_type(&self, id: &str) -> Result<Arc<InfoType>> {
        self.types.get_or_fail(id)
    }

    /// Create or replace a type and tell subscribers about it
    pub fn put_type(&self, id: &str, job_data_schema: Option<Value>, type_specific_info: Option<Value>) -> Result<PutOutcome> {
        let Some(schema) = job_data_schema else {
            return Err(Error::BadRequest("No schema provided".to_string()));
        };

        let outcome = PutOutcome::from_previous(&self.types.get(id));
        let info_type = self.types.put(InfoType::new(id, Some(schema), type_specific_info));
        self.subscriptions.notify_type_registered(info_type);
        Ok(outcome)
    }

    /// Remove a type nobody produces, together with all of its jobs
    pub fn delete_type(&self, id: &str) -> Result<()> {
        let info_type = self
            .types
            .get(id)
            .ok_or_else(|| Error::not_found("Information type", id))?;

        if let Some(producer) = self.producers.producers_for_type(id).first() {
            return Err(Error::Conflict(format!(
                "The type has active producers: {}",
                producer.id()
            )));
        }

        self.types.remove(&info_type);
        for job in self.jobs.jobs_for_type(id) {
            self.jobs.remove(&job, &self.producers);
        }
        info!(type_id = %id, "Removed information type");
        self.subscriptions.notify_type_removed(info_type);
        Ok(())
    }

    // ========================================================================
    // Producers
    // ========================================================================

    pub fn producer_ids(&self, type_id: Option<&str>) -> Vec<String> {
        match type_id {
            Some(type_id) => self.producers.producer_ids_for_type(type_id),
            None => self.producers.all().iter().map(|p| p.id().to_string()).collect(),
        }
    }

    pub fn get_producer(&self, id: &str) -> Result<Arc<InfoProducer>> {
        self.producers.get_or_fail(id)
    }

    pub fn put_producer(&self, registration: ProducerRegistrationInfo) -> Result<PutOutcome> {
        require_uri(&registration.job_callback_url)?;
        require_uri(&registration.supervision_callback_url)?;

        let outcome = PutOutcome::from_previous(&self.producers.get(&registration.id));
        self.producers.register_producer(registration)?;
        Ok(outcome)
    }

    pub fn delete_producer(&self, id: &str) -> Result<()> {
        let producer = self.producers.get_or_fail(id)?;
        self.producers.deregister_producer(&producer);
        Ok(())
    }

    /// ENABLED iff the producer answered its last supervision call
    pub fn producer_status(&self, id: &str) -> Result<bool> {
        Ok(self.producers.get_or_fail(id)?.is_available())
    }

    /// Every job the producer is expected to serve
    pub fn producer_jobs(&self, id: &str) -> Result<Vec<ProducerJobInfo>> {
        let producer = self.producers.get_or_fail(id)?;
        Ok(producer
            .info_types()
            .iter()
            .flat_map(|info_type| self.jobs.jobs_for_type(&info_type.id))
            .map(|job| ProducerJobInfo::from(job.as_ref()))
            .collect())
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    /// Job ids, optionally narrowed to an owner and/or a type
    pub fn job_ids(&self, type_id: Option<&str>, owner: Option<&str>) -> Vec<String> {
        let jobs = match (owner, type_id) {
            (Some(owner), type_id) => self
                .jobs
                .jobs_for_owner(owner)
                .into_iter()
                .filter(|job| type_id.map_or(true, |t| job.type_id == t))
                .collect(),
            (None, Some(type_id)) => self.jobs.jobs_for_type(type_id),
            (None, None) => self.jobs.all(),
        };
        jobs.iter().map(|job| job.id.clone()).collect()
    }

    pub fn get_job(&self, id: &str) -> Result<Arc<InfoJob>> {
        self.jobs.get_or_fail(id)
    }

    pub fn job_status(&self, id: &str) -> Result<JobStatusReport> {
        let job = self.jobs.get_or_fail(id)?;
        Ok(JobStatusReport {
            enabled: self.producers.is_job_enabled(&job),
            producers: self.producers.producer_ids_for_type(&job.type_id),
        })
    }

    /// Validate, push to producers, then store a job.
    ///
    /// With `type_check` the type must exist and the job data must satisfy
    /// its schema.
    pub async fn put_job(&self, id: &str, definition: JobDefinition, type_check: bool) -> Result<PutOutcome> {
        let _guard = self.job_locks.lock(id).await;
        let existing = self.jobs.get(id);
        self.validate_job(existing.as_deref(), &definition, type_check)?;

        let job = InfoJob::new(
            id,
            definition.type_id,
            definition.owner,
            definition.job_data,
            definition.target_url,
            definition.job_status_url,
        );

        let accepted = self.producer_callbacks.start_info_subscription_job(&job, &self.producers).await;
        debug!(job_id = %id, producers = accepted, "Started job");

        self.jobs.put(job);
        Ok(PutOutcome::from_previous(&existing))
    }

    fn validate_job(&self, existing: Option<&InfoJob>, definition: &JobDefinition, type_check: bool) -> Result<()> {
        require_field("info_type_id", &definition.type_id)?;
        require_field("job_owner", &definition.owner)?;
        if definition.job_data.is_null() {
            return Err(Error::BadRequest("Missing required field: job_definition".to_string()));
        }
        require_uri(&definition.target_url)?;

        if type_check {
            let info_type = self.types.get_or_fail(&definition.type_id)?;
            if let Some(schema) = &info_type.job_data_schema {
                validate_json_object(schema, &definition.job_data)?;
            }
        }

        validate_optional_uri(definition.job_status_url.as_deref())?;

        if let Some(existing) = existing {
            if existing.type_id != definition.type_id {
                return Err(Error::Conflict("Not allowed to change type for existing job".to_string()));
            }
        }
        Ok(())
    }

    /// Waits for an in-flight PUT of the same job to finish first
    pub async fn delete_job(&self, id: &str) -> Result<()> {
        let _guard = self.job_locks.lock(id).await;
        let job = self.jobs.get_or_fail(id)?;
        self.jobs.remove(&job, &self.producers);
        Ok(())
    }

    /// A type's schema and whether anyone can currently produce it
    pub fn consumer_type_info(&self, id: &str) -> Result<ConsumerTypeInfo> {
        let info_type = self.types.get_or_fail(id)?;
        let producers = self.producers.producers_for_type(id);
        Ok(ConsumerTypeInfo {
            job_data_schema: info_type.job_data_schema.clone(),
            available: producers.iter().any(|p| p.is_available()),
            no_of_producers: producers.len(),
        })
    }

    // ========================================================================
    // Type subscriptions
    // ========================================================================

    pub fn subscription_ids(&self, owner: Option<&str>) -> Vec<String> {
        let subscriptions = match owner {
            Some(owner) => self.subscriptions.subscriptions_for_owner(owner),
            None => self.subscriptions.all_subscriptions(),
        };
        subscriptions.iter().map(|s| s.id.clone()).collect()
    }

    pub fn get_subscription(&self, id: &str) -> Result<Arc<SubscriptionInfo>> {
        self.subscriptions.get_subscription(id)
    }

    pub fn put_subscription(&self, id: &str, callback_url: &str, owner: &str) -> Result<PutOutcome> {
        require_uri(callback_url)?;

        let outcome = PutOutcome::from_previous(&self.subscriptions.get(id));
        self.subscriptions.put(SubscriptionInfo {
            id: id.to_string(),
            callback_url: callback_url.to_string(),
            owner: owner.to_string(),
            api_version: consumer_callbacks::API_VERSION.to_string(),
        });
        Ok(outcome)
    }

    pub fn delete_subscription(&self, id: &str) -> Result<()> {
        let subscription = self.subscriptions.get_subscription(id)?;
        self.subscriptions.remove(&subscription);
        Ok(())
    }
}

fn require_field(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::BadRequest(format!("Missing required field: {}", name)));
    }
    Ok(())
}

/// Callback URLs are mandatory
fn require_uri(uri: &str) -> Result<()> {
    if uri.is_empty() {
        return Err(Error::BadRequest("Missing required URL".to_string()));
    }
    validate_absolute_uri(uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_uri() {
        assert!(matches!(require_uri(""), Err(Error::BadRequest(_))));
        assert!(matches!(require_uri("jobs"), Err(Error::BadRequest(_))));
        assert!(require_uri("http://p1/jobs").is_ok());
    }

    #[test]
    fn test_require_field() {
        let result = require_field("job_owner", "");
        assert!(matches!(result, Err(Error::BadRequest(msg)) if msg == "Missing required field: job_owner"));
        assert!(require_field("job_owner", "alice").is_ok());
    }

    #[test]
    fn test_put_outcome() {
        assert_eq!(PutOutcome::from_previous(&Some(1)), PutOutcome::Updated);
        assert_eq!(PutOutcome::from_previous::<u8>(&None), PutOutcome::Created);
    }
}
