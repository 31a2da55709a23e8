//! Job start/stop callbacks to information producers
//!
//! A producer learns about jobs by POSTs of [`ProducerJobInfo`] to its job
//! callback URL and about removed jobs by `DELETE {job_callback_url}/{job_id}`.
//! The outcome of every start call is recorded in the producer's enabled
//! set; failures never propagate to the caller.

use super::retry::{retry, RetryPolicy};
use crate::clients::{CallbackError, RestClient};
use crate::repository::{InfoJob, InfoJobs, InfoProducer, InfoProducers};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Jobs pushed concurrently to one producer
const MAX_CONCURRENCY: usize = 10;

/// Job definition as sent to a producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerJobInfo {
    pub info_job_identity: String,
    pub info_type_identity: String,
    pub info_job_data: Value,
    pub target_uri: String,
    pub owner: String,
    pub last_updated: String,
}

impl From<&InfoJob> for ProducerJobInfo {
    fn from(job: &InfoJob) -> Self {
        Self {
            info_job_identity: job.id.clone(),
            info_type_identity: job.type_id.clone(),
            info_job_data: job.job_data.clone(),
            target_uri: job.target_url.clone(),
            owner: job.owner.clone(),
            last_updated: job.last_updated.clone(),
        }
    }
}

pub struct ProducerCallbacks {
    rest_client: Arc<dyn RestClient>,
    retry_base_delay: Duration,
}

impl ProducerCallbacks {
    pub fn new(rest_client: Arc<dyn RestClient>, retry_base_delay: Duration) -> Self {
        Self {
            rest_client,
            retry_base_delay,
        }
    }

    /// One supervision call
    pub async fn health_check(&self, producer: &InfoProducer) -> Result<String, CallbackError> {
        self.rest_client.get(producer.supervision_callback_url()).await
    }

    /// Tell every producer of the job's type that the job is gone.
    ///
    /// The job is marked disabled in each producer before the call is made.
    pub fn stop_info_job(&self, job: &InfoJob, producers: &InfoProducers) {
        for producer in producers.producers_for_type(&job.type_id) {
            producer.set_job_disabled(job);

            let url = format!("{}/{}", producer.job_callback_url(), job.id);
            let rest_client = Arc::clone(&self.rest_client);
            let producer_id = producer.id().to_string();
            let job_id = job.id.clone();
            tokio::spawn(async move {
                match rest_client.delete(&url).await {
                    Ok(_) => debug!(job_id = %job_id, producer_id = %producer_id, "Producer stopped job"),
                    Err(e) => warn!(job_id = %job_id, producer_id = %producer_id, error = %e, "Failed to stop job in producer"),
                }
            });
        }
    }

    /// Push a new or changed job to every producer of its type.
    ///
    /// Returns the number of producers that accepted it.
    pub async fn start_info_subscription_job(&self, job: &InfoJob, producers: &InfoProducers) -> usize {
        let policy = RetryPolicy::FixedDelay {
            retries: 1,
            delay: self.retry_base_delay,
        };

        let outcomes = join_all(
            producers
                .producers_for_type(&job.type_id)
                .iter()
                .map(|producer| self.start_info_job(producer, job, &policy)),
        )
        .await;

        outcomes.into_iter().filter(|accepted| *accepted).count()
    }

    /// Push every existing job of the producer's types to a producer that
    /// just (re)registered
    pub async fn start_info_jobs(&self, producer: &InfoProducer, jobs: &InfoJobs) -> usize {
        let policy = RetryPolicy::Backoff {
            retries: 3,
            base: self.retry_base_delay,
        };
        let candidates = jobs_of_producer(producer, jobs);
        self.start_jobs(producer, candidates, &policy).await
    }

    /// Re-send the jobs a live producer has not accepted yet
    pub async fn restart_disabled_jobs(&self, producer: &InfoProducer, jobs: &InfoJobs) -> usize {
        let policy = RetryPolicy::FixedDelay {
            retries: 1,
            delay: Duration::ZERO,
        };
        let candidates = jobs_of_producer(producer, jobs)
            .into_iter()
            .filter(|job| !producer.is_job_enabled(job))
            .collect();
        self.start_jobs(producer, candidates, &policy).await
    }

    async fn start_jobs(&self, producer: &InfoProducer, jobs: Vec<Arc<InfoJob>>, policy: &RetryPolicy) -> usize {
        stream::iter(jobs)
            .map(|job| async move { self.start_info_job(producer, &job, policy).await })
            .buffer_unordered(MAX_CONCURRENCY)
            .filter(|accepted| futures::future::ready(*accepted))
            .count()
            .await
    }

    /// Start one job in one producer and record the outcome
    pub async fn start_info_job(&self, producer: &InfoProducer, job: &InfoJob, policy: &RetryPolicy) -> bool {
        let body = match serde_json::to_string(&ProducerJobInfo::from(job)) {
            Ok(body) => body,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Could not serialize job");
                producer.set_job_disabled(job);
                return false;
            }
        };

        let url = producer.job_callback_url();
        let result = retry("producer job start", policy, || self.rest_client.post(url, &body)).await;

        match result {
            Ok(_) => {
                producer.set_job_enabled(job);
                debug!(job_id = %job.id, producer_id = %producer.id(), "Producer accepted job");
                true
            }
            Err(e) => {
                producer.set_job_disabled(job);
                warn!(job_id = %job.id, producer_id = %producer.id(), url = %url, error = %e, "Producer job start failed");
                false
            }
        }
    }
}

fn jobs_of_producer(producer: &InfoProducer, jobs: &InfoJobs) -> Vec<Arc<InfoJob>> {
    producer
        .info_types()
        .iter()
        .flat_map(|info_type| jobs.jobs_for_type(&info_type.id))
        .collect()
}
