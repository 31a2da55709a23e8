//! Producer supervision
//!
//! Periodically calls every producer's supervision URL. A producer that
//! answers is marked alive, gets any jobs it has not accepted re-sent and
//! has its jobs' status reconciled. One that does not answer has its
//! unresponsive counter bumped and is deregistered once it counts as dead.

use crate::callbacks::{JobStatusNotifier, ProducerCallbacks};
use crate::repository::{InfoJobs, InfoProducer, InfoProducers};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct ProducerSupervision {
    producers: Arc<InfoProducers>,
    jobs: Arc<InfoJobs>,
    producer_callbacks: Arc<ProducerCallbacks>,
    job_status: Arc<JobStatusNotifier>,
}

impl ProducerSupervision {
    pub fn new(
        producers: Arc<InfoProducers>,
        jobs: Arc<InfoJobs>,
        producer_callbacks: Arc<ProducerCallbacks>,
        job_status: Arc<JobStatusNotifier>,
    ) -> Self {
        Self {
            producers,
            jobs,
            producer_callbacks,
            job_status,
        }
    }

    /// Run supervision rounds every `period` until `shutdown` is cancelled
    pub fn spawn(self: Arc<Self>, period: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        info!(interval_secs = period.as_secs(), "Starting producer supervision");

        tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick fires immediately; producers register after startup
            timer.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Producer supervision stopped");
                        break;
                    }
                    _ = timer.tick() => {
                        self.check_all_producers().await;
                    }
                }
            }
        })
    }

    /// One supervision round over every registered producer
    pub async fn check_all_producers(&self) {
        let producers = self.producers.all();
        debug!(producers = producers.len(), "Checking producers");
        join_all(producers.iter().map(|producer| self.check_producer(producer))).await;
    }

    async fn check_producer(&self, producer: &Arc<InfoProducer>) {
        match self.producer_callbacks.health_check(producer).await {
            Ok(_) => {
                producer.set_alive_status(true);
                let restarted = self.producer_callbacks.restart_disabled_jobs(producer, &self.jobs).await;
                if restarted > 0 {
                    info!(producer_id = %producer.id(), jobs = restarted, "Re-started jobs in producer");
                }
                self.job_status
                    .notify_job_status(producer.info_types(), &self.producers)
                    .await;
            }
            Err(e) => {
                producer.set_alive_status(false);
                warn!(
                    producer_id = %producer.id(),
                    unresponsive = producer.unresponsive_counter(),
                    error = %e,
                    "Producer supervision failed"
                );
                if producer.is_dead() {
                    warn!(producer_id = %producer.id(), "Deregistering unresponsive producer");
                    self.producers.deregister_producer(producer);
                }
            }
        }
    }
}
