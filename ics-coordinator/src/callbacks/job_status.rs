//! Job status reconciliation
//!
//! A job's effective status is derived from the producers: ENABLED iff at
//! least one producer serving its type has accepted it. When that differs
//! from what the owner was last told, the new status is POSTed to the job's
//! status URL. A failed report is not retried; the next trigger will try
//! again because the reported flag is left stale.

use crate::clients::RestClient;
use crate::repository::{InfoJob, InfoJobs, InfoProducers, InfoType};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_CONCURRENCY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatusValue {
    Enabled,
    Disabled,
}

impl From<bool> for JobStatusValue {
    fn from(enabled: bool) -> Self {
        if enabled {
            JobStatusValue::Enabled
        } else {
            JobStatusValue::Disabled
        }
    }
}

/// Body POSTed to a job's status URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusNotification {
    pub info_job_status: JobStatusValue,
}

pub struct JobStatusNotifier {
    rest_client: Arc<dyn RestClient>,
    jobs: Arc<InfoJobs>,
}

impl JobStatusNotifier {
    pub fn new(rest_client: Arc<dyn RestClient>, jobs: Arc<InfoJobs>) -> Self {
        Self { rest_client, jobs }
    }

    /// Report every status change among the jobs of `types`.
    ///
    /// Returns the number of owners successfully notified.
    pub async fn notify_job_status(&self, types: &[Arc<InfoType>], producers: &InfoProducers) -> usize {
        let changed: Vec<(Arc<InfoJob>, bool)> = types
            .iter()
            .flat_map(|info_type| self.jobs.jobs_for_type(&info_type.id))
            .filter(|job| job.job_status_url.is_some())
            .filter_map(|job| {
                let enabled = producers.is_job_enabled(&job);
                (enabled != job.is_last_status_reported_enabled()).then_some((job, enabled))
            })
            .collect();

        if changed.is_empty() {
            return 0;
        }

        stream::iter(changed)
            .map(|(job, enabled)| async move { self.report_status(&job, enabled).await })
            .buffer_unordered(MAX_CONCURRENCY)
            .filter(|reported| futures::future::ready(*reported))
            .count()
            .await
    }

    async fn report_status(&self, job: &InfoJob, enabled: bool) -> bool {
        let Some(url) = job.job_status_url.as_deref() else {
            return false;
        };

        let notification = JobStatusNotification {
            info_job_status: enabled.into(),
        };
        let body = match serde_json::to_string(&notification) {
            Ok(body) => body,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Could not serialize job status");
                return false;
            }
        };

        match self.rest_client.post(url, &body).await {
            Ok(_) => {
                job.set_last_reported_status(enabled);
                debug!(job_id = %job.id, status = ?notification.info_job_status, "Job status reported");
                true
            }
            Err(e) => {
                warn!(job_id = %job.id, url = %url, error = %e, "Job status notification failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_body() {
        let body = serde_json::to_string(&JobStatusNotification {
            info_job_status: JobStatusValue::Disabled,
        })
        .unwrap();
        assert_eq!(body, r#"{"info_job_status":"DISABLED"}"#);
        assert_eq!(JobStatusValue::from(true), JobStatusValue::Enabled);
    }
}
