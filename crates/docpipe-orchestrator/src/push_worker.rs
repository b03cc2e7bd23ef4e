//! Push-stage worker: the `push` queue consumer that dispatches a
//! completed job to every webhook bound to its rule, logs each attempt,
//! and resolves the job to `push_success`/`push_failed` once every
//! target has reached a terminal per-target outcome (spec §4.1, §4.6).
//! Ported in spirit from
//! `original_source/backend/app/tasks/push_worker.py`'s fan-out-then-
//! reconcile loop.

use crate::credentials;
use crate::rules::WebhookRepository;
use crate::storage::ObjectStore;
use docpipe_queue::{QueueFabric, QueueName};
use docpipe_store::JobStore;
use docpipe_types::job::JobStatus;
use docpipe_webhook::{dispatch, next_delay, should_retry, TemplateContext};
use docpipe_utils::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct PushWorker {
    queue: QueueFabric,
    store: JobStore,
    webhooks: Arc<dyn WebhookRepository>,
    objects: Arc<dyn ObjectStore>,
    http_client: reqwest::Client,
    erp_config: docpipe_config::ErpConfig,
    retry_delays_secs: Vec<u64>,
    retry_max: u32,
    push_timeout: Duration,
    presign_ttl: Duration,
    owner: String,
    lease: Duration,
}

impl PushWorker {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: QueueFabric,
        store: JobStore,
        webhooks: Arc<dyn WebhookRepository>,
        objects: Arc<dyn ObjectStore>,
        http_client: reqwest::Client,
        erp_config: docpipe_config::ErpConfig,
        retry_delays_secs: Vec<u64>,
        retry_max: u32,
        push_timeout: Duration,
        presign_ttl: Duration,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            store,
            webhooks,
            objects,
            http_client,
            erp_config,
            retry_delays_secs,
            retry_max,
            push_timeout,
            presign_ttl,
            owner: owner.into(),
            lease: Duration::from_secs(120),
        }
    }

    /// Claim and process one `push` message. Returns `Ok(false)` if the
    /// queue was empty.
    pub async fn claim_and_process(&self) -> Result<bool> {
        let Some(message) = self.queue.consume(QueueName::Push, &self.owner, self.lease).await? else {
            return Ok(false);
        };
        let Some(job_id) = message.payload["job_id"].as_str().map(str::to_string) else {
            warn!(message_id = message.id, "push message missing job_id, dropping");
            self.queue.ack(message.id).await?;
            return Ok(true);
        };

        let Some(job) = self.store.get(&job_id).await? else {
            warn!(job_id, "push message references unknown job, dropping");
            self.queue.ack(message.id).await?;
            return Ok(true);
        };

        if job.status != JobStatus::Pushing {
            self.queue.ack(message.id).await?;
            return Ok(true);
        }

        let targets = self.webhooks.bound_webhooks(&job.rule.rule_id).await?;
        if targets.is_empty() {
            self.store
                .transition(&job_id, JobStatus::Pushing, JobStatus::PushSuccess, |_| {})
                .await?;
            self.queue.ack(message.id).await?;
            return Ok(true);
        }

        let file_url = self.objects.presigned_get_url(&job.object_key, self.presign_ttl).await?;
        let ctx = TemplateContext::new(&job, file_url);

        let mut all_succeeded = true;
        let mut any_needs_retry = false;
        let mut last_failure = None;

        for webhook in &targets {
            let credential = match credentials::resolve(webhook) {
                Ok(c) => c,
                Err(e) => {
                    warn!(job_id, webhook_id = %webhook.id, error = %e, "could not resolve webhook credential");
                    all_succeeded = false;
                    last_failure = Some(e.to_string());
                    continue;
                }
            };

            let outcome = dispatch(
                &self.http_client,
                webhook,
                &credential,
                &ctx,
                &self.erp_config,
                self.push_timeout,
                message.retry_count,
            )
            .await;

            self.store.record_push_log(&outcome.push_log).await?;

            if outcome.success {
                info!(job_id, webhook_id = %webhook.id, "push succeeded");
                continue;
            }

            all_succeeded = false;
            last_failure = outcome.push_log.error.clone();
            if should_retry(outcome.success, outcome.push_log.http_status, message.retry_count, self.retry_max) {
                any_needs_retry = true;
            }
        }

        if all_succeeded {
            self.store
                .transition(&job_id, JobStatus::Pushing, JobStatus::PushSuccess, |_| {})
                .await?;
            self.queue.ack(message.id).await?;
            info!(job_id, "all webhook targets succeeded");
        } else if any_needs_retry {
            let delay = next_delay(message.retry_count, &self.retry_delays_secs);
            self.queue.nack(message.id, delay).await?;
            warn!(job_id, attempt = message.retry_count, "push attempt failed, retrying");
        } else {
            let reason = last_failure.unwrap_or_else(|| "one or more webhook targets failed permanently".into());
            self.store
                .transition(&job_id, JobStatus::Pushing, JobStatus::PushFailed, |stored| {
                    stored.last_error = Some(reason.clone());
                })
                .await?;
            self.queue.move_to_dead_letter(message.id, &reason).await?;
            warn!(job_id, "push exhausted retries, moved to dead letter");
        }
        Ok(true)
    }
}
