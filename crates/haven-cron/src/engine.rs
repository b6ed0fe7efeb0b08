use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info};

use haven_bus::MessageBus;
use haven_core::{InboundMessage, OutboundMessage};

use crate::dispatcher::CronDispatcher;
use crate::store::CronStore;
use crate::types::{Job, JobKind, Schedule};

/// Drives the `jobs.json` store at ±1s precision, reusing the teacher
/// scheduler's `tokio::select!` + 1-second `tokio::time::interval`
/// tick-loop idiom but against this spec's `Schedule` variants.
pub struct CronEngine {
    store: Arc<CronStore>,
    bus: Arc<MessageBus>,
    /// Set once the agent loop exists (after this engine is constructed, in
    /// the binary's wiring), so mode-b self-dispatch jobs can reach
    /// `process_direct`. A job that fires before this is set fails with a
    /// logged error rather than panicking.
    dispatcher: Mutex<Option<Arc<dyn CronDispatcher>>>,
}

impl CronEngine {
    pub fn new(store: Arc<CronStore>, bus: Arc<MessageBus>) -> Self {
        Self {
            store,
            bus,
            dispatcher: Mutex::new(None),
        }
    }

    pub fn set_dispatcher(&self, dispatcher: Arc<dyn CronDispatcher>) {
        *self.dispatcher.lock().unwrap() = Some(dispatcher);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_job(
        &self,
        name: &str,
        schedule: Schedule,
        action: &str,
        self_dispatch: bool,
        channel: &str,
        chat_id: &str,
        kind: JobKind,
    ) -> crate::error::Result<Job> {
        self.store.add_job(name, schedule, action, self_dispatch, channel, chat_id, kind)
    }

    pub fn list_jobs(&self) -> Vec<Job> {
        self.store.list_jobs()
    }

    pub fn enable(&self, id: &str, enabled: bool) -> crate::error::Result<()> {
        self.store.set_enabled(id, enabled)
    }

    pub fn delete(&self, id: &str) -> crate::error::Result<()> {
        self.store.delete(id)
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("cron engine started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("cron engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) {
        let now = Utc::now();
        for job in self.store.due_jobs(now) {
            info!(job_id = %job.id, name = %job.name, kind = job.kind.as_str(), "cron job fired");
            // Mode (b): self-dispatch calls straight into `process_direct`
            // and publishes its reply; mode (a): materialize a synthetic
            // inbound message and let it run the full agent turn over the
            // bus, same as a real user message.
            let ok = if job.self_dispatch {
                let dispatcher = { self.dispatcher.lock().unwrap().clone() };
                match dispatcher {
                    Some(dispatcher) => match dispatcher.process_direct(&job.action).await {
                        Ok(reply) => {
                            self.bus.publish_outbound(OutboundMessage::text(
                                job.channel.clone(),
                                job.chat_id.clone(),
                                reply,
                            ));
                            true
                        }
                        Err(e) => {
                            error!(job_id = %job.id, error = %e, "cron self-dispatch failed");
                            false
                        }
                    },
                    None => {
                        error!(job_id = %job.id, "cron self-dispatch job fired with no dispatcher configured");
                        false
                    }
                }
            } else {
                self.bus.publish_inbound(InboundMessage {
                    channel: job.channel.clone(),
                    sender_id: "cron".to_string(),
                    chat_id: job.chat_id.clone(),
                    content: job.action.clone(),
                    media: Vec::new(),
                    metadata: std::collections::HashMap::from([
                        (
                            "system_origin".to_string(),
                            serde_json::Value::String(format!("{}:{}", job.channel, job.chat_id)),
                        ),
                        ("kind".to_string(), serde_json::Value::String(job.kind.as_str().to_string())),
                    ]),
                });
                true
            };
            if let Err(e) = self.store.record_run(&job.id, now, ok) {
                error!(job_id = %job.id, "failed to record cron run: {e}");
            }
        }
    }
}
