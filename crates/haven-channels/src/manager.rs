use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Mutex};
use tracing::{error, info, warn};

use haven_bus::MessageBus;
use haven_core::RetryPolicy;

use crate::channel::Channel;

/// Initial and max backoff delay for a channel supervisor, per §4.2: 5s,
/// doubled per failure, capped at 60s, retried indefinitely while the
/// manager's shutdown flag is unset.
const SUPERVISOR_BASE: Duration = Duration::from_secs(5);
const SUPERVISOR_MAX: Duration = Duration::from_secs(60);

/// How long a delivered `idempotency_key` is remembered before the
/// dispatcher will accept a duplicate again.
const IDEMPOTENCY_TTL: Duration = Duration::from_secs(120);
/// Hard cap on the LRU dedup table so a burst of distinct keys can't grow
/// it unbounded between prunes.
const IDEMPOTENCY_CAPACITY: usize = 4096;

/// Owns the `channel_name -> channel instance` map, runs each channel under
/// a supervisor task, and runs the single outbound dispatcher task.
pub struct ChannelManager {
    channels: HashMap<String, Arc<dyn Channel>>,
    bus: Arc<MessageBus>,
    retry: RetryPolicy,
}

impl ChannelManager {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            channels: HashMap::new(),
            bus,
            retry: RetryPolicy::new(Duration::from_secs(2), Duration::from_secs(30), 5),
        }
    }

    /// Register a channel adapter. If a channel with the same name is
    /// already registered it is replaced.
    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registering channel adapter");
        self.channels.insert(name, channel);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.get(name)
    }

    /// Start every registered channel under its own supervisor task, plus
    /// the outbound dispatcher, and block until `shutdown` fires. Clean
    /// shutdown cancels every supervisor and calls `stop()` on each
    /// channel.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let mut tasks = Vec::new();

        for channel in self.channels.values().cloned() {
            let shutdown = shutdown.clone();
            tasks.push(tokio::spawn(supervise(channel, shutdown)));
        }
        tasks.push(tokio::spawn(self.clone().run_outbound_dispatcher(shutdown.clone())));

        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "channel task panicked");
            }
        }

        for channel in self.channels.values() {
            if let Err(e) = channel.stop().await {
                warn!(channel = channel.name(), error = %e, "error while stopping channel");
            }
        }
    }

    /// The outbound dispatcher contract from §4.3: consume one message at
    /// a time, dedup by idempotency key, look up the channel, send with
    /// retry, abandon permanent failures.
    async fn run_outbound_dispatcher(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let seen: Mutex<HashMap<String, Instant>> = Mutex::new(HashMap::new());
        info!("outbound dispatcher started");

        loop {
            let cancelled = || *shutdown.borrow();
            let Some(msg) = self.bus.consume_outbound(cancelled).await else {
                info!("outbound dispatcher shutting down");
                break;
            };

            if let Some(key) = msg.idempotency_key() {
                let mut table = seen.lock().await;
                prune_expired(&mut table);
                if table.contains_key(key) {
                    info!(idempotency_key = key, "dropping duplicate outbound message");
                    continue;
                }
                if table.len() >= IDEMPOTENCY_CAPACITY {
                    if let Some(oldest) = table.iter().min_by_key(|(_, at)| **at).map(|(k, _)| k.clone()) {
                        table.remove(&oldest);
                    }
                }
                table.insert(key.to_string(), Instant::now());
            }

            let Some(channel) = self.channels.get(&msg.channel).cloned() else {
                warn!(channel = %msg.channel, "dropping outbound message for unknown channel");
                continue;
            };

            let mut attempts: u32 = 0;
            loop {
                attempts += 1;
                match channel.send(&msg).await {
                    Ok(()) => break,
                    Err(e) if e.is_retryable() && self.retry.should_retry(attempts) => {
                        let delay = self.retry.delay_for_attempt(attempts - 1);
                        warn!(
                            channel = %msg.channel,
                            attempt = attempts,
                            error = %e,
                            retry_after = ?delay,
                            "outbound send failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(e) => {
                        error!(channel = %msg.channel, error = %e, "abandoning outbound message after send failure");
                        break;
                    }
                }
            }
        }
    }
}

fn prune_expired(table: &mut HashMap<String, Instant>) {
    let now = Instant::now();
    table.retain(|_, at| now.duration_since(*at) < IDEMPOTENCY_TTL);
}

/// Runs `channel.start()` in a loop; on return (clean or erroring) while
/// the shutdown flag is still unset, sleeps for a doubling backoff (5s up
/// to 60s) and retries indefinitely.
async fn supervise(channel: Arc<dyn Channel>, mut shutdown: watch::Receiver<bool>) {
    let mut delay = SUPERVISOR_BASE;
    let name = channel.name().to_string();

    loop {
        if *shutdown.borrow() {
            return;
        }

        info!(channel = %name, "starting channel");
        let result = channel.start().await;
        if *shutdown.borrow() {
            return;
        }

        match result {
            Ok(()) => info!(channel = %name, "channel start() returned cleanly, restarting"),
            Err(e) => error!(channel = %name, error = %e, "channel failed, restarting after backoff"),
        }

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
        delay = (delay * 2).min(SUPERVISOR_MAX);
    }
}
