//! Periodic publish scheduling.
//!
//! Each scheduled topic owns an independent ticker task; firings for
//! different topics run concurrently with each other and with everything
//! else. The topic map is guarded by a single mutex; tickers re-check their
//! entry under that lock on every firing and drop it before any broker I/O,
//! so control operations stay atomic without per-entry locks.
//!
//! Pause semantics are deliberately asymmetric: `pause_all` stops every
//! timer without touching the per-topic paused flag, and `resume_all` only
//! restarts topics the operator did not pause individually.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

use subscope_broker::{ApplicationMessage, BrokerClient, BrokerError};

use crate::console::{Console, Severity};
use crate::rates::TrafficCounters;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("a schedule for '{0}' already exists")]
    Duplicate(String),
    #[error("publish period must be greater than zero")]
    InvalidPeriod,
}

#[derive(Debug)]
struct Entry {
    message: ApplicationMessage,
    period_ms: u64,
    timer_running: bool,
    individually_paused: bool,
    ticker: JoinHandle<()>,
}

/// Owns the set of periodic publish jobs.
pub struct PublishScheduler {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    client: Arc<dyn BrokerClient>,
    counters: Arc<TrafficCounters>,
    console: Arc<Console>,
}

impl PublishScheduler {
    pub fn new(
        client: Arc<dyn BrokerClient>,
        counters: Arc<TrafficCounters>,
        console: Arc<Console>,
    ) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            client,
            counters,
            console,
        }
    }

    /// Begin transmitting `message` every `period_ms` milliseconds.
    ///
    /// Fails without mutating anything if the topic already has a schedule
    /// or the period is zero.
    pub fn schedule(
        &self,
        message: ApplicationMessage,
        period_ms: u64,
    ) -> Result<(), ScheduleError> {
        if period_ms == 0 {
            return Err(ScheduleError::InvalidPeriod);
        }

        let topic = message.topic.clone();
        {
            let mut entries = self.entries.lock().unwrap();
            if entries.contains_key(&topic) {
                return Err(ScheduleError::Duplicate(topic));
            }
            let ticker = self.spawn_ticker(topic.clone(), Duration::from_millis(period_ms));
            entries.insert(
                topic.clone(),
                Entry {
                    message,
                    period_ms,
                    timer_running: true,
                    individually_paused: false,
                    ticker,
                },
            );
        }

        debug!("scheduled periodic publish for {topic}");
        self.console.write(
            Severity::Info,
            format!("Started transmitting {topic} every {period_ms} ms"),
        );
        Ok(())
    }

    /// Stop and remove a schedule. Returns false if the topic has none,
    /// which is an expected condition, not an error.
    pub fn unschedule(&self, topic: &str) -> bool {
        let removed = {
            let mut entries = self.entries.lock().unwrap();
            match entries.remove(topic) {
                Some(entry) => {
                    // Abort before the lock is released: a firing that is
                    // already transmitting may finish, but no later tick can
                    // observe the removal or a replacement entry.
                    entry.ticker.abort();
                    true
                }
                None => false,
            }
        };
        if removed {
            debug!("unscheduled periodic publish for {topic}");
            self.console
                .write(Severity::Info, format!("Stopped transmitting {topic}"));
        }
        removed
    }

    /// Pause one topic. Marks it individually paused so a later
    /// `resume_all` will not resurrect it.
    pub fn pause(&self, topic: &str) -> bool {
        let paused = {
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(topic) {
                Some(entry) => {
                    entry.timer_running = false;
                    entry.individually_paused = true;
                    true
                }
                None => false,
            }
        };
        if paused {
            self.console.write(Severity::Info, format!("Paused {topic}"));
        }
        paused
    }

    /// Resume one topic, clearing its individually-paused mark.
    pub fn resume(&self, topic: &str) -> bool {
        let resumed = {
            let mut entries = self.entries.lock().unwrap();
            match entries.get_mut(topic) {
                Some(entry) => {
                    entry.timer_running = true;
                    entry.individually_paused = false;
                    true
                }
                None => false,
            }
        };
        if resumed {
            self.console.write(Severity::Info, format!("Resumed {topic}"));
        }
        resumed
    }

    /// Stop every timer. Individual paused flags are left untouched so
    /// `resume_all` can tell a global pause apart from an operator's
    /// explicit one.
    pub fn pause_all(&self) {
        {
            let mut entries = self.entries.lock().unwrap();
            for entry in entries.values_mut() {
                entry.timer_running = false;
            }
        }
        self.console
            .write(Severity::Info, "Paused all transmissions");
    }

    /// Restart every timer except those the operator paused individually.
    pub fn resume_all(&self) {
        {
            let mut entries = self.entries.lock().unwrap();
            for entry in entries.values_mut() {
                if !entry.individually_paused {
                    entry.timer_running = true;
                }
            }
        }
        self.console
            .write(Severity::Info, "Resumed all transmissions");
    }

    /// Stop and remove every schedule unconditionally. Idempotent.
    pub fn kill_all(&self) {
        let removed: Vec<String> = {
            let mut entries = self.entries.lock().unwrap();
            entries
                .drain()
                .map(|(topic, entry)| {
                    entry.ticker.abort();
                    topic
                })
                .collect()
        };
        for topic in removed {
            self.console
                .write(Severity::Info, format!("Stopped transmitting {topic}"));
        }
    }

    pub fn is_scheduled(&self, topic: &str) -> bool {
        self.entries.lock().unwrap().contains_key(topic)
    }

    /// True iff the topic was paused individually (not via `pause_all`).
    pub fn is_paused(&self, topic: &str) -> bool {
        self.entries
            .lock()
            .unwrap()
            .get(topic)
            .is_some_and(|entry| entry.individually_paused)
    }

    pub fn total_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Schedules whose timer is currently running.
    pub fn active_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap()
            .values()
            .filter(|entry| entry.timer_running)
            .count()
    }

    /// True when schedules exist and none of their timers are running.
    pub fn all_paused(&self) -> bool {
        let entries = self.entries.lock().unwrap();
        !entries.is_empty() && entries.values().all(|entry| !entry.timer_running)
    }

    pub fn period_ms(&self, topic: &str) -> Option<u64> {
        self.entries
            .lock()
            .unwrap()
            .get(topic)
            .map(|entry| entry.period_ms)
    }

    /// Transmit a message immediately. Used for one-shot publishes and by
    /// every timer firing.
    pub async fn publish_now(&self, message: &ApplicationMessage) -> Result<(), BrokerError> {
        Self::transmit(&self.client, &self.counters, message).await
    }

    async fn transmit(
        client: &Arc<dyn BrokerClient>,
        counters: &TrafficCounters,
        message: &ApplicationMessage,
    ) -> Result<(), BrokerError> {
        client.publish(message).await?;
        counters.record_sent();
        Ok(())
    }

    fn spawn_ticker(&self, topic: String, period: Duration) -> JoinHandle<()> {
        let entries = Arc::clone(&self.entries);
        let client = Arc::clone(&self.client);
        let counters = Arc::clone(&self.counters);
        let console = Arc::clone(&self.console);

        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first interval tick resolves immediately; consume it so the
            // first transmission lands one full period after scheduling.
            ticks.tick().await;
            loop {
                ticks.tick().await;
                let message = {
                    let entries = entries.lock().unwrap();
                    match entries.get(&topic) {
                        Some(entry) if entry.timer_running => entry.message.clone(),
                        Some(_) => continue,
                        None => break,
                    }
                };
                // Failures are confined to this tick; the schedule keeps
                // firing through transient broker errors.
                if let Err(e) = Self::transmit(&client, &counters, &message).await {
                    console.write(
                        Severity::Warning,
                        format!("Periodic publish to {topic} failed: {e}"),
                    );
                }
            }
        })
    }
}
