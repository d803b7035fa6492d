//! The orchestrator.
//!
//! A [`Session`] owns the control-plane state for the process lifetime: the
//! publish scheduler, job tracker, rate tracker, message store and console
//! funnel, plus the broker client everything transmits through. Construction
//! wires the ingestion pipeline between the client's inbound channel and the
//! store. Every externally-visible operation is bracketed with job tracking
//! so a display surface can show what is in flight.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use subscope_broker::client::TlsConfig;
use subscope_broker::{ApplicationMessage, BrokerClient, InboundMessage, PayloadFormat, QoS};
use subscope_config::Settings;
use subscope_core::{
    Console, Direction, JobTracker, MessageStore, PublishScheduler, RateTracker, Severity,
    TrafficCounters,
};

use crate::command::{Command, Property, help_text, parse};
use crate::ingest;

/// Connection settings editable from the command surface.
///
/// Fields stay free-form text until a connection is attempted, which is when
/// validation happens.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    pub ip: String,
    pub port: String,
    pub enable_tls: bool,
    pub ca_cert: String,
    pub client_cert: String,
    pub private_key: String,
}

impl ConnectionProfile {
    fn from_settings(settings: &Settings) -> Self {
        Self {
            ip: settings.broker.host.clone(),
            port: settings.broker.port.to_string(),
            enable_tls: settings.tls.enabled,
            ca_cert: settings.tls.ca_cert.clone(),
            client_cert: settings.tls.client_cert.clone(),
            private_key: settings.tls.private_key.clone(),
        }
    }
}

pub struct Session {
    client: Arc<dyn BrokerClient>,
    scheduler: PublishScheduler,
    jobs: JobTracker,
    console: Arc<Console>,
    counters: Arc<TrafficCounters>,
    rates: Mutex<RateTracker>,
    store: Arc<Mutex<MessageStore>>,
    profile: Mutex<ConnectionProfile>,
    connected: AtomicBool,
    subscriptions: Mutex<BTreeSet<String>>,
}

impl Session {
    /// Build a session around a broker client. `inbound` is the channel the
    /// client pushes received messages onto; the ingestion pipeline and the
    /// store writer are spawned here, so this must run inside a runtime.
    pub fn new(
        client: Arc<dyn BrokerClient>,
        inbound: mpsc::UnboundedReceiver<InboundMessage>,
        settings: &Settings,
    ) -> Self {
        let console = Arc::new(Console::new());
        let counters = Arc::new(TrafficCounters::default());
        let store = Arc::new(Mutex::new(MessageStore::new()));

        let (records_tx, records_rx) = mpsc::unbounded_channel();
        ingest::spawn_store_writer(records_rx, store.clone());
        ingest::spawn_ingest(
            inbound,
            records_tx,
            counters.clone(),
            console.clone(),
            ingest::decode_pool_size(),
        );

        let scheduler = PublishScheduler::new(client.clone(), counters.clone(), console.clone());

        Self {
            client,
            scheduler,
            jobs: JobTracker::new(),
            console: console.clone(),
            rates: Mutex::new(RateTracker::new(counters.clone())),
            counters,
            store,
            profile: Mutex::new(ConnectionProfile::from_settings(settings)),
            connected: AtomicBool::new(false),
            subscriptions: Mutex::new(BTreeSet::new()),
        }
    }

    /// Parse and execute one line of operator input. Errors are reported to
    /// the console; nothing propagates.
    pub async fn run_line(&self, line: &str) {
        match parse(line) {
            Ok(command) => self.execute(command).await,
            Err(e) => self.console.write(Severity::Error, e.to_string()),
        }
    }

    pub async fn execute(&self, command: Command) {
        match command {
            Command::Set { property, value } => self.set_property(property, value),
            Command::EnableTls => self.set_tls(true),
            Command::DisableTls => self.set_tls(false),
            Command::Connect { ip, port } => {
                if self.is_connected() {
                    self.console
                        .write(Severity::Error, "Disconnect before opening a new connection");
                    return;
                }
                {
                    let mut profile = self.profile.lock().unwrap();
                    profile.ip = ip;
                    profile.port = port;
                }
                self.connect().await;
            }
            Command::Disconnect => self.disconnect().await,
            Command::Subscribe { topic, qos } => self.subscribe(topic, qos).await,
            Command::Unsubscribe { topic } => self.unsubscribe(topic).await,
            Command::Publish {
                topic,
                qos,
                payload,
                format,
            } => self.publish(topic, qos, payload, format).await,
            Command::Start {
                topic,
                qos,
                payload,
                format,
                period_ms,
            } => self.start_schedule(topic, qos, payload, format, period_ms),
            Command::Stop { topic } => {
                if !self.scheduler.unschedule(&topic) {
                    self.console
                        .write(Severity::Warning, format!("No schedule exists for {topic}"));
                }
            }
            Command::Pause { topic } => {
                if !self.scheduler.pause(&topic) {
                    self.console
                        .write(Severity::Warning, format!("No schedule exists for {topic}"));
                }
            }
            Command::Resume { topic } => {
                if !self.scheduler.resume(&topic) {
                    self.console
                        .write(Severity::Warning, format!("No schedule exists for {topic}"));
                }
            }
            Command::PauseAll => self.scheduler.pause_all(),
            Command::ResumeAll => self.scheduler.resume_all(),
            Command::KillAll => self.scheduler.kill_all(),
            Command::Silence => self.console.silence(),
            Command::Help => self.console.write(Severity::Info, help_text()),
        }
    }

    fn set_property(&self, property: Property, value: String) {
        if self.is_connected() {
            self.console
                .write(Severity::Error, "Disconnect before changing connection settings");
            return;
        }
        let mut profile = self.profile.lock().unwrap();
        match property {
            Property::Ip => profile.ip = value,
            Property::Port => profile.port = value,
            Property::CaCert => profile.ca_cert = value,
            Property::ClientCert => profile.client_cert = value,
            Property::PrivateKey => profile.private_key = value,
        }
    }

    fn set_tls(&self, enabled: bool) {
        if self.is_connected() {
            self.console
                .write(Severity::Error, "Disconnect before changing connection settings");
            return;
        }
        self.profile.lock().unwrap().enable_tls = enabled;
    }

    /// Connect using the current profile. One console error per missing
    /// field; nothing is attempted until the profile validates.
    pub async fn connect(&self) {
        let profile = self.profile.lock().unwrap().clone();
        const CONTEXT: &str = "connect";
        let mut had_error = false;

        if profile.ip.is_empty() {
            self.report_missing("broker IP", CONTEXT, &mut had_error);
        }
        if profile.port.is_empty() {
            self.report_missing("broker port", CONTEXT, &mut had_error);
        } else if profile.port.parse::<u16>().is_err() {
            self.console
                .write(Severity::Error, format!("Invalid broker port '{}'", profile.port));
            had_error = true;
        }
        if profile.enable_tls {
            if profile.ca_cert.is_empty() {
                self.report_missing("root CA certificate", CONTEXT, &mut had_error);
            }
            if profile.client_cert.is_empty() {
                self.report_missing("client certificate", CONTEXT, &mut had_error);
            }
            if profile.private_key.is_empty() {
                self.report_missing("private key", CONTEXT, &mut had_error);
            }
        }
        if had_error {
            return;
        }

        let endpoint = format!("{}:{}", profile.ip, profile.port);
        let tls = profile.enable_tls.then(|| TlsConfig {
            ca_cert: profile.ca_cert.clone(),
            client_cert: profile.client_cert.clone(),
            private_key: profile.private_key.clone(),
        });

        let job = self.jobs.begin("Connecting to broker");
        match self.client.connect(&endpoint, tls).await {
            Ok(()) => {
                self.connected.store(true, Ordering::SeqCst);
                self.console
                    .write(Severity::Info, format!("Connected to {endpoint}"));
            }
            Err(e) => {
                self.console
                    .write(Severity::Error, format!("Could not connect to {endpoint}: {e}"));
            }
        }
        self.jobs.end(job);
    }

    pub async fn disconnect(&self) {
        if !self.require_connection("disconnect") {
            return;
        }
        let endpoint = self.endpoint_string();
        let job = self.jobs.begin("Disconnecting from broker");
        match self.client.disconnect().await {
            Ok(()) => {
                self.connected.store(false, Ordering::SeqCst);
                self.subscriptions.lock().unwrap().clear();
                self.console
                    .write(Severity::Info, format!("Disconnected from {endpoint}"));
            }
            Err(e) => {
                self.console.write(
                    Severity::Error,
                    format!("Could not disconnect from {endpoint}: {e}"),
                );
            }
        }
        self.jobs.end(job);
    }

    pub async fn subscribe(&self, topic: String, qos: QoS) {
        if !self.require_connection("subscribe") {
            return;
        }
        let mut had_error = false;
        if topic.is_empty() {
            self.report_missing("subscription topic", "subscribe", &mut had_error);
        }
        if had_error {
            return;
        }
        if self.subscriptions.lock().unwrap().contains(&topic) {
            self.console
                .write(Severity::Warning, format!("Already subscribed to {topic}"));
            return;
        }

        let job = self.jobs.begin(format!("Subscribing to {topic}"));
        match self.client.subscribe(&topic, qos).await {
            Ok(()) => {
                self.subscriptions.lock().unwrap().insert(topic.clone());
                self.console
                    .write(Severity::Info, format!("Subscribed to {topic} with QoS {qos}"));
            }
            Err(e) => {
                self.console
                    .write(Severity::Error, format!("Could not subscribe to {topic}: {e}"));
            }
        }
        self.jobs.end(job);
    }

    pub async fn unsubscribe(&self, topic: String) {
        if !self.require_connection("unsubscribe") {
            return;
        }
        if !self.subscriptions.lock().unwrap().contains(&topic) {
            self.console
                .write(Severity::Warning, format!("Not subscribed to {topic}"));
            return;
        }

        let job = self.jobs.begin(format!("Unsubscribing from {topic}"));
        match self.client.unsubscribe(&topic).await {
            Ok(()) => {
                self.subscriptions.lock().unwrap().remove(&topic);
                self.console
                    .write(Severity::Info, format!("Unsubscribed from {topic}"));
            }
            Err(e) => {
                self.console.write(
                    Severity::Error,
                    format!("Could not unsubscribe from {topic}: {e}"),
                );
            }
        }
        self.jobs.end(job);
    }

    pub async fn publish(&self, topic: String, qos: QoS, payload: String, format: PayloadFormat) {
        if !self.require_connection("publish") {
            return;
        }
        let encoded = match format.encode(&payload) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.console.write(
                    Severity::Error,
                    format!("Could not encode payload for {topic}: {e}"),
                );
                return;
            }
        };
        let message = ApplicationMessage {
            topic: topic.clone(),
            payload: encoded,
            qos,
            retain: false,
        };

        let job = self.jobs.begin(format!("Publishing to {topic}"));
        match self.scheduler.publish_now(&message).await {
            Ok(()) => {
                self.console
                    .write(Severity::Info, format!("Published to {topic}"));
            }
            Err(e) => {
                self.console
                    .write(Severity::Error, format!("Could not publish to {topic}: {e}"));
            }
        }
        self.jobs.end(job);
    }

    pub fn start_schedule(
        &self,
        topic: String,
        qos: QoS,
        payload: String,
        format: PayloadFormat,
        period_ms: u64,
    ) {
        if !self.require_connection("start a periodic publish") {
            return;
        }
        let encoded = match format.encode(&payload) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.console.write(
                    Severity::Error,
                    format!("Could not encode payload for {topic}: {e}"),
                );
                return;
            }
        };
        let message = ApplicationMessage {
            topic,
            payload: encoded,
            qos,
            retain: false,
        };
        if let Err(e) = self.scheduler.schedule(message, period_ms) {
            self.console.write(Severity::Error, e.to_string());
        }
    }

    /// Fold the last second's traffic into the rate windows. Driven once per
    /// second by the binary.
    pub fn tick(&self) {
        self.rates.lock().unwrap().record_tick();
    }

    /// One-line summary for a status surface.
    pub fn status_line(&self) -> String {
        let connection = if self.is_connected() {
            format!("Connected to {}", self.endpoint_string())
        } else {
            "Disconnected".to_string()
        };

        let active = self.jobs.active();
        let progress = if active.is_empty() {
            "No tasks in progress".to_string()
        } else if active.len() == 1 {
            active[0].clone()
        } else {
            format!("{} (+{} more)", active[0], active.len() - 1)
        };

        let traffic = if self.is_connected() {
            let rates = self.rates.lock().unwrap();
            format!(
                "TX {:.0}/s RX {:.0}/s",
                rates.rate(Direction::Sent),
                rates.rate(Direction::Received)
            )
        } else {
            "TX unavailable RX unavailable".to_string()
        };

        format!("{connection} | {progress} | {traffic}")
    }

    /// The process may close only when no periodic timer is running; the
    /// operator has to kill (or pause and kill) schedules first.
    pub fn can_close(&self) -> bool {
        self.scheduler.active_count() == 0
    }

    pub fn clear_data(&self) {
        self.store.lock().unwrap().clear();
    }

    pub fn clear_console(&self) {
        self.console.clear();
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().unwrap().iter().cloned().collect()
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn scheduler(&self) -> &PublishScheduler {
        &self.scheduler
    }

    pub fn jobs(&self) -> &JobTracker {
        &self.jobs
    }

    pub fn store(&self) -> Arc<Mutex<MessageStore>> {
        self.store.clone()
    }

    pub fn counters(&self) -> &TrafficCounters {
        &self.counters
    }

    pub fn profile(&self) -> ConnectionProfile {
        self.profile.lock().unwrap().clone()
    }

    fn endpoint_string(&self) -> String {
        let profile = self.profile.lock().unwrap();
        format!("{}:{}", profile.ip, profile.port)
    }

    fn require_connection(&self, context: &str) -> bool {
        if self.is_connected() {
            true
        } else {
            self.console
                .write(Severity::Error, format!("Connect to a broker to {context}"));
            false
        }
    }

    fn report_missing(&self, what: &str, context: &str, had_error: &mut bool) {
        self.console
            .write(Severity::Error, format!("Specify a {what} to {context}"));
        *had_error = true;
    }
}
