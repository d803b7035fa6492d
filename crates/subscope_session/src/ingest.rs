//! Inbound-message ingestion.
//!
//! Decoding runs on a bounded pool (one permit per available processor) so a
//! burst of traffic cannot spawn unbounded work; acquisition waits for a free
//! permit rather than dropping messages. Mutation of the message store stays
//! on a single writer task fed by a channel, so log order is the order
//! records were dispatched to it and observers never see a half-applied
//! update. Decode tasks may finish out of order; that reordering is accepted.

use std::sync::{Arc, Mutex};

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use subscope_broker::InboundMessage;
use subscope_core::{Console, LogEntry, MessageStore, Severity, TrafficCounters};

pub(crate) fn decode_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

/// The single serialization point for store mutation.
pub(crate) fn spawn_store_writer(
    mut records: mpsc::UnboundedReceiver<LogEntry>,
    store: Arc<Mutex<MessageStore>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(entry) = records.recv().await {
            store.lock().unwrap().record(entry);
        }
    })
}

/// Dispatch loop over the broker's inbound channel.
pub(crate) fn spawn_ingest(
    mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
    records: mpsc::UnboundedSender<LogEntry>,
    counters: Arc<TrafficCounters>,
    console: Arc<Console>,
    pool_size: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("ingestion decode pool sized to {pool_size}");
        let permits = Arc::new(Semaphore::new(pool_size));
        while let Some(message) = inbound.recv().await {
            counters.record_received();

            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let records = records.clone();
            let console = console.clone();
            // Arrival is stamped at dispatch, not at decode completion.
            let timestamp = console.elapsed_secs();

            tokio::spawn(async move {
                let _permit = permit;
                let payload = match String::from_utf8(message.payload) {
                    Ok(text) => text,
                    Err(raw) => {
                        console.write(
                            Severity::Warning,
                            format!(
                                "Payload on {} is not valid UTF-8; recording a lossy decode",
                                message.topic
                            ),
                        );
                        String::from_utf8_lossy(raw.as_bytes()).into_owned()
                    }
                };
                let _ = records.send(LogEntry {
                    timestamp,
                    topic: message.topic,
                    payload,
                    qos: message.qos,
                });
            });
        }
    })
}
