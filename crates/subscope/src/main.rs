//! Interactive inspector for a pub/sub broker.
//!
//! Reads one command per line from stdin and prints console output as it
//! arrives. The process refuses to exit while periodic publishes are still
//! running; `killall` first.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::error;

use subscope_broker::{BrokerClient, WsBrokerClient};
use subscope_config::load_config;
use subscope_core::{Console, Severity};
use subscope_session::Session;

#[derive(Parser)]
#[command(name = "subscope", about = "Interactive inspector for a pub/sub broker")]
struct Args {
    /// Process log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Connect to the configured broker immediately
    #[arg(long)]
    connect: bool,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    subscope_utils::logging::init(&args.log_level);

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return;
        }
    };

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let client: Arc<dyn BrokerClient> = Arc::new(WsBrokerClient::new(inbound_tx));
    let session = Arc::new(Session::new(client, inbound_rx, &settings));

    {
        let session = session.clone();
        tokio::spawn(async move {
            let mut ticks = tokio::time::interval(Duration::from_secs(1));
            loop {
                ticks.tick().await;
                session.tick();
            }
        });
    }

    if args.connect {
        session.connect().await;
    }

    println!("subscope ready; type 'help' for commands");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut cursor = 0usize;
    let mut stdin_open = true;
    let mut drain = tokio::time::interval(Duration::from_millis(250));

    cursor = print_console(session.console(), cursor);

    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        session.run_line(line).await;
                        cursor = print_console(session.console(), cursor);
                    }
                    Ok(None) | Err(_) => {
                        stdin_open = false;
                        if try_close(&session, &mut cursor) {
                            break;
                        }
                    }
                }
            }
            _ = drain.tick() => {
                cursor = print_console(session.console(), cursor);
            }
            _ = tokio::signal::ctrl_c() => {
                if try_close(&session, &mut cursor) {
                    break;
                }
            }
        }
    }

    println!("{}", session.status_line());
}

/// Print console entries appended since the last call.
fn print_console(console: &Console, cursor: usize) -> usize {
    let (fresh, next) = console.entries_since(cursor);
    for entry in fresh {
        println!("{entry}");
    }
    next
}

fn try_close(session: &Session, cursor: &mut usize) -> bool {
    if session.can_close() {
        return true;
    }
    session.console().write(
        Severity::Error,
        "Periodic publishes are still running; run killall before exiting",
    );
    *cursor = print_console(session.console(), *cursor);
    false
}
