use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use subscope_broker::client::TlsConfig;
use subscope_broker::{ApplicationMessage, BrokerClient, BrokerError, InboundMessage, PayloadFormat, QoS};
use subscope_config::Settings;
use subscope_core::Severity;

use crate::command::{Command, CommandError, Property, parse};
use crate::session::Session;

struct MockClient {
    published: mpsc::UnboundedSender<ApplicationMessage>,
}

impl MockClient {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ApplicationMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { published: tx }), rx)
    }
}

#[async_trait]
impl BrokerClient for MockClient {
    async fn connect(&self, _endpoint: &str, tls: Option<TlsConfig>) -> Result<(), BrokerError> {
        if tls.is_some() {
            return Err(BrokerError::TlsUnsupported);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn subscribe(&self, _topic: &str, _qos: QoS) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn unsubscribe(&self, _topic: &str) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn publish(&self, message: &ApplicationMessage) -> Result<(), BrokerError> {
        let _ = self.published.send(message.clone());
        Ok(())
    }
}

struct SessionFixture {
    session: Session,
    published: mpsc::UnboundedReceiver<ApplicationMessage>,
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
}

fn session_fixture() -> SessionFixture {
    let (client, published) = MockClient::new();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let session = Session::new(client, inbound_rx, &Settings::default());
    SessionFixture {
        session,
        published,
        inbound_tx,
    }
}

fn error_count(session: &Session) -> usize {
    session
        .console()
        .entries()
        .iter()
        .filter(|entry| entry.severity == Severity::Error)
        .count()
}

fn lines_matching(session: &Session, needle: &str) -> usize {
    session
        .console()
        .entries()
        .iter()
        .filter(|entry| entry.message.contains(needle))
        .count()
}

// --- parser ---

#[test]
fn test_parse_set_and_tls_toggles() {
    assert_eq!(
        parse("set ip 10.0.0.1").unwrap(),
        Command::Set {
            property: Property::Ip,
            value: "10.0.0.1".to_string()
        }
    );
    assert_eq!(parse("enabletls").unwrap(), Command::EnableTls);
    assert_eq!(parse("disabletls").unwrap(), Command::DisableTls);
    assert_eq!(
        parse("set nonsense x").unwrap_err(),
        CommandError::UnknownProperty("nonsense".to_string())
    );
}

#[test]
fn test_parse_connect() {
    assert_eq!(
        parse("connect 192.168.1.10:1883").unwrap(),
        Command::Connect {
            ip: "192.168.1.10".to_string(),
            port: "1883".to_string()
        }
    );
    assert_eq!(
        parse("connect 192.168.1.10").unwrap_err(),
        CommandError::InvalidEndpoint("192.168.1.10".to_string())
    );
    assert_eq!(
        parse("connect").unwrap_err(),
        CommandError::Usage("connect <ip:port>")
    );
}

#[test]
fn test_parse_subscribe_pairs() {
    assert_eq!(
        parse("subscribe sensors/temp:2").unwrap(),
        Command::Subscribe {
            topic: "sensors/temp".to_string(),
            qos: QoS::ExactlyOnce
        }
    );
    assert_eq!(
        parse("subscribe sensors/temp:9").unwrap_err(),
        CommandError::InvalidQos("9".to_string())
    );
    assert_eq!(
        parse("subscribe sensors/temp").unwrap_err(),
        CommandError::InvalidTopicQos("sensors/temp".to_string())
    );
}

#[test]
fn test_parse_publish_with_quoted_payload() {
    assert_eq!(
        parse("publish alerts:1 \"fire in hall 3\" 0").unwrap(),
        Command::Publish {
            topic: "alerts".to_string(),
            qos: QoS::AtLeastOnce,
            payload: "fire in hall 3".to_string(),
            format: PayloadFormat::Text,
        }
    );
    // empty quoted payload is a valid token
    assert_eq!(
        parse("publish alerts:0 \"\" 0").unwrap(),
        Command::Publish {
            topic: "alerts".to_string(),
            qos: QoS::AtMostOnce,
            payload: String::new(),
            format: PayloadFormat::Text,
        }
    );
    assert_eq!(
        parse("publish alerts:0 \"unterminated 0").unwrap_err(),
        CommandError::UnterminatedQuote
    );
}

#[test]
fn test_parse_start_accepts_rate_with_and_without_at() {
    let expected = Command::Start {
        topic: "mytopic".to_string(),
        qos: QoS::AtLeastOnce,
        payload: "hello".to_string(),
        format: PayloadFormat::Text,
        period_ms: 500,
    };
    assert_eq!(parse("start mytopic:1 \"hello\" 0 @500ms").unwrap(), expected);
    assert_eq!(parse("start mytopic:1 \"hello\" 0 500ms").unwrap(), expected);

    assert_eq!(
        parse("start mytopic:1 \"hello\" 0 500").unwrap_err(),
        CommandError::InvalidRate("500".to_string())
    );
    assert_eq!(
        parse("start mytopic:1 \"hello\" 7 500ms").unwrap_err(),
        CommandError::InvalidFormat("7".to_string())
    );
}

#[test]
fn test_parse_scheduler_controls() {
    assert_eq!(
        parse("stop mytopic").unwrap(),
        Command::Stop {
            topic: "mytopic".to_string()
        }
    );
    assert_eq!(
        parse("pause mytopic").unwrap(),
        Command::Pause {
            topic: "mytopic".to_string()
        }
    );
    assert_eq!(
        parse("resume mytopic").unwrap(),
        Command::Resume {
            topic: "mytopic".to_string()
        }
    );
    assert_eq!(parse("pauseall").unwrap(), Command::PauseAll);
    assert_eq!(parse("resumeall").unwrap(), Command::ResumeAll);
    assert_eq!(parse("killall").unwrap(), Command::KillAll);
    assert_eq!(parse("silence").unwrap(), Command::Silence);
    assert_eq!(parse("help").unwrap(), Command::Help);
}

#[test]
fn test_parse_verbs_are_case_insensitive() {
    assert_eq!(parse("PAUSEALL").unwrap(), Command::PauseAll);
    assert_eq!(parse("Disconnect").unwrap(), Command::Disconnect);
}

#[test]
fn test_parse_rejects_unknown_and_empty() {
    assert_eq!(
        parse("teleport home").unwrap_err(),
        CommandError::UnknownVerb("teleport".to_string())
    );
    assert_eq!(parse("").unwrap_err(), CommandError::Empty);
    assert_eq!(parse("   ").unwrap_err(), CommandError::Empty);
    // trailing junk on a no-arg verb is rejected, not ignored
    assert_eq!(
        parse("killall now").unwrap_err(),
        CommandError::Usage("killall")
    );
}

// --- session ---

#[tokio::test]
async fn test_connection_required_verbs_report_and_do_nothing() {
    let fixture = session_fixture();

    fixture.session.run_line("subscribe sensors/a:0").await;
    fixture.session.run_line("publish sensors/a:0 \"x\" 0").await;
    fixture.session.run_line("start sensors/a:0 \"x\" 0 100ms").await;

    assert!(fixture.session.subscriptions().is_empty());
    assert!(!fixture.session.scheduler().is_scheduled("sensors/a"));
    assert_eq!(error_count(&fixture.session), 3);
    assert_eq!(lines_matching(&fixture.session, "Connect to a broker to"), 3);
}

#[tokio::test]
async fn test_connect_and_disconnect_flow() {
    let fixture = session_fixture();

    fixture.session.run_line("connect 127.0.0.1:9000").await;
    assert!(fixture.session.is_connected());
    assert_eq!(lines_matching(&fixture.session, "Connected to 127.0.0.1:9000"), 1);

    fixture.session.run_line("subscribe sensors/a:1").await;
    assert_eq!(fixture.session.subscriptions(), vec!["sensors/a"]);

    fixture.session.run_line("disconnect").await;
    assert!(!fixture.session.is_connected());
    assert!(fixture.session.subscriptions().is_empty());
    assert_eq!(lines_matching(&fixture.session, "Disconnected from"), 1);
}

#[tokio::test]
async fn test_connect_validation_reports_each_missing_field() {
    let fixture = session_fixture();

    fixture.session.run_line("set ip \"\"").await;
    fixture.session.connect().await;
    assert_eq!(lines_matching(&fixture.session, "Specify a broker IP to connect"), 1);
    assert!(!fixture.session.is_connected());

    fixture.session.run_line("set ip 127.0.0.1").await;
    fixture.session.run_line("set port nonsense").await;
    fixture.session.connect().await;
    assert_eq!(lines_matching(&fixture.session, "Invalid broker port 'nonsense'"), 1);
    assert!(!fixture.session.is_connected());
}

#[tokio::test]
async fn test_tls_fields_validated_then_reported_unsupported() {
    let fixture = session_fixture();

    fixture.session.run_line("enabletls").await;
    fixture.session.connect().await;
    // all three cert fields missing, one line each
    assert_eq!(lines_matching(&fixture.session, "Specify a root CA certificate"), 1);
    assert_eq!(lines_matching(&fixture.session, "Specify a client certificate"), 1);
    assert_eq!(lines_matching(&fixture.session, "Specify a private key"), 1);

    fixture.session.run_line("set cacert /certs/ca.pem").await;
    fixture.session.run_line("set clientcert /certs/client.pem").await;
    fixture.session.run_line("set privatekey /certs/key.pem").await;
    fixture.session.connect().await;
    assert_eq!(
        lines_matching(&fixture.session, "TLS connections are currently unsupported"),
        1
    );
    assert!(!fixture.session.is_connected());
}

#[tokio::test]
async fn test_command_round_trip_start_then_stop() {
    let fixture = session_fixture();
    fixture.session.run_line("connect 127.0.0.1:9000").await;

    fixture.session.run_line("start mytopic:1 \"hello\" 0 @500ms").await;
    assert!(fixture.session.scheduler().is_scheduled("mytopic"));
    assert!(!fixture.session.scheduler().is_paused("mytopic"));
    assert_eq!(fixture.session.scheduler().period_ms("mytopic"), Some(500));
    assert_eq!(lines_matching(&fixture.session, "Started transmitting mytopic"), 1);

    fixture.session.run_line("stop mytopic").await;
    assert!(!fixture.session.scheduler().is_scheduled("mytopic"));
    assert_eq!(lines_matching(&fixture.session, "Stopped transmitting mytopic"), 1);
}

#[tokio::test]
async fn test_duplicate_start_reports_and_keeps_original() {
    let fixture = session_fixture();
    fixture.session.run_line("connect 127.0.0.1:9000").await;

    fixture.session.run_line("start mytopic:0 \"a\" 0 500ms").await;
    fixture.session.run_line("start mytopic:0 \"b\" 0 200ms").await;

    assert_eq!(lines_matching(&fixture.session, "already exists"), 1);
    // the original schedule is untouched
    assert_eq!(fixture.session.scheduler().period_ms("mytopic"), Some(500));
    assert_eq!(fixture.session.scheduler().total_count(), 1);
}

#[tokio::test]
async fn test_pause_all_resume_all_via_commands() {
    let fixture = session_fixture();
    fixture.session.run_line("connect 127.0.0.1:9000").await;
    fixture.session.run_line("start a:0 \"x\" 0 500ms").await;
    fixture.session.run_line("start b:0 \"x\" 0 500ms").await;

    fixture.session.run_line("pause a").await;
    fixture.session.run_line("pauseall").await;
    fixture.session.run_line("resumeall").await;

    assert!(fixture.session.scheduler().is_paused("a"));
    assert!(!fixture.session.scheduler().is_paused("b"));
    assert_eq!(fixture.session.scheduler().active_count(), 1);
}

#[tokio::test]
async fn test_stop_unknown_topic_warns_without_error() {
    let fixture = session_fixture();
    fixture.session.run_line("stop ghost").await;
    assert_eq!(lines_matching(&fixture.session, "No schedule exists for ghost"), 1);
    assert_eq!(error_count(&fixture.session), 0);
}

#[tokio::test]
async fn test_one_shot_publish_encodes_payload() {
    let mut fixture = session_fixture();
    fixture.session.run_line("connect 127.0.0.1:9000").await;

    fixture.session.run_line("publish data:1 \"plain text reading\" 0").await;
    let sent = fixture.published.recv().await.unwrap();
    assert_eq!(sent.topic, "data");
    assert_eq!(sent.payload, "plain text reading");
    assert_eq!(sent.qos, QoS::AtLeastOnce);

    fixture.session.publish(
        "data".to_string(),
        QoS::AtMostOnce,
        "{ \"a\": 1 }".to_string(),
        PayloadFormat::Json,
    )
    .await;
    let sent = fixture.published.recv().await.unwrap();
    assert_eq!(sent.payload, "{\"a\":1}");
    assert_eq!(fixture.session.counters().sent(), 2);
}

#[tokio::test]
async fn test_bad_payload_aborts_before_any_effect() {
    let mut fixture = session_fixture();
    fixture.session.run_line("connect 127.0.0.1:9000").await;

    fixture
        .session
        .start_schedule(
            "data".to_string(),
            QoS::AtMostOnce,
            "{not json".to_string(),
            PayloadFormat::Json,
            100,
        );
    assert!(!fixture.session.scheduler().is_scheduled("data"));
    assert_eq!(lines_matching(&fixture.session, "Could not encode payload"), 1);
    assert!(fixture.published.try_recv().is_err());
}

#[tokio::test]
async fn test_ingestion_counts_and_latest_wins() {
    let fixture = session_fixture();
    let n = 32;

    for i in 0..n {
        fixture
            .inbound_tx
            .send(InboundMessage {
                topic: "sensors/a".to_string(),
                payload: format!("reading-{i}").into_bytes(),
                qos: QoS::AtMostOnce,
            })
            .unwrap();
    }

    let store = fixture.session.store();
    timeout(Duration::from_secs(2), async {
        loop {
            if store.lock().unwrap().len() == n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("all inbound messages should be recorded");

    let guard = store.lock().unwrap();
    assert_eq!(guard.log().len(), n);
    // the live table reflects whichever record was dispatched last
    let last = guard.log().last().unwrap();
    let live = guard.latest("sensors/a").unwrap();
    assert_eq!(live.payload, last.payload);
    assert_eq!(live.timestamp, last.timestamp);
    drop(guard);

    assert_eq!(fixture.session.counters().received(), n as u64);
}

#[tokio::test]
async fn test_ingestion_survives_invalid_utf8() {
    let fixture = session_fixture();

    fixture
        .inbound_tx
        .send(InboundMessage {
            topic: "binary".to_string(),
            payload: vec![0xff, 0xfe, 0x41],
            qos: QoS::AtMostOnce,
        })
        .unwrap();

    let store = fixture.session.store();
    timeout(Duration::from_secs(2), async {
        loop {
            if store.lock().unwrap().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("lossy decode should still be recorded");

    assert!(
        fixture
            .session
            .console()
            .entries()
            .iter()
            .any(|entry| entry.severity == Severity::Warning
                && entry.message.contains("not valid UTF-8"))
    );
}

#[tokio::test]
async fn test_silence_resets_notifications() {
    let fixture = session_fixture();
    fixture.session.run_line("subscribe a:0").await; // not connected -> error
    assert!(fixture.session.console().notification_count() > 0);

    fixture.session.run_line("silence").await;
    assert_eq!(fixture.session.console().notification_count(), 0);
}

#[tokio::test]
async fn test_shutdown_guard_blocks_while_timers_run() {
    let fixture = session_fixture();
    assert!(fixture.session.can_close());

    fixture.session.run_line("connect 127.0.0.1:9000").await;
    fixture.session.run_line("start a:0 \"x\" 0 500ms").await;
    assert!(!fixture.session.can_close());

    fixture.session.run_line("killall").await;
    assert!(fixture.session.can_close());
}

#[tokio::test]
async fn test_set_rejected_while_connected() {
    let fixture = session_fixture();
    fixture.session.run_line("connect 127.0.0.1:9000").await;

    fixture.session.run_line("set ip 10.0.0.1").await;
    assert_eq!(
        lines_matching(&fixture.session, "Disconnect before changing connection settings"),
        1
    );
    assert_eq!(fixture.session.profile().ip, "127.0.0.1");
}

#[tokio::test]
async fn test_duplicate_subscribe_warns() {
    let fixture = session_fixture();
    fixture.session.run_line("connect 127.0.0.1:9000").await;

    fixture.session.run_line("subscribe a:0").await;
    fixture.session.run_line("subscribe a:0").await;
    assert_eq!(lines_matching(&fixture.session, "Already subscribed to a"), 1);
    assert_eq!(fixture.session.subscriptions().len(), 1);

    fixture.session.run_line("unsubscribe a").await;
    fixture.session.run_line("unsubscribe a").await;
    assert_eq!(lines_matching(&fixture.session, "Not subscribed to a"), 1);
    assert!(fixture.session.subscriptions().is_empty());
}

#[tokio::test]
async fn test_status_line_reflects_connection_state() {
    let fixture = session_fixture();
    let line = fixture.session.status_line();
    assert!(line.contains("Disconnected"));
    assert!(line.contains("unavailable"));
    assert!(line.contains("No tasks in progress"));

    fixture.session.run_line("connect 127.0.0.1:9000").await;
    fixture.session.tick();
    let line = fixture.session.status_line();
    assert!(line.contains("Connected to 127.0.0.1:9000"));
    assert!(line.contains("TX 0/s"));
}

#[tokio::test]
async fn test_clear_data_and_clear_console() {
    let fixture = session_fixture();

    fixture
        .inbound_tx
        .send(InboundMessage {
            topic: "sensors/a".to_string(),
            payload: b"1".to_vec(),
            qos: QoS::AtMostOnce,
        })
        .unwrap();

    let store = fixture.session.store();
    timeout(Duration::from_secs(2), async {
        loop {
            if store.lock().unwrap().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("inbound message should be recorded");

    fixture.session.clear_data();
    assert!(store.lock().unwrap().is_empty());

    fixture.session.run_line("help").await;
    assert!(!fixture.session.console().entries().is_empty());
    fixture.session.clear_console();
    assert!(fixture.session.console().entries().is_empty());
}

#[tokio::test]
async fn test_unrecognized_line_reports_without_side_effects() {
    let fixture = session_fixture();
    fixture.session.run_line("frobnicate everything").await;
    assert_eq!(lines_matching(&fixture.session, "unrecognized command"), 1);
    assert!(!fixture.session.is_connected());
    assert_eq!(fixture.session.scheduler().total_count(), 0);
}
