//! End-to-end pipeline tests: transport frames in, emails out.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use parking_lot::Mutex;
use sentinel::Transport;
use sentinel_common::{Channel, Severity, Signal};
use sentinel_monitor::{
    BreachQueues, DeviceStateManager, DwellConfig, ReadingsEvent, ThresholdClassifier,
};
use sentinel_notify::{
    Mailer, Notifier, NotifierConfig, OutboundEmail, QueueDrainer, RateLimiter, RetryPolicy,
    RetryQueue, SendError, SeverityWindows, drain::ChannelLogs,
};
use sentinel_store::{DataAccess, MemoryStore, RecipientTiers, Store, Thresholds};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::TcpListener,
    sync::broadcast,
};

#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutboundEmail>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), SendError> {
        self.sent.lock().push(email.clone());
        Ok(())
    }
}

struct Pipeline {
    classifier: Arc<ThresholdClassifier>,
    queues: Arc<BreachQueues>,
    drainer: QueueDrainer,
    mailer: Arc<RecordingMailer>,
    _logs_dir: tempfile::TempDir,
}

fn pipeline(store: &Arc<MemoryStore>) -> Pipeline {
    let access = Arc::new(DataAccess::new(
        Arc::clone(store) as Arc<dyn Store>,
        Duration::from_secs(3600),
        Duration::from_secs(86400),
    ));
    let states = Arc::new(DeviceStateManager::new(Duration::from_secs(3600)));
    let queues = Arc::new(BreachQueues::new(100));
    let limiter = Arc::new(RateLimiter::new(SeverityWindows::default()));
    let mailer = Arc::new(RecordingMailer::default());
    let retries = Arc::new(RetryQueue::new());

    let notifier = Arc::new(Notifier::new(
        Arc::clone(&access),
        limiter,
        Arc::clone(&mailer) as Arc<dyn Mailer>,
        retries,
        RetryPolicy::default(),
        NotifierConfig {
            use_test_email: false,
            test_recipient: "qa@x.com".to_string(),
            logger_emails: vec!["audit@x.com".to_string()],
        },
    ));

    let classifier = Arc::new(ThresholdClassifier::new(
        access,
        states,
        Arc::clone(&queues),
        DwellConfig::default(),
    ));

    let logs_dir = tempfile::tempdir().expect("tempdir");
    let drainer = QueueDrainer::new(
        Arc::clone(&queues),
        notifier,
        Arc::new(ChannelLogs::in_dir(logs_dir.path())),
    );

    Pipeline {
        classifier,
        queues,
        drainer,
        mailer,
        _logs_dir: logs_dir,
    }
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for device in ["d1", "d2"] {
        store.set_thresholds(
            device,
            "s1",
            Thresholds {
                yellow: 10.0,
                orange: 20.0,
                red: 30.0,
            },
        );
        store.set_recipients(
            device,
            RecipientTiers {
                yellow: vec!["ops@x.com".to_string()],
                ..RecipientTiers::default()
            },
        );
    }
    store
}

fn readings_event(device: &str, value: f64) -> ReadingsEvent {
    serde_json::from_value(serde_json::json!({
        "device_id": device,
        "time": "2026-07-01 12:00:00",
        "readings": {"sensor_id": "s1", "sensor_type": "temperature", "value": value}
    }))
    .expect("valid event")
}

#[tokio::test]
async fn red_reading_reaches_the_recipient() {
    let store = seeded_store();
    let px = pipeline(&store);

    px.classifier.classify(&readings_event("d1", 35.0)).await;

    assert_eq!(px.queues.critical.len(), 1);
    px.drainer
        .drain_cycle(&px.queues.critical, Channel::Critical)
        .await;

    let sent = px.mailer.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipients, vec!["ops@x.com", "audit@x.com"]);
    assert!(sent[0].html_body.contains("<td>d1</td>"));
    assert!(sent[0].html_body.contains("<td>red</td>"));
    assert!(sent[0].html_body.contains("<td>30</td>"));
}

#[tokio::test]
async fn breaches_for_one_recipient_fan_in_to_one_email() {
    let store = seeded_store();
    let px = pipeline(&store);

    px.classifier.classify(&readings_event("d2", 40.0)).await;
    px.classifier.classify(&readings_event("d1", 35.0)).await;

    px.drainer
        .drain_cycle(&px.queues.critical, Channel::Critical)
        .await;

    let sent = px.mailer.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].subject,
        "[Threshold Breach Alert] 2 breach(es) detected."
    );
    // Sorted by the rendering key: same timestamp, so d1 before d2.
    let d1 = sent[0].html_body.find("<td>d1</td>").unwrap();
    let d2 = sent[0].html_body.find("<td>d2</td>").unwrap();
    assert!(d1 < d2);
}

#[tokio::test]
async fn repeated_reds_within_the_window_send_once() {
    let store = seeded_store();
    let px = pipeline(&store);

    px.classifier.classify(&readings_event("d1", 35.0)).await;
    px.drainer
        .drain_cycle(&px.queues.critical, Channel::Critical)
        .await;

    // Same sensor breaches again inside the suppression window.
    px.classifier.classify(&readings_event("d1", 36.0)).await;
    px.drainer
        .drain_cycle(&px.queues.critical, Channel::Critical)
        .await;

    assert_eq!(px.mailer.sent.lock().len(), 1);
}

#[tokio::test]
async fn transport_feeds_the_classifier() {
    let store = seeded_store();
    let px = pipeline(&store);

    // Fake event bus: accept, swallow the subscription, stream frames.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let bus = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        let subscription = lines.next_line().await.unwrap().unwrap();
        assert!(subscription.contains("\"subscribe\""));
        assert!(subscription.contains("\"c1\""));

        let frames = [
            // Valid frame for a subscribed channel.
            r#"{"channel":"c1","event":"NewReadingsEvent","data":{"device_id":"d1","time":"t0","readings":{"sensor_id":"s1","sensor_type":"temperature","value":35.0}}}"#,
            // Unknown channel: ignored.
            r#"{"channel":"c9","event":"NewReadingsEvent","data":{"device_id":"d2","time":"t0","readings":{"sensor_id":"s1","sensor_type":"temperature","value":35.0}}}"#,
            // Unknown event type: ignored.
            r#"{"channel":"c1","event":"DeviceOnlineEvent","data":{}}"#,
            // Malformed JSON: dropped.
            "{not json",
        ];
        for frame in frames {
            writer.write_all(frame.as_bytes()).await.unwrap();
            writer.write_all(b"\n").await.unwrap();
        }

        // Keep the connection open until the client shuts down.
        let _ = lines.next_line().await;
    });

    let transport = Transport::new(
        addr.to_string(),
        vec!["c1".to_string()],
        Arc::clone(&px.classifier),
    );
    let (shutdown_tx, _) = broadcast::channel(1);
    let serve = {
        let shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move { transport.serve(shutdown).await })
    };

    // Give the frames time to flow through.
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Exactly the one valid frame for the subscribed channel got through.
    assert_eq!(px.queues.critical.len(), 1);

    shutdown_tx.send(Signal::Shutdown).unwrap();
    tokio::time::timeout(Duration::from_secs(1), serve)
        .await
        .expect("transport should stop")
        .expect("transport task should not panic");
    bus.abort();
}
