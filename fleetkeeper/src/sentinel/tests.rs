use crate::connection::mock::{Call, MockConnector, MockNode};
use crate::notify::{ChannelNotifier, Code, NoticeBody};
use crate::sentinel::*;
use futures_util::stream;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

fn switch_event(payload: &str) -> SentinelEvent {
    SentinelEvent::new(SWITCH_MASTER, payload)
}

#[test]
fn test_classify_switch_master() {
    let signal =
        SentinelEventClassifier::classify(&switch_event("mymaster 127.0.0.1 6379 127.0.0.1 6380"));

    match signal {
        Signal::Failover(switch) => {
            assert_eq!(switch.master_name, "mymaster");
            assert_eq!(switch.old.to_string(), "127.0.0.1:6379");
            assert_eq!(switch.new.to_string(), "127.0.0.1:6380");
        }
        other => panic!("expected failover, got {:?}", other),
    }
}

#[test]
fn test_classify_short_switch_master_is_advisory_error() {
    let signal = SentinelEventClassifier::classify(&switch_event("mymaster 127.0.0.1 6379"));

    match signal {
        Signal::AdvisoryError {
            channel, reason, ..
        } => {
            assert_eq!(channel, SWITCH_MASTER);
            assert!(reason.contains("found 3"));
        }
        other => panic!("expected advisory error, got {:?}", other),
    }
}

#[test]
fn test_classify_other_channels_are_advisories() {
    for channel in SENTINEL_CHANNELS.iter().filter(|c| **c != SWITCH_MASTER) {
        let event = SentinelEvent::new(*channel, "master mymaster 127.0.0.1 6379");
        assert_eq!(
            SentinelEventClassifier::classify(&event),
            Signal::Advisory {
                channel: channel.to_string(),
                payload: "master mymaster 127.0.0.1 6379".to_string(),
            }
        );
    }

    // Unknown channels still pass through
    let event = SentinelEvent::new("+brand-new-event", "x");
    assert!(matches!(
        SentinelEventClassifier::classify(&event),
        Signal::Advisory { .. }
    ));
}

#[tokio::test]
async fn test_loop_continues_after_malformed_event() {
    let events = stream::iter(vec![
        switch_event("mymaster 127.0.0.1 6379"),
        SentinelEvent::new("+sdown", "master mymaster 127.0.0.1 6379"),
        switch_event("mymaster 127.0.0.1 6379 127.0.0.1 6380"),
    ]);

    let mut classifier = SentinelEventClassifier::new();
    let mut seen = Vec::new();
    let stats = classifier
        .run(events, pending::<()>(), |signal| seen.push(signal))
        .await;

    assert_eq!(seen.len(), 3);
    assert!(matches!(seen[0], Signal::AdvisoryError { .. }));
    assert!(matches!(seen[1], Signal::Advisory { .. }));
    assert!(seen[2].is_failover());

    assert_eq!(stats.events, 3);
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.failovers, 1);
    assert_eq!(stats.advisories, 1);
    assert_eq!(classifier.state(), ListenerState::Terminated);
}

#[tokio::test]
async fn test_terminated_classifier_ignores_events() {
    let mut classifier = SentinelEventClassifier::new();
    classifier.terminate();

    assert!(classifier.observe(&switch_event("m 1.1.1.1 1 2.2.2.2 2")).is_none());
    assert_eq!(classifier.stats().events, 0);

    // Running a terminated classifier returns immediately
    let stats = classifier
        .run(stream::iter(vec![switch_event("x")]), pending::<()>(), |_| {
            panic!("no signal expected")
        })
        .await;
    assert_eq!(stats.events, 0);
}

#[tokio::test]
async fn test_stop_future_terminates_listening() {
    let mut classifier = SentinelEventClassifier::new();
    let stats = classifier
        .run(stream::pending::<SentinelEvent>(), async {}, |_| {})
        .await;

    assert_eq!(stats.events, 0);
    assert_eq!(classifier.state(), ListenerState::Terminated);
}

#[tokio::test]
async fn test_monitor_notifies_each_signal() {
    let connector = MockConnector::new();
    connector.add(
        "10.0.0.1:26379",
        MockNode {
            events: vec![
                SentinelEvent::new("+sdown", "slave 10.0.0.3:6379 10.0.0.3 6379 @ mymaster 10.0.0.2 6379"),
                switch_event("mymaster 10.0.0.2 6379 10.0.0.3 6379"),
                switch_event("broken"),
            ],
            ..Default::default()
        },
    );
    let (notifier, mut rx) = ChannelNotifier::new(16);
    let monitor = SentinelMonitor::new(
        Arc::new(connector.clone()),
        Arc::new(notifier),
        None,
        Duration::from_secs(5),
    );

    let stats = monitor.run("10.0.0.1:26379", pending()).await.unwrap();
    assert_eq!(stats.events, 3);

    let advisory = rx.recv().await.unwrap();
    assert_eq!(advisory.code, Code::Success);
    assert_eq!(
        advisory.body,
        NoticeBody::Content(
            "+sdown slave 10.0.0.3:6379 10.0.0.3 6379 @ mymaster 10.0.0.2 6379".to_string()
        )
    );

    let failover = rx.recv().await.unwrap();
    assert_eq!(failover.code, Code::MonitorSentinelError);
    assert!(failover.text().contains("from 10.0.0.2:6379 to 10.0.0.3:6379"));

    let malformed = rx.recv().await.unwrap();
    assert!(malformed.is_error());
    assert!(malformed.text().contains("malformed"));

    // The mock stream ends on its own, which is reported like a lost sentinel
    let closed = rx.recv().await.unwrap();
    assert_eq!(closed.code, Code::MonitorSentinelError);
    assert_eq!(closed.text(), "sentinel 10.0.0.1:26379: event stream closed");

    // Command connection released once the subscription is up
    assert_eq!(connector.open_connections(), 0);
    assert!(connector.calls().contains(&Call::Subscribe("10.0.0.1:26379".to_string())));
}

#[tokio::test]
async fn test_monitor_stop_is_not_reported() {
    let connector = MockConnector::new();
    connector.add(
        "10.0.0.1:26379",
        MockNode {
            events: vec![SentinelEvent::new("+sdown", "master mymaster 10.0.0.2 6379")],
            hold_stream: true,
            ..Default::default()
        },
    );
    let (notifier, mut rx) = ChannelNotifier::new(16);
    let monitor = SentinelMonitor::new(
        Arc::new(connector),
        Arc::new(notifier),
        None,
        Duration::from_secs(5),
    );

    let stats = monitor
        .run(
            "10.0.0.1:26379",
            tokio::time::sleep(Duration::from_millis(50)),
        )
        .await
        .unwrap();
    assert_eq!(stats.events, 1);
    drop(monitor);

    let advisory = rx.recv().await.unwrap();
    assert!(!advisory.is_error());
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn test_monitor_reports_unreachable_sentinel() {
    let connector = MockConnector::new();
    let (notifier, mut rx) = ChannelNotifier::new(4);
    let monitor = SentinelMonitor::new(
        Arc::new(connector),
        Arc::new(notifier),
        None,
        Duration::from_secs(5),
    );

    assert!(monitor.run("10.0.0.9:26379", pending()).await.is_err());

    let notice = rx.recv().await.unwrap();
    assert_eq!(notice.code, Code::MonitorSentinelError);
    assert!(notice.text().contains("10.0.0.9:26379"));
}
