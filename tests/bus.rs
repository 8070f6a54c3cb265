use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use agentvisor::{
    BusError, ComponentError, ERROR_TOPIC, HandlerFn, HandlerRef, Message, MessageBus,
    MessageBusConfig, MessageType, Priority, RoutePattern, RouteTarget, RoutingRule,
};

fn fast(cfg: MessageBusConfig) -> MessageBusConfig {
    MessageBusConfig {
        processing_interval: Duration::from_millis(1),
        ..cfg
    }
}

/// Handler that records the action of every message it sees.
fn recorder(name: &'static str) -> (HandlerRef, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: HandlerRef = HandlerFn::arc(name, move |msg: Arc<Message>| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(msg.payload().action.clone());
            Ok::<_, ComponentError>(())
        }
    });
    (handler, seen)
}

fn event(source: &str, action: &str) -> Message {
    Message::new(MessageType::Event, source, action)
}

#[tokio::test(start_paused = true)]
async fn test_delivers_by_priority_then_fifo() {
    let bus = MessageBus::new(MessageBusConfig {
        processing_interval: Duration::from_millis(50),
        ..MessageBusConfig::default()
    });
    let (handler, seen) = recorder("order");
    bus.subscribe("t", handler);

    bus.publish("t", event("s", "low").with_priority(Priority::Low)).unwrap();
    bus.publish("t", event("s", "normal-1")).unwrap();
    bus.publish("t", event("s", "high").with_priority(Priority::High)).unwrap();
    bus.publish("t", event("s", "critical").with_priority(Priority::Critical)).unwrap();
    bus.publish("t", event("s", "normal-2")).unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(
        *seen.lock().unwrap(),
        ["critical", "high", "normal-1", "normal-2", "low"]
    );
    assert_eq!(bus.metrics().delivered, 5);
}

#[tokio::test(start_paused = true)]
async fn test_batch_size_bounds_one_cycle() {
    let bus = MessageBus::new(MessageBusConfig {
        processing_interval: Duration::from_millis(10),
        batch_size: 2,
        ..MessageBusConfig::default()
    });
    let (handler, seen) = recorder("batch");
    bus.subscribe("t", handler);
    for i in 0..5 {
        bus.publish("t", event("s", &format!("m{i}"))).unwrap();
    }

    tokio::time::sleep(Duration::from_millis(15)).await;
    assert_eq!(seen.lock().unwrap().len(), 2);
    assert_eq!(bus.queue_status().pending(), 3);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(seen.lock().unwrap().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_full_queue_rejects_until_drained() {
    let bus = MessageBus::new(MessageBusConfig {
        max_queue_size: 2,
        processing_interval: Duration::from_millis(10),
        ..MessageBusConfig::default()
    });

    bus.publish("t", event("s", "a")).unwrap();
    bus.publish("t", event("s", "b")).unwrap();
    let err = bus.publish("t", event("s", "c")).unwrap_err();
    assert!(err.is_capacity());
    assert!(matches!(err, BusError::Capacity { limit: 2 }));

    // no subscribers still counts as delivered
    tokio::time::sleep(Duration::from_millis(15)).await;
    bus.publish("t", event("s", "c")).unwrap();

    let m = bus.metrics();
    assert_eq!(m.published, 3);
    assert_eq!(m.rejected, 1);
    assert_eq!(m.delivered, 2);
}

#[tokio::test(start_paused = true)]
async fn test_expired_message_is_never_delivered() {
    let bus = MessageBus::new(MessageBusConfig {
        processing_interval: Duration::from_millis(50),
        ..MessageBusConfig::default()
    });
    let (handler, seen) = recorder("late");
    bus.subscribe("t", handler);

    bus.publish("t", event("s", "stale").with_ttl(Duration::from_millis(5)))
        .unwrap();
    bus.publish("t", event("s", "fresh")).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert_eq!(*seen.lock().unwrap(), ["fresh"]);
    let m = bus.metrics();
    assert_eq!(m.expired, 1);
    assert_eq!(m.delivered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_delivery_retries_with_backoff_then_reports() {
    let bus = MessageBus::new(fast(MessageBusConfig {
        retry_attempts: 3,
        retry_delay: Duration::from_millis(100),
        ..MessageBusConfig::default()
    }));

    let calls: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);
    bus.subscribe(
        "jobs",
        HandlerFn::arc("flaky", move |_msg: Arc<Message>| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(Instant::now());
                Err::<(), _>(ComponentError::fail("backend down"))
            }
        }),
    );

    let reports: Arc<Mutex<Vec<Arc<Message>>>> = Arc::new(Mutex::new(Vec::new()));
    let report_sink = Arc::clone(&reports);
    bus.subscribe(
        ERROR_TOPIC,
        HandlerFn::arc("errors", move |msg: Arc<Message>| {
            let sink = Arc::clone(&report_sink);
            async move {
                sink.lock().unwrap().push(msg);
                Ok::<_, ComponentError>(())
            }
        }),
    );

    let id = bus.publish("jobs", event("cli", "build")).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let calls = calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 4, "one attempt plus three retries");
    let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
    for (gap, expected) in gaps.iter().zip([100u64, 200, 400]) {
        let expected = Duration::from_millis(expected);
        assert!(
            *gap >= expected && *gap <= expected + Duration::from_millis(5),
            "gap {gap:?}, expected about {expected:?}"
        );
    }

    let reports = reports.lock().unwrap().clone();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.kind(), MessageType::Error);
    assert_eq!(report.priority(), Priority::Critical);
    assert_eq!(report.correlation_id(), Some(id));
    assert_eq!(report.payload().data["attempts"], 4);
    assert_eq!(report.payload().data["topic"], "jobs");
    assert_eq!(report.payload().data["action"], "build");

    let m = bus.metrics();
    assert_eq!(m.retried, 3);
    assert_eq!(m.abandoned, 1);
    assert_eq!(m.failed_attempts, 4);
    assert_eq!(m.pending_retries, 0);
}

#[tokio::test(start_paused = true)]
async fn test_due_retry_joins_the_tail_of_its_lane() {
    let bus = MessageBus::new(fast(MessageBusConfig {
        batch_size: 1,
        retry_attempts: 1,
        retry_delay: Duration::from_millis(10),
        ..MessageBusConfig::default()
    }));
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let failed_once = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let (sink, flag) = (Arc::clone(&seen), Arc::clone(&failed_once));
    bus.subscribe(
        "t",
        HandlerFn::arc("first-x-fails", move |msg: Arc<Message>| {
            let sink = Arc::clone(&sink);
            let flag = Arc::clone(&flag);
            async move {
                let action = msg.payload().action.clone();
                sink.lock().unwrap().push(action.clone());
                if action == "x" && !flag.swap(true, std::sync::atomic::Ordering::SeqCst) {
                    return Err(ComponentError::fail("first attempt"));
                }
                Ok(())
            }
        }),
    );

    bus.publish("t", event("s", "x")).unwrap();
    tokio::time::sleep(Duration::from_millis(3)).await;
    assert_eq!(bus.queue_status().pending_retries, 1);

    // one message per cycle: the backlog is still queued when the retry comes due
    for i in 0..20 {
        bus.publish("t", event("s", &format!("y{i}"))).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut expected = vec!["x".to_string()];
    expected.extend((0..20).map(|i| format!("y{i}")));
    expected.push("x".to_string());
    assert_eq!(*seen.lock().unwrap(), expected);
    assert_eq!(bus.metrics().retried, 1);
    assert_eq!(bus.metrics().delivered, 21);
}

#[tokio::test(start_paused = true)]
async fn test_pending_retries_count_toward_capacity() {
    let bus = MessageBus::new(fast(MessageBusConfig {
        max_queue_size: 1,
        retry_attempts: 3,
        retry_delay: Duration::from_secs(60),
        ..MessageBusConfig::default()
    }));
    bus.subscribe(
        "t",
        HandlerFn::arc("down", |_msg: Arc<Message>| async move {
            Err::<(), _>(ComponentError::fail("backend down"))
        }),
    );

    bus.publish("t", event("s", "a")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let status = bus.queue_status();
    assert_eq!(status.lanes.total(), 0);
    assert_eq!(status.pending_retries, 1);
    assert_eq!(status.pending(), 1);

    let err = bus.publish("t", event("s", "b")).unwrap_err();
    assert!(matches!(err, BusError::Capacity { limit: 1 }));
    assert_eq!(bus.metrics().rejected, 1);
}

#[tokio::test(start_paused = true)]
async fn test_huge_retry_delay_keeps_the_loop_alive() {
    let bus = MessageBus::new(fast(MessageBusConfig {
        retry_attempts: 2,
        retry_delay: Duration::MAX,
        ..MessageBusConfig::default()
    }));
    bus.subscribe(
        "bad",
        HandlerFn::arc("down", |_msg: Arc<Message>| async move {
            Err::<(), _>(ComponentError::fail("backend down"))
        }),
    );
    let (good, seen) = recorder("good");
    bus.subscribe("good", good);

    bus.publish("bad", event("s", "parked")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    bus.publish("good", event("s", "after")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(bus.is_running());
    assert_eq!(*seen.lock().unwrap(), ["after"]);
    assert_eq!(bus.queue_status().pending_retries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_handler_does_not_starve_others() {
    let bus = MessageBus::new(fast(MessageBusConfig {
        retry_attempts: 0,
        ..MessageBusConfig::default()
    }));
    let (good, seen) = recorder("good");
    bus.subscribe("t", good);
    bus.subscribe(
        "t",
        HandlerFn::arc("bad", |_msg: Arc<Message>| async move {
            Err::<(), _>(ComponentError::fail("nope"))
        }),
    );
    bus.subscribe(
        "t",
        HandlerFn::arc("panicky", |_msg: Arc<Message>| async move {
            if true {
                panic!("handler blew up");
            }
            Ok::<_, ComponentError>(())
        }),
    );

    bus.publish("t", event("s", "work")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(*seen.lock().unwrap(), ["work"]);
    assert_eq!(bus.metrics().abandoned, 1);

    // the loop survives the panic
    bus.publish("t", event("s", "more")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(*seen.lock().unwrap(), ["work", "more"]);
}

#[tokio::test(start_paused = true)]
async fn test_routing_rules_then_target_fallback() {
    let bus = MessageBus::new(fast(MessageBusConfig::default()));
    let (audit, audit_seen) = recorder("audit");
    let (ui, ui_seen) = recorder("ui");
    let (other, other_seen) = recorder("other");
    bus.subscribe("audit", audit);
    bus.subscribe("ui", ui);
    bus.subscribe("other", other);

    let rule = bus.add_routing_rule(RoutingRule::new(
        RoutePattern::literal("sensor"),
        RouteTarget::component("audit"),
    ));

    bus.send(event("sensor", "reading").to("ui")).unwrap();
    bus.send(event("cli", "refresh").to("ui")).unwrap();
    bus.send(event("cli", "hello")).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(*audit_seen.lock().unwrap(), ["reading", "hello"]);
    assert_eq!(*ui_seen.lock().unwrap(), ["refresh", "hello"]);
    assert_eq!(*other_seen.lock().unwrap(), ["hello"]);

    assert!(bus.remove_routing_rule(rule));
    assert!(bus.routing_rules().is_empty());
    let n = bus
        .route(Arc::new(event("sensor", "direct").to("ui")))
        .await
        .unwrap();
    assert_eq!(n, 1);
    assert_eq!(ui_seen.lock().unwrap().last().unwrap(), "direct");
}

#[tokio::test(start_paused = true)]
async fn test_regex_rule_can_broadcast() {
    let bus = MessageBus::new(fast(MessageBusConfig::default()));
    let (a, a_seen) = recorder("a");
    let (b, b_seen) = recorder("b");
    bus.subscribe("a", a);
    bus.subscribe("b", b);
    bus.add_routing_rule(RoutingRule::new(
        RoutePattern::regex("^heartbeat$").unwrap(),
        RouteTarget::Broadcast,
    ));

    let n = bus
        .route(Arc::new(
            Message::new(MessageType::Heartbeat, "a", "beat").to("a"),
        ))
        .await
        .unwrap();

    assert_eq!(n, 2);
    assert_eq!(*a_seen.lock().unwrap(), ["beat"]);
    assert_eq!(*b_seen.lock().unwrap(), ["beat"]);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_message_is_rejected() {
    let bus = MessageBus::new(MessageBusConfig::default());

    let err = bus.publish("t", event("", "x")).unwrap_err();
    assert!(matches!(err, BusError::Validation { field: "source", .. }));
    let err = bus.send(event("s", "  ")).unwrap_err();
    assert_eq!(err.as_label(), "bus_validation");

    assert_eq!(bus.metrics().rejected, 2);
    assert_eq!(bus.queue_status().pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_discards_pending_and_stops_publish() {
    let bus = MessageBus::new(MessageBusConfig {
        processing_interval: Duration::from_secs(3600),
        ..MessageBusConfig::default()
    });
    let (handler, seen) = recorder("never");
    bus.subscribe("t", handler);
    bus.publish("t", event("s", "a")).unwrap();
    bus.publish("t", event("s", "b")).unwrap();

    assert_eq!(bus.shutdown().await, 2);
    assert!(!bus.is_running());
    assert!(matches!(
        bus.publish("t", event("s", "c")),
        Err(BusError::Stopped)
    ));
    // idempotent
    assert_eq!(bus.shutdown().await, 0);
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_from_inside_a_handler_returns() {
    let bus = MessageBus::new(fast(MessageBusConfig::default()));
    let dropped: Arc<Mutex<Option<usize>>> = Arc::new(Mutex::new(None));
    let (ctl, sink) = (bus.clone(), Arc::clone(&dropped));
    bus.subscribe(
        "ctl",
        HandlerFn::arc("stopper", move |_msg: Arc<Message>| {
            let ctl = ctl.clone();
            let sink = Arc::clone(&sink);
            async move {
                let n = ctl.shutdown().await;
                *sink.lock().unwrap() = Some(n);
                Ok::<_, ComponentError>(())
            }
        }),
    );
    let (handler, seen) = recorder("after");
    bus.subscribe("t", handler);

    bus.publish("ctl", event("cli", "stop").with_priority(Priority::High))
        .unwrap();
    bus.publish("t", event("cli", "late")).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(*dropped.lock().unwrap(), Some(1));
    assert!(!bus.is_running());
    assert!(seen.lock().unwrap().is_empty());
    assert!(matches!(
        bus.publish("t", event("s", "x")),
        Err(BusError::Stopped)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_prunes_empty_topics() {
    let bus = MessageBus::new(MessageBusConfig::default());
    let (h1, _) = recorder("one");
    let (h2, _) = recorder("two");
    let s1 = bus.subscribe("alpha", h1);
    let s2 = bus.subscribe("beta", h2);
    assert_eq!(bus.topics(), ["alpha", "beta"]);

    assert!(bus.unsubscribe(s1));
    assert!(!bus.unsubscribe(s1));
    assert_eq!(bus.topics(), ["beta"]);
    assert_eq!(bus.subscriber_count("alpha"), 0);

    assert!(bus.unsubscribe(s2));
    assert!(bus.topics().is_empty());
}
