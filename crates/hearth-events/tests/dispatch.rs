//! Synchronous dispatch behaviour.

use hearth_events::prelude::*;
use hearth_events::HandlerKey;
use hearth_telemetry::Logger;
use hearth_test::CapturedLogs;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default, Serialize)]
struct ChangeValue {
    value: i32,
    cancellation: Cancellation,
}

impl Event for ChangeValue {
    fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    fn cancellation_mut(&mut self) -> &mut Cancellation {
        &mut self.cancellation
    }
}

type Trace = Arc<Mutex<Vec<String>>>;

fn logger() -> Logger {
    Logger::detached("dispatch-test")
}

fn tracer(trace: &Trace, label: &str, priority: Priority) -> Arc<impl Handler<ChangeValue>> {
    let trace = Arc::clone(trace);
    let label = label.to_string();
    Arc::new(
        FnHandler::new(label.clone(), move |_event: &mut ChangeValue| {
            trace.lock().unwrap().push(label.clone());
            Ok(())
        })
        .with_priority(priority),
    )
}

fn register(bus: &EventManager, handler: Arc<impl Handler<ChangeValue>>) {
    bus.register_handler(handler, &logger()).unwrap();
}

#[test]
fn test_no_handlers_leaves_event_untouched() {
    let bus = EventManager::new();
    let event = SharedEvent::new(ChangeValue {
        value: 7,
        ..Default::default()
    });

    let summary = bus.raise(&event, &logger()).unwrap();

    assert!(summary.is_empty());
    assert_eq!(event.lock().value, 7);
    assert!(!event.is_canceled());
    assert_eq!(bus.event_type_count(), 1);
}

#[test]
fn test_handlers_run_in_priority_order() {
    let bus = EventManager::new();
    let trace = Trace::default();

    register(&bus, tracer(&trace, "lowest", Priority::Lowest));
    register(&bus, tracer(&trace, "high", Priority::High));
    register(&bus, tracer(&trace, "normal", Priority::Normal));
    register(&bus, tracer(&trace, "highest", Priority::Highest));
    register(&bus, tracer(&trace, "low", Priority::Low));

    let summary = bus
        .raise(&SharedEvent::new(ChangeValue::default()), &logger())
        .unwrap();

    assert_eq!(summary.invoked, 5);
    assert_eq!(
        *trace.lock().unwrap(),
        vec!["highest", "high", "normal", "low", "lowest"]
    );
}

#[test]
fn test_equal_priority_handlers_each_run_once() {
    let bus = EventManager::new();
    let trace = Trace::default();

    register(&bus, tracer(&trace, "a", Priority::Normal));
    register(&bus, tracer(&trace, "b", Priority::Normal));
    register(&bus, tracer(&trace, "c", Priority::Normal));

    bus.raise(&SharedEvent::new(ChangeValue::default()), &logger())
        .unwrap();

    let mut seen = trace.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["a", "b", "c"]);
}

#[test]
fn test_lower_priority_has_final_say() {
    let bus = EventManager::new();
    bus.register_handler(
        Arc::new(
            FnHandler::new("set-one", |event: &mut ChangeValue| {
                event.value = 1;
                Ok(())
            })
            .with_priority(Priority::Low),
        ),
        &logger(),
    )
    .unwrap();
    bus.register_handler(
        Arc::new(
            FnHandler::new("set-two", |event: &mut ChangeValue| {
                event.value = 2;
                Ok(())
            })
            .with_priority(Priority::High),
        ),
        &logger(),
    )
    .unwrap();

    let event = SharedEvent::new(ChangeValue::default());
    bus.raise(&event, &logger()).unwrap();

    assert_eq!(event.into_inner().unwrap().value, 1);
}

#[test]
fn test_cancellation_skips_ignoring_handlers() {
    let bus = EventManager::new();
    let skipped = Arc::new(Mutex::new(false));
    let observed = Arc::new(Mutex::new(None::<String>));

    bus.register_handler(
        Arc::new(
            FnHandler::new("veto", |event: &mut ChangeValue| {
                event.cancel_with("R");
                Ok(())
            })
            .with_priority(Priority::Highest),
        ),
        &logger(),
    )
    .unwrap();

    let flag = Arc::clone(&skipped);
    bus.register_handler(
        Arc::new(FnHandler::new("ignores-canceled", move |_: &mut ChangeValue| {
            *flag.lock().unwrap() = true;
            Ok(())
        })),
        &logger(),
    )
    .unwrap();

    let reason = Arc::clone(&observed);
    bus.register_handler(
        Arc::new(
            FnHandler::new("monitor", move |event: &mut ChangeValue| {
                *reason.lock().unwrap() = event.cancellation_reason().map(str::to_owned);
                Ok(())
            })
            .with_priority(Priority::Lowest)
            .receive_canceled(),
        ),
        &logger(),
    )
    .unwrap();

    let event = SharedEvent::new(ChangeValue::default());
    let summary = bus.raise(&event, &logger()).unwrap();

    assert!(!*skipped.lock().unwrap());
    assert_eq!(observed.lock().unwrap().as_deref(), Some("R"));
    assert_eq!(summary.invoked, 2);
    assert_eq!(summary.skipped, 1);
    assert!(event.is_canceled());
    assert_eq!(event.cancellation_reason().as_deref(), Some("R"));
}

#[test]
fn test_blocked_cancellation_reaches_publisher() {
    let bus = EventManager::new();
    bus.register_handler(
        Arc::new(FnHandler::new("blocker", |event: &mut ChangeValue| {
            event.cancel_with("blocked");
            Ok(())
        })),
        &logger(),
    )
    .unwrap();

    let event = SharedEvent::new(ChangeValue::default());
    bus.raise(&event, &logger()).unwrap();

    let event = event.into_inner().unwrap();
    assert!(event.is_canceled());
    assert_eq!(event.cancellation_reason(), Some("blocked"));
}

#[test]
fn test_failing_handlers_do_not_stop_dispatch() {
    let logs = CapturedLogs::new();
    let _guard = logs.install();

    let bus = EventManager::new();
    let trace = Trace::default();

    bus.register_handler(
        Arc::new(
            FnHandler::new("erroring", |_: &mut ChangeValue| {
                Err(anyhow::anyhow!("database offline"))
            })
            .with_priority(Priority::Highest),
        ),
        &logger(),
    )
    .unwrap();
    bus.register_handler(
        Arc::new(
            FnHandler::new("panicking", |_: &mut ChangeValue| -> anyhow::Result<()> {
                panic!("index out of range")
            })
            .with_priority(Priority::High),
        ),
        &logger(),
    )
    .unwrap();
    register(&bus, tracer(&trace, "survivor", Priority::Low));

    let event = SharedEvent::new(ChangeValue::default());
    let summary = bus.raise(&event, &logger()).unwrap();

    assert_eq!(*trace.lock().unwrap(), vec!["survivor"]);
    assert_eq!(summary.invoked, 3);
    assert_eq!(summary.faulted, 2);
    assert!(!event.is_canceled());

    let failures = logs.lines_containing("Event handler failed");
    assert_eq!(failures.len(), 2);
    assert!(
        failures
            .iter()
            .any(|line| line.contains("erroring") && line.contains("database offline"))
    );
    assert!(
        failures
            .iter()
            .any(|line| line.contains("panicking") && line.contains("index out of range"))
    );
    assert!(failures.iter().all(|line| line.contains("ChangeValue")));
}

#[test]
fn test_panic_while_locked_does_not_poison_the_event() {
    let bus = EventManager::new();
    bus.register_handler(
        Arc::new(
            FnHandler::new("half-done", |event: &mut ChangeValue| -> anyhow::Result<()> {
                event.value = 5;
                panic!("after mutating")
            })
            .with_priority(Priority::High),
        ),
        &logger(),
    )
    .unwrap();
    bus.register_handler(
        Arc::new(FnHandler::new("doubler", |event: &mut ChangeValue| {
            event.value = event.value.saturating_mul(2);
            Ok(())
        })),
        &logger(),
    )
    .unwrap();

    let event = SharedEvent::new(ChangeValue::default());
    bus.raise(&event, &logger()).unwrap();

    assert_eq!(event.lock().value, 10);
}

#[test]
fn test_deregistered_handler_no_longer_runs() {
    let bus = EventManager::new();
    let trace = Trace::default();

    let handler = tracer(&trace, "removable", Priority::Normal);
    bus.register_handler(Arc::clone(&handler), &logger())
        .unwrap();
    register(&bus, tracer(&trace, "stays", Priority::Normal));

    assert!(bus.deregister_handler::<ChangeValue, _>(&handler, &logger()));
    bus.raise(&SharedEvent::new(ChangeValue::default()), &logger())
        .unwrap();

    assert_eq!(*trace.lock().unwrap(), vec!["stays"]);
}

#[test]
fn test_deregister_unknown_handler_is_noop() {
    let bus = EventManager::new();
    let trace = Trace::default();
    register(&bus, tracer(&trace, "registered", Priority::Normal));

    let stranger = Arc::new(FnHandler::new("stranger", |_: &mut ChangeValue| Ok(())));
    assert!(!bus.deregister_handler::<ChangeValue, _>(&stranger, &logger()));

    bus.raise(&SharedEvent::new(ChangeValue::default()), &logger())
        .unwrap();
    assert_eq!(*trace.lock().unwrap(), vec!["registered"]);
}

#[test]
fn test_handler_can_deregister_itself_mid_dispatch() {
    struct OneShot {
        bus: Arc<EventManager>,
        me: Mutex<Option<Arc<OneShot>>>,
        runs: AtomicU32,
    }

    impl Handler<ChangeValue> for OneShot {
        fn handle(&self, _event: &mut ChangeValue) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if let Some(me) = self.me.lock().unwrap().take() {
                self.bus
                    .deregister_handler::<ChangeValue, _>(&me, &Logger::detached("one-shot"));
            }
            Ok(())
        }
    }

    let bus = Arc::new(EventManager::new());
    let handler = Arc::new(OneShot {
        bus: Arc::clone(&bus),
        me: Mutex::new(None),
        runs: AtomicU32::new(0),
    });
    *handler.me.lock().unwrap() = Some(Arc::clone(&handler));
    bus.register_handler(Arc::clone(&handler), &logger())
        .unwrap();

    bus.raise(&SharedEvent::new(ChangeValue::default()), &logger())
        .unwrap();
    bus.raise(&SharedEvent::new(ChangeValue::default()), &logger())
        .unwrap();

    assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
    assert_eq!(bus.collection::<ChangeValue>().handler_count(), 0);
}

#[test]
fn test_raise_and_cancel_are_logged() {
    let logs = CapturedLogs::new();
    let _guard = logs.install();

    let bus = EventManager::new();
    bus.register_handler(
        Arc::new(FnHandler::new("blocker", |event: &mut ChangeValue| {
            event.cancel_with("blocked");
            Ok(())
        })),
        &logger(),
    )
    .unwrap();

    bus.raise(
        &SharedEvent::new(ChangeValue {
            value: 42,
            ..Default::default()
        }),
        &logger(),
    )
    .unwrap();

    let raised = logs.lines_containing("Raising event");
    assert_eq!(raised.len(), 1);
    assert!(raised[0].contains("DEBUG"));
    assert!(raised[0].contains(r#""value":42"#));

    let canceled = logs.lines_containing("Event canceled");
    assert_eq!(canceled.len(), 1);
    assert!(canceled[0].contains("blocked"));
}

#[test]
fn test_snapshots_can_be_disabled() {
    let logs = CapturedLogs::new();
    let _guard = logs.install();

    let bus = EventManager::with_config(BusConfig::default().without_snapshots())
        .unwrap();
    bus.raise(
        &SharedEvent::new(ChangeValue {
            value: 42,
            ..Default::default()
        }),
        &logger(),
    )
    .unwrap();

    assert_eq!(logs.count("Raising event"), 1);
    assert!(!logs.contains(r#""value":42"#));
}

#[test]
fn test_severity_override_applies() {
    let logs = CapturedLogs::new();
    let _guard = logs.install();

    let config = BusConfig::default().with_severity_override("ChangeValue", Severity::Warn);
    let bus = EventManager::with_config(config).unwrap();
    assert_eq!(bus.collection::<ChangeValue>().severity(), Severity::Warn);

    bus.raise(&SharedEvent::new(ChangeValue::default()), &logger())
        .unwrap();

    let raised = logs.lines_containing("Raising event");
    assert_eq!(raised.len(), 1);
    assert!(raised[0].contains("WARN"));
}

#[test]
fn test_duplicate_registration_is_rejected() {
    let bus = EventManager::new();
    let handler = Arc::new(FnHandler::new("dup", |_: &mut ChangeValue| Ok(())));

    bus.register_handler(Arc::clone(&handler), &logger())
        .unwrap();
    let err = bus.register_handler(handler, &logger()).unwrap_err();

    assert!(matches!(err, EventError::AlreadyRegistered { .. }));
    assert!(err.to_string().contains("dup"));
}

#[test]
fn test_blank_handler_name_is_rejected() {
    let bus = EventManager::new();
    let err = bus
        .register_handler_with(
            Arc::new(FnHandler::new("fine", |_: &mut ChangeValue| Ok(()))),
            HandlerOptions::new().named(""),
            &logger(),
        )
        .unwrap_err();

    assert!(matches!(err, EventError::InvalidArgument { argument: "name", .. }));
    assert_eq!(bus.collection::<ChangeValue>().handler_count(), 0);
}

#[test]
fn test_handler_key_matches_registration() {
    let handler = Arc::new(FnHandler::new("keyed", |_: &mut ChangeValue| Ok(())));
    let erased: Arc<dyn Handler<ChangeValue>> = handler.clone();
    assert_eq!(HandlerKey::of(&handler), HandlerKey::of(&erased));
}

#[test]
fn test_registration_changes_are_logged() {
    let logs = CapturedLogs::new();
    let _guard = logs.install();

    let bus = EventManager::new();
    let handler = Arc::new(
        FnHandler::new("spawn-guard", |_: &mut ChangeValue| Ok(()))
            .with_priority(Priority::High),
    );
    bus.register_handler(Arc::clone(&handler), &logger())
        .unwrap();

    let registered = logs.lines_containing("Handler registered");
    assert_eq!(registered.len(), 1);
    assert!(registered[0].contains("DEBUG"));
    assert!(registered[0].contains("spawn-guard"));
    assert!(registered[0].contains("ChangeValue"));
    assert!(registered[0].contains("high"));

    assert!(bus.deregister_handler::<ChangeValue, _>(&handler, &logger()));
    assert!(!bus.deregister_handler::<ChangeValue, _>(&handler, &logger()));

    let deregistered = logs.lines_containing("Handler deregistered");
    assert_eq!(deregistered.len(), 1);
    assert!(deregistered[0].contains("spawn-guard"));
    assert!(deregistered[0].contains("ChangeValue"));
}

#[test]
fn test_async_registration_changes_are_logged() {
    let logs = CapturedLogs::new();
    let _guard = logs.install();

    let bus = EventManager::new();
    let handler = Arc::new(FnAsyncHandler::new(
        "webhook",
        |_event: SharedEvent<ChangeValue>| async { Ok(()) },
    ));
    bus.register_async_handler(Arc::clone(&handler), &logger())
        .unwrap();

    let registered = logs.lines_containing("Async handler registered");
    assert_eq!(registered.len(), 1);
    assert!(registered[0].contains("webhook"));
    assert!(registered[0].contains("ChangeValue"));

    assert!(bus.deregister_async_handler::<ChangeValue, _>(&handler, &logger()));
    assert!(!bus.deregister_async_handler::<ChangeValue, _>(&handler, &logger()));

    let deregistered = logs.lines_containing("Async handler deregistered");
    assert_eq!(deregistered.len(), 1);
    assert!(deregistered[0].contains("webhook"));
    assert!(deregistered[0].contains("ChangeValue"));
}

#[test]
fn test_deregistering_unknown_handler_logs_nothing() {
    let logs = CapturedLogs::new();
    let _guard = logs.install();

    let bus = EventManager::new();
    bus.collection::<ChangeValue>();
    let stranger = Arc::new(FnHandler::new("stranger", |_: &mut ChangeValue| Ok(())));

    assert!(!bus.deregister_handler::<ChangeValue, _>(&stranger, &logger()));
    assert_eq!(logs.count("deregistered"), 0);
}
