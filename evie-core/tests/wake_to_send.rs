use std::sync::Arc;
use std::time::Duration;

use evie_core::classifier::stub::{ClassifierProbe, ManualClassifierFactory};
use evie_core::dispatch::intent::{IntentOutcome, SmsIntent};
use evie_core::dispatch::stub::ScriptedIntent;
use evie_core::ipc::events::{DispatchEvent, ListenerState};
use evie_core::permissions::stub::StaticPermissions;
use evie_core::permissions::{PermissionKind, PermissionStatus};
use evie_core::{
    DispatchConfig, DispatchOrchestrator, DispatchStatus, IntentTransport, ListenerConfig,
    MessageBinding, MessageDispatcher, PermissionBackend, PermissionGateway, Platform,
    SmsTransport, WakeWordListener,
};
use tokio::sync::broadcast::{self, error::TryRecvError};

const KEY: &str = "dGVzdC1hY2Nlc3Mta2V5";

struct Harness {
    listener: WakeWordListener,
    probe: ClassifierProbe,
    intent: Arc<ScriptedIntent>,
    orchestrator: Arc<DispatchOrchestrator>,
    events: broadcast::Receiver<DispatchEvent>,
}

fn harness(permissions: StaticPermissions) -> Harness {
    let gateway = Arc::new(PermissionGateway::new(
        Arc::new(permissions) as Arc<dyn PermissionBackend>
    ));
    let factory = ManualClassifierFactory::new();
    let probe = factory.probe();
    let listener = WakeWordListener::new(
        ListenerConfig::default(),
        Arc::new(factory),
        Arc::clone(&gateway),
    );

    let intent = Arc::new(ScriptedIntent::new());
    let transport = IntentTransport::new(gateway, Arc::clone(&intent) as Arc<dyn SmsIntent>);
    let dispatcher = MessageDispatcher::new(
        DispatchConfig::default(),
        Arc::new(transport) as Arc<dyn SmsTransport>,
    );
    let orchestrator = Arc::new(DispatchOrchestrator::new(Arc::new(dispatcher)));
    orchestrator.bind(MessageBinding {
        recipient: "(555) 123-4567".into(),
        body: "I need help, please call me.".into(),
        contact_name: Some("Jordan".into()),
    });
    let events = orchestrator.subscribe();
    tokio::spawn(Arc::clone(&orchestrator).run(listener.subscribe_detections()));

    Harness {
        listener,
        probe,
        intent,
        orchestrator,
        events,
    }
}

#[tokio::test(start_paused = true)]
async fn wake_word_sends_bound_message() {
    let mut h = harness(StaticPermissions::granting_all(Platform::Intent));
    h.listener
        .initialize(KEY, "hey evie", 0.6)
        .await
        .expect("initialize");
    h.listener.start().expect("start");

    assert!(h.probe.detect());
    let event = tokio::time::timeout(Duration::from_secs(5), h.events.recv())
        .await
        .expect("dispatch event in time")
        .expect("dispatch event");

    assert!(event.result.success);
    assert_eq!(event.result.status, DispatchStatus::Sent);
    assert_eq!(event.result.attempts, 1);
    assert_eq!(event.keyword, "hey evie");
    assert_eq!(event.announcement, "Message sent to Jordan.");
    assert_eq!(
        h.intent.composed(),
        vec![(
            vec!["+15551234567".to_string()],
            "I need help, please call me.".to_string()
        )]
    );

    // Back to listening once the processing window passes.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.listener.state(), ListenerState::Listening);
}

#[tokio::test(start_paused = true)]
async fn repeated_detection_within_processing_window_sends_once() {
    let mut h = harness(StaticPermissions::granting_all(Platform::Intent));
    h.listener
        .initialize(KEY, "hey evie", 0.5)
        .await
        .expect("initialize");
    h.listener.start().expect("start");

    h.probe.detect();
    h.probe.detect();
    h.events.recv().await.expect("first dispatch");

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(matches!(h.events.try_recv(), Err(TryRecvError::Empty)));
    assert_eq!(h.intent.composed().len(), 1);
    assert_eq!(h.orchestrator.dropped_detections(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_compose_is_reported_without_retry() {
    let mut h = harness(StaticPermissions::granting_all(Platform::Intent));
    h.intent.push_outcome(IntentOutcome::cancelled());
    h.listener
        .initialize(KEY, "hey evie", 0.5)
        .await
        .expect("initialize");
    h.listener.start().expect("start");

    h.probe.detect();
    let event = h.events.recv().await.expect("dispatch event");
    assert_eq!(event.result.status, DispatchStatus::Cancelled);
    assert_eq!(event.result.attempts, 1);
    assert!(event.fallback.is_none());
}

#[tokio::test]
async fn refused_microphone_blocks_listener() {
    let permissions = StaticPermissions::new(Platform::Intent);
    permissions.set_status(PermissionKind::Microphone, PermissionStatus::NeverAskAgain);
    let h = harness(permissions);

    let err = h
        .listener
        .initialize(KEY, "hey evie", 0.5)
        .await
        .expect_err("microphone refused");
    assert_eq!(err.code(), "PERMISSION_DENIED");
    assert_eq!(h.listener.state(), ListenerState::PermissionDenied);
    assert_eq!(h.probe.creates(), 0);
    assert_eq!(h.listener.start().expect_err("blocked").code(), "PERMISSION_DENIED");
}
