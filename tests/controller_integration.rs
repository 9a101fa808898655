//! Integration tests for the controller loop.
//!
//! These drive the spawned controller through its public handle with a
//! deterministic stub effect runner, and observe it only through the UI
//! snapshot watch, the same way a presentation layer would.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use quantumviz_voice::effects::StubEffectRunner;
use quantumviz_voice::state_machine::{Event, DISPATCH_FALLBACK};
use quantumviz_voice::{ControllerHandle, UiSnapshot, UiState};

async fn wait_for(
    ui: &mut watch::Receiver<UiSnapshot>,
    pred: impl Fn(&UiSnapshot) -> bool,
) -> UiSnapshot {
    timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = ui.borrow_and_update().clone();
            if pred(&snapshot) {
                return snapshot;
            }
            ui.changed().await.expect("controller loop ended early");
        }
    })
    .await
    .expect("condition not reached in time")
}

fn idle(snapshot: &UiSnapshot) -> bool {
    matches!(snapshot.state, UiState::Idle)
}

#[tokio::test]
async fn typed_turn_round_trips_through_dispatch() {
    let runner = StubEffectRunner {
        chat_reply: Ok("Hello".to_string()),
        ..StubEffectRunner::default()
    };
    let controller = ControllerHandle::spawn(Arc::new(runner));
    let mut ui = controller.ui();

    controller
        .send(Event::SendText { text: "Hi".into() })
        .await
        .unwrap();

    let snapshot = wait_for(&mut ui, |s| idle(s) && s.messages.len() == 2).await;
    let turns: Vec<(&str, bool)> = snapshot
        .messages
        .iter()
        .map(|m| (m.text.as_str(), m.is_user))
        .collect();
    assert_eq!(turns, vec![("Hi", true), ("Hello", false)]);
}

#[tokio::test]
async fn failed_dispatch_surfaces_the_fallback_reply() {
    let runner = StubEffectRunner {
        chat_reply: Err("connection refused".to_string()),
        ..StubEffectRunner::default()
    };
    let controller = ControllerHandle::spawn(Arc::new(runner));
    let mut ui = controller.ui();

    controller
        .send(Event::SendText { text: "Hi".into() })
        .await
        .unwrap();

    let snapshot = wait_for(&mut ui, |s| idle(s) && s.messages.len() == 2).await;
    let last = snapshot.messages.last().unwrap();
    assert_eq!(last.text, DISPATCH_FALLBACK);
    assert!(!last.is_user);
    // The user's turn is still there, unedited.
    assert_eq!(snapshot.messages[0].text, "Hi");
    assert!(snapshot.messages[0].is_user);
}

#[tokio::test]
async fn blank_input_never_enters_the_conversation() {
    let controller = ControllerHandle::spawn(Arc::new(StubEffectRunner::default()));
    let mut ui = controller.ui();

    controller
        .send(Event::SendText { text: "   ".into() })
        .await
        .unwrap();
    // A follow-up real turn flushes past the rejected one.
    controller
        .send(Event::SendText { text: "real".into() })
        .await
        .unwrap();

    let snapshot = wait_for(&mut ui, |s| idle(s) && s.messages.len() >= 2).await;
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[0].text, "real");
}

#[tokio::test]
async fn voice_session_flows_from_capture_to_reply() {
    let runner = StubEffectRunner {
        transcription: Some("make a bell state".to_string()),
        chat_reply: Ok("Here is a Bell state circuit.".to_string()),
    };
    let controller = ControllerHandle::spawn(Arc::new(runner));
    let mut ui = controller.ui();

    controller.send(Event::StartRecording).await.unwrap();
    wait_for(&mut ui, |s| matches!(s.state, UiState::Recording { .. })).await;

    controller.send(Event::StopRecording).await.unwrap();

    let snapshot = wait_for(&mut ui, |s| idle(s) && s.messages.len() == 2).await;
    assert_eq!(snapshot.messages[0].text, "make a bell state");
    assert!(snapshot.messages[0].is_user);
    assert_eq!(snapshot.messages[1].text, "Here is a Bell state circuit.");
    assert!(!snapshot.messages[1].is_user);
}

#[tokio::test]
async fn empty_recording_settles_to_idle_without_a_turn() {
    let runner = StubEffectRunner {
        transcription: None,
        ..StubEffectRunner::default()
    };
    let controller = ControllerHandle::spawn(Arc::new(runner));
    let mut ui = controller.ui();

    controller.send(Event::StartRecording).await.unwrap();
    wait_for(&mut ui, |s| matches!(s.state, UiState::Recording { .. })).await;
    controller.send(Event::StopRecording).await.unwrap();

    let snapshot = wait_for(&mut ui, idle).await;
    assert!(snapshot.messages.is_empty());
}

#[tokio::test]
async fn cancel_during_recording_discards_the_session() {
    let controller = ControllerHandle::spawn(Arc::new(StubEffectRunner::default()));
    let mut ui = controller.ui();

    controller.send(Event::StartRecording).await.unwrap();
    wait_for(&mut ui, |s| matches!(s.state, UiState::Recording { .. })).await;

    controller.send(Event::Cancel).await.unwrap();

    let snapshot = wait_for(&mut ui, idle).await;
    assert!(snapshot.messages.is_empty());

    // The controller is still usable afterwards.
    controller
        .send(Event::SendText { text: "still here".into() })
        .await
        .unwrap();
    let snapshot = wait_for(&mut ui, |s| idle(s) && s.messages.len() == 2).await;
    assert_eq!(snapshot.messages[0].text, "still here");
}
