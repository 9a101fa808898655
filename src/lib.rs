//! Voice-interaction controller for the QuantumViz client.
//!
//! The controller owns a single-writer event loop: user actions and effect
//! completions arrive on one channel, the pure reducer in `state_machine`
//! produces the next model plus effects, and the effect runner executes
//! those effects off the loop. The presentation layer observes the
//! controller only through published `UiSnapshot` values.

pub mod audio;
pub mod backend;
pub mod chat;
pub mod effects;
pub mod settings;
pub mod state_machine;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, watch};

use chat::ChatMessage;
use effects::EffectRunner;
use state_machine::{reduce, Effect, Event, Model, Phase};

/// UI-facing phase, serialized as a tagged union:
/// `{ "status": "idle" }` or `{ "status": "recording", "elapsedSecs": 5 }`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum UiState {
    Idle,
    Arming,
    Recording {
        #[serde(rename = "elapsedSecs")]
        elapsed_secs: u64,
    },
    Stopping,
    Transcribing,
    Dispatching,
    Error {
        message: String,
    },
}

impl Default for UiState {
    fn default() -> Self {
        UiState::Idle
    }
}

/// Everything the presentation layer needs to render: the current phase
/// and the full conversation so far.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UiSnapshot {
    pub state: UiState,
    pub messages: Vec<ChatMessage>,
}

fn snapshot_of(model: &Model) -> UiSnapshot {
    let state = match &model.phase {
        Phase::Idle => UiState::Idle,
        Phase::Arming { .. } => UiState::Arming,
        Phase::Recording { elapsed_secs, .. } => UiState::Recording {
            elapsed_secs: *elapsed_secs,
        },
        Phase::Stopping { .. } => UiState::Stopping,
        Phase::Transcribing { .. } => UiState::Transcribing,
        Phase::Dispatching { .. } => UiState::Dispatching,
        Phase::Error { message } => UiState::Error {
            message: message.clone(),
        },
    };
    UiSnapshot {
        state,
        messages: model.log.messages().to_vec(),
    }
}

/// Run the controller loop until an `Exit` event or the last sender is
/// dropped. `tx` is handed to the effect runner so completions feed back
/// into the same queue.
pub async fn run_controller(
    mut rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    effect_runner: Arc<dyn EffectRunner>,
    ui_tx: watch::Sender<UiSnapshot>,
) {
    let mut model = Model::default();

    let _ = ui_tx.send(snapshot_of(&model));
    tracing::info!("controller loop started");

    while let Some(event) = rx.recv().await {
        tracing::debug!(?event, "received event");

        // Exit is handled at the edge, not in the reducer.
        if matches!(event, Event::Exit) {
            tracing::info!("exit requested, shutting down controller loop");
            break;
        }

        let old_phase = std::mem::discriminant(&model.phase);
        let (next, effects) = reduce(&model, event);
        let new_phase = std::mem::discriminant(&next.phase);

        if old_phase != new_phase {
            tracing::info!("phase transition: {:?} -> {:?}", model.phase, next.phase);
        }

        model = next;

        for eff in effects {
            match eff {
                Effect::EmitUi => {
                    let _ = ui_tx.send(snapshot_of(&model));
                }
                other => effect_runner.spawn(other, tx.clone()),
            }
        }
    }

    tracing::info!("controller loop ended");
}

/// Spawned controller plus the handles the rest of the process talks
/// through: an event sender in, a snapshot watch out.
pub struct ControllerHandle {
    tx: mpsc::Sender<Event>,
    ui_rx: watch::Receiver<UiSnapshot>,
}

impl ControllerHandle {
    /// Spawn the controller loop on the current runtime.
    pub fn spawn(effect_runner: Arc<dyn EffectRunner>) -> Self {
        let (tx, rx) = mpsc::channel::<Event>(32);
        let (ui_tx, ui_rx) = watch::channel(UiSnapshot::default());

        let loop_tx = tx.clone();
        tokio::spawn(async move {
            run_controller(rx, loop_tx, effect_runner, ui_tx).await;
        });

        Self { tx, ui_rx }
    }

    /// Send an event into the controller.
    pub async fn send(&self, event: Event) -> Result<(), mpsc::error::SendError<Event>> {
        self.tx.send(event).await
    }

    /// Watch receiver for UI snapshots. Each observable state change
    /// publishes a fresh snapshot.
    pub fn ui(&self) -> watch::Receiver<UiSnapshot> {
        self.ui_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_state_serializes_as_tagged_union() {
        let idle = serde_json::to_value(UiState::Idle).unwrap();
        assert_eq!(idle, serde_json::json!({ "status": "idle" }));

        let recording = serde_json::to_value(UiState::Recording { elapsed_secs: 5 }).unwrap();
        assert_eq!(
            recording,
            serde_json::json!({ "status": "recording", "elapsedSecs": 5 })
        );
    }

    #[test]
    fn snapshot_carries_phase_and_full_log() {
        let mut model = Model::default();
        model.log.push(ChatMessage::user("Hi"));
        model.log.push(ChatMessage::assistant("Hello"));
        model.phase = Phase::Dispatching { seq: 1 };

        let snapshot = snapshot_of(&model);
        assert!(matches!(snapshot.state, UiState::Dispatching));
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.messages[0].text, "Hi");
    }
}
