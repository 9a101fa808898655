//! State machine for the voice-interaction controller.
//!
//! This module implements the core coordinator using a single-writer pattern.
//! All state transitions go through the `reduce()` function, which returns
//! a new model and a list of effects to execute. The model carries the
//! current phase, the conversation log, and the dispatch sequence counter.

use uuid::Uuid;

use crate::chat::{ChatMessage, ConversationLog};

/// Recordings are hard-capped at this many seconds; reaching the bound
/// stops the capture automatically.
pub const MAX_RECORDING_SECS: u64 = 15;

/// Surfaced when the transcription endpoint fails; the underlying error is
/// logged only.
pub const TRANSCRIBE_FALLBACK: &str = "An error occurred while transcribing the audio.";

/// Appended as the assistant turn when the chatbot call fails, so a user
/// message never dangles without a reply.
pub const DISPATCH_FALLBACK: &str = "Sorry, I encountered an error.";

/// Current phase of the controller. One value replaces the scattered
/// isRecording/isTranscribing/isLoading flags of the original widgets.
#[derive(Debug, Clone)]
pub enum Phase {
    Idle,
    /// Waiting for the capture device to be acquired.
    Arming { session_id: Uuid },
    Recording {
        session_id: Uuid,
        elapsed_secs: u64,
    },
    /// Stop requested; waiting for the capture stream to drain.
    Stopping { session_id: Uuid },
    Transcribing { session_id: Uuid },
    Dispatching { seq: u64 },
    Error { message: String },
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Idle
    }
}

/// The authoritative controller state. Never mutated in place; `reduce`
/// produces a successor.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub phase: Phase,
    pub log: ConversationLog,
    /// Last issued dispatch sequence number. Completions carrying an older
    /// sequence are stale and dropped.
    pub dispatch_seq: u64,
}

/// Events that trigger state transitions. User actions arrive from the
/// presentation layer; the rest are completions from the effect runner.
#[derive(Debug, Clone)]
pub enum Event {
    /// User pressed the mic button.
    StartRecording,
    /// User pressed the mic button again (manual stop).
    StopRecording,
    /// User abandoned the current session.
    Cancel,
    /// Application exit requested.
    Exit,
    /// One-second timer tick (carries the session id to drop stale ticks).
    RecordingTick { id: Uuid },

    // Capture events
    CaptureStartOk { id: Uuid },
    CaptureStartFail { id: Uuid, err: String },
    CaptureStopOk { id: Uuid },
    CaptureStopFail { id: Uuid, err: String },

    // Transcription events
    TranscribeOk { id: Uuid, text: String },
    /// Session stopped with zero captured chunks; no request was made.
    TranscribeEmpty { id: Uuid },
    TranscribeFail { id: Uuid, err: String },

    /// User submitted typed text.
    SendText { text: String },

    // Dispatch events
    DispatchOk { seq: u64, reply: String },
    DispatchFail { seq: u64, err: String },
}

/// Effects to be executed after a state transition. The effect runner
/// handles these asynchronously and feeds completion events back in.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartCapture { id: Uuid },
    StopCapture { id: Uuid },
    /// Start sending RecordingTick events every second while capturing.
    StartTick { id: Uuid },
    StartTranscription { id: Uuid },
    StartDispatch { seq: u64, text: String },
    /// Tear down a cancelled session: stop its capture if one is live (or
    /// still being acquired) and drop any audio it left behind. Produces no
    /// completion event.
    DiscardCapture { id: Uuid },
    /// Signal to publish the UI snapshot.
    EmitUi,
}

fn current_session(phase: &Phase) -> Option<Uuid> {
    match phase {
        Phase::Arming { session_id }
        | Phase::Recording { session_id, .. }
        | Phase::Stopping { session_id }
        | Phase::Transcribing { session_id } => Some(*session_id),
        Phase::Idle | Phase::Dispatching { .. } | Phase::Error { .. } => None,
    }
}

fn start_session(model: &Model) -> (Model, Vec<Effect>) {
    let id = Uuid::new_v4();
    (
        Model {
            phase: Phase::Arming { session_id: id },
            ..model.clone()
        },
        vec![Effect::StartCapture { id }, Effect::EmitUi],
    )
}

fn dispatch_text(model: &Model, text: String) -> (Model, Vec<Effect>) {
    let seq = model.dispatch_seq + 1;
    let mut log = model.log.clone();
    log.push(ChatMessage::user(text.clone()));
    (
        Model {
            phase: Phase::Dispatching { seq },
            log,
            dispatch_seq: seq,
        },
        vec![Effect::StartDispatch { seq, text }, Effect::EmitUi],
    )
}

/// Reducer function: (model, event) -> (next_model, effects)
///
/// Key rules:
/// - Never mutate the model directly
/// - Ignore events with stale session ids or dispatch sequences
/// - Emit EmitUi after every observable change
pub fn reduce(model: &Model, event: Event) -> (Model, Vec<Effect>) {
    use Event::*;

    let unchanged = || (model.clone(), Vec::new());
    let session = current_session(&model.phase);
    let is_stale = |eid: Uuid| session != Some(eid);

    match (&model.phase, event) {
        // -----------------
        // Starting a session
        // -----------------
        // The capture device has one exclusive owner, and an in-flight
        // dispatch must still receive its reply: starting is only honored
        // when no session is live and nothing is dispatching.
        (Phase::Idle | Phase::Error { .. }, StartRecording) => start_session(model),
        (_, StartRecording) => {
            tracing::debug!("StartRecording ignored: a session or dispatch is in progress");
            unchanged()
        }

        // -----------------
        // Arming
        // -----------------
        (Phase::Arming { session_id }, CaptureStartOk { id }) if *session_id == id => (
            Model {
                phase: Phase::Recording {
                    session_id: id,
                    elapsed_secs: 0,
                },
                ..model.clone()
            },
            vec![Effect::StartTick { id }, Effect::EmitUi],
        ),
        (Phase::Arming { session_id }, CaptureStartFail { id, err }) if *session_id == id => (
            Model {
                phase: Phase::Error { message: err },
                ..model.clone()
            },
            vec![Effect::EmitUi],
        ),
        // Discard covers the race where the device finishes acquiring after
        // the cancel: the runner tears the late handle down instead of
        // registering it.
        (Phase::Arming { session_id }, Cancel) => (
            Model {
                phase: Phase::Idle,
                ..model.clone()
            },
            vec![Effect::DiscardCapture { id: *session_id }, Effect::EmitUi],
        ),

        // -----------------
        // Recording
        // -----------------
        (
            Phase::Recording {
                session_id,
                elapsed_secs,
            },
            RecordingTick { id },
        ) if *session_id == id => {
            let elapsed = elapsed_secs + 1;
            if elapsed >= MAX_RECORDING_SECS {
                tracing::info!(session = %id, "recording auto-stopped at {}s", MAX_RECORDING_SECS);
                (
                    Model {
                        phase: Phase::Stopping { session_id: id },
                        ..model.clone()
                    },
                    vec![Effect::StopCapture { id }, Effect::EmitUi],
                )
            } else {
                (
                    Model {
                        phase: Phase::Recording {
                            session_id: id,
                            elapsed_secs: elapsed,
                        },
                        ..model.clone()
                    },
                    vec![Effect::EmitUi],
                )
            }
        }
        (Phase::Recording { session_id, .. }, StopRecording) => (
            Model {
                phase: Phase::Stopping {
                    session_id: *session_id,
                },
                ..model.clone()
            },
            vec![Effect::StopCapture { id: *session_id }, Effect::EmitUi],
        ),
        // Cancel during recording aborts without transcription; the captured
        // audio is discarded, not stashed.
        (Phase::Recording { session_id, .. }, Cancel) => (
            Model {
                phase: Phase::Idle,
                ..model.clone()
            },
            vec![Effect::DiscardCapture { id: *session_id }, Effect::EmitUi],
        ),

        // -----------------
        // Stopping
        // -----------------
        (Phase::Stopping { session_id }, CaptureStopOk { id }) if *session_id == id => (
            Model {
                phase: Phase::Transcribing { session_id: id },
                ..model.clone()
            },
            vec![Effect::StartTranscription { id }, Effect::EmitUi],
        ),
        (Phase::Stopping { session_id }, CaptureStopFail { id, err }) if *session_id == id => (
            Model {
                phase: Phase::Error { message: err },
                ..model.clone()
            },
            vec![Effect::EmitUi],
        ),
        // Stop is idempotent: a second StopRecording while already stopping
        // (or while not recording at all) has no further effect.
        (_, StopRecording) => unchanged(),

        // -----------------
        // Transcribing
        // -----------------
        (Phase::Transcribing { session_id }, TranscribeOk { id, text }) if *session_id == id => {
            if text.trim().is_empty() {
                tracing::info!(session = %id, "transcription came back empty; nothing to send");
                (
                    Model {
                        phase: Phase::Idle,
                        ..model.clone()
                    },
                    vec![Effect::EmitUi],
                )
            } else {
                dispatch_text(model, text)
            }
        }
        (Phase::Transcribing { session_id }, TranscribeEmpty { id }) if *session_id == id => (
            Model {
                phase: Phase::Idle,
                ..model.clone()
            },
            vec![Effect::EmitUi],
        ),
        (Phase::Transcribing { session_id }, TranscribeFail { id, err }) if *session_id == id => {
            tracing::warn!(session = %id, error = %err, "transcription failed");
            (
                Model {
                    phase: Phase::Error {
                        message: TRANSCRIBE_FALLBACK.to_string(),
                    },
                    ..model.clone()
                },
                vec![Effect::EmitUi],
            )
        }
        (Phase::Transcribing { .. }, Cancel) => (
            Model {
                phase: Phase::Idle,
                ..model.clone()
            },
            vec![Effect::EmitUi],
        ),

        // -----------------
        // Typed input
        // -----------------
        // Rejected before any state mutation when blank; superseding an
        // in-flight dispatch bumps the sequence so the older reply is
        // discarded on arrival.
        (Phase::Idle | Phase::Error { .. } | Phase::Dispatching { .. }, SendText { text }) => {
            if text.trim().is_empty() {
                unchanged()
            } else {
                dispatch_text(model, text)
            }
        }
        (_, SendText { .. }) => {
            tracing::debug!("SendText ignored while a voice session is in progress");
            unchanged()
        }

        // -----------------
        // Dispatching
        // -----------------
        (Phase::Dispatching { seq }, DispatchOk { seq: s, reply }) if *seq == s => {
            let mut log = model.log.clone();
            log.push(ChatMessage::assistant(reply));
            (
                Model {
                    phase: Phase::Idle,
                    log,
                    dispatch_seq: model.dispatch_seq,
                },
                vec![Effect::EmitUi],
            )
        }
        (Phase::Dispatching { seq }, DispatchFail { seq: s, err }) if *seq == s => {
            tracing::warn!(seq = s, error = %err, "dispatch failed");
            let mut log = model.log.clone();
            log.push(ChatMessage::assistant(DISPATCH_FALLBACK));
            (
                Model {
                    phase: Phase::Idle,
                    log,
                    dispatch_seq: model.dispatch_seq,
                },
                vec![Effect::EmitUi],
            )
        }
        (Phase::Dispatching { .. }, Cancel) => (
            Model {
                phase: Phase::Idle,
                ..model.clone()
            },
            vec![Effect::EmitUi],
        ),

        // -----------------
        // Remaining Cancel cases
        // -----------------
        // Stopping: the stop is already in flight; discard makes sure the
        // chunks it stashes (or a handle it never reached) are dropped.
        (Phase::Stopping { session_id }, Cancel) => (
            Model {
                phase: Phase::Idle,
                ..model.clone()
            },
            vec![Effect::DiscardCapture { id: *session_id }, Effect::EmitUi],
        ),
        (Phase::Idle | Phase::Error { .. }, Cancel) => (
            Model {
                phase: Phase::Idle,
                ..model.clone()
            },
            vec![Effect::EmitUi],
        ),

        // -----------------
        // Stale events (drop silently)
        // -----------------
        (_, CaptureStartOk { id }) if is_stale(id) => unchanged(),
        (_, CaptureStartFail { id, .. }) if is_stale(id) => unchanged(),
        (_, CaptureStopOk { id }) if is_stale(id) => unchanged(),
        (_, CaptureStopFail { id, .. }) if is_stale(id) => unchanged(),
        (_, RecordingTick { id }) if is_stale(id) => unchanged(),
        (_, TranscribeOk { id, .. }) if is_stale(id) => unchanged(),
        (_, TranscribeEmpty { id }) if is_stale(id) => unchanged(),
        (_, TranscribeFail { id, .. }) if is_stale(id) => unchanged(),
        (_, DispatchOk { .. }) => unchanged(),
        (_, DispatchFail { .. }) => unchanged(),

        // -----------------
        // Unhandled: no transition
        // -----------------
        _ => unchanged(),
    }
}
