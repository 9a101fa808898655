//! Effect execution for the voice-interaction controller.
//!
//! The reducer stays pure; everything with a side effect (device capture,
//! timers, backend calls) is described as an `Effect` and executed here.
//! Completions flow back into the controller as events over the same
//! channel user actions arrive on, so the single-writer loop stays the only
//! place state changes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::audio::recorder::{AudioRecorder, RecordingHandle};
use crate::audio::AudioChunk;
use crate::backend::{BackendClient, TranscribeError};
use crate::state_machine::{Effect, Event};

/// Executes effects produced by the reducer. Implementations must not
/// block the caller; work happens on spawned tasks and completions are
/// reported through `tx`.
pub trait EffectRunner: Send + Sync {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Per-session capture bookkeeping, all behind one lock so a discard and a
/// concurrently completing start/stop cannot interleave: a cancelled
/// session's handle is either removed here or refused on arrival, and its
/// audio is either removed here or dropped instead of stashed.
#[derive(Default)]
struct SessionTable {
    /// Live capture handles by session. Presence also drives the tick task.
    active: HashMap<Uuid, RecordingHandle>,
    /// Drained chunk sequences awaiting transcription. Taken at most once.
    stopped: HashMap<Uuid, Vec<AudioChunk>>,
    /// Sessions discarded before their start or stop settled. Each entry is
    /// consumed by exactly one later completion.
    discarded: HashSet<Uuid>,
}

impl SessionTable {
    /// Register a freshly acquired handle. If the session was discarded
    /// while the device was still being acquired, the handle is handed back
    /// to the caller for teardown instead of being registered.
    fn install(&mut self, id: Uuid, handle: RecordingHandle) -> Option<RecordingHandle> {
        if self.discarded.remove(&id) {
            Some(handle)
        } else {
            self.active.insert(id, handle);
            None
        }
    }

    fn take_handle(&mut self, id: Uuid) -> Option<RecordingHandle> {
        self.active.remove(&id)
    }

    fn is_live(&self, id: Uuid) -> bool {
        self.active.contains_key(&id)
    }

    /// Stash the drained chunks of a settled stop, unless the session was
    /// discarded in the meantime, in which case the audio is dropped.
    fn note_stopped(&mut self, id: Uuid, chunks: Vec<AudioChunk>) {
        if self.discarded.remove(&id) {
            tracing::debug!(session = %id, "dropping audio of a discarded session");
            return;
        }
        self.stopped.insert(id, chunks);
    }

    fn take_chunks(&mut self, id: Uuid) -> Vec<AudioChunk> {
        self.stopped.remove(&id).unwrap_or_default()
    }

    /// A start or stop failed; the session leaves no handle or stash, so any
    /// tombstone for it would never be consumed.
    fn forget(&mut self, id: Uuid) {
        self.discarded.remove(&id);
    }

    /// Discard a cancelled session: remove whatever it left behind now, and
    /// tombstone the id when nothing is there yet so the pending completion
    /// discards its result on arrival. A live handle is returned for the
    /// caller to stop.
    fn discard(&mut self, id: Uuid) -> Option<RecordingHandle> {
        let handle = self.active.remove(&id);
        let had_stash = self.stopped.remove(&id).is_some();
        if handle.is_none() && !had_stash {
            self.discarded.insert(id);
        }
        handle
    }
}

/// Production effect runner: cpal capture via `AudioRecorder`, backend
/// transcription and chat via `BackendClient`.
pub struct VoiceEffectRunner {
    /// Lazily constructed so a missing microphone surfaces as a
    /// per-session CaptureStartFail instead of killing startup.
    recorder: Arc<Mutex<Option<AudioRecorder>>>,
    sessions: Arc<Mutex<SessionTable>>,
    backend: Arc<BackendClient>,
}

impl VoiceEffectRunner {
    pub fn new(backend: Arc<BackendClient>) -> Self {
        Self {
            recorder: Arc::new(Mutex::new(None)),
            sessions: Arc::new(Mutex::new(SessionTable::default())),
            backend,
        }
    }

    fn start_capture(&self, id: Uuid, tx: mpsc::Sender<Event>) {
        let recorder = self.recorder.clone();
        let sessions = self.sessions.clone();

        // AudioRecorder::start blocks on the capture thread's startup
        // handshake, so keep it off the async workers.
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&recorder);
            let result = match &*guard {
                Some(r) => r.start(id),
                None => match AudioRecorder::new() {
                    Ok(r) => {
                        let result = r.start(id);
                        *guard = Some(r);
                        result
                    }
                    Err(e) => Err(e),
                },
            };
            drop(guard);

            let event = match result {
                Ok(handle) => {
                    // A cancel may have raced the acquisition; the table
                    // refuses the handle and we tear it down here.
                    if let Some(handle) = lock(&sessions).install(id, handle) {
                        tracing::info!(session = %id, "session cancelled during device acquisition");
                        if let Err(e) = handle.stop() {
                            tracing::warn!(session = %id, error = %e, "failed to stop refused capture");
                        }
                    }
                    Event::CaptureStartOk { id }
                }
                Err(e) => {
                    lock(&sessions).forget(id);
                    Event::CaptureStartFail {
                        id,
                        err: e.to_string(),
                    }
                }
            };
            let _ = tx.blocking_send(event);
        });
    }

    fn stop_capture(&self, id: Uuid, tx: mpsc::Sender<Event>) {
        let sessions = self.sessions.clone();

        tokio::task::spawn_blocking(move || {
            let handle = lock(&sessions).take_handle(id);
            let event = match handle {
                // No live handle: the session never armed or was already
                // stopped. Report success so stop stays idempotent.
                None => Event::CaptureStopOk { id },
                Some(handle) => match handle.stop() {
                    Ok(chunks) => {
                        lock(&sessions).note_stopped(id, chunks);
                        Event::CaptureStopOk { id }
                    }
                    Err(e) => {
                        lock(&sessions).forget(id);
                        Event::CaptureStopFail {
                            id,
                            err: e.to_string(),
                        }
                    }
                },
            };
            let _ = tx.blocking_send(event);
        });
    }

    fn discard_capture(&self, id: Uuid) {
        let sessions = self.sessions.clone();

        // Stopping a live handle blocks on the capture thread.
        tokio::task::spawn_blocking(move || {
            if let Some(handle) = lock(&sessions).discard(id) {
                if let Err(e) = handle.stop() {
                    tracing::warn!(session = %id, error = %e, "failed to stop cancelled capture");
                }
            }
        });
    }

    fn start_tick(&self, id: Uuid, tx: mpsc::Sender<Event>) {
        let sessions = self.sessions.clone();

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(1)).await;
                // The handle leaving the table ends the tick stream; the
                // reducer additionally drops ticks by session id.
                if !lock(&sessions).is_live(id) {
                    break;
                }
                if tx.send(Event::RecordingTick { id }).await.is_err() {
                    break;
                }
            }
            tracing::debug!(session = %id, "tick task ended");
        });
    }

    fn start_transcription(&self, id: Uuid, tx: mpsc::Sender<Event>) {
        let sessions = self.sessions.clone();
        let backend = self.backend.clone();

        tokio::spawn(async move {
            // Take the stashed chunks exactly once.
            let chunks = lock(&sessions).take_chunks(id);

            let event = match backend.transcribe_audio(chunks).await {
                Ok(text) => Event::TranscribeOk { id, text },
                Err(TranscribeError::EmptyRecording) => Event::TranscribeEmpty { id },
                Err(TranscribeError::Api(e)) => Event::TranscribeFail {
                    id,
                    err: e.to_string(),
                },
            };
            let _ = tx.send(event).await;
        });
    }

    fn start_dispatch(&self, seq: u64, text: String, tx: mpsc::Sender<Event>) {
        let backend = self.backend.clone();

        tokio::spawn(async move {
            let event = match backend.chatbot(&text).await {
                Ok(reply) => Event::DispatchOk { seq, reply },
                Err(e) => Event::DispatchFail {
                    seq,
                    err: e.to_string(),
                },
            };
            let _ = tx.send(event).await;
        });
    }
}

impl EffectRunner for VoiceEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        match effect {
            Effect::StartCapture { id } => self.start_capture(id, tx),
            Effect::StopCapture { id } => self.stop_capture(id, tx),
            Effect::DiscardCapture { id } => self.discard_capture(id),
            Effect::StartTick { id } => self.start_tick(id, tx),
            Effect::StartTranscription { id } => self.start_transcription(id, tx),
            Effect::StartDispatch { seq, text } => self.start_dispatch(seq, text, tx),
            // Publishing snapshots is handled by the controller loop itself.
            Effect::EmitUi => {}
        }
    }
}

/// Deterministic effect runner for tests: capture always succeeds, ticks
/// never fire on their own, and the backend answers are canned.
pub struct StubEffectRunner {
    /// Transcription handed back for every session; `None` simulates a
    /// recording with no captured audio.
    pub transcription: Option<String>,
    /// Canned chatbot outcome.
    pub chat_reply: Result<String, String>,
}

impl Default for StubEffectRunner {
    fn default() -> Self {
        Self {
            transcription: Some("stub transcription".to_string()),
            chat_reply: Ok("stub reply".to_string()),
        }
    }
}

impl EffectRunner for StubEffectRunner {
    fn spawn(&self, effect: Effect, tx: mpsc::Sender<Event>) {
        let event = match effect {
            Effect::StartCapture { id } => Some(Event::CaptureStartOk { id }),
            Effect::StopCapture { id } => Some(Event::CaptureStopOk { id }),
            // A discarded session produces no completion.
            Effect::DiscardCapture { .. } => None,
            // Tests drive RecordingTick explicitly for determinism.
            Effect::StartTick { .. } => None,
            Effect::StartTranscription { id } => Some(match &self.transcription {
                Some(text) => Event::TranscribeOk {
                    id,
                    text: text.clone(),
                },
                None => Event::TranscribeEmpty { id },
            }),
            Effect::StartDispatch { seq, .. } => Some(match &self.chat_reply {
                Ok(reply) => Event::DispatchOk {
                    seq,
                    reply: reply.clone(),
                },
                Err(err) => Event::DispatchFail {
                    seq,
                    err: err.clone(),
                },
            }),
            Effect::EmitUi => None,
        };

        if let Some(event) = event {
            tokio::spawn(async move {
                let _ = tx.send(event).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks() -> Vec<AudioChunk> {
        vec![AudioChunk::new(vec![1, 2]), AudioChunk::new(vec![3, 4])]
    }

    #[test]
    fn discard_before_install_refuses_the_late_handle() {
        let id = Uuid::new_v4();
        let mut table = SessionTable::default();

        // Cancel lands while the device is still being acquired.
        assert!(table.discard(id).is_none());

        // The acquisition settles afterwards; the handle must come back for
        // teardown, not be registered.
        let refused = table.install(id, RecordingHandle::stub(id));
        assert!(refused.is_some());
        assert!(!table.is_live(id));
        assert!(refused.unwrap().stop().is_ok());

        // The tombstone was consumed; a later session with the same id
        // (never happens with v4 ids, but the table must not care) installs.
        assert!(table.install(id, RecordingHandle::stub(id)).is_none());
        assert!(table.is_live(id));
    }

    #[test]
    fn discard_removes_a_live_handle() {
        let id = Uuid::new_v4();
        let mut table = SessionTable::default();

        assert!(table.install(id, RecordingHandle::stub(id)).is_none());
        let handle = table.discard(id);
        assert!(handle.is_some());
        assert!(!table.is_live(id));
        // No tombstone is left when the discard found the handle.
        assert!(table.install(id, RecordingHandle::stub(id)).is_none());
    }

    #[test]
    fn discard_before_the_stop_settles_drops_the_audio() {
        let id = Uuid::new_v4();
        let mut table = SessionTable::default();

        // Cancel lands while the stop is in flight.
        assert!(table.discard(id).is_none());

        // The stop settles afterwards; its audio is dropped, not stashed.
        table.note_stopped(id, chunks());
        assert!(table.take_chunks(id).is_empty());
    }

    #[test]
    fn discard_after_the_stop_removes_the_stash() {
        let id = Uuid::new_v4();
        let mut table = SessionTable::default();

        table.note_stopped(id, chunks());
        assert!(table.discard(id).is_none());
        assert!(table.take_chunks(id).is_empty());
    }

    #[test]
    fn stashed_chunks_are_taken_at_most_once() {
        let id = Uuid::new_v4();
        let mut table = SessionTable::default();

        table.note_stopped(id, chunks());
        assert_eq!(table.take_chunks(id).len(), 2);
        assert!(table.take_chunks(id).is_empty());
    }

    #[test]
    fn failed_completions_consume_the_tombstone() {
        let id = Uuid::new_v4();
        let mut table = SessionTable::default();

        assert!(table.discard(id).is_none());
        table.forget(id);
        // A fresh install afterwards is not refused by a stale tombstone.
        assert!(table.install(id, RecordingHandle::stub(id)).is_none());
        assert!(table.is_live(id));
    }
}
