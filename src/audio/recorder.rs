//! Audio recorder using CPAL for capture.
//!
//! The recorder captures from the default input device and accumulates
//! samples into ordered ~1 second chunks of 16-bit little-endian PCM.
//! cpal streams are not `Send`, so each recording runs on a dedicated
//! thread; the handle talks to it over channels and is freely movable
//! across tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use uuid::Uuid;

use super::{AudioChunk, CaptureError};

/// How long `stop()` waits for the capture thread to hand back its chunks.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to an active recording. `stop()` tears the stream down and
/// returns the captured chunk sequence in emission order.
pub struct RecordingHandle {
    stop_tx: Sender<()>,
    result_rx: Receiver<Vec<AudioChunk>>,
    session_id: Uuid,
}

impl RecordingHandle {
    /// Stop recording and drain the accumulated chunks. The stream is fully
    /// torn down before the chunk sequence is read, so no late chunk can
    /// arrive after this returns.
    pub fn stop(self) -> Result<Vec<AudioChunk>, CaptureError> {
        // The capture thread may already be gone if the stream errored.
        let _ = self.stop_tx.send(());

        match self.result_rx.recv_timeout(STOP_TIMEOUT) {
            Ok(chunks) => {
                tracing::info!(
                    session = %self.session_id,
                    chunks = chunks.len(),
                    "recording stopped"
                );
                Ok(chunks)
            }
            Err(RecvTimeoutError::Timeout) => Err(CaptureError::StreamFailed(
                "capture thread did not stop in time".to_string(),
            )),
            Err(RecvTimeoutError::Disconnected) => Err(CaptureError::StreamFailed(
                "capture thread exited unexpectedly".to_string(),
            )),
        }
    }
}

#[cfg(test)]
impl RecordingHandle {
    /// Handle backed by a thread that answers `stop()` with no chunks, so
    /// handle bookkeeping can be tested without a capture device.
    pub(crate) fn stub(session_id: Uuid) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (result_tx, result_rx) = mpsc::sync_channel::<Vec<AudioChunk>>(1);
        std::thread::spawn(move || {
            let _ = stop_rx.recv();
            let _ = result_tx.send(Vec::new());
        });
        Self {
            stop_tx,
            result_rx,
            session_id,
        }
    }
}

/// Accumulates PCM bytes and seals a chunk roughly once per second of audio.
struct ChunkAccumulator {
    chunks: Vec<AudioChunk>,
    pending: Vec<u8>,
    /// Bytes per sealed chunk: one second of i16 samples across all channels.
    chunk_bytes: usize,
}

impl ChunkAccumulator {
    fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            chunks: Vec::new(),
            pending: Vec::new(),
            chunk_bytes: sample_rate as usize * channels as usize * 2,
        }
    }

    fn push_sample(&mut self, sample: i16) {
        self.pending.extend_from_slice(&sample.to_le_bytes());
        if self.pending.len() >= self.chunk_bytes {
            let sealed = std::mem::take(&mut self.pending);
            self.chunks.push(AudioChunk::new(sealed));
        }
    }

    /// Seal whatever is pending and hand back the full ordered sequence.
    fn drain(&mut self) -> Vec<AudioChunk> {
        if !self.pending.is_empty() {
            let sealed = std::mem::take(&mut self.pending);
            self.chunks.push(AudioChunk::new(sealed));
        }
        std::mem::take(&mut self.chunks)
    }
}

/// Audio recorder that captures from the default input device.
pub struct AudioRecorder {
    _private: (),
}

impl AudioRecorder {
    /// Probe the default input device so device problems surface at
    /// construction rather than mid-session.
    pub fn new() -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::DeviceUnavailable)?;

        tracing::info!("using audio input device: {:?}", device.name());

        device
            .default_input_config()
            .map_err(|_| CaptureError::UnsupportedConfig)?;

        Ok(Self { _private: () })
    }

    /// Start a recording session. The chunk sequence begins empty; chunks
    /// accumulate in emission order until the handle is stopped.
    pub fn start(&self, session_id: Uuid) -> Result<RecordingHandle, CaptureError> {
        let (startup_tx, startup_rx) = mpsc::sync_channel::<Result<(), CaptureError>>(1);
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (result_tx, result_rx) = mpsc::sync_channel::<Vec<AudioChunk>>(1);

        std::thread::spawn(move || capture_thread(session_id, startup_tx, stop_rx, result_tx));

        match startup_rx.recv_timeout(STOP_TIMEOUT) {
            Ok(Ok(())) => {
                tracing::info!(session = %session_id, "recording started");
                Ok(RecordingHandle {
                    stop_tx,
                    result_rx,
                    session_id,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::StreamFailed(
                "capture thread failed to start".to_string(),
            )),
        }
    }
}

/// Owns the cpal stream for one session. Runs until a stop request arrives,
/// then tears the stream down and hands the drained chunks back.
fn capture_thread(
    session_id: Uuid,
    startup_tx: SyncSender<Result<(), CaptureError>>,
    stop_rx: Receiver<()>,
    result_tx: SyncSender<Vec<AudioChunk>>,
) {
    let stream_parts = build_capture_stream();
    let (stream, accumulator, is_recording) = match stream_parts {
        Ok(parts) => parts,
        Err(e) => {
            let _ = startup_tx.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = startup_tx.send(Err(CaptureError::StreamFailed(e.to_string())));
        return;
    }
    let _ = startup_tx.send(Ok(()));

    // Block until stop (or the handle was dropped, which also means stop).
    let _ = stop_rx.recv();

    // Tear the stream down before reading the accumulator so the callback
    // cannot append a late chunk.
    is_recording.store(false, Ordering::SeqCst);
    drop(stream);

    let chunks = match accumulator.lock() {
        Ok(mut acc) => acc.drain(),
        Err(poisoned) => poisoned.into_inner().drain(),
    };
    tracing::debug!(session = %session_id, chunks = chunks.len(), "capture thread draining");
    let _ = result_tx.send(chunks);
}

type StreamParts = (cpal::Stream, Arc<Mutex<ChunkAccumulator>>, Arc<AtomicBool>);

fn build_capture_stream() -> Result<StreamParts, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(CaptureError::DeviceUnavailable)?;
    let supported = device
        .default_input_config()
        .map_err(|_| CaptureError::UnsupportedConfig)?;

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    let accumulator = Arc::new(Mutex::new(ChunkAccumulator::new(
        config.sample_rate.0,
        config.channels,
    )));
    let is_recording = Arc::new(AtomicBool::new(true));

    let stream = match sample_format {
        SampleFormat::I16 => build_stream_typed::<i16>(
            &device,
            &config,
            accumulator.clone(),
            is_recording.clone(),
        ),
        SampleFormat::U16 => build_stream_typed::<u16>(
            &device,
            &config,
            accumulator.clone(),
            is_recording.clone(),
        ),
        SampleFormat::F32 => build_stream_typed::<f32>(
            &device,
            &config,
            accumulator.clone(),
            is_recording.clone(),
        ),
        _ => Err(CaptureError::UnsupportedConfig),
    }?;

    Ok((stream, accumulator, is_recording))
}

fn build_stream_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    accumulator: Arc<Mutex<ChunkAccumulator>>,
    is_recording: Arc<AtomicBool>,
) -> Result<cpal::Stream, CaptureError>
where
    T: cpal::Sample<Float = f32> + cpal::SizedSample + Send + 'static,
{
    let err_fn = |err| tracing::error!("audio stream error: {}", err);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !is_recording.load(Ordering::SeqCst) {
                    return;
                }
                let mut guard = match accumulator.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                for &sample in data {
                    guard.push_sample(sample_to_i16(sample));
                }
            },
            err_fn,
            None,
        )
        .map_err(map_build_error)
}

fn map_build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => CaptureError::DeviceUnavailable,
        other => {
            let msg = other.to_string();
            if msg.to_lowercase().contains("permission") {
                CaptureError::PermissionDenied
            } else {
                CaptureError::StreamFailed(msg)
            }
        }
    }
}

/// Convert any sample type to i16 PCM.
fn sample_to_i16<T: cpal::Sample<Float = f32>>(sample: T) -> i16 {
    let f32_sample: f32 = sample.to_float_sample();
    let clamped = f32_sample.clamp(-1.0, 1.0);
    (clamped * i16::MAX as f32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_to_i16() {
        assert_eq!(sample_to_i16(0.0f32), 0);
        assert_eq!(sample_to_i16(1.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-1.0f32), -i16::MAX);

        // Out-of-range input is clamped
        assert_eq!(sample_to_i16(2.0f32), i16::MAX);
        assert_eq!(sample_to_i16(-2.0f32), -i16::MAX);
    }

    #[test]
    fn accumulator_seals_one_second_chunks_in_order() {
        // 2 samples/sec mono => 4 bytes per chunk
        let mut acc = ChunkAccumulator::new(2, 1);
        for sample in [1i16, 2, 3, 4, 5] {
            acc.push_sample(sample);
        }
        let chunks = acc.drain();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].as_bytes(), [1u8, 0, 2, 0]);
        assert_eq!(chunks[1].as_bytes(), [3u8, 0, 4, 0]);
        // Trailing partial chunk is sealed on drain
        assert_eq!(chunks[2].as_bytes(), [5u8, 0]);
    }

    #[test]
    fn accumulator_drain_is_terminal() {
        let mut acc = ChunkAccumulator::new(2, 1);
        acc.push_sample(7);
        assert_eq!(acc.drain().len(), 1);
        assert!(acc.drain().is_empty());
    }
}
