//! Microphone capture using CPAL, written to WAV with hound
//!
//! `cpal::Stream` is not `Send` on every host, so each capture owns a
//! dedicated audio thread that builds the stream, keeps it alive, and drops
//! it when told to stop. The handle only holds channels and shared counters.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample as _, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfig};
use hound::{WavSpec, WavWriter};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::paths::{cleanup_old_recordings, create_recordings_dir, generate_recording_path};
use super::waveform::rms_level;
use super::{AudioCaptureDevice, AudioError, CapturedAudio};
use crate::message::{AudioFormat, RecordingOptions};

type SharedWriter = Arc<Mutex<Option<WavWriter<std::io::BufWriter<std::fs::File>>>>>;

/// State shared between the audio callback and the handle.
struct CaptureShared {
    writer: SharedWriter,
    is_recording: AtomicBool,
    /// Latest block RMS, stored as `f32` bits.
    level_bits: AtomicU32,
    frames_written: AtomicU64,
}

/// Handle to an active CPAL capture.
pub struct CpalCapture {
    recording_id: Uuid,
    path: PathBuf,
    sample_rate: u32,
    shared: Arc<CaptureShared>,
    stop_tx: std_mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl CpalCapture {
    /// Stop the stream and join the audio thread.
    fn shutdown(&mut self) {
        self.shared.is_recording.store(false, Ordering::SeqCst);
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("Audio thread panicked for recording {}", self.recording_id);
            }
        }
    }

    fn finalize(&mut self) -> Result<(), AudioError> {
        let mut guard = self
            .shared
            .writer
            .lock()
            .map_err(|_| AudioError::WriteFailed("writer lock poisoned".to_string()))?;
        if let Some(writer) = guard.take() {
            writer
                .finalize()
                .map_err(|e| AudioError::WriteFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Capture device bound to the host's default input.
pub struct CpalCaptureDevice {
    dir: PathBuf,
}

impl CpalCaptureDevice {
    /// Store recordings in the default recordings directory.
    pub fn new() -> Result<Self, AudioError> {
        let dir =
            create_recordings_dir().map_err(|e| AudioError::FileCreationFailed(e.to_string()))?;
        Ok(Self { dir })
    }

    pub fn with_dir(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl AudioCaptureDevice for CpalCaptureDevice {
    type Handle = CpalCapture;

    async fn start(
        &self,
        recording_id: Uuid,
        options: RecordingOptions,
    ) -> Result<CpalCapture, AudioError> {
        if options.format != AudioFormat::Wav {
            log::warn!(
                "CPAL capture writes WAV only; {:?} requested for {}",
                options.format,
                recording_id
            );
        }

        let path = generate_recording_path(&self.dir, recording_id, AudioFormat::Wav)
            .map_err(|e| AudioError::FileCreationFailed(e.to_string()))?;

        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let thread_path = path.clone();

        let thread = std::thread::Builder::new()
            .name(format!("voice-capture-{}", recording_id))
            .spawn(move || run_capture_thread(thread_path, options, ready_tx, stop_rx))
            .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))?;

        let (shared, sample_rate) = match ready_rx.await {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(AudioError::StreamCreationFailed(
                    "audio thread exited before the stream started".to_string(),
                ));
            }
        };

        log::info!("Recording started: {:?}", path);

        Ok(CpalCapture {
            recording_id,
            path,
            sample_rate,
            shared,
            stop_tx,
            thread: Some(thread),
        })
    }

    fn input_level(&self, handle: &CpalCapture) -> f32 {
        f32::from_bits(handle.shared.level_bits.load(Ordering::Relaxed))
    }

    async fn stop(&self, mut handle: CpalCapture) -> Result<CapturedAudio, AudioError> {
        handle.shutdown();
        handle.finalize()?;

        let size = std::fs::metadata(&handle.path)
            .map(|m| m.len())
            .map_err(|e| AudioError::WriteFailed(e.to_string()))?;
        let frames = handle.shared.frames_written.load(Ordering::SeqCst);
        let duration = frames as f64 / handle.sample_rate.max(1) as f64;

        log::info!(
            "Recording stopped, WAV finalized: {:?} ({:.2}s, {} bytes)",
            handle.path,
            duration,
            size
        );

        match cleanup_old_recordings(&self.dir) {
            Ok(count) if count > 0 => log::info!("Cleaned up {} old recordings", count),
            Ok(_) => {}
            Err(e) => log::warn!("Failed to cleanup old recordings: {}", e),
        }

        Ok(CapturedAudio {
            uri: format!("file://{}", handle.path.display()),
            duration: Some(duration),
            size,
        })
    }

    async fn discard(&self, mut handle: CpalCapture) -> Result<(), AudioError> {
        handle.shutdown();
        // Drop the writer without finalizing; the partial file is removed below.
        if let Ok(mut guard) = handle.shared.writer.lock() {
            guard.take();
        }
        match std::fs::remove_file(&handle.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(AudioError::WriteFailed(e.to_string())),
        }
        log::info!("Recording discarded: {:?}", handle.path);
        Ok(())
    }
}

type ReadyResult = Result<(Arc<CaptureShared>, u32), AudioError>;

/// Body of the audio thread: open the default input, stream into the WAV
/// writer until a stop signal arrives, then drop the stream.
fn run_capture_thread(
    path: PathBuf,
    options: RecordingOptions,
    ready_tx: oneshot::Sender<ReadyResult>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let opened = open_stream(&path, options.quality.sample_rate());
    let stream = match opened {
        Ok((stream, shared, sample_rate)) => {
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(AudioError::StreamCreationFailed(format!(
                    "Failed to start stream: {}",
                    e
                ))));
                return;
            }
            if ready_tx.send(Ok((shared, sample_rate))).is_err() {
                return;
            }
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Blocks until stop() or the handle is dropped.
    let _ = stop_rx.recv();
    drop(stream);
}

/// Clamp `target` into a device's supported `[min, max]` rate range.
fn nearest_rate(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

/// Supported input config closest to `target_rate`, fewest channels first.
/// Falls back to the device default when the ranges can't be listed.
fn choose_input_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<SupportedStreamConfig, AudioError> {
    let ranges = match device.supported_input_configs() {
        Ok(ranges) => ranges,
        Err(e) => {
            log::warn!("Failed to list input configs, using default: {}", e);
            return device
                .default_input_config()
                .map_err(|_| AudioError::NoSupportedConfig);
        }
    };

    let best = ranges
        .filter(|range| {
            matches!(
                range.sample_format(),
                SampleFormat::I16 | SampleFormat::U16 | SampleFormat::F32
            )
        })
        .min_by_key(|range| {
            let rate = nearest_rate(
                range.min_sample_rate().0,
                range.max_sample_rate().0,
                target_rate,
            );
            (rate.abs_diff(target_rate), range.channels())
        });

    match best {
        Some(range) => {
            let rate = nearest_rate(
                range.min_sample_rate().0,
                range.max_sample_rate().0,
                target_rate,
            );
            Ok(range.with_sample_rate(SampleRate(rate)))
        }
        None => device
            .default_input_config()
            .map_err(|_| AudioError::NoSupportedConfig),
    }
}

fn open_stream(
    path: &PathBuf,
    target_rate: u32,
) -> Result<(Stream, Arc<CaptureShared>, u32), AudioError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(AudioError::NoInputDevice)?;

    log::info!("Using audio input device: {:?}", device.name());

    let supported_config = choose_input_config(&device, target_rate)?;
    let sample_format = supported_config.sample_format();
    let config: StreamConfig = supported_config.into();

    log::info!(
        "Audio config: {} Hz (wanted {}), {} channels -> mono, {:?}",
        config.sample_rate.0,
        target_rate,
        config.channels,
        sample_format
    );

    // Frames are downmixed before writing.
    let spec = WavSpec {
        channels: 1,
        sample_rate: config.sample_rate.0,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let writer = WavWriter::create(path, spec)
        .map_err(|e| AudioError::FileCreationFailed(e.to_string()))?;

    let shared = Arc::new(CaptureShared {
        writer: Arc::new(Mutex::new(Some(writer))),
        is_recording: AtomicBool::new(true),
        level_bits: AtomicU32::new(0f32.to_bits()),
        frames_written: AtomicU64::new(0),
    });

    let stream = match sample_format {
        SampleFormat::I16 => build_stream::<i16>(&device, &config, shared.clone()),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, shared.clone()),
        SampleFormat::F32 => build_stream::<f32>(&device, &config, shared.clone()),
        _ => Err(AudioError::NoSupportedConfig),
    }?;

    Ok((stream, shared, config.sample_rate.0))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    shared: Arc<CaptureShared>,
) -> Result<Stream, AudioError>
where
    T: cpal::Sample + cpal::SizedSample + Send + 'static,
{
    let channels = config.channels.max(1) as usize;
    let err_fn = |err| log::error!("Audio stream error: {}", err);

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if !shared.is_recording.load(Ordering::SeqCst) {
                    return;
                }

                let block = downmix_to_mono(data, channels);
                shared
                    .level_bits
                    .store(rms_level(&block).to_bits(), Ordering::Relaxed);

                let Ok(mut guard) = shared.writer.lock() else {
                    return;
                };
                if let Some(ref mut w) = *guard {
                    for &sample in &block {
                        if w.write_sample(sample).is_err() {
                            log::error!("Failed to write sample");
                            return;
                        }
                    }
                    shared
                        .frames_written
                        .fetch_add(block.len() as u64, Ordering::SeqCst);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamCreationFailed(e.to_string()))
}

/// Average each interleaved frame into one 16-bit mono sample.
fn downmix_to_mono<T: cpal::Sample>(data: &[T], channels: usize) -> Vec<i16> {
    data.chunks(channels.max(1))
        .map(|frame| {
            let sum: f32 = frame.iter().map(|&s| sample_to_f32(s)).sum();
            f32_to_i16(sum / frame.len() as f32)
        })
        .collect()
}

fn sample_to_f32<T: cpal::Sample>(sample: T) -> f32 {
    sample.to_float_sample().to_sample()
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}
