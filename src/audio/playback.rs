//! Audio playback to speakers
//!
//! A single output context is created on first use and kept for the life of
//! the process. It lives on its own thread because cpal streams are not `Send`
//! on every platform; `play` hands buffers to that thread over a channel and
//! returns immediately. Overlapping buffers are mixed, never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};

use super::decoder::{PcmBuffer, SAMPLE_RATE};
use crate::{Error, Result};

/// Sink for decoded speech
///
/// Implementations must not block until the audio finishes sounding.
pub trait AudioOutput: Send + Sync {
    /// Start playing a buffer
    ///
    /// # Errors
    ///
    /// Returns [`Error::Playback`] if the output cannot be opened or started
    fn play(&self, buffer: &PcmBuffer) -> Result<()>;
}

/// Process-wide output context, created lazily by [`AudioPlayback`]
static CONTEXT: Mutex<Option<Arc<OutputContext>>> = Mutex::new(None);

/// How long to wait for the audio thread to open the device
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Description of the opened output device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputInfo {
    pub device: String,
    pub sample_rate: u32,
    pub channels: u16,
}

struct OutputContext {
    info: OutputInfo,
    voices: Sender<Voice>,
    failed: Arc<AtomicBool>,
}

/// One buffer being played, with its read position
struct Voice {
    samples: Arc<[f32]>,
    position: usize,
}

/// Plays PCM buffers on the default output device
#[derive(Debug, Clone, Copy, Default)]
pub struct AudioPlayback;

impl AudioPlayback {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Open the shared output context now instead of on first `play`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Playback`] if no usable output device exists
    pub fn warm_up(&self) -> Result<OutputInfo> {
        Ok(context()?.info.clone())
    }
}

impl AudioOutput for AudioPlayback {
    fn play(&self, buffer: &PcmBuffer) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }

        let context = context()?;

        let samples = if context.info.sample_rate == SAMPLE_RATE {
            buffer.shared()
        } else {
            resample(buffer.samples(), SAMPLE_RATE, context.info.sample_rate)?.into()
        };

        let sample_count = samples.len();
        context
            .voices
            .send(Voice {
                samples,
                position: 0,
            })
            .map_err(|_| {
                context.failed.store(true, Ordering::SeqCst);
                Error::Playback("audio thread stopped".to_string())
            })?;

        tracing::debug!(
            samples = sample_count,
            duration_ms = u64::try_from(buffer.duration().as_millis()).unwrap_or(u64::MAX),
            "playback started"
        );

        Ok(())
    }
}

/// Return the shared context, creating it if needed
///
/// A context whose stream reported an error is discarded so the next call
/// reopens the device.
fn context() -> Result<Arc<OutputContext>> {
    let mut slot = CONTEXT
        .lock()
        .map_err(|_| Error::Playback("output context lock poisoned".to_string()))?;

    if let Some(existing) = slot.as_ref() {
        if !existing.failed.load(Ordering::SeqCst) {
            return Ok(Arc::clone(existing));
        }
        tracing::warn!(device = %existing.info.device, "output stream failed, reopening");
        *slot = None;
    }

    let created = Arc::new(open_context()?);
    *slot = Some(Arc::clone(&created));
    Ok(created)
}

/// Spawn the audio thread and wait for it to open the device
fn open_context() -> Result<OutputContext> {
    let (voice_tx, voice_rx) = mpsc::channel::<Voice>();
    let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<OutputInfo>>(1);
    let failed = Arc::new(AtomicBool::new(false));
    let thread_failed = Arc::clone(&failed);

    std::thread::Builder::new()
        .name("lector-audio".to_string())
        .spawn(move || run_output_thread(voice_rx, &ready_tx, &thread_failed))
        .map_err(|e| Error::Playback(format!("failed to spawn audio thread: {e}")))?;

    let info = await_ready(&ready_rx, &failed, OPEN_TIMEOUT)?;

    tracing::debug!(
        device = %info.device,
        sample_rate = info.sample_rate,
        channels = info.channels,
        "audio output context initialized"
    );

    Ok(OutputContext {
        info,
        voices: voice_tx,
        failed,
    })
}

/// Wait for the audio thread to report the opened device
///
/// On timeout the thread is flagged as failed, so a stream that opens late
/// is dropped instead of parked.
fn await_ready(
    ready: &Receiver<Result<OutputInfo>>,
    failed: &AtomicBool,
    timeout: Duration,
) -> Result<OutputInfo> {
    match ready.recv_timeout(timeout) {
        Ok(opened) => opened,
        Err(_) => {
            failed.store(true, Ordering::SeqCst);
            Err(Error::Playback("audio device did not open in time".to_string()))
        }
    }
}

/// Body of the audio thread: own the stream until it fails
fn run_output_thread(
    voices: Receiver<Voice>,
    ready: &mpsc::SyncSender<Result<OutputInfo>>,
    failed: &Arc<AtomicBool>,
) {
    let stream = match build_stream(voices, failed) {
        Ok((stream, info)) => {
            if ready.send(Ok(info)).is_err() {
                tracing::debug!("audio output opened after caller gave up");
                return;
            }
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while !failed.load(Ordering::SeqCst) {
        std::thread::park_timeout(Duration::from_secs(1));
    }

    drop(stream);
    tracing::debug!("audio output thread exiting");
}

fn build_stream(
    voices: Receiver<Voice>,
    failed: &Arc<AtomicBool>,
) -> Result<(cpal::Stream, OutputInfo)> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

    let config = select_config(&device)?;
    let channels = usize::from(config.channels);

    let info = OutputInfo {
        device: device.name().unwrap_or_default(),
        sample_rate: config.sample_rate.0,
        channels: config.channels,
    };

    let mut active: Vec<Voice> = Vec::new();
    let error_flag = Arc::clone(failed);

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                while let Ok(voice) = voices.try_recv() {
                    active.push(voice);
                }
                mix_into(data, channels, &mut active);
            },
            move |err| {
                tracing::error!(error = %err, "audio playback error");
                error_flag.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::Playback(e.to_string()))?;

    stream.play().map_err(|e| Error::Playback(e.to_string()))?;

    Ok((stream, info))
}

/// Pick an `f32` output config: mono 24 kHz, then stereo 24 kHz, then the
/// device default (buffers are resampled to its rate)
fn select_config(device: &cpal::Device) -> Result<StreamConfig> {
    let supports_rate = |c: &SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels
            && c.sample_format() == SampleFormat::F32
            && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
            && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
    };

    let ranges: Vec<SupportedStreamConfigRange> = device
        .supported_output_configs()
        .map_err(|e| Error::Playback(e.to_string()))?
        .collect();

    let exact = ranges
        .iter()
        .find(|c| supports_rate(c, 1))
        .or_else(|| ranges.iter().find(|c| supports_rate(c, 2)));

    if let Some(range) = exact {
        return Ok(range.clone().with_sample_rate(SampleRate(SAMPLE_RATE)).config());
    }

    let fallback = device
        .default_output_config()
        .map_err(|e| Error::Playback(e.to_string()))?;

    if fallback.sample_format() != SampleFormat::F32 {
        return Err(Error::Playback(format!(
            "no f32 output config found (default is {:?})",
            fallback.sample_format()
        )));
    }

    tracing::debug!(
        sample_rate = fallback.sample_rate().0,
        "device lacks 24 kHz output, resampling"
    );

    Ok(fallback.config())
}

/// Mix active voices into an interleaved output block and drop finished ones
fn mix_into(data: &mut [f32], channels: usize, active: &mut Vec<Voice>) {
    for frame in data.chunks_mut(channels.max(1)) {
        let mut mixed = 0.0_f32;
        for voice in active.iter_mut() {
            if let Some(&sample) = voice.samples.get(voice.position) {
                mixed += sample;
                voice.position += 1;
            }
        }
        frame.fill(mixed.clamp(-1.0, 1.0));
    }

    active.retain(|voice| voice.position < voice.samples.len());
}

/// Resample mono audio using rubato
fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    const CHUNK_SIZE: usize = 1024;

    let mut resampler =
        FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 2, 1)
            .map_err(|e| Error::Playback(format!("resampler init failed: {e}")))?;

    let expected = samples.len() * to_rate as usize / from_rate as usize;
    let mut output = Vec::with_capacity(expected + CHUNK_SIZE);

    for chunk in samples.chunks(CHUNK_SIZE) {
        let input = [chunk];
        let frames = if chunk.len() == CHUNK_SIZE {
            resampler.process(&input[..], None)
        } else {
            resampler.process_partial(Some(&input[..]), None)
        }
        .map_err(|e| Error::Playback(format!("resample failed: {e}")))?;
        output.extend_from_slice(&frames[0]);
    }

    // Flush what is still inside the filter
    let tail = resampler
        .process_partial(None::<&[&[f32]]>, None)
        .map_err(|e| Error::Playback(format!("resample failed: {e}")))?;
    output.extend_from_slice(&tail[0]);

    let delay = resampler.output_delay().min(output.len());
    output.drain(..delay);
    output.truncate(expected);

    Ok(output)
}
