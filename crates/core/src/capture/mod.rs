use std::fmt;
use std::str::FromStr;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{AudioError, Result};

/// Samples buffered between polls are capped at roughly one second of audio
/// at 48 kHz so a consumer that stops draining cannot grow the buffer
/// without bound.
const MAX_PENDING_SAMPLES: usize = 48_000;

/// Device name fragments that mark an input endpoint as a system-audio
/// loopback rather than a physical microphone.
const LOOPBACK_MARKERS: &[&str] = &["monitor", "loopback", "stereo mix", "blackhole", "soundflower"];

/// Mode enum describes which platform endpoint supplies the capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Capture the default microphone.
    Mic,
    /// Capture the host audio output through a loopback endpoint.
    System,
}

impl FromStr for CaptureMode {
    type Err = AudioError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "mic" => Ok(Self::Mic),
            "system" => Ok(Self::System),
            other => Err(AudioError::msg(format!(
                "unknown capture mode '{other}', expected 'mic' or 'system'"
            ))),
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mic => f.write_str("mic"),
            Self::System => f.write_str("system"),
        }
    }
}

/// Opens capture streams for a [`CaptureMode`]. The engine depends only on
/// this capability, so tests can substitute a deterministic backend.
pub trait AudioSource: Send {
    fn open(&self, mode: CaptureMode) -> Result<Box<dyn CaptureStream>>;
}

/// Live handle to an open capture stream.
pub trait CaptureStream: Send {
    /// Sample rate of the delivered mono samples.
    fn sample_rate(&self) -> u32;

    /// Pulls the samples accumulated since the previous call. Non-blocking.
    fn drain(&mut self) -> Vec<f32>;

    /// Stops the stream and releases the device. Idempotent.
    fn close(&mut self);
}

/// Default [`AudioSource`] backed by the host audio backend.
#[derive(Debug, Default)]
pub struct CpalSource;

impl AudioSource for CpalSource {
    fn open(&self, mode: CaptureMode) -> Result<Box<dyn CaptureStream>> {
        Ok(Box::new(CpalStream::open(mode)?))
    }
}

/// Enumerates the names of the capture devices the host backend exposes.
pub fn list_input_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|err| AudioError::acquisition(format!("failed to enumerate input devices: {err}")))?;
    Ok(devices
        .map(|device| device.name().unwrap_or_else(|_| "unknown device".to_string()))
        .collect())
}

fn find_device(mode: CaptureMode) -> Result<Device> {
    let host = cpal::default_host();
    match mode {
        CaptureMode::Mic => host
            .default_input_device()
            .ok_or_else(|| AudioError::acquisition("no default input device available")),
        CaptureMode::System => {
            let devices = host.input_devices().map_err(|err| {
                AudioError::acquisition(format!("failed to enumerate input devices: {err}"))
            })?;
            for device in devices {
                let name = device.name().unwrap_or_default().to_lowercase();
                if LOOPBACK_MARKERS.iter().any(|marker| name.contains(marker)) {
                    return Ok(device);
                }
            }
            Err(AudioError::acquisition(
                "no system-audio loopback device found; enable a monitor or loopback endpoint and retry",
            ))
        }
    }
}

/// Capture stream whose cpal handle lives on a dedicated thread.
///
/// cpal streams are not `Send`, so the thread owns the stream for its whole
/// lifetime and drops it when `close` signals. The stream callback downmixes
/// interleaved frames to mono and appends them to a shared buffer the engine
/// drains on each poll.
struct CpalStream {
    sample_rate: u32,
    shared: Arc<Mutex<Vec<f32>>>,
    stop_tx: Option<mpsc::Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl CpalStream {
    fn open(mode: CaptureMode) -> Result<Self> {
        let device = find_device(mode)?;
        let name = device
            .name()
            .unwrap_or_else(|_| "unknown device".to_string());
        let supported = device.default_input_config().map_err(|err| {
            AudioError::acquisition(format!("failed to query input config for '{name}': {err}"))
        })?;
        let sample_rate = supported.sample_rate().0;
        info!(device = %name, sample_rate, %mode, "opening capture stream");

        let shared = Arc::new(Mutex::new(Vec::new()));
        let sink = shared.clone();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

        let worker = thread::Builder::new()
            .name("band-meter-capture".into())
            .spawn(move || {
                let stream = match build_input_stream(&device, &supported, sink) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                if let Err(err) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::acquisition(format!(
                        "failed to start capture stream: {err}"
                    ))));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Park until close() signals, keeping the stream alive.
                let _ = stop_rx.recv();
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = worker.join();
                return Err(err);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(AudioError::acquisition(
                    "capture thread exited before the stream came up",
                ));
            }
        }

        Ok(Self {
            sample_rate,
            shared,
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }
}

impl CaptureStream for CpalStream {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn drain(&mut self) -> Vec<f32> {
        match self.shared.lock() {
            Ok(mut buffer) => std::mem::take(&mut *buffer),
            Err(_) => Vec::new(),
        }
    }

    fn close(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.close();
    }
}

fn build_input_stream(
    device: &Device,
    supported: &cpal::SupportedStreamConfig,
    sink: Arc<Mutex<Vec<f32>>>,
) -> Result<cpal::Stream> {
    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: cpal::BufferSize::Default,
    };
    let channels = config.channels as usize;
    let err_fn = |err| error!("capture stream error: {err}");

    let stream = match supported.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                push_mono(
                    &sink,
                    data.chunks_exact(channels)
                        .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                );
            },
            err_fn,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                push_mono(
                    &sink,
                    data.chunks_exact(channels).map(|frame| {
                        frame
                            .iter()
                            .map(|&sample| sample as f32 / i16::MAX as f32)
                            .sum::<f32>()
                            / channels as f32
                    }),
                );
            },
            err_fn,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                push_mono(
                    &sink,
                    data.chunks_exact(channels).map(|frame| {
                        let average =
                            frame.iter().map(|&sample| sample as f32).sum::<f32>() / channels as f32;
                        (average - 32_768.0) / 32_768.0
                    }),
                );
            },
            err_fn,
            None,
        ),
        other => {
            return Err(AudioError::acquisition(format!(
                "unsupported sample format: {other}"
            )))
        }
    };

    stream.map_err(|err| AudioError::acquisition(format!("failed to build capture stream: {err}")))
}

fn push_mono<I: Iterator<Item = f32>>(sink: &Mutex<Vec<f32>>, samples: I) {
    if let Ok(mut buffer) = sink.lock() {
        buffer.extend(samples);
        if buffer.len() > MAX_PENDING_SAMPLES {
            let overflow = buffer.len() - MAX_PENDING_SAMPLES;
            buffer.drain(0..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mode_literals() {
        assert_eq!("mic".parse::<CaptureMode>().unwrap(), CaptureMode::Mic);
        assert_eq!("system".parse::<CaptureMode>().unwrap(), CaptureMode::System);
        assert!("radio".parse::<CaptureMode>().is_err());
    }

    #[test]
    fn mode_display_round_trips() {
        for mode in [CaptureMode::Mic, CaptureMode::System] {
            assert_eq!(mode.to_string().parse::<CaptureMode>().unwrap(), mode);
        }
    }

    #[test]
    fn pending_samples_are_capped() {
        let sink = Mutex::new(Vec::new());
        push_mono(&sink, std::iter::repeat(0.5).take(MAX_PENDING_SAMPLES + 100));
        assert_eq!(sink.lock().unwrap().len(), MAX_PENDING_SAMPLES);
    }
}
