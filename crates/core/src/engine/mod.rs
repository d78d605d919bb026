use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::analysis::{
    band_mean, band_range, FftAnalyzer, SpectrumAnalyzer, BASS_UPPER_FRACTION, MID_UPPER_FRACTION,
};
use crate::capture::{AudioSource, CaptureMode, CaptureStream, CpalSource};
use crate::{AnalyzerConfig, AudioError, Result};

/// Builds the analyser for a freshly acquired stream. Swappable so tests can
/// pair a fake analyser with a fake capture backend.
pub type AnalyzerFactory = Box<dyn Fn(&AnalyzerConfig) -> Box<dyn SpectrumAnalyzer> + Send>;

/// Snapshot of the derived band magnitudes, each an average in [0, 255].
/// Recomputed from the current frequency buffer on every poll; carries no
/// reference back to the session it was derived from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BandLevels {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub volume: f32,
}

/// Engine lifecycle. `Starting` covers the span between the capture request
/// going out and the analyser coming up, so an overlapping `start` is
/// rejected instead of racing a boolean flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Starting,
    Running,
}

/// One active capture: the stream handle, the analyser wired to it, and the
/// byte buffers refreshed in place on each accessor call. Exclusively owned
/// by the engine; at most one session is live at a time.
struct AudioSession {
    stream: Box<dyn CaptureStream>,
    analyzer: Box<dyn SpectrumAnalyzer>,
    frequency_data: Vec<u8>,
    waveform_data: Vec<u8>,
}

impl AudioSession {
    fn refresh(&mut self) {
        let fresh = self.stream.drain();
        self.analyzer.push_samples(&fresh);
    }
}

/// Capture-and-analysis engine: acquires an audio input stream, feeds it into
/// a [`SpectrumAnalyzer`], and exposes synchronous accessors for the current
/// spectral/temporal data and the derived band averages.
pub struct AudioEngine {
    config: AnalyzerConfig,
    source: Box<dyn AudioSource>,
    analyzers: AnalyzerFactory,
    state: EngineState,
    session: Option<AudioSession>,
}

impl AudioEngine {
    /// Creates an engine over the host audio backend with default settings.
    pub fn new() -> Self {
        Self::with_config(AnalyzerConfig::default())
    }

    /// Creates an engine over the host audio backend.
    pub fn with_config(config: AnalyzerConfig) -> Self {
        Self::with_source(config, Box::new(CpalSource))
    }

    /// Creates an engine over a custom capture backend.
    pub fn with_source(config: AnalyzerConfig, source: Box<dyn AudioSource>) -> Self {
        Self::with_parts(
            config,
            source,
            Box::new(|config: &AnalyzerConfig| {
                Box::new(FftAnalyzer::new(config.clone())) as Box<dyn SpectrumAnalyzer>
            }),
        )
    }

    /// Creates an engine from explicit capture and analysis parts.
    pub fn with_parts(
        config: AnalyzerConfig,
        source: Box<dyn AudioSource>,
        analyzers: AnalyzerFactory,
    ) -> Self {
        Self {
            config,
            source,
            analyzers,
            state: EngineState::Idle,
            session: None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == EngineState::Running
    }

    /// Acquires a capture stream for `mode` and wires it into a fresh
    /// analyser. A no-op when already running; rejects re-entry while a
    /// previous `start` is still in flight. On failure the error is logged
    /// once and returned, and the engine is left idle.
    pub fn start(&mut self, mode: CaptureMode) -> Result<()> {
        match self.state {
            EngineState::Running => return Ok(()),
            EngineState::Starting => {
                return Err(AudioError::acquisition("capture is already starting"))
            }
            EngineState::Idle => {}
        }

        self.state = EngineState::Starting;
        match self.acquire(mode) {
            Ok(session) => {
                self.session = Some(session);
                self.state = EngineState::Running;
                Ok(())
            }
            Err(err) => {
                self.state = EngineState::Idle;
                error!(%mode, "failed to start audio engine: {err}");
                Err(err)
            }
        }
    }

    fn acquire(&mut self, mode: CaptureMode) -> Result<AudioSession> {
        let stream = self.source.open(mode)?;
        let analyzer = (self.analyzers)(&self.config);
        let bins = analyzer.frequency_bin_count();
        info!(sample_rate = stream.sample_rate(), bins, "capture stream ready");

        Ok(AudioSession {
            stream,
            analyzer,
            frequency_data: vec![0; bins],
            waveform_data: vec![0; bins],
        })
    }

    /// Refreshes and returns the frequency-domain buffer: one unsigned byte
    /// magnitude per bin, ordered low to high frequency. Empty when the
    /// engine is not running.
    pub fn frequency_data(&mut self) -> &[u8] {
        match self.session.as_mut() {
            Some(session) => {
                session.refresh();
                session.analyzer.write_frequency_data(&mut session.frequency_data);
                &session.frequency_data
            }
            None => &[],
        }
    }

    /// Refreshes and returns the time-domain (waveform) buffer. Empty when
    /// the engine is not running.
    pub fn waveform_data(&mut self) -> &[u8] {
        match self.session.as_mut() {
            Some(session) => {
                session.refresh();
                session.analyzer.write_waveform_data(&mut session.waveform_data);
                &session.waveform_data
            }
            None => &[],
        }
    }

    /// Average magnitude of the low-frequency band.
    pub fn bass_level(&mut self) -> f32 {
        self.band_level(0.0, BASS_UPPER_FRACTION)
    }

    /// Average magnitude of the mid-frequency band.
    pub fn mid_level(&mut self) -> f32 {
        self.band_level(BASS_UPPER_FRACTION, MID_UPPER_FRACTION)
    }

    /// Average magnitude of the high-frequency band.
    pub fn treble_level(&mut self) -> f32 {
        self.band_level(MID_UPPER_FRACTION, 1.0)
    }

    /// Average magnitude across the entire frequency buffer.
    pub fn volume_level(&mut self) -> f32 {
        self.band_level(0.0, 1.0)
    }

    /// Refreshes the frequency buffer once and returns all four band
    /// averages from the same snapshot.
    pub fn levels(&mut self) -> BandLevels {
        let data = self.frequency_data();
        let len = data.len();
        BandLevels {
            bass: band_mean(data, band_range(len, 0.0, BASS_UPPER_FRACTION)),
            mid: band_mean(data, band_range(len, BASS_UPPER_FRACTION, MID_UPPER_FRACTION)),
            treble: band_mean(data, band_range(len, MID_UPPER_FRACTION, 1.0)),
            volume: band_mean(data, band_range(len, 0.0, 1.0)),
        }
    }

    fn band_level(&mut self, lo_frac: f32, hi_frac: f32) -> f32 {
        let data = self.frequency_data();
        let range = band_range(data.len(), lo_frac, hi_frac);
        band_mean(data, range)
    }

    /// Stops capture and releases every platform resource held by the
    /// session. Idempotent, and safe when never started.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.stream.close();
        }
        self.state = EngineState::Idle;
    }
}

impl Default for AudioEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for AudioEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioEngine")
            .field("state", &self.state)
            .field("config", &self.config)
            .field("session", &self.session.is_some())
            .finish()
    }
}
