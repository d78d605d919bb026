//! Deterministic capture and analysis fakes shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::analysis::SpectrumAnalyzer;
use crate::capture::{AudioSource, CaptureMode, CaptureStream};
use crate::{AudioError, Result};

/// Capture backend that hands out canned streams and counts opens.
pub struct FakeSource {
    pub opens: Arc<AtomicUsize>,
    pub closed: Arc<AtomicBool>,
    fail_with: Option<String>,
}

impl FakeSource {
    /// A source whose streams deliver no samples.
    pub fn silent() -> Self {
        Self {
            opens: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
            fail_with: None,
        }
    }

    /// A source that refuses every open with an acquisition error.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::silent()
        }
    }
}

impl AudioSource for FakeSource {
    fn open(&self, _mode: CaptureMode) -> Result<Box<dyn CaptureStream>> {
        if let Some(message) = &self.fail_with {
            return Err(AudioError::acquisition(message.clone()));
        }
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(FakeStream {
            samples: Vec::new(),
            closed: self.closed.clone(),
        }))
    }
}

pub struct FakeStream {
    samples: Vec<f32>,
    closed: Arc<AtomicBool>,
}

impl CaptureStream for FakeStream {
    fn sample_rate(&self) -> u32 {
        48_000
    }

    fn drain(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.samples)
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

/// Analyser that reports a fixed byte value across every bin.
pub struct FakeAnalyzer {
    bins: usize,
    level: u8,
}

impl FakeAnalyzer {
    pub fn new(bins: usize, level: u8) -> Self {
        Self { bins, level }
    }
}

impl SpectrumAnalyzer for FakeAnalyzer {
    fn frequency_bin_count(&self) -> usize {
        self.bins
    }

    fn push_samples(&mut self, _samples: &[f32]) {}

    fn write_frequency_data(&mut self, out: &mut [u8]) {
        out.fill(self.level);
    }

    fn write_waveform_data(&mut self, out: &mut [u8]) {
        out.fill(128);
    }
}
