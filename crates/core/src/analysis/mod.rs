use std::{f32::consts::PI, fmt, ops::Range, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};
use tracing::error;

use crate::AnalyzerConfig;

/// Fraction of the spectrum covered by the bass band.
pub const BASS_UPPER_FRACTION: f32 = 0.10;
/// Upper fraction of the mid band; treble runs from here to the end.
pub const MID_UPPER_FRACTION: f32 = 0.50;

/// Spectrum analyser contract: a configured transform primitive that can
/// refresh caller-owned frequency and time-domain byte buffers on demand.
pub trait SpectrumAnalyzer: Send {
    /// Number of frequency bins written by [`write_frequency_data`].
    ///
    /// [`write_frequency_data`]: SpectrumAnalyzer::write_frequency_data
    fn frequency_bin_count(&self) -> usize;

    /// Appends captured mono samples to the rolling analysis window.
    fn push_samples(&mut self, samples: &[f32]);

    /// Writes the current frequency-domain magnitudes into `out`, one byte
    /// per bin in [0, 255], ordered low to high frequency.
    fn write_frequency_data(&mut self, out: &mut [u8]);

    /// Writes the current time-domain samples into `out`, mapped so that
    /// silence sits at 128.
    fn write_waveform_data(&mut self, out: &mut [u8]);
}

/// FFT-backed [`SpectrumAnalyzer`] reproducing the byte-data contract of the
/// browser analyser node the UI layer was written against: Hann-windowed
/// forward transform over the most recent `fft_size` samples, per-bin
/// exponential smoothing across successive pulls, and a linear dB-to-byte
/// mapping between `min_decibels` and `max_decibels`.
pub struct FftAnalyzer {
    config: AnalyzerConfig,
    /// Most recent `fft_size` mono samples, oldest first.
    window: Vec<f32>,
    /// Per-bin exponentially smoothed magnitudes.
    smoothed: Vec<f32>,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
}

impl FftAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        let mut planner = RealFftPlanner::new();
        let plan = planner.plan_fft_forward(config.fft_size);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        Self {
            window: vec![0.0; config.fft_size],
            smoothed: vec![0.0; config.frequency_bin_count()],
            config,
            plan,
            input,
            spectrum,
            scratch,
        }
    }

    fn refresh_spectrum(&mut self) {
        let len = self.input.len();
        for (index, slot) in self.input.iter_mut().enumerate() {
            *slot = self.window[index] * hann_value(index, len);
        }

        if let Err(err) =
            self.plan
                .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
        {
            error!("fft transform failed: {err}");
            return;
        }

        let tau = self.config.smoothing_time_constant.clamp(0.0, 1.0);
        let norm = 1.0 / self.config.fft_size as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(self.spectrum.iter()) {
            let magnitude = bin.norm() * norm;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;
        }
    }
}

impl SpectrumAnalyzer for FftAnalyzer {
    fn frequency_bin_count(&self) -> usize {
        self.smoothed.len()
    }

    fn push_samples(&mut self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        if samples.len() >= self.window.len() {
            let start = samples.len() - self.window.len();
            self.window.copy_from_slice(&samples[start..]);
            return;
        }
        let keep = self.window.len() - samples.len();
        self.window.copy_within(samples.len().., 0);
        self.window[keep..].copy_from_slice(samples);
    }

    fn write_frequency_data(&mut self, out: &mut [u8]) {
        self.refresh_spectrum();
        let span = self.config.max_decibels - self.config.min_decibels;
        for (slot, &magnitude) in out.iter_mut().zip(self.smoothed.iter()) {
            let db = if magnitude > 0.0 {
                20.0 * magnitude.log10()
            } else {
                f32::NEG_INFINITY
            };
            let scaled = 255.0 * (db - self.config.min_decibels) / span;
            *slot = scaled.clamp(0.0, 255.0) as u8;
        }
    }

    fn write_waveform_data(&mut self, out: &mut [u8]) {
        let start = self.window.len().saturating_sub(out.len());
        for (slot, &sample) in out.iter_mut().zip(self.window[start..].iter()) {
            *slot = (128.0 + sample * 128.0).clamp(0.0, 255.0) as u8;
        }
    }
}

impl fmt::Debug for FftAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftAnalyzer")
            .field("fft_size", &self.config.fft_size)
            .field("bins", &self.smoothed.len())
            .finish()
    }
}

/// Computes the bin range for a band given fractional boundaries. The
/// boundaries truncate, so pathologically small bin counts can produce an
/// empty range.
pub fn band_range(len: usize, lo_frac: f32, hi_frac: f32) -> Range<usize> {
    let lo = (len as f32 * lo_frac) as usize;
    let hi = (len as f32 * hi_frac) as usize;
    lo.min(len)..hi.min(len)
}

/// Arithmetic mean of the magnitudes inside `range`, or 0 when the range is
/// empty. The guard covers the zero-width bands that tiny bin counts yield.
pub fn band_mean(data: &[u8], range: Range<usize>) -> f32 {
    if range.is_empty() {
        return 0.0;
    }
    let slice = &data[range];
    let sum: u32 = slice.iter().map(|&value| value as u32).sum();
    sum as f32 / slice.len() as f32
}

fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_partition_covers_buffer_without_gap_or_overlap() {
        for len in [10, 64, 100, 1024, 4096] {
            let bass = band_range(len, 0.0, BASS_UPPER_FRACTION);
            let mid = band_range(len, BASS_UPPER_FRACTION, MID_UPPER_FRACTION);
            let treble = band_range(len, MID_UPPER_FRACTION, 1.0);

            assert_eq!(bass.start, 0);
            assert_eq!(bass.end, mid.start);
            assert_eq!(mid.end, treble.start);
            assert_eq!(treble.end, len);
        }
    }

    #[test]
    fn all_zero_buffer_yields_zero_levels() {
        let data = vec![0u8; 100];
        assert_eq!(band_mean(&data, band_range(100, 0.0, BASS_UPPER_FRACTION)), 0.0);
        assert_eq!(
            band_mean(&data, band_range(100, BASS_UPPER_FRACTION, MID_UPPER_FRACTION)),
            0.0
        );
        assert_eq!(band_mean(&data, band_range(100, MID_UPPER_FRACTION, 1.0)), 0.0);
        assert_eq!(band_mean(&data, band_range(100, 0.0, 1.0)), 0.0);
    }

    #[test]
    fn bass_only_buffer_isolates_the_bass_band() {
        let mut data = vec![0u8; 100];
        for slot in data.iter_mut().take(10) {
            *slot = 200;
        }

        assert_eq!(band_mean(&data, band_range(100, 0.0, BASS_UPPER_FRACTION)), 200.0);
        assert_eq!(
            band_mean(&data, band_range(100, BASS_UPPER_FRACTION, MID_UPPER_FRACTION)),
            0.0
        );
        assert_eq!(band_mean(&data, band_range(100, MID_UPPER_FRACTION, 1.0)), 0.0);
    }

    #[test]
    fn volume_equals_full_buffer_mean() {
        let data: Vec<u8> = (0..=255).map(|value| (value * 7 % 256) as u8).collect();
        let expected =
            data.iter().map(|&value| value as u32).sum::<u32>() as f32 / data.len() as f32;
        assert_eq!(band_mean(&data, band_range(data.len(), 0.0, 1.0)), expected);
    }

    #[test]
    fn zero_width_band_returns_zero_instead_of_dividing() {
        // 5 bins puts the bass boundary at floor(5 * 0.1) = 0.
        let data = vec![255u8; 5];
        let bass = band_range(5, 0.0, BASS_UPPER_FRACTION);
        assert!(bass.is_empty());
        assert_eq!(band_mean(&data, bass), 0.0);
    }

    #[test]
    fn analyzer_reports_half_window_bins() {
        let analyzer = FftAnalyzer::new(AnalyzerConfig::default());
        assert_eq!(analyzer.frequency_bin_count(), 1024);
    }

    #[test]
    fn silence_maps_to_zero_bytes() {
        let mut analyzer = FftAnalyzer::new(AnalyzerConfig::default());
        analyzer.push_samples(&vec![0.0; 2048]);

        let mut data = vec![0u8; analyzer.frequency_bin_count()];
        analyzer.write_frequency_data(&mut data);
        assert!(data.iter().all(|&value| value == 0));
    }

    #[test]
    fn loud_tone_raises_frequency_bytes() {
        let config = AnalyzerConfig::default();
        let fft_size = config.fft_size;
        let mut analyzer = FftAnalyzer::new(config);

        // A full-scale tone aligned to bin 64 of a 2048-point transform.
        let tone: Vec<f32> = (0..fft_size)
            .map(|index| (2.0 * PI * 64.0 * index as f32 / fft_size as f32).sin())
            .collect();
        analyzer.push_samples(&tone);

        let mut data = vec![0u8; analyzer.frequency_bin_count()];
        analyzer.write_frequency_data(&mut data);
        assert!(data.iter().any(|&value| value > 0));
        let loudest = data
            .iter()
            .enumerate()
            .max_by_key(|(_, &value)| value)
            .map(|(index, _)| index)
            .unwrap();
        assert!((63..=65).contains(&loudest));
    }

    #[test]
    fn smoothing_decays_between_pulls() {
        let config = AnalyzerConfig::default();
        let fft_size = config.fft_size;
        let mut analyzer = FftAnalyzer::new(config);

        // Quiet enough that the peak bin stays below the clamp ceiling.
        let tone: Vec<f32> = (0..fft_size)
            .map(|index| 0.01 * (2.0 * PI * 64.0 * index as f32 / fft_size as f32).sin())
            .collect();
        analyzer.push_samples(&tone);

        let mut loud = vec![0u8; analyzer.frequency_bin_count()];
        analyzer.write_frequency_data(&mut loud);

        // Replace the tone with silence; the smoothed magnitude should decay
        // rather than drop straight to zero.
        analyzer.push_samples(&vec![0.0; fft_size]);
        let mut decayed = vec![0u8; analyzer.frequency_bin_count()];
        analyzer.write_frequency_data(&mut decayed);

        assert!(decayed[64] > 0);
        assert!(decayed[64] < loud[64]);
    }

    #[test]
    fn waveform_bytes_centre_on_128() {
        let mut analyzer = FftAnalyzer::new(AnalyzerConfig::default());
        let mut out = vec![0u8; analyzer.frequency_bin_count()];

        analyzer.push_samples(&vec![0.0; 2048]);
        analyzer.write_waveform_data(&mut out);
        assert!(out.iter().all(|&value| value == 128));

        analyzer.push_samples(&vec![1.0; 2048]);
        analyzer.write_waveform_data(&mut out);
        assert!(out.iter().all(|&value| value == 255));

        analyzer.push_samples(&vec![-1.0; 2048]);
        analyzer.write_waveform_data(&mut out);
        assert!(out.iter().all(|&value| value == 0));
    }

    #[test]
    fn push_keeps_only_the_latest_window() {
        let mut analyzer = FftAnalyzer::new(AnalyzerConfig::default());
        analyzer.push_samples(&vec![0.25; 4096]);
        analyzer.push_samples(&[0.5, 0.5]);

        let mut out = vec![0u8; analyzer.frequency_bin_count()];
        analyzer.write_waveform_data(&mut out);
        // The newest two samples sit at the end of the window.
        assert_eq!(*out.last().unwrap(), 192);
    }
}
