use serde::{Deserialize, Serialize};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub analyzer: AnalyzerConfig,
    pub adapter: AdapterConfig,
}

/// Configuration for the spectrum analyser primitive.
///
/// Defaults mirror the classic browser analyser node: a 2048 sample transform
/// window, a 0.8 smoothing time constant and byte output scaled between -100
/// and -30 dBFS.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyzerConfig {
    /// Number of frequency bins the analyser reports, half the window size.
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

/// Configuration for the reactive adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Poll rate for republishing band levels, in ticks per second.
    pub poll_hz: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self { poll_hz: 60 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_analyzer_matches_browser_analyser() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.fft_size, 2048);
        assert_eq!(config.frequency_bin_count(), 1024);
        assert!((config.smoothing_time_constant - 0.8).abs() < f32::EPSILON);
    }
}
