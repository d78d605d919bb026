//! Core library for the live audio band level meter.
//!
//! The crate captures live audio from a microphone or a system loopback
//! endpoint and derives coarse real-time metrics — bass, mid, treble and
//! overall volume averages — from frequency-domain samples. The [`engine`]
//! module owns capture and analysis; the [`adapter`] module republishes the
//! derived levels into observable state a UI layer can read on every frame.

pub mod adapter;
pub mod analysis;
pub mod capture;
pub mod config;
pub mod engine;
pub mod error;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::LevelAdapter;
pub use analysis::{band_mean, band_range, FftAnalyzer, SpectrumAnalyzer};
pub use capture::{list_input_devices, AudioSource, CaptureMode, CaptureStream, CpalSource};
pub use config::{AdapterConfig, AnalyzerConfig, AppConfig};
pub use engine::{AnalyzerFactory, AudioEngine, BandLevels, EngineState};
pub use error::{AudioError, Result};
