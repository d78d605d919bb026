use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::capture::CaptureMode;
use crate::engine::{AudioEngine, BandLevels};
use crate::{AdapterConfig, AudioError, Result};

/// Cancellation handle for the poll task: the stop flag plus the join
/// handle, so no tick can outlive the adapter that scheduled it.
#[derive(Debug)]
struct PollHandle {
    stop: Arc<AtomicBool>,
    worker: thread::JoinHandle<()>,
}

impl PollHandle {
    fn cancel(self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = self.worker.join();
    }
}

/// Bridges the pull-based [`AudioEngine`] to shared observable state.
///
/// `start` spawns a fixed-period poll task — the single writer of the
/// published levels — and `stop` cancels it before releasing the engine.
/// Dropping the adapter stops everything, the equivalent of cleanup when the
/// owning UI component is torn down.
#[derive(Debug)]
pub struct LevelAdapter {
    config: AdapterConfig,
    engine: Arc<Mutex<AudioEngine>>,
    levels: Arc<Mutex<BandLevels>>,
    running: Arc<AtomicBool>,
    poll: Option<PollHandle>,
}

impl LevelAdapter {
    /// Wraps an engine using the default 60 Hz poll rate.
    pub fn new(engine: AudioEngine) -> Self {
        Self::with_config(AdapterConfig::default(), engine)
    }

    pub fn with_config(config: AdapterConfig, engine: AudioEngine) -> Self {
        Self {
            config,
            engine: Arc::new(Mutex::new(engine)),
            levels: Arc::new(Mutex::new(BandLevels::default())),
            running: Arc::new(AtomicBool::new(false)),
            poll: None,
        }
    }

    /// Starts the engine and begins republishing its band levels. A no-op
    /// when already running; on failure the engine's error propagates and no
    /// poll is started.
    pub fn start(&mut self, mode: CaptureMode) -> Result<()> {
        if self.running.load(Ordering::Relaxed) {
            return Ok(());
        }

        self.lock_engine()?.start(mode)?;

        match self.spawn_poll() {
            Ok(handle) => {
                self.poll = Some(handle);
                self.running.store(true, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                if let Ok(mut engine) = self.engine.lock() {
                    engine.stop();
                }
                Err(err)
            }
        }
    }

    /// Cancels the poll, stops the engine, and resets the published levels
    /// to zero. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.poll.take() {
            handle.cancel();
        }
        if let Ok(mut engine) = self.engine.lock() {
            engine.stop();
        }
        self.running.store(false, Ordering::Relaxed);
        if let Ok(mut slot) = self.levels.lock() {
            *slot = BandLevels::default();
        }
    }

    /// Latest published band levels. Zero whenever the adapter is stopped.
    pub fn levels(&self) -> BandLevels {
        self.levels.lock().map(|slot| *slot).unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn spawn_poll(&self) -> Result<PollHandle> {
        let period = Duration::from_secs_f64(1.0 / self.config.poll_hz.max(1) as f64);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let engine = self.engine.clone();
        let levels = self.levels.clone();

        let worker = thread::Builder::new()
            .name("band-meter-poll".into())
            .spawn(move || {
                while !stop_flag.load(Ordering::Relaxed) {
                    let snapshot = match engine.lock() {
                        Ok(mut engine) => engine.levels(),
                        Err(_) => break,
                    };
                    if let Ok(mut slot) = levels.lock() {
                        *slot = snapshot;
                    }
                    thread::sleep(period);
                }
            })?;

        Ok(PollHandle { stop, worker })
    }

    fn lock_engine(&self) -> Result<MutexGuard<'_, AudioEngine>> {
        self.engine
            .lock()
            .map_err(|_| AudioError::msg("audio engine lock has been poisoned"))
    }
}

impl Drop for LevelAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}
