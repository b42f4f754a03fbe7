use huelens::config::EngineSettings;
use huelens::{log_error, log_info};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

#[cfg(windows)]
use huelens::platform::win32::{pump_messages, GdiCapture, LayeredOverlay, Win32Windows};
#[cfg(windows)]
use huelens::scheduler::{run_worker, FrameStats, TickGate, TickSource, Ticker};
#[cfg(windows)]
use huelens::{log_debug, OverlayEngine};

/// Owns the overlay worker thread and what the tray shows about it.
pub struct OverlayManager {
    settings: EngineSettings,
    hue: u16,
    running: Arc<Mutex<bool>>,
    overlay_thread: Mutex<Option<thread::JoinHandle<()>>>,
    frame_stats: Arc<Mutex<Option<(f32, f32)>>>, // (ticks per second, tick time ms)
}

impl OverlayManager {
    pub fn new(settings: EngineSettings, hue: u16) -> Self {
        Self {
            settings,
            hue,
            running: Arc::new(Mutex::new(false)),
            overlay_thread: Mutex::new(None),
            frame_stats: Arc::new(Mutex::new(None)),
        }
    }

    pub fn hue(&self) -> u16 {
        self.hue
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock()
    }

    pub fn get_frame_stats(&self) -> Option<(f32, f32)> {
        *self.frame_stats.lock()
    }

    pub fn toggle(&self) {
        if self.is_running() {
            self.stop();
        } else {
            self.start();
        }
    }

    pub fn start(&self) {
        let mut running = self.running.lock();
        if *running {
            return;
        }

        // A finished worker may still hold its handle after failing on its own.
        if let Some(handle) = self.overlay_thread.lock().take() {
            let _ = handle.join();
        }

        let settings = self.settings.clone();
        let hue = self.hue;
        let running_flag = Arc::clone(&self.running);
        let frame_stats = Arc::clone(&self.frame_stats);
        *running = true;

        let handle = thread::spawn(move || {
            log_info!("Overlay thread started (class '{}', hue {})", settings.tracked_class, hue);

            #[cfg(windows)]
            {
                let result = (|| -> anyhow::Result<()> {
                    let display = LayeredOverlay::new(settings.lock_timeout())?;
                    let capture = GdiCapture::new()?;
                    let mut engine = OverlayEngine::new(Win32Windows, capture, display, &settings, hue);

                    let gate = TickGate::new();
                    let (source, ticks) = TickSource::new(gate.clone());
                    let mut ticker = Ticker::start(source.clone(), settings.tick_interval());
                    let mut stats = FrameStats::new(Arc::clone(&frame_stats));

                    run_worker(
                        &ticks,
                        &gate,
                        &running_flag,
                        &mut stats,
                        || {
                            let report = engine.tick();
                            if report.aborted {
                                log_debug!("Tick {} skipped: overlay surface busy", report.tick);
                            }
                        },
                        pump_messages,
                    );

                    ticker.stop();
                    log_info!(
                        "Overlay ran {} ticks, {} timer fires dropped",
                        engine.ticks(),
                        source.dropped()
                    );
                    Ok(())
                })();

                if let Err(e) = result {
                    log_error!("Overlay error: {:#}", e);
                }

                *running_flag.lock() = false;
                log_info!("Overlay thread ended");
            }

            #[cfg(not(windows))]
            {
                let _ = (&settings, &frame_stats);
                log_error!("Overlay is only supported on Windows");
                *running_flag.lock() = false;
            }
        });

        *self.overlay_thread.lock() = Some(handle);
        log_info!("Overlay started (hue {})", self.hue);
    }

    pub fn stop(&self) {
        let mut running = self.running.lock();
        if !*running {
            return;
        }

        *running = false;
        drop(running);

        if let Some(handle) = self.overlay_thread.lock().take() {
            let _ = handle.join();
        }

        *self.frame_stats.lock() = None;
        log_info!("Overlay stopped");
    }

    /// Waits for a worker that is shutting down on its own.
    pub fn join(&self) {
        if let Some(handle) = self.overlay_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for OverlayManager {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}
