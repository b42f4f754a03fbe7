//! Tick pacing: a timer thread feeding a worker through a one-slot channel.
//!
//! A fire is never queued behind a running tick. The gate marks a tick in
//! progress and the channel holds at most one pending fire; anything else is
//! dropped and counted as a skipped frame.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;

use crate::log_info;

/// Re-entrancy guard for ticks.
#[derive(Clone, Default)]
pub struct TickGate {
    busy: Arc<AtomicBool>,
}

impl TickGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_enter(&self) -> Option<TickPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickPermit { busy: Arc::clone(&self.busy) })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Held for the duration of one tick; releases the gate on drop.
pub struct TickPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for TickPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fire {
    Queued,
    /// A tick is running right now.
    DroppedBusy,
    /// A fire is already waiting to be picked up.
    DroppedPending,
    /// The worker is gone.
    Disconnected,
}

#[derive(Clone)]
pub struct TickSource {
    tx: Sender<()>,
    gate: TickGate,
    dropped: Arc<AtomicU64>,
}

impl TickSource {
    /// Source plus the receiving end the worker waits on.
    pub fn new(gate: TickGate) -> (Self, Receiver<()>) {
        let (tx, rx) = bounded(1);
        let source = Self {
            tx,
            gate,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (source, rx)
    }

    pub fn fire(&self) -> Fire {
        if self.gate.is_busy() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Fire::DroppedBusy;
        }
        match self.tx.try_send(()) {
            Ok(()) => Fire::Queued,
            Err(TrySendError::Full(())) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Fire::DroppedPending
            }
            Err(TrySendError::Disconnected(())) => Fire::Disconnected,
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Timer thread firing a [`TickSource`] at a fixed interval.
pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Ticker {
    pub fn start(source: TickSource, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            let mut next = Instant::now() + interval;
            while !stop_flag.load(Ordering::Acquire) {
                let now = Instant::now();
                if next > now {
                    spin_sleep::sleep(next - now);
                }
                if source.fire() == Fire::Disconnected {
                    break;
                }
                next += interval;
                // Fell more than a whole interval behind: resync instead of bursting.
                let now = Instant::now();
                if next < now {
                    next = now + interval;
                }
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

const STATS_WINDOW: usize = 60;
const STATS_PERIOD: Duration = Duration::from_millis(100);

/// Rolling tick statistics published as `(ticks per second, average tick ms)`.
pub struct FrameStats {
    samples: VecDeque<(f32, f32)>,
    last_tick: Option<Instant>,
    last_publish: Instant,
    published: Arc<Mutex<Option<(f32, f32)>>>,
}

impl FrameStats {
    pub fn new(published: Arc<Mutex<Option<(f32, f32)>>>) -> Self {
        Self {
            samples: VecDeque::with_capacity(STATS_WINDOW),
            last_tick: None,
            last_publish: Instant::now(),
            published,
        }
    }

    /// Records one tick that took `work` and started at `started`.
    pub fn record(&mut self, started: Instant, work: Duration) {
        let work_ms = work.as_secs_f32() * 1000.0;
        let total_ms = self
            .last_tick
            .map(|prev| started.duration_since(prev).as_secs_f32() * 1000.0)
            .unwrap_or(work_ms);
        self.last_tick = Some(started);

        if self.samples.len() == STATS_WINDOW {
            self.samples.pop_front();
        }
        self.samples.push_back((work_ms, total_ms));

        if self.last_publish.elapsed() >= STATS_PERIOD {
            self.publish();
        }
    }

    pub fn publish(&mut self) {
        if let Some(stats) = self.averages() {
            *self.published.lock() = Some(stats);
        }
        self.last_publish = Instant::now();
    }

    pub fn averages(&self) -> Option<(f32, f32)> {
        if self.samples.is_empty() {
            return None;
        }
        let (sum_work, sum_total) = self
            .samples
            .iter()
            .fold((0.0, 0.0), |(w, t), &(work, total)| (w + work, t + total));
        let n = self.samples.len() as f32;
        let avg_total = sum_total / n;
        let rate = if avg_total > 0.0 { 1000.0 / avg_total } else { 0.0 };
        Some((rate, sum_work / n))
    }
}

/// Worker loop: waits for fires, runs one tick per fire under the gate and
/// calls `pump` between waits. Returns when `running` is cleared or `pump`
/// asks to quit.
pub fn run_worker(
    ticks: &Receiver<()>,
    gate: &TickGate,
    running: &Mutex<bool>,
    stats: &mut FrameStats,
    mut on_tick: impl FnMut(),
    mut pump: impl FnMut() -> bool,
) {
    let poll = Duration::from_millis(15);
    let mut completed = 0u64;

    while *running.lock() {
        if !pump() {
            log_info!("Worker asked to quit by the message pump");
            break;
        }

        match ticks.recv_timeout(poll) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let permit = match gate.try_enter() {
            Some(permit) => permit,
            None => continue,
        };
        let started = Instant::now();
        on_tick();
        drop(permit);
        stats.record(started, started.elapsed());
        completed += 1;
    }

    log_info!("Worker stopped after {} ticks", completed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_drops_while_pending_or_busy() {
        let gate = TickGate::new();
        let (source, rx) = TickSource::new(gate.clone());

        assert_eq!(source.fire(), Fire::Queued);
        assert_eq!(source.fire(), Fire::DroppedPending);

        rx.recv().unwrap();
        let permit = gate.try_enter().unwrap();
        assert!(gate.try_enter().is_none());
        assert_eq!(source.fire(), Fire::DroppedBusy);
        drop(permit);

        assert_eq!(source.fire(), Fire::Queued);
        assert_eq!(source.dropped(), 2);
    }

    #[test]
    fn test_fire_reports_disconnect() {
        let (source, rx) = TickSource::new(TickGate::new());
        drop(rx);
        assert_eq!(source.fire(), Fire::Disconnected);
    }

    #[test]
    fn test_ticker_delivers_fires() {
        let (source, rx) = TickSource::new(TickGate::new());
        let mut ticker = Ticker::start(source, Duration::from_millis(2));
        for _ in 0..3 {
            assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());
        }
        ticker.stop();
    }

    #[test]
    fn test_worker_runs_ticks_until_stopped() {
        let gate = TickGate::new();
        let (source, rx) = TickSource::new(gate.clone());
        let running = Mutex::new(true);
        let published = Arc::new(Mutex::new(None));
        let mut stats = FrameStats::new(Arc::clone(&published));

        let mut count = 0;
        let mut pumps = 0;
        run_worker(
            &rx,
            &gate,
            &running,
            &mut stats,
            || {
                count += 1;
                if count == 3 {
                    *running.lock() = false;
                }
            },
            || {
                pumps += 1;
                source.fire();
                true
            },
        );

        assert_eq!(count, 3);
        assert!(pumps >= 3);
        assert!(!gate.is_busy());
        assert!(stats.averages().is_some());
    }

    #[test]
    fn test_stats_average_over_window() {
        let published = Arc::new(Mutex::new(None));
        let mut stats = FrameStats::new(Arc::clone(&published));
        let start = Instant::now();
        for i in 0..100u32 {
            stats.record(start + Duration::from_millis(10 * i as u64), Duration::from_millis(4));
        }
        stats.publish();

        let snapshot = *published.lock();
        let (rate, work) = snapshot.unwrap();
        assert!((rate - 100.0).abs() < 1.0, "rate {}", rate);
        assert!((work - 4.0).abs() < 0.01);
    }
}
