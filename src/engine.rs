//! Per-tick orchestration of the recolor pipeline.
//!
//! Every tick: refresh tracked windows, resolve what of each is visible,
//! capture and fingerprint it, plan clears and draws from geometry alone, then
//! commit the plan inside one surface lock and publish a single dirty rect.
//! Nothing escapes a tick as an error; the [`TickReport`] says what happened.

use tracing::{debug, trace};

use crate::capture_cache::{CacheKey, CaptureCacheMap, CaptureStrategy};
use crate::change::visibility_hash;
use crate::coalesce::coalesce;
use crate::compositor::{self, DrawOp, FramePlan};
use crate::config::EngineSettings;
use crate::geometry::Rect;
use crate::lut::ColorLut;
use crate::platform::{OverlayDisplay, ScreenCapture, WindowId, WindowSystem};
use crate::tracker::{TrackedWindow, WindowMatcher, WindowTracker};
use crate::visibility::VisibilityResolver;
use crate::zorder::{ProcessFilter, ZOrderCache};
use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub tracked: usize,
    pub hidden: usize,
    pub removed: usize,
    pub zorder_refreshed: bool,
    pub captured: usize,
    pub capture_failures: usize,
    /// Windows that had at least one rect redrawn.
    pub drawn_windows: usize,
    pub clears: Vec<Rect>,
    pub draws: Vec<Rect>,
    /// Published region, `None` when nothing was written.
    pub dirty: Option<Rect>,
    pub lock_taken: bool,
    /// The surface lock failed; no bookkeeping was applied.
    pub aborted: bool,
}

impl TickReport {
    pub fn wrote_pixels(&self) -> bool {
        !self.clears.is_empty() || !self.draws.is_empty()
    }
}

enum Outcome {
    /// Captured (or nothing visible); `needs_draw` decided by the fingerprints.
    Ready { content_hash: Option<u64>, needs_draw: bool },
    /// Capture failed; the window is skipped this tick.
    Skipped { touched_by_clear: bool },
}

struct PendingWindow {
    id: WindowId,
    rect: Rect,
    key: CacheKey,
    visible: Vec<Rect>,
    visibility_hash: u64,
    visibility_changed: bool,
    outcome: Outcome,
}

pub struct OverlayEngine<W: WindowSystem, C: ScreenCapture, D: OverlayDisplay> {
    ws: W,
    capture: C,
    display: D,
    strategy: CaptureStrategy,
    tracker: WindowTracker,
    zorder: ZOrderCache,
    resolver: VisibilityResolver,
    caches: CaptureCacheMap,
    lut: ColorLut,
    plan: FramePlan,
    tracked: Vec<TrackedWindow>,
    previous: Vec<TrackedWindow>,
    pending: Vec<PendingWindow>,
    /// `last_drawn` of destroyed windows, kept until a commit clears them.
    orphaned: Vec<Rect>,
    ticks: u64,
}

impl<W: WindowSystem, C: ScreenCapture, D: OverlayDisplay> OverlayEngine<W, C, D> {
    pub fn new(ws: W, capture: C, mut display: D, settings: &EngineSettings, hue: u16) -> Self {
        if let Err(e) = display.exclude_from_capture() {
            log_warn!("Failed to exclude overlay from capture: {}", e);
        }

        let matcher = WindowMatcher::new(settings.tracked_class.clone(), settings.title_contains.clone());
        let filter = ProcessFilter::new(&settings.ignored_processes, settings.process_cache_reset_interval);
        let lut = ColorLut::build(hue, settings.match_rule);
        log_info!(
            "Overlay engine ready: class '{}', hue {}, {} matching color bins, {:?}",
            settings.tracked_class,
            hue,
            lut.matched_bins(),
            settings.capture_strategy
        );

        Self {
            ws,
            capture,
            display,
            strategy: settings.capture_strategy,
            tracker: WindowTracker::new(matcher, settings.rescan_interval),
            zorder: ZOrderCache::new(settings.zorder_refresh_interval, filter),
            resolver: VisibilityResolver::new(),
            caches: CaptureCacheMap::new(),
            lut,
            plan: FramePlan::new(),
            tracked: Vec::new(),
            previous: Vec::new(),
            pending: Vec::new(),
            orphaned: Vec::new(),
            ticks: 0,
        }
    }

    /// Retargets the recolor hue. Takes effect on the next tick with a full redraw.
    pub fn set_hue(&mut self, hue: u16) -> bool {
        if !self.lut.retarget(hue) {
            return false;
        }
        self.caches.invalidate_content();
        log_info!("Target hue changed to {}", hue);
        true
    }

    pub fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        let mut report = TickReport {
            tick: self.ticks,
            ..TickReport::default()
        };

        self.plan.reset();
        self.pending.clear();

        let working = self.tracker.refresh(&self.ws);
        self.tracked.clear();
        self.tracked.extend_from_slice(working);

        for &id in self.tracker.removed() {
            if let Some(cache) = self.caches.remove(id) {
                self.orphaned.extend_from_slice(&cache.last_drawn);
            }
        }
        self.plan.clear_all(&self.orphaned);
        for &id in self.tracker.hidden() {
            if let Some(cache) = self.caches.get(id) {
                self.plan.clear_all(&cache.last_drawn);
            }
        }
        report.tracked = self.tracked.len();
        report.hidden = self.tracker.hidden().len();
        report.removed = self.tracker.removed().len();

        let screen = self.display.bounds();
        let geometry_changed = self.tracked != self.previous;
        let (index, refreshed) = self
            .zorder
            .current(&self.ws, &self.tracked, geometry_changed, self.display.window_id());
        report.zorder_refreshed = refreshed;

        for window in &self.tracked {
            let mut visible = Vec::new();
            self.resolver
                .resolve_into(window.rect, index.occluders_of(window.id), &mut visible);
            let mut visible: Vec<Rect> = visible.iter().filter_map(|r| r.intersect(&screen)).collect();
            coalesce(&mut visible);

            let vis_hash = visibility_hash(&visible);
            let cache = self.caches.entry(window.id, &window.rect);
            let visibility_changed = cache.last_visibility_hash != Some(vis_hash);
            if visibility_changed {
                self.plan.clear_all(&cache.last_drawn);
            }

            let outcome = if visible.is_empty() {
                Outcome::Ready {
                    content_hash: None,
                    needs_draw: visibility_changed,
                }
            } else {
                match cache.capture(&mut self.capture, self.strategy, window.rect, &visible) {
                    Ok(captured) => {
                        report.captured += 1;
                        let content_changed = cache.last_content_hash != Some(captured.content_hash);
                        Outcome::Ready {
                            content_hash: Some(captured.content_hash),
                            needs_draw: visibility_changed || content_changed,
                        }
                    }
                    Err(e) => {
                        report.capture_failures += 1;
                        trace!(window = window.id.0, error = %e, "capture failed, skipping window");
                        Outcome::Skipped { touched_by_clear: false }
                    }
                }
            };

            self.pending.push(PendingWindow {
                id: window.id,
                rect: window.rect,
                key: cache.key(),
                visible,
                visibility_hash: vis_hash,
                visibility_changed,
                outcome,
            });
        }

        // Stale regions: where windows were last tick but no longer are.
        for prev in &self.previous {
            let unchanged = self.tracked.iter().any(|t| t.id == prev.id && t.rect == prev.rect);
            if !unchanged {
                self.plan.clear(prev.rect);
            }
        }
        self.plan.settle_clears(screen);

        for pending in &mut self.pending {
            let last_drawn = match self.caches.get(pending.id) {
                Some(cache) => &cache.last_drawn,
                None => continue,
            };
            let touched = self.plan.touches_clear(last_drawn);
            match &mut pending.outcome {
                Outcome::Ready { needs_draw, .. } => *needs_draw |= touched,
                Outcome::Skipped { touched_by_clear } => *touched_by_clear = touched,
            }
        }

        for pending in &self.pending {
            if let Outcome::Ready { needs_draw: true, .. } = pending.outcome {
                if !pending.visible.is_empty() {
                    report.drawn_windows += 1;
                    self.plan.draw(DrawOp {
                        key: pending.key,
                        origin: (pending.rect.left, pending.rect.top),
                        rects: pending.visible.clone(),
                    });
                }
            }
        }

        report.clears = self.plan.clears().to_vec();
        report.draws = self.plan.draws().iter().flat_map(|op| op.rects.iter().copied()).collect();

        if self.plan.is_empty() {
            self.finish_tick();
            trace!(tick = report.tick, tracked = report.tracked, "nothing to draw");
            return report;
        }

        let dirty = self.plan.dirty_rect();
        let stats = {
            let mut lock = match self.display.lock() {
                Ok(lock) => lock,
                Err(e) => {
                    log_debug!("Tick {} aborted: {}", report.tick, e);
                    report.aborted = true;
                    return report;
                }
            };
            report.lock_taken = true;
            compositor::commit(&mut lock, &self.plan, &self.caches, &self.lut)
        };

        if let Some(dirty) = dirty {
            if let Err(e) = self.display.publish(dirty) {
                log_warn!("Failed to publish overlay update: {}", e);
            }
        }
        report.dirty = dirty;

        self.finish_tick();
        debug!(
            tick = report.tick,
            clears = stats.clears,
            draws = stats.draws,
            pixels = stats.pixels,
            "tick committed"
        );
        report
    }

    /// Records what the overlay now shows. Only called once the plan is on the surface.
    fn finish_tick(&mut self) {
        for pending in self.pending.drain(..) {
            let cache = match self.caches.get_mut(pending.id) {
                Some(cache) => cache,
                None => continue,
            };
            match pending.outcome {
                Outcome::Ready { content_hash, needs_draw: true } => {
                    cache.last_visibility_hash = Some(pending.visibility_hash);
                    cache.last_content_hash = content_hash;
                    cache.last_drawn = pending.visible;
                }
                Outcome::Ready { needs_draw: false, .. } => {}
                Outcome::Skipped { .. } if pending.visibility_changed => cache.invalidate(),
                Outcome::Skipped { touched_by_clear: true } => cache.last_content_hash = None,
                Outcome::Skipped { .. } => {}
            }
        }

        // Hidden windows and windows skipped this tick (unreadable geometry)
        // had their pixels cleared; forget them so they redraw when back.
        for &id in self.tracker.hidden() {
            if let Some(cache) = self.caches.get_mut(id) {
                cache.invalidate();
            }
        }
        for prev in &self.previous {
            if self.tracked.iter().any(|t| t.id == prev.id) {
                continue;
            }
            if let Some(cache) = self.caches.get_mut(prev.id) {
                cache.invalidate();
            }
        }

        self.orphaned.clear();
        std::mem::swap(&mut self.previous, &mut self.tracked);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn target_hue(&self) -> u16 {
        self.lut.target_hue()
    }

    pub fn tracked_count(&self) -> usize {
        self.tracker.tracked_count()
    }

    pub fn caches(&self) -> &CaptureCacheMap {
        &self.caches
    }

    pub fn window_system(&self) -> &W {
        &self.ws
    }

    pub fn capture(&self) -> &C {
        &self.capture
    }

    pub fn capture_mut(&mut self) -> &mut C {
        &mut self.capture
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn process_lookups(&self) -> u64 {
        self.zorder.filter().lookups()
    }
}
