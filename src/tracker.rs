//! Tracked window discovery and per-tick liveness.

use tracing::trace;

use crate::geometry::Rect;
use crate::platform::{WindowId, WindowSystem};
use crate::{log_debug, log_info};

/// A tracked window that is on screen this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedWindow {
    pub id: WindowId,
    /// Client area in screen coordinates.
    pub rect: Rect,
}

/// Which top-level windows are tracked: exact class name, optional title substring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowMatcher {
    class_name: String,
    title_contains: Option<String>,
}

impl WindowMatcher {
    pub fn new(class_name: impl Into<String>, title_contains: Option<String>) -> Self {
        Self {
            class_name: class_name.into(),
            title_contains: title_contains.filter(|t| !t.is_empty()),
        }
    }

    pub fn matches<W: WindowSystem>(&self, ws: &W, id: WindowId) -> bool {
        if ws.class_name(id).as_deref() != Some(self.class_name.as_str()) {
            return false;
        }
        match &self.title_contains {
            Some(needle) => ws.title(id).map(|t| t.contains(needle.as_str())).unwrap_or(false),
            None => true,
        }
    }
}

pub struct WindowTracker {
    matcher: WindowMatcher,
    known: Vec<WindowId>,
    scan_interval: u32,
    ticks_until_scan: u32,
    working: Vec<TrackedWindow>,
    hidden: Vec<WindowId>,
    removed: Vec<WindowId>,
}

impl WindowTracker {
    pub fn new(matcher: WindowMatcher, scan_interval: u32) -> Self {
        Self {
            matcher,
            known: Vec::new(),
            scan_interval: scan_interval.max(1),
            ticks_until_scan: 0,
            working: Vec::new(),
            hidden: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// Runs one tracking pass and returns the windows to process this tick.
    ///
    /// A full enumeration happens every `scan_interval` ticks, or every tick
    /// while nothing is tracked. Known windows are then checked for liveness:
    /// destroyed ones are forgotten, hidden or minimized ones are kept but
    /// reported through [`hidden`](Self::hidden) instead of the working set.
    pub fn refresh<W: WindowSystem>(&mut self, ws: &W) -> &[TrackedWindow] {
        self.working.clear();
        self.hidden.clear();
        self.removed.clear();

        if self.known.is_empty() || self.ticks_until_scan == 0 {
            self.scan(ws);
            self.ticks_until_scan = self.scan_interval;
        }
        self.ticks_until_scan -= 1;

        let removed = &mut self.removed;
        self.known.retain(|&id| {
            let alive = ws.exists(id);
            if !alive {
                removed.push(id);
            }
            alive
        });
        for id in &self.removed {
            log_info!("Tracked window {:?} destroyed", id);
        }

        for &id in &self.known {
            if !ws.is_visible(id) || ws.is_minimized(id) {
                self.hidden.push(id);
                continue;
            }
            match ws.client_rect(id) {
                Some(rect) if !rect.is_empty() => self.working.push(TrackedWindow { id, rect }),
                _ => trace!(window = id.0, "client rect unavailable, skipping"),
            }
        }

        &self.working
    }

    fn scan<W: WindowSystem>(&mut self, ws: &W) {
        let mut added = 0;
        for id in ws.enumerate_top_level() {
            if self.known.contains(&id) || !self.matcher.matches(ws, id) {
                continue;
            }
            log_info!("Tracking window {:?}", id);
            self.known.push(id);
            added += 1;
        }
        log_debug!("Window scan: {} tracked, {} new", self.known.len(), added);
    }

    /// Windows from the last pass that are hidden or minimized.
    pub fn hidden(&self) -> &[WindowId] {
        &self.hidden
    }

    /// Windows found destroyed during the last pass.
    pub fn removed(&self) -> &[WindowId] {
        &self.removed
    }

    pub fn working(&self) -> &[TrackedWindow] {
        &self.working
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.known.contains(&id)
    }

    pub fn tracked_count(&self) -> usize {
        self.known.len()
    }
}
