//! Front-to-back snapshot of the windows that can cover tracked windows.

use std::collections::HashMap;

use tracing::trace;

use crate::geometry::{bounding_box, Rect};
use crate::platform::{WindowId, WindowSystem};
use crate::tracker::TrackedWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZOrderEntry {
    pub id: WindowId,
    pub rect: Rect,
}

/// Ordered entries plus an id → position map. Index 0 is frontmost.
#[derive(Debug, Default)]
pub struct ZOrderIndex {
    entries: Vec<ZOrderEntry>,
    positions: HashMap<WindowId, usize>,
}

impl ZOrderIndex {
    /// Walks the window stack front to back. Cheap rejections (own overlay,
    /// hidden, minimized, outside `region`) run before the process lookup.
    pub fn build<W: WindowSystem>(
        &mut self,
        ws: &W,
        region: Rect,
        exclude: Option<WindowId>,
        filter: &mut ProcessFilter,
    ) {
        self.entries.clear();
        self.positions.clear();
        if region.is_empty() {
            return;
        }

        for id in ws.z_order() {
            if Some(id) == exclude {
                continue;
            }
            if !ws.is_visible(id) || ws.is_minimized(id) {
                continue;
            }
            let rect = match ws.window_rect(id) {
                Some(rect) if rect.intersects(&region) => rect,
                _ => continue,
            };
            if filter.is_ignored(ws, id) {
                trace!(window = id.0, "occluder ignored by process filter");
                continue;
            }
            self.positions.insert(id, self.entries.len());
            self.entries.push(ZOrderEntry { id, rect });
        }
    }

    pub fn entries(&self) -> &[ZOrderEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self, id: WindowId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Whether `a` is strictly in front of `b`. Unknown windows are never above.
    pub fn is_above(&self, a: WindowId, b: WindowId) -> bool {
        match (self.position(a), self.position(b)) {
            (Some(pa), Some(pb)) => pa < pb,
            _ => false,
        }
    }

    /// Entries in front of `id`. A window missing from the snapshot is treated
    /// as bottommost: everything else may cover it.
    pub fn occluders_of(&self, id: WindowId) -> impl Iterator<Item = &ZOrderEntry> {
        let end = self.position(id).unwrap_or(self.entries.len());
        self.entries[..end].iter().filter(move |e| e.id != id)
    }
}

/// Decides per process whether its windows are ignored as occluders.
///
/// Resolving a process name is expensive, so answers are cached per pid and the
/// cache is dropped every `reset_interval` ticks to pick up reused pids.
pub struct ProcessFilter {
    ignored: Vec<String>,
    verdicts: HashMap<u32, bool>,
    reset_interval: u32,
    ticks_since_reset: u32,
    lookups: u64,
}

impl ProcessFilter {
    pub fn new(ignored: &[String], reset_interval: u32) -> Self {
        Self {
            ignored: ignored.iter().map(|name| name.to_ascii_lowercase()).collect(),
            verdicts: HashMap::new(),
            reset_interval: reset_interval.max(1),
            ticks_since_reset: 0,
            lookups: 0,
        }
    }

    pub fn is_ignored<W: WindowSystem>(&mut self, ws: &W, id: WindowId) -> bool {
        if self.ignored.is_empty() {
            return false;
        }
        let pid = match ws.process_id(id) {
            Some(pid) => pid,
            None => return false,
        };
        if let Some(&verdict) = self.verdicts.get(&pid) {
            return verdict;
        }

        self.lookups += 1;
        let verdict = ws
            .process_name(pid)
            .map(|name| {
                let name = name.to_ascii_lowercase();
                self.ignored.iter().any(|ignored| *ignored == name)
            })
            .unwrap_or(false);
        self.verdicts.insert(pid, verdict);
        verdict
    }

    /// Advances the eviction clock by one tick.
    pub fn on_tick(&mut self) {
        self.ticks_since_reset += 1;
        if self.ticks_since_reset >= self.reset_interval {
            self.verdicts.clear();
            self.ticks_since_reset = 0;
        }
    }

    pub fn cached_processes(&self) -> usize {
        self.verdicts.len()
    }

    /// Number of process-name lookups performed so far.
    pub fn lookups(&self) -> u64 {
        self.lookups
    }
}

/// Owns the current snapshot and decides when it is stale.
pub struct ZOrderCache {
    index: ZOrderIndex,
    filter: ProcessFilter,
    refresh_interval: u32,
    countdown: u32,
    last_foreground: Option<WindowId>,
    has_snapshot: bool,
}

impl ZOrderCache {
    pub fn new(refresh_interval: u32, filter: ProcessFilter) -> Self {
        Self {
            index: ZOrderIndex::default(),
            filter,
            refresh_interval: refresh_interval.max(1),
            countdown: 0,
            last_foreground: None,
            has_snapshot: false,
        }
    }

    /// Returns the snapshot to use this tick and whether it was rebuilt.
    ///
    /// The previous snapshot is reused while tracked geometry is stable, the
    /// foreground window is unchanged and the refresh countdown has not run out.
    pub fn current<W: WindowSystem>(
        &mut self,
        ws: &W,
        tracked: &[TrackedWindow],
        geometry_changed: bool,
        exclude: Option<WindowId>,
    ) -> (&ZOrderIndex, bool) {
        self.filter.on_tick();
        let foreground = ws.foreground();

        let stale = !self.has_snapshot
            || geometry_changed
            || foreground != self.last_foreground
            || self.countdown == 0;

        if stale {
            let region = bounding_box(tracked.iter().map(|w| &w.rect)).unwrap_or_default();
            self.index.build(ws, region, exclude, &mut self.filter);
            self.countdown = self.refresh_interval;
            self.last_foreground = foreground;
            self.has_snapshot = true;
        }
        self.countdown = self.countdown.saturating_sub(1);

        (&self.index, stale)
    }

    /// Forces a rebuild on the next call.
    pub fn invalidate(&mut self) {
        self.has_snapshot = false;
    }

    pub fn filter(&self) -> &ProcessFilter {
        &self.filter
    }
}
