//! Per-window capture buffers and the fingerprints of their last draw.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::change::{hash_buffer, hash_regions};
use crate::error::CaptureError;
use crate::geometry::Rect;
use crate::log_debug;
use crate::pixels::PixelBuffer;
use crate::platform::{ScreenCapture, WindowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub id: WindowId,
    pub width: u32,
    pub height: u32,
}

impl CacheKey {
    pub fn for_window(id: WindowId, rect: &Rect) -> Self {
        Self {
            id,
            width: rect.width().max(0) as u32,
            height: rect.height().max(0) as u32,
        }
    }
}

/// How window pixels are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaptureStrategy {
    /// Copy what is on screen at the window's position.
    #[default]
    ScreenCopy,
    /// Ask the window to render itself; falls back to `ScreenCopy`.
    WindowRender,
}

/// What part of the buffer a capture refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureScope {
    Full,
    VisibleOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Captured {
    pub scope: CaptureScope,
    pub content_hash: u64,
}

pub struct CaptureCache {
    key: CacheKey,
    buffer: PixelBuffer,
    pub last_content_hash: Option<u64>,
    pub last_visibility_hash: Option<u64>,
    /// Screen rects this window last wrote to the overlay.
    pub last_drawn: Vec<Rect>,
    render_unsupported: bool,
}

impl CaptureCache {
    fn new(key: CacheKey) -> Self {
        Self {
            key,
            buffer: PixelBuffer::new(key.width, key.height),
            last_content_hash: None,
            last_visibility_hash: None,
            last_drawn: Vec::new(),
            render_unsupported: false,
        }
    }

    pub fn key(&self) -> CacheKey {
        self.key
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn render_unsupported(&self) -> bool {
        self.render_unsupported
    }

    /// Forgets what was drawn so the next observation counts as changed.
    pub fn invalidate(&mut self) {
        self.last_content_hash = None;
        self.last_visibility_hash = None;
        self.last_drawn.clear();
    }

    /// Refreshes the buffer for `window` and fingerprints the result.
    ///
    /// A fully visible window is captured whole. A partially visible one is
    /// captured rect by rect with `ScreenCopy`, and only those rects are
    /// hashed. `WindowRender` always produces the whole window; when the
    /// capturer reports it unsupported the entry remembers that and sticks to
    /// screen copies.
    pub fn capture<C: ScreenCapture>(
        &mut self,
        capturer: &mut C,
        strategy: CaptureStrategy,
        window: Rect,
        visible: &[Rect],
    ) -> Result<Captured, CaptureError> {
        if strategy == CaptureStrategy::WindowRender && !self.render_unsupported {
            match capturer.render_window(self.key.id, &mut self.buffer) {
                Ok(()) => {
                    return Ok(Captured {
                        scope: CaptureScope::Full,
                        content_hash: hash_buffer(&self.buffer),
                    });
                }
                Err(CaptureError::Unsupported(id)) => {
                    log_debug!("Window {:?} cannot render itself, using screen copies", id);
                    self.render_unsupported = true;
                }
                Err(err) => trace!(window = self.key.id.0, error = %err, "window render failed, falling back"),
            }
        }

        let fully_visible = visible.len() == 1 && visible[0] == window;
        if fully_visible {
            capturer.copy_screen(window, &mut self.buffer, 0, 0)?;
            return Ok(Captured {
                scope: CaptureScope::Full,
                content_hash: hash_buffer(&self.buffer),
            });
        }

        for rect in visible {
            let dst_x = (rect.left - window.left).max(0) as u32;
            let dst_y = (rect.top - window.top).max(0) as u32;
            capturer.copy_screen(*rect, &mut self.buffer, dst_x, dst_y)?;
        }
        Ok(Captured {
            scope: CaptureScope::VisibleOnly,
            content_hash: hash_regions(&self.buffer, (window.left, window.top), visible),
        })
    }
}

/// Capture caches keyed by `(window, width, height)`, at most one per window.
#[derive(Default)]
pub struct CaptureCacheMap {
    caches: HashMap<CacheKey, CaptureCache>,
    current: HashMap<WindowId, CacheKey>,
}

impl CaptureCacheMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache for `id` at the size of `rect`.
    ///
    /// When the window changed size the previous entry is disposed; its
    /// `last_drawn` rects move to the new entry so they still get cleared.
    pub fn entry(&mut self, id: WindowId, rect: &Rect) -> &mut CaptureCache {
        let key = CacheKey::for_window(id, rect);
        let mut carried = Vec::new();

        if let Some(old_key) = self.current.insert(id, key) {
            if old_key != key {
                if let Some(old) = self.caches.remove(&old_key) {
                    trace!(window = id.0, from = ?(old_key.width, old_key.height), to = ?(key.width, key.height), "capture cache resized");
                    carried = old.last_drawn;
                }
            }
        }

        self.caches.entry(key).or_insert_with(|| {
            let mut cache = CaptureCache::new(key);
            cache.last_drawn = carried;
            cache
        })
    }

    pub fn get(&self, id: WindowId) -> Option<&CaptureCache> {
        self.current.get(&id).and_then(|key| self.caches.get(key))
    }

    pub fn get_mut(&mut self, id: WindowId) -> Option<&mut CaptureCache> {
        let key = self.current.get(&id)?;
        self.caches.get_mut(key)
    }

    pub fn by_key(&self, key: &CacheKey) -> Option<&CaptureCache> {
        self.caches.get(key)
    }

    /// Drops every cache of a destroyed window.
    pub fn remove(&mut self, id: WindowId) -> Option<CaptureCache> {
        let key = self.current.remove(&id)?;
        self.caches.remove(&key)
    }

    /// Marks every cache's content as unseen, forcing a full redraw.
    pub fn invalidate_content(&mut self) {
        for cache in self.caches.values_mut() {
            cache.last_content_hash = None;
        }
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}
