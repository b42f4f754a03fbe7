//! In-memory desktop for tests and headless runs.
//!
//! Windows are solid-colored rectangles stacked front to back. Handles are
//! cheap clones over shared state so a test can keep one while the engine owns
//! another and script changes between ticks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{OverlayDisplay, ScreenCapture, SharedSurface, SurfaceLock, WindowId, WindowSystem};
use crate::error::{CaptureError, SurfaceError};
use crate::geometry::Rect;
use crate::pixels::PixelBuffer;

/// What the desktop shows where no window is.
pub const BACKGROUND: [u8; 4] = [32, 32, 32, 255];

#[derive(Debug, Clone)]
pub struct FakeWindow {
    pub id: WindowId,
    pub class_name: String,
    pub title: String,
    pub rect: Rect,
    pub visible: bool,
    /// Visible by style but not drawn by the compositor.
    pub cloaked: bool,
    pub minimized: bool,
    pub pid: u32,
    pub process_name: String,
    /// BGRA content color.
    pub color: [u8; 4],
    pub render_supported: bool,
}

impl FakeWindow {
    pub fn new(id: isize, class_name: &str, rect: Rect) -> Self {
        Self {
            id: WindowId(id),
            class_name: class_name.to_string(),
            title: String::new(),
            rect,
            visible: true,
            cloaked: false,
            minimized: false,
            pid: id as u32,
            process_name: format!("app{}.exe", id),
            color: BACKGROUND,
            render_supported: false,
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn with_process(mut self, pid: u32, name: &str) -> Self {
        self.pid = pid;
        self.process_name = name.to_string();
        self
    }

    pub fn with_color(mut self, bgra: [u8; 4]) -> Self {
        self.color = bgra;
        self
    }

    pub fn with_render_support(mut self) -> Self {
        self.render_supported = true;
        self
    }
}

#[derive(Default)]
struct DesktopState {
    /// Front to back.
    windows: Vec<FakeWindow>,
    foreground: Option<WindowId>,
    enumerations: usize,
    process_name_lookups: usize,
}

impl DesktopState {
    fn window(&self, id: WindowId) -> Option<&FakeWindow> {
        self.windows.iter().find(|w| w.id == id)
    }

    fn window_mut(&mut self, id: WindowId) -> Option<&mut FakeWindow> {
        self.windows.iter_mut().find(|w| w.id == id)
    }
}

#[derive(Clone)]
pub struct FakeDesktop {
    bounds: Rect,
    state: Arc<Mutex<DesktopState>>,
}

impl FakeDesktop {
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            state: Arc::new(Mutex::new(DesktopState::default())),
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Adds a window below every existing one.
    pub fn add_window(&self, window: FakeWindow) {
        self.state.lock().windows.push(window);
    }

    pub fn bring_to_front(&self, id: WindowId) {
        let mut state = self.state.lock();
        if let Some(pos) = state.windows.iter().position(|w| w.id == id) {
            let window = state.windows.remove(pos);
            state.windows.insert(0, window);
        }
    }

    pub fn set_rect(&self, id: WindowId, rect: Rect) {
        if let Some(w) = self.state.lock().window_mut(id) {
            w.rect = rect;
        }
    }

    pub fn set_visible(&self, id: WindowId, visible: bool) {
        if let Some(w) = self.state.lock().window_mut(id) {
            w.visible = visible;
        }
    }

    pub fn set_cloaked(&self, id: WindowId, cloaked: bool) {
        if let Some(w) = self.state.lock().window_mut(id) {
            w.cloaked = cloaked;
        }
    }

    pub fn set_minimized(&self, id: WindowId, minimized: bool) {
        if let Some(w) = self.state.lock().window_mut(id) {
            w.minimized = minimized;
        }
    }

    pub fn set_color(&self, id: WindowId, bgra: [u8; 4]) {
        if let Some(w) = self.state.lock().window_mut(id) {
            w.color = bgra;
        }
    }

    pub fn set_foreground(&self, id: Option<WindowId>) {
        self.state.lock().foreground = id;
    }

    pub fn destroy(&self, id: WindowId) {
        let mut state = self.state.lock();
        state.windows.retain(|w| w.id != id);
        if state.foreground == Some(id) {
            state.foreground = None;
        }
    }

    /// Full window enumerations performed so far.
    pub fn enumerations(&self) -> usize {
        self.state.lock().enumerations
    }

    pub fn process_name_lookups(&self) -> usize {
        self.state.lock().process_name_lookups
    }

    /// Paints the desktop inside `src` into `dst` at (`dst_x`, `dst_y`).
    fn compose(&self, src: Rect, dst: &mut PixelBuffer, dst_x: u32, dst_y: u32) {
        let state = self.state.lock();
        fill_rect(dst, src, (src.left - dst_x as i32, src.top - dst_y as i32), BACKGROUND);
        for window in state.windows.iter().rev() {
            if !window.visible || window.cloaked || window.minimized {
                continue;
            }
            if let Some(area) = window.rect.intersect(&src) {
                fill_rect(dst, area, (src.left - dst_x as i32, src.top - dst_y as i32), window.color);
            }
        }
    }
}

/// Fills screen rect `rect` of a buffer whose top-left sits at `origin`.
fn fill_rect(dst: &mut PixelBuffer, rect: Rect, origin: (i32, i32), bgra: [u8; 4]) {
    let x = (rect.left - origin.0).max(0) as u32;
    let len = rect.width().max(0) as u32;
    for y in rect.top..rect.bottom {
        let row = y - origin.1;
        if row < 0 {
            continue;
        }
        if let Some(span) = dst.span_mut(x, row as u32, len) {
            for px in span.chunks_exact_mut(4) {
                px.copy_from_slice(&bgra);
            }
        }
    }
}

impl WindowSystem for FakeDesktop {
    fn enumerate_top_level(&self) -> Vec<WindowId> {
        let mut state = self.state.lock();
        state.enumerations += 1;
        state.windows.iter().map(|w| w.id).collect()
    }

    fn exists(&self, id: WindowId) -> bool {
        self.state.lock().window(id).is_some()
    }

    fn is_visible(&self, id: WindowId) -> bool {
        self.state
            .lock()
            .window(id)
            .map(|w| w.visible && !w.cloaked)
            .unwrap_or(false)
    }

    fn is_minimized(&self, id: WindowId) -> bool {
        self.state.lock().window(id).map(|w| w.minimized).unwrap_or(false)
    }

    fn class_name(&self, id: WindowId) -> Option<String> {
        self.state.lock().window(id).map(|w| w.class_name.clone())
    }

    fn title(&self, id: WindowId) -> Option<String> {
        self.state.lock().window(id).map(|w| w.title.clone())
    }

    fn client_rect(&self, id: WindowId) -> Option<Rect> {
        self.state.lock().window(id).map(|w| w.rect)
    }

    fn window_rect(&self, id: WindowId) -> Option<Rect> {
        self.state.lock().window(id).map(|w| w.rect)
    }

    fn process_id(&self, id: WindowId) -> Option<u32> {
        self.state.lock().window(id).map(|w| w.pid)
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        let mut state = self.state.lock();
        state.process_name_lookups += 1;
        state
            .windows
            .iter()
            .find(|w| w.pid == pid)
            .map(|w| w.process_name.clone())
    }

    fn z_order(&self) -> Vec<WindowId> {
        self.state.lock().windows.iter().map(|w| w.id).collect()
    }

    fn foreground(&self) -> Option<WindowId> {
        self.state.lock().foreground
    }
}

/// Screen capture over a [`FakeDesktop`], with failure switches.
pub struct FakeCapture {
    desktop: FakeDesktop,
    screen_copies: usize,
    render_attempts: usize,
    fail_screen_copy: bool,
}

impl FakeCapture {
    pub fn new(desktop: FakeDesktop) -> Self {
        Self {
            desktop,
            screen_copies: 0,
            render_attempts: 0,
            fail_screen_copy: false,
        }
    }

    pub fn set_fail_screen_copy(&mut self, fail: bool) {
        self.fail_screen_copy = fail;
    }

    pub fn screen_copies(&self) -> usize {
        self.screen_copies
    }

    pub fn render_attempts(&self) -> usize {
        self.render_attempts
    }
}

impl ScreenCapture for FakeCapture {
    fn copy_screen(&mut self, src: Rect, dst: &mut PixelBuffer, dst_x: u32, dst_y: u32) -> Result<(), CaptureError> {
        if self.fail_screen_copy {
            return Err(CaptureError::Platform("screen copy disabled".to_string()));
        }
        let fits = src.width() >= 0
            && src.height() >= 0
            && dst_x as u64 + src.width() as u64 <= dst.width() as u64
            && dst_y as u64 + src.height() as u64 <= dst.height() as u64;
        if !fits {
            return Err(CaptureError::OutOfBounds {
                region: src,
                width: dst.width(),
                height: dst.height(),
            });
        }

        self.screen_copies += 1;
        self.desktop.compose(src, dst, dst_x, dst_y);
        Ok(())
    }

    fn render_window(&mut self, id: WindowId, dst: &mut PixelBuffer) -> Result<(), CaptureError> {
        self.render_attempts += 1;
        let state = self.desktop.state.lock();
        let window = state.window(id).ok_or(CaptureError::WindowGone(id))?;
        if !window.render_supported {
            return Err(CaptureError::Unsupported(id));
        }
        dst.fill(window.color);
        Ok(())
    }
}

/// Overlay display backed by a [`SharedSurface`] that records publications.
#[derive(Clone)]
pub struct FakeDisplay {
    surface: Arc<SharedSurface>,
    window_id: Option<WindowId>,
    published: Arc<Mutex<Vec<Rect>>>,
    lock_attempts: Arc<AtomicUsize>,
    fail_lock: Arc<AtomicBool>,
    excluded: Arc<AtomicBool>,
}

impl FakeDisplay {
    pub fn new(bounds: Rect) -> Self {
        Self::with_timeout(bounds, Duration::from_millis(8))
    }

    pub fn with_timeout(bounds: Rect, lock_timeout: Duration) -> Self {
        Self {
            surface: Arc::new(SharedSurface::new(bounds, lock_timeout)),
            window_id: None,
            published: Arc::new(Mutex::new(Vec::new())),
            lock_attempts: Arc::new(AtomicUsize::new(0)),
            fail_lock: Arc::new(AtomicBool::new(false)),
            excluded: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_window_id(mut self, id: WindowId) -> Self {
        self.window_id = Some(id);
        self
    }

    pub fn surface(&self) -> &SharedSurface {
        &self.surface
    }

    pub fn published(&self) -> Vec<Rect> {
        self.published.lock().clone()
    }

    pub fn lock_attempts(&self) -> usize {
        self.lock_attempts.load(Ordering::SeqCst)
    }

    pub fn set_fail_lock(&self, fail: bool) {
        self.fail_lock.store(fail, Ordering::SeqCst);
    }

    pub fn is_excluded_from_capture(&self) -> bool {
        self.excluded.load(Ordering::SeqCst)
    }

    /// Surface pixel at screen position (`x`, `y`).
    pub fn pixel_at(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        let bounds = self.surface.bounds();
        if !bounds.contains_point(x, y) {
            return None;
        }
        let lock = self.surface.lock().ok()?;
        lock.pixels().pixel((x - bounds.left) as u32, (y - bounds.top) as u32)
    }
}

impl OverlayDisplay for FakeDisplay {
    fn bounds(&self) -> Rect {
        self.surface.bounds()
    }

    fn window_id(&self) -> Option<WindowId> {
        self.window_id
    }

    fn lock(&self) -> Result<SurfaceLock<'_>, SurfaceError> {
        self.lock_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_lock.load(Ordering::SeqCst) {
            return Err(SurfaceError::LockTimeout(0));
        }
        self.surface.lock()
    }

    fn publish(&mut self, dirty: Rect) -> Result<(), SurfaceError> {
        self.published.lock().push(dirty);
        Ok(())
    }

    fn exclude_from_capture(&mut self) -> Result<(), SurfaceError> {
        self.excluded.store(true, Ordering::SeqCst);
        Ok(())
    }
}
