//! Window-system, capture and overlay-display seams.
//!
//! The pipeline only talks to these traits. `win32` is the production backend,
//! `fake` is an in-memory desktop used by tests and headless runs.

pub mod fake;
#[cfg(windows)]
pub mod win32;

use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, SurfaceError};
use crate::geometry::Rect;
use crate::pixels::PixelBuffer;

/// Opaque top-level window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WindowId(pub isize);

pub trait WindowSystem {
    /// All top-level windows, in no particular order.
    fn enumerate_top_level(&self) -> Vec<WindowId>;
    fn exists(&self, id: WindowId) -> bool;
    fn is_visible(&self, id: WindowId) -> bool;
    fn is_minimized(&self, id: WindowId) -> bool;
    fn class_name(&self, id: WindowId) -> Option<String>;
    fn title(&self, id: WindowId) -> Option<String>;
    /// Client area mapped to screen coordinates.
    fn client_rect(&self, id: WindowId) -> Option<Rect>;
    /// Outer window bounds in screen coordinates, used for occluders.
    fn window_rect(&self, id: WindowId) -> Option<Rect>;
    fn process_id(&self, id: WindowId) -> Option<u32>;
    /// Executable file name of a process. Expensive; callers cache it per pid.
    fn process_name(&self, pid: u32) -> Option<String>;
    /// Top-level windows ordered front to back.
    fn z_order(&self) -> Vec<WindowId>;
    fn foreground(&self) -> Option<WindowId>;
}

pub trait ScreenCapture {
    /// Copies the visible desktop inside `src` into `dst` with its top-left at
    /// (`dst_x`, `dst_y`).
    fn copy_screen(&mut self, src: Rect, dst: &mut PixelBuffer, dst_x: u32, dst_y: u32) -> Result<(), CaptureError>;

    /// Renders the client area of `id` into `dst` regardless of what covers it.
    fn render_window(&mut self, id: WindowId, dst: &mut PixelBuffer) -> Result<(), CaptureError> {
        let _ = dst;
        Err(CaptureError::Unsupported(id))
    }
}

pub trait OverlayDisplay {
    /// Virtual desktop covered by the surface, in screen coordinates.
    fn bounds(&self) -> Rect;
    /// The overlay's own window, excluded from z-order snapshots.
    fn window_id(&self) -> Option<WindowId>;
    fn lock(&self) -> Result<SurfaceLock<'_>, SurfaceError>;
    /// Announces that `dirty` changed since the last publication.
    fn publish(&mut self, dirty: Rect) -> Result<(), SurfaceError>;
    /// Keeps the overlay out of every screen capture, including our own.
    fn exclude_from_capture(&mut self) -> Result<(), SurfaceError>;
}

/// Virtual-desktop pixel store shared between the pipeline and the presenter.
pub struct SharedSurface {
    bounds: Rect,
    pixels: Mutex<PixelBuffer>,
    lock_timeout: Duration,
}

impl SharedSurface {
    pub fn new(bounds: Rect, lock_timeout: Duration) -> Self {
        let width = bounds.width().max(0) as u32;
        let height = bounds.height().max(0) as u32;
        Self {
            bounds,
            pixels: Mutex::new(PixelBuffer::new(width, height)),
            lock_timeout,
        }
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn lock(&self) -> Result<SurfaceLock<'_>, SurfaceError> {
        let guard = self
            .pixels
            .try_lock_for(self.lock_timeout)
            .ok_or(SurfaceError::LockTimeout(self.lock_timeout.as_millis() as u64))?;
        Ok(SurfaceLock {
            bounds: self.bounds,
            pixels: guard,
        })
    }
}

/// Exclusive write access to the overlay pixels; released on drop.
pub struct SurfaceLock<'a> {
    bounds: Rect,
    pixels: MutexGuard<'a, PixelBuffer>,
}

impl SurfaceLock<'_> {
    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut PixelBuffer {
        &mut self.pixels
    }
}
