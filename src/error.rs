use thiserror::Error;

use crate::geometry::Rect;
use crate::platform::WindowId;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("window content rendering is not supported for window {0:?}")]
    Unsupported(WindowId),
    #[error("capture region {region:?} does not fit the {width}x{height} destination buffer")]
    OutOfBounds { region: Rect, width: u32, height: u32 },
    #[error("window {0:?} no longer exists")]
    WindowGone(WindowId),
    #[error("platform capture failed: {0}")]
    Platform(String),
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("overlay surface lock not acquired within {0} ms")]
    LockTimeout(u64),
    #[error("overlay surface is not available")]
    Unavailable,
    #[error("overlay presentation failed: {0}")]
    Platform(String),
}
