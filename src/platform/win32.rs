//! Win32 backend: window queries, GDI capture and a layered overlay window.

use std::ffi::c_void;
use std::mem::size_of;
use std::ptr::null_mut;
use std::time::Duration;

use anyhow::{Context, Result};
use windows::core::{w, BOOL, PWSTR};
use windows::Win32::Foundation::{CloseHandle, COLORREF, HINSTANCE, HWND, LPARAM, LRESULT, POINT, RECT, SIZE, WPARAM};
use windows::Win32::Graphics::Dwm::{DwmGetWindowAttribute, DWMWA_CLOAKED};
use windows::Win32::Graphics::Gdi::{
    BitBlt, ClientToScreen, CreateCompatibleDC, CreateDIBSection, DeleteDC, DeleteObject, GetDC, ReleaseDC,
    SelectObject, AC_SRC_ALPHA, AC_SRC_OVER, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, BLENDFUNCTION, DIB_RGB_COLORS,
    HBITMAP, HDC, HGDIOBJ, SRCCOPY,
};
use windows::Win32::Storage::Xps::{PrintWindow, PRINT_WINDOW_FLAGS};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::*;

use super::{OverlayDisplay, ScreenCapture, SharedSurface, SurfaceLock, WindowId, WindowSystem};
use crate::error::{CaptureError, SurfaceError};
use crate::geometry::Rect;
use crate::pixels::{PixelBuffer, BYTES_PER_PIXEL};
use crate::{log_info, log_warn};

/// PW_CLIENTONLY | PW_RENDERFULLCONTENT
const PRINT_CLIENT_FULL_CONTENT: PRINT_WINDOW_FLAGS = PRINT_WINDOW_FLAGS(3);

fn hwnd(id: WindowId) -> HWND {
    HWND(id.0 as *mut c_void)
}

fn window_id(hwnd: HWND) -> WindowId {
    WindowId(hwnd.0 as isize)
}

fn rect_from(r: RECT) -> Rect {
    Rect::new(r.left, r.top, r.right, r.bottom)
}

/// Virtual desktop spanning every monitor.
pub fn virtual_screen() -> Rect {
    unsafe {
        Rect::from_origin_size(
            GetSystemMetrics(SM_XVIRTUALSCREEN),
            GetSystemMetrics(SM_YVIRTUALSCREEN),
            GetSystemMetrics(SM_CXVIRTUALSCREEN),
            GetSystemMetrics(SM_CYVIRTUALSCREEN),
        )
    }
}

/// Drains the calling thread's message queue. Returns `false` on `WM_QUIT`.
pub fn pump_messages() -> bool {
    unsafe {
        let mut msg = MSG::default();
        while PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE).as_bool() {
            if msg.message == WM_QUIT {
                return false;
            }
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
    true
}

pub struct Win32Windows;

unsafe extern "system" fn collect_windows(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let ids = &mut *(lparam.0 as *mut Vec<WindowId>);
    ids.push(window_id(hwnd));
    true.into()
}

impl WindowSystem for Win32Windows {
    fn enumerate_top_level(&self) -> Vec<WindowId> {
        let mut ids: Vec<WindowId> = Vec::new();
        unsafe {
            let _ = EnumWindows(Some(collect_windows), LPARAM(&mut ids as *mut Vec<WindowId> as isize));
        }
        ids
    }

    fn exists(&self, id: WindowId) -> bool {
        unsafe { IsWindow(Some(hwnd(id))).as_bool() }
    }

    /// Cloaked windows (other virtual desktops, suspended apps) report visible
    /// but are not drawn.
    fn is_visible(&self, id: WindowId) -> bool {
        let h = hwnd(id);
        if !unsafe { IsWindowVisible(h).as_bool() } {
            return false;
        }
        let mut cloaked = 0u32;
        let queried = unsafe {
            DwmGetWindowAttribute(
                h,
                DWMWA_CLOAKED,
                &mut cloaked as *mut u32 as *mut c_void,
                size_of::<u32>() as u32,
            )
        };
        queried.is_err() || cloaked == 0
    }

    fn is_minimized(&self, id: WindowId) -> bool {
        unsafe { IsIconic(hwnd(id)).as_bool() }
    }

    fn class_name(&self, id: WindowId) -> Option<String> {
        let mut buf = [0u16; 256];
        let len = unsafe { GetClassNameW(hwnd(id), &mut buf) };
        if len <= 0 {
            return None;
        }
        Some(String::from_utf16_lossy(&buf[..len as usize]))
    }

    fn title(&self, id: WindowId) -> Option<String> {
        let mut buf = [0u16; 512];
        let len = unsafe { GetWindowTextW(hwnd(id), &mut buf) };
        if len < 0 {
            return None;
        }
        Some(String::from_utf16_lossy(&buf[..len as usize]))
    }

    fn client_rect(&self, id: WindowId) -> Option<Rect> {
        let h = hwnd(id);
        let mut rect = RECT::default();
        unsafe {
            GetClientRect(h, &mut rect).ok()?;
            let mut origin = POINT { x: 0, y: 0 };
            if !ClientToScreen(h, &mut origin).as_bool() {
                return None;
            }
            Some(Rect::from_origin_size(origin.x, origin.y, rect.right - rect.left, rect.bottom - rect.top))
        }
    }

    fn window_rect(&self, id: WindowId) -> Option<Rect> {
        let mut rect = RECT::default();
        unsafe { GetWindowRect(hwnd(id), &mut rect).ok()? };
        Some(rect_from(rect))
    }

    fn process_id(&self, id: WindowId) -> Option<u32> {
        let mut pid = 0u32;
        unsafe { GetWindowThreadProcessId(hwnd(id), Some(&mut pid)) };
        (pid != 0).then_some(pid)
    }

    fn process_name(&self, pid: u32) -> Option<String> {
        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid).ok()?;
            let mut buf = [0u16; 260];
            let mut len = buf.len() as u32;
            let queried = QueryFullProcessImageNameW(handle, PROCESS_NAME_WIN32, PWSTR(buf.as_mut_ptr()), &mut len);
            let _ = CloseHandle(handle);
            queried.ok()?;
            let path = String::from_utf16_lossy(&buf[..len as usize]);
            path.rsplit('\\').next().map(str::to_string)
        }
    }

    fn z_order(&self) -> Vec<WindowId> {
        let mut ids = Vec::new();
        unsafe {
            let mut current = GetTopWindow(None).ok();
            while let Some(h) = current {
                if h.0.is_null() {
                    break;
                }
                ids.push(window_id(h));
                current = GetWindow(h, GW_HWNDNEXT).ok();
            }
        }
        ids
    }

    fn foreground(&self) -> Option<WindowId> {
        let h = unsafe { GetForegroundWindow() };
        (!h.0.is_null()).then(|| window_id(h))
    }
}

/// Top-down 32-bit DIB selected into a memory DC.
struct DibSurface {
    dc: HDC,
    bitmap: HBITMAP,
    previous: HGDIOBJ,
    bits: *mut u8,
    width: i32,
    height: i32,
}

impl DibSurface {
    unsafe fn new(reference: HDC, width: i32, height: i32) -> Result<Self, CaptureError> {
        let dc = CreateCompatibleDC(Some(reference));
        if dc.is_invalid() {
            return Err(CaptureError::Platform("CreateCompatibleDC failed".to_string()));
        }

        let mut info = BITMAPINFO::default();
        info.bmiHeader.biSize = size_of::<BITMAPINFOHEADER>() as u32;
        info.bmiHeader.biWidth = width;
        info.bmiHeader.biHeight = -height;
        info.bmiHeader.biPlanes = 1;
        info.bmiHeader.biBitCount = 32;
        info.bmiHeader.biCompression = BI_RGB.0;

        let mut bits: *mut c_void = null_mut();
        let bitmap = match CreateDIBSection(Some(dc), &info, DIB_RGB_COLORS, &mut bits, None, 0) {
            Ok(bitmap) if !bits.is_null() => bitmap,
            Ok(bitmap) => {
                let _ = DeleteObject(bitmap.into());
                let _ = DeleteDC(dc);
                return Err(CaptureError::Platform("CreateDIBSection returned no pixels".to_string()));
            }
            Err(e) => {
                let _ = DeleteDC(dc);
                return Err(CaptureError::Platform(format!("CreateDIBSection failed: {}", e)));
            }
        };
        let previous = SelectObject(dc, bitmap.into());

        Ok(Self {
            dc,
            bitmap,
            previous,
            bits: bits.cast(),
            width,
            height,
        })
    }

    fn fits(&self, width: i32, height: i32) -> bool {
        width <= self.width && height <= self.height
    }

    fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    /// Row `y`, `len` pixels wide, as bytes.
    unsafe fn row(&self, y: i32, len: i32) -> &[u8] {
        let start = self.bits.add(y as usize * self.stride());
        std::slice::from_raw_parts(start, len as usize * BYTES_PER_PIXEL)
    }

    unsafe fn row_mut(&mut self, y: i32, x: i32, len: i32) -> &mut [u8] {
        let start = self.bits.add(y as usize * self.stride() + x as usize * BYTES_PER_PIXEL);
        std::slice::from_raw_parts_mut(start, len as usize * BYTES_PER_PIXEL)
    }
}

impl Drop for DibSurface {
    fn drop(&mut self) {
        unsafe {
            SelectObject(self.dc, self.previous);
            let _ = DeleteObject(self.bitmap.into());
            let _ = DeleteDC(self.dc);
        }
    }
}

/// Screen copies with `BitBlt`, window renders with `PrintWindow`.
pub struct GdiCapture {
    screen_dc: HDC,
    surface: Option<DibSurface>,
}

impl GdiCapture {
    pub fn new() -> Result<Self> {
        let screen_dc = unsafe { GetDC(None) };
        if screen_dc.is_invalid() {
            anyhow::bail!("GetDC returned null for the screen");
        }
        Ok(Self { screen_dc, surface: None })
    }

    fn surface(&mut self, width: i32, height: i32) -> Result<&mut DibSurface, CaptureError> {
        let reuse = self.surface.as_ref().map(|s| s.fits(width, height)).unwrap_or(false);
        if !reuse {
            let (w, h) = match &self.surface {
                Some(s) => (s.width.max(width), s.height.max(height)),
                None => (width, height),
            };
            self.surface = None;
            self.surface = Some(unsafe { DibSurface::new(self.screen_dc, w, h)? });
        }
        self.surface
            .as_mut()
            .ok_or_else(|| CaptureError::Platform("capture surface unavailable".to_string()))
    }
}

fn copy_out(surface: &DibSurface, width: i32, height: i32, dst: &mut PixelBuffer, dst_x: u32, dst_y: u32) {
    for y in 0..height {
        let src = unsafe { surface.row(y, width) };
        if let Some(span) = dst.span_mut(dst_x, dst_y + y as u32, width as u32) {
            span.copy_from_slice(src);
        }
    }
}

impl ScreenCapture for GdiCapture {
    fn copy_screen(&mut self, src: Rect, dst: &mut PixelBuffer, dst_x: u32, dst_y: u32) -> Result<(), CaptureError> {
        let (width, height) = (src.width(), src.height());
        if width <= 0 || height <= 0 {
            return Ok(());
        }
        if dst_x as u64 + width as u64 > dst.width() as u64 || dst_y as u64 + height as u64 > dst.height() as u64 {
            return Err(CaptureError::OutOfBounds {
                region: src,
                width: dst.width(),
                height: dst.height(),
            });
        }

        let screen_dc = self.screen_dc;
        let surface = self.surface(width, height)?;
        unsafe { BitBlt(surface.dc, 0, 0, width, height, Some(screen_dc), src.left, src.top, SRCCOPY) }
            .map_err(|e| CaptureError::Platform(format!("BitBlt failed: {}", e)))?;
        copy_out(surface, width, height, dst, dst_x, dst_y);
        Ok(())
    }

    fn render_window(&mut self, id: WindowId, dst: &mut PixelBuffer) -> Result<(), CaptureError> {
        if !unsafe { IsWindow(Some(hwnd(id))).as_bool() } {
            return Err(CaptureError::WindowGone(id));
        }
        let (width, height) = (dst.width() as i32, dst.height() as i32);
        let surface = self.surface(width, height)?;
        if !unsafe { PrintWindow(hwnd(id), surface.dc, PRINT_CLIENT_FULL_CONTENT) }.as_bool() {
            return Err(CaptureError::Unsupported(id));
        }
        copy_out(surface, width, height, dst, 0, 0);
        Ok(())
    }
}

impl Drop for GdiCapture {
    fn drop(&mut self) {
        self.surface = None;
        unsafe {
            ReleaseDC(None, self.screen_dc);
        }
    }
}

/// Click-through topmost layered window covering the virtual desktop.
///
/// The pipeline writes into the shared surface; `publish` copies the dirty
/// rect into the window's DIB and hands it to `UpdateLayeredWindowIndirect`.
pub struct LayeredOverlay {
    hwnd: HWND,
    surface: SharedSurface,
    dib: DibSurface,
    screen_dc: HDC,
}

impl LayeredOverlay {
    pub fn new(lock_timeout: Duration) -> Result<Self> {
        let bounds = virtual_screen();
        unsafe {
            let hwnd = Self::create_overlay_window(bounds)?;
            let screen_dc = GetDC(None);
            let dib = DibSurface::new(screen_dc, bounds.width(), bounds.height())
                .context("Failed to allocate overlay bitmap")?;
            log_info!(
                "Overlay window created at ({}, {}) size {}x{}",
                bounds.left,
                bounds.top,
                bounds.width(),
                bounds.height()
            );
            Ok(Self {
                hwnd,
                surface: SharedSurface::new(bounds, lock_timeout),
                dib,
                screen_dc,
            })
        }
    }

    unsafe fn create_overlay_window(bounds: Rect) -> Result<HWND> {
        let class_name = w!("HueLensOverlay");
        let hinstance = GetModuleHandleW(None)?;

        let wc = WNDCLASSW {
            lpfnWndProc: Some(Self::window_proc),
            hInstance: hinstance.into(),
            lpszClassName: class_name,
            ..Default::default()
        };

        RegisterClassW(&wc);

        let hwnd = CreateWindowExW(
            WS_EX_LAYERED | WS_EX_TRANSPARENT | WS_EX_TOPMOST | WS_EX_NOACTIVATE | WS_EX_TOOLWINDOW,
            class_name,
            w!("HueLens Overlay"),
            WS_POPUP,
            bounds.left,
            bounds.top,
            bounds.width(),
            bounds.height(),
            None,
            None,
            Some(HINSTANCE(hinstance.0)),
            None,
        )?;

        let _ = ShowWindow(hwnd, SW_SHOWNOACTIVATE);

        Ok(hwnd)
    }

    unsafe extern "system" fn window_proc(hwnd: HWND, msg: u32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
        match msg {
            WM_DESTROY => {
                PostQuitMessage(0);
                LRESULT(0)
            }
            _ => DefWindowProcW(hwnd, msg, wparam, lparam),
        }
    }
}

impl OverlayDisplay for LayeredOverlay {
    fn bounds(&self) -> Rect {
        self.surface.bounds()
    }

    fn window_id(&self) -> Option<WindowId> {
        Some(window_id(self.hwnd))
    }

    fn lock(&self) -> Result<SurfaceLock<'_>, SurfaceError> {
        self.surface.lock()
    }

    fn publish(&mut self, dirty: Rect) -> Result<(), SurfaceError> {
        let bounds = self.surface.bounds();
        let dirty = dirty.intersect(&bounds).ok_or(SurfaceError::Unavailable)?;
        let local = dirty.offset(-bounds.left, -bounds.top);

        {
            let lock = self.surface.lock()?;
            let pixels = lock.pixels();
            for y in local.top..local.bottom {
                if let Some(src) = pixels.span(local.left as u32, y as u32, local.width() as u32) {
                    unsafe { self.dib.row_mut(y, local.left, local.width()) }.copy_from_slice(src);
                }
            }
        }

        let position = POINT { x: bounds.left, y: bounds.top };
        let size = SIZE { cx: bounds.width(), cy: bounds.height() };
        let source = POINT { x: 0, y: 0 };
        let blend = BLENDFUNCTION {
            BlendOp: AC_SRC_OVER as u8,
            BlendFlags: 0,
            SourceConstantAlpha: 255,
            AlphaFormat: AC_SRC_ALPHA as u8,
        };
        let dirty_rect = RECT {
            left: local.left,
            top: local.top,
            right: local.right,
            bottom: local.bottom,
        };
        let info = UPDATELAYEREDWINDOWINFO {
            cbSize: size_of::<UPDATELAYEREDWINDOWINFO>() as u32,
            hdcDst: self.screen_dc,
            pptDst: &position,
            psize: &size,
            hdcSrc: self.dib.dc,
            pptSrc: &source,
            crKey: COLORREF(0),
            pblend: &blend,
            dwFlags: ULW_ALPHA,
            prcDirty: &dirty_rect,
        };

        if !unsafe { UpdateLayeredWindowIndirect(self.hwnd, &info) }.as_bool() {
            return Err(SurfaceError::Platform(format!(
                "UpdateLayeredWindowIndirect failed: {}",
                windows::core::Error::from_win32()
            )));
        }
        Ok(())
    }

    fn exclude_from_capture(&mut self) -> Result<(), SurfaceError> {
        unsafe { SetWindowDisplayAffinity(self.hwnd, WDA_EXCLUDEFROMCAPTURE) }
            .map_err(|e| SurfaceError::Platform(format!("SetWindowDisplayAffinity failed: {:?}", e)))?;
        log_info!("Overlay window excluded from screen capture");
        Ok(())
    }
}

impl Drop for LayeredOverlay {
    fn drop(&mut self) {
        unsafe {
            if DestroyWindow(self.hwnd).is_err() {
                log_warn!("Failed to destroy overlay window");
            }
            ReleaseDC(None, self.screen_dc);
        }
    }
}
