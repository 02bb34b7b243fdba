//! Screen capture sources.
//!
//! The sender only needs "give me the current display contents" from its
//! capture source; [`CaptureSource`] is that contract.
//!
//! - [`GdiCapturer`]: desktop `BitBlt` into a top-down 32-bit DIB
//!   (Windows only; construction fails elsewhere).
//! - [`TestPatternSource`]: portable moving gradient, for tests and for
//!   running the pipeline without a desktop.

use crate::error::CastError;
use crate::types::{PixelFormat, RawScreenFrame};

/// Produces raw frames on demand.
///
/// An empty frame (see [`RawScreenFrame::is_empty`]) is a transient
/// failure: the sender skips the iteration and asks again.
pub trait CaptureSource {
    /// Size of the captured surface in pixels.
    fn native_size(&self) -> (u32, u32);

    fn capture(&mut self) -> Result<RawScreenFrame, CastError>;
}

impl<S: CaptureSource + ?Sized> CaptureSource for Box<S> {
    fn native_size(&self) -> (u32, u32) {
        (**self).native_size()
    }

    fn capture(&mut self) -> Result<RawScreenFrame, CastError> {
        (**self).capture()
    }
}

// ── TestPatternSource ────────────────────────────────────────────

/// Synthetic BGRA gradient that scrolls by a few pixels per capture.
#[derive(Debug, Clone)]
pub struct TestPatternSource {
    width: u32,
    height: u32,
    tick: u32,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }

    /// Number of frames produced so far.
    pub fn frames_produced(&self) -> u32 {
        self.tick
    }
}

impl CaptureSource for TestPatternSource {
    fn native_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self) -> Result<RawScreenFrame, CastError> {
        let shift = self.tick.wrapping_mul(4);
        let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for y in 0..self.height {
            for x in 0..self.width {
                let b = x.wrapping_add(shift) as u8;
                let g = y.wrapping_add(shift / 2) as u8;
                let r = (x ^ y) as u8;
                data.extend_from_slice(&[b, g, r, 0xFF]);
            }
        }
        self.tick = self.tick.wrapping_add(1);
        Ok(RawScreenFrame::packed(
            self.width,
            self.height,
            PixelFormat::Bgra8,
            data,
        ))
    }
}

// ── GdiCapturer ──────────────────────────────────────────────────

/// GDI desktop capturer for the primary display.
///
/// Each call to [`capture`](CaptureSource::capture):
///
/// 1. Gets the desktop DC and a compatible memory DC.
/// 2. `BitBlt`s the screen into a compatible bitmap.
/// 3. `GetDIBits` the bitmap as a top-down 32-bit DIB into a `Vec<u8>`.
/// 4. Releases every GDI object it created.
///
/// All unsafe FFI calls are confined to this struct.
pub struct GdiCapturer {
    width: u32,
    height: u32,
}

#[cfg(target_os = "windows")]
mod platform {
    use super::*;
    use windows::Win32::Graphics::Gdi::{
        BI_RGB, BITMAPINFO, BITMAPINFOHEADER, BitBlt, CreateCompatibleBitmap,
        CreateCompatibleDC, DIB_RGB_COLORS, DeleteDC, DeleteObject, GetDC, GetDIBits,
        ReleaseDC, SRCCOPY, SelectObject,
    };
    use windows::Win32::UI::WindowsAndMessaging::{
        GetDesktopWindow, GetSystemMetrics, SM_CXSCREEN, SM_CYSCREEN,
    };

    impl GdiCapturer {
        /// Initialise the capturer for the primary display.
        pub fn new() -> Result<Self, CastError> {
            let (width, height) =
                unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
            if width <= 0 || height <= 0 {
                return Err(CastError::Capture(format!(
                    "invalid screen metrics {width}x{height}"
                )));
            }
            Ok(Self {
                width: width as u32,
                height: height as u32,
            })
        }

        unsafe fn capture_inner(&mut self) -> Result<RawScreenFrame, CastError> {
            let (w, h) = (self.width as i32, self.height as i32);
            let mut data = vec![0u8; self.width as usize * self.height as usize * 4];

            unsafe {
                let desktop = GetDesktopWindow();
                let screen_dc = GetDC(desktop);
                if screen_dc.is_invalid() {
                    return Err(CastError::Capture("GetDC(desktop) failed".into()));
                }
                let mem_dc = CreateCompatibleDC(screen_dc);
                let bitmap = CreateCompatibleBitmap(screen_dc, w, h);
                let previous = SelectObject(mem_dc, bitmap);

                let blit = BitBlt(mem_dc, 0, 0, w, h, screen_dc, 0, 0, SRCCOPY);

                let mut bmi = BITMAPINFO {
                    bmiHeader: BITMAPINFOHEADER {
                        biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                        biWidth: w,
                        // Negative height = top-down DIB (origin at top-left).
                        biHeight: -h,
                        biPlanes: 1,
                        biBitCount: 32,
                        biCompression: BI_RGB.0,
                        ..Default::default()
                    },
                    ..Default::default()
                };
                let lines = GetDIBits(
                    mem_dc,
                    bitmap,
                    0,
                    self.height,
                    Some(data.as_mut_ptr() as *mut _),
                    &mut bmi,
                    DIB_RGB_COLORS,
                );

                SelectObject(mem_dc, previous);
                let _ = DeleteObject(bitmap);
                let _ = DeleteDC(mem_dc);
                ReleaseDC(desktop, screen_dc);

                if let Err(e) = blit {
                    return Err(CastError::Capture(format!("BitBlt failed: {e}")));
                }
                if lines <= 0 {
                    // Treated as an empty capture: the sender retries.
                    return Ok(RawScreenFrame::empty(PixelFormat::Bgra8));
                }
            }

            Ok(RawScreenFrame::packed(
                self.width,
                self.height,
                PixelFormat::Bgra8,
                data,
            ))
        }
    }

    impl CaptureSource for GdiCapturer {
        fn native_size(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        fn capture(&mut self) -> Result<RawScreenFrame, CastError> {
            unsafe { self.capture_inner() }
        }
    }
}

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
impl GdiCapturer {
    /// GDI is only available on Windows.
    pub fn new() -> Result<Self, CastError> {
        Err(CastError::Capture(
            "GDI screen capture is only available on Windows".into(),
        ))
    }
}

#[cfg(not(target_os = "windows"))]
impl CaptureSource for GdiCapturer {
    fn native_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self) -> Result<RawScreenFrame, CastError> {
        Err(CastError::Capture("not supported on this platform".into()))
    }
}

// ── Tests ────────────────────────────────────────────────────────
