//! Tile renderer: blits decoded frames into grid cells of the window.
//!
//! Uses GDI `StretchDIBits`. Tile `i` occupies column `i % columns`, row
//! `i / columns`; every cell is stretched to an equal share of the
//! client area.

use mirrorcast_core::{PixelFormat, RawScreenFrame};

/// Destination rectangle `(x, y, width, height)` of `tile` on a surface
/// of `surface` pixels split into a `grid` of (columns, rows).
///
/// `None` when the tile falls outside the grid or the surface is empty.
pub fn tile_rect(tile: usize, grid: (u32, u32), surface: (u32, u32)) -> Option<(i32, i32, i32, i32)> {
    let (columns, rows) = grid;
    let (width, height) = surface;
    if columns == 0 || rows == 0 || width == 0 || height == 0 {
        return None;
    }
    let column = (tile % columns as usize) as u32;
    let row = tile / columns as usize;
    if row >= rows as usize {
        return None;
    }
    let row = row as u32;

    // Integer edges so neighbouring cells share borders without gaps.
    let x0 = width * column / columns;
    let x1 = width * (column + 1) / columns;
    let y0 = height * row / rows;
    let y1 = height * (row + 1) / rows;
    Some((x0 as i32, y0 as i32, (x1 - x0) as i32, (y1 - y0) as i32))
}

/// Frames that `StretchDIBits` can draw directly as a 32-bit DIB.
fn drawable(frame: &RawScreenFrame) -> Result<(), String> {
    if frame.format != PixelFormat::Bgra8 {
        return Err(format!("unsupported pixel format {:?}", frame.format));
    }
    let expected = frame.width as usize * frame.height as usize * 4;
    if frame.stride as usize != frame.width as usize * 4 || frame.data.len() < expected {
        return Err(format!(
            "frame buffer does not hold {}x{} packed pixels",
            frame.width, frame.height
        ));
    }
    Ok(())
}

#[cfg(target_os = "windows")]
mod platform {
    use windows::Win32::Graphics::Gdi::*;

    use mirrorcast_core::{CastError, RawScreenFrame, RenderSink, SinkStatus};
    use tracing::{info, warn};

    use super::{drawable, tile_rect};
    use crate::window::{NativeWindow, WindowEvent};

    /// Renders each stream into its grid cell of a native window.
    pub struct GdiTileRenderer {
        window: NativeWindow,
        grid: (u32, u32),
        warned_outside: bool,
    }

    impl GdiTileRenderer {
        /// Open the receiver window.
        pub fn new(
            title: &str,
            width: u32,
            height: u32,
            fullscreen: bool,
            grid: (u32, u32),
        ) -> Result<Self, CastError> {
            let window = NativeWindow::create(title, width, height, fullscreen)
                .map_err(CastError::Render)?;
            let (w, h) = window.size();
            info!(width = w, height = h, fullscreen, "window opened");
            Ok(Self {
                window,
                grid,
                warned_outside: false,
            })
        }
    }

    impl RenderSink for GdiTileRenderer {
        fn present(&mut self, tile: usize, frame: &RawScreenFrame) -> Result<(), CastError> {
            drawable(frame).map_err(CastError::Render)?;

            let Some((x, y, w, h)) = tile_rect(tile, self.grid, self.window.size()) else {
                if !self.warned_outside {
                    warn!(tile, grid = ?self.grid, "tile outside the grid; not drawn");
                    self.warned_outside = true;
                }
                return Ok(());
            };

            let hwnd = self.window.hwnd();
            unsafe {
                let hdc = GetDC(hwnd);
                if hdc.is_invalid() {
                    return Err(CastError::Render("GetDC failed".into()));
                }

                let bmi = BITMAPINFO {
                    bmiHeader: BITMAPINFOHEADER {
                        biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                        biWidth: frame.width as i32,
                        // Negative height = top-down DIB (origin at top-left).
                        biHeight: -(frame.height as i32),
                        biPlanes: 1,
                        biBitCount: 32,
                        biCompression: BI_RGB.0,
                        ..Default::default()
                    },
                    ..Default::default()
                };

                let _ = SetStretchBltMode(hdc, HALFTONE);
                StretchDIBits(
                    hdc,
                    x,
                    y,
                    w,
                    h,
                    0,
                    0,
                    frame.width as i32,
                    frame.height as i32,
                    Some(frame.data.as_ptr() as *const _),
                    &bmi,
                    DIB_RGB_COLORS,
                    SRCCOPY,
                );

                ReleaseDC(hwnd, hdc);
            }
            Ok(())
        }

        fn pump(&mut self) -> SinkStatus {
            let closed = self
                .window
                .poll_events()
                .iter()
                .any(|ev| *ev == WindowEvent::Close);
            if closed {
                SinkStatus::Closed
            } else {
                SinkStatus::Open
            }
        }
    }
}

#[cfg(target_os = "windows")]
pub use platform::*;

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
pub mod stub {
    use mirrorcast_core::{CastError, RawScreenFrame, RenderSink};

    use crate::window::NativeWindow;

    pub struct GdiTileRenderer {
        _window: NativeWindow,
    }

    impl GdiTileRenderer {
        pub fn new(
            title: &str,
            width: u32,
            height: u32,
            fullscreen: bool,
            _grid: (u32, u32),
        ) -> Result<Self, CastError> {
            let window =
                NativeWindow::create(title, width, height, fullscreen).map_err(CastError::Render)?;
            Ok(Self { _window: window })
        }
    }

    impl RenderSink for GdiTileRenderer {
        fn present(&mut self, _tile: usize, frame: &RawScreenFrame) -> Result<(), CastError> {
            super::drawable(frame).map_err(CastError::Render)?;
            Err(CastError::Render(
                "display rendering is only supported on Windows".into(),
            ))
        }
    }
}

#[cfg(not(target_os = "windows"))]
pub use stub::*;

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_tile_fills_surface() {
        assert_eq!(tile_rect(0, (1, 1), (1280, 720)), Some((0, 0, 1280, 720)));
        assert_eq!(tile_rect(1, (1, 1), (1280, 720)), None);
    }

    #[test]
    fn grid_cells_tile_without_gaps() {
        let surface = (1001, 600);
        let grid = (3, 2);
        assert_eq!(tile_rect(0, grid, surface), Some((0, 0, 333, 300)));
        assert_eq!(tile_rect(1, grid, surface), Some((333, 0, 334, 300)));
        assert_eq!(tile_rect(2, grid, surface), Some((667, 0, 334, 300)));
        assert_eq!(tile_rect(4, grid, surface), Some((333, 300, 334, 300)));
        assert_eq!(tile_rect(6, grid, surface), None);
    }

    #[test]
    fn minimised_surface_draws_nothing() {
        assert_eq!(tile_rect(0, (2, 2), (0, 0)), None);
    }

    #[test]
    fn only_packed_bgra_is_drawable() {
        let ok = RawScreenFrame::packed(2, 2, PixelFormat::Bgra8, vec![0; 16]);
        assert!(drawable(&ok).is_ok());
        let rgb = RawScreenFrame::packed(2, 2, PixelFormat::Bgr8, vec![0; 12]);
        assert!(drawable(&rgb).is_err());
    }
}
