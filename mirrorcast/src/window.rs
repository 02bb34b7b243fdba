//! Win32 window creation and message pump.
//!
//! The receiver's window only needs lifecycle events: close requests
//! (X button, Alt-F4, Escape) and client-area resizes.

/// Events produced by the window message loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEvent {
    /// Window close requested.
    Close,
    /// Client area resized.
    Resize(u32, u32),
}

#[cfg(target_os = "windows")]
mod platform {
    use std::sync::mpsc;

    use windows::Win32::Foundation::*;
    use windows::Win32::System::LibraryLoader::GetModuleHandleW;
    use windows::Win32::UI::WindowsAndMessaging::*;
    use windows::core::PCWSTR;

    use super::WindowEvent;

    const VK_ESCAPE: usize = 0x1B;

    /// Handle to the native window.
    pub struct NativeWindow {
        hwnd: HWND,
        width: u32,
        height: u32,
        event_rx: mpsc::Receiver<WindowEvent>,
    }

    // GWLP_USERDATA holds a boxed mpsc sender that lives until Drop.
    unsafe extern "system" fn wndproc(
        hwnd: HWND,
        msg: u32,
        wparam: WPARAM,
        lparam: LPARAM,
    ) -> LRESULT {
        let tx_ptr =
            unsafe { GetWindowLongPtrW(hwnd, GWLP_USERDATA) } as *const mpsc::Sender<WindowEvent>;

        if tx_ptr.is_null() {
            return unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) };
        }

        let tx = unsafe { &*tx_ptr };

        match msg {
            WM_CLOSE => {
                let _ = tx.send(WindowEvent::Close);
                LRESULT(0)
            }
            WM_KEYDOWN if wparam.0 == VK_ESCAPE => {
                let _ = tx.send(WindowEvent::Close);
                LRESULT(0)
            }
            WM_SIZE => {
                let w = (lparam.0 & 0xFFFF) as u32;
                let h = ((lparam.0 >> 16) & 0xFFFF) as u32;
                let _ = tx.send(WindowEvent::Resize(w, h));
                LRESULT(0)
            }
            WM_DESTROY => {
                unsafe { PostQuitMessage(0) };
                LRESULT(0)
            }
            _ => unsafe { DefWindowProcW(hwnd, msg, wparam, lparam) },
        }
    }

    impl NativeWindow {
        /// Create a top-level window. With `fullscreen` the window is a
        /// borderless popup covering the primary display and the given
        /// size is ignored.
        pub fn create(title: &str, width: u32, height: u32, fullscreen: bool) -> Result<Self, String> {
            let (event_tx, event_rx) = mpsc::channel();

            let hinstance = unsafe { GetModuleHandleW(None) }
                .map_err(|e| format!("GetModuleHandle: {e}"))?;

            let class_name_wide: Vec<u16> = "MirrorcastReceiverClass\0".encode_utf16().collect();

            let wc = WNDCLASSW {
                lpfnWndProc: Some(wndproc),
                hInstance: hinstance.into(),
                lpszClassName: PCWSTR(class_name_wide.as_ptr()),
                hCursor: unsafe { LoadCursorW(None, IDC_ARROW) }.unwrap_or_default(),
                ..Default::default()
            };

            let atom = unsafe { RegisterClassW(&wc) };
            if atom == 0 {
                return Err("RegisterClassW failed".into());
            }

            let title_wide: Vec<u16> = title.encode_utf16().chain(std::iter::once(0)).collect();

            let (style, x, y, width, height) = if fullscreen {
                let (w, h) =
                    unsafe { (GetSystemMetrics(SM_CXSCREEN), GetSystemMetrics(SM_CYSCREEN)) };
                (WS_POPUP | WS_VISIBLE, 0, 0, w.max(1) as u32, h.max(1) as u32)
            } else {
                (
                    WS_OVERLAPPEDWINDOW | WS_VISIBLE,
                    CW_USEDEFAULT,
                    CW_USEDEFAULT,
                    width,
                    height,
                )
            };

            let hwnd = unsafe {
                CreateWindowExW(
                    WINDOW_EX_STYLE(0),
                    PCWSTR(class_name_wide.as_ptr()),
                    PCWSTR(title_wide.as_ptr()),
                    style,
                    x,
                    y,
                    width as i32,
                    height as i32,
                    None,
                    None,
                    hinstance,
                    None,
                )
            }
            .map_err(|e| format!("CreateWindowExW failed: {e}"))?;

            if hwnd.is_invalid() {
                return Err("CreateWindowExW returned invalid HWND".into());
            }

            let tx_ptr = Box::into_raw(Box::new(event_tx));
            unsafe {
                SetWindowLongPtrW(hwnd, GWLP_USERDATA, tx_ptr as isize);
            }

            Ok(Self {
                hwnd,
                width,
                height,
                event_rx,
            })
        }

        /// Pump window messages (non-blocking) and return the events
        /// they produced.
        pub fn poll_events(&mut self) -> Vec<WindowEvent> {
            unsafe {
                let mut msg = MSG::default();
                while PeekMessageW(&mut msg, self.hwnd, 0, 0, PM_REMOVE).as_bool() {
                    let _ = TranslateMessage(&msg);
                    DispatchMessageW(&msg);
                }
            }
            let mut events = Vec::new();
            while let Ok(ev) = self.event_rx.try_recv() {
                if let WindowEvent::Resize(w, h) = ev {
                    self.width = w;
                    self.height = h;
                }
                events.push(ev);
            }
            events
        }

        /// Current client size.
        pub fn size(&self) -> (u32, u32) {
            (self.width, self.height)
        }

        pub fn hwnd(&self) -> HWND {
            self.hwnd
        }
    }

    impl Drop for NativeWindow {
        fn drop(&mut self) {
            unsafe {
                let ptr =
                    GetWindowLongPtrW(self.hwnd, GWLP_USERDATA) as *mut mpsc::Sender<WindowEvent>;
                if !ptr.is_null() {
                    SetWindowLongPtrW(self.hwnd, GWLP_USERDATA, 0);
                    drop(Box::from_raw(ptr));
                }
                let _ = DestroyWindow(self.hwnd);
            }
        }
    }
}

#[cfg(target_os = "windows")]
pub use platform::*;

// ── Non-Windows stub ─────────────────────────────────────────────

#[cfg(not(target_os = "windows"))]
pub mod stub {
    use super::WindowEvent;

    pub struct NativeWindow;

    impl NativeWindow {
        pub fn create(_title: &str, _w: u32, _h: u32, _fullscreen: bool) -> Result<Self, String> {
            Err("window creation is only supported on Windows".into())
        }

        pub fn poll_events(&mut self) -> Vec<WindowEvent> {
            Vec::new()
        }

        pub fn size(&self) -> (u32, u32) {
            (0, 0)
        }
    }
}

#[cfg(not(target_os = "windows"))]
pub use stub::*;
