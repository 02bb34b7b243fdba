//! Shared frame types used between pipeline stages.
//!
//! [`RawScreenFrame`] is the uncompressed pixel buffer exchanged with the
//! capture source, the frame codec and the render sink. It never crosses
//! the wire directly; the sender compresses it into an envelope payload.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for raw frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Blue, Green, Red, Alpha (GDI default).
    Bgra8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 3 bytes per pixel: Blue, Green, Red.
    Bgr8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Bgr8 => 3,
        }
    }

    /// Tag used by the frame codec's image header.
    pub const fn tag(self) -> u8 {
        match self {
            PixelFormat::Bgra8 => 0,
            PixelFormat::Rgba8 => 1,
            PixelFormat::Bgr8 => 2,
        }
    }

    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(PixelFormat::Bgra8),
            1 => Some(PixelFormat::Rgba8),
            2 => Some(PixelFormat::Bgr8),
            _ => None,
        }
    }
}

// ── RawScreenFrame ───────────────────────────────────────────────

/// A raw, uncompressed frame.
///
/// The `data` buffer holds `height` rows of `stride` bytes each.
/// `stride` may be larger than `width * bytes_per_pixel` when the capture
/// API pads rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawScreenFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row pitch in **bytes** (may exceed `width * bpp`).
    pub stride: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Raw pixel data, `stride * height` bytes.
    pub data: Vec<u8>,
}

impl RawScreenFrame {
    /// Build a tightly packed frame (`stride == width * bpp`).
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        let stride = width * format.bytes_per_pixel() as u32;
        Self {
            width,
            height,
            stride,
            format,
            data,
        }
    }

    /// A frame with no pixels, as returned by a capture that produced
    /// nothing.
    pub fn empty(format: PixelFormat) -> Self {
        Self::packed(0, 0, format, Vec::new())
    }

    /// Whether the frame carries no usable pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.len() < self.byte_len()
    }

    /// Total byte size the bitmap occupies.
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    /// Returns a row slice without padding bytes.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        let len = self.width as usize * self.format.bytes_per_pixel();
        &self.data[start..start + len]
    }

    /// Copy all rows into a tightly packed buffer.
    pub fn packed_rows(&self) -> Vec<u8> {
        let row_len = self.width as usize * self.format.bytes_per_pixel();
        if self.stride as usize == row_len {
            return self.data[..self.byte_len()].to_vec();
        }
        let mut out = Vec::with_capacity(row_len * self.height as usize);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }

    /// Nearest-neighbour resize into a new, tightly packed frame.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let bpp = self.format.bytes_per_pixel();
        let mut data = Vec::with_capacity(width as usize * height as usize * bpp);
        if self.is_empty() || width == 0 || height == 0 {
            return Self::packed(width, height, self.format, data);
        }

        // Source column offsets are the same for every row.
        let columns: Vec<usize> = (0..width as u64)
            .map(|x| (x * self.width as u64 / width as u64) as usize * bpp)
            .collect();

        for y in 0..height as u64 {
            let sy = (y * self.height as u64 / height as u64) as u32;
            let src = self.row(sy);
            for &offset in &columns {
                data.extend_from_slice(&src[offset..offset + bpp]);
            }
        }
        Self::packed(width, height, self.format, data)
    }
}

// ── Resolution ───────────────────────────────────────────────────

/// Target resolution the sender scales captured frames to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    /// Keep the capture source's native size.
    #[default]
    #[serde(rename = "native")]
    Native,
    #[serde(rename = "2160p")]
    Uhd2160,
    #[serde(rename = "1080p")]
    Fhd1080,
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "800x600")]
    Svga,
    #[serde(rename = "640x480")]
    Vga,
}

impl Resolution {
    /// Map a numeric window-mode preset (1..=5) to a resolution.
    /// Anything else means native.
    pub fn from_preset(preset: u8) -> Self {
        match preset {
            1 => Resolution::Uhd2160,
            2 => Resolution::Fhd1080,
            3 => Resolution::Hd720,
            4 => Resolution::Svga,
            5 => Resolution::Vga,
            _ => Resolution::Native,
        }
    }

    /// Fixed dimensions, or `None` for [`Resolution::Native`].
    pub const fn dimensions(self) -> Option<(u32, u32)> {
        match self {
            Resolution::Native => None,
            Resolution::Uhd2160 => Some((3840, 2160)),
            Resolution::Fhd1080 => Some((1920, 1080)),
            Resolution::Hd720 => Some((1280, 720)),
            Resolution::Svga => Some((800, 600)),
            Resolution::Vga => Some((640, 480)),
        }
    }

    /// Resolve against the capture source's native size.
    pub fn resolve(self, native: (u32, u32)) -> (u32, u32) {
        self.dimensions().unwrap_or(native)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Resolution::Native => "native",
            Resolution::Uhd2160 => "2160p",
            Resolution::Fhd1080 => "1080p",
            Resolution::Hd720 => "720p",
            Resolution::Svga => "800x600",
            Resolution::Vga => "640x480",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Resolution {
    type Err = String;

    /// Accepts a preset name (`1080p`, `native`, ...) or a preset index.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(preset) = s.parse::<u8>() {
            return Ok(Self::from_preset(preset));
        }
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Resolution::Native),
            "2160p" | "3840x2160" => Ok(Resolution::Uhd2160),
            "1080p" | "1920x1080" => Ok(Resolution::Fhd1080),
            "720p" | "1280x720" => Ok(Resolution::Hd720),
            "800x600" => Ok(Resolution::Svga),
            "640x480" => Ok(Resolution::Vga),
            other => Err(format!("unknown resolution preset: {other}")),
        }
    }
}

// ── Clock ────────────────────────────────────────────────────────

/// Milliseconds since the Unix epoch, as carried in envelope timestamps.
pub fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// ── Tests ────────────────────────────────────────────────────────
