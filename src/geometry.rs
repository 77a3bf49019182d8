//! Logical/physical geometry and the DPI-aware profile transform
//!
//! Profiles store geometry in logical (DPI-independent) desktop pixels; a
//! live overlay samples a physical-pixel rectangle. The two directions of
//! the mapping deliberately round differently: the forward pass floors,
//! the inverse takes the ceiling. A fold of a freshly applied rectangle
//! then lands back on the original area (exactly for scales >= 1, within
//! one logical pixel below that), so repeated apply/fold cycles settle
//! instead of drifting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned rectangle in logical desktop pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogicalRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Point in logical desktop pixels. Fractional because window positions
/// survive scale arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LogicalPoint {
    pub x: f64,
    pub y: f64,
}

/// Width/height of an overlay window in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicalSize {
    pub width: f64,
    pub height: f64,
}

/// Axis-aligned rectangle in physical screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl LogicalRect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn origin(&self) -> LogicalPoint {
        LogicalPoint {
            x: self.x as f64,
            y: self.y as f64,
        }
    }

    /// Forward transform: the physical region sampled each capture tick.
    pub fn to_capture_rect(&self, dpi_scale: f64) -> PhysicalRect {
        PhysicalRect {
            x: (self.x as f64 * dpi_scale).floor() as i32,
            y: (self.y as f64 * dpi_scale).floor() as i32,
            width: (self.width.max(0) as f64 * dpi_scale).floor() as u32,
            height: (self.height.max(0) as f64 * dpi_scale).floor() as u32,
        }
    }

    /// Forward transform: the on-screen overlay size. Scale factor only;
    /// display size is never DPI-scaled.
    pub fn display_size(&self, scale_factor: f64) -> LogicalSize {
        LogicalSize {
            width: self.width.max(0) as f64 * scale_factor,
            height: self.height.max(0) as f64 * scale_factor,
        }
    }
}

impl LogicalPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

impl PhysicalRect {
    pub fn has_area(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Whether the rectangle lies fully inside a screen of the given size
    /// rooted at the origin.
    pub fn fits_within(&self, screen_width: u32, screen_height: u32) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.x as i64 + self.width as i64 <= screen_width as i64
            && self.y as i64 + self.height as i64 <= screen_height as i64
    }

    /// Inverse transform: recover the logical capture area from a physical
    /// rectangle. The ceiling compensates for the floor taken on the way
    /// in, so a fold of a freshly applied rect reproduces the original
    /// area.
    pub fn to_capture_area(&self, dpi_scale: f64) -> LogicalRect {
        LogicalRect {
            x: (self.x as f64 / dpi_scale).ceil() as i32,
            y: (self.y as f64 / dpi_scale).ceil() as i32,
            width: (self.width as f64 / dpi_scale).ceil() as i32,
            height: (self.height as f64 / dpi_scale).ceil() as i32,
        }
    }
}

impl fmt::Display for PhysicalRect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}
