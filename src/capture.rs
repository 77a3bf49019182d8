//! Capture scheduling and the screen-pixel source seam
//!
//! The capture loop is a fixed 16 ms cadence per overlay. Scheduling
//! lives here; the pixels come from a `CaptureProvider` behind a trait so
//! the loop logic never touches the display server directly. A provider
//! failure halts the owning loop outright — re-arming is an explicit act
//! (region reselection or a Passive-mode re-entry), never a retry.

use std::time::{Duration, Instant};
use thiserror::Error;

use crate::constants::capture;
use crate::geometry::PhysicalRect;

/// One captured frame: tightly packed 32-bit BGRA rows, top to bottom.
#[derive(Debug, Clone)]
pub struct FrameData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Why a capture request failed. Any of these halts the owning loop.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture rectangle {0} has zero area")]
    ZeroArea(PhysicalRect),
    #[error("capture rectangle {rect} lies outside the screen ({screen_width}x{screen_height})")]
    OutOfBounds {
        rect: PhysicalRect,
        screen_width: u32,
        screen_height: u32,
    },
    #[error("screen capture failed: {0}")]
    Backend(String),
}

/// Source of screen pixels for a physical rectangle.
pub trait CaptureProvider {
    fn capture(&mut self, rect: PhysicalRect) -> Result<FrameData, CaptureError>;
}

/// Fixed-period tick scheduler for one capture loop.
///
/// Stopped/running is binary: a restart always begins a fresh cycle from
/// now, and there is no catch-up for ticks missed while the queue was
/// busy.
#[derive(Debug, Clone)]
pub struct CaptureTimer {
    interval: Duration,
    next_tick: Option<Instant>,
}

impl CaptureTimer {
    pub fn new() -> Self {
        Self {
            interval: Duration::from_millis(capture::INTERVAL_MS),
            next_tick: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Arm the timer; the first tick lands one interval from now.
    /// Starting while already running also begins a fresh cycle.
    pub fn start(&mut self, now: Instant) {
        self.next_tick = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.next_tick = None;
    }

    /// Deadline of the next tick, if running.
    pub fn deadline(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Consume a due tick. The next deadline is measured from `now`, not
    /// from the missed slot, so a stalled queue never burst-fires.
    pub fn tick_due(&mut self, now: Instant) -> bool {
        match self.next_tick {
            Some(deadline) if now >= deadline => {
                self.next_tick = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

impl Default for CaptureTimer {
    fn default() -> Self {
        Self::new()
    }
}
