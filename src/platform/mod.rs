//! Platform abstraction for overlay windows
//!
//! Everything OS-specific sits behind the seams in this module: the
//! overlay window surface, the factory that realizes one per profile, the
//! modal area selector, and the event stream the backend feeds into the
//! main loop. The mode machine, capture loop, and manager stay
//! platform-neutral; `x11` is the one real implementation.

pub mod x11;

use anyhow::Result;

use crate::capture::FrameData;
use crate::geometry::{LogicalPoint, LogicalRect, LogicalSize};
use crate::profile::Profile;

/// Opaque window identity, used to route backend events to instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(pub u32);

/// Background of an overlay window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundFill {
    /// Fully transparent (the Passive setting).
    Clear,
    /// Alpha of about 1/255: invisible in practice but keeps the whole
    /// surface hit-testable so Interactive drag-moves work anywhere on
    /// the window.
    Faint,
}

/// One realized overlay window.
///
/// All geometry at this boundary is logical; implementations convert to
/// device pixels with their own cached DPI scale.
pub trait OverlaySurface {
    fn id(&self) -> WindowId;

    /// DPI scale sampled when the window was realized; never re-queried.
    fn dpi_scale(&self) -> f64;

    fn set_click_through(&mut self, enabled: bool) -> Result<()>;

    fn bring_to_foreground(&mut self) -> Result<()>;

    fn set_visible(&mut self, visible: bool) -> Result<()>;

    fn set_opacity(&mut self, opacity: f64) -> Result<()>;

    /// Show or hide the Interactive chrome (highlight border and name
    /// label).
    fn set_chrome_visible(&mut self, visible: bool) -> Result<()>;

    fn set_background_fill(&mut self, fill: BackgroundFill) -> Result<()>;

    fn move_to(&mut self, position: LogicalPoint) -> Result<()>;

    fn resize(&mut self, size: LogicalSize) -> Result<()>;

    /// Current window origin in logical desktop coordinates.
    fn position(&self) -> Result<LogicalPoint>;

    /// Publish a captured frame, scaled to the current window size.
    fn present(&mut self, frame: &FrameData) -> Result<()>;

    /// Repaint from the last presented frame (expose handling).
    fn redraw(&mut self) -> Result<()>;
}

/// Realizes overlay windows for newly activated profiles.
pub trait SurfaceFactory<'a> {
    fn create_surface(&mut self, profile: &Profile) -> Result<Box<dyn OverlaySurface + 'a>>;
}

/// Modal drag-rectangle selection. Blocks its caller until the user
/// accepts or cancels.
pub trait AreaSelector {
    /// `None` means the user cancelled; an accepted rectangle is
    /// non-empty, in logical desktop coordinates.
    fn select(&mut self) -> Result<Option<LogicalRect>>;
}

/// Keyboard commands recognized while a window is Interactive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    /// Shift+W
    ReselectRegion,
    /// Shift+Q
    ToggleHide,
    /// Shift+E
    Deactivate,
    /// Shift+Up
    ScaleUp,
    /// Shift+Down
    ScaleDown,
    /// Shift+Right
    OpacityUp,
    /// Shift+Left
    OpacityDown,
    /// Plain arrows
    NudgeLeft,
    NudgeRight,
    NudgeUp,
    NudgeDown,
}

/// Input and lifecycle events the backend hands to the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    FocusGained(WindowId),
    FocusLost(WindowId),
    Key {
        window: WindowId,
        command: KeyCommand,
    },
    ButtonPressed {
        window: WindowId,
        button: u8,
        root_x: i16,
        root_y: i16,
    },
    ButtonReleased {
        window: WindowId,
        button: u8,
    },
    PointerMoved {
        window: WindowId,
        root_x: i16,
        root_y: i16,
    },
    CloseRequested(WindowId),
    Exposed(WindowId),
}
