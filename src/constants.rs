//! Application-wide constants
//!
//! This module contains all magic numbers and string literals used throughout
//! the application, providing a single source of truth for constant values.

/// Capture loop timing constants
pub mod capture {
    /// Capture tick period in milliseconds (~60 Hz)
    pub const INTERVAL_MS: u64 = 16;
}

/// Overlay window behavior constants
pub mod window {
    /// Live opacity applied while temporarily hidden (near-invisible, still findable)
    pub const HIDDEN_OPACITY: f64 = 0.05;

    /// Alpha of the Interactive-mode background fill (minimal, keeps the surface draggable)
    pub const FAINT_BACKGROUND_ALPHA: u8 = 1;

    /// Opacity change per Shift+Left/Right press
    pub const OPACITY_STEP: f64 = 0.05;

    /// Scale factor change per Shift+Up/Down press
    pub const SCALE_STEP: f64 = 0.1;

    /// Window nudge distance per arrow press, logical pixels
    pub const NUDGE_STEP: f64 = 1.0;

    /// Highlight border thickness in physical pixels
    pub const BORDER_WIDTH: u16 = 2;

    /// Highlight border color (ARGB, light blue)
    pub const BORDER_COLOR: u32 = 0xFF_4A_A8_FF;

    /// Label text color (ARGB, white)
    pub const LABEL_COLOR: u32 = 0xFF_FF_FF_FF;

    /// Label text size in pixels
    pub const LABEL_SIZE: f32 = 14.0;

    /// Label inset from the window's top-left corner, physical pixels
    pub const LABEL_MARGIN: i16 = 6;
}

/// Profile validation bounds
pub mod validation {
    /// Lowest persisted opacity level
    pub const MIN_OPACITY: f64 = 0.0;

    /// Highest persisted opacity level
    pub const MAX_OPACITY: f64 = 1.0;

    /// Lowest usable display scale factor
    pub const MIN_SCALE: f64 = 0.1;

    /// Highest usable display scale factor
    pub const MAX_SCALE: f64 = 8.0;
}

/// Configuration file location constants
pub mod config {
    /// Subdirectory under the user config dir
    pub const APP_DIR: &str = "region-mirror";

    /// Profile list file name
    pub const PROFILES_FILENAME: &str = "profiles.json";
}

/// Control socket constants
pub mod ipc {
    /// Subdirectory under XDG_RUNTIME_DIR
    pub const SOCKET_DIR: &str = "region-mirror";

    /// Control socket file name
    pub const SOCKET_FILENAME: &str = "control.sock";

    /// Upper bound on a framed request/response body in bytes
    pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;
}

/// X11 protocol and rendering constants
pub mod x11 {
    /// ARGB color depth (32-bit: 8 bits each for Alpha, Red, Green, Blue)
    pub const ARGB_DEPTH: u8 = 32;

    /// Source indication for _NET_ACTIVE_WINDOW (2 = pager/direct user action)
    pub const ACTIVE_WINDOW_SOURCE_PAGER: u32 = 2;

    /// _NET_WM_WINDOW_OPACITY value for a fully opaque window
    pub const OPACITY_OPAQUE: u32 = u32::MAX;

    /// Baseline Xft.dpi value corresponding to a DPI scale of 1.0
    pub const DPI_BASE: f64 = 96.0;

    /// Rows uploaded per PutImage request when transferring a frame
    pub const PUT_IMAGE_ROW_CHUNK: u16 = 64;
}

/// Mouse button constants
pub mod mouse {
    /// Left mouse button number
    pub const BUTTON_LEFT: u8 = 1;
}

/// X11 keysym values for the Interactive-mode key commands
pub mod keys {
    /// Latin lowercase w
    pub const XK_W: u32 = 0x0077;

    /// Latin lowercase q
    pub const XK_Q: u32 = 0x0071;

    /// Latin lowercase e
    pub const XK_E: u32 = 0x0065;

    /// Cursor left
    pub const XK_LEFT: u32 = 0xff51;

    /// Cursor up
    pub const XK_UP: u32 = 0xff52;

    /// Cursor right
    pub const XK_RIGHT: u32 = 0xff53;

    /// Cursor down
    pub const XK_DOWN: u32 = 0xff54;

    /// Escape
    pub const XK_ESCAPE: u32 = 0xff1b;
}

/// Area selector appearance constants
pub mod selection {
    /// Backdrop dimming color (ARGB, mostly transparent black)
    pub const DIM_COLOR: u32 = 0x50_00_00_00;

    /// Selection band fill color (ARGB, translucent light blue)
    pub const BAND_FILL_COLOR: u32 = 0x30_4A_A8_FF;

    /// Selection band outline color (ARGB, opaque light blue)
    pub const BAND_EDGE_COLOR: u32 = 0xFF_4A_A8_FF;

    /// Selection band outline thickness in physical pixels
    pub const BAND_EDGE_WIDTH: u16 = 1;
}

/// Fixed-point arithmetic constants (X11 render transforms)
pub mod fixed_point {
    /// Fixed-point multiplier for conversion (2^16)
    pub const MULTIPLIER: f32 = 65536.0;
}
