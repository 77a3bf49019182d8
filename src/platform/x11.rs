//! X11 implementation of the platform seams
//!
//! One `RustConnection` serves every overlay window, the capture
//! provider, and the modal area selector. Overlay windows are managed by
//! the window manager (focus and close participation) but undecorated
//! via Motif hints; transparency needs a 32-bit TrueColor visual and a
//! running compositor. Frames are uploaded to a retained pixmap and
//! composited onto the window with a RENDER scale transform.

use anyhow::{bail, Context, Result};
use tracing::{debug, error, info, warn};
use x11rb::connection::Connection;
use x11rb::protocol::render::{
    Color, ConnectionExt as RenderExt, CreatePictureAux, Fixed, PictOp, Pictformat, Picture,
    Transform,
};
use x11rb::protocol::shape::{self, ConnectionExt as ShapeExt};
use x11rb::protocol::xproto::*;
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as WrapperExt;

use crate::capture::{CaptureError, CaptureProvider, FrameData};
use crate::constants::window::{
    BORDER_COLOR, BORDER_WIDTH, FAINT_BACKGROUND_ALPHA, LABEL_COLOR, LABEL_MARGIN,
};
use crate::constants::{fixed_point, keys, mouse, selection, x11};
use crate::font::LabelRenderer;
use crate::geometry::{LogicalPoint, LogicalRect, LogicalSize, PhysicalRect};
use crate::platform::{
    AreaSelector, BackendEvent, BackgroundFill, KeyCommand, OverlaySurface, SurfaceFactory,
    WindowId,
};
use crate::profile::Profile;

/// Pre-cached X11 atoms to avoid repeated roundtrips
#[derive(Debug, Clone, Copy)]
pub struct CachedAtoms {
    pub wm_protocols: Atom,
    pub wm_delete_window: Atom,
    pub motif_wm_hints: Atom,
    pub utf8_string: Atom,
    pub net_wm_name: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_above: Atom,
    pub net_wm_state_skip_taskbar: Atom,
    pub net_wm_state_skip_pager: Atom,
    pub net_wm_window_opacity: Atom,
    pub net_active_window: Atom,
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        // Do all intern_atom roundtrips once at startup
        Ok(Self {
            wm_protocols: conn
                .intern_atom(false, b"WM_PROTOCOLS")
                .context("Failed to intern WM_PROTOCOLS atom")?
                .reply()
                .context("Failed to get reply for WM_PROTOCOLS atom")?
                .atom,
            wm_delete_window: conn
                .intern_atom(false, b"WM_DELETE_WINDOW")
                .context("Failed to intern WM_DELETE_WINDOW atom")?
                .reply()
                .context("Failed to get reply for WM_DELETE_WINDOW atom")?
                .atom,
            motif_wm_hints: conn
                .intern_atom(false, b"_MOTIF_WM_HINTS")
                .context("Failed to intern _MOTIF_WM_HINTS atom")?
                .reply()
                .context("Failed to get reply for _MOTIF_WM_HINTS atom")?
                .atom,
            utf8_string: conn
                .intern_atom(false, b"UTF8_STRING")
                .context("Failed to intern UTF8_STRING atom")?
                .reply()
                .context("Failed to get reply for UTF8_STRING atom")?
                .atom,
            net_wm_name: conn
                .intern_atom(false, b"_NET_WM_NAME")
                .context("Failed to intern _NET_WM_NAME atom")?
                .reply()
                .context("Failed to get reply for _NET_WM_NAME atom")?
                .atom,
            net_wm_state: conn
                .intern_atom(false, b"_NET_WM_STATE")
                .context("Failed to intern _NET_WM_STATE atom")?
                .reply()
                .context("Failed to get reply for _NET_WM_STATE atom")?
                .atom,
            net_wm_state_above: conn
                .intern_atom(false, b"_NET_WM_STATE_ABOVE")
                .context("Failed to intern _NET_WM_STATE_ABOVE atom")?
                .reply()
                .context("Failed to get reply for _NET_WM_STATE_ABOVE atom")?
                .atom,
            net_wm_state_skip_taskbar: conn
                .intern_atom(false, b"_NET_WM_STATE_SKIP_TASKBAR")
                .context("Failed to intern _NET_WM_STATE_SKIP_TASKBAR atom")?
                .reply()
                .context("Failed to get reply for _NET_WM_STATE_SKIP_TASKBAR atom")?
                .atom,
            net_wm_state_skip_pager: conn
                .intern_atom(false, b"_NET_WM_STATE_SKIP_PAGER")
                .context("Failed to intern _NET_WM_STATE_SKIP_PAGER atom")?
                .reply()
                .context("Failed to get reply for _NET_WM_STATE_SKIP_PAGER atom")?
                .atom,
            net_wm_window_opacity: conn
                .intern_atom(false, b"_NET_WM_WINDOW_OPACITY")
                .context("Failed to intern _NET_WM_WINDOW_OPACITY atom")?
                .reply()
                .context("Failed to get reply for _NET_WM_WINDOW_OPACITY atom")?
                .atom,
            net_active_window: conn
                .intern_atom(false, b"_NET_ACTIVE_WINDOW")
                .context("Failed to intern _NET_ACTIVE_WINDOW atom")?
                .reply()
                .context("Failed to get reply for _NET_ACTIVE_WINDOW atom")?
                .atom,
        })
    }
}

pub fn to_fixed(v: f32) -> Fixed {
    (v * fixed_point::MULTIPLIER).round() as Fixed
}

pub fn get_pictformat(conn: &RustConnection, depth: u8, alpha: bool) -> Result<Pictformat> {
    if let Some(format) = conn
        .render_query_pict_formats()
        .context("Failed to query RENDER picture formats")?
        .reply()
        .context("Failed to get reply for RENDER picture formats query")?
        .formats
        .iter()
        .find(|format| {
            format.depth == depth
                && if alpha {
                    format.direct.alpha_mask != 0
                } else {
                    format.direct.alpha_mask == 0
                }
        })
    {
        debug!(
            "using Pictformat: depth={}, alpha_mask={}",
            format.depth, format.direct.alpha_mask
        );
        Ok(format.id)
    } else {
        bail!(
            "Could not find suitable picture format (depth={}, alpha={}). Check RENDER extension support.",
            depth,
            alpha
        )
    }
}

/// ARGB word to a RENDER color, premultiplying by alpha as the protocol
/// expects.
fn render_color(argb: u32) -> Color {
    let alpha = (argb >> 24) & 0xFF;
    let scale = |component: u32| (component * 257 * alpha / 255) as u16;
    Color {
        red: scale((argb >> 16) & 0xFF),
        green: scale((argb >> 8) & 0xFF),
        blue: scale(argb & 0xFF),
        alpha: (alpha * 257) as u16,
    }
}

/// Four rectangles tiling a frame of the given thickness just inside
/// the box.
fn frame_rectangles(x: i16, y: i16, width: u16, height: u16, thickness: u16) -> [Rectangle; 4] {
    let t = thickness.min(width / 2).min(height / 2).max(1);
    let inner = height.saturating_sub(2 * t);
    [
        Rectangle {
            x,
            y,
            width,
            height: t,
        },
        Rectangle {
            x,
            y: y + (height - t) as i16,
            width,
            height: t,
        },
        Rectangle {
            x,
            y: y + t as i16,
            width: t,
            height: inner,
        },
        Rectangle {
            x: x + (width - t) as i16,
            y: y + t as i16,
            width: t,
            height: inner,
        },
    ]
}

/// Normalize two drag endpoints (physical root pixels) into a band.
fn band_between(origin: (i16, i16), current: (i16, i16)) -> Rectangle {
    Rectangle {
        x: origin.0.min(current.0),
        y: origin.1.min(current.1),
        width: origin.0.abs_diff(current.0),
        height: origin.1.abs_diff(current.1),
    }
}

fn parse_xft_dpi(resources: &str) -> Option<f64> {
    for line in resources.lines() {
        if let Some(value) = line.strip_prefix("Xft.dpi:")
            && let Ok(dpi) = value.trim().parse::<f64>()
            && dpi > 0.0
        {
            return Some(dpi);
        }
    }
    None
}

/// Read the DPI scale from the root RESOURCE_MANAGER `Xft.dpi` entry.
/// Absent or unparsable entries mean a scale of 1.0.
fn sample_dpi_scale(conn: &RustConnection, screen: &Screen) -> Result<f64> {
    let prop = conn
        .get_property(
            false,
            screen.root,
            AtomEnum::RESOURCE_MANAGER,
            AtomEnum::STRING,
            0,
            u32::MAX,
        )
        .context("Failed to query RESOURCE_MANAGER property")?
        .reply()
        .context("Failed to get reply for RESOURCE_MANAGER query")?;
    let resources = String::from_utf8_lossy(&prop.value);
    Ok(parse_xft_dpi(&resources).map_or(1.0, |dpi| dpi / x11::DPI_BASE))
}

fn command_for(keysym: u32, shift: bool) -> Option<KeyCommand> {
    match (keysym, shift) {
        (keys::XK_W, true) => Some(KeyCommand::ReselectRegion),
        (keys::XK_Q, true) => Some(KeyCommand::ToggleHide),
        (keys::XK_E, true) => Some(KeyCommand::Deactivate),
        (keys::XK_UP, true) => Some(KeyCommand::ScaleUp),
        (keys::XK_DOWN, true) => Some(KeyCommand::ScaleDown),
        (keys::XK_RIGHT, true) => Some(KeyCommand::OpacityUp),
        (keys::XK_LEFT, true) => Some(KeyCommand::OpacityDown),
        (keys::XK_LEFT, false) => Some(KeyCommand::NudgeLeft),
        (keys::XK_RIGHT, false) => Some(KeyCommand::NudgeRight),
        (keys::XK_UP, false) => Some(KeyCommand::NudgeUp),
        (keys::XK_DOWN, false) => Some(KeyCommand::NudgeDown),
        _ => None,
    }
}

/// Keycode-to-keysym table fetched once at startup.
#[derive(Debug, Clone)]
struct KeyMap {
    min_keycode: u8,
    keysyms_per_keycode: u8,
    keysyms: Vec<u32>,
}

impl KeyMap {
    fn new(conn: &RustConnection) -> Result<Self> {
        let setup = conn.setup();
        let min_keycode = setup.min_keycode;
        let count = setup.max_keycode - setup.min_keycode + 1;
        let reply = conn
            .get_keyboard_mapping(min_keycode, count)
            .context("Failed to query keyboard mapping")?
            .reply()
            .context("Failed to get reply for keyboard mapping query")?;
        Ok(Self {
            min_keycode,
            keysyms_per_keycode: reply.keysyms_per_keycode,
            keysyms: reply.keysyms,
        })
    }

    /// Unshifted keysym for a keycode. Shift state is handled separately
    /// from the event's modifier mask.
    fn lookup(&self, keycode: u8) -> Option<u32> {
        let index = usize::from(keycode.checked_sub(self.min_keycode)?)
            * usize::from(self.keysyms_per_keycode);
        self.keysyms.get(index).copied()
    }
}

/// Which visual new top-level windows use.
#[derive(Debug, Clone, Copy)]
struct VisualConfig {
    depth: u8,
    visual_id: Visualid,
    argb: bool,
}

fn choose_visual(screen: &Screen) -> VisualConfig {
    for depth in &screen.allowed_depths {
        if depth.depth == x11::ARGB_DEPTH {
            for visual in &depth.visuals {
                if visual.class == VisualClass::TRUE_COLOR {
                    return VisualConfig {
                        depth: x11::ARGB_DEPTH,
                        visual_id: visual.visual_id,
                        argb: true,
                    };
                }
            }
        }
    }
    warn!("no 32-bit TrueColor visual, overlay transparency disabled");
    VisualConfig {
        depth: screen.root_depth,
        visual_id: screen.root_visual,
        argb: false,
    }
}

/// RENDER picture formats resolved once at startup.
#[derive(Debug, Clone, Copy)]
struct PictFormats {
    /// Depth-32 format with alpha; absent on servers without ARGB
    /// support, which also disables label sprites.
    argb: Option<Pictformat>,
    /// Root-depth format without alpha, used for captured frames.
    opaque: Pictformat,
}

/// Shared X11 state behind the platform seams. Implements the surface
/// factory and the capture provider; `selector()` derives the area
/// selector.
pub struct X11Backend<'a> {
    conn: &'a RustConnection,
    screen: &'a Screen,
    atoms: CachedAtoms,
    dpi_scale: f64,
    visual: VisualConfig,
    formats: PictFormats,
    keymap: KeyMap,
    label_renderer: Option<&'a LabelRenderer>,
}

impl<'a> X11Backend<'a> {
    pub fn new(
        conn: &'a RustConnection,
        screen: &'a Screen,
        label_renderer: Option<&'a LabelRenderer>,
    ) -> Result<Self> {
        conn.shape_query_version()
            .context("Failed to query SHAPE extension")?
            .reply()
            .context("SHAPE extension missing (required for click-through overlays)")?;

        let atoms = CachedAtoms::new(conn)?;
        let keymap = KeyMap::new(conn)?;
        let visual = choose_visual(screen);
        let opaque = get_pictformat(conn, screen.root_depth, false)?;
        let argb = match get_pictformat(conn, x11::ARGB_DEPTH, true) {
            Ok(format) => Some(format),
            Err(e) => {
                warn!(error = %e, "no ARGB picture format, name labels disabled");
                None
            }
        };
        let dpi_scale = sample_dpi_scale(conn, screen)?;
        info!(
            dpi_scale,
            argb = visual.argb,
            screen = format!(
                "{}x{}",
                screen.width_in_pixels, screen.height_in_pixels
            ),
            "x11 backend initialized"
        );

        Ok(Self {
            conn,
            screen,
            atoms,
            dpi_scale,
            visual,
            formats: PictFormats { argb, opaque },
            keymap,
            label_renderer,
        })
    }

    /// A modal area selector sharing this backend's connection. Created
    /// separately so selection and surface creation can be borrowed
    /// independently.
    pub fn selector(&self) -> X11RegionSelector<'a> {
        X11RegionSelector {
            conn: self.conn,
            screen: self.screen,
            visual: self.visual,
            formats: self.formats,
            dpi_scale: self.dpi_scale,
            keymap: self.keymap.clone(),
        }
    }

    /// Drain one pending X event, translated for the main loop. Events
    /// with no backend meaning are swallowed.
    pub fn poll_event(&self) -> Result<Option<BackendEvent>> {
        while let Some(event) = self
            .conn
            .poll_for_event()
            .context("Failed to poll for X11 event")?
        {
            if let Some(translated) = self.translate_event(&event) {
                return Ok(Some(translated));
            }
        }
        Ok(None)
    }

    fn translate_event(&self, event: &Event) -> Option<BackendEvent> {
        match event {
            // Grab-induced focus flips (area selection) are not mode
            // changes.
            Event::FocusIn(e) if e.mode == NotifyMode::NORMAL => {
                Some(BackendEvent::FocusGained(WindowId(e.event)))
            }
            Event::FocusOut(e) if e.mode == NotifyMode::NORMAL => {
                Some(BackendEvent::FocusLost(WindowId(e.event)))
            }
            Event::KeyPress(e) => {
                let keysym = self.keymap.lookup(e.detail)?;
                let shift = e.state.contains(KeyButMask::SHIFT);
                Some(BackendEvent::Key {
                    window: WindowId(e.event),
                    command: command_for(keysym, shift)?,
                })
            }
            Event::ButtonPress(e) => Some(BackendEvent::ButtonPressed {
                window: WindowId(e.event),
                button: e.detail,
                root_x: e.root_x,
                root_y: e.root_y,
            }),
            Event::ButtonRelease(e) => Some(BackendEvent::ButtonReleased {
                window: WindowId(e.event),
                button: e.detail,
            }),
            Event::MotionNotify(e) => Some(BackendEvent::PointerMoved {
                window: WindowId(e.event),
                root_x: e.root_x,
                root_y: e.root_y,
            }),
            Event::ClientMessage(e)
                if e.format == 32
                    && e.type_ == self.atoms.wm_protocols
                    && e.data.as_data32()[0] == self.atoms.wm_delete_window =>
            {
                Some(BackendEvent::CloseRequested(WindowId(e.window)))
            }
            Event::Expose(e) if e.count == 0 => Some(BackendEvent::Exposed(WindowId(e.window))),
            Event::Error(e) => {
                error!("x11 error event: {e:?}");
                None
            }
            _ => None,
        }
    }
}

impl<'a> SurfaceFactory<'a> for X11Backend<'a> {
    fn create_surface(&mut self, profile: &Profile) -> Result<Box<dyn OverlaySurface + 'a>> {
        Ok(Box::new(X11Surface::create(self, profile)?))
    }
}

impl CaptureProvider for X11Backend<'_> {
    fn capture(&mut self, rect: PhysicalRect) -> Result<FrameData, CaptureError> {
        if !rect.has_area() {
            return Err(CaptureError::ZeroArea(rect));
        }
        let screen_width = u32::from(self.screen.width_in_pixels);
        let screen_height = u32::from(self.screen.height_in_pixels);
        if !rect.fits_within(screen_width, screen_height) {
            return Err(CaptureError::OutOfBounds {
                rect,
                screen_width,
                screen_height,
            });
        }

        let reply = self
            .conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                self.screen.root,
                rect.x as i16,
                rect.y as i16,
                rect.width as u16,
                rect.height as u16,
                u32::MAX,
            )
            .map_err(|e| CaptureError::Backend(e.to_string()))?
            .reply()
            .map_err(|e| CaptureError::Backend(e.to_string()))?;
        if reply.depth != self.screen.root_depth {
            return Err(CaptureError::Backend(format!(
                "unexpected image depth {} (root is {})",
                reply.depth, self.screen.root_depth
            )));
        }

        Ok(FrameData {
            width: rect.width,
            height: rect.height,
            data: reply.data,
        })
    }
}

/// Last uploaded frame, retained server-side for expose redraws.
struct FrameSprite {
    pixmap: Pixmap,
    picture: Picture,
    gc: Gcontext,
    width: u16,
    height: u16,
}

impl FrameSprite {
    fn free(&self, conn: &RustConnection) {
        if let Err(e) = conn.render_free_picture(self.picture) {
            error!("Failed to free frame picture {}: {}", self.picture, e);
        }
        if let Err(e) = conn.free_gc(self.gc) {
            error!("Failed to free frame GC {}: {}", self.gc, e);
        }
        if let Err(e) = conn.free_pixmap(self.pixmap) {
            error!("Failed to free frame pixmap {}: {}", self.pixmap, e);
        }
    }
}

/// Pre-rendered profile-name label, uploaded once at window creation.
struct LabelSprite {
    pixmap: Pixmap,
    picture: Picture,
    width: u16,
    height: u16,
}

impl LabelSprite {
    fn free(&self, conn: &RustConnection) {
        if let Err(e) = conn.render_free_picture(self.picture) {
            error!("Failed to free label picture {}: {}", self.picture, e);
        }
        if let Err(e) = conn.free_pixmap(self.pixmap) {
            error!("Failed to free label pixmap {}: {}", self.pixmap, e);
        }
    }
}

struct X11Surface<'a> {
    conn: &'a RustConnection,
    root: Window,
    atoms: CachedAtoms,
    dpi_scale: f64,
    frame_depth: u8,
    frame_format: Pictformat,
    window: Window,
    colormap: Option<Colormap>,
    width: u16,
    height: u16,
    window_picture: Picture,
    border_fill: Picture,
    label: Option<LabelSprite>,
    frame: Option<FrameSprite>,
    visible: bool,
    click_through: bool,
    chrome_visible: bool,
    name: String,
}

impl<'a> X11Surface<'a> {
    fn create(backend: &X11Backend<'a>, profile: &Profile) -> Result<Self> {
        let conn = backend.conn;
        let screen = backend.screen;
        let dpi_scale = backend.dpi_scale;

        let (x, y) = physical_position(profile.window_position, dpi_scale);
        let (width, height) =
            physical_size(profile.capture_area.display_size(profile.scale_factor), dpi_scale);
        info!(
            profile = %profile.name,
            x, y, width, height,
            "creating overlay window"
        );

        let colormap = if backend.visual.argb {
            let colormap = conn
                .generate_id()
                .context("Failed to generate ID for overlay colormap")?;
            conn.create_colormap(
                ColormapAlloc::NONE,
                colormap,
                screen.root,
                backend.visual.visual_id,
            )
            .context(format!(
                "Failed to create colormap for '{}'",
                profile.name
            ))?;
            Some(colormap)
        } else {
            None
        };

        let window = conn
            .generate_id()
            .context("Failed to generate X11 window ID")?;
        let mut aux = CreateWindowAux::new()
            .background_pixel(0)
            .border_pixel(0)
            .event_mask(
                EventMask::EXPOSURE
                    | EventMask::BUTTON_PRESS
                    | EventMask::BUTTON_RELEASE
                    | EventMask::POINTER_MOTION
                    | EventMask::KEY_PRESS
                    | EventMask::FOCUS_CHANGE,
            );
        if let Some(colormap) = colormap {
            aux = aux.colormap(colormap);
        }
        conn.create_window(
            backend.visual.depth,
            window,
            screen.root,
            x,
            y,
            width,
            height,
            0,
            WindowClass::INPUT_OUTPUT,
            backend.visual.visual_id,
            &aux,
        )
        .context(format!(
            "Failed to create overlay window for '{}'",
            profile.name
        ))?;

        // Cleanup guard that destroys the window if a later init step
        // fails, so half-built windows never leak.
        struct WindowGuard<'a> {
            conn: &'a RustConnection,
            window: Window,
            name: String,
            should_cleanup: bool,
        }

        impl Drop for WindowGuard<'_> {
            fn drop(&mut self) {
                if self.should_cleanup {
                    if let Err(e) = self.conn.destroy_window(self.window) {
                        error!(
                            "Failed to cleanup window {} for '{}' after initialization failure: {}",
                            self.window, self.name, e
                        );
                    }
                    let _ = self.conn.flush();
                }
            }
        }

        let mut window_guard = WindowGuard {
            conn,
            window,
            name: profile.name.clone(),
            should_cleanup: true,
        };

        Self::setup_window_properties(backend, window, &profile.name)?;

        let window_format = if backend.visual.argb {
            backend
                .formats
                .argb
                .context("ARGB visual without matching picture format")?
        } else {
            backend.formats.opaque
        };
        let window_picture = conn
            .generate_id()
            .context("Failed to generate ID for window picture")?;
        conn.render_create_picture(window_picture, window, window_format, &CreatePictureAux::new())
            .context(format!(
                "Failed to create window picture for '{}'",
                profile.name
            ))?;

        let border_fill = conn
            .generate_id()
            .context("Failed to generate ID for border fill picture")?;
        conn.render_create_solid_fill(border_fill, render_color(BORDER_COLOR))
            .context(format!(
                "Failed to create border fill for '{}'",
                profile.name
            ))?;

        let label = match (backend.label_renderer, backend.formats.argb) {
            (Some(renderer), Some(argb_format)) => {
                Self::build_label(conn, screen, argb_format, renderer, &profile.name)?
            }
            _ => None,
        };

        window_guard.should_cleanup = false;

        Ok(Self {
            conn,
            root: screen.root,
            atoms: backend.atoms,
            dpi_scale,
            frame_depth: screen.root_depth,
            frame_format: backend.formats.opaque,
            window,
            colormap,
            width,
            height,
            window_picture,
            border_fill,
            label,
            frame: None,
            visible: false,
            click_through: false,
            chrome_visible: false,
            name: profile.name.clone(),
        })
    }

    /// Undecorated, always-on-top, close-participating: the properties
    /// every overlay window carries.
    fn setup_window_properties(
        backend: &X11Backend<'_>,
        window: Window,
        name: &str,
    ) -> Result<()> {
        let conn = backend.conn;
        let atoms = &backend.atoms;

        // Motif hints: flags=DECORATIONS, decorations=0
        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.motif_wm_hints,
            atoms.motif_wm_hints,
            &[2, 0, 0, 0, 0],
        )
        .context(format!("Failed to set Motif hints for '{}'", name))?;

        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.net_wm_state,
            AtomEnum::ATOM,
            &[
                atoms.net_wm_state_above,
                atoms.net_wm_state_skip_taskbar,
                atoms.net_wm_state_skip_pager,
            ],
        )
        .context(format!("Failed to set window state for '{}'", name))?;

        conn.change_property32(
            PropMode::REPLACE,
            window,
            atoms.wm_protocols,
            AtomEnum::ATOM,
            &[atoms.wm_delete_window],
        )
        .context(format!("Failed to set WM_PROTOCOLS for '{}'", name))?;

        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_NAME,
            AtomEnum::STRING,
            name.as_bytes(),
        )
        .context(format!("Failed to set WM_NAME for '{}'", name))?;
        conn.change_property8(
            PropMode::REPLACE,
            window,
            atoms.net_wm_name,
            atoms.utf8_string,
            name.as_bytes(),
        )
        .context(format!("Failed to set _NET_WM_NAME for '{}'", name))?;

        conn.change_property8(
            PropMode::REPLACE,
            window,
            AtomEnum::WM_CLASS,
            AtomEnum::STRING,
            b"region-mirror\0region-mirror\0",
        )
        .context(format!("Failed to set WM_CLASS for '{}'", name))?;

        Ok(())
    }

    fn build_label(
        conn: &RustConnection,
        screen: &Screen,
        argb_format: Pictformat,
        renderer: &LabelRenderer,
        name: &str,
    ) -> Result<Option<LabelSprite>> {
        let rendered = renderer.render(name, LABEL_COLOR);
        if rendered.is_empty() {
            return Ok(None);
        }
        let width = rendered.width.min(usize::from(u16::MAX)) as u16;
        let height = rendered.height.min(usize::from(u16::MAX)) as u16;

        let pixmap = conn
            .generate_id()
            .context("Failed to generate ID for label pixmap")?;
        conn.create_pixmap(x11::ARGB_DEPTH, pixmap, screen.root, width, height)
            .context(format!("Failed to create label pixmap for '{}'", name))?;
        let gc = conn
            .generate_id()
            .context("Failed to generate ID for label GC")?;
        conn.create_gc(gc, pixmap, &CreateGCAux::new())
            .context(format!("Failed to create label GC for '{}'", name))?;

        // Convert Vec<u32> ARGB to bytes in X11 native format (little-endian BGRA)
        let mut image_data = Vec::with_capacity(rendered.data.len() * 4);
        for pixel in &rendered.data {
            image_data.push(*pixel as u8); // B
            image_data.push((pixel >> 8) as u8); // G
            image_data.push((pixel >> 16) as u8); // R
            image_data.push((pixel >> 24) as u8); // A
        }
        conn.put_image(
            ImageFormat::Z_PIXMAP,
            pixmap,
            gc,
            width,
            height,
            0,
            0,
            0,
            x11::ARGB_DEPTH,
            &image_data,
        )
        .context(format!("Failed to upload label image for '{}'", name))?;

        let picture = conn
            .generate_id()
            .context("Failed to generate ID for label picture")?;
        conn.render_create_picture(picture, pixmap, argb_format, &CreatePictureAux::new())
            .context(format!("Failed to create label picture for '{}'", name))?;
        if let Err(e) = conn.free_gc(gc) {
            error!("Failed to free label GC {}: {}", gc, e);
        }

        Ok(Some(LabelSprite {
            pixmap,
            picture,
            width,
            height,
        }))
    }

    fn apply_input_shape(&self) -> Result<()> {
        let rects = if self.click_through {
            // Empty input region: clicks pass through
            Vec::new()
        } else {
            vec![Rectangle {
                x: 0,
                y: 0,
                width: self.width,
                height: self.height,
            }]
        };
        self.conn
            .shape_rectangles(
                shape::SO::SET,
                shape::SK::INPUT,
                ClipOrdering::UNSORTED,
                self.window,
                0,
                0,
                &rects,
            )
            .context(format!("Failed to set input shape for '{}'", self.name))?;
        Ok(())
    }

    fn upload_frame(&mut self, frame: &FrameData) -> Result<()> {
        let width = frame.width.min(u32::from(u16::MAX)) as u16;
        let height = frame.height.min(u32::from(u16::MAX)) as u16;
        let stride = usize::from(width) * 4;
        if frame.data.len() < stride * usize::from(height) {
            bail!(
                "frame data for '{}' is short: {} bytes for {}x{}",
                self.name,
                frame.data.len(),
                width,
                height
            );
        }

        if self
            .frame
            .as_ref()
            .is_none_or(|f| f.width != width || f.height != height)
        {
            if let Some(old) = self.frame.take() {
                old.free(self.conn);
            }
            let pixmap = self
                .conn
                .generate_id()
                .context("Failed to generate ID for frame pixmap")?;
            self.conn
                .create_pixmap(self.frame_depth, pixmap, self.root, width, height)
                .context(format!("Failed to create frame pixmap for '{}'", self.name))?;
            let picture = self
                .conn
                .generate_id()
                .context("Failed to generate ID for frame picture")?;
            self.conn
                .render_create_picture(picture, pixmap, self.frame_format, &CreatePictureAux::new())
                .context(format!("Failed to create frame picture for '{}'", self.name))?;
            let gc = self
                .conn
                .generate_id()
                .context("Failed to generate ID for frame GC")?;
            self.conn
                .create_gc(gc, pixmap, &CreateGCAux::new())
                .context(format!("Failed to create frame GC for '{}'", self.name))?;
            self.frame = Some(FrameSprite {
                pixmap,
                picture,
                gc,
                width,
                height,
            });
        }

        let sprite = self
            .frame
            .as_ref()
            .context("frame sprite missing after upload setup")?;
        let mut row: u16 = 0;
        while row < height {
            let rows = (height - row).min(x11::PUT_IMAGE_ROW_CHUNK);
            let start = usize::from(row) * stride;
            let end = start + usize::from(rows) * stride;
            self.conn
                .put_image(
                    ImageFormat::Z_PIXMAP,
                    sprite.pixmap,
                    sprite.gc,
                    width,
                    rows,
                    0,
                    row as i16,
                    0,
                    self.frame_depth,
                    &frame.data[start..end],
                )
                .context(format!("Failed to upload frame rows for '{}'", self.name))?;
            row += rows;
        }
        Ok(())
    }

    /// Repaint the window from the retained frame (or background) plus
    /// chrome, and flush.
    fn paint(&self) -> Result<()> {
        if let Some(sprite) = &self.frame {
            let transform = Transform {
                matrix11: to_fixed(f32::from(sprite.width) / f32::from(self.width.max(1))),
                matrix22: to_fixed(f32::from(sprite.height) / f32::from(self.height.max(1))),
                matrix33: to_fixed(1.0),
                ..Default::default()
            };
            self.conn
                .render_set_picture_transform(sprite.picture, transform)
                .context(format!("Failed to set frame transform for '{}'", self.name))?;
            self.conn
                .render_composite(
                    PictOp::SRC,
                    sprite.picture,
                    0u32,
                    self.window_picture,
                    0,
                    0,
                    0,
                    0,
                    0,
                    0,
                    self.width,
                    self.height,
                )
                .context(format!("Failed to composite frame for '{}'", self.name))?;
        } else {
            self.conn
                .clear_area(false, self.window, 0, 0, 0, 0)
                .context(format!("Failed to clear window for '{}'", self.name))?;
        }

        if self.chrome_visible {
            self.draw_chrome()?;
        }
        self.conn
            .flush()
            .context("Failed to flush X11 connection after paint")?;
        Ok(())
    }

    fn draw_chrome(&self) -> Result<()> {
        for rect in frame_rectangles(0, 0, self.width, self.height, BORDER_WIDTH) {
            self.conn
                .render_composite(
                    PictOp::OVER,
                    self.border_fill,
                    0u32,
                    self.window_picture,
                    0,
                    0,
                    0,
                    0,
                    rect.x,
                    rect.y,
                    rect.width,
                    rect.height,
                )
                .context(format!("Failed to render border for '{}'", self.name))?;
        }

        if let Some(label) = &self.label {
            self.conn
                .render_composite(
                    PictOp::OVER,
                    label.picture,
                    0u32,
                    self.window_picture,
                    0,
                    0,
                    0,
                    0,
                    LABEL_MARGIN,
                    LABEL_MARGIN,
                    label.width,
                    label.height,
                )
                .context(format!("Failed to composite label for '{}'", self.name))?;
        }
        Ok(())
    }
}

fn physical_position(position: LogicalPoint, dpi_scale: f64) -> (i16, i16) {
    let clamp = |v: f64| {
        (v * dpi_scale)
            .round()
            .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
    };
    (clamp(position.x), clamp(position.y))
}

fn physical_size(size: LogicalSize, dpi_scale: f64) -> (u16, u16) {
    let clamp = |v: f64| (v * dpi_scale).round().clamp(1.0, f64::from(u16::MAX)) as u16;
    (clamp(size.width), clamp(size.height))
}

impl OverlaySurface for X11Surface<'_> {
    fn id(&self) -> WindowId {
        WindowId(self.window)
    }

    fn dpi_scale(&self) -> f64 {
        self.dpi_scale
    }

    fn set_click_through(&mut self, enabled: bool) -> Result<()> {
        self.click_through = enabled;
        self.apply_input_shape()?;
        self.conn
            .flush()
            .context("Failed to flush X11 connection after input shape change")?;
        Ok(())
    }

    fn bring_to_foreground(&mut self) -> Result<()> {
        // Raise first, then ask the WM to focus.
        self.conn
            .configure_window(
                self.window,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )
            .context(format!(
                "Failed to raise window {} to top of stack",
                self.window
            ))?;

        let event = ClientMessageEvent {
            response_type: CLIENT_MESSAGE_EVENT,
            format: 32,
            sequence: 0,
            window: self.window,
            type_: self.atoms.net_active_window,
            data: ClientMessageData::from([
                x11::ACTIVE_WINDOW_SOURCE_PAGER,
                x11rb::CURRENT_TIME,
                0,
                0,
                0,
            ]),
        };
        self.conn
            .send_event(
                false,
                self.root,
                EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
                event,
            )
            .context(format!(
                "Failed to send _NET_ACTIVE_WINDOW event for window {}",
                self.window
            ))?;
        self.conn
            .flush()
            .context("Failed to flush X11 connection after window activation")?;
        Ok(())
    }

    fn set_visible(&mut self, visible: bool) -> Result<()> {
        if visible == self.visible {
            return Ok(());
        }
        self.visible = visible;
        if visible {
            self.conn
                .map_window(self.window)
                .context(format!("Failed to map window for '{}'", self.name))?;
        } else {
            self.conn
                .unmap_window(self.window)
                .context(format!("Failed to unmap window for '{}'", self.name))?;
        }
        self.conn
            .flush()
            .context("Failed to flush X11 connection after visibility change")?;
        Ok(())
    }

    fn set_opacity(&mut self, opacity: f64) -> Result<()> {
        let value = (opacity.clamp(0.0, 1.0) * f64::from(x11::OPACITY_OPAQUE)) as u32;
        self.conn
            .change_property32(
                PropMode::REPLACE,
                self.window,
                self.atoms.net_wm_window_opacity,
                AtomEnum::CARDINAL,
                &[value],
            )
            .context(format!("Failed to set window opacity for '{}'", self.name))?;
        self.conn
            .flush()
            .context("Failed to flush X11 connection after opacity change")?;
        Ok(())
    }

    fn set_chrome_visible(&mut self, visible: bool) -> Result<()> {
        if visible == self.chrome_visible {
            return Ok(());
        }
        self.chrome_visible = visible;
        self.paint()
    }

    fn set_background_fill(&mut self, fill: BackgroundFill) -> Result<()> {
        // Only visible where no frame covers the window; with an ARGB
        // visual the pixel is premultiplied ARGB.
        let pixel = match fill {
            BackgroundFill::Clear => 0,
            BackgroundFill::Faint => u32::from(FAINT_BACKGROUND_ALPHA) << 24,
        };
        self.conn
            .change_window_attributes(
                self.window,
                &ChangeWindowAttributesAux::new().background_pixel(pixel),
            )
            .context(format!(
                "Failed to set background fill for '{}'",
                self.name
            ))?;
        self.paint()
    }

    fn move_to(&mut self, position: LogicalPoint) -> Result<()> {
        let (x, y) = physical_position(position, self.dpi_scale);
        self.conn
            .configure_window(
                self.window,
                &ConfigureWindowAux::new().x(i32::from(x)).y(i32::from(y)),
            )
            .context(format!(
                "Failed to reposition window for '{}' to ({}, {})",
                self.name, x, y
            ))?;
        self.conn
            .flush()
            .context("Failed to flush X11 connection after reposition")?;
        Ok(())
    }

    fn resize(&mut self, size: LogicalSize) -> Result<()> {
        let (width, height) = physical_size(size, self.dpi_scale);
        if width == self.width && height == self.height {
            return Ok(());
        }
        self.width = width;
        self.height = height;
        self.conn
            .configure_window(
                self.window,
                &ConfigureWindowAux::new()
                    .width(u32::from(width))
                    .height(u32::from(height)),
            )
            .context(format!("Failed to resize window for '{}'", self.name))?;
        // The input rectangle tracks the window size while interactive.
        if !self.click_through {
            self.apply_input_shape()?;
        }
        self.conn
            .flush()
            .context("Failed to flush X11 connection after resize")?;
        Ok(())
    }

    fn position(&self) -> Result<LogicalPoint> {
        // get_geometry is frame-relative under a reparenting WM; the
        // root translation is the real desktop position.
        let reply = self
            .conn
            .translate_coordinates(self.window, self.root, 0, 0)
            .context(format!("Failed to query position for '{}'", self.name))?
            .reply()
            .context(format!(
                "Failed to get position reply for '{}'",
                self.name
            ))?;
        Ok(LogicalPoint::new(
            f64::from(reply.dst_x) / self.dpi_scale,
            f64::from(reply.dst_y) / self.dpi_scale,
        ))
    }

    fn present(&mut self, frame: &FrameData) -> Result<()> {
        self.upload_frame(frame)?;
        self.paint()
    }

    fn redraw(&mut self) -> Result<()> {
        self.paint()
    }
}

impl Drop for X11Surface<'_> {
    fn drop(&mut self) {
        // Clean up each resource independently to prevent cascade
        // failures.
        if let Some(frame) = self.frame.take() {
            frame.free(self.conn);
        }
        if let Some(label) = self.label.take() {
            label.free(self.conn);
        }
        if let Err(e) = self.conn.render_free_picture(self.border_fill) {
            error!("Failed to free border fill picture {}: {}", self.border_fill, e);
        }
        if let Err(e) = self.conn.render_free_picture(self.window_picture) {
            error!("Failed to free window picture {}: {}", self.window_picture, e);
        }
        if let Err(e) = self.conn.destroy_window(self.window) {
            error!(
                "Failed to destroy window {} for '{}': {}",
                self.window, self.name, e
            );
        }
        if let Some(colormap) = self.colormap
            && let Err(e) = self.conn.free_colormap(colormap)
        {
            error!("Failed to free colormap {}: {}", colormap, e);
        }
        if let Err(e) = self.conn.flush() {
            error!("Failed to flush X11 connection during cleanup: {}", e);
        }
    }
}

/// Modal drag-select over a full-screen dimming window.
pub struct X11RegionSelector<'a> {
    conn: &'a RustConnection,
    screen: &'a Screen,
    visual: VisualConfig,
    formats: PictFormats,
    dpi_scale: f64,
    keymap: KeyMap,
}

impl AreaSelector for X11RegionSelector<'_> {
    fn select(&mut self) -> Result<Option<LogicalRect>> {
        let shroud = SelectionShroud::create(self.conn, self.screen, self.visual, self.formats)?;
        info!("area selection started");
        let band = shroud.run(&self.keymap)?;
        drop(shroud);

        let Some(band) = band else {
            info!("area selection cancelled");
            return Ok(None);
        };
        let area = LogicalRect {
            x: (f64::from(band.x) / self.dpi_scale).round() as i32,
            y: (f64::from(band.y) / self.dpi_scale).round() as i32,
            width: (f64::from(band.width) / self.dpi_scale).round() as i32,
            height: (f64::from(band.height) / self.dpi_scale).round() as i32,
        };
        if !area.has_area() {
            info!("empty selection treated as cancelled");
            return Ok(None);
        }
        info!(area = ?area, "area selected");
        Ok(Some(area))
    }
}

/// The full-screen selection window plus its grabs. Dropping it undoes
/// everything, so a failed setup never leaves the screen dimmed.
struct SelectionShroud<'a> {
    conn: &'a RustConnection,
    window: Window,
    picture: Picture,
    colormap: Option<Colormap>,
    cursor: Cursor,
    pointer_grabbed: bool,
    keyboard_grabbed: bool,
}

impl<'a> SelectionShroud<'a> {
    fn create(
        conn: &'a RustConnection,
        screen: &Screen,
        visual: VisualConfig,
        formats: PictFormats,
    ) -> Result<Self> {
        let colormap = if visual.argb {
            let colormap = conn
                .generate_id()
                .context("Failed to generate ID for selection colormap")?;
            conn.create_colormap(ColormapAlloc::NONE, colormap, screen.root, visual.visual_id)
                .context("Failed to create selection colormap")?;
            Some(colormap)
        } else {
            None
        };

        let background = if visual.argb {
            selection::DIM_COLOR
        } else {
            screen.black_pixel
        };
        let window = conn
            .generate_id()
            .context("Failed to generate ID for selection window")?;
        let mut aux = CreateWindowAux::new()
            .background_pixel(background)
            .border_pixel(0)
            .override_redirect(1)
            .event_mask(
                EventMask::EXPOSURE
                    | EventMask::BUTTON_PRESS
                    | EventMask::BUTTON_RELEASE
                    | EventMask::POINTER_MOTION
                    | EventMask::KEY_PRESS,
            );
        if let Some(colormap) = colormap {
            aux = aux.colormap(colormap);
        }
        conn.create_window(
            visual.depth,
            window,
            screen.root,
            0,
            0,
            screen.width_in_pixels,
            screen.height_in_pixels,
            0,
            WindowClass::INPUT_OUTPUT,
            visual.visual_id,
            &aux,
        )
        .context("Failed to create selection window")?;

        let window_format = if visual.argb {
            formats
                .argb
                .context("ARGB visual without matching picture format")?
        } else {
            formats.opaque
        };
        let picture = conn
            .generate_id()
            .context("Failed to generate ID for selection picture")?;
        conn.render_create_picture(picture, window, window_format, &CreatePictureAux::new())
            .context("Failed to create selection picture")?;

        // Crosshair cursor from the standard cursor font
        let cursor_font = conn
            .generate_id()
            .context("Failed to generate ID for cursor font")?;
        conn.open_font(cursor_font, b"cursor")
            .context("Failed to open cursor font")?;
        let cursor = conn
            .generate_id()
            .context("Failed to generate ID for crosshair cursor")?;
        conn.create_glyph_cursor(
            cursor,
            cursor_font,
            cursor_font,
            34,
            35,
            0,
            0,
            0,
            0xFFFF,
            0xFFFF,
            0xFFFF,
        )
        .context("Failed to create crosshair cursor")?;
        conn.close_font(cursor_font)
            .context("Failed to close cursor font")?;

        let mut shroud = Self {
            conn,
            window,
            picture,
            colormap,
            cursor,
            pointer_grabbed: false,
            keyboard_grabbed: false,
        };
        shroud.arm()?;
        Ok(shroud)
    }

    fn arm(&mut self) -> Result<()> {
        self.conn
            .map_window(self.window)
            .context("Failed to map selection window")?;
        self.conn
            .configure_window(
                self.window,
                &ConfigureWindowAux::new().stack_mode(StackMode::ABOVE),
            )
            .context("Failed to raise selection window")?;

        let grab = self
            .conn
            .grab_pointer(
                false,
                self.window,
                EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::POINTER_MOTION,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                x11rb::NONE,
                self.cursor,
                x11rb::CURRENT_TIME,
            )
            .context("Failed to request pointer grab for selection")?
            .reply()
            .context("Failed to get pointer grab reply")?;
        if grab.status != GrabStatus::SUCCESS {
            bail!("pointer grab refused: {:?}", grab.status);
        }
        self.pointer_grabbed = true;

        // Escape needs the keyboard; selection still works without it.
        match self
            .conn
            .grab_keyboard(
                false,
                self.window,
                x11rb::CURRENT_TIME,
                GrabMode::ASYNC,
                GrabMode::ASYNC,
            )
            .context("Failed to request keyboard grab for selection")?
            .reply()
        {
            Ok(reply) if reply.status == GrabStatus::SUCCESS => self.keyboard_grabbed = true,
            Ok(reply) => warn!(status = ?reply.status, "keyboard grab refused, Escape disabled"),
            Err(e) => warn!(error = %e, "keyboard grab failed, Escape disabled"),
        }

        self.draw(None)?;
        Ok(())
    }

    /// Block until the drag ends or Escape is pressed. Returns the band
    /// in physical root pixels, `None` when cancelled.
    fn run(&self, keymap: &KeyMap) -> Result<Option<Rectangle>> {
        let mut anchor: Option<(i16, i16)> = None;
        let mut band: Option<Rectangle> = None;
        loop {
            let event = self
                .conn
                .wait_for_event()
                .context("Failed to wait for selection event")?;
            match event {
                Event::ButtonPress(e) if e.detail == mouse::BUTTON_LEFT => {
                    anchor = Some((e.root_x, e.root_y));
                    band = Some(band_between((e.root_x, e.root_y), (e.root_x, e.root_y)));
                    self.draw(band)?;
                }
                Event::MotionNotify(e) => {
                    if let Some(origin) = anchor {
                        band = Some(band_between(origin, (e.root_x, e.root_y)));
                        self.draw(band)?;
                    }
                }
                Event::ButtonRelease(e) if e.detail == mouse::BUTTON_LEFT => {
                    if let Some(origin) = anchor {
                        return Ok(Some(band_between(origin, (e.root_x, e.root_y))));
                    }
                }
                Event::KeyPress(e) => {
                    if keymap.lookup(e.detail) == Some(keys::XK_ESCAPE) {
                        return Ok(None);
                    }
                }
                Event::Expose(e) if e.count == 0 => {
                    self.draw(band)?;
                }
                Event::Error(e) => {
                    error!("x11 error event during selection: {e:?}");
                }
                other => {
                    debug!(event = ?other, "event ignored during modal selection");
                }
            }
        }
    }

    fn draw(&self, band: Option<Rectangle>) -> Result<()> {
        self.conn
            .clear_area(false, self.window, 0, 0, 0, 0)
            .context("Failed to clear selection window")?;
        if let Some(band) = band
            && band.width > 0
            && band.height > 0
        {
            self.conn
                .render_fill_rectangles(
                    PictOp::OVER,
                    self.picture,
                    render_color(selection::BAND_FILL_COLOR),
                    &[band],
                )
                .context("Failed to fill selection band")?;
            self.conn
                .render_fill_rectangles(
                    PictOp::OVER,
                    self.picture,
                    render_color(selection::BAND_EDGE_COLOR),
                    &frame_rectangles(
                        band.x,
                        band.y,
                        band.width,
                        band.height,
                        selection::BAND_EDGE_WIDTH,
                    ),
                )
                .context("Failed to outline selection band")?;
        }
        self.conn
            .flush()
            .context("Failed to flush X11 connection after selection draw")?;
        Ok(())
    }
}

impl Drop for SelectionShroud<'_> {
    fn drop(&mut self) {
        if self.pointer_grabbed
            && let Err(e) = self.conn.ungrab_pointer(x11rb::CURRENT_TIME)
        {
            error!("Failed to ungrab pointer: {}", e);
        }
        if self.keyboard_grabbed
            && let Err(e) = self.conn.ungrab_keyboard(x11rb::CURRENT_TIME)
        {
            error!("Failed to ungrab keyboard: {}", e);
        }
        if let Err(e) = self.conn.free_cursor(self.cursor) {
            error!("Failed to free cursor {}: {}", self.cursor, e);
        }
        if let Err(e) = self.conn.render_free_picture(self.picture) {
            error!("Failed to free selection picture {}: {}", self.picture, e);
        }
        if let Err(e) = self.conn.destroy_window(self.window) {
            error!("Failed to destroy selection window {}: {}", self.window, e);
        }
        if let Some(colormap) = self.colormap
            && let Err(e) = self.conn.free_colormap(colormap)
        {
            error!("Failed to free selection colormap {}: {}", colormap, e);
        }
        if let Err(e) = self.conn.flush() {
            error!("Failed to flush X11 connection during selection cleanup: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xft_dpi_entry_parses() {
        let blob = "Xft.antialias:\t1\nXft.dpi:\t120\nXft.hinting:\t1\n";
        assert_eq!(parse_xft_dpi(blob), Some(120.0));
    }

    #[test]
    fn missing_or_malformed_dpi_is_ignored() {
        assert_eq!(parse_xft_dpi(""), None);
        assert_eq!(parse_xft_dpi("Xft.antialias:\t1\n"), None);
        assert_eq!(parse_xft_dpi("Xft.dpi:\tnot-a-number\n"), None);
        assert_eq!(parse_xft_dpi("Xft.dpi:\t-96\n"), None);
    }

    #[test]
    fn key_commands_cover_every_binding() {
        assert_eq!(command_for(keys::XK_W, true), Some(KeyCommand::ReselectRegion));
        assert_eq!(command_for(keys::XK_Q, true), Some(KeyCommand::ToggleHide));
        assert_eq!(command_for(keys::XK_E, true), Some(KeyCommand::Deactivate));
        assert_eq!(command_for(keys::XK_UP, true), Some(KeyCommand::ScaleUp));
        assert_eq!(command_for(keys::XK_DOWN, true), Some(KeyCommand::ScaleDown));
        assert_eq!(command_for(keys::XK_RIGHT, true), Some(KeyCommand::OpacityUp));
        assert_eq!(command_for(keys::XK_LEFT, true), Some(KeyCommand::OpacityDown));
        assert_eq!(command_for(keys::XK_LEFT, false), Some(KeyCommand::NudgeLeft));
        assert_eq!(command_for(keys::XK_RIGHT, false), Some(KeyCommand::NudgeRight));
        assert_eq!(command_for(keys::XK_UP, false), Some(KeyCommand::NudgeUp));
        assert_eq!(command_for(keys::XK_DOWN, false), Some(KeyCommand::NudgeDown));
        // Unshifted letters stay free for normal typing
        assert_eq!(command_for(keys::XK_W, false), None);
        assert_eq!(command_for(keys::XK_ESCAPE, false), None);
    }

    #[test]
    fn keymap_lookup_takes_the_unshifted_column() {
        let keymap = KeyMap {
            min_keycode: 8,
            keysyms_per_keycode: 2,
            keysyms: vec![keys::XK_W, 0x0057, keys::XK_Q, 0x0051],
        };
        assert_eq!(keymap.lookup(8), Some(keys::XK_W));
        assert_eq!(keymap.lookup(9), Some(keys::XK_Q));
        assert_eq!(keymap.lookup(7), None);
        assert_eq!(keymap.lookup(10), None);
    }

    #[test]
    fn frame_rectangles_tile_the_outline() {
        let [top, bottom, left, right] = frame_rectangles(10, 20, 100, 50, 2);
        assert_eq!((top.x, top.y, top.width, top.height), (10, 20, 100, 2));
        assert_eq!(
            (bottom.x, bottom.y, bottom.width, bottom.height),
            (10, 68, 100, 2)
        );
        assert_eq!((left.x, left.y, left.width, left.height), (10, 22, 2, 46));
        assert_eq!(
            (right.x, right.y, right.width, right.height),
            (108, 22, 2, 46)
        );
    }

    #[test]
    fn band_normalizes_any_drag_direction() {
        let down_right = band_between((10, 20), (110, 70));
        assert_eq!(
            (down_right.x, down_right.y, down_right.width, down_right.height),
            (10, 20, 100, 50)
        );
        let up_left = band_between((110, 70), (10, 20));
        assert_eq!(
            (up_left.x, up_left.y, up_left.width, up_left.height),
            (10, 20, 100, 50)
        );
        let empty = band_between((42, 42), (42, 42));
        assert_eq!((empty.width, empty.height), (0, 0));
    }

    #[test]
    fn render_colors_are_premultiplied() {
        let opaque = render_color(0xFF_4A_A8_FF);
        assert_eq!(opaque.alpha, 0xFFFF);
        assert_eq!(opaque.red, 0x4A * 257);
        assert_eq!(opaque.green, 0xA8 * 257);
        assert_eq!(opaque.blue, 0xFF * 257);

        let translucent = render_color(0x30_FF_00_00);
        assert_eq!(translucent.alpha, 0x30 * 257);
        assert_eq!(translucent.red, 0x30 * 257);
        assert_eq!(translucent.green, 0);
        assert_eq!(translucent.blue, 0);
    }
}
