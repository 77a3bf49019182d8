//! One live overlay
//!
//! `OverlayInstance` composes a realized window surface, the cached DPI
//! scale, the mode state machine, and the capture timer for exactly one
//! active profile. The manager owns the instance's lifetime; its internal
//! state moves only through the transition triggers and user commands
//! defined here. Tearing an instance down is dropping it — the surface
//! cleans up its own windowing resources.

use anyhow::Result;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::capture::{CaptureProvider, CaptureTimer};
use crate::constants::{validation, window};
use crate::geometry::{LogicalPoint, LogicalRect, PhysicalRect};
use crate::mode::WindowMode;
use crate::platform::{AreaSelector, BackgroundFill, OverlaySurface, WindowId};
use crate::profile::Profile;

/// How a halted capture loop is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureVisibility {
    /// One warn-level log line per halt.
    #[default]
    Warn,
    /// Halt with a debug-level line only.
    Quiet,
}

/// Outcome of a region reselection round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReselectOutcome {
    /// New rectangle accepted and applied.
    Applied,
    /// Cancelled; the previous rectangle (if any) stays in effect.
    Kept,
    /// Cancelled with no rectangle to fall back to; the instance asks to
    /// be torn down rather than idle without a region.
    TeardownRequested,
}

/// Left-drag move tracking. Pointer coordinates are physical root
/// pixels; the window origin is logical.
#[derive(Debug, Default)]
struct InputState {
    dragging: bool,
    drag_start: (i16, i16),
    win_start: LogicalPoint,
}

pub struct OverlayInstance<'a> {
    surface: Box<dyn OverlaySurface + 'a>,
    mode: WindowMode,
    dpi_scale: f64,
    capture_rect: Option<PhysicalRect>,
    capture_area: LogicalRect,
    timer: CaptureTimer,
    opacity: f64,
    scale_factor: f64,
    temporarily_hidden: bool,
    saved_opacity: f64,
    input_state: InputState,
    failure_visibility: FailureVisibility,
}

impl<'a> OverlayInstance<'a> {
    /// Realize an instance for a profile. The window comes up in Passive
    /// mode; when the profile already has a region, the capture loop is
    /// running on return.
    pub fn create(
        profile: &Profile,
        surface: Box<dyn OverlaySurface + 'a>,
        failure_visibility: FailureVisibility,
        now: Instant,
    ) -> Result<Self> {
        let dpi_scale = surface.dpi_scale();
        let mut instance = Self {
            surface,
            mode: WindowMode::Passive,
            dpi_scale,
            capture_rect: None,
            capture_area: profile.capture_area,
            timer: CaptureTimer::new(),
            opacity: profile.opacity_level,
            scale_factor: profile.scale_factor,
            temporarily_hidden: false,
            saved_opacity: profile.opacity_level,
            input_state: InputState::default(),
            failure_visibility,
        };
        instance.apply_profile_geometry(profile)?;
        instance.surface.set_opacity(instance.opacity)?;
        instance.apply_passive_side_effects(now)?;
        instance.surface.set_visible(true)?;
        info!(
            window = instance.surface.id().0,
            profile = %profile.name,
            dpi = instance.dpi_scale,
            "overlay instance created"
        );
        Ok(instance)
    }

    pub fn window_id(&self) -> WindowId {
        self.surface.id()
    }

    /// Deadline the daemon sleeps toward, if the loop is armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Focus gained: Passive → Interactive.
    pub fn handle_focus_gained(&mut self) -> Result<()> {
        if !self.mode.begin_interactive() {
            return Ok(());
        }
        debug!(window = self.surface.id().0, "entering interactive mode");
        self.apply_interactive_side_effects()
    }

    /// Focus lost: Interactive → Passive. This is the one place live
    /// state is committed back to the profile.
    pub fn handle_focus_lost(&mut self, profile: &mut Profile, now: Instant) -> Result<()> {
        if !self.mode.begin_passive() {
            return Ok(());
        }
        debug!(window = self.surface.id().0, "entering passive mode");
        self.fold_into_profile(profile)?;
        self.apply_passive_side_effects(now)
    }

    /// Run one capture tick if due. A failure halts the loop; nothing
    /// propagates past the tick boundary.
    pub fn run_due_tick(&mut self, now: Instant, provider: &mut dyn CaptureProvider) {
        if !self.timer.tick_due(now) {
            return;
        }
        let Some(rect) = self.capture_rect else {
            // No region yet: the tick is a no-op, not an error
            return;
        };
        match provider.capture(rect) {
            Ok(frame) => {
                if let Err(e) = self.surface.present(&frame) {
                    self.halt_capture(&format!("presenting frame failed: {e:#}"));
                }
            }
            Err(e) => self.halt_capture(&e.to_string()),
        }
    }

    /// Region reselection, Interactive-only. The window hides behind the
    /// modal selector and comes back shown, Interactive, and focused for
    /// every outcome except a requested teardown.
    pub fn reselect_region(
        &mut self,
        profile: &mut Profile,
        selector: &mut dyn AreaSelector,
        now: Instant,
    ) -> Result<ReselectOutcome> {
        if !self.mode.is_interactive() {
            return Ok(ReselectOutcome::Kept);
        }
        self.timer.stop();
        self.surface.set_visible(false)?;

        let outcome = match selector.select()? {
            Some(area) if area.has_area() => {
                info!(
                    window = self.surface.id().0,
                    area = ?area,
                    "region reselected"
                );
                profile.capture_area = area;
                profile.window_position = area.origin();
                self.scale_factor = 1.0;
                self.apply_profile_geometry(profile)?;
                self.timer.start(now);
                ReselectOutcome::Applied
            }
            _ => {
                if self.capture_rect.is_some() {
                    self.timer.start(now);
                    ReselectOutcome::Kept
                } else {
                    debug!(
                        window = self.surface.id().0,
                        "selection cancelled with no prior region, requesting teardown"
                    );
                    ReselectOutcome::TeardownRequested
                }
            }
        };
        if outcome == ReselectOutcome::TeardownRequested {
            return Ok(outcome);
        }

        self.surface.set_visible(true)?;
        // Mode may still read Interactive, but the side effects must be
        // reapplied after the hide/show cycle, so bypass the guard
        self.mode.begin_interactive();
        self.apply_interactive_side_effects()?;
        self.surface.bring_to_foreground()?;
        Ok(outcome)
    }

    /// Near-invisible opacity shortcut, orthogonal to mode.
    pub fn toggle_temporary_hide(&mut self) -> Result<()> {
        if self.temporarily_hidden {
            self.opacity = self.saved_opacity;
            self.temporarily_hidden = false;
        } else {
            self.saved_opacity = self.opacity;
            self.opacity = window::HIDDEN_OPACITY;
            self.temporarily_hidden = true;
        }
        self.surface.set_opacity(self.opacity)
    }

    /// Direct opacity change. Always cancels an in-effect temporary hide
    /// so a later un-hide cannot restore a stale remembered value.
    pub fn set_opacity_level(&mut self, value: f64) -> Result<()> {
        self.temporarily_hidden = false;
        self.opacity = value.clamp(validation::MIN_OPACITY, validation::MAX_OPACITY);
        self.surface.set_opacity(self.opacity)
    }

    pub fn adjust_opacity(&mut self, delta: f64) -> Result<()> {
        self.set_opacity_level(self.opacity + delta)
    }

    /// Scale step; the display size tracks immediately.
    pub fn adjust_scale(&mut self, delta: f64) -> Result<()> {
        self.scale_factor =
            (self.scale_factor + delta).clamp(validation::MIN_SCALE, validation::MAX_SCALE);
        if self.capture_area.has_area() {
            self.surface
                .resize(self.capture_area.display_size(self.scale_factor))?;
        }
        Ok(())
    }

    /// Move the window by a logical delta (arrow-key nudge).
    pub fn nudge(&mut self, dx: f64, dy: f64) -> Result<()> {
        let position = self.surface.position()?;
        self.surface.move_to(position.offset(dx, dy))
    }

    /// Left button pressed on the window. Only starts a drag while
    /// Interactive; Passive windows are click-through and never see the
    /// press anyway.
    pub fn begin_drag(&mut self, root_x: i16, root_y: i16) -> Result<()> {
        if !self.mode.is_interactive() {
            return Ok(());
        }
        self.input_state.drag_start = (root_x, root_y);
        self.input_state.win_start = self.surface.position()?;
        self.input_state.dragging = true;
        Ok(())
    }

    pub fn drag_to(&mut self, root_x: i16, root_y: i16) -> Result<()> {
        if !self.input_state.dragging {
            return Ok(());
        }
        let dx = f64::from(root_x - self.input_state.drag_start.0) / self.dpi_scale;
        let dy = f64::from(root_y - self.input_state.drag_start.1) / self.dpi_scale;
        self.surface.move_to(self.input_state.win_start.offset(dx, dy))
    }

    pub fn end_drag(&mut self) {
        self.input_state.dragging = false;
    }

    pub fn position(&self) -> Result<LogicalPoint> {
        self.surface.position()
    }

    pub fn move_to(&mut self, position: LogicalPoint) -> Result<()> {
        self.surface.move_to(position)
    }

    pub fn bring_to_foreground(&mut self) -> Result<()> {
        self.surface.bring_to_foreground()
    }

    pub fn redraw(&mut self) -> Result<()> {
        self.surface.redraw()
    }

    fn apply_profile_geometry(&mut self, profile: &Profile) -> Result<()> {
        self.capture_area = profile.capture_area;
        self.capture_rect = profile
            .has_geometry()
            .then(|| profile.capture_area.to_capture_rect(self.dpi_scale));
        self.surface.move_to(profile.window_position)?;
        if profile.has_geometry() {
            self.surface
                .resize(profile.capture_area.display_size(self.scale_factor))?;
        }
        Ok(())
    }

    fn apply_interactive_side_effects(&mut self) -> Result<()> {
        self.surface.set_click_through(false)?;
        self.surface.set_chrome_visible(true)?;
        self.surface.set_background_fill(BackgroundFill::Faint)
    }

    fn apply_passive_side_effects(&mut self, now: Instant) -> Result<()> {
        self.surface.set_click_through(true)?;
        self.surface.set_chrome_visible(false)?;
        self.surface.set_background_fill(BackgroundFill::Clear)?;
        if self.capture_rect.is_some() && !self.timer.is_running() {
            self.timer.start(now);
        }
        Ok(())
    }

    fn fold_into_profile(&mut self, profile: &mut Profile) -> Result<()> {
        if let Some(rect) = self.capture_rect {
            profile.capture_area = rect.to_capture_area(self.dpi_scale);
        }
        profile.window_position = self.surface.position()?;
        profile.opacity_level = if self.temporarily_hidden {
            self.saved_opacity
        } else {
            self.opacity
        };
        profile.scale_factor = self.scale_factor;
        Ok(())
    }

    fn halt_capture(&mut self, reason: &str) {
        self.timer.stop();
        match self.failure_visibility {
            FailureVisibility::Warn => {
                warn!(window = self.surface.id().0, reason, "capture loop halted")
            }
            FailureVisibility::Quiet => {
                debug!(window = self.surface.id().0, reason, "capture loop halted")
            }
        }
    }
}

/// State observation for tests.
#[cfg(test)]
impl OverlayInstance<'_> {
    pub fn mode(&self) -> WindowMode {
        self.mode
    }

    pub fn capture_rect(&self) -> Option<PhysicalRect> {
        self.capture_rect
    }

    pub fn is_capturing(&self) -> bool {
        self.timer.is_running()
    }

    pub fn is_temporarily_hidden(&self) -> bool {
        self.temporarily_hidden
    }

    pub fn opacity_level(&self) -> f64 {
        self.opacity
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }
}
