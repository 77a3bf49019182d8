//! Overlay window mode state machine
//!
//! Two states. Passive is the resting state: click-through, no chrome,
//! capture loop guaranteed running. Interactive is entered when the
//! window gains input focus and is where every user edit happens. The
//! transitions themselves are driven solely by focus events; requesting
//! the state the window is already in changes nothing.

/// Current interaction state of one overlay window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindowMode {
    /// Click-through mirror; ignores input entirely.
    #[default]
    Passive,
    /// Focused and configurable; chrome shown, click-through off.
    Interactive,
}

impl WindowMode {
    pub fn is_interactive(self) -> bool {
        matches!(self, WindowMode::Interactive)
    }

    pub fn is_passive(self) -> bool {
        matches!(self, WindowMode::Passive)
    }

    /// Move to Interactive. Returns false (and changes nothing) when
    /// already there, keeping repeated focus-gain events idempotent.
    pub fn begin_interactive(&mut self) -> bool {
        if self.is_interactive() {
            return false;
        }
        *self = WindowMode::Interactive;
        true
    }

    /// Move to Passive. Returns false when already there.
    pub fn begin_passive(&mut self) -> bool {
        if self.is_passive() {
            return false;
        }
        *self = WindowMode::Passive;
        true
    }
}
