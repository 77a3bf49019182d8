//! Control message types for CLI ↔ daemon communication

use serde::{Deserialize, Serialize};

use crate::geometry::LogicalRect;

/// Requests sent from a CLI invocation to the daemon
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ControlRequest {
    /// List every profile with its activation state
    List,

    /// Run a modal area selection and append the resulting profile
    Create { name: Option<String> },

    /// Activate the named profile (create its overlay window)
    Enable(String),

    /// Deactivate the named profile (destroy its overlay window)
    Disable(String),

    /// Bring the named profile's window to the foreground
    Activate(String),

    /// Deactivate and remove the named profile
    Delete(String),

    /// Persist all profiles and stop the daemon
    Shutdown,
}

/// Responses sent from the daemon back to the CLI
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum ControlResponse {
    /// Registry contents in insertion order (response to List)
    Profiles(Vec<ProfileSummary>),

    /// A profile was created from the selection
    Created { name: String },

    /// The selection was cancelled; nothing was created
    Cancelled,

    /// The request was applied
    Done,

    /// The request failed
    Error(String),
}

/// One registry entry as reported over the control socket
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProfileSummary {
    pub name: String,
    pub capture_area: LogicalRect,
    pub active: bool,
}
