//! Persisted overlay profile schema
//!
//! A profile describes one overlay: the logical screen region it mirrors
//! and how the window presents it. Profiles carry no runtime state; the
//! live counterpart is `instance::OverlayInstance`, joined to a profile
//! by the manager.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::validation;
use crate::geometry::{LogicalPoint, LogicalRect};

/// One saved overlay configuration.
///
/// Serialized member names are camelCase to match the on-disk profile
/// list format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default = "default_name")]
    pub name: String,
    /// Mirrored region in logical desktop pixels.
    #[serde(default)]
    pub capture_area: LogicalRect,
    /// Overlay window origin in logical desktop pixels.
    #[serde(default)]
    pub window_position: LogicalPoint,
    #[serde(default = "default_opacity")]
    pub opacity_level: f64,
    #[serde(default = "default_scale")]
    pub scale_factor: f64,
}

// Default value functions
fn default_name() -> String {
    "New profile".to_string()
}

fn default_opacity() -> f64 {
    1.0
}

fn default_scale() -> f64 {
    1.0
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: default_name(),
            capture_area: LogicalRect::default(),
            window_position: LogicalPoint::default(),
            opacity_level: default_opacity(),
            scale_factor: default_scale(),
        }
    }
}

impl Profile {
    /// Fresh profile with default presentation and the given name.
    pub fn with_name(name: String) -> Self {
        Self {
            name,
            ..Self::default()
        }
    }

    /// Whether this profile has ever been given a usable region.
    pub fn has_geometry(&self) -> bool {
        self.capture_area.has_area()
    }

    /// Clamp numeric fields into their persisted bounds after
    /// deserialization. Hand-edited files are the only way out-of-range
    /// values appear; each clamp is logged.
    pub fn validate_and_clamp(&mut self) {
        if self.opacity_level < validation::MIN_OPACITY
            || self.opacity_level > validation::MAX_OPACITY
        {
            warn!(
                profile = %self.name,
                opacity = self.opacity_level,
                "opacityLevel out of range, clamping"
            );
            self.opacity_level = self
                .opacity_level
                .clamp(validation::MIN_OPACITY, validation::MAX_OPACITY);
        }
        if self.scale_factor < validation::MIN_SCALE || self.scale_factor > validation::MAX_SCALE {
            warn!(
                profile = %self.name,
                scale = self.scale_factor,
                "scaleFactor out of range, clamping"
            );
            self.scale_factor = self
                .scale_factor
                .clamp(validation::MIN_SCALE, validation::MAX_SCALE);
        }
        if self.capture_area.width < 0 || self.capture_area.height < 0 {
            warn!(
                profile = %self.name,
                area = ?self.capture_area,
                "captureArea has negative dimensions, clamping to empty"
            );
            self.capture_area.width = self.capture_area.width.max(0);
            self.capture_area.height = self.capture_area.height.max(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_member_names() {
        let profile = Profile {
            name: "desk cam".to_string(),
            capture_area: LogicalRect::new(100, 100, 640, 480),
            window_position: LogicalPoint::new(10.5, 20.0),
            opacity_level: 0.8,
            scale_factor: 1.5,
        };
        let value = serde_json::to_value(&profile).unwrap();
        assert_eq!(value["name"], "desk cam");
        assert_eq!(value["captureArea"]["x"], 100);
        assert_eq!(value["captureArea"]["width"], 640);
        assert_eq!(value["windowPosition"]["x"], 10.5);
        assert_eq!(value["opacityLevel"], 0.8);
        assert_eq!(value["scaleFactor"], 1.5);
    }

    #[test]
    fn deserializes_round_trip() {
        let profile = Profile {
            name: "logs".to_string(),
            capture_area: LogicalRect::new(0, 0, 320, 200),
            window_position: LogicalPoint::new(1700.0, 64.0),
            opacity_level: 0.6,
            scale_factor: 2.0,
        };
        let json = serde_json::to_string(&profile).unwrap();
        let back: Profile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let profile: Profile = serde_json::from_str(r#"{"name": "bare"}"#).unwrap();
        assert_eq!(profile.name, "bare");
        assert_eq!(profile.opacity_level, 1.0);
        assert_eq!(profile.scale_factor, 1.0);
        assert!(!profile.has_geometry());
    }

    #[test]
    fn clamps_out_of_range_values() {
        let mut profile = Profile::default();
        profile.opacity_level = 1.8;
        profile.scale_factor = 0.0;
        profile.validate_and_clamp();
        assert_eq!(profile.opacity_level, 1.0);
        assert_eq!(profile.scale_factor, 0.1);

        profile.opacity_level = -0.4;
        profile.scale_factor = 50.0;
        profile.validate_and_clamp();
        assert_eq!(profile.opacity_level, 0.0);
        assert_eq!(profile.scale_factor, 8.0);
    }

    #[test]
    fn clamps_negative_area_to_empty() {
        let mut profile = Profile::default();
        profile.capture_area = LogicalRect::new(10, 10, -640, 480);
        profile.validate_and_clamp();
        assert_eq!(profile.capture_area.width, 0);
        assert_eq!(profile.capture_area.height, 480);
        assert!(!profile.has_geometry());
    }

    #[test]
    fn in_range_values_pass_untouched() {
        let mut profile = Profile {
            name: "ok".to_string(),
            capture_area: LogicalRect::new(5, 5, 100, 100),
            window_position: LogicalPoint::new(0.0, 0.0),
            opacity_level: 0.35,
            scale_factor: 3.0,
        };
        let before = profile.clone();
        profile.validate_and_clamp();
        assert_eq!(profile, before);
    }
}
