//! Label rasterization for the interactive chrome
//!
//! Glyphs come from fontdue (pure Rust); the face is resolved through
//! fontconfig when a family name is given, otherwise from a fixed list
//! of common sans-serif paths.

use anyhow::{Context, Result};
use fontconfig::{Fontconfig, Pattern};
use fontdue::{Font, FontSettings};
use std::ffi::CString;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Rasterized label as an ARGB bitmap (premultiplied alpha)
pub struct RenderedText {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u32>,
}

impl RenderedText {
    fn empty() -> Self {
        Self {
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Fallback faces for systems where fontconfig resolution fails
const FALLBACK_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Bold.ttf",
];

/// Label renderer using fontdue
pub struct LabelRenderer {
    font: Font,
    size: f32,
}

impl LabelRenderer {
    /// Load a TrueType font from a file path
    pub fn from_path(path: PathBuf, size: f32) -> Result<Self> {
        let font_data =
            fs::read(&path).with_context(|| format!("Failed to read font file: {}", path.display()))?;

        let font = Font::from_bytes(font_data, FontSettings::default())
            .map_err(|e| anyhow::anyhow!("Failed to parse font: {}", e))?;

        Ok(Self { font, size })
    }

    /// Resolve a face for the label, preferring the requested family.
    /// `None` means no usable font exists; the caller draws border-only
    /// chrome and should warn once.
    pub fn discover(family: Option<&str>, size: f32) -> Option<Self> {
        if let Some(family) = family {
            match resolve_family(family) {
                Ok(path) => match Self::from_path(path.clone(), size) {
                    Ok(renderer) => return Some(renderer),
                    Err(e) => {
                        warn!(family, path = %path.display(), error = %e, "requested label font failed to load");
                    }
                },
                Err(e) => {
                    warn!(family, error = %e, "requested label font not found, trying fallbacks");
                }
            }
        }

        for path in FALLBACK_FONT_PATHS {
            if let Ok(renderer) = Self::from_path(PathBuf::from(path), size) {
                debug!(path, "label font loaded from fallback list");
                return Some(renderer);
            }
        }
        None
    }

    /// Render text to an ARGB bitmap with the given foreground color
    /// (transparent background)
    pub fn render(&self, text: &str, fg_color: u32) -> RenderedText {
        if text.is_empty() {
            return RenderedText::empty();
        }

        // Layout glyphs left to right, tracking the common baseline.
        let mut glyphs = Vec::new();
        let mut pen_x = 0.0f32;
        let mut max_ascent = 0i32;
        let mut max_descent = 0i32;

        for ch in text.chars() {
            let (metrics, bitmap) = self.font.rasterize(ch, self.size);

            let ascent = metrics.height as i32 + metrics.ymin;
            let descent = -metrics.ymin;
            max_ascent = max_ascent.max(ascent);
            max_descent = max_descent.max(descent);

            glyphs.push((pen_x as i32, metrics, bitmap));
            pen_x += metrics.advance_width;
        }

        let width = pen_x.ceil() as usize;
        let height = (max_ascent + max_descent) as usize;
        if width == 0 || height == 0 {
            return RenderedText::empty();
        }

        let mut data = vec![0x0000_0000u32; width * height];

        let fg_a = ((fg_color >> 24) & 0xFF) as f32 / 255.0;
        let fg_r = ((fg_color >> 16) & 0xFF) as f32 / 255.0;
        let fg_g = ((fg_color >> 8) & 0xFF) as f32 / 255.0;
        let fg_b = (fg_color & 0xFF) as f32 / 255.0;

        for (x_offset, metrics, bitmap) in glyphs {
            // Baseline sits max_ascent rows below the bitmap top.
            let glyph_top = max_ascent - (metrics.height as i32 + metrics.ymin);

            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let px = x_offset + gx as i32;
                    let py = glyph_top + gy as i32;
                    if px < 0 || py < 0 || px >= width as i32 || py >= height as i32 {
                        continue;
                    }

                    let coverage = bitmap[gy * metrics.width + gx] as f32 / 255.0;
                    if coverage > 0.0 {
                        // Premultiply: both alpha and RGB carry the coverage.
                        let a = (fg_a * coverage * 255.0) as u32;
                        let r = (fg_r * coverage * 255.0) as u32;
                        let g = (fg_g * coverage * 255.0) as u32;
                        let b = (fg_b * coverage * 255.0) as u32;
                        data[(py as usize) * width + (px as usize)] = (a << 24) | (r << 16) | (g << 8) | b;
                    }
                }
            }
        }

        RenderedText {
            width,
            height,
            data,
        }
    }
}

/// Ask fontconfig for the file backing a family name. Fontconfig
/// matches fuzzily, so a result naming a different family counts as
/// not-found.
fn resolve_family(family: &str) -> Result<PathBuf> {
    let fc = Fontconfig::new().context("Failed to initialize fontconfig")?;

    let mut pattern = Pattern::new(&fc);
    let family_cstr =
        CString::new(family).with_context(|| format!("Invalid family name: {family}"))?;
    pattern.add_string(fontconfig::FC_FAMILY, &family_cstr);

    let matched = pattern.font_match();
    if let Some(matched_family) = matched.get_string(fontconfig::FC_FAMILY)
        && !matched_family.eq_ignore_ascii_case(family)
    {
        return Err(anyhow::anyhow!(
            "Font '{}' not found - fontconfig returned family '{}' instead",
            family,
            matched_family
        ));
    }

    let file_path = matched
        .filename()
        .with_context(|| format!("No font file found for '{family}'"))?;

    let path = PathBuf::from(file_path);
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "Font file path '{}' does not exist",
            path.display()
        ));
    }
    Ok(path)
}
