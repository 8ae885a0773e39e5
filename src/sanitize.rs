//! Style sanitizing for capture clones
//!
//! The rasterizer draws shadows as hard blocks, ignores filters and blend
//! modes, and fails outright on perceptual color encodings. Before a clone is
//! rasterized every node is normalized so the capture looks like the screen
//! minus effects.

use crate::rendering::color::is_unsupported_encoding;
use crate::surface::RenderNode;
use serde::{Deserialize, Serialize};

/// Replacement colors for values the rasterizer cannot parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorFallbacks {
    pub background: String,
    pub text: String,
    pub border: String,
}

impl Default for ColorFallbacks {
    /// The dark application palette.
    fn default() -> Self {
        Self {
            background: "#18181b".to_string(),
            text: "#ffffff".to_string(),
            border: "#cccccc".to_string(),
        }
    }
}

impl ColorFallbacks {
    /// Light palette used by printed documents.
    pub fn print() -> Self {
        Self {
            background: "#ffffff".to_string(),
            text: "#000000".to_string(),
            border: "#cccccc".to_string(),
        }
    }
}

/// What a sanitize pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeReport {
    pub nodes: usize,
    pub effects_stripped: usize,
    pub colors_replaced: usize,
}

const EFFECTS: [(&str, &str); 5] = [
    ("box-shadow", "none"),
    ("text-shadow", "none"),
    ("filter", "none"),
    ("backdrop-filter", "none"),
    ("mix-blend-mode", "normal"),
];

fn is_gradient(value: &str) -> bool {
    value.to_ascii_lowercase().contains("gradient(")
}

const BORDER_SHORTHANDS: [&str; 5] = ["border", "border-top", "border-right", "border-bottom", "border-left"];

/// Remove unsupported color function calls from a shorthand value, keeping
/// width and line style tokens.
fn strip_color_functions(value: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut depth = 0usize;
    let mut skipping = false;
    for token in value.split_whitespace() {
        if depth == 0 {
            skipping = is_unsupported_encoding(token);
        }
        depth += token.matches('(').count();
        depth = depth.saturating_sub(token.matches(')').count());
        if !skipping {
            kept.push(token);
        }
    }
    kept.join(" ")
}

/// Normalize every node of `root` in place. Never fails; call it on a clone.
pub fn sanitize_tree(root: &mut RenderNode, fallbacks: &ColorFallbacks) -> SanitizeReport {
    let mut report = SanitizeReport::default();
    root.walk_mut(&mut |node| {
        report.nodes += 1;
        let style = &mut node.style;

        for (prop, neutral) in EFFECTS {
            if let Some(current) = style.get(prop) {
                if !current.trim().eq_ignore_ascii_case(neutral) {
                    report.effects_stripped += 1;
                }
            }
            style.set(prop, neutral);
        }
        if style.get("background-image").map(is_gradient).unwrap_or(false) {
            style.set("background-image", "none");
            report.effects_stripped += 1;
        }

        let replacements = [
            ("background-color", &fallbacks.background),
            ("color", &fallbacks.text),
            ("border-color", &fallbacks.border),
        ];
        for (prop, fallback) in replacements {
            if style.get(prop).map(is_unsupported_encoding).unwrap_or(false) {
                style.set(prop, fallback);
                report.colors_replaced += 1;
            }
        }
        // `background: oklch(...)` shorthand carries the color too
        if style.get("background").map(is_unsupported_encoding).unwrap_or(false) {
            style.remove("background");
            style.set("background-color", &fallbacks.background);
            report.colors_replaced += 1;
        }
        for prop in BORDER_SHORTHANDS {
            let stripped = match style.get(prop) {
                Some(value) if is_unsupported_encoding(value) => strip_color_functions(value),
                _ => continue,
            };
            if stripped.is_empty() {
                style.remove(prop);
            } else {
                style.set(prop, &stripped);
            }
            style.set("border-color", &fallbacks.border);
            report.colors_replaced += 1;
        }
    });
    log::debug!(
        "sanitized {} nodes: {} effects stripped, {} colors replaced",
        report.nodes,
        report.effects_stripped,
        report.colors_replaced
    );
    report
}
