/// Color values understood by the built-in rasterizer

use std::fmt;

/// Straight (non-premultiplied) RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba(pub u8, pub u8, pub u8, pub u8);

impl Rgba {
    pub const WHITE: Rgba = Rgba(255, 255, 255, 255);
    pub const BLACK: Rgba = Rgba(0, 0, 0, 255);
    pub const TRANSPARENT: Rgba = Rgba(0, 0, 0, 0);

    pub fn is_transparent(&self) -> bool {
        self.3 == 0
    }

    /// Parse `#rgb`, `#rgba`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(value: &str) -> Option<Rgba> {
        let hex = value.strip_prefix('#')?;
        let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        if !hex.is_ascii() {
            return None;
        }
        match hex.len() {
            3 => Some(Rgba(nibble(0)?, nibble(1)?, nibble(2)?, 255)),
            4 => Some(Rgba(nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
            6 => Some(Rgba(byte(0)?, byte(2)?, byte(4)?, 255)),
            8 => Some(Rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }

    pub fn to_hex(&self) -> String {
        if self.3 == 255 {
            format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.0, self.1, self.2, self.3)
        }
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Why a color value could not be used
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorError {
    /// A color space the rasterizer does not implement (oklch, lab, ...)
    UnsupportedEncoding(String),
    /// Not a color at all
    Invalid(String),
}

impl fmt::Display for ColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorError::UnsupportedEncoding(v) => write!(f, "unsupported color function '{}'", v),
            ColorError::Invalid(v) => write!(f, "invalid color '{}'", v),
        }
    }
}

const UNSUPPORTED_FUNCTIONS: [&str; 6] = ["oklch(", "oklab(", "lab(", "lch(", "color(", "color-mix("];

/// Whether `value` uses a color encoding the rasterizer cannot parse.
pub fn is_unsupported_encoding(value: &str) -> bool {
    let v = value.to_ascii_lowercase();
    UNSUPPORTED_FUNCTIONS.iter().any(|f| v.contains(f))
}

const NAMED: [(&str, Rgba); 10] = [
    ("black", Rgba::BLACK),
    ("white", Rgba::WHITE),
    ("red", Rgba(255, 0, 0, 255)),
    ("green", Rgba(0, 128, 0, 255)),
    ("blue", Rgba(0, 0, 255, 255)),
    ("gray", Rgba(128, 128, 128, 255)),
    ("grey", Rgba(128, 128, 128, 255)),
    ("orange", Rgba(255, 165, 0, 255)),
    ("teal", Rgba(0, 128, 128, 255)),
    ("transparent", Rgba::TRANSPARENT),
];

pub fn parse_color(value: &str) -> Result<Rgba, ColorError> {
    let v = value.trim().to_ascii_lowercase();
    if is_unsupported_encoding(&v) {
        return Err(ColorError::UnsupportedEncoding(value.trim().to_string()));
    }
    if v.starts_with('#') {
        return Rgba::from_hex(&v).ok_or_else(|| ColorError::Invalid(value.to_string()));
    }
    if let Some(args) = v
        .strip_prefix("rgba(")
        .or_else(|| v.strip_prefix("rgb("))
        .and_then(|rest| rest.strip_suffix(')'))
    {
        return parse_rgb_args(args).ok_or_else(|| ColorError::Invalid(value.to_string()));
    }
    NAMED
        .iter()
        .find(|(name, _)| *name == v)
        .map(|(_, c)| *c)
        .ok_or_else(|| ColorError::Invalid(value.to_string()))
}

// Accepts both `1, 2, 3, 0.5` and `1 2 3 / 50%`.
fn parse_rgb_args(args: &str) -> Option<Rgba> {
    let parts: Vec<&str> = args
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let channel = |s: &str| -> Option<u8> {
        match s.strip_suffix('%') {
            Some(p) => p.parse::<f32>().ok().map(|p| (p.clamp(0.0, 100.0) / 100.0 * 255.0).round() as u8),
            None => s.parse::<f32>().ok().map(|c| c.clamp(0.0, 255.0).round() as u8),
        }
    };
    let alpha = match parts.get(3) {
        Some(s) => match s.strip_suffix('%') {
            Some(p) => (p.parse::<f32>().ok()?.clamp(0.0, 100.0) / 100.0 * 255.0).round() as u8,
            None => (s.parse::<f32>().ok()?.clamp(0.0, 1.0) * 255.0).round() as u8,
        },
        None => 255,
    };
    Some(Rgba(channel(parts[0])?, channel(parts[1])?, channel(parts[2])?, alpha))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_rgb_and_names() {
        assert_eq!(parse_color("#18181b"), Ok(Rgba(0x18, 0x18, 0x1b, 255)));
        assert_eq!(parse_color("#FFF"), Ok(Rgba::WHITE));
        assert_eq!(parse_color("rgba(255, 255, 255, 0.2)"), Ok(Rgba(255, 255, 255, 51)));
        assert_eq!(parse_color("rgb(0 128 0 / 50%)"), Ok(Rgba(0, 128, 0, 128)));
        assert_eq!(parse_color("Transparent"), Ok(Rgba::TRANSPARENT));
    }

    #[test]
    fn perceptual_encodings_are_rejected() {
        assert!(is_unsupported_encoding("oklch(0.21 0.006 285.885)"));
        assert!(is_unsupported_encoding("LAB(50% 40 59)"));
        assert!(!is_unsupported_encoding("#cccccc"));
        assert!(matches!(
            parse_color("oklch(0.7 0.1 200)"),
            Err(ColorError::UnsupportedEncoding(_))
        ));
        assert!(matches!(parse_color("nope"), Err(ColorError::Invalid(_))));
    }

    #[test]
    fn hex_round_trips_through_display() {
        assert_eq!(Rgba(0xcc, 0xcc, 0xcc, 255).to_string(), "#cccccc");
    }
}
