use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Color of points that never escaped.
pub const INTERIOR: [u8; 3] = [0, 0, 0];

// Neon gradient anchors and their breakpoints in `t`.
static NEON_STOPS: [(f64, [u8; 3]); 4] = [
    (0.0, [13, 5, 25]),
    (0.2, [208, 99, 255]),
    (0.6, [99, 181, 255]),
    (1.0, [230, 245, 255]),
];

/// The fixed set of color palettes.
///
/// Each variant is a pure function of `(iterations, max_iterations)`; the
/// enum is matched exhaustively, so adding a palette is a compile-time
/// checked change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteId {
    #[default]
    Neon,
    Psychedelic,
    Grayscale,
    Fire,
}

impl PaletteId {
    pub const ALL: [PaletteId; 4] = [
        PaletteId::Neon,
        PaletteId::Psychedelic,
        PaletteId::Grayscale,
        PaletteId::Fire,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PaletteId::Neon => "neon",
            PaletteId::Psychedelic => "psychedelic",
            PaletteId::Grayscale => "grayscale",
            PaletteId::Fire => "fire",
        }
    }

    /// Map an escape count to RGB.
    ///
    /// `iterations >= max_iterations` is the interior and is always black.
    #[inline]
    pub fn color_for(self, iterations: u32, max_iterations: u32) -> [u8; 3] {
        if iterations >= max_iterations {
            return INTERIOR;
        }
        let t = iterations as f64 / max_iterations as f64;
        match self {
            PaletteId::Neon => neon(t),
            PaletteId::Psychedelic => psychedelic(t),
            PaletteId::Grayscale => {
                let v = (255.0 * t) as u8;
                [v, v, v]
            }
            PaletteId::Fire => [
                (255.0 * t.sqrt()) as u8,
                (255.0 * t.powi(2)) as u8,
                (255.0 * t.powi(8)) as u8,
            ],
        }
    }

    /// Sample `count` evenly spaced exterior colors, for palette swatches.
    pub fn preview_colors(self, count: u32) -> Vec<[u8; 3]> {
        (0..count).map(|i| self.color_for(i, count)).collect()
    }
}

impl fmt::Display for PaletteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPalette(pub String);

impl fmt::Display for UnknownPalette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown palette '{}'", self.0)
    }
}

impl std::error::Error for UnknownPalette {}

impl FromStr for PaletteId {
    type Err = UnknownPalette;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaletteId::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPalette(s.to_string()))
    }
}

fn neon(t: f64) -> [u8; 3] {
    let segment = NEON_STOPS
        .windows(2)
        .find(|pair| t < pair[1].0)
        .unwrap_or(&NEON_STOPS[2..4]);
    let (lo_t, lo) = segment[0];
    let (hi_t, hi) = segment[1];
    let local = (t - lo_t) / (hi_t - lo_t);
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * local) as u8;
    [lerp(lo[0], hi[0]), lerp(lo[1], hi[1]), lerp(lo[2], hi[2])]
}

/// Hue sweep at 90 % saturation, 50 % lightness.
fn psychedelic(t: f64) -> [u8; 3] {
    let hue = (360.0 * t).floor();
    let (s, l) = (0.9, 0.5);
    let c = (1.0 - (2.0 * l - 1.0f64).abs()) * s;
    let x = c * (1.0 - ((hue / 60.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;
    let (r, g, b) = match hue as u32 {
        0..=59 => (c, x, 0.0),
        60..=119 => (x, c, 0.0),
        120..=179 => (0.0, c, x),
        180..=239 => (0.0, x, c),
        240..=299 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let channel = |v: f64| ((v + m) * 255.0).round() as u8;
    [channel(r), channel(g), channel(b)]
}
