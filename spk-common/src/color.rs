//! RGB colour parsing, normalisation and nearest-colour lookup
//!
//! Spool colours arrive in several shapes: `#RRGGBB`, `RRGGBB`, `#RRGGBBAA`
//! from the printer sensors, occasionally lowercase or with trailing junk.
//! Everything stored is normalised to uppercase `#RRGGBB`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Colour used when the input cannot be interpreted
pub const DEFAULT_COLOR: &str = "#FFFFFF";

/// A colour in 8-bit RGB space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb { r: 0xFF, g: 0xFF, b: 0xFF };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse the first six hex digits of `raw`, with or without a leading `#`.
    ///
    /// Anything after the sixth digit (alpha channel, padding) is ignored.
    pub fn parse(raw: &str) -> Option<Self> {
        let hex = raw.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        let digits = hex.get(..6)?;
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
        Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
    }

    /// Euclidean distance in RGB space, 0.0 ..= ~441.67
    pub fn distance(&self, other: &Rgb) -> f64 {
        let dr = f64::from(self.r) - f64::from(other.r);
        let dg = f64::from(self.g) - f64::from(other.g);
        let db = f64::from(self.b) - f64::from(other.b);
        (dr * dr + dg * dg + db * db).sqrt()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = InvalidColor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rgb::parse(s).ok_or_else(|| InvalidColor(s.to_string()))
    }
}

/// Returned by `Rgb::from_str` for input without six leading hex digits
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid colour: {0:?}")]
pub struct InvalidColor(pub String);

/// Normalise a colour string to uppercase `#RRGGBB`.
///
/// Alpha and any other trailing characters are dropped. Empty or invalid
/// input maps to [`DEFAULT_COLOR`].
pub fn normalize(raw: &str) -> String {
    Rgb::parse(raw)
        .map(|rgb| rgb.to_string())
        .unwrap_or_else(|| DEFAULT_COLOR.to_string())
}

/// Pick the candidate nearest to `target`.
///
/// Only a candidate strictly closer than `max_distance` qualifies. Ties keep
/// the first candidate encountered.
pub fn find_closest<K, I>(target: Rgb, candidates: I, max_distance: f64) -> Option<(K, f64)>
where
    I: IntoIterator<Item = (K, Rgb)>,
{
    let mut best: Option<(K, f64)> = None;
    for (key, rgb) in candidates {
        let d = target.distance(&rgb);
        if d >= max_distance {
            continue;
        }
        match &best {
            Some((_, best_d)) if d >= *best_d => {}
            _ => best = Some((key, d)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_hash_and_bare_forms() {
        assert_eq!(Rgb::parse("#9a9a9a"), Some(Rgb::new(0x9A, 0x9A, 0x9A)));
        assert_eq!(Rgb::parse("0080FF"), Some(Rgb::new(0, 0x80, 0xFF)));
        assert_eq!(Rgb::parse("#12345"), None);
        assert_eq!(Rgb::parse("#GG0000"), None);
        assert_eq!(Rgb::parse(""), None);
    }

    #[test]
    fn test_distance_is_symmetric_and_zero_on_identity() {
        let samples = [
            Rgb::new(0, 0, 0),
            Rgb::new(255, 255, 255),
            Rgb::new(0x9A, 0x9A, 0x9A),
            Rgb::new(12, 200, 77),
        ];
        for a in &samples {
            assert_eq!(a.distance(a), 0.0);
            for b in &samples {
                assert_eq!(a.distance(b), b.distance(a));
            }
        }
        let max = Rgb::new(0, 0, 0).distance(&Rgb::WHITE);
        assert!((max - 441.67).abs() < 0.01);
    }

    #[test]
    fn test_normalize_truncates_alpha_and_uppercases() {
        assert_eq!(normalize("#9a9a9aff"), "#9A9A9A");
        assert_eq!(normalize("000000FFAB"), "#000000");
        assert_eq!(normalize("#abcdef"), "#ABCDEF");
        assert_eq!(normalize("  #ABCDEF  "), "#ABCDEF");
    }

    #[test]
    fn test_normalize_invalid_maps_to_default() {
        assert_eq!(normalize(""), DEFAULT_COLOR);
        assert_eq!(normalize("red"), DEFAULT_COLOR);
        assert_eq!(normalize("#FFF"), DEFAULT_COLOR);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["#9a9a9aff", "abc", "", "#000000", "12ab34cd", "zzzzzz"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "input {:?}", raw);
        }
    }

    #[test]
    fn test_find_closest_respects_threshold() {
        let target = Rgb::new(100, 100, 100);
        let candidates = vec![
            ("far", Rgb::new(200, 200, 200)),
            ("near", Rgb::new(110, 100, 100)),
        ];
        let (key, d) = find_closest(target, candidates.clone(), 30.0).unwrap();
        assert_eq!(key, "near");
        assert!((d - 10.0).abs() < f64::EPSILON);

        // Distance exactly at the threshold does not qualify
        assert!(find_closest(target, vec![("edge", Rgb::new(130, 100, 100))], 30.0).is_none());
        assert!(find_closest(target, candidates, 5.0).is_none());
    }

    #[test]
    fn test_find_closest_ties_keep_first() {
        let target = Rgb::new(50, 50, 50);
        let candidates = vec![
            ("first", Rgb::new(60, 50, 50)),
            ("second", Rgb::new(40, 50, 50)),
        ];
        assert_eq!(find_closest(target, candidates, 30.0).map(|(k, _)| k), Some("first"));
    }

    #[test]
    fn test_find_closest_empty_is_none() {
        let empty: Vec<(u32, Rgb)> = Vec::new();
        assert!(find_closest(Rgb::WHITE, empty, 30.0).is_none());
    }
}
