//! Packed 24-bit colors
//!
//! Histogram bins and legend entries are keyed by `0xRRGGBB` integers so
//! that exact matches are a single integer comparison. Distances use the
//! largest per-channel difference: JPEG and anti-aliasing noise shifts all
//! channels a little, while two distinct slice colors differ a lot on at
//! least one channel.

use opencv::core::Vec3b;
use palette::Srgb;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 24-bit RGB color packed as `0xRRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct PackedColor(u32);

impl PackedColor {
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    /// Pack an OpenCV pixel (BGR channel order)
    pub fn from_bgr(pixel: &Vec3b) -> Self {
        Self::from_rgb(pixel[2], pixel[1], pixel[0])
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(self) -> u8 {
        self.0 as u8
    }

    /// Largest absolute per-channel difference
    pub fn distance(self, other: PackedColor) -> u8 {
        self.red()
            .abs_diff(other.red())
            .max(self.green().abs_diff(other.green()))
            .max(self.blue().abs_diff(other.blue()))
    }

    /// True when every channel reaches `level` (page background)
    pub fn is_brighter_than(self, level: u8) -> bool {
        self.red() >= level && self.green() >= level && self.blue() >= level
    }

    pub fn to_srgb(self) -> Srgb<u8> {
        Srgb::new(self.red(), self.green(), self.blue())
    }
}

impl From<Srgb<u8>> for PackedColor {
    fn from(color: Srgb<u8>) -> Self {
        Self::from_rgb(color.red, color.green, color.blue)
    }
}

impl From<[u8; 3]> for PackedColor {
    fn from([r, g, b]: [u8; 3]) -> Self {
        Self::from_rgb(r, g, b)
    }
}

impl From<PackedColor> for [u8; 3] {
    fn from(color: PackedColor) -> Self {
        [color.red(), color.green(), color.blue()]
    }
}

impl fmt::Display for PackedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:06X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgr_pixels_pack_as_rgb() {
        let pixel = Vec3b::from([0x10, 0x20, 0x30]);
        let packed = PackedColor::from_bgr(&pixel);
        assert_eq!(packed.value(), 0x302010);
        assert_eq!(packed.to_string(), "#302010");
    }

    #[test]
    fn test_max_channel_distance() {
        let a = PackedColor::from_rgb(100, 100, 100);
        let b = PackedColor::from_rgb(110, 95, 130);
        assert_eq!(a.distance(b), 30);
        assert_eq!(b.distance(a), 30);
        assert_eq!(a.distance(a), 0);
    }

    #[test]
    fn test_srgb_conversion() {
        let color = PackedColor::from_rgb(0xFF, 0x80, 0x00);
        let srgb = color.to_srgb();
        assert_eq!((srgb.red, srgb.green, srgb.blue), (0xFF, 0x80, 0x00));
        assert_eq!(PackedColor::from(srgb), color);
    }

    #[test]
    fn test_background_detection() {
        assert!(PackedColor::from_rgb(255, 252, 250).is_brighter_than(250));
        assert!(!PackedColor::from_rgb(255, 249, 255).is_brighter_than(250));
    }

    #[test]
    fn test_serde_as_rgb_triplet() {
        let color: PackedColor = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(color, PackedColor::from_rgb(1, 2, 3));
        assert_eq!(serde_json::to_string(&color).unwrap(), "[1,2,3]");
    }
}
