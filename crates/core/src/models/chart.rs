use serde::{Deserialize, Serialize};

/// An RGB color, 8 bits per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
    pub const WHITE: Rgb = Rgb { r: 255, g: 255, b: 255 };
    pub const GREEN: Rgb = Rgb { r: 0, g: 128, b: 0 };

    /// Hex form, e.g. `#ff0000`.
    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// An axis-aligned rectangle in layout coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub dx: f64,
    pub dy: f64,
}

impl Rect {
    pub fn area(&self) -> f64 {
        self.dx * self.dy
    }
}

/// One holding's tile in the treemap.
///
/// The core computes geometry, color and label text; the frontend only draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreemapTile {
    pub symbol: String,

    /// Position and size; area is proportional to the holding's value
    pub rect: Rect,

    pub color: Rgb,

    /// Multi-line label: symbol, value, change, buy price (date), current price
    pub label: String,
}
