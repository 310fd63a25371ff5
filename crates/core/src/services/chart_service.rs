use crate::models::chart::{Rect, Rgb, TreemapTile};
use crate::models::holding::{Aggregation, HoldingAggregate};

/// Smallest half-width of the color scale, in percent. Small moves stay
/// pale instead of saturating the map.
pub const MIN_COLOR_SCALE_PCT: f64 = 10.0;

/// Symmetric diverging color scale centred on 0%: red for losses, white for
/// flat, green for gains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    /// Half-width of the scale in percent; always at least `MIN_COLOR_SCALE_PCT`
    pub bound: f64,
}

impl ColorScale {
    /// Scale just wide enough for every defined percent change (and at
    /// least ±10%).
    pub fn symmetric(pct_changes: impl IntoIterator<Item = f64>) -> Self {
        let bound = pct_changes
            .into_iter()
            .filter(|p| p.is_finite())
            .map(f64::abs)
            .fold(MIN_COLOR_SCALE_PCT, f64::max);
        Self { bound }
    }

    /// Map a percent change onto `[0, 1]`; 0.5 is no change. Undefined
    /// changes sit at the neutral midpoint.
    pub fn normalize(&self, pct_change: Option<f64>) -> f64 {
        match pct_change {
            Some(p) if p.is_finite() => ((p + self.bound) / (2.0 * self.bound)).clamp(0.0, 1.0),
            _ => 0.5,
        }
    }

    /// Interpolated color for a percent change.
    pub fn color(&self, pct_change: Option<f64>) -> Rgb {
        let t = self.normalize(pct_change);
        if t < 0.5 {
            lerp(Rgb::RED, Rgb::WHITE, t * 2.0)
        } else {
            lerp(Rgb::WHITE, Rgb::GREEN, (t - 0.5) * 2.0)
        }
    }
}

fn lerp(from: Rgb, to: Rgb, t: f64) -> Rgb {
    let channel = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    Rgb {
        r: channel(from.r, to.r),
        g: channel(from.g, to.g),
        b: channel(from.b, to.b),
    }
}

/// Builds treemap data from aggregated holdings.
///
/// The core computes geometry, colors and labels; the frontend only draws.
pub struct ChartService;

impl ChartService {
    pub fn new() -> Self {
        Self
    }

    /// Color scale covering every holding's percent change.
    pub fn color_scale(&self, holdings: &[HoldingAggregate]) -> ColorScale {
        ColorScale::symmetric(holdings.iter().filter_map(|h| h.percent_change))
    }

    /// Lay out holdings as a squarified treemap filling `width` × `height`.
    ///
    /// Tile area is proportional to `total_value`. Holdings keep their
    /// aggregation order so tiles don't jump around between refreshes.
    /// Holdings without a positive value are left out.
    pub fn treemap(&self, aggregation: &Aggregation, width: f64, height: f64) -> Vec<TreemapTile> {
        let holdings: Vec<&HoldingAggregate> = aggregation
            .holdings
            .iter()
            .filter(|h| h.total_value.is_finite() && h.total_value > 0.0)
            .collect();
        if holdings.is_empty() || !(width > 0.0 && height > 0.0) {
            return Vec::new();
        }

        let scale = self.color_scale(&aggregation.holdings);
        let sizes: Vec<f64> = holdings.iter().map(|h| h.total_value).collect();
        let rects = squarify(&normalize_sizes(&sizes, width, height), 0.0, 0.0, width, height);

        holdings
            .into_iter()
            .zip(rects)
            .map(|(holding, rect)| TreemapTile {
                symbol: holding.symbol.clone(),
                rect,
                color: scale.color(holding.percent_change),
                label: tile_label(holding),
            })
            .collect()
    }
}

impl Default for ChartService {
    fn default() -> Self {
        Self::new()
    }
}

/// Tile caption: symbol, value, change, average buy price with the first
/// purchase date, and current price.
pub fn tile_label(holding: &HoldingAggregate) -> String {
    let change = holding
        .percent_change
        .map(|p| format!("{p:.2}%"))
        .unwrap_or_else(|| "N/A".into());
    format!(
        "{}\nValue: ${:.2}\nChange: {}\nBuy: ${:.2} ({})\nCurrent: ${:.2}",
        holding.symbol,
        holding.total_value,
        change,
        holding.weighted_average_buy_price,
        holding.earliest_date,
        holding.current_price,
    )
}

/// Scale sizes so they sum to the area of the `width` × `height` rectangle.
pub fn normalize_sizes(sizes: &[f64], width: f64, height: f64) -> Vec<f64> {
    let total: f64 = sizes.iter().sum();
    if total <= 0.0 {
        return vec![0.0; sizes.len()];
    }
    let area = width * height;
    sizes.iter().map(|s| s * area / total).collect()
}

/// Squarified treemap layout (Bruls, Huizing & van Wijk).
///
/// `sizes` must already be normalized to the rectangle's area. Rectangles
/// are returned in input order. Rows are laid along the shorter side, and a
/// row keeps growing while adding the next size does not worsen its worst
/// aspect ratio.
pub fn squarify(sizes: &[f64], x: f64, y: f64, dx: f64, dy: f64) -> Vec<Rect> {
    let mut rects = Vec::with_capacity(sizes.len());
    let (mut x, mut y, mut dx, mut dy) = (x, y, dx, dy);
    let mut remaining = sizes;

    while !remaining.is_empty() {
        if remaining.len() == 1 {
            rects.extend(layout(remaining, x, y, dx, dy));
            break;
        }

        let mut i = 1;
        while i < remaining.len()
            && worst_ratio(&remaining[..i], x, y, dx, dy)
                >= worst_ratio(&remaining[..=i], x, y, dx, dy)
        {
            i += 1;
        }

        let (current, rest) = remaining.split_at(i);
        rects.extend(layout(current, x, y, dx, dy));
        (x, y, dx, dy) = leftover(current, x, y, dx, dy);
        remaining = rest;
    }

    rects
}

/// Stack `sizes` as one column against the left edge (`dx >= dy`) or one
/// row against the top edge.
fn layout(sizes: &[f64], x: f64, y: f64, dx: f64, dy: f64) -> Vec<Rect> {
    let covered: f64 = sizes.iter().sum();
    let mut rects = Vec::with_capacity(sizes.len());
    if dx >= dy {
        let width = covered / dy;
        let mut y = y;
        for size in sizes {
            let h = size / width;
            rects.push(Rect { x, y, dx: width, dy: h });
            y += h;
        }
    } else {
        let height = covered / dx;
        let mut x = x;
        for size in sizes {
            let w = size / height;
            rects.push(Rect { x, y, dx: w, dy: height });
            x += w;
        }
    }
    rects
}

/// The rectangle left over after laying out `sizes`.
fn leftover(sizes: &[f64], x: f64, y: f64, dx: f64, dy: f64) -> (f64, f64, f64, f64) {
    let covered: f64 = sizes.iter().sum();
    if dx >= dy {
        let width = covered / dy;
        (x + width, y, dx - width, dy)
    } else {
        let height = covered / dx;
        (x, y + height, dx, dy - height)
    }
}

fn worst_ratio(sizes: &[f64], x: f64, y: f64, dx: f64, dy: f64) -> f64 {
    layout(sizes, x, y, dx, dy)
        .iter()
        .map(|r| (r.dx / r.dy).max(r.dy / r.dx))
        .fold(0.0, f64::max)
}
