//! # Bar Rendering Module
//!
//! The frequency-bar picture: one bar per bin, left to right, anchored at
//! the bottom of a black surface. Drawing goes through the [`Surface`]
//! trait so the layout can be checked without a window; [`DisplayList`]
//! is the recording surface the GUI replays on its canvas.

use crate::config::VisualizerConfig;

/// An 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// A 2D immediate-mode drawing target.
pub trait Surface {
    fn width(&self) -> f32;
    fn height(&self) -> f32;
    /// Paints the whole surface with one colour.
    fn clear(&mut self, color: Rgb);
    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb);
}

/// Geometry and colour of one frequency bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub magnitude: u8,
}

impl Bar {
    /// Red channel before it is fitted into a byte; up to 355.
    pub fn raw_red(&self) -> u16 {
        self.magnitude as u16 + 100
    }

    /// Colour as painted: loud bins saturate at full red.
    pub fn color(&self) -> Rgb {
        Rgb::new(self.raw_red().min(255) as u8, 50, 50)
    }
}

/// Width of every bar for a surface `surface_width` wide showing `bin_count` bins.
pub fn bar_width(surface_width: f32, bin_count: usize, scale: f32) -> f32 {
    if bin_count == 0 {
        return 0.0;
    }
    (surface_width / bin_count as f32) * scale
}

/// Lays out one bar per magnitude of `snapshot`.
pub fn compute_bars(
    snapshot: &[u8],
    surface_width: f32,
    surface_height: f32,
    config: &VisualizerConfig,
) -> Vec<Bar> {
    let width = bar_width(surface_width, snapshot.len(), config.bar_width_scale);
    let mut x = 0.0;

    snapshot
        .iter()
        .map(|&magnitude| {
            let height = magnitude as f32 / 2.0;
            let bar = Bar {
                x,
                y: surface_height - height,
                width,
                height,
                magnitude,
            };
            x += width + config.bar_gap;
            bar
        })
        .collect()
}

/// Clears `surface` to black and paints the bars of `snapshot`.
pub fn draw_frame<S>(surface: &mut S, snapshot: &[u8], config: &VisualizerConfig)
where
    S: Surface + ?Sized,
{
    let (width, height) = (surface.width(), surface.height());
    surface.clear(Rgb::BLACK);
    for bar in compute_bars(snapshot, width, height, config) {
        surface.fill_rect(bar.x, bar.y, bar.width, bar.height, bar.color());
    }
}

/// One recorded drawing command.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear(Rgb),
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgb,
    },
}

/// A surface that remembers what was drawn since the last clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayList {
    width: f32,
    height: f32,
    ops: Vec<DrawOp>,
}

impl DisplayList {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Forgets every command.
    pub fn reset(&mut self) {
        self.ops.clear();
    }

    /// Number of rectangles drawn after the last clear.
    #[cfg(test)]
    pub(crate) fn rect_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DrawOp::FillRect { .. }))
            .count()
    }
}

impl Surface for DisplayList {
    fn width(&self) -> f32 {
        self.width
    }

    fn height(&self) -> f32 {
        self.height
    }

    fn clear(&mut self, color: Rgb) {
        self.ops.clear();
        self.ops.push(DrawOp::Clear(color));
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgb) {
        self.ops.push(DrawOp::FillRect {
            x,
            y,
            width,
            height,
            color,
        });
    }
}
