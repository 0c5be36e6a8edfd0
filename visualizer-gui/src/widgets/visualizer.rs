//! # Visualizer Widget
//!
//! Replays the display list produced by the render loop on an iced
//! canvas: a black background with one red bar per frequency bin.
//! The canvas has the fixed size of the drawing surface, so recorded
//! coordinates map one to one onto canvas pixels.

use iced::widget::canvas::{self, Geometry};
use iced::widget::container;
use iced::{mouse, Color, Element, Length, Point, Rectangle, Renderer, Size, Theme};
use visualizer_core::render::{DisplayList, DrawOp, Rgb, Surface};

pub struct Visualizer<'a> {
    /// Commands recorded during the last frame
    frame: &'a DisplayList,
}

impl<'a> Visualizer<'a> {
    pub fn new(frame: &'a DisplayList) -> Self {
        Self { frame }
    }

    pub fn view(self) -> Element<'a, crate::Message> {
        let (width, height) = (self.frame.width(), self.frame.height());
        container(
            canvas::Canvas::new(self)
                .width(Length::Fixed(width))
                .height(Length::Fixed(height)),
        )
        .into()
    }
}

fn to_color(rgb: Rgb) -> Color {
    Color::from_rgb8(rgb.r, rgb.g, rgb.b)
}

impl<Message> canvas::Program<Message> for Visualizer<'_> {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());

        for op in self.frame.ops() {
            match *op {
                DrawOp::Clear(color) => {
                    frame.fill_rectangle(Point::ORIGIN, bounds.size(), to_color(color));
                }
                DrawOp::FillRect {
                    x,
                    y,
                    width,
                    height,
                    color,
                } => {
                    frame.fill_rectangle(Point::new(x, y), Size::new(width, height), to_color(color));
                }
            }
        }

        vec![frame.into_geometry()]
    }
}
