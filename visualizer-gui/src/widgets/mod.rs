//! Custom canvas widgets.

pub mod visualizer;
