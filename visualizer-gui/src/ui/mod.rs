//! # UI Module
//!
//! Layout of the music visualizer window.

pub mod main_display;
