// visualizer-core/src/lib.rs

//! The core logic for the music visualizer widget.
//! This crate is responsible for file selection, playback, spectrum
//! analysis and the frequency-bar layout. It is completely headless
//! and contains no GUI code: the window, the canvas and the frame clock
//! are injected through the `Surface` and `FrameScheduler` traits.

pub mod analyser;
pub mod bridge;
pub mod config;
pub mod decode;
pub mod media;
pub mod playback;
pub mod render;
pub mod render_loop;
pub mod selection;
pub mod selector;

#[cfg(test)]
mod test_support;

pub use config::VisualizerConfig;
pub use selector::AudioSelector;
