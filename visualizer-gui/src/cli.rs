//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;
use visualizer_core::config::{ConfigError, VisualizerConfig};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "music-visualizer")]
#[command(about = "Play an audio file and watch its frequency spectrum", long_about = None)]
pub struct Args {
    /// Audio file to select on startup
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Analyser window length (power of two, 32 to 32768)
    #[arg(long, value_name = "SAMPLES", default_value_t = 2048)]
    pub fft_size: usize,

    /// Weight of the previous frame when smoothing the spectrum (0.0 to 1.0)
    #[arg(long, value_name = "FACTOR", default_value_t = 0.8)]
    pub smoothing: f64,

    /// Visualizer width in pixels
    #[arg(long, value_name = "PIXELS", default_value_t = 300.0)]
    pub width: f32,

    /// Visualizer height in pixels
    #[arg(long, value_name = "PIXELS", default_value_t = 150.0)]
    pub height: f32,
}

impl Args {
    /// Builds and validates the widget configuration from the flags.
    pub fn visualizer_config(&self) -> Result<VisualizerConfig, ConfigError> {
        VisualizerConfig {
            fft_size: self.fft_size,
            smoothing_time_constant: self.smoothing,
            surface_width: self.width,
            surface_height: self.height,
            ..Default::default()
        }
        .validate()
    }
}
