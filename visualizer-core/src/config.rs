//! # Visualizer Configuration
//!
//! Tunable parameters for the analyser node and the bar renderer. The
//! defaults reproduce a stock Web Audio `AnalyserNode` feeding a default
//! sized (300x150) HTML canvas, which is what the bar layout was designed
//! against.

use thiserror::Error;

/// Smallest FFT size an analyser accepts.
pub const MIN_FFT_SIZE: usize = 32;
/// Largest FFT size an analyser accepts.
pub const MAX_FFT_SIZE: usize = 32768;

/// Errors raised by [`VisualizerConfig::validate`].
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("fft size {0} must be a power of two between {} and {}", MIN_FFT_SIZE, MAX_FFT_SIZE)]
    InvalidFftSize(usize),
    #[error("smoothing time constant {0} must be within 0.0..=1.0")]
    InvalidSmoothing(f64),
    #[error("min decibels ({min}) must be lower than max decibels ({max})")]
    InvalidDecibelRange { min: f64, max: f64 },
    #[error("drawing surface must not be empty ({width}x{height})")]
    EmptySurface { width: f32, height: f32 },
}

/// All knobs of the widget in one place.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizerConfig {
    /// Analyser window length in samples.
    pub fft_size: usize,
    /// Weight of the previous frame when smoothing magnitudes.
    pub smoothing_time_constant: f64,
    /// Magnitude mapped to byte value 0.
    pub min_decibels: f64,
    /// Magnitude mapped to byte value 255.
    pub max_decibels: f64,
    /// Drawing surface width in pixels.
    pub surface_width: f32,
    /// Drawing surface height in pixels.
    pub surface_height: f32,
    /// Visual stretch applied to the per-bin bar width.
    pub bar_width_scale: f32,
    /// Horizontal gap between two bars.
    pub bar_gap: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            surface_width: 300.0,
            surface_height: 150.0,
            bar_width_scale: 2.5,
            bar_gap: 1.0,
        }
    }
}

impl VisualizerConfig {
    /// Number of frequency bins the analyser exposes.
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Checks every field and returns the configuration unchanged if it is usable.
    pub fn validate(self) -> Result<Self, ConfigError> {
        if !self.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(ConfigError::InvalidFftSize(self.fft_size));
        }
        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(ConfigError::InvalidSmoothing(self.smoothing_time_constant));
        }
        if !self.min_decibels.is_finite()
            || !self.max_decibels.is_finite()
            || self.min_decibels >= self.max_decibels
        {
            return Err(ConfigError::InvalidDecibelRange {
                min: self.min_decibels,
                max: self.max_decibels,
            });
        }
        // Written as `!(x > 0.0)` so NaN is rejected too.
        if !(self.surface_width > 0.0 && self.surface_width.is_finite())
            || !(self.surface_height > 0.0 && self.surface_height.is_finite())
        {
            return Err(ConfigError::EmptySurface {
                width: self.surface_width,
                height: self.surface_height,
            });
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_stock_analyser() {
        let config = VisualizerConfig::default().validate().unwrap();
        assert_eq!(config.fft_size, 2048);
        assert_eq!(config.frequency_bin_count(), 1024);
        assert_eq!(config.bar_width_scale, 2.5);
    }

    #[test]
    fn rejects_non_power_of_two_fft() {
        let config = VisualizerConfig {
            fft_size: 1000,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidFftSize(1000)));

        let config = VisualizerConfig {
            fft_size: 16,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidFftSize(16)));
    }

    #[test]
    fn rejects_inverted_decibel_range() {
        let config = VisualizerConfig {
            min_decibels: -10.0,
            max_decibels: -30.0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDecibelRange { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_smoothing() {
        let config = VisualizerConfig {
            smoothing_time_constant: 1.5,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidSmoothing(1.5)));
    }

    #[test]
    fn rejects_nan_and_infinite_values() {
        let config = VisualizerConfig {
            surface_width: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptySurface { .. })));

        let config = VisualizerConfig {
            surface_height: f32::INFINITY,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EmptySurface { .. })));

        let config = VisualizerConfig {
            min_decibels: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDecibelRange { .. })
        ));

        let config = VisualizerConfig {
            smoothing_time_constant: f64::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSmoothing(_))));
    }
}
