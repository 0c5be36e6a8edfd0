//! # Analyser Module
//!
//! Frequency-domain snapshots of whatever an element is playing, with the
//! same conventions as a Web Audio `AnalyserNode`: Blackman window,
//! magnitude smoothing between snapshots, decibel conversion and a linear
//! byte quantization between `min_decibels` and `max_decibels`.
//!
//! ## Features
//! - High-performance FFT using RustFFT, planned once per analyser
//! - Time-domain history of the last `fft_size` samples
//! - Float (dB) and byte (0-255) frequency data

use std::collections::VecDeque;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use crate::config::VisualizerConfig;
use crate::media::SampleStream;

/// Something that can fill a byte buffer with per-bin magnitudes.
///
/// The render loop only needs this much of an analyser.
pub trait FrequencySource {
    fn frequency_bin_count(&self) -> usize;

    /// Writes at most `frequency_bin_count()` bytes into `out`.
    fn get_byte_frequency_data(&mut self, out: &mut [u8]);
}

/// Builds a Blackman window of `len` coefficients (alpha = 0.16).
fn blackman_window(len: usize) -> Vec<f32> {
    let n = len as f32;
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    (0..len)
        .map(|i| {
            let x = i as f32 / n;
            a0 - a1 * (2.0 * std::f32::consts::PI * x).cos()
                + a2 * (4.0 * std::f32::consts::PI * x).cos()
        })
        .collect()
}

pub struct Analyser {
    fft_size: usize,
    smoothing_time_constant: f64,
    min_decibels: f64,
    max_decibels: f64,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    history: VecDeque<f32>,
    smoothed: Vec<f32>,
    input: Option<SampleStream>,
}

impl std::fmt::Debug for Analyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing_time_constant", &self.smoothing_time_constant)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .field("connected", &self.input.is_some())
            .finish()
    }
}

impl Analyser {
    /// Creates a disconnected analyser. `config` is expected to be validated.
    pub fn new(config: &VisualizerConfig) -> Self {
        let fft_size = config.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        Self {
            fft_size,
            smoothing_time_constant: config.smoothing_time_constant,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            window: blackman_window(fft_size),
            fft,
            buffer: vec![Complex { re: 0.0, im: 0.0 }; fft_size],
            history: std::iter::repeat(0.0).take(fft_size).collect(),
            smoothed: vec![0.0; fft_size / 2],
            input: None,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn is_connected(&self) -> bool {
        self.input.is_some()
    }

    /// Routes an element's output into this analyser.
    pub fn connect(&mut self, input: SampleStream) {
        self.input = Some(input);
    }

    /// Stops listening; returns the stream that was connected, if any.
    pub fn disconnect(&mut self) -> Option<SampleStream> {
        self.input.take()
    }

    /// Appends time-domain samples, keeping only the newest `fft_size`.
    pub fn push_samples(&mut self, samples: &[f32]) {
        let skip = samples.len().saturating_sub(self.fft_size);
        for &sample in &samples[skip..] {
            self.history.pop_front();
            self.history.push_back(sample);
        }
    }

    fn pull_input(&mut self) {
        let blocks: Vec<Vec<f32>> = match &self.input {
            Some(input) => input.drain().collect(),
            None => return,
        };
        for block in blocks {
            self.push_samples(&block);
        }
    }

    /// Runs the FFT over the current history and updates the smoothed magnitudes.
    fn analyse(&mut self) {
        self.pull_input();

        for ((slot, &sample), &w) in self
            .buffer
            .iter_mut()
            .zip(self.history.iter())
            .zip(self.window.iter())
        {
            *slot = Complex {
                re: sample * w,
                im: 0.0,
            };
        }
        self.fft.process(&mut self.buffer);

        let tau = self.smoothing_time_constant as f32;
        let scale = 1.0 / self.fft_size as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(self.buffer.iter()) {
            let magnitude = bin.norm() * scale;
            let next = tau * *smoothed + (1.0 - tau) * magnitude;
            *smoothed = if next.is_finite() { next } else { 0.0 };
        }
    }

    /// Current spectrum in decibels. Silent bins are negative infinity.
    pub fn get_float_frequency_data(&mut self, out: &mut [f32]) {
        self.analyse();
        for (slot, &magnitude) in out.iter_mut().zip(self.smoothed.iter()) {
            *slot = 20.0 * magnitude.log10();
        }
    }

    /// Maps a decibel value onto the analyser's byte range.
    pub fn decibels_to_byte(&self, db: f64) -> u8 {
        let range = self.max_decibels - self.min_decibels;
        let scaled = (255.0 / range * (db - self.min_decibels)).floor();
        if scaled.is_nan() {
            0
        } else {
            scaled.clamp(0.0, 255.0) as u8
        }
    }
}

impl FrequencySource for Analyser {
    fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    fn get_byte_frequency_data(&mut self, out: &mut [u8]) {
        self.analyse();
        for (slot, &magnitude) in out.iter_mut().zip(self.smoothed.iter()) {
            let db = 20.0 * (magnitude as f64).log10();
            *slot = self.decibels_to_byte(db);
        }
    }
}
