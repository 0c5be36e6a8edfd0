//! # Playback Output Module
//!
//! Sends decoded audio to the default output device through CPAL and
//! mirrors every block it plays into the capture channel that an analysis
//! graph can listen to.
//!
//! ## Features
//! - Default output device with the closest matching stream configuration
//! - `f32`, `i16` and `u16` device formats
//! - Decoded blocks arrive over a bounded queue, so memory use does not
//!   grow with the length of the file
//! - Nearest-frame rate conversion and channel mapping
//! - Non-blocking capture tap (`try_send`, never stalls the audio thread)

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{FromSample, Sample, SizedSample, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, Sender};
use log::{error, info};

use crate::decode::AudioFormat;

/// Decoded blocks buffered between the decoder and the output callback.
pub const SOURCE_QUEUE_BLOCKS: usize = 32;

/// One decoded packet on its way to the output callback.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceBlock {
    /// Rewind generation the block was decoded in.
    pub generation: u64,
    /// Interleaved samples in `-1.0..=1.0`.
    pub samples: Vec<f32>,
}

/// Transport flags shared between the element handle, its worker thread
/// and the output callback.
#[derive(Debug, Default)]
pub struct Transport {
    pub playing: AtomicBool,
    pub ended: AtomicBool,
    /// Requested by the handle, cleared by the worker once it has seeked.
    pub rewind: AtomicBool,
    pub failed: AtomicBool,
    /// Set once the decoder has queued its last block.
    pub source_done: AtomicBool,
    /// Bumped on every rewind; blocks of older generations are stale.
    pub generation: AtomicU64,
}

impl Transport {
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub fn source_done(&self) -> bool {
        self.source_done.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

enum Fetch {
    Frame(usize),
    /// The decoder is behind; play silence and try again.
    Underrun,
    Exhausted,
}

/// Walks through the queued blocks at the device rate and fills output blocks.
pub struct PlaybackCursor {
    format: AudioFormat,
    source: Receiver<SourceBlock>,
    transport: Arc<Transport>,
    tap: Sender<Vec<f32>>,
    block: Vec<f32>,
    generation: u64,
    /// Position in source frames, relative to the start of `block`.
    position: f64,
    /// Source frames consumed per output frame.
    step: f64,
    out_channels: usize,
}

impl PlaybackCursor {
    pub fn new(
        format: AudioFormat,
        source: Receiver<SourceBlock>,
        transport: Arc<Transport>,
        tap: Sender<Vec<f32>>,
        device_rate: u32,
        out_channels: usize,
    ) -> Self {
        let step = if device_rate == 0 {
            1.0
        } else {
            format.sample_rate as f64 / device_rate as f64
        };
        Self {
            format: AudioFormat {
                channels: format.channels.max(1),
                ..format
            },
            source,
            transport,
            tap,
            block: Vec::new(),
            generation: 0,
            position: 0.0,
            step,
            out_channels: out_channels.max(1),
        }
    }

    /// Fills one interleaved output block. Silence while paused, while a
    /// rewind is pending, during an underrun and past the end.
    pub fn fill(&mut self, out: &mut [f32]) {
        if !self.transport.is_playing() || self.transport.rewind.load(Ordering::Acquire) {
            out.fill(0.0);
            return;
        }

        let generation = self.transport.generation();
        if generation != self.generation {
            self.generation = generation;
            self.block.clear();
            self.position = 0.0;
        }

        let channels = self.format.channels;
        let mut mono = Vec::with_capacity(out.len() / self.out_channels);
        let mut reached_end = false;

        for frame in out.chunks_mut(self.out_channels) {
            let index = match self.fetch_frame() {
                Fetch::Frame(index) => index,
                Fetch::Underrun => {
                    frame.fill(0.0);
                    continue;
                }
                Fetch::Exhausted => {
                    frame.fill(0.0);
                    reached_end = true;
                    continue;
                }
            };
            let source = &self.block[index * channels..(index + 1) * channels];
            for (channel, sample) in frame.iter_mut().enumerate() {
                *sample = source[channel % channels];
            }
            mono.push(source.iter().sum::<f32>() / channels as f32);
            self.position += self.step;
        }

        if !mono.is_empty() {
            // A full or disconnected tap just means nobody is listening.
            let _ = self.tap.try_send(mono);
        }

        if reached_end {
            self.transport.playing.store(false, Ordering::Release);
            self.transport.ended.store(true, Ordering::Release);
        }
    }

    fn fetch_frame(&mut self) -> Fetch {
        loop {
            let frames = self.block.len() / self.format.channels;
            let index = self.position as usize;
            if index < frames {
                return Fetch::Frame(index);
            }
            // Read before polling: a block queued ahead of the flag is never missed.
            let done = self.transport.source_done();
            match self.next_block() {
                Some(block) => {
                    self.position -= frames as f64;
                    self.block = block;
                }
                None if done => return Fetch::Exhausted,
                None => return Fetch::Underrun,
            }
        }
    }

    fn next_block(&mut self) -> Option<Vec<f32>> {
        while let Ok(block) = self.source.try_recv() {
            if block.generation == self.generation {
                return Some(block.samples);
            }
        }
        None
    }
}

/// Opens an output stream on the default device that plays the blocks
/// arriving on `source`.
///
/// The stream is returned paused; the caller drives it with `play`/`pause`.
pub fn open_output_stream(
    format: AudioFormat,
    source: Receiver<SourceBlock>,
    transport: Arc<Transport>,
    tap: Sender<Vec<f32>>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))?;

    info!("Using audio output device: {}", device.name()?);

    let configs = device.supported_output_configs()?.collect::<Vec<_>>();
    let supported = match find_supported_config(configs, format.channels as u16, format.sample_rate) {
        Some(range) => {
            let rate = format
                .sample_rate
                .clamp(range.min_sample_rate().0, range.max_sample_rate().0);
            range.with_sample_rate(cpal::SampleRate(rate))
        }
        None => device.default_output_config()?,
    };

    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    info!(
        "Selected output: {} Hz, {} channels, {:?}",
        config.sample_rate.0, config.channels, sample_format
    );

    let cursor = PlaybackCursor::new(
        format,
        source,
        transport,
        tap,
        config.sample_rate.0,
        config.channels as usize,
    );

    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, cursor),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, cursor),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, cursor),
        other => Err(anyhow!("Unsupported output sample format {:?}", other)),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut cursor: PlaybackCursor,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let err_fn = |err| error!("An error occurred on the output stream: {}", err);
    let mut scratch: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            scratch.resize(data.len(), 0.0);
            cursor.fill(&mut scratch);
            for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                *out = T::from_sample(sample);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Finds the best output configuration for the decoded audio.
///
/// Prefers `f32`, then the same channel count, then the range closest to
/// the file's sample rate.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    channels: u16,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs.into_iter().min_by_key(|c| {
        let format_penalty = if c.sample_format() == cpal::SampleFormat::F32 { 0 } else { 1 };
        let channel_penalty = if c.channels() == channels { 0 } else { 1 };
        let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
        let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
        let rate_diff = if (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_rate) {
            0
        } else {
            min_diff.min(max_diff)
        };
        (format_penalty, channel_penalty, rate_diff)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rig {
        cursor: PlaybackCursor,
        transport: Arc<Transport>,
        blocks: Sender<SourceBlock>,
        tapped: Receiver<Vec<f32>>,
    }

    impl Rig {
        fn new(channels: usize, out_channels: usize) -> Self {
            let format = AudioFormat {
                sample_rate: 48000,
                channels,
            };
            let transport = Arc::new(Transport::default());
            let (blocks, source) = crossbeam_channel::bounded(SOURCE_QUEUE_BLOCKS);
            let (tap, tapped) = crossbeam_channel::bounded(8);
            let cursor = PlaybackCursor::new(format, source, transport.clone(), tap, 48000, out_channels);
            Rig {
                cursor,
                transport,
                blocks,
                tapped,
            }
        }

        fn queue(&self, samples: Vec<f32>) {
            let generation = self.transport.generation();
            self.blocks.send(SourceBlock { generation, samples }).unwrap();
        }

        fn play(&self) {
            self.transport.playing.store(true, Ordering::Release);
        }
    }

    #[test]
    fn paused_cursor_outputs_silence() {
        let mut rig = Rig::new(1, 1);
        rig.queue(vec![0.5; 16]);

        let mut out = [1.0f32; 8];
        rig.cursor.fill(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(rig.tapped.try_recv().is_err());
        assert_eq!(rig.blocks.len(), 1);
    }

    #[test]
    fn playing_cursor_crosses_blocks_and_taps() {
        let mut rig = Rig::new(2, 2);
        rig.queue(vec![0.2, 0.4]);
        rig.queue(vec![0.6, 0.8]);
        rig.play();

        let mut out = [0.0f32; 4];
        rig.cursor.fill(&mut out);
        assert_eq!(out, [0.2, 0.4, 0.6, 0.8]);

        let tapped = rig.tapped.try_recv().unwrap();
        assert_eq!(tapped.len(), 2);
        assert!((tapped[0] - 0.3).abs() < 1e-6);
        assert!((tapped[1] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn mono_source_feeds_every_output_channel() {
        let mut rig = Rig::new(1, 2);
        rig.queue(vec![0.25, -0.25]);
        rig.play();

        let mut out = [0.0f32; 4];
        rig.cursor.fill(&mut out);
        assert_eq!(out, [0.25, 0.25, -0.25, -0.25]);
    }

    #[test]
    fn underrun_is_silence_not_the_end() {
        let mut rig = Rig::new(1, 1);
        rig.queue(vec![0.1]);
        rig.play();

        let mut out = [9.0f32; 3];
        rig.cursor.fill(&mut out);
        assert_eq!(out, [0.1, 0.0, 0.0]);
        assert!(!rig.transport.has_ended());
        assert!(rig.transport.is_playing());

        // Playback resumes where it left off once the decoder catches up.
        rig.queue(vec![0.2, 0.3]);
        let mut out = [0.0f32; 2];
        rig.cursor.fill(&mut out);
        assert_eq!(out, [0.2, 0.3]);
    }

    #[test]
    fn exhausted_source_marks_transport_ended() {
        let mut rig = Rig::new(1, 1);
        rig.queue(vec![0.1, 0.2]);
        rig.transport.source_done.store(true, Ordering::Release);
        rig.play();

        let mut out = [9.0f32; 4];
        rig.cursor.fill(&mut out);
        assert_eq!(out, [0.1, 0.2, 0.0, 0.0]);
        assert!(rig.transport.has_ended());
        assert!(!rig.transport.is_playing());
    }

    #[test]
    fn stale_blocks_are_skipped_after_a_rewind() {
        let mut rig = Rig::new(1, 1);
        rig.queue(vec![0.9, 0.9]);
        rig.play();

        let mut out = [0.0f32; 1];
        rig.cursor.fill(&mut out);
        assert_eq!(out, [0.9]);

        rig.queue(vec![0.8, 0.8]);
        rig.transport.generation.fetch_add(1, Ordering::AcqRel);
        rig.queue(vec![0.1, 0.2]);

        let mut out = [0.0f32; 2];
        rig.cursor.fill(&mut out);
        assert_eq!(out, [0.1, 0.2]);
    }

    #[test]
    fn pending_rewind_holds_the_output_silent() {
        let mut rig = Rig::new(1, 1);
        rig.queue(vec![0.5, 0.5]);
        rig.play();
        rig.transport.rewind.store(true, Ordering::Release);

        let mut out = [1.0f32; 2];
        rig.cursor.fill(&mut out);
        assert_eq!(out, [0.0, 0.0]);
        assert_eq!(rig.blocks.len(), 1);
    }
}
