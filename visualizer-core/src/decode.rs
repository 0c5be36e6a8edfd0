//! # Decode Module
//!
//! Streams a selected file as interleaved `f32` blocks with Symphonia, one
//! block per packet. Only the packet being decoded is held here; the
//! playback worker moves blocks into a bounded queue as the output
//! callback drains it.

use std::fs::File;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("cannot open audio file: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported or corrupt audio: {0}")]
    Format(#[from] SymphError),
    #[error("file contains no decodable audio track")]
    NoTrack,
    #[error("audio track does not declare a sample rate")]
    NoSampleRate,
}

/// Sample rate and channel layout of a decoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

/// Packet-by-packet decoder over the first audio track of a file.
pub struct StreamingDecoder {
    path: PathBuf,
    extension: Option<String>,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: AudioFormat,
    sample_buf: Option<SampleBuffer<f32>>,
    buf_frames: usize,
    /// Block decoded while discovering the format, handed out first.
    primed: Option<Vec<f32>>,
}

impl StreamingDecoder {
    /// Probes `path` and prepares a decoder for its first audio track.
    ///
    /// `extension` is only a hint for the probe.
    pub fn open(path: &Path, extension: Option<&str>) -> Result<Self, DecodeError> {
        let file = File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoTrack)?;
        let track_id = track.id;
        let declared_rate = track.codec_params.sample_rate;
        let declared_channels = track.codec_params.channels.map(|c| c.count());
        let decoder =
            symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let mut stream = Self {
            path: path.to_path_buf(),
            extension: extension.map(str::to_owned),
            reader,
            decoder,
            track_id,
            format: AudioFormat {
                sample_rate: declared_rate.unwrap_or(0),
                channels: declared_channels.unwrap_or(0),
            },
            sample_buf: None,
            buf_frames: 0,
            primed: None,
        };

        // Some containers only reveal the layout in the first packet.
        if declared_rate.is_none() || declared_channels.is_none() {
            stream.primed = stream.decode_next()?;
        }
        if stream.format.sample_rate == 0 {
            return Err(DecodeError::NoSampleRate);
        }
        stream.format.channels = stream.format.channels.max(1);

        debug!(
            "streaming {} at {} Hz ({} channels)",
            path.display(),
            stream.format.sample_rate,
            stream.format.channels
        );
        Ok(stream)
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Next block of interleaved samples; `None` once the track is exhausted.
    pub fn next_block(&mut self) -> Result<Option<Vec<f32>>, DecodeError> {
        if let Some(block) = self.primed.take() {
            return Ok(Some(block));
        }
        self.decode_next()
    }

    /// Goes back to the first frame. Containers that cannot seek are
    /// reopened instead.
    pub fn rewind(&mut self) -> Result<(), DecodeError> {
        let target = SeekTo::Time {
            time: Time::new(0, 0.0),
            track_id: Some(self.track_id),
        };
        match self.reader.seek(SeekMode::Accurate, target) {
            Ok(_) => {
                self.decoder.reset();
                self.primed = None;
            }
            Err(e) => {
                debug!("seek failed ({}), reopening {}", e, self.path.display());
                let reopened = Self::open(&self.path, self.extension.as_deref())?;
                *self = reopened;
            }
        }
        Ok(())
    }

    fn decode_next(&mut self) -> Result<Option<Vec<f32>>, DecodeError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphError::ResetRequired) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    if self.format.sample_rate == 0 {
                        self.format.sample_rate = spec.rate;
                    }
                    if self.format.channels == 0 {
                        self.format.channels = spec.channels.count();
                    }

                    // Packets may grow; reallocate the conversion buffer when they do.
                    if self.sample_buf.is_none() || decoded.capacity() > self.buf_frames {
                        self.buf_frames = decoded.capacity();
                        self.sample_buf = Some(SampleBuffer::<f32>::new(self.buf_frames as u64, spec));
                    }
                    if let Some(buf) = self.sample_buf.as_mut() {
                        buf.copy_interleaved_ref(decoded);
                        return Ok(Some(buf.samples().to_vec()));
                    }
                }
                Err(SymphError::DecodeError(e)) => {
                    warn!("skipping corrupt packet: {}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_wav;

    fn drain(stream: &mut StreamingDecoder) -> Vec<f32> {
        let mut samples = Vec::new();
        while let Some(block) = stream.next_block().unwrap() {
            samples.extend(block);
        }
        samples
    }

    #[test]
    fn streams_pcm_wav() {
        let samples: Vec<i16> = (0..800).map(|i| if i % 2 == 0 { 16384 } else { -16384 }).collect();
        let path = write_wav("stereo.wav", 8000, 2, &samples);

        let mut stream = StreamingDecoder::open(&path, Some("wav")).unwrap();
        assert_eq!(
            stream.format(),
            AudioFormat {
                sample_rate: 8000,
                channels: 2
            }
        );

        let decoded = drain(&mut stream);
        assert_eq!(decoded.len(), 800);
        assert!((decoded[0] - 0.5).abs() < 1e-3);
        assert!((decoded[1] + 0.5).abs() < 1e-3);
        assert!(stream.next_block().unwrap().is_none());
    }

    #[test]
    fn rewind_starts_over_from_the_first_frame() {
        let samples: Vec<i16> = (0..4000).map(|i| (i % 1000) as i16 * 16).collect();
        let path = write_wav("rewind.wav", 8000, 1, &samples);

        let mut stream = StreamingDecoder::open(&path, Some("wav")).unwrap();
        let first_pass = drain(&mut stream);
        assert_eq!(first_pass.len(), 4000);

        stream.rewind().unwrap();
        let second_pass = drain(&mut stream);
        assert_eq!(second_pass, first_pass);
    }

    #[test]
    fn garbage_is_rejected() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("visualizer-garbage-{}.bin", std::process::id()));
        std::fs::write(&path, b"this is certainly not audio").unwrap();

        assert!(StreamingDecoder::open(&path, None).is_err());
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = StreamingDecoder::open(Path::new("/no/such/audio.wav"), Some("wav"));
        assert!(matches!(result, Err(DecodeError::Io(_))));
    }
}
