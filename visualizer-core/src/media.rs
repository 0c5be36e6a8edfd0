//! # Media Element Module
//!
//! The playback element contract used by the widget, and the native
//! element that implements it with a dedicated audio worker thread.
//!
//! ## Architecture
//! - **Handle** (`NativeElement`): lives on the UI thread, flips transport
//!   flags and forwards commands.
//! - **Worker thread**: decodes the file packet by packet into a bounded
//!   block queue, owns the CPAL stream, obeys `Play` / `Pause` / `Shutdown`
//!   commands and performs rewinds.
//! - **Capture channel**: bounded crossbeam channel the output callback
//!   feeds with mono blocks; handed out once to an analysis graph.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, TryRecvError};
use log::{debug, info, warn};
use thiserror::Error;

use crate::decode::StreamingDecoder;
use crate::playback::{self, SourceBlock, Transport, SOURCE_QUEUE_BLOCKS};
use crate::selection::SelectedFile;

/// Number of output blocks the capture channel buffers before dropping.
pub const CAPTURE_QUEUE_BLOCKS: usize = 64;

/// How long the worker waits on a full block queue before checking commands.
const FEED_RETRY: Duration = Duration::from_millis(20);

/// Identity of one playback element; never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    /// Allocates a fresh identity.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ElementId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Mono blocks of whatever the element is currently sending to the speakers.
#[derive(Debug)]
pub struct SampleStream {
    receiver: Receiver<Vec<f32>>,
}

impl SampleStream {
    pub fn new(receiver: Receiver<Vec<f32>>) -> Self {
        Self { receiver }
    }

    /// Every block produced since the last call, oldest first.
    pub fn drain(&self) -> impl Iterator<Item = Vec<f32>> + '_ {
        self.receiver.try_iter()
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("cannot start audio worker: {0}")]
    Worker(#[from] std::io::Error),
}

/// A media-output handle bound to one selected file.
pub trait MediaElement {
    fn id(&self) -> ElementId;

    /// Starts or resumes sound. Restarts from the beginning after the end.
    fn play(&mut self);

    fn pause(&mut self);

    fn is_paused(&self) -> bool;

    /// True once playback ran past the last frame.
    fn has_ended(&self) -> bool;

    /// Hands out the element's output exactly once; `None` afterwards.
    fn capture_output(&mut self) -> Option<SampleStream>;
}

/// Creates playback elements for selected files.
pub trait MediaBackend {
    type Element: MediaElement;

    fn open(&mut self, file: &SelectedFile) -> Result<Self::Element, MediaError>;
}

/// Backend producing [`NativeElement`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl MediaBackend for NativeBackend {
    type Element = NativeElement;

    fn open(&mut self, file: &SelectedFile) -> Result<NativeElement, MediaError> {
        NativeElement::open(file)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Play,
    Pause,
    Shutdown,
}

/// Playback element backed by Symphonia decoding and a CPAL output stream.
#[derive(Debug)]
pub struct NativeElement {
    id: ElementId,
    transport: Arc<Transport>,
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
    capture: Option<Receiver<Vec<f32>>>,
}

impl NativeElement {
    /// Spawns the worker for `file`. Decoding happens in the background
    /// while the file plays; a file that fails to decode leaves the
    /// element silent.
    pub fn open(file: &SelectedFile) -> Result<Self, MediaError> {
        let id = ElementId::next();
        let transport = Arc::new(Transport::default());
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (capture_tx, capture_rx) = crossbeam_channel::bounded(CAPTURE_QUEUE_BLOCKS);

        let path = file.path.clone();
        let extension = file.extension();
        let worker_transport = Arc::clone(&transport);
        let worker = thread::Builder::new()
            .name(format!("audio-element-{}", id.0))
            .spawn(move || {
                debug!("Audio worker {} starting", id);
                if let Err(e) = run_worker(path, extension, &worker_transport, command_rx, capture_tx) {
                    warn!("Audio worker {} stopped: {:#}", id, e);
                    worker_transport.failed.store(true, Ordering::Release);
                    worker_transport.playing.store(false, Ordering::Release);
                }
                debug!("Audio worker {} finished", id);
            })?;

        info!("Created playback element {} for {}", id, file.name);
        Ok(Self {
            id,
            transport,
            commands: command_tx,
            worker: Some(worker),
            capture: Some(capture_rx),
        })
    }

    fn send(&self, command: Command) {
        // The worker is gone only after a failure, which already left us silent.
        let _ = self.commands.send(command);
    }
}

impl MediaElement for NativeElement {
    fn id(&self) -> ElementId {
        self.id
    }

    fn play(&mut self) {
        if self.transport.has_failed() {
            debug!("Element {} cannot play: audio failed to load", self.id);
            return;
        }
        if self.transport.ended.swap(false, Ordering::AcqRel) {
            self.transport.rewind.store(true, Ordering::Release);
        }
        self.transport.playing.store(true, Ordering::Release);
        self.send(Command::Play);
    }

    fn pause(&mut self) {
        self.transport.playing.store(false, Ordering::Release);
        self.send(Command::Pause);
    }

    fn is_paused(&self) -> bool {
        !self.transport.is_playing()
    }

    fn has_ended(&self) -> bool {
        self.transport.has_ended()
    }

    fn capture_output(&mut self) -> Option<SampleStream> {
        self.capture.take().map(SampleStream::new)
    }
}

impl Drop for NativeElement {
    fn drop(&mut self) {
        self.transport.playing.store(false, Ordering::Release);
        self.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Audio worker {} panicked", self.id);
            }
        }
        debug!("Released playback element {}", self.id);
    }
}

fn run_worker(
    path: PathBuf,
    extension: Option<String>,
    transport: &Arc<Transport>,
    commands: Receiver<Command>,
    capture: Sender<Vec<f32>>,
) -> anyhow::Result<()> {
    let mut decoder = StreamingDecoder::open(&path, extension.as_deref())?;
    let (block_tx, block_rx) = crossbeam_channel::bounded(SOURCE_QUEUE_BLOCKS);
    let stream = playback::open_output_stream(
        decoder.format(),
        block_rx,
        Arc::clone(transport),
        capture,
    )?;

    // Catch up with commands issued while the file was being probed.
    if transport.is_playing() {
        stream.play()?;
    } else {
        stream.pause()?;
    }

    let mut pending: Option<Vec<f32>> = None;
    loop {
        // Nothing left to feed: sleep until the handle says something.
        let idle = pending.is_none() && transport.source_done();
        let command = if idle {
            match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        } else {
            match commands.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        };

        match command {
            Some(Command::Play) => {
                if let Err(e) = stream.play() {
                    warn!("Error starting output stream: {}", e);
                }
            }
            Some(Command::Pause) => {
                if let Err(e) = stream.pause() {
                    warn!("Error pausing output stream: {}", e);
                }
            }
            Some(Command::Shutdown) => break,
            None => {}
        }

        if transport.rewind.load(Ordering::Acquire) {
            decoder.rewind()?;
            pending = None;
            transport.source_done.store(false, Ordering::Release);
            transport.generation.fetch_add(1, Ordering::AcqRel);
            transport.rewind.store(false, Ordering::Release);
            debug!("Rewound {}", path.display());
        }

        if pending.is_none() && !transport.source_done() {
            match decoder.next_block()? {
                Some(block) => pending = Some(block),
                None => {
                    debug!("Decoder reached the end of {}", path.display());
                    transport.source_done.store(true, Ordering::Release);
                }
            }
        }

        if let Some(samples) = pending.take() {
            let block = SourceBlock {
                generation: transport.generation(),
                samples,
            };
            match block_tx.send_timeout(block, FEED_RETRY) {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(block)) => pending = Some(block.samples),
                Err(SendTimeoutError::Disconnected(_)) => break,
            }
        }
    }

    if let Err(e) = stream.pause() {
        warn!("Error pausing stream on shutdown: {}", e);
    }
    drop(stream);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_ids_are_unique() {
        let a = ElementId::next();
        let b = ElementId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn sample_stream_drains_in_order() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        tx.send(vec![1.0]).unwrap();
        tx.send(vec![2.0, 3.0]).unwrap();
        let stream = SampleStream::new(rx);

        let blocks: Vec<Vec<f32>> = stream.drain().collect();
        assert_eq!(blocks, vec![vec![1.0], vec![2.0, 3.0]]);
        assert_eq!(stream.drain().count(), 0);
    }

    #[test]
    fn undecodable_file_leaves_element_silent() {
        let path = std::env::temp_dir().join(format!("visualizer-media-{}.mp3", std::process::id()));
        std::fs::write(&path, b"not an mp3 at all").unwrap();
        let file = SelectedFile::from_path(&path).unwrap();

        let mut element = NativeElement::open(&file).unwrap();
        // Wait for the worker to give up on the file.
        for _ in 0..200 {
            if element.transport.has_failed() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(element.transport.has_failed());

        element.play();
        assert!(element.is_paused());
        assert!(!element.has_ended());
    }

    #[test]
    fn output_can_be_captured_once() {
        let path = crate::test_support::write_wav("capture.wav", 8000, 1, &[0; 256]);
        let file = SelectedFile::from_path(&path).unwrap();

        let mut element = NativeElement::open(&file).unwrap();
        assert!(element.capture_output().is_some());
        assert!(element.capture_output().is_none());
        assert!(element.is_paused());
    }
}
