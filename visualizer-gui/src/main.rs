//! # Music Visualizer - Audio File Player with Frequency Bars
//!
//! The window hosts the audio selector widget: drop or pick an audio
//! file, press play, and the frequency spectrum of what is playing is
//! drawn as red bars on a black canvas.
//!
//! ## Architecture
//! - **Main Thread**: Iced GUI application with dark theme
//! - **Audio Thread**: One worker per selected file (decode + output stream)
//! - **Communication**: Crossbeam channels between the worker and the analyser
//! - **Updates**: The render loop is driven by window frames while it has a
//!   request pending, so nothing is redrawn while paused

mod cli;
mod ui;
mod widgets;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use iced::{event, window, Element, Event, Subscription, Task, Theme};
use log::{debug, error, info, trace, warn};
use visualizer_core::media::NativeBackend;
use visualizer_core::render::DisplayList;
use visualizer_core::render_loop::{FrameRequest, FrameScheduler};
use visualizer_core::selection::{SelectedFile, AUDIO_EXTENSIONS};
use visualizer_core::{AudioSelector, VisualizerConfig};

use ui::main_display::create_main_view;

const PLAYBACK_POLL_INTERVAL: Duration = Duration::from_millis(250);
// Files of one drop arrive as separate window events in quick succession.
const DROP_SETTLE_INTERVAL: Duration = Duration::from_millis(50);

/// Main entry point for the music visualizer.
pub fn main() -> iced::Result {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = cli::Args::parse();
    let config = match args.visualizer_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    info!("Starting music visualizer...");
    let initial_file = args.file;
    let result = iced::application("Music Visualizer", VisualizerApp::update, VisualizerApp::view)
        .subscription(VisualizerApp::subscription)
        .theme(VisualizerApp::theme)
        .window_size((config.surface_width.max(480.0) + 80.0, 560.0))
        .exit_on_close_request(false)
        .run_with(move || VisualizerApp::new(config, initial_file));
    info!("Application finished with result: {:?}", result);
    result
}

/// Application message types.
#[derive(Debug, Clone)]
pub enum Message {
    FileDropped(PathBuf),          // One file of a drag & drop gesture
    FlushDrop,                     // The drop gesture has settled
    PickFile,                      // "Choose file" button pressed
    FilePicked(Option<PathBuf>),   // Picker closed (None when cancelled)
    TogglePlay,                    // Play/Pause button pressed
    Frame(Instant),                // Display refresh while a frame is requested
    PollPlayback,                  // Periodic check for the end of the file
    Exit,                          // Window close requested
}

/// Frame clock backed by the window's refresh events.
///
/// A request is honoured by the `window::frames()` subscription, which is
/// only active while the render loop has a request pending. Withdrawing a
/// request therefore needs no bookkeeping here: once the loop forgets it,
/// the subscription goes away.
#[derive(Debug, Default)]
pub struct FrameClock {
    issued: u64,
}

impl FrameScheduler for FrameClock {
    fn request_frame(&mut self) -> FrameRequest {
        self.issued += 1;
        FrameRequest(self.issued)
    }

    fn cancel_frame(&mut self, request: FrameRequest) {
        trace!("Frame request {:?} withdrawn", request);
    }
}

/// What the view needs to render, borrowed from the selector.
#[derive(Debug, Clone, Copy)]
pub struct AppDisplayData<'a> {
    pub selected: Option<&'a SelectedFile>,
    pub is_playing: bool,
    pub frame: &'a DisplayList,
}

struct VisualizerApp {
    selector: AudioSelector<NativeBackend, FrameClock>,
    /// Paths of the drop gesture in progress
    dropped: Vec<PathBuf>,
}

impl VisualizerApp {
    fn new(config: VisualizerConfig, initial_file: Option<PathBuf>) -> (Self, Task<Message>) {
        let mut app = Self {
            selector: AudioSelector::new(config, NativeBackend, FrameClock::default()),
            dropped: Vec::new(),
        };
        if let Some(path) = initial_file {
            app.select(path);
        }
        (app, Task::none())
    }

    fn select(&mut self, path: PathBuf) {
        if let Err(e) = self.selector.select_path(&path) {
            warn!("Ignoring {}: {}", path.display(), e);
        }
    }

    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::FileDropped(path) => {
                debug!("Dropped {}", path.display());
                self.dropped.push(path);
            }
            Message::FlushDrop => {
                if let Some(path) = take_first_dropped(&mut self.dropped) {
                    self.select(path);
                }
            }
            Message::PickFile => {
                return Task::perform(pick_audio_file(), Message::FilePicked);
            }
            Message::FilePicked(Some(path)) => self.select(path),
            Message::FilePicked(None) => debug!("File picker cancelled"),
            Message::TogglePlay => self.selector.toggle_play(),
            Message::Frame(_) => {
                if let Some(request) = self.selector.pending_frame() {
                    self.selector.on_frame(request);
                }
            }
            Message::PollPlayback => self.selector.poll_playback(),
            Message::Exit => {
                info!("Close requested, releasing audio");
                self.selector.teardown();
                return iced::exit();
            }
        }
        self.selector.refresh();
        Task::none()
    }

    fn display_data(&self) -> AppDisplayData<'_> {
        AppDisplayData {
            selected: self.selector.selected_file(),
            is_playing: self.selector.is_playing(),
            frame: self.selector.display_list(),
        }
    }

    fn view(&self) -> Element<'_, Message> {
        create_main_view(self.display_data())
    }

    fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = vec![event::listen_with(window_event)];

        if self.selector.pending_frame().is_some() {
            subscriptions.push(window::frames().map(Message::Frame));
        }
        if self.selector.is_playing() {
            subscriptions.push(iced::time::every(PLAYBACK_POLL_INTERVAL).map(|_| Message::PollPlayback));
        }
        if !self.dropped.is_empty() {
            subscriptions.push(iced::time::every(DROP_SETTLE_INTERVAL).map(|_| Message::FlushDrop));
        }

        Subscription::batch(subscriptions)
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

/// Maps the window events the widget cares about onto messages.
fn window_event(event: Event, _status: event::Status, _id: window::Id) -> Option<Message> {
    match event {
        Event::Window(window::Event::FileDropped(path)) => Some(Message::FileDropped(path)),
        Event::Window(window::Event::CloseRequested) => Some(Message::Exit),
        _ => None,
    }
}

/// Ends a drop gesture: only its first file counts.
fn take_first_dropped(dropped: &mut Vec<PathBuf>) -> Option<PathBuf> {
    let batch = std::mem::take(dropped);
    if batch.len() > 1 {
        info!("Drop carried {} files, using the first", batch.len());
    }
    batch.into_iter().next()
}

async fn pick_audio_file() -> Option<PathBuf> {
    rfd::AsyncFileDialog::new()
        .set_title("Choose an audio file")
        .add_filter("Audio", AUDIO_EXTENSIONS)
        .pick_file()
        .await
        .map(|handle| handle.path().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_first_dropped_file_is_kept() {
        let mut dropped = vec![PathBuf::from("a.mp3"), PathBuf::from("b.wav")];
        assert_eq!(take_first_dropped(&mut dropped), Some(PathBuf::from("a.mp3")));
        assert!(dropped.is_empty());
        assert_eq!(take_first_dropped(&mut dropped), None);
    }

    #[test]
    fn view_borrows_the_selector_frame() {
        let (mut app, _task) = VisualizerApp::new(VisualizerConfig::default(), None);
        let data = app.display_data();
        assert!(std::ptr::eq(data.frame, app.selector.display_list()));
        assert!(data.selected.is_none());
        assert!(!data.is_playing);

        // Updates without an element leave the widget idle.
        let _ = app.update(Message::TogglePlay);
        let _ = app.update(Message::PollPlayback);
        assert!(!app.selector.is_playing());
        assert_eq!(app.selector.pending_frame(), None);
    }

    #[test]
    fn frame_clock_issues_fresh_requests() {
        let mut clock = FrameClock::default();
        let first = clock.request_frame();
        let second = clock.request_frame();
        assert_ne!(first, second);
    }

    #[test]
    fn close_and_drop_events_become_messages() {
        let id = window::Id::unique();
        let dropped = window_event(
            Event::Window(window::Event::FileDropped(PathBuf::from("song.ogg"))),
            event::Status::Ignored,
            id,
        );
        assert!(matches!(dropped, Some(Message::FileDropped(p)) if p == PathBuf::from("song.ogg")));

        let close = window_event(
            Event::Window(window::Event::CloseRequested),
            event::Status::Ignored,
            id,
        );
        assert!(matches!(close, Some(Message::Exit)));

        let other = window_event(Event::Window(window::Event::Focused), event::Status::Ignored, id);
        assert!(other.is_none());
    }
}
