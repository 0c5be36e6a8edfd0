//! # Audio Selector Module
//!
//! The widget's controller: holds the selected file, the play state, the
//! playback element, its analysis graph and the render loop, and keeps
//! them consistent with each other.
//!
//! Lifecycle: selection → element → graph → (while playing) render loop.
//! Every failure ends in an inert state plus a log line.

use std::path::Path;

use log::{debug, info, warn};

use crate::bridge::AnalysisBridge;
use crate::config::VisualizerConfig;
use crate::media::{MediaBackend, MediaElement};
use crate::render::DisplayList;
use crate::render_loop::{FrameRequest, FrameScheduler, RenderLoop};
use crate::selection::{SelectedFile, SelectionError};

pub struct AudioSelector<B: MediaBackend, S: FrameScheduler> {
    config: VisualizerConfig,
    backend: B,
    selected: Option<SelectedFile>,
    is_playing: bool,
    element: Option<B::Element>,
    bridge: AnalysisBridge,
    render_loop: RenderLoop<S>,
    display: DisplayList,
}

impl<B: MediaBackend, S: FrameScheduler> AudioSelector<B, S> {
    pub fn new(config: VisualizerConfig, backend: B, scheduler: S) -> Self {
        let display = DisplayList::new(config.surface_width, config.surface_height);
        Self {
            config,
            backend,
            selected: None,
            is_playing: false,
            element: None,
            bridge: AnalysisBridge::new(),
            render_loop: RenderLoop::new(scheduler),
            display,
        }
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    pub fn selected_file(&self) -> Option<&SelectedFile> {
        self.selected.as_ref()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn has_element(&self) -> bool {
        self.element.is_some()
    }

    pub fn element(&self) -> Option<&B::Element> {
        self.element.as_ref()
    }

    pub fn has_graph(&self) -> bool {
        self.bridge.is_bound()
    }

    pub fn is_render_loop_running(&self) -> bool {
        self.render_loop.is_running()
    }

    /// The frame request the render loop is waiting on.
    pub fn pending_frame(&self) -> Option<FrameRequest> {
        self.render_loop.pending()
    }

    pub fn render_loop(&self) -> &RenderLoop<S> {
        &self.render_loop
    }

    /// What the visualizer should show right now.
    pub fn display_list(&self) -> &DisplayList {
        &self.display
    }

    /// Selects the file at `path`; an unreadable path leaves everything as it was.
    pub fn select_path(&mut self, path: impl AsRef<Path>) -> Result<(), SelectionError> {
        let file = SelectedFile::from_path(path)?;
        self.select_files(std::iter::once(file));
        Ok(())
    }

    /// Takes the first file of a drop or pick and makes it the selection.
    ///
    /// Playback of the previous file stops, its graph is closed, and the
    /// play state goes back to false. The new element never auto-plays.
    pub fn select_files<I>(&mut self, files: I)
    where
        I: IntoIterator<Item = SelectedFile>,
    {
        let Some(file) = files.into_iter().next() else {
            debug!("Selection event carried no file");
            return;
        };

        self.release_element();
        self.is_playing = false;
        info!("Selected {} ({} bytes)", file.name, file.size);

        match self.backend.open(&file) {
            Ok(element) => {
                self.element = Some(element);
                self.bind_graph();
            }
            Err(e) => warn!("Cannot create playback element for {}: {}", file.name, e),
        }
        self.selected = Some(file);
    }

    /// Flips the play state and brings the element and render loop in line.
    /// Does nothing before an element exists.
    pub fn toggle_play(&mut self) {
        if self.element.is_none() {
            debug!("Toggle ignored: no playback element");
            return;
        }
        self.is_playing = !self.is_playing;
        info!("Play state -> {}", self.is_playing);
        self.sync_transport();
        self.sync_render_loop();
    }

    /// Commands the element to match the play state.
    pub fn sync_transport(&mut self) {
        if let Some(element) = self.element.as_mut() {
            if self.is_playing {
                element.play();
            } else {
                element.pause();
            }
        }
    }

    /// Re-applies the graph binding and the render loop for the current
    /// state. Safe to call on every UI update: the graph is keyed to the
    /// element's identity, and the transport is left alone.
    pub fn refresh(&mut self) {
        self.bind_graph();
        self.sync_render_loop();
    }

    /// Notices an element that stopped on its own, at the end of the file
    /// or after a failure, and brings the play state back to false.
    pub fn poll_playback(&mut self) {
        if !self.is_playing {
            return;
        }
        let Some(element) = self.element.as_ref() else {
            return;
        };
        if !element.is_paused() {
            return;
        }
        if element.has_ended() {
            info!("Playback reached the end");
        } else {
            warn!("Playback element {} stopped on its own", element.id());
        }
        self.is_playing = false;
        self.sync_transport();
        self.sync_render_loop();
    }

    /// Handles a fired frame callback; returns whether a frame was drawn.
    pub fn on_frame(&mut self, request: FrameRequest) -> bool {
        let Some(graph) = self.bridge.graph_mut() else {
            return false;
        };
        self.render_loop
            .on_frame(request, graph.analyser_mut(), &mut self.display, &self.config)
    }

    /// Stops everything and releases the element and its graph.
    pub fn teardown(&mut self) {
        self.is_playing = false;
        self.release_element();
    }

    fn bind_graph(&mut self) {
        let Some(element) = self.element.as_mut() else {
            return;
        };
        match self.bridge.bind(element, &self.config) {
            Ok(true) => debug!("Analysis graph ready"),
            Ok(false) => {}
            Err(e) => warn!("Analysis graph unavailable: {}", e),
        }
    }

    fn sync_render_loop(&mut self) {
        if self.is_playing && self.bridge.is_bound() {
            self.render_loop.start();
        } else {
            self.render_loop.stop();
        }
    }

    fn release_element(&mut self) {
        self.render_loop.stop();
        if let Some(element) = self.element.as_mut() {
            element.pause();
        }
        self.bridge.release();
        if let Some(element) = self.element.take() {
            debug!("Released playback element {}", element.id());
        }
        self.display.reset();
    }
}

impl<B: MediaBackend, S: FrameScheduler> Drop for AudioSelector<B, S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
