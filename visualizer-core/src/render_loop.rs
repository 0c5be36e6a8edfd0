//! # Render Loop Module
//!
//! A self-rescheduling chain of frame callbacks. Each frame asks the
//! scheduler for the next one before drawing, and every run carries a
//! [`StopSignal`] that is checked before that request, so stopping the
//! loop halts the chain within one frame.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace};

use crate::analyser::FrequencySource;
use crate::config::VisualizerConfig;
use crate::render::{self, Surface};

/// Ticket for one pending "run again next frame" request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest(pub u64);

/// The host's animation-scheduling primitive.
pub trait FrameScheduler {
    /// Asks for one callback at the next display refresh.
    fn request_frame(&mut self) -> FrameRequest;

    /// Withdraws a request that has not fired yet.
    fn cancel_frame(&mut self, request: FrameRequest);
}

/// Cancellation token shared by everything that may stop one run.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct RenderLoop<S: FrameScheduler> {
    scheduler: S,
    signal: Option<StopSignal>,
    pending: Option<FrameRequest>,
    snapshot: Vec<u8>,
    frames_drawn: u64,
}

impl<S: FrameScheduler> RenderLoop<S> {
    pub fn new(scheduler: S) -> Self {
        Self {
            scheduler,
            signal: None,
            pending: None,
            snapshot: Vec::new(),
            frames_drawn: 0,
        }
    }

    /// True between `start` and the moment the run's signal is tripped.
    pub fn is_running(&self) -> bool {
        self.signal.as_ref().is_some_and(|s| !s.is_stopped())
    }

    /// The request the loop is waiting on, if any.
    pub fn pending(&self) -> Option<FrameRequest> {
        self.pending
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// The latest snapshot pulled from the frequency source.
    pub fn snapshot(&self) -> &[u8] {
        &self.snapshot
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Starts a run unless one is active; returns the run's stop signal.
    pub fn start(&mut self) -> StopSignal {
        if let Some(signal) = self.signal.as_ref().filter(|s| !s.is_stopped()) {
            return signal.clone();
        }
        // A previous run stopped through its signal may still hold a request.
        if let Some(request) = self.pending.take() {
            self.scheduler.cancel_frame(request);
        }

        let signal = StopSignal::new();
        self.signal = Some(signal.clone());
        self.pending = Some(self.scheduler.request_frame());
        debug!("Render loop started");
        signal
    }

    /// Trips the current run's signal and withdraws its pending request.
    pub fn stop(&mut self) {
        if let Some(signal) = self.signal.take() {
            signal.stop();
            debug!("Render loop stopped after {} frames", self.frames_drawn);
        }
        if let Some(request) = self.pending.take() {
            self.scheduler.cancel_frame(request);
        }
    }

    /// Handles a fired frame callback. Returns whether a frame was drawn.
    pub fn on_frame<F, D>(
        &mut self,
        request: FrameRequest,
        source: &mut F,
        surface: &mut D,
        config: &VisualizerConfig,
    ) -> bool
    where
        F: FrequencySource + ?Sized,
        D: Surface + ?Sized,
    {
        if self.pending != Some(request) {
            trace!("Ignoring stale frame {:?}", request);
            return false;
        }
        self.pending = None;

        match &self.signal {
            Some(signal) if !signal.is_stopped() => {}
            _ => {
                trace!("Render loop halted at frame {:?}", request);
                return false;
            }
        }

        self.pending = Some(self.scheduler.request_frame());

        self.snapshot.resize(source.frequency_bin_count(), 0);
        source.get_byte_frequency_data(&mut self.snapshot);
        render::draw_frame(surface, &self.snapshot, config);
        self.frames_drawn += 1;
        true
    }
}
