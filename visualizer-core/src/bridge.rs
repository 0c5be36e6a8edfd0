//! # Analysis Bridge Module
//!
//! Wires a playback element into an analyser: element output → analyser →
//! speakers. A graph is a scoped resource. It is built once per element
//! identity and closed when the element changes, when the bridge is
//! released, or when it is dropped.

use log::{debug, info};
use thiserror::Error;

use crate::analyser::Analyser;
use crate::config::VisualizerConfig;
use crate::media::{ElementId, MediaElement};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The element's output was already handed to another graph.
    #[error("element {0} is already bound to an analysis graph")]
    AlreadyBound(ElementId),
}

/// One source → analyser → output pipeline.
#[derive(Debug)]
pub struct AnalysisGraph {
    element: ElementId,
    analyser: Analyser,
    open: bool,
}

impl AnalysisGraph {
    /// Captures `element`'s output and connects it to a new analyser.
    pub fn open<E>(element: &mut E, config: &VisualizerConfig) -> Result<Self, GraphError>
    where
        E: MediaElement + ?Sized,
    {
        let input = element
            .capture_output()
            .ok_or(GraphError::AlreadyBound(element.id()))?;

        let mut analyser = Analyser::new(config);
        analyser.connect(input);
        info!(
            "Opened analysis graph for element {} ({} bins)",
            element.id(),
            config.frequency_bin_count()
        );

        Ok(Self {
            element: element.id(),
            analyser,
            open: true,
        })
    }

    pub fn element_id(&self) -> ElementId {
        self.element
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn analyser(&self) -> &Analyser {
        &self.analyser
    }

    pub fn analyser_mut(&mut self) -> &mut Analyser {
        &mut self.analyser
    }

    /// Disconnects the analyser from the element. Idempotent.
    pub fn close(&mut self) {
        if !self.open {
            return;
        }
        self.analyser.disconnect();
        self.open = false;
        info!("Closed analysis graph for element {}", self.element);
    }
}

impl Drop for AnalysisGraph {
    fn drop(&mut self) {
        self.close();
    }
}

/// Holds at most one graph, keyed by the identity of the element it serves.
#[derive(Debug, Default)]
pub struct AnalysisBridge {
    graph: Option<AnalysisGraph>,
}

impl AnalysisBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure a graph exists for `element`.
    ///
    /// Returns `Ok(true)` when a graph was built, `Ok(false)` when the
    /// current graph already serves this element. A graph serving another
    /// element is closed first.
    pub fn bind<E>(&mut self, element: &mut E, config: &VisualizerConfig) -> Result<bool, GraphError>
    where
        E: MediaElement + ?Sized,
    {
        let id = element.id();
        if self.bound_element() == Some(id) {
            debug!("Element {} already has an analysis graph", id);
            return Ok(false);
        }

        self.release();
        self.graph = Some(AnalysisGraph::open(element, config)?);
        Ok(true)
    }

    /// Closes and forgets the current graph, if any.
    pub fn release(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.close();
        }
    }

    pub fn bound_element(&self) -> Option<ElementId> {
        self.graph.as_ref().map(AnalysisGraph::element_id)
    }

    pub fn is_bound(&self) -> bool {
        self.graph.is_some()
    }

    pub fn graph_mut(&mut self) -> Option<&mut AnalysisGraph> {
        self.graph.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::SampleStream;
    use crossbeam_channel::Sender;

    /// Element whose output, like a real media element, can be captured once.
    struct OneShotElement {
        id: ElementId,
        output: Option<SampleStream>,
        feed: Sender<Vec<f32>>,
        captures: usize,
    }

    impl OneShotElement {
        fn new() -> Self {
            let (feed, rx) = crossbeam_channel::bounded(8);
            Self {
                id: ElementId::next(),
                output: Some(SampleStream::new(rx)),
                feed,
                captures: 0,
            }
        }
    }

    impl MediaElement for OneShotElement {
        fn id(&self) -> ElementId {
            self.id
        }
        fn play(&mut self) {}
        fn pause(&mut self) {}
        fn is_paused(&self) -> bool {
            true
        }
        fn has_ended(&self) -> bool {
            false
        }
        fn capture_output(&mut self) -> Option<SampleStream> {
            self.captures += 1;
            self.output.take()
        }
    }

    #[test]
    fn binds_once_per_element() {
        let config = VisualizerConfig::default();
        let mut bridge = AnalysisBridge::new();
        let mut element = OneShotElement::new();

        assert_eq!(bridge.bind(&mut element, &config), Ok(true));
        for _ in 0..5 {
            assert_eq!(bridge.bind(&mut element, &config), Ok(false));
        }
        assert_eq!(element.captures, 1);
        assert_eq!(bridge.bound_element(), Some(element.id));
    }

    #[test]
    fn second_graph_on_same_element_is_refused() {
        let config = VisualizerConfig::default();
        let mut element = OneShotElement::new();

        let _first = AnalysisGraph::open(&mut element, &config).unwrap();
        let second = AnalysisGraph::open(&mut element, &config);
        assert_eq!(second.unwrap_err(), GraphError::AlreadyBound(element.id));
    }

    #[test]
    fn new_element_replaces_and_closes_old_graph() {
        let config = VisualizerConfig::default();
        let mut bridge = AnalysisBridge::new();
        let mut first = OneShotElement::new();
        let mut second = OneShotElement::new();

        bridge.bind(&mut first, &config).unwrap();
        assert_eq!(bridge.bind(&mut second, &config), Ok(true));
        assert_eq!(bridge.bound_element(), Some(second.id));

        // The old graph dropped its end of the capture channel.
        assert!(first.feed.send(vec![0.0]).is_err());
    }

    #[test]
    fn release_disconnects_the_analyser() {
        let config = VisualizerConfig::default();
        let mut bridge = AnalysisBridge::new();
        let mut element = OneShotElement::new();

        bridge.bind(&mut element, &config).unwrap();
        assert!(bridge.graph_mut().is_some_and(|g| g.is_open() && g.analyser().is_connected()));

        bridge.release();
        assert!(!bridge.is_bound());
        assert!(element.feed.send(vec![0.0]).is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let config = VisualizerConfig::default();
        let mut element = OneShotElement::new();
        let mut graph = AnalysisGraph::open(&mut element, &config).unwrap();

        graph.close();
        graph.close();
        assert!(!graph.is_open());
    }
}
