// Per-player equalizer signal graph
//
// Topology is fixed: the media element's audio runs through a bass shelf,
// a treble shelf, a gain stage and ten peaking bands, in that order, then
// into the destination of the element's audio context. Stage gains are plain
// cells read by the chain on every processed block, so a change is heard on
// the next sample with no commit step.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::context::AudioContext;
use super::filter::{Biquad, BiquadCoeffs, BiquadKind};
use super::output::DestinationInput;
use crate::error::GraphError;
use crate::media::{AudioTap, MediaElement};

/// Centre frequencies of the graphic equalizer, in chain order
pub const BAND_FREQUENCIES: [u32; 10] = [60, 170, 310, 600, 1000, 3000, 6000, 12000, 14000, 16000];

pub const BASS_CORNER_HZ: f64 = 200.0;
pub const TREBLE_CORNER_HZ: f64 = 2000.0;
pub const BAND_Q: f64 = 1.0;

/// What a stage does; one stage per role in every graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageRole {
    BassShelf,
    TrebleShelf,
    Gain,
    PeakingBand(u32),
}

/// One node of the chain with a single adjustable gain (dB)
#[derive(Debug)]
pub struct FilterStage {
    role: StageRole,
    kind: Option<BiquadKind>,
    frequency_hz: f64,
    q: f64,
    sample_rate: f64,
    gain_db: Cell<f32>,
}

impl FilterStage {
    fn biquad(
        role: StageRole,
        kind: BiquadKind,
        frequency_hz: f64,
        q: f64,
        sample_rate: f64,
    ) -> Rc<Self> {
        Rc::new(Self {
            role,
            kind: Some(kind),
            frequency_hz,
            q,
            sample_rate,
            gain_db: Cell::new(0.0),
        })
    }

    pub fn role(&self) -> StageRole {
        self.role
    }

    /// Filter characteristic, `None` for the gain stage
    pub fn kind(&self) -> Option<BiquadKind> {
        self.kind
    }

    /// Corner or centre frequency; zero for the gain stage
    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db.get()
    }

    pub(crate) fn set_gain_db(&self, db: f32) {
        self.gain_db.set(db);
    }

    fn coeffs(&self, gain_db: f32) -> BiquadCoeffs {
        match self.kind {
            Some(kind) => BiquadCoeffs::new(
                kind,
                self.frequency_hz,
                self.q,
                gain_db as f64,
                self.sample_rate,
            ),
            None => BiquadCoeffs::identity(),
        }
    }

    /// This stage's response at `frequency` with its current gain
    pub fn magnitude_db(&self, frequency: f64) -> f64 {
        match self.kind {
            Some(_) => self.coeffs(self.gain_db()).magnitude_db(frequency, self.sample_rate),
            None => self.gain_db() as f64,
        }
    }
}

/// The stage handles of one graph
#[derive(Debug)]
pub(crate) struct GraphStages {
    pub(crate) bass: Rc<FilterStage>,
    pub(crate) treble: Rc<FilterStage>,
    pub(crate) gain: Rc<FilterStage>,
    pub(crate) bands: Vec<Rc<FilterStage>>,
}

impl GraphStages {
    /// Exact match against the fixed band set
    pub(crate) fn band(&self, frequency_hz: u32) -> Option<&Rc<FilterStage>> {
        self.bands
            .iter()
            .find(|stage| stage.role == StageRole::PeakingBand(frequency_hz))
    }

    /// All stages in chain order
    pub(crate) fn in_order(&self) -> impl Iterator<Item = &Rc<FilterStage>> {
        [&self.bass, &self.treble, &self.gain]
            .into_iter()
            .chain(self.bands.iter())
    }
}

enum Node {
    Filter {
        stage: Rc<FilterStage>,
        applied_db: f32,
        biquad: Biquad,
    },
    Gain {
        stage: Rc<FilterStage>,
    },
}

impl Node {
    fn process(&mut self, samples: &mut [f32]) {
        match self {
            Node::Filter { stage, applied_db, biquad } => {
                let wanted = stage.gain_db();
                if wanted != *applied_db {
                    biquad.set_coeffs(stage.coeffs(wanted));
                    *applied_db = wanted;
                }
                biquad.process(samples);
            }
            Node::Gain { stage } => {
                let factor = 10f32.powf(stage.gain_db() / 20.0);
                if factor != 1.0 {
                    for sample in samples.iter_mut() {
                        *sample *= factor;
                    }
                }
            }
        }
    }
}

/// The processing side of a graph: stages in series, ending in a destination input
pub struct FilterChain {
    nodes: Vec<Node>,
    channels: usize,
    output: DestinationInput,
    scratch: Vec<f32>,
}

impl FilterChain {
    /// Filter interleaved samples in place without sending them anywhere
    pub fn process(&mut self, samples: &mut [f32]) {
        for node in &mut self.nodes {
            node.process(samples);
        }
    }

    /// Filter and forward to the destination. Only whole frames that fit are
    /// taken; returns the number of samples consumed.
    pub fn render(&mut self, samples: &[f32]) -> usize {
        let fit = samples.len().min(self.output.available_space());
        let take = fit - fit % self.channels;
        if take == 0 {
            return 0;
        }

        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        scratch.extend_from_slice(&samples[..take]);
        self.process(&mut scratch);
        let written = self.output.write(&scratch);
        self.scratch = scratch;
        written
    }

    pub fn available_space(&self) -> usize {
        let space = self.output.available_space();
        space - space % self.channels
    }

    /// Drop audio already queued at the destination
    pub fn clear_output(&self) {
        self.output.clear();
    }
}

/// The source node: the captured element's audio tap
pub struct MediaElementSource {
    tap: AudioTap,
}

impl MediaElementSource {
    pub fn is_connected(&self) -> bool {
        self.tap.is_connected()
    }
}

/// A node in the graph's wiring, for inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphNode {
    Source,
    Stage(StageRole),
    Destination,
}

/// A constructed equalizer graph bound to one media element.
///
/// Dropping it disconnects it from the destination; the element stays captured.
pub struct SignalGraph {
    source: MediaElementSource,
    stages: Rc<GraphStages>,
    chain: Rc<RefCell<FilterChain>>,
    sample_rate: u32,
}

impl SignalGraph {
    /// Build the graph for `element` and wire it to the context's destination.
    ///
    /// Fails with [`GraphError::SourceAlreadyCaptured`] if the element already
    /// feeds a graph, and with [`GraphError::ContextMismatch`] if the element
    /// renders into a different context than `ctx`.
    pub fn build(ctx: &AudioContext, element: &dyn MediaElement) -> Result<Self, GraphError> {
        if let Some(own) = element.context() {
            if !std::ptr::eq(Rc::as_ptr(&own), ctx) {
                return Err(GraphError::ContextMismatch {
                    element: (own.sample_rate(), own.channels()),
                    graph: (ctx.sample_rate(), ctx.channels()),
                });
            }
        }

        let sample_rate = ctx.sample_rate() as f64;
        let channels = ctx.channels().max(1) as usize;

        // 1. Source bound to the element
        let tap = element.capture_audio()?;

        // 2. Shelves
        let bass = FilterStage::biquad(
            StageRole::BassShelf,
            BiquadKind::LowShelf,
            BASS_CORNER_HZ,
            BAND_Q,
            sample_rate,
        );
        let treble = FilterStage::biquad(
            StageRole::TrebleShelf,
            BiquadKind::HighShelf,
            TREBLE_CORNER_HZ,
            BAND_Q,
            sample_rate,
        );

        // 3. Gain, unity
        let gain = Rc::new(FilterStage {
            role: StageRole::Gain,
            kind: None,
            frequency_hz: 0.0,
            q: 0.0,
            sample_rate,
            gain_db: Cell::new(0.0),
        });

        // 4. Peaking bands at 0 dB
        let bands: Vec<Rc<FilterStage>> = BAND_FREQUENCIES
            .iter()
            .map(|&hz| {
                FilterStage::biquad(
                    StageRole::PeakingBand(hz),
                    BiquadKind::Peaking,
                    hz as f64,
                    BAND_Q,
                    sample_rate,
                )
            })
            .collect();

        let stages = Rc::new(GraphStages { bass, treble, gain, bands });

        // 5. Series wiring, ending at the destination
        let nodes = stages
            .in_order()
            .map(|stage| match stage.kind {
                Some(_) => Node::Filter {
                    stage: stage.clone(),
                    applied_db: stage.gain_db(),
                    biquad: Biquad::new(stage.coeffs(stage.gain_db()), channels),
                },
                None => Node::Gain { stage: stage.clone() },
            })
            .collect();

        let chain = Rc::new(RefCell::new(FilterChain {
            nodes,
            channels,
            output: ctx.destination().connect(),
            scratch: Vec::new(),
        }));
        tap.connect(&chain);

        tracing::debug!(sample_rate = ctx.sample_rate(), channels, "signal graph built");

        Ok(Self {
            source: MediaElementSource { tap },
            stages,
            chain,
            sample_rate: ctx.sample_rate(),
        })
    }

    pub fn source(&self) -> &MediaElementSource {
        &self.source
    }

    /// Stages in chain order
    pub fn stages(&self) -> Vec<&FilterStage> {
        self.stages.in_order().map(|stage| &**stage).collect()
    }

    pub fn stage(&self, role: StageRole) -> Option<&FilterStage> {
        self.stages
            .in_order()
            .find(|stage| stage.role == role)
            .map(|stage| &**stage)
    }

    /// Peaking band frequencies in chain order
    pub fn band_frequencies(&self) -> Vec<u32> {
        self.stages
            .bands
            .iter()
            .filter_map(|stage| match stage.role {
                StageRole::PeakingBand(hz) => Some(hz),
                _ => None,
            })
            .collect()
    }

    /// Source, every stage, destination: the order audio flows through
    pub fn topology(&self) -> Vec<GraphNode> {
        let mut nodes = vec![GraphNode::Source];
        nodes.extend(self.stages.in_order().map(|stage| GraphNode::Stage(stage.role)));
        nodes.push(GraphNode::Destination);
        nodes
    }

    /// Combined response of all stages at `frequency`, in dB
    pub fn magnitude_db(&self, frequency: f64) -> f64 {
        self.stages
            .in_order()
            .map(|stage| stage.magnitude_db(frequency))
            .sum()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Run samples through the stages in place, bypassing the destination
    pub fn process(&self, samples: &mut [f32]) {
        self.chain.borrow_mut().process(samples);
    }

    /// Filter samples and send them to the destination
    pub fn render(&self, samples: &[f32]) -> usize {
        self.chain.borrow_mut().render(samples)
    }

    pub(crate) fn stage_handles(&self) -> Weak<GraphStages> {
        Rc::downgrade(&self.stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::test_support::FakeElement;

    fn offline() -> AudioContext {
        AudioContext::offline(48000, 2, 48000)
    }

    #[test]
    fn test_fresh_graph_bands() {
        let ctx = offline();
        let element = FakeElement::new();
        let graph = SignalGraph::build(&ctx, &element).unwrap();

        assert_eq!(
            graph.band_frequencies(),
            vec![60, 170, 310, 600, 1000, 3000, 6000, 12000, 14000, 16000]
        );
        for stage in graph.stages() {
            assert_eq!(stage.gain_db(), 0.0);
        }
        for hz in BAND_FREQUENCIES {
            let stage = graph.stage(StageRole::PeakingBand(hz)).unwrap();
            assert_eq!(stage.kind(), Some(BiquadKind::Peaking));
            assert_eq!(stage.q(), 1.0);
            assert_eq!(stage.frequency_hz(), hz as f64);
        }
    }

    #[test]
    fn test_shelf_corners() {
        let ctx = offline();
        let element = FakeElement::new();
        let graph = SignalGraph::build(&ctx, &element).unwrap();

        let bass = graph.stage(StageRole::BassShelf).unwrap();
        assert_eq!(bass.kind(), Some(BiquadKind::LowShelf));
        assert_eq!(bass.frequency_hz(), 200.0);

        let treble = graph.stage(StageRole::TrebleShelf).unwrap();
        assert_eq!(treble.kind(), Some(BiquadKind::HighShelf));
        assert_eq!(treble.frequency_hz(), 2000.0);

        assert_eq!(graph.stage(StageRole::Gain).unwrap().kind(), None);
    }

    #[test]
    fn test_topology_is_series() {
        let ctx = offline();
        let element = FakeElement::new();
        let graph = SignalGraph::build(&ctx, &element).unwrap();

        let mut expected = vec![
            GraphNode::Source,
            GraphNode::Stage(StageRole::BassShelf),
            GraphNode::Stage(StageRole::TrebleShelf),
            GraphNode::Stage(StageRole::Gain),
        ];
        expected.extend(
            BAND_FREQUENCIES
                .iter()
                .map(|&hz| GraphNode::Stage(StageRole::PeakingBand(hz))),
        );
        expected.push(GraphNode::Destination);

        assert_eq!(graph.topology(), expected);
        assert_eq!(ctx.destination().input_count(), 1);
        assert!(graph.source().is_connected());
    }

    #[test]
    fn test_second_build_on_same_element_fails() {
        let ctx = offline();
        let element = FakeElement::new();
        let _graph = SignalGraph::build(&ctx, &element).unwrap();

        let second = SignalGraph::build(&ctx, &element);
        assert!(matches!(second, Err(GraphError::SourceAlreadyCaptured)));
        assert_eq!(ctx.destination().input_count(), 1);
    }

    #[test]
    fn test_build_on_other_context_fails() {
        let own = Rc::new(AudioContext::offline(8000, 1, 4096));
        let other = offline();
        let element = FakeElement::on_context(&own);

        let result = SignalGraph::build(&other, &element);
        assert!(matches!(
            result,
            Err(GraphError::ContextMismatch { element: (8000, 1), graph: (48000, 2) })
        ));
        // Nothing captured or connected on either side
        assert_eq!(other.destination().input_count(), 0);
        assert!(element.capture_audio().is_ok());
    }

    #[test]
    fn test_build_on_own_context() {
        let own = Rc::new(AudioContext::offline(8000, 1, 4096));
        let element = FakeElement::on_context(&own);

        let graph = SignalGraph::build(&own, &element).unwrap();
        assert_eq!(graph.sample_rate(), 8000);
        assert_eq!(own.destination().input_count(), 1);
    }

    #[test]
    fn test_flat_graph_passes_signal_unchanged() {
        let ctx = offline();
        let element = FakeElement::new();
        let graph = SignalGraph::build(&ctx, &element).unwrap();

        let mut samples = vec![0.25f32; 4800 * 2];
        graph.process(&mut samples);
        for sample in &samples {
            assert!((sample - 0.25).abs() < 1e-4);
        }
    }

    #[test]
    fn test_live_gain_change_is_heard() {
        let ctx = offline();
        let element = FakeElement::new();
        let graph = SignalGraph::build(&ctx, &element).unwrap();

        graph.stage(StageRole::BassShelf).unwrap().set_gain_db(6.0);
        let mut samples = vec![0.25f32; 48000 * 2];
        graph.process(&mut samples);

        let expected = 0.25 * 10f32.powf(6.0 / 20.0);
        let last = samples[samples.len() - 1];
        assert!((last - expected).abs() < 1e-3, "got {last}, expected {expected}");
    }

    #[test]
    fn test_gain_stage_scales() {
        let ctx = offline();
        let element = FakeElement::new();
        let graph = SignalGraph::build(&ctx, &element).unwrap();

        graph.stage(StageRole::Gain).unwrap().set_gain_db(-6.0);
        let mut samples = vec![0.5f32; 8];
        graph.process(&mut samples);
        assert!((samples[0] - 0.5 * 10f32.powf(-6.0 / 20.0)).abs() < 1e-6);
    }

    #[test]
    fn test_render_reaches_destination_through_tap() {
        let ctx = AudioContext::offline(48000, 2, 8);
        let element = FakeElement::new();
        let _graph = SignalGraph::build(&ctx, &element).unwrap();

        // 8 frames of stereo fit; the rest is refused
        let consumed = element.tap().render(&[0.1f32; 20]);
        assert_eq!(consumed, 16);

        let mut out = vec![0.0f32; 16];
        ctx.destination().render(&mut out);
        assert!(out.iter().all(|s| (s - 0.1).abs() < 1e-3));
    }

    #[test]
    fn test_dropped_graph_disconnects() {
        let ctx = offline();
        let element = FakeElement::new();
        let graph = SignalGraph::build(&ctx, &element).unwrap();
        let tap = element.tap();

        drop(graph);
        assert_eq!(ctx.destination().input_count(), 0);
        assert!(!tap.is_connected());
        assert_eq!(tap.render(&[0.1; 4]), 0);
    }

    #[test]
    fn test_combined_response() {
        let ctx = offline();
        let element = FakeElement::new();
        let graph = SignalGraph::build(&ctx, &element).unwrap();

        graph.stage(StageRole::PeakingBand(1000)).unwrap().set_gain_db(6.0);
        assert!((graph.magnitude_db(1000.0) - 6.0).abs() < 0.2);
        assert!(graph.magnitude_db(30.0).abs() < 0.5);
    }
}
