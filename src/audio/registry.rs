// Filter parameter registry
// Control surfaces push gains into the live stages of the current graph

use serde::Serialize;
use std::rc::Weak;

use super::graph::{GraphStages, SignalGraph, BAND_FREQUENCIES};

/// Range the sliders offer, enforced again here
pub const MIN_GAIN_DB: f32 = -12.0;
pub const MAX_GAIN_DB: f32 = 12.0;

/// Named gain settings for the whole chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EqPreset {
    Flat,
    BassBoost,
    TrebleBoost,
    Vocal,
}

impl EqPreset {
    /// (bass, treble, one gain per band in `BAND_FREQUENCIES` order)
    pub fn gains(&self) -> (f32, f32, [f32; 10]) {
        match self {
            EqPreset::Flat => (0.0, 0.0, [0.0; 10]),
            EqPreset::BassBoost => (6.0, 0.0, [5.0, 4.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
            EqPreset::TrebleBoost => (0.0, 6.0, [0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 3.0, 4.0, 5.0, 5.0]),
            EqPreset::Vocal => (-2.0, 1.0, [-3.0, -2.0, 0.0, 2.0, 4.0, 4.0, 2.0, 0.0, -1.0, -2.0]),
        }
    }
}

/// Current gains of an attached graph
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EqSnapshot {
    pub bass_db: f32,
    pub treble_db: f32,
    pub gain_db: f32,
    /// (frequency, gain) in chain order
    pub bands: Vec<(u32, f32)>,
}

/// Setters for the stages of the most recently attached graph.
///
/// Holds only weak handles: once the graph is dropped every setter is a no-op.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    stages: Weak<GraphStages>,
}

fn clamp_db(db: f32) -> Option<f32> {
    if db.is_nan() {
        None
    } else {
        Some(db.clamp(MIN_GAIN_DB, MAX_GAIN_DB))
    }
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take over the stages of `graph`, discarding any previous handles
    pub fn attach(&mut self, graph: &SignalGraph) {
        self.stages = graph.stage_handles();
    }

    pub fn detach(&mut self) {
        self.stages = Weak::new();
    }

    pub fn is_attached(&self) -> bool {
        self.stages.strong_count() > 0
    }

    pub fn set_bass(&self, db: f32) {
        if let (Some(stages), Some(db)) = (self.stages.upgrade(), clamp_db(db)) {
            stages.bass.set_gain_db(db);
        }
    }

    pub fn set_treble(&self, db: f32) {
        if let (Some(stages), Some(db)) = (self.stages.upgrade(), clamp_db(db)) {
            stages.treble.set_gain_db(db);
        }
    }

    /// Output gain stage, in dB relative to unity
    pub fn set_gain(&self, db: f32) {
        if let (Some(stages), Some(db)) = (self.stages.upgrade(), clamp_db(db)) {
            stages.gain.set_gain_db(db);
        }
    }

    /// Frequencies outside the fixed band set are ignored
    pub fn set_band(&self, frequency_hz: u32, db: f32) {
        let (Some(stages), Some(db)) = (self.stages.upgrade(), clamp_db(db)) else {
            return;
        };
        match stages.band(frequency_hz) {
            Some(stage) => stage.set_gain_db(db),
            None => tracing::trace!(frequency_hz, "no equalizer band at this frequency"),
        }
    }

    pub fn apply_preset(&self, preset: EqPreset) {
        let (bass, treble, bands) = preset.gains();
        self.set_bass(bass);
        self.set_treble(treble);
        for (hz, db) in BAND_FREQUENCIES.iter().zip(bands) {
            self.set_band(*hz, db);
        }
    }

    /// Every stage back to 0 dB
    pub fn reset(&self) {
        self.apply_preset(EqPreset::Flat);
        self.set_gain(0.0);
    }

    pub fn snapshot(&self) -> Option<EqSnapshot> {
        let stages = self.stages.upgrade()?;
        Some(EqSnapshot {
            bass_db: stages.bass.gain_db(),
            treble_db: stages.treble.gain_db(),
            gain_db: stages.gain.gain_db(),
            bands: BAND_FREQUENCIES
                .iter()
                .filter_map(|&hz| stages.band(hz).map(|stage| (hz, stage.gain_db())))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::context::AudioContext;
    use crate::audio::graph::StageRole;
    use crate::media::test_support::FakeElement;

    fn build() -> (AudioContext, FakeElement) {
        (AudioContext::offline(48000, 2, 1024), FakeElement::new())
    }

    #[test]
    fn test_unattached_setters_are_noops() {
        let registry = FilterRegistry::new();
        registry.set_bass(6.0);
        registry.set_band(1000, 6.0);
        assert!(!registry.is_attached());
        assert!(registry.snapshot().is_none());
    }

    #[test]
    fn test_set_bass_and_treble() {
        let (ctx, element) = build();
        let graph = SignalGraph::build(&ctx, &element).unwrap();
        let mut registry = FilterRegistry::new();
        registry.attach(&graph);

        registry.set_bass(6.0);
        registry.set_treble(-4.0);
        assert_eq!(graph.stage(StageRole::BassShelf).unwrap().gain_db(), 6.0);
        assert_eq!(graph.stage(StageRole::TrebleShelf).unwrap().gain_db(), -4.0);
    }

    #[test]
    fn test_set_band_touches_one_stage() {
        let (ctx, element) = build();
        let graph = SignalGraph::build(&ctx, &element).unwrap();
        let mut registry = FilterRegistry::new();
        registry.attach(&graph);

        registry.set_band(1000, 6.0);
        for stage in graph.stages() {
            let expected = if stage.role() == StageRole::PeakingBand(1000) { 6.0 } else { 0.0 };
            assert_eq!(stage.gain_db(), expected, "{:?}", stage.role());
        }

        registry.set_band(999, 6.0);
        for stage in graph.stages() {
            let expected = if stage.role() == StageRole::PeakingBand(1000) { 6.0 } else { 0.0 };
            assert_eq!(stage.gain_db(), expected, "{:?}", stage.role());
        }
    }

    #[test]
    fn test_gains_are_clamped() {
        let (ctx, element) = build();
        let graph = SignalGraph::build(&ctx, &element).unwrap();
        let mut registry = FilterRegistry::new();
        registry.attach(&graph);

        registry.set_bass(40.0);
        registry.set_treble(-100.0);
        registry.set_band(60, f32::NAN);
        assert_eq!(graph.stage(StageRole::BassShelf).unwrap().gain_db(), 12.0);
        assert_eq!(graph.stage(StageRole::TrebleShelf).unwrap().gain_db(), -12.0);
        assert_eq!(graph.stage(StageRole::PeakingBand(60)).unwrap().gain_db(), 0.0);
    }

    #[test]
    fn test_dropped_graph_leaves_no_handles() {
        let (ctx, element) = build();
        let graph = SignalGraph::build(&ctx, &element).unwrap();
        let mut registry = FilterRegistry::new();
        registry.attach(&graph);
        assert!(registry.is_attached());

        drop(graph);
        assert!(!registry.is_attached());
        registry.set_bass(3.0);
    }

    #[test]
    fn test_reattach_replaces_previous_graph() {
        let ctx = AudioContext::offline(48000, 2, 1024);
        let first_element = FakeElement::new();
        let second_element = FakeElement::new();
        let first = SignalGraph::build(&ctx, &first_element).unwrap();
        let second = SignalGraph::build(&ctx, &second_element).unwrap();

        let mut registry = FilterRegistry::new();
        registry.attach(&first);
        registry.attach(&second);
        registry.set_bass(5.0);

        assert_eq!(first.stage(StageRole::BassShelf).unwrap().gain_db(), 0.0);
        assert_eq!(second.stage(StageRole::BassShelf).unwrap().gain_db(), 5.0);
    }

    #[test]
    fn test_preset_and_reset() {
        let (ctx, element) = build();
        let graph = SignalGraph::build(&ctx, &element).unwrap();
        let mut registry = FilterRegistry::new();
        registry.attach(&graph);

        registry.apply_preset(EqPreset::BassBoost);
        registry.set_gain(-3.0);
        let snapshot = registry.snapshot().unwrap();
        assert_eq!(snapshot.bass_db, 6.0);
        assert_eq!(snapshot.gain_db, -3.0);
        assert_eq!(snapshot.bands[0], (60, 5.0));
        assert_eq!(snapshot.bands.len(), 10);

        registry.reset();
        let snapshot = registry.snapshot().unwrap();
        assert_eq!(snapshot.bass_db, 0.0);
        assert_eq!(snapshot.gain_db, 0.0);
        assert!(snapshot.bands.iter().all(|(_, db)| *db == 0.0));
    }
}
