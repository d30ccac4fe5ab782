// Audio module
// Symphonia decoding, cpal output, and the per-player equalizer graph

pub mod context;
pub mod decoder;
pub mod filter;
pub mod graph;
pub mod output;
pub mod registry;

pub use context::AudioContext;
pub use graph::{FilterStage, GraphNode, SignalGraph, StageRole, BAND_FREQUENCIES};
pub use registry::{EqPreset, EqSnapshot, FilterRegistry};
