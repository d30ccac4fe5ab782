// Error types shared across the playback core
use thiserror::Error;

use crate::source::SourceKind;
use crate::state::SlotId;

/// Failure to construct or drive the audio signal graph.
///
/// Never fatal: a player whose graph cannot be built keeps playing unfiltered.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("audio output unavailable: {0}")]
    AudioUnavailable(String),

    #[error("media element is already connected to a signal graph")]
    SourceAlreadyCaptured,

    /// Rate and channel count of the element's context and of the graph's
    #[error("media element renders into another audio context ({element:?} vs {graph:?})")]
    ContextMismatch {
        element: (u32, u16),
        graph: (u32, u16),
    },

    #[error("unsupported output sample format: {0}")]
    UnsupportedSampleFormat(String),
}

/// Failure of local (native file) playback.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("{0}")]
    Start(String),

    #[error("failed to load media: {0}")]
    Load(String),

    #[error("decode failed: {0}")]
    Decode(String),

    #[error("seek failed: {0}")]
    Seek(String),

    #[error("media binding is {found:?} but the source is {expected:?}")]
    KindMismatch {
        expected: SourceKind,
        found: SourceKind,
    },
}

/// Errors from the player slot registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("no player slot with id {0}")]
    UnknownSlot(SlotId),

    #[error("Please enter a valid video URL")]
    EmptyUrl,
}
