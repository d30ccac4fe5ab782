// SyncVid - side-by-side video playback core
// Module declarations
pub mod audio;
pub mod error;
pub mod events;
pub mod logging;
pub mod media;
pub mod playback;
pub mod settings;
pub mod source;
pub mod state;

pub use audio::{AudioContext, EqPreset, FilterRegistry, SignalGraph, StageRole};
pub use error::{GraphError, PlaybackError, SlotError};
pub use events::{EventEmitter, Subscription};
pub use media::{FileMedia, MediaElement, MediaEvent};
pub use playback::{EmbedFrame, MediaBinding, PlaybackController, PlaybackState, TransportState};
pub use settings::AppSettings;
pub use source::{classify, embed_url, MediaSource, SourceKind};
pub use state::{AppState, PlayerSlot, SlotId};
