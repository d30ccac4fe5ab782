// Player transport
// Drives a native media element or a remote embed through the same operations

pub mod controller;
pub mod protocol;
pub mod state;

pub use controller::{MediaBinding, PlaybackController};
pub use protocol::{parse_inbound, RemoteCommand, RemoteUpdate};
pub use state::{PlaybackState, TransportState};

/// Handle to a third-party embedded player, reachable only by posting
/// string messages across its isolation boundary
pub trait EmbedFrame {
    /// Fire-and-forget; delivery is not confirmed
    fn post_message(&self, payload: &str, target_origin: &str);

    fn set_fullscreen(&self, fullscreen: bool);

    fn is_fullscreen(&self) -> bool;
}
