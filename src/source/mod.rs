// Media source resolution
// Decides whether user input is a YouTube embed or a direct media file

pub mod classifier;

pub use classifier::{classify, embed_url, MediaSource, SourceKind};
