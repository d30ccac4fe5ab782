// Native media elements
// The handle a NativeFile player drives directly, and the tap a signal graph
// uses to take over its audio

pub mod element;

#[cfg(test)]
pub(crate) mod test_support;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::audio::context::AudioContext;
use crate::audio::graph::FilterChain;
use crate::error::{GraphError, PlaybackError};
use crate::events::EventEmitter;

pub use element::FileMedia;

/// Lifecycle notifications from a media element, in the order it produced them
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Duration became known
    LoadedMetadata { duration: f64 },
    /// Playback position advanced (seconds)
    TimeUpdate { position: f64 },
    Playing,
    Pause,
    Ended,
    VolumeChange { volume: f32, muted: bool },
    FullscreenChange(bool),
    /// Loading or decoding failed
    Error(String),
}

/// A locally decoded, directly controllable media handle
pub trait MediaElement {
    /// Start or resume playback. Start failures are returned, not emitted.
    fn play(&self) -> Result<(), PlaybackError>;

    fn pause(&self);

    fn seek(&self, seconds: f64);

    /// Element volume (0.0 to 1.0), applied before any signal graph
    fn set_volume(&self, volume: f32);

    fn volume(&self) -> f32;

    fn set_muted(&self, muted: bool);

    fn muted(&self) -> bool;

    fn set_fullscreen(&self, fullscreen: bool);

    fn is_fullscreen(&self) -> bool;

    fn events(&self) -> &EventEmitter<MediaEvent>;

    /// The audio context this element renders into, if it is bound to one.
    /// A signal graph for the element must be built on this context.
    fn context(&self) -> Option<Rc<AudioContext>> {
        None
    }

    /// Reroute this element's audio into a signal graph.
    ///
    /// Succeeds at most once per element; afterwards the element's audio only
    /// reaches the output through the graph.
    fn capture_audio(&self) -> Result<AudioTap, GraphError>;
}

/// Where a captured element delivers its decoded samples
#[derive(Clone, Default)]
pub struct AudioTap {
    target: Rc<RefCell<Option<Weak<RefCell<FilterChain>>>>>,
}

impl AudioTap {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn connect(&self, chain: &Rc<RefCell<FilterChain>>) {
        *self.target.borrow_mut() = Some(Rc::downgrade(chain));
    }

    fn chain(&self) -> Option<Rc<RefCell<FilterChain>>> {
        self.target.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// A graph is attached and still alive
    pub fn is_connected(&self) -> bool {
        self.chain().is_some()
    }

    /// Samples the graph can take right now. Zero once the graph is torn down.
    pub fn available_space(&self) -> usize {
        self.chain()
            .map(|chain| chain.borrow().available_space())
            .unwrap_or(0)
    }

    /// Drop audio the graph already queued at the output
    pub fn clear(&self) {
        if let Some(chain) = self.chain() {
            chain.borrow().clear_output();
        }
    }

    /// Push interleaved samples through the graph.
    /// Returns how many reached the output.
    pub fn render(&self, samples: &[f32]) -> usize {
        match self.chain() {
            Some(chain) => chain.borrow_mut().render(samples),
            None => 0,
        }
    }
}
