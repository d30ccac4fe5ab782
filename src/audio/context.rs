// Shared audio context
// One per UI thread, created on first use and shared by every signal graph

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use super::output::{ring_capacity, AudioOutput, Destination};
use crate::error::GraphError;
use crate::settings::OutputSettings;

thread_local! {
    static SHARED: RefCell<Option<Rc<AudioContext>>> = const { RefCell::new(None) };
}

/// Sample format and destination shared by all graphs of one page
pub struct AudioContext {
    sample_rate: u32,
    channels: u16,
    destination: Arc<Destination>,
    output: Option<AudioOutput>,
}

impl AudioContext {
    /// Open the default output device
    pub fn open_default(settings: &OutputSettings) -> Result<Self, GraphError> {
        let output = AudioOutput::new(settings.ring_buffer_ms)?;
        Ok(Self {
            sample_rate: output.sample_rate(),
            channels: output.channels(),
            destination: output.destination().clone(),
            output: Some(output),
        })
    }

    /// A context without a device. The host renders the destination itself.
    pub fn offline(sample_rate: u32, channels: u16, buffer_frames: usize) -> Self {
        Self {
            sample_rate,
            channels,
            destination: Destination::new(buffer_frames * channels.max(1) as usize),
            output: None,
        }
    }

    /// An offline context whose inputs buffer `settings.ring_buffer_ms`,
    /// sized the same way as a device context
    pub fn offline_with(sample_rate: u32, channels: u16, settings: &OutputSettings) -> Self {
        Self {
            sample_rate,
            channels,
            destination: Destination::new(ring_capacity(
                sample_rate,
                channels,
                settings.ring_buffer_ms,
            )),
            output: None,
        }
    }

    /// The context for this thread, opening the default device with default
    /// settings on first call
    pub fn shared() -> Result<Rc<AudioContext>, GraphError> {
        Self::shared_with(&OutputSettings::default())
    }

    /// The context for this thread, opening the default device with
    /// `settings` on first call. Settings are ignored once a context exists.
    ///
    /// A failed open is not cached, so a later call retries.
    pub fn shared_with(settings: &OutputSettings) -> Result<Rc<AudioContext>, GraphError> {
        Self::shared_or_init(|| Self::open_default(settings))
    }

    fn shared_or_init(
        init: impl FnOnce() -> Result<AudioContext, GraphError>,
    ) -> Result<Rc<AudioContext>, GraphError> {
        if let Some(ctx) = SHARED.with(|shared| shared.borrow().clone()) {
            return Ok(ctx);
        }

        let ctx = Rc::new(init()?);
        SHARED.with(|shared| *shared.borrow_mut() = Some(ctx.clone()));
        Ok(ctx)
    }

    /// Replace the thread's shared context, e.g. with one opened from settings
    pub fn install_shared(ctx: AudioContext) -> Rc<AudioContext> {
        let ctx = Rc::new(ctx);
        SHARED.with(|shared| *shared.borrow_mut() = Some(ctx.clone()));
        ctx
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn destination(&self) -> &Arc<Destination> {
        &self.destination
    }

    pub fn is_offline(&self) -> bool {
        self.output.is_none()
    }
}
