// In-memory media element for tests

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use super::{AudioTap, MediaElement, MediaEvent};
use crate::audio::context::AudioContext;
use crate::error::{GraphError, PlaybackError};
use crate::events::EventEmitter;

/// 16-bit PCM WAV
pub(crate) fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
    let data_len = (samples.len() * 2) as u32;
    let mut bytes = Vec::with_capacity(44 + data_len as usize);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
    bytes.extend_from_slice(b"WAVEfmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
    bytes.extend_from_slice(&(channels * 2).to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(&bytes).unwrap();
}

pub(crate) struct FakeElement {
    events: EventEmitter<MediaEvent>,
    context: Option<Rc<AudioContext>>,
    tap: AudioTap,
    captured: Cell<bool>,
    refuse_capture: Cell<bool>,
    play_error: RefCell<Option<String>>,
    pub(crate) calls: RefCell<Vec<String>>,
    volume: Cell<f32>,
    muted: Cell<bool>,
    fullscreen: Cell<bool>,
    position: Cell<f64>,
}

impl FakeElement {
    pub(crate) fn new() -> Self {
        Self {
            events: EventEmitter::new(),
            context: None,
            tap: AudioTap::new(),
            captured: Cell::new(false),
            refuse_capture: Cell::new(false),
            play_error: RefCell::new(None),
            calls: RefCell::new(Vec::new()),
            volume: Cell::new(1.0),
            muted: Cell::new(false),
            fullscreen: Cell::new(false),
            position: Cell::new(0.0),
        }
    }

    /// An element that renders into `ctx`
    pub(crate) fn on_context(ctx: &Rc<AudioContext>) -> Self {
        Self {
            context: Some(ctx.clone()),
            ..Self::new()
        }
    }

    /// `play` fails with this reason
    pub(crate) fn fail_play(&self, reason: &str) {
        *self.play_error.borrow_mut() = Some(reason.to_string());
    }

    /// Behave as if no graph can be attached
    pub(crate) fn refuse_capture(&self) {
        self.refuse_capture.set(true);
    }

    pub(crate) fn tap(&self) -> AudioTap {
        self.tap.clone()
    }

    pub(crate) fn position(&self) -> f64 {
        self.position.get()
    }

    /// Deliver an event as if the element produced it
    pub(crate) fn fire(&self, event: MediaEvent) {
        self.events.emit(&event);
    }

    fn log(&self, call: impl Into<String>) {
        self.calls.borrow_mut().push(call.into());
    }
}

impl MediaElement for FakeElement {
    fn play(&self) -> Result<(), PlaybackError> {
        self.log("play");
        match self.play_error.borrow().as_ref() {
            Some(reason) => Err(PlaybackError::Start(reason.clone())),
            None => Ok(()),
        }
    }

    fn pause(&self) {
        self.log("pause");
    }

    fn seek(&self, seconds: f64) {
        self.log(format!("seek {seconds}"));
        self.position.set(seconds);
    }

    fn set_volume(&self, volume: f32) {
        self.log(format!("volume {volume}"));
        self.volume.set(volume);
    }

    fn volume(&self) -> f32 {
        self.volume.get()
    }

    fn set_muted(&self, muted: bool) {
        self.log(format!("muted {muted}"));
        self.muted.set(muted);
    }

    fn muted(&self) -> bool {
        self.muted.get()
    }

    fn set_fullscreen(&self, fullscreen: bool) {
        self.log(format!("fullscreen {fullscreen}"));
        self.fullscreen.set(fullscreen);
    }

    fn is_fullscreen(&self) -> bool {
        self.fullscreen.get()
    }

    fn events(&self) -> &EventEmitter<MediaEvent> {
        &self.events
    }

    fn context(&self) -> Option<Rc<AudioContext>> {
        self.context.clone()
    }

    fn capture_audio(&self) -> Result<AudioTap, GraphError> {
        if self.refuse_capture.get() || self.captured.replace(true) {
            return Err(GraphError::SourceAlreadyCaptured);
        }
        Ok(self.tap.clone())
    }
}
