// Playback controller
// One per player: dispatches transport operations to the native element or
// the remote embed, and keeps PlaybackState in step with what they report

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::protocol::{parse_inbound, RemoteCommand, RemoteUpdate};
use super::state::{PlaybackState, TransportState};
use super::EmbedFrame;
use crate::audio::{AudioContext, FilterRegistry, SignalGraph};
use crate::error::PlaybackError;
use crate::events::{EventEmitter, Subscription};
use crate::media::{MediaElement, MediaEvent};
use crate::settings::OutputSettings;
use crate::source::{MediaSource, SourceKind};

/// Target origin for outbound commands; the embed accepts any sender
const ANY_ORIGIN: &str = "*";

/// What a controller drives, chosen by the source's kind
#[derive(Clone)]
pub enum MediaBinding {
    Native(Rc<dyn MediaElement>),
    Remote {
        frame: Rc<dyn EmbedFrame>,
        /// Inbound payloads from the embed boundary
        messages: EventEmitter<String>,
    },
}

impl MediaBinding {
    pub fn kind(&self) -> SourceKind {
        match self {
            MediaBinding::Native(_) => SourceKind::NativeFile,
            MediaBinding::Remote { .. } => SourceKind::EmbeddedRemote,
        }
    }
}

impl fmt::Debug for MediaBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MediaBinding").field(&self.kind()).finish()
    }
}

enum Transport {
    Native {
        element: Rc<dyn MediaElement>,
        graph: RefCell<Option<SignalGraph>>,
        graph_attempted: Cell<bool>,
    },
    Remote {
        frame: Rc<dyn EmbedFrame>,
    },
}

/// State reachable from event callbacks. They hold it weakly, so nothing
/// fires into a dropped controller.
struct Shared {
    title: String,
    state: RefCell<PlaybackState>,
    changes: EventEmitter<PlaybackState>,
    on_error: Box<dyn Fn(&str)>,
}

impl Shared {
    fn update(&self, apply: impl FnOnce(&mut PlaybackState)) {
        let snapshot = {
            let mut state = self.state.borrow_mut();
            let before = state.clone();
            apply(&mut *state);
            if *state == before {
                return;
            }
            state.clone()
        };
        self.changes.emit(&snapshot);
    }

    fn on_media_event(&self, event: &MediaEvent) {
        match event {
            MediaEvent::LoadedMetadata { duration } => {
                let duration = *duration;
                self.update(|state| state.duration_seconds = duration);
            }
            MediaEvent::TimeUpdate { position } => {
                let position = *position;
                self.update(|state| state.position_seconds = position);
            }
            MediaEvent::Playing => self.update(|state| state.status = TransportState::Playing),
            MediaEvent::Pause | MediaEvent::Ended => self.update(PlaybackState::stop),
            MediaEvent::VolumeChange { volume, muted } => {
                let (volume, muted) = (*volume, *muted);
                self.update(|state| {
                    state.volume = volume;
                    state.is_muted = muted;
                });
            }
            MediaEvent::FullscreenChange(_) => {}
            MediaEvent::Error(reason) => {
                tracing::warn!(title = %self.title, %reason, "media failed to load");
                self.update(PlaybackState::stop);
                (self.on_error)(&format!("Failed to load video: {}", self.title));
            }
        }
    }

    fn on_remote_message(&self, payload: &str) {
        let Some(update) = parse_inbound(payload) else {
            tracing::trace!(len = payload.len(), "ignoring unrecognised message");
            return;
        };
        match update {
            RemoteUpdate::Playing => self.update(|state| state.status = TransportState::Playing),
            RemoteUpdate::Stopped => self.update(PlaybackState::stop),
            RemoteUpdate::Duration(seconds) => {
                self.update(|state| state.duration_seconds = seconds)
            }
            RemoteUpdate::CurrentTime(seconds) => {
                self.update(|state| state.position_seconds = seconds)
            }
        }
    }
}

/// Transport for one player.
///
/// The same operations work for both bindings. Native operations call the
/// element and let its events settle the state; remote operations post a
/// command and assume it took effect until the embed reports otherwise.
/// Dropping the controller removes every listener it registered.
pub struct PlaybackController {
    source: MediaSource,
    transport: Transport,
    shared: Rc<Shared>,
    equalizer: RefCell<FilterRegistry>,
    output: OutputSettings,
    _subscriptions: Vec<Subscription>,
}

impl PlaybackController {
    /// Bind a controller to `source`. The binding must match the source's kind.
    pub fn new<F>(
        title: impl Into<String>,
        source: MediaSource,
        binding: MediaBinding,
        on_error: F,
    ) -> Result<Self, PlaybackError>
    where
        F: Fn(&str) + 'static,
    {
        if binding.kind() != source.kind() {
            return Err(PlaybackError::KindMismatch {
                expected: source.kind(),
                found: binding.kind(),
            });
        }

        let initial = match &binding {
            MediaBinding::Native(element) => PlaybackState {
                volume: element.volume(),
                is_muted: element.muted(),
                ..PlaybackState::default()
            },
            MediaBinding::Remote { .. } => PlaybackState::default(),
        };

        let shared = Rc::new(Shared {
            title: title.into(),
            state: RefCell::new(initial),
            changes: EventEmitter::new(),
            on_error: Box::new(on_error),
        });
        let weak: Weak<Shared> = Rc::downgrade(&shared);

        let (transport, subscription) = match binding {
            MediaBinding::Native(element) => {
                let subscription = element.events().subscribe(move |event: &MediaEvent| {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_media_event(event);
                    }
                });
                let transport = Transport::Native {
                    element,
                    graph: RefCell::new(None),
                    graph_attempted: Cell::new(false),
                };
                (transport, subscription)
            }
            MediaBinding::Remote { frame, messages } => {
                let subscription = messages.subscribe(move |payload: &String| {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_remote_message(payload);
                    }
                });
                (Transport::Remote { frame }, subscription)
            }
        };

        tracing::debug!(
            title = %shared.title,
            kind = ?source.kind(),
            uri = source.resolved_uri(),
            "player bound"
        );

        Ok(Self {
            source,
            transport,
            shared,
            equalizer: RefCell::new(FilterRegistry::new()),
            output: OutputSettings::default(),
            _subscriptions: vec![subscription],
        })
    }

    /// Output settings used if this player has to open the shared context
    pub fn with_output_settings(mut self, output: OutputSettings) -> Self {
        self.output = output;
        self
    }

    pub fn output_settings(&self) -> &OutputSettings {
        &self.output
    }

    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    pub fn title(&self) -> &str {
        &self.shared.title
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state.borrow().clone()
    }

    /// Every change of [`PlaybackState`], after it is applied
    pub fn changes(&self) -> &EventEmitter<PlaybackState> {
        &self.shared.changes
    }

    /// Equalizer for this player. Inert until the first native `play` has
    /// built a graph, and for remote players always.
    pub fn equalizer(&self) -> Ref<'_, FilterRegistry> {
        self.equalizer.borrow()
    }

    pub fn graph(&self) -> Option<Ref<'_, SignalGraph>> {
        match &self.transport {
            Transport::Native { graph, .. } => {
                Ref::filter_map(graph.borrow(), Option::as_ref).ok()
            }
            Transport::Remote { .. } => None,
        }
    }

    fn post(frame: &dyn EmbedFrame, command: RemoteCommand) {
        tracing::debug!(func = command.func(), "posting remote command");
        frame.post_message(&command.encode(), ANY_ORIGIN);
    }

    /// First native play builds the equalizer graph on the element's own
    /// context, or the shared one if the element has none.
    /// A failure leaves the element playing unfiltered.
    fn ensure_graph(
        &self,
        element: &dyn MediaElement,
        graph: &RefCell<Option<SignalGraph>>,
        attempted: &Cell<bool>,
    ) {
        if attempted.replace(true) {
            return;
        }

        let ctx = match element.context() {
            Some(ctx) => Ok(ctx),
            None => AudioContext::shared_with(&self.output),
        };
        let built = ctx.and_then(|ctx| SignalGraph::build(&ctx, element));
        match built {
            Ok(built) => {
                self.equalizer.borrow_mut().attach(&built);
                *graph.borrow_mut() = Some(built);
            }
            Err(e) => {
                tracing::warn!(
                    title = %self.shared.title,
                    error = %e,
                    "equalizer unavailable, playing unfiltered"
                );
            }
        }
    }

    pub fn play(&self) {
        match &self.transport {
            Transport::Native { element, graph, graph_attempted } => {
                self.ensure_graph(element.as_ref(), graph, graph_attempted);
                if let Err(e) = element.play() {
                    tracing::warn!(
                        title = %self.shared.title,
                        error = %e,
                        "playback failed to start"
                    );
                    (self.shared.on_error)(&format!("Failed to play video: {e}"));
                }
            }
            Transport::Remote { frame } => {
                Self::post(frame.as_ref(), RemoteCommand::Play);
                self.shared.update(|state| state.status = TransportState::Playing);
            }
        }
    }

    pub fn pause(&self) {
        match &self.transport {
            Transport::Native { element, .. } => element.pause(),
            Transport::Remote { frame } => {
                Self::post(frame.as_ref(), RemoteCommand::Pause);
                self.shared.update(PlaybackState::stop);
            }
        }
    }

    pub fn toggle_mute(&self) {
        let muted = !self.shared.state.borrow().is_muted;
        match &self.transport {
            Transport::Native { element, .. } => element.set_muted(muted),
            Transport::Remote { frame } => {
                let command = if muted { RemoteCommand::Mute } else { RemoteCommand::UnMute };
                Self::post(frame.as_ref(), command);
            }
        }
        self.shared.update(|state| state.is_muted = muted);
    }

    /// `volume` is clamped to 0.0..=1.0
    pub fn set_volume(&self, volume: f32) {
        if volume.is_nan() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        match &self.transport {
            Transport::Native { element, .. } => element.set_volume(volume),
            Transport::Remote { frame } => {
                Self::post(frame.as_ref(), RemoteCommand::set_volume(volume))
            }
        }
        self.shared.update(|state| state.volume = volume);
    }

    pub fn seek(&self, seconds: f64) {
        if !seconds.is_finite() {
            return;
        }
        let seconds = seconds.max(0.0);
        match &self.transport {
            Transport::Native { element, .. } => element.seek(seconds),
            Transport::Remote { frame } => {
                Self::post(frame.as_ref(), RemoteCommand::SeekTo(seconds))
            }
        }
        self.shared.update(|state| state.position_seconds = seconds);
    }

    pub fn toggle_fullscreen(&self) {
        match &self.transport {
            Transport::Native { element, .. } => {
                element.set_fullscreen(!element.is_fullscreen())
            }
            Transport::Remote { frame } => frame.set_fullscreen(!frame.is_fullscreen()),
        }
    }
}
