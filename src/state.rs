// Application state management
// Settings plus the ordered list of player slots the page shows

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use crate::audio::AudioContext;
use crate::error::{GraphError, SlotError};
use crate::playback::{MediaBinding, PlaybackController};
use crate::settings::AppSettings;
use crate::source::{classify, embed_url, MediaSource};

/// Stable identifier of a player slot; never reused within one `AppState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SlotId(u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One player position: what the user typed and what is currently playing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerSlot {
    id: SlotId,
    input: String,
    active: Option<MediaSource>,
}

impl PlayerSlot {
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Text in the URL field, not yet necessarily played
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Source of the player below the field, if one was started
    pub fn active(&self) -> Option<&MediaSource> {
        self.active.as_ref()
    }
}

pub struct AppState {
    pub settings: AppSettings,
    slots: Vec<PlayerSlot>,
    next_id: u32,
}

impl AppState {
    pub fn new(settings: AppSettings) -> Self {
        let mut state = Self {
            settings,
            slots: Vec::new(),
            next_id: 0,
        };
        for _ in 0..state.settings.playback.initial_slots {
            state.add_slot();
        }
        state
    }

    /// Load settings from `app_dir` and lay out the initial slots
    pub fn load(app_dir: &Path) -> Result<Self> {
        let settings = AppSettings::load(app_dir).context("Failed to load settings")?;
        Ok(Self::new(settings))
    }

    pub fn add_slot(&mut self) -> SlotId {
        let id = SlotId(self.next_id);
        self.next_id += 1;
        self.slots.push(PlayerSlot {
            id,
            input: String::new(),
            active: None,
        });
        id
    }

    pub fn remove_slot(&mut self, id: SlotId) -> Result<PlayerSlot, SlotError> {
        let index = self.index_of(id)?;
        Ok(self.slots.remove(index))
    }

    pub fn slot(&self, id: SlotId) -> Option<&PlayerSlot> {
        self.slots.iter().find(|slot| slot.id == id)
    }

    /// Slots in display order
    pub fn slots(&self) -> &[PlayerSlot] {
        &self.slots
    }

    fn index_of(&self, id: SlotId) -> Result<usize, SlotError> {
        self.slots
            .iter()
            .position(|slot| slot.id == id)
            .ok_or(SlotError::UnknownSlot(id))
    }

    fn slot_mut(&mut self, id: SlotId) -> Result<&mut PlayerSlot, SlotError> {
        self.slots
            .iter_mut()
            .find(|slot| slot.id == id)
            .ok_or(SlotError::UnknownSlot(id))
    }

    /// Edit the URL field; the running player is untouched
    pub fn set_input(&mut self, id: SlotId, input: &str) -> Result<(), SlotError> {
        self.slot_mut(id)?.input = input.to_string();
        Ok(())
    }

    /// Start the slot's player with its current input, replacing any previous source
    pub fn activate(&mut self, id: SlotId) -> Result<&MediaSource, SlotError> {
        let slot = self.slot_mut(id)?;
        let input = slot.input.trim();
        if input.is_empty() {
            return Err(SlotError::EmptyUrl);
        }

        let source = classify(input);
        tracing::debug!(slot = %id, kind = ?source.kind(), "activating player");
        Ok(slot.active.insert(source))
    }

    /// Player heading, numbered by display position
    pub fn title_for(&self, id: SlotId) -> Option<String> {
        let index = self.index_of(id).ok()?;
        Some(format!("Video {}", index + 1))
    }

    /// Iframe URL for a slot playing an embedded source
    pub fn embed_url_for(&self, id: SlotId) -> Option<String> {
        let source = self.slot(id)?.active()?;
        if !source.is_remote() {
            return None;
        }
        Some(embed_url(source, &self.settings.embed.page_origin))
    }

    /// The thread's shared audio context, opened with the configured output
    /// settings if none exists yet. Native elements are created on it.
    pub fn audio_context(&self) -> Result<Rc<AudioContext>, GraphError> {
        AudioContext::shared_with(&self.settings.output)
    }

    /// Build the controller for an activated slot, at the configured initial volume
    pub fn open_player<F>(
        &self,
        id: SlotId,
        binding: MediaBinding,
        on_error: F,
    ) -> Result<PlaybackController>
    where
        F: Fn(&str) + 'static,
    {
        let source = self
            .slot(id)
            .ok_or(SlotError::UnknownSlot(id))?
            .active()
            .cloned()
            .with_context(|| format!("Player slot {id} has not been started"))?;
        let title = self.title_for(id).unwrap_or_default();

        let controller = PlaybackController::new(title, source, binding, on_error)
            .with_context(|| format!("Failed to open player slot {id}"))?
            .with_output_settings(self.settings.output.clone());
        controller.set_volume(self.settings.playback.initial_volume);
        Ok(controller)
    }
}
