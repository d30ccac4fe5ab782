// Transport state of one player
use serde::Serialize;

/// Where the transport is. A finished file counts as `Paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    #[default]
    Idle,
    Playing,
    Paused,
}

/// Snapshot of a player as the UI shows it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub status: TransportState,
    pub is_muted: bool,
    /// 0.0 to 1.0
    pub volume: f32,
    pub position_seconds: f64,
    pub duration_seconds: f64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            status: TransportState::Idle,
            is_muted: false,
            volume: 1.0,
            position_seconds: 0.0,
            duration_seconds: 0.0,
        }
    }
}

impl PlaybackState {
    pub fn with_volume(volume: f32) -> Self {
        Self {
            volume: volume.clamp(0.0, 1.0),
            ..Self::default()
        }
    }

    pub fn is_playing(&self) -> bool {
        self.status == TransportState::Playing
    }

    /// Leave `Playing`; an idle player stays idle
    pub(crate) fn stop(&mut self) {
        if self.status == TransportState::Playing {
            self.status = TransportState::Paused;
        }
    }
}
