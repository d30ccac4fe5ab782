// Remote embed control protocol
// Outbound command envelopes and inbound state messages, as JSON strings

use serde::Deserialize;
use serde_json::{json, Value};

/// A command posted across the embed boundary. Fire-and-forget: the remote
/// never acknowledges it directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteCommand {
    Play,
    Pause,
    Mute,
    UnMute,
    /// Percent, 0 to 100
    SetVolume(u8),
    /// Seconds
    SeekTo(f64),
}

impl RemoteCommand {
    /// Local volume (0.0 to 1.0) to the remote's integer percent
    pub fn set_volume(volume: f32) -> Self {
        let percent = (volume.clamp(0.0, 1.0) * 100.0).round() as u8;
        RemoteCommand::SetVolume(percent)
    }

    pub fn func(&self) -> &'static str {
        match self {
            RemoteCommand::Play => "playVideo",
            RemoteCommand::Pause => "pauseVideo",
            RemoteCommand::Mute => "mute",
            RemoteCommand::UnMute => "unMute",
            RemoteCommand::SetVolume(_) => "setVolume",
            RemoteCommand::SeekTo(_) => "seekTo",
        }
    }

    fn args(&self) -> Value {
        match *self {
            RemoteCommand::SetVolume(percent) => json!([percent]),
            RemoteCommand::SeekTo(seconds) => json!([seconds, true]),
            _ => json!(""),
        }
    }

    /// `{"event":"command","func":...,"args":...}`
    pub fn encode(&self) -> String {
        json!({
            "event": "command",
            "func": self.func(),
            "args": self.args(),
        })
        .to_string()
    }
}

/// A state correction reported by the remote
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteUpdate {
    Playing,
    /// Ended or paused
    Stopped,
    Duration(f64),
    CurrentTime(f64),
}

#[derive(Deserialize)]
struct Inbound {
    event: String,
    info: Option<Value>,
}

/// Parse a message from the boundary. Anything that is not a recognised
/// state message yields `None`; the boundary also carries unrelated traffic.
pub fn parse_inbound(payload: &str) -> Option<RemoteUpdate> {
    let message: Inbound = serde_json::from_str(payload).ok()?;
    let info = message.info?.as_f64()?;

    match message.event.as_str() {
        "onStateChange" => match info as i64 {
            _ if info.fract() != 0.0 => None,
            1 => Some(RemoteUpdate::Playing),
            0 | 2 => Some(RemoteUpdate::Stopped),
            _ => None,
        },
        "getDuration" if info.is_finite() && info >= 0.0 => Some(RemoteUpdate::Duration(info)),
        "getCurrentTime" if info.is_finite() && info >= 0.0 => {
            Some(RemoteUpdate::CurrentTime(info))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(command: RemoteCommand) -> Value {
        serde_json::from_str(&command.encode()).unwrap()
    }

    #[test]
    fn test_plain_commands_have_empty_args() {
        for (command, func) in [
            (RemoteCommand::Play, "playVideo"),
            (RemoteCommand::Pause, "pauseVideo"),
            (RemoteCommand::Mute, "mute"),
            (RemoteCommand::UnMute, "unMute"),
        ] {
            let value = decoded(command);
            assert_eq!(value["event"], "command");
            assert_eq!(value["func"], func);
            assert_eq!(value["args"], "");
        }
    }

    #[test]
    fn test_set_volume_scales_to_percent() {
        assert_eq!(RemoteCommand::set_volume(0.5), RemoteCommand::SetVolume(50));
        assert_eq!(RemoteCommand::set_volume(1.7), RemoteCommand::SetVolume(100));
        assert_eq!(RemoteCommand::set_volume(-1.0), RemoteCommand::SetVolume(0));
        assert_eq!(RemoteCommand::set_volume(0.333), RemoteCommand::SetVolume(33));

        let value = decoded(RemoteCommand::set_volume(0.5));
        assert_eq!(value["func"], "setVolume");
        assert_eq!(value["args"], json!([50]));
    }

    #[test]
    fn test_seek_to_args() {
        let value = decoded(RemoteCommand::SeekTo(42.5));
        assert_eq!(value["func"], "seekTo");
        assert_eq!(value["args"], json!([42.5, true]));
    }

    #[test]
    fn test_state_changes() {
        let state = |info: i32| {
            parse_inbound(&format!(r#"{{"event":"onStateChange","info":{info}}}"#))
        };
        assert_eq!(state(1), Some(RemoteUpdate::Playing));
        assert_eq!(state(2), Some(RemoteUpdate::Stopped));
        assert_eq!(state(0), Some(RemoteUpdate::Stopped));
        assert_eq!(parse_inbound(r#"{"event":"onStateChange","info":3}"#), None);
        assert_eq!(parse_inbound(r#"{"event":"onStateChange","info":-1}"#), None);
    }

    #[test]
    fn test_time_messages() {
        assert_eq!(
            parse_inbound(r#"{"event":"getDuration","info":212.4}"#),
            Some(RemoteUpdate::Duration(212.4))
        );
        assert_eq!(
            parse_inbound(r#"{"event":"getCurrentTime","info":12}"#),
            Some(RemoteUpdate::CurrentTime(12.0))
        );
    }

    #[test]
    fn test_unrelated_traffic_is_ignored() {
        for payload in [
            "",
            "not json",
            "[1,2,3]",
            r#"{"event":"infoDelivery","info":{"currentTime":3}}"#,
            r#"{"event":"onStateChange"}"#,
            r#"{"event":"onStateChange","info":"1"}"#,
            r#"{"event":"getDuration","info":-5}"#,
            r#"{"type":"webpackOk"}"#,
        ] {
            assert_eq!(parse_inbound(payload), None, "{payload}");
        }
    }
}
