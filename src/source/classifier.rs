// URL classification for player input
//
// Anything that is recognisably a YouTube watch page, short link or embed
// becomes a `SourceKind::EmbeddedRemote` source with a canonical embed URL.
// Everything else, including strings that are not URLs at all, is played as
// a direct media file.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use url::Url;

const EMBED_PREFIX: &str = "https://www.youtube.com/embed/";

/// How a source is played back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Locally decoded media; gets a signal graph and an equalizer
    NativeFile,
    /// Third-party embed driven over the message boundary
    EmbeddedRemote,
}

/// A classified source. Immutable for the lifetime of a playback session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaSource {
    raw_input: String,
    kind: SourceKind,
    resolved_uri: String,
}

impl MediaSource {
    pub fn raw_input(&self) -> &str {
        &self.raw_input
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn resolved_uri(&self) -> &str {
        &self.resolved_uri
    }

    pub fn is_remote(&self) -> bool {
        self.kind == SourceKind::EmbeddedRemote
    }
}

/// Valid YouTube video identifiers
fn video_id_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap())
}

/// Which URL shape a YouTube host uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YoutubeHost {
    /// youtube.com and its subdomains: `?v=` or `/embed/{id}`
    LongForm,
    /// youtu.be: `/{id}`
    ShortLink,
}

fn youtube_host(host: &str) -> Option<YoutubeHost> {
    let host = host.to_ascii_lowercase();
    if host == "youtube.com" || host.ends_with(".youtube.com") {
        Some(YoutubeHost::LongForm)
    } else if host == "youtu.be" {
        Some(YoutubeHost::ShortLink)
    } else {
        None
    }
}

fn first_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Pull the video id out of a recognised URL shape.
/// `/shorts/`, `/live/` and friends are not recognised.
fn extract_video_id(url: &Url, host: YoutubeHost) -> Option<String> {
    let id = match host {
        YoutubeHost::LongForm => {
            let from_query = url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned());
            match from_query {
                Some(id) => Some(id),
                None => {
                    let mut segments = url.path_segments()?;
                    match (segments.next(), segments.next(), segments.next()) {
                        (Some("embed"), Some(id), None) => Some(id.to_string()),
                        _ => None,
                    }
                }
            }
        }
        YoutubeHost::ShortLink => first_segment(url),
    }?;

    if video_id_regex().is_match(&id) {
        Some(id)
    } else {
        None
    }
}

/// Classify raw player input. Never fails: unparseable input is a direct URL.
pub fn classify(input: &str) -> MediaSource {
    let native = || MediaSource {
        raw_input: input.to_string(),
        kind: SourceKind::NativeFile,
        resolved_uri: input.to_string(),
    };

    let url = match Url::parse(input) {
        Ok(url) => url,
        Err(e) => {
            tracing::trace!(input, error = %e, "input is not a URL, treating as direct media");
            return native();
        }
    };

    let Some(host) = url.host_str().and_then(youtube_host) else {
        return native();
    };

    match extract_video_id(&url, host) {
        Some(id) => MediaSource {
            raw_input: input.to_string(),
            kind: SourceKind::EmbeddedRemote,
            resolved_uri: format!("{EMBED_PREFIX}{id}"),
        },
        None => {
            tracing::debug!(input, "unsupported YouTube URL shape, treating as direct media");
            native()
        }
    }
}

/// Build the iframe URL for an embedded source.
///
/// `enablejsapi=1` turns on the command protocol and `controls=0` hides the
/// embed's own transport bar.
pub fn embed_url(source: &MediaSource, page_origin: &str) -> String {
    format!(
        "{}?enablejsapi=1&controls=0&origin={}",
        source.resolved_uri(),
        page_origin
    )
}
