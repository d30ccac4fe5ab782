// File-backed media element
// Decodes with Symphonia, converts to the context's format and paces itself
// against the output buffer. The host loop calls `tick` to keep it fed.

use rubato::{FftFixedIn, Resampler};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{AudioTap, MediaElement, MediaEvent};
use crate::audio::context::AudioContext;
use crate::audio::decoder::AudioDecoder;
use crate::audio::output::DestinationInput;
use crate::error::{GraphError, PlaybackError};
use crate::events::EventEmitter;

/// Frames per resampler chunk
const RESAMPLE_CHUNK: usize = 1024;

/// Spread `in_channels` interleaved audio over `out_channels` planar buffers.
/// Mono is duplicated, extra source channels are averaged into a mono target,
/// otherwise channels map one to one and missing ones repeat the first.
fn map_channels(
    interleaved: &[f32],
    in_channels: usize,
    out_channels: usize,
    planes: &mut [Vec<f32>],
) {
    let in_channels = in_channels.max(1);
    for frame in interleaved.chunks_exact(in_channels) {
        if out_channels == 1 {
            let sum: f32 = frame.iter().sum();
            planes[0].push(sum / in_channels as f32);
            continue;
        }
        for (ch, plane) in planes.iter_mut().enumerate().take(out_channels) {
            let value = if in_channels == 1 {
                frame[0]
            } else {
                *frame.get(ch).unwrap_or(&frame[0])
            };
            plane.push(value);
        }
    }
}

fn interleave(planes: &[Vec<f32>], out: &mut Vec<f32>) {
    let frames = planes.first().map(Vec::len).unwrap_or(0);
    out.reserve(frames * planes.len());
    for frame in 0..frames {
        for plane in planes {
            out.push(plane[frame]);
        }
    }
}

/// Channel mapping plus sample rate conversion to the output format
struct FormatConverter {
    in_channels: usize,
    out_channels: usize,
    resampler: Option<FftFixedIn<f32>>,
    input: Vec<Vec<f32>>,
}

impl FormatConverter {
    fn new(
        in_rate: u32,
        in_channels: usize,
        out_rate: u32,
        out_channels: usize,
    ) -> Result<Self, PlaybackError> {
        let resampler = if in_rate != out_rate {
            let resampler = FftFixedIn::<f32>::new(
                in_rate as usize,
                out_rate as usize,
                RESAMPLE_CHUNK,
                2,
                out_channels,
            )
            .map_err(|e| PlaybackError::Load(format!("Failed to create resampler: {}", e)))?;
            Some(resampler)
        } else {
            None
        };

        Ok(Self {
            in_channels,
            out_channels,
            resampler,
            input: vec![Vec::new(); out_channels],
        })
    }

    /// Convert one decoded packet; may return fewer frames while the resampler fills
    fn push(&mut self, interleaved: &[f32]) -> Result<Vec<f32>, PlaybackError> {
        map_channels(interleaved, self.in_channels, self.out_channels, &mut self.input);

        let mut out = Vec::new();
        let Some(resampler) = self.resampler.as_mut() else {
            interleave(&self.input, &mut out);
            for plane in &mut self.input {
                plane.clear();
            }
            return Ok(out);
        };

        loop {
            let need = resampler.input_frames_next();
            if self.input[0].len() < need {
                break;
            }
            let chunk: Vec<Vec<f32>> = self
                .input
                .iter_mut()
                .map(|plane| plane.drain(..need).collect())
                .collect();
            let resampled = resampler
                .process(&chunk, None)
                .map_err(|e| PlaybackError::Decode(format!("Resampling failed: {}", e)))?;
            interleave(&resampled, &mut out);
        }
        Ok(out)
    }

    /// Flush buffered input at end of stream
    fn finish(&mut self) -> Result<Vec<f32>, PlaybackError> {
        let mut out = Vec::new();
        if let Some(resampler) = self.resampler.as_mut() {
            if !self.input[0].is_empty() {
                let resampled = resampler
                    .process_partial(Some(self.input.as_slice()), None)
                    .map_err(|e| PlaybackError::Decode(format!("Resampling failed: {}", e)))?;
                interleave(&resampled, &mut out);
            }
        }
        self.reset();
        Ok(out)
    }

    fn reset(&mut self) {
        for plane in &mut self.input {
            plane.clear();
        }
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }
}

struct Inner {
    decoder: Option<AudioDecoder>,
    converter: Option<FormatConverter>,
    direct: DestinationInput,
    /// Converted samples the output has not taken yet
    pending: Vec<f32>,
    exhausted: bool,
    playing: bool,
    volume: f32,
    muted: bool,
    fullscreen: bool,
    position: f64,
    duration: Option<f64>,
}

/// A media file played through an audio context
pub struct FileMedia {
    path: PathBuf,
    context: Rc<AudioContext>,
    sample_rate: u32,
    channels: usize,
    events: EventEmitter<MediaEvent>,
    tap: AudioTap,
    captured: Cell<bool>,
    inner: RefCell<Inner>,
}

impl FileMedia {
    /// Create an element for `path` rendering into `ctx`. Nothing is opened
    /// until `load` or `play`.
    pub fn new<P: AsRef<Path>>(path: P, ctx: &Rc<AudioContext>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            context: ctx.clone(),
            sample_rate: ctx.sample_rate(),
            channels: ctx.channels().max(1) as usize,
            events: EventEmitter::new(),
            tap: AudioTap::new(),
            captured: Cell::new(false),
            inner: RefCell::new(Inner {
                decoder: None,
                converter: None,
                direct: ctx.destination().connect(),
                pending: Vec::new(),
                exhausted: false,
                playing: false,
                volume: 1.0,
                muted: false,
                fullscreen: false,
                position: 0.0,
                duration: None,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn position(&self) -> f64 {
        self.inner.borrow().position
    }

    pub fn duration(&self) -> Option<f64> {
        self.inner.borrow().duration
    }

    pub fn is_playing(&self) -> bool {
        self.inner.borrow().playing
    }

    fn open(&self) -> Result<Option<MediaEvent>, PlaybackError> {
        let mut inner = self.inner.borrow_mut();
        if inner.decoder.is_some() {
            return Ok(None);
        }

        let decoder = AudioDecoder::open(&self.path)?;
        let converter = FormatConverter::new(
            decoder.sample_rate(),
            decoder.channels(),
            self.sample_rate,
            self.channels,
        )?;
        inner.duration = decoder.duration_secs();
        inner.decoder = Some(decoder);
        inner.converter = Some(converter);
        inner.exhausted = false;

        Ok(inner.duration.map(|duration| MediaEvent::LoadedMetadata { duration }))
    }

    /// Open the file and read its metadata. Failures are also emitted as
    /// [`MediaEvent::Error`].
    pub fn load(&self) -> Result<(), PlaybackError> {
        match self.open() {
            Ok(event) => {
                if let Some(event) = event {
                    self.events.emit(&event);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "media load failed");
                self.events.emit(&MediaEvent::Error(e.to_string()));
                Err(e)
            }
        }
    }

    fn available_space(&self, inner: &Inner) -> usize {
        if self.captured.get() {
            self.tap.available_space()
        } else {
            let space = inner.direct.available_space();
            space - space % self.channels
        }
    }

    fn route(&self, inner: &mut Inner, samples: &[f32]) -> usize {
        if self.captured.get() {
            self.tap.render(samples)
        } else {
            let fit = samples.len().min(inner.direct.available_space());
            inner.direct.write(&samples[..fit - fit % self.channels])
        }
    }

    /// Feed the output while playing. Call regularly from the host loop;
    /// emits `TimeUpdate`, and `Ended` + `Pause` at end of stream.
    pub fn tick(&self) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.borrow_mut();
            if inner.playing {
                self.pump(&mut inner, &mut events);
            }
        }
        for event in &events {
            self.events.emit(event);
        }
    }

    fn pump(&self, inner: &mut Inner, events: &mut Vec<MediaEvent>) {
        let start = inner.position;

        loop {
            if !inner.pending.is_empty() {
                let pending = std::mem::take(&mut inner.pending);
                let written = self.route(inner, &pending);
                inner.position += (written / self.channels) as f64 / self.sample_rate as f64;
                inner.pending = pending[written..].to_vec();
                if !inner.pending.is_empty() {
                    break;
                }
            }

            if self.available_space(inner) == 0 {
                break;
            }

            if inner.exhausted {
                inner.playing = false;
                if let Some(duration) = inner.duration {
                    inner.position = duration;
                }
                events.push(MediaEvent::TimeUpdate { position: inner.position });
                events.push(MediaEvent::Ended);
                events.push(MediaEvent::Pause);
                return;
            }

            let decoded = match inner.decoder.as_mut() {
                Some(decoder) => decoder.decode_next(),
                None => return,
            };

            let converted = match (decoded, inner.converter.as_mut()) {
                (Ok(Some(samples)), Some(converter)) => converter.push(&samples),
                (Ok(None), Some(converter)) => {
                    inner.exhausted = true;
                    converter.finish()
                }
                (Ok(_), None) => return,
                (Err(e), _) => Err(e),
            };

            match converted {
                Ok(mut samples) => {
                    let gain = if inner.muted { 0.0 } else { inner.volume };
                    if gain != 1.0 {
                        for sample in samples.iter_mut() {
                            *sample *= gain;
                        }
                    }
                    inner.pending = samples;
                }
                Err(e) => {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "playback stopped on decode error"
                    );
                    inner.playing = false;
                    events.push(MediaEvent::Error(e.to_string()));
                    events.push(MediaEvent::Pause);
                    return;
                }
            }
        }

        if inner.position != start {
            events.push(MediaEvent::TimeUpdate { position: inner.position });
        }
    }
}

impl MediaElement for FileMedia {
    fn play(&self) -> Result<(), PlaybackError> {
        if let Some(event) = self.open()? {
            self.events.emit(&event);
        }

        let restart = {
            let inner = self.inner.borrow();
            if inner.playing {
                return Ok(());
            }
            inner.exhausted && inner.pending.is_empty()
        };
        if restart {
            self.seek(0.0);
        }

        self.inner.borrow_mut().playing = true;
        self.events.emit(&MediaEvent::Playing);
        Ok(())
    }

    fn pause(&self) {
        let was_playing = std::mem::replace(&mut self.inner.borrow_mut().playing, false);
        if was_playing {
            self.events.emit(&MediaEvent::Pause);
        }
    }

    fn seek(&self, seconds: f64) {
        let landed = {
            let mut inner = self.inner.borrow_mut();
            let Some(decoder) = inner.decoder.as_mut() else {
                return;
            };
            match decoder.seek(seconds) {
                Ok(landed) => {
                    inner.pending.clear();
                    inner.exhausted = false;
                    if let Some(converter) = inner.converter.as_mut() {
                        converter.reset();
                    }
                    inner.direct.clear();
                    inner.position = landed;
                    landed
                }
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), seconds, error = %e, "seek failed");
                    return;
                }
            }
        };
        if self.captured.get() {
            self.tap.clear();
        }
        self.events.emit(&MediaEvent::TimeUpdate { position: landed });
    }

    fn set_volume(&self, volume: f32) {
        let (volume, muted) = {
            let mut inner = self.inner.borrow_mut();
            inner.volume = volume.clamp(0.0, 1.0);
            (inner.volume, inner.muted)
        };
        self.events.emit(&MediaEvent::VolumeChange { volume, muted });
    }

    fn volume(&self) -> f32 {
        self.inner.borrow().volume
    }

    fn set_muted(&self, muted: bool) {
        let volume = {
            let mut inner = self.inner.borrow_mut();
            inner.muted = muted;
            inner.volume
        };
        self.events.emit(&MediaEvent::VolumeChange { volume, muted });
    }

    fn muted(&self) -> bool {
        self.inner.borrow().muted
    }

    fn set_fullscreen(&self, fullscreen: bool) {
        let changed = {
            let mut inner = self.inner.borrow_mut();
            std::mem::replace(&mut inner.fullscreen, fullscreen) != fullscreen
        };
        if changed {
            self.events.emit(&MediaEvent::FullscreenChange(fullscreen));
        }
    }

    fn is_fullscreen(&self) -> bool {
        self.inner.borrow().fullscreen
    }

    fn events(&self) -> &EventEmitter<MediaEvent> {
        &self.events
    }

    fn context(&self) -> Option<Rc<AudioContext>> {
        Some(self.context.clone())
    }

    fn capture_audio(&self) -> Result<AudioTap, GraphError> {
        if self.captured.replace(true) {
            return Err(GraphError::SourceAlreadyCaptured);
        }
        // Audio now only reaches the output through the graph
        self.inner.borrow().direct.clear();
        Ok(self.tap.clone())
    }
}
