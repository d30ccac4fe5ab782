// Media decoding with Symphonia
// Pulls the audio track out of an audio file or a video container as interleaved f32

use std::fs::File;
use std::path::Path;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::error::PlaybackError;

pub struct AudioDecoder {
    reader: Box<dyn FormatReader>,
    codec: Box<dyn Decoder>,
    track: u32,
    rate: u32,
    channel_count: usize,
    duration: Option<f64>,
    scratch: Option<SampleBuffer<f32>>,
}

impl AudioDecoder {
    /// Probe `path` and prepare its first decodable audio track
    pub fn open(path: &Path) -> Result<Self, PlaybackError> {
        let source = File::open(path)
            .map_err(|e| PlaybackError::Load(format!("cannot open {}: {e}", path.display())))?;
        let stream = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let reader = symphonia::default::get_probe()
            .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| PlaybackError::Load(format!("unrecognised container: {e}")))?
            .format;

        // Video containers also hold video and subtitle tracks
        let (track, params) = reader
            .tracks()
            .iter()
            .find(|t| {
                t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some()
            })
            .map(|t| (t.id, t.codec_params.clone()))
            .ok_or_else(|| PlaybackError::Load("no audio track".to_string()))?;

        let rate = params.sample_rate.unwrap_or(44100);
        let channel_count = params.channels.map(|c| c.count()).unwrap_or(2);
        let duration = params.n_frames.map(|frames| frames as f64 / rate as f64);

        let codec = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| PlaybackError::Load(format!("unsupported codec: {e}")))?;

        tracing::debug!(path = %path.display(), rate, channel_count, ?duration, "opened media");

        Ok(Self {
            reader,
            codec,
            track,
            rate,
            channel_count,
            duration,
            scratch: None,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.rate
    }

    pub fn channels(&self) -> usize {
        self.channel_count
    }

    /// Duration in seconds, if the container declares it
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration
    }

    /// Decode the next packet of our track as interleaved f32.
    /// `None` at end of stream.
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>, PlaybackError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.codec.reset();
                    continue;
                }
                Err(e) => return Err(PlaybackError::Decode(format!("cannot read packet: {e}"))),
            };
            if packet.track_id() != self.track {
                continue;
            }

            let decoded = match self.codec.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::warn!(error = %e, "skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(PlaybackError::Decode(e.to_string())),
            };

            let capacity = decoded.capacity();
            if self.scratch.as_ref().map_or(true, |buf| buf.capacity() < capacity) {
                let spec = SignalSpec::new(decoded.spec().rate, decoded.spec().channels);
                self.scratch = Some(SampleBuffer::<f32>::new(capacity as u64, spec));
            }
            let Some(scratch) = self.scratch.as_mut() else {
                continue;
            };
            scratch.copy_interleaved_ref(decoded);
            return Ok(Some(scratch.samples().to_vec()));
        }
    }

    /// Jump to `seconds`; returns where the reader actually landed
    pub fn seek(&mut self, seconds: f64) -> Result<f64, PlaybackError> {
        let seconds = seconds.max(0.0);
        let target = SeekTo::Time {
            time: Time::new(seconds.trunc() as u64, seconds.fract()),
            track_id: Some(self.track),
        };

        let landed = self
            .reader
            .seek(SeekMode::Coarse, target)
            .map_err(|e| PlaybackError::Seek(e.to_string()))?;
        self.codec.reset();

        Ok(landed.actual_ts as f64 / self.rate as f64)
    }
}
