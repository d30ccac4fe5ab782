// Audio output using cpal
// Every connected source gets its own ring buffer; the output callback sums them

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use parking_lot::Mutex;
use ringbuf::{HeapRb, traits::{Consumer, Observer, Producer, Split}};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use crate::error::GraphError;

type RingProducer = ringbuf::HeapProd<f32>;
type RingConsumer = ringbuf::HeapCons<f32>;

/// Samples a destination input holds for `ring_buffer_ms` of audio
pub fn ring_capacity(sample_rate: u32, channels: u16, ring_buffer_ms: u32) -> usize {
    sample_rate as usize * channels.max(1) as usize * ring_buffer_ms.max(1) as usize / 1000
}

struct InputSlot {
    id: u64,
    consumer: RingConsumer,
}

/// The single output every signal graph and unrouted element ends in.
///
/// Inputs are interleaved at the owning context's sample rate and channel count.
pub struct Destination {
    inputs: Mutex<Vec<InputSlot>>,
    next_id: AtomicU64,
    capacity: usize,
    volume: Mutex<f32>,
}

impl Destination {
    /// `capacity` is the per-input ring buffer length in samples
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inputs: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            capacity: capacity.max(1),
            volume: Mutex::new(1.0),
        })
    }

    /// Per-input buffer length in samples
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Open a new input. Dropping the returned handle disconnects it.
    pub fn connect(self: &Arc<Self>) -> DestinationInput {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rb = HeapRb::<f32>::new(self.capacity);
        let (producer, consumer) = rb.split();

        self.inputs.lock().push(InputSlot { id, consumer });

        DestinationInput {
            id,
            producer,
            destination: Arc::downgrade(self),
        }
    }

    fn drain(&self, id: u64) {
        if let Some(slot) = self.inputs.lock().iter_mut().find(|slot| slot.id == id) {
            while slot.consumer.try_pop().is_some() {}
        }
    }

    fn disconnect(&self, id: u64) {
        self.inputs.lock().retain(|slot| slot.id != id);
    }

    /// Number of connected inputs
    pub fn input_count(&self) -> usize {
        self.inputs.lock().len()
    }

    /// Mix all inputs into `out`. Inputs that run dry contribute silence.
    pub fn render(&self, out: &mut [f32]) {
        out.fill(0.0);
        let vol = *self.volume.lock();
        let mut inputs = self.inputs.lock();

        for slot in inputs.iter_mut() {
            for sample in out.iter_mut() {
                match slot.consumer.try_pop() {
                    Some(value) => *sample += value,
                    None => break,
                }
            }
        }

        for sample in out.iter_mut() {
            *sample *= vol;
        }
    }

    /// Set the master volume (0.0 to 1.0)
    pub fn set_volume(&self, vol: f32) {
        *self.volume.lock() = vol.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        *self.volume.lock()
    }
}

/// Producer side of one destination input
pub struct DestinationInput {
    id: u64,
    producer: RingProducer,
    destination: Weak<Destination>,
}

impl DestinationInput {
    /// Write samples to the input buffer.
    /// Returns the number of samples actually written
    pub fn write(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Free space in the input buffer, in samples
    pub fn available_space(&self) -> usize {
        self.producer.vacant_len()
    }

    /// Drop whatever is still buffered, e.g. after a seek
    pub fn clear(&self) {
        if let Some(destination) = self.destination.upgrade() {
            destination.drain(self.id);
        }
    }
}

impl Drop for DestinationInput {
    fn drop(&mut self) {
        if let Some(destination) = self.destination.upgrade() {
            destination.disconnect(self.id);
        }
    }
}

/// A cpal stream that continuously renders a [`Destination`]
pub struct AudioOutput {
    _stream: Stream,
    destination: Arc<Destination>,
    sample_rate: u32,
    channels: u16,
}

impl AudioOutput {
    /// Open the default output device. Each destination input buffers
    /// `ring_buffer_ms` of audio.
    pub fn new(ring_buffer_ms: u32) -> Result<Self, GraphError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| GraphError::AudioUnavailable("No output device available".to_string()))?;

        let config = device.default_output_config().map_err(|e| {
            GraphError::AudioUnavailable(format!("Failed to get default output config: {}", e))
        })?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels();

        let capacity = ring_capacity(sample_rate, channels, ring_buffer_ms);
        let destination = Destination::new(capacity);

        // Build the output stream based on sample format
        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config.into(), destination.clone())?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config.into(), destination.clone())?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config.into(), destination.clone())?
            }
            format => return Err(GraphError::UnsupportedSampleFormat(format!("{:?}", format))),
        };

        stream
            .play()
            .map_err(|e| GraphError::AudioUnavailable(format!("Failed to start stream: {}", e)))?;

        tracing::info!(sample_rate, channels, capacity, "audio output started");

        Ok(Self {
            _stream: stream,
            destination,
            sample_rate,
            channels,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        destination: Arc<Destination>,
    ) -> Result<Stream, GraphError> {
        let mut mix: Vec<f32> = Vec::new();
        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    mix.resize(data.len(), 0.0);
                    destination.render(&mut mix);
                    for (sample, value) in data.iter_mut().zip(mix.iter()) {
                        *sample = T::from_sample(value.clamp(-1.0, 1.0));
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio output error");
                },
                None,
            )
            .map_err(|e| {
                GraphError::AudioUnavailable(format!("Failed to build output stream: {}", e))
            })?;

        Ok(stream)
    }

    pub fn destination(&self) -> &Arc<Destination> {
        &self.destination
    }

    /// Get the output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of output channels
    pub fn channels(&self) -> u16 {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_capacity_follows_buffer_length() {
        assert_eq!(ring_capacity(48000, 2, 250), 24000);
        assert_eq!(ring_capacity(44100, 2, 100), 8820);
        // Zero-length buffers still hold a millisecond
        assert_eq!(ring_capacity(48000, 1, 0), 48);
    }

    #[test]
    fn test_inputs_are_summed() {
        let destination = Destination::new(16);
        let mut a = destination.connect();
        let mut b = destination.connect();
        assert_eq!(destination.input_count(), 2);

        a.write(&[0.25, 0.25, 0.25, 0.25]);
        b.write(&[0.5, 0.5]);

        let mut out = [0.0f32; 4];
        destination.render(&mut out);
        assert_eq!(out, [0.75, 0.75, 0.25, 0.25]);
    }

    #[test]
    fn test_dropped_input_disconnects() {
        let destination = Destination::new(16);
        let input = destination.connect();
        assert_eq!(destination.input_count(), 1);
        drop(input);
        assert_eq!(destination.input_count(), 0);
    }

    #[test]
    fn test_full_buffer_rejects_extra_samples() {
        let destination = Destination::new(4);
        let mut input = destination.connect();
        assert_eq!(input.write(&[0.1; 6]), 4);
        assert_eq!(input.available_space(), 0);
    }

    #[test]
    fn test_clear_drains_pending_audio() {
        let destination = Destination::new(8);
        let mut input = destination.connect();
        input.write(&[0.5; 8]);
        input.clear();

        let mut out = [1.0f32; 8];
        destination.render(&mut out);
        assert_eq!(out, [0.0; 8]);
        assert_eq!(input.available_space(), 8);
    }

    #[test]
    fn test_master_volume_scales_mix() {
        let destination = Destination::new(4);
        let mut input = destination.connect();
        destination.set_volume(0.5);
        input.write(&[0.8, 0.8]);

        let mut out = [0.0f32; 2];
        destination.render(&mut out);
        assert_eq!(out, [0.4, 0.4]);
        destination.set_volume(3.0);
        assert_eq!(destination.volume(), 1.0);
    }
}
