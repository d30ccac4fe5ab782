// Biquad filters for the equalizer chain
// Coefficients follow the RBJ audio EQ cookbook, which is also what Web Audio's
// BiquadFilterNode specifies (shelf slope S = 1)

use std::f64::consts::PI;

/// Filter characteristic of a biquad stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiquadKind {
    LowShelf,
    HighShelf,
    Peaking,
}

/// Normalized coefficients (a0 == 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Pass-through
    pub fn identity() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    pub fn new(kind: BiquadKind, frequency: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let nyquist = sample_rate / 2.0;
        if !(frequency > 0.0) || frequency >= nyquist || !gain_db.is_finite() {
            // Above Nyquist the band has nothing to act on
            return Self::identity();
        }

        let a = 10.0_f64.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * frequency / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();

        let (b0, b1, b2, a0, a1, a2) = match kind {
            BiquadKind::LowShelf => {
                let alpha = sin_w0 / 2.0 * 2.0_f64.sqrt();
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + k),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - k),
                    (a + 1.0) + (a - 1.0) * cos_w0 + k,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - k,
                )
            }
            BiquadKind::HighShelf => {
                let alpha = sin_w0 / 2.0 * 2.0_f64.sqrt();
                let k = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + k),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - k),
                    (a + 1.0) - (a - 1.0) * cos_w0 + k,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - k,
                )
            }
            BiquadKind::Peaking => {
                let alpha = sin_w0 / (2.0 * q.max(1e-4));
                (
                    1.0 + alpha * a,
                    -2.0 * cos_w0,
                    1.0 - alpha * a,
                    1.0 + alpha / a,
                    -2.0 * cos_w0,
                    1.0 - alpha / a,
                )
            }
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response in dB at `frequency`
    pub fn magnitude_db(&self, frequency: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * frequency / sample_rate;
        // z^-1 = e^{-jw}, z^-2 = e^{-2jw}
        let (s1, c1) = (-w).sin_cos();
        let (s2, c2) = (-2.0 * w).sin_cos();

        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = self.b1 * s1 + self.b2 * s2;
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = self.a1 * s1 + self.a2 * s2;

        let num = (num_re * num_re + num_im * num_im).sqrt();
        let den = (den_re * den_re + den_im * den_im).sqrt();
        20.0 * (num / den).log10()
    }
}

/// A biquad with one transposed direct form II state per channel
#[derive(Debug, Clone)]
pub struct Biquad {
    coeffs: BiquadCoeffs,
    state: Vec<[f64; 2]>,
}

impl Biquad {
    pub fn new(coeffs: BiquadCoeffs, channels: usize) -> Self {
        Self {
            coeffs,
            state: vec![[0.0; 2]; channels.max(1)],
        }
    }

    /// Swap coefficients without clearing state, so live changes don't click
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    /// Filter interleaved samples in place
    pub fn process(&mut self, samples: &mut [f32]) {
        let channels = self.state.len();
        let c = self.coeffs;
        for frame in samples.chunks_mut(channels) {
            for (sample, z) in frame.iter_mut().zip(self.state.iter_mut()) {
                let x = *sample as f64;
                let y = c.b0 * x + z[0];
                z[0] = c.b1 * x - c.a1 * y + z[1];
                z[1] = c.b2 * x - c.a2 * y;
                *sample = y as f32;
            }
        }
    }

    pub fn reset(&mut self) {
        for z in &mut self.state {
            *z = [0.0; 2];
        }
    }
}
