//! Stateful biquadratic IIR filter with cookbook parameterizations.
//!
//! Coefficients and state are `f32`; the audio-rate voice and master paths
//! both run at `f32`, so there is no benefit in this engine to the
//! teacher-style `parameter_type` generic the reference implementation
//! uses to let integer sample types filter through a wider internal type.

use std::f32::consts::PI;

/// A second-order IIR filter: two poles, two zeros, two samples of input
/// and output history.
#[derive(Clone, Copy, Debug)]
pub struct Biquad {
    a0: f32,
    a1: f32,
    a2: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    x: [f32; 2],
    y: [f32; 2],
    idx1: usize,
    idx2: usize,
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

impl Biquad {
    /// A filter with identity parameters (pass-through) and zeroed state.
    pub fn new() -> Self {
        let mut f = Self {
            a0: 1.0,
            a1: 0.0,
            a2: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            x: [0.0, 0.0],
            y: [0.0, 0.0],
            idx1: 0,
            idx2: 1,
        };
        f.reset_state();
        f
    }

    /// Resets both parameters (to identity) and state (to zero).
    pub fn clear(&mut self) {
        self.reset_param();
        self.reset_state();
    }

    /// Resets coefficients to the identity (pass-through) filter.
    pub fn reset_param(&mut self) {
        self.a0 = 1.0;
        self.a1 = 0.0;
        self.a2 = 0.0;
        self.b0 = 1.0;
        self.b1 = 0.0;
        self.b2 = 0.0;
    }

    /// Zeros the input/output history without touching parameters.
    pub fn reset_state(&mut self) {
        self.x = [0.0, 0.0];
        self.y = [0.0, 0.0];
        self.idx1 = 0;
        self.idx2 = 1;
    }

    /// Advances the filter by one sample.
    #[inline]
    pub fn update(&mut self, x0: f32) -> f32 {
        let x1 = self.x[self.idx1];
        let x2 = self.x[self.idx2];
        let y1 = self.y[self.idx1];
        let y2 = self.y[self.idx2];

        let y0 = (self.b0 * x0 + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2)
            / self.a0;

        self.x[self.idx2] = x0;
        self.y[self.idx2] = y0;
        self.idx1 ^= 1;
        self.idx2 ^= 1;

        y0
    }

    pub fn set_lowpass(&mut self, sample_freq: u32, cutoff_freq: f32, q: f32) {
        let (sinw0, cosw0, w0) = omega(sample_freq, cutoff_freq);
        let alpha = sinw0 / (2.0 * q);
        let _ = w0;

        self.b0 = (1.0 - cosw0) / 2.0;
        self.b1 = 1.0 - cosw0;
        self.b2 = self.b0;
        self.a0 = 1.0 + alpha;
        self.a1 = -2.0 * cosw0;
        self.a2 = 1.0 - alpha;
    }

    pub fn lowpass(sample_freq: u32, cutoff_freq: f32, q: f32) -> Self {
        let mut f = Self::new();
        f.set_lowpass(sample_freq, cutoff_freq, q);
        f
    }

    pub fn set_highpass(&mut self, sample_freq: u32, cutoff_freq: f32, q: f32) {
        let (sinw0, cosw0, _) = omega(sample_freq, cutoff_freq);
        let alpha = sinw0 / (2.0 * q);

        self.b0 = (1.0 + cosw0) / 2.0;
        self.b1 = -(1.0 + cosw0);
        self.b2 = self.b0;
        self.a0 = 1.0 + alpha;
        self.a1 = -2.0 * cosw0;
        self.a2 = 1.0 - alpha;
    }

    pub fn highpass(sample_freq: u32, cutoff_freq: f32, q: f32) -> Self {
        let mut f = Self::new();
        f.set_highpass(sample_freq, cutoff_freq, q);
        f
    }

    pub fn set_bandpass1(&mut self, sample_freq: u32, center_freq: f32, bw: f32) {
        let (sinw0, cosw0, _) = omega(sample_freq, center_freq);
        let alpha = 2.0 * sinw0 / bw;

        self.b0 = bw * alpha;
        self.b1 = 0.0;
        self.b2 = -bw * alpha;
        self.a0 = 1.0 + alpha;
        self.a1 = -2.0 * cosw0;
        self.a2 = 1.0 - alpha;
    }

    pub fn set_bandpass2(&mut self, sample_freq: u32, center_freq: f32, bw: f32) {
        let (sinw0, cosw0, w0) = omega(sample_freq, center_freq);
        let alpha = alpha_from_bandwidth(sinw0, w0, bw);

        self.b0 = alpha;
        self.b1 = 0.0;
        self.b2 = -alpha;
        self.a0 = 1.0 + alpha;
        self.a1 = -2.0 * cosw0;
        self.a2 = 1.0 - alpha;
    }

    pub fn set_bandstop(&mut self, sample_freq: u32, center_freq: f32, bw: f32) {
        let (sinw0, cosw0, w0) = omega(sample_freq, center_freq);
        let alpha = alpha_from_bandwidth(sinw0, w0, bw);

        self.b0 = 1.0;
        self.b1 = -2.0 * cosw0;
        self.b2 = 1.0;
        self.a0 = 1.0 + alpha;
        self.a1 = -2.0 * cosw0;
        self.a2 = 1.0 - alpha;
    }

    pub fn set_allpass(&mut self, sample_freq: u32, cutoff_freq: f32, bw: f32) {
        let (sinw0, cosw0, w0) = omega(sample_freq, cutoff_freq);
        let alpha = alpha_from_bandwidth(sinw0, w0, bw);

        self.b0 = 1.0 - alpha;
        self.b1 = -2.0 * cosw0;
        self.b2 = 1.0 + alpha;
        self.a0 = 1.0 + alpha;
        self.a1 = -2.0 * cosw0;
        self.a2 = 1.0 - alpha;
    }

    /// `gain` is in dB.
    pub fn set_peaking(&mut self, sample_freq: u32, center_freq: f32, bw: f32, gain: f32) {
        let (sinw0, cosw0, w0) = omega(sample_freq, center_freq);
        let alpha = alpha_from_bandwidth(sinw0, w0, bw);
        let a = (10f32.powf(gain / 20.0)).sqrt();

        self.b0 = 1.0 + alpha * a;
        self.b1 = -2.0 * cosw0;
        self.b2 = 1.0 - alpha * a;
        self.a0 = 1.0 + alpha / a;
        self.a1 = -2.0 * cosw0;
        self.a2 = 1.0 - alpha / a;
    }

    /// `shelf_slope` is the cookbook "S" shelf-slope parameter; `gain` is in
    /// dB.
    pub fn set_loshelf(&mut self, sample_freq: u32, cutoff_freq: f32, shelf_slope: f32, gain: f32) {
        let (sinw0, cosw0, _) = omega(sample_freq, cutoff_freq);
        let a = (10f32.powf(gain / 20.0)).sqrt();
        let alpha = sinw0 / 2.0 * ((a + 1.0 / a) * (1.0 / shelf_slope - 1.0) + 2.0).sqrt();
        let sqrt_a = a.sqrt();

        self.b0 = a * ((a + 1.0) - (a - 1.0) * cosw0 + 2.0 * sqrt_a * alpha);
        self.b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cosw0);
        self.b2 = a * ((a + 1.0) - (a - 1.0) * cosw0 - 2.0 * sqrt_a * alpha);
        self.a0 = (a + 1.0) + (a - 1.0) * cosw0 + 2.0 * sqrt_a * alpha;
        self.a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cosw0);
        self.a2 = (a + 1.0) + (a - 1.0) * cosw0 - 2.0 * sqrt_a * alpha;
    }

    /// `shelf_slope` is the cookbook "S" shelf-slope parameter; `gain` is in
    /// dB.
    pub fn set_highshelf(
        &mut self,
        sample_freq: u32,
        cutoff_freq: f32,
        shelf_slope: f32,
        gain: f32,
    ) {
        let (sinw0, cosw0, _) = omega(sample_freq, cutoff_freq);
        let a = (10f32.powf(gain / 20.0)).sqrt();
        let alpha = sinw0 / 2.0 * ((a + 1.0 / a) * (1.0 / shelf_slope - 1.0) + 2.0).sqrt();
        let sqrt_a = a.sqrt();

        self.b0 = a * ((a + 1.0) + (a - 1.0) * cosw0 + 2.0 * sqrt_a * alpha);
        self.b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cosw0);
        self.b2 = a * ((a + 1.0) + (a - 1.0) * cosw0 - 2.0 * sqrt_a * alpha);
        self.a0 = (a + 1.0) - (a - 1.0) * cosw0 + 2.0 * sqrt_a * alpha;
        self.a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cosw0);
        self.a2 = (a + 1.0) - (a - 1.0) * cosw0 - 2.0 * sqrt_a * alpha;
    }
}

#[inline]
fn omega(sample_freq: u32, freq: f32) -> (f32, f32, f32) {
    let w0 = 2.0 * PI * freq / sample_freq as f32;
    (w0.sin(), w0.cos(), w0)
}

#[inline]
fn alpha_from_bandwidth(sinw0: f32, w0: f32, bw: f32) -> f32 {
    let ln2 = 2f32.ln();
    sinw0 * (ln2 * bw * w0 / sinw0).sinh()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_is_identity() {
        let mut f = Biquad::new();
        for x in [0.1, -0.2, 0.9, -1.0, 0.0] {
            assert_eq!(f.update(x), x);
        }
    }

    #[test]
    fn lowpass_attenuates_a_tone_well_above_cutoff() {
        let sr = 44100;
        let mut f = Biquad::lowpass(sr, 200.0, std::f32::consts::FRAC_1_SQRT_2);
        let freq = 10_000.0;
        let mut peak_out: f32 = 0.0;
        for n in 0..sr {
            let x = (2.0 * PI * freq * n as f32 / sr as f32).sin();
            let y = f.update(x);
            if n > sr / 2 {
                peak_out = peak_out.max(y.abs());
            }
        }
        assert!(peak_out < 0.2, "expected strong attenuation, got {peak_out}");
    }

    #[test]
    fn reset_state_clears_history_but_keeps_parameters() {
        let mut f = Biquad::lowpass(44100, 1000.0, 0.707);
        f.update(1.0);
        f.update(1.0);
        let before = f.a0;
        f.reset_state();
        assert_eq!(f.a0, before);
        assert_eq!(f.update(0.0), 0.0);
    }
}
