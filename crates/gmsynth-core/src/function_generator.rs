//! Waveform seed generators used to build wavetables: sine, saw, triangle,
//! square (with duty), white noise.

use rand::distributions::{Distribution, Uniform};
use rand::{Rng, SeedableRng};
use rand_mt::Mt19937GenRand32;
use std::f32::consts::PI;

use gmsynth_utils::floored_division;

/// Which waveform a [`FunctionGenerator`] is currently producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveFormType {
    /// Constant 0.
    Ground,
    Sin,
    Saw,
    Triangle,
    Square,
    WhiteNoise,
}

/// Produces one waveform sample per call, used only to seed wavetables at
/// startup (not in the per-voice audio path).
pub struct FunctionGenerator {
    kind: WaveFormType,
    phase: f64,
    duty_rate: f64,
    sample_per_phase: f64,
    rng: Mt19937GenRand32,
    uniform: Uniform<f32>,
}

impl Default for FunctionGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl FunctionGenerator {
    /// Seeds the internal Mersenne Twister from a non-deterministic source
    /// (the thread-local OS-backed RNG), exactly once at construction.
    pub fn new() -> Self {
        let seed: u64 = rand::thread_rng().gen();
        Self {
            kind: WaveFormType::Ground,
            phase: 0.0,
            duty_rate: 0.0,
            sample_per_phase: 0.0,
            rng: Mt19937GenRand32::seed_from_u64(seed),
            uniform: Uniform::new_inclusive(-1.0, 1.0),
        }
    }

    pub fn set_ground(&mut self) {
        self.kind = WaveFormType::Ground;
        self.sample_per_phase = 0.0;
    }

    pub fn set_sin_wave(&mut self, sample_freq: u32, freq: f32, keep_phase: bool) {
        self.set_periodic(WaveFormType::Sin, sample_freq, freq, keep_phase);
    }

    pub fn set_saw_wave(&mut self, sample_freq: u32, freq: f32, keep_phase: bool) {
        self.set_periodic(WaveFormType::Saw, sample_freq, freq, keep_phase);
    }

    pub fn set_triangle_wave(&mut self, sample_freq: u32, freq: f32, keep_phase: bool) {
        self.set_periodic(WaveFormType::Triangle, sample_freq, freq, keep_phase);
    }

    /// `duty` is the phase (in radians, [0, 2π)) below which the square
    /// wave outputs +1; defaults to π (50% duty) to match the reference
    /// generator's default.
    pub fn set_square_wave(&mut self, sample_freq: u32, freq: f32, duty: f32, keep_phase: bool) {
        self.set_periodic(WaveFormType::Square, sample_freq, freq, keep_phase);
        self.duty_rate = duty as f64;
    }

    pub fn set_white_noise(&mut self) {
        self.kind = WaveFormType::WhiteNoise;
        self.sample_per_phase = 0.0;
    }

    fn set_periodic(&mut self, kind: WaveFormType, sample_freq: u32, freq: f32, keep_phase: bool) {
        let freq = freq.abs() as f64;
        self.kind = kind;
        self.sample_per_phase = 2.0 * PI as f64 * (freq / sample_freq as f64);
        if !keep_phase {
            self.phase = 0.0;
        }
    }

    /// Produces the next sample and advances phase.
    pub fn update(&mut self) -> f32 {
        const PERIOD: f64 = 2.0 * std::f64::consts::PI;
        const HALF_PERIOD: f64 = std::f64::consts::PI;

        let s = match self.kind {
            WaveFormType::Ground => 0.0,
            WaveFormType::Sin => self.phase.sin() as f32,
            WaveFormType::Saw => (-1.0 + 2.0 * (self.phase / PERIOD)) as f32,
            WaveFormType::Triangle => {
                if self.phase < HALF_PERIOD {
                    (-1.0 + 2.0 * (self.phase / HALF_PERIOD)) as f32
                } else {
                    (1.0 - 2.0 * ((self.phase - HALF_PERIOD) / HALF_PERIOD)) as f32
                }
            }
            WaveFormType::Square => {
                if self.phase < self.duty_rate {
                    1.0
                } else {
                    -1.0
                }
            }
            WaveFormType::WhiteNoise => self.uniform.sample(&mut self.rng),
        };

        self.phase = floored_division(self.phase + self.sample_per_phase, PERIOD);
        s
    }
}
