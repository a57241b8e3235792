//! Wavetable oscillator: phase-accumulating lookup with pre-amp and
//! "cycles per table" scaling, plus the factory that seeds the built-in
//! preset tables from [`FunctionGenerator`] output.

use std::sync::Arc;

use gmsynth_utils::floored_division;

use crate::biquad::Biquad;
use crate::function_generator::FunctionGenerator;

/// An immutable wavetable: `samples` holds `cycles` periods of a waveform,
/// `pre_amp` is applied on every lookup.
pub struct WaveTable {
    samples: Arc<[f32]>,
    pre_amp: f32,
    cycles: f32,
}

impl WaveTable {
    /// `pre_amp < 0` means "auto-normalize by RMS, then scale by
    /// `|pre_amp|`" (used by the drum-noise preset, whose raw filtered
    /// noise has no predictable level).
    pub fn new(samples: Vec<f32>, pre_amp: f32, cycles: f32) -> Self {
        let resolved_pre_amp = if pre_amp < 0.0 {
            let rms = rms_level(&samples);
            1.0 / (rms * rms + 1.0e-8) * pre_amp.abs()
        } else {
            pre_amp
        };
        Self {
            samples: samples.into(),
            pre_amp: resolved_pre_amp,
            cycles,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Reads a shared [`WaveTable`] at a caller-controlled frequency, tracking
/// its own phase.
#[derive(Clone)]
pub struct WaveTableGenerator {
    table: Arc<WaveTable>,
    volume: f32,
    phase: f64,
}

impl WaveTableGenerator {
    pub fn new(table: Arc<WaveTable>, volume: f32) -> Self {
        Self {
            table,
            volume,
            phase: 0.0,
        }
    }

    /// Advances phase by `frequency * cycles / sampleRate * L` samples
    /// (mod `L`) and returns the linearly-interpolated sample, scaled by
    /// pre-amp and voice volume.
    pub fn update(&mut self, sample_freq: u32, frequency: f32) -> f32 {
        let len = self.table.len();
        if len == 0 {
            return 0.0;
        }
        let l = len as f64;
        let advance =
            frequency as f64 * self.table.cycles as f64 / sample_freq as f64 * l;

        let i0 = self.phase.floor() as usize % len;
        let i1 = (i0 + 1) % len;
        let frac = (self.phase - self.phase.floor()) as f32;
        let s0 = self.table.samples[i0];
        let s1 = self.table.samples[i1];
        let interpolated = s0 + (s1 - s0) * frac;

        self.phase = floored_division(self.phase + advance, l);

        interpolated * self.table.pre_amp * self.volume
    }
}

/// Identifies one of the built-in wavetable presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Ground,
    SinWave,
    Triangle,
    Sawtooth,
    SquareWave50,
    SquareWave33,
    SquareWave25,
    WhiteNoise,
    /// Filtered white noise used for drum-kit voices: five cascaded
    /// lowpass biquads narrow it toward a low rumble, ~62.5 cycles packed
    /// into the table so one lookup pass spans many perceptual cycles.
    DrumNoise,
}

/// Holds every preset wavetable the engine needs, built once at startup.
pub struct WaveTableFactory {
    ground: Arc<WaveTable>,
    sin_wave: Arc<WaveTable>,
    triangle: Arc<WaveTable>,
    sawtooth: Arc<WaveTable>,
    square_wave_50: Arc<WaveTable>,
    square_wave_33: Arc<WaveTable>,
    square_wave_25: Arc<WaveTable>,
    white_noise: Arc<WaveTable>,
    drum_noise: Arc<WaveTable>,
}

impl Default for WaveTableFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveTableFactory {
    pub fn new() -> Self {
        Self {
            ground: Arc::new(WaveTable::new(vec![0.0], 0.0, 1.0)),
            sin_wave: Arc::new(build_periodic(|fg, sr| fg.set_sin_wave(sr, 1.0, false))),
            triangle: Arc::new(build_periodic(|fg, sr| fg.set_triangle_wave(sr, 1.0, false))),
            sawtooth: Arc::new(build_periodic(|fg, sr| fg.set_saw_wave(sr, 1.0, false))),
            square_wave_50: Arc::new(build_periodic(|fg, sr| {
                fg.set_square_wave(sr, 1.0, std::f32::consts::PI, false)
            })),
            square_wave_33: Arc::new(build_periodic(|fg, sr| {
                fg.set_square_wave(sr, 1.0, std::f32::consts::PI / 1.5, false)
            })),
            square_wave_25: Arc::new(build_periodic(|fg, sr| {
                fg.set_square_wave(sr, 1.0, std::f32::consts::PI / 2.0, false)
            })),
            white_noise: Arc::new(build_white_noise()),
            drum_noise: Arc::new(build_drum_noise()),
        }
    }

    pub fn get(&self, preset: Preset) -> Arc<WaveTable> {
        match preset {
            Preset::Ground => self.ground.clone(),
            Preset::SinWave => self.sin_wave.clone(),
            Preset::Triangle => self.triangle.clone(),
            Preset::Sawtooth => self.sawtooth.clone(),
            Preset::SquareWave50 => self.square_wave_50.clone(),
            Preset::SquareWave33 => self.square_wave_33.clone(),
            Preset::SquareWave25 => self.square_wave_25.clone(),
            Preset::WhiteNoise => self.white_noise.clone(),
            Preset::DrumNoise => self.drum_noise.clone(),
        }
    }

    pub fn create_generator(&self, preset: Preset, volume: f32) -> WaveTableGenerator {
        WaveTableGenerator::new(self.get(preset), volume)
    }
}

const PERIODIC_TABLE_SAMPLES: usize = 512;
const WHITE_NOISE_TABLE_SAMPLES: usize = 16384;
const DRUM_NOISE_TABLE_SAMPLES: usize = 131072;
const DRUM_NOISE_SETTLE_PASSES: usize = 2;

fn build_periodic(setup: impl FnOnce(&mut FunctionGenerator, u32)) -> WaveTable {
    let mut fg = FunctionGenerator::new();
    setup(&mut fg, PERIODIC_TABLE_SAMPLES as u32);
    let samples = (0..PERIODIC_TABLE_SAMPLES).map(|_| fg.update()).collect();
    WaveTable::new(samples, 1.0, 1.0)
}

fn build_white_noise() -> WaveTable {
    let mut fg = FunctionGenerator::new();
    fg.set_white_noise();
    let samples = (0..WHITE_NOISE_TABLE_SAMPLES).map(|_| fg.update()).collect();
    WaveTable::new(samples, 1.0, 1.0)
}

fn build_drum_noise() -> WaveTable {
    let mut fg = FunctionGenerator::new();
    fg.set_white_noise();
    let mut filters = [
        Biquad::lowpass(44100, 4000.0, 0.5),
        Biquad::lowpass(44100, 4000.0, 0.5),
        Biquad::lowpass(44100, 3000.0, 0.5),
        Biquad::lowpass(44100, 2000.0, 0.5),
        Biquad::lowpass(44100, 1000.0, 1.0),
    ];

    // Discard samples until the cascade's filter state has settled.
    for _ in 0..(DRUM_NOISE_TABLE_SAMPLES * DRUM_NOISE_SETTLE_PASSES) {
        let mut s = fg.update();
        for f in &mut filters {
            s = f.update(s);
        }
    }

    let samples = (0..DRUM_NOISE_TABLE_SAMPLES)
        .map(|_| {
            let mut s = fg.update();
            for f in &mut filters {
                s = f.update(s);
            }
            s
        })
        .collect();
    WaveTable::new(samples, -0.30, 62.5)
}
