//! A single sounding note: oscillator + filters + envelope + gain + pan,
//! plus note lifecycle flags. Melody and drum voices share one struct
//! (see module docs on why this isn't modeled with inheritance); the
//! handful of ways they differ are captured in [`VoiceKind`] and in how
//! `channel.rs` constructs them.

use gmsynth_utils::{declare_issuable_id, IssuableId};

use crate::biquad::Biquad;
use crate::envelope::{Curve, EnvelopeGenerator, EnvelopeState};
use crate::instrument_table::MelodyWaveForm;
use crate::wavetable::{Preset, WaveTableFactory, WaveTableGenerator};

declare_issuable_id!(VoiceIdTag, VoiceId);

/// Which creation path built this voice. Carried for `digest()` and for
/// channel-side bookkeeping (e.g. drum voices never honor pedal hold the
/// way melody voices do).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceKind {
    Melody,
    Drum,
}

pub fn preset_for_wave_form(wave_form: MelodyWaveForm) -> Preset {
    match wave_form {
        MelodyWaveForm::Square => Preset::SquareWave50,
        MelodyWaveForm::Sine => Preset::SinWave,
        MelodyWaveForm::Triangle => Preset::Triangle,
        MelodyWaveForm::Sawtooth => Preset::Sawtooth,
        MelodyWaveForm::Noise => Preset::WhiteNoise,
    }
}

/// `440 * 2^((noteNo-69)/12)`, MIDI note number to frequency in Hz.
pub fn note_to_frequency(note_no: i32) -> f32 {
    440.0 * 2f32.powf((note_no - 69) as f32 / 12.0)
}

pub struct Voice {
    id: IssuableId<VoiceIdTag>,
    kind: VoiceKind,
    note_no: u8,
    generator: WaveTableGenerator,
    cutoff_filter: Biquad,
    resonance_filter: Biquad,
    envelope: EnvelopeGenerator,
    gain: f32,
    /// `Some(pan)` for a voice with its own fixed pan (drum voices, whose
    /// pan comes from the instrument table or an NRPN override, possibly
    /// randomized); `None` means "use the owning channel's pan" (melody
    /// voices).
    pan: Option<f32>,
    base_frequency: f32,
    pitch_bend_semitones: f32,
    held: bool,
    pending_note_off: bool,

    /// Unscaled (instrument-table) AHDR seconds, kept so a later CC72/73/75
    /// or NRPN(1,99/100) time-scale change can be reapplied from scratch
    /// instead of compounding onto an already-scaled value.
    base_attack: f32,
    base_hold: f32,
    base_decay: f32,
    base_release: f32,
    sample_freq: u32,
}

#[allow(clippy::too_many_arguments)]
impl Voice {
    /// `gain` is `10^(−20·(1−vel/127)/20) · instrumentVolume / max(sustain, 0.8)`,
    /// computed by the caller ([`channel.rs`](crate::channel)) since the
    /// sustain level lives on the envelope, not on the voice.
    pub fn new_melody(
        id: IssuableId<VoiceIdTag>,
        sample_freq: u32,
        note_no: u8,
        wave_table_factory: &WaveTableFactory,
        wave_form: MelodyWaveForm,
        gain: f32,
        cutoff_hz: f32,
        cutoff_gain_db: f32,
        resonance_q: f32,
        base_attack: f32,
        base_hold: f32,
        base_decay: f32,
        sustain_level: f32,
        fade_slope: f32,
        base_release: f32,
        attack_scale: f32,
        decay_scale: f32,
        release_scale: f32,
        drum_like: bool,
    ) -> Self {
        let attack = base_attack * attack_scale;
        let hold = base_hold;
        let decay = base_decay * decay_scale;
        let release = base_release * release_scale;

        let mut envelope = EnvelopeGenerator::new();
        if drum_like {
            envelope.set_drum_envelope(sample_freq, Curve::exp(3.0), attack, hold, decay, 1e-3);
        } else {
            envelope.set_melody_envelope(
                sample_freq,
                Curve::linear(),
                attack,
                hold,
                decay,
                sustain_level,
                fade_slope,
                release,
                1e-3,
            );
        }
        envelope.note_on();

        let mut cutoff_filter = Biquad::new();
        cutoff_filter.set_highshelf(sample_freq, cutoff_hz, 1.0, cutoff_gain_db);
        let mut resonance_filter = Biquad::new();
        resonance_filter.set_peaking(sample_freq, cutoff_hz, 1.0, resonance_q);

        Self {
            id,
            kind: VoiceKind::Melody,
            note_no,
            generator: wave_table_factory
                .create_generator(preset_for_wave_form(wave_form), 1.0),
            cutoff_filter,
            resonance_filter,
            envelope,
            gain,
            pan: None,
            base_frequency: note_to_frequency(note_no as i32),
            pitch_bend_semitones: 0.0,
            held: false,
            pending_note_off: false,
            base_attack,
            base_hold,
            base_decay,
            base_release,
            sample_freq,
        }
    }

    /// `note_no` is the drum-kit note (determines which sample plays, not
    /// pitch, which is fixed by `pitch_note_no` plus the coarse/fine NRPN
    /// offsets baked into `base_frequency` by the caller). `pan` is
    /// `None` when NRPN(28,noteNo)==0 requested randomized pan; the
    /// caller resolves the random draw before construction so the voice
    /// itself stays deterministic given its inputs.
    pub fn new_drum(
        id: IssuableId<VoiceIdTag>,
        sample_freq: u32,
        note_no: u8,
        wave_table_factory: &WaveTableFactory,
        gain: f32,
        pan: f32,
        base_frequency: f32,
        base_attack: f32,
        base_hold: f32,
        base_decay: f32,
        attack_scale: f32,
        decay_scale: f32,
    ) -> Self {
        let attack = base_attack * attack_scale;
        let decay = base_decay * decay_scale;

        let mut envelope = EnvelopeGenerator::new();
        envelope.set_drum_envelope(sample_freq, Curve::exp(3.0), attack, base_hold, decay, 1e-3);
        envelope.note_on();

        Self {
            id,
            kind: VoiceKind::Drum,
            note_no,
            generator: wave_table_factory.create_generator(Preset::DrumNoise, 1.0),
            cutoff_filter: Biquad::new(),
            resonance_filter: Biquad::new(),
            envelope,
            gain,
            pan: Some(pan),
            base_frequency,
            pitch_bend_semitones: 0.0,
            held: false,
            pending_note_off: false,
            base_attack,
            base_hold,
            base_decay,
            base_release: 0.0,
            sample_freq,
        }
    }

    pub fn id(&self) -> IssuableId<VoiceIdTag> {
        self.id
    }

    pub fn kind(&self) -> VoiceKind {
        self.kind
    }

    pub fn note_no(&self) -> u8 {
        self.note_no
    }

    pub fn resolved_frequency(&self) -> f32 {
        self.base_frequency * 2f32.powf(self.pitch_bend_semitones / 12.0)
    }

    /// Resolved stereo pan: the voice's own pan if it has one, otherwise
    /// the channel's.
    pub fn pan(&self, channel_pan: f32) -> f32 {
        self.pan.unwrap_or(channel_pan)
    }

    pub fn set_pitch_bend(&mut self, semitones: f32) {
        self.pitch_bend_semitones = semitones;
    }

    /// Reconfigures the cutoff/resonance filters (CC74/71 or NRPN(1,32/33)
    /// changed while this voice is sounding). Melody voices only; drum
    /// voices don't run these filters.
    pub fn set_filter(&mut self, sample_freq: u32, cutoff_hz: f32, cutoff_gain_db: f32, resonance_q: f32) {
        self.cutoff_filter
            .set_highshelf(sample_freq, cutoff_hz, 1.0, cutoff_gain_db);
        self.resonance_filter
            .set_peaking(sample_freq, cutoff_hz, 1.0, resonance_q);
    }

    /// CC72/73/75 or NRPN(1,99/100) time-scale changed while sounding;
    /// recomputes the AHDR segment lengths from this voice's unscaled base
    /// times and the new scale factors, rescaling the envelope in place.
    pub fn rescale_envelope(&mut self, attack_scale: f32, decay_scale: f32, release_scale: f32) {
        let to_samples = |seconds: f32| (self.sample_freq as f32 * seconds.max(0.0)) as u64;
        self.envelope.retime(
            to_samples(self.base_attack * attack_scale),
            to_samples(self.base_hold),
            to_samples(self.base_decay * decay_scale),
            to_samples(self.base_release * release_scale),
        );
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Pedal state changed. Going from held to not-held while a note-off
    /// is pending forces the envelope into Release immediately.
    pub fn set_hold(&mut self, held: bool) {
        self.held = held;
        if !held && self.pending_note_off {
            self.envelope.note_off();
        }
    }

    /// Marks this voice for release; if the sustain pedal is down the
    /// actual envelope transition is deferred until the pedal lifts.
    pub fn note_off(&mut self) {
        self.pending_note_off = true;
        if !self.held {
            self.envelope.note_off();
        }
    }

    /// Immediately silences the voice, bypassing any release tail
    /// (CC120 "all sound off").
    pub fn note_cut(&mut self) {
        self.envelope.force_free();
    }

    pub fn is_busy(&self) -> bool {
        self.envelope.is_busy()
    }

    pub fn envelope_state(&self) -> EnvelopeState {
        self.envelope.state()
    }

    pub fn envelope_level(&self) -> f32 {
        self.envelope.envelope()
    }

    /// Advances one sample: wavetable -> cutoff filter -> resonance
    /// filter -> x envelope -> x voice gain. Mono.
    pub fn update(&mut self, sample_freq: u32) -> f32 {
        let freq = self.resolved_frequency();
        let mut s = self.generator.update(sample_freq, freq);
        s = self.cutoff_filter.update(s);
        s = self.resonance_filter.update(s);
        s *= self.envelope.update();
        s *= self.gain;
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> WaveTableFactory {
        WaveTableFactory::new()
    }

    #[test]
    fn note_to_frequency_a4_is_440() {
        assert!((note_to_frequency(69) - 440.0).abs() < 1e-3);
    }

    #[test]
    fn melody_voice_starts_busy_and_eventually_frees_after_note_off() {
        let f = factory();
        let mut v = Voice::new_melody(
            VoiceId::issue(),
            1000,
            60,
            &f,
            MelodyWaveForm::Square,
            1.0,
            5000.0,
            0.0,
            0.707,
            0.01,
            0.0,
            0.01,
            0.7,
            -1.0,
            0.02,
            1.0,
            1.0,
            1.0,
            false,
        );
        assert!(v.is_busy());
        for _ in 0..50 {
            v.update(1000);
        }
        v.note_off();
        for _ in 0..200 {
            if !v.is_busy() {
                break;
            }
            v.update(1000);
        }
        assert!(!v.is_busy());
    }

    #[test]
    fn held_voice_defers_release_until_pedal_lifts() {
        let f = factory();
        let mut v = Voice::new_melody(
            VoiceId::issue(),
            1000,
            60,
            &f,
            MelodyWaveForm::Square,
            1.0,
            5000.0,
            0.0,
            0.707,
            0.0,
            0.0,
            0.0,
            0.7,
            -1.0,
            0.02,
            1.0,
            1.0,
            1.0,
            false,
        );
        v.set_hold(true);
        v.note_off();
        for _ in 0..50 {
            v.update(1000);
        }
        assert_ne!(v.envelope_state(), EnvelopeState::Release);
        v.set_hold(false);
        assert_eq!(v.envelope_state(), EnvelopeState::Release);
    }

    #[test]
    fn drum_voice_ignores_note_off_entirely() {
        let f = factory();
        let mut v = Voice::new_drum(
            VoiceId::issue(),
            1000,
            36,
            &f,
            1.0,
            0.5,
            80.0,
            0.0,
            0.0,
            0.02,
            1.0,
            1.0,
        );
        v.note_off();
        assert_eq!(v.envelope_state(), EnvelopeState::Attack);
    }

    #[test]
    fn note_cut_silences_immediately() {
        let f = factory();
        let mut v = Voice::new_melody(
            VoiceId::issue(),
            1000,
            60,
            &f,
            MelodyWaveForm::Square,
            1.0,
            5000.0,
            0.0,
            0.707,
            0.0,
            1.0,
            1.0,
            0.7,
            -1.0,
            1.0,
            1.0,
            1.0,
            1.0,
            false,
        );
        assert!(v.is_busy());
        v.note_cut();
        assert!(!v.is_busy());
    }

    #[test]
    fn pitch_bend_shifts_resolved_frequency() {
        let f = factory();
        let mut v = Voice::new_melody(
            VoiceId::issue(),
            1000,
            69,
            &f,
            MelodyWaveForm::Square,
            1.0,
            5000.0,
            0.0,
            0.707,
            0.0,
            0.0,
            0.0,
            0.7,
            -1.0,
            0.02,
            1.0,
            1.0,
            1.0,
            false,
        );
        v.set_pitch_bend(12.0);
        assert!((v.resolved_frequency() - 880.0).abs() < 1e-2);
    }
}
