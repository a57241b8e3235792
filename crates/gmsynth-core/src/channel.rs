//! Per-channel MIDI state: program/bank, CC/RPN/NRPN dispatch, the voice
//! map, and the per-sample mixdown into a stereo frame.

use std::collections::HashMap;

use rand::Rng;

use crate::instrument_table::{InstrumentTable, SystemType};
use crate::voice::{Voice, VoiceId};
use crate::wavetable::WaveTableFactory;

/// Upper bound on the CC72/73/75 time-scale curve for melody voices. The
/// source this engine is modeled on clips the curve here; the exact value
/// is a compatibility ceiling, not a physical constant, so implementers
/// may lower it.
pub const MELODY_TIME_SCALE_CEILING: f32 = 190.0;
/// Same ceiling, but for drum voices, which the reference clips much
/// tighter.
pub const DRUM_TIME_SCALE_CEILING: f32 = 4.0;

/// `10^(4·(value-64)/127)`, clamped to `ceiling`. `value=64` (center) maps
/// to exactly `1.0`.
fn time_scale_curve(value: u8, ceiling: f32) -> f32 {
    let raw = 10f32.powf(4.0 * (value as f32 - 64.0) / 127.0);
    raw.clamp(1.0 / ceiling, ceiling)
}

#[derive(Debug, Clone, Copy, Default)]
struct DrumNoteOverride {
    pan: Option<f32>,
    /// NRPN(28,noteNo)==0 requests a per-hit random pan draw, distinct
    /// from an explicit pan of 0.0.
    pan_random: bool,
    coarse_semitones: f32,
    fine_semitones: f32,
    level: Option<f32>,
}

/// RPN/NRPN address detector state: walks CC 100/101 (RPN), 98/99 (NRPN),
/// and 6/38 (data-entry MSB/LSB), completing one address+value pair at a
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamAddressMode {
    None,
    Rpn,
    Nrpn,
}

pub struct ChannelState {
    channel_no: u8,
    system_type: SystemType,
    sample_freq: u32,

    program: u8,
    bank_msb: u8,
    bank_lsb: u8,
    volume: f32,
    pan: f32,
    expression: f32,
    pedal: bool,
    drum_mode: bool,

    pitch_bend_raw: i16,
    pitch_bend_sensitivity: f32,
    master_fine_tuning: f32,
    master_coarse_tuning: f32,

    cc_release_scale: f32,
    cc_attack_scale: f32,
    cc_decay_scale: f32,
    nrpn_attack_scale: f32,
    nrpn_decay_scale: f32,

    cutoff_cc74: u8,
    resonance_cc71: u8,
    nrpn_cutoff_multiplier: f32,
    nrpn_resonance_multiplier: f32,

    address_mode: ParamAddressMode,
    rpn_address: (u8, u8),
    nrpn_address: (u8, u8),

    drum_note_overrides: HashMap<u8, DrumNoteOverride>,

    voices: HashMap<VoiceId, Voice>,
}

impl ChannelState {
    pub fn new(channel_no: u8, system_type: SystemType) -> Self {
        let mut ch = Self {
            channel_no,
            system_type,
            sample_freq: 44_100,
            program: 0,
            bank_msb: 0,
            bank_lsb: 0,
            volume: 1.0,
            pan: 0.5,
            expression: 1.0,
            pedal: false,
            drum_mode: channel_no == 10,
            pitch_bend_raw: 0,
            pitch_bend_sensitivity: system_type.default_pitch_bend_sensitivity(),
            master_fine_tuning: 0.0,
            master_coarse_tuning: 0.0,
            cc_release_scale: 1.0,
            cc_attack_scale: 1.0,
            cc_decay_scale: 1.0,
            nrpn_attack_scale: 1.0,
            nrpn_decay_scale: 1.0,
            cutoff_cc74: 64,
            resonance_cc71: 64,
            nrpn_cutoff_multiplier: 1.0,
            nrpn_resonance_multiplier: 1.0,
            address_mode: ParamAddressMode::None,
            rpn_address: (0x7F, 0x7F),
            nrpn_address: (0x7F, 0x7F),
            drum_note_overrides: HashMap::new(),
            voices: HashMap::new(),
        };
        ch.reset_controllers();
        ch
    }

    /// Resets to post-`reset(systemType)` defaults: controllers, pitch
    /// bend, and RPN/NRPN state. Does not touch `system_type` (the
    /// synthesizer rebuilds channels fresh on `reset`, so this only
    /// matters for in-place reuse).
    pub fn reset(&mut self, system_type: SystemType) {
        self.system_type = system_type;
        self.program = 0;
        self.bank_msb = 0;
        self.bank_lsb = 0;
        self.drum_mode = self.channel_no == 10;
        self.pitch_bend_raw = 0;
        self.pitch_bend_sensitivity = system_type.default_pitch_bend_sensitivity();
        self.master_fine_tuning = 0.0;
        self.master_coarse_tuning = 0.0;
        self.drum_note_overrides.clear();
        self.voices.clear();
        self.reset_controllers();
    }

    fn reset_controllers(&mut self) {
        self.volume = 1.0;
        self.pan = 0.5;
        self.expression = 1.0;
        self.pedal = false;
        self.cc_release_scale = 1.0;
        self.cc_attack_scale = 1.0;
        self.cc_decay_scale = 1.0;
        self.nrpn_attack_scale = 1.0;
        self.nrpn_decay_scale = 1.0;
        self.cutoff_cc74 = 64;
        self.resonance_cc71 = 64;
        self.nrpn_cutoff_multiplier = 1.0;
        self.nrpn_resonance_multiplier = 1.0;
        self.address_mode = ParamAddressMode::None;
        self.rpn_address = (0x7F, 0x7F);
        self.nrpn_address = (0x7F, 0x7F);
    }

    pub fn is_drum_mode(&self) -> bool {
        self.drum_mode
    }

    pub fn set_drum_mode(&mut self, drum_mode: bool) {
        self.drum_mode = drum_mode;
    }

    /// The synthesizer calls this on every channel when `setSampleRate`
    /// runs. Cached here (rather than threaded through every call) so
    /// CC-driven filter/time-scale updates, which have no other route to
    /// the sample rate, can still reconfigure voices correctly.
    pub fn set_sample_rate(&mut self, sample_freq: u32) {
        self.sample_freq = sample_freq;
    }

    fn attack_scale(&self, ceiling: f32) -> f32 {
        (self.cc_attack_scale * self.nrpn_attack_scale).clamp(1.0 / ceiling, ceiling)
    }

    fn decay_scale(&self, ceiling: f32) -> f32 {
        (self.cc_decay_scale * self.nrpn_decay_scale).clamp(1.0 / ceiling, ceiling)
    }

    fn release_scale(&self, ceiling: f32) -> f32 {
        self.cc_release_scale.clamp(1.0 / ceiling, ceiling)
    }

    /// `20000 Hz` reference, halved/doubled per 64 CC units of brightness,
    /// further scaled by the channel's NRPN(1,32) multiplier.
    fn cutoff_hz(&self, sample_freq: u32) -> f32 {
        let cc_mult = 2f32.powf((self.cutoff_cc74 as f32 - 64.0) / 64.0);
        let hz = 2000.0 * cc_mult * self.nrpn_cutoff_multiplier;
        hz.clamp(20.0, sample_freq as f32 * 0.49)
    }

    /// CC74 centered at `64` (flat, `0 dB`); below darkens the high shelf,
    /// above brightens it.
    fn cutoff_gain_db(&self) -> f32 {
        ((self.cutoff_cc74 as f32 - 64.0) / 64.0 * 12.0).clamp(-24.0, 24.0)
    }

    /// `0.707` (Butterworth) reference, scaled by CC71 brightness/resonance
    /// and the channel's NRPN(1,33) multiplier.
    fn resonance_q(&self) -> f32 {
        let cc_mult = 2f32.powf((self.resonance_cc71 as f32 - 64.0) / 64.0);
        (std::f32::consts::FRAC_1_SQRT_2 * cc_mult * self.nrpn_resonance_multiplier)
            .clamp(0.1, 20.0)
    }

    fn resolved_pitch_bend_semitones(&self) -> f32 {
        self.pitch_bend_sensitivity * (self.pitch_bend_raw as f32 / 8192.0)
            + self.master_coarse_tuning
            + self.master_fine_tuning
    }

    /// If a voice with `note_no` is already sounding on this channel, calls
    /// its `note_off` first (spec: one note number, one voice). Then, if
    /// `velocity>0`, builds and inserts a new voice.
    pub fn note_on(
        &mut self,
        sample_freq: u32,
        note_no: u8,
        velocity: u8,
        instruments: &InstrumentTable,
        wave_table_factory: &WaveTableFactory,
    ) {
        if let Some(existing) = self
            .voices
            .values_mut()
            .find(|v| v.note_no() == note_no)
        {
            existing.note_off();
        }
        if velocity == 0 {
            return;
        }

        let id = VoiceId::issue();
        let voice = if self.drum_mode {
            self.build_drum_voice(id, sample_freq, note_no, velocity, instruments, wave_table_factory)
        } else {
            self.build_melody_voice(id, sample_freq, note_no, velocity, instruments, wave_table_factory)
        };
        let mut voice = voice;
        voice.set_hold(self.pedal);
        voice.set_pitch_bend(self.resolved_pitch_bend_semitones());
        self.voices.insert(id, voice);
    }

    fn build_melody_voice(
        &self,
        id: VoiceId,
        sample_freq: u32,
        note_no: u8,
        velocity: u8,
        instruments: &InstrumentTable,
        wave_table_factory: &WaveTableFactory,
    ) -> Voice {
        let default_param;
        let param = match instruments.find_melody_param(
            self.system_type,
            self.bank_msb,
            self.bank_lsb,
            self.program,
        ) {
            Some(p) => p,
            None => {
                default_param = crate::instrument_table::MelodyParam::default();
                &default_param
            }
        };

        let sustain = param.sustain.max(0.8);
        let gain = 10f32.powf(-20.0 * (1.0 - velocity as f32 / 127.0) / 20.0) * param.volume
            / sustain;

        let resolved_note = (note_no as i32 + param.note_offset).clamp(0, 127) as u8;

        Voice::new_melody(
            id,
            sample_freq,
            resolved_note,
            wave_table_factory,
            param.wave_form,
            gain,
            self.cutoff_hz(sample_freq),
            self.cutoff_gain_db(),
            self.resonance_q(),
            param.attack,
            param.hold,
            param.decay,
            param.sustain,
            param.fade,
            param.release,
            self.attack_scale(MELODY_TIME_SCALE_CEILING),
            self.decay_scale(MELODY_TIME_SCALE_CEILING),
            self.release_scale(MELODY_TIME_SCALE_CEILING),
            param.drum_like,
        )
    }

    fn build_drum_voice(
        &self,
        id: VoiceId,
        sample_freq: u32,
        note_no: u8,
        velocity: u8,
        instruments: &InstrumentTable,
        wave_table_factory: &WaveTableFactory,
    ) -> Voice {
        let default_param;
        let param = match instruments.find_drum_param(
            self.system_type,
            self.bank_msb,
            self.bank_lsb,
            note_no,
        ) {
            Some(p) => p,
            None => {
                default_param = crate::instrument_table::DrumParam::default();
                &default_param
            }
        };

        let over = self.drum_note_overrides.get(&note_no).copied().unwrap_or_default();
        let gain = 10f32.powf(-20.0 * (1.0 - velocity as f32 / 127.0) / 20.0)
            * param.volume
            * over.level.unwrap_or(1.0);

        let pan = if over.pan_random {
            rand::thread_rng().gen_range(0.0..=1.0)
        } else {
            over.pan.unwrap_or(param.pan)
        };

        let base_frequency = crate::voice::note_to_frequency(param.pitch)
            * 2f32.powf((over.coarse_semitones + over.fine_semitones) / 12.0);

        Voice::new_drum(
            id,
            sample_freq,
            note_no,
            wave_table_factory,
            gain,
            pan,
            base_frequency,
            param.attack,
            param.hold,
            param.decay,
            self.attack_scale(DRUM_TIME_SCALE_CEILING),
            self.decay_scale(DRUM_TIME_SCALE_CEILING),
        )
    }

    /// `allow_tail_off=false` discards matching voices immediately instead
    /// of letting them release.
    pub fn note_off(&mut self, note_no: u8, allow_tail_off: bool) {
        if allow_tail_off {
            for v in self.voices.values_mut().filter(|v| v.note_no() == note_no) {
                v.note_off();
            }
        } else {
            self.voices.retain(|_, v| v.note_no() != note_no);
        }
    }

    pub fn all_notes_off(&mut self, allow_tail_off: bool) {
        if allow_tail_off {
            for v in self.voices.values_mut() {
                v.note_off();
            }
        } else {
            self.voices.clear();
        }
    }

    /// CC120: discard every voice instantly, bypassing release entirely.
    pub fn all_sound_off(&mut self) {
        self.voices.clear();
    }

    pub fn program_change(&mut self, program: u8) {
        self.program = program;
    }

    pub fn control_change(&mut self, controller: u8, value: u8) {
        match controller {
            0 => self.bank_msb = value,
            32 => self.bank_lsb = value,
            7 => self.volume = value as f32 / 127.0,
            10 => self.pan = ((value as f32 - 1.0) / 126.0).clamp(0.0, 1.0),
            11 => self.expression = value as f32 / 127.0,
            64 => {
                let new_pedal = value >= 0x40;
                self.pedal = new_pedal;
                for v in self.voices.values_mut() {
                    v.set_hold(new_pedal);
                }
            }
            72 => {
                self.cc_release_scale = time_scale_curve(value, MELODY_TIME_SCALE_CEILING);
                self.propagate_time_scale();
            }
            73 => {
                self.cc_attack_scale = time_scale_curve(value, MELODY_TIME_SCALE_CEILING);
                self.propagate_time_scale();
            }
            75 => {
                self.cc_decay_scale = time_scale_curve(value, MELODY_TIME_SCALE_CEILING);
                self.propagate_time_scale();
            }
            74 => {
                self.cutoff_cc74 = value;
                self.propagate_filter(self.sample_freq);
            }
            71 => {
                self.resonance_cc71 = value;
                self.propagate_filter(self.sample_freq);
            }
            121 => {
                self.volume = 1.0;
                self.pan = 0.5;
                self.expression = 1.0;
            }
            120 => self.all_sound_off(),
            123 => self.all_notes_off(true),
            126 | 127 => {
                self.all_notes_off(false);
            }
            98 => {
                self.address_mode = ParamAddressMode::Nrpn;
                self.nrpn_address.1 = value;
            }
            99 => {
                self.address_mode = ParamAddressMode::Nrpn;
                self.nrpn_address.0 = value;
            }
            100 => {
                self.address_mode = ParamAddressMode::Rpn;
                self.rpn_address.1 = value;
            }
            101 => {
                self.address_mode = ParamAddressMode::Rpn;
                self.rpn_address.0 = value;
            }
            6 => self.apply_data_entry_msb(value),
            38 => self.apply_data_entry_lsb(value),
            _ => {}
        }
    }

    fn apply_data_entry_msb(&mut self, value: u8) {
        match self.address_mode {
            ParamAddressMode::Rpn => self.apply_rpn((value as f32 - 64.0) / 64.0, value),
            ParamAddressMode::Nrpn => self.apply_nrpn(value),
            ParamAddressMode::None => {}
        }
    }

    fn apply_data_entry_lsb(&mut self, _value: u8) {
        // Fine (LSB) data-entry is accepted but every recognized RPN/NRPN
        // in this engine's vocabulary is resolved from the MSB alone.
    }

    fn apply_rpn(&mut self, signed_unit: f32, raw_value: u8) {
        match self.rpn_address {
            (0, 0) => self.pitch_bend_sensitivity = raw_value as f32,
            (0, 1) => self.master_fine_tuning = signed_unit,
            (0, 2) => self.master_coarse_tuning = signed_unit * 64.0,
            _ => {}
        }
    }

    fn apply_nrpn(&mut self, value: u8) {
        let (msb, lsb) = self.nrpn_address;
        match msb {
            1 => match lsb {
                32 => {
                    self.nrpn_cutoff_multiplier = 2f32.powf((value as f32 - 64.0) / 64.0);
                    self.propagate_filter(self.sample_freq);
                }
                33 => {
                    self.nrpn_resonance_multiplier = 2f32.powf((value as f32 - 64.0) / 64.0);
                    self.propagate_filter(self.sample_freq);
                }
                99 => {
                    self.nrpn_attack_scale = time_scale_curve(value, MELODY_TIME_SCALE_CEILING);
                    self.propagate_time_scale();
                }
                100 => {
                    self.nrpn_decay_scale = time_scale_curve(value, MELODY_TIME_SCALE_CEILING);
                    self.propagate_time_scale();
                }
                _ => {}
            },
            24 => {
                let note_no = lsb;
                self.drum_note_overrides.entry(note_no).or_default().coarse_semitones =
                    value as f32 - 64.0;
            }
            25 => {
                let note_no = lsb;
                self.drum_note_overrides.entry(note_no).or_default().fine_semitones =
                    (value as f32 - 64.0) / 100.0;
            }
            26 => {
                let note_no = lsb;
                self.drum_note_overrides.entry(note_no).or_default().level = Some(value as f32 / 127.0);
            }
            28 => {
                let note_no = lsb;
                let entry = self.drum_note_overrides.entry(note_no).or_default();
                if value == 0 {
                    entry.pan_random = true;
                    entry.pan = None;
                } else {
                    entry.pan_random = false;
                    entry.pan = Some(((value as f32 - 1.0) / 126.0).clamp(0.0, 1.0));
                }
            }
            127 => {
                if self.system_type == SystemType::Xg {
                    self.drum_mode = true;
                }
            }
            _ => {}
        }
    }

    /// CC74/71 or NRPN(1,32/33) changed: reconfigure every currently
    /// sounding melody voice's filter pair. `sample_freq` is passed by the
    /// caller rather than cached, since a channel outlives `setSampleRate`
    /// changes.
    fn propagate_filter(&mut self, sample_freq: u32) {
        let cutoff = self.cutoff_hz(sample_freq);
        let cutoff_gain = self.cutoff_gain_db();
        let resonance = self.resonance_q();
        for v in self.voices.values_mut() {
            v.set_filter(sample_freq, cutoff, cutoff_gain, resonance);
        }
    }

    /// CC72/73/75 or NRPN(1,99/100) changed: rescale every currently
    /// sounding voice's AHDR segment lengths from its own unscaled base
    /// times.
    fn propagate_time_scale(&mut self) {
        let melody_attack = self.attack_scale(MELODY_TIME_SCALE_CEILING);
        let melody_decay = self.decay_scale(MELODY_TIME_SCALE_CEILING);
        let melody_release = self.release_scale(MELODY_TIME_SCALE_CEILING);
        let drum_attack = self.attack_scale(DRUM_TIME_SCALE_CEILING);
        let drum_decay = self.decay_scale(DRUM_TIME_SCALE_CEILING);
        for v in self.voices.values_mut() {
            match v.kind() {
                crate::voice::VoiceKind::Melody => {
                    v.rescale_envelope(melody_attack, melody_decay, melody_release)
                }
                crate::voice::VoiceKind::Drum => v.rescale_envelope(drum_attack, drum_decay, 0.0),
            }
        }
    }

    pub fn pitch_bend(&mut self, raw_value: i16) {
        self.pitch_bend_raw = raw_value;
        let semitones = self.resolved_pitch_bend_semitones();
        for v in self.voices.values_mut() {
            v.set_pitch_bend(semitones);
        }
    }

    /// Mixes every voice's mono sample into a stereo frame (per-voice pan
    /// if set, otherwise channel pan), scales by volume x expression, and
    /// drops voices that have gone silent.
    pub fn update(&mut self, sample_freq: u32) -> (f32, f32) {
        let mut left = 0.0f32;
        let mut right = 0.0f32;
        self.voices.retain(|_, v| {
            let mono = v.update(sample_freq);
            let pan = v.pan(self.pan);
            left += mono * (1.0 - pan);
            right += mono * pan;
            v.is_busy()
        });
        let scale = self.volume * self.expression;
        (left * scale, right * scale)
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    pub fn channel_no(&self) -> u8 {
        self.channel_no
    }

    pub fn digest(&self) -> ChannelDigest {
        ChannelDigest {
            channel_no: self.channel_no,
            program: self.program,
            bank_msb: self.bank_msb,
            bank_lsb: self.bank_lsb,
            volume: self.volume,
            expression: self.expression,
            pan: self.pan,
            pitch_bend_raw: self.pitch_bend_raw,
            pedal: self.pedal,
            drum_mode: self.drum_mode,
            poly_count: self.voices.len(),
        }
    }

    /// Every currently-sounding voice on this channel, for the
    /// synthesizer-level `digest()` to summarize.
    pub fn voices(&self) -> impl Iterator<Item = &Voice> + '_ {
        self.voices.values()
    }
}

/// Read-only snapshot of a channel's controller state, for `digest()`.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct ChannelDigest {
    pub channel_no: u8,
    pub program: u8,
    pub bank_msb: u8,
    pub bank_lsb: u8,
    pub volume: f32,
    pub expression: f32,
    pub pan: f32,
    pub pitch_bend_raw: i16,
    pub pedal: bool,
    pub drum_mode: bool,
    pub poly_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument_table::MelodyParam;

    fn table_with_default_piano() -> InstrumentTable {
        let mut t = InstrumentTable::new();
        t.insert_melody(None, 0, 0, 0, MelodyParam {
            attack: 0.001,
            hold: 0.0,
            decay: 0.01,
            sustain: 0.7,
            fade: -1.0,
            release: 0.02,
            ..Default::default()
        });
        t
    }

    #[test]
    fn note_on_creates_one_voice_and_note_off_eventually_frees_it() {
        let mut ch = ChannelState::new(1, SystemType::Gm1);
        let table = table_with_default_piano();
        let factory = WaveTableFactory::new();
        ch.note_on(1000, 60, 100, &table, &factory);
        assert_eq!(ch.voice_count(), 1);

        for _ in 0..20 {
            ch.update(1000);
        }
        ch.note_off(60, true);
        for _ in 0..200 {
            ch.update(1000);
        }
        assert_eq!(ch.voice_count(), 0);
    }

    #[test]
    fn retriggering_same_note_releases_the_old_voice_first() {
        let mut ch = ChannelState::new(1, SystemType::Gm1);
        let table = table_with_default_piano();
        let factory = WaveTableFactory::new();
        ch.note_on(1000, 60, 100, &table, &factory);
        ch.note_on(1000, 60, 100, &table, &factory);
        assert_eq!(ch.voice_count(), 2);
    }

    #[test]
    fn all_sound_off_clears_instantly() {
        let mut ch = ChannelState::new(1, SystemType::Gm1);
        let table = table_with_default_piano();
        let factory = WaveTableFactory::new();
        ch.note_on(1000, 60, 100, &table, &factory);
        ch.control_change(120, 127);
        assert_eq!(ch.voice_count(), 0);
    }

    #[test]
    fn channel_10_defaults_to_drum_mode() {
        let ch = ChannelState::new(10, SystemType::Gm1);
        assert!(ch.is_drum_mode());
        let ch2 = ChannelState::new(1, SystemType::Gm1);
        assert!(!ch2.is_drum_mode());
    }

    #[test]
    fn pedal_defers_release_until_lifted() {
        let mut ch = ChannelState::new(1, SystemType::Gm1);
        let table = table_with_default_piano();
        let factory = WaveTableFactory::new();
        ch.control_change(64, 127);
        ch.note_on(1000, 60, 100, &table, &factory);
        ch.note_off(60, true);
        for _ in 0..200 {
            ch.update(1000);
        }
        assert_eq!(ch.voice_count(), 1);
        ch.control_change(64, 0);
        for _ in 0..200 {
            ch.update(1000);
        }
        assert_eq!(ch.voice_count(), 0);
    }

    #[test]
    fn pitch_bend_sensitivity_default_is_twelve_for_gm1() {
        let ch = ChannelState::new(1, SystemType::Gm1);
        assert_eq!(ch.pitch_bend_sensitivity, 12.0);
    }

    #[test]
    fn time_scale_curve_is_identity_at_center() {
        assert!((time_scale_curve(64, MELODY_TIME_SCALE_CEILING) - 1.0).abs() < 1e-4);
    }
}
