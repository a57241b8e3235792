//! Instrument parameter lookup: melody and drum parameter sets keyed by
//! `(systemType, bankMSB, bankLSB)` plus a program/note id, with a
//! four-level fallback chain.

use std::collections::HashMap;

/// MIDI sound-set convention in force on a channel. Determines default
/// pitch-bend sensitivity and which SysEx dialects are honored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemType {
    Gm1,
    Gm2,
    Gs,
    Xg,
}

impl SystemType {
    /// RPN(0,0) default: 12 semitones under GM1, 2 everywhere else.
    pub fn default_pitch_bend_sensitivity(self) -> f32 {
        match self {
            SystemType::Gm1 => 12.0,
            SystemType::Gm2 | SystemType::Gs | SystemType::Xg => 2.0,
        }
    }
}

/// Oscillator waveform selector carried by a melody instrument entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MelodyWaveForm {
    Square,
    Sine,
    Triangle,
    Sawtooth,
    Noise,
}

impl Default for MelodyWaveForm {
    fn default() -> Self {
        MelodyWaveForm::Square
    }
}

#[derive(Debug, Clone)]
pub struct MelodyParam {
    pub caption: String,
    pub volume: f32,
    pub attack: f32,
    pub hold: f32,
    pub decay: f32,
    pub sustain: f32,
    pub fade: f32,
    pub release: f32,
    pub wave_form: MelodyWaveForm,
    pub drum_like: bool,
    pub note_offset: i32,
}

impl Default for MelodyParam {
    fn default() -> Self {
        Self {
            caption: String::from("Acoustic Grand Piano"),
            volume: 1.0,
            attack: 0.0,
            hold: 0.0,
            decay: 0.05,
            sustain: 0.8,
            fade: 2.0,
            release: 0.3,
            wave_form: MelodyWaveForm::Square,
            drum_like: false,
            note_offset: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DrumParam {
    pub pitch: i32,
    pub volume: f32,
    pub attack: f32,
    pub hold: f32,
    pub decay: f32,
    pub pan: f32,
}

impl Default for DrumParam {
    fn default() -> Self {
        Self {
            pitch: 60,
            volume: 1.0,
            attack: 0.0,
            hold: 0.0,
            decay: 0.3,
            pan: 0.5,
        }
    }
}

/// `(systemType, bankMSB, bankLSB)`; `None` system type is the wildcard
/// entry used by the third and fourth fallback levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BankKey {
    system_type: Option<SystemType>,
    bank_msb: u8,
    bank_lsb: u8,
}

/// Melody and drum parameter maps, built once at startup and never mutated
/// afterward.
#[derive(Default)]
pub struct InstrumentTable {
    melody: HashMap<BankKey, HashMap<u8, MelodyParam>>,
    drum: HashMap<BankKey, HashMap<u8, DrumParam>>,
}

impl InstrumentTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_melody(
        &mut self,
        system_type: Option<SystemType>,
        bank_msb: u8,
        bank_lsb: u8,
        prog_id: u8,
        param: MelodyParam,
    ) {
        let key = BankKey {
            system_type,
            bank_msb,
            bank_lsb,
        };
        self.melody.entry(key).or_default().insert(prog_id, param);
    }

    pub fn insert_drum(
        &mut self,
        system_type: Option<SystemType>,
        bank_msb: u8,
        bank_lsb: u8,
        note_no: u8,
        param: DrumParam,
    ) {
        let key = BankKey {
            system_type,
            bank_msb,
            bank_lsb,
        };
        self.drum.entry(key).or_default().insert(note_no, param);
    }

    /// Fallback order: `(systemType,bankMSB,bankLSB)` exact, then
    /// `(systemType,0,0)`, then `(None,bankMSB,bankLSB)`, then
    /// `(None,0,0)`. Returns the first hit.
    pub fn find_melody_param(
        &self,
        system_type: SystemType,
        bank_msb: u8,
        bank_lsb: u8,
        prog_id: u8,
    ) -> Option<&MelodyParam> {
        for key in fallback_keys(system_type, bank_msb, bank_lsb) {
            if let Some(found) = self.melody.get(&key).and_then(|bank| bank.get(&prog_id)) {
                return Some(found);
            }
        }
        None
    }

    pub fn find_drum_param(
        &self,
        system_type: SystemType,
        bank_msb: u8,
        bank_lsb: u8,
        note_no: u8,
    ) -> Option<&DrumParam> {
        for key in fallback_keys(system_type, bank_msb, bank_lsb) {
            if let Some(found) = self.drum.get(&key).and_then(|bank| bank.get(&note_no)) {
                return Some(found);
            }
        }
        None
    }
}

fn fallback_keys(system_type: SystemType, bank_msb: u8, bank_lsb: u8) -> [BankKey; 4] {
    [
        BankKey {
            system_type: Some(system_type),
            bank_msb,
            bank_lsb,
        },
        BankKey {
            system_type: Some(system_type),
            bank_msb: 0,
            bank_lsb: 0,
        },
        BankKey {
            system_type: None,
            bank_msb,
            bank_lsb,
        },
        BankKey {
            system_type: None,
            bank_msb: 0,
            bank_lsb: 0,
        },
    ]
}
