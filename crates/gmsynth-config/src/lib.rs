//! TOML instrument-parameter loader for the gmsynth synthesis engine.
//!
//! Populates a [`gmsynth_core::instrument_table::InstrumentTable`] from a
//! document shaped like §6's configuration surface:
//!
//! ```toml
//! [melody.0]                  # progId 0, implicit bank 0/0
//! caption = "Acoustic Grand Piano"
//! attack = 0.0
//! decay = 0.05
//! sustain = 0.8
//! release = 0.3
//!
//! [melody.0.1.2]               # progId 0, bank MSB=1 LSB=2
//! wave_form = "sine"
//! ...
//!
//! [drum.36]
//! pitch = 36
//! decay = 0.15
//! ```
//!
//! This is the only realistic way to populate an `InstrumentTable` outside
//! the engine crate itself; `gmsynth-core` specifies the table's interface
//! but deliberately has no file-format opinion of its own.

pub mod error;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use gmsynth_core::instrument_table::{
    DrumParam, InstrumentTable, MelodyParam, MelodyWaveForm, SystemType,
};

pub use error::ConfigError;

#[derive(Debug, Deserialize, Default)]
struct RawInstrumentDocument {
    #[serde(default)]
    melody: HashMap<String, RawMelodyGroup>,
    #[serde(default)]
    drum: HashMap<String, RawDrumGroup>,
}

/// A `[melody.<progId>]` table is either a bank-0/0 entry directly, or a
/// `bankMSB -> bankLSB -> entry` nest; which shape is present is only
/// known once the TOML is parsed, so this is untagged.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawMelodyGroup {
    Entry(RawMelodyEntry),
    Banks(HashMap<String, HashMap<String, RawMelodyEntry>>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDrumGroup {
    Entry(RawDrumEntry),
    Banks(HashMap<String, HashMap<String, RawDrumEntry>>),
}

// `deny_unknown_fields` matters here beyond validation: it is what lets
// the untagged `RawMelodyGroup`/`RawDrumGroup` enums tell a direct entry
// apart from a banked nest. Every field on these structs is optional, so
// without it an arbitrary table of nested `bankMSB` sub-tables would
// still deserialize successfully as an (all-`None`) `Entry`, and the
// `Banks` variant would never be reached.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawMelodyEntry {
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    volume: Option<f32>,
    #[serde(default)]
    attack: Option<f32>,
    #[serde(default)]
    hold: Option<f32>,
    #[serde(default)]
    decay: Option<f32>,
    #[serde(default)]
    sustain: Option<f32>,
    #[serde(default)]
    fade: Option<f32>,
    #[serde(default)]
    release: Option<f32>,
    #[serde(default)]
    wave_form: Option<String>,
    #[serde(default)]
    drum_like: Option<bool>,
    #[serde(default)]
    note_offset: Option<i32>,
    #[serde(default)]
    system_type: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawDrumEntry {
    #[serde(default)]
    pitch: Option<i32>,
    #[serde(default)]
    volume: Option<f32>,
    #[serde(default)]
    attack: Option<f32>,
    #[serde(default)]
    hold: Option<f32>,
    #[serde(default)]
    decay: Option<f32>,
    #[serde(default)]
    pan: Option<f32>,
    #[serde(default)]
    system_type: Option<String>,
}

fn parse_system_type(raw: &Option<String>, section: &str) -> Result<Option<SystemType>, ConfigError> {
    match raw.as_deref() {
        None => Ok(None),
        Some("GM1") => Ok(Some(SystemType::Gm1)),
        Some("GM2") => Ok(Some(SystemType::Gm2)),
        Some("GS") => Ok(Some(SystemType::Gs)),
        Some("XG") => Ok(Some(SystemType::Xg)),
        Some(other) => Err(ConfigError::InvalidEntry {
            section: section.to_string(),
            reason: format!("unrecognized system_type \"{other}\" (expected GM1, GM2, GS, or XG)"),
        }),
    }
}

fn parse_wave_form(raw: &Option<String>, section: &str) -> Result<MelodyWaveForm, ConfigError> {
    match raw.as_deref() {
        None => Ok(MelodyWaveForm::default()),
        Some("square") => Ok(MelodyWaveForm::Square),
        Some("sine") => Ok(MelodyWaveForm::Sine),
        Some("triangle") => Ok(MelodyWaveForm::Triangle),
        Some("sawtooth") => Ok(MelodyWaveForm::Sawtooth),
        Some("noise") => Ok(MelodyWaveForm::Noise),
        Some(other) => Err(ConfigError::InvalidEntry {
            section: section.to_string(),
            reason: format!(
                "unrecognized wave_form \"{other}\" (expected square, sine, triangle, sawtooth, or noise)"
            ),
        }),
    }
}

fn parse_key_as_u8(raw: &str, section: &str) -> Result<u8, ConfigError> {
    raw.parse::<u8>().map_err(|_| ConfigError::InvalidEntry {
        section: section.to_string(),
        reason: format!("key \"{raw}\" is not a valid 0-127 id"),
    })
}

fn to_melody_param(entry: &RawMelodyEntry, section: &str) -> Result<MelodyParam, ConfigError> {
    let default = MelodyParam::default();
    Ok(MelodyParam {
        caption: entry.caption.clone().unwrap_or(default.caption),
        volume: entry.volume.unwrap_or(default.volume),
        attack: entry.attack.unwrap_or(default.attack),
        hold: entry.hold.unwrap_or(default.hold),
        decay: entry.decay.unwrap_or(default.decay),
        sustain: entry.sustain.unwrap_or(default.sustain),
        fade: entry.fade.unwrap_or(default.fade),
        release: entry.release.unwrap_or(default.release),
        wave_form: parse_wave_form(&entry.wave_form, section)?,
        drum_like: entry.drum_like.unwrap_or(default.drum_like),
        note_offset: entry.note_offset.unwrap_or(default.note_offset),
    })
}

fn to_drum_param(entry: &RawDrumEntry) -> DrumParam {
    let default = DrumParam::default();
    DrumParam {
        pitch: entry.pitch.unwrap_or(default.pitch),
        volume: entry.volume.unwrap_or(default.volume),
        attack: entry.attack.unwrap_or(default.attack),
        hold: entry.hold.unwrap_or(default.hold),
        decay: entry.decay.unwrap_or(default.decay),
        pan: entry.pan.unwrap_or(default.pan),
    }
}

/// Reads and parses `path`, then builds an [`InstrumentTable`] from its
/// `[melody.*]`/`[drum.*]` tables.
///
/// Every entry in the file is validated before this function returns: a
/// single bad `wave_form`, `system_type`, or non-numeric bank/program key
/// does not stop the rest of the file from being checked, so one call
/// surfaces every problem in the file, not just the first. Valid entries
/// accumulated before an error was found are still discarded on error,
/// since a partially-populated instrument table would be a worse failure
/// mode than a single clear error up front.
pub fn load_instrument_table(path: &Path) -> Result<InstrumentTable, ConfigError> {
    let contents = fs::read_to_string(path)?;
    load_instrument_table_str(&contents)
}

/// Same as [`load_instrument_table`] but takes the document contents
/// directly, for callers that already have the TOML in memory (and for
/// this crate's own fixture-backed tests).
pub fn load_instrument_table_str(contents: &str) -> Result<InstrumentTable, ConfigError> {
    let doc: RawInstrumentDocument = toml::from_str(contents)?;
    let mut table = InstrumentTable::new();
    let mut problems = Vec::new();

    for (prog_key, group) in &doc.melody {
        let section = format!("melody.{prog_key}");
        let prog_id = match parse_key_as_u8(prog_key, &section) {
            Ok(v) => v,
            Err(e) => {
                problems.push(e);
                continue;
            }
        };
        match group {
            RawMelodyGroup::Entry(entry) => {
                match resolve_melody_entry(entry, &section) {
                    Ok((system_type, param)) => table.insert_melody(system_type, 0, 0, prog_id, param),
                    Err(e) => problems.push(e),
                }
            }
            RawMelodyGroup::Banks(banks) => {
                for (msb_key, lsb_map) in banks {
                    let msb_section = format!("{section}.{msb_key}");
                    let bank_msb = match parse_key_as_u8(msb_key, &msb_section) {
                        Ok(v) => v,
                        Err(e) => {
                            problems.push(e);
                            continue;
                        }
                    };
                    for (lsb_key, entry) in lsb_map {
                        let lsb_section = format!("{msb_section}.{lsb_key}");
                        let bank_lsb = match parse_key_as_u8(lsb_key, &lsb_section) {
                            Ok(v) => v,
                            Err(e) => {
                                problems.push(e);
                                continue;
                            }
                        };
                        match resolve_melody_entry(entry, &lsb_section) {
                            Ok((system_type, param)) => {
                                table.insert_melody(system_type, bank_msb, bank_lsb, prog_id, param)
                            }
                            Err(e) => problems.push(e),
                        }
                    }
                }
            }
        }
    }

    for (note_key, group) in &doc.drum {
        let section = format!("drum.{note_key}");
        let note_no = match parse_key_as_u8(note_key, &section) {
            Ok(v) => v,
            Err(e) => {
                problems.push(e);
                continue;
            }
        };
        match group {
            RawDrumGroup::Entry(entry) => {
                let system_type = match parse_system_type(&entry.system_type, &section) {
                    Ok(v) => v,
                    Err(e) => {
                        problems.push(e);
                        continue;
                    }
                };
                table.insert_drum(system_type, 0, 0, note_no, to_drum_param(entry));
            }
            RawDrumGroup::Banks(banks) => {
                for (msb_key, lsb_map) in banks {
                    let msb_section = format!("{section}.{msb_key}");
                    let bank_msb = match parse_key_as_u8(msb_key, &msb_section) {
                        Ok(v) => v,
                        Err(e) => {
                            problems.push(e);
                            continue;
                        }
                    };
                    for (lsb_key, entry) in lsb_map {
                        let lsb_section = format!("{msb_section}.{lsb_key}");
                        let bank_lsb = match parse_key_as_u8(lsb_key, &lsb_section) {
                            Ok(v) => v,
                            Err(e) => {
                                problems.push(e);
                                continue;
                            }
                        };
                        let system_type = match parse_system_type(&entry.system_type, &lsb_section) {
                            Ok(v) => v,
                            Err(e) => {
                                problems.push(e);
                                continue;
                            }
                        };
                        table.insert_drum(system_type, bank_msb, bank_lsb, note_no, to_drum_param(entry));
                    }
                }
            }
        }
    }

    if let Some(first) = problems.into_iter().next() {
        log::error!("instrument table failed validation: {first}");
        return Err(first);
    }

    log::info!(
        "loaded instrument table ({} melody program(s), {} drum note(s))",
        doc.melody.len(),
        doc.drum.len()
    );
    Ok(table)
}

fn resolve_melody_entry(
    entry: &RawMelodyEntry,
    section: &str,
) -> Result<(Option<SystemType>, MelodyParam), ConfigError> {
    let system_type = parse_system_type(&entry.system_type, section)?;
    let param = to_melody_param(entry, section)?;
    Ok((system_type, param))
}
