//! End-to-end fixture tests for `load_instrument_table` (§14: "a handful
//! of literal TOML fixtures: happy path, missing `system_type`,
//! unrecognized `wave_form`").

use std::path::Path;

use gmsynth_config::{load_instrument_table, ConfigError};
use gmsynth_core::instrument_table::{MelodyWaveForm, SystemType};

fn fixture(name: &str) -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

#[test]
fn happy_path_loads_direct_and_banked_entries() {
    let table = load_instrument_table(&fixture("happy_path.toml")).unwrap();

    let piano = table
        .find_melody_param(SystemType::Gm1, 0, 0, 0)
        .expect("melody.0 should resolve at bank 0/0 under any system");
    assert_eq!(piano.caption, "Acoustic Grand Piano");
    assert_eq!(piano.wave_form, MelodyWaveForm::Square);
    assert!((piano.sustain - 0.8).abs() < 1e-6);

    let rhodes = table.find_melody_param(SystemType::Gs, 0, 0, 4).unwrap();
    assert_eq!(rhodes.wave_form, MelodyWaveForm::Sine);

    // Banked entry: only resolves under XG at bank 1/0, not under GM1 at
    // the same bank, and not under XG at a different bank (it carries no
    // wildcard entry).
    let xg_lead = table
        .find_melody_param(SystemType::Xg, 1, 0, 80)
        .expect("melody.80.1.0 should resolve under XG bank 1/0");
    assert_eq!(xg_lead.wave_form, MelodyWaveForm::Sawtooth);
    assert!(table.find_melody_param(SystemType::Gm1, 1, 0, 80).is_none());

    let kick = table.find_drum_param(SystemType::Gm1, 0, 0, 36).unwrap();
    assert_eq!(kick.pitch, 36);
    let snare = table.find_drum_param(SystemType::Gm1, 0, 0, 38).unwrap();
    assert!((snare.pan - 0.45).abs() < 1e-6);
}

#[test]
fn missing_system_type_falls_back_to_the_wildcard_tier() {
    let table = load_instrument_table(&fixture("missing_system_type.toml")).unwrap();
    for system_type in [SystemType::Gm1, SystemType::Gm2, SystemType::Gs, SystemType::Xg] {
        assert!(table.find_melody_param(system_type, 0, 0, 10).is_some());
        assert!(table.find_drum_param(system_type, 0, 0, 42).is_some());
    }
}

#[test]
fn unrecognized_wave_form_is_reported_as_invalid_entry() {
    let err = load_instrument_table(&fixture("unrecognized_wave_form.toml")).unwrap_err();
    match err {
        ConfigError::InvalidEntry { section, reason } => {
            assert!(section.contains("melody.5"));
            assert!(reason.contains("supersaw"));
        }
        other => panic!("expected InvalidEntry, got {other:?}"),
    }
}

#[test]
fn missing_file_surfaces_as_io_error() {
    let err = load_instrument_table(&fixture("does_not_exist.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}
