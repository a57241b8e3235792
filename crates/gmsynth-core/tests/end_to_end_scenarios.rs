//! The six literal end-to-end scenarios from §8 of the specification,
//! each driven only through `Synthesizer`'s public API.

use std::sync::Arc;

use gmsynth_core::envelope::EnvelopeState;
use gmsynth_core::instrument_table::{DrumParam, InstrumentTable, MelodyParam, SystemType};
use gmsynth_core::midi::MidiMessage;
use gmsynth_core::signal::Signal;
use gmsynth_core::Synthesizer;

const SAMPLE_RATE: u32 = 44_100;

fn piano_table() -> InstrumentTable {
    let mut table = InstrumentTable::new();
    table.insert_melody(
        None,
        0,
        0,
        0,
        MelodyParam {
            attack: 0.02,
            hold: 0.0,
            decay: 0.05,
            sustain: 0.8,
            fade: -1.0,
            release: 0.3,
            ..Default::default()
        },
    );
    table
}

fn drum_table() -> InstrumentTable {
    let mut table = InstrumentTable::new();
    table.insert_drum(
        None,
        0,
        0,
        36,
        DrumParam {
            pitch: 36,
            volume: 1.0,
            attack: 0.0,
            hold: 0.0,
            decay: 0.15,
            pan: 0.5,
        },
    );
    table
}

fn render_frames(synth: &mut Synthesizer, n: usize) {
    let mut sig = Signal::<f32>::new(2, n);
    let mut view = sig.view_mut();
    synth.render_next_block(&mut view, &[], 0, n as i64).unwrap();
}

fn voice_envelope_state(synth: &Synthesizer, channel_no: u8) -> Option<EnvelopeState> {
    synth
        .digest()
        .voices
        .iter()
        .find(|v| v.channel_no == channel_no)
        .map(|v| v.envelope_state)
}

/// Scenario 1: GM1 reset, acoustic piano note on channel 1, released after
/// half a second, must reach Free strictly before frame 44100.
#[test]
fn scenario_1_gm1_piano_note_reaches_free_before_one_second() {
    let (mut synth, _tx) =
        Synthesizer::with_instrument_table(SystemType::Gm1, Arc::new(piano_table()));
    synth.set_sample_rate(SAMPLE_RATE);

    synth
        .handle_midi_event(&MidiMessage::SysEx(vec![0x7E, 0x7F, 0x09, 0x01]))
        .unwrap();
    synth
        .handle_midi_event(&MidiMessage::ProgramChange {
            channel: 1,
            program: 0,
        })
        .unwrap();
    synth
        .handle_midi_event(&MidiMessage::NoteOn {
            channel: 1,
            note: 60,
            velocity: 100,
        })
        .unwrap();

    render_frames(&mut synth, 22_050);
    assert!(
        !matches!(voice_envelope_state(&synth, 1), None | Some(EnvelopeState::Free)),
        "voice should still be sounding (Decay or Fade) at frame 22050"
    );

    synth
        .handle_midi_event(&MidiMessage::NoteOff {
            channel: 1,
            note: 60,
            velocity: 0,
        })
        .unwrap();

    render_frames(&mut synth, 44_100 - 22_050);
    assert_eq!(
        voice_envelope_state(&synth, 1),
        None,
        "voice must have reached Free (and been dropped) before frame 44100"
    );
}

/// Scenario 2: a GS-reset drum hit frees itself with no NoteOff.
#[test]
fn scenario_2_drum_hit_frees_itself_without_note_off() {
    let (mut synth, _tx) =
        Synthesizer::with_instrument_table(SystemType::Gs, Arc::new(drum_table()));
    synth.set_sample_rate(SAMPLE_RATE);

    let gs_reset = vec![0x41, 0x10, 0x42, 0x12, 0x40, 0x00, 0x7F, 0x00, 0x41];
    synth.handle_midi_event(&MidiMessage::SysEx(gs_reset)).unwrap();
    synth
        .handle_midi_event(&MidiMessage::NoteOn {
            channel: 10,
            note: 36,
            velocity: 127,
        })
        .unwrap();

    render_frames(&mut synth, SAMPLE_RATE as usize);

    let digest = synth.digest();
    assert!(
        digest.voices.iter().all(|v| v.channel_no != 10),
        "drum voice must have freed itself within one render block"
    );
    let ch10 = digest.channels.iter().find(|c| c.channel_no == 10).unwrap();
    assert_eq!(ch10.poly_count, 0);
}

/// Scenario 3: pitch-bend at GM1's default sensitivity of 12 semitones.
#[test]
fn scenario_3_pitch_bend_at_sensitivity_twelve() {
    let (mut synth, _tx) =
        Synthesizer::with_instrument_table(SystemType::Gm1, Arc::new(piano_table()));
    synth.set_sample_rate(SAMPLE_RATE);
    synth.reset(SystemType::Gm1);

    synth
        .handle_midi_event(&MidiMessage::NoteOn {
            channel: 1,
            note: 69,
            velocity: 100,
        })
        .unwrap();
    synth
        .handle_midi_event(&MidiMessage::PitchBend {
            channel: 1,
            value: 8192 + 8192,
        })
        .unwrap();
    render_frames(&mut synth, 1);

    let freq = synth
        .digest()
        .voices
        .iter()
        .find(|v| v.channel_no == 1)
        .map(|v| v.resolved_frequency)
        .expect("voice still sounding");
    assert!((freq - 880.0).abs() < 1e-3);
}

/// Scenario 4: the sustain pedal defers release until it lifts.
#[test]
fn scenario_4_pedal_holds_note_past_note_off() {
    let (mut synth, _tx) =
        Synthesizer::with_instrument_table(SystemType::Gm1, Arc::new(piano_table()));
    synth.set_sample_rate(SAMPLE_RATE);

    synth
        .handle_midi_event(&MidiMessage::NoteOn {
            channel: 1,
            note: 60,
            velocity: 100,
        })
        .unwrap();
    synth
        .handle_midi_event(&MidiMessage::ControlChange {
            channel: 1,
            controller: 64,
            value: 127,
        })
        .unwrap();
    synth
        .handle_midi_event(&MidiMessage::NoteOff {
            channel: 1,
            note: 60,
            velocity: 0,
        })
        .unwrap();

    render_frames(&mut synth, 10_000);
    assert_ne!(voice_envelope_state(&synth, 1), Some(EnvelopeState::Release));

    synth
        .handle_midi_event(&MidiMessage::ControlChange {
            channel: 1,
            controller: 64,
            value: 0,
        })
        .unwrap();
    render_frames(&mut synth, 10_000);
    assert_eq!(voice_envelope_state(&synth, 1), Some(EnvelopeState::Release));
}

/// Scenario 5: All Sound Off discards a channel's voices instantly,
/// leaving other channels untouched.
#[test]
fn scenario_5_all_sound_off_is_instant_and_scoped_to_one_channel() {
    let table = Arc::new(piano_table());
    let (mut synth, _tx) = Synthesizer::with_instrument_table(SystemType::Gm1, table);
    synth.set_sample_rate(SAMPLE_RATE);

    for ch in [1u8, 2, 3] {
        synth
            .handle_midi_event(&MidiMessage::NoteOn {
                channel: ch,
                note: 60,
                velocity: 100,
            })
            .unwrap();
    }
    render_frames(&mut synth, 1_000);
    synth
        .handle_midi_event(&MidiMessage::ControlChange {
            channel: 1,
            controller: 120,
            value: 127,
        })
        .unwrap();
    render_frames(&mut synth, 1);

    let digest = synth.digest();
    let poly = |ch: u8| {
        digest
            .channels
            .iter()
            .find(|c| c.channel_no == ch)
            .unwrap()
            .poly_count
    };
    assert_eq!(poly(1), 0);
    assert_eq!(poly(2), 1);
    assert_eq!(poly(3), 1);
}

/// Scenario 6: master volume SysEx scales output RMS by exactly vv/127.
#[test]
fn scenario_6_master_volume_sysex_scales_rms_exactly() {
    let rms_with = |vv: u8| {
        let (mut synth, _tx) =
            Synthesizer::with_instrument_table(SystemType::Gm1, Arc::new(piano_table()));
        synth.set_sample_rate(SAMPLE_RATE);
        synth
            .handle_midi_event(&MidiMessage::SysEx(vec![0x7F, 0x7F, 0x04, 0x01, 0x00, vv]))
            .unwrap();
        synth
            .handle_midi_event(&MidiMessage::NoteOn {
                channel: 1,
                note: 60,
                velocity: 100,
            })
            .unwrap();

        let mut sig = Signal::<f32>::new(2, 4_410);
        {
            let mut view = sig.view_mut();
            synth.render_next_block(&mut view, &[], 0, 4_410).unwrap();
        }
        let sum_sq: f64 = sig
            .channel(0)
            .iter()
            .map(|&x| (x as f64) * (x as f64))
            .sum();
        (sum_sq / sig.channel(0).len() as f64).sqrt()
    };

    let rms_127 = rms_with(127);
    let rms_100 = rms_with(100);
    assert!(rms_127 > 0.0);
    let ratio = rms_100 / rms_127;
    assert!(
        (ratio - 100.0 / 127.0).abs() < 1e-6,
        "expected ratio {}, got {ratio}",
        100.0 / 127.0
    );
}
