//! # gmsynth
//!
//! A polyphonic GM/GS/XG-compatible MIDI software synthesizer.
//!
//! This crate is a thin facade: the synthesis engine lives in
//! [`gmsynth_core`] (re-exported here as [`core`]), and the optional TOML
//! instrument-table loader lives in `gmsynth-config` (re-exported as
//! [`config`] when the `config` feature is enabled, which it is by
//! default).
//!
//! ```rust,ignore
//! use gmsynth::core::instrument_table::SystemType;
//! use gmsynth::core::Synthesizer;
//!
//! let (mut synth, midi_sender) = Synthesizer::new(SystemType::Gm1);
//! synth.set_sample_rate(44_100);
//! ```

pub use gmsynth_core as core;

/// The TOML instrument-table loader. Disable the default `config` feature
/// to drop the `toml`/`serde` parsing stack from a build that populates
/// its [`core::instrument_table::InstrumentTable`] some other way.
#[cfg(feature = "config")]
pub use gmsynth_config as config;
