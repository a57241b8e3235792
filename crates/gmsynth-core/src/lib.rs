//! `gmsynth-core`: the synthesis engine. A polyphonic GM/GS/XG-compatible
//! synthesizer that turns MIDI events into stereo PCM, organized bottom-up
//! exactly as the specification's component table lists them:
//!
//! - [`sample`] / [`signal`]: sample-format primitives and planar buffers (A)
//! - [`biquad`]: the stateful IIR filter (B)
//! - [`envelope`]: AHDSFR/AHD envelope generator (C)
//! - [`wavetable`]: the phase-accumulating oscillator and its factory (D)
//! - [`function_generator`]: waveform seeds used to build wavetables (E)
//! - [`instrument_table`]: melody/drum parameter lookup with fallback (F)
//! - [`voice`]: one sounding note (G)
//! - [`channel`]: per-channel MIDI/controller state and voice ownership (H)
//! - this module: [`Synthesizer`], the top-level owner of 16 channels,
//!   master filters, and block rendering (I)
//!
//! [`midi`] and [`sysex`] are the wire-level types and SysEx vocabulary
//! §6 specifies; [`midi_queue`] is the SPSC delivery path §5 describes for
//! event-producing threads; [`error`] is the concrete error taxonomy of §7.

pub mod biquad;
pub mod channel;
pub mod envelope;
pub mod error;
pub mod function_generator;
pub mod instrument_table;
pub mod midi;
pub mod midi_queue;
pub mod sample;
pub mod signal;
pub mod sysex;
pub mod voice;
pub mod wavetable;

use std::sync::Arc;

use arc_swap::ArcSwap;

use channel::{ChannelDigest, ChannelState};
use error::EngineError;
use instrument_table::{InstrumentTable, SystemType};
use midi::{MidiMessage, TimedMidiMessage};
use midi_queue::{MidiReceiver, MidiSender};
use signal::SignalView;
use wavetable::WaveTableFactory;

/// `sampleRate/3`, Q=1 lowpass on each output channel, to suppress
/// aliasing from the wavetable/filter chain before the final mixdown.
const MASTER_LPF_Q: f32 = 1.0;
/// Constant attenuation applied after master volume, carried from the
/// reference implementation's overall gain-staging headroom.
pub const MASTER_ATTENUATOR: f32 = 0.075;
const NUM_CHANNELS: usize = 16;
const DEFAULT_SAMPLE_FREQ: u32 = 44_100;

/// Per-voice snapshot for [`SynthesizerDigest`]: enough to draw a
/// polyphony/envelope view without touching audio-thread-owned state
/// directly.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct VoiceDigest {
    pub channel_no: u8,
    pub resolved_frequency: f32,
    pub envelope_level: f32,
    pub envelope_state: envelope::EnvelopeState,
}

/// Read-only snapshot of the whole engine, published once per rendered
/// block for observer threads (§5). Cheap to clone: everything is `Copy`
/// or a small owned `Vec`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SynthesizerDigest {
    pub system_type_name: &'static str,
    pub master_volume: f32,
    pub channels: Vec<ChannelDigest>,
    pub voices: Vec<VoiceDigest>,
}

impl SynthesizerDigest {
    fn empty() -> Self {
        Self {
            system_type_name: "GM1",
            master_volume: 1.0,
            channels: Vec::new(),
            voices: Vec::new(),
        }
    }
}

fn system_type_name(system_type: SystemType) -> &'static str {
    match system_type {
        SystemType::Gm1 => "GM1",
        SystemType::Gm2 => "GM2",
        SystemType::Gs => "GS",
        SystemType::Xg => "XG",
    }
}

/// The top-level synthesizer: 16 channels, a shared instrument table and
/// wavetable factory, two master lowpass filters, and the digest snapshot
/// observers read. Owns everything audio-thread state per §5, nothing
/// here is behind a lock; cross-thread MIDI delivery goes through
/// [`midi_queue`] instead.
pub struct Synthesizer {
    system_type: SystemType,
    sample_freq: u32,
    channels: Vec<ChannelState>,
    instrument_table: Arc<InstrumentTable>,
    wave_table_factory: Arc<WaveTableFactory>,
    master_lpf_l: biquad::Biquad,
    master_lpf_r: biquad::Biquad,
    master_volume: f32,
    midi_receiver: MidiReceiver,
    /// Kept so a caller can hand out additional producer clones is not
    /// possible with `rtrb` (single-producer by construction); the sender
    /// this engine was built with is returned once from [`Synthesizer::new`]
    /// and not stored here.
    digest: Arc<ArcSwap<SynthesizerDigest>>,
    /// Rate-limits the `NumericInvalid` log line to at most once per block
    /// (§7), reset at the top of `render_next_block`.
    logged_numeric_invalid_this_block: bool,
}

impl Synthesizer {
    /// Builds a synthesizer with an empty instrument table (every lookup
    /// falls back to the built-in defaults baked into
    /// [`instrument_table::MelodyParam::default`] /
    /// [`instrument_table::DrumParam::default`]) and returns the sender
    /// half of its MIDI delivery queue alongside it.
    pub fn new(system_type: SystemType) -> (Self, MidiSender) {
        Self::with_instrument_table(system_type, Arc::new(InstrumentTable::new()))
    }

    /// Builds a synthesizer with a caller-supplied instrument table (as
    /// produced by `gmsynth-config::load_instrument_table`).
    pub fn with_instrument_table(
        system_type: SystemType,
        instrument_table: Arc<InstrumentTable>,
    ) -> (Self, MidiSender) {
        let (sender, receiver) = midi_queue::channel();
        let channels = (1..=NUM_CHANNELS as u8)
            .map(|ch| ChannelState::new(ch, system_type))
            .collect();
        let mut synth = Self {
            system_type,
            sample_freq: DEFAULT_SAMPLE_FREQ,
            channels,
            instrument_table,
            wave_table_factory: Arc::new(WaveTableFactory::new()),
            master_lpf_l: biquad::Biquad::new(),
            master_lpf_r: biquad::Biquad::new(),
            master_volume: 1.0,
            midi_receiver: receiver,
            digest: Arc::new(ArcSwap::from_pointee(SynthesizerDigest::empty())),
            logged_numeric_invalid_this_block: false,
        };
        synth.configure_master_filters();
        log::debug!("synthesizer created: system_type={:?}", system_type);
        (synth, sender)
    }

    fn configure_master_filters(&mut self) {
        let cutoff = self.sample_freq as f32 / 3.0;
        self.master_lpf_l
            .set_lowpass(self.sample_freq, cutoff, MASTER_LPF_Q);
        self.master_lpf_r
            .set_lowpass(self.sample_freq, cutoff, MASTER_LPF_Q);
    }

    /// Reconfigures the master anti-aliasing filters for a new sample
    /// rate. Must be called before the first `render_next_block`; the
    /// reference implementation calls this once during host setup.
    pub fn set_sample_rate(&mut self, sample_freq: u32) {
        self.sample_freq = sample_freq;
        for ch in &mut self.channels {
            ch.set_sample_rate(sample_freq);
        }
        self.configure_master_filters();
        log::debug!("sample rate set to {sample_freq}");
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_freq
    }

    /// Resets every channel to its post-reset defaults, restores the
    /// default pitch-bend sensitivity for `system_type`, and clears the
    /// master volume back to unity. Does not touch the sample rate or the
    /// shared instrument table / wavetable factory.
    pub fn reset(&mut self, system_type: SystemType) {
        self.system_type = system_type;
        for ch in &mut self.channels {
            ch.reset(system_type);
        }
        self.master_volume = 1.0;
        log::debug!("reset to system_type={:?}", system_type);
    }

    /// Dispatches one MIDI message directly (synchronous call path, as
    /// opposed to the queued path in [`midi_queue`]). Returns
    /// `Err(EngineError::InvalidChannel)` for a channel-voice message
    /// whose channel is outside `1..=16`; every other condition in §7's
    /// error table is handled internally and never surfaces here.
    pub fn handle_midi_event(&mut self, message: &MidiMessage) -> Result<(), EngineError> {
        if let MidiMessage::SysEx(bytes) = message {
            self.handle_sysex(bytes);
            return Ok(());
        }

        let channel = message.channel().expect("non-SysEx messages carry a channel");
        if !(1..=NUM_CHANNELS as u8).contains(&channel) {
            return Err(EngineError::InvalidChannel(channel));
        }
        let ch = &mut self.channels[(channel - 1) as usize];

        match *message {
            MidiMessage::NoteOn { note, velocity, .. } => {
                ch.note_on(
                    self.sample_freq,
                    note,
                    velocity,
                    &self.instrument_table,
                    &self.wave_table_factory,
                );
            }
            MidiMessage::NoteOff { note, .. } => ch.note_off(note, true),
            MidiMessage::ControlChange { controller, value, .. } => {
                ch.control_change(controller, value)
            }
            MidiMessage::ProgramChange { program, .. } => ch.program_change(program),
            MidiMessage::PitchBend { value, .. } => {
                ch.pitch_bend((value as i32 - 8192) as i16);
            }
            MidiMessage::ChannelPressure { .. } | MidiMessage::PolyphonicKeyPressure { .. } => {
                // No instrument parameter in this engine's vocabulary
                // reacts to aftertouch; recognized-but-no-op, per §7's
                // `Unsupported` row.
            }
            MidiMessage::SysEx(_) => unreachable!("handled above"),
        }
        Ok(())
    }

    fn handle_sysex(&mut self, bytes: &[u8]) {
        match sysex::parse(bytes) {
            sysex::SysExAction::Reset(system_type) => self.reset(system_type),
            sysex::SysExAction::MasterVolume(v) => self.master_volume = v,
            sysex::SysExAction::DrumPartAssign {
                channel_index,
                is_drum,
            } => {
                if let Some(ch) = self.channels.get_mut(channel_index as usize) {
                    ch.set_drum_mode(is_drum);
                }
            }
            sysex::SysExAction::Ignore => {
                #[cfg(debug_assertions)]
                log::warn!("ignored unrecognized SysEx ({} bytes)", bytes.len());
            }
        }
    }

    /// Renders `num_samples` stereo frames starting at `out` frame
    /// `start_sample`, draining queued MIDI first and then every event in
    /// `midi_in` whose `frame` falls within `[0, num_samples)`, applied in
    /// order before the sample it targets (§4.I step 1: sub-block timing
    /// accuracy is not required, so every event is applied before sample 0
    /// of its targeted frame's position is reached, not interpolated
    /// within the sample itself).
    ///
    /// `num_samples` is `i64`, matching the specification's pseudocode
    /// signature, so a caller-computed negative count is rejected rather
    /// than silently wrapping through `usize`.
    pub fn render_next_block(
        &mut self,
        out: &mut SignalView<'_, f32>,
        midi_in: &[TimedMidiMessage],
        start_sample: usize,
        num_samples: i64,
    ) -> Result<(), EngineError> {
        if num_samples < 0 {
            return Err(EngineError::InvalidFrameCount(num_samples));
        }
        let num_samples = num_samples as usize;
        self.logged_numeric_invalid_this_block = false;

        // Drain the async delivery queue first; anything sitting there
        // takes effect from the first sample of this block.
        let queued: Vec<TimedMidiMessage> = self.midi_receiver.drain().collect();
        for timed in &queued {
            let _ = self.handle_midi_event(&timed.message);
        }

        // Clear the target region before mixing into it.
        for ch in 0..out.num_channels() {
            out.channel_mut(ch)[start_sample..start_sample + num_samples].fill(0.0);
        }

        let mut next_event = 0usize;
        for i in 0..num_samples {
            while next_event < midi_in.len() && midi_in[next_event].frame <= i {
                let _ = self.handle_midi_event(&midi_in[next_event].message);
                next_event += 1;
            }

            let mut left = 0.0f32;
            let mut right = 0.0f32;
            for ch in &mut self.channels {
                let (l, r) = ch.update(self.sample_freq);
                left += self.sanitize_sample(l);
                right += self.sanitize_sample(r);
            }

            left = self.master_lpf_l.update(left);
            right = self.master_lpf_r.update(right);
            let scale = self.master_volume * MASTER_ATTENUATOR;

            out.write_stereo_frame(start_sample + i, left * scale, right * scale);
        }

        // Events whose frame index fell at or beyond the last sample (e.g.
        // exactly `num_samples`) are left in `midi_in` for the caller to
        // resubmit against the next block; this loop never drops one.
        self.publish_digest();
        Ok(())
    }

    /// NaN/Inf substitution (§7 `NumericInvalid`): replaces a bad sample
    /// with silence and logs at most once per block, only in debug
    /// builds, matching §5's "must never ... log" rule for release-mode
    /// audio-thread code.
    #[inline]
    fn sanitize_sample(&mut self, x: f32) -> f32 {
        if x.is_finite() {
            return x;
        }
        #[cfg(debug_assertions)]
        if !self.logged_numeric_invalid_this_block {
            log::warn!("non-finite sample produced during mixdown, substituting silence");
            self.logged_numeric_invalid_this_block = true;
        }
        #[cfg(not(debug_assertions))]
        {
            let _ = &self.logged_numeric_invalid_this_block;
        }
        0.0
    }

    fn publish_digest(&self) {
        let channels: Vec<ChannelDigest> = self.channels.iter().map(|c| c.digest()).collect();
        let voices: Vec<VoiceDigest> = self
            .channels
            .iter()
            .flat_map(|c| {
                let channel_no = c.channel_no();
                c.voices().map(move |v| VoiceDigest {
                    channel_no,
                    resolved_frequency: v.resolved_frequency(),
                    envelope_level: v.envelope_level(),
                    envelope_state: v.envelope_state(),
                })
            })
            .collect();
        self.digest.store(Arc::new(SynthesizerDigest {
            system_type_name: system_type_name(self.system_type),
            master_volume: self.master_volume,
            channels,
            voices,
        }));
    }

    /// A read-only snapshot for observer threads, safe to call at any
    /// rate without blocking the audio thread (§5). Lock-free: backed by
    /// an `arc_swap::ArcSwap` published once per rendered block.
    pub fn digest(&self) -> Arc<SynthesizerDigest> {
        self.digest.load_full()
    }

    /// A cheaply-cloneable handle to the same digest snapshot, usable by
    /// an observer thread that outlives any particular reference to the
    /// synthesizer itself.
    pub fn digest_handle(&self) -> Arc<ArcSwap<SynthesizerDigest>> {
        self.digest.clone()
    }

    pub fn system_type(&self) -> SystemType {
        self.system_type
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }
}
