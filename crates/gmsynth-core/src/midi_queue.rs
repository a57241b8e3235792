//! The single-producer-single-consumer delivery queue by which
//! event-producing threads (a live MIDI source, a sequencer running off
//! the audio thread) hand [`TimedMidiMessage`]s to the audio thread
//! without a lock (§5 "Shared state policy").
//!
//! This is deliberately separate from the `midi_in` slice
//! [`crate::Synthesizer::render_next_block`] takes directly: a host that
//! already demultiplexes its own MIDI buffer per callback has no need for
//! this queue at all. It exists for the other delivery path §5 names,
//! "the sequencer and any live MIDI source", which run on a thread with
//! no natural per-block boundary of their own.

use crate::midi::TimedMidiMessage;

/// Capacity of the underlying ring buffer. `midi-queue-4096` takes
/// precedence over `midi-queue-1024`, favoring whichever the embedding
/// crate opted into for dense SysEx traffic; the default favors the
/// common case (a sparse trickle of note events between blocks).
#[cfg(feature = "midi-queue-4096")]
const QUEUE_CAPACITY: usize = 4096;
#[cfg(all(feature = "midi-queue-1024", not(feature = "midi-queue-4096")))]
const QUEUE_CAPACITY: usize = 1024;
#[cfg(not(any(feature = "midi-queue-1024", feature = "midi-queue-4096")))]
const QUEUE_CAPACITY: usize = 256;

/// The producer half, held by an event-producing thread. `try_send`
/// never blocks; a full queue drops the newest message rather than stall
/// the caller (§5: the audio thread, not the producer, sets the pace).
pub struct MidiSender {
    producer: rtrb::Producer<TimedMidiMessage>,
}

impl MidiSender {
    /// Attempts to enqueue `message`. Returns it back on failure (queue
    /// full) so the caller can decide whether to retry, coalesce, or
    /// drop it; the queue itself never drops silently.
    pub fn try_send(&mut self, message: TimedMidiMessage) -> Result<(), TimedMidiMessage> {
        self.producer.push(message).map_err(|rtrb::PushError::Full(m)| m)
    }
}

/// The consumer half, drained by the audio thread at the start of every
/// `render_next_block` call.
pub struct MidiReceiver {
    consumer: rtrb::Consumer<TimedMidiMessage>,
}

impl MidiReceiver {
    /// Drains every currently-queued message without blocking. The
    /// ordering guarantee in §5 ("events delivered to the queue after
    /// `render_next_block` has started for block k MUST be visible no
    /// later than block k+1") only requires draining once per block,
    /// which this satisfies: anything pushed mid-block simply waits for
    /// the next call.
    pub fn drain(&mut self) -> impl Iterator<Item = TimedMidiMessage> + '_ {
        std::iter::from_fn(move || self.consumer.pop().ok())
    }
}

/// Builds a fresh queue pair. Construction happens at synthesizer setup
/// time, off the audio thread, same as the instrument table and wavetable
/// factory (§5 "Suspension points").
pub fn channel() -> (MidiSender, MidiReceiver) {
    let (producer, consumer) = rtrb::RingBuffer::new(QUEUE_CAPACITY);
    (MidiSender { producer }, MidiReceiver { consumer })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiMessage;

    #[test]
    fn sent_messages_arrive_in_order() {
        let (mut tx, mut rx) = channel();
        tx.try_send(TimedMidiMessage {
            frame: 0,
            message: MidiMessage::NoteOn {
                channel: 1,
                note: 60,
                velocity: 100,
            },
        })
        .unwrap();
        tx.try_send(TimedMidiMessage {
            frame: 10,
            message: MidiMessage::NoteOff {
                channel: 1,
                note: 60,
                velocity: 0,
            },
        })
        .unwrap();

        let drained: Vec<_> = rx.drain().collect();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].frame, 0);
        assert_eq!(drained[1].frame, 10);
    }

    #[test]
    fn drain_on_empty_queue_yields_nothing() {
        let (_tx, mut rx) = channel();
        assert_eq!(rx.drain().count(), 0);
    }
}
