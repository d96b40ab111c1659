//! MIDI event types consumed by the engine.
//!
//! The host delivers each audio block together with the MIDI messages that
//! fall inside it, each tagged with its sample offset. Velocities and the
//! pitch wheel arrive normalized; the engine never sees raw byte streams.

/// Controller number of the modulation wheel.
pub const CC_MOD_WHEEL: u8 = 1;

/// A decoded MIDI message.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MidiMessage {
    /// Key pressed.
    NoteOn {
        /// MIDI channel (1-16).
        channel: u8,
        /// Note number (0-127).
        note: u8,
        /// Normalized velocity (0.0-1.0).
        velocity: f32,
    },
    /// Key released.
    NoteOff {
        /// MIDI channel (1-16).
        channel: u8,
        /// Note number (0-127).
        note: u8,
        /// Normalized release velocity (0.0-1.0).
        velocity: f32,
    },
    /// Pitch wheel, normalized to [-1.0, 1.0].
    PitchBend {
        /// MIDI channel (1-16).
        channel: u8,
        /// Normalized wheel position.
        amount: f32,
    },
    /// Continuous controller change.
    ControlChange {
        /// MIDI channel (1-16).
        channel: u8,
        /// Controller number (0-127).
        controller: u8,
        /// Normalized controller value (0.0-1.0).
        value: f32,
    },
}

/// A MIDI message paired with its sample offset inside the block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedEvent {
    /// Sample offset within the current block, `[0, block_len)`.
    pub offset: usize,
    /// The decoded message.
    pub message: MidiMessage,
}

impl TimedEvent {
    /// Creates a timed event.
    pub fn new(offset: usize, message: MidiMessage) -> Self {
        Self { offset, message }
    }

    /// Shorthand for a note-on event.
    pub fn note_on(offset: usize, channel: u8, note: u8, velocity: f32) -> Self {
        Self::new(
            offset,
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            },
        )
    }

    /// Shorthand for a note-off event.
    pub fn note_off(offset: usize, channel: u8, note: u8) -> Self {
        Self::new(
            offset,
            MidiMessage::NoteOff {
                channel,
                note,
                velocity: 0.0,
            },
        )
    }
}
