//! Polyphonic voice pool.
//!
//! Eight oscillator voices share one output bus. Allocation is strict
//! round-robin: note-on scans from a cursor for a free slot and hard
//! steals at the cursor when every slot is busy. A note-off *releases*
//! the voice — a short linear fade lets it decay instead of clicking —
//! while a steal cuts it immediately.

use core::f32::consts::TAU;

use libm::sinf;

use halcyon_core::{
    ParamBank, ParamKey, ParamRange, SmoothedParam, StereoBuffer, db_to_gain, semitone_to_hz,
};

/// Number of voice slots.
pub const POLYPHONY: usize = 8;

/// Release fade length in milliseconds.
pub const RELEASE_TAIL_MS: f32 = 10.0;

/// Volume fader floor in dB (values at the floor are silent).
const VOLUME_FLOOR_DB: f32 = -36.0;

/// Voice-stealing tie-break policy.
///
/// Only round-robin is implemented; the enum exists so the policy is an
/// explicit choice at the call site rather than a hidden constant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StealPolicy {
    /// Steal at the round-robin cursor, regardless of voice age or level.
    #[default]
    RoundRobin,
}

/// One oscillator voice.
#[derive(Clone, Copy, Debug)]
struct Voice {
    channel: u8,
    /// Playing note number, or -1 when the slot is free.
    note: i32,
    velocity: f32,
    /// Oscillator phase in [0, 1).
    phase: f32,
    releasing: bool,
    /// Samples left in the release fade.
    release_remaining: usize,
}

impl Voice {
    const FREE: Voice = Voice {
        channel: 0,
        note: -1,
        velocity: 0.0,
        phase: 0.0,
        releasing: false,
        release_remaining: 0,
    };

    fn start(&mut self, channel: u8, note: u8, velocity: f32) {
        self.channel = channel;
        self.note = i32::from(note);
        self.velocity = velocity.clamp(0.0, 1.0);
        self.phase = 0.0;
        self.releasing = false;
        self.release_remaining = 0;
    }

    /// Begin the fade-out tail. Already-releasing voices keep their fade.
    fn release(&mut self, tail_samples: usize) {
        if self.is_playing() && !self.releasing {
            self.releasing = true;
            self.release_remaining = tail_samples.max(1);
        }
    }

    /// Stop immediately, no tail.
    fn cut(&mut self) {
        self.note = -1;
        self.releasing = false;
        self.release_remaining = 0;
    }

    #[inline]
    fn is_playing(&self) -> bool {
        self.note >= 0
    }

    fn is_playing_note(&self, channel: u8, note: u8) -> bool {
        self.is_playing() && self.channel == channel && self.note == i32::from(note)
    }

    /// Renders one sample at the given pitch offset, advancing phase and
    /// the release fade. Free voices contribute exactly nothing.
    #[inline]
    fn advance_sample(&mut self, semitone_offset: f32, sample_rate: f32, tail_samples: usize) -> f32 {
        if self.note < 0 {
            return 0.0;
        }

        let hz = semitone_to_hz(self.note as f32 + semitone_offset);
        self.phase += hz / sample_rate;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        let mut gain = self.velocity;
        if self.releasing {
            gain *= self.release_remaining as f32 / tail_samples.max(1) as f32;
            self.release_remaining -= 1;
            if self.release_remaining == 0 {
                let sample = sinf(TAU * self.phase) * gain;
                self.cut();
                return sample;
            }
        }

        sinf(TAU * self.phase) * gain
    }
}

/// Fixed pool of [`POLYPHONY`] voices with round-robin stealing.
///
/// # Example
///
/// ```rust
/// use halcyon_core::{ParamBank, SmoothedParam};
/// use halcyon_synth::voice::VoicePool;
///
/// let mut bank = ParamBank::new();
/// let mut pool = VoicePool::new(&mut bank, "osc1");
/// bank.prepare(48000.0);
/// pool.prepare(48000.0, 256);
///
/// pool.note_on(1, 69, 0.8); // A4
/// let mut bend = SmoothedParam::new(0.0);
/// pool.process(&mut bank, &mut bend, 0, 256);
/// assert!(pool.output().left.iter().any(|&s| s != 0.0));
/// ```
pub struct VoicePool {
    voices: [Voice; POLYPHONY],
    cursor: usize,
    policy: StealPolicy,
    output: StereoBuffer,
    sample_rate: f32,
    tail_samples: usize,

    semitone: ParamKey,
    volume_db: ParamKey,
}

impl VoicePool {
    /// Creates the pool and registers its parameters under `id`.
    pub fn new(bank: &mut ParamBank, id: &str) -> Self {
        Self {
            voices: [Voice::FREE; POLYPHONY],
            cursor: 0,
            policy: StealPolicy::RoundRobin,
            output: StereoBuffer::new(0),
            sample_rate: 48000.0,
            tail_samples: 0,
            semitone: bank.register(
                &format!("{id}_semitone"),
                "semitone",
                ParamRange::linear(-48.0, 48.0),
                0.0,
            ),
            volume_db: bank.register(
                &format!("{id}_volume"),
                "volume",
                ParamRange::linear(VOLUME_FLOOR_DB, 0.0),
                -12.0,
            ),
        }
    }

    /// Sizes the output bus and derives the release tail, cutting any
    /// sounding voices.
    pub fn prepare(&mut self, sample_rate: f32, block_len: usize) {
        self.sample_rate = sample_rate;
        self.tail_samples = (sample_rate * RELEASE_TAIL_MS / 1000.0) as usize;
        self.output.resize(block_len);
        self.reset();
    }

    /// Cuts every voice and rewinds the cursor.
    pub fn reset(&mut self) {
        for voice in &mut self.voices {
            voice.cut();
        }
        self.cursor = 0;
    }

    /// The stealing policy in effect.
    pub fn policy(&self) -> StealPolicy {
        self.policy
    }

    /// Selects the stealing policy.
    pub fn set_policy(&mut self, policy: StealPolicy) {
        self.policy = policy;
    }

    /// Allocates a voice for a note.
    ///
    /// Any voice already sounding the same (channel, note) is released
    /// first so the note never doubles. Scanning starts at the cursor and
    /// takes the first free slot; with all slots busy the voice at the
    /// cursor is cut and reused. Either way the cursor advances past the
    /// chosen slot.
    pub fn note_on(&mut self, channel: u8, note: u8, velocity: f32) {
        for voice in &mut self.voices {
            if voice.is_playing_note(channel, note) {
                voice.release(self.tail_samples);
            }
        }

        let StealPolicy::RoundRobin = self.policy;
        for scanned in 0..POLYPHONY {
            let index = (self.cursor + scanned) % POLYPHONY;
            if !self.voices[index].is_playing() {
                self.voices[index].start(channel, note, velocity);
                self.cursor = (index + 1) % POLYPHONY;
                return;
            }
        }

        let index = self.cursor;
        self.voices[index].cut();
        self.voices[index].start(channel, note, velocity);
        self.cursor = (index + 1) % POLYPHONY;
    }

    /// Releases every voice sounding the given (channel, note).
    pub fn note_off(&mut self, channel: u8, note: u8) {
        for voice in &mut self.voices {
            if voice.is_playing_note(channel, note) {
                voice.release(self.tail_samples);
            }
        }
    }

    /// Renders `[begin, end)`, accumulating every sounding voice into the
    /// output bus and applying the volume fader.
    ///
    /// `pitch_bend` is the engine's smoothed wheel position, already
    /// scaled to semitones, advanced once per sample here.
    pub fn process(
        &mut self,
        bank: &mut ParamBank,
        pitch_bend: &mut SmoothedParam,
        begin: usize,
        end: usize,
    ) {
        for i in begin..end {
            let offset = bank.next(self.semitone) + pitch_bend.advance();
            let gain = db_to_gain(bank.next(self.volume_db), VOLUME_FLOOR_DB);

            let mut mix = 0.0;
            for voice in &mut self.voices {
                mix += voice.advance_sample(offset, self.sample_rate, self.tail_samples);
            }
            let sample = mix * gain;
            self.output.left[i] += sample;
            self.output.right[i] += sample;
        }
    }

    /// The pool's output bus.
    pub fn output(&self) -> &StereoBuffer {
        &self.output
    }

    /// Grows the output bus (host delivered a larger block than prepared).
    pub fn resize_output(&mut self, block_len: usize) {
        self.output.resize(block_len);
    }

    /// Clears the output bus (start of block).
    pub fn clear_output(&mut self) {
        self.output.clear();
    }

    /// Number of voices currently sounding (including release tails).
    pub fn active_voices(&self) -> usize {
        self.voices.iter().filter(|v| v.is_playing()).count()
    }

    /// Note number per slot, -1 for free slots. Test and UI surface.
    pub fn voice_notes(&self) -> [i32; POLYPHONY] {
        let mut notes = [-1; POLYPHONY];
        for (slot, voice) in notes.iter_mut().zip(self.voices.iter()) {
            *slot = voice.note;
        }
        notes
    }
}
