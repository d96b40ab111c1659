//! Low-frequency oscillator modulator.
//!
//! The LFO is a free-running phase accumulator advanced once per control
//! tick by `frequency / sample_rate * elapsed_samples`. The phase indexes
//! a lookup table rendered from a user-editable [`LineGenerator`] curve;
//! the table carries one guard point so lookups can interpolate across
//! the wrap without branching.

use std::sync::Arc;

use halcyon_core::{ParamBank, ParamKey, ParamRange, lerp};

use crate::line::LineGenerator;

/// Lookup table resolution in samples.
pub const LFO_RESOLUTION: usize = 2048;

/// Table-driven LFO, output in [0, 1].
///
/// # Example
///
/// ```rust
/// use halcyon_core::ParamBank;
/// use halcyon_synth::lfo::Lfo;
///
/// let mut bank = ParamBank::new();
/// let mut lfo = Lfo::new(&mut bank, "lfo1");
/// bank.prepare(48000.0);
/// lfo.prepare(48000.0);
///
/// bank.handles().set("lfo1_frequency", 2.0);
/// bank.control_tick(&[]);
/// let value = lfo.on_control_tick(120, &bank);
/// assert!((0.0..=1.0).contains(&value));
/// ```
#[derive(Debug)]
pub struct Lfo {
    line: Arc<LineGenerator>,
    /// Rendered curve plus one guard point (`table[RESOLUTION] == table[0]`).
    table: Vec<f32>,
    /// Current phase in [0, 1).
    phase: f32,
    /// Reset phase on note-on.
    retrigger: bool,
    sample_rate: f32,
    frequency: ParamKey,
}

impl Lfo {
    /// Creates an LFO and registers its frequency parameter under `id`.
    pub fn new(bank: &mut ParamBank, id: &str) -> Self {
        Self {
            line: Arc::new(LineGenerator::new()),
            table: vec![0.0; LFO_RESOLUTION + 1],
            phase: 0.0,
            retrigger: true,
            sample_rate: 48000.0,
            frequency: bank.register(
                &format!("{id}_frequency"),
                "frequency",
                ParamRange::skewed(0.0, 20.0, 2.5),
                0.0,
            ),
        }
    }

    /// Updates the sample rate, resets the phase and force-renders the
    /// table (blocking is fine here, prepare is not the audio path).
    pub fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.phase = 0.0;
        self.line.render(&mut self.table[..LFO_RESOLUTION]);
        self.table[LFO_RESOLUTION] = self.table[0];
    }

    /// The shared curve editor model (clone the `Arc` for the UI).
    pub fn line(&self) -> &Arc<LineGenerator> {
        &self.line
    }

    /// Current phase in [0, 1).
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Enables or disables phase reset on note-on.
    pub fn set_retrigger(&mut self, retrigger: bool) {
        self.retrigger = retrigger;
    }

    /// True if note-on resets the phase.
    pub fn retrigger(&self) -> bool {
        self.retrigger
    }

    /// Note-on: optionally restart the cycle. The LFO free-runs otherwise.
    pub fn note_on(&mut self) {
        if self.retrigger {
            self.phase = 0.0;
        }
    }

    /// Note-off is a no-op; the LFO keeps running.
    pub fn note_off(&mut self) {}

    /// Advances by `elapsed` samples and returns the table value at the
    /// pre-advance phase, linearly interpolated.
    pub fn on_control_tick(&mut self, elapsed: usize, bank: &ParamBank) -> f32 {
        // Re-render lazily when the curve changed; skip the tick if the
        // UI holds the point lock, the dirty flag stays up for a retry.
        if self.line.is_dirty() && self.line.try_render(&mut self.table[..LFO_RESOLUTION]) {
            self.table[LFO_RESOLUTION] = self.table[0];
        }

        let frequency = bank.target(self.frequency);
        let advance = frequency / self.sample_rate * elapsed as f32;

        let phase = self.phase;
        self.phase = (self.phase + advance) % 1.0;

        let scaled = phase * LFO_RESOLUTION as f32;
        let index = (scaled as usize).min(LFO_RESOLUTION - 1);
        lerp(self.table[index], self.table[index + 1], scaled - index as f32)
    }
}
