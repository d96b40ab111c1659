//! AHDSR envelope modulator.
//!
//! A Moore state machine advanced only at control ticks: the output
//! depends on the current stage and the position within it, never on the
//! input history. Stage lengths come from millisecond parameters; a stage
//! whose length is zero is skipped immediately, cascading through as many
//! zero-length stages as needed within a single tick.

use halcyon_core::{ParamBank, ParamKey, ParamRange};

/// Envelope stages, traversed `Init -> Attack -> Hold -> Decay -> Sustain
/// -> Release -> Init`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EnvelopeStage {
    /// Silent, waiting for a gate.
    #[default]
    Init,
    /// Ramping 0 to 1 over the attack length.
    Attack,
    /// Holding 1 for the hold length.
    Hold,
    /// Ramping 1 down to the sustain level.
    Decay,
    /// Holding the sustain level while the gate is down.
    Sustain,
    /// Ramping the sustain level down to 0 after gate release.
    Release,
}

/// Gate-triggered AHDSR envelope, output in [0, 1].
///
/// # Example
///
/// ```rust
/// use halcyon_core::ParamBank;
/// use halcyon_synth::envelope::{Envelope, EnvelopeStage};
///
/// let mut bank = ParamBank::new();
/// let mut env = Envelope::new(&mut bank, "env1");
/// bank.prepare(48000.0);
/// env.prepare(48000.0);
///
/// env.note_on();
/// assert_eq!(env.stage(), EnvelopeStage::Attack);
/// let value = env.on_control_tick(0, &bank);
/// assert_eq!(value, 0.0);
/// ```
#[derive(Debug)]
pub struct Envelope {
    stage: EnvelopeStage,
    /// Samples elapsed inside the current stage.
    position: usize,
    sample_rate: f32,

    // Stage lengths in samples, refreshed every tick from the parameters.
    attack_len: usize,
    hold_len: usize,
    decay_len: usize,
    release_len: usize,

    attack_ms: ParamKey,
    hold_ms: ParamKey,
    decay_ms: ParamKey,
    sustain_level: ParamKey,
    release_ms: ParamKey,
}

impl Envelope {
    /// Creates an envelope and registers its parameters under `id`.
    pub fn new(bank: &mut ParamBank, id: &str) -> Self {
        let time_range = ParamRange::skewed(0.0, 12000.0, 2.0);
        let register_time = |bank: &mut ParamBank, name: &str| {
            bank.register(&format!("{id}_{name}"), name, time_range, 300.0)
        };

        Self {
            stage: EnvelopeStage::Init,
            position: 0,
            sample_rate: 48000.0,
            attack_len: 0,
            hold_len: 0,
            decay_len: 0,
            release_len: 0,
            attack_ms: register_time(bank, "attack"),
            hold_ms: register_time(bank, "hold"),
            decay_ms: register_time(bank, "decay"),
            sustain_level: bank.register(
                &format!("{id}_sustain"),
                "sustain",
                ParamRange::linear(0.0, 1.0),
                0.8,
            ),
            release_ms: register_time(bank, "release"),
        }
    }

    /// Updates the sample rate and silences the envelope.
    pub fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.reset();
    }

    /// Forces the envelope back to silence.
    pub fn reset(&mut self) {
        self.stage = EnvelopeStage::Init;
        self.position = 0;
    }

    /// Gate down: restart from Attack, even when already sounding
    /// (retrigger, no legato).
    pub fn note_on(&mut self) {
        self.position = 0;
        self.stage = EnvelopeStage::Attack;
    }

    /// Gate up: jump to Release unless already silent.
    pub fn note_off(&mut self) {
        if self.stage != EnvelopeStage::Init {
            self.position = 0;
            self.stage = EnvelopeStage::Release;
        }
    }

    /// Current stage.
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// True while the envelope produces non-silent output.
    pub fn is_active(&self) -> bool {
        self.stage != EnvelopeStage::Init
    }

    /// Advances by `elapsed` samples and returns the output for this tick.
    ///
    /// The output is computed from the state *before* advancing (Moore),
    /// then the position moves and any due stage transitions cascade —
    /// including straight through zero-length stages.
    pub fn on_control_tick(&mut self, elapsed: usize, bank: &ParamBank) -> f32 {
        let to_samples =
            |ms: f32, sample_rate: f32| (sample_rate * ms / 1000.0) as usize;
        self.attack_len = to_samples(bank.target(self.attack_ms), self.sample_rate);
        self.hold_len = to_samples(bank.target(self.hold_ms), self.sample_rate);
        self.decay_len = to_samples(bank.target(self.decay_ms), self.sample_rate);
        self.release_len = to_samples(bank.target(self.release_ms), self.sample_rate);
        let sustain = bank.target(self.sustain_level);

        let value = self.stage_output(self.stage, sustain).clamp(0.0, 1.0);

        self.position += elapsed;
        self.advance_stage();

        value
    }

    /// Output of `stage` at the current position. A zero-length stage
    /// yields what the next stage would.
    fn stage_output(&self, stage: EnvelopeStage, sustain: f32) -> f32 {
        let fraction = |position: usize, length: usize| position as f32 / length as f32;
        match stage {
            EnvelopeStage::Init => 0.0,
            EnvelopeStage::Attack => {
                if self.attack_len > 0 {
                    fraction(self.position, self.attack_len)
                } else {
                    self.stage_output(EnvelopeStage::Hold, sustain)
                }
            }
            EnvelopeStage::Hold => {
                if self.hold_len > 0 {
                    1.0
                } else {
                    self.stage_output(EnvelopeStage::Decay, sustain)
                }
            }
            EnvelopeStage::Decay => {
                if self.decay_len > 0 {
                    1.0 + (sustain - 1.0) * fraction(self.position, self.decay_len)
                } else {
                    self.stage_output(EnvelopeStage::Sustain, sustain)
                }
            }
            EnvelopeStage::Sustain => sustain,
            EnvelopeStage::Release => {
                if self.release_len > 0 {
                    sustain - sustain * fraction(self.position, self.release_len)
                } else {
                    0.0
                }
            }
        }
    }

    /// Applies every stage transition that is due, resetting the position
    /// at each boundary so zero-length stages cascade in one call.
    fn advance_stage(&mut self) {
        loop {
            match self.stage {
                EnvelopeStage::Attack if self.position >= self.attack_len => {
                    self.stage = EnvelopeStage::Hold;
                    self.position = 0;
                }
                EnvelopeStage::Hold if self.position >= self.hold_len => {
                    self.stage = EnvelopeStage::Decay;
                    self.position = 0;
                }
                EnvelopeStage::Decay if self.position >= self.decay_len => {
                    self.stage = EnvelopeStage::Sustain;
                    self.position = 0;
                }
                EnvelopeStage::Release if self.position >= self.release_len => {
                    self.stage = EnvelopeStage::Init;
                    self.position = 0;
                }
                _ => return,
            }
        }
    }
}
