//! Halcyon Synth - the signal core of the halcyon polyphonic synthesizer.
//!
//! This crate turns host-delivered audio blocks plus interleaved MIDI
//! events into rendered stereo audio, with sample-accurate event timing
//! and a control-rate clock decoupling expensive parameter work from the
//! per-sample loop.
//!
//! # Core Components
//!
//! ## Engine
//!
//! - [`SynthEngine`] - owns everything below; one call per host block:
//!
//! ```rust
//! use halcyon_core::StereoBuffer;
//! use halcyon_synth::{SynthEngine, TimedEvent};
//!
//! let mut engine = SynthEngine::new();
//! engine.prepare(48000.0, 512);
//!
//! let events = [
//!     TimedEvent::note_on(0, 1, 60, 0.8),
//!     TimedEvent::note_on(128, 1, 64, 0.8),
//!     TimedEvent::note_off(400, 1, 60),
//! ];
//! let mut out = StereoBuffer::new(512);
//! engine.render_block(&events, &mut out);
//! ```
//!
//! ## Voices
//!
//! - [`VoicePool`] - eight oscillator voices, round-robin stealing
//! - [`StealPolicy`] - the (currently single) tie-break policy
//!
//! ## Modulation
//!
//! - [`Lfo`] - table-driven LFO shaped by a [`LineGenerator`] curve
//! - [`Envelope`] - AHDSR Moore machine
//! - [`ModulatorBank`] - the modulator arena with two-phase control ticks
//!
//! ## Processing stages
//!
//! - [`FilterStage`] - gated input router + hot-swappable filter table
//! - [`EffectsChain`] - reorderable effects with per-effect enable gates
//!
//! ## Timing
//!
//! - [`ControlClock`] - the 400 Hz control-rate countdown
//! - [`TimedEvent`] / [`MidiMessage`] - sample-offset MIDI events

pub mod clock;
pub mod effects;
pub mod engine;
pub mod envelope;
pub mod filter;
pub mod lfo;
pub mod line;
pub mod midi;
pub mod modulator;
pub mod voice;

// Re-export main types at crate root
pub use clock::{CONTROL_RATE_HZ, ControlClock};
pub use effects::{EffectProcessor, EffectsChain, EffectsOrderHandle};
pub use engine::{MIN_EVENT_INTERVAL, PITCH_BEND_RANGE_SEMITONES, SynthEngine};
pub use envelope::{Envelope, EnvelopeStage};
pub use filter::{FilterImpl, FilterParams, FilterStage, FilterSwapHandle};
pub use lfo::{LFO_RESOLUTION, Lfo};
pub use line::{LineGenerator, LinePoint};
pub use midi::{CC_MOD_WHEEL, MidiMessage, TimedEvent};
pub use modulator::{ControlSource, Modulator, ModulatorBank};
pub use voice::{POLYPHONY, RELEASE_TAIL_MS, StealPolicy, VoicePool};

// Re-export commonly used types from halcyon-core
pub use halcyon_core::{ModLink, ModulatorId, ParamBank, ParamHandles, StateNode, StereoBuffer};
