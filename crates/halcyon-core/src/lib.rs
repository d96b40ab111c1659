//! Halcyon Core - primitives shared across the halcyon synthesizer.
//!
//! This crate holds the DSP-independent building blocks of the signal
//! core:
//!
//! - [`StereoBuffer`] - per-block stereo audio storage, owned by the
//!   producing stage and borrowed by consumers
//! - [`SmoothedParam`] / [`LinearSmoothedParam`] - per-sample value
//!   smoothers bridging control-rate targets to the audio clock
//! - [`ParamBank`] / [`ModParam`](bank) - the arena of host-exposed,
//!   modulatable parameters with lock-free host value slots and
//!   per-parameter modulation links
//! - [`StateNode`] - the persisted-state tree for non-parameter state
//! - conversion math ([`semitone_to_hz`], [`db_to_gain`], ...)
//!
//! # Example
//!
//! ```rust
//! use halcyon_core::{ModulatorId, ParamBank, ParamRange};
//!
//! let mut bank = ParamBank::new();
//! let cutoff = bank.register("flt_cutoff", "cutoff", ParamRange::linear(0.0, 1.0), 0.5);
//! bank.prepare(48000.0);
//!
//! // Link a modulator and run one control tick with its output at 1.0.
//! bank.add_link(cutoff, ModulatorId(0));
//! bank.control_tick(&[1.0]);
//!
//! // The audio loop pulls one smoothed value per sample.
//! let value = bank.next(cutoff);
//! assert!(value >= 0.5);
//! ```

pub mod bank;
pub mod buffer;
pub mod math;
pub mod param;
pub mod state;

pub use bank::{
    HostSlot, ModLink, ModulatorId, PARAM_SMOOTH_MS, ParamBank, ParamDescriptor, ParamHandles,
    ParamKey, ParamRange,
};
pub use buffer::StereoBuffer;
pub use math::{db_to_gain, hz_to_semitone, lerp, semitone_to_hz};
pub use param::{LinearSmoothedParam, SmoothedParam};
pub use state::{StateError, StateNode};
