//! Host-exposed, modulatable parameters.
//!
//! Every automatable scalar in the synthesizer is a [`ModParam`] living in
//! the engine-owned [`ParamBank`] arena. Components hold a [`ParamKey`]
//! (a stable index) instead of a reference, so there are no back pointers
//! between parameters and their owners.
//!
//! A parameter combines three clocks:
//!
//! - the **host/UI thread** writes the raw value into a lock-free
//!   [`HostSlot`] at any time;
//! - at each **control tick** the bank folds the host value together with
//!   every non-bypassed [`ModLink`] contribution, clamps the sum in
//!   normalized space, maps it through the parameter's [`ParamRange`] and
//!   retargets the ramp;
//! - the **audio loop** pulls one smoothed value per sample via
//!   [`ParamBank::next`].
//!
//! Link bookkeeping (add/remove) requires `&mut ParamBank` and therefore
//! cannot race the audio thread's iteration — the caller owns both.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use libm::powf;

use crate::param::LinearSmoothedParam;

/// Ramp duration applied to every parameter target change.
pub const PARAM_SMOOTH_MS: f32 = 50.0;

/// Stable index of a modulator in the engine's modulator arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModulatorId(pub usize);

/// Stable index of a parameter in the [`ParamBank`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamKey(usize);

/// A lock-free cell holding an `f32` as its bit pattern.
///
/// Cloning shares the underlying cell; the UI keeps clones, the audio
/// thread reads through the owning parameter. Also doubles as an on/off
/// switch cell for boolean gates (0.0 / 1.0).
#[derive(Clone, Debug)]
pub struct HostSlot(Arc<AtomicU32>);

impl HostSlot {
    /// Creates a slot holding `value`.
    pub fn new(value: f32) -> Self {
        Self(Arc::new(AtomicU32::new(value.to_bits())))
    }

    /// Stores a new value.
    #[inline]
    pub fn set(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Loads the current value.
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    /// Stores an on/off state (1.0 / 0.0).
    #[inline]
    pub fn set_on(&self, on: bool) {
        self.set(if on { 1.0 } else { 0.0 });
    }

    /// Loads an on/off state.
    #[inline]
    pub fn is_on(&self) -> bool {
        self.get() >= 0.5
    }
}

/// A value range with an optional power-curve skew.
///
/// `skew == 1.0` is linear. `skew > 1.0` concentrates normalized
/// resolution at the low end of the range (time and rate knobs).
#[derive(Clone, Copy, Debug)]
pub struct ParamRange {
    /// Minimum raw value.
    pub min: f32,
    /// Maximum raw value.
    pub max: f32,
    /// Power-curve exponent applied when mapping from normalized space.
    pub skew: f32,
}

impl ParamRange {
    /// Creates a linear range.
    pub fn linear(min: f32, max: f32) -> Self {
        Self {
            min,
            max,
            skew: 1.0,
        }
    }

    /// Creates a skewed range.
    pub fn skewed(min: f32, max: f32, skew: f32) -> Self {
        Self { min, max, skew }
    }

    /// Maps a raw value into normalized [0, 1], clamping out-of-range input.
    pub fn to_normalized(&self, value: f32) -> f32 {
        let clamped = value.clamp(self.min, self.max);
        let proportion = if self.max > self.min {
            (clamped - self.min) / (self.max - self.min)
        } else {
            0.0
        };
        if self.skew == 1.0 {
            proportion
        } else {
            powf(proportion, 1.0 / self.skew)
        }
    }

    /// Maps a normalized [0, 1] value back to the raw range.
    pub fn from_normalized(&self, normalized: f32) -> f32 {
        let n = normalized.clamp(0.0, 1.0);
        let proportion = if self.skew == 1.0 {
            n
        } else {
            powf(n, self.skew)
        };
        self.min + (self.max - self.min) * proportion
    }

    /// Clamps a raw value into the range.
    pub fn clamp_value(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

/// Metadata describing one registered parameter.
#[derive(Clone, Debug)]
pub struct ParamDescriptor {
    /// Stable identifier, prefixed with the owning component's id
    /// (e.g. `"osc1_semitone"`).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Raw value range.
    pub range: ParamRange,
    /// Default raw value.
    pub default: f32,
}

/// A modulation link: one modulator driving this parameter.
///
/// Stored on the target parameter. At most one link per (modulator,
/// parameter) pair; see [`ParamBank::add_link`].
#[derive(Clone, Copy, Debug)]
pub struct ModLink {
    /// The modulator feeding this link.
    pub source: ModulatorId,
    /// Contribution scale in [-1, 1].
    pub amount: f32,
    /// Remap the modulator's [0, 1] output to [-1, 1] before scaling.
    pub bipolar: bool,
    /// Skip this link's contribution entirely.
    pub bypass: bool,
}

impl ModLink {
    /// Default contribution scale for a freshly created link.
    pub const DEFAULT_AMOUNT: f32 = 0.2;

    /// Creates a link with default amount, unipolar, active.
    pub fn new(source: ModulatorId) -> Self {
        Self {
            source,
            amount: Self::DEFAULT_AMOUNT,
            bipolar: false,
            bypass: false,
        }
    }

    /// Sets the amount, clamped to [-1, 1].
    pub fn set_amount(&mut self, amount: f32) {
        self.amount = amount.clamp(-1.0, 1.0);
    }
}

/// One modulatable parameter.
#[derive(Debug)]
struct ModParam {
    slot: HostSlot,
    range: ParamRange,
    smoother: LinearSmoothedParam,
    links: Vec<ModLink>,
    normalized_target: f32,
    value_target: f32,
}

impl ModParam {
    fn control_tick(&mut self, outputs: &[f32]) {
        let mut normalized = self.range.to_normalized(self.slot.get());
        for link in &self.links {
            if link.bypass {
                continue;
            }
            let mut out = outputs.get(link.source.0).copied().unwrap_or(0.0);
            if link.bipolar {
                out = 2.0 * out - 1.0;
            }
            normalized += out * link.amount;
        }
        self.normalized_target = normalized.clamp(0.0, 1.0);
        self.value_target = self.range.from_normalized(self.normalized_target);
        self.smoother.set_target(self.value_target);
    }
}

/// The UI-facing control surface: descriptors plus shared value slots.
///
/// Cloning is cheap and shares the slots, so a host can keep a clone on
/// its own thread and write values without touching the engine.
#[derive(Clone, Debug, Default)]
pub struct ParamHandles {
    descriptors: Vec<ParamDescriptor>,
    slots: Vec<HostSlot>,
    by_id: BTreeMap<String, usize>,
    switch_descriptors: Vec<(String, bool)>,
    switch_slots: Vec<HostSlot>,
    switch_by_id: BTreeMap<String, usize>,
}

impl ParamHandles {
    /// Sets a parameter's raw value by id, clamped to its range.
    ///
    /// Unknown ids are ignored.
    pub fn set(&self, id: &str, value: f32) {
        if let Some(&idx) = self.by_id.get(id) {
            self.slots[idx].set(self.descriptors[idx].range.clamp_value(value));
        }
    }

    /// Reads a parameter's raw value by id.
    pub fn get(&self, id: &str) -> Option<f32> {
        self.by_id.get(id).map(|&idx| self.slots[idx].get())
    }

    /// Returns the descriptor for a parameter id.
    pub fn descriptor(&self, id: &str) -> Option<&ParamDescriptor> {
        self.by_id.get(id).map(|&idx| &self.descriptors[idx])
    }

    /// Iterates all parameter descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ParamDescriptor> {
        self.descriptors.iter()
    }

    /// Sets an on/off switch by id. Unknown ids are ignored.
    pub fn set_switch(&self, id: &str, on: bool) {
        if let Some(&idx) = self.switch_by_id.get(id) {
            self.switch_slots[idx].set_on(on);
        }
    }

    /// Reads an on/off switch by id.
    pub fn switch(&self, id: &str) -> Option<bool> {
        self.switch_by_id
            .get(id)
            .map(|&idx| self.switch_slots[idx].is_on())
    }

    /// Iterates all switch ids with their defaults.
    pub fn switches(&self) -> impl Iterator<Item = &(String, bool)> {
        self.switch_descriptors.iter()
    }
}

/// Arena of all modulatable parameters, owned by the engine.
#[derive(Debug, Default)]
pub struct ParamBank {
    params: Vec<ModParam>,
    handles: ParamHandles,
}

impl ParamBank {
    /// Creates an empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a parameter and returns its key.
    ///
    /// Called once per parameter at construction time, mirroring the
    /// host's parameter-layout pass.
    pub fn register(&mut self, id: &str, name: &str, range: ParamRange, default: f32) -> ParamKey {
        let slot = HostSlot::new(default);
        let idx = self.params.len();
        self.params.push(ModParam {
            slot: slot.clone(),
            range,
            smoother: LinearSmoothedParam::with_config(default, 48000.0, PARAM_SMOOTH_MS),
            links: Vec::new(),
            normalized_target: range.to_normalized(default),
            value_target: default,
        });
        self.handles.descriptors.push(ParamDescriptor {
            id: id.to_string(),
            name: name.to_string(),
            range,
            default,
        });
        self.handles.slots.push(slot);
        self.handles.by_id.insert(id.to_string(), idx);
        ParamKey(idx)
    }

    /// Registers an on/off switch (not modulatable) and returns its slot.
    pub fn register_switch(&mut self, id: &str, default: bool) -> HostSlot {
        let slot = HostSlot::new(if default { 1.0 } else { 0.0 });
        let idx = self.handles.switch_slots.len();
        self.handles
            .switch_descriptors
            .push((id.to_string(), default));
        self.handles.switch_slots.push(slot.clone());
        self.handles.switch_by_id.insert(id.to_string(), idx);
        slot
    }

    /// Reconfigures every smoother for a new sample rate and snaps each
    /// parameter to its host value.
    pub fn prepare(&mut self, sample_rate: f32) {
        for param in &mut self.params {
            param.smoother.set_sample_rate(sample_rate);
            param.smoother.set_transition_time_ms(PARAM_SMOOTH_MS);
            let value = param.range.clamp_value(param.slot.get());
            param.smoother.set_immediate(value);
            param.value_target = value;
            param.normalized_target = param.range.to_normalized(value);
        }
    }

    /// Recomputes every parameter's smoothing target from its host value
    /// plus link contributions.
    ///
    /// `outputs` is indexed by [`ModulatorId`]; every modulator must have
    /// produced its value for this tick before the bank applies them.
    pub fn control_tick(&mut self, outputs: &[f32]) {
        for param in &mut self.params {
            param.control_tick(outputs);
        }
    }

    /// Advances a parameter's smoother one sample and returns the value.
    #[inline]
    pub fn next(&mut self, key: ParamKey) -> f32 {
        self.params[key.0].smoother.advance()
    }

    /// Returns a parameter's current smoothed value without advancing.
    #[inline]
    pub fn value(&self, key: ParamKey) -> f32 {
        self.params[key.0].smoother.get()
    }

    /// Returns the raw target computed at the last control tick.
    #[inline]
    pub fn target(&self, key: ParamKey) -> f32 {
        self.params[key.0].value_target
    }

    /// Returns the normalized target computed at the last control tick.
    #[inline]
    pub fn normalized_target(&self, key: ParamKey) -> f32 {
        self.params[key.0].normalized_target
    }

    /// Sets a parameter's host value by key (clamped).
    pub fn set_value(&mut self, key: ParamKey, value: f32) {
        let param = &self.params[key.0];
        param.slot.set(param.range.clamp_value(value));
    }

    /// Looks up a parameter key by id.
    pub fn key_of(&self, id: &str) -> Option<ParamKey> {
        self.handles.by_id.get(id).map(|&idx| ParamKey(idx))
    }

    /// Returns the registered id of a parameter.
    pub fn id_of(&self, key: ParamKey) -> &str {
        &self.handles.descriptors[key.0].id
    }

    /// Returns the UI control surface (clone to share across threads).
    pub fn handles(&self) -> &ParamHandles {
        &self.handles
    }

    /// Links a modulator to a parameter. Adding a duplicate
    /// (modulator, parameter) pair is a no-op.
    pub fn add_link(&mut self, key: ParamKey, source: ModulatorId) {
        let links = &mut self.params[key.0].links;
        if links.iter().any(|l| l.source == source) {
            return;
        }
        links.push(ModLink::new(source));
    }

    /// Inserts a fully configured link, replacing any existing link from
    /// the same modulator (state restore path).
    pub fn restore_link(&mut self, key: ParamKey, link: ModLink) {
        let links = &mut self.params[key.0].links;
        links.retain(|l| l.source != link.source);
        links.push(link);
    }

    /// Removes the link from `source` to this parameter. Removing a link
    /// that does not exist is a no-op.
    pub fn remove_link(&mut self, key: ParamKey, source: ModulatorId) {
        self.params[key.0].links.retain(|l| l.source != source);
    }

    /// Removes every link fed by `source` (modulator teardown).
    pub fn remove_links_from(&mut self, source: ModulatorId) {
        for param in &mut self.params {
            param.links.retain(|l| l.source != source);
        }
    }

    /// Returns the links targeting a parameter.
    pub fn links(&self, key: ParamKey) -> &[ModLink] {
        &self.params[key.0].links
    }

    /// Returns a mutable handle to the link from `source`, if present.
    pub fn link_mut(&mut self, key: ParamKey, source: ModulatorId) -> Option<&mut ModLink> {
        self.params[key.0]
            .links
            .iter_mut()
            .find(|l| l.source == source)
    }

    /// Collects `(parameter id, link)` pairs for every link fed by
    /// `source`, in registration order (state save path).
    pub fn links_from(&self, source: ModulatorId) -> Vec<(String, ModLink)> {
        let mut out = Vec::new();
        for (idx, param) in self.params.iter().enumerate() {
            if let Some(link) = param.links.iter().find(|l| l.source == source) {
                out.push((self.handles.descriptors[idx].id.clone(), *link));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank_with(default: f32) -> (ParamBank, ParamKey) {
        let mut bank = ParamBank::new();
        let key = bank.register("test_p", "p", ParamRange::linear(0.0, 1.0), default);
        bank.prepare(48000.0);
        (bank, key)
    }

    #[test]
    fn register_and_lookup() {
        let (bank, key) = bank_with(0.5);
        assert_eq!(bank.key_of("test_p"), Some(key));
        assert_eq!(bank.key_of("nope"), None);
        assert_eq!(bank.id_of(key), "test_p");
    }

    #[test]
    fn control_tick_without_links_tracks_host_value() {
        let (mut bank, key) = bank_with(0.5);
        bank.set_value(key, 0.8);
        bank.control_tick(&[]);
        assert!((bank.target(key) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn link_contributions_sum_and_clamp() {
        // Base 0.5 plus unipolar links 0.3 and 0.2 at full modulator
        // output lands exactly on 1.0.
        let (mut bank, key) = bank_with(0.5);
        bank.add_link(key, ModulatorId(0));
        bank.add_link(key, ModulatorId(1));
        bank.link_mut(key, ModulatorId(0)).unwrap().set_amount(0.3);
        bank.link_mut(key, ModulatorId(1)).unwrap().set_amount(0.2);

        bank.control_tick(&[1.0, 1.0]);
        assert_eq!(bank.normalized_target(key), 1.0);
        assert_eq!(bank.target(key), 1.0);
    }

    #[test]
    fn bipolar_link_recenters_output() {
        let (mut bank, key) = bank_with(0.5);
        bank.add_link(key, ModulatorId(0));
        let link = bank.link_mut(key, ModulatorId(0)).unwrap();
        link.set_amount(1.0);
        link.bipolar = true;

        // Modulator at mid-scale contributes nothing when bipolar.
        bank.control_tick(&[0.5]);
        assert!((bank.normalized_target(key) - 0.5).abs() < 1e-6);

        // At zero it pulls fully negative.
        bank.control_tick(&[0.0]);
        assert!((bank.normalized_target(key) - 0.0).abs() < 1e-6);
    }

    #[test]
    fn bypassed_link_contributes_nothing() {
        let (mut bank, key) = bank_with(0.5);
        bank.add_link(key, ModulatorId(0));
        bank.link_mut(key, ModulatorId(0)).unwrap().set_amount(0.5);
        bank.link_mut(key, ModulatorId(0)).unwrap().bypass = true;

        bank.control_tick(&[1.0]);
        assert!((bank.normalized_target(key) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn duplicate_add_is_noop() {
        let (mut bank, key) = bank_with(0.5);
        bank.add_link(key, ModulatorId(0));
        bank.link_mut(key, ModulatorId(0)).unwrap().set_amount(0.9);
        bank.add_link(key, ModulatorId(0));

        assert_eq!(bank.links(key).len(), 1);
        // The original link's configuration survives the duplicate add.
        assert!((bank.links(key)[0].amount - 0.9).abs() < 1e-6);
    }

    #[test]
    fn remove_missing_link_is_noop() {
        let (mut bank, key) = bank_with(0.5);
        bank.remove_link(key, ModulatorId(3));
        assert!(bank.links(key).is_empty());
    }

    #[test]
    fn remove_links_from_clears_all_targets() {
        let mut bank = ParamBank::new();
        let a = bank.register("a", "a", ParamRange::linear(0.0, 1.0), 0.0);
        let b = bank.register("b", "b", ParamRange::linear(0.0, 1.0), 0.0);
        bank.add_link(a, ModulatorId(0));
        bank.add_link(b, ModulatorId(0));
        bank.add_link(b, ModulatorId(1));

        bank.remove_links_from(ModulatorId(0));
        assert!(bank.links(a).is_empty());
        assert_eq!(bank.links(b).len(), 1);
    }

    #[test]
    fn handles_clamp_out_of_range_host_values() {
        let mut bank = ParamBank::new();
        bank.register("g", "g", ParamRange::linear(-36.0, 0.0), -12.0);
        let handles = bank.handles().clone();

        handles.set("g", 40.0);
        assert_eq!(handles.get("g"), Some(0.0));
        handles.set("g", -100.0);
        assert_eq!(handles.get("g"), Some(-36.0));
    }

    #[test]
    fn skewed_range_round_trips() {
        let range = ParamRange::skewed(0.0, 12000.0, 2.0);
        for v in [0.0_f32, 10.0, 300.0, 6000.0, 12000.0] {
            let n = range.to_normalized(v);
            assert!((0.0..=1.0).contains(&n));
            assert!((range.from_normalized(n) - v).abs() < 0.5, "{v}");
        }
    }

    #[test]
    fn smoother_ramps_toward_tick_target() {
        let (mut bank, key) = bank_with(0.0);
        bank.set_value(key, 1.0);
        bank.control_tick(&[]);

        let first = bank.next(key);
        assert!(first > 0.0 && first < 0.1, "ramp starts, got {first}");

        // 50 ms ramp at 48 kHz = 2400 samples
        for _ in 0..2400 {
            bank.next(key);
        }
        assert_eq!(bank.value(key), 1.0);
    }
}
