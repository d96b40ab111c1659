//! Orderable effects chain.
//!
//! A fixed set of effect processors runs in a user-reorderable sequence
//! over the chain buffer, in place. Each effect has a host-toggleable
//! enable gate (off by default) and its own modulatable parameters.
//!
//! Reordering is lock-free: the UI publishes a whole new permutation
//! through an [`ArcSwap`]; the audio thread compares pointers at each
//! control tick and adopts the new order between sub-blocks, never inside
//! one.

use std::sync::Arc;

use arc_swap::ArcSwap;
use libm::sinf;

use halcyon_core::{HostSlot, ParamBank, ParamKey, ParamRange, StateNode, StereoBuffer, lerp};

use core::f32::consts::TAU;

/// Interface every chain effect satisfies.
pub trait EffectProcessor: Send {
    /// Stable display/persistence name.
    fn name(&self) -> &'static str;

    /// Sample-rate-dependent setup.
    fn prepare(&mut self, sample_rate: f32);

    /// Recomputes control-rate state from parameter targets.
    fn on_control_tick(&mut self, params: &ParamBank);

    /// Processes `[begin, end)` of `buffer` in place.
    fn process(&mut self, buffer: &mut StereoBuffer, begin: usize, end: usize, params: &mut ParamBank);

    /// Clears internal state (delay lines, phases).
    fn reset(&mut self);
}

// ---------------------------------------------------------------------------
// Tremolo
// ---------------------------------------------------------------------------

/// Sine-LFO amplitude modulation.
struct Tremolo {
    sample_rate: f32,
    phase: f32,
    phase_inc: f32,
    rate: ParamKey,
    depth: ParamKey,
}

impl Tremolo {
    fn new(bank: &mut ParamBank, id: &str) -> Self {
        Self {
            sample_rate: 48000.0,
            phase: 0.0,
            phase_inc: 0.0,
            rate: bank.register(
                &format!("{id}_rate"),
                "rate",
                ParamRange::skewed(0.1, 20.0, 2.0),
                5.0,
            ),
            depth: bank.register(
                &format!("{id}_depth"),
                "depth",
                ParamRange::linear(0.0, 1.0),
                0.5,
            ),
        }
    }
}

impl EffectProcessor for Tremolo {
    fn name(&self) -> &'static str {
        "tremolo"
    }

    fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.reset();
    }

    fn on_control_tick(&mut self, params: &ParamBank) {
        self.phase_inc = params.target(self.rate) / self.sample_rate;
    }

    fn process(&mut self, buffer: &mut StereoBuffer, begin: usize, end: usize, params: &mut ParamBank) {
        for i in begin..end {
            let depth = params.next(self.depth);
            let gain = 1.0 - depth * (0.5 + 0.5 * sinf(TAU * self.phase));
            self.phase += self.phase_inc;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
            buffer.left[i] *= gain;
            buffer.right[i] *= gain;
        }
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }
}

// ---------------------------------------------------------------------------
// Flanger
// ---------------------------------------------------------------------------

/// Short modulated delay with feedback.
struct Flanger {
    sample_rate: f32,
    phase: f32,
    phase_inc: f32,
    lines: [Vec<f32>; 2],
    write_pos: usize,
    /// Sweep centre in samples (5 ms).
    base_delay: f32,
    /// Sweep radius in samples (4 ms).
    max_mod: f32,

    rate: ParamKey,
    depth: ParamKey,
    feedback: ParamKey,
    mix: ParamKey,
}

impl Flanger {
    const BASE_DELAY_MS: f32 = 5.0;
    const MAX_MOD_MS: f32 = 4.0;

    fn new(bank: &mut ParamBank, id: &str) -> Self {
        Self {
            sample_rate: 48000.0,
            phase: 0.0,
            phase_inc: 0.0,
            lines: [Vec::new(), Vec::new()],
            write_pos: 0,
            base_delay: 0.0,
            max_mod: 0.0,
            rate: bank.register(
                &format!("{id}_rate"),
                "rate",
                ParamRange::skewed(0.05, 5.0, 2.0),
                0.25,
            ),
            depth: bank.register(
                &format!("{id}_depth"),
                "depth",
                ParamRange::linear(0.0, 1.0),
                0.35,
            ),
            feedback: bank.register(
                &format!("{id}_feedback"),
                "feedback",
                ParamRange::linear(0.0, 0.9),
                0.3,
            ),
            mix: bank.register(
                &format!("{id}_mix"),
                "mix",
                ParamRange::linear(0.0, 1.0),
                0.5,
            ),
        }
    }

    /// Reads the delay line `delay` samples behind the write head with
    /// linear interpolation.
    #[inline]
    fn read_line(line: &[f32], write_pos: usize, delay: f32) -> f32 {
        let capacity = line.len();
        let whole = delay as usize;
        let frac = delay - whole as f32;
        let a = line[(write_pos + capacity - whole) % capacity];
        let b = line[(write_pos + capacity - whole - 1) % capacity];
        lerp(a, b, frac)
    }
}

impl EffectProcessor for Flanger {
    fn name(&self) -> &'static str {
        "flanger"
    }

    fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.base_delay = Self::BASE_DELAY_MS / 1000.0 * sample_rate;
        self.max_mod = Self::MAX_MOD_MS / 1000.0 * sample_rate;
        let capacity = (self.base_delay + self.max_mod) as usize + 2;
        for line in &mut self.lines {
            line.clear();
            line.resize(capacity, 0.0);
        }
        self.reset();
    }

    fn on_control_tick(&mut self, params: &ParamBank) {
        self.phase_inc = params.target(self.rate) / self.sample_rate;
    }

    fn process(&mut self, buffer: &mut StereoBuffer, begin: usize, end: usize, params: &mut ParamBank) {
        for i in begin..end {
            let depth = params.next(self.depth);
            let feedback = params.next(self.feedback);
            let mix = params.next(self.mix);

            let sweep = 0.5 + 0.5 * sinf(TAU * self.phase);
            self.phase += self.phase_inc;
            if self.phase >= 1.0 {
                self.phase -= 1.0;
            }
            let delay = (self.base_delay + depth * self.max_mod * (2.0 * sweep - 1.0)).max(1.0);

            let wet_l = Self::read_line(&self.lines[0], self.write_pos, delay);
            let wet_r = Self::read_line(&self.lines[1], self.write_pos, delay);

            let dry_l = buffer.left[i];
            let dry_r = buffer.right[i];
            self.lines[0][self.write_pos] = dry_l + feedback * wet_l;
            self.lines[1][self.write_pos] = dry_r + feedback * wet_r;
            self.write_pos = (self.write_pos + 1) % self.lines[0].len();

            buffer.left[i] = dry_l * (1.0 - mix) + wet_l * mix;
            buffer.right[i] = dry_r * (1.0 - mix) + wet_r * mix;
        }
    }

    fn reset(&mut self) {
        self.phase = 0.0;
        self.write_pos = 0;
        for line in &mut self.lines {
            line.fill(0.0);
        }
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Cloneable UI handle for reordering the chain.
///
/// Single writer: publish new permutations from one (UI) thread only.
#[derive(Clone)]
pub struct EffectsOrderHandle {
    names: Arc<Vec<&'static str>>,
    order: Arc<ArcSwap<Vec<usize>>>,
}

impl EffectsOrderHandle {
    /// Effect names in their fixed registration order.
    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    /// Current processing order as names.
    pub fn order(&self) -> Vec<&'static str> {
        self.order.load().iter().map(|&i| self.names[i]).collect()
    }

    /// Moves an effect to a new position. Unknown names return false.
    pub fn move_to(&self, name: &str, new_index: usize) -> bool {
        let Some(entry) = self.names.iter().position(|&n| n == name) else {
            return false;
        };
        let mut order: Vec<usize> = self.order.load().to_vec();
        order.retain(|&i| i != entry);
        let at = new_index.min(order.len());
        order.insert(at, entry);
        self.order.store(Arc::new(order));
        true
    }
}

struct ChainEntry {
    effect: Box<dyn EffectProcessor>,
    enable: HostSlot,
}

/// The orderable effects chain and its buffer.
pub struct EffectsChain {
    id: String,
    entries: Vec<ChainEntry>,
    names: Arc<Vec<&'static str>>,
    order: Arc<ArcSwap<Vec<usize>>>,
    /// Order adopted by the audio thread (pointer-compared each tick).
    current: Arc<Vec<usize>>,
    buffer: StereoBuffer,
}

impl EffectsChain {
    /// Creates the chain with its fixed effect set, registering enable
    /// gates and parameters under `id`.
    pub fn new(bank: &mut ParamBank, id: &str) -> Self {
        let effects: Vec<Box<dyn EffectProcessor>> = vec![
            Box::new(Flanger::new(bank, &format!("{id}_flanger"))),
            Box::new(Tremolo::new(bank, &format!("{id}_tremolo"))),
        ];

        let mut entries = Vec::new();
        let mut names = Vec::new();
        for effect in effects {
            let enable = bank.register_switch(&format!("{}_{}_enable", id, effect.name()), false);
            names.push(effect.name());
            entries.push(ChainEntry { effect, enable });
        }

        let identity: Vec<usize> = (0..entries.len()).collect();
        let current = Arc::new(identity);
        let order = Arc::new(ArcSwap::new(Arc::clone(&current)));

        Self {
            id: id.to_string(),
            entries,
            names: Arc::new(names),
            order,
            current,
            buffer: StereoBuffer::new(0),
        }
    }

    /// Sizes the chain buffer and prepares every effect.
    pub fn prepare(&mut self, sample_rate: f32, block_len: usize) {
        self.buffer.resize(block_len);
        for entry in &mut self.entries {
            entry.effect.prepare(sample_rate);
        }
    }

    /// Clears every effect's internal state.
    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.effect.reset();
        }
    }

    /// UI handle for reordering.
    pub fn order_handle(&self) -> EffectsOrderHandle {
        EffectsOrderHandle {
            names: Arc::clone(&self.names),
            order: Arc::clone(&self.order),
        }
    }

    /// Adopts any pending reorder, then lets enabled effects update their
    /// control-rate state.
    pub fn on_control_tick(&mut self, params: &ParamBank) {
        let published = self.order.load_full();
        if !Arc::ptr_eq(&published, &self.current) {
            self.current = published;
        }

        for position in 0..self.current.len() {
            let index = self.current[position];
            let entry = &mut self.entries[index];
            if entry.enable.is_on() {
                entry.effect.on_control_tick(params);
            }
        }
    }

    /// Runs every enabled effect, in the adopted order, in place over
    /// `[begin, end)` of the chain buffer.
    pub fn process(&mut self, params: &mut ParamBank, begin: usize, end: usize) {
        let order = Arc::clone(&self.current);
        for &index in order.iter() {
            let entry = &mut self.entries[index];
            if entry.enable.is_on() {
                entry.effect.process(&mut self.buffer, begin, end, params);
            }
        }
    }

    /// The chain buffer (also the engine's final mix bus).
    pub fn buffer(&self) -> &StereoBuffer {
        &self.buffer
    }

    /// Mutable access for the engine to compose the chain input.
    pub fn buffer_mut(&mut self) -> &mut StereoBuffer {
        &mut self.buffer
    }

    /// Saves the processing order under a child named after the chain.
    /// The published (UI-side) order is saved, whether or not the audio
    /// thread adopted it yet.
    pub fn save_state(&self, node: &mut StateNode) {
        let child = node.add_child(&self.id);
        let order_node = child.add_child("chainOrder");
        let published = self.order.load();
        for (position, &index) in published.iter().enumerate() {
            let slot = order_node.add_child("slot");
            slot.set_str("name", self.names[index]);
            slot.set_usize("index", position);
        }
    }

    /// Restores the processing order. Missing nodes or unknown names keep
    /// the current order.
    pub fn load_state(&mut self, node: &StateNode) {
        let Some(child) = node.child(&self.id) else {
            return;
        };
        let Some(order_node) = child.child("chainOrder") else {
            return;
        };

        let mut desired: Vec<(usize, usize)> = Vec::new();
        for slot in order_node.children_named("slot") {
            let Some(name) = slot.str_attr("name") else {
                continue;
            };
            let Some(entry) = self.names.iter().position(|&n| n == name) else {
                tracing::debug!(name, "unknown effect name in state, skipping");
                continue;
            };
            desired.push((slot.usize_attr("index", desired.len()), entry));
        }
        if desired.len() != self.entries.len() {
            return;
        }

        desired.sort_by_key(|&(position, _)| position);
        let order: Vec<usize> = desired.into_iter().map(|(_, entry)| entry).collect();
        // Reject anything that is not a permutation of the effect set.
        let mut check = order.clone();
        check.sort_unstable();
        if check != (0..self.entries.len()).collect::<Vec<_>>() {
            return;
        }
        let order = Arc::new(order);
        self.order.store(Arc::clone(&order));
        self.current = order;
    }
}
