//! The synthesizer engine: sample-accurate MIDI scheduling over the
//! control-rate render loop.
//!
//! [`SynthEngine::render_block`] walks the block's MIDI events in order,
//! rendering the audio between consecutive events so every message takes
//! effect at its exact sample offset. Rendering itself is split again at
//! control-tick boundaries (see [`crate::clock`]): each tick advances all
//! modulators, re-targets every parameter and refreshes coefficients,
//! then the sub-range renders with nothing but cheap per-sample smoothing
//! in the loop.
//!
//! Signal flow per sub-range: voice pool -> filter stage (gated router)
//! -> chain buffer (filter output plus dry-routed sources) -> effects
//! chain -> host buffer.

use std::sync::Arc;

use halcyon_core::{ModLink, ModulatorId, ParamBank, ParamHandles, SmoothedParam, StateNode, StereoBuffer};

use crate::clock::ControlClock;
use crate::effects::{EffectsChain, EffectsOrderHandle};
use crate::filter::{FilterStage, FilterSwapHandle};
use crate::line::LineGenerator;
use crate::midi::{CC_MOD_WHEEL, MidiMessage, TimedEvent};
use crate::modulator::{Modulator, ModulatorBank};
use crate::voice::VoicePool;

/// Events closer than this to the render position are applied without an
/// intervening render call.
pub const MIN_EVENT_INTERVAL: usize = 8;

/// Pitch wheel range in semitones at full deflection.
pub const PITCH_BEND_RANGE_SEMITONES: f32 = 2.0;

/// Smoothing time for MIDI controller values.
const CONTROLLER_SMOOTH_MS: f32 = 20.0;

/// The complete signal core: one instance per plugin instance.
///
/// # Example
///
/// ```rust
/// use halcyon_core::StereoBuffer;
/// use halcyon_synth::engine::SynthEngine;
/// use halcyon_synth::midi::TimedEvent;
///
/// let mut engine = SynthEngine::new();
/// engine.prepare(48000.0, 256);
///
/// let events = [TimedEvent::note_on(0, 1, 69, 0.9)];
/// let mut out = StereoBuffer::new(256);
/// engine.render_block(&events, &mut out);
/// assert!(out.left.iter().any(|&s| s != 0.0));
/// ```
pub struct SynthEngine {
    params: ParamBank,
    modulators: ModulatorBank,
    pool: VoicePool,
    filter: FilterStage,
    effects: EffectsChain,
    clock: ControlClock,

    /// Smoothed pitch wheel, scaled to semitones.
    pitch_bend: SmoothedParam,
    wheel: ModulatorId,
    /// Router index of the oscillator bus inside the filter stage.
    osc_route: usize,

    sample_rate: f32,
}

impl Default for SynthEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SynthEngine {
    /// Builds the engine with its fixed component set. Call
    /// [`prepare`](Self::prepare) before rendering.
    pub fn new() -> Self {
        let mut params = ParamBank::new();
        let mut modulators = ModulatorBank::new();

        modulators.add_lfo(&mut params, "lfo1");
        modulators.add_lfo(&mut params, "lfo2");
        modulators.add_envelope(&mut params, "env1");
        modulators.add_envelope(&mut params, "env2");
        let wheel = modulators.add_control("wheel");

        let pool = VoicePool::new(&mut params, "osc1");
        let mut filter = FilterStage::new(&mut params, "filter1");
        let osc_route = filter.add_input(&mut params, "osc1");
        let effects = EffectsChain::new(&mut params, "fx");

        Self {
            params,
            modulators,
            pool,
            filter,
            effects,
            clock: ControlClock::new(48000.0),
            pitch_bend: SmoothedParam::new(0.0),
            wheel,
            osc_route,
            sample_rate: 48000.0,
        }
    }

    /// Reconfigures everything for a sample rate and maximum block size.
    /// Sounding voices are cut and the control clock rearms.
    pub fn prepare(&mut self, sample_rate: f32, block_len: usize) {
        tracing::info!(sample_rate, block_len, "engine prepare");
        self.sample_rate = sample_rate;
        self.params.prepare(sample_rate);
        self.modulators.prepare(sample_rate);
        self.pool.prepare(sample_rate, block_len);
        self.filter.prepare(sample_rate, block_len);
        self.effects.prepare(sample_rate, block_len);
        self.clock = ControlClock::new(sample_rate);
        self.pitch_bend.set_sample_rate(sample_rate);
        self.pitch_bend.set_smoothing_time_ms(CONTROLLER_SMOOTH_MS);
    }

    /// Cuts all voices and clears every processor's state.
    pub fn reset(&mut self) {
        self.pool.reset();
        self.filter.reset();
        self.effects.reset();
        self.modulators.prepare(self.sample_rate);
        self.clock.reset();
        self.pitch_bend.set_immediate(0.0);
    }

    /// Renders one block: `events` must be ordered by offset (defensively
    /// clamped if not), `out` receives the final mix.
    pub fn render_block(&mut self, events: &[TimedEvent], out: &mut StereoBuffer) {
        let block_len = out.len();
        if block_len == 0 {
            return;
        }
        self.ensure_capacity(block_len);

        // Working buffers start silent each block.
        self.pool.clear_output();
        self.effects.buffer_mut().clear_range(0, block_len);

        let mut current = 0usize;
        for event in events {
            // Malformed offsets are clamped into range and forced
            // non-decreasing rather than rejected.
            let offset = event.offset.min(block_len).max(current);
            if offset - current >= MIN_EVENT_INTERVAL {
                self.render_span(current, offset);
                current = offset;
            }
            self.handle_message(event.message);
        }
        self.render_span(current, block_len);

        out.copy_range_from(self.effects.buffer(), 0, block_len);
    }

    /// Renders `[begin, end)`, splitting at control-tick boundaries.
    fn render_span(&mut self, begin: usize, end: usize) {
        let mut position = begin;
        while position < end {
            if self.clock.due() {
                let elapsed = self.clock.tick();
                self.control_tick(elapsed);
            }
            let span = self.clock.span_until_boundary(end - position);
            self.process_range(position, position + span);
            self.clock.consume(span);
            position += span;
        }
    }

    /// One control tick: all modulators generate, all parameters apply,
    /// coefficient consumers refresh, pending swaps land.
    fn control_tick(&mut self, elapsed: usize) {
        self.modulators.control_tick(elapsed, &mut self.params);
        self.filter.on_control_tick(&self.params);
        self.effects.on_control_tick(&self.params);
    }

    /// Renders one tick-free sub-range through the bus chain.
    fn process_range(&mut self, begin: usize, end: usize) {
        if begin == end {
            return;
        }

        self.pool
            .process(&mut self.params, &mut self.pitch_bend, begin, end);
        self.filter.process(&[self.pool.output()], begin, end);

        let osc_consumed = self.filter.route_enabled(self.osc_route);
        let chain = self.effects.buffer_mut();
        chain.copy_range_from(self.filter.output(), begin, end);
        if !osc_consumed {
            // Dry bypass: sources not consumed by the filter reach the
            // output directly.
            chain.accumulate_range(self.pool.output(), begin, end);
        }

        self.effects.process(&mut self.params, begin, end);
    }

    /// Applies one MIDI message at the current render position.
    fn handle_message(&mut self, message: MidiMessage) {
        match message {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => {
                if velocity <= 0.0 {
                    // Running-status note-off.
                    self.pool.note_off(channel, note.min(127));
                    self.modulators.trigger_note_off();
                } else {
                    self.pool.note_on(channel, note.min(127), velocity);
                    self.modulators.trigger_note_on();
                }
            }
            MidiMessage::NoteOff { channel, note, .. } => {
                self.pool.note_off(channel, note.min(127));
                self.modulators.trigger_note_off();
            }
            MidiMessage::PitchBend { amount, .. } => {
                self.pitch_bend
                    .set_target(amount.clamp(-1.0, 1.0) * PITCH_BEND_RANGE_SEMITONES);
            }
            MidiMessage::ControlChange {
                controller, value, ..
            } => {
                if controller == CC_MOD_WHEEL
                    && let Modulator::Control(wheel) = self.modulators.get_mut(self.wheel)
                {
                    wheel.set_value(value);
                }
            }
        }
    }

    /// Grows internal buffers if the host delivers a larger block than
    /// prepared for (allocates; hosts honoring `prepare` never hit this).
    fn ensure_capacity(&mut self, block_len: usize) {
        if self.pool.output().len() < block_len {
            tracing::debug!(block_len, "growing buffers beyond prepared size");
            self.pool.resize_output(block_len);
            self.filter.resize_buffers(block_len);
            self.effects.buffer_mut().resize(block_len);
        }
    }

    // -- control surface -----------------------------------------------

    /// UI-facing parameter handles (clone shares the value slots).
    pub fn param_handles(&self) -> ParamHandles {
        self.params.handles().clone()
    }

    /// UI handle for filter hot-swapping.
    pub fn filter_swap_handle(&self) -> FilterSwapHandle {
        self.filter.swap_handle()
    }

    /// UI handle for effects reordering.
    pub fn effects_order_handle(&self) -> EffectsOrderHandle {
        self.effects.order_handle()
    }

    /// The breakpoint curve of an LFO modulator, shareable with an editor.
    pub fn lfo_line(&self, id: &str) -> Option<Arc<LineGenerator>> {
        match self.modulators.find(id).map(|m| self.modulators.get(m)) {
            Some(Modulator::Lfo(lfo)) => Some(Arc::clone(lfo.line())),
            _ => None,
        }
    }

    // -- modulation routing --------------------------------------------

    /// Looks up a modulator by id ("lfo1", "env2", "wheel", ...).
    pub fn modulator(&self, id: &str) -> Option<ModulatorId> {
        self.modulators.find(id)
    }

    /// Links a modulator to a parameter. Duplicate links and unknown
    /// parameter ids are silent no-ops. Returns whether a link now exists.
    pub fn add_modulation(&mut self, source: ModulatorId, param_id: &str) -> bool {
        match self.params.key_of(param_id) {
            Some(key) => {
                self.params.add_link(key, source);
                true
            }
            None => false,
        }
    }

    /// Removes a link; removing a non-existent link is a silent no-op.
    pub fn remove_modulation(&mut self, source: ModulatorId, param_id: &str) {
        if let Some(key) = self.params.key_of(param_id) {
            self.params.remove_link(key, source);
        }
    }

    /// Removes every link fed by a modulator.
    pub fn remove_all_modulations(&mut self, source: ModulatorId) {
        self.params.remove_links_from(source);
    }

    /// Mutable access to a link's amount/bipolar/bypass settings.
    pub fn modulation_mut(&mut self, source: ModulatorId, param_id: &str) -> Option<&mut ModLink> {
        let key = self.params.key_of(param_id)?;
        self.params.link_mut(key, source)
    }

    // -- persistence ---------------------------------------------------

    /// Serializes non-parameter state: the link graph, LFO curves and
    /// retrigger flags, filter type, effect order.
    pub fn save_state(&self) -> StateNode {
        let mut root = StateNode::new();
        self.modulators
            .save_state(root.add_child("modulators"), &self.params);
        self.filter.save_state(&mut root);
        self.effects.save_state(&mut root);
        root
    }

    /// Restores saved state. Missing sub-nodes mean "nothing to restore";
    /// unknown names are skipped.
    pub fn load_state(&mut self, node: &StateNode) {
        tracing::debug!("loading engine state");
        if let Some(child) = node.child("modulators") {
            self.modulators.load_state(child, &mut self.params);
        }
        self.filter.load_state(node);
        self.effects.load_state(node);
    }

    // -- inspection ----------------------------------------------------

    /// The parameter bank (tests and host glue).
    pub fn params(&self) -> &ParamBank {
        &self.params
    }

    /// The voice pool (tests and host glue).
    pub fn pool(&self) -> &VoicePool {
        &self.pool
    }

    /// Name of the filter currently processing audio.
    pub fn active_filter(&self) -> &'static str {
        self.filter.active_name()
    }
}
