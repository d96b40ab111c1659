//! Filter stage: input router plus hot-swappable filter implementations.
//!
//! The stage owns a closed, immutable table of [`FilterImpl`] strategies
//! (simple implementations — the interesting part is the machinery around
//! them). The UI requests a different filter by writing its table index to
//! an atomic handle; the audio thread adopts the request at the next
//! control tick, never mid-sub-block, and resets the incoming filter so no
//! stale state leaks across the swap. Because the table is immutable, the
//! index itself is the generation counter: adopting it is idempotent.
//!
//! Upstream audio sources register as router inputs, each with a
//! host-toggleable gate. Gated-in sources are summed into the filter
//! input; gated-out sources bypass the filter and reach the final output
//! dry (the engine reads [`route_enabled`](FilterStage::route_enabled)).

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use libm::{cosf, expf, sinf};

use halcyon_core::{
    HostSlot, ParamBank, ParamKey, ParamRange, StateNode, StereoBuffer, hz_to_semitone,
    semitone_to_hz,
};

use core::f32::consts::TAU;

/// Parameter keys shared by every filter implementation.
///
/// All filters read the same cutoff/resonance/feedback knobs, so swapping
/// the implementation keeps the knob positions meaningful.
#[derive(Clone, Copy, Debug)]
pub struct FilterParams {
    /// Cutoff as a fractional MIDI semitone (pitch-mapped frequency).
    pub cutoff: ParamKey,
    /// Resonance, 0..0.99.
    pub resonance: ParamKey,
    /// Feedback, 0..0.9 (comb filters).
    pub feedback: ParamKey,
}

impl FilterParams {
    /// Registers the shared filter parameters under `id`.
    pub fn register(bank: &mut ParamBank, id: &str) -> Self {
        Self {
            cutoff: bank.register(
                &format!("{id}_cutoff"),
                "cutoff",
                ParamRange::linear(hz_to_semitone(10.0), hz_to_semitone(20000.0)),
                hz_to_semitone(440.0),
            ),
            resonance: bank.register(
                &format!("{id}_resonance"),
                "resonance",
                ParamRange::linear(0.0, 0.99),
                0.0,
            ),
            feedback: bank.register(
                &format!("{id}_feedback"),
                "feedback",
                ParamRange::linear(0.0, 0.9),
                0.0,
            ),
        }
    }
}

/// Strategy interface every filter implementation satisfies.
pub trait FilterImpl: Send {
    /// Stable display/persistence name.
    fn name(&self) -> &'static str;

    /// Sample-rate-dependent setup.
    fn prepare(&mut self, sample_rate: f32);

    /// Recomputes coefficients from the current parameter targets.
    fn on_control_tick(&mut self, params: &FilterParams, bank: &ParamBank);

    /// Processes `[begin, end)` from `input` into `output`.
    fn process(&mut self, input: &StereoBuffer, output: &mut StereoBuffer, begin: usize, end: usize);

    /// Clears internal state without touching coefficients.
    fn reset(&mut self);
}

// ---------------------------------------------------------------------------
// Ladder lowpass
// ---------------------------------------------------------------------------

/// Four cascaded one-pole lowpass stages with resonance feedback.
#[derive(Debug, Default)]
struct LadderFilter {
    sample_rate: f32,
    /// One-pole coefficient.
    g: f32,
    /// Feedback gain from the last stage.
    k: f32,
    stages: [[f32; 4]; 2],
}

impl LadderFilter {
    fn new() -> Self {
        Self {
            sample_rate: 48000.0,
            ..Self::default()
        }
    }
}

impl FilterImpl for LadderFilter {
    fn name(&self) -> &'static str {
        "ladder"
    }

    fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.reset();
    }

    fn on_control_tick(&mut self, params: &FilterParams, bank: &ParamBank) {
        let cutoff_hz = semitone_to_hz(bank.target(params.cutoff))
            .clamp(10.0, self.sample_rate * 0.45);
        self.g = 1.0 - expf(-TAU * cutoff_hz / self.sample_rate);
        self.k = bank.target(params.resonance) * 4.0;
    }

    fn process(&mut self, input: &StereoBuffer, output: &mut StereoBuffer, begin: usize, end: usize) {
        for (channel, stages) in self.stages.iter_mut().enumerate() {
            let (src, dst) = if channel == 0 {
                (&input.left, &mut output.left)
            } else {
                (&input.right, &mut output.right)
            };
            for i in begin..end {
                let x = src[i] - self.k * stages[3];
                stages[0] += self.g * (x - stages[0]);
                stages[1] += self.g * (stages[0] - stages[1]);
                stages[2] += self.g * (stages[1] - stages[2]);
                stages[3] += self.g * (stages[2] - stages[3]);
                dst[i] = stages[3];
            }
        }
    }

    fn reset(&mut self) {
        self.stages = [[0.0; 4]; 2];
    }
}

// ---------------------------------------------------------------------------
// Biquad highpass
// ---------------------------------------------------------------------------

/// RBJ cookbook highpass biquad.
#[derive(Debug, Default)]
struct HighpassFilter {
    sample_rate: f32,
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    /// Direct form I history per channel: x1, x2, y1, y2.
    history: [[f32; 4]; 2],
}

impl HighpassFilter {
    fn new() -> Self {
        Self {
            sample_rate: 48000.0,
            b0: 1.0,
            ..Self::default()
        }
    }
}

impl FilterImpl for HighpassFilter {
    fn name(&self) -> &'static str {
        "highpass"
    }

    fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.reset();
    }

    fn on_control_tick(&mut self, params: &FilterParams, bank: &ParamBank) {
        let cutoff_hz = semitone_to_hz(bank.target(params.cutoff))
            .clamp(10.0, self.sample_rate * 0.45);
        let q = 0.707 + bank.target(params.resonance) * 9.0;

        let w0 = TAU * cutoff_hz / self.sample_rate;
        let (sin_w0, cos_w0) = (sinf(w0), cosf(w0));
        let alpha = sin_w0 / (2.0 * q);
        let a0 = 1.0 + alpha;

        self.b0 = (1.0 + cos_w0) / 2.0 / a0;
        self.b1 = -(1.0 + cos_w0) / a0;
        self.b2 = self.b0;
        self.a1 = -2.0 * cos_w0 / a0;
        self.a2 = (1.0 - alpha) / a0;
    }

    fn process(&mut self, input: &StereoBuffer, output: &mut StereoBuffer, begin: usize, end: usize) {
        for (channel, h) in self.history.iter_mut().enumerate() {
            let (src, dst) = if channel == 0 {
                (&input.left, &mut output.left)
            } else {
                (&input.right, &mut output.right)
            };
            for i in begin..end {
                let x = src[i];
                let y = self.b0 * x + self.b1 * h[0] + self.b2 * h[1] - self.a1 * h[2] - self.a2 * h[3];
                h[1] = h[0];
                h[0] = x;
                h[3] = h[2];
                h[2] = y;
                dst[i] = y;
            }
        }
    }

    fn reset(&mut self) {
        self.history = [[0.0; 4]; 2];
    }
}

// ---------------------------------------------------------------------------
// Feedback comb
// ---------------------------------------------------------------------------

/// Feedback comb filter; the cutoff sets the comb's fundamental, the sign
/// selects peaks at harmonics (+) or between them (-).
struct CombFilter {
    positive: bool,
    sample_rate: f32,
    delay_samples: usize,
    feedback: f32,
    lines: [Vec<f32>; 2],
    write_pos: usize,
}

impl CombFilter {
    /// Lowest comb fundamental; sizes the delay lines.
    const MIN_FREQ_HZ: f32 = 10.0;

    fn new(positive: bool) -> Self {
        Self {
            positive,
            sample_rate: 48000.0,
            delay_samples: 1,
            feedback: 0.0,
            lines: [Vec::new(), Vec::new()],
            write_pos: 0,
        }
    }
}

impl FilterImpl for CombFilter {
    fn name(&self) -> &'static str {
        if self.positive { "comb+" } else { "comb-" }
    }

    fn prepare(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        let capacity = (sample_rate / Self::MIN_FREQ_HZ) as usize + 1;
        for line in &mut self.lines {
            line.clear();
            line.resize(capacity, 0.0);
        }
        self.write_pos = 0;
    }

    fn on_control_tick(&mut self, params: &FilterParams, bank: &ParamBank) {
        let freq = semitone_to_hz(bank.target(params.cutoff))
            .clamp(Self::MIN_FREQ_HZ, self.sample_rate * 0.45);
        let capacity = self.lines[0].len().max(2);
        self.delay_samples = ((self.sample_rate / freq) as usize).clamp(1, capacity - 1);
        let amount = bank.target(params.feedback);
        self.feedback = if self.positive { amount } else { -amount };
    }

    fn process(&mut self, input: &StereoBuffer, output: &mut StereoBuffer, begin: usize, end: usize) {
        let capacity = self.lines[0].len();
        if capacity == 0 {
            return;
        }
        let mut write_pos = self.write_pos;
        for i in begin..end {
            let read_pos = (write_pos + capacity - self.delay_samples) % capacity;
            let out_l = input.left[i] + self.feedback * self.lines[0][read_pos];
            let out_r = input.right[i] + self.feedback * self.lines[1][read_pos];
            self.lines[0][write_pos] = out_l;
            self.lines[1][write_pos] = out_r;
            output.left[i] = out_l;
            output.right[i] = out_r;
            write_pos = (write_pos + 1) % capacity;
        }
        self.write_pos = write_pos;
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.fill(0.0);
        }
        self.write_pos = 0;
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Cloneable UI handle requesting filter swaps by name.
#[derive(Clone)]
pub struct FilterSwapHandle {
    names: Arc<Vec<&'static str>>,
    requested: Arc<AtomicUsize>,
}

impl FilterSwapHandle {
    /// Available filter names in table order.
    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    /// Requests a swap; returns false (and changes nothing) for unknown
    /// names. The audio thread adopts the request at its next control tick.
    pub fn set(&self, name: &str) -> bool {
        match self.names.iter().position(|&n| n == name) {
            Some(index) => {
                self.requested.store(index, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Name of the most recently requested filter.
    pub fn current(&self) -> &'static str {
        self.names[self.requested.load(Ordering::Acquire).min(self.names.len() - 1)]
    }
}

/// One registered router input.
struct InputRoute {
    gate: HostSlot,
}

/// The filter stage: router, strategy table, swap handling.
pub struct FilterStage {
    id: String,
    filters: Vec<Box<dyn FilterImpl>>,
    names: Arc<Vec<&'static str>>,
    active: usize,
    requested: Arc<AtomicUsize>,
    params: FilterParams,
    routes: Vec<InputRoute>,
    input: StereoBuffer,
    output: StereoBuffer,
}

impl FilterStage {
    /// Creates the stage with the built-in filter table and registers the
    /// shared filter parameters under `id`.
    pub fn new(bank: &mut ParamBank, id: &str) -> Self {
        let filters: Vec<Box<dyn FilterImpl>> = vec![
            Box::new(LadderFilter::new()),
            Box::new(HighpassFilter::new()),
            Box::new(CombFilter::new(true)),
            Box::new(CombFilter::new(false)),
        ];
        let names = Arc::new(filters.iter().map(|f| f.name()).collect::<Vec<_>>());

        Self {
            id: id.to_string(),
            names,
            active: 0,
            requested: Arc::new(AtomicUsize::new(0)),
            params: FilterParams::register(bank, id),
            routes: Vec::new(),
            input: StereoBuffer::new(0),
            output: StereoBuffer::new(0),
            filters,
        }
    }

    /// Registers an upstream source as a router input with a host gate
    /// (default off: the source reaches the output dry). Returns the
    /// route index to pair with the buffer passed to [`process`](Self::process).
    pub fn add_input(&mut self, bank: &mut ParamBank, source_id: &str) -> usize {
        let gate = bank.register_switch(&format!("{}_{}_input", self.id, source_id), false);
        self.routes.push(InputRoute { gate });
        self.routes.len() - 1
    }

    /// True if the route's gate currently feeds the filter (the source is
    /// consumed here rather than routed dry).
    pub fn route_enabled(&self, route: usize) -> bool {
        self.routes[route].gate.is_on()
    }

    /// Number of registered router inputs.
    pub fn num_inputs(&self) -> usize {
        self.routes.len()
    }

    /// Sizes buffers and prepares every filter in the table.
    pub fn prepare(&mut self, sample_rate: f32, block_len: usize) {
        self.input.resize(block_len);
        self.output.resize(block_len);
        for filter in &mut self.filters {
            filter.prepare(sample_rate);
        }
    }

    /// Clears the active filter's state.
    pub fn reset(&mut self) {
        self.filters[self.active].reset();
    }

    /// UI handle for hot-swapping the filter type.
    pub fn swap_handle(&self) -> FilterSwapHandle {
        FilterSwapHandle {
            names: Arc::clone(&self.names),
            requested: Arc::clone(&self.requested),
        }
    }

    /// Name of the filter currently processing audio.
    pub fn active_name(&self) -> &'static str {
        self.names[self.active]
    }

    /// Recomputes the active filter's coefficients, then adopts a pending
    /// swap request so the change lands on a tick boundary.
    pub fn on_control_tick(&mut self, bank: &ParamBank) {
        self.filters[self.active].on_control_tick(&self.params, bank);

        let requested = self.requested.load(Ordering::Acquire).min(self.filters.len() - 1);
        if requested != self.active {
            self.active = requested;
            self.filters[self.active].reset();
            tracing::debug!(filter = self.names[self.active], "filter swap adopted");
        }
    }

    /// Mixes every gated source into the filter input and runs the active
    /// filter over `[begin, end)`. `sources` must parallel the registered
    /// routes.
    pub fn process(&mut self, sources: &[&StereoBuffer], begin: usize, end: usize) {
        debug_assert_eq!(sources.len(), self.routes.len());

        self.input.clear_range(begin, end);
        for (route, source) in self.routes.iter().zip(sources.iter()) {
            if route.gate.is_on() {
                self.input.accumulate_range(source, begin, end);
            }
        }

        self.filters[self.active].process(&self.input, &mut self.output, begin, end);
    }

    /// The stage's output bus.
    pub fn output(&self) -> &StereoBuffer {
        &self.output
    }

    /// Grows the stage buffers (host delivered a larger block than prepared).
    pub fn resize_buffers(&mut self, block_len: usize) {
        self.input.resize(block_len);
        self.output.resize(block_len);
    }

    /// Saves the selected filter type under a child named after the stage.
    pub fn save_state(&self, node: &mut StateNode) {
        let child = node.add_child(&self.id);
        child.set_str("filterName", self.swap_handle().current());
    }

    /// Restores the filter type. Missing nodes and unknown names keep the
    /// current selection; a valid name is adopted at the next control tick.
    pub fn load_state(&mut self, node: &StateNode) {
        let Some(child) = node.child(&self.id) else {
            return;
        };
        if let Some(name) = child.str_attr("filterName")
            && !self.swap_handle().set(name)
        {
            tracing::debug!(name, "unknown filter name in state, keeping current");
        }
    }
}
