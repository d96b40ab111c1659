//! Per-sample value smoothers.
//!
//! Control values (pitch bend, mod wheel, modulated parameter targets)
//! change at control rate but are consumed every sample; smoothing bridges
//! the two clocks without zipper noise.
//!
//! Two flavours:
//!
//! - [`SmoothedParam`] — exponential (one-pole lowpass) approach, natural
//!   decay, used for MIDI controller values.
//! - [`LinearSmoothedParam`] — fixed-duration linear ramp, restarted at
//!   every retarget, used for modulated parameter targets where the ramp
//!   must land exactly.

use libm::expf;

/// A value with exponential (one-pole lowpass) smoothing.
///
/// # Example
///
/// ```rust
/// use halcyon_core::SmoothedParam;
///
/// let mut bend = SmoothedParam::with_config(0.0, 48000.0, 10.0);
/// bend.set_target(1.0);
/// for _ in 0..4800 {
///     bend.advance();
/// }
/// assert!((bend.get() - 1.0).abs() < 0.01);
/// ```
#[derive(Debug, Clone)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    /// One-pole coefficient (1.0 = instant).
    coeff: f32,
    sample_rate: f32,
    smoothing_time_ms: f32,
}

impl SmoothedParam {
    /// Creates a smoothed value; smoothing is instant until configured.
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            coeff: 1.0,
            sample_rate: 48000.0,
            smoothing_time_ms: 0.0,
        }
    }

    /// Creates a smoothed value with sample rate and time constant.
    pub fn with_config(initial: f32, sample_rate: f32, smoothing_time_ms: f32) -> Self {
        let mut param = Self::new(initial);
        param.sample_rate = sample_rate;
        param.smoothing_time_ms = smoothing_time_ms;
        param.recalculate_coeff();
        param
    }

    /// Sets the value the smoother approaches.
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Sets target and snaps to it immediately.
    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.target = value;
        self.current = value;
    }

    /// Updates the sample rate, keeping the time constant.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.recalculate_coeff();
    }

    /// Sets the smoothing time constant in milliseconds (0 = instant).
    pub fn set_smoothing_time_ms(&mut self, time_ms: f32) {
        self.smoothing_time_ms = time_ms;
        self.recalculate_coeff();
    }

    /// Advances one sample and returns the smoothed value.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        self.current += self.coeff * (self.target - self.current);
        self.current
    }

    /// Returns the current value without advancing.
    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }

    /// Returns the target value.
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// coeff = 1 - exp(-1 / (tau * sample_rate)), tau in seconds.
    fn recalculate_coeff(&mut self) {
        if self.smoothing_time_ms <= 0.0 || self.sample_rate <= 0.0 {
            self.coeff = 1.0;
        } else {
            let samples = self.smoothing_time_ms / 1000.0 * self.sample_rate;
            self.coeff = 1.0 - expf(-1.0 / samples);
        }
    }
}

impl Default for SmoothedParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// A value with fixed-duration linear ramping.
///
/// Every [`set_target`](Self::set_target) restarts a ramp from the current
/// value that lands exactly on the target after the configured transition
/// time. Retargeting faster than the ramp completes (the control-rate tick
/// case) simply re-aims the remaining ramp.
#[derive(Debug, Clone)]
pub struct LinearSmoothedParam {
    current: f32,
    target: f32,
    increment: f32,
    samples_remaining: u32,
    sample_rate: f32,
    transition_time_ms: f32,
}

impl LinearSmoothedParam {
    /// Creates a linear smoother holding `initial`.
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            increment: 0.0,
            samples_remaining: 0,
            sample_rate: 48000.0,
            transition_time_ms: 0.0,
        }
    }

    /// Creates a linear smoother with sample rate and ramp duration.
    pub fn with_config(initial: f32, sample_rate: f32, transition_time_ms: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            increment: 0.0,
            samples_remaining: 0,
            sample_rate,
            transition_time_ms,
        }
    }

    /// Starts a ramp from the current value to `target`. Re-aiming at the
    /// target already in flight leaves the running ramp untouched.
    pub fn set_target(&mut self, target: f32) {
        if (target - self.target).abs() < 1e-9 {
            return;
        }

        self.target = target;
        let samples = (self.transition_time_ms / 1000.0 * self.sample_rate) as u32;
        if samples == 0 {
            self.current = target;
            self.increment = 0.0;
            self.samples_remaining = 0;
        } else {
            self.increment = (target - self.current) / samples as f32;
            self.samples_remaining = samples;
        }
    }

    /// Sets the value immediately, cancelling any ramp.
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.increment = 0.0;
        self.samples_remaining = 0;
    }

    /// Updates the sample rate (affects future ramps).
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// Sets the ramp duration in milliseconds.
    pub fn set_transition_time_ms(&mut self, time_ms: f32) {
        self.transition_time_ms = time_ms;
    }

    /// Advances one sample and returns the ramped value.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        if self.samples_remaining > 0 {
            self.current += self.increment;
            self.samples_remaining -= 1;
            if self.samples_remaining == 0 {
                self.current = self.target;
            }
        }
        self.current
    }

    /// Returns the current value without advancing.
    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }

    /// Returns the target value.
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }
}

impl Default for LinearSmoothedParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}
