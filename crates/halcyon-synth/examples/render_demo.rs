//! Offline render demo: play a chord through the full engine and print
//! per-block peak levels.
//!
//! Run with: cargo run -p halcyon-synth --example render_demo

use halcyon_core::StereoBuffer;
use halcyon_synth::{SynthEngine, TimedEvent};

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK: usize = 256;

fn main() {
    let mut engine = SynthEngine::new();
    engine.prepare(SAMPLE_RATE, BLOCK);

    let handles = engine.param_handles();
    handles.set_switch("filter1_osc1_input", true);
    handles.set("filter1_cutoff", 80.0);
    handles.set("filter1_resonance", 0.4);
    handles.set_switch("fx_tremolo_enable", true);
    handles.set("fx_tremolo_rate", 6.0);

    // Route LFO 1 (one-peak curve, 2 Hz) onto the filter cutoff.
    let lfo1 = engine.modulator("lfo1").expect("lfo1 exists");
    engine.add_modulation(lfo1, "filter1_cutoff");
    engine
        .modulation_mut(lfo1, "filter1_cutoff")
        .expect("link just added")
        .set_amount(0.4);
    handles.set("lfo1_frequency", 2.0);

    let chord = [
        TimedEvent::note_on(0, 1, 48, 0.9),
        TimedEvent::note_on(0, 1, 60, 0.8),
        TimedEvent::note_on(64, 1, 64, 0.8),
        TimedEvent::note_on(128, 1, 67, 0.8),
    ];

    let mut out = StereoBuffer::new(BLOCK);
    let seconds = 1.0;
    let blocks = (SAMPLE_RATE * seconds) as usize / BLOCK;

    for block in 0..blocks {
        let events: &[TimedEvent] = if block == 0 { &chord } else { &[] };
        engine.render_block(events, &mut out);

        let peak = out
            .left
            .iter()
            .chain(out.right.iter())
            .fold(0.0_f32, |acc, &s| acc.max(s.abs()));
        let bar = "#".repeat((peak * 50.0) as usize);
        println!("block {block:3}  peak {peak:.3}  {bar}");
    }

    println!(
        "active voices after {seconds}s: {}",
        engine.pool().active_voices()
    );
}
