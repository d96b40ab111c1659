//! Integration tests for the halcyon signal core.
//!
//! Covers voice allocation, round-robin stealing, modulation summing,
//! control-rate decoupling, sample-accurate event timing, and state
//! persistence.

use halcyon_core::{ParamBank, StateNode, StereoBuffer};
use halcyon_synth::envelope::{Envelope, EnvelopeStage};
use halcyon_synth::{MidiMessage, POLYPHONY, SynthEngine, TimedEvent};

use proptest::prelude::*;

const SR: f32 = 48000.0;
const BLOCK: usize = 256;

fn prepared_engine() -> SynthEngine {
    let mut engine = SynthEngine::new();
    engine.prepare(SR, BLOCK);
    engine
}

fn render_silence(engine: &mut SynthEngine, blocks: usize) {
    let mut out = StereoBuffer::new(BLOCK);
    for _ in 0..blocks {
        engine.render_block(&[], &mut out);
    }
}

// ---------------------------------------------------------------------------
// 1. Voice allocation
// ---------------------------------------------------------------------------

#[test]
fn note_on_off_leaves_all_voices_free() {
    let mut engine = prepared_engine();
    let mut out = StereoBuffer::new(BLOCK);

    engine.render_block(
        &[
            TimedEvent::note_on(0, 1, 60, 0.8),
            TimedEvent::note_on(0, 1, 64, 0.8),
        ],
        &mut out,
    );
    assert_eq!(engine.pool().active_voices(), 2);

    engine.render_block(
        &[
            TimedEvent::note_off(0, 1, 60),
            TimedEvent::note_off(0, 1, 64),
        ],
        &mut out,
    );

    // The release tail is 10 ms = 480 samples; two more blocks cover it.
    render_silence(&mut engine, 2);
    assert_eq!(engine.pool().active_voices(), 0);
    assert!(engine.pool().voice_notes().iter().all(|&n| n == -1));
}

#[test]
fn round_robin_steals_the_first_allocated_slot() {
    let mut engine = prepared_engine();
    let mut out = StereoBuffer::new(BLOCK);

    let events: Vec<TimedEvent> = (0..POLYPHONY as u8)
        .map(|i| TimedEvent::note_on(0, 1, 60 + i, 0.8))
        .collect();
    engine.render_block(&events, &mut out);
    assert_eq!(engine.pool().active_voices(), POLYPHONY);

    // One more distinct note with no intervening note-off: strict cyclic
    // order dictates the first-allocated voice is replaced.
    engine.render_block(&[TimedEvent::note_on(0, 1, 100, 0.8)], &mut out);
    assert_eq!(engine.pool().voice_notes()[0], 100);
    assert_eq!(engine.pool().active_voices(), POLYPHONY);
}

#[test]
fn velocity_zero_note_on_releases_the_note() {
    let mut engine = prepared_engine();
    let mut out = StereoBuffer::new(BLOCK);

    engine.render_block(&[TimedEvent::note_on(0, 1, 60, 0.8)], &mut out);
    engine.render_block(
        &[TimedEvent::new(
            0,
            MidiMessage::NoteOn {
                channel: 1,
                note: 60,
                velocity: 0.0,
            },
        )],
        &mut out,
    );
    render_silence(&mut engine, 2);
    assert_eq!(engine.pool().active_voices(), 0);
}

// ---------------------------------------------------------------------------
// 2. Sample-accurate event timing
// ---------------------------------------------------------------------------

#[test]
fn note_takes_effect_at_its_exact_offset() {
    let mut engine = prepared_engine();
    let mut out = StereoBuffer::new(BLOCK);

    engine.render_block(&[TimedEvent::note_on(128, 1, 69, 1.0)], &mut out);

    let before: f32 = out.left[..128].iter().map(|s| s.abs()).sum();
    let after: f32 = out.left[128..].iter().map(|s| s.abs()).sum();
    assert_eq!(before, 0.0, "no audio before the note-on offset");
    assert!(after > 0.0, "audio from the note-on offset");
}

#[test]
fn malformed_offsets_are_clamped_not_fatal() {
    let mut engine = prepared_engine();
    let mut out = StereoBuffer::new(BLOCK);

    // Out-of-range and decreasing offsets: defensively clamped.
    engine.render_block(
        &[
            TimedEvent::note_on(9999, 1, 60, 0.8),
            TimedEvent::note_on(10, 1, 64, 0.8),
        ],
        &mut out,
    );
    assert_eq!(engine.pool().active_voices(), 2);
}

// ---------------------------------------------------------------------------
// 3. Control-rate decoupling
// ---------------------------------------------------------------------------

/// Sub-block splitting at event boundaries must not change the rendered
/// signal: a no-op event mid-block forces a split, output stays identical.
#[test]
fn mid_block_split_does_not_alter_the_output() {
    let note = [TimedEvent::note_on(0, 1, 69, 0.9)];

    let mut plain = prepared_engine();
    let mut out_plain = StereoBuffer::new(BLOCK);
    plain.render_block(&note, &mut out_plain);
    plain.render_block(&[], &mut out_plain);

    let mut split = prepared_engine();
    let mut out_split = StereoBuffer::new(BLOCK);
    split.render_block(&note, &mut out_split);
    // CC 7 is ignored by the engine; its only effect is forcing the
    // render span to split at offset 131.
    let noop = [TimedEvent::new(
        131,
        MidiMessage::ControlChange {
            channel: 1,
            controller: 7,
            value: 0.3,
        },
    )];
    split.render_block(&noop, &mut out_split);

    assert_eq!(out_plain.left, out_split.left);
    assert_eq!(out_plain.right, out_split.right);
}

/// Different host block sizes walk the same control-tick grid: rendering
/// 512 samples as 1x512 or 4x128 produces the identical signal.
#[test]
fn block_size_does_not_alter_the_output() {
    let mut whole = prepared_engine();
    whole.prepare(SR, 512);
    let mut out_whole = StereoBuffer::new(512);
    whole.render_block(&[TimedEvent::note_on(0, 1, 69, 0.9)], &mut out_whole);

    let mut chunked = prepared_engine();
    chunked.prepare(SR, 512);
    let mut collected = Vec::new();
    let mut out_chunk = StereoBuffer::new(128);
    for i in 0..4 {
        let events = if i == 0 {
            vec![TimedEvent::note_on(0, 1, 69, 0.9)]
        } else {
            vec![]
        };
        chunked.render_block(&events, &mut out_chunk);
        collected.extend_from_slice(&out_chunk.left);
    }

    assert_eq!(out_whole.left, collected);
}

// ---------------------------------------------------------------------------
// 4. Modulation routing
// ---------------------------------------------------------------------------

/// Base 0.5 plus unipolar links of 0.3 and 0.2 from sources at full
/// output clamps to exactly 1.0 in normalized space.
#[test]
fn modulation_contributions_sum_within_the_clamp() {
    let mut engine = prepared_engine();

    // lfo1 on a square curve at 0 Hz holds output 1.0 at phase 0;
    // the mod wheel is driven to 1.0 by CC1.
    engine.lfo_line("lfo1").unwrap().init_square();
    let lfo1 = engine.modulator("lfo1").unwrap();
    let wheel = engine.modulator("wheel").unwrap();

    // osc1_semitone: range -48..48, default 0 => base normalized 0.5.
    assert!(engine.add_modulation(lfo1, "osc1_semitone"));
    assert!(engine.add_modulation(wheel, "osc1_semitone"));
    engine
        .modulation_mut(lfo1, "osc1_semitone")
        .unwrap()
        .set_amount(0.3);
    engine
        .modulation_mut(wheel, "osc1_semitone")
        .unwrap()
        .set_amount(0.2);

    let mut out = StereoBuffer::new(BLOCK);
    engine.render_block(
        &[TimedEvent::new(
            0,
            MidiMessage::ControlChange {
                channel: 1,
                controller: 1,
                value: 1.0,
            },
        )],
        &mut out,
    );

    let key = engine.params().key_of("osc1_semitone").unwrap();
    assert_eq!(engine.params().normalized_target(key), 1.0);
    assert_eq!(engine.params().target(key), 48.0);
}

#[test]
fn duplicate_links_and_missing_removals_are_noops() {
    let mut engine = prepared_engine();
    let lfo1 = engine.modulator("lfo1").unwrap();

    assert!(engine.add_modulation(lfo1, "filter1_cutoff"));
    engine
        .modulation_mut(lfo1, "filter1_cutoff")
        .unwrap()
        .set_amount(0.7);
    assert!(engine.add_modulation(lfo1, "filter1_cutoff"));

    let key = engine.params().key_of("filter1_cutoff").unwrap();
    assert_eq!(engine.params().links(key).len(), 1);
    assert!((engine.params().links(key)[0].amount - 0.7).abs() < 1e-6);

    engine.remove_modulation(lfo1, "filter1_cutoff");
    engine.remove_modulation(lfo1, "filter1_cutoff");
    assert!(engine.params().links(key).is_empty());

    assert!(!engine.add_modulation(lfo1, "no_such_param"));
}

#[test]
fn pitch_bend_changes_the_rendered_pitch() {
    let mut bent = prepared_engine();
    let mut straight = prepared_engine();
    let mut out_bent = StereoBuffer::new(BLOCK);
    let mut out_straight = StereoBuffer::new(BLOCK);

    let note = TimedEvent::note_on(0, 1, 69, 0.9);
    straight.render_block(&[note], &mut out_straight);
    bent.render_block(
        &[
            note,
            TimedEvent::new(
                0,
                MidiMessage::PitchBend {
                    channel: 1,
                    amount: 1.0,
                },
            ),
        ],
        &mut out_bent,
    );

    // Let the bend smoother act, then compare a later block.
    bent.render_block(&[], &mut out_bent);
    straight.render_block(&[], &mut out_straight);
    assert_ne!(out_bent.left, out_straight.left);
}

// ---------------------------------------------------------------------------
// 5. Envelope properties
// ---------------------------------------------------------------------------

proptest! {
    /// Attack output is non-decreasing, release output is non-increasing,
    /// and the output stays in [0, 1] for any AHDSR combination.
    #[test]
    fn envelope_output_is_monotonic_and_bounded(
        attack_ms in 0.0_f32..2000.0,
        hold_ms in 0.0_f32..500.0,
        decay_ms in 0.0_f32..2000.0,
        sustain in 0.0_f32..1.0,
        release_ms in 0.0_f32..2000.0,
    ) {
        let mut bank = ParamBank::new();
        let mut env = Envelope::new(&mut bank, "env");
        bank.prepare(SR);
        env.prepare(SR);

        let handles = bank.handles().clone();
        handles.set("env_attack", attack_ms);
        handles.set("env_hold", hold_ms);
        handles.set("env_decay", decay_ms);
        handles.set("env_sustain", sustain);
        handles.set("env_release", release_ms);
        bank.control_tick(&[]);

        env.note_on();
        let mut last = 0.0_f32;
        for _ in 0..2000 {
            let v = env.on_control_tick(120, &bank);
            prop_assert!((0.0..=1.0).contains(&v), "out of range: {}", v);
            if env.stage() == EnvelopeStage::Attack {
                prop_assert!(v >= last, "attack decreased: {} -> {}", last, v);
            }
            last = v;
        }

        env.note_off();
        let mut last = 1.0_f32;
        for _ in 0..2000 {
            let v = env.on_control_tick(120, &bank);
            prop_assert!((0.0..=1.0).contains(&v), "out of range: {}", v);
            prop_assert!(v <= last + 1e-6, "release increased: {} -> {}", last, v);
            last = v;
        }
    }
}

// ---------------------------------------------------------------------------
// 6. State persistence
// ---------------------------------------------------------------------------

#[test]
fn engine_state_round_trips_through_toml() {
    let mut engine = prepared_engine();

    engine.lfo_line("lfo1").unwrap().init_saw_down();
    let lfo1 = engine.modulator("lfo1").unwrap();
    engine.add_modulation(lfo1, "filter1_cutoff");
    let link = engine.modulation_mut(lfo1, "filter1_cutoff").unwrap();
    link.set_amount(-0.6);
    link.bipolar = true;
    engine.filter_swap_handle().set("comb-");
    engine.effects_order_handle().move_to("flanger", 1);

    let text = engine.save_state().to_toml().expect("encode");
    let node = StateNode::from_toml(&text).expect("decode");

    let mut restored = prepared_engine();
    restored.load_state(&node);

    // Link graph.
    let key = restored.params().key_of("filter1_cutoff").unwrap();
    let links = restored.params().links(key);
    assert_eq!(links.len(), 1);
    assert!((links[0].amount - (-0.6)).abs() < 1e-6);
    assert!(links[0].bipolar);

    // Filter selection is adopted on the first control tick.
    let mut out = StereoBuffer::new(BLOCK);
    restored.render_block(&[], &mut out);
    assert_eq!(restored.active_filter(), "comb-");

    // Effect order.
    assert_eq!(
        restored.effects_order_handle().order(),
        vec!["tremolo", "flanger"]
    );

    // LFO curve (saw-down has 2 points).
    assert_eq!(restored.lfo_line("lfo1").unwrap().len(), 2);
}

#[test]
fn loading_empty_state_changes_nothing() {
    let mut engine = prepared_engine();
    let lfo1 = engine.modulator("lfo1").unwrap();
    engine.add_modulation(lfo1, "filter1_cutoff");

    engine.load_state(&StateNode::new());

    let key = engine.params().key_of("filter1_cutoff").unwrap();
    assert_eq!(engine.params().links(key).len(), 1);
    assert_eq!(engine.active_filter(), "ladder");
}

// ---------------------------------------------------------------------------
// 7. Router and chain end to end
// ---------------------------------------------------------------------------

#[test]
fn router_gate_moves_the_oscillator_through_the_filter() {
    let mut engine = prepared_engine();
    let handles = engine.param_handles();

    // Fully closed ladder on the filter path makes the difference audible:
    // dry-routed output keeps full bandwidth, filtered output is damped.
    handles.set("filter1_cutoff", handles.descriptor("filter1_cutoff").unwrap().range.min);

    let mut out_dry = StereoBuffer::new(BLOCK);
    engine.render_block(&[TimedEvent::note_on(0, 1, 69, 1.0)], &mut out_dry);
    let dry_level: f32 = out_dry.left.iter().map(|s| s.abs()).sum();
    assert!(dry_level > 0.0);

    let mut engine2 = prepared_engine();
    let handles2 = engine2.param_handles();
    handles2.set(
        "filter1_cutoff",
        handles2.descriptor("filter1_cutoff").unwrap().range.min,
    );
    handles2.set_switch("filter1_osc1_input", true);

    let mut out_filtered = StereoBuffer::new(BLOCK);
    engine2.render_block(&[TimedEvent::note_on(0, 1, 69, 1.0)], &mut out_filtered);
    let filtered_level: f32 = out_filtered.left.iter().map(|s| s.abs()).sum();

    assert!(
        filtered_level < dry_level,
        "a 10 Hz ladder must damp the signal: {filtered_level} vs {dry_level}"
    );
}

#[test]
fn enabled_effect_changes_the_output() {
    let note = [TimedEvent::note_on(0, 1, 69, 0.9)];

    let mut plain = prepared_engine();
    let mut out_plain = StereoBuffer::new(BLOCK);
    plain.render_block(&note, &mut out_plain);

    let mut wet = prepared_engine();
    wet.param_handles().set_switch("fx_tremolo_enable", true);
    wet.param_handles().set("fx_tremolo_depth", 1.0);
    let mut out_wet = StereoBuffer::new(BLOCK);
    wet.render_block(&note, &mut out_wet);

    assert_ne!(out_plain.left, out_wet.left);
}
