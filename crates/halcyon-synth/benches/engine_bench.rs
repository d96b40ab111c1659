//! Criterion benchmarks for the halcyon signal core
//!
//! Run with: cargo bench -p halcyon-synth

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use halcyon_core::{ParamBank, SmoothedParam, StereoBuffer};
use halcyon_synth::{SynthEngine, TimedEvent, VoicePool};

const SAMPLE_RATE: f32 = 48000.0;
const BLOCK_SIZES: &[usize] = &[64, 128, 256, 512, 1024];

// ============================================================================
// Voice pool benchmarks
// ============================================================================

fn bench_voice_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("VoicePool");

    for &block_size in BLOCK_SIZES {
        let mut bank = ParamBank::new();
        let mut pool = VoicePool::new(&mut bank, "osc1");
        bank.prepare(SAMPLE_RATE);
        pool.prepare(SAMPLE_RATE, block_size);
        let mut bend = SmoothedParam::new(0.0);

        for note in [60, 64, 67, 71, 74, 77, 81, 84] {
            pool.note_on(1, note, 0.8);
        }

        group.bench_with_input(
            BenchmarkId::new("full_polyphony", block_size),
            &block_size,
            |b, &size| {
                b.iter(|| {
                    pool.clear_output();
                    pool.process(&mut bank, &mut bend, 0, size);
                    black_box(pool.output().left[size - 1])
                })
            },
        );
    }

    group.finish();
}

// ============================================================================
// Full engine benchmarks
// ============================================================================

fn bench_engine_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("SynthEngine");

    for &block_size in BLOCK_SIZES {
        let mut engine = SynthEngine::new();
        engine.prepare(SAMPLE_RATE, block_size);
        engine.param_handles().set_switch("filter1_osc1_input", true);
        engine.param_handles().set_switch("fx_flanger_enable", true);

        let chord: Vec<TimedEvent> = [60u8, 64, 67, 71]
            .iter()
            .map(|&n| TimedEvent::note_on(0, 1, n, 0.8))
            .collect();
        let mut out = StereoBuffer::new(block_size);
        engine.render_block(&chord, &mut out);

        group.bench_with_input(
            BenchmarkId::new("render_block", block_size),
            &block_size,
            |b, &size| {
                b.iter(|| {
                    engine.render_block(&[], &mut out);
                    black_box(out.left[size - 1])
                })
            },
        );
    }

    group.finish();
}

fn bench_engine_event_storm(c: &mut Criterion) {
    let mut group = c.benchmark_group("SynthEngine_Events");

    let mut engine = SynthEngine::new();
    engine.prepare(SAMPLE_RATE, 512);
    let mut out = StereoBuffer::new(512);

    // Alternating note on/off pairs spread through the block.
    let events: Vec<TimedEvent> = (0..16)
        .map(|i| {
            let offset = i * 32;
            let note = 48 + (i as u8 % 12);
            if i % 2 == 0 {
                TimedEvent::note_on(offset, 1, note, 0.8)
            } else {
                TimedEvent::note_off(offset, 1, note)
            }
        })
        .collect();

    group.bench_function("16_events_per_block", |b| {
        b.iter(|| {
            engine.render_block(&events, &mut out);
            black_box(out.left[511])
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_voice_pool,
    bench_engine_render,
    bench_engine_event_storm
);
criterion_main!(benches);
