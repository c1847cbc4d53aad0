use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use tacho_core::mocks::RecordingDriver;
use tacho_core::{DecoderCfg, EncoderDecoder, RegulationMode, Tacho};

const TICK_US: u64 = 2_000;

fn running(regulation: RegulationMode) -> Tacho {
    let mut t = Tacho::builder()
        .with_driver(RecordingDriver::default())
        .build()
        .expect("build tacho");
    t.set_regulation_mode(regulation);
    t.set_duty_cycle_sp(60);
    t.set_speed_sp(500);
    t.set_ramp_up_sp(200);
    t.set_run(true);
    t
}

// One edge and one tick per 2 ms period, 1000 periods.
fn drive(t: &mut Tacho) -> i32 {
    let decoder = t.decoder();
    for k in 1..=1_000u64 {
        decoder.on_edge(k % 2 == 0, k % 2 == 0, k * TICK_US);
        t.tick_at(k * TICK_US + 1);
    }
    t.position()
}

pub fn bench_tick(c: &mut Criterion) {
    let mut g = c.benchmark_group("tick");
    // Allow quick tweaking without CLI flags (Criterion 0.5):
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p tacho_core --bench tick
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(1));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }

    for (name, regulation) in [("open_loop", RegulationMode::Off), ("regulated", RegulationMode::On)] {
        g.bench_function(name, |b| {
            b.iter_batched(
                || running(regulation),
                |mut t| black_box(drive(&mut t)),
                BatchSize::SmallInput,
            )
        });
    }

    g.bench_function("edge_handler", |b| {
        let d = EncoderDecoder::new(&DecoderCfg::default());
        let mut ts = 0u64;
        b.iter(|| {
            ts += 1_000;
            d.on_edge(black_box(true), black_box(true), ts);
        })
    });
    g.finish();
}

criterion_group!(tick, bench_tick);
criterion_main!(tick);
