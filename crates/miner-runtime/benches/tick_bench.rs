use criterion::{black_box, criterion_group, criterion_main, Criterion};
use miner_core::EngineConfig;
use miner_econ::fresh_state;
use miner_runtime::{Ledger, Scheduler};

fn bench_ticks(c: &mut Criterion) {
    let cfg = EngineConfig::default();
    let mut state = fresh_state(0, &cfg);
    state.points = 1e6;
    for id in ["mining-drill", "mining-multiplier", "energy-regen-1", "energy-efficiency"] {
        if let Some(u) = state.upgrade_mut(id) {
            u.level = 5;
        }
    }
    state.is_mining = true;

    c.bench_function("mining_tick", |b| {
        let mut ledger = Ledger::new(state.clone(), cfg);
        b.iter(|| {
            let report = ledger.mining_tick();
            if report.halted {
                ledger = Ledger::new(state.clone(), cfg);
            }
            black_box(report)
        })
    });

    c.bench_function("scheduler_one_minute", |b| {
        b.iter(|| {
            let mut ledger = Ledger::new(state.clone(), cfg);
            let mut sched = Scheduler::new(cfg.ticks);
            sched.sync(ledger.state(), 0);
            black_box(sched.advance(&mut ledger, 60_000).len())
        })
    });
}

criterion_group!(benches, bench_ticks);
criterion_main!(benches);
