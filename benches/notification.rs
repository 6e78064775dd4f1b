use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use notify_bench::sync::{Notification, SuspendFlag, Wake};
use std::thread;

fn signal_poll(c: &mut Criterion) {
    let ntfn = Notification::new();
    c.bench_function("notification signal+poll", |b| {
        b.iter(|| {
            ntfn.signal();
            black_box(ntfn.poll())
        })
    });
}

fn ping_pong(c: &mut Criterion) {
    let ping = Notification::new();
    let pong = Notification::new();
    let suspend = SuspendFlag::new();

    let echo = {
        let (ping, pong, suspend) = (ping.clone(), pong.clone(), suspend.clone());
        thread::spawn(move || {
            while ping.wait_or_suspend(&suspend) == Wake::Signalled {
                pong.signal();
            }
        })
    };

    c.bench_function("notification cross-thread round trip", |b| {
        b.iter(|| {
            ping.signal();
            pong.wait();
        })
    });

    suspend.raise();
    echo.join().ok();
}

criterion_group!(benches, signal_poll, ping_pong);
criterion_main!(benches);
