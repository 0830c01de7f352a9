use criterion::{black_box, criterion_group, criterion_main, Criterion};
use netkit::ws::frame::apply_mask;

fn bench_unmask(c: &mut Criterion) {
    let mut group = c.benchmark_group("unmask");
    for size in [8usize, 64, 1024, 65536] {
        let payload = vec![0xAAu8; size];
        group.bench_with_input(format!("{size}b"), &payload, |b, payload| {
            b.iter(|| {
                let mut buf = payload.clone();
                apply_mask(black_box(&mut buf), black_box([0x11, 0x22, 0x33, 0x44]));
                black_box(buf);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_unmask);
criterion_main!(benches);
