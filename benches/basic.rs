use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use refptr::{Backend, Counted, Ref, Referable, Tracked, Uncounted};

fn bench_backend<B: Backend>(c: &mut Criterion, name: &str) {
    c.bench_function(&format!("mint_and_drop/{name}"), |b| {
        let owner = Referable::<u32, B>::new(0);

        b.iter(|| {
            drop(black_box(owner.make_ref()));
        });
    });

    c.bench_function(&format!("clone_and_drop/{name}"), |b| {
        let owner = Referable::<u32, B>::new(0);
        let rp = owner.make_ref();

        b.iter(|| {
            drop(black_box(rp.clone()));
        });
    });

    c.bench_function(&format!("deref/{name}"), |b| {
        let owner = Referable::<u32, B>::new(1);
        let rp: Ref<u32, B> = owner.make_ref();

        b.iter(|| **black_box(&rp) + 1);
    });

    c.bench_function(&format!("churn/{name}"), |b| {
        let owner = Referable::<u32, B>::new(0);

        b.iter(|| {
            let refs = (0..64).map(|_| owner.make_ref()).collect::<Vec<_>>();
            black_box(&refs);
        });
    });
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("mint_and_drop/raw_pointer", |b| {
        let value = Box::new(0u32);

        b.iter(|| {
            black_box(&*value as *const u32);
        });
    });

    bench_backend::<Uncounted>(c, "uncounted");
    bench_backend::<Counted>(c, "counted");
    bench_backend::<Tracked>(c, "tracked");
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
