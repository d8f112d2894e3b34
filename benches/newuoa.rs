use criterion::{criterion_group, criterion_main, Criterion};
use newuoa::{
    nalgebra as na, testing::*, ExitStatus, Function, Newuoa, NewuoaOptions, Optimum,
};

const TOLERANCE: f64 = 1e-6;

fn minimize<F>(f: &F, optimizer: &Newuoa<F>, x0: &na::DVector<f64>) -> Optimum<f64>
where
    F: Function<Field = f64>,
{
    let optimum = optimizer.minimize(f, x0);
    assert_eq!(optimum.status(), ExitStatus::SmallTrustRadius);
    optimum
}

fn sphere(c: &mut Criterion) {
    let f = Sphere::new(4);
    let x0 = f.initials()[0].clone_owned();
    let optimizer = Newuoa::new();

    c.bench_function("newuoa sphere 4", |b| {
        b.iter(|| assert!(minimize(&f, &optimizer, &x0).fx() < TOLERANCE))
    });
}

fn rosenbrock(c: &mut Criterion) {
    let f = ExtendedRosenbrock::new(2);
    let x0 = f.initials()[0].clone_owned();

    let mut options = NewuoaOptions::default();
    options.set_rhoend(1e-8);
    let optimizer = Newuoa::with_options(options);

    c.bench_function("newuoa rosenbrock 2", |b| {
        b.iter(|| assert!(minimize(&f, &optimizer, &x0).fx() < TOLERANCE))
    });
}

criterion_group!(benches, sphere, rosenbrock);
criterion_main!(benches);
