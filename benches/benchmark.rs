use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use clausal::{FieldMap, FieldSet, FieldSets, Predicate, Record, Value};

fn set_n(n: i64) -> Predicate {
    Predicate::leaf(format!("n{}", n), FieldMap::identity(["n"]).expect("valid"), move |view| {
        view.set("n", n)?;
        Ok(true)
    })
}

// a disjunction of `width` alternatives of which only the last is accepted
fn last_of(width: i64) -> Predicate {
    let accept = Predicate::leaf("accept", FieldMap::identity(["n"]).expect("valid"), move |view| {
        Ok(view.get("n").and_then(|n| n.as_i64()) == Some(width - 1))
    });
    Predicate::any((0..width).map(set_n)).and(&accept)
}

fn nested_calls(depth: usize) -> Predicate {
    let mut goal = set_n(1);
    for _ in 0..depth {
        goal = Predicate::call("nest", goal, FieldMap::identity(["n"]).expect("valid"));
    }
    goal
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let scope = Record::new().with_null("n");

    let goal = Predicate::all((0..1_000).map(|_| Predicate::succeed()));
    c.bench_function("conjunction 1k", |b| b.iter(|| black_box(goal.solve(&scope))));

    let goal = last_of(100);
    c.bench_function("backtrack 100", |b| b.iter(|| black_box(goal.solve(&scope))));

    let goal = last_of(2_000);
    c.bench_function("backtrack 2k", |b| b.iter(|| black_box(goal.solve(&scope))));

    let goal = Predicate::any((0..1_000).map(set_n));
    c.bench_function("enumerate 1k", |b| {
        b.iter(|| black_box(goal.query(&scope).solutions().count()))
    });

    let goal = nested_calls(100);
    c.bench_function("nested calls 100", |b| b.iter(|| black_box(goal.solve(&scope))));

    let wide: Record = (0..64).map(|i| (format!("f{}", i), Some(Value::Int(i)))).collect();
    c.bench_function("clone and write 64 fields", |b| {
        b.iter(|| {
            let mut sets = FieldSets::new();
            let root = sets.keep(FieldSet::from_scope(&wide));
            let clone = sets.clone_set(root).expect("live");
            sets.write(clone, "f0", Some(Value::Int(-1))).expect("live");
            black_box(sets.read(root, "f0").cloned())
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
