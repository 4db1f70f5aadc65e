#![cfg(feature = "memory-store")]

use course_guard::{
    Actor, ActorId, Decision, Document, DocumentId, EngineBuilder, MemoryLookup, ResourceName, Role,
};
use futures::executor::block_on;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Instant;

const REPEATS: usize = 5;

fn benchmark_sync<F>(name: &str, iterations: usize, mut op: F)
where
    F: FnMut(),
{
    let mut samples = Vec::with_capacity(REPEATS);

    for _ in 0..REPEATS {
        let start = Instant::now();
        for _ in 0..iterations {
            op();
        }
        samples.push(start.elapsed());
    }

    samples.sort_unstable();
    let median = samples[REPEATS / 2];
    let total_ms = median.as_secs_f64() * 1_000.0;
    let ns_per_op = median.as_secs_f64() * 1_000_000_000.0 / iterations as f64;
    let ops_per_sec = iterations as f64 / median.as_secs_f64();

    println!(
        "{name}: median={total_ms:.3} ms, ns/op={ns_per_op:.1}, ops/s={ops_per_sec:.0} (iters={iterations}, repeats={REPEATS})"
    );
}

fn benchmark_parallel<F>(name: &str, threads: usize, iterations_per_thread: usize, op_factory: F)
where
    F: Fn() -> Box<dyn FnMut() + Send> + Send + Sync + 'static,
{
    let op_factory = Arc::new(op_factory);
    let mut samples = Vec::with_capacity(REPEATS);

    for _ in 0..REPEATS {
        let start = Instant::now();
        let mut joins = Vec::with_capacity(threads);
        for _ in 0..threads {
            let factory = Arc::clone(&op_factory);
            joins.push(std::thread::spawn(move || {
                let mut op = factory();
                for _ in 0..iterations_per_thread {
                    op();
                }
            }));
        }
        for join in joins {
            join.join().expect("thread panicked");
        }
        samples.push(start.elapsed());
    }

    samples.sort_unstable();
    let median = samples[REPEATS / 2];
    let total_ops = threads * iterations_per_thread;
    let total_ms = median.as_secs_f64() * 1_000.0;
    let ns_per_op = median.as_secs_f64() * 1_000_000_000.0 / total_ops as f64;
    let ops_per_sec = total_ops as f64 / median.as_secs_f64();

    println!(
        "{name}: median={total_ms:.3} ms, ns/op={ns_per_op:.1}, ops/s={ops_per_sec:.0} (threads={threads}, total_ops={total_ops}, repeats={REPEATS})"
    );
}

fn doc(id: &str) -> Document {
    Document::new(DocumentId::try_from(id).unwrap())
}

fn actor(id: &str, role: Role) -> Actor {
    Actor::authenticated(ActorId::try_from(id).unwrap(), role)
}

fn setup_catalog() -> (MemoryLookup, Document) {
    let lookup = MemoryLookup::new();
    let enrollment = doc("s1_c1")
        .with("userId", "s1")
        .with("courseId", "c1")
        .with("progress", 0);
    lookup.insert(
        ResourceName::try_from("courses").unwrap(),
        doc("c1").with("instructorId", "i1").with("status", "published"),
    );
    lookup.insert(
        ResourceName::try_from("enrollments").unwrap(),
        enrollment.clone(),
    );
    (lookup, enrollment)
}

#[test]
#[ignore = "manual performance test; run with --ignored --nocapture"]
fn perf_policy_evaluation() {
    let iterations = 200_000;

    let (lookup, enrollment) = setup_catalog();
    let engine = EngineBuilder::new(lookup).build();
    let student = actor("s1", Role::Student);
    let instructor = actor("i1", Role::Instructor);
    let progress = enrollment.clone().with("progress", 50);

    benchmark_sync("read_owner_field", iterations, || {
        let decision = block_on(engine.read(&student, "enrollments", &enrollment));
        black_box(decision);
    });

    benchmark_sync("read_instructor_lookup", iterations, || {
        let decision = block_on(engine.read(&instructor, "enrollments", &enrollment));
        black_box(decision);
    });

    benchmark_sync("update_field_diff", iterations, || {
        let decision = block_on(engine.update(&student, "enrollments", &enrollment, &progress));
        black_box(decision);
    });

    benchmark_sync("read_unknown_type", iterations, || {
        let decision = block_on(engine.read(&student, "secretCollection", &enrollment));
        black_box(decision);
    });

    let threads = std::thread::available_parallelism()
        .map(|n| n.get().min(8))
        .unwrap_or(4);
    let iterations_per_thread = 50_000;

    let (lookup, enrollment) = setup_catalog();
    let engine = Arc::new(EngineBuilder::new(lookup).build());
    let warm = block_on(engine.update(&student, "enrollments", &enrollment, &progress));
    assert_eq!(warm, Decision::Allow);

    let engine_for_parallel = Arc::clone(&engine);
    benchmark_parallel(
        "update_field_diff_parallel",
        threads,
        iterations_per_thread,
        move || {
            let engine = Arc::clone(&engine_for_parallel);
            let student = student.clone();
            let enrollment = enrollment.clone();
            let progress = progress.clone();
            Box::new(move || {
                let decision =
                    block_on(engine.update(&student, "enrollments", &enrollment, &progress));
                black_box(decision);
            })
        },
    );
}
