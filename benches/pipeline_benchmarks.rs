//! Export pipeline benchmarks using Criterion.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::DMatrix;

use motion_eval_rs::export::{EvaluationAccumulator, PredictionRecord, RecordOrigin};
use motion_eval_rs::{
    AgentSlot, Batch, BatchExporter, DuplicatePolicy, ForwardOutput, ModelShape, Pose,
    RigidTransform, Sample, TrackId,
};

/// Benchmark-sized shape: 64 slots, 6 candidates, 80 future steps.
fn shape() -> ModelShape {
    ModelShape {
        max_agents: 64,
        num_candidates: 6,
        future_len: 80,
        history_len: 1,
    }
}

/// Create a batch where every slot is occupied and half are agents of interest.
fn create_batch(batch_size: usize, shape: &ModelShape) -> Batch {
    let samples = (0..batch_size)
        .map(|b| {
            let slots = (0..shape.max_agents)
                .map(|a| {
                    let id = TrackId::from_raw((a + 1) as i64).expect("non-zero id");
                    AgentSlot::anchored(id, Pose::new([a as f64, -(a as f64)], 0.01 * a as f64))
                })
                .collect();
            let interest = (0..shape.max_agents / 2)
                .map(|a| TrackId::from_raw((2 * a + 1) as i64))
                .collect();
            Sample::new(b as i64, Pose::new([100.0, 50.0], 0.3), slots, interest).expect("valid sample")
        })
        .collect();
    Batch::new(samples)
}

fn benchmark_rigid_transform_apply(c: &mut Criterion) {
    let transform = RigidTransform::build([12.0, -4.0], 0.7).expect("valid transform");
    let points = DMatrix::from_fn(6 * 80, 2, |i, j| (i * 2 + j) as f64 * 0.1);

    c.bench_function("rigid_transform_apply_480_points", |b| {
        b.iter(|| transform.apply(black_box(&points)).expect("valid points"))
    });
}

fn benchmark_batch_export(c: &mut Criterion) {
    let shape = shape();
    let batch = create_batch(16, &shape);
    let output = ForwardOutput::zeros(batch.len(), &shape);
    let exporter = BatchExporter::new(shape, DuplicatePolicy::KeepFirst);

    c.bench_function("batch_export_16x64", |b| {
        b.iter(|| exporter.export(black_box(&batch), black_box(&output)).expect("valid batch"))
    });
}

fn benchmark_finalize_and_serialize(c: &mut Criterion) {
    let records: Vec<PredictionRecord> = (0..1000)
        .map(|i| PredictionRecord {
            timestamp: (i / 10) as i64,
            track_id: TrackId::from_raw((i % 10 + 1) as i64).expect("non-zero id"),
            coords: ndarray::Array3::from_elem((6, 80, 2), 0.25 * i as f64),
            logits: vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
            origin: RecordOrigin::Predicted,
        })
        .collect();

    c.bench_function("finalize_and_serialize_1000_records", |b| {
        b.iter(|| {
            let mut acc = EvaluationAccumulator::new(6, 80);
            acc.expect(records.len());
            for record in records.iter().rev() {
                acc.append(record.clone()).expect("valid record");
            }
            acc.finalize().expect("full coverage").to_csv_string().expect("utf-8")
        })
    });
}

criterion_group!(
    benches,
    benchmark_rigid_transform_apply,
    benchmark_batch_export,
    benchmark_finalize_and_serialize,
);
criterion_main!(benches);
