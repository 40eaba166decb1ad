//! Performance benchmarks for fitsync-engine

use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fitsync_engine::{
    decode_documents,
    reconcile::{fold_remote, merge},
    ChatMessage, Document, Sender, SyncRecord, WorkoutLogEntry,
};

fn logs(count: usize, offset: usize) -> Vec<WorkoutLogEntry> {
    let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..count)
        .map(|i| WorkoutLogEntry::new(format!("Exercise {}", i + offset), 10, day))
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for size in [10, 100, 500].iter() {
        // Half of the remote records overlap the local ones
        let local = logs(*size, 0);
        let remote = logs(*size, size / 2);

        group.bench_with_input(BenchmarkId::new("workout_logs", size), size, |b, _| {
            b.iter(|| merge(black_box(&local), black_box(&remote)))
        });
    }

    for size in [10, 100].iter() {
        let local: Vec<ChatMessage> = (0..*size)
            .map(|i| ChatMessage::new(format!("l{}", i), format!("message {}", i), Sender::User))
            .collect();
        let remote: Vec<ChatMessage> = (0..*size)
            .map(|i| ChatMessage::new(format!("r{}", i), format!("message {}", i), Sender::User))
            .collect();

        group.bench_with_input(BenchmarkId::new("chat_logs", size), size, |b, _| {
            b.iter(|| merge(black_box(&local), black_box(&remote)))
        });
    }

    group.finish();
}

fn bench_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("fold");

    for size in [100, 500].iter() {
        let current = logs(*size, 0);
        let mut reversed = current.clone();
        reversed.reverse();

        group.bench_with_input(BenchmarkId::new("unchanged", size), size, |b, _| {
            b.iter(|| fold_remote(black_box(&current), black_box(reversed.clone())))
        });
    }

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    let entries = logs(500, 0);
    group.bench_function("encode_local", |b| {
        b.iter(|| WorkoutLogEntry::encode_local(black_box(&entries)))
    });

    let text = WorkoutLogEntry::encode_local(&entries).unwrap();
    group.bench_function("decode_local", |b| {
        b.iter(|| WorkoutLogEntry::decode_local(black_box(&text)))
    });

    let docs: Vec<Document> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| Document::new(format!("doc-{}", i), e.to_document_data().unwrap()))
        .collect();
    group.bench_function("decode_documents", |b| {
        b.iter(|| decode_documents::<WorkoutLogEntry>(black_box(&docs)))
    });

    group.finish();
}

criterion_group!(benches, bench_merge, bench_fold, bench_serialization);
criterion_main!(benches);
