//! Benchmarks for sql2parquet
//!
//! Run with: cargo bench

use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use sql2parquet::parquet::{ColumnBuffer, RowBatch};
use sql2parquet::source::{ColumnDescriptor, ColumnType, MemoryRowSource, RowSource, SqlValue};

fn schema() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new(0, "id", ColumnType::Int64, false),
        ColumnDescriptor::new(1, "name", ColumnType::Text, true),
        ColumnDescriptor::new(
            2,
            "amount",
            ColumnType::Decimal {
                precision: 18,
                scale: 2,
            },
            true,
        ),
        ColumnDescriptor::new(3, "day", ColumnType::Date, true),
    ]
}

fn rows(count: usize) -> Vec<Vec<SqlValue>> {
    let day = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
    (0..count)
        .map(|i| {
            vec![
                SqlValue::Integer(i as i64),
                SqlValue::Text(format!("row {}", i)),
                SqlValue::Text(format!("{}.{:02}", i, i % 100)),
                SqlValue::Date(day),
            ]
        })
        .collect()
}

fn benchmark_row_batch(c: &mut Criterion) {
    let data = rows(10_000);

    c.bench_function("row_batch_10k_rows", |b| {
        b.iter(|| {
            let mut source = MemoryRowSource::new(schema(), data.clone());
            let mut batch = RowBatch::from_schema(source.column_schema()).unwrap();
            let mut sink: Vec<RecordBatch> = Vec::new();
            while source.next_row().unwrap() {
                batch.add_row(&source).unwrap();
            }
            batch.flush(&mut sink).unwrap();
            black_box(sink);
        })
    });
}

fn benchmark_decimal_cell(c: &mut Criterion) {
    let descriptor = ColumnDescriptor::new(
        0,
        "amount",
        ColumnType::Decimal {
            precision: 38,
            scale: 6,
        },
        true,
    );
    let value = SqlValue::Text("-123456789012.345678".into());

    c.bench_function("decimal_text_append", |b| {
        let mut buffer = ColumnBuffer::for_descriptor(descriptor.clone()).unwrap();
        b.iter(|| {
            buffer.append(black_box(&value)).unwrap();
            if buffer.len() >= 50_000 {
                buffer.clear();
            }
        })
    });
}

criterion_group!(benches, benchmark_row_batch, benchmark_decimal_cell);
criterion_main!(benches);
