//! Throughput of in-place fake quantization.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use fakequant_core::{
    ElementFormat, HostTensor, QuantizationRequest, apply_fake_quantization, quantize_in_place,
};
use std::hint::black_box;

fn create_benchmark_buffer(size: usize) -> Vec<f32> {
    (0..size).map(|i| (i as f32 - size as f32 / 2.0) / (size as f32 / 4.0)).collect()
}

fn bench_quantize_in_place(c: &mut Criterion) {
    let mut group = c.benchmark_group("quantize_in_place");

    for size in [1024, 16384, 262144] {
        let original = create_benchmark_buffer(size);
        group.throughput(Throughput::Elements(size as u64));

        for format in [ElementFormat::TruncatedHalf16, ElementFormat::Half16] {
            group.bench_with_input(BenchmarkId::new(format.name(), size), &size, |b, _| {
                let mut data = original.clone();
                b.iter(|| {
                    data.copy_from_slice(&original);
                    quantize_in_place(black_box(&mut data), format).unwrap();
                    black_box(&data);
                })
            });
        }
    }

    group.finish();
}

fn bench_partial_coverage(c: &mut Criterion) {
    let size = 65536;
    let original = create_benchmark_buffer(size);
    let mut group = c.benchmark_group("apply_coverage");

    for coverage in [0.25f32, 0.5, 1.0] {
        let request =
            QuantizationRequest::new(ElementFormat::TruncatedHalf16).with_coverage(coverage);
        group.bench_with_input(BenchmarkId::from_parameter(coverage), &coverage, |b, _| {
            let mut tensor = HostTensor::anonymous(original.clone());
            b.iter(|| {
                tensor.data.copy_from_slice(&original);
                black_box(apply_fake_quantization(&mut tensor, black_box(&request)).unwrap());
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_quantize_in_place, bench_partial_coverage);
criterion_main!(benches);
