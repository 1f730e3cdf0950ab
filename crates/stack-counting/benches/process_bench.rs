// Classification and strategy processing on synthetic piles
//
// Run with: cargo bench --bench process_bench

use carton_count_common::Rect;
use carton_count_stack::{
    BoxRoi, Layer, LayerClusterer, PileRoi, StackCountingConfig, StackProcessorFactory, TemplateLayers,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// `layers` rows of `per_layer` boxes; the top row is two boxes short
fn synthetic_boxes(layers: usize, per_layer: usize) -> Vec<BoxRoi> {
    let mut boxes = Vec::with_capacity(layers * per_layer);
    for l in 0..layers {
        let n = if l == 0 { per_layer.saturating_sub(2) } else { per_layer };
        let y = 50.0 + l as f32 * 90.0;
        for i in 0..n {
            let x = 10.0 + i as f32 * 60.0;
            let jitter = (i % 3) as f32 * 3.0;
            boxes.push(BoxRoi::new(
                Rect::new(x, y + jitter, x + 55.0, y + jitter + 80.0).expect("valid box"),
            ));
        }
    }
    boxes
}

fn bench_process(c: &mut Criterion) {
    let factory = StackProcessorFactory::new(StackCountingConfig::default()).expect("default config");
    let clusterer = LayerClusterer::default();
    let mut group = c.benchmark_group("process");

    for (layers, per_layer) in [(3, 10), (6, 20), (12, 40)] {
        let boxes = synthetic_boxes(layers, per_layer);
        let clustered: Vec<Layer> = clusterer.cluster(boxes.clone());
        let template = TemplateLayers::new(vec![per_layer as u32; layers]);
        let pile = PileRoi::new(
            Rect::new(0.0, 0.0, 20.0 + per_layer as f32 * 60.0, 100.0 + layers as f32 * 90.0)
                .expect("valid pile"),
        );
        let name = format!("{layers}x{per_layer}");

        group.bench_with_input(BenchmarkId::new("cluster", &name), &boxes, |b, boxes| {
            b.iter(|| black_box(clusterer.cluster(black_box(boxes.clone()))));
        });

        group.bench_with_input(BenchmarkId::new("classify_and_count", &name), &clustered, |b, layers| {
            b.iter(|| black_box(factory.process(black_box(layers.clone()), &template, pile)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_process);
criterion_main!(benches);
