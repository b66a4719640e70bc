use std::rc::Rc;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use porter_ml::builders::build_pipeline;
use porter_ml::config::Config;
use porter_ml::format::{Framework, Precision};
use porter_ml::sample::{Dataloader, JsonDataloader};

fn loader() -> Rc<dyn Dataloader> {
    Rc::new(JsonDataloader::from_samples(Vec::new()))
}

fn bench_graph_build(c: &mut Criterion) {
    // The widest default graph: every Torch target, both jit types,
    // three precisions, checks and dumps on.
    let mut config = Config::new(Framework::Torch, "model.pt");
    config.target_precisions = vec![Precision::Fp32, Precision::Fp16, Precision::Int8];

    c.bench_function("build_torch_pipeline", |b| {
        b.iter(|| build_pipeline(black_box(&config), loader()).unwrap())
    });

    let pipeline = build_pipeline(&config, loader()).unwrap();
    c.bench_function("execution_order", |b| {
        b.iter(|| black_box(&pipeline).execution_order().unwrap())
    });
}

criterion_group!(benches, bench_graph_build);
criterion_main!(benches);
