use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use home_valuation::explainability::{ShapExplainer, TreeExplainer};
use home_valuation::training::{LightGBMConfig, LightGBMRegressor, RandomForest, Regressor, RidgeRegression};
use ndarray::{Array1, Array2};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;

fn create_regression_data(n_rows: usize, n_features: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f64>() * 10.0);
    // Target as a weighted sum of features + noise
    let y = Array1::from_shape_fn(n_rows, |i| {
        x.row(i).iter().enumerate().map(|(j, v)| (j + 1) as f64 * v).sum::<f64>() + rng.gen::<f64>() * 0.1
    });
    (x, y)
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("training");
    group.sample_size(10); // Fewer samples for training benchmarks

    for n_rows in [1000, 5000].iter() {
        let (x, y) = create_regression_data(*n_rows, 20);

        group.bench_with_input(BenchmarkId::new("ridge", n_rows), &(&x, &y), |b, (x, y)| {
            b.iter(|| {
                let mut model = RidgeRegression::new(1.0);
                Regressor::fit(&mut model, black_box(x), black_box(y)).unwrap()
            })
        });

        group.bench_with_input(BenchmarkId::new("random_forest", n_rows), &(&x, &y), |b, (x, y)| {
            b.iter(|| {
                let mut model = RandomForest::new(50).with_max_depth(Some(10)).with_random_state(1);
                Regressor::fit(&mut model, black_box(x), black_box(y)).unwrap()
            })
        });

        group.bench_with_input(BenchmarkId::new("lightgbm", n_rows), &(&x, &y), |b, (x, y)| {
            b.iter(|| {
                let mut model = LightGBMRegressor::new(LightGBMConfig {
                    n_estimators: 100,
                    ..Default::default()
                });
                model.fit(black_box(x), black_box(y)).unwrap()
            })
        });
    }

    group.finish();
}

fn bench_tree_shap(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_shap");

    let (x, y) = create_regression_data(2000, 20);
    let mut forest = RandomForest::new(50).with_max_depth(Some(10)).with_random_state(1);
    Regressor::fit(&mut forest, &x, &y).unwrap();
    let names: Vec<String> = (0..20).map(|j| format!("feature_{}", j)).collect();

    for n_rows in [10, 100].iter() {
        let (rows, _) = create_regression_data(*n_rows, 20);
        let explainer = TreeExplainer::from_forest(&forest, 20).unwrap();
        group.bench_with_input(BenchmarkId::new("forest", n_rows), &rows, |b, rows| {
            b.iter(|| explainer.explain(black_box(rows), &names).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_training, bench_tree_shap);
criterion_main!(benches);
