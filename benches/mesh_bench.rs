// Copyright 2024 insight3d contributors under the terms of the MIT License as
// detailed in the accompanying file README.md or <https://opensource.org/licenses/MIT>.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use rand::SeedableRng;

use insight3d_core::config::Config;
use insight3d_core::geo::{GeoStore, ShotHandle, VertexType};
use insight3d_core::{act, topo};

criterion_group!(benches, mesh_benches);
criterion_main!(benches);

/// Builds a shot with a `side x side` grid of reconstructed vertices marked
/// on it, flat in the `z = 0` plane, image positions spread evenly across
/// `[0, 1]^2`.
fn grid_shot(side: usize) -> (GeoStore, ShotHandle) {
    let mut store = GeoStore::new();
    let shot = store.add_shot("bench", 1920, 1080);
    for i in 0..side {
        for j in 0..side {
            let x = i as f64 / (side - 1) as f64;
            let y = j as f64 / (side - 1) as f64;
            let vertex = store.add_vertex(VertexType::Auto);
            store.set_vertex_coords(vertex, (x, y, 0.0)).unwrap();
            store.add_point(shot, vertex, x, y).unwrap();
        }
    }
    (store, shot)
}

fn mesh_benches(c: &mut Criterion) {
    c.bench_function("topo, reconstruct_surface, 20x20 grid", |b| {
        let config = Config::default();
        b.iter_batched_ref(
            || grid_shot(20),
            |(store, shot)| topo::reconstruct_surface(store, *shot, &config),
            BatchSize::SmallInput,
        );
    });

    let mut slow_group = c.benchmark_group("slow");
    slow_group.sample_size(10);

    slow_group.bench_function("topo, reconstruct_surface, 60x60 grid", |b| {
        let config = Config::default();
        b.iter_batched_ref(
            || grid_shot(60),
            |(store, shot)| topo::reconstruct_surface(store, *shot, &config),
            BatchSize::SmallInput,
        );
    });

    slow_group.bench_function("nrm, compute_normals, 30x30 grid", |b| {
        let config = Config {
            normal_knn_k: 12,
            ..Config::default()
        };
        b.iter_batched_ref(
            || {
                let (mut store, shot) = grid_shot(30);
                // give every vertex a calibrated observer to orient against
                let p = insight3d_core::mvg::linalg::Mat3x4::from_krt(
                    cgmath::Matrix3::new(1000.0, 0.0, 0.0, 0.0, 1000.0, 0.0, 960.0, 540.0, 1.0),
                    cgmath::Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0),
                    cgmath::Vector3::new(0.0, 0.0, -5.0),
                );
                store.shot_mut(shot).unwrap().calibration = Some(insight3d_core::geo::Calibration::from_projection(p).unwrap());
                (store, ())
            },
            |(store, ())| {
                let mut rng = rand::rngs::StdRng::seed_from_u64(1);
                act::compute_normals(store, &config, &mut rng)
            },
            BatchSize::SmallInput,
        );
    });
}
