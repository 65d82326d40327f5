use criterion::{criterion_group, criterion_main};

use glam::Vec3A;
use raystream_rs::bvh::{Bvh, QuadBatch, QuadMesh, QueryFlags};
use raystream_rs::spatial::Ray;

/// A camera facing a quad grid, one primary ray per pixel
fn camera_rays(side: u32, width: usize, height: usize) -> Vec<Ray> {
    let center = Vec3A::new(side as f32 / 2., side as f32 / 2., 0.);
    let origin = center + Vec3A::new(0., 0., -2. * side as f32);
    let span = 1.5 * side as f32;
    let bottom_left = center - Vec3A::new(span / 2., span / 2., 0.);

    let mut rays = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let target = bottom_left
                + Vec3A::new(
                    span * x as f32 / width as f32,
                    span * y as f32 / height as f32,
                    0.,
                );
            rays.push(Ray::new(origin, (target - origin).normalize()));
        }
    }
    rays
}

fn criterion_benchmark(c: &mut criterion::Criterion) {
    let side = 128;
    let mut mesh = QuadMesh::new(0);
    for y in 0..=side {
        for x in 0..=side {
            mesh.push_vertex(Vec3A::new(x as f32, y as f32, 0.));
        }
    }
    let stride = side + 1;
    for y in 0..side {
        for x in 0..side {
            let base = y * stride + x;
            mesh.push_quad([base, base + 1, base + stride + 1, base + stride]);
        }
    }
    let bvh: Bvh<QuadBatch> = Bvh::from_quad_mesh(&mesh).ok().unwrap();
    let rays = camera_rays(side, 256, 256);

    c.bench_function("stream intersect", |b| {
        b.iter(|| {
            let mut stream = rays.clone();
            bvh.intersect(&mut stream, QueryFlags::default());
        })
    });

    c.bench_function("stream intersect robust", |b| {
        b.iter(|| {
            let mut stream = rays.clone();
            bvh.intersect(&mut stream, QueryFlags::robust());
        })
    });

    c.bench_function("stream occluded", |b| {
        b.iter(|| {
            let mut stream = rays.clone();
            bvh.occluded(&mut stream, QueryFlags::default());
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
