use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use segmesh::aggregate::{combined_mask, group_mask};
use segmesh::mesh::{cluster_vertices, extract_boundary_surface, taubin_smooth};
use segmesh::volume::nifti::{NiftiDatatype, decode_label_volume, encode_volume};
use segmesh::{LabelMap, NiftiHeader, Volume};

/// Generate a cubic segmentation with nested shells of labels 1..=shells
fn generate_volume(size: usize, shells: u32) -> Volume<u32> {
    let dims = [size, size, size];
    let header = NiftiHeader::for_dims(dims, [1.0, 1.0, 1.0]);
    let mut volume = Volume::filled(dims, 0u32, header);

    let centre = size as f64 / 2.0;
    let radius = centre * 0.9;
    for z in 0..size {
        for y in 0..size {
            for x in 0..size {
                let d = ((x as f64 - centre).powi(2)
                    + (y as f64 - centre).powi(2)
                    + (z as f64 - centre).powi(2))
                .sqrt();
                if d < radius {
                    let shell = ((d / radius) * shells as f64) as u32 + 1;
                    volume.set(x, y, z, shell.min(shells));
                }
            }
        }
    }
    volume
}

fn bench_group_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_mask");

    for &size in &[32usize, 64, 128] {
        let volume = generate_volume(size, 8);
        group.bench_with_input(BenchmarkId::new("voxels", size * size * size), &volume, |b, volume| {
            b.iter(|| black_box(group_mask(volume, &[2, 4, 6], 1)));
        });
    }

    group.finish();
}

fn bench_combined_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("combined_mask");
    let labels = LabelMap::from_json_str(
        r#"{"core": 1, "inner": {"a": 2, "b": 3}, "middle": {"a": 4, "b": 5, "c": 6}, "outer": {"a": 7, "b": 8}}"#,
    )
    .unwrap();

    for &size in &[32usize, 64] {
        let volume = generate_volume(size, 8);
        group.bench_with_input(BenchmarkId::new("voxels", size * size * size), &volume, |b, volume| {
            b.iter(|| black_box(combined_mask(volume, &labels).unwrap()));
        });
    }

    group.finish();
}

fn bench_surface(c: &mut Criterion) {
    let mut group = c.benchmark_group("surface");
    group.sample_size(10);

    let volume = generate_volume(64, 1);
    group.bench_function("extract", |b| {
        b.iter(|| black_box(extract_boundary_surface(&volume, 1)));
    });

    let raw = extract_boundary_surface(&volume, 1);
    group.bench_function("smooth_20", |b| {
        b.iter(|| {
            let mut mesh = raw.clone();
            taubin_smooth(&mut mesh, 0.5, 20);
            black_box(mesh)
        });
    });
    group.bench_function("reduce_half", |b| {
        b.iter(|| black_box(cluster_vertices(&raw, 0.5)));
    });

    group.finish();
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("nifti");
    let volume = generate_volume(96, 8);
    let encoded = encode_volume(&volume, NiftiDatatype::UInt16).unwrap();

    group.bench_function("encode_u16", |b| {
        b.iter(|| black_box(encode_volume(&volume, NiftiDatatype::UInt16).unwrap()));
    });
    group.bench_function("decode_u16", |b| {
        b.iter(|| black_box(decode_label_volume(&encoded).unwrap()));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_group_mask,
    bench_combined_mask,
    bench_surface,
    bench_codec
);
criterion_main!(benches);
