//! Mesh artifacts written by the default surface converter

mod common;

use std::fs::{self, File};
use std::io::Read;

use common::{fill_box, label_volume, three_block_segmentation, write_segmentation};
use segmesh::mesh::stats::signed_volume;
use segmesh::writer::package::MODEL_PATH;
use segmesh::writer::read_stl;
use segmesh::{ExportConfig, LabelAggregator, LabelMap, MeshParams};
use tempfile::tempdir;
use zip::ZipArchive;

fn run_export(labels: &str, params: MeshParams) -> (tempfile::TempDir, ExportConfig) {
    let dir = tempdir().unwrap();
    let config = ExportConfig::from_data_dir(dir.path())
        .with_label_map(LabelMap::from_json_str(labels).unwrap())
        .with_mesh_params(params);
    write_segmentation(config.input(), &three_block_segmentation());
    LabelAggregator::new(config.clone()).run().unwrap();
    (dir, config)
}

fn read_model(config: &ExportConfig) -> String {
    let file = File::open(config.mesh_dir().join("combined.3mf")).unwrap();
    let mut archive = ZipArchive::new(file).unwrap();
    let mut xml = String::new();
    archive
        .by_name(MODEL_PATH)
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

#[test]
fn test_stl_header_matches_triangle_count() {
    let (_dir, config) = run_export(r#"{"A": 1}"#, MeshParams::default());
    let bytes = fs::read(config.mesh_dir().join("A.stl")).unwrap();

    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    assert!(count > 0);
    assert_eq!(bytes.len(), 84 + count * 50);
    assert!(!bytes.starts_with(b"solid"));

    let mesh = read_stl(config.mesh_dir().join("A.stl")).unwrap();
    assert_eq!(mesh.triangles.len(), count);
}

#[test]
fn test_raw_surface_is_a_closed_box_in_world_units() {
    let (_dir, config) = run_export(r#"{"A": 1}"#, MeshParams::raw());
    let mesh = read_stl(config.mesh_dir().join("A.stl")).unwrap();

    // A 2x2x2 block has 24 boundary faces, two triangles each
    assert_eq!(mesh.triangles.len(), 48);

    // Spacing 1.5 x 1.5 x 2.0 mm
    let expected = 2.0 * 1.5 * 2.0 * 1.5 * 2.0 * 2.0;
    let volume = signed_volume(&mesh);
    assert!((volume - expected).abs() < 1e-3, "volume {}", volume);

    // Voxel centres sit on lattice points; the block spans x in [-0.5, 1.5]
    // voxels before the margin shift restores world positions
    let (min, max) = mesh.bounds().unwrap();
    assert!((min[0] - -0.75).abs() < 1e-4);
    assert!((max[0] - 2.25).abs() < 1e-4);
    assert!((min[2] - 1.0).abs() < 1e-4);
    assert!((max[2] - 5.0).abs() < 1e-4);
}

#[test]
fn test_reduction_lowers_triangle_count() {
    let dir = tempdir().unwrap();
    let mut volume = label_volume([20, 20, 20], [1.0, 1.0, 1.0], &[]);
    fill_box(&mut volume, [3, 3, 3], [14, 14, 14], 1);

    let labels = LabelMap::from_json_str(r#"{"cube": 1}"#).unwrap();
    let raw = ExportConfig::from_data_dir(dir.path())
        .with_label_map(labels.clone())
        .with_mesh_params(MeshParams::raw());
    write_segmentation(raw.input(), &volume);
    let full = LabelAggregator::new(raw.clone()).run().unwrap();

    let reduced = raw
        .clone()
        .with_mesh_dir(dir.path().join("reduced"))
        .with_mesh_params(MeshParams::raw().with_reduction(0.75));
    let less = LabelAggregator::new(reduced).run().unwrap();

    let before = full.groups[0].mesh.triangles;
    let after = less.groups[0].mesh.triangles;
    assert!(after > 0);
    assert!(after < before, "{} !< {}", after, before);
}

#[test]
fn test_scene_has_one_object_per_group_under_one_root() {
    let (_dir, config) = run_export(
        r#"{"A": 1, "B": {"b1": 3, "b2": 5}, "ghost": 99}"#,
        MeshParams::default(),
    );
    let xml = read_model(&config);

    assert!(xml.contains("name=\"A\""));
    assert!(xml.contains("name=\"B\""));
    assert!(!xml.contains("name=\"ghost\""));

    // Two parts and the root
    assert_eq!(xml.matches("<object ").count(), 3);
    assert_eq!(xml.matches("<component ").count(), 2);
    assert_eq!(xml.matches("<item ").count(), 1);
    assert!(xml.contains("<object id=\"4\" type=\"model\" name=\"combined\">"));
    assert!(xml.contains("<item objectid=\"4\"/>"));
    assert!(xml.contains("unit=\"millimeter\""));
}

#[test]
fn test_scene_package_parts() {
    let (_dir, config) = run_export(r#"{"A": 1}"#, MeshParams::default());
    let file = File::open(config.mesh_dir().join("combined.3mf")).unwrap();
    let archive = ZipArchive::new(file).unwrap();

    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["3D/3dmodel.model", "[Content_Types].xml", "_rels/.rels"]);
}

#[test]
fn test_group_meshes_match_scene_parts() {
    let (_dir, config) = run_export(r#"{"A": 1, "B": {"b1": 3, "b2": 5}}"#, MeshParams::raw());
    let a = read_stl(config.mesh_dir().join("A.stl")).unwrap();
    let b = read_stl(config.mesh_dir().join("B.stl")).unwrap();

    let xml = read_model(&config);
    let triangles = xml.matches("<triangle ").count();
    assert_eq!(triangles, a.triangles.len() + b.triangles.len());
}

#[test]
fn test_scene_without_voxels_has_no_objects() {
    let (_dir, config) = run_export(r#"{"ghost": 99}"#, MeshParams::default());
    let xml = read_model(&config);

    assert_eq!(xml.matches("<object ").count(), 0);
    assert_eq!(xml.matches("<component").count(), 0);
    assert_eq!(xml.matches("<item ").count(), 0);
    assert!(xml.contains("<resources/>"));
    assert!(xml.contains("<build/>"));

    // The group STL is still written, with zero triangles
    let bytes = fs::read(config.mesh_dir().join("ghost.stl")).unwrap();
    assert_eq!(bytes.len(), 84);
}
