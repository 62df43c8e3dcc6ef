//! Property-based tests for label aggregation
//!
//! Random label volumes and label maps check that group masks, the combined
//! mask and the index table stay consistent with each other.

use proptest::prelude::*;
use segmesh::aggregate::{combined_mask, group_mask};
use segmesh::labels::file_stem_for;
use segmesh::mesh::extract_boundary_surface;
use segmesh::mesh::stats::signed_volume;
use segmesh::volume::nifti::{NiftiDatatype, decode_label_volume, encode_volume};
use segmesh::{Group, GroupIndexTable, LabelMap, NiftiHeader, Volume};

// ============================================================================
// Generators
// ============================================================================

/// Small volume with label ids in `0..max_label`
fn volume_strategy(max_label: u32) -> impl Strategy<Value = Volume<u32>> {
    (1usize..6, 1usize..6, 1usize..6).prop_flat_map(move |(nx, ny, nz)| {
        prop::collection::vec(0..max_label, nx * ny * nz).prop_map(move |data| {
            let dims = [nx, ny, nz];
            Volume::new(dims, data, NiftiHeader::for_dims(dims, [1.0, 1.0, 1.0])).unwrap()
        })
    })
}

/// Label map partitioning a random subset of `1..max_label` into groups
fn label_map_strategy(max_label: u32) -> impl Strategy<Value = LabelMap> {
    (
        Just((1..max_label).collect::<Vec<u32>>()).prop_shuffle(),
        prop::collection::vec(1usize..4, 1..6),
    )
        .prop_map(|(ids, sizes)| {
            let mut map = LabelMap::new();
            let mut remaining = ids.into_iter();
            for (position, size) in sizes.into_iter().enumerate() {
                let chunk: Vec<u32> = remaining.by_ref().take(size).collect();
                let group = match chunk.as_slice() {
                    [] => break,
                    [id] => Group::SingleId(*id),
                    _ => Group::composite(
                        chunk.iter().map(|id| (format!("part_{}", id), *id)),
                    ),
                };
                map.push(format!("group_{}", position), group).unwrap();
            }
            map
        })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Every voxel of a group mask is either background or the group index,
    /// and it is the index exactly where the source id belongs to the group
    #[test]
    fn test_group_mask_matches_membership(
        volume in volume_strategy(12),
        map in label_map_strategy(12),
    ) {
        for (position, (_, group)) in map.iter().enumerate() {
            let index = position as u16 + 1;
            let mask = group_mask(&volume, &group.ids(), index);
            prop_assert_eq!(mask.dims(), volume.dims());
            for (&label, &value) in volume.data().iter().zip(mask.data()) {
                let expected = if group.contains(label) { index } else { 0 };
                prop_assert_eq!(value, expected);
            }
        }
    }

    /// The combined mask is the union of the group masks
    #[test]
    fn test_combined_mask_is_union_of_groups(
        volume in volume_strategy(12),
        map in label_map_strategy(12),
    ) {
        let combined = combined_mask(&volume, &map).unwrap();
        let masks: Vec<Volume<u16>> = map
            .iter()
            .enumerate()
            .map(|(position, (_, group))| group_mask(&volume, &group.ids(), position as u16 + 1))
            .collect();

        for (i, &value) in combined.data().iter().enumerate() {
            let hits: Vec<u16> = masks
                .iter()
                .map(|mask| mask.data()[i])
                .filter(|&v| v != 0)
                .collect();
            // Ids are disjoint across groups, so at most one mask claims a voxel
            prop_assert!(hits.len() <= 1);
            prop_assert_eq!(value, hits.first().copied().unwrap_or(0));
        }
    }

    /// Indices follow label-map order and never skip
    #[test]
    fn test_index_table_is_dense_and_ordered(map in label_map_strategy(20)) {
        let table = GroupIndexTable::from_label_map(&map).unwrap();
        prop_assert_eq!(table.len(), map.len());
        prop_assert_eq!(table.max_index() as usize, map.len());
        for ((index, name), (expected, _)) in table.iter().zip(map.iter()) {
            prop_assert_eq!(name, expected);
            prop_assert!(index >= 1);
        }
        let indices: Vec<u16> = table.iter().map(|(index, _)| index).collect();
        let dense: Vec<u16> = (1..=map.len() as u16).collect();
        prop_assert_eq!(indices, dense);
    }

    /// Generated label maps always validate, and JSON preserves group order
    #[test]
    fn test_label_map_json_keeps_order(map in label_map_strategy(20)) {
        prop_assert!(map.validate().is_ok());
        let json = map.to_json_string().unwrap();
        let parsed = LabelMap::from_json_str(&json).unwrap();
        prop_assert_eq!(parsed, map);
    }

    /// Encoded volumes decode to the same voxels for every integer datatype
    /// wide enough to hold them
    #[test]
    fn test_encode_decode_preserves_labels(volume in volume_strategy(200)) {
        for datatype in [NiftiDatatype::UInt8, NiftiDatatype::Int16, NiftiDatatype::UInt32] {
            let bytes = encode_volume(&volume, datatype).unwrap();
            let decoded = decode_label_volume(&bytes).unwrap();
            prop_assert_eq!(decoded.dims(), volume.dims());
            prop_assert_eq!(decoded.data(), volume.data());
        }
    }

    /// Padding adds background only
    #[test]
    fn test_pad_keeps_histogram(volume in volume_strategy(5), margin in 0usize..3) {
        let padded = volume.pad(margin);
        let mut before = volume.histogram();
        let mut after = padded.histogram();
        let added = padded.len() - volume.len();
        prop_assert_eq!(after.remove(&0).unwrap_or(0), before.remove(&0).unwrap_or(0) + added);
        prop_assert_eq!(after, before);
    }

    /// The raw voxel surface encloses exactly one unit cube per voxel
    #[test]
    fn test_boundary_surface_volume_counts_voxels(volume in volume_strategy(3)) {
        let mesh = extract_boundary_surface(&volume, 1);
        let voxels = volume.data().iter().filter(|&&v| v == 1).count();
        prop_assert!((signed_volume(&mesh) - voxels as f64).abs() < 1e-6);
        prop_assert_eq!(mesh.is_empty(), voxels == 0);
    }

    /// Stems never contain path separators and never collapse to a directory
    /// reference
    #[test]
    fn test_file_stems_are_plain_names(name in "\\PC{1,24}") {
        let stem = file_stem_for(&name);
        prop_assert!(!stem.contains('/'));
        prop_assert!(!stem.contains('\\'));
        prop_assert!(stem != "." && stem != "..");
    }
}
