//! Shared utilities for export tests
//!
//! Builds small synthetic segmentations on disk and provides a mesh converter
//! that records its calls instead of meshing.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use segmesh::volume::nifti::{NiftiDatatype, write_volume};
use segmesh::{GroupIndexTable, MeshConverter, MeshParams, MeshSummary, NiftiHeader, Volume};

/// Create a label volume of `dims` with the given voxels set
pub fn label_volume(
    dims: [usize; 3],
    spacing: [f32; 3],
    voxels: &[([usize; 3], u32)],
) -> Volume<u32> {
    let header = NiftiHeader::for_dims(dims, spacing);
    let mut volume = Volume::filled(dims, 0u32, header);
    for &([x, y, z], label) in voxels {
        volume.set(x, y, z, label);
    }
    volume
}

/// Fill an axis-aligned box `[min, min + size)` with `label`
pub fn fill_box(volume: &mut Volume<u32>, min: [usize; 3], size: [usize; 3], label: u32) {
    for z in min[2]..min[2] + size[2] {
        for y in min[1]..min[1] + size[1] {
            for x in min[0]..min[0] + size[0] {
                volume.set(x, y, z, label);
            }
        }
    }
}

/// Write a label volume as `.nii.gz` with 16-bit storage
pub fn write_segmentation(path: &Path, volume: &Volume<u32>) {
    write_volume(path, volume, NiftiDatatype::UInt16).unwrap();
}

/// Segmentation with a 2x2x2 block of each of the labels 1, 3 and 5 and one
/// block of the unmapped label 7, separated by background
pub fn three_block_segmentation() -> Volume<u32> {
    let mut volume = label_volume([12, 4, 4], [1.5, 1.5, 2.0], &[]);
    fill_box(&mut volume, [0, 1, 1], [2, 2, 2], 1);
    fill_box(&mut volume, [3, 1, 1], [2, 2, 2], 3);
    fill_box(&mut volume, [6, 1, 1], [2, 2, 2], 5);
    fill_box(&mut volume, [9, 1, 1], [2, 2, 2], 7);
    volume
}

/// One call received by [`RecordingConverter`]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// `volume_to_single_mesh`
    Single {
        volume_path: PathBuf,
        mesh_path: PathBuf,
        label: u16,
        params: MeshParams,
    },
    /// `volume_to_hierarchical_scene`
    Scene {
        volume_path: PathBuf,
        scene_path: PathBuf,
        groups: Vec<(u16, String)>,
    },
}

/// Mesh converter that records calls and writes nothing
#[derive(Debug, Default)]
pub struct RecordingConverter {
    calls: Mutex<Vec<Call>>,
}

impl RecordingConverter {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

impl MeshConverter for RecordingConverter {
    fn volume_to_single_mesh(
        &self,
        volume_path: &Path,
        mesh_path: &Path,
        label: u16,
        params: &MeshParams,
    ) -> segmesh::Result<MeshSummary> {
        assert!(volume_path.exists(), "mask must be written before meshing");
        self.calls.lock().unwrap().push(Call::Single {
            volume_path: volume_path.to_path_buf(),
            mesh_path: mesh_path.to_path_buf(),
            label,
            params: *params,
        });
        Ok(MeshSummary::default())
    }

    fn volume_to_hierarchical_scene(
        &self,
        volume_path: &Path,
        scene_path: &Path,
        groups: &GroupIndexTable,
        _params: &MeshParams,
    ) -> segmesh::Result<MeshSummary> {
        assert!(volume_path.exists(), "combined mask must be written before meshing");
        self.calls.lock().unwrap().push(Call::Scene {
            volume_path: volume_path.to_path_buf(),
            scene_path: scene_path.to_path_buf(),
            groups: groups
                .iter()
                .map(|(index, name)| (index, name.to_string()))
                .collect(),
        });
        Ok(MeshSummary::default())
    }
}
