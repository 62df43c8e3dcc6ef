//! Label volumes and their spatial metadata
//!
//! A [`Volume`] is a dense 3D grid stored with x varying fastest, paired with
//! the NIfTI header it was read from (or will be written with). The header's
//! affine maps voxel indices to world coordinates; operations that change the
//! index space, such as [`Volume::pad`], keep that mapping consistent.

pub mod nifti;

use std::collections::BTreeMap;

use nalgebra::{Matrix4, Point3};

pub use nifti::{NiftiDatatype, NiftiHeader, SpatialUnit};

use crate::error::{Error, Result};

/// Dense 3D voxel grid with spatial metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    dims: [usize; 3],
    data: Vec<T>,
    header: NiftiHeader,
}

impl<T: Copy + Default> Volume<T> {
    /// Create a volume from voxel data in x-fastest order
    pub fn new(dims: [usize; 3], data: Vec<T>, header: NiftiHeader) -> Result<Self> {
        let expected = dims[0] * dims[1] * dims[2];
        if data.len() != expected {
            return Err(Error::InvalidVolume(format!(
                "dimensions {:?} need {} voxels, got {}",
                dims,
                expected,
                data.len()
            )));
        }
        Ok(Self { dims, data, header })
    }

    /// Create a volume with every voxel set to `value`
    pub fn filled(dims: [usize; 3], value: T, header: NiftiHeader) -> Self {
        Self {
            dims,
            data: vec![value; dims[0] * dims[1] * dims[2]],
            header,
        }
    }

    /// Extent along x, y and z
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Number of voxels
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the volume has no voxels
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Voxel data in x-fastest order
    pub fn data(&self) -> &[T] {
        &self.data
    }

    /// Mutable voxel data in x-fastest order
    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Spatial metadata
    pub fn header(&self) -> &NiftiHeader {
        &self.header
    }

    /// Mutable spatial metadata
    ///
    /// Dimensions and datatype are rewritten on save, so only descriptive
    /// and spatial fields matter here.
    pub fn header_mut(&mut self) -> &mut NiftiHeader {
        &mut self.header
    }

    /// Linear index of voxel `(x, y, z)`
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + self.dims[0] * (y + self.dims[1] * z)
    }

    /// Voxel value, or `None` outside the grid
    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<T> {
        if x < self.dims[0] && y < self.dims[1] && z < self.dims[2] {
            Some(self.data[self.index(x, y, z)])
        } else {
            None
        }
    }

    /// Voxel value with signed coordinates; outside the grid reads as default
    pub fn get_or_default(&self, x: isize, y: isize, z: isize) -> T {
        if x < 0 || y < 0 || z < 0 {
            return T::default();
        }
        self.get(x as usize, y as usize, z as usize)
            .unwrap_or_default()
    }

    /// Set a voxel; coordinates outside the grid are ignored
    pub fn set(&mut self, x: usize, y: usize, z: usize, value: T) {
        if x < self.dims[0] && y < self.dims[1] && z < self.dims[2] {
            let index = self.index(x, y, z);
            self.data[index] = value;
        }
    }

    /// Create a volume of the same shape and metadata with mapped voxels
    pub fn map<U, F>(&self, f: F) -> Volume<U>
    where
        U: Copy + Default,
        F: FnMut(&T) -> U,
    {
        Volume {
            dims: self.dims,
            data: self.data.iter().map(f).collect(),
            header: self.header.clone(),
        }
    }

    /// Create a zero-filled volume with the same shape and metadata
    pub fn zeros_like<U: Copy + Default>(&self) -> Volume<U> {
        Volume::filled(self.dims, U::default(), self.header.clone())
    }

    /// Surround the volume with `margin` voxels of background
    ///
    /// The header origin moves by `-margin` voxels so that every original
    /// voxel keeps its world position.
    pub fn pad(&self, margin: usize) -> Volume<T> {
        if margin == 0 {
            return self.clone();
        }

        let [nx, ny, nz] = self.dims;
        let dims = [nx + 2 * margin, ny + 2 * margin, nz + 2 * margin];
        let mut padded = Volume::filled(dims, T::default(), self.header.clone());

        for z in 0..nz {
            for y in 0..ny {
                let src = self.index(0, y, z);
                let dst = padded.index(margin, y + margin, z + margin);
                padded.data[dst..dst + nx].copy_from_slice(&self.data[src..src + nx]);
            }
        }

        let shift = -(margin as f64);
        padded.header.shift_origin([shift, shift, shift]);
        padded.header.set_dims(dims);
        padded
    }

    /// Voxel-to-world transform
    pub fn affine(&self) -> Matrix4<f64> {
        self.header.affine()
    }

    /// World position of a (possibly fractional) voxel coordinate
    pub fn voxel_to_world(&self, voxel: [f64; 3]) -> Point3<f64> {
        self.affine()
            .transform_point(&Point3::new(voxel[0], voxel[1], voxel[2]))
    }
}

impl<T: Copy + Default + Ord> Volume<T> {
    /// Count voxels per distinct value, in ascending value order
    pub fn histogram(&self) -> BTreeMap<T, usize> {
        let mut counts = BTreeMap::new();
        for &value in &self.data {
            *counts.entry(value).or_insert(0) += 1;
        }
        counts
    }
}

impl Volume<u32> {
    /// Read a NIfTI-1 label volume (`.nii` or `.nii.gz`)
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        nifti::read_label_volume(path)
    }
}
