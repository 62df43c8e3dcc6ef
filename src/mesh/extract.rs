//! Boundary surface extraction
//!
//! Every face between a voxel carrying the label and a voxel that does not
//! (or the outside of the grid) becomes a quad split into two triangles.
//! Quad corners sit on the voxel lattice; a lattice point `(i, j, k)` is the
//! corner shared by voxels `(i-1..=i, j-1..=j, k-1..=k)`, which in voxel-centre
//! coordinates is `(i - 0.5, j - 0.5, k - 0.5)`.

use std::collections::HashMap;

use super::{Mesh, Triangle, Vertex};
use crate::volume::Volume;

/// Corner offsets of each face quad, ordered counter-clockwise seen from
/// outside the voxel, with the neighbour offset that decides visibility
const FACES: [([isize; 3], [[usize; 3]; 4]); 6] = [
    ([1, 0, 0], [[1, 0, 0], [1, 1, 0], [1, 1, 1], [1, 0, 1]]),
    ([-1, 0, 0], [[0, 0, 0], [0, 0, 1], [0, 1, 1], [0, 1, 0]]),
    ([0, 1, 0], [[0, 1, 0], [0, 1, 1], [1, 1, 1], [1, 1, 0]]),
    ([0, -1, 0], [[0, 0, 0], [1, 0, 0], [1, 0, 1], [0, 0, 1]]),
    ([0, 0, 1], [[0, 0, 1], [1, 0, 1], [1, 1, 1], [0, 1, 1]]),
    ([0, 0, -1], [[0, 0, 0], [0, 1, 0], [1, 1, 0], [1, 0, 0]]),
];

/// Extract the closed boundary surface of all voxels equal to `label`
///
/// Vertices are in voxel-centre coordinates and shared between adjacent
/// faces. The output is deterministic: voxels are visited in storage order
/// and vertices are numbered in order of first use.
pub fn extract_boundary_surface<T>(volume: &Volume<T>, label: T) -> Mesh
where
    T: Copy + Default + PartialEq,
{
    let [nx, ny, nz] = volume.dims();
    let mut mesh = Mesh::new();
    let mut lattice: HashMap<[usize; 3], usize> = HashMap::new();

    let mut corner_index = |mesh: &mut Mesh, corner: [usize; 3]| -> usize {
        *lattice.entry(corner).or_insert_with(|| {
            mesh.vertices.push(Vertex::new(
                corner[0] as f64 - 0.5,
                corner[1] as f64 - 0.5,
                corner[2] as f64 - 0.5,
            ));
            mesh.vertices.len() - 1
        })
    };

    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                if volume.data()[volume.index(x, y, z)] != label {
                    continue;
                }

                for (neighbour, corners) in &FACES {
                    let outside = volume.get_or_default(
                        x as isize + neighbour[0],
                        y as isize + neighbour[1],
                        z as isize + neighbour[2],
                    );
                    // Grid exterior reads as default; treat it as background
                    let exterior = is_exterior(volume.dims(), [x, y, z], *neighbour);
                    if !exterior && outside == label {
                        continue;
                    }

                    let quad = corners.map(|offset| {
                        corner_index(&mut mesh, [x + offset[0], y + offset[1], z + offset[2]])
                    });
                    mesh.triangles.push(Triangle::new(quad[0], quad[1], quad[2]));
                    mesh.triangles.push(Triangle::new(quad[0], quad[2], quad[3]));
                }
            }
        }
    }

    mesh
}

fn is_exterior(dims: [usize; 3], voxel: [usize; 3], offset: [isize; 3]) -> bool {
    (0..3).any(|axis| {
        let moved = voxel[axis] as isize + offset[axis];
        moved < 0 || moved >= dims[axis] as isize
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::stats::signed_volume;
    use crate::volume::NiftiHeader;

    fn volume_from(dims: [usize; 3], voxels: &[([usize; 3], u16)]) -> Volume<u16> {
        let header = NiftiHeader::for_dims(dims, [1.0, 1.0, 1.0]);
        let mut volume = Volume::filled(dims, 0u16, header);
        for &([x, y, z], value) in voxels {
            volume.set(x, y, z, value);
        }
        volume
    }

    #[test]
    fn test_single_voxel_is_a_closed_cube() {
        let volume = volume_from([3, 3, 3], &[([1, 1, 1], 1)]);
        let mesh = extract_boundary_surface(&volume, 1);
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.triangles.len(), 12);
        assert!((signed_volume(&mesh) - 1.0).abs() < 1e-9);

        let (min, max) = mesh.bounds().unwrap();
        assert_eq!(min, [0.5, 0.5, 0.5]);
        assert_eq!(max, [1.5, 1.5, 1.5]);
    }

    #[test]
    fn test_shared_faces_are_removed() {
        let volume = volume_from([4, 3, 3], &[([1, 1, 1], 2), ([2, 1, 1], 2)]);
        let mesh = extract_boundary_surface(&volume, 2);
        assert_eq!(mesh.triangles.len(), 20);
        assert_eq!(mesh.vertices.len(), 12);
        assert!((signed_volume(&mesh) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_voxels_touching_the_border_are_closed() {
        let volume = volume_from([1, 1, 1], &[([0, 0, 0], 1)]);
        let mesh = extract_boundary_surface(&volume, 1);
        assert_eq!(mesh.triangles.len(), 12);
    }

    #[test]
    fn test_other_labels_are_ignored() {
        let volume = volume_from([3, 3, 3], &[([1, 1, 1], 1), ([0, 0, 0], 2)]);
        let mesh = extract_boundary_surface(&volume, 3);
        assert!(mesh.is_empty());

        let mesh = extract_boundary_surface(&volume, 2);
        assert_eq!(mesh.triangles.len(), 12);
    }
}
