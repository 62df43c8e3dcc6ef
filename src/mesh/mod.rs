//! Triangle meshes built from label volumes
//!
//! Surfaces are extracted in voxel space ([`extract`]), optionally smoothed
//! ([`smooth`]) and reduced ([`decimate`]), then mapped to world space through
//! the volume affine. [`stats`] summarises the result for reports.

pub mod decimate;
pub mod extract;
pub mod smooth;
pub mod stats;

use nalgebra::{Matrix3, Matrix4, Point3};

pub use decimate::cluster_vertices;
pub use extract::extract_boundary_surface;
pub use smooth::taubin_smooth;
pub use stats::MeshSummary;

/// A 3D vertex with x, y, z coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
    /// Z coordinate
    pub z: f64,
}

impl Vertex {
    /// Create a new vertex
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub(crate) fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

/// A triangle defined by three vertex indices, counter-clockwise seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triangle {
    /// Index of first vertex
    pub v1: usize,
    /// Index of second vertex
    pub v2: usize,
    /// Index of third vertex
    pub v3: usize,
}

impl Triangle {
    /// Create a new triangle
    pub fn new(v1: usize, v2: usize, v3: usize) -> Self {
        Self { v1, v2, v3 }
    }

    /// Whether two corners share a vertex
    pub fn is_degenerate(&self) -> bool {
        self.v1 == self.v2 || self.v2 == self.v3 || self.v1 == self.v3
    }
}

/// An indexed triangle mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// List of vertices
    pub vertices: Vec<Vertex>,
    /// List of triangles
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new mesh with pre-allocated capacity
    pub fn with_capacity(vertices: usize, triangles: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            triangles: Vec::with_capacity(triangles),
        }
    }

    /// Whether the mesh has no triangles
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Apply an affine transform to every vertex
    ///
    /// A transform with negative determinant mirrors the mesh; triangle
    /// winding is reversed so that normals keep pointing outwards.
    pub fn transform(&mut self, affine: &Matrix4<f64>) {
        for vertex in &mut self.vertices {
            let p = affine.transform_point(&Point3::new(vertex.x, vertex.y, vertex.z));
            *vertex = Vertex::new(p.x, p.y, p.z);
        }
        let linear: Matrix3<f64> = affine.fixed_view::<3, 3>(0, 0).into_owned();
        if linear.determinant() < 0.0 {
            self.flip_winding();
        }
    }

    /// Reverse the orientation of every triangle
    pub fn flip_winding(&mut self) {
        for triangle in &mut self.triangles {
            std::mem::swap(&mut triangle.v2, &mut triangle.v3);
        }
    }

    /// Unit normal of a triangle, or zero for a degenerate one
    pub fn triangle_normal(&self, triangle: &Triangle) -> [f64; 3] {
        let a = self.vertices[triangle.v1].to_array();
        let b = self.vertices[triangle.v2].to_array();
        let c = self.vertices[triangle.v3].to_array();
        let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
        let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
        let n = [
            u[1] * v[2] - u[2] * v[1],
            u[2] * v[0] - u[0] * v[2],
            u[0] * v[1] - u[1] * v[0],
        ];
        let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
        if len > f64::EPSILON {
            [n[0] / len, n[1] / len, n[2] / len]
        } else {
            [0.0, 0.0, 0.0]
        }
    }

    /// Axis-aligned bounds as `(min, max)`, or `None` for a mesh without vertices
    pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
        let first = self.vertices.first()?.to_array();
        let mut min = first;
        let mut max = first;
        for vertex in &self.vertices[1..] {
            for (axis, value) in vertex.to_array().into_iter().enumerate() {
                min[axis] = min[axis].min(value);
                max[axis] = max[axis].max(value);
            }
        }
        Some((min, max))
    }

    /// Drop vertices no triangle refers to, keeping the order of the rest
    pub fn remove_unused_vertices(&mut self) {
        let mut remap = vec![usize::MAX; self.vertices.len()];
        let mut kept = Vec::with_capacity(self.vertices.len());
        for triangle in &mut self.triangles {
            for index in [&mut triangle.v1, &mut triangle.v2, &mut triangle.v3] {
                if remap[*index] == usize::MAX {
                    remap[*index] = kept.len();
                    kept.push(self.vertices[*index]);
                }
                *index = remap[*index];
            }
        }
        self.vertices = kept;
    }
}
