//! Mesh statistics for export reports

use serde::Serialize;

use super::Mesh;

/// Size and extent of a mesh or scene written by a converter
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeshSummary {
    /// Number of mesh objects (1 for a flat mesh, one per group for a scene)
    pub objects: usize,
    /// Total vertex count
    pub vertices: usize,
    /// Total triangle count
    pub triangles: usize,
    /// World-space bounds as `(min, max)`; absent for empty meshes
    pub bounds: Option<([f64; 3], [f64; 3])>,
    /// Enclosed volume in cubic world units
    pub volume: f64,
}

impl MeshSummary {
    /// Summarise one mesh
    pub fn of_mesh(mesh: &Mesh) -> Self {
        Self {
            objects: usize::from(!mesh.is_empty()),
            vertices: mesh.vertices.len(),
            triangles: mesh.triangles.len(),
            bounds: mesh.bounds(),
            volume: enclosed_volume(mesh),
        }
    }

    /// Whether no triangles were produced
    pub fn is_empty(&self) -> bool {
        self.triangles == 0
    }

    /// Combine with the summary of another object of the same scene
    pub fn merge(&mut self, other: &MeshSummary) {
        self.objects += other.objects;
        self.vertices += other.vertices;
        self.triangles += other.triangles;
        self.volume += other.volume;
        self.bounds = match (self.bounds, other.bounds) {
            (Some((amin, amax)), Some((bmin, bmax))) => Some((
                [amin[0].min(bmin[0]), amin[1].min(bmin[1]), amin[2].min(bmin[2])],
                [amax[0].max(bmax[0]), amax[1].max(bmax[1]), amax[2].max(bmax[2])],
            )),
            (a, b) => a.or(b),
        };
    }
}

/// Signed volume of a mesh using the divergence theorem
///
/// Positive for a closed mesh with outward-facing triangles, negative when
/// the orientation is inverted. Triangles with out-of-range indices are
/// skipped.
pub fn signed_volume(mesh: &Mesh) -> f64 {
    let n = mesh.vertices.len();
    let mut volume = 0.0_f64;
    for t in &mesh.triangles {
        if t.v1 >= n || t.v2 >= n || t.v3 >= n {
            continue;
        }
        let a = &mesh.vertices[t.v1];
        let b = &mesh.vertices[t.v2];
        let c = &mesh.vertices[t.v3];
        volume += a.x * (b.y * c.z - b.z * c.y)
            + b.x * (c.y * a.z - c.z * a.y)
            + c.x * (a.y * b.z - a.z * b.y);
    }
    volume / 6.0
}

/// Enclosed volume of a closed mesh, independent of orientation
#[cfg(not(feature = "mesh-ops"))]
pub fn enclosed_volume(mesh: &Mesh) -> f64 {
    signed_volume(mesh).abs()
}

/// Enclosed volume of a closed mesh, independent of orientation
///
/// Computed from parry3d mass properties at unit density.
#[cfg(feature = "mesh-ops")]
pub fn enclosed_volume(mesh: &Mesh) -> f64 {
    use nalgebra::Point3;
    use parry3d::shape::{Shape, TriMesh};

    if mesh.is_empty() {
        return 0.0;
    }

    let vertices: Vec<Point3<f32>> = mesh
        .vertices
        .iter()
        .map(|v| Point3::new(v.x as f32, v.y as f32, v.z as f32))
        .collect();
    let indices: Vec<[u32; 3]> = mesh
        .triangles
        .iter()
        .map(|t| [t.v1 as u32, t.v2 as u32, t.v3 as u32])
        .collect();

    match TriMesh::new(vertices, indices) {
        Ok(trimesh) => (trimesh.mass_properties(1.0).mass() as f64).abs(),
        Err(err) => {
            tracing::debug!(error = ?err, "parry3d rejected mesh; using divergence volume");
            signed_volume(mesh).abs()
        }
    }
}
