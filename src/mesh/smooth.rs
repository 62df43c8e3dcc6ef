//! Taubin (λ|μ) smoothing
//!
//! Alternates a shrinking Laplacian step with factor `λ` and an inflating
//! step with factor `μ = λ / (0.1 λ - 1)`, which removes the staircase
//! pattern of voxel surfaces without the volume loss of plain Laplacian
//! smoothing.

use super::{Mesh, Vertex};

/// Smooth a mesh in place
///
/// `strength` is the pass-band factor `λ` in `[0, 1]`; zero or zero
/// iterations leave the mesh unchanged. Connectivity is never modified.
pub fn taubin_smooth(mesh: &mut Mesh, strength: f64, iterations: u32) {
    if strength <= 0.0 || iterations == 0 || mesh.triangles.is_empty() {
        return;
    }

    let lambda = strength;
    let mu = lambda / (0.1 * lambda - 1.0);
    let neighbours = vertex_neighbours(mesh);

    for _ in 0..iterations {
        laplacian_step(mesh, &neighbours, lambda);
        laplacian_step(mesh, &neighbours, mu);
    }
}

/// Sorted, de-duplicated edge neighbours of every vertex
fn vertex_neighbours(mesh: &Mesh) -> Vec<Vec<usize>> {
    let mut neighbours = vec![Vec::new(); mesh.vertices.len()];
    for t in &mesh.triangles {
        for (a, b) in [(t.v1, t.v2), (t.v2, t.v3), (t.v3, t.v1)] {
            neighbours[a].push(b);
            neighbours[b].push(a);
        }
    }
    for list in &mut neighbours {
        list.sort_unstable();
        list.dedup();
    }
    neighbours
}

fn laplacian_step(mesh: &mut Mesh, neighbours: &[Vec<usize>], factor: f64) {
    let moved: Vec<Vertex> = mesh
        .vertices
        .iter()
        .zip(neighbours)
        .map(|(vertex, adjacent)| {
            if adjacent.is_empty() {
                return *vertex;
            }
            let count = adjacent.len() as f64;
            let (mut cx, mut cy, mut cz) = (0.0, 0.0, 0.0);
            for &n in adjacent {
                let p = mesh.vertices[n];
                cx += p.x;
                cy += p.y;
                cz += p.z;
            }
            Vertex::new(
                vertex.x + factor * (cx / count - vertex.x),
                vertex.y + factor * (cy / count - vertex.y),
                vertex.z + factor * (cz / count - vertex.z),
            )
        })
        .collect();
    mesh.vertices = moved;
}
