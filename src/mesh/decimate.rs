//! Vertex-clustering reduction
//!
//! Vertices are binned into a cubic grid and every bin collapses to the
//! centroid of its members. Triangles whose corners end up in fewer than
//! three distinct bins disappear, as do duplicates of an already kept
//! triangle. The bin size grows with the requested reduction ratio so that
//! roughly that fraction of triangles is removed from a voxel surface.

use std::collections::{HashMap, HashSet};

use super::{Mesh, Triangle, Vertex};

/// Reduce a mesh by clustering vertices
///
/// `reduction` is the fraction of triangles to remove, in `[0, 1)`; zero
/// returns the mesh unchanged. Coordinates are expected in voxel units.
/// If clustering would remove every triangle of a non-empty mesh, the input
/// is returned unchanged so small structures do not vanish.
pub fn cluster_vertices(mesh: &Mesh, reduction: f64) -> Mesh {
    if reduction <= 0.0 || mesh.is_empty() {
        return mesh.clone();
    }

    let cell = 1.0 / (1.0 - reduction.min(0.999)).sqrt();
    let bin = |v: &Vertex| -> [i64; 3] {
        [
            ((v.x + 0.5) / cell).floor() as i64,
            ((v.y + 0.5) / cell).floor() as i64,
            ((v.z + 0.5) / cell).floor() as i64,
        ]
    };

    // Cluster ids in order of first appearance keep the output deterministic
    let mut cluster_of_bin: HashMap<[i64; 3], usize> = HashMap::new();
    let mut sums: Vec<([f64; 3], usize)> = Vec::new();
    let mut cluster_of_vertex = Vec::with_capacity(mesh.vertices.len());
    for vertex in &mesh.vertices {
        let id = *cluster_of_bin.entry(bin(vertex)).or_insert_with(|| {
            sums.push(([0.0; 3], 0));
            sums.len() - 1
        });
        let (sum, count) = &mut sums[id];
        sum[0] += vertex.x;
        sum[1] += vertex.y;
        sum[2] += vertex.z;
        *count += 1;
        cluster_of_vertex.push(id);
    }

    let mut seen: HashSet<[usize; 3]> = HashSet::new();
    let mut reduced = Mesh::with_capacity(sums.len(), mesh.triangles.len());
    reduced.vertices = sums
        .iter()
        .map(|(sum, count)| {
            let n = *count as f64;
            Vertex::new(sum[0] / n, sum[1] / n, sum[2] / n)
        })
        .collect();

    for t in &mesh.triangles {
        let collapsed = Triangle::new(
            cluster_of_vertex[t.v1],
            cluster_of_vertex[t.v2],
            cluster_of_vertex[t.v3],
        );
        if collapsed.is_degenerate() {
            continue;
        }
        let mut key = [collapsed.v1, collapsed.v2, collapsed.v3];
        key.sort_unstable();
        if seen.insert(key) {
            reduced.triangles.push(collapsed);
        }
    }

    if reduced.is_empty() {
        tracing::debug!(
            triangles = mesh.triangles.len(),
            reduction,
            "Reduction would remove every triangle; keeping the unreduced mesh"
        );
        return mesh.clone();
    }

    reduced.remove_unused_vertices();
    reduced
}
