//! Binary STL for flat per-group meshes
//!
//! Layout:
//!
//! ```text
//! UINT8[80]    – Header
//! UINT32       – Number of triangles
//! foreach triangle
//!     REAL32[3] – Normal vector
//!     REAL32[3] – Vertex 1
//!     REAL32[3] – Vertex 2
//!     REAL32[3] – Vertex 3
//!     UINT16    – Attribute byte count (0)
//! end
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::mesh::{Mesh, Triangle, Vertex};

/// Size of the binary STL header
const HEADER_SIZE: usize = 80;

/// Size of one triangle record
const TRIANGLE_SIZE: usize = 50;

/// Write a mesh as binary STL to a file
///
/// `title` is stored in the 80-byte header, truncated and padded with spaces.
pub fn write_stl<P: AsRef<Path>>(path: P, mesh: &Mesh, title: &str) -> Result<()> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    write_stl_to(&mut writer, mesh, title)?;
    writer.flush()?;
    Ok(())
}

/// Write a mesh as binary STL to any writer
pub fn write_stl_to<W: Write>(writer: &mut W, mesh: &Mesh, title: &str) -> Result<()> {
    let count = u32::try_from(mesh.triangles.len()).map_err(|_| {
        Error::Conversion(format!(
            "{} triangles exceed the binary STL limit",
            mesh.triangles.len()
        ))
    })?;

    let mut header = [b' '; HEADER_SIZE];
    let text = title.as_bytes();
    let len = text.len().min(HEADER_SIZE);
    header[..len].copy_from_slice(&text[..len]);
    // A header starting with "solid" makes readers guess ASCII
    if header.starts_with(b"solid") {
        header[..5].copy_from_slice(b"mesh ");
    }
    writer.write_all(&header)?;
    writer.write_all(&count.to_le_bytes())?;

    for triangle in &mesh.triangles {
        let normal = mesh.triangle_normal(triangle);
        for value in normal {
            writer.write_all(&(value as f32).to_le_bytes())?;
        }
        for index in [triangle.v1, triangle.v2, triangle.v3] {
            let v = &mesh.vertices[index];
            writer.write_all(&(v.x as f32).to_le_bytes())?;
            writer.write_all(&(v.y as f32).to_le_bytes())?;
            writer.write_all(&(v.z as f32).to_le_bytes())?;
        }
        writer.write_all(&0u16.to_le_bytes())?;
    }

    Ok(())
}

/// Read a binary STL file back into an indexed mesh
///
/// Vertices with bit-identical coordinates are merged.
pub fn read_stl<P: AsRef<Path>>(path: P) -> Result<Mesh> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::missing_file(path));
    }
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    parse_stl(&bytes)
}

/// Parse binary STL bytes into an indexed mesh
pub fn parse_stl(bytes: &[u8]) -> Result<Mesh> {
    if bytes.len() < HEADER_SIZE + 4 {
        return Err(Error::InvalidFormat(format!(
            "STL data is {} bytes, shorter than the 84-byte binary header",
            bytes.len()
        )));
    }

    let mut count_raw = [0u8; 4];
    count_raw.copy_from_slice(&bytes[HEADER_SIZE..HEADER_SIZE + 4]);
    let count = u32::from_le_bytes(count_raw) as usize;
    let expected = HEADER_SIZE + 4 + count * TRIANGLE_SIZE;
    if bytes.len() != expected {
        return Err(Error::InvalidFormat(format!(
            "STL header declares {} triangles ({} bytes) but data has {} bytes",
            count,
            expected,
            bytes.len()
        )));
    }

    let mut mesh = Mesh::with_capacity(count, count);
    let mut lookup: HashMap<[u32; 3], usize> = HashMap::new();
    let read_f32 = |offset: usize| {
        f32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    };

    for record in 0..count {
        let base = HEADER_SIZE + 4 + record * TRIANGLE_SIZE + 12;
        let mut corners = [0usize; 3];
        for (corner, slot) in corners.iter_mut().enumerate() {
            let offset = base + corner * 12;
            let xyz = [read_f32(offset), read_f32(offset + 4), read_f32(offset + 8)];
            let key = xyz.map(f32::to_bits);
            *slot = *lookup.entry(key).or_insert_with(|| {
                mesh.vertices
                    .push(Vertex::new(xyz[0] as f64, xyz[1] as f64, xyz[2] as f64));
                mesh.vertices.len() - 1
            });
        }
        mesh.triangles
            .push(Triangle::new(corners[0], corners[1], corners[2]));
    }

    Ok(mesh)
}
