//! NIfTI-1 single-file codec
//!
//! Reads `.nii` and `.nii.gz` images in either byte order and writes
//! little-endian images with an empty extension block. Only the parts of the
//! format that matter for label volumes are interpreted: dimensions, voxel
//! datatype, intensity scaling and the qform/sform spatial transforms.
//! Everything else in the header is carried through unchanged.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use nalgebra::{Matrix4, Vector4};
use tracing::debug;

use super::Volume;
use crate::error::{Error, Result};

/// Size of a NIfTI-1 header in bytes
pub const HEADER_SIZE: usize = 348;

/// Offset of the voxel data in files written by this module
pub const DATA_OFFSET: usize = HEADER_SIZE + 4;

/// Magic string of single-file NIfTI-1 images
pub const MAGIC_SINGLE_FILE: [u8; 4] = *b"n+1\0";

/// Magic string of two-file (`.hdr`/`.img`) NIfTI-1 images
pub const MAGIC_PAIR: [u8; 4] = *b"ni1\0";

/// Intent code marking a volume as a label map
pub const INTENT_LABEL: i16 = 1002;

/// `NIFTI_XFORM_SCANNER_ANAT`: coordinates in scanner-based anatomical space
pub const XFORM_SCANNER_ANAT: i16 = 1;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Voxel datatypes understood by the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NiftiDatatype {
    /// Unsigned 8-bit integer (code 2)
    UInt8,
    /// Signed 16-bit integer (code 4)
    Int16,
    /// Signed 32-bit integer (code 8)
    Int32,
    /// 32-bit float (code 16)
    Float32,
    /// 64-bit float (code 64)
    Float64,
    /// Signed 8-bit integer (code 256)
    Int8,
    /// Unsigned 16-bit integer (code 512)
    UInt16,
    /// Unsigned 32-bit integer (code 768)
    UInt32,
    /// Signed 64-bit integer (code 1024)
    Int64,
    /// Unsigned 64-bit integer (code 1280)
    UInt64,
}

impl NiftiDatatype {
    /// Map a header datatype code to a datatype
    pub fn from_code(code: i16) -> Result<Self> {
        match code {
            2 => Ok(NiftiDatatype::UInt8),
            4 => Ok(NiftiDatatype::Int16),
            8 => Ok(NiftiDatatype::Int32),
            16 => Ok(NiftiDatatype::Float32),
            64 => Ok(NiftiDatatype::Float64),
            256 => Ok(NiftiDatatype::Int8),
            512 => Ok(NiftiDatatype::UInt16),
            768 => Ok(NiftiDatatype::UInt32),
            1024 => Ok(NiftiDatatype::Int64),
            1280 => Ok(NiftiDatatype::UInt64),
            other => Err(Error::Unsupported(format!(
                "NIfTI datatype code {} (complex, RGB and 128-bit types are not label volumes)",
                other
            ))),
        }
    }

    /// Header datatype code
    pub fn code(self) -> i16 {
        match self {
            NiftiDatatype::UInt8 => 2,
            NiftiDatatype::Int16 => 4,
            NiftiDatatype::Int32 => 8,
            NiftiDatatype::Float32 => 16,
            NiftiDatatype::Float64 => 64,
            NiftiDatatype::Int8 => 256,
            NiftiDatatype::UInt16 => 512,
            NiftiDatatype::UInt32 => 768,
            NiftiDatatype::Int64 => 1024,
            NiftiDatatype::UInt64 => 1280,
        }
    }

    /// Bytes per voxel
    pub fn byte_size(self) -> usize {
        match self {
            NiftiDatatype::UInt8 | NiftiDatatype::Int8 => 1,
            NiftiDatatype::Int16 | NiftiDatatype::UInt16 => 2,
            NiftiDatatype::Int32 | NiftiDatatype::UInt32 | NiftiDatatype::Float32 => 4,
            NiftiDatatype::Float64 | NiftiDatatype::Int64 | NiftiDatatype::UInt64 => 8,
        }
    }

    /// Bits per voxel, as stored in the `bitpix` header field
    pub fn bitpix(self) -> i16 {
        (self.byte_size() * 8) as i16
    }

    /// Largest integer value the datatype can store exactly
    fn max_value(self) -> u64 {
        match self {
            NiftiDatatype::UInt8 => u8::MAX as u64,
            NiftiDatatype::Int8 => i8::MAX as u64,
            NiftiDatatype::Int16 => i16::MAX as u64,
            NiftiDatatype::UInt16 => u16::MAX as u64,
            NiftiDatatype::Int32 => i32::MAX as u64,
            NiftiDatatype::UInt32 => u32::MAX as u64,
            NiftiDatatype::Int64 => i64::MAX as u64,
            NiftiDatatype::UInt64 => u64::MAX,
            NiftiDatatype::Float32 => 1 << 24,
            NiftiDatatype::Float64 => 1 << 53,
        }
    }
}

/// Length unit of the spatial axes (`xyzt_units & 0x07`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialUnit {
    /// Unit code 0
    Unknown,
    /// Unit code 1
    Meter,
    /// Unit code 2
    Millimeter,
    /// Unit code 3
    Micron,
}

impl SpatialUnit {
    fn from_units(xyzt_units: u8) -> Self {
        match xyzt_units & 0x07 {
            1 => SpatialUnit::Meter,
            2 => SpatialUnit::Millimeter,
            3 => SpatialUnit::Micron,
            _ => SpatialUnit::Unknown,
        }
    }
}

/// A NIfTI-1 header
///
/// Field names follow the NIfTI-1 layout. Legacy ANALYZE fields that carry no
/// information (`data_type`, `db_name`, `extents`, `session_error`, `glmax`,
/// `glmin`) are not stored and are written as zeros.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub struct NiftiHeader {
    pub dim_info: u8,
    pub dim: [i16; 8],
    pub intent_p1: f32,
    pub intent_p2: f32,
    pub intent_p3: f32,
    pub intent_code: i16,
    pub datatype: i16,
    pub bitpix: i16,
    pub slice_start: i16,
    pub pixdim: [f32; 8],
    pub vox_offset: f32,
    pub scl_slope: f32,
    pub scl_inter: f32,
    pub slice_end: i16,
    pub slice_code: u8,
    pub xyzt_units: u8,
    pub cal_max: f32,
    pub cal_min: f32,
    pub slice_duration: f32,
    pub toffset: f32,
    pub descrip: [u8; 80],
    pub aux_file: [u8; 24],
    pub qform_code: i16,
    pub sform_code: i16,
    pub quatern_b: f32,
    pub quatern_c: f32,
    pub quatern_d: f32,
    pub qoffset_x: f32,
    pub qoffset_y: f32,
    pub qoffset_z: f32,
    pub srow_x: [f32; 4],
    pub srow_y: [f32; 4],
    pub srow_z: [f32; 4],
    pub intent_name: [u8; 16],
    pub magic: [u8; 4],
}

impl Default for NiftiHeader {
    fn default() -> Self {
        Self {
            dim_info: 0,
            dim: [3, 1, 1, 1, 1, 1, 1, 1],
            intent_p1: 0.0,
            intent_p2: 0.0,
            intent_p3: 0.0,
            intent_code: 0,
            datatype: NiftiDatatype::UInt8.code(),
            bitpix: NiftiDatatype::UInt8.bitpix(),
            slice_start: 0,
            pixdim: [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0],
            vox_offset: DATA_OFFSET as f32,
            scl_slope: 1.0,
            scl_inter: 0.0,
            slice_end: 0,
            slice_code: 0,
            xyzt_units: 2,
            cal_max: 0.0,
            cal_min: 0.0,
            slice_duration: 0.0,
            toffset: 0.0,
            descrip: [0; 80],
            aux_file: [0; 24],
            qform_code: 0,
            sform_code: 1,
            quatern_b: 0.0,
            quatern_c: 0.0,
            quatern_d: 0.0,
            qoffset_x: 0.0,
            qoffset_y: 0.0,
            qoffset_z: 0.0,
            srow_x: [1.0, 0.0, 0.0, 0.0],
            srow_y: [0.0, 1.0, 0.0, 0.0],
            srow_z: [0.0, 0.0, 1.0, 0.0],
            intent_name: [0; 16],
            magic: MAGIC_SINGLE_FILE,
        }
    }
}

/// Endian-aware reads from a header buffer
struct FieldReader<'a> {
    bytes: &'a [u8],
    big_endian: bool,
}

impl FieldReader<'_> {
    fn array<const N: usize>(&self, offset: usize) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[offset..offset + N]);
        out
    }

    fn i16(&self, offset: usize) -> i16 {
        let raw = self.array::<2>(offset);
        if self.big_endian {
            i16::from_be_bytes(raw)
        } else {
            i16::from_le_bytes(raw)
        }
    }

    fn f32(&self, offset: usize) -> f32 {
        let raw = self.array::<4>(offset);
        if self.big_endian {
            f32::from_be_bytes(raw)
        } else {
            f32::from_le_bytes(raw)
        }
    }

    fn f32s<const N: usize>(&self, offset: usize) -> [f32; N] {
        let mut out = [0f32; N];
        for (i, value) in out.iter_mut().enumerate() {
            *value = self.f32(offset + i * 4);
        }
        out
    }
}

impl NiftiHeader {
    /// Create a header for a 3D volume with axis-aligned spacing
    ///
    /// The sform maps voxel `(i, j, k)` to `(i * sx, j * sy, k * sz)` in
    /// millimeters.
    pub fn for_dims(dims: [usize; 3], spacing: [f32; 3]) -> Self {
        let mut header = Self::default();
        header.set_dims(dims);
        header.pixdim[1..4].copy_from_slice(&spacing);
        header.srow_x = [spacing[0], 0.0, 0.0, 0.0];
        header.srow_y = [0.0, spacing[1], 0.0, 0.0];
        header.srow_z = [0.0, 0.0, spacing[2], 0.0];
        header
    }

    /// Parse a header from the start of a NIfTI-1 image
    ///
    /// Returns the header and whether the file is big-endian.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, bool)> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::InvalidVolume(format!(
                "file is {} bytes, shorter than the {}-byte NIfTI-1 header",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let mut size_raw = [0u8; 4];
        size_raw.copy_from_slice(&bytes[0..4]);
        let big_endian = if i32::from_le_bytes(size_raw) == HEADER_SIZE as i32 {
            false
        } else if i32::from_be_bytes(size_raw) == HEADER_SIZE as i32 {
            true
        } else {
            return Err(Error::invalid_header_field(
                "sizeof_hdr",
                "expected 348 in either byte order (NIfTI-2 and ANALYZE files are not supported)",
            ));
        };

        let r = FieldReader { bytes, big_endian };

        let magic = r.array::<4>(344);
        if magic == MAGIC_PAIR {
            return Err(Error::Unsupported(
                "two-file NIfTI images (.hdr/.img); convert to a single .nii file".to_string(),
            ));
        }
        if magic != MAGIC_SINGLE_FILE {
            return Err(Error::invalid_header_field("magic", "expected \"n+1\""));
        }

        let mut dim = [0i16; 8];
        for (i, value) in dim.iter_mut().enumerate() {
            *value = r.i16(40 + i * 2);
        }

        let header = NiftiHeader {
            dim_info: bytes[39],
            dim,
            intent_p1: r.f32(56),
            intent_p2: r.f32(60),
            intent_p3: r.f32(64),
            intent_code: r.i16(68),
            datatype: r.i16(70),
            bitpix: r.i16(72),
            slice_start: r.i16(74),
            pixdim: r.f32s::<8>(76),
            vox_offset: r.f32(108),
            scl_slope: r.f32(112),
            scl_inter: r.f32(116),
            slice_end: r.i16(120),
            slice_code: bytes[122],
            xyzt_units: bytes[123],
            cal_max: r.f32(124),
            cal_min: r.f32(128),
            slice_duration: r.f32(132),
            toffset: r.f32(136),
            descrip: r.array::<80>(148),
            aux_file: r.array::<24>(228),
            qform_code: r.i16(252),
            sform_code: r.i16(254),
            quatern_b: r.f32(256),
            quatern_c: r.f32(260),
            quatern_d: r.f32(264),
            qoffset_x: r.f32(268),
            qoffset_y: r.f32(272),
            qoffset_z: r.f32(276),
            srow_x: r.f32s::<4>(280),
            srow_y: r.f32s::<4>(296),
            srow_z: r.f32s::<4>(312),
            intent_name: r.array::<16>(328),
            magic,
        };

        Ok((header, big_endian))
    }

    /// Serialize the header in little-endian byte order
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut put = |offset: usize, raw: &[u8]| {
            out[offset..offset + raw.len()].copy_from_slice(raw);
        };

        put(0, &(HEADER_SIZE as i32).to_le_bytes());
        put(38, b"r");
        put(39, &[self.dim_info]);
        for (i, value) in self.dim.iter().enumerate() {
            put(40 + i * 2, &value.to_le_bytes());
        }
        put(56, &self.intent_p1.to_le_bytes());
        put(60, &self.intent_p2.to_le_bytes());
        put(64, &self.intent_p3.to_le_bytes());
        put(68, &self.intent_code.to_le_bytes());
        put(70, &self.datatype.to_le_bytes());
        put(72, &self.bitpix.to_le_bytes());
        put(74, &self.slice_start.to_le_bytes());
        for (i, value) in self.pixdim.iter().enumerate() {
            put(76 + i * 4, &value.to_le_bytes());
        }
        put(108, &self.vox_offset.to_le_bytes());
        put(112, &self.scl_slope.to_le_bytes());
        put(116, &self.scl_inter.to_le_bytes());
        put(120, &self.slice_end.to_le_bytes());
        put(122, &[self.slice_code]);
        put(123, &[self.xyzt_units]);
        put(124, &self.cal_max.to_le_bytes());
        put(128, &self.cal_min.to_le_bytes());
        put(132, &self.slice_duration.to_le_bytes());
        put(136, &self.toffset.to_le_bytes());
        put(148, &self.descrip);
        put(228, &self.aux_file);
        put(252, &self.qform_code.to_le_bytes());
        put(254, &self.sform_code.to_le_bytes());
        put(256, &self.quatern_b.to_le_bytes());
        put(260, &self.quatern_c.to_le_bytes());
        put(264, &self.quatern_d.to_le_bytes());
        put(268, &self.qoffset_x.to_le_bytes());
        put(272, &self.qoffset_y.to_le_bytes());
        put(276, &self.qoffset_z.to_le_bytes());
        for (row_offset, row) in [(280, &self.srow_x), (296, &self.srow_y), (312, &self.srow_z)] {
            for (i, value) in row.iter().enumerate() {
                put(row_offset + i * 4, &value.to_le_bytes());
            }
        }
        put(328, &self.intent_name);
        put(344, &self.magic);

        out
    }

    /// Set `dim` for a 3D volume, resetting higher dimensions to 1
    pub fn set_dims(&mut self, dims: [usize; 3]) {
        self.dim = [
            3,
            dims[0] as i16,
            dims[1] as i16,
            dims[2] as i16,
            1,
            1,
            1,
            1,
        ];
    }

    /// Spatial dimensions of the image
    ///
    /// Dimensions beyond the third (channel, time) must be 1; a single
    /// channel is squeezed away so that the result is always a plain 3D grid.
    pub fn spatial_dims(&self) -> Result<[usize; 3]> {
        let ndim = self.dim[0];
        if !(1..=7).contains(&ndim) {
            return Err(Error::invalid_header_field(
                "dim[0]",
                &format!("must be between 1 and 7, got {}", ndim),
            ));
        }
        let ndim = ndim as usize;

        let mut dims = [1usize; 3];
        for axis in 0..3 {
            if axis < ndim {
                let extent = self.dim[axis + 1];
                if extent < 1 {
                    return Err(Error::invalid_header_field(
                        &format!("dim[{}]", axis + 1),
                        &format!("must be positive, got {}", extent),
                    ));
                }
                dims[axis] = extent as usize;
            }
        }

        for axis in 4..=ndim {
            if self.dim[axis] > 1 {
                return Err(Error::Unsupported(format!(
                    "volume has {} entries along dimension {}; only single-channel 3D label volumes are supported",
                    self.dim[axis], axis
                )));
            }
        }

        Ok(dims)
    }

    /// Voxel spacing along the three spatial axes
    pub fn spacing(&self) -> [f64; 3] {
        [
            self.pixdim[1] as f64,
            self.pixdim[2] as f64,
            self.pixdim[3] as f64,
        ]
    }

    /// Length unit of the spatial axes
    pub fn spatial_unit(&self) -> SpatialUnit {
        SpatialUnit::from_units(self.xyzt_units)
    }

    /// Header description as text
    pub fn description(&self) -> String {
        let end = self.descrip.iter().position(|&b| b == 0).unwrap_or(80);
        String::from_utf8_lossy(&self.descrip[..end]).into_owned()
    }

    /// Set the header description, truncated to 79 bytes
    pub fn set_description(&mut self, text: &str) {
        self.descrip = [0; 80];
        let bytes = text.as_bytes();
        let len = bytes.len().min(79);
        self.descrip[..len].copy_from_slice(&bytes[..len]);
    }

    /// Whether intensity scaling changes stored values
    pub fn has_scaling(&self) -> bool {
        self.scl_slope != 0.0 && (self.scl_slope != 1.0 || self.scl_inter != 0.0)
    }

    /// Voxel-to-world transform from the quaternion fields
    pub fn qform_affine(&self) -> Matrix4<f64> {
        let b = self.quatern_b as f64;
        let c = self.quatern_c as f64;
        let d = self.quatern_d as f64;
        let mut a_sq = 1.0 - (b * b + c * c + d * d);
        let (b, c, d) = if a_sq < 1e-7 {
            // Rotation by 180 degrees; renormalise b, c, d
            let norm = (b * b + c * c + d * d).sqrt();
            a_sq = 0.0;
            (b / norm, c / norm, d / norm)
        } else {
            (b, c, d)
        };
        let a = a_sq.sqrt();

        let qfac = if self.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let (sx, sy, sz) = (
            self.pixdim[1] as f64,
            self.pixdim[2] as f64,
            self.pixdim[3] as f64 * qfac,
        );

        let r = [
            [a * a + b * b - c * c - d * d, 2.0 * (b * c - a * d), 2.0 * (b * d + a * c)],
            [2.0 * (b * c + a * d), a * a + c * c - b * b - d * d, 2.0 * (c * d - a * b)],
            [2.0 * (b * d - a * c), 2.0 * (c * d + a * b), a * a + d * d - c * c - b * b],
        ];

        Matrix4::new(
            r[0][0] * sx,
            r[0][1] * sy,
            r[0][2] * sz,
            self.qoffset_x as f64,
            r[1][0] * sx,
            r[1][1] * sy,
            r[1][2] * sz,
            self.qoffset_y as f64,
            r[2][0] * sx,
            r[2][1] * sy,
            r[2][2] * sz,
            self.qoffset_z as f64,
            0.0,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Voxel-to-world transform from the sform rows
    pub fn sform_affine(&self) -> Matrix4<f64> {
        let row = |r: &[f32; 4]| [r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64];
        let (x, y, z) = (row(&self.srow_x), row(&self.srow_y), row(&self.srow_z));
        Matrix4::new(
            x[0], x[1], x[2], x[3], y[0], y[1], y[2], y[3], z[0], z[1], z[2], z[3], 0.0, 0.0,
            0.0, 1.0,
        )
    }

    /// Voxel-to-world transform used for meshing
    ///
    /// Prefers the sform, then the qform, then plain pixdim scaling.
    pub fn affine(&self) -> Matrix4<f64> {
        if self.sform_code > 0 {
            self.sform_affine()
        } else if self.qform_code > 0 {
            self.qform_affine()
        } else {
            let [sx, sy, sz] = self.spacing();
            Matrix4::new_nonuniform_scaling(&nalgebra::Vector3::new(sx, sy, sz))
        }
    }

    /// Move the voxel origin to `voxel` in the current index space
    ///
    /// After the call, index `(0, 0, 0)` maps to the world position that
    /// `voxel` mapped to before. Both qform and sform are updated. A header
    /// with neither transform gets an axis-aligned qform carrying the new
    /// origin, since plain pixdim scaling has no offset to move.
    pub fn shift_origin(&mut self, voxel: [f64; 3]) {
        if self.sform_code <= 0 && self.qform_code <= 0 {
            self.qform_code = XFORM_SCANNER_ANAT;
            self.quatern_b = 0.0;
            self.quatern_c = 0.0;
            self.quatern_d = 0.0;
            self.qoffset_x = 0.0;
            self.qoffset_y = 0.0;
            self.qoffset_z = 0.0;
            self.pixdim[0] = 1.0;
        }

        let point = Vector4::new(voxel[0], voxel[1], voxel[2], 1.0);

        let q = self.qform_affine() * point;
        self.qoffset_x = q.x as f32;
        self.qoffset_y = q.y as f32;
        self.qoffset_z = q.z as f32;

        let s = self.sform_affine() * point;
        self.srow_x[3] = s.x as f32;
        self.srow_y[3] = s.y as f32;
        self.srow_z[3] = s.z as f32;
    }
}

/// Read a NIfTI-1 label volume from disk
///
/// Gzip compression is detected from the file content, not the extension.
pub fn read_label_volume<P: AsRef<Path>>(path: P) -> Result<Volume<u32>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::missing_file(path));
    }
    let raw = std::fs::read(path)?;
    debug!(path = %path.display(), bytes = raw.len(), "Read volume file");
    decode_label_volume(&raw)
}

/// Decode a NIfTI-1 label volume from memory
pub fn decode_label_volume(raw: &[u8]) -> Result<Volume<u32>> {
    let decompressed;
    let bytes = if raw.starts_with(&GZIP_MAGIC) {
        let mut out = Vec::new();
        GzDecoder::new(raw)
            .read_to_end(&mut out)
            .map_err(|e| Error::InvalidVolume(format!("gzip stream is corrupted: {}", e)))?;
        decompressed = out;
        decompressed.as_slice()
    } else {
        raw
    };

    let (header, big_endian) = NiftiHeader::from_bytes(bytes)?;
    let dims = header.spatial_dims()?;
    let datatype = NiftiDatatype::from_code(header.datatype)?;

    let offset = header.vox_offset as usize;
    if offset < HEADER_SIZE {
        return Err(Error::invalid_header_field(
            "vox_offset",
            &format!("must be at least {}, got {}", HEADER_SIZE, header.vox_offset),
        ));
    }

    let count = dims[0] * dims[1] * dims[2];
    let needed = count * datatype.byte_size();
    let available = bytes.len().saturating_sub(offset);
    if available < needed {
        return Err(Error::InvalidVolume(format!(
            "voxel data is truncated: expected {} bytes after offset {}, found {}",
            needed, offset, available
        )));
    }

    let data = decode_labels(
        &bytes[offset..offset + needed],
        datatype,
        big_endian,
        &header,
    )?;

    Volume::new(dims, data, header)
}

fn decode_labels(
    raw: &[u8],
    datatype: NiftiDatatype,
    big_endian: bool,
    header: &NiftiHeader,
) -> Result<Vec<u32>> {
    let size = datatype.byte_size();
    let scaling = header.has_scaling();
    let (slope, inter) = (header.scl_slope as f64, header.scl_inter as f64);

    let mut labels = Vec::with_capacity(raw.len() / size);
    for (index, chunk) in raw.chunks_exact(size).enumerate() {
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(chunk);
        if big_endian {
            buf[..size].reverse();
        }

        let value = match datatype {
            NiftiDatatype::UInt8 => buf[0] as f64,
            NiftiDatatype::Int8 => buf[0] as i8 as f64,
            NiftiDatatype::UInt16 => u16::from_le_bytes([buf[0], buf[1]]) as f64,
            NiftiDatatype::Int16 => i16::from_le_bytes([buf[0], buf[1]]) as f64,
            NiftiDatatype::UInt32 => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            NiftiDatatype::Int32 => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            NiftiDatatype::UInt64 => u64::from_le_bytes(buf) as f64,
            NiftiDatatype::Int64 => i64::from_le_bytes(buf) as f64,
            NiftiDatatype::Float32 => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f64,
            NiftiDatatype::Float64 => f64::from_le_bytes(buf),
        };
        let value = if scaling { value * slope + inter } else { value };

        labels.push(to_label(value).ok_or_else(|| {
            Error::InvalidVolume(format!(
                "voxel {} has value {} which is not a non-negative integer label id",
                index, value
            ))
        })?);
    }

    Ok(labels)
}

fn to_label(value: f64) -> Option<u32> {
    if !value.is_finite() {
        return None;
    }
    let rounded = value.round();
    if (value - rounded).abs() > 1e-3 || rounded < 0.0 || rounded > u32::MAX as f64 {
        return None;
    }
    Some(rounded as u32)
}

/// Encode a volume as an uncompressed little-endian NIfTI-1 image
///
/// The spatial metadata comes from the volume's header; dimensions, datatype,
/// scaling and data offset are rewritten to describe the encoded data.
pub fn encode_volume<T>(volume: &Volume<T>, datatype: NiftiDatatype) -> Result<Vec<u8>>
where
    T: Copy + Default + Into<u64>,
{
    let dims = volume.dims();
    if dims.iter().any(|&d| d > i16::MAX as usize) {
        return Err(Error::Unsupported(format!(
            "dimensions {:?} exceed the NIfTI-1 limit of {} voxels per axis",
            dims,
            i16::MAX
        )));
    }

    let mut header = volume.header().clone();
    header.set_dims(dims);
    header.datatype = datatype.code();
    header.bitpix = datatype.bitpix();
    header.vox_offset = DATA_OFFSET as f32;
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    header.magic = MAGIC_SINGLE_FILE;

    let max = datatype.max_value();
    let mut out = Vec::with_capacity(DATA_OFFSET + volume.len() * datatype.byte_size());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&[0u8; 4]);

    for (index, &voxel) in volume.data().iter().enumerate() {
        let value: u64 = voxel.into();
        if value > max {
            return Err(Error::InvalidParameter(format!(
                "voxel {} has value {} which does not fit datatype {:?}",
                index, value, datatype
            )));
        }
        match datatype {
            NiftiDatatype::UInt8 | NiftiDatatype::Int8 => out.push(value as u8),
            NiftiDatatype::UInt16 | NiftiDatatype::Int16 => {
                out.extend_from_slice(&(value as u16).to_le_bytes())
            }
            NiftiDatatype::UInt32 | NiftiDatatype::Int32 => {
                out.extend_from_slice(&(value as u32).to_le_bytes())
            }
            NiftiDatatype::UInt64 | NiftiDatatype::Int64 => {
                out.extend_from_slice(&value.to_le_bytes())
            }
            NiftiDatatype::Float32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
            NiftiDatatype::Float64 => out.extend_from_slice(&(value as f64).to_le_bytes()),
        }
    }

    Ok(out)
}

/// Write a volume to disk, gzip-compressing when the path ends in `.gz`
///
/// The gzip header carries no timestamp, so identical volumes produce
/// identical files.
pub fn write_volume<P, T>(path: P, volume: &Volume<T>, datatype: NiftiDatatype) -> Result<()>
where
    P: AsRef<Path>,
    T: Copy + Default + Into<u64>,
{
    let path = path.as_ref();
    let encoded = encode_volume(volume, datatype)?;
    let file = BufWriter::new(File::create(path)?);

    if is_gzip_path(path) {
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(&encoded)?;
        encoder.finish()?.flush()?;
    } else {
        let mut file = file;
        file.write_all(&encoded)?;
        file.flush()?;
    }

    debug!(path = %path.display(), voxels = volume.len(), ?datatype, "Wrote volume file");
    Ok(())
}

fn is_gzip_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}
