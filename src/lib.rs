//! # segmesh
//!
//! Group anatomical segmentation labels and export per-group and hierarchical
//! meshes from NIfTI label volumes.
//!
//! A segmentation model labels every voxel of a CT or MR scan with one of
//! many fine-grained ids (each vertebra, each rib, each lung lobe). This
//! library folds those ids into a smaller set of named groups, writes one
//! mask volume per group plus a combined multi-label volume, and converts
//! each of them into a mesh: a binary STL per group and one 3MF scene whose
//! named sub-meshes share a single root.
//!
//! ## Features
//!
//! - Pure Rust implementation with no unsafe code
//! - NIfTI-1 reader and writer (`.nii`, `.nii.gz`, either byte order)
//! - Ordered label maps with composite groups, loadable from JSON
//! - Pluggable mesh conversion through the [`MeshConverter`] trait
//! - Binary STL and 3MF scene output
//!
//! ## Example
//!
//! ```no_run
//! use segmesh::{ExportConfig, LabelAggregator, LabelMap};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let labels = LabelMap::from_json_str(r#"{"liver": 5, "lung": {"upper_left": 10, "lower_left": 11}}"#)?;
//! let config = ExportConfig::from_data_dir("/data/case01").with_label_map(labels);
//!
//! let report = LabelAggregator::new(config).run()?;
//! for group in &report.groups {
//!     println!("{} -> {} ({} voxels)", group.name, group.mesh_path.display(), group.voxels);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregate;
pub mod config;
pub mod converter;
pub mod error;
pub mod labels;
pub mod mesh;
pub mod volume;
pub mod writer;

pub use aggregate::{
    CombinedReport, ExportReport, GroupIndexTable, GroupReport, LabelAggregator, export,
};
pub use config::ExportConfig;
pub use converter::{
    CommandSceneConverter, MeshConverter, MeshParams, SceneDescriptionConverter,
    SurfaceMeshConverter,
};
pub use error::{Error, Result};
pub use labels::{Group, LabelMap};
pub use mesh::{Mesh, MeshSummary, Triangle, Vertex};
pub use volume::{NiftiDatatype, NiftiHeader, SpatialUnit, Volume};
