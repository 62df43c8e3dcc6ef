//! Export configuration
//!
//! All paths and collaborators of an export run are explicit values on
//! [`ExportConfig`]; nothing is read from the environment here.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::converter::{
    MeshConverter, MeshParams, SceneDescriptionConverter, SurfaceMeshConverter,
};
use crate::error::{Error, Result};
use crate::labels::{LabelMap, file_stem_for};

/// File name of the segmentation inside a data directory
pub const SEGMENTATION_FILE: &str = "segmentation.nii.gz";

/// Sub-directory of a data directory receiving mask volumes
pub const VOLUME_DIR: &str = "volumes";

/// Sub-directory of a data directory receiving meshes
pub const MESH_DIR: &str = "meshes";

/// File stem of the combined volume, mesh and scene description
pub const COMBINED_STEM: &str = "combined";

/// Default border margin in voxels
pub const DEFAULT_MARGIN: usize = 1;

/// Default extension of the scene description hand-off
pub const DEFAULT_SCENE_EXTENSION: &str = "usda";

/// Configuration of one export run
///
/// # Example
///
/// ```
/// use segmesh::{ExportConfig, LabelMap, MeshParams};
///
/// let config = ExportConfig::from_data_dir("/data/case01")
///     .with_label_map(LabelMap::whole_body_ct())
///     .with_margin(2)
///     .with_mesh_params(MeshParams::default().with_reduction(0.3));
///
/// assert!(config.input().ends_with("segmentation.nii.gz"));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct ExportConfig {
    input: PathBuf,
    volume_dir: PathBuf,
    mesh_dir: PathBuf,
    label_map: LabelMap,
    margin: usize,
    params: MeshParams,
    converter: Arc<dyn MeshConverter>,
    scene_converter: Option<Arc<dyn SceneDescriptionConverter>>,
    scene_extension: String,
}

impl ExportConfig {
    /// Create a configuration with explicit input and output locations
    ///
    /// Uses the built-in whole-body CT label map, a one-voxel margin, default
    /// mesh parameters and [`SurfaceMeshConverter`].
    pub fn new(
        input: impl Into<PathBuf>,
        volume_dir: impl Into<PathBuf>,
        mesh_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            input: input.into(),
            volume_dir: volume_dir.into(),
            mesh_dir: mesh_dir.into(),
            label_map: LabelMap::whole_body_ct(),
            margin: DEFAULT_MARGIN,
            params: MeshParams::default(),
            converter: Arc::new(SurfaceMeshConverter::new()),
            scene_converter: None,
            scene_extension: DEFAULT_SCENE_EXTENSION.to_string(),
        }
    }

    /// Derive all locations from a base data directory
    ///
    /// Reads `<dir>/segmentation.nii.gz` and writes to `<dir>/volumes` and
    /// `<dir>/meshes`.
    pub fn from_data_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self::new(
            dir.join(SEGMENTATION_FILE),
            dir.join(VOLUME_DIR),
            dir.join(MESH_DIR),
        )
    }

    /// Replace the input volume path
    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = input.into();
        self
    }

    /// Replace the mask volume directory
    pub fn with_volume_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.volume_dir = dir.into();
        self
    }

    /// Replace the mesh directory
    pub fn with_mesh_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mesh_dir = dir.into();
        self
    }

    /// Replace the label map
    pub fn with_label_map(mut self, label_map: LabelMap) -> Self {
        self.label_map = label_map;
        self
    }

    /// Set the border margin in voxels
    pub fn with_margin(mut self, margin: usize) -> Self {
        self.margin = margin;
        self
    }

    /// Set the mesh post-processing parameters
    pub fn with_mesh_params(mut self, params: MeshParams) -> Self {
        self.params = params;
        self
    }

    /// Use a different mesh converter
    pub fn with_converter(mut self, converter: Arc<dyn MeshConverter>) -> Self {
        self.converter = converter;
        self
    }

    /// Hand the combined scene to a scene description converter after export
    pub fn with_scene_converter(mut self, converter: Arc<dyn SceneDescriptionConverter>) -> Self {
        self.scene_converter = Some(converter);
        self
    }

    /// Set the file extension of the scene description output
    ///
    /// A leading dot is accepted and dropped, so `.usda` and `usda` are the
    /// same extension.
    pub fn with_scene_extension(mut self, extension: impl Into<String>) -> Self {
        let extension = extension.into();
        self.scene_extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Input segmentation volume
    pub fn input(&self) -> &Path {
        &self.input
    }

    /// Directory receiving mask volumes
    pub fn volume_dir(&self) -> &Path {
        &self.volume_dir
    }

    /// Directory receiving meshes
    pub fn mesh_dir(&self) -> &Path {
        &self.mesh_dir
    }

    /// Label grouping
    pub fn label_map(&self) -> &LabelMap {
        &self.label_map
    }

    /// Border margin in voxels
    pub fn margin(&self) -> usize {
        self.margin
    }

    /// Mesh post-processing parameters
    pub fn mesh_params(&self) -> &MeshParams {
        &self.params
    }

    /// Mesh converter
    pub fn converter(&self) -> &Arc<dyn MeshConverter> {
        &self.converter
    }

    /// Optional scene description converter
    pub fn scene_converter(&self) -> Option<&Arc<dyn SceneDescriptionConverter>> {
        self.scene_converter.as_ref()
    }

    /// Path of the scene description output
    pub fn scene_description_path(&self) -> PathBuf {
        self.mesh_dir
            .join(format!("{}.{}", COMBINED_STEM, self.scene_extension))
    }

    /// Check the label map, mesh parameters and output naming
    pub fn validate(&self) -> Result<()> {
        self.label_map.validate()?;
        self.params.validate()?;

        if self.label_map.len() > u16::MAX as usize {
            return Err(Error::InvalidLabelMap(format!(
                "{} groups exceed the limit of {} mask indices",
                self.label_map.len(),
                u16::MAX
            )));
        }

        // Case-insensitive file systems would merge `Combined` with `combined`
        for (name, _) in self.label_map.iter() {
            if file_stem_for(name).eq_ignore_ascii_case(COMBINED_STEM) {
                return Err(Error::invalid_group(
                    name,
                    "file name is reserved for the combined output",
                ));
            }
        }

        let extension = &self.scene_extension;
        if extension.is_empty() || extension.contains(['/', '\\']) {
            return Err(Error::InvalidParameter(format!(
                "scene extension '{}' is not a file extension",
                self.scene_extension
            )));
        }

        Ok(())
    }
}

impl fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportConfig")
            .field("input", &self.input)
            .field("volume_dir", &self.volume_dir)
            .field("mesh_dir", &self.mesh_dir)
            .field("groups", &self.label_map.len())
            .field("margin", &self.margin)
            .field("params", &self.params)
            .field("scene_converter", &self.scene_converter.is_some())
            .field("scene_extension", &self.scene_extension)
            .finish()
    }
}
