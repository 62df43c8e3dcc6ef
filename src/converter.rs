//! Mesh and scene conversion collaborators
//!
//! The exporter never builds meshes itself. It hands each persisted mask
//! volume to a [`MeshConverter`], and optionally hands the finished scene to a
//! [`SceneDescriptionConverter`]. Both are trait objects so callers can swap
//! in their own implementations (or recording fakes in tests).
//!
//! [`SurfaceMeshConverter`] is the default: a voxel boundary surface smoothed
//! with Taubin's λ|μ filter and reduced by vertex clustering, written as
//! binary STL or as a 3MF scene.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::aggregate::GroupIndexTable;
use crate::error::{Error, Result};
use crate::mesh::{
    Mesh, MeshSummary, cluster_vertices, extract_boundary_surface, taubin_smooth,
};
use crate::volume::Volume;
use crate::writer::{Scene, ScenePart, SceneUnit, palette_color, write_3mf, write_stl};

/// Default smoothing strength
pub const DEFAULT_SMOOTHING: f64 = 0.5;

/// Default number of smoothing iterations
pub const DEFAULT_SMOOTHING_ITERATIONS: u32 = 20;

/// Default reduction ratio
pub const DEFAULT_REDUCTION: f64 = 0.5;

/// Surface post-processing parameters passed to every conversion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshParams {
    /// Smoothing strength in `[0, 1]`; 0 disables smoothing
    pub smoothing: f64,
    /// Number of λ|μ smoothing passes
    pub smoothing_iterations: u32,
    /// Fraction of triangles to remove, in `[0, 1)`; 0 disables reduction
    pub reduction: f64,
}

impl Default for MeshParams {
    fn default() -> Self {
        Self {
            smoothing: DEFAULT_SMOOTHING,
            smoothing_iterations: DEFAULT_SMOOTHING_ITERATIONS,
            reduction: DEFAULT_REDUCTION,
        }
    }
}

impl MeshParams {
    /// Parameters that keep the raw voxel surface
    pub fn raw() -> Self {
        Self {
            smoothing: 0.0,
            smoothing_iterations: 0,
            reduction: 0.0,
        }
    }

    /// Set the smoothing strength
    pub fn with_smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Set the number of smoothing passes
    pub fn with_smoothing_iterations(mut self, iterations: u32) -> Self {
        self.smoothing_iterations = iterations;
        self
    }

    /// Set the reduction ratio
    pub fn with_reduction(mut self, reduction: f64) -> Self {
        self.reduction = reduction;
        self
    }

    /// Check that every parameter is in range
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(Error::parameter_out_of_range(
                "smoothing",
                self.smoothing,
                "in [0, 1]",
            ));
        }
        if !(0.0..1.0).contains(&self.reduction) {
            return Err(Error::parameter_out_of_range(
                "reduction",
                self.reduction,
                "in [0, 1)",
            ));
        }
        Ok(())
    }
}

/// Converts label volumes on disk into mesh files
pub trait MeshConverter: Send + Sync {
    /// Build one mesh from the voxels equal to `label` and write it to `mesh_path`
    fn volume_to_single_mesh(
        &self,
        volume_path: &Path,
        mesh_path: &Path,
        label: u16,
        params: &MeshParams,
    ) -> Result<MeshSummary>;

    /// Build one named sub-mesh per entry of `groups` under a single scene root
    /// and write the scene to `scene_path`
    fn volume_to_hierarchical_scene(
        &self,
        volume_path: &Path,
        scene_path: &Path,
        groups: &GroupIndexTable,
        params: &MeshParams,
    ) -> Result<MeshSummary>;
}

/// Hands a finished scene file to an external scene-description exporter
pub trait SceneDescriptionConverter: Send + Sync {
    /// Convert `source` into `destination`
    fn convert(&self, source: &Path, destination: &Path) -> Result<()>;
}

/// Default converter: voxel boundary surfaces written as STL and 3MF
#[derive(Debug, Clone, Copy, Default)]
pub struct SurfaceMeshConverter;

impl SurfaceMeshConverter {
    /// Create the converter
    pub fn new() -> Self {
        Self
    }

    /// World-space surface of the voxels equal to `label`
    pub fn surface(&self, volume: &Volume<u32>, label: u32, params: &MeshParams) -> Mesh {
        let mut mesh = extract_boundary_surface(volume, label);
        if mesh.is_empty() {
            return mesh;
        }
        let raw_triangles = mesh.triangles.len();

        taubin_smooth(&mut mesh, params.smoothing, params.smoothing_iterations);
        let mut mesh = cluster_vertices(&mesh, params.reduction);
        mesh.transform(&volume.affine());

        debug!(
            label,
            raw_triangles,
            triangles = mesh.triangles.len(),
            vertices = mesh.vertices.len(),
            "Built surface"
        );
        mesh
    }
}

impl MeshConverter for SurfaceMeshConverter {
    fn volume_to_single_mesh(
        &self,
        volume_path: &Path,
        mesh_path: &Path,
        label: u16,
        params: &MeshParams,
    ) -> Result<MeshSummary> {
        params.validate()?;
        let volume = Volume::load(volume_path)?;
        let mesh = self.surface(&volume, u32::from(label), params);

        let title = mesh_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        write_stl(mesh_path, &mesh, &title)?;

        Ok(MeshSummary::of_mesh(&mesh))
    }

    fn volume_to_hierarchical_scene(
        &self,
        volume_path: &Path,
        scene_path: &Path,
        groups: &GroupIndexTable,
        params: &MeshParams,
    ) -> Result<MeshSummary> {
        params.validate()?;
        let volume = Volume::load(volume_path)?;

        let name = scene_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "scene".to_string());
        let mut scene = Scene::new(name, SceneUnit::from(volume.header().spatial_unit()));
        let mut summary = MeshSummary::default();

        for (position, (index, group)) in groups.iter().enumerate() {
            let mesh = self.surface(&volume, u32::from(index), params);
            if mesh.is_empty() {
                warn!(group, index, "Group has no voxels; leaving it out of the scene");
                continue;
            }
            summary.merge(&MeshSummary::of_mesh(&mesh));
            scene.parts.push(ScenePart {
                name: group.to_string(),
                color: palette_color(position),
                mesh,
            });
        }

        write_3mf(scene_path, &scene)?;
        Ok(summary)
    }
}

/// Runs an external program as `<program> [args...] <source> <destination>`
#[derive(Debug, Clone)]
pub struct CommandSceneConverter {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandSceneConverter {
    /// Create a converter for `program`
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add a fixed argument placed before the two paths
    pub fn with_arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The configured program
    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl SceneDescriptionConverter for CommandSceneConverter {
    fn convert(&self, source: &Path, destination: &Path) -> Result<()> {
        debug!(
            program = %self.program.display(),
            source = %source.display(),
            destination = %destination.display(),
            "Running scene description converter"
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(source)
            .arg(destination)
            .output()
            .map_err(|e| {
                Error::Conversion(format!(
                    "failed to start '{}': {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Conversion(format!(
                "'{}' exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::NiftiHeader;

    #[test]
    fn test_default_params_are_valid() {
        let params = MeshParams::default();
        assert_eq!(params.smoothing, 0.5);
        assert_eq!(params.smoothing_iterations, 20);
        assert_eq!(params.reduction, 0.5);
        assert!(params.validate().is_ok());
        assert!(MeshParams::raw().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_params() {
        let err = MeshParams::default().with_reduction(1.0).validate().unwrap_err();
        assert!(matches!(err, Error::InvalidParameter(_)));
        assert!(err.to_string().contains("reduction"));

        assert!(MeshParams::default().with_smoothing(-0.1).validate().is_err());
        assert!(MeshParams::default().with_smoothing(1.5).validate().is_err());
        assert!(MeshParams::default().with_smoothing(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_surface_is_in_world_space() {
        let mut header = NiftiHeader::for_dims([3, 3, 3], [2.0, 2.0, 2.0]);
        header.srow_x[3] = 10.0;
        let mut volume = Volume::filled([3, 3, 3], 0u32, header);
        volume.set(1, 1, 1, 4);

        let mesh = SurfaceMeshConverter::new().surface(&volume, 4, &MeshParams::raw());
        let (min, max) = mesh.bounds().unwrap();
        assert!((min[0] - 11.0).abs() < 1e-9);
        assert!((max[0] - 13.0).abs() < 1e-9);
        assert!((min[1] - 1.0).abs() < 1e-9);
        assert!((max[2] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_label_gives_empty_surface() {
        let header = NiftiHeader::for_dims([2, 2, 2], [1.0, 1.0, 1.0]);
        let volume = Volume::filled([2, 2, 2], 0u32, header);
        let mesh = SurfaceMeshConverter::new().surface(&volume, 1, &MeshParams::default());
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_command_converter_reports_missing_program() {
        let converter = CommandSceneConverter::new("/nonexistent/segmesh-scene-tool");
        let err = converter
            .convert(Path::new("in.3mf"), Path::new("out.usda"))
            .unwrap_err();
        assert!(matches!(err, Error::Conversion(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_converter_passes_paths() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("combined.3mf");
        let destination = dir.path().join("combined.usda");
        std::fs::write(&source, b"scene").unwrap();

        let converter = CommandSceneConverter::new("cp");
        converter.convert(&source, &destination).unwrap();
        assert_eq!(std::fs::read(&destination).unwrap(), b"scene");

        let failing = CommandSceneConverter::new("false");
        assert!(failing.convert(&source, &destination).is_err());
    }
}
