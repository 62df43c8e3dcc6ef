//! Label aggregation and export
//!
//! [`LabelAggregator`] turns one segmentation volume into per-group masks and
//! meshes plus a combined multi-label volume and scene:
//!
//! 1. load the volume and pad it with background,
//! 2. for every group in label-map order, assign the next index (1, 2, ...),
//!    build its mask, fold it into the combined mask, persist it and mesh it,
//! 3. persist and mesh the combined mask as a hierarchical scene,
//! 4. optionally hand the scene to a scene description converter.
//!
//! A group whose ids never occur in the volume is not an error. Its mask is
//! all background, its mesh is empty, and the report flags it.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{COMBINED_STEM, ExportConfig};
use crate::error::{Error, Result};
use crate::labels::{BACKGROUND_LABEL, LabelMap, file_stem_for};
use crate::mesh::MeshSummary;
use crate::volume::nifti::{INTENT_LABEL, write_volume};
use crate::volume::{NiftiDatatype, Volume};

/// Ordered mapping from mask index to group name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GroupIndexTable {
    entries: BTreeMap<u16, String>,
}

impl GroupIndexTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table for a label map: group `i` (0-based) gets index `i + 1`
    pub fn from_label_map(label_map: &LabelMap) -> Result<Self> {
        let mut table = Self::new();
        for (position, (name, _)) in label_map.iter().enumerate() {
            table.insert(group_index(position)?, name);
        }
        Ok(table)
    }

    /// Record the group name for an index
    pub fn insert(&mut self, index: u16, name: impl Into<String>) {
        self.entries.insert(index, name.into());
    }

    /// Group name for an index
    pub fn get(&self, index: u16) -> Option<&str> {
        self.entries.get(&index).map(String::as_str)
    }

    /// Entries in ascending index order
    pub fn iter(&self) -> impl Iterator<Item = (u16, &str)> {
        self.entries.iter().map(|(&index, name)| (index, name.as_str()))
    }

    /// Number of groups
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest index in the table
    pub fn max_index(&self) -> u16 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }
}

fn group_index(position: usize) -> Result<u16> {
    u16::try_from(position + 1).map_err(|_| {
        Error::InvalidLabelMap(format!(
            "group {} exceeds the limit of {} mask indices",
            position + 1,
            u16::MAX
        ))
    })
}

/// Smallest unsigned datatype that stores every index of `group_count` groups
pub fn mask_datatype(group_count: usize) -> NiftiDatatype {
    if group_count <= u8::MAX as usize {
        NiftiDatatype::UInt8
    } else {
        NiftiDatatype::UInt16
    }
}

/// Mask of the voxels whose id is in `ids`, set to `index`, background elsewhere
pub fn group_mask(volume: &Volume<u32>, ids: &[u32], index: u16) -> Volume<u16> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    let mut mask = volume.map(|label| {
        if *label != BACKGROUND_LABEL && sorted.binary_search(label).is_ok() {
            index
        } else {
            0
        }
    });
    mask.header_mut().intent_code = INTENT_LABEL;
    mask
}

/// Copy every labelled voxel of `mask` into `combined`
pub fn accumulate(combined: &mut Volume<u16>, mask: &Volume<u16>) {
    for (target, &value) in combined.data_mut().iter_mut().zip(mask.data()) {
        if value != 0 {
            *target = value;
        }
    }
}

/// Combined multi-label mask of a whole label map, without touching disk
pub fn combined_mask(volume: &Volume<u32>, label_map: &LabelMap) -> Result<Volume<u16>> {
    let mut combined: Volume<u16> = volume.zeros_like();
    combined.header_mut().intent_code = INTENT_LABEL;
    for (position, (_, group)) in label_map.iter().enumerate() {
        let mask = group_mask(volume, &group.ids(), group_index(position)?);
        accumulate(&mut combined, &mask);
    }
    Ok(combined)
}

/// Outcome for one group
#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    /// Mask index (1-based position in the label map)
    pub index: u16,
    /// Group name
    pub name: String,
    /// Label ids merged into the group
    pub label_ids: Vec<u32>,
    /// Number of voxels in the mask
    pub voxels: usize,
    /// Whether none of the group's ids occur in the volume
    pub empty: bool,
    /// Mask volume written for the group
    pub volume_path: PathBuf,
    /// Mesh written for the group
    pub mesh_path: PathBuf,
    /// Mesh statistics reported by the converter
    pub mesh: MeshSummary,
}

/// Outcome for the combined volume and scene
#[derive(Debug, Clone, Serialize)]
pub struct CombinedReport {
    /// Number of voxels belonging to any group
    pub voxels: usize,
    /// Combined mask volume
    pub volume_path: PathBuf,
    /// Hierarchical scene
    pub mesh_path: PathBuf,
    /// Scene statistics reported by the converter
    pub mesh: MeshSummary,
    /// Scene description written by the hand-off converter, if configured
    pub scene_description_path: Option<PathBuf>,
}

/// Summary of an export run
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    /// Segmentation volume that was read
    pub input: PathBuf,
    /// Dimensions of the padded volume
    pub dims: [usize; 3],
    /// Border margin applied
    pub margin: usize,
    /// Index to group name mapping passed to the scene conversion
    pub group_index: GroupIndexTable,
    /// Per-group outcomes in label-map order
    pub groups: Vec<GroupReport>,
    /// Combined outcome
    pub combined: CombinedReport,
    /// Non-background ids present in the volume but not in the label map
    pub unmapped_ids: Vec<u32>,
}

impl ExportReport {
    /// Groups whose ids were absent from the volume
    pub fn empty_groups(&self) -> impl Iterator<Item = &GroupReport> {
        self.groups.iter().filter(|group| group.empty)
    }

    /// Every file written, volumes first
    pub fn written_files(&self) -> Vec<&Path> {
        let mut files: Vec<&Path> = self
            .groups
            .iter()
            .map(|g| g.volume_path.as_path())
            .collect();
        files.push(&self.combined.volume_path);
        files.extend(self.groups.iter().map(|g| g.mesh_path.as_path()));
        files.push(&self.combined.mesh_path);
        if let Some(path) = &self.combined.scene_description_path {
            files.push(path);
        }
        files
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as JSON
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}

/// Groups segmentation labels and drives mesh conversion
#[derive(Debug, Clone)]
pub struct LabelAggregator {
    config: ExportConfig,
}

impl LabelAggregator {
    /// Create an aggregator for a configuration
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    /// The configuration in use
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Run the export
    ///
    /// Writes N+1 mask volumes and N+1 meshes for a label map of N groups.
    /// Stops at the first failure; outputs of earlier groups stay on disk.
    pub fn run(&self) -> Result<ExportReport> {
        let config = &self.config;
        config.validate()?;

        let source = Volume::load(config.input())?;
        info!(
            input = %config.input().display(),
            dims = ?source.dims(),
            spacing = ?source.header().spacing(),
            "Loaded segmentation"
        );

        let volume = source.pad(config.margin());
        drop(source);

        create_dir(config.volume_dir())?;
        create_dir(config.mesh_dir())?;

        let histogram = volume.histogram();
        let label_map = config.label_map();
        let datatype = mask_datatype(label_map.len());
        let params = config.mesh_params();
        let converter = config.converter();

        let mut combined: Volume<u16> = volume.zeros_like();
        combined.header_mut().intent_code = INTENT_LABEL;
        combined.header_mut().set_description(COMBINED_STEM);

        let mut table = GroupIndexTable::new();
        let mut groups = Vec::with_capacity(label_map.len());

        for (position, (name, group)) in label_map.iter().enumerate() {
            let index = group_index(position)?;
            let stem = file_stem_for(name);
            let ids = group.ids();
            let voxels: usize = ids.iter().filter_map(|id| histogram.get(id)).sum();

            let mut mask = group_mask(&volume, &ids, index);
            mask.header_mut().set_description(name);
            accumulate(&mut combined, &mask);

            if voxels == 0 {
                warn!(group = name, index, ids = ?ids, "No voxels carry this group's ids");
            }

            let volume_path = config.volume_dir().join(format!("{}.nii.gz", stem));
            write_volume(&volume_path, &mask, datatype)?;
            drop(mask);

            let mesh_path = config.mesh_dir().join(format!("{}.stl", stem));
            let mesh = converter.volume_to_single_mesh(&volume_path, &mesh_path, index, params)?;

            table.insert(index, name);
            info!(
                group = name,
                index,
                voxels,
                triangles = mesh.triangles,
                "Exported group {}/{}",
                index,
                label_map.len()
            );

            groups.push(GroupReport {
                index,
                name: name.to_string(),
                label_ids: ids,
                voxels,
                empty: voxels == 0,
                volume_path,
                mesh_path,
                mesh,
            });
        }

        let combined_voxels = combined.data().iter().filter(|&&v| v != 0).count();
        let combined_volume_path = config
            .volume_dir()
            .join(format!("{}.nii.gz", COMBINED_STEM));
        write_volume(&combined_volume_path, &combined, datatype)?;
        drop(combined);

        let combined_mesh_path = config.mesh_dir().join(format!("{}.3mf", COMBINED_STEM));
        let combined_mesh = converter.volume_to_hierarchical_scene(
            &combined_volume_path,
            &combined_mesh_path,
            &table,
            params,
        )?;
        info!(
            groups = table.len(),
            voxels = combined_voxels,
            objects = combined_mesh.objects,
            "Exported combined scene"
        );

        let scene_description_path = match config.scene_converter() {
            Some(scene_converter) => {
                let destination = config.scene_description_path();
                scene_converter.convert(&combined_mesh_path, &destination)?;
                info!(path = %destination.display(), "Wrote scene description");
                Some(destination)
            }
            None => None,
        };

        let mapped = label_map.all_ids();
        let unmapped_ids: Vec<u32> = histogram
            .keys()
            .copied()
            .filter(|&id| id != BACKGROUND_LABEL && !mapped.contains(&id))
            .collect();
        if !unmapped_ids.is_empty() {
            debug!(ids = ?unmapped_ids, "Volume contains ids outside the label map");
        }

        Ok(ExportReport {
            input: config.input().to_path_buf(),
            dims: volume.dims(),
            margin: config.margin(),
            group_index: table,
            groups,
            combined: CombinedReport {
                voxels: combined_voxels,
                volume_path: combined_volume_path,
                mesh_path: combined_mesh_path,
                mesh: combined_mesh,
                scene_description_path,
            },
            unmapped_ids,
        })
    }
}

/// Run an export with `config`
pub fn export(config: ExportConfig) -> Result<ExportReport> {
    LabelAggregator::new(config).run()
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("cannot create output directory {}: {}", dir.display(), e),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::Group;
    use crate::volume::NiftiHeader;

    fn line_volume(labels: &[u32]) -> Volume<u32> {
        let dims = [labels.len(), 1, 1];
        Volume::new(dims, labels.to_vec(), NiftiHeader::for_dims(dims, [1.0; 3])).unwrap()
    }

    fn sample_map() -> LabelMap {
        LabelMap::new()
            .with_group("A", Group::SingleId(1))
            .with_group("B", Group::composite([("b1", 3), ("b2", 5)]))
    }

    #[test]
    fn test_index_table_follows_label_map_order() {
        let table = GroupIndexTable::from_label_map(&sample_map()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1), Some("A"));
        assert_eq!(table.get(2), Some("B"));
        assert_eq!(table.max_index(), 2);
        assert_eq!(
            table.iter().collect::<Vec<_>>(),
            vec![(1, "A"), (2, "B")]
        );
    }

    #[test]
    fn test_group_masks() {
        let volume = line_volume(&[0, 1, 3, 5, 7, 1]);
        let a = group_mask(&volume, &[1], 1);
        let b = group_mask(&volume, &[3, 5], 2);
        assert_eq!(a.data(), &[0, 1, 0, 0, 0, 1]);
        assert_eq!(b.data(), &[0, 0, 2, 2, 0, 0]);
        assert_eq!(a.header().intent_code, INTENT_LABEL);
    }

    #[test]
    fn test_combined_mask() {
        let volume = line_volume(&[0, 1, 3, 5, 7, 1]);
        let combined = combined_mask(&volume, &sample_map()).unwrap();
        assert_eq!(combined.data(), &[0, 1, 2, 2, 0, 1]);
    }

    #[test]
    fn test_group_without_voxels_gives_empty_mask() {
        let volume = line_volume(&[0, 1, 1]);
        let mask = group_mask(&volume, &[42], 3);
        assert!(mask.data().iter().all(|&v| v == 0));
    }

    #[test]
    fn test_mask_datatype() {
        assert_eq!(mask_datatype(1), NiftiDatatype::UInt8);
        assert_eq!(mask_datatype(255), NiftiDatatype::UInt8);
        assert_eq!(mask_datatype(256), NiftiDatatype::UInt16);
    }

    #[test]
    fn test_group_index_limit() {
        assert_eq!(group_index(0).unwrap(), 1);
        assert_eq!(group_index(65534).unwrap(), u16::MAX);
        assert!(group_index(65535).is_err());
    }

    #[test]
    fn test_index_table_serializes_as_map() {
        let table = GroupIndexTable::from_label_map(&sample_map()).unwrap();
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(json, r#"{"1":"A","2":"B"}"#);
    }
}
