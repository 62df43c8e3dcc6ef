//! Label maps: named groups of segmentation label ids
//!
//! A [`LabelMap`] is an ordered list of `(group name, Group)` pairs. The order
//! is significant: the aggregator assigns sequential mask indices (1..N) in
//! iteration order, so the same label map always yields the same indices.
//!
//! Label maps are usually written as JSON objects whose values are either a
//! single id or an object of sub-part ids:
//!
//! ```
//! use segmesh::{Group, LabelMap};
//!
//! let map = LabelMap::from_json_str(r#"{"liver": 5, "kidney": {"right": 2, "left": 3}}"#)
//!     .unwrap();
//! assert_eq!(map.len(), 2);
//! assert_eq!(map.get("liver"), Some(&Group::SingleId(5)));
//! assert_eq!(map.get("kidney").unwrap().ids(), vec![2, 3]);
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Label id 0 is background in every segmentation volume
pub const BACKGROUND_LABEL: u32 = 0;

/// One top-level entry of a label map
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Group {
    /// The group is exactly one label id
    SingleId(u32),
    /// The group is the union of named sub-parts, each one label id
    CompositeIds(Vec<(String, u32)>),
}

impl Group {
    /// All label ids of this group, in declaration order
    pub fn ids(&self) -> Vec<u32> {
        match self {
            Group::SingleId(id) => vec![*id],
            Group::CompositeIds(parts) => parts.iter().map(|(_, id)| *id).collect(),
        }
    }

    /// Check whether a label id belongs to this group
    pub fn contains(&self, label: u32) -> bool {
        match self {
            Group::SingleId(id) => *id == label,
            Group::CompositeIds(parts) => parts.iter().any(|(_, id)| *id == label),
        }
    }

    /// Create a composite group from `(sub-part, id)` pairs
    pub fn composite<S: Into<String>>(parts: impl IntoIterator<Item = (S, u32)>) -> Self {
        Group::CompositeIds(
            parts
                .into_iter()
                .map(|(name, id)| (name.into(), id))
                .collect(),
        )
    }
}

/// Ordered mapping from group name to [`Group`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelMap {
    groups: Vec<(String, Group)>,
}

impl LabelMap {
    /// Create an empty label map
    pub fn new() -> Self {
        Self { groups: Vec::new() }
    }

    /// Append a group without validation (builder style)
    ///
    /// Call [`LabelMap::validate`] once the map is complete.
    pub fn with_group(mut self, name: impl Into<String>, group: Group) -> Self {
        self.groups.push((name.into(), group));
        self
    }

    /// Append a group, rejecting names or ids that are already taken
    pub fn push(&mut self, name: impl Into<String>, group: Group) -> Result<()> {
        let name = name.into();
        self.groups.push((name, group));
        if let Err(err) = self.validate() {
            self.groups.pop();
            return Err(err);
        }
        Ok(())
    }

    /// Number of top-level groups
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether the map has no groups
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Iterate groups in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Group)> {
        self.groups.iter().map(|(name, group)| (name.as_str(), group))
    }

    /// Look up a group by name
    pub fn get(&self, name: &str) -> Option<&Group> {
        self.groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, group)| group)
    }

    /// Largest label id referenced anywhere in the map
    pub fn max_label_id(&self) -> Option<u32> {
        self.groups
            .iter()
            .flat_map(|(_, group)| group.ids())
            .max()
    }

    /// Every label id referenced by the map
    pub fn all_ids(&self) -> Vec<u32> {
        self.groups.iter().flat_map(|(_, group)| group.ids()).collect()
    }

    /// Check the label map invariants
    ///
    /// - at least one group
    /// - group names are non-empty, unique, and map to file stems that
    ///   differ beyond ASCII case
    /// - composite groups have at least one sub-part with unique names
    /// - label ids are non-zero and unique across the whole map
    pub fn validate(&self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(Error::InvalidLabelMap(
                "label map must contain at least one group".to_string(),
            ));
        }

        let mut names = HashSet::new();
        let mut stems: HashMap<String, &str> = HashMap::new();
        let mut owners: HashMap<u32, &str> = HashMap::new();

        for (name, group) in &self.groups {
            if name.trim().is_empty() {
                return Err(Error::InvalidLabelMap(
                    "group names must not be empty".to_string(),
                ));
            }
            if !names.insert(name.as_str()) {
                return Err(Error::invalid_group(name, "duplicate group name"));
            }

            // Stems differing only in case name the same file on
            // case-insensitive file systems
            let stem = file_stem_for(name);
            if let Some(other) = stems.insert(stem.to_ascii_lowercase(), name.as_str()) {
                return Err(Error::invalid_group(
                    name,
                    &format!("output name '{}' collides with group '{}'", stem, other),
                ));
            }

            if let Group::CompositeIds(parts) = group {
                if parts.is_empty() {
                    return Err(Error::invalid_group(name, "composite group has no sub-parts"));
                }
                let mut part_names = HashSet::new();
                for (part, _) in parts {
                    if !part_names.insert(part.as_str()) {
                        return Err(Error::invalid_group(
                            name,
                            &format!("duplicate sub-part '{}'", part),
                        ));
                    }
                }
            }

            for id in group.ids() {
                if id == BACKGROUND_LABEL {
                    return Err(Error::invalid_group(
                        name,
                        "label id 0 is reserved for background",
                    ));
                }
                if let Some(owner) = owners.insert(id, name.as_str()) {
                    if owner == name.as_str() {
                        return Err(Error::invalid_group(
                            name,
                            &format!("label id {} listed twice", id),
                        ));
                    }
                    return Err(Error::invalid_group(
                        name,
                        &format!("label id {} already belongs to group '{}'", id, owner),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Parse and validate a label map from JSON text
    ///
    /// The top level must be an object; each value must be a non-negative
    /// integer or an object of non-negative integers. Key order is preserved.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let entry: JsonEntry = serde_json::from_str(text)?;
        Self::from_json_entry(entry)
    }

    /// Read and validate a label map from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::missing_file(path));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize the label map as pretty-printed JSON, preserving order
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&Value::from(self))?)
    }

    /// Built-in grouping of the 104-class whole-body CT segmentation labels
    ///
    /// Paired and multi-part structures (lungs, ribs, vertebrae, heart
    /// chambers, ...) are folded into one group each so the exported scene has
    /// one node per organ system.
    pub fn whole_body_ct() -> Self {
        let vertebrae = [
            "L5", "L4", "L3", "L2", "L1", "T12", "T11", "T10", "T9", "T8", "T7", "T6", "T5",
            "T4", "T3", "T2", "T1", "C7", "C6", "C5", "C4", "C3", "C2", "C1",
        ];
        let spine = vertebrae
            .iter()
            .zip(18u32..)
            .map(|(name, id)| (format!("vertebrae_{}", name), id));

        let ribs = (1..=12u32)
            .map(|n| (format!("rib_left_{}", n), 57 + n))
            .chain((1..=12u32).map(|n| (format!("rib_right_{}", n), 69 + n)));

        LabelMap::new()
            .with_group("spleen", Group::SingleId(1))
            .with_group(
                "kidney",
                Group::composite([("kidney_right", 2), ("kidney_left", 3)]),
            )
            .with_group("gallbladder", Group::SingleId(4))
            .with_group("liver", Group::SingleId(5))
            .with_group("stomach", Group::SingleId(6))
            .with_group("aorta", Group::SingleId(7))
            .with_group("inferior_vena_cava", Group::SingleId(8))
            .with_group("portal_vein_and_splenic_vein", Group::SingleId(9))
            .with_group("pancreas", Group::SingleId(10))
            .with_group(
                "adrenal_gland",
                Group::composite([("adrenal_gland_right", 11), ("adrenal_gland_left", 12)]),
            )
            .with_group(
                "lung",
                Group::composite([
                    ("lung_upper_lobe_left", 13),
                    ("lung_lower_lobe_left", 14),
                    ("lung_upper_lobe_right", 15),
                    ("lung_middle_lobe_right", 16),
                    ("lung_lower_lobe_right", 17),
                ]),
            )
            .with_group("spine", Group::composite(spine))
            .with_group("esophagus", Group::SingleId(42))
            .with_group("trachea", Group::SingleId(43))
            .with_group(
                "heart",
                Group::composite([
                    ("heart_myocardium", 44),
                    ("heart_atrium_left", 45),
                    ("heart_ventricle_left", 46),
                    ("heart_atrium_right", 47),
                    ("heart_ventricle_right", 48),
                ]),
            )
            .with_group("pulmonary_artery", Group::SingleId(49))
            .with_group("brain", Group::SingleId(50))
            .with_group(
                "iliac_vessels",
                Group::composite([
                    ("iliac_artery_left", 51),
                    ("iliac_artery_right", 52),
                    ("iliac_vena_left", 53),
                    ("iliac_vena_right", 54),
                ]),
            )
            .with_group("small_bowel", Group::SingleId(55))
            .with_group("duodenum", Group::SingleId(56))
            .with_group("colon", Group::SingleId(57))
            .with_group("ribs", Group::composite(ribs))
            .with_group(
                "shoulder_and_arm_bones",
                Group::composite([
                    ("humerus_left", 82),
                    ("humerus_right", 83),
                    ("scapula_left", 84),
                    ("scapula_right", 85),
                    ("clavicula_left", 86),
                    ("clavicula_right", 87),
                ]),
            )
            .with_group(
                "pelvis_and_leg_bones",
                Group::composite([
                    ("femur_left", 88),
                    ("femur_right", 89),
                    ("hip_left", 90),
                    ("hip_right", 91),
                    ("sacrum", 92),
                ]),
            )
            .with_group("face", Group::SingleId(93))
            .with_group(
                "muscles",
                Group::composite([
                    ("gluteus_maximus_left", 94),
                    ("gluteus_maximus_right", 95),
                    ("gluteus_medius_left", 96),
                    ("gluteus_medius_right", 97),
                    ("gluteus_minimus_left", 98),
                    ("gluteus_minimus_right", 99),
                    ("autochthon_left", 100),
                    ("autochthon_right", 101),
                    ("iliopsoas_left", 102),
                    ("iliopsoas_right", 103),
                ]),
            )
            .with_group("urinary_bladder", Group::SingleId(104))
    }
}

/// JSON value that keeps every key of an object in document order,
/// repeated keys included, so that duplicates reach validation
enum JsonEntry {
    Object(Vec<(String, JsonEntry)>),
    Scalar(Value),
}

impl<'de> Deserialize<'de> for JsonEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(JsonEntryVisitor)
    }
}

struct JsonEntryVisitor;

impl<'de> Visitor<'de> for JsonEntryVisitor {
    type Value = JsonEntry;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<JsonEntry, E> {
        Ok(JsonEntry::Scalar(Value::Bool(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<JsonEntry, E> {
        Ok(JsonEntry::Scalar(Value::from(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<JsonEntry, E> {
        Ok(JsonEntry::Scalar(Value::from(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<JsonEntry, E> {
        Ok(JsonEntry::Scalar(Value::from(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<JsonEntry, E> {
        Ok(JsonEntry::Scalar(Value::String(v.to_owned())))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<JsonEntry, E> {
        Ok(JsonEntry::Scalar(Value::String(v)))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<JsonEntry, E> {
        Ok(JsonEntry::Scalar(Value::Null))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<JsonEntry, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<Value>()? {
            items.push(item);
        }
        Ok(JsonEntry::Scalar(Value::Array(items)))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<JsonEntry, A::Error> {
        let mut entries = Vec::new();
        while let Some((key, value)) = map.next_entry::<String, JsonEntry>()? {
            entries.push((key, value));
        }
        Ok(JsonEntry::Object(entries))
    }
}

impl LabelMap {
    fn from_json_entry(entry: JsonEntry) -> Result<Self> {
        let JsonEntry::Object(entries) = entry else {
            return Err(Error::InvalidLabelMap(
                "label map JSON must be an object".to_string(),
            ));
        };

        let mut map = LabelMap::new();
        for (name, value) in entries {
            let group = match value {
                JsonEntry::Object(parts) => {
                    let mut ids = Vec::with_capacity(parts.len());
                    for (part, id) in parts {
                        let id = match &id {
                            JsonEntry::Scalar(value) => json_label_id(value),
                            JsonEntry::Object(_) => None,
                        }
                        .ok_or_else(|| {
                            Error::invalid_group(
                                &name,
                                &format!(
                                    "sub-part '{}' must be a non-negative integer label id",
                                    part
                                ),
                            )
                        })?;
                        ids.push((part, id));
                    }
                    Group::CompositeIds(ids)
                }
                JsonEntry::Scalar(other) => {
                    let id = json_label_id(&other).ok_or_else(|| {
                        Error::invalid_group(
                            &name,
                            "value must be a label id or an object of label ids",
                        )
                    })?;
                    Group::SingleId(id)
                }
            };
            map.groups.push((name, group));
        }

        // Repeated names survive parsing, so validation reports them
        map.validate()?;
        Ok(map)
    }
}

impl From<&LabelMap> for Value {
    fn from(map: &LabelMap) -> Self {
        let mut object = Map::new();
        for (name, group) in &map.groups {
            let value = match group {
                Group::SingleId(id) => Value::from(*id),
                Group::CompositeIds(parts) => Value::Object(
                    parts
                        .iter()
                        .map(|(part, id)| (part.clone(), Value::from(*id)))
                        .collect(),
                ),
            };
            object.insert(name.clone(), value);
        }
        Value::Object(object)
    }
}

fn json_label_id(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|id| u32::try_from(id).ok())
}

/// Turn a group name into a safe file stem
///
/// Characters outside `[A-Za-z0-9._-]` become `_`, so names such as
/// `"left/right lung"` cannot escape the output directory.
pub fn file_stem_for(name: &str) -> String {
    let stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.chars().all(|c| c == '.') {
        // "." and ".." are directory references, not file names
        return stem.replace('.', "_");
    }
    stem
}
