//! Mesh file output
//!
//! Flat per-group meshes are written as binary STL ([`stl`]); hierarchical
//! scenes are written as 3MF packages ([`scene`] for the model XML,
//! [`package`] for the OPC container).

pub mod package;
pub mod scene;
pub mod stl;

pub use package::{create_package, write_3mf};
pub use scene::{Scene, ScenePart, SceneUnit, palette_color, write_scene_xml};
pub use stl::{read_stl, write_stl};
