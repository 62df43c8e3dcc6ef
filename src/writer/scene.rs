//! 3MF model XML for hierarchical scenes
//!
//! A scene becomes one 3MF model:
//!
//! - a core `basematerials` group with one display colour per part,
//! - one mesh object per part, named after its group and coloured through
//!   `pid`/`pindex`,
//! - one root object made of components referencing every part,
//! - a build with a single item pointing at the root.
//!
//! A scene without parts has empty `resources` and `build` elements.

use std::io::Write as IoWrite;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{Error, Result};
use crate::mesh::Mesh;
use crate::volume::SpatialUnit;

/// 3MF core namespace
pub const CORE_NAMESPACE: &str = "http://schemas.microsoft.com/3dmanufacturing/core/2015/02";

/// Resource id of the material group; objects are numbered after it
const MATERIALS_ID: usize = 1;

/// Length unit of a 3MF model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneUnit {
    /// Micrometers
    Micron,
    /// Millimeters (3MF default)
    Millimeter,
    /// Meters
    Meter,
}

impl SceneUnit {
    /// Value of the `unit` attribute
    pub fn as_str(self) -> &'static str {
        match self {
            SceneUnit::Micron => "micron",
            SceneUnit::Millimeter => "millimeter",
            SceneUnit::Meter => "meter",
        }
    }
}

impl From<SpatialUnit> for SceneUnit {
    fn from(unit: SpatialUnit) -> Self {
        match unit {
            SpatialUnit::Meter => SceneUnit::Meter,
            SpatialUnit::Micron => SceneUnit::Micron,
            SpatialUnit::Millimeter | SpatialUnit::Unknown => SceneUnit::Millimeter,
        }
    }
}

/// One named sub-mesh of a scene
#[derive(Debug, Clone)]
pub struct ScenePart {
    /// Group name shown by viewers
    pub name: String,
    /// Display colour as RGBA
    pub color: (u8, u8, u8, u8),
    /// Geometry in world coordinates
    pub mesh: Mesh,
}

/// A named collection of parts under one root
#[derive(Debug, Clone)]
pub struct Scene {
    /// Name of the root object
    pub name: String,
    /// Length unit of all coordinates
    pub unit: SceneUnit,
    /// Parts in output order
    pub parts: Vec<ScenePart>,
}

impl Scene {
    /// Create an empty scene
    pub fn new(name: impl Into<String>, unit: SceneUnit) -> Self {
        Self {
            name: name.into(),
            unit,
            parts: Vec::new(),
        }
    }

    /// Resource id of the root components object
    ///
    /// Only written when the scene has at least one part.
    pub fn root_id(&self) -> usize {
        MATERIALS_ID + self.parts.len() + 1
    }
}

/// Distinct display colour for the part at `index`
///
/// Hues step by the golden angle so neighbouring groups contrast.
pub fn palette_color(index: usize) -> (u8, u8, u8, u8) {
    let hue = (index as f64 * 137.507_764) % 360.0;
    let (s, v) = (0.55, 0.9);
    let c = v * s;
    let x = c * (1.0 - ((hue / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;
    let (r, g, b) = match (hue / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };
    let to_byte = |channel: f64| ((channel + m) * 255.0).round() as u8;
    (to_byte(r), to_byte(g), to_byte(b), 255)
}

/// Write a scene as 3MF model XML (the `3D/3dmodel.model` part)
pub fn write_scene_xml<W: IoWrite>(scene: &Scene, writer: W) -> Result<()> {
    let mut xml_writer = Writer::new_with_indent(writer, b' ', 2);

    xml_writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| Error::xml_write(format!("Failed to write XML declaration: {}", e)))?;

    let mut model_elem = BytesStart::new("model");
    model_elem.push_attribute(("unit", scene.unit.as_str()));
    model_elem.push_attribute(("xml:lang", "en-US"));
    model_elem.push_attribute(("xmlns", CORE_NAMESPACE));
    xml_writer
        .write_event(Event::Start(model_elem))
        .map_err(|e| Error::xml_write(format!("Failed to write model element: {}", e)))?;

    write_metadata(&mut xml_writer, "Title", &scene.name)?;
    write_metadata(&mut xml_writer, "Application", "segmesh")?;

    if scene.parts.is_empty() {
        // A root object needs at least one component, so an empty scene has
        // no objects and nothing to build
        xml_writer
            .write_event(Event::Empty(BytesStart::new("resources")))
            .map_err(|e| Error::xml_write(format!("Failed to write resources element: {}", e)))?;
        xml_writer
            .write_event(Event::Empty(BytesStart::new("build")))
            .map_err(|e| Error::xml_write(format!("Failed to write build element: {}", e)))?;
    } else {
        xml_writer
            .write_event(Event::Start(BytesStart::new("resources")))
            .map_err(|e| Error::xml_write(format!("Failed to write resources element: {}", e)))?;

        write_materials(&mut xml_writer, scene)?;
        for (index, part) in scene.parts.iter().enumerate() {
            write_part(&mut xml_writer, MATERIALS_ID + 1 + index, index, part)?;
        }
        write_root(&mut xml_writer, scene)?;

        xml_writer
            .write_event(Event::End(BytesEnd::new("resources")))
            .map_err(|e| Error::xml_write(format!("Failed to close resources element: {}", e)))?;

        write_build(&mut xml_writer, scene.root_id())?;
    }

    xml_writer
        .write_event(Event::End(BytesEnd::new("model")))
        .map_err(|e| Error::xml_write(format!("Failed to close model element: {}", e)))?;

    Ok(())
}

fn write_build<W: IoWrite>(writer: &mut Writer<W>, root_id: usize) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new("build")))
        .map_err(|e| Error::xml_write(format!("Failed to write build element: {}", e)))?;
    let mut item = BytesStart::new("item");
    item.push_attribute(("objectid", root_id.to_string().as_str()));
    writer
        .write_event(Event::Empty(item))
        .map_err(|e| Error::xml_write(format!("Failed to write item: {}", e)))?;
    writer
        .write_event(Event::End(BytesEnd::new("build")))
        .map_err(|e| Error::xml_write(format!("Failed to close build element: {}", e)))?;
    Ok(())
}

fn write_metadata<W: IoWrite>(writer: &mut Writer<W>, name: &str, value: &str) -> Result<()> {
    let mut elem = BytesStart::new("metadata");
    elem.push_attribute(("name", name));

    writer
        .write_event(Event::Start(elem))
        .map_err(|e| Error::xml_write(format!("Failed to write metadata element: {}", e)))?;
    writer
        .write_event(Event::Text(BytesText::new(value)))
        .map_err(|e| Error::xml_write(format!("Failed to write metadata value: {}", e)))?;
    writer
        .write_event(Event::End(BytesEnd::new("metadata")))
        .map_err(|e| Error::xml_write(format!("Failed to close metadata element: {}", e)))?;

    Ok(())
}

fn write_materials<W: IoWrite>(writer: &mut Writer<W>, scene: &Scene) -> Result<()> {
    let mut elem = BytesStart::new("basematerials");
    elem.push_attribute(("id", MATERIALS_ID.to_string().as_str()));
    writer
        .write_event(Event::Start(elem))
        .map_err(|e| Error::xml_write(format!("Failed to write basematerials element: {}", e)))?;

    for part in &scene.parts {
        let (r, g, b, a) = part.color;
        let color = format!("#{:02X}{:02X}{:02X}{:02X}", r, g, b, a);
        let mut base = BytesStart::new("base");
        base.push_attribute(("name", part.name.as_str()));
        base.push_attribute(("displaycolor", color.as_str()));
        writer
            .write_event(Event::Empty(base))
            .map_err(|e| Error::xml_write(format!("Failed to write base material: {}", e)))?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("basematerials")))
        .map_err(|e| Error::xml_write(format!("Failed to close basematerials element: {}", e)))?;
    Ok(())
}

fn write_part<W: IoWrite>(
    writer: &mut Writer<W>,
    id: usize,
    material_index: usize,
    part: &ScenePart,
) -> Result<()> {
    let mut elem = BytesStart::new("object");
    elem.push_attribute(("id", id.to_string().as_str()));
    elem.push_attribute(("type", "model"));
    elem.push_attribute(("name", part.name.as_str()));
    elem.push_attribute(("pid", MATERIALS_ID.to_string().as_str()));
    elem.push_attribute(("pindex", material_index.to_string().as_str()));
    writer
        .write_event(Event::Start(elem))
        .map_err(|e| Error::xml_write(format!("Failed to write object element: {}", e)))?;

    write_mesh(writer, &part.mesh)?;

    writer
        .write_event(Event::End(BytesEnd::new("object")))
        .map_err(|e| Error::xml_write(format!("Failed to close object element: {}", e)))?;
    Ok(())
}

fn write_mesh<W: IoWrite>(writer: &mut Writer<W>, mesh: &Mesh) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new("mesh")))
        .map_err(|e| Error::xml_write(format!("Failed to write mesh element: {}", e)))?;

    writer
        .write_event(Event::Start(BytesStart::new("vertices")))
        .map_err(|e| Error::xml_write(format!("Failed to write vertices element: {}", e)))?;
    for vertex in &mesh.vertices {
        let mut v_elem = BytesStart::new("vertex");
        v_elem.push_attribute(("x", (vertex.x as f32).to_string().as_str()));
        v_elem.push_attribute(("y", (vertex.y as f32).to_string().as_str()));
        v_elem.push_attribute(("z", (vertex.z as f32).to_string().as_str()));
        writer
            .write_event(Event::Empty(v_elem))
            .map_err(|e| Error::xml_write(format!("Failed to write vertex: {}", e)))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("vertices")))
        .map_err(|e| Error::xml_write(format!("Failed to close vertices element: {}", e)))?;

    writer
        .write_event(Event::Start(BytesStart::new("triangles")))
        .map_err(|e| Error::xml_write(format!("Failed to write triangles element: {}", e)))?;
    for triangle in &mesh.triangles {
        let mut t_elem = BytesStart::new("triangle");
        t_elem.push_attribute(("v1", triangle.v1.to_string().as_str()));
        t_elem.push_attribute(("v2", triangle.v2.to_string().as_str()));
        t_elem.push_attribute(("v3", triangle.v3.to_string().as_str()));
        writer
            .write_event(Event::Empty(t_elem))
            .map_err(|e| Error::xml_write(format!("Failed to write triangle: {}", e)))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("triangles")))
        .map_err(|e| Error::xml_write(format!("Failed to close triangles element: {}", e)))?;

    writer
        .write_event(Event::End(BytesEnd::new("mesh")))
        .map_err(|e| Error::xml_write(format!("Failed to close mesh element: {}", e)))?;
    Ok(())
}

fn write_root<W: IoWrite>(writer: &mut Writer<W>, scene: &Scene) -> Result<()> {
    let mut elem = BytesStart::new("object");
    elem.push_attribute(("id", scene.root_id().to_string().as_str()));
    elem.push_attribute(("type", "model"));
    elem.push_attribute(("name", scene.name.as_str()));
    writer
        .write_event(Event::Start(elem))
        .map_err(|e| Error::xml_write(format!("Failed to write object element: {}", e)))?;

    writer
        .write_event(Event::Start(BytesStart::new("components")))
        .map_err(|e| Error::xml_write(format!("Failed to write components element: {}", e)))?;
    for index in 0..scene.parts.len() {
        let mut component = BytesStart::new("component");
        component.push_attribute(("objectid", (MATERIALS_ID + 1 + index).to_string().as_str()));
        writer
            .write_event(Event::Empty(component))
            .map_err(|e| Error::xml_write(format!("Failed to write component: {}", e)))?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("components")))
        .map_err(|e| Error::xml_write(format!("Failed to close components element: {}", e)))?;

    writer
        .write_event(Event::End(BytesEnd::new("object")))
        .map_err(|e| Error::xml_write(format!("Failed to close object element: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{Triangle, Vertex};

    fn triangle_mesh(offset: f64) -> Mesh {
        Mesh {
            vertices: vec![
                Vertex::new(offset, 0.0, 0.0),
                Vertex::new(offset + 10.0, 0.0, 0.0),
                Vertex::new(offset + 5.0, 10.0, 0.0),
            ],
            triangles: vec![Triangle::new(0, 1, 2)],
        }
    }

    fn write(scene: &Scene) -> String {
        let mut buffer = Vec::new();
        write_scene_xml(scene, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn test_scene_structure() {
        let mut scene = Scene::new("combined", SceneUnit::Millimeter);
        scene.parts.push(ScenePart {
            name: "liver".to_string(),
            color: palette_color(0),
            mesh: triangle_mesh(0.0),
        });
        scene.parts.push(ScenePart {
            name: "lung".to_string(),
            color: palette_color(1),
            mesh: triangle_mesh(20.0),
        });

        let xml = write(&scene);
        assert!(xml.contains("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("unit=\"millimeter\""));
        assert!(xml.contains("<basematerials id=\"1\">"));
        assert!(xml.contains("<base name=\"liver\""));
        assert!(xml.contains(
            "<object id=\"2\" type=\"model\" name=\"liver\" pid=\"1\" pindex=\"0\">"
        ));
        assert!(xml.contains(
            "<object id=\"3\" type=\"model\" name=\"lung\" pid=\"1\" pindex=\"1\">"
        ));
        assert!(xml.contains("<object id=\"4\" type=\"model\" name=\"combined\">"));
        assert!(xml.contains("<component objectid=\"2\"/>"));
        assert!(xml.contains("<component objectid=\"3\"/>"));
        assert!(xml.contains("<item objectid=\"4\"/>"));
        assert!(xml.contains("v1=\"0\" v2=\"1\" v3=\"2\""));
        assert_eq!(xml.matches("<item ").count(), 1);
    }

    #[test]
    fn test_names_are_escaped() {
        let mut scene = Scene::new("a<b", SceneUnit::Meter);
        scene.parts.push(ScenePart {
            name: "x&y".to_string(),
            color: (1, 2, 3, 255),
            mesh: triangle_mesh(0.0),
        });
        let xml = write(&scene);
        assert!(xml.contains("name=\"x&amp;y\""));
        assert!(xml.contains("displaycolor=\"#010203FF\""));
        assert!(xml.contains("<metadata name=\"Title\">a&lt;b</metadata>"));
        assert!(xml.contains("unit=\"meter\""));
    }

    #[test]
    fn test_empty_scene_has_no_objects() {
        let scene = Scene::new("empty", SceneUnit::Millimeter);
        let xml = write(&scene);
        assert!(!xml.contains("basematerials"));
        assert!(!xml.contains("<object"));
        assert!(!xml.contains("<components"));
        assert!(!xml.contains("<item"));
        assert!(xml.contains("<resources/>"));
        assert!(xml.contains("<build/>"));
        assert!(xml.contains("<metadata name=\"Title\">empty</metadata>"));
    }

    #[test]
    fn test_palette_is_opaque_and_varied() {
        let colors: Vec<_> = (0..8).map(palette_color).collect();
        assert!(colors.iter().all(|c| c.3 == 255));
        for pair in colors.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_unit_from_nifti() {
        assert_eq!(SceneUnit::from(SpatialUnit::Unknown), SceneUnit::Millimeter);
        assert_eq!(SceneUnit::from(SpatialUnit::Micron), SceneUnit::Micron);
        assert_eq!(SceneUnit::from(SpatialUnit::Meter), SceneUnit::Meter);
    }
}
