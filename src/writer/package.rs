//! 3MF package (OPC/ZIP container) writing

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::scene::{Scene, write_scene_xml};
use crate::error::Result;

/// Path of the model part inside the package
pub const MODEL_PATH: &str = "3D/3dmodel.model";

/// Path of the content types part
pub const CONTENT_TYPES_PATH: &str = "[Content_Types].xml";

/// Path of the package relationships part
pub const RELS_PATH: &str = "_rels/.rels";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="model" ContentType="application/vnd.ms-package.3dmanufacturing-3dmodel+xml"/>
</Types>"#;

const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Target="/3D/3dmodel.model" Id="rel0" Type="http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel"/>
</Relationships>"#;

/// Create a 3MF package (ZIP archive) from model XML
///
/// Entries carry a fixed timestamp, so the same model always produces the
/// same archive bytes. Archive failures surface as [`Zip`](crate::Error::Zip), failures
/// writing entry content as [`Io`](crate::Error::Io).
pub fn create_package<W: Write + Seek>(writer: W, model_xml: &[u8]) -> Result<W> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    for (path, content) in [
        (CONTENT_TYPES_PATH, CONTENT_TYPES_XML.as_bytes()),
        (RELS_PATH, RELS_XML.as_bytes()),
        (MODEL_PATH, model_xml),
    ] {
        zip.start_file(path, options)?;
        zip.write_all(content)?;
    }

    Ok(zip.finish()?)
}

/// Write a scene as a `.3mf` file
pub fn write_3mf<P: AsRef<Path>>(path: P, scene: &Scene) -> Result<()> {
    let mut model_xml = Vec::new();
    write_scene_xml(scene, &mut model_xml)?;

    let file = BufWriter::new(File::create(path.as_ref())?);
    let mut file = create_package(file, &model_xml)?;
    file.flush()?;
    Ok(())
}
