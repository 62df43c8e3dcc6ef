//! Error types for segmentation export
//!
//! All errors carry a code for categorization so that CLI output and logs can
//! be grepped and matched against this table.
//!
//! # Error Codes
//!
//! Error codes follow the pattern: `E<category><number>`
//!
//! Categories:
//! - **E1xxx**: I/O and container errors
//! - **E2xxx**: File format errors (NIfTI, XML)
//! - **E3xxx**: Configuration errors (label maps, parameters)
//! - **E4xxx**: Unsupported input and conversion failures
//!
//! ## Common Error Codes
//!
//! - `E1001`: I/O error reading or writing a file
//! - `E1002`: ZIP archive error while writing a 3MF scene
//! - `E1003`: Required input file is missing
//! - `E2002`: Invalid NIfTI volume
//! - `E2003`: Invalid file format
//! - `E2005`: XML writing error
//! - `E3001`: Invalid label map
//! - `E3002`: Invalid parameter
//! - `E3003`: JSON error
//! - `E4001`: Unsupported feature
//! - `E4002`: Mesh or scene conversion failed

use std::io;
use std::path::Path;
use thiserror::Error;

/// Result type for segmentation export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading volumes, aggregating labels or
/// exporting meshes
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred while reading or writing a file
    ///
    /// **Error Code**: E1001
    ///
    /// **Common Causes**:
    /// - Output directory not writable
    /// - Insufficient permissions
    /// - Disk full
    #[error("[E1001] I/O error: {0}")]
    Io(#[from] io::Error),

    /// ZIP archive error
    ///
    /// **Error Code**: E1002
    ///
    /// **Common Causes**:
    /// - The `.3mf` destination failed while entries were being written
    #[error("[E1002] ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Required input file does not exist
    ///
    /// **Error Code**: E1003
    ///
    /// **Suggestions**:
    /// - Check the `--input` path or the data directory layout
    #[error("[E1003] Missing required file: {0}")]
    MissingFile(String),

    /// The volume is not a readable NIfTI-1 image
    ///
    /// **Error Code**: E2002
    ///
    /// **Common Causes**:
    /// - Truncated or corrupted file
    /// - Header size is not 348 in either byte order
    /// - Negative or fractional voxel values in a label volume
    #[error("[E2002] Invalid volume: {0}")]
    InvalidVolume(String),

    /// Invalid file format
    ///
    /// **Error Code**: E2003
    #[error("[E2003] Invalid format: {0}")]
    InvalidFormat(String),

    /// XML writing error
    ///
    /// **Error Code**: E2005
    #[error("[E2005] XML writing error: {0}")]
    XmlWrite(String),

    /// Label map violates its invariants
    ///
    /// **Error Code**: E3001
    ///
    /// **Common Causes**:
    /// - The same label id used by two groups or sub-parts
    /// - Duplicate group names
    /// - Composite group without sub-parts
    /// - Two group names that map to the same output file name
    #[error("[E3001] Invalid label map: {0}")]
    InvalidLabelMap(String),

    /// A numeric or path parameter is out of range
    ///
    /// **Error Code**: E3002
    #[error("[E3002] Invalid parameter: {0}")]
    InvalidParameter(String),

    /// JSON parsing or serialization error
    ///
    /// **Error Code**: E3003
    #[error("[E3003] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unsupported feature in an input file
    ///
    /// **Error Code**: E4001
    ///
    /// **Common Causes**:
    /// - Multi-channel or time-series volumes
    /// - Two-file NIfTI (`.hdr`/`.img`) pairs
    /// - Complex or RGB voxel datatypes
    #[error("[E4001] Unsupported feature: {0}")]
    Unsupported(String),

    /// A mesh or scene conversion step failed
    ///
    /// **Error Code**: E4002
    #[error("[E4002] Conversion failed: {0}")]
    Conversion(String),
}

impl Error {
    /// Create an InvalidVolume error naming the header field at fault
    ///
    /// # Example
    /// ```ignore
    /// Error::invalid_header_field("dim[1]", "must be positive")
    /// ```
    pub fn invalid_header_field(field: &str, message: &str) -> Self {
        Error::InvalidVolume(format!("Header field '{}': {}", field, message))
    }

    /// Create a MissingFile error for a path
    pub fn missing_file(path: &Path) -> Self {
        Error::MissingFile(path.display().to_string())
    }

    /// Create an InvalidLabelMap error with the offending group
    pub fn invalid_group(group: &str, message: &str) -> Self {
        Error::InvalidLabelMap(format!("Group '{}': {}", group, message))
    }

    /// Create an InvalidParameter error for a value outside its range
    ///
    /// # Arguments
    /// * `name` - The parameter name (e.g. "reduction")
    /// * `value` - The rejected value
    /// * `expected` - Human readable description of the valid range
    pub fn parameter_out_of_range(name: &str, value: impl std::fmt::Display, expected: &str) -> Self {
        Error::InvalidParameter(format!(
            "'{}' must be {}, got {}",
            name, expected, value
        ))
    }

    /// Create an XmlWrite error
    pub fn xml_write(message: String) -> Self {
        Error::XmlWrite(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_in_messages() {
        let io_err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "test"));
        assert!(io_err.to_string().contains("[E1001]"));

        let zip_err = Error::from(zip::result::ZipError::FileNotFound);
        assert!(zip_err.to_string().contains("[E1002]"));

        let missing = Error::MissingFile("seg.nii.gz".to_string());
        assert!(missing.to_string().contains("[E1003]"));

        let volume = Error::InvalidVolume("bad".to_string());
        assert!(volume.to_string().contains("[E2002]"));

        let labels = Error::InvalidLabelMap("dup".to_string());
        assert!(labels.to_string().contains("[E3001]"));

        let unsupported = Error::Unsupported("rgb".to_string());
        assert!(unsupported.to_string().contains("[E4001]"));
    }

    #[test]
    fn test_invalid_header_field_helper() {
        let err = Error::invalid_header_field("dim[1]", "must be positive");
        assert!(err.to_string().contains("'dim[1]'"));
        assert!(err.to_string().contains("must be positive"));
        assert!(err.to_string().contains("[E2002]"));
    }

    #[test]
    fn test_invalid_group_helper() {
        let err = Error::invalid_group("lung", "no sub-parts");
        assert!(err.to_string().contains("Group 'lung'"));
        assert!(err.to_string().contains("[E3001]"));
    }

    #[test]
    fn test_parameter_out_of_range_helper() {
        let err = Error::parameter_out_of_range("reduction", 1.5, "in [0, 1)");
        let msg = err.to_string();
        assert!(msg.contains("'reduction'"));
        assert!(msg.contains("in [0, 1)"));
        assert!(msg.contains("1.5"));
        assert!(msg.contains("[E3002]"));
    }

    #[test]
    fn test_missing_file_helper() {
        let err = Error::missing_file(Path::new("/data/seg.nii.gz"));
        assert!(err.to_string().contains("/data/seg.nii.gz"));
    }
}
