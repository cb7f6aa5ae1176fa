//! Export bundle reader
//!
//! Parses a DataPower `export.xml` and gathers what the prompt needs from it:
//! the raw document text, the contents of every `local:///` file the export
//! ships alongside itself, and the names of the MultiProtocolGateway services
//! it defines.

use crate::log_debug;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Logical prefix of files bundled with the export
pub const LOCAL_SCHEME_PREFIX: &str = "local:///";
/// `location` attribute value for bundled files
pub const LOCAL_LOCATION: &str = "local";
/// Element type of a gateway service instance
pub const GATEWAY_ELEMENT: &str = "MultiProtocolGateway";

/// Errors raised while reading an export bundle
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed export document: {0}")]
    Parse(String),
}

/// A parsed export document plus the local files it references
#[derive(Debug, Clone)]
pub struct ExportBundle {
    pub export_xml_path: PathBuf,
    pub export_xml_text: String,
    /// `local:///name` -> file contents (or a missing-file placeholder)
    pub local_files: BTreeMap<String, String>,
    /// Gateway names in first-seen order, without duplicates
    pub mpgw_names: Vec<String>,
}

/// A `<file>` element that points at a bundled file
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileRef {
    name: String,
    src: String,
}

#[derive(Debug, Default)]
struct DocumentScan {
    file_refs: Vec<FileRef>,
    gateway_names: Vec<String>,
}

/// Read a file as text, replacing undecodable bytes
pub(crate) fn read_text_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Placeholder recorded for a referenced file that is not on disk
pub fn missing_file_placeholder(path: &Path) -> String {
    format!("/* MISSING FILE: expected at {} */\n", path.display())
}

/// Parse an export document and load the local files it references
///
/// Referenced files are resolved relative to the document's directory. A
/// missing file does not fail the run; its content becomes a placeholder
/// naming the expected path.
pub fn parse_export_bundle(export_xml_path: &Path) -> Result<ExportBundle, BundleError> {
    let export_xml_text = read_text_lossy(export_xml_path).map_err(|source| BundleError::Io {
        path: export_xml_path.to_path_buf(),
        source,
    })?;

    let scan = scan_document(&export_xml_text)?;
    log_debug!(
        "Scanned {}: {} local file reference(s), {} gateway(s)",
        export_xml_path.display(),
        scan.file_refs.len(),
        scan.gateway_names.len()
    );

    let export_dir = export_xml_path.parent().unwrap_or_else(|| Path::new("."));
    let mut local_files = BTreeMap::new();
    for file_ref in scan.file_refs {
        let src_path = export_dir.join(&file_ref.src);
        let content = if src_path.is_file() {
            read_text_lossy(&src_path).map_err(|source| BundleError::Io {
                path: src_path.clone(),
                source,
            })?
        } else {
            log_debug!(
                "Referenced file {} not found at {}",
                file_ref.name,
                src_path.display()
            );
            missing_file_placeholder(&src_path)
        };
        local_files.insert(file_ref.name, content);
    }

    Ok(ExportBundle {
        export_xml_path: export_xml_path.to_path_buf(),
        export_xml_text,
        local_files,
        mpgw_names: scan.gateway_names,
    })
}

/// Walk every element of the document once
fn scan_document(text: &str) -> Result<DocumentScan, BundleError> {
    let mut reader = Reader::from_str(text);
    reader.check_end_names(true);

    let mut scan = DocumentScan::default();
    let mut seen_gateways = HashSet::new();
    let mut depth: usize = 0;
    let mut saw_root = false;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(BundleError::Parse(format!(
                    "{e} at byte {}",
                    reader.buffer_position()
                )));
            }
        };

        match event {
            Event::Start(tag) => {
                ensure_single_root(depth, saw_root)?;
                saw_root = true;
                depth += 1;
                inspect_element(&tag, &mut scan, &mut seen_gateways)?;
            }
            Event::Empty(tag) => {
                ensure_single_root(depth, saw_root)?;
                saw_root = true;
                inspect_element(&tag, &mut scan, &mut seen_gateways)?;
            }
            Event::End(_) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| BundleError::Parse("unexpected closing tag".to_string()))?;
            }
            Event::Text(text) if depth == 0 => {
                if text.iter().any(|b| !b.is_ascii_whitespace()) {
                    return Err(BundleError::Parse(format!(
                        "text outside the document element at byte {}",
                        reader.buffer_position()
                    )));
                }
            }
            Event::CData(_) if depth == 0 => {
                return Err(BundleError::Parse(
                    "CDATA outside the document element".to_string(),
                ));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(BundleError::Parse("no element found".to_string()));
    }
    if depth > 0 {
        return Err(BundleError::Parse(format!(
            "document ended with {depth} unclosed element(s)"
        )));
    }

    Ok(scan)
}

/// A second top-level element is junk after the document element
fn ensure_single_root(depth: usize, saw_root: bool) -> Result<(), BundleError> {
    if depth == 0 && saw_root {
        return Err(BundleError::Parse(
            "junk after document element".to_string(),
        ));
    }
    Ok(())
}

/// Record a bundled-file reference or a gateway name
///
/// Only elements whose local name is exactly `file` count as file references;
/// names like `profile` or `xmlfile` are ignored.
fn inspect_element(
    tag: &BytesStart<'_>,
    scan: &mut DocumentScan,
    seen_gateways: &mut HashSet<String>,
) -> Result<(), BundleError> {
    let name = tag.name();
    let local_name = name.local_name();
    let local_name = local_name.as_ref();

    if local_name == b"file" {
        if let Some(file_ref) = local_file_ref(tag)? {
            scan.file_refs.push(file_ref);
        }
    } else if local_name.ends_with(GATEWAY_ELEMENT.as_bytes())
        && let Some(gateway) = attribute_value(tag, b"name")?
        && seen_gateways.insert(gateway.clone())
    {
        scan.gateway_names.push(gateway);
    }

    Ok(())
}

/// Returns the reference when the element names a bundled local file
fn local_file_ref(tag: &BytesStart<'_>) -> Result<Option<FileRef>, BundleError> {
    let name = attribute_value(tag, b"name")?.unwrap_or_default();
    if !name.starts_with(LOCAL_SCHEME_PREFIX) {
        return Ok(None);
    }

    let location = attribute_value(tag, b"location")?.unwrap_or_default();
    if !location.is_empty() && location != LOCAL_LOCATION {
        return Ok(None);
    }

    let src = attribute_value(tag, b"src")?.unwrap_or_default();
    if src.is_empty() {
        return Ok(None);
    }

    Ok(Some(FileRef { name, src }))
}

fn attribute_value(tag: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, BundleError> {
    for attr in tag.attributes() {
        let attr = attr.map_err(|e| BundleError::Parse(e.to_string()))?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .map_err(|e| BundleError::Parse(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}
