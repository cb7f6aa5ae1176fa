//! Response parsing and guarded file materialization
//!
//! The model is asked for `{"summary": ..., "files": [{"path", "content"}]}`.
//! Entries are validated and written one at a time; an entry that fails a
//! check stops the batch, leaving earlier entries on disk.

use crate::ui;
use crate::{log_debug, log_warn};
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

/// Where an unparseable model response is kept, relative to the repo root
pub const RAW_OUTPUT_PATH: &str = "tools/out/tachyon_raw_output.txt";

static TRAILING_OBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{[\s\S]*\}$").expect("trailing object pattern should compile")
});

/// Errors raised while validating or writing file entries
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Invalid file path entry: {0}")]
    InvalidPath(String),
    #[error("Invalid file content entry for {0}")]
    InvalidContent(String),
    #[error("Refusing to write outside repo: {0}")]
    OutsideRepo(String),
    #[error("Refusing to overwrite existing file without --force: {0}")]
    AlreadyExists(String),
    #[error("Failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One file the model asked to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilePayload {
    /// Path relative to the repository root
    pub path: String,
    pub content: String,
}

impl FilePayload {
    /// Validate a raw `files[]` entry
    pub fn from_value(entry: &Value) -> Result<Self, WriteError> {
        let path = entry
            .get("path")
            .and_then(Value::as_str)
            .filter(|path| !path.is_empty())
            .ok_or_else(|| WriteError::InvalidPath(entry.to_string()))?;

        let content = entry
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| WriteError::InvalidContent(path.to_string()))?;

        Ok(Self {
            path: path.to_string(),
            content: content.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Validate and report, touch nothing
    pub dry_run: bool,
    /// Allow replacing existing files
    pub force: bool,
}

/// What happened to one entry
///
/// `size` is the content length in characters. `Display` renders the line
/// printed for the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteAction {
    Planned { path: String, size: usize },
    Written { path: String, size: usize },
}

impl WriteAction {
    pub fn path(&self) -> &str {
        match self {
            Self::Planned { path, .. } | Self::Written { path, .. } => path,
        }
    }
}

impl fmt::Display for WriteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planned { path, size } => {
                write!(f, "[dry-run] would write: {path} ({size} bytes)")
            }
            Self::Written { path, .. } => write!(f, "[write] {path}"),
        }
    }
}

/// Parse the model's reply as a JSON value
///
/// Text that does not start with `{` is narrowed to the span from its first
/// `{` to a closing `}` that ends the text, if there is one.
pub fn parse_llm_json(text: &str) -> Result<Value, serde_json::Error> {
    let mut candidate = text.trim();

    if !candidate.starts_with('{')
        && let Some(m) = TRAILING_OBJECT.find(candidate)
    {
        log_debug!("Discarding {} leading byte(s) of model output", m.start());
        candidate = m.as_str();
    }

    serde_json::from_str(candidate)
}

/// The `files` array of a payload, if the payload has one
pub fn extract_files(payload: &Value) -> Option<&Vec<Value>> {
    payload.get("files").and_then(Value::as_array)
}

/// The payload's summary as display text
pub fn extract_summary(payload: &Value) -> String {
    match payload.get("summary") {
        Some(Value::String(summary)) => summary.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Persist an unparseable response for postmortem
pub fn save_raw_output(repo_root: &Path, raw: &str) -> io::Result<PathBuf> {
    let path = repo_root.join(RAW_OUTPUT_PATH);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, raw)?;
    Ok(path)
}

/// Validate and write each entry in order
///
/// Every destination must resolve inside `repo_root`, and an existing file is
/// only replaced with `force`. The first failing entry aborts the batch.
pub fn safe_write_files(
    repo_root: &Path,
    entries: &[Value],
    options: WriteOptions,
) -> Result<Vec<WriteAction>, WriteError> {
    let root = fs::canonicalize(repo_root).map_err(|source| WriteError::Io {
        path: repo_root.to_path_buf(),
        source,
    })?;

    let mut actions = Vec::with_capacity(entries.len());
    for entry in entries {
        let payload = FilePayload::from_value(entry)?;
        let Some(out_path) = resolve_destination(&root, &payload.path) else {
            log_warn!("Refusing to write outside {}: {}", root.display(), payload.path);
            return Err(WriteError::OutsideRepo(payload.path));
        };

        if out_path.exists() && !options.force {
            log_warn!("Refusing to overwrite {}", out_path.display());
            return Err(WriteError::AlreadyExists(payload.path));
        }

        let size = payload.content.chars().count();
        if options.dry_run {
            let action = WriteAction::Planned {
                path: payload.path,
                size,
            };
            ui::print_message(&action.to_string());
            actions.push(action);
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|source| WriteError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&out_path, &payload.content).map_err(|source| WriteError::Io {
            path: out_path.clone(),
            source,
        })?;
        log_debug!("Wrote {} ({} chars)", out_path.display(), size);
        let action = WriteAction::Written {
            path: payload.path,
            size,
        };
        ui::print_message(&action.to_string());
        actions.push(action);
    }

    Ok(actions)
}

/// Resolve `relative` against the canonical `root`
///
/// Returns `None` unless the result is `root` itself or lies beneath it.
/// Symlinks along the existing part of the path are followed, so a link that
/// points out of the repository is caught too.
fn resolve_destination(root: &Path, relative: &str) -> Option<PathBuf> {
    let resolved = resolve_existing_prefix(&normalize_lexically(&root.join(relative)));
    (resolved == root || resolved.starts_with(root)).then_some(resolved)
}

/// Collapse `.` and `..` without touching the filesystem
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// Canonicalize the deepest existing ancestor and re-attach the rest
fn resolve_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut remainder = Vec::new();

    loop {
        if let Ok(canonical) = fs::canonicalize(&existing) {
            let mut resolved = canonical;
            for part in remainder.iter().rev() {
                resolved.push(part);
            }
            return resolved;
        }
        match (existing.file_name().map(ToOwned::to_owned), existing.parent()) {
            (Some(name), Some(parent)) => {
                remainder.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}
