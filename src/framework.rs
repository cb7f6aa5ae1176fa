//! Snapshot of the existing Target framework, passed to the model as grounding.

use crate::bundle::read_text_lossy;
use crate::log_debug;
use ignore::WalkBuilder;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Framework directory under the target root
pub const FRAMEWORK_DIR: &str = "Framework";
/// Top-level framework descriptor, included when present
pub const FRAMEWORK_DESCRIPTOR: &str = "MPGW_GWS_Framework.xml";
/// Files longer than this many characters are replaced by a placeholder
pub const MAX_CONTEXT_FILE_CHARS: usize = 20_000;
/// Key of the diagnostic entry used when no framework is present
pub const NOTE_KEY: &str = "_note";

/// Collect the framework file tree under `target_root`
///
/// Keys are paths relative to `target_root` with `/` separators. A missing
/// framework directory yields a single diagnostic `_note` entry.
pub fn read_target_framework(target_root: &Path) -> BTreeMap<String, String> {
    let framework_dir = target_root.join(FRAMEWORK_DIR);
    let mut context = BTreeMap::new();

    if !framework_dir.is_dir() {
        context.insert(
            NOTE_KEY.to_string(),
            format!(
                "Framework directory not found at: {}",
                framework_dir.display()
            ),
        );
        return context;
    }

    for path in list_files(&framework_dir) {
        let text = match read_text_lossy(&path) {
            Ok(text) => text,
            Err(e) => {
                log_debug!("Skipping unreadable framework file {}: {}", path.display(), e);
                continue;
            }
        };

        let chars = text.chars().count();
        let content = if chars <= MAX_CONTEXT_FILE_CHARS {
            text
        } else {
            omitted_placeholder(chars)
        };
        context.insert(relative_key(target_root, &path), content);
    }

    let descriptor = target_root.join(FRAMEWORK_DESCRIPTOR);
    if descriptor.is_file() {
        match read_text_lossy(&descriptor) {
            Ok(text) => {
                context.insert(relative_key(target_root, &descriptor), text);
            }
            Err(e) => log_debug!("Skipping unreadable {}: {}", descriptor.display(), e),
        }
    }

    log_debug!(
        "Framework context: {} entr(ies) from {}",
        context.len(),
        target_root.display()
    );
    context
}

/// Placeholder for a file too large to include; `size` is its length in characters
pub fn omitted_placeholder(size: usize) -> String {
    format!("/* omitted (size={size} bytes) */\n")
}

/// Every regular file under `dir`, hidden and ignored files included, sorted
fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkBuilder::new(dir)
        .standard_filters(false)
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                log_debug!("Framework walk error: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|ft| !ft.is_dir()))
        .map(ignore::DirEntry::into_path)
        .collect();
    files.sort();
    files
}

fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
