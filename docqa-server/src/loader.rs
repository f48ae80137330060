//! Loading plain-text documents from disk.

use std::path::{Path, PathBuf};

use anyhow::bail;
use docqa_rag::Document;
use tracing::{debug, warn};
use walkdir::WalkDir;

const EXTENSIONS: &[&str] = &["txt", "md"];

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

/// Symlinks are not followed, so a link cycle cannot repeat files.
fn collect_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| {
            entry.inspect_err(|e| warn!(error = %e, "skipping unreadable directory entry")).ok()
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let keep = is_text_file(entry.path());
            if !keep {
                debug!(path = %entry.path().display(), "skipping non-text file");
            }
            keep
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Load every `.txt` and `.md` file under `paths`, walking directories recursively.
///
/// The file path is the document id, so re-ingesting a file replaces its
/// earlier passages. Documents come back sorted by id. Files that cannot be
/// read as UTF-8 text are logged and skipped.
pub fn load_documents(paths: &[PathBuf]) -> anyhow::Result<Vec<Document>> {
    let mut files = Vec::new();
    for path in paths {
        if !path.exists() {
            bail!("{} does not exist", path.display());
        }
        files.extend(collect_files(path));
    }
    files.sort();
    files.dedup();

    let documents = files
        .into_iter()
        .filter_map(|file| match std::fs::read_to_string(&file) {
            Ok(text) => {
                let id = file.display().to_string();
                let name =
                    file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
                Some(Document::new(id.clone(), text).with_source_uri(id).with_metadata("file_name", name))
            }
            Err(e) => {
                warn!(path = %file.display(), error = %e, "skipping unreadable file");
                None
            }
        })
        .collect();
    Ok(documents)
}
