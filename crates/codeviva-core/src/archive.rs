//! Project archive intake.
//!
//! Uploads arrive as ZIP archives. Only text files with an allowed extension
//! are kept; everything else is skipped silently.

use std::io::{Cursor, Read};
use std::path::Path;

use zip::ZipArchive;

use crate::error::ArchiveError;
use crate::model::{normalize_extension, CodeFile};

/// Entries at or above this size are skipped.
pub const MAX_ENTRY_BYTES: u64 = 500_000;

/// Extract source files from ZIP bytes.
///
/// `allowed` must already be normalized (see [`crate::model::CourseConfig::extensions`]).
pub fn extract_code_files(bytes: &[u8], allowed: &[String]) -> Result<Vec<CodeFile>, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;

    let mut files = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| ArchiveError::InvalidArchive(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }

        let name = entry.name().to_string();
        let Some(language) = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(normalize_extension)
        else {
            continue;
        };
        if !allowed.contains(&language) {
            continue;
        }
        if entry.size() == 0 || entry.size() >= MAX_ENTRY_BYTES {
            tracing::debug!("skipping {name}: {} bytes", entry.size());
            continue;
        }

        let mut raw = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut raw)
            .map_err(|e| ArchiveError::InvalidArchive(format!("{name}: {e}")))?;
        match String::from_utf8(raw) {
            Ok(content) if !content.is_empty() => files.push(CodeFile {
                name,
                content,
                language,
            }),
            Ok(_) => {}
            Err(_) => tracing::debug!("skipping {name}: not UTF-8 text"),
        }
    }

    Ok(files)
}

/// Read a ZIP archive from disk and extract its source files.
pub fn load_archive(path: &Path, allowed: &[String]) -> Result<Vec<CodeFile>, ArchiveError> {
    let bytes = std::fs::read(path).map_err(|source| ArchiveError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_code_files(&bytes, allowed)
}
