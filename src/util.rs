//! Small filesystem helpers shared across the pipeline.

use std::io::Write;
use std::path::Path;

/// Write `content` to `path` atomically: write to a temp file in the same
/// directory, then rename over the destination. A reader never observes a
/// half-written file.
pub fn atomic_write_str(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Sanitize an entity ID for safe use in filenames.
/// Keeps alphanumeric and hyphens; replaces everything else with underscore.
pub fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
