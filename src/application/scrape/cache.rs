//! Atomic persistence of the external post cache.

use std::{fs, io::Write, path::Path};

use tempfile::NamedTempFile;

use crate::domain::entities::ExternalPostCache;

use super::ScrapeError;

pub const CACHE_HEADER: &str = "# Generated by `folio scrape`; manual edits are overwritten.\n\n";

/// Serialize `cache` as TOML, prefixed by [`CACHE_HEADER`].
pub fn render_cache(cache: &ExternalPostCache) -> Result<String, ScrapeError> {
    let body = toml::to_string_pretty(cache)?;
    Ok(format!("{CACHE_HEADER}{body}"))
}

/// Replace `path` with the rendered cache. Readers observe either the old
/// file or the new one, never a partial write.
pub fn write_cache(path: &Path, cache: &ExternalPostCache) -> Result<(), ScrapeError> {
    let contents = render_cache(cache)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    fs::create_dir_all(dir).map_err(|source| ScrapeError::write(dir, source))?;

    let mut temp = NamedTempFile::new_in(dir).map_err(|source| ScrapeError::write(dir, source))?;
    temp.write_all(contents.as_bytes())
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|source| ScrapeError::write(temp.path(), source))?;
    temp.persist(path)
        .map_err(|err| ScrapeError::write(path, err.error))?;

    Ok(())
}
