use std::collections::BTreeMap;
use std::io::{Cursor, Read};
use std::path::{Component, Path};

use zip::ZipArchive;

use crate::error::PackageError;

/// Read every regular file of an archive into memory, keyed by its relative path.
pub fn read_archive(bytes: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, PackageError> {
    let mut ar = ZipArchive::new(Cursor::new(bytes))?;
    let mut files = BTreeMap::new();

    for index in 0..ar.len() {
        let mut entry = ar.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let rel = entry.name().to_string();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        files.insert(rel, contents);
    }

    Ok(files)
}

/// Unpack an archive below `dest`, refusing entries that would land outside of it.
pub fn unpack_archive(bytes: &[u8], dest: &Path) -> Result<usize, PackageError> {
    let files = read_archive(bytes)?;
    let count = files.len();

    for (rel, contents) in files {
        let rel_path = Path::new(&rel);
        if rel_path
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(PackageError::UnsafeEntry(rel));
        }
        let target = dest.join(rel_path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, contents)?;
    }

    Ok(count)
}
