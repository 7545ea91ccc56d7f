use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::entry_point::EntryPoint;
use crate::error::PackageError;

/// Name of the archive, both on local disk and as the final segment of its storage key.
pub const SOURCE_ARCHIVE_NAME: &str = "source.zip";

/// A packaged source tree written to local scratch space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArchive {
    path: PathBuf,
    name: String,
    checksum: String,
    file_count: usize,
    uncompressed_size: u64,
    entry_point: Option<EntryPoint>,
}

impl PackagedArchive {
    /// Absolute path of the archive on local disk.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hex encoded SHA-256 of the archive bytes.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn file_count(&self) -> usize {
        self.file_count
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    pub fn entry_point(&self) -> Option<EntryPoint> {
        self.entry_point
    }

    pub fn read_bytes(&self) -> Result<Vec<u8>, PackageError> {
        Ok(std::fs::read(&self.path)?)
    }
}

struct ArchiveFile {
    rel_path: String,
    disk_path: PathBuf,
}

/// Bundles a source directory into a single archive.
#[derive(Debug, Clone, derive_new::new)]
pub struct ArtifactPackager {
    output_dir: PathBuf,
    #[new(value = "SOURCE_ARCHIVE_NAME.to_string()")]
    file_name: String,
}

impl ArtifactPackager {
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Package every file under `source_dir`, keeping paths relative to its root.
    ///
    /// Symlinks are followed. Any unreadable file or directory fails the whole package.
    pub fn package(&self, source_dir: &Path) -> Result<PackagedArchive, PackageError> {
        if !source_dir.exists() {
            return Err(PackageError::MissingSourceDir(source_dir.to_path_buf()));
        }
        if !source_dir.is_dir() {
            return Err(PackageError::NotADirectory(source_dir.to_path_buf()));
        }

        let files = list_files(source_dir)?;
        let entry_point = EntryPoint::detect(files.iter().map(|f| f.rel_path.as_str()));
        let file_count = files.len();

        std::fs::create_dir_all(&self.output_dir)?;
        let output_dir = self.output_dir.canonicalize()?;
        let tmp_path = output_dir.join(format!(".{}", self.file_name));
        let dst_path = output_dir.join(&self.file_name);

        log::info!(
            "Packaging {} files from {} into {}",
            file_count,
            source_dir.display(),
            self.file_name
        );

        let file = File::create(&tmp_path)?;
        let uncompressed_size = write_zip(files, file)?;
        std::fs::rename(&tmp_path, &dst_path)?;

        let checksum = {
            let data = std::fs::read(&dst_path)?;
            format!("{:x}", Sha256::digest(&data))
        };

        let compressed_size = std::fs::metadata(&dst_path)?.len();
        let uncompressed = human_readable_bytes(uncompressed_size);
        let compressed = human_readable_bytes(compressed_size);
        log::info!(
            "Packaged {} files, {:.1}{} ({:.1}{} compressed)",
            file_count,
            uncompressed.0,
            uncompressed.1,
            compressed.0,
            compressed.1,
        );

        Ok(PackagedArchive {
            path: dst_path,
            name: self.file_name.clone(),
            checksum,
            file_count,
            uncompressed_size,
            entry_point,
        })
    }
}

/// Lists every regular file below `root`, sorted by relative path.
fn list_files(root: &Path) -> Result<Vec<ArchiveFile>, PackageError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| PackageError::InvalidPath(entry.path().to_path_buf()))?;
        let rel_str = rel
            .to_str()
            .ok_or_else(|| PackageError::InvalidPath(rel.to_path_buf()))?;
        files.push(ArchiveFile {
            rel_path: rel_str.replace('\\', "/"),
            disk_path: entry.into_path(),
        });
    }

    files.sort_unstable_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

/// Compresses the files into `dst`. Returns the uncompressed size of the contents.
///
/// Every entry carries the same modification time and permissions.
fn write_zip(files: Vec<ArchiveFile>, dst: File) -> Result<u64, PackageError> {
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);

    let mut zip = ZipWriter::new(dst);

    let mut uncompressed_size: u64 = 0;
    for ArchiveFile {
        rel_path,
        disk_path,
    } in files
    {
        let mut file = File::open(&disk_path)?;
        zip.start_file(rel_path, options)?;
        uncompressed_size += std::io::copy(&mut file, &mut zip)?;
    }

    let mut dst = zip.finish()?;
    dst.flush()?;
    Ok(uncompressed_size)
}

/// Formats a number of bytes into a human readable SI-prefixed size.
/// Returns a tuple of `(quantity, units)`.
fn human_readable_bytes(bytes: u64) -> (f32, &'static str) {
    static UNITS: [&str; 7] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB"];
    if bytes == 0 {
        return (0.0, UNITS[0]);
    }
    let bytes = bytes as f32;
    let i = ((bytes.log2() / 10.0) as usize).min(UNITS.len() - 1);
    (bytes / 1024_f32.powi(i as i32), UNITS[i])
}
