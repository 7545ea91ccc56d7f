use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("Source directory does not exist: {0}")]
    MissingSourceDir(PathBuf),
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("Failed to walk source directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Invalid utf-8 in path: {0:?}")]
    InvalidPath(PathBuf),
    #[error("Archive entry escapes the destination: {0}")]
    UnsafeEntry(String),
    #[error("Invalid archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
