//! Packaging of optimization source trees.
//!
//! A source directory is bundled into a single zip archive with every file stored under its
//! path relative to the directory root. Entries are written in path order with a fixed
//! modification time, so packaging the same tree twice yields the same bytes.

mod archive;
mod entry_point;
mod error;
mod reader;

pub use archive::{ArtifactPackager, PackagedArchive, SOURCE_ARCHIVE_NAME};
pub use entry_point::EntryPoint;
pub use error::PackageError;
pub use reader::{read_archive, unpack_archive};
