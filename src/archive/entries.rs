//! Reading and writing archive entries.
//!
//! Archives are decoded once into a list of [`ArchiveEntry`] values held in memory; every
//! pass produces a new list and only the final one is encoded again.

use std::{
    fs::File,
    io::{Cursor, Read, Write},
    path::Path,
};

use memmap2::Mmap;
use zip::{write::SimpleFileOptions, CompressionMethod, DateTime, ZipArchive, ZipWriter};

use crate::{config::ArchiveOptions, Error, Result};

/// Deflate level used for every compressed entry.
pub const COMPRESSION_LEVEL: i64 = 9;

/// One entry of an archive.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveEntry {
    /// Path of the entry inside the archive
    pub name: String,
    /// `true` for directory entries
    pub is_dir: bool,
    /// Compression method of the original entry
    pub compression: CompressionMethod,
    /// Modification time of the original entry
    pub modified: Option<DateTime>,
    /// Unix permission bits of the original entry
    pub unix_mode: Option<u32>,
    /// Uncompressed content
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    /// A copy of this entry with new content.
    #[must_use]
    pub fn with_data(&self, data: Vec<u8>) -> Self {
        ArchiveEntry {
            data,
            ..self.clone()
        }
    }
}

/// The timestamp every entry gets unless timestamps are preserved: 1980-02-01 00:00:00.
///
/// # Errors
/// Never fails in practice; the date is within the range of the zip format.
pub fn fixed_timestamp() -> Result<DateTime> {
    DateTime::from_date_and_time(1980, 2, 1, 0, 0, 0)
        .map_err(|_| Error::Error("Fixed entry timestamp out of range".to_string()))
}

/// Map an archive file into memory.
///
/// # Errors
/// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
pub fn map_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path)?;
    // The mapping is only read while `file` is not modified by this process.
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(mmap)
}

/// Decode every entry of an archive, in archive order.
///
/// # Errors
/// Returns [`crate::Error::Archive`] for invalid archives and unsupported compression.
pub fn read_entries(data: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let mut content = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        file.read_to_end(&mut content)?;
        let modified: Option<DateTime> = file.last_modified().into();
        entries.push(ArchiveEntry {
            name: file.name().to_string(),
            is_dir: file.is_dir(),
            compression: file.compression(),
            modified,
            unix_mode: file.unix_mode(),
            data: content,
        });
    }

    Ok(entries)
}

/// Encode entries into a new archive.
///
/// Entries keep their name and order. Stored entries stay stored, everything else is
/// deflated at [`COMPRESSION_LEVEL`]. Unless `options` preserve them, timestamps are
/// replaced by [`fixed_timestamp`].
///
/// # Errors
/// Returns [`crate::Error::Archive`] if writing fails.
pub fn write_entries(entries: &[ArchiveEntry], options: ArchiveOptions) -> Result<Vec<u8>> {
    let fixed = fixed_timestamp()?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for entry in entries {
        let timestamp = if options.preserve_timestamps {
            entry.modified.unwrap_or(fixed)
        } else {
            fixed
        };

        let mut file_options = SimpleFileOptions::default().last_modified_time(timestamp);
        file_options = if entry.compression == CompressionMethod::Stored {
            file_options.compression_method(CompressionMethod::Stored)
        } else {
            file_options
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(COMPRESSION_LEVEL))
        };
        if let Some(mode) = entry.unix_mode {
            file_options = file_options.unix_permissions(mode);
        }

        if entry.is_dir {
            writer.add_directory(entry.name.as_str(), file_options)?;
        } else {
            writer.start_file(entry.name.as_str(), file_options)?;
            writer.write_all(&entry.data)?;
        }
    }

    Ok(writer.finish()?.into_inner())
}

/// Internal class name of a class entry, without any multi-release prefix.
#[must_use]
pub fn class_name_of(entry_name: &str) -> Option<&str> {
    let name = entry_name.strip_suffix(".class")?;
    if let Some(versioned) = name.strip_prefix("META-INF/versions/") {
        return versioned.split_once('/').map(|(_, class)| class);
    }
    Some(name)
}
