//
// archive.rs
// Dicom-Inference-Client
//
// Packs serialized records into a single zip archive for upload and unpacks result archives.
//
// Thales Matheus Mendonça Santos - November 2025

use std::io::{Cursor, Read, Write};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{Error, Result};

/// A named byte stream inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub data: Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

pub fn compress(entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in entries {
        writer.start_file(entry.name.as_str(), options)?;
        writer
            .write_all(&entry.data)
            .map_err(|e| Error::Archive(e.to_string()))?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Unpack every file entry, skipping directory markers, in archive order.
pub fn decompress(bytes: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());

    for idx in 0..archive.len() {
        let mut file = archive.by_index(idx)?;
        if file.is_dir() {
            continue;
        }
        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)
            .map_err(|e| Error::Archive(e.to_string()))?;
        entries.push(ArchiveEntry::new(file.name(), data));
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_survive_compression_in_order() {
        let entries = vec![
            ArchiveEntry::new("channel_0/image_0.dcm", b"first".to_vec()),
            ArchiveEntry::new("channel_1/image_0.dcm", vec![0u8; 4096]),
        ];
        let bytes = compress(&entries).expect("compress");
        assert!(bytes.starts_with(b"PK"));

        let restored = decompress(&bytes).expect("decompress");
        assert_eq!(restored, entries);
    }

    #[test]
    fn empty_archive_has_no_entries() {
        let bytes = compress(&[]).expect("compress");
        assert!(decompress(&bytes).expect("decompress").is_empty());
    }

    #[test]
    fn invalid_bytes_are_an_archive_error() {
        let err = decompress(b"not a zip").unwrap_err();
        assert!(matches!(err, Error::Archive(_)));
    }
}
