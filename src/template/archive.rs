//! In-memory office document package
//!
//! A `.docx` is a zip container. [`DocumentArchive`] loads every entry into
//! memory, lets the engine swap individual parts and writes the package back
//! with the original entry order and per-entry compression.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::TemplateStructureError;

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    name: String,
    compression: CompressionMethod,
    is_dir: bool,
    data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentArchive {
    entries: Vec<Entry>,
}

impl DocumentArchive {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TemplateStructureError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let mut entries = Vec::with_capacity(zip.len());

        for i in 0..zip.len() {
            let mut file = zip.by_index(i)?;
            // the declared size is untrusted; let the reader grow the buffer
            let mut data = Vec::new();
            if !file.is_dir() {
                file.read_to_end(&mut data)?;
            }
            entries.push(Entry {
                name: file.name().to_string(),
                compression: match file.compression() {
                    CompressionMethod::Stored => CompressionMethod::Stored,
                    _ => CompressionMethod::Deflated,
                },
                is_dir: file.is_dir(),
                data,
            });
        }

        debug!(entries = entries.len(), "loaded document archive");
        Ok(Self { entries })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, TemplateStructureError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|e| !e.is_dir && e.name == name)
            .map(|e| e.data.as_slice())
    }

    /// Part content as UTF-8 text. A missing part is a structural error.
    pub fn part_str(&self, name: &str) -> Result<&str, TemplateStructureError> {
        let bytes = self
            .part(name)
            .ok_or_else(|| TemplateStructureError::MissingPart(name.to_string()))?;
        std::str::from_utf8(bytes).map_err(|_| TemplateStructureError::Encoding(name.to_string()))
    }

    /// Replaces a part in place, or appends it as a deflated entry.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        match self.entries.iter_mut().find(|e| !e.is_dir && e.name == name) {
            Some(entry) => entry.data = data,
            None => self.entries.push(Entry {
                name: name.to_string(),
                compression: CompressionMethod::Deflated,
                is_dir: false,
                data,
            }),
        }
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter(|e| !e.is_dir).map(|e| e.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TemplateStructureError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

        for entry in &self.entries {
            let options = SimpleFileOptions::default().compression_method(entry.compression);
            if entry.is_dir {
                writer.add_directory(entry.name.as_str(), options)?;
            } else {
                writer.start_file(entry.name.as_str(), options)?;
                writer.write_all(&entry.data)?;
            }
        }

        Ok(writer.finish()?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file("[Content_Types].xml", stored).unwrap();
        writer.write_all(b"<Types/>").unwrap();
        writer.add_directory("word/", stored).unwrap();
        writer.start_file("word/document.xml", deflated).unwrap();
        writer.write_all(b"<w:document/>").unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_reads_parts_and_skips_directories() {
        let archive = DocumentArchive::from_bytes(&sample()).unwrap();
        assert_eq!(archive.len(), 3);
        let names: Vec<&str> = archive.part_names().collect();
        assert_eq!(names, vec!["[Content_Types].xml", "word/document.xml"]);
        assert_eq!(archive.part_str("word/document.xml").unwrap(), "<w:document/>");
    }

    #[test]
    fn test_missing_part_is_structural_error() {
        let archive = DocumentArchive::from_bytes(&sample()).unwrap();
        assert!(matches!(
            archive.part_str("word/missing.xml"),
            Err(TemplateStructureError::MissingPart(_))
        ));
    }

    #[test]
    fn test_rewrite_keeps_order_and_compression() {
        let mut archive = DocumentArchive::from_bytes(&sample()).unwrap();
        archive.set_part("word/document.xml", b"<w:document>x</w:document>".to_vec());
        let bytes = archive.to_bytes().unwrap();

        let reread = DocumentArchive::from_bytes(&bytes).unwrap();
        assert_eq!(reread, archive);

        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(zip.by_index(0).unwrap().compression(), CompressionMethod::Stored);
        assert_eq!(zip.by_index(2).unwrap().compression(), CompressionMethod::Deflated);
    }

    /// One empty stored entry whose zip64 central record claims `claimed` bytes.
    fn zip64_with_claimed_size(name: &str, claimed: u64) -> Vec<u8> {
        let name = name.as_bytes();
        let mut out = Vec::new();

        // local file header, sizes zero
        out.extend_from_slice(&0x0403_4b50u32.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes());
        out.extend_from_slice(&[0u8; 2 + 2 + 2 + 2]);
        out.extend_from_slice(&[0u8; 4 + 4 + 4]);
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name);

        let cd_offset = out.len() as u32;
        let mut extra = Vec::new();
        extra.extend_from_slice(&0x0001u16.to_le_bytes());
        extra.extend_from_slice(&16u16.to_le_bytes());
        extra.extend_from_slice(&claimed.to_le_bytes());
        extra.extend_from_slice(&0u64.to_le_bytes());

        out.extend_from_slice(&0x0201_4b50u32.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes());
        out.extend_from_slice(&[0u8; 2 + 2 + 2 + 2]);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0u8; 2 + 2 + 2 + 4]);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&extra);
        let cd_size = out.len() as u32 - cd_offset;

        out.extend_from_slice(&0x0605_4b50u32.to_le_bytes());
        out.extend_from_slice(&[0u8; 2 + 2]);
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    #[test]
    fn test_inflated_declared_size_does_not_abort() {
        let bytes = zip64_with_claimed_size("word/document.xml", u64::MAX / 2);
        // whatever the zip reader makes of the record, it must come back as a value
        if let Ok(archive) = DocumentArchive::from_bytes(&bytes) {
            assert_eq!(archive.part("word/document.xml"), Some(&b""[..]));
        }
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            DocumentArchive::from_bytes(b"not a zip"),
            Err(TemplateStructureError::Archive(_))
        ));
    }
}
