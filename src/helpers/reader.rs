use crate::error::SovError;
use std::io::Cursor;
use zip::ZipArchive;

/// Signature of OLE compound documents (encrypted xlsx packages and legacy .xls files)
const COMPOUND_DOCUMENT_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// An immutable in-memory workbook buffer.
///
/// Every scan gets its own cursor, so a reader that consumed or seeked a
/// previous cursor can never affect the next one.
#[derive(Copy, Clone, Debug)]
pub(crate) struct WorkbookBytes<'a> {
    data: &'a [u8],
}

impl<'a> WorkbookBytes<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        WorkbookBytes { data }
    }

    /// Creates a fresh read cursor positioned at the start of the buffer
    pub(crate) fn cursor(&self) -> Cursor<&'a [u8]> {
        Cursor::new(self.data)
    }

    /// Opens a fresh ZIP archive view over the buffer
    pub(crate) fn archive(&self) -> Result<ZipArchive<Cursor<&'a [u8]>>, SovError> {
        Ok(ZipArchive::new(self.cursor())?)
    }

    /// Checks whether the buffer is an OLE compound document instead of a ZIP package
    pub(crate) fn is_compound_document(&self) -> bool {
        self.data.starts_with(&COMPOUND_DOCUMENT_SIGNATURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_cursors_are_independent() {
        let bytes = WorkbookBytes::new(b"PK\x03\x04payload");
        let mut first = bytes.cursor();
        let mut buffer = [0u8; 4];
        first.read_exact(&mut buffer).unwrap();
        assert_eq!(&buffer, b"PK\x03\x04");

        let mut second = bytes.cursor();
        second.read_exact(&mut buffer).unwrap();
        assert_eq!(&buffer, b"PK\x03\x04");
    }

    #[test]
    fn test_compound_document_detection() {
        let mut data = COMPOUND_DOCUMENT_SIGNATURE.to_vec();
        data.extend_from_slice(&[0u8; 16]);
        assert!(WorkbookBytes::new(&data).is_compound_document());
        assert!(!WorkbookBytes::new(b"PK\x03\x04").is_compound_document());
    }

    #[test]
    fn test_archive_rejects_garbage() {
        assert!(WorkbookBytes::new(b"not a zip file").archive().is_err());
    }
}
