use crate::error::RustyBatchError;
use std::fs::File;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::path::Path;

/// A unified reader over a workbook on disk or already materialized in memory
pub(crate) enum UnifiedReader {
    /// Local file reader
    Local(BufReader<File>),
    /// Uploaded bytes
    Memory(Cursor<Vec<u8>>),
}

impl UnifiedReader {
    /// Opens a local workbook file
    pub(crate) fn open<P: AsRef<Path>>(path: P) -> Result<UnifiedReader, RustyBatchError> {
        let file = File::open(path)?;
        Ok(UnifiedReader::Local(BufReader::new(file)))
    }

    /// Wraps workbook bytes received from an upload
    pub(crate) fn from_bytes(bytes: Vec<u8>) -> UnifiedReader {
        UnifiedReader::Memory(Cursor::new(bytes))
    }
}

impl Read for UnifiedReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            UnifiedReader::Local(reader) => reader.read(buf),
            UnifiedReader::Memory(reader) => reader.read(buf),
        }
    }
}

impl Seek for UnifiedReader {
    fn seek(&mut self, pos: std::io::SeekFrom) -> std::io::Result<u64> {
        match self {
            UnifiedReader::Local(reader) => reader.seek(pos),
            UnifiedReader::Memory(reader) => reader.seek(pos),
        }
    }
}
