// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Backing storage for leases.
//!
//! The lease engine never creates or deletes files by path. It asks a
//! [`TempFileFactory`] for an anonymous [`TempFile`] and drops it once the
//! owning lease is done with it; dropping the file must release its storage.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A scratch file owned by exactly one lease at a time.
///
/// Besides the cursor-based `Read`/`Write`/`Seek` traits, implementations
/// must support positional I/O. Positional operations do not move the cursor
/// where the platform allows it.
pub trait TempFile: Read + Write + Seek + Send + Sync + 'static {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Truncates or extends the file to exactly `len` bytes.
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

/// Creates empty [`TempFile`]s for a [`FileLeaser`](crate::FileLeaser).
pub trait TempFileFactory: Send + Sync + 'static {
    fn create(&self) -> io::Result<Box<dyn TempFile>>;
}

impl TempFile for File {
    #[cfg(unix)]
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::read_at(&*self, buf, offset)
    }

    #[cfg(unix)]
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        std::os::unix::fs::FileExt::write_at(&*self, buf, offset)
    }

    // seek_read/seek_write move the cursor on windows, restore it afterwards.
    #[cfg(windows)]
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let pos = self.stream_position()?;
        let result = std::os::windows::fs::FileExt::seek_read(&*self, buf, offset);
        self.seek(SeekFrom::Start(pos))?;
        result
    }

    #[cfg(windows)]
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let pos = self.stream_position()?;
        let result = std::os::windows::fs::FileExt::seek_write(&*self, buf, offset);
        self.seek(SeekFrom::Start(pos))?;
        result
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// Anonymous files on local disk.
///
/// Files are unlinked as soon as they are created (see [`tempfile::tempfile`]),
/// so the kernel reclaims them when the last handle closes, even if the
/// process crashes.
#[derive(Debug, Clone, Default)]
pub struct DiskFiles {
    dir: Option<PathBuf>,
}

impl DiskFiles {
    /// Creates files in the system temp directory.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }
}

impl TempFileFactory for DiskFiles {
    fn create(&self) -> io::Result<Box<dyn TempFile>> {
        let file = match &self.dir {
            Some(dir) => tempfile::tempfile_in(dir)?,
            None => tempfile::tempfile()?,
        };
        Ok(Box::new(file))
    }
}

/// Heap-backed scratch file.
#[derive(Debug, Default)]
pub struct MemoryFile(Cursor<Vec<u8>>);

impl MemoryFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

impl TempFile for MemoryFile {
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let data = self.0.get_ref();
        let start = usize::try_from(offset).map_or(data.len(), |o| o.min(data.len()));
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        // an empty write never extends the file, same as pwrite(2)
        if buf.is_empty() {
            return Ok(0);
        }
        let start = usize::try_from(offset)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"))?;
        let data = self.0.get_mut();
        if data.len() < end {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length out of range"))?;
        self.0.get_mut().resize(len, 0);
        Ok(())
    }
}

/// Creates [`MemoryFile`]s. Mostly useful for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryFiles;

impl TempFileFactory for MemoryFiles {
    fn create(&self) -> io::Result<Box<dyn TempFile>> {
        Ok(Box::new(MemoryFile::new()))
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    fn exercise_positional_io(file: &mut dyn TempFile) {
        assert_eq!(file.write_at(b"world", 6).unwrap(), 5);
        assert_eq!(file.write_at(b"hello ", 0).unwrap(), 6);

        // positional writes leave the cursor alone
        assert_eq!(file.stream_position().unwrap(), 0);

        let mut buf = [0u8; 11];
        assert_eq!(file.read_at(&mut buf, 0).unwrap(), 11);
        assert_eq!(&buf, b"hello world");

        let mut tail = [0u8; 8];
        assert_eq!(file.read_at(&mut tail, 6).unwrap(), 5);
        assert_eq!(&tail[..5], b"world");

        assert_eq!(file.read_at(&mut tail, 100).unwrap(), 0);

        file.set_len(5).unwrap();
        assert_eq!(file.seek(SeekFrom::End(0)).unwrap(), 5);
    }

    #[test]
    fn memory_file_positional_io() {
        let mut file = MemoryFiles.create().unwrap();
        exercise_positional_io(file.as_mut());
    }

    #[test]
    fn disk_file_positional_io() {
        let dir = tempfile::tempdir().unwrap();
        let files = DiskFiles::in_dir(dir.path());
        assert_eq!(files.dir(), Some(dir.path()));

        let mut file = files.create().unwrap();
        exercise_positional_io(file.as_mut());
    }

    #[test]
    fn memory_file_write_at_extends_with_zeros() {
        let mut file = MemoryFile::new();
        assert!(file.is_empty());
        file.write_at(b"x", 3).unwrap();
        assert_eq!(file.len(), 4);

        let mut buf = [0xffu8; 4];
        file.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"\0\0\0x");
    }

    #[test]
    fn empty_write_at_leaves_length_alone() {
        let mut file = MemoryFile::new();
        assert_eq!(file.write_at(b"", 1000).unwrap(), 0);
        assert!(file.is_empty());

        let dir = tempfile::tempdir().unwrap();
        let mut file = DiskFiles::in_dir(dir.path()).create().unwrap();
        assert_eq!(file.write_at(b"", 1000).unwrap(), 0);
        assert_eq!(file.seek(SeekFrom::End(0)).unwrap(), 0);
    }

    #[test]
    fn memory_file_cursor_io() {
        let mut file = MemoryFile::new();
        file.write_all(b"abcdef").unwrap();
        file.seek(SeekFrom::Start(2)).unwrap();

        let mut buf = [0u8; 3];
        file.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"cde");
    }
}
