// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::file::TempFile;
use crate::leaser::FileLeaser;
use crate::read_lease::ReadLease;

/// Exclusive read/write access to a scratch file.
///
/// A write lease is never revoked and does not count against the leaser's
/// budget while it is open, so I/O on it never fails with
/// [`LeaseError::Revoked`](crate::LeaseError::Revoked). Call
/// [`downgrade`](Self::downgrade) to hand the file back to the leaser as a
/// read lease; dropping the write lease instead deletes the file.
pub struct WriteLease {
    leaser: FileLeaser,
    file: Box<dyn TempFile>,
    len: u64,
}

impl WriteLease {
    pub(crate) fn new(leaser: FileLeaser, file: Box<dyn TempFile>, len: u64) -> Self {
        Self { leaser, file, len }
    }

    /// Current logical length of the file.
    pub fn size(&self) -> u64 {
        self.len
    }

    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.file.read_at(buf, offset)
    }

    /// Writes at `offset` without moving the cursor, growing the file if needed.
    pub fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let written = self.file.write_at(buf, offset)?;
        if written > 0 {
            self.len = self.len.max(offset.saturating_add(written as u64));
        }
        Ok(written)
    }

    /// Truncates or zero-extends the file to `len` bytes.
    pub fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)?;
        self.len = len;
        Ok(())
    }

    /// Returns the file to the leaser as the most recently used read lease.
    ///
    /// The new lease is charged with the current [`size`](Self::size). If that
    /// pushes the leaser over budget, older read leases are evicted before this
    /// returns. The file cursor is kept.
    pub fn downgrade(self) -> ReadLease {
        let WriteLease { leaser, file, len } = self;
        leaser.downgrade(file, len)
    }
}

impl Read for WriteLease {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for WriteLease {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let start = self.file.stream_position()?;
        let written = self.file.write(buf)?;
        if written > 0 {
            self.len = self.len.max(start.saturating_add(written as u64));
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for WriteLease {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl fmt::Debug for WriteLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteLease")
            .field("size", &self.len)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::file::{DiskFiles, MemoryFile, MemoryFiles, TempFileFactory};
    use crate::options::LeaserOptions;

    fn leaser() -> FileLeaser {
        FileLeaser::with_factory(&LeaserOptions::default(), MemoryFiles)
    }

    /// Memory file whose seeks start failing once it has been written to.
    struct SeekFailsAfterWrite {
        inner: MemoryFile,
        written: Arc<AtomicBool>,
    }

    impl Read for SeekFailsAfterWrite {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl Write for SeekFailsAfterWrite {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = self.inner.write(buf)?;
            self.written.store(true, Ordering::Relaxed);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }

    impl Seek for SeekFailsAfterWrite {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            if self.written.load(Ordering::Relaxed) {
                return Err(io::Error::other("seek failed"));
            }
            self.inner.seek(pos)
        }
    }

    impl TempFile for SeekFailsAfterWrite {
        fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
            self.inner.read_at(buf, offset)
        }

        fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
            self.inner.write_at(buf, offset)
        }

        fn set_len(&mut self, len: u64) -> io::Result<()> {
            self.inner.set_len(len)
        }
    }

    struct SeekFailsAfterWriteFiles(Arc<AtomicBool>);

    impl TempFileFactory for SeekFailsAfterWriteFiles {
        fn create(&self) -> io::Result<Box<dyn TempFile>> {
            Ok(Box::new(SeekFailsAfterWrite {
                inner: MemoryFile::new(),
                written: Arc::clone(&self.0),
            }))
        }
    }

    fn empty_write_at_keeps_real_length(leaser: &FileLeaser) {
        let mut lease = leaser.new_file().unwrap();
        assert_eq!(lease.write_at(b"", 1000).unwrap(), 0);
        assert_eq!(lease.size(), 0);

        lease.write_all(b"abc").unwrap();
        assert_eq!(lease.write_at(b"", 1000).unwrap(), 0);
        assert_eq!(lease.size(), 3);

        let file_len = lease.seek(SeekFrom::End(0)).unwrap();
        assert_eq!(file_len, 3);

        let read = lease.downgrade();
        assert_eq!(read.size(), file_len);
        assert_eq!(leaser.stats().used_bytes, file_len);
        leaser.check_invariants();
    }

    #[test]
    fn empty_write_at_does_not_grow_memory_file() {
        empty_write_at_keeps_real_length(&leaser());
    }

    #[test]
    fn empty_write_at_does_not_grow_disk_file() {
        let dir = tempfile::tempdir().unwrap();
        let leaser =
            FileLeaser::with_factory(&LeaserOptions::default(), DiskFiles::in_dir(dir.path()));
        empty_write_at_keeps_real_length(&leaser);
    }

    #[test]
    fn empty_write_at_does_not_charge_phantom_bytes() {
        let options = LeaserOptions {
            byte_limit: bytesize::ByteSize::b(10),
            ..LeaserOptions::default()
        };
        let leaser = FileLeaser::with_factory(&options, MemoryFiles);

        let mut first = leaser.new_file().unwrap();
        first.write_all(b"12345").unwrap();
        let first = first.downgrade();

        let mut second = leaser.new_file().unwrap();
        second.write_at(b"", 1 << 20).unwrap();
        let second = second.downgrade();

        assert_eq!(second.size(), 0);
        assert!(!first.is_revoked());
        assert_eq!(leaser.stats().used_bytes, 5);
    }

    #[test]
    fn cursor_write_tracks_size_when_later_seek_fails() {
        let written = Arc::new(AtomicBool::new(false));
        let leaser = FileLeaser::with_factory(
            &LeaserOptions::default(),
            SeekFailsAfterWriteFiles(Arc::clone(&written)),
        );
        let mut lease = leaser.new_file().unwrap();

        assert_eq!(lease.write(b"abc").unwrap(), 3);
        assert!(written.load(Ordering::Relaxed));
        assert_eq!(lease.size(), 3);

        // the failed position lookup is reported without touching the file
        assert!(lease.write(b"def").is_err());
        assert_eq!(lease.size(), 3);
    }

    #[test]
    fn cursor_writes_track_size() {
        let leaser = leaser();
        let mut lease = leaser.new_file().unwrap();
        assert_eq!(lease.size(), 0);

        lease.write_all(b"hello").unwrap();
        assert_eq!(lease.size(), 5);

        // overwriting in place does not grow the file
        lease.seek(SeekFrom::Start(0)).unwrap();
        lease.write_all(b"J").unwrap();
        assert_eq!(lease.size(), 5);

        // writing past the end leaves a hole
        lease.seek(SeekFrom::Start(8)).unwrap();
        lease.write_all(b"!").unwrap();
        assert_eq!(lease.size(), 9);

        let mut contents = Vec::new();
        lease.seek(SeekFrom::Start(0)).unwrap();
        lease.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"Jello\0\0\0!");
    }

    #[test]
    fn positional_io_and_truncate() {
        let leaser = leaser();
        let mut lease = leaser.new_file().unwrap();

        assert_eq!(lease.write_at(b"world", 6).unwrap(), 5);
        assert_eq!(lease.size(), 11);
        lease.write_at(b"hello ", 0).unwrap();
        assert_eq!(lease.size(), 11);

        let mut buf = [0; 11];
        assert_eq!(lease.read_at(&mut buf, 0).unwrap(), 11);
        assert_eq!(&buf, b"hello world");

        lease.truncate(5).unwrap();
        assert_eq!(lease.size(), 5);
        assert_eq!(lease.read_at(&mut buf, 0).unwrap(), 5);

        lease.truncate(20).unwrap();
        assert_eq!(lease.size(), 20);
    }

    #[test]
    fn downgrade_uses_current_size() {
        let leaser = leaser();
        let mut write = leaser.new_file().unwrap();
        write.write_all(b"abc").unwrap();

        let read = write.downgrade();
        assert_eq!(read.size(), 3);
        assert_eq!(leaser.stats().used_bytes, 3);

        let mut write = read.upgrade().unwrap();
        write.write_at(b"defgh", 3).unwrap();
        let read = write.downgrade();
        assert_eq!(read.size(), 8);
        assert_eq!(leaser.stats().used_bytes, 8);

        let mut buf = [0; 8];
        read.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf, b"abcdefgh");
        leaser.check_invariants();
    }
}
