//! Split volumes presented as one contiguous stream
//!
//! A volume with a split size is stored as numbered files: file 0 is the
//! volume path itself and file `k > 0` is `<path>.<k:03>`. File `k` holds the
//! logical range `[k * split, (k + 1) * split)`. Files are opened lazily and
//! only one handle is held at a time.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::fs::{FileSystem, VolumeFile};

/// Path of split file `index` of a volume
pub fn split_file_path(base: &Path, index: u64) -> PathBuf {
    if index == 0 {
        return base.to_path_buf();
    }
    let mut name = base.as_os_str().to_os_string();
    name.push(format!(".{index:03}"));
    PathBuf::from(name)
}

/// Virtual stream over the split files of one volume
pub struct MultiVolumeStream<'a> {
    fs: &'a dyn FileSystem,
    base: PathBuf,
    split_size: u64,
    writable: bool,
    position: u64,
    current: Option<(u64, Box<dyn VolumeFile>)>,
}

impl std::fmt::Debug for MultiVolumeStream<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiVolumeStream")
            .field("base", &self.base)
            .field("split_size", &self.split_size)
            .field("position", &self.position)
            .field("current", &self.current.as_ref().map(|(index, _)| *index))
            .finish()
    }
}

impl<'a> MultiVolumeStream<'a> {
    /// Open a volume for reading
    ///
    /// A split size of zero means the volume is a single unbounded file.
    pub fn open(fs: &'a dyn FileSystem, base: impl AsRef<Path>, split_size: u64) -> Self {
        Self {
            fs,
            base: base.as_ref().to_path_buf(),
            split_size,
            writable: false,
            position: 0,
            current: None,
        }
    }

    /// Open a volume for reading and writing; missing split files are created
    pub fn open_writable(
        fs: &'a dyn FileSystem,
        base: impl AsRef<Path>,
        split_size: u64,
    ) -> Self {
        Self {
            writable: true,
            ..Self::open(fs, base, split_size)
        }
    }

    /// Split size in bytes (zero when the volume is not split)
    pub const fn split_size(&self) -> u64 {
        self.split_size
    }

    /// Current logical position
    pub const fn position(&self) -> u64 {
        self.position
    }

    fn file_index(&self, position: u64) -> u64 {
        if self.split_size == 0 {
            0
        } else {
            position / self.split_size
        }
    }

    fn file_offset(&self, position: u64) -> u64 {
        if self.split_size == 0 {
            position
        } else {
            position % self.split_size
        }
    }

    /// Bytes left in the current split file from `position`
    fn room_in_file(&self, position: u64) -> u64 {
        if self.split_size == 0 {
            u64::MAX
        } else {
            self.split_size - self.file_offset(position)
        }
    }

    /// Make the handle for the file covering the current position active
    ///
    /// Returns `false` when reading and that file does not exist.
    fn activate(&mut self) -> io::Result<bool> {
        let index = self.file_index(self.position);
        let offset = self.file_offset(self.position);

        if self.current.as_ref().is_some_and(|(i, _)| *i == index) {
            if let Some((_, file)) = self.current.as_mut() {
                file.seek(SeekFrom::Start(offset))?;
            }
            return Ok(true);
        }

        if let Some((_, mut previous)) = self.current.take() {
            previous.flush()?;
        }

        let path = split_file_path(&self.base, index);
        let mut file = if self.writable {
            self.fs.open_read_write(&path)?
        } else {
            if !self.fs.exists(&path) {
                return Ok(false);
            }
            self.fs.open_read(&path)?
        };

        debug!("Switched to split file {}", path.display());
        file.seek(SeekFrom::Start(offset))?;
        self.current = Some((index, file));
        Ok(true)
    }

    /// Total logical length
    ///
    /// Scans forward from the current split file to the last existing one.
    pub fn len(&mut self) -> io::Result<u64> {
        if let Some((_, file)) = self.current.as_mut() {
            file.flush()?;
        }

        let start = self.current.as_ref().map_or(0, |(index, _)| *index);
        let Some(index) = self
            .last_existing_from(start)
            .or_else(|| self.last_existing_from(0))
        else {
            return Ok(0);
        };

        let path = split_file_path(&self.base, index);
        Ok(index * self.split_size + self.fs.file_len(&path)?)
    }

    /// Whether the volume holds no bytes
    pub fn is_empty(&mut self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    fn last_existing_from(&self, start: u64) -> Option<u64> {
        if !self.fs.exists(&split_file_path(&self.base, start)) {
            return None;
        }
        let mut index = start;
        if self.split_size > 0 {
            while self.fs.exists(&split_file_path(&self.base, index + 1)) {
                index += 1;
            }
        }
        Some(index)
    }
}

impl Read for MultiVolumeStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut total = 0;

        while total < buf.len() {
            if !self.activate()? {
                break;
            }

            let room = self.room_in_file(self.position);
            let want = ((buf.len() - total) as u64).min(room) as usize;
            let read = match self.current.as_mut() {
                Some((_, file)) => file.read(&mut buf[total..total + want])?,
                None => 0,
            };

            if read == 0 {
                break;
            }
            total += read;
            self.position += read as u64;
        }

        Ok(total)
    }
}

impl Write for MultiVolumeStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.writable {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "volume stream opened read-only",
            ));
        }

        let mut total = 0;
        while total < buf.len() {
            self.activate()?;

            let room = self.room_in_file(self.position);
            let want = ((buf.len() - total) as u64).min(room) as usize;
            let written = match self.current.as_mut() {
                Some((_, file)) => file.write(&buf[total..total + want])?,
                None => 0,
            };

            if written == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "split file accepted no bytes",
                ));
            }
            total += written;
            self.position += written as u64;
        }

        Ok(total)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.current.as_mut() {
            Some((_, file)) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Seek for MultiVolumeStream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => self.len()?.checked_add_signed(delta),
        };

        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of volume")
        })?;
        self.position = target;
        Ok(target)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fs::StdFileSystem;
    use tempfile::TempDir;

    #[test]
    fn test_split_file_names() {
        let base = Path::new("/data/volume.dat");
        assert_eq!(split_file_path(base, 0), PathBuf::from("/data/volume.dat"));
        assert_eq!(
            split_file_path(base, 2),
            PathBuf::from("/data/volume.dat.002")
        );
    }

    #[test]
    fn test_unsplit_volume() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("single.dat");
        let fs = StdFileSystem;

        let mut stream = MultiVolumeStream::open_writable(&fs, &base, 0);
        stream.write_all(&[7u8; 100]).unwrap();
        stream.flush().unwrap();
        assert_eq!(stream.len().unwrap(), 100);
        assert!(!split_file_path(&base, 1).exists());
    }

    #[test]
    fn test_read_past_end_stops() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("short.dat");
        std::fs::write(&base, b"abcdef").unwrap();

        let fs = StdFileSystem;
        let mut stream = MultiVolumeStream::open(&fs, &base, 4);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abcd");
        assert!(stream.write(b"x").is_err());
    }
}
