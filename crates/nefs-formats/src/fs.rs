//! File-system abstraction used for archives, volumes and item sources

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

/// A readable, writable and seekable file handle
pub trait VolumeFile: Read + Write + Seek + Send {}

impl<T: Read + Write + Seek + Send> VolumeFile for T {}

/// File operations needed by the archive reader and writer
pub trait FileSystem: Send + Sync {
    /// Open an existing file for reading
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn VolumeFile>>;

    /// Create or truncate a file for writing
    fn create(&self, path: &Path) -> io::Result<Box<dyn VolumeFile>>;

    /// Open a file for reading and writing, creating it if missing
    fn open_read_write(&self, path: &Path) -> io::Result<Box<dyn VolumeFile>>;

    /// Whether a file exists
    fn exists(&self, path: &Path) -> bool;

    /// Size of a file in bytes
    fn file_len(&self, path: &Path) -> io::Result<u64>;

    /// List the files in a directory
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    /// Create a directory and all its parents
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// [`FileSystem`] backed by `std::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    fn open_read(&self, path: &Path) -> io::Result<Box<dyn VolumeFile>> {
        // Write access is refused by the OS handle itself
        Ok(Box::new(File::open(path)?))
    }

    fn create(&self, path: &Path) -> io::Result<Box<dyn VolumeFile>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Box::new(file))
    }

    fn open_read_write(&self, path: &Path) -> io::Result<Box<dyn VolumeFile>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Box::new(file))
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(path)?.len())
    }

    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_std_file_system() {
        let dir = TempDir::new().unwrap();
        let fs = StdFileSystem;
        let path = dir.path().join("a.bin");

        assert!(!fs.exists(&path));
        {
            let mut file = fs.create(&path).unwrap();
            file.write_all(b"hello").unwrap();
        }
        assert!(fs.exists(&path));
        assert_eq!(fs.file_len(&path).unwrap(), 5);

        let mut content = String::new();
        fs.open_read(&path)
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "hello");

        fs.create_dir_all(&dir.path().join("sub")).unwrap();
        assert_eq!(fs.list(dir.path()).unwrap(), vec![path]);
    }
}
