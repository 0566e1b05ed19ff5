//! Trait abstraction for the removable storage medium to enable testing

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::info;

/// How a file is opened on the medium
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Existence probe; fails if the file does not exist
    Read,
    /// Append to the file, creating it if needed
    AppendCreate,
}

/// File-level access to a mounted medium.
///
/// Files are closed when the returned handle is dropped.
pub trait Media {
    type File: Write;

    /// Make the medium ready for use. Called once at start-up.
    fn mount(&mut self) -> io::Result<()>;

    fn open(&mut self, name: &str, mode: OpenMode) -> io::Result<Self::File>;
}

/// A host directory standing in for the medium
#[derive(Debug)]
pub struct DirectoryMedia {
    root: PathBuf,
    mounted: bool,
}

impl DirectoryMedia {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mounted: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Media for DirectoryMedia {
    type File = File;

    fn mount(&mut self) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        if !self.root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} is not a directory", self.root.display()),
            ));
        }
        self.mounted = true;
        info!("Mounted log directory {}", self.root.display());
        Ok(())
    }

    fn open(&mut self, name: &str, mode: OpenMode) -> io::Result<File> {
        if !self.mounted {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "medium not mounted"));
        }
        let path = self.root.join(name);
        match mode {
            OpenMode::Read => File::open(path),
            OpenMode::AppendCreate => OpenOptions::new().append(true).create(true).open(path),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_open_before_mount_fails() {
        let dir = TempDir::new().unwrap();
        let mut media = DirectoryMedia::new(dir.path());
        let err = media.open("LOG00000.CSV", OpenMode::AppendCreate).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }

    #[test]
    fn test_mount_creates_directory() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("nested").join("logs");
        let mut media = DirectoryMedia::new(&root);
        media.mount().unwrap();
        assert!(root.is_dir());
    }

    #[test]
    fn test_read_probe_and_append() {
        let dir = TempDir::new().unwrap();
        let mut media = DirectoryMedia::new(dir.path());
        media.mount().unwrap();

        assert!(media.open("LOG00000.CSV", OpenMode::Read).is_err());

        {
            let mut file = media.open("LOG00000.CSV", OpenMode::AppendCreate).unwrap();
            file.write_all(b"a;").unwrap();
        }
        {
            let mut file = media.open("LOG00000.CSV", OpenMode::AppendCreate).unwrap();
            file.write_all(b"b;").unwrap();
        }

        let mut contents = String::new();
        media
            .open("LOG00000.CSV", OpenMode::Read)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "a;b;");
    }
}
